use super::ids::ParticleId;
use nalgebra::Isometry3;

/// A set of particles whose relative positions are fixed.
///
/// Only the reference frame (rotation + translation) changes over time. The
/// membership generation is bumped on every add/remove so that anything built
/// from the member list can tell it is out of date.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    pub name: String,
    pub(crate) frame: Isometry3<f64>,
    pub(crate) members: Vec<ParticleId>,
    pub(crate) generation: u64,
}

impl RigidBody {
    pub(crate) fn new(name: &str, frame: Isometry3<f64>) -> Self {
        Self {
            name: name.to_string(),
            frame,
            members: Vec::new(),
            generation: 0,
        }
    }

    /// Current reference frame, mapping local coordinates to world space.
    #[inline]
    pub fn reference_frame(&self) -> &Isometry3<f64> {
        &self.frame
    }

    #[inline]
    pub fn members(&self) -> &[ParticleId] {
        &self.members
    }

    #[inline]
    pub fn membership_generation(&self) -> u64 {
        self.generation
    }
}
