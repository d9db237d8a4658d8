use super::ids::RigidBodyId;
use crate::core::geometry::sphere::Sphere;
use nalgebra::Point3;

/// Membership of a particle in a rigid body.
///
/// The local coordinates are fixed when the particle joins the body; only the
/// body's reference frame changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidMembership {
    pub body: RigidBodyId,
    pub local_position: Point3<f64>,
}

/// A sphere-shaped particle stored in a [`super::model::Model`].
///
/// The world position of a rigid member is derived from its body's frame and is
/// refreshed by the model whenever that frame changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub name: String,
    pub(crate) position: Point3<f64>,
    pub(crate) radius: f64,
    pub(crate) membership: Option<RigidMembership>,
}

impl Particle {
    pub(crate) fn new(name: &str, position: Point3<f64>, radius: f64) -> Self {
        Self {
            name: name.to_string(),
            position,
            radius,
            membership: None,
        }
    }

    /// World-space position.
    #[inline]
    pub fn position(&self) -> &Point3<f64> {
        &self.position
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// World-space sphere of the particle.
    #[inline]
    pub fn sphere(&self) -> Sphere {
        Sphere::new(self.position, self.radius)
    }

    #[inline]
    pub fn membership(&self) -> Option<&RigidMembership> {
        self.membership.as_ref()
    }

    #[inline]
    pub fn rigid_body(&self) -> Option<RigidBodyId> {
        self.membership.map(|m| m.body)
    }

    #[inline]
    pub fn is_rigid_member(&self) -> bool {
        self.membership.is_some()
    }
}
