//! Movement tracking for cached pair lists.
//!
//! A snapshot records where the tracked particles were when a pair list was
//! built: free particles by position, rigid members through their body's frame
//! and a local bounding sphere of the tracked members. Rigid bodies are never
//! checked member by member.

use crate::core::geometry::frame::displacement_bound;
use crate::core::geometry::sphere::Sphere;
use crate::core::models::ids::{ParticleId, RigidBodyId};
use crate::core::models::model::Model;
use crate::engine::error::EngineError;
use nalgebra::{Isometry3, Point3};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
struct BodySnapshot {
    frame: Isometry3<f64>,
    generation: u64,
    /// Bounding sphere of the tracked members, in the body's local frame.
    bound: Sphere,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct MovementSnapshot {
    free: Vec<(ParticleId, Point3<f64>)>,
    rigid: Vec<(ParticleId, RigidBodyId)>,
    bodies: HashMap<RigidBodyId, BodySnapshot>,
    bond_generation: u64,
}

impl MovementSnapshot {
    pub(crate) fn capture<'a, I>(model: &Model, particles: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = &'a ParticleId>,
    {
        let mut snapshot = Self {
            bond_generation: model.bond_generation(),
            ..Self::default()
        };
        let mut local_points: HashMap<RigidBodyId, Vec<Sphere>> = HashMap::new();

        for &id in particles {
            let particle = model
                .particle(id)
                .ok_or(EngineError::ParticleNotFound(id))?;
            match particle.membership() {
                Some(m) => {
                    snapshot.rigid.push((id, m.body));
                    local_points
                        .entry(m.body)
                        .or_default()
                        .push(Sphere::new(m.local_position, 0.0));
                }
                None => snapshot.free.push((id, *particle.position())),
            }
        }

        for (body, points) in local_points {
            let rb = model
                .rigid_body(body)
                .ok_or(EngineError::RigidBodyNotFound(body))?;
            snapshot.bodies.insert(
                body,
                BodySnapshot {
                    frame: *rb.reference_frame(),
                    generation: rb.membership_generation(),
                    bound: Sphere::enclosing(&points),
                },
            );
        }
        Ok(snapshot)
    }

    /// `true` if any tracked particle or rigid body was removed, changed
    /// rigid-body membership, or a tracked body's membership changed. Bond
    /// edits count as well since bond filters depend on them.
    pub(crate) fn membership_changed(&self, model: &Model) -> bool {
        if model.bond_generation() != self.bond_generation {
            return true;
        }
        let bodies_changed = self.bodies.iter().any(|(&body, saved)| {
            model
                .rigid_body(body)
                .is_none_or(|rb| rb.membership_generation() != saved.generation)
        });
        if bodies_changed {
            return true;
        }
        let rigid_changed = self.rigid.iter().any(|&(id, body)| {
            model
                .particle(id)
                .is_none_or(|p| p.rigid_body() != Some(body))
        });
        rigid_changed
            || self
                .free
                .iter()
                .any(|&(id, _)| model.particle(id).is_none_or(|p| p.is_rigid_member()))
    }

    /// Upper bound on how far any tracked particle moved since the snapshot.
    ///
    /// Infinite if something tracked no longer exists.
    pub(crate) fn max_displacement(&self, model: &Model) -> f64 {
        let free = self.free.iter().map(|(id, saved)| {
            model
                .particle(*id)
                .map_or(f64::INFINITY, |p| (p.position() - saved).norm())
        });
        let rigid = self.bodies.iter().map(|(&body, saved)| {
            model.rigid_body(body).map_or(f64::INFINITY, |rb| {
                let frame = rb.reference_frame();
                if *frame == saved.frame {
                    0.0
                } else {
                    displacement_bound(&saved.frame, frame, &saved.bound)
                }
            })
        });
        free.chain(rigid).fold(0.0, f64::max)
    }

    pub(crate) fn exceeds(&self, model: &Model, slack: f64) -> bool {
        self.membership_changed(model) || self.max_displacement(model) > slack
    }
}
