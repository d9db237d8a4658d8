//! Refiners expand a rigid body into the leaf particles a sphere tree is built over.
//!
//! A refiner must return a stable ordering across calls for as long as a tree
//! built from it is alive: trees store indices into the refined list, not
//! particle handles.

use crate::core::models::ids::{ParticleId, RigidBodyId};
use crate::core::models::model::Model;
use std::collections::HashMap;
use std::fmt::Debug;

pub trait Refiner: Debug + Send + Sync {
    /// Human-readable name used in logs and error messages.
    fn name(&self) -> &str;

    fn number_of_refined(&self, model: &Model, body: RigidBodyId) -> usize;

    /// The `index`-th refined particle of `body`, or `None` if out of range.
    fn refined(&self, model: &Model, body: RigidBodyId, index: usize) -> Option<ParticleId>;

    fn refined_particles(&self, model: &Model, body: RigidBodyId) -> Vec<ParticleId> {
        (0..self.number_of_refined(model, body))
            .filter_map(|i| self.refined(model, body, i))
            .collect()
    }
}

/// Refines a rigid body into its current members, in insertion order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RigidMembersRefiner;

impl Refiner for RigidMembersRefiner {
    fn name(&self) -> &str {
        "rigid-members"
    }

    fn number_of_refined(&self, model: &Model, body: RigidBodyId) -> usize {
        model.rigid_body(body).map_or(0, |rb| rb.members().len())
    }

    fn refined(&self, model: &Model, body: RigidBodyId, index: usize) -> Option<ParticleId> {
        model
            .rigid_body(body)
            .and_then(|rb| rb.members().get(index).copied())
    }
}

/// Refines each rigid body into a fixed, explicitly provided particle list.
///
/// Listed particles need not be members of the body; their local coordinates
/// are taken relative to the body frame at the time a tree is built.
#[derive(Debug, Clone, Default)]
pub struct TableRefiner {
    name: String,
    table: HashMap<RigidBodyId, Vec<ParticleId>>,
}

impl TableRefiner {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: HashMap::new(),
        }
    }

    pub fn with_entry(mut self, body: RigidBodyId, particles: Vec<ParticleId>) -> Self {
        self.table.insert(body, particles);
        self
    }
}

impl Refiner for TableRefiner {
    fn name(&self) -> &str {
        &self.name
    }

    fn number_of_refined(&self, _model: &Model, body: RigidBodyId) -> usize {
        self.table.get(&body).map_or(0, Vec::len)
    }

    fn refined(&self, _model: &Model, body: RigidBodyId, index: usize) -> Option<ParticleId> {
        self.table.get(&body).and_then(|ps| ps.get(index).copied())
    }
}
