//! Pair filters suppress candidate pairs regardless of their distance.
//!
//! A pair is emitted only if no filter in the chain rejects it.

use crate::core::models::ids::ParticleId;
use crate::core::models::model::Model;
use std::fmt::{self, Debug};
use std::sync::Arc;

pub trait PairPredicate: Debug + Send + Sync {
    fn reject(&self, model: &Model, a: ParticleId, b: ParticleId) -> bool;

    /// `true` if this filter rejects every pair whose particles share a rigid
    /// body. Finders use it to skip intra-body traversals entirely.
    fn rejects_same_rigid_body(&self) -> bool {
        false
    }
}

/// Rejects pairs that are directly bonded.
#[derive(Debug, Clone, Copy, Default)]
pub struct BondedPairFilter;

impl PairPredicate for BondedPairFilter {
    fn reject(&self, model: &Model, a: ParticleId, b: ParticleId) -> bool {
        model.is_bonded(a, b)
    }
}

/// Rejects pairs of particles belonging to the same rigid body; their distance
/// never changes, so they carry no information for a restraint.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameRigidBodyFilter;

impl PairPredicate for SameRigidBodyFilter {
    fn reject(&self, model: &Model, a: ParticleId, b: ParticleId) -> bool {
        let body_a = model.particle(a).and_then(|p| p.rigid_body());
        let body_b = model.particle(b).and_then(|p| p.rigid_body());
        body_a.is_some() && body_a == body_b
    }

    fn rejects_same_rigid_body(&self) -> bool {
        true
    }
}

/// Wraps a closure as a filter.
pub struct FnPairFilter<F> {
    name: String,
    predicate: F,
}

impl<F> FnPairFilter<F>
where
    F: Fn(&Model, ParticleId, ParticleId) -> bool + Send + Sync,
{
    pub fn new(name: &str, predicate: F) -> Self {
        Self {
            name: name.to_string(),
            predicate,
        }
    }
}

impl<F> Debug for FnPairFilter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPairFilter").field("name", &self.name).finish()
    }
}

impl<F> PairPredicate for FnPairFilter<F>
where
    F: Fn(&Model, ParticleId, ParticleId) -> bool + Send + Sync,
{
    fn reject(&self, model: &Model, a: ParticleId, b: ParticleId) -> bool {
        (self.predicate)(model, a, b)
    }
}

/// An ordered list of filters with any-reject semantics.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn PairPredicate>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: Arc<dyn PairPredicate>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn push(&mut self, filter: Arc<dyn PairPredicate>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    #[inline]
    pub fn rejects(&self, model: &Model, a: ParticleId, b: ParticleId) -> bool {
        self.filters.iter().any(|f| f.reject(model, a, b))
    }

    pub fn rejects_same_rigid_body(&self) -> bool {
        self.filters.iter().any(|f| f.rejects_same_rigid_body())
    }
}
