use super::config::TreeParams;
use super::error::EngineError;
use super::tree::RigidBodySphereTree;
use crate::core::models::ids::{RefinerId, RigidBodyId};
use crate::core::models::model::Model;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::trace;

type TreeKey = (RigidBodyId, RefinerId);

/// Sphere trees keyed by (rigid body, refiner).
///
/// An entry is reused while the body's membership generation and the tree
/// parameters match the ones it was built with; otherwise the next lookup
/// replaces it. Trees are handed out as `Arc`s, so a replaced tree stays alive
/// for whoever still holds it.
#[derive(Debug, Default)]
pub struct TreeCache {
    trees: RwLock<HashMap<TreeKey, Arc<RigidBodySphereTree>>>,
}

impl TreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &self,
        model: &Model,
        body: RigidBodyId,
        refiner: RefinerId,
        params: &TreeParams,
    ) -> Result<Arc<RigidBodySphereTree>, EngineError> {
        let generation = model
            .rigid_body(body)
            .ok_or(EngineError::RigidBodyNotFound(body))?
            .membership_generation();

        let reusable = |tree: &Arc<RigidBodySphereTree>| {
            tree.generation() == generation && tree.params() == params
        };

        {
            let trees = self.trees.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(tree) = trees.get(&(body, refiner)).filter(|&t| reusable(t)) {
                trace!(body = ?body, refiner = ?refiner, "Tree cache hit.");
                return Ok(Arc::clone(tree));
            }
        }

        // Built under the write lock so concurrent misses build the tree once.
        let mut trees = self.trees.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(tree) = trees.get(&(body, refiner)).filter(|&t| reusable(t)) {
            return Ok(Arc::clone(tree));
        }
        let tree = Arc::new(RigidBodySphereTree::build(model, body, refiner, params)?);
        trees.insert((body, refiner), Arc::clone(&tree));
        Ok(tree)
    }

    /// Returns the cached tree without building or validating it.
    pub fn get(&self, body: RigidBodyId, refiner: RefinerId) -> Option<Arc<RigidBodySphereTree>> {
        self.trees
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(body, refiner))
            .cloned()
    }

    pub fn release_body(&self, body: RigidBodyId) {
        self.trees
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|&(b, _), _| b != body);
    }

    pub fn release_refiner(&self, refiner: RefinerId) {
        self.trees
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|&(_, r), _| r != refiner);
    }

    pub fn clear(&self) {
        self.trees
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.trees.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
