use super::config::TreeParams;
use super::error::EngineError;
use super::partition::{LeafDescriptor, build_nodes};
use crate::core::geometry::frame::to_local;
use crate::core::geometry::sphere::Sphere;
use crate::core::models::ids::{ParticleId, RefinerId, RigidBodyId};
use crate::core::models::model::Model;
use crate::core::refiner::Refiner;
use nalgebra::Isometry3;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

pub type NodeIndex = usize;

/// What a tree node points at.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Child node indices (at least two).
    Internal(Vec<NodeIndex>),
    /// Indices into the refiner's result for the rigid body.
    Leaf(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub(crate) index: NodeIndex,
    pub(crate) sphere: Sphere,
    pub(crate) kind: NodeKind,
}

impl TreeNode {
    pub(crate) fn placeholder(index: NodeIndex) -> Self {
        Self {
            index,
            sphere: Sphere::default(),
            kind: NodeKind::Leaf(Vec::new()),
        }
    }

    #[inline]
    pub fn sphere(&self) -> &Sphere {
        &self.sphere
    }

    #[inline]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }
}

/// A bounding-sphere hierarchy over the refined particles of one rigid body.
///
/// Node spheres are stored in the body's local frame, so the tree stays valid
/// however the body translates or rotates; callers map spheres to world space
/// with the body's current reference frame. The tree is immutable once built. A
/// change in the body's membership makes it stale (see [`Self::is_current`])
/// and a brand new tree has to be built.
#[derive(Debug)]
pub struct RigidBodySphereTree {
    body: RigidBodyId,
    refiner_id: RefinerId,
    refiner: Arc<dyn Refiner>,
    generation: u64,
    params: TreeParams,
    nodes: Vec<TreeNode>,
}

impl RigidBodySphereTree {
    /// Builds the tree of `body` over the particles `refiner_id` expands it into.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidConfig`] for invalid `params`,
    /// [`EngineError::EmptyRigidBody`] if the refiner yields no particles, and
    /// lookup errors for unknown bodies, refiners or refined particles.
    #[instrument(skip_all, name = "build_rigid_body_tree", fields(body = ?body))]
    pub fn build(
        model: &Model,
        body: RigidBodyId,
        refiner_id: RefinerId,
        params: &TreeParams,
    ) -> Result<Self, EngineError> {
        params.validate()?;
        let rb = model
            .rigid_body(body)
            .ok_or(EngineError::RigidBodyNotFound(body))?;
        let refiner = model
            .refiner(refiner_id)
            .ok_or(EngineError::RefinerNotFound(refiner_id))?
            .clone();

        let count = refiner.number_of_refined(model, body);
        if count == 0 {
            return Err(EngineError::EmptyRigidBody {
                body,
                refiner: refiner.name().to_string(),
            });
        }

        let frame = rb.reference_frame();
        let mut leaves = Vec::with_capacity(count);
        let mut seen = HashSet::with_capacity(count);
        for index in 0..count {
            let particle_id = refiner.refined(model, body, index).ok_or_else(|| {
                EngineError::RefinedIndexOutOfRange {
                    body,
                    refiner: refiner.name().to_string(),
                    index,
                }
            })?;
            let particle = model
                .particle(particle_id)
                .ok_or(EngineError::ParticleNotFound(particle_id))?;
            // A particle listed twice is indexed once.
            if !seen.insert(particle_id) {
                continue;
            }
            let local_position = match particle.membership() {
                Some(m) if m.body == body => m.local_position,
                _ => to_local(frame, particle.position()),
            };
            leaves.push(LeafDescriptor {
                local_position,
                radius: particle.radius(),
                index,
            });
        }

        let leaves_len = leaves.len();
        let nodes = build_nodes(&leaves, params);
        let tree = Self {
            body,
            refiner_id,
            refiner,
            generation: rb.membership_generation(),
            params: *params,
            nodes,
        };
        debug!(
            particles = leaves_len,
            nodes = tree.nodes.len(),
            depth = tree.depth(),
            "Built rigid body sphere tree."
        );
        Ok(tree)
    }

    #[inline]
    pub fn body(&self) -> RigidBodyId {
        self.body
    }

    #[inline]
    pub fn refiner_id(&self) -> RefinerId {
        self.refiner_id
    }

    #[inline]
    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    /// Membership generation of the body when the tree was built.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `true` while the body exists and its membership is unchanged.
    pub fn is_current(&self, model: &Model) -> bool {
        model
            .rigid_body(self.body)
            .is_some_and(|rb| rb.membership_generation() == self.generation)
    }

    #[inline]
    pub fn root(&self) -> NodeIndex {
        0
    }

    #[inline]
    pub fn number_of_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn node(&self, node: NodeIndex) -> &TreeNode {
        debug_assert!(node < self.nodes.len(), "node index out of range");
        &self.nodes[node]
    }

    #[inline]
    pub fn is_leaf(&self, node: NodeIndex) -> bool {
        matches!(self.node(node).kind, NodeKind::Leaf(_))
    }

    /// Child nodes of `node`. A leaf reports itself as its only child so that
    /// traversals can descend one level uniformly.
    #[inline]
    pub fn children(&self, node: NodeIndex) -> &[NodeIndex] {
        let n = self.node(node);
        match &n.kind {
            NodeKind::Internal(children) => children,
            NodeKind::Leaf(_) => std::slice::from_ref(&n.index),
        }
    }

    /// Bounding sphere of `node` in the rigid body's local frame.
    #[inline]
    pub fn sphere(&self, node: NodeIndex) -> Sphere {
        self.node(node).sphere
    }

    /// Bounding sphere of `node` mapped through `frame`.
    #[inline]
    pub fn sphere_in(&self, node: NodeIndex, frame: &Isometry3<f64>) -> Sphere {
        self.node(node).sphere.transformed(frame)
    }

    /// Bounding sphere of `node` in world space, using the body's current frame.
    pub fn world_sphere(&self, model: &Model, node: NodeIndex) -> Result<Sphere, EngineError> {
        let frame = model.reference_frame(self.body)?;
        Ok(self.sphere_in(node, frame))
    }

    /// Local-frame spheres of every node, in node order.
    pub fn spheres(&self) -> Vec<Sphere> {
        self.nodes.iter().map(|n| n.sphere).collect()
    }

    fn leaf_indices(&self, node: NodeIndex) -> Result<&[usize], EngineError> {
        match &self.node(node).kind {
            NodeKind::Leaf(indices) => Ok(indices),
            NodeKind::Internal(_) => Err(EngineError::NotALeaf { node }),
        }
    }

    pub fn number_of_particles(&self, node: NodeIndex) -> Result<usize, EngineError> {
        self.leaf_indices(node).map(<[usize]>::len)
    }

    /// The `i`-th particle of leaf `node`, resolved through the refiner.
    pub fn particle(
        &self,
        model: &Model,
        node: NodeIndex,
        i: usize,
    ) -> Result<ParticleId, EngineError> {
        let indices = self.leaf_indices(node)?;
        let &index = indices
            .get(i)
            .ok_or(EngineError::ParticleIndexOutOfRange {
                node,
                index: i,
                len: indices.len(),
            })?;
        self.resolve(model, index)
    }

    /// Every particle held by leaf `node`.
    pub fn leaf_particles(
        &self,
        model: &Model,
        node: NodeIndex,
    ) -> Result<Vec<ParticleId>, EngineError> {
        self.leaf_indices(node)?
            .iter()
            .map(|&index| self.resolve(model, index))
            .collect()
    }

    /// Every particle in the subtree rooted at `node`.
    pub fn particles(
        &self,
        model: &Model,
        node: NodeIndex,
    ) -> Result<Vec<ParticleId>, EngineError> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            match &self.node(current).kind {
                NodeKind::Leaf(indices) => {
                    for &index in indices {
                        out.push(self.resolve(model, index)?);
                    }
                }
                NodeKind::Internal(children) => stack.extend(children.iter().copied()),
            }
        }
        Ok(out)
    }

    /// Number of node levels from the root to the deepest leaf.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self.root(), 1usize)];
        while let Some((node, level)) = stack.pop() {
            deepest = deepest.max(level);
            if let NodeKind::Internal(children) = &self.nodes[node].kind {
                stack.extend(children.iter().map(|&c| (c, level + 1)));
            }
        }
        deepest
    }

    fn resolve(&self, model: &Model, index: usize) -> Result<ParticleId, EngineError> {
        self.refiner
            .refined(model, self.body, index)
            .ok_or_else(|| EngineError::RefinedIndexOutOfRange {
                body: self.body,
                refiner: self.refiner.name().to_string(),
                index,
            })
    }
}
