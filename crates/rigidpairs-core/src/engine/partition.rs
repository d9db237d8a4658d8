//! Spatial partitioner: splits the leaves of a rigid body into a sphere tree.
//!
//! Each split rotates the leaf centers into their principal frame, lays a grid of
//! cell side "half the largest extent" over their bounding box and makes one
//! child per occupied cell. The fanout is therefore variable (at most 8) and the
//! tree is not a balanced binary tree; clustered inputs can produce lopsided
//! nodes. When every center falls in the same cell (coincident leaves) the
//! split degrades to a median split along the first principal axis, which keeps
//! leaf size bounded.

use super::config::TreeParams;
use super::tree::{NodeIndex, NodeKind, TreeNode};
use crate::core::geometry::pca::principal_components;
use crate::core::geometry::sphere::Sphere;
use nalgebra::{Point3, Vector3};
use std::collections::BTreeMap;
use tracing::warn;

/// One particle of a rigid body as seen by the partitioner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeafDescriptor {
    /// Position in the rigid body's local frame.
    pub local_position: Point3<f64>,
    pub radius: f64,
    /// Index of the particle in the refiner's result for the body.
    pub index: usize,
}

impl LeafDescriptor {
    #[inline]
    pub fn sphere(&self) -> Sphere {
        Sphere::new(self.local_position, self.radius)
    }
}

/// Builds the node array of a sphere tree over `leaves`.
///
/// Node 0 is the root. The build is iterative (explicit stack). `leaves` must not
/// be empty.
pub fn build_nodes(leaves: &[LeafDescriptor], params: &TreeParams) -> Vec<TreeNode> {
    debug_assert!(!leaves.is_empty(), "cannot partition an empty leaf set");
    let max_leaf_size = params.max_leaf_size.max(1);

    let mut nodes = vec![TreeNode::placeholder(0)];
    let mut stack: Vec<(NodeIndex, Vec<usize>)> = vec![(0, (0..leaves.len()).collect())];

    while let Some((node, subset)) = stack.pop() {
        let spheres: Vec<Sphere> = subset.iter().map(|&i| leaves[i].sphere()).collect();
        nodes[node].sphere = Sphere::enclosing(&spheres).expanded(params.expansion);

        if subset.len() <= max_leaf_size {
            nodes[node].kind = NodeKind::Leaf(subset.iter().map(|&i| leaves[i].index).collect());
            continue;
        }

        let buckets = divide(leaves, &subset);
        let first_child = nodes.len();
        let children: Vec<NodeIndex> = (first_child..first_child + buckets.len()).collect();
        nodes.extend(children.iter().map(|&c| TreeNode::placeholder(c)));
        nodes[node].kind = NodeKind::Internal(children.clone());
        for (child, bucket) in children.into_iter().zip(buckets) {
            stack.push((child, bucket));
        }
    }

    nodes
}

/// Splits `subset` (positions into `leaves`) into at least two non-empty groups.
pub fn divide(leaves: &[LeafDescriptor], subset: &[usize]) -> Vec<Vec<usize>> {
    debug_assert!(subset.len() >= 2, "need at least two leaves to divide");
    let points: Vec<Point3<f64>> = subset.iter().map(|&i| leaves[i].local_position).collect();
    let Some(pca) = principal_components(&points) else {
        let raw: Vec<Vector3<f64>> = points.iter().map(|p| p.coords).collect();
        return median_split(subset, &raw);
    };
    let rotated: Vec<Vector3<f64>> = points.iter().map(|p| pca.to_principal_frame(p)).collect();

    let mut min = Vector3::repeat(f64::MAX);
    let mut max = Vector3::repeat(f64::MIN);
    for v in &rotated {
        min = min.inf(v);
        max = max.sup(v);
    }
    let extent = max - min;
    let side = extent.max() / 2.0;

    if side > 0.0 && side.is_finite() {
        let dims = extent.map(|e| ((e / side).ceil() as usize).max(1));
        let mut grid: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (v, &leaf) in rotated.iter().zip(subset) {
            let cell = |axis: usize| {
                let raw = ((v[axis] - min[axis]) / side).floor().max(0.0) as usize;
                raw.min(dims[axis] - 1)
            };
            let key = cell(0) + dims[0] * (cell(1) + dims[1] * cell(2));
            grid.entry(key).or_default().push(leaf);
        }
        if grid.len() >= 2 {
            return grid.into_values().collect();
        }
    }

    warn!(
        leaves = subset.len(),
        "Grid split found a single occupied cell; falling back to a median split."
    );
    median_split(subset, &rotated)
}

fn median_split(subset: &[usize], rotated: &[Vector3<f64>]) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..subset.len()).collect();
    order.sort_by(|&a, &b| {
        rotated[a][0]
            .partial_cmp(&rotated[b][0])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mid = order.len() / 2;
    let (low, high) = order.split_at(mid);
    vec![
        low.iter().map(|&i| subset[i]).collect(),
        high.iter().map(|&i| subset[i]).collect(),
    ]
}
