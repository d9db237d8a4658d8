//! Candidate-pair kernels.
//!
//! Tree kernels walk sphere trees with an explicit stack, drop node pairs whose
//! world-space spheres are provably farther apart than the query distance and
//! run the exact test on leaf particles. The exact test is identical in every
//! kernel (`Sphere::distance <= distance` on the particles' world spheres), so
//! all kernels agree on which pairs are close.
//!
//! Kernels report geometry only; filtering and input-set membership are applied
//! by the caller through the `emit` callback.

use super::error::EngineError;
use super::tree::{NodeIndex, RigidBodySphereTree};
use crate::core::geometry::sphere::Sphere;
use crate::core::models::ids::{ParticleId, ParticlePair};
use crate::core::models::model::Model;
use itertools::Itertools;
use kiddo::{KdTree, SquaredEuclidean};
use std::collections::HashMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Relative tolerance added to the pruning threshold so that rounding in frame
/// transforms never prunes a pair the exact test would accept.
pub const PRUNE_TOLERANCE: f64 = 1e-9;

/// Largest number of points a kd-tree may hold on one axis value.
const KD_TREE_BUCKET_SIZE: usize = 32;

/// The exact closeness test shared by every kernel.
#[inline]
pub fn is_close(a: &Sphere, b: &Sphere, distance: f64) -> bool {
    a.distance(b) <= distance
}

/// `false` only if nothing inside `a` can be within `distance` of anything
/// inside `b`.
#[inline]
pub fn within_reach(a: &Sphere, b: &Sphere, distance: f64) -> bool {
    let scale = 1.0
        + a.radius()
        + b.radius()
        + distance.abs()
        + a.center().coords.amax()
        + b.center().coords.amax();
    a.distance(b) <= distance + PRUNE_TOLERANCE * scale
}

fn particle_sphere(model: &Model, id: ParticleId) -> Result<Sphere, EngineError> {
    model
        .particle(id)
        .map(|p| p.sphere())
        .ok_or(EngineError::ParticleNotFound(id))
}

fn particle_spheres(
    model: &Model,
    ids: &[ParticleId],
) -> Result<Vec<(ParticleId, Sphere)>, EngineError> {
    ids.iter()
        .map(|&id| particle_sphere(model, id).map(|s| (id, s)))
        .collect()
}

fn leaf_spheres(
    model: &Model,
    tree: &RigidBodySphereTree,
    node: NodeIndex,
) -> Result<Vec<(ParticleId, Sphere)>, EngineError> {
    particle_spheres(model, &tree.leaf_particles(model, node)?)
}

/// Pushes the child pairs of `(na, nb)` after descending into the larger
/// non-leaf node.
fn descend(
    ta: &RigidBodySphereTree,
    na: NodeIndex,
    tb: &RigidBodySphereTree,
    nb: NodeIndex,
    stack: &mut Vec<(NodeIndex, NodeIndex)>,
) {
    let split_a = match (ta.is_leaf(na), tb.is_leaf(nb)) {
        (false, true) => true,
        (true, false) => false,
        _ => ta.sphere(na).radius() >= tb.sphere(nb).radius(),
    };
    if split_a {
        stack.extend(ta.children(na).iter().map(|&c| (c, nb)));
    } else {
        stack.extend(tb.children(nb).iter().map(|&c| (na, c)));
    }
}

fn emit_leaf_cross_pairs<F>(
    a: &[(ParticleId, Sphere)],
    b: &[(ParticleId, Sphere)],
    distance: f64,
    emit: &mut F,
) where
    F: FnMut(ParticleId, ParticleId),
{
    for (pa, sa) in a {
        for (pb, sb) in b {
            if pa != pb && is_close(sa, sb, distance) {
                emit(*pa, *pb);
            }
        }
    }
}

/// Close pairs with one particle under `ta` and the other under `tb`, emitted
/// as `(particle of ta, particle of tb)`.
pub fn close_pairs_between_trees<F>(
    model: &Model,
    ta: &RigidBodySphereTree,
    tb: &RigidBodySphereTree,
    distance: f64,
    emit: &mut F,
) -> Result<(), EngineError>
where
    F: FnMut(ParticleId, ParticleId),
{
    let frame_a = *model.reference_frame(ta.body())?;
    let frame_b = *model.reference_frame(tb.body())?;

    let mut stack = vec![(ta.root(), tb.root())];
    while let Some((na, nb)) = stack.pop() {
        let sa = ta.sphere_in(na, &frame_a);
        let sb = tb.sphere_in(nb, &frame_b);
        if !within_reach(&sa, &sb, distance) {
            continue;
        }
        if ta.is_leaf(na) && tb.is_leaf(nb) {
            let leaf_a = leaf_spheres(model, ta, na)?;
            let leaf_b = leaf_spheres(model, tb, nb)?;
            emit_leaf_cross_pairs(&leaf_a, &leaf_b, distance, emit);
        } else {
            descend(ta, na, tb, nb, &mut stack);
        }
    }
    Ok(())
}

/// Close pairs among the particles of a single tree. Every unordered pair is
/// emitted at most once and never as `(x, x)`.
pub fn close_pairs_within_tree<F>(
    model: &Model,
    tree: &RigidBodySphereTree,
    distance: f64,
    emit: &mut F,
) -> Result<(), EngineError>
where
    F: FnMut(ParticleId, ParticleId),
{
    let frame = *model.reference_frame(tree.body())?;

    let mut stack = vec![(tree.root(), tree.root())];
    while let Some((n, m)) = stack.pop() {
        if n == m {
            if tree.is_leaf(n) {
                let leaf = leaf_spheres(model, tree, n)?;
                for ((pa, sa), (pb, sb)) in leaf.iter().tuple_combinations() {
                    if pa != pb && is_close(sa, sb, distance) {
                        emit(*pa, *pb);
                    }
                }
            } else {
                let children = tree.children(n);
                for (i, &c) in children.iter().enumerate() {
                    stack.extend(children[i..].iter().map(|&d| (c, d)));
                }
            }
            continue;
        }

        let sn = tree.sphere_in(n, &frame);
        let sm = tree.sphere_in(m, &frame);
        if !within_reach(&sn, &sm, distance) {
            continue;
        }
        if tree.is_leaf(n) && tree.is_leaf(m) {
            let leaf_n = leaf_spheres(model, tree, n)?;
            let leaf_m = leaf_spheres(model, tree, m)?;
            emit_leaf_cross_pairs(&leaf_n, &leaf_m, distance, emit);
        } else {
            descend(tree, n, tree, m, &mut stack);
        }
    }
    Ok(())
}

/// Close pairs between the particles of `tree` and a single `point` particle,
/// emitted as `(particle of tree, point)`.
pub fn close_pairs_tree_point<F>(
    model: &Model,
    tree: &RigidBodySphereTree,
    point: ParticleId,
    distance: f64,
    emit: &mut F,
) -> Result<(), EngineError>
where
    F: FnMut(ParticleId, ParticleId),
{
    let frame = *model.reference_frame(tree.body())?;
    let target = [(point, particle_sphere(model, point)?)];

    let mut stack = vec![tree.root()];
    while let Some(node) = stack.pop() {
        if !within_reach(&tree.sphere_in(node, &frame), &target[0].1, distance) {
            continue;
        }
        if tree.is_leaf(node) {
            let leaf = leaf_spheres(model, tree, node)?;
            emit_leaf_cross_pairs(&leaf, &target, distance, emit);
        } else {
            stack.extend(tree.children(node).iter().copied());
        }
    }
    Ok(())
}

/// Every pair of `particles` that passes the exact test. Quadratic.
pub fn brute_force_pairs(
    model: &Model,
    particles: &[ParticleId],
    distance: f64,
) -> Result<Vec<ParticlePair>, EngineError> {
    let spheres = particle_spheres(model, particles)?;
    let candidates: Vec<(usize, usize)> = (0..spheres.len()).tuple_combinations().collect();

    #[cfg(not(feature = "parallel"))]
    let iterator = candidates.iter();

    #[cfg(feature = "parallel")]
    let iterator = candidates.par_iter();

    Ok(iterator
        .filter_map(|&(i, j)| {
            let (pa, sa) = &spheres[i];
            let (pb, sb) = &spheres[j];
            (pa != pb && is_close(sa, sb, distance)).then_some((*pa, *pb))
        })
        .collect())
}

/// Every `(a, b)` with `a` from `first` and `b` from `second` that passes the
/// exact test. Quadratic.
pub fn brute_force_bipartite_pairs(
    model: &Model,
    first: &[ParticleId],
    second: &[ParticleId],
    distance: f64,
) -> Result<Vec<ParticlePair>, EngineError> {
    let spheres_a = particle_spheres(model, first)?;
    let spheres_b = particle_spheres(model, second)?;
    let candidates: Vec<(usize, usize)> = (0..spheres_a.len())
        .cartesian_product(0..spheres_b.len())
        .collect();

    #[cfg(not(feature = "parallel"))]
    let iterator = candidates.iter();

    #[cfg(feature = "parallel")]
    let iterator = candidates.par_iter();

    Ok(iterator
        .filter_map(|&(i, j)| {
            let (pa, sa) = &spheres_a[i];
            let (pb, sb) = &spheres_b[j];
            (pa != pb && is_close(sa, sb, distance)).then_some((*pa, *pb))
        })
        .collect())
}

fn coordinates(sphere: &Sphere) -> [f64; 3] {
    let c = sphere.center();
    [c.x, c.y, c.z]
}

/// A kd-tree cannot split a bucket whose points all share one value on the
/// split axis, so inputs with too many repeated coordinates go brute force.
fn kd_tree_friendly(points: &[[f64; 3]]) -> bool {
    (0..3).all(|axis| {
        let mut counts: HashMap<u64, usize> = HashMap::new();
        points.iter().all(|p| {
            let count = counts.entry(p[axis].to_bits()).or_default();
            *count += 1;
            *count < KD_TREE_BUCKET_SIZE
        })
    })
}

fn search_radius_sq(query_radius: f64, largest_radius: f64, distance: f64) -> Option<f64> {
    let reach = distance + query_radius + largest_radius;
    let reach = reach + PRUNE_TOLERANCE * (1.0 + reach.abs());
    (reach >= 0.0).then_some(reach * reach)
}

/// Close pairs among free particles using a kd-tree range search.
pub fn kd_tree_pairs(
    model: &Model,
    particles: &[ParticleId],
    distance: f64,
) -> Result<Vec<ParticlePair>, EngineError> {
    let spheres = particle_spheres(model, particles)?;
    if spheres.len() < 2 {
        return Ok(Vec::new());
    }
    let points: Vec<[f64; 3]> = spheres.iter().map(|(_, s)| coordinates(s)).collect();
    if !kd_tree_friendly(&points) {
        return brute_force_pairs(model, particles, distance);
    }

    let largest = spheres.iter().map(|(_, s)| s.radius()).fold(0.0, f64::max);
    let kdtree: KdTree<f64, 3> = (&points).into();

    let mut pairs = Vec::new();
    for (i, (pa, sa)) in spheres.iter().enumerate() {
        let Some(radius_sq) = search_radius_sq(sa.radius(), largest, distance) else {
            continue;
        };
        for neighbour in kdtree.within_unsorted::<SquaredEuclidean>(&points[i], radius_sq) {
            let j = neighbour.item as usize;
            if j <= i {
                continue;
            }
            let (pb, sb) = &spheres[j];
            if pa != pb && is_close(sa, sb, distance) {
                pairs.push((*pa, *pb));
            }
        }
    }
    Ok(pairs)
}

/// Close `(a, b)` pairs between two free particle lists using a kd-tree over
/// `second`.
pub fn kd_tree_bipartite_pairs(
    model: &Model,
    first: &[ParticleId],
    second: &[ParticleId],
    distance: f64,
) -> Result<Vec<ParticlePair>, EngineError> {
    let spheres_a = particle_spheres(model, first)?;
    let spheres_b = particle_spheres(model, second)?;
    if spheres_a.is_empty() || spheres_b.is_empty() {
        return Ok(Vec::new());
    }
    let points: Vec<[f64; 3]> = spheres_b.iter().map(|(_, s)| coordinates(s)).collect();
    if !kd_tree_friendly(&points) {
        return brute_force_bipartite_pairs(model, first, second, distance);
    }

    let largest = spheres_b.iter().map(|(_, s)| s.radius()).fold(0.0, f64::max);
    let kdtree: KdTree<f64, 3> = (&points).into();

    let mut pairs = Vec::new();
    for (pa, sa) in &spheres_a {
        let Some(radius_sq) = search_radius_sq(sa.radius(), largest, distance) else {
            continue;
        };
        for neighbour in kdtree.within_unsorted::<SquaredEuclidean>(&coordinates(sa), radius_sq) {
            let (pb, sb) = &spheres_b[neighbour.item as usize];
            if pa != pb && is_close(sa, sb, distance) {
                pairs.push((*pa, *pb));
            }
        }
    }
    Ok(pairs)
}
