//! Best-first nearest queries over rigid-body sphere trees.
//!
//! Both searches keep a min-priority queue of nodes ordered by the surface
//! distance of their world-space spheres and stop once the closest queued bound
//! exceeds the best distance found so far.

use super::error::EngineError;
use super::traversal::within_reach;
use super::tree::{NodeIndex, RigidBodySphereTree};
use crate::core::geometry::sphere::Sphere;
use crate::core::models::ids::{ParticleId, ParticlePair};
use crate::core::models::model::Model;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate<T> {
    bound: f64,
    item: T,
}

impl<T: PartialEq> Eq for Candidate<T> {}

impl<T: PartialEq> PartialOrd for Candidate<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        other.bound.partial_cmp(&self.bound)
    }
}

impl<T: PartialEq> Ord for Candidate<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }
}

/// A nearest-query answer together with its surface distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest<T> {
    pub item: T,
    pub distance: f64,
}

fn world_sphere(model: &Model, id: ParticleId) -> Result<Sphere, EngineError> {
    model
        .particle(id)
        .map(|p| p.sphere())
        .ok_or(EngineError::ParticleNotFound(id))
}

/// The particle of `tree` whose surface is closest to `query` (world space).
pub fn closest_particle(
    model: &Model,
    tree: &RigidBodySphereTree,
    query: &Sphere,
) -> Result<Option<Nearest<ParticleId>>, EngineError> {
    let frame = *model.reference_frame(tree.body())?;
    let mut best: Option<Nearest<ParticleId>> = None;
    let mut queue = BinaryHeap::new();
    let root = tree.root();
    queue.push(Candidate {
        bound: tree.sphere_in(root, &frame).distance(query),
        item: root,
    });

    while let Some(Candidate { item: node, .. }) = queue.pop() {
        let sphere = tree.sphere_in(node, &frame);
        if let Some(b) = &best {
            if !within_reach(&sphere, query, b.distance) {
                break;
            }
        }
        if tree.is_leaf(node) {
            for particle in tree.leaf_particles(model, node)? {
                let distance = world_sphere(model, particle)?.distance(query);
                if best.is_none_or(|b| distance < b.distance) {
                    best = Some(Nearest {
                        item: particle,
                        distance,
                    });
                }
            }
        } else {
            for &child in tree.children(node) {
                let child_sphere = tree.sphere_in(child, &frame);
                if best.is_none_or(|b| within_reach(&child_sphere, query, b.distance)) {
                    queue.push(Candidate {
                        bound: child_sphere.distance(query),
                        item: child,
                    });
                }
            }
        }
    }
    Ok(best)
}

/// The pair `(particle of ta, particle of tb)` with the smallest surface
/// distance.
pub fn closest_pair(
    model: &Model,
    ta: &RigidBodySphereTree,
    tb: &RigidBodySphereTree,
) -> Result<Option<Nearest<ParticlePair>>, EngineError> {
    let frame_a = *model.reference_frame(ta.body())?;
    let frame_b = *model.reference_frame(tb.body())?;
    let spheres = |na: NodeIndex, nb: NodeIndex| {
        (ta.sphere_in(na, &frame_a), tb.sphere_in(nb, &frame_b))
    };

    let mut best: Option<Nearest<ParticlePair>> = None;
    let mut queue = BinaryHeap::new();
    let (sa, sb) = spheres(ta.root(), tb.root());
    queue.push(Candidate {
        bound: sa.distance(&sb),
        item: (ta.root(), tb.root()),
    });

    while let Some(Candidate { item: (na, nb), .. }) = queue.pop() {
        let (sa, sb) = spheres(na, nb);
        if let Some(b) = &best {
            if !within_reach(&sa, &sb, b.distance) {
                break;
            }
        }

        if ta.is_leaf(na) && tb.is_leaf(nb) {
            let leaf_b = tb
                .leaf_particles(model, nb)?
                .into_iter()
                .map(|p| world_sphere(model, p).map(|s| (p, s)))
                .collect::<Result<Vec<_>, _>>()?;
            for pa in ta.leaf_particles(model, na)? {
                let a = world_sphere(model, pa)?;
                for (pb, b) in &leaf_b {
                    if pa == *pb {
                        continue;
                    }
                    let distance = a.distance(b);
                    if best.is_none_or(|n| distance < n.distance) {
                        best = Some(Nearest {
                            item: (pa, *pb),
                            distance,
                        });
                    }
                }
            }
            continue;
        }

        // Leaves report themselves as their only child, so the product covers
        // the mixed leaf/internal cases too.
        for &ca in ta.children(na) {
            for &cb in tb.children(nb) {
                let (sa, sb) = spheres(ca, cb);
                if best.is_none_or(|n| within_reach(&sa, &sb, n.distance)) {
                    queue.push(Candidate {
                        bound: sa.distance(&sb),
                        item: (ca, cb),
                    });
                }
            }
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ids::RefinerId;
    use crate::core::refiner::RigidMembersRefiner;
    use crate::engine::config::TreeParams;
    use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;

    fn scattered_body(
        model: &mut Model,
        rng: &mut StdRng,
        n: usize,
        center: Point3<f64>,
    ) -> Vec<ParticleId> {
        let body = model.add_rigid_body(Isometry3::identity());
        (0..n)
            .map(|_| {
                let offset = Vector3::new(
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-5.0..5.0),
                );
                let id = model.add_particle(center + offset, rng.gen_range(0.1..0.5)).unwrap();
                model.add_rigid_member(body, id).unwrap();
                id
            })
            .collect()
    }

    fn tree_of(
        model: &Model,
        refiner: RefinerId,
        members: &[ParticleId],
    ) -> Arc<RigidBodySphereTree> {
        let body = model.particle(members[0]).unwrap().rigid_body().unwrap();
        model
            .rigid_body_tree(body, refiner, &TreeParams::default())
            .unwrap()
    }

    #[test]
    fn closest_particle_matches_a_linear_scan() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut model = Model::new();
        let refiner = model.register_refiner(Arc::new(RigidMembersRefiner));
        let members = scattered_body(&mut model, &mut rng, 120, Point3::origin());
        let tree = tree_of(&model, refiner, &members);

        for _ in 0..20 {
            let query = Sphere::new(
                Point3::new(
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                ),
                0.3,
            );
            let found = closest_particle(&model, &tree, &query).unwrap().unwrap();
            let expected = members
                .iter()
                .map(|&p| model.particle(p).unwrap().sphere().distance(&query))
                .fold(f64::INFINITY, f64::min);
            assert!((found.distance - expected).abs() < 1e-12);
            assert!(members.contains(&found.item));
        }
    }

    #[test]
    fn closest_pair_matches_a_linear_scan_after_rotation() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut model = Model::new();
        let refiner = model.register_refiner(Arc::new(RigidMembersRefiner));
        let a = scattered_body(&mut model, &mut rng, 70, Point3::origin());
        let b = scattered_body(&mut model, &mut rng, 90, Point3::new(14.0, 0.0, 0.0));
        let body_b = model.particle(b[0]).unwrap().rigid_body().unwrap();
        model
            .set_reference_frame(
                body_b,
                Isometry3::from_parts(
                    Translation3::new(-1.0, 2.0, 0.0),
                    UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.4),
                ),
            )
            .unwrap();
        let ta = tree_of(&model, refiner, &a);
        let tb = tree_of(&model, refiner, &b);

        let found = closest_pair(&model, &ta, &tb).unwrap().unwrap();
        let mut expected = f64::INFINITY;
        for &pa in &a {
            for &pb in &b {
                let d = model
                    .particle(pa)
                    .unwrap()
                    .sphere()
                    .distance(&model.particle(pb).unwrap().sphere());
                expected = expected.min(d);
            }
        }
        assert!((found.distance - expected).abs() < 1e-12);
        assert!(a.contains(&found.item.0));
        assert!(b.contains(&found.item.1));
    }
}
