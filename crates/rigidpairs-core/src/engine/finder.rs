use super::config::{FinderConfig, FinderMode};
use super::error::EngineError;
use super::traversal::{
    brute_force_bipartite_pairs, brute_force_pairs, close_pairs_between_trees,
    close_pairs_tree_point, close_pairs_within_tree, kd_tree_bipartite_pairs, kd_tree_pairs,
};
use super::tree::RigidBodySphereTree;
use crate::core::filters::{FilterChain, PairPredicate};
use crate::core::models::ids::{ParticleId, ParticlePair, RefinerId, RigidBodyId};
use crate::core::models::model::Model;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// The input particles of one rigid body together with that body's tree.
struct BodyUnit {
    tree: Arc<RigidBodySphereTree>,
    members: HashSet<ParticleId>,
}

impl BodyUnit {
    #[inline]
    fn owns(&self, particle: ParticleId) -> bool {
        self.members.contains(&particle)
    }
}

/// Input particles split into rigid-body units and free particles. Every input
/// particle belongs to exactly one of them.
struct Grouping {
    bodies: Vec<BodyUnit>,
    free: Vec<ParticleId>,
}

fn dedup(particles: &[ParticleId]) -> Vec<ParticleId> {
    let mut seen = HashSet::with_capacity(particles.len());
    particles
        .iter()
        .copied()
        .filter(|p| seen.insert(*p))
        .collect()
}

/// Finds the pairs of particles whose surfaces are within a distance of each
/// other.
///
/// Rigid members are searched through their body's sphere tree, free particles
/// through a kd-tree, and small inputs go brute force (see [`FinderMode`]).
/// Every mode returns the same pair set; a pair is reported only if both
/// particles are part of the input and no filter rejects it. Output order is
/// unspecified.
#[derive(Debug, Clone)]
pub struct ClosePairsFinder {
    config: FinderConfig,
    filters: FilterChain,
    refiner: RefinerId,
}

impl ClosePairsFinder {
    /// A finder that builds rigid-body trees over the particles `refiner`
    /// yields. `config` is validated on every query; an invalid one makes the
    /// query fail with [`EngineError::InvalidConfig`].
    pub fn new(config: FinderConfig, refiner: RefinerId) -> Self {
        Self {
            config,
            filters: FilterChain::new(),
            refiner,
        }
    }

    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }

    pub fn add_filter(&mut self, filter: Arc<dyn PairPredicate>) {
        self.filters.push(filter);
    }

    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    pub fn refiner(&self) -> RefinerId {
        self.refiner
    }

    pub fn set_distance(&mut self, distance: f64) {
        self.config.distance = distance;
    }

    /// Unordered close pairs among `particles`.
    pub fn close_pairs(
        &self,
        model: &Model,
        particles: &[ParticleId],
    ) -> Result<Vec<ParticlePair>, EngineError> {
        self.close_pairs_at(model, particles, self.config.distance)
    }

    /// Close pairs `(a, b)` with `a` from `first` and `b` from `second`.
    pub fn close_bipartite_pairs(
        &self,
        model: &Model,
        first: &[ParticleId],
        second: &[ParticleId],
    ) -> Result<Vec<ParticlePair>, EngineError> {
        self.close_bipartite_pairs_at(model, first, second, self.config.distance)
    }

    fn use_brute_force(&self, total: usize) -> bool {
        match self.config.mode {
            FinderMode::BruteForce => true,
            FinderMode::Tree => false,
            FinderMode::Auto => total <= self.config.brute_force_threshold,
        }
    }

    fn keep(&self, model: &Model, pair: &ParticlePair) -> bool {
        !self.filters.rejects(model, pair.0, pair.1)
    }

    pub(crate) fn close_pairs_at(
        &self,
        model: &Model,
        particles: &[ParticleId],
        distance: f64,
    ) -> Result<Vec<ParticlePair>, EngineError> {
        self.config.validate()?;
        let particles = dedup(particles);
        if self.use_brute_force(particles.len()) {
            let mut pairs = brute_force_pairs(model, &particles, distance)?;
            pairs.retain(|pair| self.keep(model, pair));
            return Ok(pairs);
        }

        let grouping = self.group(model, &particles)?;
        let skip_intra_body = self.filters.rejects_same_rigid_body();
        let mut pairs = Vec::new();
        let mut push = |a: ParticleId, b: ParticleId| pairs.push((a, b));

        for (i, unit) in grouping.bodies.iter().enumerate() {
            if !skip_intra_body {
                close_pairs_within_tree(model, &unit.tree, distance, &mut |a, b| {
                    if unit.owns(a) && unit.owns(b) {
                        push(a, b);
                    }
                })?;
            }
            for other in &grouping.bodies[i + 1..] {
                close_pairs_between_trees(model, &unit.tree, &other.tree, distance, &mut |a, b| {
                    if unit.owns(a) && other.owns(b) {
                        push(a, b);
                    }
                })?;
            }
            for &point in &grouping.free {
                close_pairs_tree_point(model, &unit.tree, point, distance, &mut |a, b| {
                    if unit.owns(a) {
                        push(a, b);
                    }
                })?;
            }
        }
        pairs.extend(kd_tree_pairs(model, &grouping.free, distance)?);
        pairs.retain(|pair| self.keep(model, pair));

        debug!(
            particles = particles.len(),
            bodies = grouping.bodies.len(),
            free = grouping.free.len(),
            pairs = pairs.len(),
            "Tree close-pair search finished."
        );
        Ok(pairs)
    }

    pub(crate) fn close_bipartite_pairs_at(
        &self,
        model: &Model,
        first: &[ParticleId],
        second: &[ParticleId],
        distance: f64,
    ) -> Result<Vec<ParticlePair>, EngineError> {
        self.config.validate()?;
        let first = dedup(first);
        let second = dedup(second);
        if self.use_brute_force(first.len() + second.len()) {
            let mut pairs = brute_force_bipartite_pairs(model, &first, &second, distance)?;
            pairs.retain(|pair| self.keep(model, pair));
            return Ok(pairs);
        }

        let group_a = self.group(model, &first)?;
        let group_b = self.group(model, &second)?;
        let skip_intra_body = self.filters.rejects_same_rigid_body();
        let mut pairs = Vec::new();
        let mut push = |a: ParticleId, b: ParticleId| pairs.push((a, b));

        for unit_a in &group_a.bodies {
            for unit_b in &group_b.bodies {
                if unit_a.tree.body() == unit_b.tree.body() {
                    if skip_intra_body {
                        continue;
                    }
                    close_pairs_within_tree(model, &unit_a.tree, distance, &mut |p, q| {
                        if unit_a.owns(p) && unit_b.owns(q) {
                            push(p, q);
                        }
                        if unit_a.owns(q) && unit_b.owns(p) {
                            push(q, p);
                        }
                    })?;
                } else {
                    close_pairs_between_trees(
                        model,
                        &unit_a.tree,
                        &unit_b.tree,
                        distance,
                        &mut |a, b| {
                            if unit_a.owns(a) && unit_b.owns(b) {
                                push(a, b);
                            }
                        },
                    )?;
                }
            }
            for &point in &group_b.free {
                close_pairs_tree_point(model, &unit_a.tree, point, distance, &mut |a, b| {
                    if unit_a.owns(a) {
                        push(a, b);
                    }
                })?;
            }
        }
        for unit_b in &group_b.bodies {
            for &point in &group_a.free {
                close_pairs_tree_point(model, &unit_b.tree, point, distance, &mut |b, a| {
                    if unit_b.owns(b) {
                        push(a, b);
                    }
                })?;
            }
        }
        pairs.extend(kd_tree_bipartite_pairs(
            model,
            &group_a.free,
            &group_b.free,
            distance,
        )?);
        pairs.retain(|pair| self.keep(model, pair));

        debug!(
            first = first.len(),
            second = second.len(),
            pairs = pairs.len(),
            "Tree bipartite close-pair search finished."
        );
        Ok(pairs)
    }

    /// Splits `particles` into rigid-body units and free particles.
    ///
    /// A rigid member the refiner does not put in its body's tree is handled as
    /// a free particle, so every input particle is searched exactly once.
    fn group(&self, model: &Model, particles: &[ParticleId]) -> Result<Grouping, EngineError> {
        let mut by_body: Vec<(RigidBodyId, Vec<ParticleId>)> = Vec::new();
        let mut slot: HashMap<RigidBodyId, usize> = HashMap::new();
        let mut free = Vec::new();

        for &id in particles {
            let particle = model
                .particle(id)
                .ok_or(EngineError::ParticleNotFound(id))?;
            match particle.rigid_body() {
                Some(body) => {
                    let index = *slot.entry(body).or_insert_with(|| {
                        by_body.push((body, Vec::new()));
                        by_body.len() - 1
                    });
                    by_body[index].1.push(id);
                }
                None => free.push(id),
            }
        }

        let mut bodies = Vec::with_capacity(by_body.len());
        for (body, members) in by_body {
            let tree = match model.rigid_body_tree(body, self.refiner, &self.config.tree) {
                Ok(tree) => tree,
                Err(EngineError::EmptyRigidBody { .. }) => {
                    free.extend(members);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let covered: HashSet<ParticleId> =
                tree.particles(model, tree.root())?.into_iter().collect();
            let (inside, outside): (Vec<_>, Vec<_>) =
                members.into_iter().partition(|p| covered.contains(p));
            free.extend(outside);
            if !inside.is_empty() {
                bodies.push(BodyUnit {
                    tree,
                    members: inside.into_iter().collect(),
                });
            }
        }

        Ok(Grouping { bodies, free })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filters::{BondedPairFilter, FnPairFilter, SameRigidBodyFilter};
    use crate::core::models::ids::canonical_pair;
    use crate::core::refiner::{RigidMembersRefiner, TableRefiner};
    use crate::engine::config::{DEFAULT_BRUTE_FORCE_THRESHOLD, FinderConfigBuilder};
    use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn as_set(pairs: &[ParticlePair]) -> HashSet<ParticlePair> {
        pairs.iter().map(|&(a, b)| canonical_pair(a, b)).collect()
    }

    fn finder(model: &mut Model, distance: f64, mode: FinderMode) -> ClosePairsFinder {
        let refiner = model.register_refiner(Arc::new(RigidMembersRefiner));
        let config = FinderConfigBuilder::new()
            .distance(distance)
            .mode(mode)
            .build()
            .unwrap();
        ClosePairsFinder::new(config, refiner)
    }

    /// Three rigid bodies plus free particles scattered in a 15^3 box.
    fn mixed_model(seed: u64) -> (Model, Vec<ParticleId>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut model = Model::new();
        let mut all = Vec::new();
        for _ in 0..3 {
            let body = model.add_rigid_body(Isometry3::identity());
            for _ in 0..40 {
                let p = Point3::new(
                    rng.gen_range(0.0..15.0),
                    rng.gen_range(0.0..15.0),
                    rng.gen_range(0.0..15.0),
                );
                let id = model.add_particle(p, rng.gen_range(0.2..0.6)).unwrap();
                model.add_rigid_member(body, id).unwrap();
                all.push(id);
            }
        }
        for _ in 0..50 {
            let p = Point3::new(
                rng.gen_range(0.0..15.0),
                rng.gen_range(0.0..15.0),
                rng.gen_range(0.0..15.0),
            );
            all.push(model.add_particle(p, rng.gen_range(0.2..0.6)).unwrap());
        }
        let bodies: Vec<_> = model.rigid_bodies_iter().map(|(id, _)| id).collect();
        for (k, body) in bodies.into_iter().enumerate() {
            let frame = Isometry3::from_parts(
                Translation3::new(k as f64, -(k as f64), 0.5),
                UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.3 * k as f64),
            );
            model.set_reference_frame(body, frame).unwrap();
        }
        (model, all)
    }

    #[test]
    fn tree_mode_matches_brute_force_on_mixed_input() {
        let (mut model, all) = mixed_model(1);
        let tree = finder(&mut model, 0.8, FinderMode::Tree);
        let brute = finder(&mut model, 0.8, FinderMode::BruteForce);

        let from_tree = tree.close_pairs(&model, &all).unwrap();
        let from_brute = brute.close_pairs(&model, &all).unwrap();
        assert_eq!(from_tree.len(), from_brute.len(), "tree mode emitted duplicates");
        assert_eq!(as_set(&from_tree), as_set(&from_brute));
        assert!(!from_brute.is_empty());
    }

    #[test]
    fn subsets_only_report_input_particles() {
        let (mut model, all) = mixed_model(2);
        let tree = finder(&mut model, 1.0, FinderMode::Tree);
        let subset: Vec<_> = all.iter().copied().step_by(3).collect();
        let allowed: HashSet<_> = subset.iter().copied().collect();

        let pairs = tree.close_pairs(&model, &subset).unwrap();
        assert!(pairs.iter().all(|(a, b)| allowed.contains(a) && allowed.contains(b)));
        let brute = finder(&mut model, 1.0, FinderMode::BruteForce);
        assert_eq!(as_set(&pairs), as_set(&brute.close_pairs(&model, &subset).unwrap()));
    }

    #[test]
    fn bipartite_tree_mode_matches_brute_force() {
        let (mut model, all) = mixed_model(3);
        let tree = finder(&mut model, 0.9, FinderMode::Tree);
        let brute = finder(&mut model, 0.9, FinderMode::BruteForce);
        let first: Vec<_> = all.iter().copied().step_by(2).collect();
        let second: Vec<_> = all.iter().copied().skip(1).step_by(2).collect();

        let from_tree = tree.close_bipartite_pairs(&model, &first, &second).unwrap();
        let from_brute = brute.close_bipartite_pairs(&model, &first, &second).unwrap();
        let a: HashSet<_> = first.iter().copied().collect();
        let b: HashSet<_> = second.iter().copied().collect();
        assert!(from_tree.iter().all(|(x, y)| a.contains(x) && b.contains(y)));
        assert_eq!(
            from_tree.iter().copied().collect::<HashSet<_>>(),
            from_brute.iter().copied().collect::<HashSet<_>>()
        );
        assert_eq!(from_tree.len(), from_brute.len());
    }

    #[test]
    fn filters_apply_in_every_mode() {
        let (mut model, all) = mixed_model(4);
        for w in all.chunks(2) {
            model.add_bond(w[0], w[1]).unwrap();
        }
        let chain = FilterChain::new()
            .with(Arc::new(BondedPairFilter))
            .with(Arc::new(SameRigidBodyFilter));
        for mode in [FinderMode::Tree, FinderMode::BruteForce] {
            let f = finder(&mut model, 1.5, mode).with_filters(chain.clone());
            let pairs = f.close_pairs(&model, &all).unwrap();
            assert!(!pairs.is_empty());
            for (a, b) in pairs {
                assert!(!model.is_bonded(a, b));
                let ba = model.particle(a).unwrap().rigid_body();
                let bb = model.particle(b).unwrap().rigid_body();
                assert!(ba.is_none() || ba != bb);
            }
        }
    }

    #[test]
    fn auto_mode_switches_at_the_threshold() {
        let mut model = Model::new();
        let f = finder(&mut model, 1.0, FinderMode::Auto);
        assert!(f.use_brute_force(DEFAULT_BRUTE_FORCE_THRESHOLD));
        assert!(!f.use_brute_force(DEFAULT_BRUTE_FORCE_THRESHOLD + 1));
    }

    #[test]
    fn invalid_tree_params_fail_instead_of_missing_pairs() {
        let mut model = Model::new();
        let body = model.add_rigid_body(Isometry3::identity());
        let mut ids: Vec<_> = (0..40)
            .map(|i| {
                let id = model
                    .add_particle(Point3::new(i as f64, 0.0, 0.0), 0.2)
                    .unwrap();
                model.add_rigid_member(body, id).unwrap();
                id
            })
            .collect();
        ids.push(model.add_particle(Point3::new(39.5, 0.0, 0.0), 0.2).unwrap());

        let mut f = finder(&mut model, 0.6, FinderMode::Tree);
        f.config.tree.expansion = 0.5;
        assert!(matches!(
            f.close_pairs(&model, &ids),
            Err(EngineError::InvalidConfig(_))
        ));
        assert!(f.close_bipartite_pairs(&model, &ids[..40], &ids[40..]).is_err());

        f.config.tree.expansion = 1.0;
        f.config.distance = f64::NAN;
        assert!(f.close_pairs(&model, &ids).is_err());
    }

    #[test]
    fn duplicate_inputs_do_not_duplicate_pairs() {
        let mut model = Model::new();
        let a = model.add_particle(Point3::origin(), 0.5).unwrap();
        let b = model.add_particle(Point3::new(1.2, 0.0, 0.0), 0.5).unwrap();
        for mode in [FinderMode::Tree, FinderMode::BruteForce] {
            let f = finder(&mut model, 0.5, mode);
            assert_eq!(f.close_pairs(&model, &[a, b, a, b]).unwrap().len(), 1);
        }
    }

    #[test]
    fn members_outside_the_refined_set_are_searched_as_free_particles() {
        let mut model = Model::new();
        let body = model.add_rigid_body(Isometry3::identity());
        let listed = model.add_particle(Point3::origin(), 0.5).unwrap();
        let unlisted = model.add_particle(Point3::new(1.5, 0.0, 0.0), 0.5).unwrap();
        model.add_rigid_member(body, listed).unwrap();
        model.add_rigid_member(body, unlisted).unwrap();
        let other = model.add_particle(Point3::new(3.0, 0.0, 0.0), 0.5).unwrap();

        let table = TableRefiner::new("partial").with_entry(body, vec![listed]);
        let refiner = model.register_refiner(Arc::new(table));
        let config = FinderConfigBuilder::new()
            .distance(0.6)
            .mode(FinderMode::Tree)
            .build()
            .unwrap();
        let f = ClosePairsFinder::new(config, refiner);
        let pairs = f.close_pairs(&model, &[listed, unlisted, other]).unwrap();
        assert_eq!(
            as_set(&pairs),
            as_set(&[(listed, unlisted), (unlisted, other)])
        );
    }

    #[test]
    fn repeated_refiner_entries_do_not_duplicate_pairs() {
        let mut model = Model::new();
        let body = model.add_rigid_body(Isometry3::identity());
        let a = model.add_particle(Point3::origin(), 0.5).unwrap();
        let b = model.add_particle(Point3::new(1.2, 0.0, 0.0), 0.5).unwrap();
        model.add_rigid_member(body, a).unwrap();
        model.add_rigid_member(body, b).unwrap();
        let other = model.add_particle(Point3::new(-1.2, 0.0, 0.0), 0.5).unwrap();

        let table = TableRefiner::new("dup").with_entry(body, vec![a, b, a]);
        let refiner = model.register_refiner(Arc::new(table));
        let pairs_in = |mode| {
            let config = FinderConfigBuilder::new()
                .distance(0.5)
                .mode(mode)
                .build()
                .unwrap();
            ClosePairsFinder::new(config, refiner)
                .close_pairs(&model, &[a, b, other])
                .unwrap()
        };
        let from_tree = pairs_in(FinderMode::Tree);
        assert_eq!(from_tree.len(), 2);
        assert_eq!(as_set(&from_tree), as_set(&pairs_in(FinderMode::BruteForce)));
    }

    #[test]
    fn closure_filters_see_every_candidate() {
        let mut model = Model::new();
        let ids: Vec<_> = (0..5)
            .map(|i| model.add_particle(Point3::new(i as f64, 0.0, 0.0), 0.5).unwrap())
            .collect();
        let banned = ids[2];
        let mut f = finder(&mut model, 0.1, FinderMode::Tree);
        f.add_filter(Arc::new(FnPairFilter::new("ban", move |_, a, b| {
            a == banned || b == banned
        })));
        let pairs = f.close_pairs(&model, &ids).unwrap();
        assert_eq!(as_set(&pairs), as_set(&[(ids[0], ids[1]), (ids[3], ids[4])]));
    }
}
