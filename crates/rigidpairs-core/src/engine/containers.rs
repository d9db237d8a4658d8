//! # Cached close-pair containers
//!
//! Restraints query the close pairs of the same particles on every evaluation
//! while the particles barely move between evaluations. A container searches
//! once with the query distance inflated by `2 * slack`, then keeps returning
//! that list until some tracked particle may have moved farther than `slack`.
//! As long as the cache is [`CacheState::Valid`] it is a superset of the pairs
//! that are actually within the query distance:
//!
//! - two particles that each moved at most `slack` changed their distance by at
//!   most `2 * slack`, so every pair now within `distance` was within
//!   `distance + 2 * slack` when the list was built;
//! - the cache goes stale on any membership or bond change, on
//!   `clear_caches()`, or as soon as the tracked movement bound exceeds `slack`.
//!
//! [`ClosePairContainer::get_close_pairs`] drops the extra candidates for callers
//! that need the exact set.

use super::config::ConfigError;
use super::error::EngineError;
use super::finder::ClosePairsFinder;
use super::moved::MovementSnapshot;
use crate::core::filters::PairPredicate;
use crate::core::models::ids::{ParticleId, ParticlePair};
use crate::core::models::model::Model;
use std::sync::Arc;
use tracing::{info, instrument, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheState {
    Valid,
    #[default]
    Stale,
}

fn validate_slack(slack: f64) -> Result<(), ConfigError> {
    if slack.is_finite() && slack >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name: "slack",
            reason: format!("must be finite and non-negative, got {slack}"),
        })
    }
}

fn within_distance(model: &Model, pair: &ParticlePair, distance: f64) -> bool {
    match (model.particle(pair.0), model.particle(pair.1)) {
        (Some(a), Some(b)) => a.sphere().distance(&b.sphere()) <= distance,
        _ => false,
    }
}

/// Shared bookkeeping of both container kinds.
#[derive(Debug)]
struct PairCache {
    finder: ClosePairsFinder,
    slack: f64,
    state: CacheState,
    pairs: Vec<ParticlePair>,
    snapshot: MovementSnapshot,
    rebuilds: usize,
}

impl PairCache {
    fn new(finder: ClosePairsFinder) -> Self {
        let slack = finder.config().slack;
        Self {
            finder,
            slack,
            state: CacheState::Stale,
            pairs: Vec::new(),
            snapshot: MovementSnapshot::default(),
            rebuilds: 0,
        }
    }

    fn invalidate(&mut self) {
        self.state = CacheState::Stale;
    }

    fn refresh_state(&mut self, model: &Model) -> CacheState {
        if self.state == CacheState::Valid && self.snapshot.exceeds(model, self.slack) {
            trace!(slack = self.slack, "Tracked particles moved beyond slack.");
            self.state = CacheState::Stale;
        }
        self.state
    }

    fn build_distance(&self) -> f64 {
        self.finder.config().distance + 2.0 * self.slack
    }

    fn store<'a, I>(
        &mut self,
        model: &Model,
        pairs: Vec<ParticlePair>,
        tracked: I,
    ) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = &'a ParticleId>,
    {
        self.snapshot = MovementSnapshot::capture(model, tracked)?;
        self.pairs = pairs;
        self.state = CacheState::Valid;
        self.rebuilds += 1;
        Ok(())
    }

    fn exact(&self, model: &Model) -> Vec<ParticlePair> {
        let distance = self.finder.config().distance;
        let filters = self.finder.filters();
        self.pairs
            .iter()
            .copied()
            .filter(|pair| within_distance(model, pair, distance))
            .filter(|&(a, b)| !filters.rejects(model, a, b))
            .collect()
    }
}

fn add_unique(list: &mut Vec<ParticleId>, particle: ParticleId) -> bool {
    if list.contains(&particle) {
        false
    } else {
        list.push(particle);
        true
    }
}

fn remove_all(list: &mut Vec<ParticleId>, particle: ParticleId) -> bool {
    let before = list.len();
    list.retain(|&p| p != particle);
    list.len() != before
}

/// Cached close pairs among one particle list.
#[derive(Debug)]
pub struct ClosePairContainer {
    particles: Vec<ParticleId>,
    cache: PairCache,
}

impl ClosePairContainer {
    /// A container over `particles` using the finder's distance and slack.
    pub fn new(particles: Vec<ParticleId>, finder: ClosePairsFinder) -> Self {
        let mut particles = particles;
        let mut seen = std::collections::HashSet::new();
        particles.retain(|p| seen.insert(*p));
        Self {
            particles,
            cache: PairCache::new(finder),
        }
    }

    pub fn particles(&self) -> &[ParticleId] {
        &self.particles
    }

    pub fn finder(&self) -> &ClosePairsFinder {
        &self.cache.finder
    }

    pub fn distance(&self) -> f64 {
        self.cache.finder.config().distance
    }

    pub fn slack(&self) -> f64 {
        self.cache.slack
    }

    /// State as of the last check; see [`Self::check`].
    pub fn state(&self) -> CacheState {
        self.cache.state
    }

    pub fn number_of_rebuilds(&self) -> usize {
        self.cache.rebuilds
    }

    pub fn set_slack(&mut self, slack: f64) -> Result<(), ConfigError> {
        validate_slack(slack)?;
        self.cache.slack = slack;
        self.cache.invalidate();
        Ok(())
    }

    pub fn set_distance(&mut self, distance: f64) {
        self.cache.finder.set_distance(distance);
        self.cache.invalidate();
    }

    pub fn add_filter(&mut self, filter: Arc<dyn PairPredicate>) {
        self.cache.finder.add_filter(filter);
        self.cache.invalidate();
    }

    pub fn add_particle(&mut self, particle: ParticleId) {
        if add_unique(&mut self.particles, particle) {
            self.cache.invalidate();
        }
    }

    pub fn remove_particle(&mut self, particle: ParticleId) {
        if remove_all(&mut self.particles, particle) {
            self.cache.invalidate();
        }
    }

    pub fn clear_caches(&mut self) {
        self.cache.invalidate();
    }

    /// Marks the cache stale if the model changed in a way the cached list may
    /// not cover, and returns the resulting state.
    pub fn check(&mut self, model: &Model) -> CacheState {
        self.cache.refresh_state(model)
    }

    /// Rebuilds the cached list if it is stale.
    #[instrument(skip_all, name = "close_pair_container")]
    pub fn ensure_valid(&mut self, model: &Model) -> Result<(), EngineError> {
        if self.check(model) == CacheState::Valid {
            return Ok(());
        }
        let distance = self.cache.build_distance();
        let pairs = self
            .cache
            .finder
            .close_pairs_at(model, &self.particles, distance)?;
        self.cache.store(model, pairs, &self.particles)?;
        info!(
            particles = self.particles.len(),
            pairs = self.cache.pairs.len(),
            distance,
            rebuilds = self.cache.rebuilds,
            "Rebuilt close-pair list."
        );
        Ok(())
    }

    /// Candidate pairs: every pair within the query distance, possibly plus
    /// pairs within `distance + 2 * slack`.
    pub fn get_pairs(&mut self, model: &Model) -> Result<&[ParticlePair], EngineError> {
        self.ensure_valid(model)?;
        Ok(&self.cache.pairs)
    }

    /// Exactly the pairs within the query distance that no filter rejects.
    pub fn get_close_pairs(&mut self, model: &Model) -> Result<Vec<ParticlePair>, EngineError> {
        self.ensure_valid(model)?;
        Ok(self.cache.exact(model))
    }

    /// The cached list as it is, without checking for staleness.
    pub fn cached_pairs(&self) -> &[ParticlePair] {
        &self.cache.pairs
    }
}

/// Cached close pairs `(a, b)` with `a` from a first and `b` from a second list.
#[derive(Debug)]
pub struct CloseBipartitePairContainer {
    first: Vec<ParticleId>,
    second: Vec<ParticleId>,
    cache: PairCache,
}

impl CloseBipartitePairContainer {
    pub fn new(first: Vec<ParticleId>, second: Vec<ParticleId>, finder: ClosePairsFinder) -> Self {
        let mut container = Self {
            first: Vec::with_capacity(first.len()),
            second: Vec::with_capacity(second.len()),
            cache: PairCache::new(finder),
        };
        for p in first {
            add_unique(&mut container.first, p);
        }
        for p in second {
            add_unique(&mut container.second, p);
        }
        container
    }

    pub fn first(&self) -> &[ParticleId] {
        &self.first
    }

    pub fn second(&self) -> &[ParticleId] {
        &self.second
    }

    pub fn finder(&self) -> &ClosePairsFinder {
        &self.cache.finder
    }

    pub fn distance(&self) -> f64 {
        self.cache.finder.config().distance
    }

    pub fn slack(&self) -> f64 {
        self.cache.slack
    }

    pub fn state(&self) -> CacheState {
        self.cache.state
    }

    pub fn number_of_rebuilds(&self) -> usize {
        self.cache.rebuilds
    }

    pub fn set_slack(&mut self, slack: f64) -> Result<(), ConfigError> {
        validate_slack(slack)?;
        self.cache.slack = slack;
        self.cache.invalidate();
        Ok(())
    }

    pub fn set_distance(&mut self, distance: f64) {
        self.cache.finder.set_distance(distance);
        self.cache.invalidate();
    }

    pub fn add_filter(&mut self, filter: Arc<dyn PairPredicate>) {
        self.cache.finder.add_filter(filter);
        self.cache.invalidate();
    }

    pub fn add_first(&mut self, particle: ParticleId) {
        if add_unique(&mut self.first, particle) {
            self.cache.invalidate();
        }
    }

    pub fn add_second(&mut self, particle: ParticleId) {
        if add_unique(&mut self.second, particle) {
            self.cache.invalidate();
        }
    }

    pub fn remove_first(&mut self, particle: ParticleId) {
        if remove_all(&mut self.first, particle) {
            self.cache.invalidate();
        }
    }

    pub fn remove_second(&mut self, particle: ParticleId) {
        if remove_all(&mut self.second, particle) {
            self.cache.invalidate();
        }
    }

    pub fn clear_caches(&mut self) {
        self.cache.invalidate();
    }

    pub fn check(&mut self, model: &Model) -> CacheState {
        self.cache.refresh_state(model)
    }

    #[instrument(skip_all, name = "close_bipartite_pair_container")]
    pub fn ensure_valid(&mut self, model: &Model) -> Result<(), EngineError> {
        if self.check(model) == CacheState::Valid {
            return Ok(());
        }
        let distance = self.cache.build_distance();
        let pairs =
            self.cache
                .finder
                .close_bipartite_pairs_at(model, &self.first, &self.second, distance)?;
        self.cache
            .store(model, pairs, self.first.iter().chain(&self.second))?;
        info!(
            first = self.first.len(),
            second = self.second.len(),
            pairs = self.cache.pairs.len(),
            distance,
            rebuilds = self.cache.rebuilds,
            "Rebuilt bipartite close-pair list."
        );
        Ok(())
    }

    pub fn get_pairs(&mut self, model: &Model) -> Result<&[ParticlePair], EngineError> {
        self.ensure_valid(model)?;
        Ok(&self.cache.pairs)
    }

    pub fn get_close_pairs(&mut self, model: &Model) -> Result<Vec<ParticlePair>, EngineError> {
        self.ensure_valid(model)?;
        Ok(self.cache.exact(model))
    }

    pub fn cached_pairs(&self) -> &[ParticlePair] {
        &self.cache.pairs
    }
}
