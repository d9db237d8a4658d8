use super::ids::{ParticleId, RefinerId, RigidBodyId};
use super::particle::{Particle, RigidMembership};
use super::rigid_body::RigidBody;
use crate::core::geometry::frame::to_local;
use crate::core::refiner::Refiner;
use crate::engine::cache::TreeCache;
use crate::engine::config::TreeParams;
use crate::engine::error::EngineError;
use crate::engine::tree::RigidBodySphereTree;
use nalgebra::{Isometry3, Point3};
use slotmap::{SecondaryMap, SlotMap};
use std::sync::Arc;

/// Owner of every particle, rigid body, bond and registered refiner.
///
/// All cross references are generational arena keys, so a handle to a removed
/// object is reported as missing instead of silently aliasing a new one. The
/// model also owns the [`TreeCache`]; cached trees are released together with
/// the rigid body (or the model) they index.
#[derive(Debug, Default)]
pub struct Model {
    particles: SlotMap<ParticleId, Particle>,
    rigid_bodies: SlotMap<RigidBodyId, RigidBody>,
    refiners: SlotMap<RefinerId, Arc<dyn Refiner>>,
    bond_adjacency: SecondaryMap<ParticleId, Vec<ParticleId>>,
    bond_generation: u64,
    trees: TreeCache,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a free particle at `position` with the given `radius`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidRadius`] if the radius is negative or not
    /// finite.
    pub fn add_particle(
        &mut self,
        position: Point3<f64>,
        radius: f64,
    ) -> Result<ParticleId, EngineError> {
        self.add_named_particle("", position, radius)
    }

    pub fn add_named_particle(
        &mut self,
        name: &str,
        position: Point3<f64>,
        radius: f64,
    ) -> Result<ParticleId, EngineError> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(EngineError::InvalidRadius { radius });
        }
        let id = self.particles.insert(Particle::new(name, position, radius));
        self.bond_adjacency.insert(id, Vec::new());
        Ok(id)
    }

    pub fn particle(&self, id: ParticleId) -> Option<&Particle> {
        self.particles.get(id)
    }

    pub fn particles_iter(&self) -> impl Iterator<Item = (ParticleId, &Particle)> {
        self.particles.iter()
    }

    pub fn contains_particle(&self, id: ParticleId) -> bool {
        self.particles.contains_key(id)
    }

    /// Removes a particle, detaching it from its rigid body and its bonds.
    pub fn remove_particle(&mut self, id: ParticleId) -> Option<Particle> {
        if let Some(body) = self.particles.get(id).and_then(Particle::rigid_body) {
            if let Some(rb) = self.rigid_bodies.get_mut(body) {
                rb.members.retain(|&m| m != id);
                rb.generation += 1;
            }
        }
        let neighbors = self.bond_adjacency.remove(id).unwrap_or_default();
        if !neighbors.is_empty() {
            self.bond_generation += 1;
        }
        for neighbor in neighbors {
            if let Some(adjacency) = self.bond_adjacency.get_mut(neighbor) {
                adjacency.retain(|&other| other != id);
            }
        }
        self.particles.remove(id)
    }

    /// Moves a free particle.
    ///
    /// # Errors
    ///
    /// Rigid members cannot be moved individually; their position follows the
    /// rigid body frame ([`EngineError::RigidMemberPosition`]).
    pub fn set_position(
        &mut self,
        id: ParticleId,
        position: Point3<f64>,
    ) -> Result<(), EngineError> {
        let particle = self
            .particles
            .get_mut(id)
            .ok_or(EngineError::ParticleNotFound(id))?;
        if particle.is_rigid_member() {
            return Err(EngineError::RigidMemberPosition(id));
        }
        particle.position = position;
        Ok(())
    }

    pub fn add_rigid_body(&mut self, frame: Isometry3<f64>) -> RigidBodyId {
        self.add_named_rigid_body("", frame)
    }

    pub fn add_named_rigid_body(&mut self, name: &str, frame: Isometry3<f64>) -> RigidBodyId {
        self.rigid_bodies.insert(RigidBody::new(name, frame))
    }

    pub fn rigid_body(&self, id: RigidBodyId) -> Option<&RigidBody> {
        self.rigid_bodies.get(id)
    }

    pub fn rigid_bodies_iter(&self) -> impl Iterator<Item = (RigidBodyId, &RigidBody)> {
        self.rigid_bodies.iter()
    }

    /// Current reference frame of a rigid body.
    pub fn reference_frame(&self, id: RigidBodyId) -> Result<&Isometry3<f64>, EngineError> {
        self.rigid_bodies
            .get(id)
            .map(RigidBody::reference_frame)
            .ok_or(EngineError::RigidBodyNotFound(id))
    }

    /// Adds `particle` to `body`, freezing its current world position as local
    /// coordinates in the body frame.
    pub fn add_rigid_member(
        &mut self,
        body: RigidBodyId,
        particle: ParticleId,
    ) -> Result<(), EngineError> {
        let rb = self
            .rigid_bodies
            .get_mut(body)
            .ok_or(EngineError::RigidBodyNotFound(body))?;
        let p = self
            .particles
            .get_mut(particle)
            .ok_or(EngineError::ParticleNotFound(particle))?;
        if let Some(existing) = p.rigid_body() {
            return Err(EngineError::AlreadyRigidMember {
                particle,
                body: existing,
            });
        }
        p.membership = Some(RigidMembership {
            body,
            local_position: to_local(&rb.frame, &p.position),
        });
        rb.members.push(particle);
        rb.generation += 1;
        Ok(())
    }

    /// Detaches `particle` from `body`; it keeps its current world position.
    pub fn remove_rigid_member(
        &mut self,
        body: RigidBodyId,
        particle: ParticleId,
    ) -> Result<(), EngineError> {
        let rb = self
            .rigid_bodies
            .get_mut(body)
            .ok_or(EngineError::RigidBodyNotFound(body))?;
        let p = self
            .particles
            .get_mut(particle)
            .ok_or(EngineError::ParticleNotFound(particle))?;
        if p.rigid_body() != Some(body) {
            return Err(EngineError::NotARigidMember { particle, body });
        }
        p.membership = None;
        rb.members.retain(|&m| m != particle);
        rb.generation += 1;
        Ok(())
    }

    /// Removes a rigid body. Its members become free particles and any sphere
    /// tree cached for it is released.
    pub fn remove_rigid_body(&mut self, id: RigidBodyId) -> Option<RigidBody> {
        let rb = self.rigid_bodies.remove(id)?;
        for &member in &rb.members {
            if let Some(p) = self.particles.get_mut(member) {
                p.membership = None;
            }
        }
        self.trees.release_body(id);
        Some(rb)
    }

    /// Moves a rigid body to `frame`, updating the world position of every member.
    pub fn set_reference_frame(
        &mut self,
        id: RigidBodyId,
        frame: Isometry3<f64>,
    ) -> Result<(), EngineError> {
        let rb = self
            .rigid_bodies
            .get_mut(id)
            .ok_or(EngineError::RigidBodyNotFound(id))?;
        rb.frame = frame;
        for &member in &rb.members {
            if let Some(p) = self.particles.get_mut(member) {
                if let Some(membership) = p.membership {
                    p.position = frame * membership.local_position;
                }
            }
        }
        Ok(())
    }

    /// Adds a bond between two particles. Adding an existing bond is a no-op.
    pub fn add_bond(&mut self, a: ParticleId, b: ParticleId) -> Result<(), EngineError> {
        if !self.particles.contains_key(a) {
            return Err(EngineError::ParticleNotFound(a));
        }
        if !self.particles.contains_key(b) {
            return Err(EngineError::ParticleNotFound(b));
        }
        if self.is_bonded(a, b) {
            return Ok(());
        }
        self.bond_adjacency[a].push(b);
        self.bond_adjacency[b].push(a);
        self.bond_generation += 1;
        Ok(())
    }

    pub fn is_bonded(&self, a: ParticleId, b: ParticleId) -> bool {
        self.bond_adjacency
            .get(a)
            .is_some_and(|neighbors| neighbors.contains(&b))
    }

    /// Bumped whenever a bond is added or removed.
    pub fn bond_generation(&self) -> u64 {
        self.bond_generation
    }

    pub fn bonded_neighbors(&self, id: ParticleId) -> Option<&[ParticleId]> {
        self.bond_adjacency.get(id).map(Vec::as_slice)
    }

    /// Registers a refiner and returns the key used to address its trees.
    pub fn register_refiner(&mut self, refiner: Arc<dyn Refiner>) -> RefinerId {
        self.refiners.insert(refiner)
    }

    pub fn refiner(&self, id: RefinerId) -> Option<&Arc<dyn Refiner>> {
        self.refiners.get(id)
    }

    /// Unregisters a refiner and drops every tree built with it.
    pub fn remove_refiner(&mut self, id: RefinerId) -> Option<Arc<dyn Refiner>> {
        let refiner = self.refiners.remove(id)?;
        self.trees.release_refiner(id);
        Some(refiner)
    }

    /// Returns the sphere tree of `body` under `refiner`, building it on first use
    /// and rebuilding it if the body's membership changed since it was cached.
    pub fn rigid_body_tree(
        &self,
        body: RigidBodyId,
        refiner: RefinerId,
        params: &TreeParams,
    ) -> Result<Arc<RigidBodySphereTree>, EngineError> {
        self.trees.get_or_build(self, body, refiner, params)
    }

    pub fn tree_cache(&self) -> &TreeCache {
        &self.trees
    }
}
