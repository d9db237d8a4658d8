use super::config::ConfigError;
use super::tree::NodeIndex;
use crate::core::models::ids::{ParticleId, RefinerId, RigidBodyId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("Particle {0:?} not found in the model")]
    ParticleNotFound(ParticleId),

    #[error("Rigid body {0:?} not found in the model")]
    RigidBodyNotFound(RigidBodyId),

    #[error("Refiner {0:?} is not registered with the model")]
    RefinerNotFound(RefinerId),

    #[error("Radius must be finite and non-negative, got {radius}")]
    InvalidRadius { radius: f64 },

    #[error("Refiner '{refiner}' cannot produce any particles for rigid body {body:?}")]
    EmptyRigidBody { body: RigidBodyId, refiner: String },

    #[error("Node {node} is not a leaf; only leaves hold particles")]
    NotALeaf { node: NodeIndex },

    #[error("Particle index {index} out of range for node {node} holding {len} particles")]
    ParticleIndexOutOfRange {
        node: NodeIndex,
        index: usize,
        len: usize,
    },

    #[error("Refiner '{refiner}' has no particle {index} for rigid body {body:?}")]
    RefinedIndexOutOfRange {
        body: RigidBodyId,
        refiner: String,
        index: usize,
    },

    #[error("Particle {0:?} is a rigid member; move its rigid body instead")]
    RigidMemberPosition(ParticleId),

    #[error("Particle {particle:?} already belongs to rigid body {body:?}")]
    AlreadyRigidMember {
        particle: ParticleId,
        body: RigidBodyId,
    },

    #[error("Particle {particle:?} is not a member of rigid body {body:?}")]
    NotARigidMember {
        particle: ParticleId,
        body: RigidBodyId,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}
