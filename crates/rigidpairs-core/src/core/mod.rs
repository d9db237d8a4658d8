//! # Core Module
//!
//! Fundamental building blocks shared by every part of the pair-finding engine.
//!
//! ## Overview
//!
//! - **Geometry** ([`geometry`]) - Spheres, principal component analysis and rigid
//!   frame helpers
//! - **Particle Store** ([`models`]) - Particles, rigid bodies, bonds and the
//!   [`models::model::Model`] arena that owns them
//! - **Refinement** ([`refiner`]) - Expanding a rigid body into its leaf particles
//! - **Filtering** ([`filters`]) - Predicates that suppress candidate pairs
//!
//! Nothing in this module knows about trees or caches; it only describes the
//! world the engine indexes.

pub mod filters;
pub mod geometry;
pub mod models;
pub mod refiner;
