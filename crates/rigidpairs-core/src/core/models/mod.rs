//! # Core Models Module
//!
//! The minimal particle store the pair-finding engine indexes.
//!
//! ## Key Components
//!
//! - [`ids`] - Generational arena keys for particles, rigid bodies and refiners
//! - [`particle`] - A sphere-shaped particle, optionally a member of a rigid body
//! - [`rigid_body`] - A rigid body: a reference frame plus its member particles
//! - [`model`] - The [`model::Model`] arena owning everything above, plus bonds
//!   and the sphere-tree cache
//!
//! ## Usage
//!
//! ```ignore
//! use rigidpairs::core::models::model::Model;
//! use nalgebra::{Isometry3, Point3};
//!
//! let mut model = Model::new();
//! let body = model.add_rigid_body(Isometry3::identity());
//! let p = model.add_particle(Point3::new(1.0, 0.0, 0.0), 0.5)?;
//! model.add_rigid_member(body, p)?;
//! ```

pub mod ids;
pub mod model;
pub mod particle;
pub mod rigid_body;
