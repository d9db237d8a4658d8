//! # rigidpairs Core Library
//!
//! Rigid-body spatial hierarchies and nonbonded close-pair finding for molecular
//! modeling. Given particles with radii, some of them grouped into rigid bodies,
//! the library answers "which pairs are within distance D of each other" as the
//! bodies move during simulation or optimization.
//!
//! ## Architectural Philosophy
//!
//! The library is split into two layers:
//!
//! - **[`core`]: The Foundation.** Geometry value types (`Sphere`, principal
//!   components), the arena-backed particle store (`Model`), and the collaborator
//!   traits the engine consumes: refiners and pair filters.
//!
//! - **[`engine`]: The Logic Core.** The spatial partitioner, the per-rigid-body
//!   sphere tree and its cache, the traversal kernels, the close-pairs finder and
//!   the slack-amortized pair containers that restraint code queries on every
//!   evaluation.

pub mod core;
pub mod engine;
