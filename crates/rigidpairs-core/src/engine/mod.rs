//! # Engine Module
//!
//! The close-pair engine: everything between "a model full of particles and
//! rigid bodies" and "the list of particle pairs a restraint should score".
//!
//! ## Architecture
//!
//! - **Partitioning** ([`partition`]) - Splits the particles of a rigid body into
//!   a bounding-sphere hierarchy
//! - **Sphere Trees** ([`tree`]) - The immutable per-body hierarchy, stored in the
//!   body's local frame
//! - **Tree Cache** ([`cache`]) - Model-owned cache of trees keyed by rigid body
//!   and refiner, rebuilt when a body's membership changes
//! - **Traversal** ([`traversal`]) - Dual-tree, tree-vs-point and brute-force
//!   kernels with sphere pruning
//! - **Nearest Queries** ([`nearest`]) - Best-first closest particle / closest
//!   pair searches over the same trees
//! - **Finder** ([`finder`]) - Groups inputs into rigid units and free particles
//!   and dispatches to the matching kernel
//! - **Containers** ([`containers`]) - Slack-amortized cached pair lists with
//!   movement tracking ([`moved`])
//! - **Configuration** ([`config`]) and **Error Handling** ([`error`])

pub mod cache;
pub mod config;
pub mod containers;
pub mod error;
pub mod finder;
pub(crate) mod moved;
pub mod nearest;
pub mod partition;
pub mod traversal;
pub mod tree;
