//! Geometric primitives used by the partitioner and the traversal kernels.

pub mod frame;
pub mod pca;
pub mod sphere;
