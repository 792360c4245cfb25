//! Task-space data model: tagged vectors and slice indexing.

pub mod indexing;
pub mod vector;

pub use indexing::{partition, TaskIndexing};
pub use vector::{LieBlock, LieGroup, TaskVector};
