//! taskspace: task-space residual stacking for robot motion optimization
//!
//! - `taskspace`: tagged task-space vectors and slice indexing
//! - `tasks`: the task-computation capability, registries, and the
//!   interaction-mesh task
//! - `stacks`: the three aggregator variants (single-pose, time-indexed,
//!   sampling-only)
//! - `kinematics`: the consumed kinematic-chain interface
//!
//! The crate is the data layer between a kinematic chain solver and an
//! optimizer or sampler: it turns provider output into one contiguous
//! residual/Jacobian buffer per problem, with per-task weighting and goal
//! bookkeeping. Buffers are sized once at initialization and only
//! overwritten afterwards; evaluation never allocates. Instances are
//! single-writer: callers running concurrent evaluations must use one
//! instance per context.

pub mod error;
pub mod kinematics;
pub mod stacks;
pub mod taskspace;
pub mod tasks;

pub use error::{ConfigurationError, Result};
pub use kinematics::{DerivativeOrder, KinematicsProvider, KinematicsSnapshot, Pose};
pub use stacks::{EndPoseStack, SamplingStack, TaskSpec, TimeIndexedStack};
pub use taskspace::{LieBlock, LieGroup, TaskIndexing, TaskVector};
pub use tasks::{
    InteractionMesh, InteractionMeshConfig, TaskCapabilities, TaskEntry, TaskFunction,
    TaskRegistry, TaskTable, TaskTypeRegistry,
};
