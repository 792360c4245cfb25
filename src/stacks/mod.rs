//! Task-space stacks: resolve a configured task list, assign each task a
//! contiguous slice of shared buffers, and reduce provider output into
//! goal-referenced residuals.

pub mod end_pose;
pub mod layout;
pub mod sampling;
pub mod time_indexed;

pub use end_pose::EndPoseStack;
pub use layout::{StackLayout, TaskSpec};
pub use sampling::{SamplingStack, DEFAULT_TOLERANCE};
pub use time_indexed::TimeIndexedStack;
