//! Task computations: the capability trait, resolved entries, and concrete
//! task functions.

pub mod interaction_mesh;
pub mod registry;
pub mod viz;

use nalgebra::{DMatrix, DVector};

use crate::error::Result;
use crate::kinematics::KinematicsSnapshot;
use crate::taskspace::LieBlock;

pub use interaction_mesh::{InteractionMesh, InteractionMeshConfig};
pub use registry::{TaskCapabilities, TaskRegistry, TaskTable, TaskTypeRegistry};

/// A unit of task-space computation.
///
/// Implementations map provider output to a value vector and, if supported,
/// its derivatives with respect to the configuration. All outputs are
/// written into caller-pre-sized buffers; a size mismatch fails before any
/// write.
pub trait TaskFunction {
    /// Declared value dimension.
    fn task_dim(&self) -> usize;

    /// Rows this task contributes to residuals and Jacobians. Differs from
    /// [`Self::task_dim`] only when the value layout carries quaternion
    /// blocks.
    fn tangent_dim(&self) -> usize {
        self.task_dim()
    }

    /// Lie-group blocks of the value layout, offsets local to this task.
    fn lie_blocks(&self) -> Vec<LieBlock> {
        Vec::new()
    }

    fn has_jacobian(&self) -> bool {
        false
    }

    fn has_hessian(&self) -> bool {
        false
    }

    /// Fill the value vector; `phi` must have length [`Self::task_dim`].
    fn value(&self, kin: &KinematicsSnapshot, phi: &mut DVector<f64>) -> Result<()>;

    /// Fill value and Jacobian; `jacobian` must be pre-sized to
    /// [`Self::tangent_dim`] x configuration dimension.
    fn value_and_jacobian(
        &self,
        kin: &KinematicsSnapshot,
        phi: &mut DVector<f64>,
        jacobian: &mut DMatrix<f64>,
    ) -> Result<()>;
}

/// A task function bound to its slice in the provider's global stacked
/// buffers.
///
/// The provider evaluates every registered task into one combined
/// value/Jacobian buffer; `start`/`start_jacobian` record where this task's
/// output lands there. Stacks copy from those global slices into their own.
pub struct TaskEntry {
    pub name: String,
    pub function: Box<dyn TaskFunction>,
    pub start: usize,
    pub length: usize,
    pub start_jacobian: usize,
    pub length_jacobian: usize,
}

impl TaskEntry {
    pub fn new(
        name: impl Into<String>,
        function: Box<dyn TaskFunction>,
        start: usize,
        start_jacobian: usize,
    ) -> Self {
        let length = function.task_dim();
        let length_jacobian = function.tangent_dim();
        Self {
            name: name.into(),
            function,
            start,
            length,
            start_jacobian,
            length_jacobian,
        }
    }
}

impl std::fmt::Debug for TaskEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEntry")
            .field("name", &self.name)
            .field("start", &self.start)
            .field("length", &self.length)
            .field("start_jacobian", &self.start_jacobian)
            .field("length_jacobian", &self.length_jacobian)
            .finish()
    }
}
