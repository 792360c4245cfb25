//! Single-pose task stack for static-goal (IK-style) problems.

use nalgebra::{DMatrix, DVector};

use crate::error::{ConfigurationError, Result};
use crate::kinematics::DerivativeOrder;
use crate::taskspace::{TaskIndexing, TaskVector};
use crate::tasks::TaskRegistry;

use super::layout::{StackLayout, TaskSpec};

/// Stacks task computations against one static goal.
///
/// All buffers are sized at construction from the resolved task list and
/// only overwritten afterwards. Derivative buffers exist only when the
/// requested [`DerivativeOrder`] asks for them.
#[derive(Debug)]
pub struct EndPoseStack {
    layout: StackLayout,
    n: usize,
    pub phi: TaskVector,
    pub y: TaskVector,
    pub rho: DVector<f64>,
    pub jacobian: Option<DMatrix<f64>>,
    pub hessian: Option<Vec<DMatrix<f64>>>,
    /// Dense scaling matrix; rho broadcast across each task's Jacobian rows
    /// on the diagonal.
    pub scaling: DMatrix<f64>,
    pub ydiff: DVector<f64>,
    used: Vec<bool>,
}

impl EndPoseStack {
    /// Resolve `specs` through `registry` and allocate all buffers.
    ///
    /// `n` is the configuration dimension; goal lengths must be 0 or the
    /// task's declared length, rho lengths 0 or 1.
    pub fn new(
        specs: &[TaskSpec],
        registry: &dyn TaskRegistry,
        order: DerivativeOrder,
        n: usize,
    ) -> Result<Self> {
        let layout = StackLayout::build(specs, registry)?;
        let phi = layout.template().clone();
        let mut y = layout.template().clone();
        let mut rho = DVector::from_element(layout.num_tasks(), 1.0);
        layout.apply_single_goals(&mut y, &mut rho)?;

        let length_jacobian = layout.length_jacobian();
        let jacobian = order
            .wants_jacobian()
            .then(|| DMatrix::zeros(length_jacobian, n));
        let hessian = order
            .wants_hessian()
            .then(|| vec![DMatrix::zeros(n, n); length_jacobian]);

        let mut stack = Self {
            n,
            phi,
            y,
            rho,
            jacobian,
            hessian,
            scaling: DMatrix::identity(length_jacobian, length_jacobian),
            ydiff: DVector::zeros(length_jacobian),
            used: vec![false; layout.num_tasks()],
            layout,
        };
        stack.update_weights();
        Ok(stack)
    }

    pub fn num_tasks(&self) -> usize {
        self.layout.num_tasks()
    }

    pub fn length(&self) -> usize {
        self.layout.length()
    }

    pub fn length_jacobian(&self) -> usize {
        self.layout.length_jacobian()
    }

    pub fn indexing(&self) -> &[TaskIndexing] {
        self.layout.indexing()
    }

    /// Whether the task currently contributes (nonzero rho at the last
    /// [`Self::update_weights`]).
    pub fn is_used(&self, id: usize) -> bool {
        self.used[id]
    }

    /// Rebuild the scaling matrix and used flags from the current rho.
    pub fn update_weights(&mut self) {
        self.used.fill(false);
        self.layout
            .apply_scaling(&self.rho, &mut self.scaling, &mut self.used);
    }

    /// Copy task slices from the provider value buffer and recompute the
    /// residual.
    pub fn update_value(&mut self, big_phi: &TaskVector) -> Result<()> {
        self.layout.check_provider_value(big_phi)?;
        self.layout.copy_value(big_phi, &mut self.phi);
        self.compute_ydiff()
    }

    /// As [`Self::update_value`], also copying Jacobian rows.
    pub fn update_with_jacobian(
        &mut self,
        big_phi: &TaskVector,
        big_j: &DMatrix<f64>,
    ) -> Result<()> {
        self.layout.check_provider_value(big_phi)?;
        self.layout.check_provider_jacobian(big_j, self.n)?;
        let jacobian = self.jacobian.as_mut().ok_or(ConfigurationError::SizeMismatch {
            what: "stack jacobian buffer",
            expected: self.layout.length_jacobian(),
            actual: 0,
        })?;
        self.layout.copy_value(big_phi, &mut self.phi);
        self.layout.copy_jacobian(big_j, jacobian);
        self.compute_ydiff()
    }

    /// As [`Self::update_with_jacobian`], also copying Hessian row blocks.
    pub fn update_full(
        &mut self,
        big_phi: &TaskVector,
        big_j: &DMatrix<f64>,
        big_h: &[DMatrix<f64>],
    ) -> Result<()> {
        self.layout.check_provider_value(big_phi)?;
        self.layout.check_provider_jacobian(big_j, self.n)?;
        self.layout.check_provider_hessian(big_h, self.n)?;
        let jacobian = self.jacobian.as_mut().ok_or(ConfigurationError::SizeMismatch {
            what: "stack jacobian buffer",
            expected: self.layout.length_jacobian(),
            actual: 0,
        })?;
        let hessian = self.hessian.as_mut().ok_or(ConfigurationError::SizeMismatch {
            what: "stack hessian buffer",
            expected: self.layout.length_jacobian(),
            actual: 0,
        })?;
        self.layout.copy_value(big_phi, &mut self.phi);
        self.layout.copy_jacobian(big_j, jacobian);
        self.layout.copy_hessian(big_h, hessian);
        self.compute_ydiff()
    }

    fn compute_ydiff(&mut self) -> Result<()> {
        self.phi.sub_into(&self.y, &mut self.ydiff)
    }

    /// Replace one task's goal block; the length must match exactly.
    pub fn set_goal(&mut self, task: &str, goal: &[f64]) -> Result<()> {
        let i = self.layout.task_index(task)?;
        let idx = self.layout.indexing()[i];
        if goal.len() != idx.length {
            return Err(ConfigurationError::InvalidGoalSize {
                task: task.to_string(),
                expected: idx.length.to_string(),
                actual: goal.len(),
            });
        }
        self.y.data.rows_mut(idx.start, idx.length).copy_from_slice(goal);
        Ok(())
    }

    pub fn goal(&self, task: &str) -> Result<&[f64]> {
        let i = self.layout.task_index(task)?;
        let idx = self.layout.indexing()[i];
        Ok(&self.y.data.as_slice()[idx.start..idx.start + idx.length])
    }

    /// Set one task's weight and refresh the scaling matrix.
    pub fn set_rho(&mut self, task: &str, rho: f64) -> Result<()> {
        let i = self.layout.task_index(task)?;
        self.rho[i] = rho;
        self.update_weights();
        Ok(())
    }

    pub fn rho_of(&self, task: &str) -> Result<f64> {
        let i = self.layout.task_index(task)?;
        Ok(self.rho[i])
    }
}
