//! Time-indexed task stack for trajectory problems.

use nalgebra::{DMatrix, DVector};

use crate::error::{ConfigurationError, Result};
use crate::kinematics::DerivativeOrder;
use crate::taskspace::{TaskIndexing, TaskVector};
use crate::tasks::TaskRegistry;

use super::layout::{StackLayout, TaskSpec};

/// Stacks task computations over a discrete trajectory of T timesteps.
///
/// Construction resolves the task list only; per-timestep buffers exist
/// after [`Self::reinitialize_variables`], which may be called again to
/// change the horizon (an explicit reallocation, never interleaved with
/// updates).
#[derive(Debug)]
pub struct TimeIndexedStack {
    layout: StackLayout,
    order: DerivativeOrder,
    n: usize,
    horizon: usize,
    pub phi: Vec<TaskVector>,
    pub y: Vec<TaskVector>,
    pub rho: Vec<DVector<f64>>,
    pub jacobian: Option<Vec<DMatrix<f64>>>,
    pub hessian: Option<Vec<Vec<DMatrix<f64>>>>,
    pub scaling: Vec<DMatrix<f64>>,
    pub ydiff: Vec<DVector<f64>>,
    used: Vec<bool>,
}

impl TimeIndexedStack {
    pub fn new(
        specs: &[TaskSpec],
        registry: &dyn TaskRegistry,
        order: DerivativeOrder,
        n: usize,
    ) -> Result<Self> {
        let layout = StackLayout::build(specs, registry)?;
        let num_tasks = layout.num_tasks();
        Ok(Self {
            layout,
            order,
            n,
            horizon: 0,
            phi: Vec::new(),
            y: Vec::new(),
            rho: Vec::new(),
            jacobian: None,
            hessian: None,
            scaling: Vec::new(),
            ydiff: Vec::new(),
            used: vec![false; num_tasks],
        })
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

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn is_used(&self, id: usize) -> bool {
        self.used[id]
    }

    /// Allocate all per-timestep buffers for a horizon of `horizon` steps
    /// and apply the configured goals and weights.
    ///
    /// Goal lengths accepted per task: 0 (zero goal), the task's length
    /// (broadcast to every timestep), or length x horizon (per-timestep
    /// blocks). Rho lengths accepted: 0 (ones), 1 (broadcast), or horizon.
    pub fn reinitialize_variables(&mut self, horizon: usize) -> Result<()> {
        if horizon == 0 {
            return Err(ConfigurationError::SizeMismatch {
                what: "planning horizon",
                expected: 1,
                actual: 0,
            });
        }
        let num_tasks = self.layout.num_tasks();
        let length_jacobian = self.layout.length_jacobian();

        self.horizon = horizon;
        self.phi = vec![self.layout.template().clone(); horizon];
        self.y = vec![self.layout.template().clone(); horizon];
        self.rho = vec![DVector::from_element(num_tasks, 1.0); horizon];
        self.jacobian = self
            .order
            .wants_jacobian()
            .then(|| vec![DMatrix::zeros(length_jacobian, self.n); horizon]);
        self.hessian = self
            .order
            .wants_hessian()
            .then(|| vec![vec![DMatrix::zeros(self.n, self.n); length_jacobian]; horizon]);
        self.scaling = vec![DMatrix::identity(length_jacobian, length_jacobian); horizon];
        self.ydiff = vec![DVector::zeros(length_jacobian); horizon];

        for (i, (spec, idx)) in self
            .layout
            .specs
            .iter()
            .zip(self.layout.indexing.iter())
            .enumerate()
        {
            if spec.goal.is_empty() {
                // keep zero goal
            } else if spec.goal.len() == idx.length * horizon {
                for t in 0..horizon {
                    self.y[t]
                        .data
                        .rows_mut(idx.start, idx.length)
                        .copy_from_slice(&spec.goal[t * idx.length..(t + 1) * idx.length]);
                }
            } else if spec.goal.len() == idx.length {
                for t in 0..horizon {
                    self.y[t]
                        .data
                        .rows_mut(idx.start, idx.length)
                        .copy_from_slice(&spec.goal);
                }
            } else {
                return Err(ConfigurationError::InvalidGoalSize {
                    task: spec.task.clone(),
                    expected: format!("{} or {}", idx.length, idx.length * horizon),
                    actual: spec.goal.len(),
                });
            }

            if spec.rho.is_empty() {
                // keep ones
            } else if spec.rho.len() == horizon {
                for t in 0..horizon {
                    self.rho[t][i] = spec.rho[t];
                }
            } else if spec.rho.len() == 1 {
                for t in 0..horizon {
                    self.rho[t][i] = spec.rho[0];
                }
            } else {
                return Err(ConfigurationError::InvalidRhoSize {
                    task: spec.task.clone(),
                    expected: format!("1 or {horizon}"),
                    actual: spec.rho.len(),
                });
            }
        }

        self.update_weights();
        Ok(())
    }

    fn check_timestep(&self, t: usize) -> Result<()> {
        if t >= self.horizon {
            return Err(ConfigurationError::TimestepOutOfRange {
                t,
                horizon: self.horizon,
            });
        }
        Ok(())
    }

    /// Rebuild every timestep's scaling matrix; a task is used if its rho
    /// is nonzero at any timestep.
    pub fn update_weights(&mut self) {
        self.used.fill(false);
        for t in 0..self.horizon {
            self.layout
                .apply_scaling(&self.rho[t], &mut self.scaling[t], &mut self.used);
        }
    }

    /// Copy task slices for timestep `t` and recompute its residual.
    pub fn update_value_at(&mut self, big_phi: &TaskVector, t: usize) -> Result<()> {
        self.check_timestep(t)?;
        self.layout.check_provider_value(big_phi)?;
        self.layout.copy_value(big_phi, &mut self.phi[t]);
        self.compute_ydiff(t)
    }

    /// As [`Self::update_value_at`], also copying Jacobian rows.
    pub fn update_with_jacobian_at(
        &mut self,
        big_phi: &TaskVector,
        big_j: &DMatrix<f64>,
        t: usize,
    ) -> Result<()> {
        self.check_timestep(t)?;
        self.layout.check_provider_value(big_phi)?;
        self.layout.check_provider_jacobian(big_j, self.n)?;
        let jacobian = self.jacobian.as_mut().ok_or(ConfigurationError::SizeMismatch {
            what: "stack jacobian buffer",
            expected: self.layout.length_jacobian(),
            actual: 0,
        })?;
        self.layout.copy_value(big_phi, &mut self.phi[t]);
        self.layout.copy_jacobian(big_j, &mut jacobian[t]);
        self.compute_ydiff(t)
    }

    /// As [`Self::update_with_jacobian_at`], also copying Hessian blocks.
    pub fn update_full_at(
        &mut self,
        big_phi: &TaskVector,
        big_j: &DMatrix<f64>,
        big_h: &[DMatrix<f64>],
        t: usize,
    ) -> Result<()> {
        self.check_timestep(t)?;
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
        self.layout.copy_value(big_phi, &mut self.phi[t]);
        self.layout.copy_jacobian(big_j, &mut jacobian[t]);
        self.layout.copy_hessian(big_h, &mut hessian[t]);
        self.compute_ydiff(t)
    }

    fn compute_ydiff(&mut self, t: usize) -> Result<()> {
        self.phi[t].sub_into(&self.y[t], &mut self.ydiff[t])
    }

    /// Replace one task's goal block at timestep `t`; the length must match
    /// exactly.
    pub fn set_goal_at(&mut self, task: &str, t: usize, goal: &[f64]) -> Result<()> {
        self.check_timestep(t)?;
        let i = self.layout.task_index(task)?;
        let idx = self.layout.indexing()[i];
        if goal.len() != idx.length {
            return Err(ConfigurationError::InvalidGoalSize {
                task: task.to_string(),
                expected: idx.length.to_string(),
                actual: goal.len(),
            });
        }
        self.y[t]
            .data
            .rows_mut(idx.start, idx.length)
            .copy_from_slice(goal);
        Ok(())
    }

    pub fn goal_at(&self, task: &str, t: usize) -> Result<&[f64]> {
        self.check_timestep(t)?;
        let i = self.layout.task_index(task)?;
        let idx = self.layout.indexing()[i];
        Ok(&self.y[t].data.as_slice()[idx.start..idx.start + idx.length])
    }

    /// Set one task's weight at timestep `t` and refresh the scaling
    /// matrices.
    pub fn set_rho_at(&mut self, task: &str, t: usize, rho: f64) -> Result<()> {
        self.check_timestep(t)?;
        let i = self.layout.task_index(task)?;
        self.rho[t][i] = rho;
        self.update_weights();
        Ok(())
    }

    pub fn rho_at(&self, task: &str, t: usize) -> Result<f64> {
        self.check_timestep(t)?;
        let i = self.layout.task_index(task)?;
        Ok(self.rho[t][i])
    }
}
