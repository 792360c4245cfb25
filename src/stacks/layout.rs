//! Shared stacking machinery: task-spec resolution, slice assignment, and
//! the copy/validation helpers every stack variant uses.

use std::rc::Rc;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, Result};
use crate::taskspace::{partition, LieBlock, TaskIndexing, TaskVector};
use crate::tasks::{TaskEntry, TaskRegistry};

/// One stacked task as configured by the caller.
///
/// `goal` and `rho` are optional; an empty vector keeps the variant's
/// default (zero goal, unit weight). Their accepted lengths depend on the
/// stack variant.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Reference to a registered task instance.
    pub task: String,
    #[serde(default)]
    pub goal: Vec<f64>,
    #[serde(default)]
    pub rho: Vec<f64>,
}

impl TaskSpec {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            goal: Vec::new(),
            rho: Vec::new(),
        }
    }

    pub fn with_goal(mut self, goal: Vec<f64>) -> Self {
        self.goal = goal;
        self
    }

    pub fn with_rho(mut self, rho: Vec<f64>) -> Self {
        self.rho = rho;
        self
    }
}

/// Resolved task list with its slice partition and tagged template vector.
///
/// Built once at stack initialization; every buffer a stack allocates is
/// sized from the totals recorded here and never resized afterwards.
#[derive(Debug)]
pub struct StackLayout {
    pub(crate) entries: Vec<Rc<TaskEntry>>,
    pub(crate) specs: Vec<TaskSpec>,
    pub(crate) indexing: Vec<TaskIndexing>,
    pub(crate) length: usize,
    pub(crate) length_jacobian: usize,
    pub(crate) template: TaskVector,
}

impl StackLayout {
    /// Resolve `specs` through `registry` and assign contiguous slices in
    /// registration order.
    pub fn build(specs: &[TaskSpec], registry: &dyn TaskRegistry) -> Result<Self> {
        let mut entries = Vec::with_capacity(specs.len());
        for spec in specs {
            let entry =
                registry
                    .resolve(&spec.task)
                    .ok_or_else(|| ConfigurationError::UnknownTask {
                        name: spec.task.clone(),
                    })?;
            entries.push(entry);
        }
        let dims: Vec<(usize, usize)> = entries
            .iter()
            .map(|e| (e.length, e.length_jacobian))
            .collect();
        let (indexing, length, length_jacobian) = partition(&dims);

        let mut blocks = Vec::new();
        for (entry, idx) in entries.iter().zip(&indexing) {
            blocks.extend(LieBlock::reindex(&entry.function.lie_blocks(), idx.start));
        }
        let template = TaskVector::new(length, blocks)?;

        Ok(Self {
            entries,
            specs: specs.to_vec(),
            indexing,
            length,
            length_jacobian,
            template,
        })
    }

    pub fn num_tasks(&self) -> usize {
        self.entries.len()
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn length_jacobian(&self) -> usize {
        self.length_jacobian
    }

    pub fn indexing(&self) -> &[TaskIndexing] {
        &self.indexing
    }

    pub fn template(&self) -> &TaskVector {
        &self.template
    }

    pub(crate) fn task_index(&self, name: &str) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| ConfigurationError::UnknownTask {
                name: name.to_string(),
            })
    }

    /// Apply single-pose goal/rho rules: goal length must be 0 or the
    /// task's length, rho length 0 or 1.
    pub(crate) fn apply_single_goals(
        &self,
        y: &mut TaskVector,
        rho: &mut DVector<f64>,
    ) -> Result<()> {
        for (i, (spec, idx)) in self.specs.iter().zip(&self.indexing).enumerate() {
            if spec.goal.is_empty() {
                // keep zero goal
            } else if spec.goal.len() == idx.length {
                y.data
                    .rows_mut(idx.start, idx.length)
                    .copy_from_slice(&spec.goal);
            } else {
                return Err(ConfigurationError::InvalidGoalSize {
                    task: spec.task.clone(),
                    expected: idx.length.to_string(),
                    actual: spec.goal.len(),
                });
            }
            if spec.rho.is_empty() {
                rho[i] = 1.0;
            } else if spec.rho.len() == 1 {
                rho[i] = spec.rho[0];
            } else {
                return Err(ConfigurationError::InvalidRhoSize {
                    task: spec.task.clone(),
                    expected: "1".to_string(),
                    actual: spec.rho.len(),
                });
            }
        }
        Ok(())
    }

    /// Broadcast rho into the scaling diagonal over each task's Jacobian
    /// rows and accumulate used flags (nonzero rho marks a task used).
    pub(crate) fn apply_scaling(
        &self,
        rho: &DVector<f64>,
        scaling: &mut DMatrix<f64>,
        used: &mut [bool],
    ) {
        for idx in &self.indexing {
            for r in 0..idx.length_jacobian {
                let d = idx.start_jacobian + r;
                scaling[(d, d)] = rho[idx.id];
            }
            if rho[idx.id] != 0.0 {
                used[idx.id] = true;
            }
        }
    }

    pub(crate) fn check_provider_value(&self, big_phi: &TaskVector) -> Result<()> {
        for entry in &self.entries {
            if entry.start + entry.length > big_phi.len() {
                return Err(ConfigurationError::SizeMismatch {
                    what: "provider value buffer",
                    expected: entry.start + entry.length,
                    actual: big_phi.len(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn check_provider_jacobian(&self, big_j: &DMatrix<f64>, n: usize) -> Result<()> {
        for entry in &self.entries {
            if entry.start_jacobian + entry.length_jacobian > big_j.nrows() {
                return Err(ConfigurationError::SizeMismatch {
                    what: "provider jacobian rows",
                    expected: entry.start_jacobian + entry.length_jacobian,
                    actual: big_j.nrows(),
                });
            }
        }
        if big_j.ncols() != n {
            return Err(ConfigurationError::SizeMismatch {
                what: "provider jacobian columns",
                expected: n,
                actual: big_j.ncols(),
            });
        }
        Ok(())
    }

    pub(crate) fn check_provider_hessian(&self, big_h: &[DMatrix<f64>], n: usize) -> Result<()> {
        for entry in &self.entries {
            if entry.start_jacobian + entry.length_jacobian > big_h.len() {
                return Err(ConfigurationError::SizeMismatch {
                    what: "provider hessian rows",
                    expected: entry.start_jacobian + entry.length_jacobian,
                    actual: big_h.len(),
                });
            }
        }
        for block in big_h {
            if block.nrows() != n || block.ncols() != n {
                return Err(ConfigurationError::ShapeMismatch {
                    what: "provider hessian block",
                    expected_rows: n,
                    expected_cols: n,
                    actual_rows: block.nrows(),
                    actual_cols: block.ncols(),
                });
            }
        }
        Ok(())
    }

    /// Copy each task's value slice from the provider buffer into `phi`.
    pub(crate) fn copy_value(&self, big_phi: &TaskVector, phi: &mut TaskVector) {
        for (entry, idx) in self.entries.iter().zip(&self.indexing) {
            phi.data
                .rows_mut(idx.start, idx.length)
                .copy_from(&big_phi.data.rows(entry.start, entry.length));
        }
    }

    /// Copy each task's Jacobian rows from the provider buffer.
    pub(crate) fn copy_jacobian(&self, big_j: &DMatrix<f64>, jacobian: &mut DMatrix<f64>) {
        for (entry, idx) in self.entries.iter().zip(&self.indexing) {
            jacobian
                .rows_mut(idx.start_jacobian, idx.length_jacobian)
                .copy_from(&big_j.rows(entry.start_jacobian, entry.length_jacobian));
        }
    }

    /// Copy each task's Hessian row blocks from the provider buffer.
    pub(crate) fn copy_hessian(&self, big_h: &[DMatrix<f64>], hessian: &mut [DMatrix<f64>]) {
        for (entry, idx) in self.entries.iter().zip(&self.indexing) {
            for r in 0..idx.length_jacobian {
                hessian[idx.start_jacobian + r].copy_from(&big_h[entry.start_jacobian + r]);
            }
        }
    }
}
