//! Sampling task stack for derivative-free consumers.

use nalgebra::{DMatrix, DVector};

use crate::error::Result;
use crate::taskspace::{TaskIndexing, TaskVector};
use crate::tasks::TaskRegistry;

use super::layout::{StackLayout, TaskSpec};

/// Default residual deadband.
pub const DEFAULT_TOLERANCE: f64 = 1e-8;

/// Stacks task computations for sampling-based consumers.
///
/// Identical stacking and goal/rho validation to the single-pose variant,
/// but no Jacobian or Hessian is ever allocated. After each update,
/// residual components smaller in magnitude than the tolerance are snapped
/// to exactly 0.0 so floating-point noise cannot perturb heuristics that
/// treat zero specially.
#[derive(Debug)]
pub struct SamplingStack {
    layout: StackLayout,
    tolerance: f64,
    pub phi: TaskVector,
    pub y: TaskVector,
    pub rho: DVector<f64>,
    pub scaling: DMatrix<f64>,
    pub ydiff: DVector<f64>,
    used: Vec<bool>,
}

impl SamplingStack {
    pub fn new(specs: &[TaskSpec], registry: &dyn TaskRegistry, tolerance: f64) -> Result<Self> {
        let layout = StackLayout::build(specs, registry)?;
        let phi = layout.template().clone();
        let mut y = layout.template().clone();
        let mut rho = DVector::from_element(layout.num_tasks(), 1.0);
        layout.apply_single_goals(&mut y, &mut rho)?;

        let length_jacobian = layout.length_jacobian();
        let mut stack = Self {
            tolerance,
            phi,
            y,
            rho,
            scaling: DMatrix::identity(length_jacobian, length_jacobian),
            ydiff: DVector::zeros(length_jacobian),
            used: vec![false; layout.num_tasks()],
            layout,
        };
        stack.update_weights();
        Ok(stack)
    }

    pub fn with_default_tolerance(specs: &[TaskSpec], registry: &dyn TaskRegistry) -> Result<Self> {
        Self::new(specs, registry, DEFAULT_TOLERANCE)
    }

    pub fn num_tasks(&self) -> usize {
        self.layout.num_tasks()
    }

    pub fn length(&self) -> usize {
        self.layout.length()
    }

    pub fn indexing(&self) -> &[TaskIndexing] {
        self.layout.indexing()
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn is_used(&self, id: usize) -> bool {
        self.used[id]
    }

    /// Rebuild the scaling matrix and used flags from the current rho.
    pub fn update_weights(&mut self) {
        self.used.fill(false);
        self.layout
            .apply_scaling(&self.rho, &mut self.scaling, &mut self.used);
    }

    /// Copy task slices from the provider value buffer, recompute the
    /// residual, and apply the deadband.
    pub fn update(&mut self, big_phi: &TaskVector) -> Result<()> {
        self.layout.check_provider_value(big_phi)?;
        self.layout.copy_value(big_phi, &mut self.phi);
        self.phi.sub_into(&self.y, &mut self.ydiff)?;
        for v in self.ydiff.iter_mut() {
            if v.abs() < self.tolerance {
                *v = 0.0;
            }
        }
        Ok(())
    }
}
