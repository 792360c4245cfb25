//! Interface to the kinematic chain solver (consumed, not implemented here).
//!
//! A provider turns a configuration vector into an ordered list of effector
//! poses and, when requested, per-effector derivative blocks. Task functions
//! read a [`KinematicsSnapshot`]; they never talk to the chain solver
//! directly.

use nalgebra::{DMatrix, Matrix3xX, UnitQuaternion, Vector3};

use crate::error::{ConfigurationError, Result};

/// Pose of one effector frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn from_position(position: Vector3<f64>) -> Self {
        Self {
            position,
            orientation: UnitQuaternion::identity(),
        }
    }
}

/// Highest derivative order a consumer wants from the provider.
///
/// Derivatives are never requested beyond what a component was configured
/// with, so a derivative-free consumer costs the provider nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DerivativeOrder {
    #[default]
    None,
    First,
    Second,
}

impl DerivativeOrder {
    pub fn wants_jacobian(self) -> bool {
        matches!(self, DerivativeOrder::First | DerivativeOrder::Second)
    }

    pub fn wants_hessian(self) -> bool {
        matches!(self, DerivativeOrder::Second)
    }
}

/// Second-derivative block of one effector: one n x n matrix per position
/// coordinate.
pub type HessianBlock = [DMatrix<f64>; 3];

/// One evaluation's worth of provider output.
///
/// `jacobians` holds one 3 x n block per effector (column k is the partial
/// of the effector position with respect to configuration coordinate k) and
/// is empty unless first derivatives were requested; likewise `hessians`
/// for second derivatives.
#[derive(Clone, Debug, Default)]
pub struct KinematicsSnapshot {
    pub poses: Vec<Pose>,
    pub jacobians: Vec<Matrix3xX<f64>>,
    pub hessians: Vec<HessianBlock>,
}

impl KinematicsSnapshot {
    pub fn effector_count(&self) -> usize {
        self.poses.len()
    }

    /// Checks that the snapshot carries `expected` poses (and, if `order`
    /// asks for derivatives, matching derivative blocks).
    pub fn check(&self, expected: usize, order: DerivativeOrder) -> Result<()> {
        if self.poses.len() != expected {
            return Err(ConfigurationError::SizeMismatch {
                what: "kinematics snapshot poses",
                expected,
                actual: self.poses.len(),
            });
        }
        if order.wants_jacobian() && self.jacobians.len() != expected {
            return Err(ConfigurationError::SizeMismatch {
                what: "kinematics snapshot jacobians",
                expected,
                actual: self.jacobians.len(),
            });
        }
        if order.wants_hessian() && self.hessians.len() != expected {
            return Err(ConfigurationError::SizeMismatch {
                what: "kinematics snapshot hessians",
                expected,
                actual: self.hessians.len(),
            });
        }
        Ok(())
    }
}

/// The kinematic chain solver seen from this crate.
pub trait KinematicsProvider {
    /// Number of effector frames the provider reports per evaluation.
    fn effector_count(&self) -> usize;

    /// Evaluate the chain at configuration `x`, filling derivative fields
    /// only up to `order`.
    fn compute(&self, x: &[f64], order: DerivativeOrder) -> Result<KinematicsSnapshot>;
}
