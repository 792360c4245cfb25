//! Interaction-mesh task: graph-Laplacian coordinates of the effector set.
//!
//! Each effector's Laplace coordinate is its position minus a weighted
//! average of the other effectors, with weights scaled inversely by
//! distance and normalized per row. The coordinate is invariant under
//! translation of the whole point set, which makes it a useful shape
//! descriptor for posture transfer and imitation.
//!
//! The Jacobian is computed in closed form. The normalizer couples every
//! pair of effectors, so the derivative of one mesh term drags in the
//! distance derivatives of the whole row; the expansion follows the product
//! and quotient rules applied to `w(j,l) = W(j,l) / (d(j,l) * wsum(j))`.

use std::cell::Cell;
use std::rc::Rc;

use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ConfigurationError, Result};
use crate::kinematics::{DerivativeOrder, KinematicsSnapshot, Pose};
use crate::tasks::TaskFunction;

use super::viz::{DebugSink, MeshMarkers};

/// Construction-time parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionMeshConfig {
    /// Reference frame name attached to debug payloads.
    pub reference_frame: String,
    /// Flattened row-major M x M weight matrix. Adopted only when the
    /// length is exactly M^2, otherwise ignored in favor of all-ones.
    pub weights: Vec<f64>,
    /// Enables debug payload publication (requires an attached sink).
    pub debug: bool,
}

impl Default for InteractionMeshConfig {
    fn default() -> Self {
        Self {
            reference_frame: "world".to_string(),
            weights: Vec::new(),
            debug: false,
        }
    }
}

/// Interaction-mesh task computation over M effector positions.
pub struct InteractionMesh {
    eff_size: usize,
    weights: DMatrix<f64>,
    reference_frame: String,
    debug: bool,
    debug_sink: Option<Rc<dyn DebugSink>>,
    next_label: Cell<usize>,
}

impl InteractionMesh {
    /// Mesh over `eff_size` effectors with all-ones weights.
    pub fn new(eff_size: usize) -> Self {
        Self {
            eff_size,
            weights: DMatrix::from_element(eff_size, eff_size, 1.0),
            reference_frame: "world".to_string(),
            debug: false,
            debug_sink: None,
            next_label: Cell::new(0),
        }
    }

    pub fn from_config(config: &InteractionMeshConfig, eff_size: usize) -> Result<Self> {
        let mut mesh = Self::new(eff_size);
        mesh.reference_frame = config.reference_frame.clone();
        mesh.debug = config.debug;
        if !config.weights.is_empty() {
            if config.weights.len() == eff_size * eff_size {
                let w = DMatrix::from_row_slice(eff_size, eff_size, &config.weights);
                mesh.set_weights(&w)?;
                info!(eff_size, "loaded interaction mesh weights");
            } else {
                warn!(
                    expected = eff_size * eff_size,
                    actual = config.weights.len(),
                    "ignoring interaction mesh weights of wrong length"
                );
            }
        }
        Ok(mesh)
    }

    pub fn eff_size(&self) -> usize {
        self.eff_size
    }

    pub fn weights(&self) -> &DMatrix<f64> {
        &self.weights
    }

    /// Set one weight entry; the index must be in range and the weight
    /// non-negative.
    pub fn set_weight(&mut self, row: usize, col: usize, weight: f64) -> Result<()> {
        let m = self.eff_size;
        if row >= m || col >= m {
            return Err(ConfigurationError::WeightIndexOutOfRange { row, col, size: m });
        }
        if weight < 0.0 {
            return Err(ConfigurationError::NegativeWeight {
                row,
                col,
                value: weight,
            });
        }
        self.weights[(row, col)] = weight;
        Ok(())
    }

    /// Replace the whole weight matrix; shape and sign are checked before
    /// any entry is written.
    pub fn set_weights(&mut self, weights: &DMatrix<f64>) -> Result<()> {
        let m = self.eff_size;
        if weights.nrows() != m || weights.ncols() != m {
            return Err(ConfigurationError::ShapeMismatch {
                what: "weight matrix",
                expected_rows: m,
                expected_cols: m,
                actual_rows: weights.nrows(),
                actual_cols: weights.ncols(),
            });
        }
        for row in 0..m {
            for col in 0..m {
                let value = weights[(row, col)];
                if value < 0.0 {
                    return Err(ConfigurationError::NegativeWeight { row, col, value });
                }
            }
        }
        self.weights.copy_from(weights);
        Ok(())
    }

    /// Attach the external debug sink. Payloads are published only while
    /// the debug flag is also set.
    pub fn attach_debug_sink(&mut self, sink: Rc<dyn DebugSink>) {
        self.debug_sink = Some(sink);
    }

    pub fn set_debug(&mut self, enabled: bool) {
        self.debug = enabled;
    }

    /// Laplace coordinates of a point set under a given weight matrix.
    pub fn compute_laplace(
        points: &[Vector3<f64>],
        weights: &DMatrix<f64>,
    ) -> Result<DVector<f64>> {
        let m = points.len();
        if weights.nrows() != m || weights.ncols() != m {
            return Err(ConfigurationError::ShapeMismatch {
                what: "weight matrix",
                expected_rows: m,
                expected_cols: m,
                actual_rows: weights.nrows(),
                actual_cols: weights.ncols(),
            });
        }
        let (dist, wsum) = mesh_geometry(points, weights);
        let mut phi = DVector::zeros(3 * m);
        laplace_into(points, weights, &dist, &wsum, &mut phi);
        Ok(phi)
    }

    /// Laplace coordinates of a recorded posture, e.g. to turn a
    /// demonstrated pose into a goal vector.
    pub fn goal_laplace(poses: &[Pose], weights: &DMatrix<f64>) -> Result<DVector<f64>> {
        let points: Vec<Vector3<f64>> = poses.iter().map(|p| p.position).collect();
        Self::compute_laplace(&points, weights)
    }

    fn check_value_shapes(&self, kin: &KinematicsSnapshot, phi: &DVector<f64>) -> Result<()> {
        kin.check(self.eff_size, DerivativeOrder::None)?;
        if phi.len() != self.task_dim() {
            return Err(ConfigurationError::SizeMismatch {
                what: "task value buffer",
                expected: self.task_dim(),
                actual: phi.len(),
            });
        }
        Ok(())
    }

    fn publish_debug(&self, points: &[Vector3<f64>], phi: &DVector<f64>) {
        if !self.debug {
            return;
        }
        let Some(sink) = self.debug_sink.as_ref() else {
            return;
        };
        let m = self.eff_size;
        let mut edges = Vec::new();
        for j in 0..m {
            for l in (j + 1)..m {
                if self.weights[(j, l)] > 0.0 || self.weights[(l, j)] > 0.0 {
                    edges.push((j, l));
                }
            }
        }
        let laplace = (0..m)
            .map(|j| Vector3::new(phi[3 * j], phi[3 * j + 1], phi[3 * j + 2]))
            .collect();
        let label = self.next_label.get();
        self.next_label.set(if m == 0 { 0 } else { (label + 1) % m });
        debug!(
            frame = %self.reference_frame,
            points = m,
            edges = edges.len(),
            "publishing interaction mesh markers"
        );
        sink.publish(&MeshMarkers {
            frame_id: self.reference_frame.clone(),
            points: points.to_vec(),
            laplace,
            edges,
            label,
        });
    }
}

impl TaskFunction for InteractionMesh {
    fn task_dim(&self) -> usize {
        3 * self.eff_size
    }

    fn has_jacobian(&self) -> bool {
        true
    }

    fn value(&self, kin: &KinematicsSnapshot, phi: &mut DVector<f64>) -> Result<()> {
        self.check_value_shapes(kin, phi)?;
        let points: Vec<Vector3<f64>> = kin.poses.iter().map(|p| p.position).collect();
        let (dist, wsum) = mesh_geometry(&points, &self.weights);
        laplace_into(&points, &self.weights, &dist, &wsum, phi);
        self.publish_debug(&points, phi);
        Ok(())
    }

    fn value_and_jacobian(
        &self,
        kin: &KinematicsSnapshot,
        phi: &mut DVector<f64>,
        jacobian: &mut DMatrix<f64>,
    ) -> Result<()> {
        self.check_value_shapes(kin, phi)?;
        kin.check(self.eff_size, DerivativeOrder::First)?;
        let m = self.eff_size;
        let n = kin
            .jacobians
            .first()
            .map_or(jacobian.ncols(), |block| block.ncols());
        for block in &kin.jacobians {
            if block.ncols() != n {
                return Err(ConfigurationError::SizeMismatch {
                    what: "effector jacobian columns",
                    expected: n,
                    actual: block.ncols(),
                });
            }
        }
        if jacobian.nrows() != 3 * m || jacobian.ncols() != n {
            return Err(ConfigurationError::ShapeMismatch {
                what: "task jacobian buffer",
                expected_rows: 3 * m,
                expected_cols: n,
                actual_rows: jacobian.nrows(),
                actual_cols: jacobian.ncols(),
            });
        }

        let points: Vec<Vector3<f64>> = kin.poses.iter().map(|p| p.position).collect();
        let (dist, wsum) = mesh_geometry(&points, &self.weights);
        laplace_into(&points, &self.weights, &dist, &wsum, phi);

        // s[k] holds the distance derivative d/dx_i d(j,k) for the current
        // (i, j); entries of omitted terms stay zero, matching the forward
        // pass's omission rule (the derivative of a dropped term is zero,
        // not a limit).
        let mut s = vec![0.0; m];
        for i in 0..n {
            for j in 0..m {
                let jj = kin.jacobians[j].column(i);
                for r in 0..3 {
                    jacobian[(3 * j + r, i)] = jj[r];
                }

                for (k, sk) in s.iter_mut().enumerate() {
                    *sk = 0.0;
                    if k != j && dist[(j, k)] > 0.0 && self.weights[(j, k)] > 0.0 {
                        let dpos = points[j] - points[k];
                        let djac = kin.jacobians[j].column(i) - kin.jacobians[k].column(i);
                        *sk = dpos.dot(&djac) / dist[(j, k)];
                    }
                }

                for l in 0..m {
                    if l == j {
                        continue;
                    }
                    let mut w = 0.0;
                    let mut dw = 0.0;
                    if dist[(j, l)] > 0.0 && wsum[j] > 0.0 && self.weights[(j, l)] > 0.0 {
                        let a = dist[(j, l)] * wsum[j];
                        w = self.weights[(j, l)] / a;
                        let mut da = 0.0;
                        for k in 0..m {
                            if k != j && dist[(j, k)] > 0.0 && self.weights[(j, k)] > 0.0 {
                                da += self.weights[(j, k)]
                                    * (s[l] * dist[(j, k)] - s[k] * dist[(j, l)])
                                    / (dist[(j, k)] * dist[(j, k)]);
                            }
                        }
                        dw = -self.weights[(j, l)] * da / (a * a);
                    }
                    let jl = kin.jacobians[l].column(i);
                    for r in 0..3 {
                        jacobian[(3 * j + r, i)] -= points[l][r] * dw + jl[r] * w;
                    }
                }
            }
        }

        self.publish_debug(&points, phi);
        Ok(())
    }
}

/// Pairwise distances (symmetric, zero diagonal) and per-row weight
/// normalizers `wsum(j) = sum_{l != j, d > 0} W(j,l) / d(j,l)`.
fn mesh_geometry(points: &[Vector3<f64>], weights: &DMatrix<f64>) -> (DMatrix<f64>, DVector<f64>) {
    let m = points.len();
    let mut dist = DMatrix::zeros(m, m);
    for j in 0..m {
        for l in (j + 1)..m {
            let d = (points[j] - points[l]).norm();
            dist[(j, l)] = d;
            dist[(l, j)] = d;
        }
    }
    let mut wsum = DVector::zeros(m);
    for j in 0..m {
        for l in 0..m {
            if l != j && dist[(j, l)] > 0.0 {
                wsum[j] += weights[(j, l)] / dist[(j, l)];
            }
        }
    }
    (dist, wsum)
}

/// Laplace coordinates written into `out` (length 3M). A point without any
/// valid neighbor keeps its own position.
fn laplace_into(
    points: &[Vector3<f64>],
    weights: &DMatrix<f64>,
    dist: &DMatrix<f64>,
    wsum: &DVector<f64>,
    out: &mut DVector<f64>,
) {
    for (j, point) in points.iter().enumerate() {
        let mut lap = *point;
        if wsum[j] > 0.0 {
            for (l, other) in points.iter().enumerate() {
                if l != j && dist[(j, l)] > 0.0 {
                    lap -= other * (weights[(j, l)] / (dist[(j, l)] * wsum[j]));
                }
            }
        }
        out[3 * j] = lap.x;
        out[3 * j + 1] = lap.y;
        out[3 * j + 2] = lap.z;
    }
}
