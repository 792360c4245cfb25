//! Debug visualization payloads.
//!
//! Task computations may describe their geometry to an external sink. The
//! payload is transport-agnostic; publishing is purely side-effecting and
//! never read back, so a missing sink changes nothing about computed values.

use nalgebra::Vector3;

/// Mesh connectivity snapshot for one evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshMarkers {
    /// Reference frame the points are expressed in.
    pub frame_id: String,
    /// Effector positions.
    pub points: Vec<Vector3<f64>>,
    /// Laplace coordinates of the same points.
    pub laplace: Vec<Vector3<f64>>,
    /// Point index pairs (j < l) connected by a nonzero weight in either
    /// direction.
    pub edges: Vec<(usize, usize)>,
    /// Index of the point highlighted this round; rotates per evaluation.
    pub label: usize,
}

/// External sink for debug payloads.
pub trait DebugSink {
    fn publish(&self, markers: &MeshMarkers);
}
