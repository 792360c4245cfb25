//! Task-space vectors with per-block manifold arithmetic.
//!
//! A [`TaskVector`] is a plain real vector in which some coordinate runs are
//! tagged as Lie-group blocks. Subtraction (used for goal differencing) is
//! dispatched per block: untagged coordinates subtract elementwise, tagged
//! blocks use the group's difference operator and may produce fewer tangent
//! coordinates than they occupy in the value vector.

use nalgebra::{DVector, Quaternion, UnitQuaternion, Vector3};

use crate::error::{ConfigurationError, Result};

/// Wrap an angle into (-pi, pi].
pub(crate) fn wrap_angle(theta: f64) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    (theta + std::f64::consts::PI).rem_euclid(two_pi) - std::f64::consts::PI
}

/// Coordinate groups a block can belong to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LieGroup {
    /// S1 angle, 1 coordinate; difference wraps into (-pi, pi].
    Angle,
    /// SO(3) as a unit quaternion (w, i, j, k), 4 coordinates; difference is
    /// the scaled-axis logarithm of the relative rotation (3 coordinates).
    UnitQuaternion,
}

impl LieGroup {
    /// Coordinates the block occupies in the value vector.
    pub fn value_dim(self) -> usize {
        match self {
            LieGroup::Angle => 1,
            LieGroup::UnitQuaternion => 4,
        }
    }

    /// Coordinates the block contributes to a difference vector.
    pub fn tangent_dim(self) -> usize {
        match self {
            LieGroup::Angle => 1,
            LieGroup::UnitQuaternion => 3,
        }
    }
}

/// One tagged run of coordinates inside a [`TaskVector`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LieBlock {
    pub offset: usize,
    pub group: LieGroup,
}

impl LieBlock {
    pub fn new(offset: usize, group: LieGroup) -> Self {
        Self { offset, group }
    }

    /// Shift block offsets from a task-local layout to a stacked layout.
    pub fn reindex(blocks: &[LieBlock], start: usize) -> Vec<LieBlock> {
        blocks
            .iter()
            .map(|b| LieBlock::new(b.offset + start, b.group))
            .collect()
    }
}

/// Real vector with tagged Lie-group coordinate blocks.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskVector {
    pub data: DVector<f64>,
    blocks: Vec<LieBlock>,
}

impl TaskVector {
    /// Build a zeroed vector of length `len` with the given tagged blocks.
    ///
    /// Blocks are sorted by offset; a block reaching past the end of the
    /// vector or overlapping another block is a configuration error.
    pub fn new(len: usize, mut blocks: Vec<LieBlock>) -> Result<Self> {
        blocks.sort_by_key(|b| b.offset);
        let mut end = 0usize;
        for b in &blocks {
            let b_len = b.group.value_dim();
            if b.offset < end || b.offset + b_len > len {
                return Err(ConfigurationError::InvalidBlock {
                    offset: b.offset,
                    len: b_len,
                    vector_len: len,
                });
            }
            end = b.offset + b_len;
        }
        let mut v = Self {
            data: DVector::zeros(len),
            blocks,
        };
        v.set_zero();
        Ok(v)
    }

    /// Plain Euclidean vector without tagged blocks.
    pub fn zeros(len: usize) -> Self {
        Self {
            data: DVector::zeros(len),
            blocks: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    pub fn blocks(&self) -> &[LieBlock] {
        &self.blocks
    }

    /// Length of a difference vector (quaternion blocks shrink by one).
    pub fn tangent_dim(&self) -> usize {
        self.data.len()
            - self
                .blocks
                .iter()
                .map(|b| b.group.value_dim() - b.group.tangent_dim())
                .sum::<usize>()
    }

    /// Reset to the group-aware zero: Euclidean coordinates and angles go to
    /// 0.0, quaternion blocks to the identity rotation.
    pub fn set_zero(&mut self) {
        self.data.fill(0.0);
        for b in &self.blocks {
            if b.group == LieGroup::UnitQuaternion {
                self.data[b.offset] = 1.0;
            }
        }
    }

    fn quat_at(&self, offset: usize) -> UnitQuaternion<f64> {
        UnitQuaternion::from_quaternion(Quaternion::new(
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ))
    }

    /// Tag-aware difference `self - other`, written into `out`.
    ///
    /// `other` must share this vector's length (the block layout is taken
    /// from `self`) and `out` must be pre-sized to [`Self::tangent_dim`].
    pub fn sub_into(&self, other: &TaskVector, out: &mut DVector<f64>) -> Result<()> {
        if other.data.len() != self.data.len() {
            return Err(ConfigurationError::SizeMismatch {
                what: "task-space vector operand",
                expected: self.data.len(),
                actual: other.data.len(),
            });
        }
        if out.len() != self.tangent_dim() {
            return Err(ConfigurationError::SizeMismatch {
                what: "task-space difference buffer",
                expected: self.tangent_dim(),
                actual: out.len(),
            });
        }

        let mut i = 0; // value index
        let mut k = 0; // tangent index
        for b in &self.blocks {
            while i < b.offset {
                out[k] = self.data[i] - other.data[i];
                i += 1;
                k += 1;
            }
            match b.group {
                LieGroup::Angle => {
                    out[k] = wrap_angle(self.data[i] - other.data[i]);
                    i += 1;
                    k += 1;
                }
                LieGroup::UnitQuaternion => {
                    let diff: Vector3<f64> =
                        (self.quat_at(i) * other.quat_at(i).inverse()).scaled_axis();
                    out[k] = diff[0];
                    out[k + 1] = diff[1];
                    out[k + 2] = diff[2];
                    i += 4;
                    k += 3;
                }
            }
        }
        while i < self.data.len() {
            out[k] = self.data[i] - other.data[i];
            i += 1;
            k += 1;
        }
        Ok(())
    }

    /// Allocating wrapper around [`Self::sub_into`].
    pub fn sub(&self, other: &TaskVector) -> Result<DVector<f64>> {
        let mut out = DVector::zeros(self.tangent_dim());
        self.sub_into(other, &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn euclidean_subtraction() {
        let mut a = TaskVector::zeros(3);
        let mut b = TaskVector::zeros(3);
        a.data.copy_from_slice(&[1.0, 2.0, 3.0]);
        b.data.copy_from_slice(&[0.5, -1.0, 3.0]);
        let d = a.sub(&b).unwrap();
        assert_eq!(d.as_slice(), &[0.5, 3.0, 0.0]);
    }

    #[test]
    fn angle_difference_wraps() {
        let mut a = TaskVector::new(2, vec![LieBlock::new(1, LieGroup::Angle)]).unwrap();
        let mut b = a.clone();
        a.data[1] = PI - 0.1;
        b.data[1] = -PI + 0.1;
        let d = a.sub(&b).unwrap();
        assert_relative_eq!(d[1], -0.2, epsilon = 1e-12);
    }

    #[test]
    fn quaternion_block_shrinks_and_uses_log_map() {
        let mut a = TaskVector::new(5, vec![LieBlock::new(1, LieGroup::UnitQuaternion)]).unwrap();
        let b = a.clone();
        assert_eq!(a.tangent_dim(), 4);

        // Rotate a by 0.3 rad about z; the difference to identity is the
        // rotation vector (0, 0, 0.3).
        let q = UnitQuaternion::from_scaled_axis(Vector3::new(0.0, 0.0, 0.3));
        a.data[1] = q.w;
        a.data[2] = q.i;
        a.data[3] = q.j;
        a.data[4] = q.k;
        let d = a.sub(&b).unwrap();
        assert_relative_eq!(d[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(d[2], 0.0, epsilon = 1e-12);
        assert_relative_eq!(d[3], 0.3, epsilon = 1e-12);
    }

    #[test]
    fn set_zero_writes_identity_quaternion() {
        let v = TaskVector::new(4, vec![LieBlock::new(0, LieGroup::UnitQuaternion)]).unwrap();
        assert_eq!(v.data.as_slice(), &[1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn overlapping_blocks_rejected() {
        let r = TaskVector::new(
            5,
            vec![
                LieBlock::new(0, LieGroup::UnitQuaternion),
                LieBlock::new(3, LieGroup::Angle),
            ],
        );
        assert!(matches!(r, Err(ConfigurationError::InvalidBlock { .. })));
    }

    #[test]
    fn out_of_range_block_rejected() {
        let r = TaskVector::new(3, vec![LieBlock::new(1, LieGroup::UnitQuaternion)]);
        assert!(matches!(r, Err(ConfigurationError::InvalidBlock { .. })));
    }
}
