//! Fail-fast configuration errors.
//!
//! Every fallible surface in this crate reports a [`ConfigurationError`]
//! carrying the expected and actual quantity that disagreed. Errors are
//! raised synchronously, before any output buffer is written, and are never
//! recovered internally.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ConfigurationError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("task '{name}' has not been defined")]
    UnknownTask { name: String },

    #[error("invalid goal size for task '{task}': expected {expected}, got {actual}")]
    InvalidGoalSize {
        task: String,
        expected: String,
        actual: usize,
    },

    #[error("invalid rho size for task '{task}': expected {expected}, got {actual}")]
    InvalidRhoSize {
        task: String,
        expected: String,
        actual: usize,
    },

    /// A caller-provided buffer does not match a declared dimension.
    #[error("wrong size of {what}: expected {expected}, got {actual}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("wrong shape of {what}: expected {expected_rows}x{expected_cols}, got {actual_rows}x{actual_cols}")]
    ShapeMismatch {
        what: &'static str,
        expected_rows: usize,
        expected_cols: usize,
        actual_rows: usize,
        actual_cols: usize,
    },

    #[error("invalid weight element ({row},{col}): weight matrix is {size}x{size}")]
    WeightIndexOutOfRange { row: usize, col: usize, size: usize },

    #[error("invalid weight at ({row},{col}): {value} (must be non-negative)")]
    NegativeWeight { row: usize, col: usize, value: f64 },

    #[error("timestep {t} out of range: horizon is {horizon}")]
    TimestepOutOfRange { t: usize, horizon: usize },

    /// Lie-group blocks must lie inside the vector and must not overlap.
    #[error("invalid coordinate block at offset {offset} (len {len}) in vector of length {vector_len}")]
    InvalidBlock {
        offset: usize,
        len: usize,
        vector_len: usize,
    },
}
