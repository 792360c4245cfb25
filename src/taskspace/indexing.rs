//! Slice bookkeeping for stacked tasks.

/// Where one task lives inside a stack's buffers.
///
/// `start`/`length` index the value vector, `start_jacobian`/
/// `length_jacobian` the tangent side (residual and Jacobian rows). Slices
/// are contiguous, non-overlapping, follow registration order, and their
/// lengths sum to the stack totals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskIndexing {
    pub id: usize,
    pub start: usize,
    pub length: usize,
    pub start_jacobian: usize,
    pub length_jacobian: usize,
}

/// Assign contiguous slices by cumulative sum over `(length,
/// length_jacobian)` pairs. Returns the records and the two totals.
pub fn partition(dims: &[(usize, usize)]) -> (Vec<TaskIndexing>, usize, usize) {
    let mut indexing = Vec::with_capacity(dims.len());
    let mut length = 0;
    let mut length_jacobian = 0;
    for (id, &(len, len_jac)) in dims.iter().enumerate() {
        indexing.push(TaskIndexing {
            id,
            start: length,
            length: len,
            start_jacobian: length_jacobian,
            length_jacobian: len_jac,
        });
        length += len;
        length_jacobian += len_jac;
    }
    (indexing, length, length_jacobian)
}
