//! Shape normalizer: coerce inputs to a canonical batch rank.

use ndarray::{ArrayD, ArrayViewD, Axis};

use crate::error::{LinalgError, Result};

/// Left-pad `x` with singleton axes until it has `to_ndim` axes.
///
/// Arrays already at `to_ndim` pass through unchanged. A rank above
/// `to_ndim` is a shape error.
pub fn to_ndarray<'a, T>(x: ArrayViewD<'a, T>, to_ndim: usize) -> Result<ArrayViewD<'a, T>> {
    if x.ndim() > to_ndim {
        return Err(LinalgError::shape(format!(
            "rank {} exceeds target rank {}",
            x.ndim(),
            to_ndim
        )));
    }
    let mut view = x;
    while view.ndim() < to_ndim {
        view = view.insert_axis(Axis(0));
    }
    Ok(view)
}

/// Normalize `x` to `core_rank + 1` axes.
///
/// Returns the batched view and whether the caller's input already carried
/// a batch axis.
pub fn as_batch<'a, T>(x: ArrayViewD<'a, T>, core_rank: usize) -> Result<(ArrayViewD<'a, T>, bool)> {
    if x.ndim() < core_rank {
        return Err(LinalgError::shape(format!(
            "expected at least {} axes, got shape {:?}",
            core_rank,
            x.shape()
        )));
    }
    let batched = x.ndim() == core_rank + 1;
    Ok((to_ndarray(x, core_rank + 1)?, batched))
}

/// Check that the last two axes of `x` are equal and return their size.
pub fn require_square<T>(x: &ArrayViewD<'_, T>) -> Result<usize> {
    let nd = x.ndim();
    if nd < 2 {
        return Err(LinalgError::shape(format!(
            "expected a matrix, got shape {:?}",
            x.shape()
        )));
    }
    let (rows, cols) = (x.shape()[nd - 2], x.shape()[nd - 1]);
    if rows != cols {
        return Err(LinalgError::shape(format!(
            "expected square matrices, got {}x{}",
            rows, cols
        )));
    }
    Ok(rows)
}

/// Drop the leading batch axis when the original input was unbatched.
pub fn unbatch<T>(x: ArrayD<T>, batched: bool) -> ArrayD<T> {
    if !batched && x.ndim() > 0 && x.len_of(Axis(0)) == 1 {
        x.index_axis_move(Axis(0), 0)
    } else {
        x
    }
}
