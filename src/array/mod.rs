//! Array model and shape handling.
//!
//! A single matrix is rank-2 `(rows, cols)`; a batch is rank-3
//! `(batch, rows, cols)`. Kernels normalize to rank-3 internally and squeeze
//! the batch axis away again when every input was unbatched.

pub mod normalize;
pub mod ops;

use ndarray::ArrayD;
use num_complex::Complex64;

/// Real n-dimensional array consumed and produced by every kernel.
pub type Array = ArrayD<f64>;

/// Complex array returned by the general eigendecomposition.
pub type ComplexArray = ArrayD<Complex64>;

pub use normalize::{as_batch, require_square, to_ndarray, unbatch};
