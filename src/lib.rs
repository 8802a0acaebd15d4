//! # manifold-backend
//!
//! Batched linear algebra for differential-geometry code, dispatched to
//! whichever numeric engine the process selects at start-up.
//!
//! ## Layers
//!
//! 1. **Shape normalization**: single matrices become batches of one
//! 2. **Vectorized kernels**: 2-D routines lifted over a leading batch axis
//! 3. **Structure predicates**: symmetric, skew, diagonal, triangular, SPD
//! 4. **Primitive registration**: opaque kernels with optional JVP rules
//! 5. **Backend facade**: one API, engine fixed once per process
//!
//! Geometry code calls the free functions in [`linalg`] exactly like a
//! conventional linear-algebra API: `(rows, cols)` for one matrix,
//! `(batch, rows, cols)` for a stack of them.

pub mod array;
pub mod autodiff;
pub mod backend;
pub mod error;
pub mod kernels;
pub mod linalg;
pub mod structure;

pub use array::Array;
pub use backend::{BackendConfig, BackendKind, LinalgBackend};
pub use error::{LinalgError, Result};

/// Numeric constants shared by every engine.
pub mod config {
    /// Absolute tolerance for structural predicates.
    pub const SYMMETRY_TOL: f64 = 1e-10;

    /// Symmetry tolerance used to admit the Sylvester eigen fast path.
    pub const SYLVESTER_SYMMETRY_TOL: f64 = 1e-6;

    /// Smallest eigenvalue admitted by the Sylvester eigen fast path.
    /// Anything below silently takes the generic solver.
    pub const SYLVESTER_EIGVAL_FLOOR: f64 = 1e-6;

    /// Denman-Beavers iteration cap for `sqrtm`.
    pub const SQRTM_MAX_ITER: usize = 100;

    /// Relative step size at which Denman-Beavers is considered converged.
    pub const SQRTM_TOL: f64 = 1e-13;

    /// Maximum number of square roots taken by `logm` before the series.
    pub const LOGM_MAX_SQRT: usize = 64;

    /// `logm` takes square roots until `||A - I||_F` drops below this.
    pub const LOGM_SERIES_RADIUS: f64 = 0.25;

    /// Maximum number of odd terms in the `atanh` series for `logm`.
    pub const LOGM_SERIES_TERMS: usize = 40;

    /// Eigenvalues above `-EIGEN_CLAMP` count as non-negative in `sqrtm`.
    pub const EIGEN_CLAMP: f64 = 1e-12;

    /// Environment variable naming the engine (`eager` or `traced`).
    pub const BACKEND_ENV: &str = "MANIFOLD_BACKEND";

    /// Environment variable naming the batch mode (`sequential` or `parallel`).
    pub const BATCH_MODE_ENV: &str = "MANIFOLD_BATCH_MODE";
}
