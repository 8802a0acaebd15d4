//! Backend selection: one linear-algebra surface, one engine per process.
//!
//! Each engine implements [`LinalgBackend`]. The process picks one with
//! [`set_backend`] (or lazily from the environment on first [`active`]
//! call); after that the choice is frozen:
//!   Eager  → every kernel through the vectorized adapter, no derivatives
//!   Traced → registered primitives, native batched expm, forward-mode JVP

pub mod config;
mod eager;
mod traced;

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use ndarray::ArrayViewD;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::array::{Array, ComplexArray};
use crate::error::{LinalgError, Result};
use crate::kernels::vectorize::BatchMode;
use crate::structure;

pub use config::BackendConfig;
pub use eager::EagerBackend;
pub use traced::TracedBackend;

/// Engine selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Plain ndarray evaluation.
    Eager,
    /// Primitive table with differentiation rules.
    #[default]
    Traced,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Eager => write!(f, "eager"),
            BackendKind::Traced => write!(f, "traced"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eager" => Ok(BackendKind::Eager),
            "traced" => Ok(BackendKind::Traced),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// The linear-algebra surface every engine provides.
///
/// Shapes follow the usual conventions: `(n, n)` for one matrix,
/// `(batch, n, n)` for a stack. Results keep the batch axis unless every
/// input was a single matrix.
pub trait LinalgBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn batch_mode(&self) -> BatchMode;

    fn expm(&self, x: &ArrayViewD<'_, f64>) -> Result<Array>;

    fn logm(&self, x: &ArrayViewD<'_, f64>) -> Result<Array>;

    fn sqrtm(&self, x: &ArrayViewD<'_, f64>) -> Result<Array>;

    /// Solve `A X + X B = Q`.
    fn solve_sylvester(
        &self,
        a: &ArrayViewD<'_, f64>,
        b: &ArrayViewD<'_, f64>,
        q: &ArrayViewD<'_, f64>,
    ) -> Result<Array>;

    /// Reduced QR: `(n,m) -> (n,k),(k,m)` with `k = min(n,m)`.
    fn qr(&self, x: &ArrayViewD<'_, f64>) -> Result<(Array, Array)>;

    fn cholesky(&self, x: &ArrayViewD<'_, f64>) -> Result<Array>;

    fn det(&self, x: &ArrayViewD<'_, f64>) -> Result<Array>;

    fn inv(&self, x: &ArrayViewD<'_, f64>) -> Result<Array>;

    /// Symmetric eigendecomposition, eigenvalues ascending.
    fn eigh(&self, x: &ArrayViewD<'_, f64>) -> Result<(Array, Array)>;

    fn eigvalsh(&self, x: &ArrayViewD<'_, f64>) -> Result<Array>;

    fn eig(&self, x: &ArrayViewD<'_, f64>) -> Result<(ComplexArray, ComplexArray)>;

    /// Reduced SVD, singular values descending.
    fn svd(&self, x: &ArrayViewD<'_, f64>) -> Result<(Array, Array, Array)>;

    /// Frobenius norm per matrix.
    fn norm(&self, x: &ArrayViewD<'_, f64>) -> Result<Array>;

    fn is_symmetric(&self, x: &ArrayViewD<'_, f64>, tol: f64) -> Result<bool> {
        structure::is_symmetric(x, tol)
    }

    fn supports_jvp(&self) -> bool {
        false
    }

    /// Forward-mode derivative of a registered primitive.
    fn jvp(
        &self,
        name: &str,
        _primals: &[ArrayViewD<'_, f64>],
        _tangents: &[ArrayViewD<'_, f64>],
    ) -> Result<(Vec<Array>, Vec<Array>)> {
        Err(LinalgError::NotDifferentiable(name.to_string()))
    }
}

/// Instantiate the engine a config names.
pub fn create_backend(config: &BackendConfig) -> Box<dyn LinalgBackend> {
    match config.backend {
        BackendKind::Eager => Box::new(EagerBackend::new(config.batch_mode)),
        BackendKind::Traced => Box::new(TracedBackend::new(config.batch_mode)),
    }
}

static ACTIVE: OnceLock<Box<dyn LinalgBackend>> = OnceLock::new();

fn init(config: BackendConfig) -> Box<dyn LinalgBackend> {
    info!(backend = %config.backend, batch_mode = %config.batch_mode, "linalg backend selected");
    create_backend(&config)
}

/// Fix the process engine.
///
/// Requesting the engine that is already active succeeds (its batch mode
/// stays as first configured); any other kind fails.
pub fn set_backend(config: BackendConfig) -> Result<&'static dyn LinalgBackend> {
    let engine = ACTIVE.get_or_init(|| init(config));
    if engine.kind() != config.backend {
        return Err(LinalgError::BackendAlreadySet {
            active: engine.kind().to_string(),
            requested: config.backend.to_string(),
        });
    }
    Ok(engine.as_ref())
}

/// The process engine, selected from the environment if nothing chose yet.
pub fn active() -> &'static dyn LinalgBackend {
    ACTIVE
        .get_or_init(|| init(BackendConfig::from_env_or_default()))
        .as_ref()
}
