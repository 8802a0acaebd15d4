//! Error type shared by every kernel and engine.

use thiserror::Error;

/// Errors raised by the backend layer.
///
/// Degenerate inputs to the Sylvester fast path are not errors: they
/// reroute to the generic solver.
#[derive(Debug, Error)]
pub enum LinalgError {
    /// Wrong rank, non-square where square is required, or mismatched batches.
    #[error("shape error: {0}")]
    Shape(String),

    /// Layout failure reported by ndarray while reshaping.
    #[error("layout error: {0}")]
    Layout(#[from] ndarray::ShapeError),

    /// Malformed vectorization signature.
    #[error("invalid signature '{signature}': {reason}")]
    Signature { signature: String, reason: String },

    #[error("matrix is singular")]
    Singular,

    #[error("matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("{routine} did not converge after {iterations} iterations")]
    NoConvergence {
        routine: &'static str,
        iterations: usize,
    },

    /// The primitive (or the active engine) has no differentiation rule.
    #[error("'{0}' is not differentiable on this backend")]
    NotDifferentiable(String),

    #[error("unknown primitive '{0}'")]
    UnknownPrimitive(String),

    #[error("primitive '{name}' expects {expected} inputs, got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    /// The primitive table was already built; registration is closed.
    #[error("primitive table is already initialised")]
    RegistryInitialized,

    /// The process engine was fixed earlier and cannot change.
    #[error("backend already initialised as {active}; cannot switch to {requested}")]
    BackendAlreadySet { active: String, requested: String },
}

impl LinalgError {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        LinalgError::Shape(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, LinalgError>;
