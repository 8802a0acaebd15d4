//! Sylvester equation `A X + X B = Q`.
//!
//! When `A` and `B` are the same symmetric matrix with eigenvalues at or
//! above [`SYLVESTER_EIGVAL_FLOOR`], the equation diagonalizes: with
//! `A = V Λ Vᵗ` and `Q̃ = Vᵗ Q V`, the solution is
//! `X = V (Q̃ ./ (λ_i + λ_j)) Vᵗ`. Everything else goes through the
//! vectorized Kronecker solver.

use ndarray::ArrayViewD;
use tracing::debug;

use crate::array::Array;
use crate::config::{SYLVESTER_EIGVAL_FLOOR, SYLVESTER_SYMMETRY_TOL};
use crate::error::Result;
use crate::kernels::vectorize::{batch_apply_one, BatchMode, Signature};
use crate::kernels::{eigh, mat, solve_sylvester_generic};
use crate::structure;

/// Shared eigendecomposition of the coefficient admitted by the fast path.
#[derive(Clone, Debug)]
pub struct SharedEigen {
    /// `(n)` or `(batch, n)`, ascending.
    pub values: Array,
    /// `(n, n)` or `(batch, n, n)`, eigenvectors in columns.
    pub vectors: Array,
}

/// Decide whether `(a, b)` qualify for the eigen fast path.
///
/// Returns the decomposition on success. Failing the checks is not an
/// error; the caller falls back to the generic solver.
pub fn fast_path(a: &ArrayViewD<'_, f64>, b: &ArrayViewD<'_, f64>) -> Result<Option<SharedEigen>> {
    if a.shape() != b.shape() || a.ndim() < 2 || a != b {
        return Ok(None);
    }
    let nd = a.ndim();
    if a.shape()[nd - 1] != a.shape()[nd - 2] {
        return Ok(None);
    }
    if !structure::is_symmetric(a, SYLVESTER_SYMMETRY_TOL)? {
        return Ok(None);
    }
    let (values, vectors) = eigh(a, BatchMode::Sequential)?;
    if values.iter().any(|&l| l < SYLVESTER_EIGVAL_FLOOR) {
        debug!("sylvester: eigenvalue below floor, using generic solver");
        return Ok(None);
    }
    Ok(Some(SharedEigen { values, vectors }))
}

/// Closed-form solve given the shared eigendecomposition.
pub fn solve_with_eigen(eig: &SharedEigen, q: &ArrayViewD<'_, f64>, mode: BatchMode) -> Result<Array> {
    let sig = Signature::parse("(n),(n,n),(n,n)->(n,n)")?;
    batch_apply_one(mode, &sig, &[eig.values.view(), eig.vectors.view(), q.view()], |e| {
        let w = e[0].view().into_dimensionality::<ndarray::Ix1>()?;
        let v = mat(&e[1])?;
        let q = mat(&e[2])?;
        let mut tilde = v.t().dot(&q).dot(&v);
        for ((i, j), x) in tilde.indexed_iter_mut() {
            *x /= w[i] + w[j];
        }
        Ok(v.dot(&tilde).dot(&v.t()).into_dyn())
    })
}

/// Solve `A X + X B = Q`, preferring the eigen fast path.
pub fn solve_sylvester(
    a: &ArrayViewD<'_, f64>,
    b: &ArrayViewD<'_, f64>,
    q: &ArrayViewD<'_, f64>,
    mode: BatchMode,
) -> Result<Array> {
    if let Some(eig) = fast_path(a, b)? {
        debug!(shape = ?q.shape(), "sylvester: shared symmetric fast path");
        return solve_with_eigen(&eig, q, mode);
    }
    solve_sylvester_generic(a, b, q, mode)
}
