//! Public linear-algebra surface.
//!
//! Conventional names and argument order, dispatched to the process
//! engine. Geometry code should call these rather than any engine
//! directly.
//!
//! Every function accepts a single matrix `(m, n)` or a stack
//! `(batch, m, n)`. A stack keeps its batch axis in the result, even a
//! stack of one; a single matrix comes back unbatched. Rank below 2 or
//! above 3 is a [`LinalgError::Shape`](crate::error::LinalgError::Shape).

use ndarray::ArrayViewD;

use crate::array::{Array, ComplexArray};
use crate::backend::active;
use crate::config::SYMMETRY_TOL;
use crate::error::Result;

pub use crate::array::ops::{matmul, to_skew_symmetric, to_symmetric, trace, transpose};
pub use crate::autodiff::jvp::{jvp, Dual};
pub use crate::structure::{
    is_diagonal, is_lower_triangular, is_skew_symmetric, is_spd, is_square, is_upper_triangular,
};

/// Batched matrix exponential. Square input only.
///
/// On the traced engine this is the natively batched kernel and is
/// differentiable through [`Dual::expm`].
pub fn expm(x: &ArrayViewD<'_, f64>) -> Result<Array> {
    active().expm(x)
}

/// Principal matrix logarithm.
///
/// Inputs with eigenvalues on the closed negative real axis have no
/// principal logarithm and fail. Never differentiable.
pub fn logm(x: &ArrayViewD<'_, f64>) -> Result<Array> {
    active().logm(x)
}

/// Principal matrix square root, `S S = X`.
pub fn sqrtm(x: &ArrayViewD<'_, f64>) -> Result<Array> {
    active().sqrtm(x)
}

/// Solve `A X + X B = Q` for `X` of shape `(m, n)`.
///
/// `A` is `(m, m)`, `B` is `(n, n)`. When `A` and `B` are the same
/// symmetric positive-definite matrix the solve goes through one
/// eigendecomposition; anything else uses the dense Kronecker solver.
/// Fails with `Singular` when `A` and `-B` share an eigenvalue.
pub fn solve_sylvester(a: &ArrayViewD<'_, f64>, b: &ArrayViewD<'_, f64>, q: &ArrayViewD<'_, f64>) -> Result<Array> {
    active().solve_sylvester(a, b, q)
}

/// Reduced QR: `(m,n) -> (m,k),(k,n)` with `k = min(m,n)`.
pub fn qr(x: &ArrayViewD<'_, f64>) -> Result<(Array, Array)> {
    active().qr(x)
}

/// Lower Cholesky factor `L` with `L Lᵗ = X`.
///
/// Fails with `NotPositiveDefinite` when any batch element is not SPD.
pub fn cholesky(x: &ArrayViewD<'_, f64>) -> Result<Array> {
    active().cholesky(x)
}

/// Determinant per matrix: `(n,n) -> ()`.
pub fn det(x: &ArrayViewD<'_, f64>) -> Result<Array> {
    active().det(x)
}

/// Matrix inverse. Fails with `Singular` on a non-invertible element.
pub fn inv(x: &ArrayViewD<'_, f64>) -> Result<Array> {
    active().inv(x)
}

/// General eigendecomposition `(n,n) -> (n),(n,n)`, complex valued,
/// eigenvectors in columns. No ordering guarantee.
pub fn eig(x: &ArrayViewD<'_, f64>) -> Result<(ComplexArray, ComplexArray)> {
    active().eig(x)
}

/// Symmetric eigendecomposition `(n,n) -> (n),(n,n)`, eigenvalues
/// ascending, eigenvectors in columns. Only the symmetric part of `x` is
/// meaningful.
pub fn eigh(x: &ArrayViewD<'_, f64>) -> Result<(Array, Array)> {
    active().eigh(x)
}

/// Eigenvalues of a symmetric matrix, ascending.
pub fn eigvalsh(x: &ArrayViewD<'_, f64>) -> Result<Array> {
    active().eigvalsh(x)
}

/// Reduced SVD `(m,n) -> (m,k),(k),(k,n)`, singular values descending.
pub fn svd(x: &ArrayViewD<'_, f64>) -> Result<(Array, Array, Array)> {
    active().svd(x)
}

/// Frobenius norm per matrix: `(m,n) -> ()`.
pub fn norm(x: &ArrayViewD<'_, f64>) -> Result<Array> {
    active().norm(x)
}

/// One answer for the whole input, batch included.
///
/// True only when every element is square and `|x - xᵗ| < tol`
/// entrywise. [`is_symmetric_default`] uses
/// [`SYMMETRY_TOL`](crate::config::SYMMETRY_TOL).
pub fn is_symmetric(x: &ArrayViewD<'_, f64>, tol: f64) -> Result<bool> {
    active().is_symmetric(x, tol)
}

/// [`is_symmetric`] at the library tolerance `SYMMETRY_TOL` (1e-10).
pub fn is_symmetric_default(x: &ArrayViewD<'_, f64>) -> Result<bool> {
    is_symmetric(x, SYMMETRY_TOL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinalgError;
    use crate::kernels::vectorize::{batch_apply, BatchMode, Signature};
    use crate::kernels::{mat, solve_sylvester_generic};
    use ndarray::{array, Array2, Array3, Axis};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn random_batch(batch: usize, n: usize, scale: f64, seed: u64) -> Array {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, scale).unwrap();
        Array3::from_shape_fn((batch, n, n), |_| normal.sample(&mut rng)).into_dyn()
    }

    fn assert_close(a: &Array, b: &Array, tol: f64) {
        assert_eq!(a.shape(), b.shape());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < tol, "{} vs {}", x, y);
        }
    }

    #[test]
    fn test_logm_inverts_expm() {
        let x = random_batch(4, 3, 0.3, 1);
        let back = logm(&expm(&x.view()).unwrap().view()).unwrap();
        assert_close(&back, &x, 1e-8);
    }

    #[test]
    fn test_logm_inverts_expm_symmetric() {
        let x = to_symmetric(&random_batch(3, 4, 0.5, 2).view()).unwrap();
        let e = expm(&x.view()).unwrap();
        assert!(is_spd(&e.view(), 1e-8).unwrap());
        assert_close(&logm(&e.view()).unwrap(), &x, 1e-9);
    }

    #[test]
    fn test_expm_unbatched_stays_rank_two() {
        let x = array![[0.0, 1.0], [-1.0, 0.0]].into_dyn();
        let e = expm(&x.view()).unwrap();
        assert_eq!(e.shape(), &[2, 2]);
        let (s, c) = 1f64.sin_cos();
        assert_close(&e, &array![[c, s], [-s, c]].into_dyn(), 1e-12);
    }

    #[test]
    fn test_batch_of_one_keeps_batch_axis() {
        let x = array![[[1.0, 0.0], [0.0, 1.0]]].into_dyn();
        assert_eq!(expm(&x.view()).unwrap().shape(), &[1, 2, 2]);
        assert_eq!(logm(&x.view()).unwrap().shape(), &[1, 2, 2]);
    }

    #[test]
    fn test_batch_apply_has_no_cross_talk() {
        let x = random_batch(5, 3, 1.0, 3);
        let sig = Signature::parse("(n,n)->(n,n)").unwrap();
        let out = batch_apply(&sig, &[x.view()], |e| {
            let m = mat(&e[0])?;
            Ok(vec![m.dot(&m.t()).into_dyn()])
        })
        .unwrap()
        .remove(0);
        for (i, m) in x.axis_iter(Axis(0)).enumerate() {
            let m2 = m.into_dimensionality::<ndarray::Ix2>().unwrap();
            let want = m2.dot(&m2.t()).into_dyn();
            assert_close(&out.index_axis(Axis(0), i).to_owned(), &want, 1e-14);
        }
    }

    #[test]
    fn test_identity_kernel_unbatched() {
        let x = Array2::from_shape_fn((3, 3), |(i, j)| (i * 3 + j) as f64).into_dyn();
        let sig = Signature::parse("(m,n)->(m,n)").unwrap();
        let out = batch_apply(&sig, &[x.view()], |e| Ok(vec![e[0].to_owned()]))
            .unwrap()
            .remove(0);
        assert_eq!(out.shape(), &[3, 3]);
        assert_eq!(out, x);
    }

    #[test]
    fn test_sylvester_scenario() {
        let a = array![[1.0, 0.0], [0.0, 2.0]].into_dyn();
        let q = array![[1.0, 2.0], [3.0, 4.0]].into_dyn();
        let x = solve_sylvester(&a.view(), &a.view(), &q.view()).unwrap();
        assert_close(&x, &array![[0.5, 2.0 / 3.0], [1.0, 1.0]].into_dyn(), 1e-12);
        let resid = matmul(&a.view(), &x.view()).unwrap() + matmul(&x.view(), &a.view()).unwrap();
        assert_close(&resid, &q, 1e-12);
    }

    #[test]
    fn test_sylvester_fast_and_generic_agree() {
        let m = random_batch(3, 4, 1.0, 4);
        let a = matmul(&m.view(), &transpose(&m.view()).unwrap().view()).unwrap()
            + Array3::from_shape_fn((3, 4, 4), |(_, i, j)| if i == j { 1.0 } else { 0.0 }).into_dyn();
        let q = random_batch(3, 4, 1.0, 5);
        let fast = solve_sylvester(&a.view(), &a.view(), &q.view()).unwrap();
        let slow = solve_sylvester_generic(&a.view(), &a.view(), &q.view(), BatchMode::Sequential).unwrap();
        assert_close(&fast, &slow, 1e-8);
    }

    #[test]
    fn test_sylvester_rectangular_generic() {
        let a = array![[2.0, 1.0], [0.0, 3.0]].into_dyn();
        let b = array![[1.0, 0.0, 0.0], [0.0, 4.0, 1.0], [0.0, 0.0, 5.0]].into_dyn();
        let q = array![[1.0, 0.0, 2.0], [0.5, 1.0, 0.0]].into_dyn();
        let x = solve_sylvester(&a.view(), &b.view(), &q.view()).unwrap();
        assert_eq!(x.shape(), &[2, 3]);
        let resid = matmul(&a.view(), &x.view()).unwrap() + matmul(&x.view(), &b.view()).unwrap();
        assert_close(&resid, &q, 1e-10);
    }

    #[test]
    fn test_is_symmetric_scenarios() {
        let m = array![[1.0, 2.0], [2.0, 1.0]].into_dyn();
        assert!(is_symmetric(&m.view(), SYMMETRY_TOL).unwrap());
        let batch = array![[[1.0, 2.0], [2.0, 1.0]], [[1.0, 2.0], [2.5, 1.0]]].into_dyn();
        assert!(!is_symmetric(&batch.view(), SYMMETRY_TOL).unwrap());
    }

    #[test]
    fn test_qr_reconstructs() {
        let x = random_batch(2, 3, 1.0, 6);
        let (q, r) = qr(&x.view()).unwrap();
        assert_close(&matmul(&q.view(), &r.view()).unwrap(), &x, 1e-12);
        assert!(is_upper_triangular(&r.view(), 1e-12).unwrap());
    }

    #[test]
    fn test_reexported_kernels() {
        let x = array![[4.0, 2.0], [2.0, 3.0]].into_dyn();
        let l = cholesky(&x.view()).unwrap();
        assert!(is_lower_triangular(&l.view(), SYMMETRY_TOL).unwrap());
        assert!((det(&x.view()).unwrap().sum() - 8.0).abs() < 1e-12);
        let eye = matmul(&x.view(), &inv(&x.view()).unwrap().view()).unwrap();
        assert!(is_diagonal(&eye.view(), 1e-12).unwrap());

        let (w, v) = eigh(&x.view()).unwrap();
        assert_close(&w, &eigvalsh(&x.view()).unwrap(), 1e-12);
        assert_eq!(v.shape(), &[2, 2]);

        let (u, s, vt) = svd(&x.view()).unwrap();
        assert_eq!(u.shape(), &[2, 2]);
        assert_eq!(s.shape(), &[2]);
        assert_eq!(vt.shape(), &[2, 2]);
        let n = norm(&x.view()).unwrap();
        assert!((n.sum() - 33f64.sqrt()).abs() < 1e-12);

        let (ew, _) = eig(&x.view()).unwrap();
        let mut re: Vec<f64> = ew.iter().map(|c| c.re).collect();
        re.sort_by(|a, b| a.total_cmp(b));
        assert_close(&Array::from_shape_vec(ndarray::IxDyn(&[2]), re).unwrap(), &w, 1e-10);
    }

    #[test]
    fn test_sqrtm_squares_back() {
        let x = array![[5.0, 1.0], [1.0, 2.0]].into_dyn();
        let s = sqrtm(&x.view()).unwrap();
        assert_close(&matmul(&s.view(), &s.view()).unwrap(), &x, 1e-10);
    }

    #[test]
    fn test_is_symmetric_default_tolerance() {
        let m = array![[1.0, 2.0], [2.0 + 1e-12, 1.0]].into_dyn();
        assert!(is_symmetric_default(&m.view()).unwrap());
        let loose = array![[1.0, 2.0], [2.0 + 1e-8, 1.0]].into_dyn();
        assert!(!is_symmetric_default(&loose.view()).unwrap());
        assert!(is_symmetric(&loose.view(), 1e-6).unwrap());
        let wide = array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]].into_dyn();
        assert!(!is_symmetric_default(&wide.view()).unwrap());
    }

    #[test]
    fn test_symmetric_parts_reject_non_square() {
        let wide = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn();
        assert!(matches!(to_symmetric(&wide.view()), Err(LinalgError::Shape(_))));
        assert!(matches!(to_skew_symmetric(&wide.view()), Err(LinalgError::Shape(_))));
    }

    #[test]
    fn test_rank_out_of_range_is_shape_error() {
        let rank4 = ndarray::Array4::<f64>::zeros((2, 2, 3, 3)).into_dyn();
        assert!(matches!(expm(&rank4.view()), Err(LinalgError::Shape(_))));
        assert!(matches!(inv(&rank4.view()), Err(LinalgError::Shape(_))));
        let vector = array![1.0, 2.0, 3.0].into_dyn();
        assert!(matches!(expm(&vector.view()), Err(LinalgError::Shape(_))));
        assert!(matches!(det(&vector.view()), Err(LinalgError::Shape(_))));
    }

    #[test]
    fn test_non_square_kernels_fail() {
        let wide = Array3::<f64>::zeros((2, 2, 3)).into_dyn();
        assert!(expm(&wide.view()).is_err());
        assert!(matches!(inv(&wide.view()), Err(LinalgError::Shape(_))));
        assert!(matches!(cholesky(&wide.view()), Err(LinalgError::Shape(_))));
    }

    #[test]
    fn test_numerical_failures_surface() {
        let singular = array![[1.0, 2.0], [2.0, 4.0]].into_dyn();
        assert!(matches!(inv(&singular.view()), Err(LinalgError::Singular)));
        let indefinite = array![[1.0, 0.0], [0.0, -1.0]].into_dyn();
        assert!(matches!(cholesky(&indefinite.view()), Err(LinalgError::NotPositiveDefinite)));
    }

    #[test]
    fn test_sylvester_shape_mismatch() {
        let a = array![[1.0, 0.0], [0.0, 2.0]].into_dyn();
        let q = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn();
        assert!(matches!(solve_sylvester(&a.view(), &a.view(), &q.view()), Err(LinalgError::Shape(_))));
    }
}
