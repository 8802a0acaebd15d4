//! Non-batched reference kernels on single matrices.
//!
//! Decompositions come from `nalgebra`. The routines nalgebra does not ship
//! (`logm`, `sqrtm`, the Sylvester solver, eigenvectors of a general
//! matrix) are assembled from its factorizations here. Everything in this
//! module works on one `ArrayView2` at a time; batching lives in
//! [`super::vectorize`].

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView2};
use num_complex::Complex64;

use crate::config::{
    EIGEN_CLAMP, LOGM_MAX_SQRT, LOGM_SERIES_RADIUS, LOGM_SERIES_TERMS, SQRTM_MAX_ITER, SQRTM_TOL,
    SYMMETRY_TOL,
};
use crate::error::{LinalgError, Result};

// ──────────────────────────────────────────────────────────────
// Conversions
// ──────────────────────────────────────────────────────────────

pub(crate) fn to_dmatrix(a: &ArrayView2<'_, f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

pub(crate) fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

fn square_dim(a: &ArrayView2<'_, f64>, routine: &str) -> Result<usize> {
    if a.nrows() != a.ncols() {
        return Err(LinalgError::shape(format!(
            "{} needs a square matrix, got {}x{}",
            routine,
            a.nrows(),
            a.ncols()
        )));
    }
    Ok(a.nrows())
}

fn is_symmetric_2d(m: &DMatrix<f64>, tol: f64) -> bool {
    m.is_square() && (0..m.nrows()).all(|i| (0..i).all(|j| (m[(i, j)] - m[(j, i)]).abs() < tol))
}

/// Rebuild `V f(Λ) Vᵗ` from a symmetric eigendecomposition.
fn eigen_map(eig: &SymmetricEigen<f64, nalgebra::Dyn>, f: impl Fn(f64) -> f64) -> DMatrix<f64> {
    let v = &eig.eigenvectors;
    let diag = DMatrix::from_diagonal(&eig.eigenvalues.map(f));
    v * diag * v.transpose()
}

// ──────────────────────────────────────────────────────────────
// Matrix functions
// ──────────────────────────────────────────────────────────────

/// Matrix exponential (nalgebra's scaling-and-squaring Padé).
pub fn expm(a: &ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    square_dim(a, "expm")?;
    Ok(from_dmatrix(&to_dmatrix(a).exp()))
}

/// Principal matrix square root.
///
/// Symmetric positive semi-definite inputs use the eigen route; everything
/// else runs Denman-Beavers, which needs an invertible matrix with no
/// eigenvalues on the closed negative real axis.
pub fn sqrtm(a: &ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    square_dim(a, "sqrtm")?;
    Ok(from_dmatrix(&sqrtm_dmatrix(&to_dmatrix(a))?))
}

fn sqrtm_dmatrix(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if is_symmetric_2d(m, SYMMETRY_TOL) {
        let eig = SymmetricEigen::new(m.clone());
        if eig.eigenvalues.iter().all(|&l| l >= -EIGEN_CLAMP) {
            return Ok(eigen_map(&eig, |l| l.max(0.0).sqrt()));
        }
    }
    denman_beavers(m)
}

fn denman_beavers(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let n = m.nrows();
    // Y -> sqrt(M), Z -> sqrt(M)⁻¹.
    let mut y = m.clone();
    let mut z = DMatrix::<f64>::identity(n, n);
    for _ in 0..SQRTM_MAX_ITER {
        let y_inv = y.clone().try_inverse().ok_or(LinalgError::Singular)?;
        let z_inv = z.clone().try_inverse().ok_or(LinalgError::Singular)?;
        let y_next = (&y + z_inv) * 0.5;
        let z_next = (&z + y_inv) * 0.5;
        let step = (&y_next - &y).norm();
        y = y_next;
        z = z_next;
        if !step.is_finite() {
            break;
        }
        if step <= SQRTM_TOL * y.norm().max(1.0) {
            return Ok(y);
        }
    }
    Err(LinalgError::NoConvergence {
        routine: "sqrtm",
        iterations: SQRTM_MAX_ITER,
    })
}

/// Principal matrix logarithm.
///
/// Symmetric positive definite inputs use the eigen route. Otherwise the
/// inverse scaling-and-squaring method: take square roots until the matrix
/// is close to the identity, sum `2 atanh(Z)` with `Z = (M - I)(M + I)⁻¹`,
/// then scale back by `2^k`.
pub fn logm(a: &ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    let n = square_dim(a, "logm")?;
    let mut m = to_dmatrix(a);

    if is_symmetric_2d(&m, SYMMETRY_TOL) {
        let eig = SymmetricEigen::new(m.clone());
        if eig.eigenvalues.iter().all(|&l| l > 0.0) {
            return Ok(from_dmatrix(&eigen_map(&eig, f64::ln)));
        }
    }

    let id = DMatrix::<f64>::identity(n, n);
    let mut roots = 0usize;
    while (&m - &id).norm() > LOGM_SERIES_RADIUS {
        if roots >= LOGM_MAX_SQRT {
            return Err(LinalgError::NoConvergence {
                routine: "logm",
                iterations: roots,
            });
        }
        m = denman_beavers(&m)?;
        roots += 1;
    }

    // log M = 2 atanh(Z) = 2 (Z + Z³/3 + Z⁵/5 + ...).
    let denom = (&m + &id).try_inverse().ok_or(LinalgError::Singular)?;
    let z = (&m - &id) * denom;
    let z2 = &z * &z;
    let mut term = z.clone();
    let mut acc = z;
    for j in 1..LOGM_SERIES_TERMS {
        term = &term * &z2;
        let contrib = &term / (2 * j + 1) as f64;
        let size = contrib.norm();
        acc += contrib;
        if size <= f64::EPSILON * acc.norm() {
            break;
        }
    }
    let scale = 2.0 * 2f64.powi(roots as i32);
    Ok(from_dmatrix(&(acc * scale)))
}

// ──────────────────────────────────────────────────────────────
// Equations and decompositions
// ──────────────────────────────────────────────────────────────

/// Solve `A X + X B = Q` through the Kronecker system
/// `(I ⊗ A + Bᵗ ⊗ I) vec(X) = vec(Q)` (column-major `vec`).
pub fn solve_sylvester(
    a: &ArrayView2<'_, f64>,
    b: &ArrayView2<'_, f64>,
    q: &ArrayView2<'_, f64>,
) -> Result<Array2<f64>> {
    let m = square_dim(a, "solve_sylvester")?;
    let n = square_dim(b, "solve_sylvester")?;
    if q.dim() != (m, n) {
        return Err(LinalgError::shape(format!(
            "solve_sylvester: Q is {:?}, expected ({}, {})",
            q.dim(),
            m,
            n
        )));
    }

    // Unknown X[i, j] lives at vec index i + j*m; one equation per (i, j).
    let size = m * n;
    let mut k = DMatrix::<f64>::zeros(size, size);
    for j in 0..n {
        for i in 0..m {
            let row = i + j * m;
            // (A X)[i, j] = sum_l A[i, l] X[l, j]: the I ⊗ A block.
            for l in 0..m {
                k[(row, l + j * m)] += a[[i, l]];
            }
            // (X B)[i, j] = sum_l X[i, l] B[l, j]: the Bᵗ ⊗ I block.
            for l in 0..n {
                k[(row, i + l * m)] += b[[l, j]];
            }
        }
    }
    // vec(Q) in the same column-major order.
    let rhs = DVector::from_fn(size, |r, _| q[[r % m, r / m]]);
    // Singular K means A and -B share an eigenvalue.
    let sol = k.lu().solve(&rhs).ok_or(LinalgError::Singular)?;
    if sol.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::Singular);
    }
    // Undo vec.
    Ok(Array2::from_shape_fn((m, n), |(i, j)| sol[i + j * m]))
}

/// Reduced QR: `(n, m) -> (n, k), (k, m)` with `k = min(n, m)`.
pub fn qr(a: &ArrayView2<'_, f64>) -> Result<(Array2<f64>, Array2<f64>)> {
    let decomp = to_dmatrix(a).qr();
    Ok((from_dmatrix(&decomp.q()), from_dmatrix(&decomp.r())))
}

/// Lower Cholesky factor.
pub fn cholesky(a: &ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    square_dim(a, "cholesky")?;
    let chol = to_dmatrix(a).cholesky().ok_or(LinalgError::NotPositiveDefinite)?;
    Ok(from_dmatrix(&chol.l()))
}

pub fn det(a: &ArrayView2<'_, f64>) -> Result<f64> {
    square_dim(a, "det")?;
    Ok(to_dmatrix(a).determinant())
}

pub fn inv(a: &ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    square_dim(a, "inv")?;
    let inverse = to_dmatrix(a).try_inverse().ok_or(LinalgError::Singular)?;
    Ok(from_dmatrix(&inverse))
}

/// Symmetric eigendecomposition, eigenvalues ascending.
pub fn eigh(a: &ArrayView2<'_, f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    let n = square_dim(a, "eigh")?;
    let eig = SymmetricEigen::new(to_dmatrix(a));
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| eig.eigenvalues[i].total_cmp(&eig.eigenvalues[j]));
    let values = Array1::from_iter(order.iter().map(|&i| eig.eigenvalues[i]));
    let vectors = Array2::from_shape_fn((n, n), |(r, c)| eig.eigenvectors[(r, order[c])]);
    Ok((values, vectors))
}

pub fn eigvalsh(a: &ArrayView2<'_, f64>) -> Result<Array1<f64>> {
    let n = square_dim(a, "eigvalsh")?;
    let mut values: Vec<f64> = SymmetricEigen::new(to_dmatrix(a)).eigenvalues.iter().copied().collect();
    values.sort_by(f64::total_cmp);
    debug_assert_eq!(values.len(), n);
    Ok(Array1::from_vec(values))
}

/// General eigendecomposition via the complex Schur form `A = Q T Q*`.
///
/// Eigenvectors of the triangular factor come from back substitution and
/// are mapped through `Q`, then scaled to unit length.
pub fn eig(a: &ArrayView2<'_, f64>) -> Result<(Array1<Complex64>, Array2<Complex64>)> {
    let n = square_dim(a, "eig")?;
    let c: DMatrix<Complex64> = to_dmatrix(a).map(|v| Complex64::new(v, 0.0));
    let (q, t) = c.schur().unpack();

    let values = Array1::from_iter((0..n).map(|k| t[(k, k)]));
    let scale = t.iter().map(|z| z.norm()).fold(0.0, f64::max).max(1.0);
    let tiny = f64::EPSILON * scale;

    let mut vectors = Array2::<Complex64>::zeros((n, n));
    for k in 0..n {
        let lambda = t[(k, k)];
        let mut y = DVector::<Complex64>::zeros(n);
        y[k] = Complex64::new(1.0, 0.0);
        for i in (0..k).rev() {
            let mut s = Complex64::new(0.0, 0.0);
            for j in i + 1..=k {
                s += t[(i, j)] * y[j];
            }
            let mut d = t[(i, i)] - lambda;
            if d.norm() < tiny {
                d = Complex64::new(tiny, 0.0);
            }
            y[i] = -s / d;
        }
        let v = &q * y;
        let len = v.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt();
        for r in 0..n {
            vectors[[r, k]] = v[r] / len;
        }
    }
    Ok((values, vectors))
}

/// Reduced SVD `(m, n) -> (m, k), (k), (k, n)`, singular values descending.
pub fn svd(a: &ArrayView2<'_, f64>) -> Result<(Array2<f64>, Array1<f64>, Array2<f64>)> {
    let decomp = to_dmatrix(a).svd(true, true);
    let u = decomp
        .u
        .ok_or_else(|| LinalgError::shape("svd: left singular vectors unavailable"))?;
    let v_t = decomp
        .v_t
        .ok_or_else(|| LinalgError::shape("svd: right singular vectors unavailable"))?;
    let s = decomp.singular_values;

    let k = s.len();
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&i, &j| s[j].total_cmp(&s[i]));
    let u_sorted = Array2::from_shape_fn((u.nrows(), k), |(r, c)| u[(r, order[c])]);
    let s_sorted = Array1::from_iter(order.iter().map(|&i| s[i]));
    let vt_sorted = Array2::from_shape_fn((k, v_t.ncols()), |(r, c)| v_t[(order[r], c)]);
    Ok((u_sorted, s_sorted, vt_sorted))
}

/// Frobenius norm.
pub fn norm(a: &ArrayView2<'_, f64>) -> Result<f64> {
    Ok(a.iter().map(|v| v * v).sum::<f64>().sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn close(a: &Array2<f64>, b: &Array2<f64>, tol: f64) -> bool {
        a.shape() == b.shape() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < tol)
    }

    #[test]
    fn test_expm_of_zero_is_identity() {
        let z = Array2::<f64>::zeros((3, 3));
        assert!(close(&expm(&z.view()).unwrap(), &Array2::eye(3), 1e-12));
    }

    #[test]
    fn test_expm_diagonal() {
        let d = array![[1.0, 0.0], [0.0, -2.0]];
        let e = expm(&d.view()).unwrap();
        assert!((e[[0, 0]] - 1f64.exp()).abs() < 1e-10);
        assert!((e[[1, 1]] - (-2f64).exp()).abs() < 1e-10);
    }

    #[test]
    fn test_logm_inverts_expm_nonsymmetric() {
        let x = array![[0.1, 0.4, -0.2], [-0.3, 0.2, 0.1], [0.05, -0.1, -0.3]];
        let back = logm(&expm(&x.view()).unwrap().view()).unwrap();
        assert!(close(&back, &x, 1e-8), "{:?}", back);
    }

    #[test]
    fn test_logm_spd_eigen_path() {
        let a = array![[2.0, 0.5], [0.5, 1.0]];
        let l = logm(&a.view()).unwrap();
        let back = expm(&l.view()).unwrap();
        assert!(close(&back, &a, 1e-10));
    }

    #[test]
    fn test_sqrtm_squares_back() {
        let a = array![[4.0, 1.0, 0.0], [0.5, 3.0, 0.2], [0.0, 0.3, 2.0]];
        let s = sqrtm(&a.view()).unwrap();
        assert!(close(&s.dot(&s), &a, 1e-9));
    }

    #[test]
    fn test_sqrtm_singular_psd() {
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        let s = sqrtm(&a.view()).unwrap();
        assert!(close(&s.dot(&s), &a, 1e-10));
    }

    #[test]
    fn test_sylvester_residual() {
        let a = array![[3.0, 1.0], [0.0, 2.0]];
        let b = array![[1.0, 0.5, 0.0], [0.0, 4.0, 1.0], [0.2, 0.0, 2.0]];
        let q = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let x = solve_sylvester(&a.view(), &b.view(), &q.view()).unwrap();
        let residual = a.dot(&x) + x.dot(&b);
        assert!(close(&residual, &q, 1e-10));
    }

    #[test]
    fn test_sylvester_shape_mismatch() {
        let a = Array2::<f64>::eye(2);
        let b = Array2::<f64>::eye(3);
        let q = Array2::<f64>::zeros((3, 2));
        assert!(matches!(
            solve_sylvester(&a.view(), &b.view(), &q.view()),
            Err(LinalgError::Shape(_))
        ));
    }

    #[test]
    fn test_qr_reduced_shapes() {
        let a = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let (q, r) = qr(&a.view()).unwrap();
        assert_eq!(q.dim(), (3, 2));
        assert_eq!(r.dim(), (2, 2));
        assert!(close(&q.dot(&r), &a, 1e-10));
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(matches!(cholesky(&a.view()), Err(LinalgError::NotPositiveDefinite)));
        let spd = array![[4.0, 2.0], [2.0, 3.0]];
        let l = cholesky(&spd.view()).unwrap();
        assert!(close(&l.dot(&l.t()), &spd, 1e-12));
        assert_eq!(l[[0, 1]], 0.0);
    }

    #[test]
    fn test_inv_singular() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(matches!(inv(&a.view()), Err(LinalgError::Singular)));
    }

    #[test]
    fn test_eigh_ascending() {
        let a = array![[2.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 5.0]];
        let (w, v) = eigh(&a.view()).unwrap();
        for (got, want) in w.iter().zip([-1.0, 2.0, 5.0]) {
            assert!((got - want).abs() < 1e-12);
        }
        let rebuilt = v.dot(&Array2::from_diag(&w)).dot(&v.t());
        assert!(close(&rebuilt, &a, 1e-12));
    }

    #[test]
    fn test_eig_rotation_has_imaginary_pair() {
        let a = array![[0.0, -1.0], [1.0, 0.0]];
        let (w, v) = eig(&a.view()).unwrap();
        let mut imag: Vec<f64> = w.iter().map(|z| z.im).collect();
        imag.sort_by(f64::total_cmp);
        assert!((imag[0] + 1.0).abs() < 1e-12 && (imag[1] - 1.0).abs() < 1e-12);
        for k in 0..2 {
            for r in 0..2 {
                let av: Complex64 = (0..2).map(|c| Complex64::new(a[[r, c]], 0.0) * v[[c, k]]).sum();
                assert!((av - w[k] * v[[r, k]]).norm() < 1e-10);
            }
        }
    }

    #[test]
    fn test_svd_descending() {
        let a = array![[1.0, 0.0], [0.0, 3.0], [0.0, 0.0]];
        let (u, s, vt) = svd(&a.view()).unwrap();
        assert!((s[0] - 3.0).abs() < 1e-12 && (s[1] - 1.0).abs() < 1e-12);
        let rebuilt = u.dot(&Array2::from_diag(&s)).dot(&vt);
        assert!(close(&rebuilt, &a, 1e-12));
    }

    #[test]
    fn test_det_and_norm() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        assert!((det(&a.view()).unwrap() + 2.0).abs() < 1e-12);
        assert!((norm(&a.view()).unwrap() - 30f64.sqrt()).abs() < 1e-12);
    }
}
