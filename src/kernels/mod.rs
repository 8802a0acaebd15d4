//! Batched numeric kernels.
//!
//! - [`scalar`]: 2-D reference routines (one matrix at a time)
//! - [`vectorize`]: lifts those routines over a leading batch axis
//! - [`sylvester`]: shared-symmetric fast path plus generic fallback
//!
//! The free functions below are the lifted forms every engine builds on.

pub mod scalar;
pub mod sylvester;
pub mod vectorize;

use ndarray::{Array3, ArrayD, ArrayView2, ArrayViewD, Ix2, Ix3, IxDyn, Zip};

use crate::array::normalize::{as_batch, require_square, unbatch};
use crate::array::{Array, ComplexArray};
use crate::error::Result;
use vectorize::{batch_apply_one, batch_apply_with, BatchMode, Signature};

/// View one batch element as a matrix.
pub(crate) fn mat<'a>(v: &ArrayViewD<'a, f64>) -> Result<ArrayView2<'a, f64>> {
    Ok(v.clone().into_dimensionality::<Ix2>()?)
}

fn scalar_out(v: f64) -> ArrayD<f64> {
    ArrayD::from_elem(IxDyn(&[]), v)
}

/// Matrix exponential applied directly across the leading axis.
///
/// No signature matching or restacking: the output buffer is allocated
/// once and every element is written in place, by rayon workers in
/// parallel mode and on the calling thread otherwise.
pub fn expm_batched(x: &ArrayViewD<'_, f64>, mode: BatchMode) -> Result<Array> {
    require_square(x)?;
    let (batch, batched) = as_batch(x.view(), 2)?;
    let batch = batch.into_dimensionality::<Ix3>()?;
    let mut out = Array3::<f64>::zeros(batch.raw_dim());
    let zip = Zip::from(out.outer_iter_mut()).and(batch.outer_iter());
    let write = |mut o: ndarray::ArrayViewMut2<'_, f64>, m: ArrayView2<'_, f64>| {
        o.assign(&scalar::from_dmatrix(&scalar::to_dmatrix(&m).exp()));
    };
    match mode {
        BatchMode::Sequential => zip.for_each(write),
        BatchMode::Parallel => zip.par_for_each(write),
    }
    Ok(unbatch(out.into_dyn(), batched))
}

/// Fréchet derivative of `expm` at `x` in direction `v`.
///
/// Read off the upper-right block of `expm([[X, V], [0, X]])`.
pub fn expm_frechet(x: &ArrayViewD<'_, f64>, v: &ArrayViewD<'_, f64>, mode: BatchMode) -> Result<Array> {
    let sig = Signature::parse("(n,n),(n,n)->(n,n)")?;
    batch_apply_one(mode, &sig, &[x.view(), v.view()], |e| {
        let (x, v) = (mat(&e[0])?, mat(&e[1])?);
        let n = x.nrows();
        let mut block = ndarray::Array2::<f64>::zeros((2 * n, 2 * n));
        block.slice_mut(ndarray::s![..n, ..n]).assign(&x);
        block.slice_mut(ndarray::s![n.., n..]).assign(&x);
        block.slice_mut(ndarray::s![..n, n..]).assign(&v);
        let full = scalar::expm(&block.view())?;
        Ok(full.slice(ndarray::s![..n, n..]).to_owned().into_dyn())
    })
}

/// Matrix exponential through the generic adapter, one element at a time.
///
/// Same result as [`expm_batched`]; the eager engine uses this form.
pub fn expm(x: &ArrayViewD<'_, f64>, mode: BatchMode) -> Result<Array> {
    let sig = Signature::parse("(m,n)->(m,n)")?;
    batch_apply_one(mode, &sig, &[x.view()], |e| Ok(scalar::expm(&mat(&e[0])?)?.into_dyn()))
}

/// Principal logarithm per element. See [`scalar::logm`] for the method.
pub fn logm(x: &ArrayViewD<'_, f64>, mode: BatchMode) -> Result<Array> {
    let sig = Signature::parse("(m,n)->(m,n)")?;
    batch_apply_one(mode, &sig, &[x.view()], |e| Ok(scalar::logm(&mat(&e[0])?)?.into_dyn()))
}

/// Principal square root per element.
pub fn sqrtm(x: &ArrayViewD<'_, f64>, mode: BatchMode) -> Result<Array> {
    let sig = Signature::parse("(n,m)->(n,m)")?;
    batch_apply_one(mode, &sig, &[x.view()], |e| Ok(scalar::sqrtm(&mat(&e[0])?)?.into_dyn()))
}

/// Generic vectorized Sylvester solve, no fast path.
pub fn solve_sylvester_generic(
    a: &ArrayViewD<'_, f64>,
    b: &ArrayViewD<'_, f64>,
    q: &ArrayViewD<'_, f64>,
    mode: BatchMode,
) -> Result<Array> {
    let sig = Signature::parse("(m,m),(n,n),(m,n)->(m,n)")?;
    batch_apply_one(mode, &sig, &[a.view(), b.view(), q.view()], |e| {
        Ok(scalar::solve_sylvester(&mat(&e[0])?, &mat(&e[1])?, &mat(&e[2])?)?.into_dyn())
    })
}

/// Reduced QR, `(n,m) -> (n,k),(k,m)` with `k = min(n,m)`.
///
/// Returned as `(q, r)`; `q` has orthonormal columns and `r` is upper
/// triangular.
pub fn qr(x: &ArrayViewD<'_, f64>, mode: BatchMode) -> Result<(Array, Array)> {
    let sig = Signature::parse("(n,m)->(n,k),(k,m)")?;
    let mut outs = batch_apply_with(mode, &sig, &[x.view()], |e| {
        let (q, r) = scalar::qr(&mat(&e[0])?)?;
        Ok(vec![q.into_dyn(), r.into_dyn()])
    })?;
    let r = outs.remove(1);
    Ok((outs.remove(0), r))
}

/// Lower Cholesky factor per element.
///
/// Any non-SPD element fails the whole call with `NotPositiveDefinite`.
pub fn cholesky(x: &ArrayViewD<'_, f64>, mode: BatchMode) -> Result<Array> {
    let sig = Signature::parse("(n,n)->(n,n)")?;
    batch_apply_one(mode, &sig, &[x.view()], |e| Ok(scalar::cholesky(&mat(&e[0])?)?.into_dyn()))
}

/// Determinant per element: `(n,n) -> ()`, so a stack gives `(batch,)`.
pub fn det(x: &ArrayViewD<'_, f64>, mode: BatchMode) -> Result<Array> {
    let sig = Signature::parse("(n,n)->()")?;
    batch_apply_one(mode, &sig, &[x.view()], |e| Ok(scalar_out(scalar::det(&mat(&e[0])?)?)))
}

/// Inverse per element. Any singular element fails the whole call.
pub fn inv(x: &ArrayViewD<'_, f64>, mode: BatchMode) -> Result<Array> {
    let sig = Signature::parse("(n,n)->(n,n)")?;
    batch_apply_one(mode, &sig, &[x.view()], |e| Ok(scalar::inv(&mat(&e[0])?)?.into_dyn()))
}

/// Symmetric eigendecomposition: `(n,n) -> (n),(n,n)`, eigenvalues ascending.
pub fn eigh(x: &ArrayViewD<'_, f64>, mode: BatchMode) -> Result<(Array, Array)> {
    let sig = Signature::parse("(n,n)->(n),(n,n)")?;
    let mut outs = batch_apply_with(mode, &sig, &[x.view()], |e| {
        let (w, v) = scalar::eigh(&mat(&e[0])?)?;
        Ok(vec![w.into_dyn(), v.into_dyn()])
    })?;
    let vectors = outs.remove(1);
    Ok((outs.remove(0), vectors))
}

/// Symmetric eigenvalues: `(n,n) -> (n)`, ascending.
pub fn eigvalsh(x: &ArrayViewD<'_, f64>, mode: BatchMode) -> Result<Array> {
    let sig = Signature::parse("(n,n)->(n)")?;
    batch_apply_one(mode, &sig, &[x.view()], |e| Ok(scalar::eigvalsh(&mat(&e[0])?)?.into_dyn()))
}

/// General eigendecomposition with complex outputs.
pub fn eig(x: &ArrayViewD<'_, f64>, mode: BatchMode) -> Result<(ComplexArray, ComplexArray)> {
    let sig = Signature::parse("(n,n)->(n),(n,n)")?;
    let mut outs = batch_apply_with(mode, &sig, &[x.view()], |e| {
        let (w, v) = scalar::eig(&mat(&e[0])?)?;
        Ok(vec![w.into_dyn(), v.into_dyn()])
    })?;
    let vectors = outs.remove(1);
    Ok((outs.remove(0), vectors))
}

/// Reduced SVD: `(m,n) -> (m,k),(k),(k,n)`.
pub fn svd(x: &ArrayViewD<'_, f64>, mode: BatchMode) -> Result<(Array, Array, Array)> {
    let sig = Signature::parse("(m,n)->(m,k),(k),(k,n)")?;
    let mut outs = batch_apply_with(mode, &sig, &[x.view()], |e| {
        let (u, s, vt) = scalar::svd(&mat(&e[0])?)?;
        Ok(vec![u.into_dyn(), s.into_dyn(), vt.into_dyn()])
    })?;
    let vt = outs.remove(2);
    let s = outs.remove(1);
    Ok((outs.remove(0), s, vt))
}

/// Frobenius norm per matrix: `(m,n) -> ()`.
///
/// Rectangular input is accepted.
pub fn norm(x: &ArrayViewD<'_, f64>, mode: BatchMode) -> Result<Array> {
    let sig = Signature::parse("(m,n)->()")?;
    batch_apply_one(mode, &sig, &[x.view()], |e| Ok(scalar_out(scalar::norm(&mat(&e[0])?)?)))
}
