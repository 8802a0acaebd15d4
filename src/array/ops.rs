//! Batched matrix algebra used by the autodiff rules and by consumers.

use ndarray::{ArrayD, ArrayViewD, IxDyn};

use crate::array::{require_square, Array};
use crate::error::{LinalgError, Result};
use crate::kernels::mat;
use crate::kernels::vectorize::{batch_apply_one, BatchMode, Signature};

/// Batched matrix product with leading-axis broadcasting.
pub fn matmul(a: &ArrayViewD<'_, f64>, b: &ArrayViewD<'_, f64>) -> Result<Array> {
    let sig = Signature::parse("(m,k),(k,n)->(m,n)")?;
    batch_apply_one(BatchMode::Sequential, &sig, &[a.view(), b.view()], |e| {
        Ok(mat(&e[0])?.dot(&mat(&e[1])?).into_dyn())
    })
}

/// Swap the last two axes, keeping any batch axis in front.
pub fn transpose(x: &ArrayViewD<'_, f64>) -> Result<Array> {
    let nd = x.ndim();
    if nd < 2 {
        return Err(LinalgError::shape(format!(
            "transpose needs at least 2 axes, got {:?}",
            x.shape()
        )));
    }
    let mut t = x.view();
    t.swap_axes(nd - 2, nd - 1);
    Ok(t.as_standard_layout().into_owned())
}

/// `(x + xᵗ) / 2`. Fails on non-square input rather than broadcasting.
pub fn to_symmetric(x: &ArrayViewD<'_, f64>) -> Result<Array> {
    require_square(x)?;
    let t = transpose(x)?;
    Ok((&t + x) * 0.5)
}

/// `(x - xᵗ) / 2`. Same shape rules as [`to_symmetric`].
pub fn to_skew_symmetric(x: &ArrayViewD<'_, f64>) -> Result<Array> {
    require_square(x)?;
    let t = transpose(x)?;
    Ok((x - &t) * 0.5)
}

/// Trace per matrix: `(n,n) -> ()`.
pub fn trace(x: &ArrayViewD<'_, f64>) -> Result<Array> {
    let sig = Signature::parse("(n,n)->()")?;
    batch_apply_one(BatchMode::Sequential, &sig, &[x.view()], |e| {
        Ok(ArrayD::from_elem(IxDyn(&[]), mat(&e[0])?.diag().sum()))
    })
}
