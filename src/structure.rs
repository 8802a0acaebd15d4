//! Structure predicates over single matrices or whole batches.
//!
//! Every predicate answers with ONE boolean for the entire input: a batch
//! is accepted only when all of its matrices pass. Comparisons use an
//! absolute tolerance, [`SYMMETRY_TOL`](crate::config::SYMMETRY_TOL) being
//! the usual choice. Non-square inputs answer `false` for the square-only
//! predicates rather than erroring; ranks above 3 are shape errors.

use ndarray::{ArrayView3, ArrayViewD, Ix3};

use crate::array::normalize::to_ndarray;
use crate::error::Result;
use crate::kernels::{mat, scalar};

fn batched<'a>(x: &ArrayViewD<'a, f64>) -> Result<ArrayView3<'a, f64>> {
    Ok(to_ndarray(x.clone(), 3)?.into_dimensionality::<Ix3>()?)
}

/// True when `keep(b, i, j)` holds for every entry.
fn all_entries(x: &ArrayView3<'_, f64>, keep: impl Fn(usize, usize, usize) -> bool) -> bool {
    x.indexed_iter().all(|((b, i, j), _)| keep(b, i, j))
}

fn square(x: &ArrayView3<'_, f64>) -> bool {
    x.shape()[1] == x.shape()[2]
}

pub fn is_square(x: &ArrayViewD<'_, f64>) -> Result<bool> {
    Ok(square(&batched(x)?))
}

/// `|x - xᵗ| < tol` everywhere, across every batch element.
pub fn is_symmetric(x: &ArrayViewD<'_, f64>, tol: f64) -> Result<bool> {
    let x = batched(x)?;
    Ok(square(&x) && all_entries(&x, |b, i, j| (x[[b, i, j]] - x[[b, j, i]]).abs() < tol))
}

/// `|x + xᵗ| < tol` everywhere.
pub fn is_skew_symmetric(x: &ArrayViewD<'_, f64>, tol: f64) -> Result<bool> {
    let x = batched(x)?;
    Ok(square(&x) && all_entries(&x, |b, i, j| (x[[b, i, j]] + x[[b, j, i]]).abs() < tol))
}

pub fn is_diagonal(x: &ArrayViewD<'_, f64>, tol: f64) -> Result<bool> {
    let x = batched(x)?;
    Ok(square(&x) && all_entries(&x, |b, i, j| i == j || x[[b, i, j]].abs() < tol))
}

/// Entries strictly above the diagonal vanish. Rectangular inputs allowed.
pub fn is_lower_triangular(x: &ArrayViewD<'_, f64>, tol: f64) -> Result<bool> {
    let x = batched(x)?;
    Ok(all_entries(&x, |b, i, j| j <= i || x[[b, i, j]].abs() < tol))
}

/// Entries strictly below the diagonal vanish. Rectangular inputs allowed.
pub fn is_upper_triangular(x: &ArrayViewD<'_, f64>, tol: f64) -> Result<bool> {
    let x = batched(x)?;
    Ok(all_entries(&x, |b, i, j| i <= j || x[[b, i, j]].abs() < tol))
}

/// Symmetric within `tol` and Cholesky-factorizable.
pub fn is_spd(x: &ArrayViewD<'_, f64>, tol: f64) -> Result<bool> {
    if !is_symmetric(x, tol)? {
        return Ok(false);
    }
    let x = batched(x)?;
    for m in x.outer_iter() {
        if scalar::cholesky(&mat(&m.into_dyn())?).is_err() {
            return Ok(false);
        }
    }
    Ok(true)
}
