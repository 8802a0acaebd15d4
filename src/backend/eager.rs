//! Eager engine: straight evaluation through the vectorized adapter.
//!
//! Every batched operation is a per-element loop over the 2-D kernels,
//! including `expm`. There is no tracing machinery, so differentiation
//! falls back to the trait default and fails.

use ndarray::ArrayViewD;

use crate::array::{Array, ComplexArray};
use crate::backend::{BackendKind, LinalgBackend};
use crate::error::Result;
use crate::kernels::vectorize::BatchMode;
use crate::kernels::{self, sylvester};

#[derive(Clone, Copy, Debug, Default)]
pub struct EagerBackend {
    mode: BatchMode,
}

impl EagerBackend {
    pub fn new(mode: BatchMode) -> Self {
        Self { mode }
    }
}

impl LinalgBackend for EagerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Eager
    }

    fn batch_mode(&self) -> BatchMode {
        self.mode
    }

    fn expm(&self, x: &ArrayViewD<'_, f64>) -> Result<Array> {
        kernels::expm(x, self.mode)
    }

    fn logm(&self, x: &ArrayViewD<'_, f64>) -> Result<Array> {
        kernels::logm(x, self.mode)
    }

    fn sqrtm(&self, x: &ArrayViewD<'_, f64>) -> Result<Array> {
        kernels::sqrtm(x, self.mode)
    }

    fn solve_sylvester(
        &self,
        a: &ArrayViewD<'_, f64>,
        b: &ArrayViewD<'_, f64>,
        q: &ArrayViewD<'_, f64>,
    ) -> Result<Array> {
        sylvester::solve_sylvester(a, b, q, self.mode)
    }

    fn qr(&self, x: &ArrayViewD<'_, f64>) -> Result<(Array, Array)> {
        kernels::qr(x, self.mode)
    }

    fn cholesky(&self, x: &ArrayViewD<'_, f64>) -> Result<Array> {
        kernels::cholesky(x, self.mode)
    }

    fn det(&self, x: &ArrayViewD<'_, f64>) -> Result<Array> {
        kernels::det(x, self.mode)
    }

    fn inv(&self, x: &ArrayViewD<'_, f64>) -> Result<Array> {
        kernels::inv(x, self.mode)
    }

    fn eigh(&self, x: &ArrayViewD<'_, f64>) -> Result<(Array, Array)> {
        kernels::eigh(x, self.mode)
    }

    fn eigvalsh(&self, x: &ArrayViewD<'_, f64>) -> Result<Array> {
        kernels::eigvalsh(x, self.mode)
    }

    fn eig(&self, x: &ArrayViewD<'_, f64>) -> Result<(ComplexArray, ComplexArray)> {
        kernels::eig(x, self.mode)
    }

    fn svd(&self, x: &ArrayViewD<'_, f64>) -> Result<(Array, Array, Array)> {
        kernels::svd(x, self.mode)
    }

    fn norm(&self, x: &ArrayViewD<'_, f64>) -> Result<Array> {
        kernels::norm(x, self.mode)
    }
}
