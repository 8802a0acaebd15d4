//! Traced engine: kernels dispatched through the primitive table.
//!
//! Registered primitives (`expm`, `logm`, `sqrtm`, `solve_sylvester`,
//! `qr`, `cholesky`, `det`, `inv`, `eigvalsh`) are opaque leaves bound by
//! name; `expm` is natively batched across the leading axis. Operations
//! with no registration are re-exported from the kernels unchanged.

use ndarray::ArrayViewD;
use tracing::debug;

use crate::array::{Array, ComplexArray};
use crate::autodiff::primitive::{registry, PrimitiveTable};
use crate::backend::{BackendKind, LinalgBackend};
use crate::error::{LinalgError, Result};
use crate::kernels;
use crate::kernels::vectorize::BatchMode;

pub struct TracedBackend {
    table: &'static PrimitiveTable,
    mode: BatchMode,
}

impl TracedBackend {
    pub fn new(mode: BatchMode) -> Self {
        let table = registry();
        debug!(primitives = ?table.names(), "traced backend bound to primitive table");
        Self::with_table(table, mode)
    }

    /// Engine over a caller-owned table instead of the process registry.
    pub fn with_table(table: &'static PrimitiveTable, mode: BatchMode) -> Self {
        Self { table, mode }
    }

    fn bind_one(&self, name: &str, inputs: &[ArrayViewD<'_, f64>]) -> Result<Array> {
        let mut outs = self.table.bind(name, self.mode, inputs)?;
        if outs.len() != 1 {
            return Err(LinalgError::Arity {
                name: name.to_string(),
                expected: 1,
                got: outs.len(),
            });
        }
        Ok(outs.remove(0))
    }
}

impl LinalgBackend for TracedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Traced
    }

    fn batch_mode(&self) -> BatchMode {
        self.mode
    }

    fn expm(&self, x: &ArrayViewD<'_, f64>) -> Result<Array> {
        self.bind_one("expm", &[x.view()])
    }

    fn logm(&self, x: &ArrayViewD<'_, f64>) -> Result<Array> {
        self.bind_one("logm", &[x.view()])
    }

    fn sqrtm(&self, x: &ArrayViewD<'_, f64>) -> Result<Array> {
        self.bind_one("sqrtm", &[x.view()])
    }

    fn solve_sylvester(
        &self,
        a: &ArrayViewD<'_, f64>,
        b: &ArrayViewD<'_, f64>,
        q: &ArrayViewD<'_, f64>,
    ) -> Result<Array> {
        self.bind_one("solve_sylvester", &[a.view(), b.view(), q.view()])
    }

    fn qr(&self, x: &ArrayViewD<'_, f64>) -> Result<(Array, Array)> {
        let mut outs = self.table.bind("qr", self.mode, &[x.view()])?;
        if outs.len() != 2 {
            return Err(LinalgError::Arity {
                name: "qr".to_string(),
                expected: 2,
                got: outs.len(),
            });
        }
        let r = outs.remove(1);
        let q = outs.remove(0);
        Ok((q, r))
    }

    fn cholesky(&self, x: &ArrayViewD<'_, f64>) -> Result<Array> {
        self.bind_one("cholesky", &[x.view()])
    }

    fn det(&self, x: &ArrayViewD<'_, f64>) -> Result<Array> {
        self.bind_one("det", &[x.view()])
    }

    fn inv(&self, x: &ArrayViewD<'_, f64>) -> Result<Array> {
        self.bind_one("inv", &[x.view()])
    }

    fn eigh(&self, x: &ArrayViewD<'_, f64>) -> Result<(Array, Array)> {
        kernels::eigh(x, self.mode)
    }

    fn eigvalsh(&self, x: &ArrayViewD<'_, f64>) -> Result<Array> {
        self.bind_one("eigvalsh", &[x.view()])
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

    fn supports_jvp(&self) -> bool {
        true
    }

    fn jvp(
        &self,
        name: &str,
        primals: &[ArrayViewD<'_, f64>],
        tangents: &[ArrayViewD<'_, f64>],
    ) -> Result<(Vec<Array>, Vec<Array>)> {
        self.table.bind_jvp(name, self.mode, primals, tangents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::primitive::Primitive;
    use crate::kernels::vectorize::{batch_apply_one, Signature};
    use ndarray::{array, Array3};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_qr_outputs_in_order() {
        let engine = TracedBackend::new(BatchMode::Sequential);
        let x = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn();
        let (q, r) = engine.qr(&x.view()).unwrap();
        assert_eq!(q.shape(), &[2, 2]);
        assert_eq!(r.shape(), &[2, 3]);
    }

    #[test]
    fn test_expm_batch_cardinality() {
        let engine = TracedBackend::new(BatchMode::Parallel);
        let x = Array3::<f64>::zeros((5, 3, 3)).into_dyn();
        let e = engine.expm(&x.view()).unwrap();
        assert_eq!(e.shape(), &[5, 3, 3]);
        assert!((e[[4, 2, 2]] - 1.0).abs() < 1e-15);
        assert!(e[[4, 0, 2]].abs() < 1e-15);
    }

    #[test]
    fn test_logm_evaluates_but_does_not_differentiate() {
        let engine = TracedBackend::new(BatchMode::Sequential);
        let x = array![[1.0, 0.0], [0.0, 1.0]].into_dyn();
        let l = engine.logm(&x.view()).unwrap();
        assert!(l.iter().all(|v| v.abs() < 1e-14));
        assert!(engine.supports_jvp());
        assert!(matches!(
            engine.jvp("logm", &[x.view()], &[x.view()]),
            Err(LinalgError::NotDifferentiable(_))
        ));
    }

    static ON_WORKER: AtomicBool = AtomicBool::new(false);

    fn record_thread(mode: BatchMode, x: &[ArrayViewD<'_, f64>]) -> Result<Vec<Array>> {
        let sig = Signature::parse("(n,n)->(n,n)")?;
        let out = batch_apply_one(mode, &sig, &[x[0].view()], |v| {
            if rayon::current_thread_index().is_some() {
                ON_WORKER.store(true, Ordering::SeqCst);
            }
            Ok(v[0].to_owned())
        })?;
        Ok(vec![out])
    }

    fn record_thread_jvp(
        mode: BatchMode,
        x: &[ArrayViewD<'_, f64>],
        dx: &[ArrayViewD<'_, f64>],
    ) -> Result<(Vec<Array>, Vec<Array>)> {
        Ok((record_thread(mode, x)?, vec![dx[0].to_owned()]))
    }

    #[test]
    fn test_engine_mode_reaches_primitives() {
        let mut table = PrimitiveTable::with_builtins();
        table.register(Primitive::opaque("record_thread", 1, record_thread).with_jvp(record_thread_jvp));
        let table: &'static PrimitiveTable = Box::leak(Box::new(table));
        let x = Array3::<f64>::from_elem((8, 2, 2), 1.0).into_dyn();

        let sequential = TracedBackend::with_table(table, BatchMode::Sequential);
        sequential.jvp("record_thread", &[x.view()], &[x.view()]).unwrap();
        let e = sequential.expm(&x.view()).unwrap();
        assert_eq!(e.shape(), &[8, 2, 2]);
        assert!(!ON_WORKER.load(Ordering::SeqCst), "sequential engine ran on the rayon pool");

        let parallel = TracedBackend::with_table(table, BatchMode::Parallel);
        parallel.jvp("record_thread", &[x.view()], &[x.view()]).unwrap();
        assert!(ON_WORKER.load(Ordering::SeqCst));
    }
}
