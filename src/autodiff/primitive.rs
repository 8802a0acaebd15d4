//! Primitive registration: opaque kernels with optional JVP rules.
//!
//! A [`Primitive`] binds a forward implementation, and optionally a
//! forward-mode derivative rule, to a name the traced engine dispatches
//! on. The engine never looks inside the implementation: a primitive is an
//! indivisible leaf. Primitives without a JVP rule (notably `logm`) can be
//! evaluated but not differentiated.
//!
//! The process-wide table is built exactly once; [`install`] can add host
//! primitives before first use, after which registration is closed.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use ndarray::ArrayViewD;
use tracing::debug;

use crate::array::ops::{matmul, trace};
use crate::array::Array;
use crate::error::{LinalgError, Result};
use crate::kernels::vectorize::{batch_apply_one, BatchMode, Signature};
use crate::kernels::{self, mat, sylvester};

/// Forward implementation: inputs to outputs, walking the batch with the
/// engine's mode.
pub type ImplRule = fn(BatchMode, &[ArrayViewD<'_, f64>]) -> Result<Vec<Array>>;

/// Forward-mode rule: `(primals, tangents) -> (outputs, output tangents)`.
pub type JvpRule =
    fn(BatchMode, &[ArrayViewD<'_, f64>], &[ArrayViewD<'_, f64>]) -> Result<(Vec<Array>, Vec<Array>)>;

/// Registration record for one primitive.
#[derive(Clone, Copy)]
pub struct Primitive {
    pub name: &'static str,
    pub n_inputs: usize,
    pub impl_rule: ImplRule,
    pub jvp_rule: Option<JvpRule>,
}

impl Primitive {
    /// A primitive the engine can evaluate but not differentiate.
    pub const fn opaque(name: &'static str, n_inputs: usize, impl_rule: ImplRule) -> Self {
        Self {
            name,
            n_inputs,
            impl_rule,
            jvp_rule: None,
        }
    }

    pub const fn with_jvp(mut self, rule: JvpRule) -> Self {
        self.jvp_rule = Some(rule);
        self
    }

    pub fn is_differentiable(&self) -> bool {
        self.jvp_rule.is_some()
    }

    fn check_arity(&self, got: usize) -> Result<()> {
        if got != self.n_inputs {
            return Err(LinalgError::Arity {
                name: self.name.to_string(),
                expected: self.n_inputs,
                got,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Primitive")
            .field("name", &self.name)
            .field("n_inputs", &self.n_inputs)
            .field("differentiable", &self.is_differentiable())
            .finish()
    }
}

/// Name-indexed primitive table.
#[derive(Debug, Default)]
pub struct PrimitiveTable {
    prims: HashMap<&'static str, Primitive>,
}

impl PrimitiveTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table pre-loaded with the linear-algebra primitives.
    pub fn with_builtins() -> Self {
        let mut table = Self::empty();
        for p in builtin_primitives() {
            table.register(p);
        }
        table
    }

    /// Add or replace a primitive, returning the one it displaced.
    pub fn register(&mut self, prim: Primitive) -> Option<Primitive> {
        self.prims.insert(prim.name, prim)
    }

    pub fn get(&self, name: &str) -> Result<&Primitive> {
        self.prims
            .get(name)
            .ok_or_else(|| LinalgError::UnknownPrimitive(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.prims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prims.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.prims.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Evaluate a primitive, mapping its batch axis with `mode`.
    pub fn bind(&self, name: &str, mode: BatchMode, inputs: &[ArrayViewD<'_, f64>]) -> Result<Vec<Array>> {
        let prim = self.get(name)?;
        prim.check_arity(inputs.len())?;
        (prim.impl_rule)(mode, inputs)
    }

    /// Evaluate a primitive together with its directional derivative.
    pub fn bind_jvp(
        &self,
        name: &str,
        mode: BatchMode,
        primals: &[ArrayViewD<'_, f64>],
        tangents: &[ArrayViewD<'_, f64>],
    ) -> Result<(Vec<Array>, Vec<Array>)> {
        let prim = self.get(name)?;
        prim.check_arity(primals.len())?;
        prim.check_arity(tangents.len())?;
        for (p, t) in primals.iter().zip(tangents) {
            if p.shape() != t.shape() {
                return Err(LinalgError::shape(format!(
                    "{}: tangent shape {:?} does not match primal {:?}",
                    name,
                    t.shape(),
                    p.shape()
                )));
            }
        }
        let rule = prim
            .jvp_rule
            .ok_or_else(|| LinalgError::NotDifferentiable(name.to_string()))?;
        rule(mode, primals, tangents)
    }
}

static TABLE: OnceLock<PrimitiveTable> = OnceLock::new();

/// The process-wide primitive table, built on first access.
pub fn registry() -> &'static PrimitiveTable {
    TABLE.get_or_init(|| {
        let table = PrimitiveTable::with_builtins();
        debug!(count = table.len(), "registered built-in primitives");
        table
    })
}

/// Build the process-wide table with extra host primitives.
///
/// Must run before anything touches [`registry`]; afterwards it fails with
/// [`LinalgError::RegistryInitialized`].
pub fn install(extra: impl IntoIterator<Item = Primitive>) -> Result<&'static PrimitiveTable> {
    let mut table = PrimitiveTable::with_builtins();
    for p in extra {
        if table.register(p).is_some() {
            debug!(name = p.name, "host primitive replaces built-in");
        }
    }
    TABLE.set(table).map_err(|_| LinalgError::RegistryInitialized)?;
    Ok(registry())
}

// ──────────────────────────────────────────────────────────────
// Built-in primitives
// ──────────────────────────────────────────────────────────────

fn builtin_primitives() -> Vec<Primitive> {
    vec![
        Primitive::opaque("expm", 1, expm_impl).with_jvp(expm_jvp),
        Primitive::opaque("logm", 1, logm_impl),
        Primitive::opaque("sqrtm", 1, sqrtm_impl).with_jvp(sqrtm_jvp),
        Primitive::opaque("solve_sylvester", 3, sylvester_impl).with_jvp(sylvester_jvp),
        Primitive::opaque("inv", 1, inv_impl).with_jvp(inv_jvp),
        Primitive::opaque("det", 1, det_impl).with_jvp(det_jvp),
        Primitive::opaque("eigvalsh", 1, eigvalsh_impl).with_jvp(eigvalsh_jvp),
        Primitive::opaque("cholesky", 1, cholesky_impl),
        Primitive::opaque("qr", 1, qr_impl),
    ]
}

fn expm_impl(mode: BatchMode, x: &[ArrayViewD<'_, f64>]) -> Result<Vec<Array>> {
    Ok(vec![kernels::expm_batched(&x[0], mode)?])
}

fn expm_jvp(
    mode: BatchMode,
    x: &[ArrayViewD<'_, f64>],
    dx: &[ArrayViewD<'_, f64>],
) -> Result<(Vec<Array>, Vec<Array>)> {
    let y = kernels::expm_batched(&x[0], mode)?;
    let dy = kernels::expm_frechet(&x[0], &dx[0], mode)?;
    Ok((vec![y], vec![dy]))
}

fn logm_impl(mode: BatchMode, x: &[ArrayViewD<'_, f64>]) -> Result<Vec<Array>> {
    Ok(vec![kernels::logm(&x[0], mode)?])
}

fn sqrtm_impl(mode: BatchMode, x: &[ArrayViewD<'_, f64>]) -> Result<Vec<Array>> {
    Ok(vec![kernels::sqrtm(&x[0], mode)?])
}

/// `S dS + dS S = dX` with `S = sqrtm(X)`.
fn sqrtm_jvp(
    mode: BatchMode,
    x: &[ArrayViewD<'_, f64>],
    dx: &[ArrayViewD<'_, f64>],
) -> Result<(Vec<Array>, Vec<Array>)> {
    let s = kernels::sqrtm(&x[0], mode)?;
    let ds = sylvester::solve_sylvester(&s.view(), &s.view(), &dx[0], mode)?;
    Ok((vec![s], vec![ds]))
}

fn sylvester_impl(mode: BatchMode, x: &[ArrayViewD<'_, f64>]) -> Result<Vec<Array>> {
    Ok(vec![sylvester::solve_sylvester(&x[0], &x[1], &x[2], mode)?])
}

/// Differentiates `A X + X B = Q` only on the eigen fast path:
/// `A dX + dX B = dQ - dA X - X dB`, solved with the same decomposition.
fn sylvester_jvp(
    mode: BatchMode,
    x: &[ArrayViewD<'_, f64>],
    dx: &[ArrayViewD<'_, f64>],
) -> Result<(Vec<Array>, Vec<Array>)> {
    let eig = sylvester::fast_path(&x[0], &x[1])?
        .ok_or_else(|| LinalgError::NotDifferentiable("solve_sylvester (generic path)".to_string()))?;
    let sol = sylvester::solve_with_eigen(&eig, &x[2], mode)?;
    let rhs = dx[2].to_owned() - matmul(&dx[0], &sol.view())? - matmul(&sol.view(), &dx[1])?;
    let dsol = sylvester::solve_with_eigen(&eig, &rhs.view(), mode)?;
    Ok((vec![sol], vec![dsol]))
}

fn inv_impl(mode: BatchMode, x: &[ArrayViewD<'_, f64>]) -> Result<Vec<Array>> {
    Ok(vec![kernels::inv(&x[0], mode)?])
}

/// `d(X⁻¹) = -X⁻¹ dX X⁻¹`.
fn inv_jvp(
    mode: BatchMode,
    x: &[ArrayViewD<'_, f64>],
    dx: &[ArrayViewD<'_, f64>],
) -> Result<(Vec<Array>, Vec<Array>)> {
    let y = kernels::inv(&x[0], mode)?;
    let dy = -matmul(&matmul(&y.view(), &dx[0])?.view(), &y.view())?;
    Ok((vec![y], vec![dy]))
}

fn det_impl(mode: BatchMode, x: &[ArrayViewD<'_, f64>]) -> Result<Vec<Array>> {
    Ok(vec![kernels::det(&x[0], mode)?])
}

/// `d det(X) = det(X) tr(X⁻¹ dX)`.
fn det_jvp(
    mode: BatchMode,
    x: &[ArrayViewD<'_, f64>],
    dx: &[ArrayViewD<'_, f64>],
) -> Result<(Vec<Array>, Vec<Array>)> {
    let d = kernels::det(&x[0], mode)?;
    let y = kernels::inv(&x[0], mode)?;
    let tr = trace(&matmul(&y.view(), &dx[0])?.view())?;
    let dd = &d * &tr;
    Ok((vec![d], vec![dd]))
}

fn eigvalsh_impl(mode: BatchMode, x: &[ArrayViewD<'_, f64>]) -> Result<Vec<Array>> {
    Ok(vec![kernels::eigvalsh(&x[0], mode)?])
}

/// `dλ_i = v_iᵗ dX v_i` for simple eigenvalues.
fn eigvalsh_jvp(
    mode: BatchMode,
    x: &[ArrayViewD<'_, f64>],
    dx: &[ArrayViewD<'_, f64>],
) -> Result<(Vec<Array>, Vec<Array>)> {
    let (w, v) = kernels::eigh(&x[0], mode)?;
    let sig = Signature::parse("(n,n),(n,n)->(n)")?;
    let dw = batch_apply_one(mode, &sig, &[v.view(), dx[0].view()], |e| {
        let v = mat(&e[0])?;
        let proj = v.t().dot(&mat(&e[1])?).dot(&v);
        Ok(proj.diag().to_owned().into_dyn())
    })?;
    Ok((vec![w], vec![dw]))
}

fn cholesky_impl(mode: BatchMode, x: &[ArrayViewD<'_, f64>]) -> Result<Vec<Array>> {
    Ok(vec![kernels::cholesky(&x[0], mode)?])
}

fn qr_impl(mode: BatchMode, x: &[ArrayViewD<'_, f64>]) -> Result<Vec<Array>> {
    let (q, r) = kernels::qr(&x[0], mode)?;
    Ok(vec![q, r])
}
