//! Forward-mode Jacobian-vector products over matrix functions.
//!
//! A [`Dual`] carries a primal array and a tangent of the same shape.
//! Elementary algebra (products, sums, transposes) has closed-form rules
//! here; everything else is a registered primitive whose rule lives in the
//! primitive table and is reached through the active backend. Engines
//! without a differentiation mechanism reject every primitive.

use ndarray::ArrayViewD;

use crate::array::ops::{matmul, transpose};
use crate::array::Array;
use crate::backend::{self, LinalgBackend};
use crate::error::{LinalgError, Result};

/// Primal value paired with a perturbation direction.
#[derive(Clone, Debug)]
pub struct Dual {
    pub primal: Array,
    pub tangent: Array,
}

impl Dual {
    pub fn new(primal: Array, tangent: Array) -> Result<Self> {
        if primal.shape() != tangent.shape() {
            return Err(LinalgError::shape(format!(
                "tangent shape {:?} does not match primal {:?}",
                tangent.shape(),
                primal.shape()
            )));
        }
        Ok(Self { primal, tangent })
    }

    /// A value that does not vary with the input.
    pub fn constant(primal: Array) -> Self {
        let tangent = Array::zeros(primal.raw_dim());
        Self { primal, tangent }
    }

    /// Standard basis tangent: one-hot at `index` in row-major order.
    pub fn basis(primal: Array, index: usize) -> Result<Self> {
        let mut tangent = Array::zeros(primal.raw_dim());
        let len = tangent.len();
        let slot = tangent
            .iter_mut()
            .nth(index)
            .ok_or_else(|| LinalgError::shape(format!("basis index {} out of range for {} entries", index, len)))?;
        *slot = 1.0;
        Ok(Self { primal, tangent })
    }

    pub fn shape(&self) -> &[usize] {
        self.primal.shape()
    }

    /// `d(AB) = dA B + A dB`.
    pub fn matmul(&self, other: &Dual) -> Result<Dual> {
        let primal = matmul(&self.primal.view(), &other.primal.view())?;
        let tangent = matmul(&self.tangent.view(), &other.primal.view())?
            + matmul(&self.primal.view(), &other.tangent.view())?;
        Ok(Dual { primal, tangent })
    }

    pub fn add(&self, other: &Dual) -> Result<Dual> {
        self.check_same_shape(other, "add")?;
        Ok(Dual {
            primal: &self.primal + &other.primal,
            tangent: &self.tangent + &other.tangent,
        })
    }

    pub fn sub(&self, other: &Dual) -> Result<Dual> {
        self.check_same_shape(other, "sub")?;
        Ok(Dual {
            primal: &self.primal - &other.primal,
            tangent: &self.tangent - &other.tangent,
        })
    }

    pub fn scale(&self, factor: f64) -> Dual {
        Dual {
            primal: &self.primal * factor,
            tangent: &self.tangent * factor,
        }
    }

    pub fn transpose(&self) -> Result<Dual> {
        Ok(Dual {
            primal: transpose(&self.primal.view())?,
            tangent: transpose(&self.tangent.view())?,
        })
    }

    fn check_same_shape(&self, other: &Dual, op: &str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(LinalgError::shape(format!(
                "{}: shapes {:?} and {:?} differ",
                op,
                self.shape(),
                other.shape()
            )));
        }
        Ok(())
    }

    /// Push a single-input, single-output primitive through the active backend.
    pub fn apply(&self, name: &str) -> Result<Dual> {
        self.apply_on(backend::active(), name)
    }

    pub fn apply_on(&self, engine: &dyn LinalgBackend, name: &str) -> Result<Dual> {
        apply_many(engine, name, &[self])
    }

    pub fn expm(&self) -> Result<Dual> {
        self.apply("expm")
    }

    pub fn logm(&self) -> Result<Dual> {
        self.apply("logm")
    }

    pub fn sqrtm(&self) -> Result<Dual> {
        self.apply("sqrtm")
    }

    pub fn inv(&self) -> Result<Dual> {
        self.apply("inv")
    }

    pub fn det(&self) -> Result<Dual> {
        self.apply("det")
    }

    pub fn eigvalsh(&self) -> Result<Dual> {
        self.apply("eigvalsh")
    }

    /// `A X + X B = Q` with all three coefficients carrying tangents.
    pub fn solve_sylvester(a: &Dual, b: &Dual, q: &Dual) -> Result<Dual> {
        apply_many(backend::active(), "solve_sylvester", &[a, b, q])
    }
}

fn apply_many(engine: &dyn LinalgBackend, name: &str, args: &[&Dual]) -> Result<Dual> {
    let primals: Vec<ArrayViewD<'_, f64>> = args.iter().map(|d| d.primal.view()).collect();
    let tangents: Vec<ArrayViewD<'_, f64>> = args.iter().map(|d| d.tangent.view()).collect();
    let (mut outs, mut douts) = engine.jvp(name, &primals, &tangents)?;
    if outs.len() != 1 || douts.len() != 1 {
        return Err(LinalgError::Arity {
            name: name.to_string(),
            expected: 1,
            got: outs.len(),
        });
    }
    Ok(Dual {
        primal: outs.remove(0),
        tangent: douts.remove(0),
    })
}

/// Evaluate `f` at `x` and its directional derivative along `v`.
pub fn jvp<F>(f: F, x: &Array, v: &Array) -> Result<(Array, Array)>
where
    F: FnOnce(&Dual) -> Result<Dual>,
{
    let input = Dual::new(x.clone(), v.clone())?;
    let out = f(&input)?;
    Ok((out.primal, out.tangent))
}
