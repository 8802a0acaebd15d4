//! Vectorized kernel adapter: lift 2-D routines over a leading batch axis.
//!
//! A [`Signature`] such as `(m,m),(n,n),(m,n)->(m,n)` declares the core
//! shape of every argument and output. [`batch_apply`] normalizes each
//! argument to `core_rank + 1` axes, runs the kernel once per batch index
//! and stacks the results back in input order. Batch elements never see
//! each other, so [`BatchMode::Parallel`] gives the same answer as
//! [`BatchMode::Sequential`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::array::normalize::as_batch;
use crate::error::{LinalgError, Result};

/// How the adapter walks the batch axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    #[default]
    Sequential,
    /// One rayon task per batch element.
    Parallel,
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchMode::Sequential => write!(f, "sequential"),
            BatchMode::Parallel => write!(f, "parallel"),
        }
    }
}

impl FromStr for BatchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" | "seq" => Ok(BatchMode::Sequential),
            "parallel" | "par" => Ok(BatchMode::Parallel),
            other => Err(format!("unknown batch mode '{}'", other)),
        }
    }
}

/// Core-dimension signature of a vectorized kernel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    text: String,
    inputs: Vec<Vec<String>>,
    outputs: Vec<Vec<String>>,
}

impl Signature {
    pub fn parse(text: &str) -> Result<Self> {
        let err = |reason: &str| LinalgError::Signature {
            signature: text.to_string(),
            reason: reason.to_string(),
        };
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let (lhs, rhs) = compact.split_once("->").ok_or_else(|| err("missing '->'"))?;
        let inputs = parse_groups(lhs).map_err(|r| err(&r))?;
        let outputs = parse_groups(rhs).map_err(|r| err(&r))?;
        if inputs.is_empty() || outputs.is_empty() {
            return Err(err("needs at least one input and one output"));
        }
        Ok(Self {
            text: text.to_string(),
            inputs,
            outputs,
        })
    }

    pub fn n_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn n_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Core rank of input `i`.
    pub fn input_rank(&self, i: usize) -> usize {
        self.inputs[i].len()
    }

    /// Core rank of output `i`.
    pub fn output_rank(&self, i: usize) -> usize {
        self.outputs[i].len()
    }
}

impl FromStr for Signature {
    type Err = LinalgError;

    fn from_str(s: &str) -> Result<Self> {
        Signature::parse(s)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn parse_groups(side: &str) -> std::result::Result<Vec<Vec<String>>, String> {
    let mut groups = Vec::new();
    let mut rest = side;
    while !rest.is_empty() {
        let body = rest
            .strip_prefix('(')
            .ok_or_else(|| format!("expected '(' at '{}'", rest))?;
        let close = body.find(')').ok_or("unbalanced parenthesis")?;
        let dims: Vec<String> = if body[..close].is_empty() {
            Vec::new()
        } else {
            body[..close].split(',').map(str::to_string).collect()
        };
        if dims
            .iter()
            .any(|d| d.is_empty() || !d.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        {
            return Err(format!("bad dimension list '{}'", &body[..close]));
        }
        groups.push(dims);
        rest = &body[close + 1..];
        if let Some(next) = rest.strip_prefix(',') {
            if next.is_empty() {
                return Err("trailing ','".to_string());
            }
            rest = next;
        }
    }
    Ok(groups)
}

/// Bind core dimension names to sizes, rejecting inconsistent reuse.
fn bind_dims(
    bound: &mut HashMap<String, usize>,
    names: &[String],
    shape: &[usize],
    what: &str,
) -> Result<()> {
    if names.len() != shape.len() {
        return Err(LinalgError::shape(format!(
            "{} has core shape {:?}, signature expects {} axes",
            what,
            shape,
            names.len()
        )));
    }
    for (name, &size) in names.iter().zip(shape) {
        match bound.get(name) {
            Some(&prev) if prev != size => {
                return Err(LinalgError::shape(format!(
                    "dimension '{}' is {} in {} but {} elsewhere",
                    name, size, what, prev
                )));
            }
            Some(_) => {}
            None => {
                bound.insert(name.clone(), size);
            }
        }
    }
    Ok(())
}

/// Apply `kernel` to every batch element sequentially.
pub fn batch_apply<T, F>(sig: &Signature, args: &[ArrayViewD<'_, f64>], kernel: F) -> Result<Vec<ArrayD<T>>>
where
    T: Clone + Send,
    F: Fn(&[ArrayViewD<'_, f64>]) -> Result<Vec<ArrayD<T>>> + Sync,
{
    batch_apply_with(BatchMode::Sequential, sig, args, kernel)
}

/// Apply `kernel` to every batch element using `mode`.
pub fn batch_apply_with<T, F>(
    mode: BatchMode,
    sig: &Signature,
    args: &[ArrayViewD<'_, f64>],
    kernel: F,
) -> Result<Vec<ArrayD<T>>>
where
    T: Clone + Send,
    F: Fn(&[ArrayViewD<'_, f64>]) -> Result<Vec<ArrayD<T>>> + Sync,
{
    if args.len() != sig.n_inputs() {
        return Err(LinalgError::shape(format!(
            "signature '{}' takes {} arguments, got {}",
            sig,
            sig.n_inputs(),
            args.len()
        )));
    }

    let mut any_batched = false;
    let mut batch = 1usize;
    let mut normalized = Vec::with_capacity(args.len());
    let mut bound = HashMap::new();
    for (i, arg) in args.iter().enumerate() {
        let core = sig.input_rank(i);
        let (view, batched) = as_batch(arg.view(), core)?;
        bind_dims(&mut bound, &sig.inputs[i], &view.shape()[1..], &format!("argument {}", i))?;
        let len = view.len_of(Axis(0));
        if batched {
            any_batched = true;
            if batch == 1 {
                batch = len;
            } else if len != 1 && len != batch {
                return Err(LinalgError::shape(format!(
                    "batch sizes {} and {} do not broadcast",
                    batch, len
                )));
            }
        }
        normalized.push(view);
    }

    let element = |idx: usize| -> Result<Vec<ArrayD<T>>> {
        let views: Vec<ArrayViewD<'_, f64>> = normalized
            .iter()
            .map(|v| {
                let at = if v.len_of(Axis(0)) == 1 { 0 } else { idx };
                v.index_axis(Axis(0), at)
            })
            .collect();
        kernel(&views)
    };

    let per_element: Vec<Vec<ArrayD<T>>> = match mode {
        BatchMode::Sequential => (0..batch).map(element).collect::<Result<_>>()?,
        BatchMode::Parallel => (0..batch).into_par_iter().map(element).collect::<Result<_>>()?,
    };

    for outputs in &per_element {
        if outputs.len() != sig.n_outputs() {
            return Err(LinalgError::shape(format!(
                "kernel returned {} outputs, signature '{}' declares {}",
                outputs.len(),
                sig,
                sig.n_outputs()
            )));
        }
        for (j, out) in outputs.iter().enumerate() {
            bind_dims(&mut bound, &sig.outputs[j], out.shape(), &format!("output {}", j))?;
        }
    }

    let mut stacked = Vec::with_capacity(sig.n_outputs());
    for j in 0..sig.n_outputs() {
        let out = if per_element.is_empty() {
            let mut dims = vec![0usize];
            dims.extend(sig.outputs[j].iter().map(|d| bound.get(d).copied().unwrap_or(0)));
            ArrayD::from_shape_vec(IxDyn(&dims), Vec::new())?
        } else {
            let views: Vec<_> = per_element.iter().map(|outs| outs[j].view()).collect();
            ndarray::stack(Axis(0), &views)?
        };
        stacked.push(if any_batched {
            out
        } else {
            out.index_axis_move(Axis(0), 0)
        });
    }
    Ok(stacked)
}

/// Convenience wrapper for single-output kernels.
pub fn batch_apply_one<F>(mode: BatchMode, sig: &Signature, args: &[ArrayViewD<'_, f64>], kernel: F) -> Result<ArrayD<f64>>
where
    F: Fn(&[ArrayViewD<'_, f64>]) -> Result<ArrayD<f64>> + Sync,
{
    let mut outs = batch_apply_with(mode, sig, args, |views| Ok(vec![kernel(views)?]))?;
    outs.pop()
        .ok_or_else(|| LinalgError::shape(format!("signature '{}' produced no output", sig)))
}
