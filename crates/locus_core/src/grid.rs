use crate::equation_engine::CompiledFunction;
use crate::param_space::ParameterSpace;
use anyhow::{bail, Result};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A regular sampling lattice over a parameter space, with named scalar
/// fields attached at every node.
///
/// Node traversal order: axis 0 varies fastest. For a 3-axis grid with
/// dimensions (n0, n1, n2) the node (i0, i1, i2) lives at flat index
/// `i0 + i1*n0 + i2*n0*n1`. Every consumer of this grid (sampling, field
/// attachment, isosurface extraction) relies on this one convention; do not
/// introduce a second flattening order anywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredGrid {
    coords: Vec<Vec<f64>>,
    origin: Vec<f64>,
    spacing: Vec<f64>,
    fields: BTreeMap<String, Vec<f64>>,
}

impl StructuredGrid {
    /// Builds the lattice for a validated parameter space. The space has
    /// already rejected single-sample axes, so the per-axis spacing divisor
    /// is never zero here.
    pub fn from_space(space: &ParameterSpace) -> Self {
        Self {
            coords: space.axes().iter().map(|a| a.coordinates()).collect(),
            origin: space.origin(),
            spacing: space.spacings(),
            fields: BTreeMap::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.coords.len()
    }

    pub fn dims(&self) -> Vec<usize> {
        self.coords.iter().map(|c| c.len()).collect()
    }

    pub fn node_count(&self) -> usize {
        self.coords.iter().map(|c| c.len()).product()
    }

    pub fn coords(&self, axis: usize) -> &[f64] {
        &self.coords[axis]
    }

    pub fn origin(&self) -> &[f64] {
        &self.origin
    }

    pub fn spacing(&self) -> &[f64] {
        &self.spacing
    }

    /// Evaluates a compiled function at every node, in node order.
    pub fn sample(&self, func: &CompiledFunction) -> Result<Vec<Complex64>> {
        if func.arity() != self.dim() {
            bail!(
                "compiled function has {} axes but grid has {}",
                func.arity(),
                self.dim()
            );
        }

        let mut stack = Vec::with_capacity(64);
        let mut out = Vec::with_capacity(self.node_count());
        match self.dim() {
            2 => {
                for &y in &self.coords[1] {
                    for &x in &self.coords[0] {
                        out.push(func.eval_at(&[x, y], &mut stack));
                    }
                }
            }
            3 => {
                for &z in &self.coords[2] {
                    for &y in &self.coords[1] {
                        for &x in &self.coords[0] {
                            out.push(func.eval_at(&[x, y, z], &mut stack));
                        }
                    }
                }
            }
            other => bail!("unsupported grid dimension: {other}"),
        }
        Ok(out)
    }

    /// Attaches a scalar field sampled in node order.
    pub fn attach_field(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        if values.len() != self.node_count() {
            bail!(
                "field length {} does not match node count {}",
                values.len(),
                self.node_count()
            );
        }
        self.fields.insert(name.into(), values);
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&[f64]> {
        self.fields.get(name).map(Vec::as_slice)
    }
}
