use crate::error::{LocusError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One swept axis of a parameter space: a symbol bound to an evenly sampled
/// closed interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub symbol: String,
    pub min: f64,
    pub max: f64,
    pub resolution: usize,
}

impl Axis {
    pub fn new(symbol: impl Into<String>, min: f64, max: f64, resolution: usize) -> Self {
        Self {
            symbol: symbol.into(),
            min,
            max,
            resolution,
        }
    }

    /// `resolution` evenly spaced samples inclusive of both endpoints.
    pub fn coordinates(&self) -> Vec<f64> {
        let step = self.spacing();
        (0..self.resolution).map(|i| self.min + step * i as f64).collect()
    }

    /// Uniform sample spacing. Valid only after construction-time validation
    /// has rejected `resolution < 2`.
    pub fn spacing(&self) -> f64 {
        (self.max - self.min) / (self.resolution - 1) as f64
    }

    pub fn length(&self) -> f64 {
        self.max - self.min
    }

    fn validate(&self) -> Result<()> {
        if self.resolution < 2 {
            return Err(LocusError::InvalidDomain {
                axis: self.symbol.clone(),
                reason: format!("resolution must be at least 2, got {}", self.resolution),
            });
        }
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(LocusError::InvalidDomain {
                axis: self.symbol.clone(),
                reason: "range endpoints must be finite".to_string(),
            });
        }
        if self.max <= self.min {
            return Err(LocusError::InvalidDomain {
                axis: self.symbol.clone(),
                reason: format!("range must satisfy max > min, got [{}, {}]", self.min, self.max),
            });
        }
        Ok(())
    }
}

/// The domain over which an expression is sampled: 2 or 3 swept axes plus a
/// set of symbols held at scalar values.
///
/// Immutable after construction; consumed by the compiler and by both
/// extractors. All validation happens here so downstream stages never fail
/// mid-grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpace {
    axes: Vec<Axis>,
    fixed: BTreeMap<String, f64>,
}

impl ParameterSpace {
    pub fn new(axes: Vec<Axis>, fixed: BTreeMap<String, f64>) -> Result<Self> {
        if axes.len() < 2 || axes.len() > 3 {
            let named = axes
                .first()
                .map(|a| a.symbol.clone())
                .unwrap_or_else(|| "<none>".to_string());
            return Err(LocusError::InvalidDomain {
                axis: named,
                reason: format!("a parameter space needs 2 or 3 axes, got {}", axes.len()),
            });
        }
        for axis in &axes {
            axis.validate()?;
        }
        for (i, axis) in axes.iter().enumerate() {
            if axes[..i].iter().any(|other| other.symbol == axis.symbol) {
                return Err(LocusError::ConflictingParameter {
                    symbol: axis.symbol.clone(),
                });
            }
            if fixed.contains_key(&axis.symbol) {
                return Err(LocusError::ConflictingParameter {
                    symbol: axis.symbol.clone(),
                });
            }
        }
        Ok(Self { axes, fixed })
    }

    pub fn dim(&self) -> usize {
        self.axes.len()
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn axis(&self, index: usize) -> &Axis {
        &self.axes[index]
    }

    pub fn fixed(&self) -> &BTreeMap<String, f64> {
        &self.fixed
    }

    /// Axis symbols in declaration order; this is the argument order of any
    /// function compiled against this space.
    pub fn axis_symbols(&self) -> Vec<String> {
        self.axes.iter().map(|a| a.symbol.clone()).collect()
    }

    pub fn origin(&self) -> Vec<f64> {
        self.axes.iter().map(|a| a.min).collect()
    }

    pub fn spacings(&self) -> Vec<f64> {
        self.axes.iter().map(|a| a.spacing()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Axis, ParameterSpace};
    use crate::error::LocusError;
    use std::collections::BTreeMap;

    #[test]
    fn single_sample_axis_is_rejected() {
        let err = ParameterSpace::new(
            vec![Axis::new("x", 0.0, 1.0, 1), Axis::new("y", 0.0, 1.0, 10)],
            BTreeMap::new(),
        )
        .expect_err("resolution 1 should fail");
        assert!(
            matches!(err, LocusError::InvalidDomain { ref axis, .. } if axis == "x"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = ParameterSpace::new(
            vec![Axis::new("x", 1.0, -1.0, 10), Axis::new("y", 0.0, 1.0, 10)],
            BTreeMap::new(),
        )
        .expect_err("inverted range should fail");
        assert!(matches!(err, LocusError::InvalidDomain { .. }));
    }

    #[test]
    fn axis_symbol_in_fixed_map_conflicts() {
        let mut fixed = BTreeMap::new();
        fixed.insert("y".to_string(), 3.0);
        let err = ParameterSpace::new(
            vec![Axis::new("x", 0.0, 1.0, 10), Axis::new("y", 0.0, 1.0, 10)],
            fixed,
        )
        .expect_err("shared symbol should fail");
        assert!(
            matches!(err, LocusError::ConflictingParameter { ref symbol } if symbol == "y"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn coordinates_include_both_endpoints() {
        let axis = Axis::new("x", -2.0, 2.0, 5);
        let coords = axis.coordinates();
        assert_eq!(coords.len(), 5);
        assert!((coords[0] + 2.0).abs() < 1e-12);
        assert!((coords[4] - 2.0).abs() < 1e-12);
        assert!((axis.spacing() - 1.0).abs() < 1e-12);
    }
}
