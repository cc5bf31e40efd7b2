use crate::equation_engine::{compile, Expr};
use crate::geometry::{interpolate_factor, stitch_segments};
use crate::grid::StructuredGrid;
use crate::param_space::{Axis, ParameterSpace};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default per-axis resolution when the caller gives ranges only.
pub const DEFAULT_RESOLUTION: usize = 500;

/// Which scalar field of a complex-valued sample to contour.
///
/// `Real` is the default and reproduces the original narrowing policy: a
/// complex-valued function is contoured on its real part with a diagnostic
/// warning. `Imag` and `Magnitude` are explicit choices and do not warn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldComponent {
    Real,
    Imag,
    Magnitude,
}

/// Display-only styling forwarded untouched to the rendering collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourStyle {
    pub color: String,
    pub line_width: f64,
}

impl Default for ContourStyle {
    fn default() -> Self {
        Self {
            color: "blue".to_string(),
            line_width: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContourOptions {
    pub levels: Vec<f64>,
    pub component: FieldComponent,
    pub title: Option<String>,
    pub style: ContourStyle,
}

impl Default for ContourOptions {
    fn default() -> Self {
        Self {
            levels: vec![0.0],
            component: FieldComponent::Real,
            title: None,
            style: ContourStyle::default(),
        }
    }
}

/// Polylines of one contour level, in axis-1/axis-2 coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelContours {
    pub level: f64,
    pub polylines: Vec<Vec<[f64; 2]>>,
}

/// The level set of a scalar field sampled on a 2D grid, plus the labeling
/// and styling the rendering collaborator needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContourSet {
    pub axis_labels: [String; 2],
    pub title: Option<String>,
    pub style: ContourStyle,
    pub contours: Vec<LevelContours>,
    /// True when a complex-valued function was narrowed to its real part.
    pub narrowed: bool,
}

impl ContourSet {
    pub fn is_empty(&self) -> bool {
        self.contours.iter().all(|c| c.polylines.is_empty())
    }
}

/// Extracts contour polylines of an expression over a 2-axis parameter space.
///
/// Validation is eager: a conflicting or unresolved symbol fails here,
/// before any sampling work. A level outside the sampled value range yields
/// an empty polyline set for that level, not an error.
pub fn zero_contours(expr: &Expr, space: &ParameterSpace, options: &ContourOptions) -> Result<ContourSet> {
    if space.dim() != 2 {
        bail!("planar contour extraction needs exactly 2 axes, got {}", space.dim());
    }
    for level in &options.levels {
        if !level.is_finite() {
            bail!("contour level must be finite, got {level}");
        }
    }

    let func = compile(expr, space)?;
    let grid = StructuredGrid::from_space(space);
    let values = grid.sample(&func)?;

    let mut narrowed = false;
    let field: Vec<f64> = match options.component {
        FieldComponent::Real => {
            if func.is_complex_valued() {
                log::warn!("function is complex-valued; contouring its real part only");
                narrowed = true;
            }
            values.iter().map(|v| v.re).collect()
        }
        FieldComponent::Imag => values.iter().map(|v| v.im).collect(),
        FieldComponent::Magnitude => values.iter().map(|v| v.norm()).collect(),
    };

    let contours = options
        .levels
        .iter()
        .map(|&level| LevelContours {
            level,
            polylines: trace_level(&grid, &field, level),
        })
        .collect();

    Ok(ContourSet {
        axis_labels: [space.axis(0).symbol.clone(), space.axis(1).symbol.clone()],
        title: options.title.clone(),
        style: options.style.clone(),
        contours,
        narrowed,
    })
}

/// Convenience wrapper taking two (symbol, min, max) axes at the default
/// resolution plus a fixed-parameter map.
pub fn zero_contours_over(
    expr: &Expr,
    axis_x: (&str, f64, f64),
    axis_y: (&str, f64, f64),
    fixed: BTreeMap<String, f64>,
    options: &ContourOptions,
) -> Result<ContourSet> {
    let space = ParameterSpace::new(
        vec![
            Axis::new(axis_x.0, axis_x.1, axis_x.2, DEFAULT_RESOLUTION),
            Axis::new(axis_y.0, axis_y.1, axis_y.2, DEFAULT_RESOLUTION),
        ],
        fixed,
    )?;
    zero_contours(expr, &space, options)
}

/// Marching squares over the regular grid: per cell, classify the four
/// corners against the level and emit the interpolated crossing segments,
/// then stitch segments into polylines.
fn trace_level(grid: &StructuredGrid, field: &[f64], level: f64) -> Vec<Vec<[f64; 2]>> {
    let xs = grid.coords(0);
    let ys = grid.coords(1);
    let nx = xs.len();
    let ny = ys.len();
    let index = |ix: usize, iy: usize| -> usize { ix + iy * nx };

    let mut segments: Vec<[[f64; 2]; 2]> = Vec::new();
    for iy in 0..ny - 1 {
        let y0 = ys[iy];
        let y1 = ys[iy + 1];
        for ix in 0..nx - 1 {
            let x0 = xs[ix];
            let x1 = xs[ix + 1];
            let v0 = field[index(ix, iy)] - level;
            let v1 = field[index(ix + 1, iy)] - level;
            let v2 = field[index(ix + 1, iy + 1)] - level;
            let v3 = field[index(ix, iy + 1)] - level;

            let mut case_index = 0u8;
            if v0 >= 0.0 {
                case_index |= 1;
            }
            if v1 >= 0.0 {
                case_index |= 2;
            }
            if v2 >= 0.0 {
                case_index |= 4;
            }
            if v3 >= 0.0 {
                case_index |= 8;
            }

            for (edge_a, edge_b) in marching_squares_edge_pairs(case_index) {
                let a = interpolate_square_edge(*edge_a, x0, x1, y0, y1, v0, v1, v2, v3);
                let b = interpolate_square_edge(*edge_b, x0, x1, y0, y1, v0, v1, v2, v3);
                segments.push([a, b]);
            }
        }
    }

    let tol = 1e-6 * grid.spacing().iter().cloned().fold(f64::INFINITY, f64::min);
    stitch_segments(segments, tol)
}

fn marching_squares_edge_pairs(case_index: u8) -> &'static [(u8, u8)] {
    match case_index {
        0 | 15 => &[],
        1 => &[(3, 0)],
        2 => &[(0, 1)],
        3 => &[(3, 1)],
        4 => &[(1, 2)],
        5 => &[(3, 2), (0, 1)],
        6 => &[(0, 2)],
        7 => &[(3, 2)],
        8 => &[(2, 3)],
        9 => &[(0, 2)],
        10 => &[(0, 3), (1, 2)],
        11 => &[(1, 2)],
        12 => &[(1, 3)],
        13 => &[(0, 1)],
        14 => &[(3, 0)],
        _ => &[],
    }
}

fn interpolate_square_edge(
    edge: u8,
    x0: f64,
    x1: f64,
    y0: f64,
    y1: f64,
    v0: f64,
    v1: f64,
    v2: f64,
    v3: f64,
) -> [f64; 2] {
    match edge {
        0 => {
            let t = interpolate_factor(v0, v1);
            [x0 + (x1 - x0) * t, y0]
        }
        1 => {
            let t = interpolate_factor(v1, v2);
            [x1, y0 + (y1 - y0) * t]
        }
        2 => {
            let t = interpolate_factor(v2, v3);
            [x1 + (x0 - x1) * t, y1]
        }
        3 => {
            let t = interpolate_factor(v3, v0);
            [x0, y1 + (y0 - y1) * t]
        }
        _ => [x0, y0],
    }
}
