use crate::equation_engine::CompiledFunction;
use crate::grid::StructuredGrid;
use crate::intersection::{intersect_surfaces, IntersectionCurve};
use crate::isosurface::{extract_isosurface, Isosurface};
use crate::param_space::ParameterSpace;
use crate::render::{SceneHints, SceneRenderer};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub const REAL_FIELD: &str = "real";
pub const IMAG_FIELD: &str = "imag";

/// The zero set of a complex-valued function over a 3D parameter box.
///
/// `curve` is the locus where real and imaginary parts vanish together; the
/// two source surfaces are returned as well since callers often want them
/// for diagnostic visualization alongside the root curve. Everything is
/// accurate only to the grid resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZeroLocus {
    pub curve: IntersectionCurve,
    pub real_surface: Isosurface,
    pub imag_surface: Isosurface,
}

/// Extracts the zero locus of a compiled 3-axis function: sample once over
/// the full lattice, split into real/imag fields, take the level-0
/// isosurface of each, and intersect the two meshes.
///
/// Either surface may come back empty when the corresponding field never
/// changes sign inside the box; that, and an empty intersection curve, are
/// valid results meaning "no zero crossing detected at this resolution".
/// A function with no complex range leaves the imaginary field identically
/// zero, which degenerates the imaginary isosurface; callers are expected
/// to pass expressions with genuine complex range.
///
/// When a renderer is supplied it receives the extracted geometry plus
/// scene hints for the declared domain; rendering is otherwise no concern
/// of this function.
pub fn extract_zero_locus(
    func: &CompiledFunction,
    space: &ParameterSpace,
    renderer: Option<&mut dyn SceneRenderer>,
) -> Result<ZeroLocus> {
    if space.dim() != 3 {
        bail!("zero-locus extraction needs exactly 3 axes, got {}", space.dim());
    }
    if func.arity() != 3 {
        bail!(
            "compiled function has {} axes; it must be compiled against the 3-axis space",
            func.arity()
        );
    }

    let mut grid = StructuredGrid::from_space(space);
    let values = grid.sample(func)?;
    grid.attach_field(REAL_FIELD, values.iter().map(|v| v.re).collect())?;
    grid.attach_field(IMAG_FIELD, values.iter().map(|v| v.im).collect())?;

    let real_surface = extract_isosurface(&grid, REAL_FIELD, 0.0)?;
    let imag_surface = extract_isosurface(&grid, IMAG_FIELD, 0.0)?;
    let curve = intersect_surfaces(&real_surface, &imag_surface);

    let locus = ZeroLocus {
        curve,
        real_surface,
        imag_surface,
    };
    if let Some(renderer) = renderer {
        renderer.render(&locus, &SceneHints::from_space(space));
    }
    Ok(locus)
}
