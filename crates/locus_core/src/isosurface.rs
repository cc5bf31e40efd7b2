use crate::geometry::interpolate_factor;
use crate::grid::StructuredGrid;
use anyhow::{bail, Result};
use marching_cubes::tables::{EDGE_TABLE, TRI_TABLE};
use serde::{Deserialize, Serialize};

/// A triangulated approximation of the zero level set of one named scalar
/// field over a 3D structured grid.
///
/// Triangle soup: every triangle owns its three vertices, so connectivity is
/// implicit and deterministic for a given grid and field. Accuracy is
/// bounded by the local grid spacing; the mesh never claims more than the
/// sampling resolution supports. An empty mesh is a valid outcome meaning
/// the field never changes sign inside the box.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Isosurface {
    pub vertices: Vec<[f64; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

impl Isosurface {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}

/// Corner pairs for the 12 cube edges, matching the ordering assumed by
/// `EDGE_TABLE` / `TRI_TABLE`.
const CUBE_EDGE_CORNERS: [(usize, usize); 12] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 0),
    (4, 5),
    (5, 6),
    (6, 7),
    (7, 4),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Marching cubes at `level` over the named field of a 3-axis grid.
///
/// The field must have been attached in the grid's node order (axis 0
/// fastest); the cell loop below indexes with the same convention.
pub fn extract_isosurface(grid: &StructuredGrid, field_name: &str, level: f64) -> Result<Isosurface> {
    if grid.dim() != 3 {
        bail!("isosurface extraction needs a 3-axis grid, got {}", grid.dim());
    }
    if !level.is_finite() {
        bail!("isosurface level must be finite");
    }
    let field = match grid.field(field_name) {
        Some(field) => field,
        None => bail!("grid has no field named '{field_name}'"),
    };

    let xs = grid.coords(0);
    let ys = grid.coords(1);
    let zs = grid.coords(2);
    let nx = xs.len();
    let ny = ys.len();
    let index = |ix: usize, iy: usize, iz: usize| -> usize { ix + iy * nx + iz * nx * ny };

    let mut vertices: Vec<[f64; 3]> = Vec::new();
    let mut triangles: Vec<[u32; 3]> = Vec::new();

    for iz in 0..zs.len() - 1 {
        let z0 = zs[iz];
        let z1 = zs[iz + 1];
        for iy in 0..ny - 1 {
            let y0 = ys[iy];
            let y1 = ys[iy + 1];
            for ix in 0..nx - 1 {
                let x0 = xs[ix];
                let x1 = xs[ix + 1];
                let corner_points = [
                    [x0, y0, z0],
                    [x1, y0, z0],
                    [x1, y1, z0],
                    [x0, y1, z0],
                    [x0, y0, z1],
                    [x1, y0, z1],
                    [x1, y1, z1],
                    [x0, y1, z1],
                ];
                let corner_values = [
                    field[index(ix, iy, iz)] - level,
                    field[index(ix + 1, iy, iz)] - level,
                    field[index(ix + 1, iy + 1, iz)] - level,
                    field[index(ix, iy + 1, iz)] - level,
                    field[index(ix, iy, iz + 1)] - level,
                    field[index(ix + 1, iy, iz + 1)] - level,
                    field[index(ix + 1, iy + 1, iz + 1)] - level,
                    field[index(ix, iy + 1, iz + 1)] - level,
                ];

                let mut cube_index = 0usize;
                for (corner, value) in corner_values.iter().enumerate() {
                    if *value < 0.0 {
                        cube_index |= 1 << corner;
                    }
                }
                let edge_mask = EDGE_TABLE[cube_index] as i32;
                if edge_mask == 0 {
                    continue;
                }

                let mut edge_vertices = [[0.0f64; 3]; 12];
                for (edge, slot) in edge_vertices.iter_mut().enumerate() {
                    if (edge_mask & (1 << edge)) == 0 {
                        continue;
                    }
                    let (ca, cb) = CUBE_EDGE_CORNERS[edge];
                    let a = corner_points[ca];
                    let b = corner_points[cb];
                    let t = interpolate_factor(corner_values[ca], corner_values[cb]);
                    *slot = [
                        a[0] + (b[0] - a[0]) * t,
                        a[1] + (b[1] - a[1]) * t,
                        a[2] + (b[2] - a[2]) * t,
                    ];
                }

                let tri_row = TRI_TABLE[cube_index];
                let mut tri_offset = 0usize;
                while tri_offset + 2 < tri_row.len() && tri_row[tri_offset] != -1 {
                    let base = vertices.len() as u32;
                    vertices.push(edge_vertices[tri_row[tri_offset] as usize]);
                    vertices.push(edge_vertices[tri_row[tri_offset + 1] as usize]);
                    vertices.push(edge_vertices[tri_row[tri_offset + 2] as usize]);
                    triangles.push([base, base + 1, base + 2]);
                    tri_offset += 3;
                }
            }
        }
    }

    Ok(Isosurface { vertices, triangles })
}

#[cfg(test)]
mod tests {
    use super::extract_isosurface;
    use crate::equation_engine::{compile, parse};
    use crate::grid::StructuredGrid;
    use crate::param_space::{Axis, ParameterSpace};
    use std::collections::BTreeMap;

    fn grid_with_field(expr_text: &str, resolution: usize) -> StructuredGrid {
        let space = ParameterSpace::new(
            vec![
                Axis::new("x", -2.0, 2.0, resolution),
                Axis::new("y", -2.0, 2.0, resolution),
                Axis::new("z", -2.0, 2.0, resolution),
            ],
            BTreeMap::new(),
        )
        .expect("space should validate");
        let expr = parse(expr_text).expect("should parse");
        let func = compile(&expr, &space).expect("should compile");
        let mut grid = StructuredGrid::from_space(&space);
        let values = grid.sample(&func).expect("sampling should succeed");
        let real: Vec<f64> = values.iter().map(|v| v.re).collect();
        grid.attach_field("real", real).expect("field should attach");
        grid
    }

    #[test]
    fn sphere_isosurface_lies_on_unit_radius() {
        let grid = grid_with_field("x^2 + y^2 + z^2 - 1", 24);
        let surface = extract_isosurface(&grid, "real", 0.0).expect("extraction should succeed");
        assert!(!surface.is_empty(), "sphere should produce triangles");
        let spacing = 4.0 / 23.0;
        for v in &surface.vertices {
            let r = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
            assert!((r - 1.0).abs() < spacing, "vertex off the sphere: r = {r}");
        }
    }

    #[test]
    fn plane_isosurface_is_flat() {
        let grid = grid_with_field("x - 0.5", 16);
        let surface = extract_isosurface(&grid, "real", 0.0).expect("extraction should succeed");
        assert!(!surface.is_empty());
        for v in &surface.vertices {
            assert!((v[0] - 0.5).abs() < 1e-9, "linear field should interpolate exactly");
        }
    }

    #[test]
    fn field_without_sign_change_yields_empty_surface() {
        let grid = grid_with_field("x^2 + y^2 + z^2 + 1", 10);
        let surface = extract_isosurface(&grid, "real", 0.0).expect("extraction should succeed");
        assert!(surface.is_empty(), "positive field has no zero crossing");
    }

    #[test]
    fn missing_field_is_an_error() {
        let grid = grid_with_field("x", 4);
        let err = extract_isosurface(&grid, "imag", 0.0).expect_err("missing field should fail");
        assert!(err.to_string().contains("imag"), "unexpected error: {err}");
    }
}
