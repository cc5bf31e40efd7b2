use crate::geometry::stitch_segments;
use crate::isosurface::Isosurface;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The 1-dimensional locus common to two isosurfaces: for the zero-locus
/// pipeline, the curve where the real-part and imaginary-part surfaces
/// cross, i.e. the numerically-approximated zero set of a complex function
/// in 3D parameter space.
///
/// A terminal artifact: owns no reference back to the source surfaces. An
/// empty curve means no crossing was detected at this resolution, not that
/// no root exists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntersectionCurve {
    pub polylines: Vec<Vec<[f64; 3]>>,
}

impl IntersectionCurve {
    pub fn is_empty(&self) -> bool {
        self.polylines.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.polylines.iter().map(Vec::len).sum()
    }

    pub fn points(&self) -> impl Iterator<Item = &[f64; 3]> {
        self.polylines.iter().flatten()
    }
}

/// Computes the geometric intersection of two triangulated surfaces.
///
/// Triangle pairs are pruned with an AABB spatial hash, each surviving pair
/// is intersected with the interval method (mutual plane clipping), and the
/// resulting segments are stitched into polylines. Coincident or degenerate
/// pairs (parallel or near-coplanar triangles) contribute nothing, which is
/// the standard convention for mesh intersection; near-tangent surfaces are
/// not special-cased.
pub fn intersect_surfaces(a: &Isosurface, b: &Isosurface) -> IntersectionCurve {
    if a.is_empty() || b.is_empty() {
        return IntersectionCurve::default();
    }

    let scale = union_diagonal(a, b).max(1e-12);
    let eps = 1e-9 * scale;

    // Bin b's triangles by AABB; cells sized to the largest triangle extent
    // keep candidate lists short for marching-cubes-sized triangles.
    let cell = max_triangle_extent(b).max(1e-6 * scale);
    let mut bins: HashMap<[i64; 3], Vec<u32>> = HashMap::new();
    for t in 0..b.triangle_count() {
        let (lo, hi) = triangle_aabb(b, t);
        for key in cell_range(&lo, &hi, cell) {
            bins.entry(key).or_default().push(t as u32);
        }
    }

    let mut segments: Vec<[[f64; 3]; 2]> = Vec::new();
    let mut stamp = vec![u32::MAX; b.triangle_count()];
    for ta in 0..a.triangle_count() {
        let tri_a = triangle(a, ta);
        let (lo, hi) = triangle_aabb(a, ta);
        for key in cell_range(&lo, &hi, cell) {
            let Some(candidates) = bins.get(&key) else {
                continue;
            };
            for &tb in candidates {
                // Stamp per a-triangle so a b-triangle spanning several
                // cells is tested once.
                if stamp[tb as usize] == ta as u32 {
                    continue;
                }
                stamp[tb as usize] = ta as u32;
                let tri_b = triangle(b, tb as usize);
                if let Some(segment) = tri_tri_segment(&tri_a, &tri_b, eps) {
                    segments.push(segment);
                }
            }
        }
    }

    let polylines = stitch_segments(segments, 1e-7 * scale);
    IntersectionCurve { polylines }
}

fn triangle(surface: &Isosurface, index: usize) -> [Vector3<f64>; 3] {
    let [i, j, k] = surface.triangles[index];
    [
        Vector3::from(surface.vertices[i as usize]),
        Vector3::from(surface.vertices[j as usize]),
        Vector3::from(surface.vertices[k as usize]),
    ]
}

fn triangle_aabb(surface: &Isosurface, index: usize) -> ([f64; 3], [f64; 3]) {
    let tri = triangle(surface, index);
    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for v in &tri {
        for axis in 0..3 {
            lo[axis] = lo[axis].min(v[axis]);
            hi[axis] = hi[axis].max(v[axis]);
        }
    }
    (lo, hi)
}

fn union_diagonal(a: &Isosurface, b: &Isosurface) -> f64 {
    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for v in a.vertices.iter().chain(b.vertices.iter()) {
        for axis in 0..3 {
            lo[axis] = lo[axis].min(v[axis]);
            hi[axis] = hi[axis].max(v[axis]);
        }
    }
    (0..3).map(|i| (hi[i] - lo[i]).powi(2)).sum::<f64>().sqrt()
}

fn max_triangle_extent(surface: &Isosurface) -> f64 {
    let mut extent = 0.0f64;
    for t in 0..surface.triangle_count() {
        let (lo, hi) = triangle_aabb(surface, t);
        for axis in 0..3 {
            extent = extent.max(hi[axis] - lo[axis]);
        }
    }
    extent
}

fn cell_range(lo: &[f64; 3], hi: &[f64; 3], cell: f64) -> Vec<[i64; 3]> {
    let floor = |v: f64| (v / cell).floor() as i64;
    let (x0, x1) = (floor(lo[0]), floor(hi[0]));
    let (y0, y1) = (floor(lo[1]), floor(hi[1]));
    let (z0, z1) = (floor(lo[2]), floor(hi[2]));
    let mut keys = Vec::with_capacity(((x1 - x0 + 1) * (y1 - y0 + 1) * (z1 - z0 + 1)) as usize);
    for x in x0..=x1 {
        for y in y0..=y1 {
            for z in z0..=z1 {
                keys.push([x, y, z]);
            }
        }
    }
    keys
}

/// Intersection segment of two triangles, if any.
///
/// Interval method: clip each triangle against the other's plane, project
/// the up-to-four crossing points onto the shared intersection line, and
/// keep the interval overlap. Parallel and coplanar pairs return `None`.
fn tri_tri_segment(
    t1: &[Vector3<f64>; 3],
    t2: &[Vector3<f64>; 3],
    eps: f64,
) -> Option<[[f64; 3]; 2]> {
    let n1 = (t1[1] - t1[0]).cross(&(t1[2] - t1[0]));
    let n2 = (t2[1] - t2[0]).cross(&(t2[2] - t2[0]));
    if n1.norm() <= eps * eps || n2.norm() <= eps * eps {
        return None;
    }
    let n1 = n1.normalize();
    let n2 = n2.normalize();
    let dir = n1.cross(&n2);
    if dir.norm() < 1e-9 {
        return None;
    }
    let dir = dir.normalize();

    let (a0, a1) = plane_crossings(t1, &n2, &t2[0], eps)?;
    let (b0, b1) = plane_crossings(t2, &n1, &t1[0], eps)?;

    let (a_lo, a_hi) = order_along(&dir, a0, a1);
    let (b_lo, b_hi) = order_along(&dir, b0, b1);
    let lo = if a_lo.1 >= b_lo.1 { a_lo } else { b_lo };
    let hi = if a_hi.1 <= b_hi.1 { a_hi } else { b_hi };
    if hi.1 - lo.1 <= eps {
        return None;
    }
    Some([lo.0.into(), hi.0.into()])
}

/// Points where a triangle's boundary meets a plane (unit normal `n`
/// through `p0`). Returns the two extreme crossing points, or `None` when
/// the triangle does not straddle the plane.
fn plane_crossings(
    tri: &[Vector3<f64>; 3],
    n: &Vector3<f64>,
    p0: &Vector3<f64>,
    eps: f64,
) -> Option<(Vector3<f64>, Vector3<f64>)> {
    let dist = [
        n.dot(&(tri[0] - p0)),
        n.dot(&(tri[1] - p0)),
        n.dot(&(tri[2] - p0)),
    ];

    let mut points: Vec<Vector3<f64>> = Vec::with_capacity(4);
    for i in 0..3 {
        if dist[i].abs() <= eps {
            points.push(tri[i]);
        }
        let j = (i + 1) % 3;
        if (dist[i] > eps && dist[j] < -eps) || (dist[i] < -eps && dist[j] > eps) {
            let t = dist[i] / (dist[i] - dist[j]);
            points.push(tri[i] + (tri[j] - tri[i]) * t);
        }
    }

    let mut unique: Vec<Vector3<f64>> = Vec::with_capacity(points.len());
    for p in points {
        if unique.iter().all(|q| (p - q).norm() > eps) {
            unique.push(p);
        }
    }
    match unique.len() {
        0 | 1 => None,
        2 => Some((unique[0], unique[1])),
        _ => {
            // Vertex-on-plane cases can yield three collinear candidates;
            // keep the farthest pair.
            let mut best = (0usize, 1usize, 0.0f64);
            for i in 0..unique.len() {
                for j in i + 1..unique.len() {
                    let d = (unique[i] - unique[j]).norm();
                    if d > best.2 {
                        best = (i, j, d);
                    }
                }
            }
            Some((unique[best.0], unique[best.1]))
        }
    }
}

fn order_along(
    dir: &Vector3<f64>,
    p: Vector3<f64>,
    q: Vector3<f64>,
) -> ((Vector3<f64>, f64), (Vector3<f64>, f64)) {
    let sp = dir.dot(&p);
    let sq = dir.dot(&q);
    if sp <= sq {
        ((p, sp), (q, sq))
    } else {
        ((q, sq), (p, sp))
    }
}

#[cfg(test)]
mod tests {
    use super::{intersect_surfaces, tri_tri_segment};
    use crate::isosurface::Isosurface;
    use nalgebra::Vector3;

    fn quad_surface(corners: [[f64; 3]; 4]) -> Isosurface {
        Isosurface {
            vertices: vec![
                corners[0], corners[1], corners[2], corners[0], corners[2], corners[3],
            ],
            triangles: vec![[0, 1, 2], [3, 4, 5]],
        }
    }

    #[test]
    fn crossing_triangles_yield_clipped_segment() {
        let t1 = [
            Vector3::new(-1.0, -1.0, 0.0),
            Vector3::new(3.0, -1.0, 0.0),
            Vector3::new(1.0, 2.0, 0.0),
        ];
        let t2 = [
            Vector3::new(0.0, 0.0, -1.0),
            Vector3::new(2.0, 0.0, -1.0),
            Vector3::new(1.0, 0.0, 1.0),
        ];
        let segment = tri_tri_segment(&t1, &t2, 1e-9).expect("triangles should intersect");
        let mut xs = [segment[0][0], segment[1][0]];
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((xs[0] - 0.5).abs() < 1e-9, "got {xs:?}");
        assert!((xs[1] - 1.5).abs() < 1e-9, "got {xs:?}");
        for p in &segment {
            assert!(p[1].abs() < 1e-9 && p[2].abs() < 1e-9);
        }
    }

    #[test]
    fn separated_triangles_do_not_intersect() {
        let t1 = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ];
        let t2 = [
            Vector3::new(0.0, 0.0, 5.0),
            Vector3::new(1.0, 0.0, 5.0),
            Vector3::new(0.0, 1.0, 6.0),
        ];
        assert!(tri_tri_segment(&t1, &t2, 1e-9).is_none());
    }

    #[test]
    fn parallel_triangles_are_skipped() {
        let t1 = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ];
        let t2 = [
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 0.0, 1.0),
            Vector3::new(0.0, 1.0, 1.0),
        ];
        assert!(tri_tri_segment(&t1, &t2, 1e-9).is_none());
    }

    #[test]
    fn perpendicular_quads_intersect_in_a_line() {
        // Square in the plane x = 0.5 and square in the plane y = 0.5, both
        // spanning [0,1] on their free axes: they cross along
        // {x = 0.5, y = 0.5, z in [0,1]}.
        let a = quad_surface([
            [0.5, 0.0, 0.0],
            [0.5, 1.0, 0.0],
            [0.5, 1.0, 1.0],
            [0.5, 0.0, 1.0],
        ]);
        let b = quad_surface([
            [0.0, 0.5, 0.0],
            [1.0, 0.5, 0.0],
            [1.0, 0.5, 1.0],
            [0.0, 0.5, 1.0],
        ]);
        let curve = intersect_surfaces(&a, &b);
        assert_eq!(curve.polylines.len(), 1, "expected one stitched polyline");
        let mut z_min = f64::INFINITY;
        let mut z_max = f64::NEG_INFINITY;
        for p in curve.points() {
            assert!((p[0] - 0.5).abs() < 1e-9);
            assert!((p[1] - 0.5).abs() < 1e-9);
            z_min = z_min.min(p[2]);
            z_max = z_max.max(p[2]);
        }
        assert!(z_min < 1e-9 && z_max > 1.0 - 1e-9, "line should span z in [0,1]");
    }

    #[test]
    fn empty_input_yields_empty_curve() {
        let empty = Isosurface::default();
        let a = quad_surface([
            [0.5, 0.0, 0.0],
            [0.5, 1.0, 0.0],
            [0.5, 1.0, 1.0],
            [0.5, 0.0, 1.0],
        ]);
        assert!(intersect_surfaces(&a, &empty).is_empty());
        assert!(intersect_surfaces(&empty, &a).is_empty());
    }
}
