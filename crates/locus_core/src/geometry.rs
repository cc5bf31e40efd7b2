use std::collections::HashMap;

/// Linear interpolation factor for the zero crossing between two sampled
/// field values of opposite sign. Clamped to the cell; a vanishing
/// difference falls back to the midpoint.
pub(crate) fn interpolate_factor(v0: f64, v1: f64) -> f64 {
    let denominator = v0 - v1;
    if denominator.abs() <= 1e-12 {
        0.5
    } else {
        (v0 / denominator).clamp(0.0, 1.0)
    }
}

/// Joins unordered line segments into polylines by matching endpoints.
///
/// Endpoints closer than `tol` are treated as coincident. Works for both the
/// planar extractor (N = 2) and the surface-intersection curve (N = 3).
/// Junctions where more than two segments meet are split arbitrarily between
/// the chains that reach them first.
pub(crate) fn stitch_segments<const N: usize>(
    segments: Vec<[[f64; N]; 2]>,
    tol: f64,
) -> Vec<Vec<[f64; N]>> {
    let segments: Vec<[[f64; N]; 2]> = segments
        .into_iter()
        .filter(|seg| dist_sq(&seg[0], &seg[1]) > tol * tol)
        .collect();

    let mut by_endpoint: HashMap<[i64; N], Vec<(usize, usize)>> = HashMap::new();
    for (idx, seg) in segments.iter().enumerate() {
        for (end, point) in seg.iter().enumerate() {
            by_endpoint.entry(quantize(point, tol)).or_default().push((idx, end));
        }
    }

    let mut used = vec![false; segments.len()];
    let mut polylines = Vec::new();

    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let mut chain = vec![segments[start][0], segments[start][1]];

        // Grow at the tail, then at the head.
        loop {
            let tail = *chain.last().unwrap();
            match take_neighbor(&segments, &by_endpoint, &mut used, &tail, tol) {
                Some(next) => chain.push(next),
                None => break,
            }
        }
        loop {
            let head = chain[0];
            match take_neighbor(&segments, &by_endpoint, &mut used, &head, tol) {
                Some(next) => chain.insert(0, next),
                None => break,
            }
        }

        polylines.push(chain);
    }

    polylines
}

/// Finds an unused segment with an endpoint at `point`, marks it used, and
/// returns its far endpoint.
fn take_neighbor<const N: usize>(
    segments: &[[[f64; N]; 2]],
    by_endpoint: &HashMap<[i64; N], Vec<(usize, usize)>>,
    used: &mut [bool],
    point: &[f64; N],
    tol: f64,
) -> Option<[f64; N]> {
    let candidates = by_endpoint.get(&quantize(point, tol))?;
    for &(idx, end) in candidates {
        if used[idx] {
            continue;
        }
        if dist_sq(&segments[idx][end], point) <= tol * tol {
            used[idx] = true;
            return Some(segments[idx][1 - end]);
        }
    }
    None
}

fn quantize<const N: usize>(point: &[f64; N], tol: f64) -> [i64; N] {
    let mut key = [0i64; N];
    for (slot, value) in key.iter_mut().zip(point.iter()) {
        *slot = (value / tol).round() as i64;
    }
    key
}

fn dist_sq<const N: usize>(a: &[f64; N], b: &[f64; N]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
