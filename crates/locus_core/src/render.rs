use crate::locus::ZeroLocus;
use crate::param_space::ParameterSpace;
use serde::{Deserialize, Serialize};

/// Explicit rendering configuration, passed to whichever renderer consumes
/// the extracted geometry. Replaces ambient process-wide styling state: the
/// engine never mutates global plotting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    pub font_size: u32,
    pub curve_color: String,
    pub curve_line_width: f64,
    /// Draw the full parameter-space bounding box behind the geometry.
    pub show_bounds: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_size: 10,
            curve_color: "red".to_string(),
            curve_line_width: 3.0,
            show_bounds: true,
        }
    }
}

/// Scene-level hints derived from the parameter space, independent of where
/// the extracted geometry actually lies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneHints {
    pub axis_titles: [String; 3],
    /// Anisotropic per-axis scale factors (`max_len / len`) so that axes
    /// with very different ranges render as a well-proportioned box instead
    /// of a degenerate sliver with parallel view planes.
    pub axis_scale: [f64; 3],
    /// Full declared domain extent, `[[min, max]; 3]`, for the bounding-box
    /// overlay: the viewer always sees the whole parameter space even when
    /// the curve sits in one corner of it.
    pub bounds: [[f64; 2]; 3],
}

impl SceneHints {
    pub fn from_space(space: &ParameterSpace) -> Self {
        assert_eq!(space.dim(), 3, "scene hints describe a 3-axis space");
        let lengths = [
            space.axis(0).length(),
            space.axis(1).length(),
            space.axis(2).length(),
        ];
        let max_len = lengths.iter().cloned().fold(0.0f64, f64::max);
        let axis = |i: usize| space.axis(i);
        Self {
            axis_titles: [
                axis(0).symbol.clone(),
                axis(1).symbol.clone(),
                axis(2).symbol.clone(),
            ],
            axis_scale: [
                max_len / lengths[0],
                max_len / lengths[1],
                max_len / lengths[2],
            ],
            bounds: [
                [axis(0).min, axis(0).max],
                [axis(1).min, axis(1).max],
                [axis(2).min, axis(2).max],
            ],
        }
    }
}

/// The downstream rendering collaborator. The engine only hands over
/// geometry and hints; backends (interactive viewers, static exporters)
/// live outside this crate and carry their own [`RenderConfig`].
pub trait SceneRenderer {
    fn render(&mut self, locus: &ZeroLocus, hints: &SceneHints);
}

#[cfg(test)]
mod tests {
    use super::SceneHints;
    use crate::param_space::{Axis, ParameterSpace};
    use std::collections::BTreeMap;

    #[test]
    fn axis_scale_normalizes_longest_axis_to_one() {
        let space = ParameterSpace::new(
            vec![
                Axis::new("omega_r", 0.0, 2.0, 8),
                Axis::new("omega_i", 0.0, 4.0, 8),
                Axis::new("d", 0.0, 1.0, 8),
            ],
            BTreeMap::new(),
        )
        .expect("space should validate");
        let hints = SceneHints::from_space(&space);
        assert_eq!(hints.axis_scale, [2.0, 1.0, 4.0]);
        assert_eq!(hints.bounds[1], [0.0, 4.0]);
        assert_eq!(hints.axis_titles[2], "d");
    }
}
