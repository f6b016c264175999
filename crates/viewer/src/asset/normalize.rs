use glam::Vec3;

use super::{Geometry, DEFAULT_COLOR};
use crate::geometry::Aabb;

/// Parameters of the shared post-processing step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeOptions {
    /// Largest bounding-box dimension after scaling
    pub reference_size: f32,
    /// Assigned to every vertex when the source has no colors
    pub default_color: [f32; 3],
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            reference_size: 5.0,
            default_color: DEFAULT_COLOR,
        }
    }
}

pub struct Normalized {
    pub geometry: Geometry,
    pub bounds: Aabb,
    pub original_bounds: Aabb,
    pub scale: f32,
    pub offset: Vec3,
}

/// Center on the origin and scale uniformly so the largest dimension
/// equals `reference_size`. Zero-extent geometry, and extents too large to
/// represent, keep scale 1.
pub fn normalize(mut geometry: Geometry, options: &NormalizeOptions) -> Normalized {
    let original_bounds = geometry.bounds();
    let offset = -original_bounds.center();
    let max_dim = original_bounds.max_dimension();
    let scale = if max_dim.is_finite() && max_dim > f32::EPSILON {
        options.reference_size / max_dim
    } else {
        1.0
    };
    let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };

    for p in &mut geometry.positions {
        *p = (*p + offset) * scale;
    }

    if geometry.colors.is_empty() {
        geometry.colors = vec![options.default_color; geometry.positions.len()];
    }

    let bounds = geometry.bounds();
    Normalized {
        geometry,
        bounds,
        original_bounds,
        scale,
        offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_and_scaled() {
        let g = Geometry::points(
            vec![Vec3::new(10.0, 10.0, 10.0), Vec3::new(12.0, 11.0, 10.5)],
            vec![],
        );
        let n = normalize(g, &NormalizeOptions::default());
        assert!(n.bounds.center().length() < 1e-5);
        assert!((n.bounds.max_dimension() - 5.0).abs() < 1e-5);
        assert!((n.scale - 2.5).abs() < 1e-6);
        assert_eq!(n.original_bounds.min, Vec3::new(10.0, 10.0, 10.0));
    }

    #[test]
    fn test_default_color_assigned() {
        let g = Geometry::points(vec![Vec3::ZERO, Vec3::ONE], vec![]);
        let opts = NormalizeOptions {
            reference_size: 1.0,
            default_color: [1.0, 0.0, 0.0],
        };
        let n = normalize(g, &opts);
        assert_eq!(n.geometry.colors, vec![[1.0, 0.0, 0.0]; 2]);
    }

    #[test]
    fn test_existing_colors_kept() {
        let g = Geometry::points(vec![Vec3::ZERO, Vec3::ONE], vec![[0.1, 0.2, 0.3]; 2]);
        let n = normalize(g, &NormalizeOptions::default());
        assert_eq!(n.geometry.colors[1], [0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_single_point_not_scaled() {
        let g = Geometry::points(vec![Vec3::new(3.0, 4.0, 5.0)], vec![]);
        let n = normalize(g, &NormalizeOptions::default());
        assert_eq!(n.scale, 1.0);
        assert_eq!(n.geometry.positions[0], Vec3::ZERO);
    }

    #[test]
    fn test_overflowing_extent_not_scaled() {
        let g = Geometry::points(vec![Vec3::new(-3.0e38, 0.0, 0.0), Vec3::new(3.0e38, 1.0, 0.0)], vec![]);
        let n = normalize(g, &NormalizeOptions::default());
        assert!(n.original_bounds.max_dimension().is_infinite());
        assert_eq!(n.scale, 1.0);
    }

    #[test]
    fn test_non_positive_reference_size_not_scaled() {
        let g = Geometry::points(vec![Vec3::ZERO, Vec3::ONE], vec![]);
        let opts = NormalizeOptions {
            reference_size: 0.0,
            ..Default::default()
        };
        assert_eq!(normalize(g, &opts).scale, 1.0);
    }
}
