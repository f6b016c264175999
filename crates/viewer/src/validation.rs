//! Geometry validation utilities.
//!
//! `GeometryValidator` checks decoded geometry before it is normalized:
//! non-empty, finite positions, one color per vertex, index stride and range.

use crate::asset::{Geometry, Topology};
use crate::geometry::Aabb;

/// Validator for `Geometry` integrity checks.
pub struct GeometryValidator<'a> {
    geometry: &'a Geometry,
}

impl<'a> GeometryValidator<'a> {
    pub fn new(geometry: &'a Geometry) -> Self {
        Self { geometry }
    }

    pub fn vertex_count(&self) -> usize {
        self.geometry.positions.len()
    }

    fn indices(&self) -> &[u32] {
        match &self.geometry.topology {
            Topology::Points => &[],
            Topology::Triangles(i) | Topology::Lines(i) => i,
        }
    }

    /// Required index multiple for the topology (0 for points).
    fn stride(&self) -> usize {
        match self.geometry.topology {
            Topology::Points => 0,
            Topology::Triangles(_) => 3,
            Topology::Lines(_) => 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.geometry.positions.is_empty()
    }

    /// Check that every coordinate is finite (no NaN or infinity).
    pub fn are_positions_finite(&self) -> bool {
        self.geometry.positions.iter().all(|p| p.is_finite())
    }

    /// Colors are either absent or one per vertex.
    pub fn is_color_count_valid(&self) -> bool {
        self.geometry.colors.is_empty() || self.geometry.colors.len() == self.vertex_count()
    }

    pub fn is_index_stride_valid(&self) -> bool {
        let stride = self.stride();
        stride == 0 || self.indices().len() % stride == 0
    }

    /// Check that all indices are within the valid vertex range.
    pub fn are_indices_in_range(&self) -> bool {
        let max_idx = self.vertex_count() as u32;
        self.indices().iter().all(|&i| i < max_idx)
    }

    pub fn aabb(&self) -> Aabb {
        self.geometry.bounds()
    }

    /// Check that the AABB dimensions are approximately equal to `expected`.
    pub fn assert_dimensions_approx(&self, expected: [f32; 3], tolerance: f32) -> bool {
        let dims = self.aabb().size();
        (dims.x - expected[0]).abs() < tolerance
            && (dims.y - expected[1]).abs() < tolerance
            && (dims.z - expected[2]).abs() < tolerance
    }

    /// Run all validation checks and return a list of error messages.
    /// An empty list means the geometry is valid.
    pub fn validate_all(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.is_empty() {
            errors.push("Geometry has no vertices".to_string());
            return errors;
        }

        if !self.are_positions_finite() {
            let bad = self
                .geometry
                .positions
                .iter()
                .filter(|p| !p.is_finite())
                .count();
            errors.push(format!("{bad} vertex positions are not finite"));
        }

        if !self.is_color_count_valid() {
            errors.push(format!(
                "Color count {} does not match vertex count {}",
                self.geometry.colors.len(),
                self.vertex_count()
            ));
        }

        if !self.is_index_stride_valid() {
            errors.push(format!(
                "Index buffer length {} is not a multiple of {}",
                self.indices().len(),
                self.stride()
            ));
        }

        if !self.are_indices_in_range() {
            let max_idx = self.vertex_count() as u32;
            let out_of_range: Vec<_> = self
                .indices()
                .iter()
                .filter(|&&i| i >= max_idx)
                .take(5)
                .collect();
            errors.push(format!(
                "Indices out of range (vertex_count={}): {:?}",
                max_idx, out_of_range
            ));
        }

        errors
    }
}
