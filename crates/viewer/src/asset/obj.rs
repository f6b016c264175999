//! Wavefront OBJ: `v x y z [r g b]` vertices and `f` polygons.
//!
//! Face corners accept `v`, `v/vt`, `v//vn` and `v/vt/vn`; only the position
//! index is used. Negative indices count back from the last vertex defined so
//! far. Polygons are fan-triangulated. A file without faces is a point cloud.

use glam::Vec3;

use super::{ExternalBuffers, Geometry};
use crate::error::LoadError;

pub(super) fn decode(bytes: &[u8], _external: &ExternalBuffers) -> Result<Geometry, LoadError> {
    let text = String::from_utf8_lossy(bytes);

    let mut positions: Vec<Vec3> = Vec::new();
    let mut colors: Vec<[f32; 3]> = Vec::new();
    let mut any_color = false;
    let mut indices: Vec<u32> = Vec::new();
    let mut polygon: Vec<u32> = Vec::with_capacity(4);

    for (n, raw) in text.lines().enumerate() {
        let line_no = n + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            continue;
        };

        match keyword {
            "v" => {
                let values = parts
                    .map(|t| {
                        t.parse::<f32>().map_err(|_| {
                            LoadError::malformed(format!("line {line_no}: bad number '{t}'"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if values.len() < 3 {
                    return Err(LoadError::malformed(format!(
                        "line {line_no}: vertex needs 3 coordinates"
                    )));
                }
                positions.push(Vec3::new(values[0], values[1], values[2]));
                if values.len() >= 6 {
                    any_color = true;
                    colors.push([values[3], values[4], values[5]]);
                } else {
                    colors.push(super::DEFAULT_COLOR);
                }
            }
            "f" => {
                polygon.clear();
                for corner in parts {
                    polygon.push(resolve_index(corner, positions.len(), line_no)?);
                }
                if polygon.len() < 3 {
                    return Err(LoadError::malformed(format!(
                        "line {line_no}: face needs at least 3 vertices"
                    )));
                }
                for k in 1..polygon.len() - 1 {
                    indices.extend_from_slice(&[polygon[0], polygon[k], polygon[k + 1]]);
                }
            }
            // Normals, texture coordinates, groups and materials are not rendered
            _ => {}
        }
    }

    if !any_color {
        colors.clear();
    }

    if indices.is_empty() {
        Ok(Geometry::points(positions, colors))
    } else {
        Ok(Geometry::triangles(positions, colors, indices))
    }
}

/// Zero-based position index of a face corner token
fn resolve_index(corner: &str, defined: usize, line_no: usize) -> Result<u32, LoadError> {
    let head = corner.split('/').next().unwrap_or("");
    let idx: i64 = head
        .parse()
        .map_err(|_| LoadError::malformed(format!("line {line_no}: bad face index '{corner}'")))?;
    let resolved = match idx {
        0 => None,
        i if i > 0 => Some(i - 1),
        i => Some(defined as i64 + i),
    };
    match resolved {
        Some(i) if i >= 0 && (i as usize) < defined => Ok(i as u32),
        _ => Err(LoadError::malformed(format!(
            "line {line_no}: face index {idx} out of range"
        ))),
    }
}
