//! glTF 2.0 (`.gltf` JSON and `.glb` binary) scene graphs.
//!
//! The default scene (or the first scene) is flattened: every mesh
//! primitive is transformed by its node's world matrix and merged into one
//! geometry. Triangle primitives win over point primitives when both exist.

use glam::{Mat4, Vec3};
use gltf::mesh::Mode;
use gltf::Gltf;

use super::{ExternalBuffers, Geometry, DEFAULT_COLOR};
use crate::error::LoadError;

fn parse(bytes: &[u8]) -> Result<Gltf, LoadError> {
    Gltf::from_slice(bytes).map_err(|e| LoadError::malformed(format!("glTF: {e}")))
}

/// URIs of buffers that live outside the document (not `data:` and not the
/// GLB binary chunk)
pub(super) fn external_buffer_uris(bytes: &[u8]) -> Result<Vec<String>, LoadError> {
    let gltf = parse(bytes)?;
    Ok(gltf
        .buffers()
        .filter_map(|b| match b.source() {
            gltf::buffer::Source::Uri(uri) if !uri.starts_with("data:") => Some(uri.to_string()),
            _ => None,
        })
        .collect())
}

pub(super) fn decode(bytes: &[u8], external: &ExternalBuffers) -> Result<Geometry, LoadError> {
    let gltf = parse(bytes)?;
    let buffers = load_buffers(&gltf, external)?;

    let mut tris = Accumulator::default();
    let mut points = Accumulator::default();

    match gltf.default_scene().or_else(|| gltf.scenes().next()) {
        Some(scene) => {
            for node in scene.nodes() {
                visit(&node, Mat4::IDENTITY, &buffers, &mut tris, &mut points)?;
            }
        }
        None => {
            // No scene: take every mesh untransformed
            for mesh in gltf.meshes() {
                for primitive in mesh.primitives() {
                    read_primitive(&primitive, Mat4::IDENTITY, &buffers, &mut tris, &mut points)?;
                }
            }
        }
    }

    if !tris.indices.is_empty() {
        Ok(Geometry::triangles(tris.positions, tris.colors, tris.indices))
    } else if !points.positions.is_empty() {
        Ok(Geometry::points(points.positions, points.colors))
    } else {
        Err(LoadError::malformed("glTF contains no renderable primitives"))
    }
}

fn load_buffers(gltf: &Gltf, external: &ExternalBuffers) -> Result<Vec<Vec<u8>>, LoadError> {
    let mut data = Vec::new();
    for buffer in gltf.buffers() {
        let bytes = match buffer.source() {
            gltf::buffer::Source::Bin => gltf
                .blob
                .clone()
                .ok_or_else(|| LoadError::malformed("GLB is missing its binary chunk"))?,
            gltf::buffer::Source::Uri(uri) if uri.starts_with("data:") => {
                let (_, encoded) = uri
                    .split_once(',')
                    .ok_or_else(|| LoadError::malformed("invalid data URI"))?;
                base64_decode(encoded)?
            }
            gltf::buffer::Source::Uri(uri) => external
                .get(uri)
                .cloned()
                .ok_or_else(|| LoadError::malformed(format!("missing external buffer '{uri}'")))?,
        };
        if bytes.len() < buffer.length() {
            return Err(LoadError::malformed(format!(
                "buffer {} holds {} bytes, expected {}",
                buffer.index(),
                bytes.len(),
                buffer.length()
            )));
        }
        data.push(bytes);
    }
    Ok(data)
}

#[derive(Default)]
struct Accumulator {
    positions: Vec<Vec3>,
    colors: Vec<[f32; 3]>,
    indices: Vec<u32>,
}

fn visit(
    node: &gltf::Node,
    parent: Mat4,
    buffers: &[Vec<u8>],
    tris: &mut Accumulator,
    points: &mut Accumulator,
) -> Result<(), LoadError> {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            read_primitive(&primitive, world, buffers, tris, points)?;
        }
    }
    for child in node.children() {
        visit(&child, world, buffers, tris, points)?;
    }
    Ok(())
}

fn read_primitive(
    primitive: &gltf::Primitive,
    world: Mat4,
    buffers: &[Vec<u8>],
    tris: &mut Accumulator,
    points: &mut Accumulator,
) -> Result<(), LoadError> {
    let is_mesh = match primitive.mode() {
        Mode::Triangles | Mode::TriangleStrip | Mode::TriangleFan => true,
        Mode::Points => false,
        // Line primitives carry nothing measurable
        Mode::Lines | Mode::LineLoop | Mode::LineStrip => return Ok(()),
    };
    let target = if is_mesh { tris } else { points };

    let reader = primitive.reader(|b| buffers.get(b.index()).map(|d| d.as_slice()));
    let Some(positions) = reader.read_positions() else {
        return Ok(());
    };

    let base = target.positions.len() as u32;
    let local: Vec<Vec3> = positions
        .map(|p| world.transform_point3(Vec3::from(p)))
        .collect();
    let count = local.len();

    let colors: Vec<[f32; 3]> = match reader.read_colors(0) {
        Some(c) => c.into_rgb_f32().take(count).collect(),
        None => {
            let fill = if primitive.material().index().is_some() {
                let [r, g, b, _] = primitive.material().pbr_metallic_roughness().base_color_factor();
                [r, g, b]
            } else {
                DEFAULT_COLOR
            };
            vec![fill; count]
        }
    };
    if colors.len() != count {
        return Err(LoadError::malformed("glTF color accessor shorter than positions"));
    }

    if is_mesh {
        let raw: Vec<u32> = match reader.read_indices() {
            Some(i) => i.into_u32().collect(),
            None => (0..count as u32).collect(),
        };
        if let Some(bad) = raw.iter().find(|&&i| i as usize >= count) {
            return Err(LoadError::malformed(format!("glTF index {bad} out of range")));
        }
        let triangles = match primitive.mode() {
            Mode::TriangleStrip => strip_to_list(&raw),
            Mode::TriangleFan => fan_to_list(&raw),
            _ => raw,
        };
        target
            .indices
            .extend(triangles.iter().map(|i| i + base));
    }

    target.positions.extend(local);
    target.colors.extend(colors);
    Ok(())
}

fn strip_to_list(strip: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(strip.len().saturating_sub(2) * 3);
    for k in 0..strip.len().saturating_sub(2) {
        // Alternate winding to keep faces consistently oriented
        if k % 2 == 0 {
            out.extend_from_slice(&[strip[k], strip[k + 1], strip[k + 2]]);
        } else {
            out.extend_from_slice(&[strip[k + 1], strip[k], strip[k + 2]]);
        }
    }
    out
}

fn fan_to_list(fan: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(fan.len().saturating_sub(2) * 3);
    for k in 1..fan.len().saturating_sub(1) {
        out.extend_from_slice(&[fan[0], fan[k], fan[k + 1]]);
    }
    out
}

/// Standard-alphabet base64 used by embedded `data:` buffers
fn base64_decode(input: &str) -> Result<Vec<u8>, LoadError> {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    let mut output = Vec::with_capacity(input.len() * 3 / 4);
    let mut buffer = 0u32;
    let mut bits = 0;

    for byte in input.bytes() {
        if byte == b'=' {
            break;
        }
        if byte.is_ascii_whitespace() {
            continue;
        }
        let value = CHARS
            .iter()
            .position(|&c| c == byte)
            .ok_or_else(|| LoadError::malformed(format!("invalid base64 character '{}'", byte as char)))?
            as u32;

        buffer = (buffer << 6) | value;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            output.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Topology;
    use crate::fixtures;

    #[test]
    fn test_embedded_buffer_triangle() {
        let json = fixtures::triangle_gltf(fixtures::TRIANGLE_DATA_URI);
        let g = decode(json.as_bytes(), &ExternalBuffers::new()).unwrap();
        assert_eq!(g.topology, Topology::Triangles(vec![0, 1, 2]));
        // Node translation [1, 0, 0] is applied
        assert_eq!(g.positions[0], Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(g.positions[1], Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(g.colors.len(), 3);
    }

    #[test]
    fn test_glb_binary_chunk() {
        let glb = fixtures::triangle_glb();
        let g = decode(&glb, &ExternalBuffers::new()).unwrap();
        assert_eq!(g.triangle_count(), 1);
    }

    #[test]
    fn test_external_buffer_listed_and_required() {
        let json = fixtures::triangle_gltf("triangle.bin");
        let uris = external_buffer_uris(json.as_bytes()).unwrap();
        assert_eq!(uris, vec!["triangle.bin".to_string()]);

        let err = decode(json.as_bytes(), &ExternalBuffers::new()).unwrap_err();
        assert!(matches!(err, LoadError::MalformedAsset(_)));

        let mut ext = ExternalBuffers::new();
        ext.insert("triangle.bin".into(), fixtures::triangle_buffer());
        assert!(decode(json.as_bytes(), &ext).is_ok());
    }

    #[test]
    fn test_embedded_uri_not_external() {
        let json = fixtures::triangle_gltf(fixtures::TRIANGLE_DATA_URI);
        assert!(external_buffer_uris(json.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = decode(b"not a gltf", &ExternalBuffers::new()).unwrap_err();
        assert!(matches!(err, LoadError::MalformedAsset(_)));
    }

    #[test]
    fn test_base64_decode() {
        assert_eq!(base64_decode("aGVsbG8=").unwrap(), b"hello");
        assert!(base64_decode("a$b").is_err());
    }

    #[test]
    fn test_strip_and_fan() {
        assert_eq!(strip_to_list(&[0, 1, 2, 3]), vec![0, 1, 2, 2, 1, 3]);
        assert_eq!(fan_to_list(&[0, 1, 2, 3]), vec![0, 1, 2, 0, 2, 3]);
    }
}
