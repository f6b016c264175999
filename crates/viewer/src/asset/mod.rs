//! Normalized renderable assets and the format dispatch table.
//!
//! Every decoder produces a [`Geometry`]; [`SceneAsset::from_geometry`] is the
//! single post-processing step shared by all formats (validate, center,
//! scale to the reference size, fill default colors).

mod gltf_scene;
mod normalize;
mod obj;
mod ply;

use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use shared::ResultMetadata;

use crate::error::LoadError;
use crate::geometry::Aabb;
use crate::validation::GeometryValidator;

pub use normalize::{normalize, NormalizeOptions, Normalized};

/// Light grey used for points and faces that carry no color
pub const DEFAULT_COLOR: [f32; 3] = [0.78, 0.78, 0.8];

/// Connectivity of a geometry buffer
#[derive(Clone, Debug, PartialEq)]
pub enum Topology {
    /// Unconnected points (point clouds)
    Points,
    /// Index triples
    Triangles(Vec<u32>),
    /// Index pairs (helper overlays only)
    Lines(Vec<u32>),
}

/// CPU-side geometry: one position and one color per vertex
#[derive(Clone, Debug, PartialEq)]
pub struct Geometry {
    pub positions: Vec<Vec3>,
    /// Linear RGB in [0, 1]; empty until a default is assigned
    pub colors: Vec<[f32; 3]>,
    pub topology: Topology,
}

impl Geometry {
    pub fn points(positions: Vec<Vec3>, colors: Vec<[f32; 3]>) -> Self {
        Self {
            positions,
            colors,
            topology: Topology::Points,
        }
    }

    pub fn triangles(positions: Vec<Vec3>, colors: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            colors,
            topology: Topology::Triangles(indices),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        match &self.topology {
            Topology::Triangles(indices) => indices.len() / 3,
            _ => 0,
        }
    }

    pub fn triangle(&self, tri: usize) -> Option<[Vec3; 3]> {
        let Topology::Triangles(indices) = &self.topology else {
            return None;
        };
        let i = indices.get(tri * 3..tri * 3 + 3)?;
        Some([
            *self.positions.get(i[0] as usize)?,
            *self.positions.get(i[1] as usize)?,
            *self.positions.get(i[2] as usize)?,
        ])
    }

    /// Unit normal of triangle `tri`, zero for degenerate faces
    pub fn face_normal(&self, tri: usize) -> Option<Vec3> {
        let [a, b, c] = self.triangle(tri)?;
        Some((b - a).cross(c - a).normalize_or_zero())
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.positions.iter().copied())
    }
}

/// What kind of content an asset turned out to contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatTag {
    PointCloud,
    Mesh,
    SceneGraph,
}

impl FormatTag {
    /// Tag from the container format, refined by what was decoded
    pub fn discover(format: AssetFormat, geometry: &Geometry) -> Self {
        match (format.tag(), &geometry.topology) {
            (FormatTag::SceneGraph, _) => FormatTag::SceneGraph,
            (_, Topology::Triangles(_)) => FormatTag::Mesh,
            _ => FormatTag::PointCloud,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FormatTag::PointCloud => "Point cloud",
            FormatTag::Mesh => "Mesh",
            FormatTag::SceneGraph => "Scene graph",
        }
    }
}

/// External buffers referenced by a glTF document, keyed by their URI
pub type ExternalBuffers = HashMap<String, Vec<u8>>;

/// Decoder entry in the dispatch table
pub type DecodeFn = fn(&[u8], &ExternalBuffers) -> Result<Geometry, LoadError>;

/// Supported container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetFormat {
    Ply,
    Obj,
    Gltf,
    Glb,
}

impl AssetFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "ply" => Some(Self::Ply),
            "obj" => Some(Self::Obj),
            "gltf" => Some(Self::Gltf),
            "glb" => Some(Self::Glb),
            _ => None,
        }
    }

    /// Extension of the last path segment, ignoring query and fragment
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
        let (_, ext) = file.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// Hint wins over the URL; neither resolving is `UnsupportedFormat`
    pub fn resolve(url: &str, hint: Option<&str>) -> Result<Self, LoadError> {
        match hint {
            Some(h) => Self::from_extension(h)
                .ok_or_else(|| LoadError::UnsupportedFormat(format!("format hint '{h}'"))),
            None => Self::from_url(url)
                .ok_or_else(|| LoadError::UnsupportedFormat(format!("cannot infer format of '{url}'"))),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Ply => "ply",
            Self::Obj => "obj",
            Self::Gltf => "gltf",
            Self::Glb => "glb",
        }
    }

    /// Nominal content of the container
    pub fn tag(&self) -> FormatTag {
        match self {
            Self::Ply => FormatTag::PointCloud,
            Self::Obj => FormatTag::Mesh,
            Self::Gltf | Self::Glb => FormatTag::SceneGraph,
        }
    }

    pub fn all() -> &'static [AssetFormat] {
        &[Self::Ply, Self::Obj, Self::Gltf, Self::Glb]
    }

    pub fn decoder(&self) -> DecodeFn {
        match self {
            Self::Ply => ply::decode,
            Self::Obj => obj::decode,
            Self::Gltf | Self::Glb => gltf_scene::decode,
        }
    }

    /// URIs that must be fetched before decoding (glTF external buffers)
    pub fn external_references(&self, bytes: &[u8]) -> Result<Vec<String>, LoadError> {
        match self {
            Self::Ply | Self::Obj => Ok(Vec::new()),
            Self::Gltf | Self::Glb => gltf_scene::external_buffer_uris(bytes),
        }
    }
}

/// A fully decoded, validated and normalized asset
#[derive(Clone, Debug)]
pub struct SceneAsset {
    pub source_url: String,
    pub format: AssetFormat,
    pub tag: FormatTag,
    pub geometry: Geometry,
    /// Bounds after normalization (centered at the origin)
    pub bounds: Aabb,
    /// Bounds in the file's own coordinates
    pub original_bounds: Aabb,
    /// Uniform scale applied at load time
    pub scale: f32,
    /// Translation applied before scaling (negated original center)
    pub offset: Vec3,
    pub metadata: Option<ResultMetadata>,
}

impl SceneAsset {
    /// Shared post-processing step for every decoder
    pub fn from_geometry(
        source_url: &str,
        format: AssetFormat,
        geometry: Geometry,
        options: &NormalizeOptions,
    ) -> Result<Self, LoadError> {
        let errors = GeometryValidator::new(&geometry).validate_all();
        if !errors.is_empty() {
            return Err(LoadError::MalformedAsset(errors.join("; ")));
        }

        let tag = FormatTag::discover(format, &geometry);
        let Normalized {
            geometry,
            bounds,
            original_bounds,
            scale,
            offset,
        } = normalize(geometry, options);

        Ok(Self {
            source_url: source_url.to_string(),
            format,
            tag,
            geometry,
            bounds,
            original_bounds,
            scale,
            offset,
            metadata: None,
        })
    }

    /// Decode bytes with the format's decoder and normalize the result
    pub fn decode(
        source_url: &str,
        format: AssetFormat,
        bytes: &[u8],
        external: &ExternalBuffers,
        options: &NormalizeOptions,
    ) -> Result<Self, LoadError> {
        let geometry = (format.decoder())(bytes, external)?;
        Self::from_geometry(source_url, format, geometry, options)
    }

    pub fn vertex_count(&self) -> usize {
        self.geometry.vertex_count()
    }

    pub fn face_count(&self) -> usize {
        self.geometry.triangle_count()
    }

    /// Map a normalized-space point back into the file's coordinates
    pub fn to_original(&self, p: Vec3) -> Vec3 {
        p / self.scale - self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_url() {
        assert_eq!(AssetFormat::from_url("http://h/a/model.PLY"), Some(AssetFormat::Ply));
        assert_eq!(AssetFormat::from_url("/models/x.glb?token=1#frag"), Some(AssetFormat::Glb));
        assert_eq!(AssetFormat::from_url("scene.gltf"), Some(AssetFormat::Gltf));
        assert_eq!(AssetFormat::from_url("C:\\data\\mesh.obj"), Some(AssetFormat::Obj));
        assert_eq!(AssetFormat::from_url("http://h/model.fbx"), None);
        assert_eq!(AssetFormat::from_url("http://h.example/model"), None);
    }

    #[test]
    fn test_hint_overrides_url() {
        let f = AssetFormat::resolve("http://h/download?id=3", Some("glb")).unwrap();
        assert_eq!(f, AssetFormat::Glb);
        let err = AssetFormat::resolve("http://h/a.ply", Some("fbx")).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_unresolvable_is_unsupported() {
        let err = AssetFormat::resolve("http://h/model.stl", None).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_discover_tag() {
        let pts = Geometry::points(vec![Vec3::ZERO], vec![]);
        let tri = Geometry::triangles(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![], vec![0, 1, 2]);
        assert_eq!(FormatTag::discover(AssetFormat::Ply, &pts), FormatTag::PointCloud);
        assert_eq!(FormatTag::discover(AssetFormat::Ply, &tri), FormatTag::Mesh);
        assert_eq!(FormatTag::discover(AssetFormat::Obj, &tri), FormatTag::Mesh);
        assert_eq!(FormatTag::discover(AssetFormat::Glb, &pts), FormatTag::SceneGraph);
    }

    #[test]
    fn test_from_geometry_rejects_invalid() {
        let bad = Geometry::triangles(vec![Vec3::ZERO, Vec3::X], vec![], vec![0, 1, 7]);
        let err = SceneAsset::from_geometry("x.obj", AssetFormat::Obj, bad, &NormalizeOptions::default())
            .unwrap_err();
        assert!(matches!(err, LoadError::MalformedAsset(_)));
    }

    #[test]
    fn test_to_original_inverts_normalization() {
        let g = Geometry::points(vec![Vec3::new(10.0, 0.0, 0.0), Vec3::new(20.0, 4.0, 2.0)], vec![]);
        let asset = SceneAsset::from_geometry("p.ply", AssetFormat::Ply, g, &NormalizeOptions::default())
            .unwrap();
        let back = asset.to_original(asset.geometry.positions[1]);
        assert!((back - Vec3::new(20.0, 4.0, 2.0)).length() < 1e-4);
    }
}
