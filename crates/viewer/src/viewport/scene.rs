//! Scene graph: the loaded asset plus non-pickable helper nodes (grid,
//! measurement and annotation markers).

use glam::Vec3;
use serde::Serialize;
use uuid::Uuid;

use crate::asset::{Geometry, SceneAsset, Topology};
use crate::geometry::Aabb;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Asset,
    Grid,
    MeasurementMarker(Uuid),
    AnnotationMarker(Uuid),
}

impl NodeKind {
    /// Only asset geometry can be struck by a pick ray
    pub fn is_intersectable(&self) -> bool {
        matches!(self, NodeKind::Asset)
    }
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub geometry: Geometry,
    pub bounds: Aabb,
    pub visible: bool,
}

/// Borrowed view of any node, asset included
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    pub id: NodeId,
    pub kind: NodeKind,
    pub geometry: &'a Geometry,
    pub bounds: Aabb,
    pub visible: bool,
}

/// Marker request: one small solid per point, owned by a tool item
#[derive(Debug, Clone)]
pub struct Marker {
    pub owner: NodeKind,
    pub points: Vec<Vec3>,
    pub color: [f32; 3],
}

#[derive(Debug, Default)]
pub struct SceneGraph {
    next_id: u64,
    asset: Option<(NodeId, SceneAsset)>,
    grid: Option<SceneNode>,
    markers: Vec<SceneNode>,
    grid_visible: bool,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            grid_visible: true,
            ..Default::default()
        }
    }

    fn alloc_id(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId(self.next_id)
    }

    /// Replace the asset (the previous one is dropped) and resize the grid
    pub fn set_asset(&mut self, asset: SceneAsset) -> NodeId {
        let id = self.alloc_id();
        let bounds = asset.bounds;
        self.asset = Some((id, asset));
        self.rebuild_grid(&bounds);
        id
    }

    pub fn clear_asset(&mut self) {
        self.asset = None;
        self.grid = None;
    }

    pub fn asset(&self) -> Option<&SceneAsset> {
        self.asset.as_ref().map(|(_, a)| a)
    }

    pub fn asset_node(&self) -> Option<NodeId> {
        self.asset.as_ref().map(|(id, _)| *id)
    }

    pub fn set_grid_visible(&mut self, visible: bool) {
        self.grid_visible = visible;
        if let Some(grid) = &mut self.grid {
            grid.visible = visible;
        }
    }

    fn rebuild_grid(&mut self, bounds: &Aabb) {
        let half = bounds.max_dimension().max(1.0).ceil();
        let geometry = grid_geometry(half, half / 5.0, bounds.min.y);
        let id = self.alloc_id();
        self.grid = Some(SceneNode {
            id,
            kind: NodeKind::Grid,
            bounds: geometry.bounds(),
            geometry,
            visible: self.grid_visible,
        });
    }

    /// Replace all marker nodes
    pub fn set_markers(&mut self, markers: impl IntoIterator<Item = Marker>, size: f32) {
        self.markers.clear();
        for marker in markers {
            if marker.points.is_empty() {
                continue;
            }
            let geometry = marker_geometry(&marker.points, size, marker.color);
            let id = self.alloc_id();
            self.markers.push(SceneNode {
                id,
                kind: marker.owner,
                bounds: geometry.bounds(),
                geometry,
                visible: true,
            });
        }
    }

    pub fn markers(&self) -> &[SceneNode] {
        &self.markers
    }

    /// All nodes, asset first
    pub fn nodes(&self) -> impl Iterator<Item = NodeView<'_>> {
        let asset = self.asset.as_ref().map(|(id, a)| NodeView {
            id: *id,
            kind: NodeKind::Asset,
            geometry: &a.geometry,
            bounds: a.bounds,
            visible: true,
        });
        let helpers = self.grid.iter().chain(self.markers.iter()).map(|n| NodeView {
            id: n.id,
            kind: n.kind,
            geometry: &n.geometry,
            bounds: n.bounds,
            visible: n.visible,
        });
        asset.into_iter().chain(helpers)
    }

    /// Visible nodes a pick ray may hit
    pub fn pick_targets(&self) -> impl Iterator<Item = NodeView<'_>> {
        self.nodes().filter(|n| n.visible && n.kind.is_intersectable())
    }
}

/// Square line grid on the XZ plane at height `y`
pub fn grid_geometry(half_extent: f32, step: f32, y: f32) -> Geometry {
    let mut positions = Vec::new();
    let mut indices = Vec::new();
    let lines = (2.0 * half_extent / step).round() as i32;
    for i in 0..=lines {
        let c = -half_extent + i as f32 * step;
        for (a, b) in [
            (Vec3::new(c, y, -half_extent), Vec3::new(c, y, half_extent)),
            (Vec3::new(-half_extent, y, c), Vec3::new(half_extent, y, c)),
        ] {
            indices.push(positions.len() as u32);
            positions.push(a);
            indices.push(positions.len() as u32);
            positions.push(b);
        }
    }
    let colors = vec![[0.35, 0.35, 0.38]; positions.len()];
    Geometry {
        positions,
        colors,
        topology: Topology::Lines(indices),
    }
}

/// Octahedra of radius `size` around each point
pub fn marker_geometry(points: &[Vec3], size: f32, color: [f32; 3]) -> Geometry {
    const FACES: [[u32; 3]; 8] = [
        [0, 2, 4],
        [2, 1, 4],
        [1, 3, 4],
        [3, 0, 4],
        [2, 0, 5],
        [1, 2, 5],
        [3, 1, 5],
        [0, 3, 5],
    ];
    let mut positions = Vec::with_capacity(points.len() * 6);
    let mut indices = Vec::with_capacity(points.len() * 24);
    for p in points {
        let base = positions.len() as u32;
        positions.extend_from_slice(&[
            *p + Vec3::X * size,
            *p - Vec3::X * size,
            *p + Vec3::Z * size,
            *p - Vec3::Z * size,
            *p + Vec3::Y * size,
            *p - Vec3::Y * size,
        ]);
        for f in FACES {
            indices.extend(f.iter().map(|i| base + i));
        }
    }
    let colors = vec![color; positions.len()];
    Geometry::triangles(positions, colors, indices)
}
