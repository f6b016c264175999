use glam::{Vec2, Vec3};
use serde::Serialize;

use super::camera::CameraController;
use super::scene::{NodeId, SceneGraph};
use crate::asset::{Geometry, Topology};
use crate::geometry::Aabb;

/// A ray in world space
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Nearest surface struck by a pick ray
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PickHit {
    pub point: Vec3,
    pub node: NodeId,
    /// Triangle index for meshes, point index for point clouds
    pub primitive: usize,
    /// Distance along the ray
    pub distance: f32,
}

/// Cast a ray through `ndc` and return the nearest hit on intersectable
/// nodes. Points within `radius` of the ray count as hits.
pub fn pick(
    ndc: Vec2,
    camera: &CameraController,
    scene: &SceneGraph,
    aspect: f32,
    radius: f32,
) -> Option<PickHit> {
    pick_ray(&camera.screen_ray(ndc, aspect), scene, radius)
}

pub fn pick_ray(ray: &Ray, scene: &SceneGraph, radius: f32) -> Option<PickHit> {
    let mut best: Option<PickHit> = None;

    for node in scene.pick_targets() {
        let hit = match node.geometry.topology {
            Topology::Triangles(_) => {
                if ray_aabb(ray, &node.bounds.inflate(1e-4)).is_none() {
                    continue;
                }
                pick_triangle(ray, node.geometry).map(|(tri, t)| (tri, t, ray.at(t)))
            }
            Topology::Points => {
                if ray_aabb(ray, &node.bounds.inflate(radius)).is_none() {
                    continue;
                }
                pick_point(ray, node.geometry, radius)
                    .map(|(i, t)| (i, t, node.geometry.positions[i]))
            }
            Topology::Lines(_) => None,
        };

        if let Some((primitive, distance, point)) = hit {
            if best.as_ref().is_none_or(|b| distance < b.distance) {
                best = Some(PickHit {
                    point,
                    node: node.id,
                    primitive,
                    distance,
                });
            }
        }
    }

    best
}

/// Ray-AABB intersection using the slab method.
/// Returns the distance along the ray to the nearest hit, or None.
pub fn ray_aabb(ray: &Ray, aabb: &Aabb) -> Option<f32> {
    let inv_dir = Vec3::new(
        1.0 / ray.direction.x,
        1.0 / ray.direction.y,
        1.0 / ray.direction.z,
    );

    let t1 = (aabb.min.x - ray.origin.x) * inv_dir.x;
    let t2 = (aabb.max.x - ray.origin.x) * inv_dir.x;
    let t3 = (aabb.min.y - ray.origin.y) * inv_dir.y;
    let t4 = (aabb.max.y - ray.origin.y) * inv_dir.y;
    let t5 = (aabb.min.z - ray.origin.z) * inv_dir.z;
    let t6 = (aabb.max.z - ray.origin.z) * inv_dir.z;

    let tmin = t1.min(t2).max(t3.min(t4)).max(t5.min(t6));
    let tmax = t1.max(t2).min(t3.max(t4)).min(t5.max(t6));

    if tmax < 0.0 || tmin > tmax {
        return None;
    }

    Some(if tmin < 0.0 { tmax } else { tmin })
}

/// Möller-Trumbore ray-triangle intersection algorithm.
/// Returns the distance along the ray if hit, or None if no intersection.
pub fn ray_triangle_intersect(ray: &Ray, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<f32> {
    const EPSILON: f32 = 1e-7;

    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = ray.direction.cross(edge2);
    let a = edge1.dot(h);

    // Ray is parallel to triangle
    if a.abs() < EPSILON {
        return None;
    }

    let f = 1.0 / a;
    let s = ray.origin - v0;
    let u = f * s.dot(h);

    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * ray.direction.dot(q);

    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(q);

    // Intersection is behind ray origin
    if t > EPSILON {
        Some(t)
    } else {
        None
    }
}

/// Nearest triangle hit: (triangle index, distance)
pub fn pick_triangle(ray: &Ray, geometry: &Geometry) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for tri in 0..geometry.triangle_count() {
        let Some([v0, v1, v2]) = geometry.triangle(tri) else {
            continue;
        };
        if let Some(t) = ray_triangle_intersect(ray, v0, v1, v2) {
            if best.is_none_or(|(_, d)| t < d) {
                best = Some((tri, t));
            }
        }
    }
    best
}

/// Along-ray parameter and perpendicular distance of `p`; `None` behind the origin
pub fn ray_point_distance(ray: &Ray, p: Vec3) -> Option<(f32, f32)> {
    let t = (p - ray.origin).dot(ray.direction);
    if t <= 0.0 {
        return None;
    }
    Some((t, ray.at(t).distance(p)))
}

/// Nearest point (along the ray) within `radius` of the ray: (index, distance)
pub fn pick_point(ray: &Ray, geometry: &Geometry, radius: f32) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, p) in geometry.positions.iter().enumerate() {
        let Some((t, perp)) = ray_point_distance(ray, *p) else {
            continue;
        };
        if perp <= radius && best.is_none_or(|(_, d)| t < d) {
            best = Some((i, t));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetFormat, NormalizeOptions, SceneAsset};
    use crate::viewport::camera::ViewPreset;
    use crate::viewport::scene::{Marker, NodeKind};

    fn ray_down_z(x: f32, y: f32) -> Ray {
        Ray {
            origin: Vec3::new(x, y, 10.0),
            direction: Vec3::NEG_Z,
        }
    }

    fn scene_with(geometry: Geometry) -> SceneGraph {
        // Reference size equal to the extent keeps coordinates unchanged
        let opts = NormalizeOptions {
            reference_size: geometry.bounds().max_dimension(),
            ..Default::default()
        };
        let asset = SceneAsset::from_geometry("t.obj", AssetFormat::Obj, geometry, &opts).unwrap();
        let mut scene = SceneGraph::new();
        scene.set_asset(asset);
        scene
    }

    #[test]
    fn test_triangle_intersect() {
        let ray = ray_down_z(0.2, 0.2);
        let t = ray_triangle_intersect(&ray, Vec3::ZERO, Vec3::X, Vec3::Y).unwrap();
        assert!((t - 10.0).abs() < 1e-5);
        assert!(ray_triangle_intersect(&ray_down_z(2.0, 2.0), Vec3::ZERO, Vec3::X, Vec3::Y).is_none());
    }

    #[test]
    fn test_ray_aabb() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        assert!((ray_aabb(&ray_down_z(0.0, 0.0), &aabb).unwrap() - 9.0).abs() < 1e-5);
        assert!(ray_aabb(&ray_down_z(3.0, 0.0), &aabb).is_none());
    }

    #[test]
    fn test_nearest_triangle_wins() {
        // Two stacked quads; the nearer (z = 1) must win
        let positions = vec![
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
        ];
        let scene = scene_with(Geometry::triangles(positions, vec![], vec![0, 1, 2, 3, 4, 5]));
        let hit = pick_ray(&ray_down_z(0.5, -0.5), &scene, 0.05).unwrap();
        assert_eq!(hit.primitive, 1);
        assert!((hit.point.z - 0.5).abs() < 1e-4);
        assert_eq!(Some(hit.node), scene.asset_node());
    }

    #[test]
    fn test_point_within_radius() {
        let positions = vec![
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(0.01, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 0.0),
        ];
        let scene = scene_with(Geometry::points(positions, vec![]));
        let asset = scene.asset().unwrap();
        let target = asset.geometry.positions[0];
        let ray = Ray {
            origin: Vec3::new(target.x, target.y, 10.0),
            direction: Vec3::NEG_Z,
        };
        let hit = pick_ray(&ray, &scene, 0.05).unwrap();
        // Both first points lie near the ray; the one at higher z is nearer
        assert_eq!(hit.primitive, 1);
        assert_eq!(hit.point, asset.geometry.positions[1]);

        let miss = Ray {
            origin: Vec3::new(-1.0, 1.0, 10.0),
            direction: Vec3::NEG_Z,
        };
        assert!(pick_ray(&miss, &scene, 0.05).is_none());
    }

    #[test]
    fn test_markers_and_grid_not_pickable() {
        let mut scene = scene_with(Geometry::points(
            vec![Vec3::new(2.0, 2.0, 0.0), Vec3::new(3.0, 3.0, 0.0)],
            vec![],
        ));
        scene.set_markers(
            vec![Marker {
                owner: NodeKind::MeasurementMarker(uuid::Uuid::new_v4()),
                points: vec![Vec3::ZERO],
                color: [1.0; 3],
            }],
            0.5,
        );
        assert!(pick_ray(&ray_down_z(0.0, 0.0), &scene, 0.01).is_none());
    }

    #[test]
    fn test_pick_through_camera() {
        let positions = vec![
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ];
        let scene = scene_with(Geometry::triangles(positions, vec![], vec![0, 1, 2, 0, 2, 3]));
        let mut camera = CameraController::default();
        camera.apply_preset(ViewPreset::Front);
        camera.fit_to_bounds(&scene.asset().unwrap().bounds);
        let hit = pick(Vec2::ZERO, &camera, &scene, 1.0, 0.05).unwrap();
        assert!(hit.point.length() < 1e-3);
        assert!(pick(Vec2::new(0.99, 0.99), &camera, &scene, 1.0, 0.05).is_none());
    }
}
