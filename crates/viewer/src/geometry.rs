//! Stateless geometry helpers: bounds, measurement math, and
//! world <-> screen coordinate transforms.

use std::collections::HashSet;

use glam::{DVec3, Mat4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Inverted box that any point will extend
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }

    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.extend(p);
        }
        aabb
    }

    pub fn extend(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// False for the empty box
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// Center of the bounding box
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn max_dimension(&self) -> f32 {
        self.size().max_element()
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Grow uniformly by `margin` on every side
    pub fn inflate(&self, margin: f32) -> Aabb {
        Aabb {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }
}

impl From<shared::BoundingBox> for Aabb {
    fn from(b: shared::BoundingBox) -> Self {
        Aabb {
            min: Vec3::new(b.min[0] as f32, b.min[1] as f32, b.min[2] as f32),
            max: Vec3::new(b.max[0] as f32, b.max[1] as f32, b.max[2] as f32),
        }
    }
}

// ── Measurement math ─────────────────────────────────────────

pub fn distance(a: Vec3, b: Vec3) -> f32 {
    (b - a).length()
}

/// Angle at `vertex` between the arms to `a` and `c`, in degrees [0, 180].
/// `None` when either arm has zero length.
pub fn angle_degrees(a: Vec3, vertex: Vec3, c: Vec3) -> Option<f32> {
    let u = (a - vertex).as_dvec3();
    let v = (c - vertex).as_dvec3();
    let lu = u.length();
    let lv = v.length();
    if lu < 1e-12 || lv < 1e-12 {
        return None;
    }
    let cos = (u.dot(v) / (lu * lv)).clamp(-1.0, 1.0);
    Some(cos.acos().to_degrees() as f32)
}

/// Newell normal of a closed polygon (unnormalized, length = 2 x area)
pub fn newell_normal(points: &[Vec3]) -> DVec3 {
    if points.len() < 3 {
        return DVec3::ZERO;
    }
    let origin = points[0].as_dvec3();
    let mut n = DVec3::ZERO;
    for i in 0..points.len() {
        let p = points[i].as_dvec3() - origin;
        let q = points[(i + 1) % points.len()].as_dvec3() - origin;
        n += p.cross(q);
    }
    n
}

/// Area of the ordered polygon projected onto its best-fit (Newell) plane
pub fn polygon_area(points: &[Vec3]) -> f32 {
    (newell_normal(points).length() * 0.5) as f32
}

/// Volume enclosed by the convex hull of `points`.
/// `None` for fewer than four points or a coplanar/colinear set.
pub fn convex_hull_volume(points: &[Vec3]) -> Option<f32> {
    let pts: Vec<DVec3> = points.iter().map(|p| p.as_dvec3()).collect();
    let hull = ConvexHull::build(&pts)?;
    Some(hull.volume(&pts) as f32)
}

/// Incremental 3D convex hull over a small point set.
/// Faces are index triples with outward-facing counter-clockwise winding.
struct ConvexHull {
    faces: Vec<[usize; 3]>,
    interior: DVec3,
}

impl ConvexHull {
    fn build(pts: &[DVec3]) -> Option<Self> {
        if pts.len() < 4 {
            return None;
        }

        let scale = pts
            .iter()
            .fold(0.0_f64, |acc, p| acc.max((*p - pts[0]).length()));
        let eps = (scale * 1e-9).max(1e-12);

        // Initial tetrahedron from extreme points
        let i0 = 0;
        let i1 = farthest_by(pts, |p| (*p - pts[i0]).length())?;
        if (pts[i1] - pts[i0]).length() <= eps {
            return None;
        }
        let dir = (pts[i1] - pts[i0]).normalize();
        let i2 = farthest_by(pts, |p| (*p - pts[i0]).cross(dir).length())?;
        if (pts[i2] - pts[i0]).cross(dir).length() <= eps {
            return None;
        }
        let plane_n = (pts[i1] - pts[i0]).cross(pts[i2] - pts[i0]).normalize();
        let i3 = farthest_by(pts, |p| (*p - pts[i0]).dot(plane_n).abs())?;
        if (pts[i3] - pts[i0]).dot(plane_n).abs() <= eps {
            return None;
        }

        let interior = (pts[i0] + pts[i1] + pts[i2] + pts[i3]) * 0.25;
        let mut faces = Vec::with_capacity(8);
        for f in [[i0, i1, i2], [i0, i1, i3], [i0, i2, i3], [i1, i2, i3]] {
            faces.push(orient_outward(pts, f, interior));
        }

        let seed = [i0, i1, i2, i3];
        for (idx, p) in pts.iter().enumerate() {
            if seed.contains(&idx) {
                continue;
            }

            let visible: Vec<usize> = faces
                .iter()
                .enumerate()
                .filter(|(_, f)| face_normal(pts, f).dot(*p - pts[f[0]]) > eps)
                .map(|(i, _)| i)
                .collect();
            if visible.is_empty() {
                continue;
            }

            let mut visible_edges: HashSet<(usize, usize)> = HashSet::new();
            for &fi in &visible {
                let f = faces[fi];
                visible_edges.insert((f[0], f[1]));
                visible_edges.insert((f[1], f[2]));
                visible_edges.insert((f[2], f[0]));
            }
            let horizon: Vec<(usize, usize)> = visible_edges
                .iter()
                .filter(|(a, b)| !visible_edges.contains(&(*b, *a)))
                .copied()
                .collect();

            let mut keep = Vec::with_capacity(faces.len());
            for (i, f) in faces.iter().enumerate() {
                if !visible.contains(&i) {
                    keep.push(*f);
                }
            }
            for (a, b) in horizon {
                keep.push([a, b, idx]);
            }
            faces = keep;
        }

        Some(Self { faces, interior })
    }

    fn volume(&self, pts: &[DVec3]) -> f64 {
        let c = self.interior;
        let signed: f64 = self
            .faces
            .iter()
            .map(|f| {
                let a = pts[f[0]] - c;
                let b = pts[f[1]] - c;
                let d = pts[f[2]] - c;
                a.dot(b.cross(d)) / 6.0
            })
            .sum();
        signed.abs()
    }
}

fn farthest_by<F: Fn(&DVec3) -> f64>(pts: &[DVec3], metric: F) -> Option<usize> {
    pts.iter()
        .enumerate()
        .map(|(i, p)| (i, metric(p)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

fn face_normal(pts: &[DVec3], f: &[usize; 3]) -> DVec3 {
    (pts[f[1]] - pts[f[0]]).cross(pts[f[2]] - pts[f[0]])
}

fn orient_outward(pts: &[DVec3], f: [usize; 3], interior: DVec3) -> [usize; 3] {
    if face_normal(pts, &f).dot(interior - pts[f[0]]) > 0.0 {
        [f[0], f[2], f[1]]
    } else {
        f
    }
}

// ── Coordinate transforms ────────────────────────────────────

/// Project a world point to normalized device coordinates.
/// `None` when the point is behind the camera.
pub fn world_to_ndc(view_proj: &Mat4, point: Vec3) -> Option<Vec3> {
    let p = *view_proj * Vec4::new(point.x, point.y, point.z, 1.0);
    if p.w <= 0.0 {
        return None;
    }
    Some(p.truncate() / p.w)
}

/// Unproject an NDC point (z in [-1, 1]) back to world space
pub fn ndc_to_world(inv_view_proj: &Mat4, ndc: Vec3) -> Vec3 {
    let p = *inv_view_proj * Vec4::new(ndc.x, ndc.y, ndc.z, 1.0);
    p.truncate() / p.w
}

/// Pixel position inside a rect (origin top-left) to NDC (y up)
pub fn screen_to_ndc(pos: Vec2, rect_min: Vec2, rect_size: Vec2) -> Vec2 {
    let local = pos - rect_min;
    Vec2::new(
        local.x / rect_size.x * 2.0 - 1.0,
        1.0 - local.y / rect_size.y * 2.0,
    )
}

/// Inverse of [`screen_to_ndc`]
pub fn ndc_to_screen(ndc: Vec2, rect_min: Vec2, rect_size: Vec2) -> Vec2 {
    Vec2::new(
        rect_min.x + (ndc.x + 1.0) * 0.5 * rect_size.x,
        rect_min.y + (1.0 - ndc.y) * 0.5 * rect_size.y,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_distance_3_4_5() {
        assert!(approx(distance(Vec3::ZERO, Vec3::new(3.0, 4.0, 0.0)), 5.0, 1e-6));
    }

    #[test]
    fn test_right_angle() {
        let a = angle_degrees(Vec3::X, Vec3::ZERO, Vec3::Y).unwrap();
        assert!(approx(a, 90.0, 1e-4));
    }

    #[test]
    fn test_straight_and_zero_angle() {
        let straight = angle_degrees(Vec3::X, Vec3::ZERO, -Vec3::X).unwrap();
        assert!(approx(straight, 180.0, 1e-3));
        let zero = angle_degrees(Vec3::X, Vec3::ZERO, Vec3::X * 2.0).unwrap();
        assert!(approx(zero, 0.0, 1e-3));
    }

    #[test]
    fn test_degenerate_angle_arm() {
        assert!(angle_degrees(Vec3::ZERO, Vec3::ZERO, Vec3::Y).is_none());
    }

    #[test]
    fn test_unit_square_area() {
        let square = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        assert!(approx(polygon_area(&square), 1.0, 1e-6));
    }

    #[test]
    fn test_tilted_triangle_area() {
        // Right triangle with legs 2 and 2 lying in the plane x = z
        let tri = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0_f32.sqrt(), 0.0, 2.0_f32.sqrt()),
            Vec3::new(0.0, 2.0, 0.0),
        ];
        assert!(approx(polygon_area(&tri), 2.0, 1e-5));
    }

    #[test]
    fn test_area_independent_of_winding() {
        let mut square = vec![
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::new(2.0, 0.0, 5.0),
            Vec3::new(2.0, 3.0, 5.0),
            Vec3::new(0.0, 3.0, 5.0),
        ];
        let a = polygon_area(&square);
        square.reverse();
        assert!(approx(a, polygon_area(&square), 1e-6));
        assert!(approx(a, 6.0, 1e-5));
    }

    #[test]
    fn test_unit_cube_hull_volume() {
        let mut pts = Vec::new();
        for x in [0.0, 1.0] {
            for y in [0.0, 1.0] {
                for z in [0.0, 1.0] {
                    pts.push(Vec3::new(x, y, z));
                }
            }
        }
        // Interior point must not change the hull
        pts.push(Vec3::splat(0.5));
        let v = convex_hull_volume(&pts).unwrap();
        assert!(approx(v, 1.0, 1e-5), "volume = {v}");
    }

    #[test]
    fn test_tetrahedron_volume() {
        let pts = [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z];
        let v = convex_hull_volume(&pts).unwrap();
        assert!(approx(v, 1.0 / 6.0, 1e-6));
    }

    #[test]
    fn test_coplanar_hull_is_none() {
        let pts = [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::new(1.0, 1.0, 0.0)];
        assert!(convex_hull_volume(&pts).is_none());
        assert!(convex_hull_volume(&pts[..3]).is_none());
    }

    #[test]
    fn test_aabb_from_points() {
        let aabb = Aabb::from_points([Vec3::new(-1.0, 2.0, 0.0), Vec3::new(3.0, -2.0, 1.0)]);
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(3.0, 2.0, 1.0));
        assert_eq!(aabb.center(), Vec3::new(1.0, 0.0, 0.5));
        assert_eq!(aabb.max_dimension(), 4.0);
        assert!(aabb.contains(Vec3::new(0.0, 0.0, 0.5)));
        assert!(!Aabb::empty().is_valid());
    }

    #[test]
    fn test_screen_ndc_roundtrip_corners() {
        let min = Vec2::new(10.0, 20.0);
        let size = Vec2::new(200.0, 100.0);
        assert_eq!(screen_to_ndc(min, min, size), Vec2::new(-1.0, 1.0));
        assert_eq!(screen_to_ndc(min + size, min, size), Vec2::new(1.0, -1.0));
        let center = screen_to_ndc(Vec2::new(110.0, 70.0), min, size);
        assert_eq!(center, Vec2::ZERO);
        assert_eq!(ndc_to_screen(Vec2::ZERO, min, size), Vec2::new(110.0, 70.0));
    }

    #[test]
    fn test_world_ndc_behind_camera() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh_gl(45.0_f32.to_radians(), 1.0, 0.1, 100.0);
        let vp = proj * view;
        let front = world_to_ndc(&vp, Vec3::ZERO).unwrap();
        assert!(front.x.abs() < 1e-6 && front.y.abs() < 1e-6);
        assert!(world_to_ndc(&vp, Vec3::new(0.0, 0.0, 10.0)).is_none());

        let back = ndc_to_world(&vp.inverse(), front);
        assert!(back.length() < 1e-4);
    }
}
