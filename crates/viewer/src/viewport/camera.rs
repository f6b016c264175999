use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use glam::{Mat4, Vec2, Vec3};
use serde::Serialize;

use super::picking::Ray;
use crate::geometry::{self, Aabb};

/// Snapshot of the camera as seen by the renderer and exports
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraState {
    pub position: Vec3,
    pub target: Vec3,
    /// Vertical field of view (radians)
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub move_speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraLimits {
    pub min_distance: f32,
    pub max_distance: f32,
    /// Absolute pitch bound (radians); keeps the view off the poles
    pub pitch_limit: f32,
}

impl Default for CameraLimits {
    fn default() -> Self {
        Self {
            min_distance: 0.5,
            max_distance: 200.0,
            pitch_limit: 1.5,
        }
    }
}

/// Fixed viewing directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewPreset {
    Front,
    Back,
    Left,
    Right,
    Top,
    Bottom,
    Isometric,
}

impl ViewPreset {
    pub fn all() -> &'static [ViewPreset] {
        &[
            Self::Front,
            Self::Back,
            Self::Left,
            Self::Right,
            Self::Top,
            Self::Bottom,
            Self::Isometric,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Front => "Front",
            Self::Back => "Back",
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Top => "Top",
            Self::Bottom => "Bottom",
            Self::Isometric => "Iso",
        }
    }

    /// (yaw, pitch) in radians; poles are clamped by the controller
    fn angles(&self) -> (f32, f32) {
        match self {
            Self::Front => (0.0, 0.0),
            Self::Back => (PI, 0.0),
            Self::Left => (-FRAC_PI_2, 0.0),
            Self::Right => (FRAC_PI_2, 0.0),
            Self::Top => (0.0, FRAC_PI_2),
            Self::Bottom => (0.0, -FRAC_PI_2),
            Self::Isometric => (FRAC_PI_4, (1.0_f32 / 2.0_f32.sqrt()).atan()),
        }
    }

    fn fov(&self) -> f32 {
        match self {
            Self::Isometric => 35.0_f32.to_radians(),
            _ => 45.0_f32.to_radians(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct View {
    yaw: f32,
    pitch: f32,
    distance: f32,
    target: Vec3,
    fov: f32,
    near: f32,
    far: f32,
}

impl Default for View {
    fn default() -> Self {
        Self {
            yaw: 0.6,
            pitch: 0.4,
            distance: 6.0,
            target: Vec3::ZERO,
            fov: 45.0_f32.to_radians(),
            near: 0.1,
            far: 200.0,
        }
    }
}

/// Orbit camera around a target point
#[derive(Debug, Clone)]
pub struct CameraController {
    view: View,
    home: View,
    /// Largest dimension of the framed content, used to keep clip planes valid
    extent: f32,
    move_speed: f32,
    limits: CameraLimits,
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new(CameraLimits::default())
    }
}

impl CameraController {
    pub fn new(limits: CameraLimits) -> Self {
        Self {
            view: View::default(),
            home: View::default(),
            extent: 0.0,
            move_speed: 1.0,
            limits,
        }
    }

    pub fn limits(&self) -> CameraLimits {
        self.limits
    }

    pub fn set_limits(&mut self, limits: CameraLimits) {
        self.limits = limits;
        self.view.distance = self.clamp_distance(self.view.distance);
        self.view.pitch = self.clamp_pitch(self.view.pitch);
    }

    pub fn set_move_speed(&mut self, speed: f32) {
        if speed.is_finite() && speed > 0.0 {
            self.move_speed = speed;
        }
    }

    pub fn yaw(&self) -> f32 {
        self.view.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.view.pitch
    }

    pub fn distance(&self) -> f32 {
        self.view.distance
    }

    pub fn target(&self) -> Vec3 {
        self.view.target
    }

    pub fn state(&self) -> CameraState {
        CameraState {
            position: self.eye_position(),
            target: self.view.target,
            fov: self.view.fov,
            near: self.view.near,
            far: self.view.far,
            move_speed: self.move_speed,
        }
    }

    /// Rotate around the target (radians)
    pub fn orbit(&mut self, d_yaw: f32, d_pitch: f32) {
        self.view.yaw = (self.view.yaw + d_yaw).rem_euclid(2.0 * PI);
        self.view.pitch = self.clamp_pitch(self.view.pitch + d_pitch);
    }

    /// Translate target and eye in the view plane. `dx`/`dy` are fractions of
    /// the view height; the world offset grows with distance.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        let scale = self.view.distance * self.move_speed;
        let offset = self.right_vector() * dx * scale + self.up_vector() * dy * scale;
        self.view.target += offset;
    }

    /// Move toward (`delta > 0`) or away from the target
    pub fn dolly(&mut self, delta: f32) {
        self.view.distance = self.clamp_distance(self.view.distance * (1.0 - delta));
        self.update_clip_planes();
    }

    pub fn apply_preset(&mut self, preset: ViewPreset) {
        let (yaw, pitch) = preset.angles();
        self.view.yaw = yaw;
        self.view.pitch = self.clamp_pitch(pitch);
        self.view.fov = preset.fov();
    }

    /// Center on `bounds` and back off to twice its largest dimension.
    /// The result becomes the home view for [`reset`](Self::reset).
    pub fn fit_to_bounds(&mut self, bounds: &Aabb) {
        if !bounds.is_valid() {
            return;
        }
        self.extent = bounds.max_dimension();
        self.view.target = bounds.center();
        self.view.distance = self.clamp_distance(2.0 * self.extent);
        self.update_clip_planes();
        self.home = self.view;
    }

    pub fn reset(&mut self) {
        self.view = self.home;
    }

    /// Override the clip planes. Rejected unless `0 < near < far`.
    pub fn set_clip_planes(&mut self, near: f32, far: f32) -> bool {
        if !(near > 0.0 && near < far && far.is_finite()) {
            return false;
        }
        self.view.near = near;
        self.view.far = far;
        true
    }

    fn update_clip_planes(&mut self) {
        let d = self.view.distance;
        self.view.near = (d / 100.0).max(1e-3);
        self.view.far = d * 10.0 + self.extent.max(1.0);
    }

    fn clamp_distance(&self, d: f32) -> f32 {
        d.clamp(self.limits.min_distance, self.limits.max_distance)
    }

    fn clamp_pitch(&self, p: f32) -> f32 {
        p.clamp(-self.limits.pitch_limit, self.limits.pitch_limit)
    }

    /// Camera position in world space
    pub fn eye_position(&self) -> Vec3 {
        let View {
            yaw,
            pitch,
            distance,
            target,
            ..
        } = self.view;
        let (sy, cy) = yaw.sin_cos();
        let (sp, cp) = pitch.sin_cos();
        target + Vec3::new(distance * cp * sy, distance * sp, distance * cp * cy)
    }

    /// View matrix (world -> camera)
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye_position(), self.view.target, Vec3::Y)
    }

    /// Projection matrix (camera -> clip)
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh_gl(self.view.fov, aspect, self.view.near, self.view.far)
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    /// NDC of a world point, `None` behind the camera
    pub fn project_ndc(&self, point: Vec3, aspect: f32) -> Option<Vec3> {
        geometry::world_to_ndc(&self.view_projection(aspect), point)
    }

    /// Ray from the eye through an NDC position (y up)
    pub fn screen_ray(&self, ndc: Vec2, aspect: f32) -> Ray {
        let inv = self.view_projection(aspect).inverse();
        let near = geometry::ndc_to_world(&inv, ndc.extend(-1.0));
        let far = geometry::ndc_to_world(&inv, ndc.extend(1.0));
        Ray {
            origin: self.eye_position(),
            direction: (far - near).normalize_or_zero(),
        }
    }

    fn forward(&self) -> Vec3 {
        (self.view.target - self.eye_position()).normalize_or_zero()
    }

    fn right_vector(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalize_or_zero()
    }

    fn up_vector(&self) -> Vec3 {
        self.right_vector().cross(self.forward()).normalize_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_fit_to_bounds() {
        let mut cam = CameraController::default();
        cam.orbit(0.3, 0.2);
        let bounds = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        cam.fit_to_bounds(&bounds);
        assert_eq!(cam.target(), Vec3::ZERO);
        assert!(approx(cam.distance(), 4.0));
        assert!(approx(cam.eye_position().length(), 4.0));
        let s = cam.state();
        assert!(s.near < s.far);
        assert!(approx(s.near, 0.04));
        assert!(approx(s.far, 42.0));
    }

    #[test]
    fn test_dolly_clamped() {
        let mut cam = CameraController::default();
        cam.dolly(0.99999);
        assert!(approx(cam.distance(), 0.5));
        for _ in 0..100 {
            cam.dolly(-1.0);
        }
        assert!(approx(cam.distance(), 200.0));
        assert!(cam.state().near < cam.state().far);
    }

    #[test]
    fn test_pitch_clamped() {
        let mut cam = CameraController::default();
        cam.orbit(0.0, 10.0);
        assert!(approx(cam.pitch(), 1.5));
        cam.orbit(0.0, -10.0);
        assert!(approx(cam.pitch(), -1.5));
    }

    #[test]
    fn test_orbit_keeps_distance() {
        let mut cam = CameraController::default();
        let d = cam.eye_position().distance(cam.target());
        cam.orbit(1.0, 0.3);
        assert!(approx(cam.eye_position().distance(cam.target()), d));
    }

    #[test]
    fn test_pan_moves_target_in_view_plane() {
        let mut cam = CameraController::default();
        cam.apply_preset(ViewPreset::Front);
        cam.pan(0.5, 0.0);
        let t = cam.target();
        assert!(t.x > 0.0);
        assert!(approx(t.y, 0.0));
        assert!(approx(t.z, 0.0));
        // Pan scales with distance
        assert!(approx(t.x, 0.5 * 6.0));
    }

    #[test]
    fn test_presets() {
        let mut cam = CameraController::default();
        cam.apply_preset(ViewPreset::Front);
        let eye = cam.eye_position();
        assert!(approx(eye.x, 0.0) && eye.z > 0.0);

        cam.apply_preset(ViewPreset::Right);
        assert!(cam.eye_position().x > 5.9);

        cam.apply_preset(ViewPreset::Top);
        assert!(approx(cam.pitch(), 1.5));
        assert!(cam.eye_position().y > 5.0);

        cam.apply_preset(ViewPreset::Isometric);
        let e = cam.eye_position();
        assert!(approx(e.x, e.z));
        assert!(approx(e.y, e.x));
    }

    #[test]
    fn test_reset_restores_fit() {
        let mut cam = CameraController::default();
        let bounds = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
        cam.fit_to_bounds(&bounds);
        let fitted = cam.state();
        cam.orbit(1.0, 0.5);
        cam.pan(0.3, 0.3);
        cam.dolly(0.5);
        cam.reset();
        assert_eq!(cam.state(), fitted);
    }

    #[test]
    fn test_reject_invalid_clip_planes() {
        let mut cam = CameraController::default();
        assert!(!cam.set_clip_planes(5.0, 1.0));
        assert!(!cam.set_clip_planes(0.0, 1.0));
        assert!(cam.set_clip_planes(0.5, 10.0));
        assert_eq!(cam.state().near, 0.5);
    }

    #[test]
    fn test_screen_ray_center_hits_target() {
        let mut cam = CameraController::default();
        cam.fit_to_bounds(&Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)));
        let ray = cam.screen_ray(Vec2::ZERO, 1.5);
        let to_target = (cam.target() - ray.origin).normalize();
        assert!(ray.direction.dot(to_target) > 0.9999);
    }

    #[test]
    fn test_project_center() {
        let cam = CameraController::default();
        let ndc = cam.project_ndc(cam.target(), 1.0).unwrap();
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        // Behind the eye
        let behind = cam.eye_position() * 2.0;
        assert!(cam.project_ndc(behind, 1.0).is_none());
    }
}
