//! Integration tests for the measurement and annotation tools driven
//! through the engine, plus camera framing.

use glam::{Vec2, Vec3};
use recon_viewer_lib::engine::ClickOutcome;
use recon_viewer_lib::fixtures;
use recon_viewer_lib::geometry::Aabb;
use recon_viewer_lib::harness::TestHarness;
use recon_viewer_lib::state::{ActiveTool, MeasurementKind, Units};
use recon_viewer_lib::viewport::camera::{CameraController, ViewPreset};
use recon_viewer_lib::viewport::input::PointerButton;
use uuid::Uuid;

fn measuring(kind: MeasurementKind) -> TestHarness {
    let mut h = TestHarness::new().unwrap();
    h.set_tool(ActiveTool::Measure(kind));
    h
}

#[test]
fn test_distance_three_four_five() {
    let mut h = measuring(MeasurementKind::Distance);
    let e = h.engine_mut();
    assert_eq!(e.apply_pick_point(Vec3::ZERO), ClickOutcome::PointAdded { collected: 1 });
    let created = e.apply_pick_point(Vec3::new(3.0, 4.0, 0.0));
    let ClickOutcome::MeasurementCreated { id } = created else {
        panic!("expected a measurement, got {created:?}");
    };
    let m = &e.measurements().measurements()[0];
    assert_eq!(m.id, id);
    assert!((m.value - 5.0).abs() < 1e-9);
    assert_eq!(m.label, "5.00 mm");
    assert!(e.measurements().pending_points().is_empty());
}

#[test]
fn test_angle_right_angle() {
    let mut h = measuring(MeasurementKind::Angle);
    let e = h.engine_mut();
    e.apply_pick_point(Vec3::X);
    e.apply_pick_point(Vec3::ZERO);
    assert!(matches!(e.apply_pick_point(Vec3::Y), ClickOutcome::MeasurementCreated { .. }));
    let m = &e.measurements().measurements()[0];
    assert!((m.value - 90.0).abs() < 1e-4);
    assert!(m.label.ends_with('°'));
}

#[test]
fn test_degenerate_angle_discarded() {
    let mut h = measuring(MeasurementKind::Angle);
    let e = h.engine_mut();
    e.apply_pick_point(Vec3::ZERO);
    e.apply_pick_point(Vec3::ZERO);
    assert_eq!(e.apply_pick_point(Vec3::X), ClickOutcome::PointAdded { collected: 0 });
    assert!(e.measurements().measurements().is_empty());
}

#[test]
fn test_area_needs_finish() {
    let mut h = measuring(MeasurementKind::Area);
    let e = h.engine_mut();
    for p in [Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0), Vec3::new(2.0, 3.0, 0.0)] {
        assert!(matches!(e.apply_pick_point(p), ClickOutcome::PointAdded { .. }));
    }
    e.apply_pick_point(Vec3::new(0.0, 3.0, 0.0));
    assert!(e.measurements().measurements().is_empty());

    assert!(e.finish_measurement().is_some());
    let m = &e.measurements().measurements()[0];
    assert!((m.value - 6.0).abs() < 1e-6);
    assert!(m.unit.contains('²'));
}

#[test]
fn test_volume_coplanar_keeps_collecting() {
    let mut h = measuring(MeasurementKind::Volume);
    let e = h.engine_mut();
    for p in [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::new(1.0, 1.0, 0.0)] {
        e.apply_pick_point(p);
    }
    assert!(e.finish_measurement().is_none());
    assert_eq!(e.measurements().pending_points().len(), 4);

    e.apply_pick_point(Vec3::Z);
    assert!(e.finish_measurement().is_some());
    // Hull of the unit square base and apex at (0,0,1)
    let m = &e.measurements().measurements()[0];
    assert!((m.value - 1.0 / 3.0).abs() < 1e-5);
}

#[test]
fn test_undo_and_cancel() {
    let mut h = measuring(MeasurementKind::Area);
    let e = h.engine_mut();
    e.apply_pick_point(Vec3::ZERO);
    e.apply_pick_point(Vec3::X);
    assert!(e.undo_point());
    assert_eq!(e.measurements().pending_points().len(), 1);
    e.cancel_measurement();
    assert!(e.measurements().pending_points().is_empty());
    assert!(!e.undo_point());
}

#[test]
fn test_switch_to_annotation_routes_pick_there() {
    let mut h = measuring(MeasurementKind::Distance);
    h.engine_mut().apply_pick_point(Vec3::ZERO);
    h.set_tool(ActiveTool::Annotate);

    let outcome = h.engine_mut().apply_pick_point(Vec3::new(1.0, 2.0, 3.0));
    assert!(matches!(outcome, ClickOutcome::AnnotationPlaced { .. }));
    let e = h.engine();
    assert!(e.measurements().measurements().is_empty());
    assert!(e.measurements().pending_points().is_empty());
    assert_eq!(e.annotations().annotations().len(), 1);
    assert_eq!(e.annotations().annotations()[0].position, Vec3::new(1.0, 2.0, 3.0));
}

#[test]
fn test_camera_tool_ignores_clicks() {
    let mut h = TestHarness::new().unwrap();
    h.load_bytes("cube.ply", fixtures::PLY_ASCII_CUBE).unwrap();
    let outcome = h.click_world(Vec3::new(0.0, 0.0, 2.5));
    assert_eq!(outcome, ClickOutcome::Ignored);
    assert!(h.engine().annotations().annotations().is_empty());
}

#[test]
fn test_click_on_empty_space_misses() {
    let mut h = TestHarness::new().unwrap();
    h.load_bytes("cube.ply", fixtures::PLY_ASCII_CUBE).unwrap();
    h.set_tool(ActiveTool::Annotate);
    assert_eq!(h.click_screen(Vec2::new(2.0, 2.0)), ClickOutcome::Missed);
}

#[test]
fn test_delete_unknown_annotation_is_noop() {
    let mut h = TestHarness::new().unwrap();
    h.set_tool(ActiveTool::Annotate);
    h.engine_mut().apply_pick_point(Vec3::ZERO);
    let before = h.engine().annotations().annotations().to_vec();

    assert!(!h.engine_mut().delete_annotation(Uuid::new_v4()));
    assert!(!h.engine_mut().set_annotation_text(Uuid::new_v4(), "x"));
    assert_eq!(h.engine().annotations().annotations(), before.as_slice());
}

#[test]
fn test_annotation_edit_and_visibility() {
    let mut h = TestHarness::new().unwrap();
    h.set_tool(ActiveTool::Annotate);
    let ClickOutcome::AnnotationPlaced { id } = h.engine_mut().apply_pick_point(Vec3::ONE) else {
        panic!("annotation not placed");
    };
    let e = h.engine_mut();
    assert!(e.set_annotation_text(id, "crack"));
    assert!(e.toggle_annotation(id));
    let a = &e.annotations().annotations()[0];
    assert_eq!(a.text, "crack");
    assert!(!a.visible);
    assert!(e.delete_annotation(id));
    assert!(e.annotations().annotations().is_empty());
}

#[test]
fn test_units_and_normalization_scale() {
    let mut h = TestHarness::new().unwrap();
    // OBJ cube is 2 units wide, shown 5 wide
    h.load_bytes("cube.obj", fixtures::OBJ_CUBE).unwrap();
    h.set_tool(ActiveTool::Measure(MeasurementKind::Distance));
    let e = h.engine_mut();
    e.apply_pick_point(Vec3::new(-2.5, 0.0, 0.0));
    e.apply_pick_point(Vec3::new(2.5, 0.0, 0.0));
    let m = &e.measurements().measurements()[0];
    assert!((m.world_value - 5.0).abs() < 1e-5);
    // Reported in original model units
    assert!((m.value - 2.0).abs() < 1e-5);

    e.set_units(Units::Centimeters);
    assert_eq!(e.measurements().measurements()[0].unit, "cm");
}

#[test]
fn test_fit_unit_cube() {
    let mut camera = CameraController::default();
    camera.fit_to_bounds(&Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)));
    assert!(camera.target().length() < 1e-6);
    assert!((camera.distance() - 4.0).abs() < 1e-5);
}

#[test]
fn test_loaded_asset_framed_and_reset() {
    let mut h = TestHarness::new().unwrap();
    h.load_bytes("cube.ply", fixtures::PLY_ASCII_CUBE).unwrap();
    assert!((h.engine().camera().distance() - 10.0).abs() < 1e-3);

    h.drag(PointerButton::Secondary, Vec2::new(600.0, 400.0), Vec2::new(650.0, 420.0));
    h.scroll(120.0);
    assert!(h.engine().camera().target().length() > 1e-3);

    h.engine_mut().reset_camera();
    assert!(h.engine().camera().target().length() < 1e-4);
    assert!((h.engine().camera().distance() - 10.0).abs() < 1e-3);

    h.engine_mut().apply_preset(ViewPreset::Top);
    let eye = h.engine().camera().eye_position();
    assert!(eye.y > 9.0, "top view eye {eye:?}");
}
