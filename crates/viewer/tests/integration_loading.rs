//! Integration tests for asset loading through the engine.
//!
//! Every format goes bytes -> fetch -> decode -> normalize -> scene, and the
//! result must be centered at the origin with its largest side equal to the
//! reference size.

use std::time::Duration;

use glam::Vec3;
use recon_viewer_lib::asset::FormatTag;
use recon_viewer_lib::engine::{SceneEngine, ViewerStatus};
use recon_viewer_lib::error::LoadError;
use recon_viewer_lib::fixtures::{self, GatedSource, MemorySource, ScriptedBackend};
use recon_viewer_lib::harness::{test_settings, TestHarness};

const REFERENCE_SIZE: f32 = 5.0;

fn assert_normalized(h: &TestHarness) {
    let asset = h.engine().asset().expect("asset loaded");
    let b = asset.bounds;
    assert!(b.center().length() < 1e-4, "center {:?}", b.center());
    assert!(
        (b.max_dimension() - REFERENCE_SIZE).abs() < 1e-4,
        "max dimension {}",
        b.max_dimension()
    );
    assert_eq!(h.engine().status(), &ViewerStatus::Ready);
}

#[test]
fn test_ascii_ply_points_normalized() {
    let mut h = TestHarness::new().unwrap();
    h.load_bytes("points.ply", fixtures::PLY_ASCII_POINTS).unwrap();
    assert_normalized(&h);
    let asset = h.engine().asset().unwrap();
    assert_eq!(asset.tag, FormatTag::PointCloud);
    assert_eq!(asset.vertex_count(), 4);
    // 4 units wide before normalization
    assert!((asset.scale - REFERENCE_SIZE / 4.0).abs() < 1e-5);
}

#[test]
fn test_ply_mesh_normalized() {
    let mut h = TestHarness::new().unwrap();
    h.load_bytes("cube.ply", fixtures::PLY_ASCII_CUBE).unwrap();
    assert_normalized(&h);
    let asset = h.engine().asset().unwrap();
    assert_eq!(asset.tag, FormatTag::Mesh);
    assert_eq!(asset.face_count(), 12);
}

#[test]
fn test_binary_splats_normalized() {
    let mut h = TestHarness::new().unwrap();
    let bytes = fixtures::ply_binary_splats(&[[0.0, 0.0, 0.0], [10.0, 2.0, 0.0], [3.0, 1.0, 4.0]]);
    h.load_bytes("splats.ply", bytes).unwrap();
    assert_normalized(&h);
    assert_eq!(h.engine().asset().unwrap().vertex_count(), 3);
}

#[test]
fn test_obj_normalized() {
    let mut h = TestHarness::new().unwrap();
    h.load_bytes("cube.obj", fixtures::OBJ_CUBE).unwrap();
    assert_normalized(&h);
    let asset = h.engine().asset().unwrap();
    // [0, 2] before normalization
    assert!((asset.original_bounds.min - Vec3::ZERO).length() < 1e-5);
    assert!((asset.original_bounds.max - Vec3::splat(2.0)).length() < 1e-5);
}

#[test]
fn test_gltf_with_external_buffer_normalized() {
    let mut h = TestHarness::new().unwrap();
    h.source().insert("mem://scenes/tri.bin", fixtures::triangle_buffer());
    h.load_bytes("scenes/tri.gltf", fixtures::triangle_gltf("tri.bin")).unwrap();
    assert_normalized(&h);
    let asset = h.engine().asset().unwrap();
    assert_eq!(asset.tag, FormatTag::SceneGraph);
    assert_eq!(asset.face_count(), 1);
    // Document plus its buffer
    assert_eq!(h.source().fetch_count(), 2);
}

#[test]
fn test_glb_normalized() {
    let mut h = TestHarness::new().unwrap();
    h.load_bytes("tri.glb", fixtures::triangle_glb()).unwrap();
    assert_normalized(&h);
    assert_eq!(h.engine().asset().unwrap().face_count(), 1);
}

#[test]
fn test_unsupported_extension_never_fetches() {
    let mut h = TestHarness::new().unwrap();
    h.source().insert("mem://model.stl", b"solid".to_vec());
    let err = h.load_url("mem://model.stl").unwrap_err();
    assert!(matches!(err, LoadError::UnsupportedFormat(_)));
    assert_eq!(h.source().fetch_count(), 0);
    assert!(matches!(h.engine().status(), ViewerStatus::LoadFailed(_)));
    assert!(h.engine().asset().is_none());
}

#[test]
fn test_missing_file_is_network_failure() {
    let mut h = TestHarness::new().unwrap();
    let err = h.load_url("mem://nothing.ply").unwrap_err();
    assert!(matches!(err, LoadError::NetworkFailure(_)));
    assert!(h.engine().status().is_error());
}

#[test]
fn test_malformed_keeps_previous_asset() {
    let mut h = TestHarness::new().unwrap();
    h.load_bytes("cube.ply", fixtures::PLY_ASCII_CUBE).unwrap();
    let err = h.load_bytes("broken.ply", "ply\nformat ascii 1.0\nelement vertex 3\nend_header\n1 2\n");
    assert!(matches!(err, Err(LoadError::MalformedAsset(_))));
    // The failed load does not replace what is shown
    assert_eq!(h.engine().asset().unwrap().source_url, "mem://cube.ply");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_superseded_load_never_wins() {
    let memory = MemorySource::new()
        .with("mem://slow.ply", fixtures::PLY_ASCII_POINTS)
        .with("mem://fast.obj", fixtures::OBJ_CUBE);
    let source = GatedSource::new(memory);
    source.gate("mem://slow.ply");

    let mut engine = SceneEngine::new(
        source.clone(),
        ScriptedBackend::default(),
        test_settings(),
        tokio::runtime::Handle::current(),
    );
    engine.load_model("mem://slow.ply", None, None).unwrap();
    engine.load_model("mem://fast.obj", None, None).unwrap();

    engine.wait_for_load().await.unwrap().unwrap();
    assert_eq!(engine.asset().unwrap().source_url, "mem://fast.obj");

    // Releasing the first fetch late changes nothing
    source.release("mem://slow.ply");
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.update();
    assert_eq!(engine.asset().unwrap().source_url, "mem://fast.obj");
    assert!(!engine.is_loading());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_load_is_dropped() {
    let source = GatedSource::new(MemorySource::new().with("mem://a.ply", fixtures::PLY_ASCII_CUBE));
    source.gate("mem://a.ply");
    let mut engine = SceneEngine::new(
        source.clone(),
        ScriptedBackend::default(),
        test_settings(),
        tokio::runtime::Handle::current(),
    );
    engine.load_model("mem://a.ply", None, None).unwrap();
    engine.cancel_load();
    source.release("mem://a.ply");
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.update();
    assert!(engine.asset().is_none());
    assert_eq!(engine.status(), &ViewerStatus::Idle);
}
