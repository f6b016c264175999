//! Headless test harness: a `SceneEngine` without a window.
//!
//! Owns its own tokio runtime and blocks on async completion, so tests and
//! the agent command protocol can drive the viewer synchronously.

use std::time::Duration;

use glam::{Vec2, Vec3};
use tokio::runtime::Runtime;

use crate::engine::{ClickOutcome, SceneEngine};
use crate::error::LoadError;
use crate::fixtures::{MemorySource, ScriptedBackend};
use crate::state::{ActiveTool, TaskEvent, ViewerSettings};
use crate::viewport::input::{PointerButton, PointerEvent};

/// Upper bound for any single blocking wait
const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Settings tuned for tests: fast polling, short timeouts
pub fn test_settings() -> ViewerSettings {
    let mut settings = ViewerSettings::default();
    settings.server.base_url = "http://recon.test".to_string();
    settings.server.poll_interval_ms = 10;
    settings.server.load_timeout_secs = 5;
    settings
}

pub struct TestHarness {
    // Dropped before the runtime it spawns onto
    engine: SceneEngine<MemorySource, ScriptedBackend>,
    runtime: Runtime,
}

impl TestHarness {
    pub fn new() -> std::io::Result<Self> {
        Self::with(ScriptedBackend::default(), test_settings())
    }

    pub fn with(backend: ScriptedBackend, settings: ViewerSettings) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        let engine = SceneEngine::new(
            MemorySource::new(),
            backend,
            settings,
            runtime.handle().clone(),
        );
        Ok(Self { engine, runtime })
    }

    pub fn engine(&self) -> &SceneEngine<MemorySource, ScriptedBackend> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SceneEngine<MemorySource, ScriptedBackend> {
        &mut self.engine
    }

    pub fn source(&self) -> &MemorySource {
        self.engine.asset_source()
    }

    pub fn backend(&self) -> &ScriptedBackend {
        self.engine.backend()
    }

    // ── Loading ───────────────────────────────────────────────

    /// Register `bytes` under `mem://<name>` and load them to completion
    pub fn load_bytes(&mut self, name: &str, bytes: impl Into<Vec<u8>>) -> Result<(), LoadError> {
        let url = format!("mem://{name}");
        self.source().insert(&url, bytes);
        self.load_url(&url)
    }

    /// Load a URL already known to the memory source
    pub fn load_url(&mut self, url: &str) -> Result<(), LoadError> {
        self.engine.load_model(url, None, None)?;
        self.settle_load()
    }

    /// Block until the pending load (if any) is applied
    pub fn settle_load(&mut self) -> Result<(), LoadError> {
        let engine = &mut self.engine;
        let waited = self
            .runtime
            .block_on(async { tokio::time::timeout(WAIT_LIMIT, engine.wait_for_load()).await });
        match waited {
            Ok(Some(result)) => result,
            Ok(None) => Ok(()),
            Err(_) => Err(LoadError::NetworkFailure("load did not finish".to_string())),
        }
    }

    // ── Tasks ─────────────────────────────────────────────────

    /// Poll `task_id` until it reaches a terminal state, then settle any
    /// result load. Returns every event observed.
    pub fn run_task(&mut self, task_id: &str) -> Vec<TaskEvent> {
        self.engine.start_task(task_id);
        self.drain_task()
    }

    /// Block until the next batch of task events (empty on timeout)
    pub fn next_events(&mut self) -> Vec<TaskEvent> {
        let engine = &mut self.engine;
        self.runtime
            .block_on(async { tokio::time::timeout(WAIT_LIMIT, engine.wait_task_events()).await })
            .unwrap_or_default()
    }

    /// Collect task events until the task is terminal or events stop
    pub fn drain_task(&mut self) -> Vec<TaskEvent> {
        let mut all = Vec::new();
        while self.engine.task().is_some_and(|t| !t.is_terminal()) {
            let events = self.next_events();
            if events.is_empty() {
                break;
            }
            all.extend(events);
        }
        // A completed task starts loading its model
        if self.engine.is_loading() {
            let _ = self.settle_load();
        }
        all
    }

    // ── Pointer ───────────────────────────────────────────────

    pub fn set_tool(&mut self, tool: ActiveTool) {
        self.engine.set_active_tool(tool);
    }

    /// Press and release at a viewport pixel
    pub fn click_screen(&mut self, pos: Vec2) -> ClickOutcome {
        let button = PointerButton::Primary;
        self.engine.handle_pointer(PointerEvent::Pressed { button, pos });
        self.engine
            .handle_pointer(PointerEvent::Released { button, pos })
            .unwrap_or(ClickOutcome::Ignored)
    }

    /// Click where `point` projects on screen
    pub fn click_world(&mut self, point: Vec3) -> ClickOutcome {
        match self.engine.project_to_screen(point) {
            Some(pos) => self.click_screen(pos),
            None => ClickOutcome::Missed,
        }
    }

    /// Press at `from`, move to `to` in a few steps, release
    pub fn drag(&mut self, button: PointerButton, from: Vec2, to: Vec2) {
        self.engine.handle_pointer(PointerEvent::Pressed { button, pos: from });
        for step in 1..=4 {
            let pos = from.lerp(to, step as f32 / 4.0);
            self.engine.handle_pointer(PointerEvent::Moved { pos });
        }
        self.engine.handle_pointer(PointerEvent::Released { button, pos: to });
    }

    pub fn scroll(&mut self, delta: f32) {
        self.engine.handle_pointer(PointerEvent::Scrolled { delta });
    }

    /// Scene summary for the agent protocol
    pub fn inspect(&self) -> serde_json::Value {
        let e = &self.engine;
        let measurements: Vec<serde_json::Value> = e
            .measurements()
            .measurements()
            .iter()
            .map(|m| {
                serde_json::json!({
                    "id": m.id,
                    "kind": m.kind,
                    "value": m.value,
                    "label": m.label,
                    "visible": m.visible,
                })
            })
            .collect();
        let annotations: Vec<serde_json::Value> = e
            .annotations()
            .annotations()
            .iter()
            .map(|a| {
                serde_json::json!({
                    "id": a.id,
                    "text": a.text,
                    "position": a.position,
                    "visible": a.visible,
                })
            })
            .collect();
        serde_json::json!({
            "status": e.status(),
            "tool": e.active_tool(),
            "asset": e.asset().map(|a| serde_json::json!({
                "url": a.source_url,
                "tag": a.tag,
                "vertices": a.vertex_count(),
                "faces": a.face_count(),
            })),
            "camera": e.camera().state(),
            "pending_points": e.measurements().pending_points().len(),
            "measurements": measurements,
            "annotations": annotations,
            "task": e.task(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::state::MeasurementKind;

    #[test]
    fn test_load_and_click_cube() {
        let mut h = TestHarness::new().unwrap();
        h.load_bytes("cube.obj", fixtures::OBJ_CUBE).unwrap();
        let asset = h.engine().asset().unwrap();
        assert_eq!(asset.face_count(), 12);

        h.set_tool(ActiveTool::Measure(MeasurementKind::Distance));
        // Normalized cube spans [-2.5, 2.5]; the front face is z = 2.5
        let a = h.click_world(Vec3::new(-1.0, 0.0, 2.5));
        assert_eq!(a, ClickOutcome::PointAdded { collected: 1 });
        let b = h.click_world(Vec3::new(1.0, 0.0, 2.5));
        assert!(matches!(b, ClickOutcome::MeasurementCreated { .. }));
        let m = &h.engine().measurements().measurements()[0];
        assert!((m.world_value - 2.0).abs() < 1e-2);
    }

    #[test]
    fn test_drag_does_not_click() {
        let mut h = TestHarness::new().unwrap();
        h.load_bytes("cube.ply", fixtures::PLY_ASCII_CUBE).unwrap();
        h.set_tool(ActiveTool::Annotate);
        let yaw = h.engine().camera().yaw();
        h.drag(PointerButton::Primary, Vec2::new(600.0, 400.0), Vec2::new(700.0, 400.0));
        assert!(h.engine().annotations().annotations().is_empty());
        assert!((h.engine().camera().yaw() - yaw).abs() > 0.1);
    }

    #[test]
    fn test_inspect_shape() {
        let mut h = TestHarness::new().unwrap();
        h.load_bytes("pts.ply", fixtures::PLY_ASCII_POINTS).unwrap();
        let v = h.inspect();
        assert_eq!(v["asset"]["tag"], "point-cloud");
        assert_eq!(v["asset"]["vertices"], 4);
        assert_eq!(v["status"]["state"], "ready");
    }
}
