//! Scene engine: one viewer session.
//!
//! Owns the camera, the scene graph, the tools, the asset loader and the task
//! controller. Everything here is mutated from the host's frame callback;
//! async work only reports back through the loader and task channels, which
//! [`SceneEngine::update`] drains.

use glam::{Vec2, Vec3};
use serde::Serialize;
use shared::{CreateTaskRequest, ResultMetadata, TaskId};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::asset::{NormalizeOptions, SceneAsset};
use crate::error::LoadError;
use crate::export::SceneReport;
use crate::geometry::{ndc_to_screen, screen_to_ndc};
use crate::loader::{AssetLoader, AssetSource, LoadOptions, LoadOutcome};
use crate::state::{
    ActiveTool, AnnotationShape, AnnotationTool, MeasurementTool, ReconstructionTask, TaskEvent,
    UnitFormat, Units, ViewerSettings,
};
use crate::task::{resolve_against, PollConfig, TaskBackend, TaskController};
use crate::viewport::camera::{CameraController, CameraLimits, ViewPreset};
use crate::viewport::input::{Gesture, PointerButton, PointerEvent, PointerTracker};
use crate::viewport::picking::{pick, PickHit};
use crate::viewport::scene::{Marker, NodeKind, SceneGraph};

/// Color of the in-progress measurement markers
const PENDING_MARKER_COLOR: [f32; 3] = [1.0, 0.9, 0.2];

/// User-visible state of the session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum ViewerStatus {
    Idle,
    WaitingForTask,
    Loading { url: String },
    Ready,
    LoadFailed(String),
    TaskFailed(String),
}

impl ViewerStatus {
    pub fn label(&self) -> String {
        match self {
            ViewerStatus::Idle => "No model loaded".to_string(),
            ViewerStatus::WaitingForTask => "Waiting for reconstruction".to_string(),
            ViewerStatus::Loading { url } => format!("Loading {url}"),
            ViewerStatus::Ready => "Ready".to_string(),
            ViewerStatus::LoadFailed(e) => format!("Load failed: {e}"),
            ViewerStatus::TaskFailed(e) => format!("Reconstruction failed: {e}"),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ViewerStatus::LoadFailed(_) | ViewerStatus::TaskFailed(_))
    }
}

/// What a click did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClickOutcome {
    /// The camera tool is active
    Ignored,
    /// The ray hit nothing pickable
    Missed,
    PointAdded { collected: usize },
    MeasurementCreated { id: Uuid },
    AnnotationPlaced { id: Uuid },
}

pub struct SceneEngine<S: AssetSource, B: TaskBackend> {
    camera: CameraController,
    scene: SceneGraph,
    tool: ActiveTool,
    measurements: MeasurementTool,
    annotations: AnnotationTool,
    loader: AssetLoader<S>,
    tasks: TaskController<B>,
    pointer: PointerTracker,
    viewport: Vec2,
    settings: ViewerSettings,
    status: ViewerStatus,
    last_pick: Option<PickHit>,
}

impl<S: AssetSource, B: TaskBackend> SceneEngine<S, B> {
    pub fn new(source: S, backend: B, mut settings: ViewerSettings, runtime: Handle) -> Self {
        settings.sanitize();
        let load_options = LoadOptions {
            normalize: NormalizeOptions {
                reference_size: settings.scene.reference_size,
                default_color: settings.scene.default_color,
            },
            timeout: settings.server.load_timeout(),
        };
        let poll_config = PollConfig {
            interval: settings.server.poll_interval(),
            retry_budget: settings.server.retry_budget,
        };

        let mut engine = Self {
            camera: CameraController::default(),
            scene: SceneGraph::new(),
            tool: ActiveTool::Camera,
            measurements: MeasurementTool::default(),
            annotations: AnnotationTool::default(),
            loader: AssetLoader::new(source, load_options, runtime.clone()),
            tasks: TaskController::new(backend, poll_config, runtime),
            pointer: PointerTracker::default(),
            viewport: Vec2::new(1280.0, 800.0),
            settings: ViewerSettings::default(),
            status: ViewerStatus::Idle,
            last_pick: None,
        };
        engine.apply_settings(settings);
        engine
    }

    /// Apply camera, scene and measurement settings. Loader and poller
    /// settings are fixed at construction.
    pub fn apply_settings(&mut self, mut settings: ViewerSettings) {
        settings.sanitize();
        self.camera.set_limits(CameraLimits {
            min_distance: settings.camera.min_distance,
            max_distance: settings.camera.max_distance,
            pitch_limit: settings.camera.pitch_limit,
        });
        self.pointer.set_threshold(settings.camera.drag_threshold);
        self.scene.set_grid_visible(settings.scene.show_grid);
        self.settings = settings;
        self.update_unit_format();
        self.refresh_markers();
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn asset(&self) -> Option<&SceneAsset> {
        self.scene.asset()
    }

    pub fn active_tool(&self) -> ActiveTool {
        self.tool
    }

    pub fn measurements(&self) -> &MeasurementTool {
        &self.measurements
    }

    pub fn annotations(&self) -> &AnnotationTool {
        &self.annotations
    }

    pub fn task(&self) -> Option<&ReconstructionTask> {
        self.tasks.task()
    }

    pub fn is_polling(&self) -> bool {
        self.tasks.is_polling()
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    pub fn status(&self) -> &ViewerStatus {
        &self.status
    }

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    pub fn last_pick(&self) -> Option<&PickHit> {
        self.last_pick.as_ref()
    }

    pub fn asset_source(&self) -> &S {
        self.loader.source()
    }

    pub fn backend(&self) -> &B {
        self.tasks.backend()
    }

    pub fn viewport_size(&self) -> Vec2 {
        self.viewport
    }

    pub fn set_viewport_size(&mut self, size: Vec2) {
        if size.x > 0.0 && size.y > 0.0 {
            self.viewport = size;
        }
    }

    pub fn aspect(&self) -> f32 {
        self.viewport.x / self.viewport.y.max(1.0)
    }

    /// Pixel position of a world point, `None` when behind the camera
    pub fn project_to_screen(&self, point: Vec3) -> Option<Vec2> {
        let ndc = self.camera.project_ndc(point, self.aspect())?;
        Some(ndc_to_screen(ndc.truncate(), Vec2::ZERO, self.viewport))
    }

    // ── Tools ───────────────────────────────────────────────────

    /// Switch the tool that owns clicks. Leaving measurement discards its
    /// partial point sequence.
    pub fn set_active_tool(&mut self, tool: ActiveTool) {
        match tool {
            ActiveTool::Camera => {
                self.measurements.disarm();
                self.annotations.disarm();
            }
            ActiveTool::Measure(kind) => {
                self.annotations.disarm();
                self.measurements.arm(kind);
            }
            ActiveTool::Annotate => {
                self.measurements.disarm();
                self.annotations.arm();
            }
        }
        if tool != self.tool {
            debug!(tool = tool.label(), "Active tool changed");
        }
        self.tool = tool;
        self.refresh_markers();
    }

    pub fn finish_measurement(&mut self) -> Option<Uuid> {
        let id = self.measurements.finish();
        self.refresh_markers();
        id
    }

    pub fn undo_point(&mut self) -> bool {
        let undone = self.measurements.undo_point();
        self.refresh_markers();
        undone
    }

    pub fn cancel_measurement(&mut self) {
        self.measurements.cancel();
        self.refresh_markers();
    }

    pub fn delete_measurement(&mut self, id: Uuid) -> bool {
        let removed = self.measurements.delete(id);
        self.refresh_markers();
        removed
    }

    pub fn toggle_measurement(&mut self, id: Uuid) -> bool {
        let found = self.measurements.toggle_visibility(id);
        self.refresh_markers();
        found
    }

    pub fn clear_measurements(&mut self) {
        self.measurements.clear();
        self.refresh_markers();
    }

    /// Shape used for annotations placed from now on
    pub fn set_annotation_shape(&mut self, shape: AnnotationShape) {
        self.annotations.set_shape(shape);
    }

    pub fn set_annotation_text(&mut self, id: Uuid, text: impl Into<String>) -> bool {
        self.annotations.set_text(id, text)
    }

    pub fn delete_annotation(&mut self, id: Uuid) -> bool {
        let removed = self.annotations.delete(id);
        self.refresh_markers();
        removed
    }

    pub fn toggle_annotation(&mut self, id: Uuid) -> bool {
        let found = self.annotations.toggle_visibility(id);
        self.refresh_markers();
        found
    }

    pub fn clear_annotations(&mut self) {
        self.annotations.clear();
        self.refresh_markers();
    }

    pub fn set_units(&mut self, units: Units) {
        self.settings.measurement.units = units;
        self.update_unit_format();
    }

    /// Display units per world unit: the configured scale factor, undoing
    /// the normalization scale of the loaded asset
    fn update_unit_format(&mut self) {
        let asset_scale = self.scene.asset().map_or(1.0, |a| a.scale as f64);
        let m = &self.settings.measurement;
        self.measurements.set_format(UnitFormat {
            units: m.units,
            units_per_world: m.scale_factor / asset_scale,
            precision: m.precision,
        });
    }

    /// Rebuild helper marker nodes from the visible tool state
    fn refresh_markers(&mut self) {
        let mut markers: Vec<Marker> = self
            .measurements
            .measurements()
            .iter()
            .filter(|m| m.visible)
            .map(|m| Marker {
                owner: NodeKind::MeasurementMarker(m.id),
                points: m.points.clone(),
                color: m.color,
            })
            .collect();
        let pending = self.measurements.pending_points();
        if !pending.is_empty() {
            markers.push(Marker {
                owner: NodeKind::MeasurementMarker(Uuid::nil()),
                points: pending.to_vec(),
                color: PENDING_MARKER_COLOR,
            });
        }
        markers.extend(self.annotations.annotations().iter().filter(|a| a.visible).map(|a| {
            Marker {
                owner: NodeKind::AnnotationMarker(a.id),
                points: vec![a.position],
                color: a.color,
            }
        }));
        self.scene.set_markers(markers, self.settings.viewport.marker_size);
    }

    // ── Pointer ─────────────────────────────────────────────────

    /// Feed one pointer event. Drags and scrolls move the camera whatever
    /// the active tool; a primary click goes to the active tool.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> Option<ClickOutcome> {
        let orbit_sensitivity = self.settings.camera.orbit_sensitivity;
        let zoom_sensitivity = self.settings.camera.zoom_sensitivity;
        match self.pointer.handle(event)? {
            Gesture::Drag {
                button: PointerButton::Primary,
                delta,
            } => {
                self.camera
                    .orbit(-delta.x * orbit_sensitivity, delta.y * orbit_sensitivity);
                None
            }
            Gesture::Drag { delta, .. } => {
                let h = self.viewport.y.max(1.0);
                self.camera.pan(-delta.x / h, delta.y / h);
                None
            }
            Gesture::Scroll { delta } => {
                self.camera.dolly(delta * zoom_sensitivity);
                None
            }
            Gesture::Click {
                button: PointerButton::Primary,
                pos,
            } => Some(self.click_at(pos)),
            Gesture::Click { .. } | Gesture::DragEnd { .. } => None,
        }
    }

    /// Nearest pickable hit under a viewport pixel
    pub fn pick_at(&self, pos: Vec2) -> Option<PickHit> {
        let ndc = screen_to_ndc(pos, Vec2::ZERO, self.viewport);
        pick(
            ndc,
            &self.camera,
            &self.scene,
            self.aspect(),
            self.settings.scene.pick_radius(),
        )
    }

    /// Pick under `pos` and hand the point to the active tool
    pub fn click_at(&mut self, pos: Vec2) -> ClickOutcome {
        if !self.tool.picks() {
            return ClickOutcome::Ignored;
        }
        match self.pick_at(pos) {
            Some(hit) => {
                self.last_pick = Some(hit);
                self.apply_pick_point(hit.point)
            }
            None => {
                debug!(x = pos.x, y = pos.y, "Pick missed");
                ClickOutcome::Missed
            }
        }
    }

    /// Route a picked world point to the active tool
    pub fn apply_pick_point(&mut self, point: Vec3) -> ClickOutcome {
        let outcome = match self.tool {
            ActiveTool::Camera => ClickOutcome::Ignored,
            ActiveTool::Measure(_) => match self.measurements.add_point(point) {
                Some(id) => ClickOutcome::MeasurementCreated { id },
                None => ClickOutcome::PointAdded {
                    collected: self.measurements.pending_points().len(),
                },
            },
            ActiveTool::Annotate => match self.annotations.place(point) {
                Some(id) => ClickOutcome::AnnotationPlaced { id },
                None => ClickOutcome::Ignored,
            },
        };
        self.refresh_markers();
        outcome
    }

    // ── Camera ──────────────────────────────────────────────────

    pub fn apply_preset(&mut self, preset: ViewPreset) {
        self.camera.apply_preset(preset);
    }

    /// Frame the loaded asset
    pub fn fit_to_asset(&mut self) {
        if let Some(bounds) = self.scene.asset().map(|a| a.bounds) {
            self.camera.fit_to_bounds(&bounds);
        }
    }

    pub fn reset_camera(&mut self) {
        self.camera.reset();
    }

    pub fn camera_mut(&mut self) -> &mut CameraController {
        &mut self.camera
    }

    // ── Loading ─────────────────────────────────────────────────

    /// Start loading a model, superseding any load in flight
    pub fn load_model(
        &mut self,
        url: &str,
        hint: Option<&str>,
        metadata: Option<ResultMetadata>,
    ) -> Result<u64, LoadError> {
        match self.loader.load(url, hint, metadata) {
            Ok(generation) => {
                self.status = ViewerStatus::Loading {
                    url: url.to_string(),
                };
                Ok(generation)
            }
            Err(e) => {
                warn!(url, "Cannot load model: {e}");
                self.status = ViewerStatus::LoadFailed(e.to_string());
                Err(e)
            }
        }
    }

    pub fn cancel_load(&mut self) {
        self.loader.cancel();
        if matches!(self.status, ViewerStatus::Loading { .. }) {
            self.status = self.settled_status();
        }
    }

    /// Make `asset` the scene content. Tool state referring to the previous
    /// asset is dropped and the camera frames the new one.
    pub fn accept_asset(&mut self, asset: SceneAsset) {
        self.measurements.clear();
        self.annotations.clear();
        self.last_pick = None;
        let bounds = asset.bounds;
        self.scene.set_asset(asset);
        self.camera.fit_to_bounds(&bounds);
        self.update_unit_format();
        self.refresh_markers();
        self.status = ViewerStatus::Ready;
    }

    fn apply_load_outcome(&mut self, outcome: LoadOutcome) -> Result<(), LoadError> {
        match outcome.result {
            Ok(asset) => {
                self.accept_asset(asset);
                Ok(())
            }
            Err(e) => {
                self.status = ViewerStatus::LoadFailed(e.to_string());
                Err(e)
            }
        }
    }

    fn settled_status(&self) -> ViewerStatus {
        if self.scene.asset().is_some() {
            ViewerStatus::Ready
        } else {
            ViewerStatus::Idle
        }
    }

    // ── Tasks ───────────────────────────────────────────────────

    pub fn start_task(&mut self, task_id: impl Into<TaskId>) {
        self.tasks.start(task_id);
        self.status = ViewerStatus::WaitingForTask;
    }

    pub fn submit_task(&mut self, request: CreateTaskRequest) {
        self.tasks.submit(request);
        self.status = ViewerStatus::WaitingForTask;
    }

    pub fn restart_task(&mut self) -> bool {
        let restarted = self.tasks.restart();
        if restarted {
            self.status = ViewerStatus::WaitingForTask;
        }
        restarted
    }

    pub fn cancel_task(&mut self) {
        self.tasks.cancel();
        if self.status == ViewerStatus::WaitingForTask {
            self.status = self.settled_status();
        }
    }

    fn apply_task_event(&mut self, event: &TaskEvent) {
        match event {
            TaskEvent::ResultReady(result) => {
                let url = resolve_against(&self.settings.server.base_url, &result.model_url);
                info!(%url, "Reconstruction result ready");
                // Failure is already reflected in the status
                let _ = self.load_model(&url, None, result.metadata.clone());
            }
            TaskEvent::Failed(reason) | TaskEvent::SubmitFailed(reason) => {
                error!("Reconstruction failed: {reason}");
                self.status = ViewerStatus::TaskFailed(reason.clone());
            }
            TaskEvent::Submitted(_) | TaskEvent::StatusChanged { .. } | TaskEvent::Progress { .. } => {
                if !matches!(self.status, ViewerStatus::Loading { .. }) {
                    self.status = ViewerStatus::WaitingForTask;
                }
            }
            TaskEvent::Retrying { .. } => {}
        }
    }

    // ── Frame ───────────────────────────────────────────────────

    /// Drain finished loads and task messages. Call once per frame.
    pub fn update(&mut self) -> Vec<TaskEvent> {
        while let Some(outcome) = self.loader.try_recv() {
            let _ = self.apply_load_outcome(outcome);
        }
        let events = self.tasks.pump();
        for event in &events {
            self.apply_task_event(event);
        }
        events
    }

    /// Wait for the current load to finish and apply it. `None` when no
    /// load is pending.
    pub async fn wait_for_load(&mut self) -> Option<Result<(), LoadError>> {
        let outcome = self.loader.next_result().await?;
        Some(self.apply_load_outcome(outcome))
    }

    /// Wait for the next batch of task events and apply them
    pub async fn wait_task_events(&mut self) -> Vec<TaskEvent> {
        let events = self.tasks.wait_events().await;
        for event in &events {
            self.apply_task_event(event);
        }
        events
    }

    pub fn report(&self) -> SceneReport {
        SceneReport::new(
            self.scene.asset(),
            self.settings.measurement.units,
            self.camera.state(),
            self.measurements.measurements(),
            self.annotations.annotations(),
        )
    }
}
