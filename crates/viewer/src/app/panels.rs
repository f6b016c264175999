//! Toolbar, status bar, side panels and the settings window

use eframe::egui;
use egui::Ui;
use shared::{CreateTaskRequest, QualityLevel, ReconstructionMethod, ResolutionLevel, TaskStatus};
use tokio::runtime::Handle;
use uuid::Uuid;

use super::task_list::TaskList;
use super::Engine;
use crate::state::{
    ActiveTool, AnnotationShape, MeasurementKind, PanelVisibility, Units, ViewerSettings,
};
use crate::viewport::camera::ViewPreset;

/// Form inputs and transient UI flags
#[derive(Default)]
pub struct PanelState {
    pub task_id: String,
    pub model_url: String,
    /// Comma separated upload ids for a new task
    pub file_ids: String,
    pub method: ReconstructionMethod,
    pub quality: QualityLevel,
    pub resolution: ResolutionLevel,
    /// Settings being edited; applied on "Apply"
    pub settings_draft: Option<ViewerSettings>,
    pub screenshot_requested: bool,
    pub last_error: Option<String>,
}

// ── Toolbar ──────────────────────────────────────────────────

pub fn toolbar(ui: &mut Ui, engine: &mut Engine, form: &mut PanelState, panels: &mut PanelVisibility) {
    ui.horizontal(|ui| {
        tool_buttons(ui, engine);
        ui.separator();

        ui.menu_button("View", |ui| {
            for preset in ViewPreset::all() {
                if ui.button(preset.label()).clicked() {
                    engine.apply_preset(*preset);
                    ui.close_menu();
                }
            }
        });
        if ui.button("Fit").on_hover_text("Frame the model (F)").clicked() {
            engine.fit_to_asset();
        }
        if ui.button("Reset").on_hover_text("Reset camera (R)").clicked() {
            engine.reset_camera();
        }
        ui.separator();

        let mut units = engine.settings().measurement.units;
        egui::ComboBox::from_id_salt("toolbar_units")
            .width(60.0)
            .selected_text(units.abbrev())
            .show_ui(ui, |ui| {
                for u in Units::all() {
                    ui.selectable_value(&mut units, *u, u.display_name());
                }
            });
        if units != engine.settings().measurement.units {
            engine.set_units(units);
        }
        ui.separator();

        ui.menu_button("Export", |ui| {
            if ui.button("Screenshot (PNG)").clicked() {
                form.screenshot_requested = true;
                ui.close_menu();
            }
            if ui.button("Report (JSON)").clicked() {
                ui.close_menu();
                export_report(engine, form);
            }
        });

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui.button("Settings").clicked() {
                panels.settings = true;
            }
            ui.toggle_value(&mut panels.inspector, "Inspector");
            ui.toggle_value(&mut panels.task, "Task");
        });
    });
}

fn tool_buttons(ui: &mut Ui, engine: &mut Engine) {
    let active = engine.active_tool();
    let mut chosen = None;

    if ui.selectable_label(active == ActiveTool::Camera, "Camera").clicked() {
        chosen = Some(ActiveTool::Camera);
    }
    for kind in MeasurementKind::all() {
        let tool = ActiveTool::Measure(*kind);
        if ui.selectable_label(active == tool, kind.label()).clicked() {
            chosen = Some(tool);
        }
    }
    if ui.selectable_label(active == ActiveTool::Annotate, "Annotate").clicked() {
        chosen = Some(ActiveTool::Annotate);
    }
    if let Some(tool) = chosen {
        engine.set_active_tool(tool);
    }

    match engine.active_tool() {
        ActiveTool::Measure(_) => {
            let finish = ui
                .add_enabled(engine.measurements().can_finish(), egui::Button::new("Finish"))
                .on_hover_text("Close the measurement (Enter)");
            if finish.clicked() {
                engine.finish_measurement();
            }
        }
        ActiveTool::Annotate => {
            let mut shape = engine.annotations().shape();
            egui::ComboBox::from_id_salt("annotation_shape")
                .width(70.0)
                .selected_text(shape.label())
                .show_ui(ui, |ui| {
                    for s in AnnotationShape::all() {
                        ui.selectable_value(&mut shape, *s, s.label());
                    }
                });
            if shape != engine.annotations().shape() {
                engine.set_annotation_shape(shape);
            }
        }
        ActiveTool::Camera => {}
    }
}

fn export_report(engine: &Engine, form: &mut PanelState) {
    let Some(path) = rfd::FileDialog::new()
        .set_title("Export report")
        .add_filter("JSON", &["json"])
        .set_file_name("report.json")
        .save_file()
    else {
        return;
    };
    match engine.report().save(&path) {
        Ok(()) => tracing::info!("Saved report to {}", path.display()),
        Err(e) => {
            tracing::error!("Failed to save report: {e}");
            form.last_error = Some(e.to_string());
        }
    }
}

// ── Status bar ───────────────────────────────────────────────

pub fn status_bar(ui: &mut Ui, engine: &Engine, form: &PanelState) {
    ui.horizontal(|ui| {
        let status = engine.status();
        if status.is_error() {
            ui.colored_label(egui::Color32::from_rgb(255, 120, 120), status.label());
        } else {
            ui.weak(status.label());
        }
        if engine.is_loading() {
            ui.spinner();
        }

        if let Some(asset) = engine.asset() {
            ui.separator();
            ui.weak(format!(
                "{}: {} vertices, {} faces",
                asset.tag.display_name(),
                asset.vertex_count(),
                asset.face_count()
            ));
        }

        ui.separator();
        let pending = engine.measurements().pending_points().len();
        if pending > 0 {
            ui.colored_label(
                egui::Color32::YELLOW,
                format!("{}: {pending} point(s), Enter to finish, Esc to cancel", engine.active_tool().label()),
            );
        } else {
            ui.weak(format!("Tool: {}", engine.active_tool().label()));
        }

        if let Some(hit) = engine.last_pick() {
            ui.separator();
            let p = hit.point;
            ui.weak(format!("Pick: ({:.3}, {:.3}, {:.3})", p.x, p.y, p.z));
        }

        if let Some(error) = &form.last_error {
            ui.separator();
            ui.colored_label(egui::Color32::from_rgb(255, 120, 120), error);
        }
    });
}

// ── Task panel ───────────────────────────────────────────────

pub fn task_panel(
    ui: &mut Ui,
    engine: &mut Engine,
    form: &mut PanelState,
    task_list: &mut TaskList,
    runtime: &Handle,
) {
    ui.heading("Reconstruction");
    ui.separator();

    current_task(ui, engine);
    ui.add_space(8.0);

    egui::CollapsingHeader::new("Track task")
        .default_open(true)
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.add(egui::TextEdit::singleline(&mut form.task_id).hint_text("task id").desired_width(150.0));
                let id = form.task_id.trim();
                if ui.add_enabled(!id.is_empty(), egui::Button::new("Track")).clicked() {
                    engine.start_task(id.to_string());
                }
            });
        });

    egui::CollapsingHeader::new("New task").show(ui, |ui| {
        submit_form(ui, engine, form);
    });

    egui::CollapsingHeader::new("Open model")
        .default_open(true)
        .show(ui, |ui| {
            ui.add(
                egui::TextEdit::singleline(&mut form.model_url)
                    .hint_text("URL or path")
                    .desired_width(f32::INFINITY),
            );
            ui.horizontal(|ui| {
                if ui.button("Browse...").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .set_title("Open model")
                        .add_filter("Models", &["ply", "obj", "gltf", "glb"])
                        .pick_file()
                    {
                        form.model_url = format!("file://{}", path.display());
                    }
                }
                let url = form.model_url.trim().to_string();
                if ui.add_enabled(!url.is_empty(), egui::Button::new("Load")).clicked() {
                    let url = if url.contains("://") { url } else { format!("file://{url}") };
                    let _ = engine.load_model(&url, None, None);
                }
                if engine.is_loading() && ui.button("Cancel").clicked() {
                    engine.cancel_load();
                }
            });
        });

    egui::CollapsingHeader::new("Backend tasks").show(ui, |ui| {
        task_table(ui, engine, task_list, runtime);
    });
}

fn current_task(ui: &mut Ui, engine: &mut Engine) {
    let Some(task) = engine.task() else {
        ui.weak("No task tracked");
        return;
    };

    let status = task.status;
    let can_restart = task.is_terminal();
    ui.label(egui::RichText::new(&task.id).monospace());
    ui.horizontal(|ui| {
        let color = match status {
            TaskStatus::Completed => egui::Color32::from_rgb(120, 220, 120),
            TaskStatus::Failed => egui::Color32::from_rgb(255, 120, 120),
            _ => ui.visuals().text_color(),
        };
        ui.colored_label(color, status.as_str());
        if engine.is_polling() {
            ui.spinner();
        }
    });
    ui.add(
        egui::ProgressBar::new((task.progress / 100.0) as f32)
            .show_percentage()
            .desired_width(ui.available_width()),
    );
    if !task.message.is_empty() {
        ui.weak(&task.message);
    }

    ui.horizontal(|ui| {
        if ui.add_enabled(can_restart, egui::Button::new("Restart")).clicked() {
            engine.restart_task();
        }
        if ui.add_enabled(engine.is_polling(), egui::Button::new("Stop")).clicked() {
            engine.cancel_task();
        }
    });
}

fn submit_form(ui: &mut Ui, engine: &mut Engine, form: &mut PanelState) {
    egui::Grid::new("submit_grid").num_columns(2).show(ui, |ui| {
        ui.label("Files");
        ui.add(egui::TextEdit::singleline(&mut form.file_ids).hint_text("id1, id2"));
        ui.end_row();

        ui.label("Method");
        egui::ComboBox::from_id_salt("submit_method")
            .selected_text(form.method.display_name())
            .show_ui(ui, |ui| {
                for m in ReconstructionMethod::all() {
                    ui.selectable_value(&mut form.method, *m, m.display_name());
                }
            });
        ui.end_row();

        ui.label("Quality");
        egui::ComboBox::from_id_salt("submit_quality")
            .selected_text(form.quality.label())
            .show_ui(ui, |ui| {
                for q in QualityLevel::all() {
                    ui.selectable_value(&mut form.quality, *q, q.label());
                }
            });
        ui.end_row();

        ui.label("Resolution");
        egui::ComboBox::from_id_salt("submit_resolution")
            .selected_text(form.resolution.label())
            .show_ui(ui, |ui| {
                for r in ResolutionLevel::all() {
                    ui.selectable_value(&mut form.resolution, *r, r.label());
                }
            });
        ui.end_row();
    });

    let file_ids: Vec<String> = form
        .file_ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if ui.add_enabled(!file_ids.is_empty(), egui::Button::new("Submit")).clicked() {
        engine.submit_task(CreateTaskRequest {
            file_ids,
            method: form.method,
            quality: form.quality,
            resolution: form.resolution,
        });
    }
}

fn task_table(ui: &mut Ui, engine: &mut Engine, task_list: &mut TaskList, runtime: &Handle) {
    ui.horizontal(|ui| {
        if ui.button("Refresh").clicked() {
            task_list.refresh(runtime);
        }
        if task_list.is_busy() {
            ui.spinner();
        }
    });
    if let Some(error) = task_list.error() {
        ui.colored_label(egui::Color32::from_rgb(255, 120, 120), error);
    }

    let mut track = None;
    let mut delete = None;
    for summary in task_list.tasks() {
        ui.horizontal(|ui| {
            let short: String = summary.id.chars().take(8).collect();
            ui.label(egui::RichText::new(short).monospace())
                .on_hover_text(&summary.id);
            ui.weak(format!("{} {:.0}%", summary.status, summary.progress));
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.small_button("x").on_hover_text("Delete").clicked() {
                    delete = Some(summary.id.clone());
                }
                if ui.small_button("Track").clicked() {
                    track = Some(summary.id.clone());
                }
            });
        });
    }
    if task_list.tasks().is_empty() && !task_list.is_busy() {
        ui.weak("No tasks");
    }

    if let Some(id) = track {
        engine.start_task(id);
    }
    if let Some(id) = delete {
        task_list.delete(runtime, id);
    }
}

// ── Inspector ────────────────────────────────────────────────

enum InspectorAction {
    ToggleMeasurement(Uuid),
    DeleteMeasurement(Uuid),
    ToggleAnnotation(Uuid),
    DeleteAnnotation(Uuid),
    SetText(Uuid, String),
    ClearMeasurements,
    ClearAnnotations,
}

pub fn inspector(ui: &mut Ui, engine: &mut Engine) {
    let mut actions = Vec::new();

    ui.horizontal(|ui| {
        ui.heading("Measurements");
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if !engine.measurements().measurements().is_empty() && ui.small_button("Clear").clicked() {
                actions.push(InspectorAction::ClearMeasurements);
            }
        });
    });
    ui.separator();
    if engine.measurements().measurements().is_empty() {
        ui.weak("Pick points with a measurement tool");
    }
    for m in engine.measurements().measurements() {
        ui.horizontal(|ui| {
            let mut visible = m.visible;
            if ui.checkbox(&mut visible, "").changed() {
                actions.push(InspectorAction::ToggleMeasurement(m.id));
            }
            ui.label(m.kind.label());
            ui.strong(&m.label);
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.small_button("x").on_hover_text("Delete").clicked() {
                    actions.push(InspectorAction::DeleteMeasurement(m.id));
                }
            });
        });
    }

    ui.add_space(12.0);
    ui.horizontal(|ui| {
        ui.heading("Annotations");
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if !engine.annotations().annotations().is_empty() && ui.small_button("Clear").clicked() {
                actions.push(InspectorAction::ClearAnnotations);
            }
        });
    });
    ui.separator();
    if engine.annotations().annotations().is_empty() {
        ui.weak("Click the model with the annotate tool");
    }
    for a in engine.annotations().annotations() {
        ui.horizontal(|ui| {
            let mut visible = a.visible;
            if ui.checkbox(&mut visible, "").changed() {
                actions.push(InspectorAction::ToggleAnnotation(a.id));
            }
            let mut text = a.text.clone();
            let edit = ui.add(egui::TextEdit::singleline(&mut text).desired_width(150.0));
            if edit.changed() {
                actions.push(InspectorAction::SetText(a.id, text));
            }
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.small_button("x").on_hover_text("Delete").clicked() {
                    actions.push(InspectorAction::DeleteAnnotation(a.id));
                }
            });
        });
    }

    for action in actions {
        match action {
            InspectorAction::ToggleMeasurement(id) => {
                engine.toggle_measurement(id);
            }
            InspectorAction::DeleteMeasurement(id) => {
                engine.delete_measurement(id);
            }
            InspectorAction::ToggleAnnotation(id) => {
                engine.toggle_annotation(id);
            }
            InspectorAction::DeleteAnnotation(id) => {
                engine.delete_annotation(id);
            }
            InspectorAction::SetText(id, text) => {
                engine.set_annotation_text(id, text);
            }
            InspectorAction::ClearMeasurements => engine.clear_measurements(),
            InspectorAction::ClearAnnotations => engine.clear_annotations(),
        }
    }
}

// ── Settings window ──────────────────────────────────────────

pub fn settings_window(
    ctx: &egui::Context,
    engine: &mut Engine,
    form: &mut PanelState,
    panels: &mut PanelVisibility,
) {
    if !panels.settings {
        form.settings_draft = None;
        return;
    }
    let draft = form
        .settings_draft
        .get_or_insert_with(|| engine.settings().clone());

    let mut open = true;
    let mut apply = false;
    let mut close = false;
    egui::Window::new("Settings")
        .open(&mut open)
        .resizable(true)
        .default_width(360.0)
        .show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                show_measurement_settings(ui, draft);
                show_scene_settings(ui, draft);
                show_camera_settings(ui, draft);
                show_server_settings(ui, draft);

                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Apply").clicked() {
                        apply = true;
                    }
                    if ui.button("Reset").clicked() {
                        *draft = ViewerSettings::default();
                    }
                    if ui.button("Close").clicked() {
                        close = true;
                    }
                });
            });
        });

    if apply {
        if let Some(settings) = form.settings_draft.clone() {
            settings.save();
            engine.apply_settings(settings);
        }
    }
    if close || !open {
        panels.settings = false;
        form.settings_draft = None;
    }
}

fn show_measurement_settings(ui: &mut Ui, s: &mut ViewerSettings) {
    ui.heading("Measurements");
    egui::Grid::new("measure_settings").num_columns(2).show(ui, |ui| {
        ui.label("Units");
        egui::ComboBox::from_id_salt("settings_units")
            .selected_text(s.measurement.units.display_name())
            .show_ui(ui, |ui| {
                for u in Units::all() {
                    ui.selectable_value(&mut s.measurement.units, *u, u.display_name());
                }
            });
        ui.end_row();

        ui.label("Scale factor");
        ui.add(
            egui::DragValue::new(&mut s.measurement.scale_factor)
                .speed(0.01)
                .range(1e-6..=1e6),
        )
        .on_hover_text("Display units per model unit");
        ui.end_row();

        ui.label("Precision");
        ui.add(egui::DragValue::new(&mut s.measurement.precision).range(0..=6));
        ui.end_row();
    });
    ui.add_space(10.0);
}

fn show_scene_settings(ui: &mut Ui, s: &mut ViewerSettings) {
    ui.heading("Scene");
    ui.checkbox(&mut s.scene.show_grid, "Show grid");
    egui::Grid::new("scene_settings").num_columns(2).show(ui, |ui| {
        ui.label("Point size");
        ui.add(egui::DragValue::new(&mut s.scene.point_size).speed(0.1).range(0.5..=10.0).suffix(" px"));
        ui.end_row();

        ui.label("Marker size");
        ui.add(egui::DragValue::new(&mut s.viewport.marker_size).speed(0.005).range(0.005..=0.5));
        ui.end_row();

        ui.label("Background");
        let [r, g, b] = s.viewport.background_color;
        let mut color = egui::Color32::from_rgb(r, g, b);
        if ui.color_edit_button_srgba(&mut color).changed() {
            s.viewport.background_color = [color.r(), color.g(), color.b()];
        }
        ui.end_row();
    });
    ui.add_space(10.0);
}

fn show_camera_settings(ui: &mut Ui, s: &mut ViewerSettings) {
    ui.heading("Camera");
    egui::Grid::new("camera_settings").num_columns(2).show(ui, |ui| {
        ui.label("Orbit speed");
        ui.add(egui::DragValue::new(&mut s.camera.orbit_sensitivity).speed(0.001).range(0.001..=0.1));
        ui.end_row();

        ui.label("Zoom speed");
        ui.add(egui::DragValue::new(&mut s.camera.zoom_sensitivity).speed(0.0005).range(0.0001..=0.05));
        ui.end_row();

        ui.label("Distance");
        ui.horizontal(|ui| {
            ui.add(egui::DragValue::new(&mut s.camera.min_distance).speed(0.1).range(0.01..=10.0));
            ui.label("to");
            ui.add(egui::DragValue::new(&mut s.camera.max_distance).speed(1.0).range(10.0..=10_000.0));
        });
        ui.end_row();
    });
    ui.add_space(10.0);
}

fn show_server_settings(ui: &mut Ui, s: &mut ViewerSettings) {
    ui.heading("Backend");
    ui.weak("Connection changes take effect after restart");
    egui::Grid::new("server_settings").num_columns(2).show(ui, |ui| {
        ui.label("Base URL");
        ui.text_edit_singleline(&mut s.server.base_url);
        ui.end_row();

        ui.label("Poll interval");
        ui.add(egui::DragValue::new(&mut s.server.poll_interval_ms).range(100..=60_000).suffix(" ms"));
        ui.end_row();

        ui.label("Retry budget");
        ui.add(egui::DragValue::new(&mut s.server.retry_budget).range(0..=50));
        ui.end_row();
    });
    ui.add_space(10.0);
}
