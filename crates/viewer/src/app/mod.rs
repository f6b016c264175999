//! Main application module

mod keyboard;
mod panels;
mod styles;
mod task_list;

use std::time::Duration;

use eframe::egui;
use tokio::runtime::Runtime;

use crate::engine::SceneEngine;
use crate::loader::HttpAssetSource;
use crate::state::{PanelVisibility, ViewerSettings};
use crate::task::HttpTaskClient;
use crate::viewport::ViewportPanel;
use crate::CliArgs;
use panels::PanelState;
use task_list::TaskList;

/// Engine wired to the HTTP backend
pub type Engine = SceneEngine<HttpAssetSource, HttpTaskClient>;

/// Timeout for backend API calls (status, create, list)
const API_TIMEOUT: Duration = Duration::from_secs(10);

/// Main application
pub struct ViewerApp {
    engine: Engine,
    viewport: ViewportPanel,
    panels: PanelVisibility,
    form: PanelState,
    task_list: TaskList,
    /// Declared last: the engine and task list abort their jobs on drop
    runtime: Runtime,
}

impl ViewerApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        runtime: Runtime,
        settings: ViewerSettings,
        args: CliArgs,
    ) -> Self {
        styles::configure_styles(&cc.egui_ctx);

        let source = HttpAssetSource::new(settings.server.load_timeout());
        let client = HttpTaskClient::new(settings.server.base_url.clone(), API_TIMEOUT);
        let task_list = TaskList::new(client.clone());
        let mut engine = SceneEngine::new(source, client, settings, runtime.handle().clone());

        if let Some(task) = args.task {
            engine.start_task(task);
        }
        if let Some(model) = args.model {
            // Failure is reported through the status bar
            let _ = engine.load_model(&model, None, None);
        }

        Self {
            engine,
            viewport: ViewportPanel::new(),
            panels: PanelVisibility::default(),
            form: PanelState::default(),
            task_list,
            runtime,
        }
    }

    fn handle_screenshots(&mut self, ctx: &egui::Context) {
        if std::mem::take(&mut self.form.screenshot_requested) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Screenshot(egui::UserData::default()));
        }

        let image = ctx.input(|i| {
            i.raw.events.iter().find_map(|e| match e {
                egui::Event::Screenshot { image, .. } => Some(image.clone()),
                _ => None,
            })
        });
        let Some(image) = image else {
            return;
        };

        if let Some(path) = rfd::FileDialog::new()
            .set_title("Save screenshot")
            .add_filter("PNG", &["png"])
            .set_file_name("capture.png")
            .save_file()
        {
            let [w, h] = image.size;
            let rgba: Vec<u8> = image.pixels.iter().flat_map(|c| c.to_array()).collect();
            match crate::export::save_png(&path, w, h, &rgba) {
                Ok(()) => tracing::info!("Saved screenshot to {}", path.display()),
                Err(e) => {
                    tracing::error!("Failed to save screenshot: {e}");
                    self.form.last_error = Some(e.to_string());
                }
            }
        }
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.engine.update();
        self.task_list.drain();
        self.handle_screenshots(ctx);

        keyboard::handle_keyboard(ctx, &mut self.engine);

        // Async work reports through channels; keep frames coming while it runs
        if self.engine.is_loading() || self.engine.is_polling() || self.task_list.is_busy() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }

        // ── Toolbar ───────────────────────────────────────────
        egui::TopBottomPanel::top("toolbar")
            .frame(
                egui::Frame::side_top_panel(&ctx.style()).inner_margin(egui::Margin::symmetric(8, 4)),
            )
            .show(ctx, |ui| {
                panels::toolbar(ui, &mut self.engine, &mut self.form, &mut self.panels);
            });

        // ── Status bar ───────────────────────────────────────
        egui::TopBottomPanel::bottom("status_bar")
            .exact_height(22.0)
            .frame(
                egui::Frame::side_top_panel(&ctx.style()).inner_margin(egui::Margin::symmetric(8, 2)),
            )
            .show(ctx, |ui| {
                panels::status_bar(ui, &self.engine, &self.form);
            });

        // ── Left panel: reconstruction task ──────────────────
        if self.panels.task {
            egui::SidePanel::left("task_panel")
                .default_width(260.0)
                .width_range(200.0..=420.0)
                .resizable(true)
                .frame(
                    egui::Frame::side_top_panel(&ctx.style()).inner_margin(egui::Margin::same(6)),
                )
                .show(ctx, |ui| {
                    egui::ScrollArea::vertical().id_salt("task_scroll").show(ui, |ui| {
                        panels::task_panel(
                            ui,
                            &mut self.engine,
                            &mut self.form,
                            &mut self.task_list,
                            self.runtime.handle(),
                        );
                    });
                });
        }

        // ── Right panel: measurements and annotations ────────
        if self.panels.inspector {
            egui::SidePanel::right("inspector")
                .default_width(290.0)
                .width_range(200.0..=500.0)
                .resizable(true)
                .frame(
                    egui::Frame::side_top_panel(&ctx.style()).inner_margin(egui::Margin::same(6)),
                )
                .show(ctx, |ui| {
                    egui::ScrollArea::vertical().id_salt("inspector_scroll").show(ui, |ui| {
                        panels::inspector(ui, &mut self.engine);
                    });
                });
        }

        // ── Settings window ──────────────────────────────────
        panels::settings_window(ctx, &mut self.engine, &mut self.form, &mut self.panels);

        // ── Central panel: 3D viewport ───────────────────────
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                self.viewport.show(ui, &mut self.engine);
            });
    }
}
