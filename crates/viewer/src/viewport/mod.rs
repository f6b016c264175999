//! 3D viewport panel: forwards pointer input to the engine and paints the scene

pub use recon_viewer_lib::viewport::{camera, input, scene};
mod renderer;

use egui::Ui;
use glam::Vec2;

use crate::app::Engine;
use crate::engine::ClickOutcome;
use input::{PointerButton, PointerEvent};

/// 3D viewport panel
#[derive(Default)]
pub struct ViewportPanel {
    /// Button held since a press inside the viewport
    held: Option<PointerButton>,
}

impl ViewportPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, ui: &mut Ui, engine: &mut Engine) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), egui::Sense::click_and_drag());
        engine.set_viewport_size(Vec2::new(rect.width(), rect.height()));

        self.forward_pointer(ui, rect, engine);

        if response.hovered() {
            let scroll = ui.input(|i| i.smooth_scroll_delta.y);
            if scroll.abs() > 0.1 {
                engine.handle_pointer(PointerEvent::Scrolled { delta: scroll });
            }
            if engine.active_tool().picks() {
                ui.ctx().set_cursor_icon(egui::CursorIcon::Crosshair);
            }
        }

        if !ui.is_rect_visible(rect) {
            return;
        }
        renderer::paint_viewport(ui, rect, engine);
    }

    /// Translate raw egui pointer events into viewport-local pointer events.
    /// Presses must start inside the viewport; moves and the release are
    /// followed outside it until the button comes up.
    fn forward_pointer(&mut self, ui: &Ui, rect: egui::Rect, engine: &mut Engine) {
        let events: Vec<egui::Event> = ui.input(|i| i.events.clone());
        for event in events {
            match event {
                egui::Event::PointerButton {
                    pos,
                    button,
                    pressed,
                    ..
                } => {
                    let Some(button) = map_button(button) else {
                        continue;
                    };
                    let local = to_local(pos, rect);
                    if pressed {
                        if self.held.is_some() || !rect.contains(pos) {
                            continue;
                        }
                        self.held = Some(button);
                        engine.handle_pointer(PointerEvent::Pressed { button, pos: local });
                    } else if self.held == Some(button) {
                        self.held = None;
                        let outcome = engine.handle_pointer(PointerEvent::Released { button, pos: local });
                        if let Some(outcome) = outcome {
                            log_click(outcome);
                        }
                    }
                }
                egui::Event::PointerMoved(pos) if self.held.is_some() => {
                    engine.handle_pointer(PointerEvent::Moved { pos: to_local(pos, rect) });
                }
                _ => {}
            }
        }
    }
}

fn map_button(button: egui::PointerButton) -> Option<PointerButton> {
    match button {
        egui::PointerButton::Primary => Some(PointerButton::Primary),
        egui::PointerButton::Secondary => Some(PointerButton::Secondary),
        egui::PointerButton::Middle => Some(PointerButton::Middle),
        _ => None,
    }
}

fn to_local(pos: egui::Pos2, rect: egui::Rect) -> Vec2 {
    Vec2::new(pos.x - rect.min.x, pos.y - rect.min.y)
}

fn log_click(outcome: ClickOutcome) {
    match outcome {
        ClickOutcome::MeasurementCreated { id } => tracing::info!(%id, "Measurement created"),
        ClickOutcome::AnnotationPlaced { id } => tracing::info!(%id, "Annotation placed"),
        ClickOutcome::Missed => tracing::debug!("Click hit nothing"),
        ClickOutcome::Ignored | ClickOutcome::PointAdded { .. } => {}
    }
}
