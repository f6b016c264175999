//! Keyboard shortcut handling

use eframe::egui;

use super::Engine;
use crate::state::ActiveTool;
use crate::viewport::camera::ViewPreset;

const PRESET_KEYS: [egui::Key; 7] = [
    egui::Key::Num1,
    egui::Key::Num2,
    egui::Key::Num3,
    egui::Key::Num4,
    egui::Key::Num5,
    egui::Key::Num6,
    egui::Key::Num7,
];

/// Handle keyboard shortcuts for the viewer
pub fn handle_keyboard(ctx: &egui::Context, engine: &mut Engine) {
    // Don't handle shortcuts when a text field is focused
    if ctx.memory(|m| m.focused().is_some()) {
        return;
    }

    ctx.input(|i| {
        // Escape: drop pending points, or leave the active tool
        if i.key_pressed(egui::Key::Escape) {
            if engine.measurements().pending_points().is_empty() {
                engine.set_active_tool(ActiveTool::Camera);
            } else {
                engine.cancel_measurement();
            }
        }
        if i.key_pressed(egui::Key::Enter) {
            engine.finish_measurement();
        }
        if i.key_pressed(egui::Key::Backspace) {
            engine.undo_point();
        }
        for (key, preset) in PRESET_KEYS.iter().zip(ViewPreset::all()) {
            if i.key_pressed(*key) && !i.modifiers.command {
                engine.apply_preset(*preset);
            }
        }
        if i.key_pressed(egui::Key::F) && !i.modifiers.command {
            engine.fit_to_asset();
        }
        if i.key_pressed(egui::Key::R) && !i.modifiers.command {
            engine.reset_camera();
        }
    });
}
