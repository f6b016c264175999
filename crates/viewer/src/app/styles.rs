//! Application style configuration

use eframe::egui;

const FONT_SIZE: f32 = 13.5;

/// Configure the dark viewer theme
pub fn configure_styles(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();

    style.visuals = egui::Visuals::dark();

    // Rounding
    style.visuals.window_corner_radius = egui::CornerRadius::same(6);
    style.visuals.menu_corner_radius = egui::CornerRadius::same(4);
    style.visuals.widgets.inactive.corner_radius = egui::CornerRadius::same(3);
    style.visuals.widgets.hovered.corner_radius = egui::CornerRadius::same(3);
    style.visuals.widgets.active.corner_radius = egui::CornerRadius::same(3);

    // Spacing
    style.spacing.item_spacing = egui::vec2(6.0, 4.0);
    style.spacing.button_padding = egui::vec2(6.0, 3.0);

    // Panels a shade lighter than the viewport background
    style.visuals.panel_fill = egui::Color32::from_rgb(38, 38, 44);
    style.visuals.window_fill = egui::Color32::from_rgb(42, 42, 48);
    style.visuals.selection.bg_fill = egui::Color32::from_rgb(40, 90, 150);

    let sizes = [
        (egui::TextStyle::Body, egui::FontId::proportional(FONT_SIZE)),
        (egui::TextStyle::Button, egui::FontId::proportional(FONT_SIZE)),
        (egui::TextStyle::Small, egui::FontId::proportional(FONT_SIZE * 0.85)),
        (egui::TextStyle::Heading, egui::FontId::proportional(FONT_SIZE * 1.3)),
        (egui::TextStyle::Monospace, egui::FontId::monospace(FONT_SIZE)),
    ];
    style.text_styles.extend(sizes);

    ctx.set_style(style);
}
