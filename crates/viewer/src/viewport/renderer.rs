//! Scene rendering with egui's painter.
//!
//! Triangles (asset faces and marker octahedra) are depth-sorted back to
//! front and flat-shaded with a headlight. Point clouds become small screen
//! quads, sampled above a cap. Measurement lines and labels are drawn as
//! overlays on top.

use egui::epaint::{Mesh, Vertex, WHITE_UV};
use egui::{Align2, Color32, FontId, Pos2, Rect, Shape, Stroke, Ui};
use glam::{Mat4, Vec3};

use super::camera::CameraController;
use super::scene::{NodeKind, NodeView};
use crate::app::Engine;
use crate::asset::Topology;
use crate::geometry::{ndc_to_screen, world_to_ndc};
use crate::state::{AnnotationShape, MeasurementKind};

const MAX_TRIANGLES: usize = 150_000;
const MAX_POINTS: usize = 120_000;
const GRID_COLOR: Color32 = Color32::from_rgb(62, 62, 70);
const PENDING_COLOR: Color32 = Color32::from_rgb(255, 230, 50);

/// World to screen projection for one frame
struct Projector {
    view_proj: Mat4,
    rect: Rect,
}

impl Projector {
    fn new(camera: &CameraController, rect: Rect) -> Self {
        let aspect = rect.width() / rect.height().max(1.0);
        Self {
            view_proj: camera.view_projection(aspect),
            rect,
        }
    }

    /// Screen position and NDC depth
    fn project(&self, p: Vec3) -> Option<(Pos2, f32)> {
        let ndc = world_to_ndc(&self.view_proj, p)?;
        let s = ndc_to_screen(
            ndc.truncate(),
            glam::Vec2::new(self.rect.min.x, self.rect.min.y),
            glam::Vec2::new(self.rect.width(), self.rect.height()),
        );
        Some((Pos2::new(s.x, s.y), ndc.z))
    }

    fn screen(&self, p: Vec3) -> Option<Pos2> {
        self.project(p).map(|(s, _)| s)
    }
}

fn to_color32(c: [f32; 3], shade: f32) -> Color32 {
    let ch = |v: f32| ((v * shade).clamp(0.0, 1.0) * 255.0) as u8;
    Color32::from_rgb(ch(c[0]), ch(c[1]), ch(c[2]))
}

fn rgb(c: [f32; 3]) -> Color32 {
    to_color32(c, 1.0)
}

/// Paint the viewport: background, grid, asset, markers, overlays
pub fn paint_viewport(ui: &Ui, rect: Rect, engine: &Engine) {
    let painter = ui.painter_at(rect);
    let settings = engine.settings();

    let bg = settings.viewport.background_color;
    painter.rect_filled(rect, 0.0, Color32::from_rgb(bg[0], bg[1], bg[2]));

    let camera = engine.camera();
    let proj = Projector::new(camera, rect);
    let eye = camera.eye_position();

    let mut triangles = Vec::new();
    for node in engine.scene().nodes().filter(|n| n.visible) {
        match &node.geometry.topology {
            Topology::Lines(indices) => draw_lines(&painter, &proj, &node, indices),
            Topology::Triangles(_) => collect_triangles(&proj, eye, &node, &mut triangles),
            Topology::Points => draw_points(&painter, &proj, &node, settings.scene.point_size),
        }
    }
    paint_triangles(&painter, triangles);

    draw_measurements(&painter, &proj, engine);
    draw_annotations(&painter, &proj, engine);
    draw_axes(&painter, rect, camera);

    if engine.asset().is_none() {
        painter.text(
            rect.center(),
            Align2::CENTER_CENTER,
            engine.status().label(),
            FontId::proportional(16.0),
            Color32::from_gray(150),
        );
    }
}

fn draw_lines(painter: &egui::Painter, proj: &Projector, node: &NodeView<'_>, indices: &[u32]) {
    let stroke = Stroke::new(0.6, GRID_COLOR);
    let positions = &node.geometry.positions;
    for pair in indices.chunks_exact(2) {
        let (Some(a), Some(b)) = (
            positions.get(pair[0] as usize).and_then(|p| proj.screen(*p)),
            positions.get(pair[1] as usize).and_then(|p| proj.screen(*p)),
        ) else {
            continue;
        };
        painter.line_segment([a, b], stroke);
    }
}

struct ScreenTriangle {
    corners: [Pos2; 3],
    depth: f32,
    color: Color32,
}

fn collect_triangles(proj: &Projector, eye: Vec3, node: &NodeView<'_>, out: &mut Vec<ScreenTriangle>) {
    let g = node.geometry;
    let count = g.triangle_count();
    let stride = count / MAX_TRIANGLES + 1;
    // Markers stay fully lit so they read against the model
    let is_marker = !matches!(node.kind, NodeKind::Asset);

    for tri in (0..count).step_by(stride) {
        let Some([a, b, c]) = g.triangle(tri) else {
            continue;
        };
        let (Some((pa, da)), Some((pb, db)), Some((pc, dc))) =
            (proj.project(a), proj.project(b), proj.project(c))
        else {
            continue;
        };

        let centroid = (a + b + c) / 3.0;
        let normal = (b - a).cross(c - a).normalize_or_zero();
        let to_eye = (eye - centroid).normalize_or_zero();
        let shade = if is_marker {
            1.0
        } else {
            0.3 + 0.7 * normal.dot(to_eye).abs()
        };

        let base = match g.topology {
            Topology::Triangles(ref idx) => {
                let avg = |k: usize| {
                    let sum: f32 = idx[tri * 3..tri * 3 + 3]
                        .iter()
                        .filter_map(|&i| g.colors.get(i as usize))
                        .map(|c| c[k])
                        .sum();
                    sum / 3.0
                };
                [avg(0), avg(1), avg(2)]
            }
            _ => crate::asset::DEFAULT_COLOR,
        };

        out.push(ScreenTriangle {
            corners: [pa, pb, pc],
            depth: (da + db + dc) / 3.0,
            color: to_color32(base, shade),
        });
    }
}

/// Painter's algorithm: farthest first
fn paint_triangles(painter: &egui::Painter, mut triangles: Vec<ScreenTriangle>) {
    if triangles.is_empty() {
        return;
    }
    triangles.sort_by(|a, b| b.depth.total_cmp(&a.depth));

    let mut mesh = Mesh::default();
    for t in &triangles {
        let base = mesh.vertices.len() as u32;
        for p in t.corners {
            mesh.vertices.push(Vertex {
                pos: p,
                uv: WHITE_UV,
                color: t.color,
            });
        }
        mesh.add_triangle(base, base + 1, base + 2);
    }
    painter.add(Shape::mesh(mesh));
}

fn draw_points(painter: &egui::Painter, proj: &Projector, node: &NodeView<'_>, point_size: f32) {
    let g = node.geometry;
    let stride = g.vertex_count() / MAX_POINTS + 1;
    let half = (point_size * 0.5).max(0.5);

    let mut mesh = Mesh::default();
    for i in (0..g.vertex_count()).step_by(stride) {
        let Some(s) = proj.screen(g.positions[i]) else {
            continue;
        };
        let color = g.colors.get(i).map_or(Color32::LIGHT_GRAY, |c| rgb(*c));
        mesh.add_colored_rect(Rect::from_center_size(s, egui::vec2(half * 2.0, half * 2.0)), color);
    }
    painter.add(Shape::mesh(mesh));
}

fn draw_label(painter: &egui::Painter, pos: Pos2, text: &str, color: Color32) {
    let galley = painter.layout_no_wrap(text.to_string(), FontId::proportional(13.0), color);
    let rect = Align2::CENTER_BOTTOM
        .anchor_size(pos - egui::vec2(0.0, 6.0), galley.size())
        .expand(3.0);
    painter.rect_filled(rect, 3.0, Color32::from_black_alpha(170));
    painter.galley(rect.min + egui::vec2(3.0, 3.0), galley, color);
}

fn draw_measurements(painter: &egui::Painter, proj: &Projector, engine: &Engine) {
    for m in engine.measurements().measurements().iter().filter(|m| m.visible) {
        let color = rgb(m.color);
        let stroke = Stroke::new(2.0, color);
        let screen: Vec<Pos2> = m.points.iter().filter_map(|p| proj.screen(*p)).collect();
        if screen.len() != m.points.len() {
            continue;
        }

        match m.kind {
            MeasurementKind::Area => {
                painter.add(Shape::closed_line(screen.clone(), stroke));
            }
            MeasurementKind::Volume => {
                // Hull edges are not stored; connect every pair
                for (i, a) in screen.iter().enumerate() {
                    for b in &screen[i + 1..] {
                        painter.line_segment([*a, *b], Stroke::new(1.0, color.gamma_multiply(0.6)));
                    }
                }
            }
            MeasurementKind::Distance | MeasurementKind::Angle => {
                painter.add(Shape::line(screen.clone(), stroke));
            }
        }

        let anchor = match m.kind {
            MeasurementKind::Angle => screen[1],
            _ => {
                let sum = screen.iter().fold(egui::Vec2::ZERO, |acc, p| acc + p.to_vec2());
                (sum / screen.len() as f32).to_pos2()
            }
        };
        draw_label(painter, anchor, &m.label, Color32::WHITE);
    }

    let pending = engine.measurements().pending_points();
    let screen: Vec<Pos2> = pending.iter().filter_map(|p| proj.screen(*p)).collect();
    for w in screen.windows(2) {
        draw_dashed_line_2d(painter, w[0], w[1], Stroke::new(1.5, PENDING_COLOR), 6.0);
    }
    for p in &screen {
        painter.circle_stroke(*p, 5.0, Stroke::new(1.5, PENDING_COLOR));
    }
}

fn draw_annotations(painter: &egui::Painter, proj: &Projector, engine: &Engine) {
    for a in engine.annotations().annotations().iter().filter(|a| a.visible) {
        let Some(p) = proj.screen(a.position) else {
            continue;
        };
        let color = rgb(a.color);
        match a.shape {
            AnnotationShape::Point => {
                painter.circle_filled(p, 4.0, color);
                draw_label(painter, p, &a.text, color);
            }
            AnnotationShape::Text => draw_label(painter, p + egui::vec2(0.0, 6.0), &a.text, color),
            AnnotationShape::Arrow => {
                let label_pos = p + egui::vec2(40.0, -40.0);
                painter.arrow(label_pos, p - label_pos, Stroke::new(1.5, color));
                draw_label(painter, label_pos, &a.text, color);
            }
        }
    }
}

/// Orientation triad in the lower-left corner
fn draw_axes(painter: &egui::Painter, rect: Rect, camera: &CameraController) {
    let origin = Pos2::new(rect.min.x + 40.0, rect.max.y - 40.0);
    let view = camera.view_matrix();
    let len = 28.0;
    let axes = [
        (Vec3::X, "X", Color32::from_rgb(220, 50, 50)),
        (Vec3::Y, "Y", Color32::from_rgb(50, 200, 50)),
        (Vec3::Z, "Z", Color32::from_rgb(50, 100, 220)),
    ];
    for (dir, name, color) in axes {
        let d = view.transform_vector3(dir);
        let tip = origin + egui::vec2(d.x, -d.y) * len;
        painter.line_segment([origin, tip], Stroke::new(2.0, color));
        painter.text(tip, Align2::LEFT_BOTTOM, name, FontId::monospace(10.0), color);
    }
}

fn draw_dashed_line_2d(
    painter: &egui::Painter,
    pa: Pos2,
    pb: Pos2,
    stroke: Stroke,
    dash_length: f32,
) {
    let dir = pb - pa;
    let total = dir.length();
    if total < 0.001 {
        return;
    }
    let unit = dir / total;
    let mut t = 0.0;
    let mut draw = true;
    while t < total {
        let seg_end = (t + dash_length).min(total);
        if draw {
            painter.line_segment([pa + unit * t, pa + unit * seg_end], stroke);
        }
        t = seg_end;
        draw = !draw;
    }
}
