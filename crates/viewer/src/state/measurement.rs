//! Measurement tool: collects picked points and emits distance, angle, area
//! and volume measurements once a kind's arity is satisfied.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::settings::Units;
use crate::geometry;

/// Colors assigned to measurements in creation order
pub const PALETTE: [[f32; 3]; 6] = [
    [1.0, 0.62, 0.1],
    [0.2, 0.8, 1.0],
    [0.55, 0.9, 0.3],
    [1.0, 0.35, 0.55],
    [0.75, 0.55, 1.0],
    [1.0, 0.9, 0.25],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementKind {
    Distance,
    Angle,
    Area,
    Volume,
}

/// How many points a kind needs before it can be emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Emitted as soon as the count is reached
    Exactly(usize),
    /// Emitted by an explicit finish once the minimum is reached
    AtLeast(usize),
}

impl MeasurementKind {
    pub fn all() -> &'static [MeasurementKind] {
        &[Self::Distance, Self::Angle, Self::Area, Self::Volume]
    }

    pub fn arity(&self) -> Arity {
        match self {
            Self::Distance => Arity::Exactly(2),
            Self::Angle => Arity::Exactly(3),
            Self::Area => Arity::AtLeast(3),
            Self::Volume => Arity::AtLeast(4),
        }
    }

    pub fn min_points(&self) -> usize {
        match self.arity() {
            Arity::Exactly(n) | Arity::AtLeast(n) => n,
        }
    }

    /// Exponent applied to the length scale (0 for angles)
    pub fn unit_power(&self) -> i32 {
        match self {
            Self::Distance => 1,
            Self::Angle => 0,
            Self::Area => 2,
            Self::Volume => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Distance => "Distance",
            Self::Angle => "Angle",
            Self::Area => "Area",
            Self::Volume => "Volume",
        }
    }

    pub fn unit_suffix(&self, units: Units) -> String {
        let abbrev = units.abbrev();
        match self {
            Self::Distance => abbrev.to_string(),
            Self::Angle => "°".to_string(),
            Self::Area => format!("{abbrev}²"),
            Self::Volume => format!("{abbrev}³"),
        }
    }
}

/// Conversion from normalized world space to display units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitFormat {
    pub units: Units,
    /// `scale_factor / asset_scale`
    pub units_per_world: f64,
    pub precision: usize,
}

impl Default for UnitFormat {
    fn default() -> Self {
        Self {
            units: Units::Millimeters,
            units_per_world: 1.0,
            precision: 2,
        }
    }
}

impl UnitFormat {
    pub fn to_display(&self, kind: MeasurementKind, world_value: f64) -> f64 {
        world_value * self.units_per_world.powi(kind.unit_power())
    }

    pub fn format(&self, kind: MeasurementKind, display_value: f64) -> String {
        let suffix = kind.unit_suffix(self.units);
        match kind {
            MeasurementKind::Angle => format!("{:.*}{}", self.precision, display_value, suffix),
            _ => format!("{:.*} {}", self.precision, display_value, suffix),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub id: Uuid,
    pub kind: MeasurementKind,
    pub points: Vec<Vec3>,
    /// Raw value in normalized world units (degrees for angles)
    pub world_value: f64,
    /// Value in display units
    pub value: f64,
    pub unit: String,
    pub label: String,
    pub color: [f32; 3],
    pub visible: bool,
}

impl Measurement {
    fn relabel(&mut self, format: &UnitFormat) {
        self.value = format.to_display(self.kind, self.world_value);
        self.unit = self.kind.unit_suffix(format.units);
        self.label = format.format(self.kind, self.value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementPhase {
    Idle,
    Collecting { collected: usize },
}

#[derive(Debug, Clone)]
pub struct MeasurementTool {
    armed: bool,
    kind: MeasurementKind,
    pending: Vec<Vec3>,
    measurements: Vec<Measurement>,
    format: UnitFormat,
    next_color: usize,
}

impl Default for MeasurementTool {
    fn default() -> Self {
        Self {
            armed: false,
            kind: MeasurementKind::Distance,
            pending: Vec::new(),
            measurements: Vec::new(),
            format: UnitFormat::default(),
            next_color: 0,
        }
    }
}

impl MeasurementTool {
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn arm(&mut self, kind: MeasurementKind) {
        self.set_kind(kind);
        self.armed = true;
    }

    /// Stop accepting picks; the partial sequence is discarded
    pub fn disarm(&mut self) {
        self.armed = false;
        self.cancel();
    }

    pub fn kind(&self) -> MeasurementKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: MeasurementKind) {
        if kind != self.kind {
            self.cancel();
            self.kind = kind;
        }
    }

    pub fn phase(&self) -> MeasurementPhase {
        if self.pending.is_empty() {
            MeasurementPhase::Idle
        } else {
            MeasurementPhase::Collecting {
                collected: self.pending.len(),
            }
        }
    }

    pub fn pending_points(&self) -> &[Vec3] {
        &self.pending
    }

    /// True when `finish` would be accepted
    pub fn can_finish(&self) -> bool {
        matches!(self.kind.arity(), Arity::AtLeast(n) if self.pending.len() >= n)
    }

    /// Append a picked point. Returns the id of a measurement emitted by
    /// reaching a fixed arity.
    pub fn add_point(&mut self, point: Vec3) -> Option<Uuid> {
        if !self.armed {
            return None;
        }
        self.pending.push(point);
        match self.kind.arity() {
            Arity::Exactly(n) if self.pending.len() >= n => {
                let id = self.emit();
                if id.is_none() {
                    // Degenerate fixed-arity input cannot be extended; start over
                    debug!(kind = ?self.kind, "Discarding degenerate measurement");
                    self.pending.clear();
                }
                id
            }
            _ => None,
        }
    }

    /// Complete an area or volume measurement. Degenerate input (such as
    /// coplanar volume points) is not emitted and collection continues.
    pub fn finish(&mut self) -> Option<Uuid> {
        if !self.armed || !self.can_finish() {
            return None;
        }
        self.emit()
    }

    pub fn undo_point(&mut self) -> bool {
        self.pending.pop().is_some()
    }

    /// Discard the partial sequence
    pub fn cancel(&mut self) {
        self.pending.clear();
    }

    fn compute(&self) -> Option<f64> {
        let p = &self.pending;
        match self.kind {
            MeasurementKind::Distance => Some(geometry::distance(p[0], p[1]) as f64),
            MeasurementKind::Angle => geometry::angle_degrees(p[0], p[1], p[2]).map(f64::from),
            MeasurementKind::Area => Some(geometry::polygon_area(p) as f64),
            MeasurementKind::Volume => geometry::convex_hull_volume(p).map(f64::from),
        }
    }

    fn emit(&mut self) -> Option<Uuid> {
        let world_value = self.compute()?;
        let color = PALETTE[self.next_color % PALETTE.len()];
        self.next_color += 1;

        let mut m = Measurement {
            id: Uuid::new_v4(),
            kind: self.kind,
            points: std::mem::take(&mut self.pending),
            world_value,
            value: 0.0,
            unit: String::new(),
            label: String::new(),
            color,
            visible: true,
        };
        m.relabel(&self.format);
        debug!(id = %m.id, kind = ?m.kind, label = %m.label, "Measurement created");
        let id = m.id;
        self.measurements.push(m);
        Some(id)
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn get(&self, id: Uuid) -> Option<&Measurement> {
        self.measurements.iter().find(|m| m.id == id)
    }

    pub fn toggle_visibility(&mut self, id: Uuid) -> bool {
        match self.measurements.iter_mut().find(|m| m.id == id) {
            Some(m) => {
                m.visible = !m.visible;
                true
            }
            None => false,
        }
    }

    pub fn set_visible(&mut self, id: Uuid, visible: bool) -> bool {
        match self.measurements.iter_mut().find(|m| m.id == id) {
            Some(m) => {
                m.visible = visible;
                true
            }
            None => false,
        }
    }

    /// Remove by id; unknown ids are a no-op returning `false`
    pub fn delete(&mut self, id: Uuid) -> bool {
        let before = self.measurements.len();
        self.measurements.retain(|m| m.id != id);
        self.measurements.len() != before
    }

    /// Remove every measurement and the partial sequence
    pub fn clear(&mut self) {
        self.measurements.clear();
        self.pending.clear();
    }

    pub fn format(&self) -> UnitFormat {
        self.format
    }

    /// Change units or scale; existing values and labels are recomputed
    pub fn set_format(&mut self, format: UnitFormat) {
        self.format = format;
        for m in &mut self.measurements {
            m.relabel(&format);
        }
    }
}
