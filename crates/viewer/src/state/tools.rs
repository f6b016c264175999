use serde::{Deserialize, Serialize};

use super::measurement::MeasurementKind;

/// The single tool that interprets pointer clicks. Drags always move the
/// camera regardless of the active tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "tool", content = "kind", rename_all = "snake_case")]
pub enum ActiveTool {
    #[default]
    Camera,
    Measure(MeasurementKind),
    Annotate,
}

impl ActiveTool {
    pub fn label(&self) -> &'static str {
        match self {
            ActiveTool::Camera => "Camera",
            ActiveTool::Measure(kind) => kind.label(),
            ActiveTool::Annotate => "Annotate",
        }
    }

    /// Whether clicks are turned into picks
    pub fn picks(&self) -> bool {
        !matches!(self, ActiveTool::Camera)
    }
}
