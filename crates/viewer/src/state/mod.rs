pub mod annotation;
pub mod measurement;
pub mod settings;
pub mod task;
pub mod tools;

pub use annotation::{Annotation, AnnotationShape, AnnotationTool};
pub use measurement::{
    Arity, Measurement, MeasurementKind, MeasurementPhase, MeasurementTool, UnitFormat,
};
pub use settings::{Units, ViewerSettings};
pub use task::{ReconstructionTask, TaskEvent};
pub use tools::ActiveTool;

/// Panel visibility flags
#[derive(Debug, Clone)]
pub struct PanelVisibility {
    pub task: bool,
    pub inspector: bool,
    pub settings: bool,
}

impl Default for PanelVisibility {
    fn default() -> Self {
        Self {
            task: true,
            inspector: true,
            settings: false,
        }
    }
}
