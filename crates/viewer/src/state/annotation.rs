use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::measurement::PALETTE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationShape {
    #[default]
    Point,
    Text,
    Arrow,
}

impl AnnotationShape {
    pub fn all() -> &'static [AnnotationShape] {
        &[Self::Point, Self::Text, Self::Arrow]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::Text => "Text",
            Self::Arrow => "Arrow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub id: Uuid,
    pub position: Vec3,
    pub text: String,
    pub color: [f32; 3],
    pub shape: AnnotationShape,
    pub visible: bool,
}

/// Places labeled markers on picked points. Editing does not require the
/// tool to be armed.
#[derive(Debug, Clone, Default)]
pub struct AnnotationTool {
    armed: bool,
    shape: AnnotationShape,
    annotations: Vec<Annotation>,
    placed: usize,
}

impl AnnotationTool {
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn shape(&self) -> AnnotationShape {
        self.shape
    }

    pub fn set_shape(&mut self, shape: AnnotationShape) {
        self.shape = shape;
    }

    /// Create an annotation at `point` when armed
    pub fn place(&mut self, point: Vec3) -> Option<Uuid> {
        if !self.armed {
            return None;
        }
        self.placed += 1;
        let annotation = Annotation {
            id: Uuid::new_v4(),
            position: point,
            text: format!("Annotation {}", self.placed),
            color: PALETTE[(self.placed - 1) % PALETTE.len()],
            shape: self.shape,
            visible: true,
        };
        debug!(id = %annotation.id, "Annotation placed");
        let id = annotation.id;
        self.annotations.push(annotation);
        Some(id)
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn get(&self, id: Uuid) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    fn find_mut(&mut self, id: Uuid) -> Option<&mut Annotation> {
        self.annotations.iter_mut().find(|a| a.id == id)
    }

    pub fn set_text(&mut self, id: Uuid, text: impl Into<String>) -> bool {
        match self.find_mut(id) {
            Some(a) => {
                a.text = text.into();
                true
            }
            None => false,
        }
    }

    pub fn toggle_visibility(&mut self, id: Uuid) -> bool {
        match self.find_mut(id) {
            Some(a) => {
                a.visible = !a.visible;
                true
            }
            None => false,
        }
    }

    pub fn set_visible(&mut self, id: Uuid, visible: bool) -> bool {
        match self.find_mut(id) {
            Some(a) => {
                a.visible = visible;
                true
            }
            None => false,
        }
    }

    /// Remove by id; unknown ids are a no-op returning `false`
    pub fn delete(&mut self, id: Uuid) -> bool {
        let before = self.annotations.len();
        self.annotations.retain(|a| a.id != id);
        self.annotations.len() != before
    }

    pub fn clear(&mut self) {
        self.annotations.clear();
        self.placed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_when_armed() {
        let mut t = AnnotationTool::default();
        assert!(t.place(Vec3::ZERO).is_none());
        t.arm();
        t.set_shape(AnnotationShape::Arrow);
        let a = t.place(Vec3::X).unwrap();
        let b = t.place(Vec3::Y).unwrap();
        assert_eq!(t.get(a).unwrap().text, "Annotation 1");
        assert_eq!(t.get(b).unwrap().text, "Annotation 2");
        assert_eq!(t.get(b).unwrap().shape, AnnotationShape::Arrow);
        assert!(t.is_armed());
    }

    #[test]
    fn test_edit_without_arming() {
        let mut t = AnnotationTool::default();
        t.arm();
        let id = t.place(Vec3::ZERO).unwrap();
        t.disarm();
        assert!(t.set_text(id, "Crack"));
        assert_eq!(t.get(id).unwrap().text, "Crack");
        assert!(t.toggle_visibility(id));
        assert!(!t.get(id).unwrap().visible);
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let mut t = AnnotationTool::default();
        t.arm();
        t.place(Vec3::ZERO);
        let before = t.annotations().to_vec();
        assert!(!t.delete(Uuid::new_v4()));
        assert!(!t.set_text(Uuid::new_v4(), "x"));
        assert_eq!(t.annotations(), before.as_slice());
    }

    #[test]
    fn test_delete_and_clear() {
        let mut t = AnnotationTool::default();
        t.arm();
        let id = t.place(Vec3::ZERO).unwrap();
        t.place(Vec3::ONE);
        assert!(t.delete(id));
        assert!(!t.delete(id));
        assert_eq!(t.annotations().len(), 1);
        t.clear();
        assert!(t.annotations().is_empty());
        let next = t.place(Vec3::ZERO).unwrap();
        assert_eq!(t.get(next).unwrap().text, "Annotation 1");
    }
}
