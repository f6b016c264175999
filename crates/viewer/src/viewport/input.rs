//! Pointer gesture recognition: raw press/move/release/scroll events become
//! clicks, drags and scrolls. A press that moves more than the threshold is a
//! drag; a release without crossing it is a click.

use glam::Vec2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

/// Host-normalized pointer input; positions are viewport pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Pressed { button: PointerButton, pos: Vec2 },
    Moved { pos: Vec2 },
    Released { button: PointerButton, pos: Vec2 },
    /// Positive scrolls toward the scene
    Scrolled { delta: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    Click { button: PointerButton, pos: Vec2 },
    Drag { button: PointerButton, delta: Vec2 },
    DragEnd { button: PointerButton },
    Scroll { delta: f32 },
}

#[derive(Debug, Clone, Copy)]
struct Press {
    button: PointerButton,
    origin: Vec2,
    last: Vec2,
    dragging: bool,
}

#[derive(Debug, Clone)]
pub struct PointerTracker {
    threshold: f32,
    press: Option<Press>,
}

impl Default for PointerTracker {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl PointerTracker {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            press: None,
        }
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold.max(0.0);
    }

    pub fn is_dragging(&self) -> bool {
        self.press.is_some_and(|p| p.dragging)
    }

    pub fn handle(&mut self, event: PointerEvent) -> Option<Gesture> {
        match event {
            PointerEvent::Pressed { button, pos } => {
                self.press = Some(Press {
                    button,
                    origin: pos,
                    last: pos,
                    dragging: false,
                });
                None
            }
            PointerEvent::Moved { pos } => {
                let press = self.press.as_mut()?;
                if !press.dragging {
                    if pos.distance(press.origin) <= self.threshold {
                        return None;
                    }
                    press.dragging = true;
                }
                let delta = pos - press.last;
                press.last = pos;
                Some(Gesture::Drag {
                    button: press.button,
                    delta,
                })
            }
            PointerEvent::Released { button, pos } => {
                let press = self.press.filter(|p| p.button == button)?;
                self.press = None;
                if press.dragging || pos.distance(press.origin) > self.threshold {
                    Some(Gesture::DragEnd { button })
                } else {
                    Some(Gesture::Click { button, pos })
                }
            }
            PointerEvent::Scrolled { delta } => Some(Gesture::Scroll { delta }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(x: f32, y: f32) -> PointerEvent {
        PointerEvent::Pressed {
            button: PointerButton::Primary,
            pos: Vec2::new(x, y),
        }
    }

    fn release(x: f32, y: f32) -> PointerEvent {
        PointerEvent::Released {
            button: PointerButton::Primary,
            pos: Vec2::new(x, y),
        }
    }

    #[test]
    fn test_click_within_threshold() {
        let mut t = PointerTracker::new(4.0);
        assert_eq!(t.handle(press(10.0, 10.0)), None);
        assert_eq!(t.handle(PointerEvent::Moved { pos: Vec2::new(12.0, 11.0) }), None);
        assert_eq!(
            t.handle(release(12.0, 11.0)),
            Some(Gesture::Click {
                button: PointerButton::Primary,
                pos: Vec2::new(12.0, 11.0)
            })
        );
    }

    #[test]
    fn test_drag_beyond_threshold() {
        let mut t = PointerTracker::new(4.0);
        t.handle(press(0.0, 0.0));
        let g = t.handle(PointerEvent::Moved { pos: Vec2::new(10.0, 0.0) });
        assert_eq!(
            g,
            Some(Gesture::Drag {
                button: PointerButton::Primary,
                delta: Vec2::new(10.0, 0.0)
            })
        );
        assert!(t.is_dragging());
        let g = t.handle(PointerEvent::Moved { pos: Vec2::new(12.0, 1.0) });
        assert_eq!(
            g,
            Some(Gesture::Drag {
                button: PointerButton::Primary,
                delta: Vec2::new(2.0, 1.0)
            })
        );
        // Coming back near the origin is still a drag, never a click
        t.handle(PointerEvent::Moved { pos: Vec2::new(1.0, 0.0) });
        assert_eq!(
            t.handle(release(1.0, 0.0)),
            Some(Gesture::DragEnd {
                button: PointerButton::Primary
            })
        );
    }

    #[test]
    fn test_mismatched_release_ignored() {
        let mut t = PointerTracker::default();
        t.handle(press(0.0, 0.0));
        let g = t.handle(PointerEvent::Released {
            button: PointerButton::Secondary,
            pos: Vec2::ZERO,
        });
        assert_eq!(g, None);
        assert!(t.handle(release(0.0, 0.0)).is_some());
    }

    #[test]
    fn test_move_without_press() {
        let mut t = PointerTracker::default();
        assert_eq!(t.handle(PointerEvent::Moved { pos: Vec2::ONE }), None);
        assert_eq!(
            t.handle(PointerEvent::Scrolled { delta: 0.5 }),
            Some(Gesture::Scroll { delta: 0.5 })
        );
    }
}
