// Library crate: exposes the viewer engine for integration tests and the agent interface.
// GUI-specific modules (app, viewport rendering) remain in the binary crate.

pub mod asset;
pub mod command;
pub mod engine;
pub mod error;
pub mod export;
pub mod fixtures;
pub mod geometry;
pub mod harness;
pub mod loader;
pub mod state;
pub mod task;
pub mod validation;

/// Camera, scene graph, picking and pointer handling. The painter-based
/// renderer stays in the binary crate.
pub mod viewport {
    pub mod camera;
    pub mod input;
    pub mod picking;
    pub mod scene;
}
