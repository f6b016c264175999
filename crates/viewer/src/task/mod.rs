pub mod client;
pub mod poller;

pub use client::{resolve_against, HttpTaskClient, TaskBackend};
pub use poller::{PollConfig, TaskController};
