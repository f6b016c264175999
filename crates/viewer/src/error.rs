//! Error types surfaced by the loader, the task poller and the export path.

use thiserror::Error;

/// Why an asset could not become a `SceneAsset`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    /// Format could not be resolved from the hint or the URL extension.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    /// Fetch failed, timed out, or returned a non-success status.
    #[error("network failure: {0}")]
    NetworkFailure(String),
    /// Bytes were fetched but do not decode into valid geometry.
    #[error("malformed asset: {0}")]
    MalformedAsset(String),
}

impl LoadError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        LoadError::MalformedAsset(msg.into())
    }
}

/// Failure of a single backend request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PollError {
    /// Connection refused, timeout, DNS, 5xx. Retried on the next tick.
    #[error("transport error: {0}")]
    Transport(String),
    /// Response body did not match the status contract.
    #[error("invalid response: {0}")]
    Decode(String),
    /// Backend answered with an explicit rejection (4xx, `success: false`).
    #[error("backend error: {0}")]
    Backend(String),
}

impl PollError {
    /// Transport and decode problems are treated as transient poll failures
    pub fn is_transient(&self) -> bool {
        matches!(self, PollError::Transport(_) | PollError::Decode(_))
    }
}

impl From<reqwest::Error> for PollError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PollError::Decode(e.to_string())
        } else if let Some(status) = e.status().filter(|s| s.is_client_error()) {
            PollError::Backend(format!("HTTP {status}"))
        } else {
            PollError::Transport(e.to_string())
        }
    }
}

/// Frame capture and report export failures
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("captured frame has inconsistent size {0}x{1}")]
    FrameSize(usize, usize),
}

/// Agent command could not be parsed
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("invalid command JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
