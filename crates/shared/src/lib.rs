//! Wire contract shared by the viewer and the reconstruction backend.
//!
//! Field names follow the task-status contract (`modelUrl`, `boundingBox`),
//! with snake_case aliases accepted for payloads produced by older backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a reconstruction task
pub type TaskId = String;

/// Lifecycle status reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// `completed` and `failed` accept no further updates
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned box as reported in result metadata
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

/// Optional statistics about the produced model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertices: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faces: Option<u64>,
    #[serde(default, alias = "bounding_box", skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

/// Where to find the renderable result of a completed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDescriptor {
    #[serde(alias = "model_url", alias = "model_path")]
    pub model_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResultMetadata>,
    #[serde(default, alias = "thumbnail_path", skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl ResultDescriptor {
    pub fn new(model_url: impl Into<String>) -> Self {
        Self {
            model_url: model_url.into(),
            metadata: None,
            thumbnail_url: None,
        }
    }
}

/// Response body of the status endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    #[serde(default, alias = "taskId", skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<ResultDescriptor>,
}

impl TaskStatusResponse {
    pub fn new(status: TaskStatus, progress: f64, message: impl Into<String>) -> Self {
        Self {
            task_id: None,
            status,
            progress,
            message: Some(message.into()),
            result: None,
        }
    }

    pub fn with_result(mut self, result: ResultDescriptor) -> Self {
        self.result = Some(result);
        self
    }
}

/// Reconstruction algorithm requested for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructionMethod {
    #[default]
    Nerf,
    GaussianSplatting,
}

impl ReconstructionMethod {
    pub fn display_name(&self) -> &'static str {
        match self {
            ReconstructionMethod::Nerf => "NeRF",
            ReconstructionMethod::GaussianSplatting => "Gaussian Splatting",
        }
    }

    pub fn all() -> &'static [ReconstructionMethod] {
        &[ReconstructionMethod::Nerf, ReconstructionMethod::GaussianSplatting]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionLevel {
    Low,
    #[default]
    Standard,
    High,
}

impl QualityLevel {
    pub fn all() -> &'static [QualityLevel] {
        &[QualityLevel::Low, QualityLevel::Medium, QualityLevel::High]
    }

    pub fn label(&self) -> &'static str {
        match self {
            QualityLevel::Low => "Low",
            QualityLevel::Medium => "Medium",
            QualityLevel::High => "High",
        }
    }
}

impl ResolutionLevel {
    pub fn all() -> &'static [ResolutionLevel] {
        &[ResolutionLevel::Low, ResolutionLevel::Standard, ResolutionLevel::High]
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResolutionLevel::Low => "Low",
            ResolutionLevel::Standard => "Standard",
            ResolutionLevel::High => "High",
        }
    }
}

/// Body of the task creation endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub file_ids: Vec<String>,
    #[serde(default)]
    pub method: ReconstructionMethod,
    #[serde(default)]
    pub quality: QualityLevel,
    #[serde(default)]
    pub resolution: ResolutionLevel,
}

/// Payload of a successful creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedTask {
    pub task_id: TaskId,
}

/// Envelope used by the mutating endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Row of the task list endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub method: ReconstructionMethod,
    pub quality: QualityLevel,
    pub resolution: ResolutionLevel,
    pub status: TaskStatus,
    pub progress: f64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub file_ids: Vec<String>,
}

/// Timestamps in RFC 3339, or naive ISO 8601 read as UTC
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer};

    fn parse<E: Error>(s: &str) -> Result<DateTime<Utc>, E> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| E::custom(format!("invalid timestamp {s:?}: {e}")))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(d)?;
        parse(&s)
    }

    pub fn deserialize_opt<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(s) => parse(&s).map(Some),
            None => Ok(None),
        }
    }
}

/// Endpoint paths, relative to the backend base URL
pub mod api {
    pub const HEALTH: &str = "/api/health";
    pub const CREATE_TASK: &str = "/api/v1/reconstruction/create";
    pub const LIST_TASKS: &str = "/api/v1/reconstruction/tasks";

    pub fn status_path(task_id: &str) -> String {
        format!("/api/v1/reconstruction/status/{task_id}")
    }

    pub fn task_path(task_id: &str) -> String {
        format!("/api/v1/reconstruction/tasks/{task_id}")
    }

    pub fn restart_path(task_id: &str) -> String {
        format!("/api/v1/reconstruction/tasks/{task_id}/restart")
    }
}
