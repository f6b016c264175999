//! In-memory task store and the simulated reconstruction job

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shared::{
    CreateTaskRequest, ReconstructionMethod, ResultDescriptor, TaskId, TaskStatus,
    TaskStatusResponse, TaskSummary,
};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Progress checkpoints of the simulated pipeline
const STAGES: &[(f64, &str)] = &[
    (5.0, "Preparing data"),
    (15.0, "Extracting features"),
    (40.0, "Training model"),
    (80.0, "Exporting results"),
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub models_dir: PathBuf,
    /// Delay between simulated stages
    pub step: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            models_dir: PathBuf::from("./models"),
            step: Duration::from_millis(1500),
        }
    }
}

impl ServerConfig {
    /// Read `RECON_BIND`, `RECON_MODELS_DIR` and `RECON_STEP_MS`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(bind) = std::env::var("RECON_BIND") {
            config.bind = bind;
        }
        if let Ok(dir) = std::env::var("RECON_MODELS_DIR") {
            config.models_dir = PathBuf::from(dir);
        }
        if let Some(ms) = std::env::var("RECON_STEP_MS").ok().and_then(|v| v.parse().ok()) {
            config.step = Duration::from_millis(ms);
        }
        config
    }
}

struct TaskRecord {
    summary: TaskSummary,
    result: Option<ResultDescriptor>,
    job: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    tasks: Arc<RwLock<HashMap<TaskId, TaskRecord>>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a task and start its job
    pub async fn create(&self, request: CreateTaskRequest) -> TaskId {
        let id = uuid::Uuid::new_v4().to_string();
        let summary = TaskSummary {
            id: id.clone(),
            method: request.method,
            quality: request.quality,
            resolution: request.resolution,
            status: TaskStatus::Pending,
            progress: 0.0,
            message: Some("Queued".to_string()),
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
            file_ids: request.file_ids,
        };
        self.tasks.write().await.insert(
            id.clone(),
            TaskRecord {
                summary,
                result: None,
                job: None,
            },
        );
        self.spawn_job(&id).await;
        tracing::info!(task = %id, "Task created");
        id
    }

    pub async fn status(&self, id: &str) -> Option<TaskStatusResponse> {
        let tasks = self.tasks.read().await;
        let record = tasks.get(id)?;
        let s = &record.summary;
        let message = s
            .error_message
            .clone()
            .or_else(|| s.message.clone())
            .unwrap_or_default();
        let mut response = TaskStatusResponse::new(s.status, s.progress, message);
        response.task_id = Some(s.id.clone());
        response.result = record.result.clone();
        Some(response)
    }

    /// All tasks, newest first
    pub async fn list(&self) -> Vec<TaskSummary> {
        let mut list: Vec<TaskSummary> = self
            .tasks
            .read()
            .await
            .values()
            .map(|r| r.summary.clone())
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    /// Remove a task, stopping its job. `false` when unknown.
    pub async fn delete(&self, id: &str) -> bool {
        let Some(record) = self.tasks.write().await.remove(id) else {
            return false;
        };
        if let Some(job) = record.job {
            job.abort();
        }
        tracing::info!(task = %id, "Task deleted");
        true
    }

    /// Reset a task to pending and run its job again. `false` when unknown.
    pub async fn restart(&self, id: &str) -> bool {
        {
            let mut tasks = self.tasks.write().await;
            let Some(record) = tasks.get_mut(id) else {
                return false;
            };
            if let Some(job) = record.job.take() {
                job.abort();
            }
            record.result = None;
            let s = &mut record.summary;
            s.status = TaskStatus::Pending;
            s.progress = 0.0;
            s.message = Some("Queued".to_string());
            s.completed_at = None;
            s.error_message = None;
        }
        self.spawn_job(id).await;
        tracing::info!(task = %id, "Task restarted");
        true
    }

    async fn spawn_job(&self, id: &str) {
        let job = tokio::spawn(run_job(self.clone(), id.to_string()));
        match self.tasks.write().await.get_mut(id) {
            Some(record) => record.job = Some(job),
            None => job.abort(),
        }
    }

    /// Apply `f` to the task's summary. `false` once the task is gone.
    async fn update(&self, id: &str, f: impl FnOnce(&mut TaskRecord)) -> bool {
        match self.tasks.write().await.get_mut(id) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }
}

async fn run_job(state: AppState, id: TaskId) {
    for (progress, message) in STAGES {
        tokio::time::sleep(state.config.step).await;
        let alive = state
            .update(&id, |r| {
                r.summary.status = TaskStatus::Processing;
                r.summary.progress = *progress;
                r.summary.message = Some(message.to_string());
            })
            .await;
        if !alive {
            return;
        }
        tracing::debug!(task = %id, progress, message, "Stage started");
    }
    tokio::time::sleep(state.config.step).await;

    let method = {
        let tasks = state.tasks.read().await;
        match tasks.get(&id) {
            Some(r) => r.summary.method,
            None => return,
        }
    };

    match find_output(&state.config.models_dir, &id, method) {
        Some(file) => {
            let url = format!("/models/{file}");
            tracing::info!(task = %id, %url, "Task completed");
            state
                .update(&id, |r| {
                    r.summary.status = TaskStatus::Completed;
                    r.summary.progress = 100.0;
                    r.summary.message = Some("Reconstruction complete".to_string());
                    r.summary.completed_at = Some(Utc::now());
                    r.result = Some(ResultDescriptor::new(url));
                })
                .await;
        }
        None => {
            let error = format!(
                "no {} output found in {}",
                method.display_name(),
                state.config.models_dir.display()
            );
            tracing::error!(task = %id, "Task failed: {error}");
            state
                .update(&id, |r| {
                    r.summary.status = TaskStatus::Failed;
                    r.summary.completed_at = Some(Utc::now());
                    r.summary.error_message = Some(error);
                })
                .await;
        }
    }
}

/// Model file produced for a task: `<id>.<ext>` if present, else the
/// method's shared output file
fn find_output(dir: &Path, id: &str, method: ReconstructionMethod) -> Option<String> {
    let (ext, fallback) = match method {
        ReconstructionMethod::Nerf => ("glb", "nerf.glb"),
        ReconstructionMethod::GaussianSplatting => ("ply", "point_cloud.ply"),
    };
    [format!("{id}.{ext}"), fallback.to_string()]
        .into_iter()
        .find(|name| dir.join(name).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(dir: PathBuf) -> AppState {
        AppState::new(ServerConfig {
            bind: "127.0.0.1:0".to_string(),
            models_dir: dir,
            step: Duration::from_millis(5),
        })
    }

    fn request(method: ReconstructionMethod) -> CreateTaskRequest {
        CreateTaskRequest {
            file_ids: vec!["upload-1".to_string()],
            method,
            ..Default::default()
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("recon-server-{name}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    async fn wait_terminal(state: &AppState, id: &str) -> TaskStatusResponse {
        for _ in 0..200 {
            let s = state.status(id).await.unwrap();
            if s.status.is_terminal() {
                return s;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {id} did not finish");
    }

    #[tokio::test]
    async fn test_job_completes_with_model_url() {
        let dir = temp_dir("complete");
        std::fs::write(dir.join("point_cloud.ply"), b"ply").unwrap();
        let state = state(dir);

        let id = state.create(request(ReconstructionMethod::GaussianSplatting)).await;
        let status = wait_terminal(&state, &id).await;
        assert_eq!(status.status, TaskStatus::Completed);
        assert_eq!(status.progress, 100.0);
        assert_eq!(status.result.unwrap().model_url, "/models/point_cloud.ply");
    }

    #[tokio::test]
    async fn test_task_specific_output_preferred() {
        let dir = temp_dir("specific");
        std::fs::write(dir.join("nerf.glb"), b"glb").unwrap();
        let state = state(dir.clone());
        let id = state.create(request(ReconstructionMethod::Nerf)).await;
        std::fs::write(dir.join(format!("{id}.glb")), b"glb").unwrap();

        let status = wait_terminal(&state, &id).await;
        assert_eq!(status.result.unwrap().model_url, format!("/models/{id}.glb"));
    }

    #[tokio::test]
    async fn test_missing_output_fails() {
        let state = state(temp_dir("missing"));
        let id = state.create(request(ReconstructionMethod::Nerf)).await;
        let status = wait_terminal(&state, &id).await;
        assert_eq!(status.status, TaskStatus::Failed);
        assert!(status.message.unwrap().contains("NeRF"));
        assert!(status.result.is_none());
    }

    #[tokio::test]
    async fn test_delete_and_restart() {
        let dir = temp_dir("restart");
        std::fs::write(dir.join("point_cloud.ply"), b"ply").unwrap();
        let state = state(dir);
        let id = state.create(request(ReconstructionMethod::GaussianSplatting)).await;
        wait_terminal(&state, &id).await;

        assert!(state.restart(&id).await);
        let s = state.status(&id).await.unwrap();
        assert!(!s.status.is_terminal());
        assert!(s.result.is_none());
        assert_eq!(wait_terminal(&state, &id).await.status, TaskStatus::Completed);

        assert_eq!(state.list().await.len(), 1);
        assert!(state.delete(&id).await);
        assert!(state.status(&id).await.is_none());
        assert!(!state.delete(&id).await);
        assert!(!state.restart(&id).await);
    }
}
