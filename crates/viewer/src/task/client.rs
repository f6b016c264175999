//! HTTP client for the reconstruction backend.

use std::future::Future;
use std::time::Duration;

use shared::{api, ApiResponse, CreateTaskRequest, CreatedTask, TaskId, TaskStatusResponse, TaskSummary};
use tracing::debug;

use crate::error::PollError;

/// Backend operations the task controller depends on
pub trait TaskBackend: Send + Sync + 'static {
    fn fetch_status(
        &self,
        task_id: &str,
    ) -> impl Future<Output = Result<TaskStatusResponse, PollError>> + Send;

    fn submit(
        &self,
        request: &CreateTaskRequest,
    ) -> impl Future<Output = Result<TaskId, PollError>> + Send;

    fn restart(&self, task_id: &str) -> impl Future<Output = Result<(), PollError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpTaskClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTaskClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Absolute URL for a result `model_url` that may be server-relative
    pub fn resolve_url(&self, url: &str) -> String {
        resolve_against(&self.base_url, url)
    }

    pub async fn create_task(&self, request: &CreateTaskRequest) -> Result<TaskId, PollError> {
        let response: ApiResponse<CreatedTask> = self
            .client
            .post(self.url(api::CREATE_TASK))
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        match response {
            ApiResponse {
                success: true,
                data: Some(created),
                ..
            } => Ok(created.task_id),
            ApiResponse { error, message, .. } => Err(PollError::Backend(
                error.or(message).unwrap_or_else(|| "task creation rejected".to_string()),
            )),
        }
    }

    pub async fn status(&self, task_id: &str) -> Result<TaskStatusResponse, PollError> {
        let url = self.url(&api::status_path(task_id));
        debug!(%url, "Polling task status");
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    pub async fn restart_task(&self, task_id: &str) -> Result<(), PollError> {
        let response: ApiResponse<serde_json::Value> = self
            .client
            .post(self.url(&api::restart_path(task_id)))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if response.success {
            Ok(())
        } else {
            Err(PollError::Backend(
                response.error.unwrap_or_else(|| "restart rejected".to_string()),
            ))
        }
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<(), PollError> {
        self.client
            .delete(self.url(&api::task_path(task_id)))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// All tasks known to the backend. The body is a bare JSON array.
    pub async fn list_tasks(&self) -> Result<Vec<TaskSummary>, PollError> {
        let body = self
            .client
            .get(self.url(api::LIST_TASKS))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        parse_task_list(&body)
    }

    pub async fn health(&self) -> Result<(), PollError> {
        self.client
            .get(self.url(api::HEALTH))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl TaskBackend for HttpTaskClient {
    async fn fetch_status(&self, task_id: &str) -> Result<TaskStatusResponse, PollError> {
        self.status(task_id).await
    }

    async fn submit(&self, request: &CreateTaskRequest) -> Result<TaskId, PollError> {
        self.create_task(request).await
    }

    async fn restart(&self, task_id: &str) -> Result<(), PollError> {
        self.restart_task(task_id).await
    }
}

fn parse_task_list(body: &[u8]) -> Result<Vec<TaskSummary>, PollError> {
    serde_json::from_slice(body).map_err(|e| PollError::Decode(e.to_string()))
}

/// Join a possibly relative URL onto `base`
pub fn resolve_against(base: &str, url: &str) -> String {
    if url.contains("://") || url.starts_with("file:") {
        return url.to_string();
    }
    match reqwest::Url::parse(base).and_then(|b| b.join(url)) {
        Ok(joined) => joined.to_string(),
        Err(_) => url.to_string(),
    }
}
