use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use shared::{ApiResponse, CreateTaskRequest, CreatedTask, TaskStatusResponse, TaskSummary};

use crate::store::AppState;

type ApiError = (StatusCode, Json<ApiResponse<Value>>);

fn not_found(id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::err(format!("task {id} not found"))),
    )
}

/// Health check
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Create a reconstruction task and start processing it
pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Json<ApiResponse<CreatedTask>>, ApiError> {
    if request.file_ids.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::err("file_ids must not be empty")),
        ));
    }
    let task_id = state.create(request).await;
    Ok(Json(ApiResponse::ok(
        "Reconstruction task created",
        Some(CreatedTask { task_id }),
    )))
}

/// Current status of one task
pub async fn task_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    state.status(&id).await.map(Json).ok_or_else(|| not_found(&id))
}

/// All tasks, newest first, as a bare array
pub async fn list_tasks(State(state): State<AppState>) -> Json<Vec<TaskSummary>> {
    Json(state.list().await)
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    if state.delete(&id).await {
        Ok(Json(ApiResponse::ok("Task deleted", None)))
    } else {
        Err(not_found(&id))
    }
}

pub async fn restart_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    if state.restart(&id).await {
        Ok(Json(ApiResponse::ok("Task restarted", None)))
    } else {
        Err(not_found(&id))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use shared::TaskStatus;

    use super::*;
    use crate::store::ServerConfig;

    fn state() -> AppState {
        AppState::new(ServerConfig {
            bind: "127.0.0.1:0".to_string(),
            models_dir: std::env::temp_dir().join("recon-server-routes-empty"),
            step: Duration::from_secs(60),
        })
    }

    #[tokio::test]
    async fn test_create_then_status() {
        let state = state();
        let request = CreateTaskRequest {
            file_ids: vec!["a".to_string()],
            ..Default::default()
        };
        let Json(created) = create_task(State(state.clone()), Json(request)).await.unwrap();
        assert!(created.success);
        let id = created.data.unwrap().task_id;

        let Json(status) = task_status(State(state.clone()), Path(id.clone())).await.unwrap();
        assert_eq!(status.status, TaskStatus::Pending);
        assert_eq!(status.task_id.as_deref(), Some(id.as_str()));

        let Json(list) = list_tasks(State(state)).await;
        assert_eq!(list.len(), 1);
        let body = serde_json::to_value(&list).unwrap();
        assert!(body.is_array());
        assert_eq!(body[0]["id"], id.as_str());
    }

    #[tokio::test]
    async fn test_create_requires_files() {
        let err = create_task(State(state()), Json(CreateTaskRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(!err.1.success);
    }

    #[tokio::test]
    async fn test_unknown_task_is_404() {
        let state = state();
        let id = "missing".to_string();
        assert_eq!(
            task_status(State(state.clone()), Path(id.clone())).await.unwrap_err().0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            delete_task(State(state.clone()), Path(id.clone())).await.unwrap_err().0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            restart_task(State(state), Path(id)).await.unwrap_err().0,
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_status_body_shape() {
        let body = serde_json::to_value(TaskStatusResponse::new(TaskStatus::Processing, 40.0, "Training model")).unwrap();
        assert_eq!(body["status"], "processing");
        assert_eq!(body["progress"], 40.0);
    }
}
