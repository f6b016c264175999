use axum::{
    routing::{delete, get, post},
    Router,
};
use shared::api;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

mod routes;
mod store;

use store::{AppState, ServerConfig};

fn router(state: AppState) -> Router {
    let models = ServeDir::new(&state.config.models_dir);
    Router::new()
        .route(api::HEALTH, get(routes::health))
        .route(api::CREATE_TASK, post(routes::create_task))
        .route(api::LIST_TASKS, get(routes::list_tasks))
        .route(&api::status_path("{id}"), get(routes::task_status))
        .route(&api::task_path("{id}"), delete(routes::delete_task))
        .route(&api::restart_path("{id}"), post(routes::restart_task))
        .nest_service("/models", models)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "server=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::from_env();
    let bind = config.bind.clone();
    tracing::info!(models = %config.models_dir.display(), step = ?config.step, "Starting reconstruction backend");
    let app = router(AppState::new(config));

    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {bind}: {e}");
            return;
        }
    };
    tracing::info!("Server running on http://{bind}");
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {e}");
    }
}
