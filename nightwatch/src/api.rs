//! Control API: a thin axum adapter over `TaskManager`. Every handler
//! does exactly three things — parse the request, call into
//! `TaskManager`, and map the result to a JSON response or an
//! `ApiError` — per spec.md §4.7 "thin adapter".

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use shared::task::TaskStatus;
use shared::task_config::TaskConfig;
use shared::NightWatchError;

use crate::runtime::Runtime;

/// Maximum request body size accepted by the Control API: large enough
/// for a bulk task-definition upload, small enough to bound memory use
/// from a misbehaving client.
const MAX_REQUEST_SIZE: usize = 2 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<Runtime>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/night-watch/status", get(daemon_status))
        .route("/api/v1/night-watch/pause", put(daemon_pause))
        .route("/api/v1/night-watch/resume", put(daemon_resume))
        .route("/api/v1/night-watch/reload", put(daemon_reload))
        .route("/api/v1/tasks", get(list_tasks))
        .route("/api/v1/tasks/{action}", put(bulk_task_op))
        .route("/api/v1/task", post(add_task))
        .route("/api/v1/task/{name}", get(get_task))
        .route("/api/v1/task/{name}/{action}", put(task_op))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_SIZE))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ReloadedResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct SuccessResponse {
    status: &'static str,
}

fn current_status(state: &AppState) -> &'static str {
    if state.runtime.task_manager.is_reloading() {
        "Reloading"
    } else if state.runtime.task_manager.is_running() {
        "Running"
    } else {
        "Stopped"
    }
}

/// `GET /api/v1/night-watch/status`
async fn daemon_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: current_status(&state),
    })
}

/// `PUT /api/v1/night-watch/pause` — stops the scheduler entirely.
async fn daemon_pause(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    state.runtime.task_manager.stop(None).await?;
    Ok(Json(StatusResponse {
        status: current_status(&state),
    }))
}

/// `PUT /api/v1/night-watch/resume` — starts the scheduler, reloading
/// every task definition from disk as a cold start would.
async fn daemon_resume(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    state.runtime.task_manager.start().await?;
    Ok(Json(StatusResponse {
        status: current_status(&state),
    }))
}

/// `PUT /api/v1/night-watch/reload`
async fn daemon_reload(State(state): State<AppState>) -> Result<Json<ReloadedResponse>, ApiError> {
    state.runtime.task_manager.reload().await?;
    Ok(Json(ReloadedResponse { status: "reloaded" }))
}

/// `GET /api/v1/tasks`
async fn list_tasks(State(state): State<AppState>) -> Json<Vec<TaskStatus>> {
    Json(state.runtime.task_manager.list_task_statuses().await)
}

/// `GET /api/v1/task/{name}`
async fn get_task(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TaskStatus>, ApiError> {
    let status = state.runtime.task_manager.get_task_status(&name).await?;
    Ok(Json(status))
}

#[derive(Debug, Deserialize)]
struct AddTaskRequest {
    filename: Option<String>,
    tasks: BTreeMap<String, TaskConfig>,
}

/// `POST /api/v1/task`
async fn add_task(
    State(state): State<AppState>,
    Json(request): Json<AddTaskRequest>,
) -> Result<Json<Vec<TaskStatus>>, ApiError> {
    let statuses = state
        .runtime
        .task_manager
        .add_tasks(request.tasks, request.filename)
        .await?;
    Ok(Json(statuses))
}

#[derive(Debug, Deserialize)]
struct TaskNameEntry {
    name: String,
}

/// `PUT /api/v1/tasks/{pause|resume|reload}` — bulk op on a list of
/// task names in the request body.
async fn bulk_task_op(
    State(state): State<AppState>,
    Path(action): Path<String>,
    Json(entries): Json<Vec<TaskNameEntry>>,
) -> Result<Json<SuccessResponse>, ApiError> {
    for entry in &entries {
        apply_task_action(&state, &action, &entry.name).await?;
    }
    Ok(Json(SuccessResponse { status: "success" }))
}

/// `PUT /api/v1/task/{name}/{pause|resume|reload}`
async fn task_op(
    State(state): State<AppState>,
    Path((name, action)): Path<(String, String)>,
) -> Result<Json<TaskStatus>, ApiError> {
    apply_task_action(&state, &action, &name).await?;
    let status = state.runtime.task_manager.get_task_status(&name).await?;
    Ok(Json(status))
}

async fn apply_task_action(state: &AppState, action: &str, name: &str) -> Result<(), ApiError> {
    match action {
        "pause" => state.runtime.task_manager.pause_task(name).await?,
        "resume" => state.runtime.task_manager.resume_task(name).await?,
        "reload" => state.runtime.task_manager.reload_task(name).await?,
        other => {
            return Err(ApiError::NotImplemented(format!(
                "unknown task action \"{other}\""
            )))
        }
    }
    Ok(())
}

/// Errors the Control API surfaces as HTTP status codes, per spec.md §7's
/// propagation table: `TaskNotFound` → 404, the `*ConfigInvalid` family →
/// 501, everything else → 500.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<NightWatchError>() {
            Some(NightWatchError::TaskNotFound(_)) => ApiError::NotFound(err.to_string()),
            Some(NightWatchError::TaskConfigInvalid(_))
            | Some(NightWatchError::ProviderConfigInvalid(_))
            | Some(NightWatchError::ActionConfigInvalid(_)) => {
                ApiError::NotImplemented(err.to_string())
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}
