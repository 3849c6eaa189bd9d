//! REST surface over [`SimulationService`].
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | GET | `/api/v1/programs/list` | `[{filename, size, atime, mtime}]` |
//! | POST | `/api/v1/programs/upload` | `{status: "ok", path}` (multipart field `file`, no body size limit) |
//! | DELETE | `/api/v1/programs/{filename}` | `{status, filename}` |
//! | GET | `/api/v1/programs/usage` | `{total_size_bytes, file_count, max_size_bytes}` |
//! | POST | `/api/v1/programs/simulate` | `{status: "submitted", task_id}` (form field `filename`) |
//! | GET | `/api/v1/programs/simulate` | `[task view]` |
//! | GET | `/api/v1/programs/simulate/{task_id}` | task view |
//! | POST | `/api/v1/programs/simulate/{task_id}/cancel` | `{status, task_id}` |
//! | GET | `/api/v1/programs/simulate/{task_id}/telemetry` | `{task_id, lines}` |
//!
//! Errors are returned as `{"detail": "<message>"}`: 404 for unknown
//! programs or tasks, 400 for other client errors, 500 otherwise.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Form, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::artifact::{Artifact, UsageReport};
use crate::error::SimError;
use crate::service::SimulationService;
use crate::task::TaskView;

/// Builds the router. The service is shared state for every handler.
pub fn router(service: Arc<SimulationService>) -> Router {
    Router::new()
        .route("/api/v1/programs/list", get(list_programs))
        // Program size is governed by store capacity, not a request limit.
        .route(
            "/api/v1/programs/upload",
            post(upload_program).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/v1/programs/usage", get(usage))
        .route("/api/v1/programs/{filename}", delete(delete_program))
        .route("/api/v1/programs/simulate", post(simulate).get(list_tasks))
        .route("/api/v1/programs/simulate/{task_id}", get(task_status))
        .route("/api/v1/programs/simulate/{task_id}/cancel", post(cancel_task))
        .route("/api/v1/programs/simulate/{task_id}/telemetry", get(task_telemetry))
        .with_state(service)
}

/// Error response carrying a status and a `detail` message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl From<SimError> for ApiError {
    fn from(err: SimError) -> Self {
        let status = if err.is_not_found() {
            StatusCode::NOT_FOUND
        } else if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            error!(error = %err, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Upload response
#[derive(Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub path: String,
}

/// Delete response
#[derive(Serialize)]
pub struct DeleteResponse {
    pub status: &'static str,
    pub filename: String,
}

/// Simulate form
#[derive(Deserialize)]
pub struct SimulateForm {
    pub filename: String,
}

/// Response for simulate and cancel.
#[derive(Serialize)]
pub struct TaskAck {
    pub status: &'static str,
    pub task_id: String,
}

/// Stored telemetry of one task.
#[derive(Serialize)]
pub struct TelemetryResponse {
    pub task_id: String,
    pub lines: Vec<String>,
}

async fn list_programs(State(service): State<Arc<SimulationService>>) -> ApiResult<Vec<Artifact>> {
    Ok(Json(service.list_programs().await?))
}

async fn upload_program(
    State(service): State<Arc<SimulationService>>,
    mut multipart: Multipart,
) -> ApiResult<UploadResponse> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("file field has no file name"))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;

        let path = service.upload_program(&filename, &bytes).await?;
        return Ok(Json(UploadResponse {
            status: "ok",
            path: path.display().to_string(),
        }));
    }
    Err(ApiError::bad_request("missing multipart field 'file'"))
}

async fn delete_program(
    State(service): State<Arc<SimulationService>>,
    Path(filename): Path<String>,
) -> ApiResult<DeleteResponse> {
    service.delete_program(&filename).await?;
    Ok(Json(DeleteResponse {
        status: "deleted",
        filename,
    }))
}

async fn usage(State(service): State<Arc<SimulationService>>) -> ApiResult<UsageReport> {
    Ok(Json(service.usage().await?))
}

async fn simulate(
    State(service): State<Arc<SimulationService>>,
    Form(form): Form<SimulateForm>,
) -> ApiResult<TaskAck> {
    let task_id = service.submit(&form.filename).await?;
    Ok(Json(TaskAck {
        status: "submitted",
        task_id,
    }))
}

async fn list_tasks(State(service): State<Arc<SimulationService>>) -> Json<Vec<TaskView>> {
    Json(service.tasks())
}

async fn task_status(
    State(service): State<Arc<SimulationService>>,
    Path(task_id): Path<String>,
) -> ApiResult<TaskView> {
    Ok(Json(service.task(&task_id)?))
}

async fn cancel_task(
    State(service): State<Arc<SimulationService>>,
    Path(task_id): Path<String>,
) -> ApiResult<TaskAck> {
    let signalled = service.cancel(&task_id)?;
    Ok(Json(TaskAck {
        status: if signalled { "cancelling" } else { "already_ended" },
        task_id,
    }))
}

async fn task_telemetry(
    State(service): State<Arc<SimulationService>>,
    Path(task_id): Path<String>,
) -> ApiResult<TelemetryResponse> {
    let lines = service.telemetry(&task_id).await?;
    Ok(Json(TelemetryResponse { task_id, lines }))
}
