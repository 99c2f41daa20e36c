//! Request handlers for the generated endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use super::AppState;
use crate::dispatch::Submission;
use crate::status::{project, StatusView};
use crate::validate::{unwrap_envelope, validate, ValidationIssue};

/// Error body shape shared by all non-2xx responses.
///
/// `detail` is a list of field-level issues for validation failures and a
/// plain string otherwise.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: Value,
}

impl ErrorBody {
    fn message(detail: impl Into<String>) -> Json<Self> {
        Json(Self {
            detail: Value::String(detail.into()),
        })
    }

    fn issues(issues: Vec<ValidationIssue>) -> Json<Self> {
        Json(Self {
            detail: json!(issues),
        })
    }
}

/// `POST {prefix}/{task_name}` -- validate and submit.
///
/// Accepts the task's input shape directly or wrapped one level deep in a
/// `payload` / `input` envelope. Valid input is accepted with 202 whatever
/// the body later does; task failures are reported through the status
/// endpoint, not here.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(task_name): Path<String>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Submission>), (StatusCode, Json<ErrorBody>)> {
    let Some(task) = state.registry.get(&task_name) else {
        return Err((
            StatusCode::NOT_FOUND,
            ErrorBody::message(format!("unknown task '{task_name}'")),
        ));
    };

    let payload = unwrap_envelope(&body);
    let input = payload.body();
    if let Err(issues) = validate(task.schema(), input) {
        return Err((StatusCode::BAD_REQUEST, ErrorBody::issues(issues)));
    }

    let submission = state
        .dispatcher
        .submit(task, input.clone())
        .await
        .map_err(|err| {
            error!(task = %task_name, error = %err, "submission failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::message("submission failed"),
            )
        })?;

    Ok((StatusCode::ACCEPTED, Json(submission)))
}

/// `GET /tasks/{task_id}` -- project the job's current state.
pub async fn task_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<StatusView>, (StatusCode, Json<ErrorBody>)> {
    if task_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            ErrorBody::message("task_id must not be empty"),
        ));
    }

    let raw = state
        .dispatcher
        .backend()
        .state(&task_id)
        .await
        .map_err(|err| {
            error!(task_id = %task_id, error = %err, "status query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::message("status query failed"),
            )
        })?;

    Ok(Json(project(&raw)))
}

/// `GET /tasks/` -- the handle segment is required.
pub async fn empty_task_id() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::BAD_REQUEST,
        ErrorBody::message("task_id must not be empty"),
    )
}

/// `GET /healthz` -- liveness probe.
pub async fn healthz() -> Json<Value> {
    Json(json!({"ok": true}))
}
