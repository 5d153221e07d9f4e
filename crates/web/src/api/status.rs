//! Status and health check endpoints, plus the shared API error type.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, warn};

use branchnote_core::errors::{NoteError, StoreError};

use crate::AppState;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: String,
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    default_repo: String,
    trunk_branch: String,
    started_at: String,
    uptime_secs: i64,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/status/health", get(health_check))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let store = &state.config.store;
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        default_repo: store.default_repo.clone(),
        trunk_branch: store.trunk_branch.clone(),
        started_at: state.started_at.to_rfc3339(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

// ---------------------------------------------------------------------------
// Shared error type for API handlers
// ---------------------------------------------------------------------------

/// API error type that converts to an Axum response with `{"error": msg}`.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl From<NoteError> for AppError {
    fn from(err: NoteError) -> Self {
        let message = err.to_string();
        match err {
            NoteError::InvalidInput(_) | NoteError::NoteNotFound { .. } => {
                AppError::BadRequest(message)
            }
            NoteError::BranchNotFound(_) | NoteError::Store(StoreError::RepositoryNotFound(_)) => {
                AppError::NotFound(message)
            }
            NoteError::BranchAlreadyExists(_)
            | NoteError::StaleState { .. }
            | NoteError::ForeignBranch { .. } => {
                warn!(error = %message, "edit rejected");
                AppError::Conflict(message)
            }
            NoteError::LockTimeout { .. } => AppError::Unavailable(message),
            NoteError::UnexpectedConflict { .. }
            | NoteError::ProtectedBranch(_)
            | NoteError::Store(_)
            | NoteError::Internal(_) => {
                error!(error = %message, "request failed");
                AppError::Internal(message)
            }
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchnote_core::errors::ValidationError;

    fn status_of(err: NoteError) -> StatusCode {
        use axum::response::IntoResponse;
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_of(ValidationError::Empty("note_path").into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(NoteError::NoteNotFound {
                path: "a.txt".into(),
                reference: "master".into()
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(NoteError::BranchNotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(StoreError::RepositoryNotFound("/data/x".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(NoteError::StaleState {
                branch: "user-a.txt".into(),
                detail: "old".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(NoteError::BranchAlreadyExists("user-a.txt".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(NoteError::ForeignBranch {
                branch: "user-b.txt".into(),
                path: "a.txt".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ValidationError::PathClash("a".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(NoteError::LockTimeout {
                repo: "notes".into(),
                secs: 30
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(NoteError::UnexpectedConflict {
                branch: "user-a.txt".into(),
                trunk: "master".into()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
