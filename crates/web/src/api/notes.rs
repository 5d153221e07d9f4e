//! Note API endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use branchnote_core::errors::{NoteError, ValidationError};
use branchnote_core::models::{BranchRole, EditOutcome, IsolationKind, VersionToken};

use crate::api::status::AppError;
use crate::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct GetNoteQuery {
    pub repo_name: Option<String>,
    pub note_path: Option<String>,
    pub branch_name: Option<String>,
}

#[derive(Deserialize)]
pub struct NoteNamesQuery {
    pub repo_name: Option<String>,
    pub branch_name: Option<String>,
}

#[derive(Deserialize)]
pub struct ConflictsQuery {
    pub repo_name: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateNoteRequest {
    pub repo_name: Option<String>,
    pub note_path: Option<String>,
    pub note_value: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateNoteRequest {
    pub repo_name: Option<String>,
    pub branch_name: Option<String>,
    pub version_token: Option<String>,
    pub note_path: Option<String>,
    pub note_value: Option<String>,
}

#[derive(Deserialize)]
pub struct DeleteNoteRequest {
    pub repo_name: Option<String>,
    pub note_path: Option<String>,
    pub branch_name: Option<String>,
    pub version_token: Option<String>,
}

#[derive(Serialize)]
struct NoteResponse {
    note: String,
    readonly: bool,
    branch_name: String,
    role: BranchRole,
    version_token: VersionToken,
}

#[derive(Serialize)]
struct NoteNamesResponse {
    branch_name: String,
    notes: Vec<String>,
}

#[derive(Serialize)]
struct ConflictItem {
    branch_name: String,
    note_path: String,
    kind: IsolationKind,
    version_token: VersionToken,
}

#[derive(Serialize)]
struct ConflictsResponse {
    conflicts: Vec<ConflictItem>,
}

#[derive(Serialize)]
struct EditResponse {
    status: &'static str,
    note: Option<String>,
    branch_name: String,
    version_token: VersionToken,
}

#[derive(Serialize)]
struct DeleteResponse {
    status: &'static str,
    note_value: Option<String>,
    branch_name: String,
    version_token: VersionToken,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/apiv1/get-note", get(get_note))
        .route("/apiv1/get-note-names", get(get_note_names))
        .route("/apiv1/get-conflicts", get(get_conflicts))
        .route("/apiv1/create-note", post(create_note))
        .route("/apiv1/update-note", put(update_note))
        .route("/apiv1/delete-note", delete(delete_note))
}

fn required(field: &'static str, value: Option<String>) -> Result<String, AppError> {
    value
        .ok_or_else(|| AppError::from(NoteError::from(ValidationError::Missing(field))))
}

async fn get_note(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GetNoteQuery>,
) -> Result<Json<NoteResponse>, AppError> {
    let note_path = required("note_path", query.note_path)?;
    let branch_name = required("branch_name", query.branch_name)?;
    let repo = state.service.repo_or_default(query.repo_name.as_deref());

    let view = state.service.get_note(repo, &note_path, &branch_name).await?;
    Ok(Json(NoteResponse {
        note: view.note,
        readonly: view.readonly,
        branch_name: view.branch.name,
        role: view.branch.role,
        version_token: view.version,
    }))
}

async fn get_note_names(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NoteNamesQuery>,
) -> Result<Json<NoteNamesResponse>, AppError> {
    let branch_name = required("branch_name", query.branch_name)?;
    let repo = state.service.repo_or_default(query.repo_name.as_deref());

    let listing = state.service.get_note_names(repo, &branch_name).await?;
    Ok(Json(NoteNamesResponse {
        branch_name: listing.branch_name,
        notes: listing.notes,
    }))
}

async fn get_conflicts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConflictsQuery>,
) -> Result<Json<ConflictsResponse>, AppError> {
    let repo = state.service.repo_or_default(query.repo_name.as_deref());
    let conflicts = state
        .service
        .list_conflicts(repo)
        .await?
        .into_iter()
        .map(|c| ConflictItem {
            branch_name: c.branch_name,
            note_path: c.note_path,
            kind: c.kind,
            version_token: c.version,
        })
        .collect();
    Ok(Json(ConflictsResponse { conflicts }))
}

async fn create_note(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<(StatusCode, Json<EditResponse>), AppError> {
    let note_path = required("note_path", req.note_path)?;
    let note_value = required("note_value", req.note_value)?;
    let repo = state.service.repo_or_default(req.repo_name.as_deref());

    let outcome = state
        .service
        .create_note(repo, &note_path, &note_value)
        .await?;
    let (code, status) = if outcome.is_conflict() {
        (StatusCode::OK, "conflict")
    } else {
        (StatusCode::CREATED, "created")
    };
    Ok((code, Json(edit_response(status, outcome))))
}

async fn update_note(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateNoteRequest>,
) -> Result<Json<EditResponse>, AppError> {
    let branch_name = required("branch_name", req.branch_name)?;
    let version_token = required("version_token", req.version_token)?;
    let note_path = required("note_path", req.note_path)?;
    let note_value = required("note_value", req.note_value)?;
    let repo = state.service.repo_or_default(req.repo_name.as_deref());

    let outcome = state
        .service
        .update_note(repo, &branch_name, &version_token, &note_path, &note_value)
        .await?;
    let status = if outcome.is_conflict() { "conflict" } else { "ok" };
    Ok(Json(edit_response(status, outcome)))
}

async fn delete_note(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeleteNoteRequest>,
) -> Result<Json<DeleteResponse>, AppError> {
    let note_path = required("note_path", req.note_path)?;
    let branch_name = required("branch_name", req.branch_name)?;
    let repo = state.service.repo_or_default(req.repo_name.as_deref());

    let outcome = state
        .service
        .delete_note(repo, &branch_name, req.version_token.as_deref(), &note_path)
        .await?;
    Ok(Json(DeleteResponse {
        status: if outcome.is_conflict() { "conflict" } else { "ok" },
        note_value: outcome.note,
        branch_name: outcome.branch.name,
        version_token: outcome.version,
    }))
}

fn edit_response(status: &'static str, outcome: EditOutcome) -> EditResponse {
    EditResponse {
        status,
        note: outcome.note,
        branch_name: outcome.branch.name,
        version_token: outcome.version,
    }
}
