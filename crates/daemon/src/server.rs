//! HTTP server for seedforge
//!
//! Exposes job submission, task status and artifact retrieval as a small
//! JSON API.

use crate::submit::{task_id_for, JobRequest, JobSubmitter, SubmitError};
use crate::tasks::{ArtifactKind, TaskSnapshot, TaskStore};
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur when running the HTTP server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server terminated: {0}")]
    Serve(#[source] std::io::Error),
}

/// Shared state behind every handler
#[derive(Clone)]
pub struct AppState {
    submitter: JobSubmitter,
    store: TaskStore,
    media_root: Arc<PathBuf>,
}

impl AppState {
    pub fn new(submitter: JobSubmitter, store: TaskStore) -> Self {
        let media_root = Arc::new(submitter.media_root().to_path_buf());
        Self {
            submitter,
            store,
            media_root,
        }
    }
}

/// JSON error body with a status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        let status = match &e {
            SubmitError::NotFound(_) => StatusCode::NOT_FOUND,
            SubmitError::OutsideRoot(_)
            | SubmitError::InvalidQuality { .. }
            | SubmitError::InvalidPieceSize(_)
            | SubmitError::Unnamed(_) => StatusCode::BAD_REQUEST,
            SubmitError::QueueFull | SubmitError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            SubmitError::AlreadyActive { .. } => StatusCode::CONFLICT,
            SubmitError::MediaRoot(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct FileQuery {
    file: String,
}

/// Body of `GET /api/status`; unknown tasks report status `unknown`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
    pub artifacts: BTreeMap<ArtifactKind, PathBuf>,
}

impl From<Option<TaskSnapshot>> for StatusResponse {
    fn from(snapshot: Option<TaskSnapshot>) -> Self {
        match snapshot {
            Some(task) => Self {
                status: task.status.as_str().to_string(),
                message: task.message,
                artifacts: task.artifacts,
            },
            None => Self {
                status: "unknown".to_string(),
                message: String::new(),
                artifacts: BTreeMap::new(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub task_id: String,
    #[serde(flatten)]
    pub task: TaskSnapshot,
}

async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let task_id = state.submitter.submit(request).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { task_id })))
}

async fn get_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Json<StatusResponse> {
    let task_id = task_id_for(&state.media_root, &query.task_id);
    Json(StatusResponse::from(state.store.get(&task_id).await))
}

async fn list_tasks(State(state): State<AppState>) -> Json<Vec<TaskEntry>> {
    let entries = state
        .store
        .list()
        .await
        .into_iter()
        .map(|(task_id, task)| TaskEntry { task_id, task })
        .collect();
    Json(entries)
}

/// Resolve a `file` query value to an existing regular file inside the media root.
///
/// The value has already been decoded once by the query extractor. Clients
/// that encode twice leave `%XX` sequences behind, and form encoding turns
/// spaces into `+`, so those readings are tried when the literal one does not
/// resolve.
pub fn resolve_artifact_path(media_root: &Path, raw: &str) -> Option<PathBuf> {
    let root = std::fs::canonicalize(media_root).ok()?;

    let mut candidates: Vec<String> = vec![raw.to_string()];
    if raw.contains('%') {
        if let Ok(decoded) = urlencoding::decode(raw) {
            candidates.push(decoded.into_owned());
        }
    }
    let with_spaces: Vec<String> = candidates
        .iter()
        .filter(|c| c.contains('+'))
        .map(|c| c.replace('+', " "))
        .collect();
    candidates.extend(with_spaces);

    candidates.into_iter().find_map(|candidate| {
        let path = Path::new(&candidate);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            media_root.join(path)
        };
        let canonical = std::fs::canonicalize(&path).ok()?;
        (canonical.starts_with(&root) && canonical.is_file()).then_some(canonical)
    })
}

async fn read_artifact(state: &AppState, raw: &str) -> Result<(PathBuf, Vec<u8>), ApiError> {
    let path = resolve_artifact_path(&state.media_root, raw)
        .ok_or_else(|| ApiError::not_found(format!("file not found: {}", raw)))?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::not_found(format!("cannot read {}: {}", path.display(), e)))?;
    debug!(path = %path.display(), bytes = bytes.len(), "serving artifact");
    Ok((path, bytes))
}

async fn download(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Result<Response, ApiError> {
    let (path, bytes) = read_artifact(&state, &query.file).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(&file_name)
    );
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

async fn view_image(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Result<Response, ApiError> {
    let (_, bytes) = read_artifact(&state, &query.file).await?;
    Ok(([(header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg"))], bytes).into_response())
}

async fn health() -> &'static str {
    "ok"
}

/// Creates the axum Router with every endpoint
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/jobs", post(submit_job))
        .route("/api/status", get(get_status))
        .route("/api/tasks", get(list_tasks))
        .route("/download", get(download))
        .route("/view_image", get(view_image))
        .route("/health", get(health))
        .with_state(state)
}

/// Runs the HTTP server on `bind` until it fails
pub async fn run_server(bind: &str, state: AppState) -> Result<(), ServerError> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: bind.to_string(),
            source,
        })?;

    info!(addr = %bind, "HTTP server listening");
    axum::serve(listener, app).await.map_err(ServerError::Serve)?;

    Ok(())
}
