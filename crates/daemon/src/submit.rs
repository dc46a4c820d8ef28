//! Job submission for seedforge
//!
//! Validates a request, canonicalizes its source into the task id, reserves a
//! queue slot and registers the task. Submission never waits on the pipeline.

use crate::config::Config;
use crate::job_executor::Job;
use crate::metafile::{DEFAULT_PIECE_EXPONENT, PIECE_EXPONENT_RANGE};
use crate::naming::ArtifactNames;
use crate::pipeline::JobSettings;
use crate::preview::{PreviewMode, PreviewQuality, PreviewSettings};
use crate::tasks::{BeginOutcome, TaskStatus, TaskStore};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::info;

/// Errors a submission can be rejected with
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("source not found: {0}")]
    NotFound(String),

    #[error("source is outside the media root: {0}")]
    OutsideRoot(String),

    #[error("media root is unavailable: {0}")]
    MediaRoot(#[source] io::Error),

    #[error("quality '{quality}' is not available for {mode} previews")]
    InvalidQuality {
        mode: PreviewMode,
        quality: PreviewQuality,
    },

    #[error("invalid piece size '{0}': expected an exponent between 15 and 28")]
    InvalidPieceSize(String),

    #[error("source has no usable name: {0}")]
    Unnamed(String),

    #[error("job queue is full")]
    QueueFull,

    #[error("job queue is closed")]
    QueueClosed,

    #[error("a job for {task_id} is already {}", .status.as_str())]
    AlreadyActive { task_id: String, status: TaskStatus },
}

/// Piece size as sent by a form (`"22"`, `""`) or a JSON client (`22`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PieceSizeInput {
    Number(u64),
    Text(String),
}

/// Body of `POST /api/jobs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub source_path: String,
    #[serde(default)]
    pub announce_url: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub piece_size: Option<PieceSizeInput>,
    #[serde(default)]
    pub preview_mode: PreviewMode,
    #[serde(default)]
    pub preview_quality: PreviewQuality,
}

/// Resolve an optional piece size to an exponent; empty means the default.
pub fn parse_piece_size(input: Option<&PieceSizeInput>) -> Result<u8, SubmitError> {
    let value = match input {
        None => return Ok(DEFAULT_PIECE_EXPONENT),
        Some(PieceSizeInput::Number(n)) => *n,
        Some(PieceSizeInput::Text(s)) if s.trim().is_empty() => return Ok(DEFAULT_PIECE_EXPONENT),
        Some(PieceSizeInput::Text(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| SubmitError::InvalidPieceSize(s.clone()))?,
    };

    match u8::try_from(value) {
        Ok(exp) if PIECE_EXPONENT_RANGE.contains(&exp) => Ok(exp),
        _ => Err(SubmitError::InvalidPieceSize(value.to_string())),
    }
}

/// Where `raw` points before canonicalization: an absolute path under the
/// media root, as configured or canonical, is kept; anything else is taken
/// relative to the canonical root.
fn lexical_candidate(media_root: &Path, canonical_root: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() && (path.starts_with(canonical_root) || path.starts_with(media_root)) {
        path.to_path_buf()
    } else {
        canonical_root.join(raw.trim_start_matches('/'))
    }
}

/// Canonical absolute form of a source reference.
///
/// Symlinks, `.`/`..` and trailing slashes are resolved, and the result must
/// stay inside the canonical media root. This single form is both the task id
/// and the deduplication key.
pub fn canonical_source(media_root: &Path, raw: &str) -> Result<PathBuf, SubmitError> {
    let root = fs::canonicalize(media_root).map_err(SubmitError::MediaRoot)?;
    let candidate = lexical_candidate(media_root, &root, raw);
    let canonical = fs::canonicalize(&candidate).map_err(|_| SubmitError::NotFound(raw.to_string()))?;

    if !canonical.starts_with(&root) {
        return Err(SubmitError::OutsideRoot(raw.to_string()));
    }
    Ok(canonical)
}

/// Task id for a status lookup.
///
/// Uses [`canonical_source`] when the source still resolves, otherwise the
/// lexical form under the canonical root, so ids of deleted sources can
/// still be queried.
pub fn task_id_for(media_root: &Path, raw: &str) -> String {
    match canonical_source(media_root, raw) {
        Ok(path) => path.to_string_lossy().into_owned(),
        Err(_) => {
            let root = fs::canonicalize(media_root).unwrap_or_else(|_| media_root.to_path_buf());
            let candidate = lexical_candidate(media_root, &root, raw);
            let text = candidate.to_string_lossy();
            let trimmed = text.trim_end_matches('/');
            if trimmed.is_empty() {
                "/".to_string()
            } else {
                trimmed.to_string()
            }
        }
    }
}

/// Accepts jobs and hands them to the worker queue; cheap to clone
#[derive(Debug, Clone)]
pub struct JobSubmitter {
    store: TaskStore,
    queue: mpsc::Sender<Job>,
    media_root: PathBuf,
    default_announce_url: String,
    output_dir_name: String,
}

impl JobSubmitter {
    pub fn new(store: TaskStore, queue: mpsc::Sender<Job>, cfg: &Config) -> Self {
        Self {
            store,
            queue,
            media_root: cfg.server.media_root.clone(),
            default_announce_url: cfg.server.default_announce_url.clone(),
            output_dir_name: cfg.output.dir_name.clone(),
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// Validate `request`, register its task and queue the job.
    ///
    /// Returns the task id. Nothing is registered when the request is
    /// rejected, the queue is full, or the same source is already active.
    pub async fn submit(&self, request: JobRequest) -> Result<String, SubmitError> {
        let mode = request.preview_mode;
        let quality = request.preview_quality;
        if !mode.accepts(quality) {
            return Err(SubmitError::InvalidQuality { mode, quality });
        }
        let piece_exponent = parse_piece_size(request.piece_size.as_ref())?;

        let source = canonical_source(&self.media_root, &request.source_path)?;
        let is_dir = source.is_dir();
        let names = ArtifactNames::for_source(&source, is_dir, &self.output_dir_name)
            .ok_or_else(|| SubmitError::Unnamed(request.source_path.clone()))?;
        let task_id = source.to_string_lossy().into_owned();

        let announce_url = request
            .announce_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(&self.default_announce_url)
            .to_string();

        let permit = match self.queue.try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Full(())) => return Err(SubmitError::QueueFull),
            Err(TrySendError::Closed(())) => return Err(SubmitError::QueueClosed),
        };

        if let BeginOutcome::AlreadyActive(status) = self.store.try_begin(&task_id).await {
            return Err(SubmitError::AlreadyActive { task_id, status });
        }

        info!(task_id = %task_id, mode = %mode, quality = %quality, "job accepted");
        permit.send(Job {
            task_id: task_id.clone(),
            source,
            names,
            settings: JobSettings {
                announce_url,
                private: request.private,
                comment: request.comment,
                piece_exponent,
                preview: PreviewSettings { mode, quality },
            },
        });

        Ok(task_id)
    }
}
