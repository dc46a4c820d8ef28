//! Pipeline runner for seedforge
//!
//! Runs the stages of one job in order, writing progress into the task store:
//!
//! 1. cleanup of artifacts from a previous run
//! 2. metafile (mktorrent)
//! 3. scan for the primary media file
//! 4. metadata report (mediainfo)
//! 5. preview (grid sheet or screenshot archive)
//!
//! Per-stage problems are soft: they are collected as warnings and the task
//! still ends `done`. Only failures of the orchestration itself surface as
//! [`PipelineError`].

use crate::config::Config;
use crate::job_executor::Job;
use crate::metafile::{create_metafile, MetafileParams};
use crate::naming::ArtifactNames;
use crate::preview::{self, PreviewLimits, PreviewOutcome, PreviewSettings};
use crate::process::{ToolError, ToolOutput, Toolchain};
use crate::report::write_report;
use crate::scan::find_primary_media_file;
use crate::tasks::{ArtifactKind, TaskStatus, TaskStore};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Failures that abort a job and put its task into `error`
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The artifact output directory could not be created
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A blocking helper task panicked or was cancelled
    #[error("background task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

/// Result of a tool-backed stage
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// The expected file exists
    Produced(PathBuf),
    /// Soft failure with a human-readable reason
    Failed(String),
}

impl StageOutcome {
    /// A stage succeeded if the tool exited cleanly and `expected` exists
    pub fn from_tool(result: Result<ToolOutput, ToolError>, expected: &Path) -> Self {
        match result {
            Err(e) => StageOutcome::Failed(e.to_string()),
            Ok(output) if !output.success() => {
                StageOutcome::Failed(format!("exited with {}", output.failure_summary(200)))
            }
            Ok(_) if !expected.is_file() => {
                StageOutcome::Failed(format!("{} was not created", expected.display()))
            }
            Ok(_) => StageOutcome::Produced(expected.to_path_buf()),
        }
    }
}

/// Immutable per-job parameters
#[derive(Debug, Clone, PartialEq)]
pub struct JobSettings {
    pub announce_url: String,
    pub private: bool,
    pub comment: String,
    pub piece_exponent: u8,
    pub preview: PreviewSettings,
}

/// Everything a pipeline needs besides the job itself
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub tools: Toolchain,
    pub limits: PreviewLimits,
    /// Name of the output subdirectory, pruned while scanning
    pub output_dir_name: String,
    pub min_media_bytes: u64,
}

impl PipelineContext {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            tools: Toolchain::from_config(&cfg.tools),
            limits: PreviewLimits::from_config(&cfg.preview),
            output_dir_name: cfg.output.dir_name.clone(),
            min_media_bytes: cfg.output.min_media_bytes,
        }
    }
}

/// Join the headline and any warnings into the final task message
fn summarize(headline: &str, warnings: &[String]) -> String {
    if warnings.is_empty() {
        headline.to_string()
    } else {
        format!("{} with warnings: {}", headline, warnings.join("; "))
    }
}

async fn progress(store: &TaskStore, job: &Job, message: &str) {
    store
        .update(&job.task_id, TaskStatus::Running, message, None)
        .await;
}

async fn record(store: &TaskStore, job: &Job, message: &str, kind: ArtifactKind, path: PathBuf) {
    store
        .update(&job.task_id, TaskStatus::Running, message, Some((kind, path)))
        .await;
}

/// Run every stage for `job`, leaving its task `done` on return.
///
/// Returns the final message on success.
pub async fn run_pipeline(
    ctx: &PipelineContext,
    store: &TaskStore,
    job: &Job,
) -> Result<String, PipelineError> {
    let names: &ArtifactNames = &job.names;
    let mut warnings: Vec<String> = Vec::new();

    std::fs::create_dir_all(names.output_dir()).map_err(|source| PipelineError::OutputDir {
        path: names.output_dir().to_path_buf(),
        source,
    })?;

    // Stage 1: cleanup
    progress(store, job, "Cleaning previous artifacts...").await;
    for failure in names.cleanup() {
        warnings.push(format!("cleanup: {}", failure));
    }

    // Stage 2: metafile
    progress(store, job, "Creating metafile...").await;
    let params = MetafileParams {
        source: job.source.clone(),
        output: names.metafile(),
        announce_url: job.settings.announce_url.clone(),
        private: job.settings.private,
        comment: job.settings.comment.clone(),
        piece_exponent: job.settings.piece_exponent,
    };
    match create_metafile(&ctx.tools, &params).await {
        StageOutcome::Produced(path) => {
            info!(task_id = %job.task_id, stage = "metafile", path = %path.display(), "metafile created");
            record(store, job, "Metafile created", ArtifactKind::Metafile, path).await;
        }
        StageOutcome::Failed(reason) => {
            warn!(task_id = %job.task_id, stage = "metafile", %reason, "metafile failed");
            warnings.push(format!("metafile: {}", reason));
        }
    }

    // Stage 3: scan
    progress(store, job, "Scanning for media...").await;
    let source = job.source.clone();
    let excluded = ctx.output_dir_name.clone();
    let min_bytes = ctx.min_media_bytes;
    let primary = tokio::task::spawn_blocking(move || {
        find_primary_media_file(&source, &excluded, min_bytes)
    })
    .await?;

    let Some(media) = primary else {
        info!(task_id = %job.task_id, stage = "scan", "no primary media file");
        let message = summarize("Completed (no media file found)", &warnings);
        store
            .update(&job.task_id, TaskStatus::Done, message.as_str(), None)
            .await;
        return Ok(message);
    };
    info!(
        task_id = %job.task_id,
        stage = "scan",
        media = %media.path.display(),
        size_bytes = media.size_bytes,
        "primary media file selected"
    );

    // Stage 4: metadata report
    progress(store, job, "Generating MediaInfo report...").await;
    match write_report(&ctx.tools, &media.path, &names.report()).await {
        StageOutcome::Produced(path) => {
            record(store, job, "MediaInfo report created", ArtifactKind::MetadataReport, path).await;
        }
        StageOutcome::Failed(reason) => {
            warn!(task_id = %job.task_id, stage = "report", %reason, "mediainfo failed");
            warnings.push(format!("mediainfo: {}", reason));
        }
    }

    // Stage 5: preview
    progress(store, job, "Generating preview...").await;
    let headline = match preview::generate(
        &ctx.tools,
        &ctx.limits,
        &media.path,
        names,
        job.settings.preview,
    )
    .await
    {
        PreviewOutcome::Generated(artifacts) => {
            record(store, job, "Preview created", ArtifactKind::PreviewDownload, artifacts.download).await;
            record(store, job, "Preview created", ArtifactKind::PreviewImage, artifacts.image).await;
            "Completed".to_string()
        }
        PreviewOutcome::Skipped { duration, minimum } => format!(
            "Completed (preview skipped: duration {:.1}s is below {:.0}s)",
            duration, minimum
        ),
        PreviewOutcome::Failed(reason) => {
            warn!(task_id = %job.task_id, stage = "preview", %reason, "preview failed");
            warnings.push(format!("preview: {}", reason));
            "Completed".to_string()
        }
    };

    let message = summarize(&headline, &warnings);
    store
        .update(&job.task_id, TaskStatus::Done, message.as_str(), None)
        .await;
    Ok(message)
}
