//! Preview generation for seedforge
//!
//! Two modes are supported:
//! - `grid`: sixteen frames tiled 4x4 into a single contact sheet
//! - `full`: up to six full-resolution frames packaged into a ZIP
//!
//! Outcomes are explicit: a preview is [`PreviewOutcome::Generated`], skipped
//! because the source is too short, or failed with a reason. None of them is
//! fatal to the job.

pub mod full;
pub mod grid;

use crate::config::PreviewConfig;
use crate::naming::ArtifactNames;
use crate::probe::probe_duration;
use crate::process::Toolchain;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub use full::{full_timestamps, generate_full, FULL_FRAMES};
pub use grid::{grid_timestamps, generate_grid, GridTier, GRID_FRAMES};

/// Preview layout requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreviewMode {
    #[default]
    Grid,
    Full,
}

/// Resolution tier of the preview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreviewQuality {
    Small,
    #[default]
    Medium,
    Large,
}

impl PreviewMode {
    /// Whether `quality` is meaningful for this mode (`full` has no small tier)
    pub fn accepts(self, quality: PreviewQuality) -> bool {
        !matches!((self, quality), (PreviewMode::Full, PreviewQuality::Small))
    }
}

impl fmt::Display for PreviewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreviewMode::Grid => write!(f, "grid"),
            PreviewMode::Full => write!(f, "full"),
        }
    }
}

impl fmt::Display for PreviewQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreviewQuality::Small => write!(f, "small"),
            PreviewQuality::Medium => write!(f, "medium"),
            PreviewQuality::Large => write!(f, "large"),
        }
    }
}

/// Mode and quality of one preview request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreviewSettings {
    pub mode: PreviewMode,
    pub quality: PreviewQuality,
}

/// Where scratch space lives and how long a source must be for each mode
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewLimits {
    pub scratch_root: PathBuf,
    pub min_grid_duration_secs: f64,
    pub min_full_duration_secs: f64,
}

impl PreviewLimits {
    pub fn from_config(cfg: &PreviewConfig) -> Self {
        Self {
            scratch_root: cfg.scratch_dir.clone(),
            min_grid_duration_secs: cfg.min_grid_duration_secs,
            min_full_duration_secs: cfg.min_full_duration_secs,
        }
    }

    pub fn minimum_for(&self, mode: PreviewMode) -> f64 {
        match mode {
            PreviewMode::Grid => self.min_grid_duration_secs,
            PreviewMode::Full => self.min_full_duration_secs,
        }
    }
}

impl Default for PreviewLimits {
    fn default() -> Self {
        Self::from_config(&PreviewConfig::default())
    }
}

/// Files produced by a successful preview
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewArtifacts {
    /// What a caller downloads (the sheet, or the ZIP)
    pub download: PathBuf,
    /// What a caller views inline (the sheet, or the first frame)
    pub image: PathBuf,
}

/// Result of the preview stage
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewOutcome {
    Generated(PreviewArtifacts),
    /// Source shorter than the mode's minimum
    Skipped { duration: f64, minimum: f64 },
    Failed(String),
}

/// Scratch directory unique to one preview invocation, removed on drop
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create `<root>/preview-<uuid>`, clearing anything already there
    pub fn create(root: &Path) -> io::Result<Self> {
        let path = root.join(format!("preview-{}", uuid::Uuid::new_v4()));
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir_all(&path)?;
        debug!(path = %path.display(), "created scratch directory");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove scratch directory");
            }
        }
    }
}

/// Generate the preview for `video`.
///
/// Probes the duration first; a source shorter than the mode's minimum (an
/// unreadable duration counts as `0.0`) is skipped without touching disk.
pub async fn generate(
    tools: &Toolchain,
    limits: &PreviewLimits,
    video: &Path,
    names: &ArtifactNames,
    settings: PreviewSettings,
) -> PreviewOutcome {
    let duration = probe_duration(tools, video).await;
    let minimum = limits.minimum_for(settings.mode);

    if duration < minimum {
        info!(
            video = %video.display(),
            duration,
            minimum,
            mode = %settings.mode,
            "source too short for preview"
        );
        return PreviewOutcome::Skipped { duration, minimum };
    }

    match settings.mode {
        PreviewMode::Grid => {
            let scratch = match ScratchDir::create(&limits.scratch_root) {
                Ok(scratch) => scratch,
                Err(e) => return PreviewOutcome::Failed(format!("cannot create scratch directory: {}", e)),
            };
            let tier = GridTier::for_quality(settings.quality);
            generate_grid(tools, video, duration, tier, scratch.path(), &names.thumbnail()).await
        }
        PreviewMode::Full => generate_full(tools, video, duration, settings.quality, names).await,
    }
}

/// ffmpeg wants seek offsets as plain decimal seconds
pub(crate) fn format_timestamp(secs: f64) -> String {
    format!("{:.3}", secs)
}

/// True if `path` exists and is non-empty
pub(crate) fn is_nonempty_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}
