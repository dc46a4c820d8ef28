//! Contact sheet (grid) preview
//!
//! Sixteen frames are sampled at the centres of equal slices of the source,
//! each scaled and padded to the same tile size, then tiled 4x4 with ffmpeg's
//! `tile` filter. Frames that cannot be extracted are replaced by a black tile
//! so the sheet layout never shifts.

use super::{format_timestamp, is_nonempty_file, PreviewArtifacts, PreviewOutcome, PreviewQuality};
use crate::process::{run_tool, tail_chars, Toolchain};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Frames per contact sheet
pub const GRID_FRAMES: usize = 16;

/// Tiling failures keep this many trailing stderr characters
const STDERR_TAIL_CHARS: usize = 200;

/// Tile dimensions and JPEG quantizer for one quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridTier {
    pub width: u32,
    pub height: u32,
    /// ffmpeg `-q:v` (2 is best, 31 worst)
    pub quantizer: u8,
}

impl GridTier {
    pub fn for_quality(quality: PreviewQuality) -> Self {
        let (width, quantizer) = match quality {
            PreviewQuality::Small => (320, 5),
            PreviewQuality::Medium => (640, 3),
            PreviewQuality::Large => (1280, 2),
        };
        Self {
            width,
            height: width * 9 / 16,
            quantizer,
        }
    }

    fn size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Letterbox into exactly `width x height`
    fn filter(&self) -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
            w = self.width,
            h = self.height
        )
    }
}

/// `t_i = i * (d/16) + d/32`: the midpoint of each sixteenth of the source
pub fn grid_timestamps(duration: f64) -> Vec<f64> {
    let interval = duration / GRID_FRAMES as f64;
    (0..GRID_FRAMES)
        .map(|i| i as f64 * interval + interval / 2.0)
        .collect()
}

/// Scratch file name of frame `index`, matching the `img_%02d.jpg` tile input pattern
pub fn frame_file_name(index: usize) -> String {
    format!("img_{:02}.jpg", index)
}

pub fn build_placeholder_command(tools: &Toolchain, tier: GridTier, output: &Path) -> Command {
    let mut cmd = Command::new(&tools.ffmpeg);
    cmd.args(["-y", "-f", "lavfi", "-i"])
        .arg(format!("color=c=black:s={}", tier.size()))
        .args(["-frames:v", "1"])
        .arg(output);
    cmd
}

pub fn build_frame_command(
    tools: &Toolchain,
    video: &Path,
    timestamp: f64,
    tier: GridTier,
    output: &Path,
) -> Command {
    let mut cmd = Command::new(&tools.ffmpeg);
    cmd.arg("-ss")
        .arg(format_timestamp(timestamp))
        .arg("-y")
        .arg("-i")
        .arg(video)
        .args(["-frames:v", "1"])
        .arg("-q:v")
        .arg(tier.quantizer.to_string())
        .arg("-vf")
        .arg(tier.filter())
        .arg(output);
    cmd
}

pub fn build_tile_command(tools: &Toolchain, scratch: &Path, output: &Path) -> Command {
    let mut cmd = Command::new(&tools.ffmpeg);
    cmd.arg("-y")
        .arg("-i")
        .arg(scratch.join("img_%02d.jpg"))
        .args(["-vf", "tile=4x4:padding=5:color=white", "-frames:v", "1"])
        .arg(output);
    cmd
}

/// Build the contact sheet at `output`, using `scratch` for intermediate frames.
pub async fn generate_grid(
    tools: &Toolchain,
    video: &Path,
    duration: f64,
    tier: GridTier,
    scratch: &Path,
    output: &Path,
) -> PreviewOutcome {
    let placeholder = scratch.join("blank.jpg");
    match run_tool(build_placeholder_command(tools, tier, &placeholder), tools.timeout).await {
        Ok(out) if out.success() => {}
        Ok(out) => warn!(summary = %out.failure_summary(STDERR_TAIL_CHARS), "placeholder render failed"),
        Err(e) => warn!(error = %e, "placeholder render failed"),
    }

    let mut substituted = 0usize;
    for (index, timestamp) in grid_timestamps(duration).into_iter().enumerate() {
        let frame: PathBuf = scratch.join(frame_file_name(index));
        let cmd = build_frame_command(tools, video, timestamp, tier, &frame);
        if let Err(e) = run_tool(cmd, tools.timeout).await {
            debug!(index, error = %e, "frame extraction did not run");
        }

        if !is_nonempty_file(&frame) {
            substituted += 1;
            if let Err(e) = fs::copy(&placeholder, &frame) {
                warn!(index, error = %e, "cannot substitute placeholder tile");
            }
        }
    }
    if substituted > 0 {
        warn!(video = %video.display(), substituted, "some frames replaced by black tiles");
    }

    let result = run_tool(build_tile_command(tools, scratch, output), tools.timeout).await;
    match result {
        Ok(out) if !out.success() => {
            return PreviewOutcome::Failed(format!(
                "tiling failed: {}",
                tail_chars(out.stderr.trim_end(), STDERR_TAIL_CHARS)
            ));
        }
        Ok(_) => {}
        Err(e) => return PreviewOutcome::Failed(e.to_string()),
    }

    if !is_nonempty_file(output) {
        return PreviewOutcome::Failed("contact sheet was not created".to_string());
    }

    PreviewOutcome::Generated(PreviewArtifacts {
        download: output.to_path_buf(),
        image: output.to_path_buf(),
    })
}
