//! Full-resolution screenshot preview
//!
//! Six frames are taken at `d*i/7` for `i` in 1..=6, which keeps away from
//! the opening and closing credits. Frames land directly in the output
//! directory and are also packaged into a deflate ZIP.

use super::{format_timestamp, is_nonempty_file, PreviewArtifacts, PreviewOutcome, PreviewQuality};
use crate::naming::ArtifactNames;
use crate::process::{run_tool, Toolchain};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, warn};

/// Frames sampled in full mode
pub const FULL_FRAMES: usize = 6;

/// Width frames are scaled to at `medium` quality
const MEDIUM_WIDTH: u32 = 1920;

#[derive(Debug, Error)]
enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

pub fn full_timestamps(duration: f64) -> Vec<f64> {
    (1..=FULL_FRAMES)
        .map(|i| duration * i as f64 / (FULL_FRAMES + 1) as f64)
        .collect()
}

pub fn build_full_frame_command(
    tools: &Toolchain,
    video: &Path,
    timestamp: f64,
    quality: PreviewQuality,
    output: &Path,
) -> Command {
    let mut cmd = Command::new(&tools.ffmpeg);
    cmd.arg("-ss")
        .arg(format_timestamp(timestamp))
        .arg("-y")
        .arg("-i")
        .arg(video)
        .args(["-frames:v", "1", "-q:v", "2"]);

    // large keeps the native resolution
    if quality != PreviewQuality::Large {
        cmd.arg("-vf").arg(format!("scale={}:-2", MEDIUM_WIDTH));
    }

    cmd.arg(output);
    cmd
}

/// Write `frames` into a deflate-compressed archive at `zip_path`, stored by file name.
fn write_archive(zip_path: &Path, frames: &[PathBuf]) -> Result<(), ArchiveError> {
    let file = File::create(zip_path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for frame in frames {
        let name = frame
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        writer.start_file(name, options)?;
        let mut source = File::open(frame)?;
        io::copy(&mut source, &mut writer)?;
    }

    writer.finish()?;
    Ok(())
}

/// Extract the full-mode frames and package them.
///
/// Failed frames are omitted rather than substituted. With no frame at all
/// the stage fails.
pub async fn generate_full(
    tools: &Toolchain,
    video: &Path,
    duration: f64,
    quality: PreviewQuality,
    names: &ArtifactNames,
) -> PreviewOutcome {
    let mut frames = Vec::with_capacity(FULL_FRAMES);

    for (i, timestamp) in full_timestamps(duration).into_iter().enumerate() {
        let shot = names.shot(i + 1);
        let cmd = build_full_frame_command(tools, video, timestamp, quality, &shot);
        match run_tool(cmd, tools.timeout).await {
            Ok(out) if !out.success() => {
                debug!(frame = i + 1, status = %out.status, "frame extraction failed")
            }
            Ok(_) => {}
            Err(e) => debug!(frame = i + 1, error = %e, "frame extraction did not run"),
        }

        if is_nonempty_file(&shot) {
            frames.push(shot);
        } else {
            // an empty leftover must not be mistaken for an artifact
            let _ = fs::remove_file(&shot);
        }
    }

    if frames.is_empty() {
        return PreviewOutcome::Failed("no frame could be extracted".to_string());
    }
    if frames.len() < FULL_FRAMES {
        warn!(
            video = %video.display(),
            extracted = frames.len(),
            "some screenshots could not be extracted"
        );
    }

    let zip_path = names.screenshots_zip();
    let archive_frames = frames.clone();
    let archive_path = zip_path.clone();
    let packaged =
        tokio::task::spawn_blocking(move || write_archive(&archive_path, &archive_frames)).await;

    match packaged {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return PreviewOutcome::Failed(format!("cannot package screenshots: {}", e)),
        Err(e) => return PreviewOutcome::Failed(format!("packaging task failed: {}", e)),
    }

    PreviewOutcome::Generated(PreviewArtifacts {
        download: zip_path,
        image: frames.swap_remove(0),
    })
}
