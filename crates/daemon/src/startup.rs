//! Startup checks module for seedforge
//!
//! Preflight checks run before the daemon accepts jobs:
//! - the media root exists and is a directory
//! - the scratch root can be created
//! - ffprobe, ffmpeg, mediainfo and mktorrent can be invoked

use crate::config::Config;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::info;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{tool} not available: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("Media root {0} is not a directory")]
    MediaRoot(String),

    #[error("Scratch directory {path} cannot be created: {source}")]
    ScratchDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// How to ask a tool whether it is installed
#[derive(Debug, Clone, Copy)]
struct ToolProbe {
    name: &'static str,
    arg: &'static str,
    /// mktorrent has no version flag and its help exit code varies between releases
    require_success: bool,
}

const FFPROBE: ToolProbe = ToolProbe { name: "ffprobe", arg: "-version", require_success: true };
const FFMPEG: ToolProbe = ToolProbe { name: "ffmpeg", arg: "-version", require_success: true };
const MEDIAINFO: ToolProbe = ToolProbe { name: "mediainfo", arg: "--Version", require_success: true };
const MKTORRENT: ToolProbe = ToolProbe { name: "mktorrent", arg: "-h", require_success: false };

/// First non-empty line of a tool's version banner
pub fn first_banner_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|line| !line.is_empty())
}

fn check_tool(probe: ToolProbe, program: &Path) -> Result<(), StartupError> {
    let unavailable = |reason: String| StartupError::ToolUnavailable {
        tool: probe.name.to_string(),
        reason,
    };

    let output = Command::new(program).arg(probe.arg).output().map_err(|e| {
        unavailable(format!(
            "{} {} failed; is it installed and in PATH? Error: {}",
            program.display(),
            probe.arg,
            e
        ))
    })?;

    if probe.require_success && !output.status.success() {
        return Err(unavailable(format!(
            "{} {} exited with {}",
            program.display(),
            probe.arg,
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let banner = first_banner_line(&stdout)
        .or_else(|| first_banner_line(&stderr))
        .unwrap_or("(no output)");
    info!(tool = probe.name, path = %program.display(), banner, "tool available");
    Ok(())
}

/// Verify every external tool can be invoked
pub fn check_tools_available(cfg: &Config) -> Result<(), StartupError> {
    check_tool(FFPROBE, &cfg.tools.ffprobe)?;
    check_tool(FFMPEG, &cfg.tools.ffmpeg)?;
    check_tool(MEDIAINFO, &cfg.tools.mediainfo)?;
    check_tool(MKTORRENT, &cfg.tools.mktorrent)?;
    Ok(())
}

pub fn check_media_root(cfg: &Config) -> Result<(), StartupError> {
    if cfg.server.media_root.is_dir() {
        Ok(())
    } else {
        Err(StartupError::MediaRoot(
            cfg.server.media_root.display().to_string(),
        ))
    }
}

pub fn check_scratch_root(cfg: &Config) -> Result<(), StartupError> {
    std::fs::create_dir_all(&cfg.preview.scratch_dir).map_err(|source| StartupError::ScratchDir {
        path: cfg.preview.scratch_dir.display().to_string(),
        source,
    })
}

/// Run all startup checks in order
///
/// 1. Media root
/// 2. Scratch root
/// 3. External tools
pub fn run_startup_checks(cfg: &Config) -> Result<(), StartupError> {
    check_media_root(cfg)?;
    check_scratch_root(cfg)?;
    check_tools_available(cfg)?;
    Ok(())
}
