//! Duration probing via ffprobe.
//!
//! Probing never fails: any problem running ffprobe or reading its output
//! yields a duration of `0.0`, which the preview stage treats as too short.

use crate::process::{run_tool, Toolchain};
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// Builds `ffprobe -v error -show_entries format=duration -of default=noprint_wrappers=1:nokey=1 <path>`.
pub fn build_duration_command(tools: &Toolchain, path: &Path) -> Command {
    let mut cmd = Command::new(&tools.ffprobe);
    cmd.args([
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ])
    .arg(path);
    cmd
}

/// Parses ffprobe's bare duration output (e.g. `"7200.040000\n"`).
///
/// Returns `None` for empty output, `N/A`, and non-finite or negative values.
pub fn parse_duration(output: &str) -> Option<f64> {
    let value: f64 = output.lines().next()?.trim().parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value)
    } else {
        None
    }
}

/// Container duration of `path` in seconds, or `0.0` when it cannot be determined.
pub async fn probe_duration(tools: &Toolchain, path: &Path) -> f64 {
    let cmd = build_duration_command(tools, path);
    let output = match run_tool(cmd, tools.timeout).await {
        Ok(output) => output,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "duration probe failed");
            return 0.0;
        }
    };

    if !output.success() {
        warn!(
            path = %path.display(),
            status = %output.status,
            "ffprobe exited unsuccessfully"
        );
        return 0.0;
    }

    match parse_duration(&output.stdout) {
        Some(duration) => {
            debug!(path = %path.display(), duration, "probed duration");
            duration
        }
        None => {
            warn!(path = %path.display(), stdout = %output.stdout.trim(), "unparsable ffprobe duration");
            0.0
        }
    }
}
