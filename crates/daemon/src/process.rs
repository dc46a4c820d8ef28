//! External tool invocation for seedforge
//!
//! Every external program (ffprobe, ffmpeg, mediainfo, mktorrent) runs through
//! [`run_tool`], which captures output and enforces a wall-clock limit.

use crate::config::ToolsConfig;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Error type for tool invocations that never produced an exit status
#[derive(Debug, Error)]
pub enum ToolError {
    /// The process could not be started (missing binary, permissions)
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exceeded its time limit and was killed
    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },
}

/// Captured result of a finished tool invocation
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit status plus the last `max_chars` characters of stderr
    pub fn failure_summary(&self, max_chars: usize) -> String {
        let tail = tail_chars(self.stderr.trim(), max_chars);
        if tail.is_empty() {
            format!("{}", self.status)
        } else {
            format!("{}: {}", self.status, tail)
        }
    }
}

/// Locations of the external programs and the per-invocation time limit
#[derive(Debug, Clone, PartialEq)]
pub struct Toolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub mediainfo: PathBuf,
    pub mktorrent: PathBuf,
    pub timeout: Duration,
}

impl Toolchain {
    pub fn from_config(cfg: &ToolsConfig) -> Self {
        Self {
            ffmpeg: cfg.ffmpeg.clone(),
            ffprobe: cfg.ffprobe.clone(),
            mediainfo: cfg.mediainfo.clone(),
            mktorrent: cfg.mktorrent.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs.max(1)),
        }
    }
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::from_config(&ToolsConfig::default())
    }
}

/// Run a prepared command to completion, capturing stdout and stderr.
///
/// stdin is closed. If `timeout` elapses first, the child is killed and
/// [`ToolError::Timeout`] is returned. A non-zero exit is *not* an error here;
/// callers inspect [`ToolOutput::status`].
pub async fn run_tool(cmd: Command, timeout: Duration) -> Result<ToolOutput, ToolError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut cmd = tokio::process::Command::from(cmd);
    cmd.stdin(Stdio::null()).kill_on_drop(true);

    debug!(tool = %program, "running external tool");

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Ok(Err(source)) => Err(ToolError::Spawn { program, source }),
        Err(_) => Err(ToolError::Timeout {
            program,
            secs: timeout.as_secs(),
        }),
    }
}

/// Last `max_chars` characters of `s`, respecting char boundaries
pub fn tail_chars(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    s.chars().skip(count - max_chars).collect()
}


#[cfg(all(test, unix))]
pub(crate) mod test_support {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::process::{Command, Stdio};
    use std::time::Duration;

    const ETXTBSY: i32 = 26;

    /// Write an executable script and return once it can be exec'd.
    ///
    /// A child forked by a parallel test holds the write descriptor until its
    /// own exec, and exec of the script fails with ETXTBSY until then.
    pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        for _ in 0..200 {
            let spawned = Command::new(&path)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            match spawned {
                Err(e) if e.raw_os_error() == Some(ETXTBSY) => {
                    std::thread::sleep(Duration::from_millis(10))
                }
                _ => return path,
            }
        }
        panic!("{} stayed busy", path.display());
    }
}
