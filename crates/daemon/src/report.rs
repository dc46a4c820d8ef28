//! MediaInfo report generation.

use crate::pipeline::StageOutcome;
use crate::process::{run_tool, Toolchain};
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

/// `mediainfo <media> --LogFile=<report>`
pub fn build_mediainfo_command(tools: &Toolchain, media: &Path, report: &Path) -> Command {
    let mut log_file = OsString::from("--LogFile=");
    log_file.push(report);

    let mut cmd = Command::new(&tools.mediainfo);
    cmd.arg(media).arg(log_file);
    cmd
}

pub async fn write_report(tools: &Toolchain, media: &Path, report: &Path) -> StageOutcome {
    let cmd = build_mediainfo_command(tools, media, report);
    StageOutcome::from_tool(run_tool(cmd, tools.timeout).await, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_build_mediainfo_command() {
        let tools = Toolchain {
            mediainfo: PathBuf::from("/usr/bin/mediainfo"),
            ..Toolchain::default()
        };
        let cmd = build_mediainfo_command(
            &tools,
            Path::new("/data/Movie/movie.mkv"),
            Path::new("/data/Movie/torrent/Movie_MediaInfo.txt"),
        );
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(cmd.get_program(), "/usr/bin/mediainfo");
        assert_eq!(
            args,
            vec![
                "/data/Movie/movie.mkv",
                "--LogFile=/data/Movie/torrent/Movie_MediaInfo.txt",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_exit_without_report_is_failure() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let tools = Toolchain {
            mediainfo: PathBuf::from("true"),
            ..Toolchain::default()
        };
        let report = temp_dir.path().join("Movie_MediaInfo.txt");

        let outcome = write_report(&tools, Path::new("/data/movie.mkv"), &report).await;
        match outcome {
            StageOutcome::Failed(reason) => assert!(reason.contains("not created")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
