//! Metafile module for seedforge
//!
//! Builds and executes the `mktorrent` invocation that packages a job source
//! into a `.torrent` metafile.

use crate::pipeline::StageOutcome;
use crate::process::{run_tool, Toolchain};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::process::Command;

/// Piece length exponent used when a request leaves it empty (2^24 = 16 MiB)
pub const DEFAULT_PIECE_EXPONENT: u8 = 24;

/// Accepted piece length exponents (32 KiB to 256 MiB)
pub const PIECE_EXPONENT_RANGE: RangeInclusive<u8> = 15..=28;

/// Parameters for one mktorrent run
#[derive(Debug, Clone, PartialEq)]
pub struct MetafileParams {
    /// File or directory being packaged
    pub source: PathBuf,
    /// Destination `.torrent` path
    pub output: PathBuf,
    /// Tracker announce URL
    pub announce_url: String,
    /// Set the private flag
    pub private: bool,
    /// Free-text comment, omitted when empty
    pub comment: String,
    /// Piece length as a power of two
    pub piece_exponent: u8,
}

/// Build the mktorrent command
///
/// `mktorrent -v -l <exp> -a <url> [-p] [-c <comment>] -o <output> <source>`
pub fn build_mktorrent_command(tools: &Toolchain, params: &MetafileParams) -> Command {
    let mut cmd = Command::new(&tools.mktorrent);

    cmd.arg("-v");
    cmd.arg("-l").arg(params.piece_exponent.to_string());
    cmd.arg("-a").arg(&params.announce_url);

    if params.private {
        cmd.arg("-p");
    }

    if !params.comment.is_empty() {
        cmd.arg("-c").arg(&params.comment);
    }

    cmd.arg("-o").arg(&params.output);
    cmd.arg(&params.source);

    cmd
}

/// Run mktorrent; the stage succeeds only if it exits cleanly and the metafile exists.
pub async fn create_metafile(tools: &Toolchain, params: &MetafileParams) -> StageOutcome {
    let cmd = build_mktorrent_command(tools, params);
    let result = run_tool(cmd, tools.timeout).await;
    StageOutcome::from_tool(result, &params.output)
}
