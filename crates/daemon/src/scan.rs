//! Scanner module for locating the primary media file of a job source.
//!
//! A job source is either a single file or a directory tree (a season pack,
//! a disc rip with extras). Metadata and previews are generated for the single
//! largest qualifying file in the tree.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Files at or below this size are never considered media (samples, subtitles, nfo).
pub const MIN_MEDIA_BYTES: u64 = 50 * 1024 * 1024;

/// A file picked as the subject of metadata and preview generation.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryMedia {
    /// Full path to the file.
    pub path: PathBuf,
    /// File size in bytes at discovery time.
    pub size_bytes: u64,
}

/// Finds the primary media file for a job source.
///
/// - If `source` is a file, it is returned as-is, whatever its size.
/// - If it is a directory, the tree is walked recursively, pruning every
///   directory named `excluded_dir` (previously generated artifacts).
/// - Among regular files strictly larger than `min_bytes`, the largest wins;
///   ties keep the first one encountered. Entries are visited in file-name
///   order so the result is deterministic.
/// - Unreadable entries are skipped.
pub fn find_primary_media_file(
    source: &Path,
    excluded_dir: &str,
    min_bytes: u64,
) -> Option<PrimaryMedia> {
    let metadata = std::fs::metadata(source).ok()?;
    if metadata.is_file() {
        return Some(PrimaryMedia {
            path: source.to_path_buf(),
            size_bytes: metadata.len(),
        });
    }
    if !metadata.is_dir() {
        return None;
    }

    let walker = WalkDir::new(source)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            // Never descend into the artifact output folder (the root itself is allowed)
            !(entry.depth() > 0
                && entry.file_type().is_dir()
                && entry.file_name().to_str() == Some(excluded_dir))
        });

    let mut best: Option<PrimaryMedia> = None;

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let size_bytes = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(_) => continue,
        };

        if size_bytes <= min_bytes {
            continue;
        }

        if best.as_ref().map_or(true, |b| size_bytes > b.size_bytes) {
            best = Some(PrimaryMedia {
                path: entry.into_path(),
                size_bytes,
            });
        }
    }

    best
}
