//! Artifact naming and idempotent cleanup
//!
//! Every artifact of a job shares the prefix `<base_name>` (the source's file
//! or directory name) inside the output subdirectory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Deterministic artifact paths for one job source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    base_name: String,
    output_dir: PathBuf,
}

impl ArtifactNames {
    pub fn new(base_name: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_name: base_name.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Derive names for `source`.
    ///
    /// A directory source writes into `<source>/<dir_name>`, a file source into
    /// `<parent>/<dir_name>`. Returns `None` when the source has no final component.
    pub fn for_source(source: &Path, is_dir: bool, dir_name: &str) -> Option<Self> {
        let base_name = source.file_name()?.to_string_lossy().into_owned();
        let output_dir = if is_dir {
            source.join(dir_name)
        } else {
            source.parent()?.join(dir_name)
        };
        Some(Self::new(base_name, output_dir))
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        self.output_dir.join(format!("{}{}", self.base_name, suffix))
    }

    pub fn metafile(&self) -> PathBuf {
        self.with_suffix(".torrent")
    }

    pub fn report(&self) -> PathBuf {
        self.with_suffix("_MediaInfo.txt")
    }

    pub fn thumbnail(&self) -> PathBuf {
        self.with_suffix("_Thumb.jpg")
    }

    /// Full-mode frame `n` (1-based sample index)
    pub fn shot(&self, n: usize) -> PathBuf {
        self.with_suffix(&format!("_shot_{}.jpg", n))
    }

    pub fn screenshots_zip(&self) -> PathBuf {
        self.with_suffix("_Screenshots.zip")
    }

    /// Folder of loose screenshots written by older releases
    pub fn legacy_screenshot_dir(&self) -> PathBuf {
        self.with_suffix("_Screenshots")
    }

    /// True if `file_name` is a JPEG produced for this base name.
    ///
    /// The base name must be followed by `_` or `.` so that `Movie` does not
    /// claim `Movie 2_Thumb.jpg`.
    pub fn owns_image(&self, file_name: &str) -> bool {
        let lower = file_name.to_ascii_lowercase();
        if !(lower.ends_with(".jpg") || lower.ends_with(".jpeg")) {
            return false;
        }
        match file_name.strip_prefix(self.base_name.as_str()) {
            Some(rest) => rest.starts_with('_') || rest.starts_with('.'),
            None => false,
        }
    }

    /// Remove every artifact a previous run may have left for this base name.
    ///
    /// Images are matched with [`Self::owns_image`], which is narrower than a
    /// bare prefix match: JPEGs of a sibling source whose name merely starts
    /// with this base name are left alone. Missing files are fine. Removal failures are logged and returned so the
    /// caller can surface them as warnings; they never abort the job.
    pub fn cleanup(&self) -> Vec<String> {
        let mut failures = Vec::new();

        for path in [self.metafile(), self.report(), self.screenshots_zip()] {
            remove_file_quiet(&path, &mut failures);
        }

        match fs::read_dir(&self.output_dir) {
            Ok(entries) => {
                for entry in entries.filter_map(|e| e.ok()) {
                    let name = entry.file_name();
                    let Some(name) = name.to_str() else {
                        continue;
                    };
                    if self.owns_image(name) && entry.path().is_file() {
                        remove_file_quiet(&entry.path(), &mut failures);
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(dir = %self.output_dir.display(), error = %e, "cannot list output directory");
                failures.push(format!("{}: {}", self.output_dir.display(), e));
            }
        }

        let legacy = self.legacy_screenshot_dir();
        if legacy.is_dir() {
            if let Err(e) = fs::remove_dir_all(&legacy) {
                warn!(path = %legacy.display(), error = %e, "failed to remove legacy screenshot folder");
                failures.push(format!("{}: {}", legacy.display(), e));
            } else {
                debug!(path = %legacy.display(), "removed legacy screenshot folder");
            }
        }

        failures
    }
}

fn remove_file_quiet(path: &Path, failures: &mut Vec<String>) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed previous artifact"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove previous artifact");
            failures.push(format!("{}: {}", path.display(), e));
        }
    }
}
