//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Announce URL used when a job request leaves the tracker empty.
pub const DEFAULT_ANNOUNCE_URL: &str = "http://udp.opentrackr.org:1337/announce";

/// HTTP surface configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Root directory every job source and downloadable artifact must live under
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
    /// Announce URL applied when a request does not carry one
    #[serde(default = "default_announce_url")]
    pub default_announce_url: String,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_media_root() -> PathBuf {
    PathBuf::from("/data")
}

fn default_announce_url() -> String {
    DEFAULT_ANNOUNCE_URL.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            media_root: default_media_root(),
            default_announce_url: default_announce_url(),
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkersConfig {
    /// Number of logical cores (auto-detected if None)
    pub logical_cores: Option<u32>,
    /// Maximum jobs running at once (0 = auto-derive)
    #[serde(default)]
    pub max_concurrent_jobs: u32,
    /// Jobs that may wait for a worker before submissions are rejected (0 = auto-derive)
    #[serde(default)]
    pub queue_capacity: u32,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            logical_cores: None,
            max_concurrent_jobs: 0,
            queue_capacity: 0,
        }
    }
}

/// External tool locations and limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
    #[serde(default = "default_mediainfo")]
    pub mediainfo: PathBuf,
    #[serde(default = "default_mktorrent")]
    pub mktorrent: PathBuf,
    /// Wall-clock limit for a single tool invocation, in seconds
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_mediainfo() -> PathBuf {
    PathBuf::from("mediainfo")
}

fn default_mktorrent() -> PathBuf {
    PathBuf::from("mktorrent")
}

fn default_tool_timeout_secs() -> u64 {
    1800
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            mediainfo: default_mediainfo(),
            mktorrent: default_mktorrent(),
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// Artifact output layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Name of the subdirectory artifacts are written to, next to (or inside) the source
    #[serde(default = "default_output_dir_name")]
    pub dir_name: String,
    /// Files at or below this size are never picked as the primary media file
    #[serde(default = "default_min_media_bytes")]
    pub min_media_bytes: u64,
}

fn default_output_dir_name() -> String {
    "torrent".to_string()
}

fn default_min_media_bytes() -> u64 {
    50 * 1024 * 1024
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir_name: default_output_dir_name(),
            min_media_bytes: default_min_media_bytes(),
        }
    }
}

/// Preview generation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviewConfig {
    /// Parent directory for per-invocation scratch directories
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Sources shorter than this get no contact sheet
    #[serde(default = "default_min_grid_duration_secs")]
    pub min_grid_duration_secs: f64,
    /// Sources shorter than this get no screenshot archive
    #[serde(default = "default_min_full_duration_secs")]
    pub min_full_duration_secs: f64,
}

fn default_scratch_dir() -> PathBuf {
    env::temp_dir().join("seedforge")
}

fn default_min_grid_duration_secs() -> f64 {
    10.0
}

fn default_min_full_duration_secs() -> f64 {
    60.0
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            min_grid_duration_secs: default_min_grid_duration_secs(),
            min_full_duration_secs: default_min_full_duration_secs(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - SEEDFORGE_BIND -> server.bind
    /// - SEEDFORGE_MEDIA_ROOT -> server.media_root
    /// - SEEDFORGE_DEFAULT_ANNOUNCE_URL -> server.default_announce_url
    /// - SEEDFORGE_MAX_CONCURRENT_JOBS -> workers.max_concurrent_jobs
    /// - SEEDFORGE_QUEUE_CAPACITY -> workers.queue_capacity
    /// - SEEDFORGE_TOOL_TIMEOUT_SECS -> tools.timeout_secs
    /// - SEEDFORGE_SCRATCH_DIR -> preview.scratch_dir
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("SEEDFORGE_BIND") {
            if !val.trim().is_empty() {
                self.server.bind = val.trim().to_string();
            }
        }

        if let Ok(val) = env::var("SEEDFORGE_MEDIA_ROOT") {
            if !val.trim().is_empty() {
                self.server.media_root = PathBuf::from(val.trim());
            }
        }

        if let Ok(val) = env::var("SEEDFORGE_DEFAULT_ANNOUNCE_URL") {
            if !val.trim().is_empty() {
                self.server.default_announce_url = val.trim().to_string();
            }
        }

        if let Ok(val) = env::var("SEEDFORGE_MAX_CONCURRENT_JOBS") {
            if let Ok(jobs) = val.parse::<u32>() {
                self.workers.max_concurrent_jobs = jobs;
            }
        }

        if let Ok(val) = env::var("SEEDFORGE_QUEUE_CAPACITY") {
            if let Ok(capacity) = val.parse::<u32>() {
                self.workers.queue_capacity = capacity;
            }
        }

        if let Ok(val) = env::var("SEEDFORGE_TOOL_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.tools.timeout_secs = secs;
            }
        }

        if let Ok(val) = env::var("SEEDFORGE_SCRATCH_DIR") {
            if !val.trim().is_empty() {
                self.preview.scratch_dir = PathBuf::from(val.trim());
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = match Self::load_from_file(path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear all config-related env vars
    fn clear_env_vars() {
        env::remove_var("SEEDFORGE_BIND");
        env::remove_var("SEEDFORGE_MEDIA_ROOT");
        env::remove_var("SEEDFORGE_DEFAULT_ANNOUNCE_URL");
        env::remove_var("SEEDFORGE_MAX_CONCURRENT_JOBS");
        env::remove_var("SEEDFORGE_QUEUE_CAPACITY");
        env::remove_var("SEEDFORGE_TOOL_TIMEOUT_SECS");
        env::remove_var("SEEDFORGE_SCRATCH_DIR");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            logical_cores in proptest::option::of(1u32..256),
            max_jobs in 0u32..16,
            queue in 0u32..512,
            timeout in 1u64..100_000,
            dir_name in "[a-z]{1,12}",
            min_bytes in 0u64..10_000_000_000,
            grid_min in 0.0f64..120.0,
            full_min in 0.0f64..600.0,
        ) {
            let toml_str = format!(
                r#"
[server]
bind = "127.0.0.1:9000"
media_root = "/srv/media"

[workers]
{}
max_concurrent_jobs = {}
queue_capacity = {}

[tools]
ffmpeg = "/opt/bin/ffmpeg"
timeout_secs = {}

[output]
dir_name = "{}"
min_media_bytes = {}

[preview]
min_grid_duration_secs = {:?}
min_full_duration_secs = {:?}
"#,
                logical_cores.map(|c| format!("logical_cores = {}", c)).unwrap_or_default(),
                max_jobs,
                queue,
                timeout,
                dir_name,
                min_bytes,
                grid_min,
                full_min,
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.server.bind.as_str(), "127.0.0.1:9000");
            prop_assert_eq!(config.server.media_root, PathBuf::from("/srv/media"));
            prop_assert_eq!(config.workers.logical_cores, logical_cores);
            prop_assert_eq!(config.workers.max_concurrent_jobs, max_jobs);
            prop_assert_eq!(config.workers.queue_capacity, queue);
            prop_assert_eq!(config.tools.ffmpeg, PathBuf::from("/opt/bin/ffmpeg"));
            prop_assert_eq!(config.tools.ffprobe, PathBuf::from("ffprobe"));
            prop_assert_eq!(config.tools.timeout_secs, timeout);
            prop_assert_eq!(config.output.dir_name, dir_name);
            prop_assert_eq!(config.output.min_media_bytes, min_bytes);
            prop_assert!((config.preview.min_grid_duration_secs - grid_min).abs() < 1e-9);
            prop_assert!((config.preview.min_full_duration_secs - full_min).abs() < 1e-9);
        }

        #[test]
        fn prop_env_overrides_worker_limits(
            initial_jobs in 0u32..8,
            override_jobs in 0u32..16,
            override_queue in 0u32..1024,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[workers]
max_concurrent_jobs = {}
"#,
                initial_jobs
            );

            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("SEEDFORGE_MAX_CONCURRENT_JOBS", override_jobs.to_string());
            env::set_var("SEEDFORGE_QUEUE_CAPACITY", override_queue.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.workers.max_concurrent_jobs, override_jobs);
            prop_assert_eq!(config.workers.queue_capacity, override_queue);
        }

        #[test]
        fn prop_env_overrides_tool_timeout(
            initial in 1u64..1000,
            override_secs in 1u64..100_000,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[tools]
timeout_secs = {}
"#,
                initial
            );

            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("SEEDFORGE_TOOL_TIMEOUT_SECS", override_secs.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.tools.timeout_secs, override_secs);
        }
    }

    #[test]
    fn test_env_overrides_paths_and_urls() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("SEEDFORGE_MEDIA_ROOT", "/mnt/library");
        env::set_var("SEEDFORGE_BIND", "127.0.0.1:8080");
        env::set_var("SEEDFORGE_DEFAULT_ANNOUNCE_URL", "https://tracker.example/announce");
        env::set_var("SEEDFORGE_SCRATCH_DIR", "/var/tmp/forge");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.server.media_root, PathBuf::from("/mnt/library"));
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(
            config.server.default_announce_url,
            "https://tracker.example/announce"
        );
        assert_eq!(config.preview.scratch_dir, PathBuf::from("/var/tmp/forge"));
    }

    #[test]
    fn test_invalid_numeric_override_keeps_existing() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        config.workers.max_concurrent_jobs = 3;
        env::set_var("SEEDFORGE_MAX_CONCURRENT_JOBS", "lots");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.workers.max_concurrent_jobs, 3);
    }

    // Test that missing sections use defaults
    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert_eq!(config.server.media_root, PathBuf::from("/data"));
        assert_eq!(config.server.default_announce_url, DEFAULT_ANNOUNCE_URL);
        assert_eq!(config.workers.logical_cores, None);
        assert_eq!(config.workers.max_concurrent_jobs, 0);
        assert_eq!(config.tools.mktorrent, PathBuf::from("mktorrent"));
        assert_eq!(config.tools.timeout_secs, 1800);
        assert_eq!(config.output.dir_name, "torrent");
        assert_eq!(config.output.min_media_bytes, 50 * 1024 * 1024);
        assert!((config.preview.min_grid_duration_secs - 10.0).abs() < f64::EPSILON);
        assert!((config.preview.min_full_duration_secs - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.toml"))
            .expect("missing file should not be an error");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[workers\nmax_concurrent_jobs = ").unwrap();

        let err = Config::load_or_default(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().starts_with("Failed to parse config"));
    }
}
