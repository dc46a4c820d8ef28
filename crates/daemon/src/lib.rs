//! seedforge
//!
//! Background service that turns a media source into a `.torrent` metafile,
//! a MediaInfo report and a visual preview, tracking each job as a task.

pub mod concurrency;
pub mod daemon;
pub mod job_executor;
pub mod metafile;
pub mod naming;
pub mod pipeline;
pub mod preview;
pub mod probe;
pub mod process;
pub mod report;
pub mod scan;
pub mod server;
pub mod startup;
pub mod submit;
pub mod tasks;

pub use seedforge_config as config;
pub use seedforge_config::Config;
pub use concurrency::{derive_plan, ConcurrencyPlan};
pub use daemon::{Daemon, DaemonError};
pub use job_executor::{Job, JobError, JobExecutor};
pub use metafile::{build_mktorrent_command, create_metafile, MetafileParams};
pub use naming::ArtifactNames;
pub use pipeline::{run_pipeline, JobSettings, PipelineContext, PipelineError, StageOutcome};
pub use preview::{
    PreviewArtifacts, PreviewLimits, PreviewMode, PreviewOutcome, PreviewQuality, PreviewSettings,
};
pub use probe::{parse_duration, probe_duration};
pub use process::{run_tool, ToolError, ToolOutput, Toolchain};
pub use scan::{find_primary_media_file, PrimaryMedia};
pub use server::{create_router, run_server, AppState, ServerError};
pub use startup::{run_startup_checks, StartupError};
pub use submit::{canonical_source, task_id_for, JobRequest, JobSubmitter, SubmitError};
pub use tasks::{ArtifactKind, TaskSnapshot, TaskStatus, TaskStore};
