//! CLI entry point for seedforge
//!
//! Parses command line arguments, installs logging and starts the daemon.

use clap::{Parser, ValueEnum};
use seedforge::{Config, Daemon};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// seedforge - torrent metafiles, MediaInfo reports and previews for a media library
#[derive(Parser, Debug)]
#[command(name = "seedforge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (defaults apply when it is missing)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Address the HTTP server binds to (overrides config and environment)
    #[arg(long)]
    bind: Option<String>,

    /// Root directory of the media library (overrides config and environment)
    #[arg(long)]
    media_root: Option<PathBuf>,

    /// Skip startup checks (tool availability, media root). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

fn init_logging(format: LogFormat) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init(),
    };
    result.map_err(|e| format!("failed to install tracing subscriber: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(args.log_format) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let mut config = match Config::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(media_root) = args.media_root {
        config.server.media_root = media_root;
    }

    info!(
        config = %args.config.display(),
        bind = %config.server.bind,
        media_root = %config.server.media_root.display(),
        "seedforge starting"
    );

    let daemon = if args.skip_checks {
        warn!("skipping startup checks (--skip-checks enabled)");
        Daemon::new_without_checks(config)
    } else {
        match Daemon::with_config(config) {
            Ok(daemon) => daemon,
            Err(e) => {
                error!(error = %e, "failed to initialize daemon");
                return ExitCode::FAILURE;
            }
        }
    };

    info!(
        max_concurrent_jobs = daemon.concurrency_plan.max_concurrent_jobs,
        queue_capacity = daemon.concurrency_plan.queue_capacity,
        "daemon initialized"
    );

    if let Err(e) = daemon.run_with_server().await {
        error!(error = %e, "daemon stopped");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
