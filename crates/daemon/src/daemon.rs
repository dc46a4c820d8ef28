//! Daemon startup and main loop for seedforge
//!
//! Owns the configuration, the task store, the bounded job queue and the
//! executor, and feeds queued jobs to the executor.

use crate::concurrency::{derive_plan, ConcurrencyPlan};
use crate::config::{Config, ConfigError};
use crate::job_executor::{Job, JobError, JobExecutor};
use crate::pipeline::PipelineContext;
use crate::server::{run_server, AppState, ServerError};
use crate::startup::{run_startup_checks, StartupError};
use crate::submit::JobSubmitter;
use crate::tasks::TaskStore;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Server error
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// The executor stopped handing out permits
    #[error("Executor error: {0}")]
    Executor(#[from] JobError),

    /// The worker loop was started twice
    #[error("Job queue receiver already taken")]
    AlreadyRunning,
}

/// Daemon state containing all runtime components
pub struct Daemon {
    /// Configuration loaded from file and environment
    pub config: Config,
    /// Derived concurrency plan
    pub concurrency_plan: ConcurrencyPlan,
    /// Task registry shared with the HTTP surface
    pub store: TaskStore,
    /// Job executor for running pipelines
    pub executor: Arc<JobExecutor>,
    /// Job queue sender
    job_tx: mpsc::Sender<Job>,
    /// Job queue receiver, taken by the worker loop
    job_rx: Mutex<Option<mpsc::Receiver<Job>>>,
}

impl Daemon {
    /// Load configuration from `config_path`, run startup checks and build the daemon
    pub fn new<P: AsRef<Path>>(config_path: P) -> Result<Self, DaemonError> {
        let config = Config::load_or_default(config_path)?;
        Self::with_config(config)
    }

    /// Run startup checks against an already loaded configuration
    pub fn with_config(config: Config) -> Result<Self, DaemonError> {
        run_startup_checks(&config)?;
        Ok(Self::new_without_checks(config))
    }

    /// Build the daemon without running startup checks
    ///
    /// Useful for testing when external tools are not available.
    pub fn new_without_checks(config: Config) -> Self {
        let concurrency_plan = derive_plan(&config);
        let store = TaskStore::new();
        let executor = Arc::new(JobExecutor::new(
            concurrency_plan.clone(),
            store.clone(),
            PipelineContext::from_config(&config),
        ));
        let (job_tx, job_rx) = mpsc::channel(concurrency_plan.queue_capacity.max(1) as usize);

        info!(
            cores = concurrency_plan.total_cores,
            max_concurrent_jobs = concurrency_plan.max_concurrent_jobs,
            queue_capacity = concurrency_plan.queue_capacity,
            "concurrency plan derived"
        );

        Self {
            config,
            concurrency_plan,
            store,
            executor,
            job_tx,
            job_rx: Mutex::new(Some(job_rx)),
        }
    }

    /// Submission handle feeding this daemon's queue
    pub fn submitter(&self) -> JobSubmitter {
        JobSubmitter::new(self.store.clone(), self.job_tx.clone(), &self.config)
    }

    pub fn store(&self) -> TaskStore {
        self.store.clone()
    }

    /// State for the HTTP router
    pub fn app_state(&self) -> AppState {
        AppState::new(self.submitter(), self.store.clone())
    }

    /// Run the worker loop
    ///
    /// A job is taken off the queue only once an executor permit is free, so
    /// waiting jobs stay in the bounded queue and submissions beyond its
    /// capacity are rejected. Returns when every sender is gone.
    pub async fn run(&self) -> Result<(), DaemonError> {
        let mut rx = self
            .job_rx
            .lock()
            .await
            .take()
            .ok_or(DaemonError::AlreadyRunning)?;

        loop {
            let permit = self.executor.acquire_permit().await?;
            let Some(job) = rx.recv().await else {
                break;
            };

            let executor = self.executor.clone();
            tokio::spawn(async move {
                let task_id = job.task_id.clone();
                if let Err(e) = executor.execute(job, permit).await {
                    error!(task_id = %task_id, error = %e, "job execution failed");
                }
            });
        }

        info!("job queue closed, worker loop exiting");
        Ok(())
    }

    /// Run the HTTP server and the worker loop together
    ///
    /// Returns when either stops.
    pub async fn run_with_server(&self) -> Result<(), DaemonError> {
        let server = run_server(&self.config.server.bind, self.app_state());
        tokio::select! {
            result = server => result.map_err(DaemonError::from),
            result = self.run() => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkersConfig;
    use crate::tasks::TaskStatus;
    use std::time::Duration;

    fn create_test_config(media_root: &Path) -> Config {
        let mut config = Config {
            workers: WorkersConfig {
                logical_cores: Some(8),
                max_concurrent_jobs: 0,
                queue_capacity: 0,
            },
            ..Config::default()
        };
        config.server.media_root = media_root.to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_daemon_derives_concurrency_plan() {
        let root = tempfile::TempDir::new().unwrap();
        let daemon = Daemon::new_without_checks(create_test_config(root.path()));

        assert_eq!(daemon.concurrency_plan.total_cores, 8);
        assert_eq!(daemon.concurrency_plan.max_concurrent_jobs, 2);
        assert_eq!(daemon.concurrency_plan.queue_capacity, 32);
        assert_eq!(daemon.executor.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let root = tempfile::TempDir::new().unwrap();
        let daemon = Arc::new(Daemon::new_without_checks(create_test_config(root.path())));

        let first = daemon.clone();
        let handle = tokio::spawn(async move { first.run().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(daemon.run().await, Err(DaemonError::AlreadyRunning)));
        handle.abort();
    }

    #[tokio::test]
    async fn test_submitted_job_reaches_terminal_state() {
        let root = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("Empty")).unwrap();

        let mut config = create_test_config(root.path());
        // no external tool is reachable: every stage fails softly
        config.tools.mktorrent = "/nonexistent/mktorrent".into();
        let daemon = Arc::new(Daemon::new_without_checks(config));

        let runner = daemon.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        let submitter = daemon.submitter();
        let task_id = submitter
            .submit(serde_json::from_str(r#"{"source_path":"Empty"}"#).unwrap())
            .await
            .unwrap();

        let mut snapshot = None;
        for _ in 0..200 {
            let task = daemon.store().get(&task_id).await.unwrap();
            if task.status.is_terminal() {
                snapshot = Some(task);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        let task = snapshot.expect("task should finish");
        assert_eq!(task.status, TaskStatus::Done);
        assert!(task.message.starts_with("Completed (no media file found)"));
        assert!(task.message.contains("metafile:"));
        assert!(task.artifacts.is_empty());
    }
}
