//! Job executor module for seedforge
//!
//! Runs job pipelines with concurrency limiting via semaphore and turns
//! systemic failures into an `error` task state.

use crate::naming::ArtifactNames;
use crate::pipeline::{run_pipeline, JobSettings, PipelineContext, PipelineError};
use crate::tasks::{TaskStatus, TaskStore};
use crate::ConcurrencyPlan;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, info};

/// Error type for job execution operations
#[derive(Debug, Error)]
pub enum JobError {
    /// The pipeline reported a systemic failure
    #[error("Pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),

    /// The pipeline task panicked or was cancelled
    #[error("Pipeline task aborted: {0}")]
    Aborted(#[from] tokio::task::JoinError),

    /// The executor's semaphore was closed
    #[error("Executor is shut down")]
    Closed,
}

/// A validated job ready to run
#[derive(Debug, Clone)]
pub struct Job {
    /// Canonical source path, also the task id
    pub task_id: String,
    /// Canonical source path
    pub source: PathBuf,
    /// Artifact locations derived at submission
    pub names: ArtifactNames,
    /// Per-job parameters
    pub settings: JobSettings,
}

/// Job executor that runs pipelines with concurrency limiting
///
/// Uses a tokio Semaphore to limit the number of concurrently running
/// pipelines according to the concurrency plan.
pub struct JobExecutor {
    /// Semaphore for limiting concurrent jobs
    semaphore: Arc<Semaphore>,
    /// Concurrency plan with job limits
    concurrency_plan: ConcurrencyPlan,
    /// Task store updated as jobs progress
    store: TaskStore,
    /// Tools and limits shared by all pipelines
    context: Arc<PipelineContext>,
}

impl JobExecutor {
    pub fn new(plan: ConcurrencyPlan, store: TaskStore, context: PipelineContext) -> Self {
        let permits = plan.max_concurrent_jobs.max(1) as usize;
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            concurrency_plan: plan,
            store,
            context: Arc::new(context),
        }
    }

    /// Get the number of available permits (slots for concurrent jobs)
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn concurrency_plan(&self) -> &ConcurrencyPlan {
        &self.concurrency_plan
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Acquire a permit for job execution, waiting if all slots are in use
    pub async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, JobError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| JobError::Closed)
    }

    /// Execute a job under a permit obtained from [`Self::acquire_permit`]
    ///
    /// 1. Marks the task running
    /// 2. Runs the pipeline on its own task so a panic is contained
    /// 3. Marks the task `error` on any systemic failure
    ///
    /// The permit is released when the job finishes. Returns the final task
    /// status.
    pub async fn execute(
        &self,
        job: Job,
        permit: OwnedSemaphorePermit,
    ) -> Result<TaskStatus, JobError> {
        let _permit = permit;

        self.store
            .update(&job.task_id, TaskStatus::Running, "Initializing...", None)
            .await;
        info!(task_id = %job.task_id, "job started");

        let store = self.store.clone();
        let context = self.context.clone();
        let task_id = job.task_id.clone();
        let handle =
            tokio::spawn(async move { run_pipeline(&context, &store, &job).await });

        let failure = match handle.await {
            Ok(Ok(message)) => {
                info!(task_id = %task_id, %message, "job finished");
                return Ok(TaskStatus::Done);
            }
            Ok(Err(e)) => JobError::Pipeline(e),
            Err(e) => JobError::Aborted(e),
        };

        error!(task_id = %task_id, error = %failure, "job failed");
        self.store
            .update(
                &task_id,
                TaskStatus::Error,
                format!("System error: {}", failure),
                None,
            )
            .await;
        Err(failure)
    }
}
