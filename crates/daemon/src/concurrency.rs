//! Concurrency planning module for seedforge
//!
//! Derives the worker pool size and queue depth from CPU core count and configuration.

use crate::config::Config;

/// Concurrency plan derived from configuration and system resources
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyPlan {
    /// Total logical CPU cores available
    pub total_cores: u32,
    /// Maximum number of jobs whose pipelines run at the same time
    pub max_concurrent_jobs: u32,
    /// Number of accepted jobs that may wait for a free worker
    pub queue_capacity: u32,
}

impl ConcurrencyPlan {
    /// Derive a concurrency plan from configuration
    ///
    /// Uses the following rules:
    /// - Detects CPU cores via num_cpus if not specified in config
    /// - Derives max_concurrent_jobs: a quarter of the cores, between 1 and 4 (unless explicit)
    /// - Derives queue_capacity: 16 slots per worker (unless explicit)
    pub fn derive(cfg: &Config) -> Self {
        let total_cores = cfg
            .workers
            .logical_cores
            .unwrap_or_else(|| num_cpus::get() as u32)
            .max(1);

        let max_concurrent_jobs = if cfg.workers.max_concurrent_jobs > 0 {
            cfg.workers.max_concurrent_jobs
        } else {
            derive_max_jobs(total_cores)
        };

        let queue_capacity = if cfg.workers.queue_capacity > 0 {
            cfg.workers.queue_capacity
        } else {
            max_concurrent_jobs * 16
        };

        Self {
            total_cores,
            max_concurrent_jobs,
            queue_capacity,
        }
    }
}

/// Derive max concurrent jobs: a quarter of the cores, clamped to [1, 4]
fn derive_max_jobs(cores: u32) -> u32 {
    (cores / 4).clamp(1, 4)
}

/// Public function to derive a concurrency plan from configuration
pub fn derive_plan(cfg: &Config) -> ConcurrencyPlan {
    ConcurrencyPlan::derive(cfg)
}
