// src/config.rs

//! Loader configuration.

use std::thread;

/// Tuning knobs for a [`Loader`](crate::Loader).
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Upper bound on concurrently executing jobs. Also the number of OS
    /// threads the worker pool creates. Clamped to at least 1.
    pub max_workers: usize,

    /// Prefix for pool thread names (`<prefix>-worker-<n>`).
    pub thread_name_prefix: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_workers: available_parallelism(),
            thread_name_prefix: "jobdag".to_string(),
        }
    }
}

impl LoaderConfig {
    /// Configuration with an explicit worker cap.
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            ..Self::default()
        }
    }

    /// Set the worker cap.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Set the pool thread-name prefix.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }
}

/// Number of logical CPU cores, used as the default worker cap.
fn available_parallelism() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
