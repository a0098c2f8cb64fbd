// tests/common/mod.rs

//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::error::Error;
use std::sync::{Arc, Mutex};

use jobdag::{Job, JobSet, Loader, LoaderConfig};

pub type TestResult = Result<(), Box<dyn Error>>;

/// Loader with a single worker, so execution order is deterministic.
pub fn single_worker_loader() -> Loader {
    let _ = jobdag::logging::init_logging(None);
    Loader::new(LoaderConfig::default().with_max_workers(1))
}

/// Loader with an explicit worker count.
pub fn loader_with_workers(workers: usize) -> Loader {
    let _ = jobdag::logging::init_logging(None);
    Loader::new(LoaderConfig::default().with_max_workers(workers))
}

/// Shared log of job names in the order their bodies ran.
#[derive(Clone, Default)]
pub struct ExecutionLog(Arc<Mutex<Vec<String>>>);

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a job whose body appends its name to the log.
    pub fn job(&self, name: &str, deps: JobSet) -> Arc<Job> {
        let log = Arc::clone(&self.0);
        let entry = name.to_string();
        Job::new(name, deps, move |_| {
            log.lock().unwrap().push(entry);
            Ok(())
        })
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}
