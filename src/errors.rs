// src/errors.rs

//! Crate-wide error types.
//!
//! Job failures are captured inside the job itself and only reach a caller
//! through [`Job::wait`](crate::job::Job::wait); dependent jobs receive a
//! [`LoadError::DependencyFailed`] whose message quotes the upstream failure,
//! so waiting anywhere in a failed subtree shows the full chain back to the
//! originating job.

use thiserror::Error;

/// Failure captured in a job or returned from a loader operation.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The job set could not be scheduled; the loader was left untouched.
    #[error("schedule failed: {0}")]
    ScheduleFailed(String),

    /// The job's own body returned an error or panicked.
    #[error("load job '{job}' failed: {message}")]
    LoadFailed { job: String, message: String },

    /// A transitive prerequisite of this job failed or was canceled.
    #[error("load job '{job}' -> {message}")]
    DependencyFailed { job: String, message: String },

    /// The job was removed before a worker picked it up.
    #[error("load job '{job}' canceled")]
    LoadCanceled { job: String },
}

/// Returned by [`ThreadPool::submit`](crate::exec::ThreadPool::submit) once
/// the pool has been shut down.
#[derive(Debug, Clone, Copy, Error)]
#[error("thread pool is shut down; submission rejected")]
pub struct SubmitError;
