// src/lib.rs

//! Dependency-graph job loader.
//!
//! A [`Loader`] accepts sets of named jobs with declared prerequisites and
//! executes them on a bounded pool of worker threads, respecting dependency
//! order and a strict priority scheme (FIFO within a priority class, priority
//! inheritance across prerequisites). Failures propagate to all transitive
//! dependents; dropping the [`Task`] handle returned by [`Loader::schedule`]
//! cancels whatever has not started yet and waits for whatever has.
//!
//! ```
//! use jobdag::{Job, JobSet, Loader, LoaderConfig};
//!
//! let loader = Loader::new(LoaderConfig::default());
//!
//! let fetch = Job::new("fetch", JobSet::new(), |_| Ok(()));
//! let build = Job::new("build", JobSet::from([fetch.clone()]), |_| Ok(()));
//!
//! let task = loader.schedule(JobSet::from([fetch, build.clone()]), 0).unwrap();
//! loader.start();
//! build.wait().unwrap();
//! drop(task);
//! ```

pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod job;
pub mod logging;
pub mod metrics;
pub mod task;

pub use config::LoaderConfig;
pub use engine::{Loader, LoaderStats};
pub use errors::{LoadError, SubmitError};
pub use job::{Job, JobSet, JobStatus};
pub use metrics::MetricsSnapshot;
pub use task::Task;
