// src/job.rs

//! Jobs: named units of work with declared prerequisites.
//!
//! A job is always handled through `Arc<Job>`; the handle returned by
//! [`Job::new`] is shared between the caller, the [`Task`](crate::Task) that
//! owns the scheduled set, and every dependent job. Completion is signalled
//! on the job's own mutex and condvar, so waiting on a job never touches the
//! loader's global lock.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::errors::LoadError;

/// Set of shared job handles, keyed by job identity.
pub type JobSet = HashSet<Arc<Job>>;

/// A job body. Runs exactly once on a worker thread, with a reference to its
/// own job so it can observe e.g. the current effective priority.
pub type JobFunc = dyn FnOnce(&Job) -> anyhow::Result<()> + Send;

/// Completion state of a job, derived on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Not finished yet.
    Pending,
    /// Finished without a captured failure.
    Success,
    /// Finished with a captured failure (including cancellation).
    Failed,
}

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Declared prerequisites. Append-only until the job is scheduled; the
/// loader freezes the set when it takes its own snapshot.
struct Dependencies {
    jobs: JobSet,
    frozen: bool,
}

struct Completion {
    finished: bool,
    error: Option<LoadError>,
    waiters: usize,
}

/// A named unit of work with declared prerequisites.
pub struct Job {
    id: u64,
    name: String,
    dependencies: Mutex<Dependencies>,
    func: Mutex<Option<Box<JobFunc>>>,
    priority: AtomicI64,
    completion: Mutex<Completion>,
    finished_cond: Condvar,
}

impl Job {
    /// Create a new shared job handle.
    pub fn new(
        name: impl Into<String>,
        dependencies: JobSet,
        func: impl FnOnce(&Job) -> anyhow::Result<()> + Send + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            dependencies: Mutex::new(Dependencies {
                jobs: dependencies,
                frozen: false,
            }),
            func: Mutex::new(Some(Box::new(func))),
            priority: AtomicI64::new(0),
            completion: Mutex::new(Completion {
                finished: false,
                error: None,
                waiters: 0,
            }),
            finished_cond: Condvar::new(),
        })
    }

    /// Human-readable job name, used in logs and failure messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current snapshot of the declared prerequisites.
    pub fn dependencies(&self) -> JobSet {
        self.dependencies.lock().jobs.clone()
    }

    /// Add a prerequisite. Fails once the job has been scheduled; from that
    /// point the loader works from its own snapshot of the set.
    pub fn add_dependency(&self, dep: &Arc<Job>) -> Result<(), LoadError> {
        let mut deps = self.dependencies.lock();
        if deps.frozen {
            return Err(LoadError::ScheduleFailed(format!(
                "cannot add prerequisite to job '{}': the job has been scheduled",
                self.name
            )));
        }
        deps.jobs.insert(Arc::clone(dep));
        Ok(())
    }

    /// Current effective priority. Readable from the job body without
    /// locking; raised (never lowered) by priority inheritance.
    pub fn priority(&self) -> i64 {
        self.priority.load(Ordering::Relaxed)
    }

    /// Completion status.
    pub fn status(&self) -> JobStatus {
        let completion = self.completion.lock();
        if !completion.finished {
            JobStatus::Pending
        } else if completion.error.is_some() {
            JobStatus::Failed
        } else {
            JobStatus::Success
        }
    }

    /// Block until the job finishes; a captured failure is returned.
    pub fn wait(&self) -> Result<(), LoadError> {
        let mut completion = self.completion.lock();
        completion.waiters += 1;
        while !completion.finished {
            self.finished_cond.wait(&mut completion);
        }
        completion.waiters -= 1;
        match &completion.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Block until the job finishes, swallowing any captured failure.
    pub fn wait_no_throw(&self) {
        let mut completion = self.completion.lock();
        completion.waiters += 1;
        while !completion.finished {
            self.finished_cond.wait(&mut completion);
        }
        completion.waiters -= 1;
    }

    /// Number of callers currently blocked in [`wait`](Self::wait) or
    /// [`wait_no_throw`](Self::wait_no_throw).
    pub fn waiters_count(&self) -> usize {
        self.completion.lock().waiters
    }

    pub(crate) fn set_priority(&self, priority: i64) {
        self.priority.store(priority, Ordering::Relaxed);
    }

    /// Freeze the prerequisite set and return a snapshot of it. The boolean
    /// reports whether this call performed the freeze, so a failed schedule
    /// can undo exactly what it did.
    pub(crate) fn freeze_dependencies(&self) -> (bool, JobSet) {
        let mut deps = self.dependencies.lock();
        let newly_frozen = !deps.frozen;
        deps.frozen = true;
        (newly_frozen, deps.jobs.clone())
    }

    pub(crate) fn unfreeze_dependencies(&self) {
        self.dependencies.lock().frozen = false;
    }

    pub(crate) fn take_func(&self) -> Option<Box<JobFunc>> {
        self.func.lock().take()
    }

    pub(crate) fn error(&self) -> Option<LoadError> {
        self.completion.lock().error.clone()
    }

    pub(crate) fn set_success(&self) {
        let mut completion = self.completion.lock();
        debug_assert!(!completion.finished, "job '{}' completed twice", self.name);
        completion.finished = true;
        if completion.waiters > 0 {
            self.finished_cond.notify_all();
        }
    }

    pub(crate) fn set_failure(&self, error: LoadError) {
        let mut completion = self.completion.lock();
        debug_assert!(!completion.finished, "job '{}' completed twice", self.name);
        completion.finished = true;
        completion.error = Some(error);
        if completion.waiters > 0 {
            self.finished_cond.notify_all();
        }
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {}

impl Hash for Job {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}
