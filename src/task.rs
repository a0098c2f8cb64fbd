// src/task.rs

//! Owning handle over a scheduled job set.

use std::sync::Arc;

use crate::engine::loader::LoaderCore;
use crate::job::JobSet;

/// Scoped owner of the job set passed to
/// [`Loader::schedule`](crate::Loader::schedule).
///
/// Dropping the handle removes its jobs from the loader: not-yet-started
/// jobs are canceled, executing jobs are waited for, finished jobs are
/// dropped from the finished set. Use [`detach`](Self::detach) to abandon
/// ownership without canceling anything.
pub struct Task {
    core: Option<Arc<LoaderCore>>,
    jobs: JobSet,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("attached", &self.core.is_some())
            .field("jobs", &self.jobs)
            .finish()
    }
}

impl Task {
    pub(crate) fn new(core: Arc<LoaderCore>, jobs: JobSet) -> Self {
        Self {
            core: Some(core),
            jobs,
        }
    }

    /// Handle that owns nothing; useful as an accumulator for
    /// [`merge`](Self::merge).
    pub fn empty() -> Self {
        Self {
            core: None,
            jobs: JobSet::new(),
        }
    }

    /// The owned job set.
    pub fn jobs(&self) -> &JobSet {
        &self.jobs
    }

    /// Remove the owned jobs from the loader now instead of at drop.
    /// Idempotent.
    pub fn remove(&mut self) {
        if let Some(core) = self.core.take() {
            core.remove(&self.jobs);
            self.jobs.clear();
        }
    }

    /// Abandon ownership: the jobs stay scheduled and nothing is canceled
    /// when this handle drops.
    pub fn detach(&mut self) {
        self.core = None;
        self.jobs.clear();
    }

    /// Fold another handle into this one, unioning the job sets. Both
    /// handles must come from the same loader; merging handles of different
    /// loaders is a programming error.
    pub fn merge(&mut self, mut other: Task) {
        match (&self.core, &other.core) {
            (None, _) => {
                self.core = other.core.take();
                self.jobs = std::mem::take(&mut other.jobs);
            }
            (Some(_), None) => {}
            (Some(mine), Some(theirs)) => {
                assert!(
                    Arc::ptr_eq(mine, theirs),
                    "cannot merge task handles from different loaders"
                );
                self.jobs.extend(other.jobs.drain());
                other.core = None;
            }
        }
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        self.remove();
    }
}
