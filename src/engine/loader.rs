// src/engine/loader.rs

//! Loader core.
//!
//! Holds the pending dependency graph behind a single mutex and drives
//! execution on the worker pool. Job bodies always run outside that mutex;
//! critical sections are bounded by the fan-out of the job being committed.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::LoaderConfig;
use crate::dag::check_cycles;
use crate::engine::queue::{ReadyKey, ReadyQueue};
use crate::errors::LoadError;
use crate::exec::ThreadPool;
use crate::job::{Job, JobSet, JobStatus};
use crate::metrics::MetricsSnapshot;
use crate::task::Task;

/// Scheduling info for a pending job.
struct JobInfo {
    /// Effective priority; only ever raised after scheduling.
    priority: i64,
    /// Prerequisites known to the loader that have not finished yet.
    deps_left: usize,
    /// Position stamp in the ready queue; zero means not enqueued.
    ready_seqno: u64,
    /// Pending jobs that depend on this one.
    dependents: JobSet,
    /// Prerequisites as frozen at schedule time.
    dependencies: Vec<Arc<Job>>,
}

impl JobInfo {
    fn key(&self) -> ReadyKey {
        ReadyKey {
            priority: self.priority,
            seqno: self.ready_seqno,
        }
    }
}

struct LoaderState {
    is_running: bool,
    /// Every pending job known to the loader, with its scheduling info.
    pending: HashMap<Arc<Job>, JobInfo>,
    /// Pending jobs with all prerequisites satisfied, in dispatch order.
    ready: ReadyQueue,
    /// Finished jobs, kept for introspection until their task removes them.
    finished: JobSet,
    /// Seqno source for the ready queue; never reset.
    last_ready_seqno: u64,
    /// Worker loops currently submitted to the pool.
    workers: usize,
}

/// Shared loader internals. [`Task`] handles keep this alive, so a handle
/// outliving its [`Loader`] stays valid.
pub(crate) struct LoaderCore {
    state: Mutex<LoaderState>,
    pool: ThreadPool,
    max_workers: usize,
}

/// Snapshot of loader state, serialisable for stats endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoaderStats {
    pub pending: usize,
    pub ready: usize,
    pub finished: usize,
    pub workers: usize,
    pub is_running: bool,
}

/// Dependency-graph job loader.
///
/// See the crate-level docs for an overview; the operations here are
/// `schedule`, `prioritize`, `remove`, `start`, `stop` and `wait`.
pub struct Loader {
    core: Arc<LoaderCore>,
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        let max_workers = config.max_workers.max(1);
        Self {
            core: Arc::new(LoaderCore {
                state: Mutex::new(LoaderState {
                    is_running: false,
                    pending: HashMap::new(),
                    ready: ReadyQueue::default(),
                    finished: JobSet::new(),
                    last_ready_seqno: 0,
                    workers: 0,
                }),
                pool: ThreadPool::new(max_workers, &config.thread_name_prefix),
                max_workers,
            }),
        }
    }

    /// Schedule a set of pending jobs at the given priority.
    ///
    /// Every job in the set becomes pending; prerequisites already pending
    /// inherit the priority; jobs with no unmet prerequisites are enqueued.
    /// Fails without touching any state if a job is already finished or
    /// scheduled, if a prerequisite is unknown to the loader, or if the set
    /// wires a dependency cycle.
    pub fn schedule(&self, jobs: JobSet, priority: i64) -> Result<Task, LoadError> {
        self.core.schedule(jobs, priority)
    }

    /// Raise a pending job's effective priority, cascading to all its
    /// prerequisites. Priorities never decrease; unknown or finished jobs
    /// are ignored.
    pub fn prioritize(&self, job: &Arc<Job>, new_priority: i64) {
        self.core.prioritize(job, new_priority);
    }

    /// Remove jobs from the loader: finished jobs are dropped, unstarted
    /// pending jobs are canceled, executing jobs are waited for and then
    /// dropped.
    pub fn remove(&self, jobs: &JobSet) {
        self.core.remove(jobs);
    }

    /// Mark the loader running and spawn workers for whatever is ready.
    pub fn start(&self) {
        self.core.start();
    }

    /// Pause execution: workers finish their current job and park. Pending
    /// jobs stay pending and resume on the next [`start`](Self::start).
    pub fn stop(&self) {
        self.core.stop();
    }

    /// Block until all currently running and ready work has drained.
    pub fn wait(&self) {
        self.core.wait();
    }

    /// Snapshot of the loader's bookkeeping.
    pub fn stats(&self) -> LoaderStats {
        self.core.stats()
    }

    /// Snapshot of the worker-pool gauges.
    pub fn pool_metrics(&self) -> MetricsSnapshot {
        self.core.pool.metrics()
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.core.stop();
    }
}

impl LoaderCore {
    fn schedule(self: &Arc<Self>, jobs: JobSet, priority: i64) -> Result<Task, LoadError> {
        let mut state = self.state.lock();

        // Freeze the prerequisite sets first so the validation below sees a
        // stable graph. A failed schedule undoes exactly the freezes it
        // performed.
        let mut frozen: Vec<Arc<Job>> = Vec::with_capacity(jobs.len());
        let mut snapshots: HashMap<Arc<Job>, Vec<Arc<Job>>> = HashMap::with_capacity(jobs.len());
        for job in &jobs {
            let (newly_frozen, deps) = job.freeze_dependencies();
            if newly_frozen {
                frozen.push(Arc::clone(job));
            }
            snapshots.insert(Arc::clone(job), deps.into_iter().collect());
        }

        if let Err(err) = Self::validate_incoming(&state, &jobs, &snapshots)
            .and_then(|()| check_cycles(&jobs))
        {
            for job in &frozen {
                job.unfreeze_dependencies();
            }
            return Err(err);
        }

        // Insert all incoming jobs first so that co-scheduled prerequisites
        // resolve against the pending map like any other pending job.
        for job in &jobs {
            job.set_priority(priority);
            let dependencies = snapshots
                .remove(job)
                .expect("snapshot exists for every incoming job");
            state.pending.insert(
                Arc::clone(job),
                JobInfo {
                    priority,
                    deps_left: 0,
                    ready_seqno: 0,
                    dependents: JobSet::new(),
                    dependencies,
                },
            );
        }

        // Wire dependency edges, inherit priority downwards, and note jobs
        // whose prerequisites have already failed.
        let mut doomed: Vec<(Arc<Job>, LoadError)> = Vec::new();
        for job in &jobs {
            let dependencies = state
                .pending
                .get(job)
                .map(|info| info.dependencies.clone())
                .expect("incoming job was just inserted");

            let mut deps_left = 0;
            for dep in &dependencies {
                if state.pending.contains_key(dep) {
                    state
                        .pending
                        .get_mut(dep)
                        .expect("checked above")
                        .dependents
                        .insert(Arc::clone(job));
                    deps_left += 1;
                } else if dep.status() == JobStatus::Failed {
                    let message = dep
                        .error()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| format!("load job '{}' failed", dep.name()));
                    doomed.push((
                        Arc::clone(job),
                        LoadError::DependencyFailed {
                            job: job.name().to_string(),
                            message,
                        },
                    ));
                }
                // A successfully finished prerequisite contributes nothing.

                self.raise_priority(&mut state, dep, priority);
            }
            state
                .pending
                .get_mut(job)
                .expect("incoming job was just inserted")
                .deps_left = deps_left;
        }

        // Queue whatever is immediately runnable. Jobs with an already
        // failed prerequisite are skipped here and failed below instead.
        let skip: JobSet = doomed.iter().map(|(job, _)| Arc::clone(job)).collect();
        for job in &jobs {
            if skip.contains(job) {
                continue;
            }
            let runnable = state
                .pending
                .get(job)
                .map(|info| info.deps_left == 0)
                .unwrap_or(false);
            if runnable {
                self.enqueue_ready(&mut state, job);
            }
        }

        for (job, err) in doomed {
            // May have been failed already through a co-scheduled dependent.
            if state.pending.contains_key(&job) {
                warn!(
                    job = %job.name(),
                    "prerequisite already failed; failing job at schedule time"
                );
                self.fail_job(&mut state, &job, err);
            }
        }

        info!(jobs = jobs.len(), priority, "scheduled job set");
        Ok(Task::new(Arc::clone(self), jobs))
    }

    /// Sanity checks for an incoming set; runs before any mutation.
    fn validate_incoming(
        state: &LoaderState,
        jobs: &JobSet,
        snapshots: &HashMap<Arc<Job>, Vec<Arc<Job>>>,
    ) -> Result<(), LoadError> {
        for job in jobs {
            if job.status() != JobStatus::Pending {
                return Err(LoadError::ScheduleFailed(format!(
                    "cannot schedule already finished job '{}'",
                    job.name()
                )));
            }
            if state.pending.contains_key(job) {
                return Err(LoadError::ScheduleFailed(format!(
                    "job '{}' has already been scheduled",
                    job.name()
                )));
            }
        }

        // Every prerequisite outside the incoming set must be known to the
        // loader, either still pending or finished.
        for (job, dependencies) in snapshots {
            for dep in dependencies {
                if jobs.contains(dep)
                    || state.pending.contains_key(dep)
                    || state.finished.contains(dep)
                {
                    continue;
                }
                return Err(LoadError::ScheduleFailed(format!(
                    "job '{}' depends on job '{}', which was never scheduled",
                    job.name(),
                    dep.name()
                )));
            }
        }

        Ok(())
    }

    fn prioritize(&self, job: &Arc<Job>, new_priority: i64) {
        let mut state = self.state.lock();
        self.raise_priority(&mut state, job, new_priority);
    }

    /// Raise a pending job's priority and recurse into its prerequisites.
    /// No-op for jobs the loader does not know as pending, and for raises
    /// that would not increase the priority.
    fn raise_priority(&self, state: &mut LoaderState, job: &Arc<Job>, new_priority: i64) {
        let (old_priority, seqno) = match state.pending.get(job) {
            Some(info) if info.priority < new_priority => (info.priority, info.ready_seqno),
            _ => return,
        };

        // Re-key any ready entry under the same seqno so FIFO order within
        // the new priority class is preserved.
        if seqno != 0 {
            let evicted = state.ready.remove(&ReadyKey {
                priority: old_priority,
                seqno,
            });
            debug_assert!(evicted.is_some(), "ready seqno without a queue entry");
        }
        {
            let info = state
                .pending
                .get_mut(job)
                .expect("job checked as pending above");
            info.priority = new_priority;
        }
        job.set_priority(new_priority);
        if seqno != 0 {
            state.ready.insert(
                ReadyKey {
                    priority: new_priority,
                    seqno,
                },
                Arc::clone(job),
            );
        }

        let dependencies = state
            .pending
            .get(job)
            .map(|info| info.dependencies.clone())
            .unwrap_or_default();
        for dep in &dependencies {
            self.raise_priority(state, dep, new_priority);
        }
    }

    pub(crate) fn remove(&self, jobs: &JobSet) {
        let mut state = self.state.lock();

        // Cancel ready jobs first: their failure fans out to dependents in
        // the same set, which then carry a dependency failure instead of a
        // bare cancellation.
        for job in jobs {
            let ready_key = state
                .pending
                .get(job)
                .and_then(|info| (info.ready_seqno != 0).then(|| info.key()));
            if let Some(key) = ready_key {
                state.ready.remove(&key);
                if let Some(info) = state.pending.get_mut(job) {
                    info.ready_seqno = 0;
                }
                self.cancel_job(&mut state, job);
            }
        }

        for job in jobs {
            if state.finished.remove(job) {
                continue;
            }
            let deps_left = match state.pending.get(job) {
                Some(info) => info.deps_left,
                None => continue,
            };
            if deps_left > 0 {
                self.cancel_job(&mut state, job);
            } else {
                // Executing on a worker; wait for it on the job's own
                // primitive, with the loader lock released.
                debug!(job = %job.name(), "waiting for executing job before removal");
                MutexGuard::unlocked(&mut state, || job.wait_no_throw());
            }
            state.finished.remove(job);
        }
    }

    fn start(self: &Arc<Self>) {
        let mut state = self.state.lock();
        state.is_running = true;
        let target = state.ready.len().min(self.max_workers);
        for _ in state.workers..target {
            self.spawn_worker(&mut state);
        }
        info!(workers = state.workers, ready = state.ready.len(), "loader started");
    }

    fn stop(&self) {
        {
            let mut state = self.state.lock();
            state.is_running = false;
            // Workers never wait inside the loader, so no wakeup is needed;
            // each one exits after committing its current job.
        }
        self.pool.wait();
        debug!("loader stopped; workers drained");
    }

    fn wait(&self) {
        self.pool.wait();
    }

    fn stats(&self) -> LoaderStats {
        let state = self.state.lock();
        LoaderStats {
            pending: state.pending.len(),
            ready: state.ready.len(),
            finished: state.finished.len(),
            workers: state.workers,
            is_running: state.is_running,
        }
    }

    /// Stamp a job with the next seqno and place it in the ready queue,
    /// topping up workers if the loader is running.
    fn enqueue_ready(self: &Arc<Self>, state: &mut LoaderState, job: &Arc<Job>) {
        state.last_ready_seqno += 1;
        let seqno = state.last_ready_seqno;
        let key = {
            let info = state
                .pending
                .get_mut(job)
                .expect("enqueued job must be pending");
            debug_assert!(info.deps_left == 0, "enqueued job still has prerequisites");
            debug_assert!(info.ready_seqno == 0, "job enqueued twice");
            info.ready_seqno = seqno;
            info.key()
        };
        state.ready.insert(key, Arc::clone(job));

        if state.is_running && state.workers < self.max_workers {
            self.spawn_worker(state);
        }
    }

    fn spawn_worker(self: &Arc<Self>, state: &mut LoaderState) {
        state.workers += 1;
        let core = Arc::clone(self);
        if let Err(err) = self.pool.submit(move || core.worker()) {
            error!(error = %err, "failed to submit worker to pool");
            state.workers -= 1;
        }
    }

    /// Worker loop. Commits the previous job's result under the loader
    /// lock, then picks the smallest ready key and runs its body with the
    /// lock released.
    fn worker(self: &Arc<Self>) {
        let mut to_commit: Option<(Arc<Job>, Option<LoadError>)> = None;
        loop {
            let job = {
                let mut state = self.state.lock();

                if let Some((job, error)) = to_commit.take() {
                    match error {
                        Some(error) => self.fail_job(&mut state, &job, error),
                        None => self.handle_success(&mut state, &job),
                    }
                }

                let next = if state.is_running {
                    state.ready.pop_first()
                } else {
                    None
                };
                let Some((_, job)) = next else {
                    state.workers -= 1;
                    return;
                };
                state
                    .pending
                    .get_mut(&job)
                    .expect("ready job must be pending")
                    .ready_seqno = 0;
                job
            };

            let error = self.run_body(&job);
            to_commit = Some((job, error));
        }
    }

    /// Run a job body outside the loader lock, converting errors and panics
    /// into the failure captured for the job.
    fn run_body(&self, job: &Arc<Job>) -> Option<LoadError> {
        let func = job
            .take_func()
            .expect("job body present until its single execution");
        match catch_unwind(AssertUnwindSafe(|| func(job.as_ref()))) {
            Ok(Ok(())) => None,
            Ok(Err(err)) => {
                let message = format!("{err:#}");
                error!(job = %job.name(), error = %message, "job body failed");
                Some(LoadError::LoadFailed {
                    job: job.name().to_string(),
                    message,
                })
            }
            Err(panic) => {
                let message = panic_message(panic);
                error!(job = %job.name(), panic = %message, "job body panicked");
                Some(LoadError::LoadFailed {
                    job: job.name().to_string(),
                    message,
                })
            }
        }
    }

    /// Commit a successful job: wake its waiters, release its dependents,
    /// and move it to the finished set.
    fn handle_success(self: &Arc<Self>, state: &mut LoaderState, job: &Arc<Job>) {
        job.set_success();

        let dependents = {
            let info = state
                .pending
                .get_mut(job)
                .expect("completed job must be pending");
            std::mem::take(&mut info.dependents)
        };
        for dependent in &dependents {
            let now_ready = {
                let info = state
                    .pending
                    .get_mut(dependent)
                    .expect("dependent of a pending job must be pending");
                info.deps_left -= 1;
                info.deps_left == 0
            };
            if now_ready {
                self.enqueue_ready(state, dependent);
            }
        }

        self.finish_job(state, job);
    }

    fn cancel_job(&self, state: &mut LoaderState, job: &Arc<Job>) {
        info!(job = %job.name(), "canceling pending job");
        let error = LoadError::LoadCanceled {
            job: job.name().to_string(),
        };
        self.fail_job(state, job, error);
    }

    /// Commit a failed (or canceled) job: capture the failure, fail every
    /// transitive dependent with a chained message, clean the backward
    /// edges, and move the job to the finished set.
    fn fail_job(&self, state: &mut LoaderState, job: &Arc<Job>, error: LoadError) {
        job.set_failure(error.clone());

        // Swap the dependent set out before recursing so the recursion
        // never walks a set that is being modified.
        let dependents = {
            let info = state
                .pending
                .get_mut(job)
                .expect("failed job must be pending");
            debug_assert!(info.ready_seqno == 0, "failed job still in ready queue");
            std::mem::take(&mut info.dependents)
        };
        for dependent in &dependents {
            let dependent_error = LoadError::DependencyFailed {
                job: dependent.name().to_string(),
                message: error.to_string(),
            };
            self.fail_job(state, dependent, dependent_error);
        }

        let dependencies = state
            .pending
            .get(job)
            .map(|info| info.dependencies.clone())
            .unwrap_or_default();
        for dep in &dependencies {
            if let Some(dep_info) = state.pending.get_mut(dep) {
                dep_info.dependents.remove(job);
            }
        }

        self.finish_job(state, job);
    }

    fn finish_job(&self, state: &mut LoaderState, job: &Arc<Job>) {
        state.pending.remove(job);
        state.finished.insert(Arc::clone(job));
    }
}

/// Best-effort extraction of a panic payload for the captured failure.
fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "job body panicked".to_string()
    }
}
