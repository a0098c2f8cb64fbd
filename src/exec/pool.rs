// src/exec/pool.rs

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::error;

use crate::errors::SubmitError;
use crate::metrics::{MetricsSnapshot, PoolMetrics};

type PoolTask = Box<dyn FnOnce() + Send>;

struct PoolState {
    backlog: VecDeque<PoolTask>,
    active: usize,
    shutdown: bool,
}

struct PoolShared {
    state: Mutex<PoolState>,
    work_available: Condvar,
    drained: Condvar,
    metrics: PoolMetrics,
}

/// Fixed-size pool of named worker threads.
///
/// Threads are created up front and live for the lifetime of the pool.
/// Panics inside submitted closures are contained: the thread survives and
/// [`wait`](Self::wait) still observes the closure as finished.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    threads: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Create a pool of `num_threads` threads named `<prefix>-worker-<n>`.
    pub fn new(num_threads: usize, name_prefix: &str) -> Self {
        let num_threads = num_threads.max(1);
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                backlog: VecDeque::new(),
                active: 0,
                shutdown: false,
            }),
            work_available: Condvar::new(),
            drained: Condvar::new(),
            metrics: PoolMetrics::default(),
        });

        let mut threads = Vec::with_capacity(num_threads);
        for n in 0..num_threads {
            let shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("{name_prefix}-worker-{n}"))
                .spawn(move || worker_loop(&shared))
                .expect("failed to spawn pool thread");
            threads.push(handle);
        }

        Self { shared, threads }
    }

    /// Arrange for `task` to run on some pool thread.
    ///
    /// Fails synchronously once the pool has been shut down.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> Result<(), SubmitError> {
        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return Err(SubmitError);
            }
            state.backlog.push_back(Box::new(task));
        }
        self.shared.work_available.notify_one();
        Ok(())
    }

    /// Block until the backlog is empty and every active closure has
    /// returned. New submissions made while waiting are waited for too.
    pub fn wait(&self) {
        let mut state = self.shared.state.lock();
        while !(state.backlog.is_empty() && state.active == 0) {
            self.shared.drained.wait(&mut state);
        }
    }

    /// Current gauge values (thread count, active count).
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
        }
        self.shared.work_available.notify_all();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!("pool thread exited by panic");
            }
        }
    }
}

fn worker_loop(shared: &PoolShared) {
    shared.metrics.thread_started();
    loop {
        let task = {
            let mut state = shared.state.lock();
            loop {
                if let Some(task) = state.backlog.pop_front() {
                    state.active += 1;
                    break Some(task);
                }
                if state.shutdown {
                    break None;
                }
                shared.work_available.wait(&mut state);
            }
        };
        let Some(task) = task else {
            break;
        };

        shared.metrics.task_started();
        let result = catch_unwind(AssertUnwindSafe(task));
        shared.metrics.task_finished();
        if result.is_err() {
            error!("submitted closure panicked; pool thread continues");
        }

        let mut state = shared.state.lock();
        state.active -= 1;
        if state.backlog.is_empty() && state.active == 0 {
            shared.drained.notify_all();
        }
    }
    shared.metrics.thread_stopped();
}
