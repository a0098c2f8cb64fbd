// src/metrics.rs

//! Lightweight gauges for worker-pool introspection.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

/// Gauges updated by the thread pool.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    threads: AtomicUsize,
    active: AtomicUsize,
}

impl PoolMetrics {
    pub(crate) fn thread_started(&self) {
        self.threads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn thread_stopped(&self) {
        self.threads.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn task_started(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_finished(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Point-in-time view of the gauges.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            threads: self.threads.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of the pool gauges, serialisable for stats endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// OS threads currently alive in the pool.
    pub threads: usize,
    /// Threads currently executing a submitted closure.
    pub active: usize,
}
