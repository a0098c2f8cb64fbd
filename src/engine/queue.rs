// src/engine/queue.rs

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::job::Job;

/// Dispatch key of a ready job: higher priority first, FIFO (by ready
/// seqno) within a priority class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyKey {
    pub priority: i64,
    pub seqno: u64,
}

impl Ord for ReadyKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.seqno.cmp(&other.seqno))
    }
}

impl PartialOrd for ReadyKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Queue of ready jobs in dispatch order.
///
/// Reprioritisation is a remove + reinsert under the same seqno, which
/// preserves FIFO order relative to earlier arrivals in the new priority
/// class. Seqnos are assigned by the loader from a counter that never
/// resets.
#[derive(Default)]
pub struct ReadyQueue {
    entries: BTreeMap<ReadyKey, Arc<Job>>,
}

impl ReadyQueue {
    pub fn insert(&mut self, key: ReadyKey, job: Arc<Job>) {
        let previous = self.entries.insert(key, job);
        debug_assert!(previous.is_none(), "ready key inserted twice");
    }

    pub fn remove(&mut self, key: &ReadyKey) -> Option<Arc<Job>> {
        self.entries.remove(key)
    }

    /// Take the entry that should run next.
    pub fn pop_first(&mut self) -> Option<(ReadyKey, Arc<Job>)> {
        self.entries.pop_first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobSet;

    fn noop(name: &str) -> Arc<Job> {
        Job::new(name, JobSet::new(), |_| Ok(()))
    }

    #[test]
    fn higher_priority_pops_first() {
        let mut queue = ReadyQueue::default();
        queue.insert(ReadyKey { priority: 0, seqno: 1 }, noop("low"));
        queue.insert(ReadyKey { priority: 5, seqno: 2 }, noop("high"));

        let (_, first) = queue.pop_first().unwrap();
        assert_eq!(first.name(), "high");
        let (_, second) = queue.pop_first().unwrap();
        assert_eq!(second.name(), "low");
        assert!(queue.pop_first().is_none());
    }

    #[test]
    fn fifo_within_equal_priority() {
        let mut queue = ReadyQueue::default();
        queue.insert(ReadyKey { priority: 3, seqno: 10 }, noop("first"));
        queue.insert(ReadyKey { priority: 3, seqno: 11 }, noop("second"));

        assert_eq!(queue.pop_first().unwrap().1.name(), "first");
        assert_eq!(queue.pop_first().unwrap().1.name(), "second");
    }

    #[test]
    fn reinsert_under_same_seqno_keeps_fifo_in_new_class() {
        let mut queue = ReadyQueue::default();
        queue.insert(ReadyKey { priority: 5, seqno: 1 }, noop("old-high"));
        queue.insert(ReadyKey { priority: 0, seqno: 2 }, noop("raised"));
        queue.insert(ReadyKey { priority: 5, seqno: 3 }, noop("later-high"));

        // Raise "raised" from 0 to 5, keeping its seqno.
        let job = queue.remove(&ReadyKey { priority: 0, seqno: 2 }).unwrap();
        queue.insert(ReadyKey { priority: 5, seqno: 2 }, job);

        assert_eq!(queue.pop_first().unwrap().1.name(), "old-high");
        assert_eq!(queue.pop_first().unwrap().1.name(), "raised");
        assert_eq!(queue.pop_first().unwrap().1.name(), "later-high");
    }

    #[test]
    fn negative_priorities_sort_below_zero() {
        let mut queue = ReadyQueue::default();
        queue.insert(ReadyKey { priority: -4, seqno: 1 }, noop("background"));
        queue.insert(ReadyKey { priority: 0, seqno: 2 }, noop("normal"));

        assert_eq!(queue.pop_first().unwrap().1.name(), "normal");
        assert_eq!(queue.pop_first().unwrap().1.name(), "background");
    }
}
