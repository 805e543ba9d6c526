//! Task queue telemetry

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters and gauges for one task queue
///
/// Shared behind an `Arc`; consumers may hold on to it after the queue is
/// destroyed.
#[derive(Debug, Default)]
pub struct TaskqStats {
    /// Tasks accepted by dispatch
    pub tasks_dispatched: AtomicU64,
    /// Tasks whose entry returned (or called `thread_exit`)
    pub tasks_completed: AtomicU64,
    /// Tasks that panicked
    pub tasks_panicked: AtomicU64,
    /// Fail-fast dispatches that were refused
    pub dispatches_rejected: AtomicU64,
    /// Worker threads started
    pub threads_spawned: AtomicU64,
    /// Worker threads that exited
    pub threads_exited: AtomicU64,
    /// Tasks waiting in the queue
    pub queue_depth: AtomicU64,
    /// Workers executing a task
    pub active_threads: AtomicU64,
    /// Live workers
    pub live_threads: AtomicU64,
    /// Highest number of live workers seen
    pub peak_threads: AtomicU64,
    /// Total time spent in task entries (microseconds)
    pub total_execution_time_us: AtomicU64,
}

impl TaskqStats {
    /// Create zeroed statistics
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_dispatch(&self, queue_depth: usize) {
        self.tasks_dispatched.fetch_add(1, Ordering::Relaxed);
        self.set_queue_depth(queue_depth);
    }

    pub(crate) fn record_rejected(&self) {
        self.dispatches_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self, elapsed: Duration) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        self.add_execution_time(elapsed);
    }

    pub(crate) fn record_panicked(&self, elapsed: Duration) {
        self.tasks_panicked.fetch_add(1, Ordering::Relaxed);
        self.add_execution_time(elapsed);
    }

    fn add_execution_time(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_execution_time_us.fetch_add(us, Ordering::Relaxed);
    }

    pub(crate) fn record_spawn(&self, live: usize) {
        self.threads_spawned.fetch_add(1, Ordering::Relaxed);
        self.live_threads.store(live as u64, Ordering::Relaxed);
        self.peak_threads.fetch_max(live as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_exit(&self, live: usize) {
        self.threads_exited.fetch_add(1, Ordering::Relaxed);
        self.live_threads.store(live as u64, Ordering::Relaxed);
    }

    pub(crate) fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth as u64, Ordering::Relaxed);
    }

    pub(crate) fn set_active(&self, active: usize) {
        self.active_threads.store(active as u64, Ordering::Relaxed);
    }

    /// Get total tasks dispatched
    pub fn get_tasks_dispatched(&self) -> u64 {
        self.tasks_dispatched.load(Ordering::Relaxed)
    }

    /// Get total tasks completed
    pub fn get_tasks_completed(&self) -> u64 {
        self.tasks_completed.load(Ordering::Relaxed)
    }

    /// Get total tasks panicked
    pub fn get_tasks_panicked(&self) -> u64 {
        self.tasks_panicked.load(Ordering::Relaxed)
    }

    /// Get total rejected dispatches
    pub fn get_dispatches_rejected(&self) -> u64 {
        self.dispatches_rejected.load(Ordering::Relaxed)
    }

    /// Get total worker threads started
    pub fn get_threads_spawned(&self) -> u64 {
        self.threads_spawned.load(Ordering::Relaxed)
    }

    /// Get total worker threads exited
    pub fn get_threads_exited(&self) -> u64 {
        self.threads_exited.load(Ordering::Relaxed)
    }

    /// Get the current queue depth
    pub fn get_queue_depth(&self) -> u64 {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// Get the number of workers executing a task
    pub fn get_active_threads(&self) -> u64 {
        self.active_threads.load(Ordering::Relaxed)
    }

    /// Get the number of live workers
    pub fn get_live_threads(&self) -> u64 {
        self.live_threads.load(Ordering::Relaxed)
    }

    /// Get the highest number of live workers seen
    pub fn get_peak_threads(&self) -> u64 {
        self.peak_threads.load(Ordering::Relaxed)
    }

    /// Get average execution time per finished task in microseconds
    pub fn get_average_execution_time_us(&self) -> f64 {
        let total = self.total_execution_time_us.load(Ordering::Relaxed);
        let count = self.get_tasks_completed() + self.get_tasks_panicked();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> TaskqStatsSnapshot {
        TaskqStatsSnapshot {
            tasks_dispatched: self.get_tasks_dispatched(),
            tasks_completed: self.get_tasks_completed(),
            tasks_panicked: self.get_tasks_panicked(),
            dispatches_rejected: self.get_dispatches_rejected(),
            threads_spawned: self.get_threads_spawned(),
            threads_exited: self.get_threads_exited(),
            queue_depth: self.get_queue_depth(),
            active_threads: self.get_active_threads(),
            live_threads: self.get_live_threads(),
            peak_threads: self.get_peak_threads(),
            average_execution_time_us: self.get_average_execution_time_us(),
        }
    }
}

/// Serializable copy of [`TaskqStats`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskqStatsSnapshot {
    /// Tasks accepted by dispatch
    pub tasks_dispatched: u64,
    /// Tasks that returned
    pub tasks_completed: u64,
    /// Tasks that panicked
    pub tasks_panicked: u64,
    /// Refused fail-fast dispatches
    pub dispatches_rejected: u64,
    /// Worker threads started
    pub threads_spawned: u64,
    /// Worker threads exited
    pub threads_exited: u64,
    /// Tasks waiting
    pub queue_depth: u64,
    /// Workers executing a task
    pub active_threads: u64,
    /// Live workers
    pub live_threads: u64,
    /// Highest live worker count
    pub peak_threads: u64,
    /// Mean task execution time
    pub average_execution_time_us: f64,
}
