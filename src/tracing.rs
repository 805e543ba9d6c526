//! Tracing integration for observability.
//!
//! With the `tracing` feature enabled, workers run inside a `taskq_worker`
//! span, each task inside a `task_execution` span, and the functions in
//! [`metrics`] emit counter/gauge events.
//!
//! # Example
//!
//! ```rust,ignore
//! use rust_kernel_context::prelude::*;
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env()
//!         .add_directive("rust_kernel_context=debug".parse().unwrap()))
//!     .init();
//!
//! let tq = Taskq::create(TaskqConfig::new("traced", 4))?;
//!
//! // The task runs inside the span that was current at dispatch
//! tq.dispatch_traced(MyJob::new(), DispatchFlags::SLEEP)?;
//! ```

use crate::core::Job;

/// A job wrapper that propagates tracing context across thread boundaries.
///
/// The span current at dispatch is captured and entered again when the job
/// runs on a worker. Without the `tracing` feature this is a plain
/// pass-through.
pub struct TracedJob<J: Job> {
    inner: J,
    #[cfg(feature = "tracing")]
    span: tracing::Span,
}

impl<J: Job> TracedJob<J> {
    /// Wrap `job`, capturing the current span
    pub fn new(job: J) -> Self {
        Self {
            inner: job,
            #[cfg(feature = "tracing")]
            span: tracing::Span::current(),
        }
    }

    /// Wrap `job` with a specific span
    #[cfg(feature = "tracing")]
    pub fn with_span(job: J, span: tracing::Span) -> Self {
        Self { inner: job, span }
    }
}

impl<J: Job> Job for TracedJob<J> {
    fn execute(&mut self) {
        #[cfg(feature = "tracing")]
        let _guard = self.span.enter();
        self.inner.execute()
    }

    fn job_type(&self) -> &str {
        self.inner.job_type()
    }
}

/// Metrics recording functions for observability.
///
/// These emit tracing events that a subscriber can turn into counters,
/// gauges and histograms.
#[cfg(feature = "tracing")]
pub mod metrics {
    use std::time::Duration;

    /// Records a task dispatch.
    #[inline]
    pub fn record_dispatch(queue_depth: usize) {
        tracing::trace!(
            counter.tasks_dispatched = 1,
            gauge.queue_depth = queue_depth as i64,
            "task dispatched"
        );
    }

    /// Records task completion with timing.
    #[inline]
    pub fn record_completion(duration: Duration) {
        tracing::trace!(
            counter.tasks_completed = 1,
            histogram.task_duration_ms = duration.as_millis() as u64,
            "task completed"
        );
    }

    /// Records a task panic.
    #[inline]
    pub fn record_panic(duration: Duration) {
        tracing::trace!(
            counter.tasks_panicked = 1,
            histogram.task_duration_ms = duration.as_millis() as u64,
            "task panicked"
        );
    }

    /// Records a worker picking up a task.
    #[inline]
    pub fn record_worker_busy(worker_id: u64) {
        tracing::trace!(gauge.workers_busy = 1, worker_id = worker_id, "worker busy");
    }

    /// Records a worker going back to the queue.
    #[inline]
    pub fn record_worker_idle(worker_id: u64) {
        tracing::trace!(
            gauge.workers_busy = -1i64,
            worker_id = worker_id,
            "worker idle"
        );
    }

    /// Records a worker thread being started.
    #[inline]
    pub fn record_worker_spawn(taskq: &str, live: usize) {
        tracing::debug!(taskq = taskq, gauge.live_threads = live as i64, "worker spawned");
    }

    /// Records a worker thread leaving its loop.
    #[inline]
    pub fn record_worker_exit(taskq: &str, live: usize) {
        tracing::debug!(taskq = taskq, gauge.live_threads = live as i64, "worker exited");
    }

    /// Records task queue creation.
    #[inline]
    pub fn record_taskq_create(taskq: &str, max_threads: usize) {
        tracing::info!(taskq = taskq, max_threads = max_threads, "task queue created");
    }

    /// Records task queue destruction.
    #[inline]
    pub fn record_taskq_destroy(taskq: &str, tasks_completed: u64, tasks_panicked: u64) {
        tracing::info!(
            taskq = taskq,
            tasks_completed = tasks_completed,
            tasks_panicked = tasks_panicked,
            "task queue destroyed"
        );
    }
}
