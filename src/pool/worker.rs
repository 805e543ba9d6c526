//! Worker thread loop

use super::taskq::{Shared, TaskqPhase};
use crate::core::WorkItem;
use crate::thread::{curthread_id, is_thread_exit};
use parking_lot::MutexGuard;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::{debug, span, Level};

/// Main worker loop
///
/// Takes tasks until the queue is terminating and empty. A worker above
/// the floor of a dynamic queue retires after `idle_timeout` without work.
/// A task that calls `thread_exit` ends its worker.
pub(super) fn run(shared: Arc<Shared>) {
    let me = curthread_id();

    #[cfg(feature = "tracing")]
    let worker_span = span!(Level::DEBUG, "taskq_worker", taskq = shared.name(), id = me.get());
    #[cfg(feature = "tracing")]
    let _guard = worker_span.enter();

    #[cfg(feature = "tracing")]
    debug!("worker started");

    let floor = shared.config.floor();
    let mut state = shared.state.lock();
    state.starting -= 1;

    loop {
        if let Some(item) = state.queue.pop() {
            let id = item.id().get();
            state.active += 1;
            shared.stats.set_queue_depth(state.queue.len());
            shared.stats.set_active(state.active);

            #[cfg(feature = "tracing")]
            crate::tracing::metrics::record_worker_busy(me.get());

            let exit_requested = MutexGuard::unlocked(&mut state, || execute_item(&shared, item));

            #[cfg(feature = "tracing")]
            crate::tracing::metrics::record_worker_idle(me.get());

            state.active -= 1;
            state.outstanding.remove(&id);
            shared.stats.set_active(state.active);
            shared.done_cv.notify_all();
            if exit_requested {
                log::debug!("taskq '{}': worker {} exited from a task", shared.name(), me);
                break;
            }
            continue;
        }

        if state.phase >= TaskqPhase::Terminating {
            break;
        }

        state.idle += 1;
        let surplus = shared.config.dynamic
            && state.phase == TaskqPhase::Steady
            && state.nthreads > floor;
        let timed_out = if surplus {
            shared
                .work_cv
                .wait_for(&mut state, shared.config.idle_timeout)
                .timed_out()
        } else {
            shared.work_cv.wait(&mut state);
            false
        };
        state.idle -= 1;

        if timed_out
            && state.queue.is_empty()
            && state.phase == TaskqPhase::Steady
            && state.nthreads > floor
        {
            log::debug!(
                "taskq '{}': worker {} idle for {:?}, retiring",
                shared.name(),
                me,
                shared.config.idle_timeout
            );
            break;
        }
    }

    state.nthreads -= 1;
    if let Some(kt) = state.workers.remove(&me) {
        state.exited.push(kt);
    }
    shared.stats.record_exit(state.nthreads);
    // A task that ended its worker may leave work behind
    if !state.queue.is_empty() {
        shared.maybe_grow(&mut state);
        shared.work_cv.notify_one();
    }
    shared.done_cv.notify_all();

    #[cfg(feature = "tracing")]
    crate::tracing::metrics::record_worker_exit(shared.name(), state.nthreads);
}

/// Execute a single task with panic protection.
///
/// Returns true if the task asked its thread to exit.
fn execute_item(shared: &Shared, item: WorkItem) -> bool {
    let WorkItem { mut job, id, .. } = item;

    #[cfg(feature = "tracing")]
    let job_span = span!(Level::DEBUG, "task_execution", job_type = job.job_type(), id = id.get());
    #[cfg(feature = "tracing")]
    let _job_guard = job_span.enter();

    let start = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(|| job.execute()));
    let elapsed = start.elapsed();

    match outcome {
        Ok(()) => {
            shared.stats.record_completed(elapsed);
            #[cfg(feature = "tracing")]
            crate::tracing::metrics::record_completion(elapsed);
            false
        }
        Err(payload) if is_thread_exit(payload.as_ref()) => {
            shared.stats.record_completed(elapsed);
            #[cfg(feature = "tracing")]
            crate::tracing::metrics::record_completion(elapsed);
            true
        }
        Err(payload) => {
            let panic_msg = panic_message(payload.as_ref());
            log::warn!(
                "taskq '{}': task {} ({}) panicked: {}",
                shared.name(),
                id,
                job.job_type(),
                panic_msg
            );
            #[cfg(feature = "tracing")]
            crate::tracing::metrics::record_panic(elapsed);
            shared.stats.record_panicked(elapsed);
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
