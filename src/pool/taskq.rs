//! Task queue: a named pool of kernel threads draining a priority queue

use super::config::{DispatchFlags, TaskqConfig, TaskqFlags};
use super::stats::TaskqStats;
use super::worker;
use crate::core::{
    BoxedJob, ClosureJob, Job, Priority, RejectReason, Result, TaskQueue, TaskqId, ThreadError,
    WorkItem,
};
use crate::debug::misuse;
use crate::thread::{self, curthread_id, KThread, KThreadId, Pri, RunState};
use crate::tracing::TracedJob;
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Lifecycle of a task queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskqPhase {
    /// Creating prepopulated workers
    Spawning,
    /// Accepting and running tasks
    Steady,
    /// Destroy in progress; waiting for outstanding tasks
    Draining,
    /// Workers told to exit
    Terminating,
    /// Every worker joined
    Destroyed,
}

/// Everything guarded by the queue lock
pub(super) struct State {
    pub(super) phase: TaskqPhase,
    pub(super) queue: TaskQueue,
    pub(super) next_seq: u64,
    /// Ids of queued and running tasks
    pub(super) outstanding: BTreeSet<u64>,
    /// Workers executing a task
    pub(super) active: usize,
    /// Workers parked waiting for a task
    pub(super) idle: usize,
    /// Workers spawned but not yet in their loop
    pub(super) starting: usize,
    /// Live workers
    pub(super) nthreads: usize,
    pub(super) workers: HashMap<KThreadId, Arc<KThread>>,
    /// Workers that retired on their own and still need joining
    pub(super) exited: Vec<Arc<KThread>>,
    spawned_total: u64,
}

impl State {
    /// Workers free to take a task right now
    fn available(&self) -> usize {
        (self.idle + self.starting).saturating_sub(self.queue.len())
    }

    fn oldest_outstanding(&self) -> Option<u64> {
        self.outstanding.first().copied()
    }
}

/// State shared between the queue handle and its workers
pub(super) struct Shared {
    pub(super) config: TaskqConfig,
    pub(super) state: Mutex<State>,
    /// Workers wait here for tasks or termination
    pub(super) work_cv: Condvar,
    /// Drainers and blocked dispatchers wait here for completions
    pub(super) done_cv: Condvar,
    pub(super) stats: Arc<TaskqStats>,
}

impl Shared {
    pub(super) fn name(&self) -> &str {
        &self.config.name
    }

    fn spawn_worker(self: &Arc<Self>, state: &mut State) -> Result<()> {
        state.spawned_total += 1;
        let name = format!("{}_{}", self.config.name, state.spawned_total);
        let shared = Arc::clone(self);
        let kt = thread::spawn(
            Some(name),
            self.config.stack_size,
            move || worker::run(shared),
            RunState::Run,
            self.config.priority,
        )?;

        state.nthreads += 1;
        state.starting += 1;
        log::debug!(
            "taskq '{}': started worker {} ({} live)",
            self.name(),
            kt.id(),
            state.nthreads
        );
        state.workers.insert(kt.id(), kt);
        self.stats.record_spawn(state.nthreads);
        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_worker_spawn(self.name(), state.nthreads);
        Ok(())
    }

    /// Start another worker if the backlog outgrew the free workers.
    ///
    /// Below the floor, or with no worker free at all, any backlog grows the
    /// queue; the low-water mark only delays growth above the floor.
    pub(super) fn maybe_grow(self: &Arc<Self>, state: &mut State) {
        if state.nthreads >= self.config.max_threads {
            return;
        }
        let backlog = state.queue.len();
        let free = state.idle + state.starting;
        let slack = if free == 0 || state.nthreads < self.config.floor() {
            0
        } else {
            self.config.low_water_mark
        };
        if backlog <= free + slack {
            return;
        }
        if let Err(e) = self.spawn_worker(state) {
            if state.nthreads == 0 {
                misuse(
                    "taskq",
                    Some(self.name()),
                    format_args!("no worker could be started: {}", e),
                );
            }
            log::warn!("taskq '{}': growth failed: {}", self.name(), e);
        }
    }
}

/// A task queue (`taskq_t`)
///
/// Tasks run on the queue's own kernel threads, highest priority first and
/// in dispatch order within a priority. Destroying the queue, explicitly or
/// by dropping the last handle, drains every outstanding task first.
pub struct Taskq {
    shared: Arc<Shared>,
}

impl fmt::Debug for Taskq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Taskq")
            .field("name", &self.shared.config.name)
            .field("phase", &state.phase)
            .field("nthreads", &state.nthreads)
            .field("active", &state.active)
            .field("queue_depth", &state.queue.len())
            .field("outstanding", &state.outstanding.len())
            .finish()
    }
}

impl Taskq {
    /// Create a task queue
    ///
    /// The configuration is validated first; an invalid one is an error, not
    /// a fatal condition. With `prepopulate` the thread floor is started
    /// before this returns.
    pub fn create(config: TaskqConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let config = config.resolve();
        let capacity = config.min_alloc;

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                phase: TaskqPhase::Spawning,
                queue: TaskQueue::with_capacity(capacity),
                next_seq: 1,
                outstanding: BTreeSet::new(),
                active: 0,
                idle: 0,
                starting: 0,
                nthreads: 0,
                workers: HashMap::new(),
                exited: Vec::new(),
                spawned_total: 0,
            }),
            work_cv: Condvar::new(),
            done_cv: Condvar::new(),
            stats: Arc::new(TaskqStats::new()),
            config,
        });
        let taskq = Arc::new(Taskq { shared });

        {
            let shared = &taskq.shared;
            let mut state = shared.state.lock();
            if shared.config.prepopulate {
                for _ in 0..shared.config.floor() {
                    shared.spawn_worker(&mut state)?;
                }
            }
            state.phase = TaskqPhase::Steady;
        }

        log::debug!(
            "taskq '{}' created: threads {}..={}, dynamic={}, prepopulate={}, cpr_safe={}",
            taskq.name(),
            taskq.shared.config.floor(),
            taskq.shared.config.max_threads,
            taskq.shared.config.dynamic,
            taskq.shared.config.prepopulate,
            taskq.shared.config.cpr_safe
        );
        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_taskq_create(taskq.name(), taskq.shared.config.max_threads);

        Ok(taskq)
    }

    /// Dispatch a closure at normal priority
    pub fn dispatch<F>(&self, f: F, flags: DispatchFlags) -> Result<TaskqId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch_item(Box::new(ClosureJob::new(f)), Priority::Normal, flags)
    }

    /// Dispatch a [`Job`] at normal priority
    pub fn dispatch_job<J: Job + 'static>(&self, job: J, flags: DispatchFlags) -> Result<TaskqId> {
        self.dispatch_item(Box::new(job), Priority::Normal, flags)
    }

    /// Dispatch a closure at `priority`. Pending tasks of a higher priority
    /// run first; running tasks are never preempted.
    pub fn dispatch_with_priority<F>(
        &self,
        f: F,
        priority: Priority,
        flags: DispatchFlags,
    ) -> Result<TaskqId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch_item(Box::new(ClosureJob::new(f)), priority, flags)
    }

    /// Dispatch a job inside the caller's current tracing span
    pub fn dispatch_traced<J: Job + 'static>(
        &self,
        job: J,
        flags: DispatchFlags,
    ) -> Result<TaskqId> {
        self.dispatch_item(Box::new(TracedJob::new(job)), Priority::Normal, flags)
    }

    fn dispatch_item(
        &self,
        job: BoxedJob,
        priority: Priority,
        flags: DispatchFlags,
    ) -> Result<TaskqId> {
        let shared = &self.shared;
        let nosleep = flags.contains(DispatchFlags::NOSLEEP)
            || (!flags.contains(DispatchFlags::SLEEP) && shared.config.fail_fast_default);
        let noqueue = flags.contains(DispatchFlags::NOQUEUE);
        let me = curthread_id();

        let mut state = shared.state.lock();
        loop {
            let accepting = match state.phase {
                TaskqPhase::Spawning | TaskqPhase::Steady => true,
                // Tasks may still hand follow-up work to their own queue
                TaskqPhase::Draining => state.workers.contains_key(&me),
                TaskqPhase::Terminating | TaskqPhase::Destroyed => false,
            };
            if !accepting {
                return Err(ThreadError::shutting_down(self.name(), state.outstanding.len()));
            }

            if noqueue && state.available() == 0 && state.nthreads >= shared.config.max_threads {
                shared.stats.record_rejected();
                return Err(ThreadError::rejected(
                    self.name(),
                    RejectReason::NoIdleWorker {
                        active: state.active,
                        nthreads: state.nthreads,
                    },
                ));
            }

            let max = shared.config.max_alloc;
            if max == 0 || state.outstanding.len() < max {
                break;
            }
            if nosleep {
                shared.stats.record_rejected();
                return Err(ThreadError::rejected(
                    self.name(),
                    RejectReason::AllocLimit {
                        outstanding: state.outstanding.len(),
                        max,
                    },
                ));
            }
            shared.done_cv.wait(&mut state);
        }

        let id = state.next_seq;
        state.next_seq += 1;
        state.outstanding.insert(id);
        state.queue.push(WorkItem::new(priority, job, TaskqId(id)));
        shared.stats.record_dispatch(state.queue.len());
        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_dispatch(state.queue.len());

        shared.maybe_grow(&mut state);
        shared.work_cv.notify_one();

        let reaped = std::mem::take(&mut state.exited);
        drop(state);
        reap(self.name(), reaped);

        Ok(TaskqId(id))
    }

    /// Block until every task dispatched before this call has completed.
    ///
    /// Tasks dispatched while waiting are not waited for. Calling this from
    /// one of the queue's own workers would deadlock and is fatal.
    pub fn wait(&self) {
        if self.is_current_member() {
            misuse("taskq", Some(self.name()), format_args!("taskq_wait from its own worker"));
        }
        let mut state = self.shared.state.lock();
        let watermark = state.next_seq;
        while state.oldest_outstanding().is_some_and(|id| id < watermark) {
            self.shared.done_cv.wait(&mut state);
        }
    }

    /// True if `kt` is one of this queue's live workers
    pub fn member(&self, kt: &KThread) -> bool {
        self.member_id(kt.id())
    }

    /// True if `id` names one of this queue's live workers
    pub fn member_id(&self, id: KThreadId) -> bool {
        self.shared.state.lock().workers.contains_key(&id)
    }

    /// True if the caller is one of this queue's workers
    pub fn is_current_member(&self) -> bool {
        self.member_id(curthread_id())
    }

    /// Drain, stop and join every worker.
    ///
    /// Fatal when called from one of the queue's own workers or on a queue
    /// that is already being destroyed.
    pub fn destroy(&self) {
        if self.is_current_member() {
            misuse("taskq", Some(self.name()), format_args!("taskq_destroy from its own worker"));
        }
        let phase = self.phase();
        if phase >= TaskqPhase::Draining {
            misuse("taskq", Some(self.name()), format_args!("taskq_destroy in phase {:?}", phase));
        }
        self.shutdown();
    }

    fn shutdown(&self) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.phase >= TaskqPhase::Draining {
            return;
        }

        state.phase = TaskqPhase::Draining;
        // Wake blocked dispatchers so they see the phase change
        shared.done_cv.notify_all();
        log::debug!(
            "taskq '{}': draining {} outstanding tasks",
            self.name(),
            state.outstanding.len()
        );
        while !state.outstanding.is_empty() {
            shared.done_cv.wait(&mut state);
        }

        state.phase = TaskqPhase::Terminating;
        shared.work_cv.notify_all();
        while state.nthreads > 0 {
            shared.done_cv.wait(&mut state);
        }

        let mut threads: Vec<_> = state.workers.drain().map(|(_, kt)| kt).collect();
        threads.append(&mut state.exited);
        drop(state);
        reap(self.name(), threads);

        shared.state.lock().phase = TaskqPhase::Destroyed;
        log::debug!(
            "taskq '{}' destroyed: {} tasks completed, {} panicked",
            self.name(),
            shared.stats.get_tasks_completed(),
            shared.stats.get_tasks_panicked()
        );
        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_taskq_destroy(
            self.name(),
            shared.stats.get_tasks_completed(),
            shared.stats.get_tasks_panicked(),
        );
    }

    /// Queue name
    pub fn name(&self) -> &str {
        self.shared.name()
    }

    /// Resolved configuration
    pub fn config(&self) -> &TaskqConfig {
        &self.shared.config
    }

    /// Live workers
    pub fn nthreads(&self) -> usize {
        self.shared.state.lock().nthreads
    }

    /// Workers executing a task
    pub fn active(&self) -> usize {
        self.shared.state.lock().active
    }

    /// Tasks waiting for a worker
    pub fn queue_depth(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Tasks queued or running
    pub fn outstanding(&self) -> usize {
        self.shared.state.lock().outstanding.len()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> TaskqPhase {
        self.shared.state.lock().phase
    }

    /// Shared telemetry
    pub fn stats(&self) -> Arc<TaskqStats> {
        Arc::clone(&self.shared.stats)
    }
}

impl Drop for Taskq {
    fn drop(&mut self) {
        if self.phase() >= TaskqPhase::Draining {
            return;
        }
        if self.is_current_member() {
            // Cannot join ourselves: let the workers finish the backlog and go
            log::warn!(
                "taskq '{}' dropped by its own worker; detaching workers",
                self.name()
            );
            let mut state = self.shared.state.lock();
            state.phase = TaskqPhase::Terminating;
            self.shared.work_cv.notify_all();
            return;
        }
        self.shutdown();
    }
}

fn reap(name: &str, threads: Vec<Arc<KThread>>) {
    for kt in threads {
        if let Err(e) = kt.join() {
            log::error!("taskq '{}': {}", name, e);
        }
    }
}

/// Kernel-style constructor. Invalid arguments are fatal.
pub fn taskq_create(
    name: &str,
    nthreads: usize,
    priority: Pri,
    min_alloc: usize,
    max_alloc: usize,
    flags: TaskqFlags,
) -> Arc<Taskq> {
    let config = TaskqConfig::from_flags(name, nthreads, priority, min_alloc, max_alloc, flags);
    match Taskq::create(config) {
        Ok(taskq) => taskq,
        Err(e) => misuse("taskq", Some(name), format_args!("taskq_create: {}", e)),
    }
}

/// Kernel-style dispatch: `None` where the kernel returns a zero id
pub fn taskq_dispatch<F>(taskq: &Taskq, f: F, flags: DispatchFlags) -> Option<TaskqId>
where
    F: FnOnce() + Send + 'static,
{
    match taskq.dispatch(f, flags) {
        Ok(id) => Some(id),
        Err(e) => {
            log::debug!("{}", e);
            None
        }
    }
}

/// See [`Taskq::wait`]
pub fn taskq_wait(taskq: &Taskq) {
    taskq.wait();
}

/// See [`Taskq::member`]
pub fn taskq_member(taskq: &Taskq, kt: &KThread) -> bool {
    taskq.member(kt)
}

/// See [`Taskq::destroy`]
pub fn taskq_destroy(taskq: &Taskq) {
    taskq.destroy();
}
