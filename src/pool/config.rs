//! Task queue creation policy and dispatch flags

use crate::core::{Result, ThreadError};
use crate::thread::{Pri, MINCLSYSPRI, STACK_SIZE};
use bitflags::bitflags;
use std::time::Duration;

bitflags! {
    /// Creation flags accepted by [`taskq_create`](super::taskq_create)
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct TaskqFlags: u32 {
        /// Spawn the thread floor at creation instead of on first dispatch
        const PREPOPULATE = 0x0001;
        /// Workers are CPR-safe; recorded only, userspace has no checkpoint
        const CPR_SAFE = 0x0002;
        /// Grow and shrink between a floor and a ceiling
        const DYNAMIC = 0x0004;
        /// `nthreads` is a percentage of the online CPUs
        const THREADS_CPU_PCT = 0x0008;
    }
}

bitflags! {
    /// Flags accepted by [`Taskq::dispatch`](super::Taskq::dispatch)
    ///
    /// With no flags set the queue's `fail_fast_default` decides between
    /// `SLEEP` and `NOSLEEP`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DispatchFlags: u32 {
        /// May fail when the outstanding-task limit is reached
        const NOSLEEP = 0x0001;
        /// Fail unless a worker is free (or can be started) to take the task
        const NOQUEUE = 0x0002;
        /// Block while the outstanding-task limit is reached
        const SLEEP = 0x0004;
    }
}

impl DispatchFlags {
    /// The pool default: whatever `fail_fast_default` says
    pub const POOL_DEFAULT: DispatchFlags = DispatchFlags::empty();
}

/// Configuration for a task queue
#[derive(Debug, Clone)]
pub struct TaskqConfig {
    /// Queue name; workers are named `<name>_<n>`
    pub name: String,
    /// Priority hint handed to worker threads
    pub priority: Pri,
    /// Thread floor. Equal to `max_threads` for fixed queues.
    pub min_threads: usize,
    /// Thread ceiling
    pub max_threads: usize,
    /// When set, the thread count is this percentage of the online CPUs
    pub cpu_percent: Option<u32>,
    /// Spawn the floor at creation
    pub prepopulate: bool,
    /// Dispatch without explicit flags behaves as `NOSLEEP`
    pub fail_fast_default: bool,
    /// Grow on demand and let idle workers above the floor exit
    pub dynamic: bool,
    /// Recorded for kernel-style callers. Userspace has no checkpoint/resume,
    /// so workers behave the same either way.
    pub cpr_safe: bool,
    /// Queue capacity reserved up front
    pub min_alloc: usize,
    /// Limit on outstanding (queued or running) tasks; 0 means no limit
    pub max_alloc: usize,
    /// How long a worker above the floor stays idle before exiting
    pub idle_timeout: Duration,
    /// Extra queued tasks tolerated before another worker is started
    pub low_water_mark: usize,
    /// Worker stack size
    pub stack_size: usize,
}

impl Default for TaskqConfig {
    fn default() -> Self {
        let nthreads = num_cpus::get();
        Self {
            name: "taskq".to_string(),
            priority: MINCLSYSPRI,
            min_threads: nthreads,
            max_threads: nthreads,
            cpu_percent: None,
            prepopulate: false,
            fail_fast_default: false,
            dynamic: false,
            cpr_safe: false,
            min_alloc: 0,
            max_alloc: 0,
            idle_timeout: Duration::from_secs(5),
            low_water_mark: 0,
            stack_size: STACK_SIZE,
        }
    }
}

impl TaskqConfig {
    /// A fixed queue of `nthreads` workers
    #[must_use]
    pub fn new<S: Into<String>>(name: S, nthreads: usize) -> Self {
        Self {
            name: name.into(),
            min_threads: nthreads,
            max_threads: nthreads,
            ..Default::default()
        }
    }

    /// Translate a kernel-style `taskq_create` call.
    ///
    /// For `DYNAMIC` queues `nthreads` is the ceiling and the floor is one
    /// thread. With `THREADS_CPU_PCT`, `nthreads` is a percentage.
    #[must_use]
    pub fn from_flags<S: Into<String>>(
        name: S,
        nthreads: usize,
        priority: Pri,
        min_alloc: usize,
        max_alloc: usize,
        flags: TaskqFlags,
    ) -> Self {
        let mut config = Self::new(name, nthreads)
            .with_priority(priority)
            .with_alloc(min_alloc, max_alloc)
            .with_prepopulate(flags.contains(TaskqFlags::PREPOPULATE))
            .with_cpr_safe(flags.contains(TaskqFlags::CPR_SAFE));
        if flags.contains(TaskqFlags::THREADS_CPU_PCT) {
            config.cpu_percent = Some(u32::try_from(nthreads).unwrap_or(u32::MAX));
        }
        if flags.contains(TaskqFlags::DYNAMIC) {
            config = config.with_dynamic(1, nthreads.max(1));
        }
        config
    }

    /// Set the worker priority hint
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_priority(mut self, priority: Pri) -> Self {
        self.priority = priority;
        self
    }

    /// Make this a fixed queue of `nthreads` workers
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_threads(mut self, nthreads: usize) -> Self {
        self.dynamic = false;
        self.min_threads = nthreads;
        self.max_threads = nthreads;
        self
    }

    /// Make this a dynamic queue between `min` and `max` workers
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_dynamic(mut self, min: usize, max: usize) -> Self {
        self.dynamic = true;
        self.min_threads = min;
        self.max_threads = max;
        self
    }

    /// Size the queue as a percentage of the online CPUs
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_cpu_percent(mut self, percent: u32) -> Self {
        self.cpu_percent = Some(percent);
        self
    }

    /// Spawn the thread floor at creation
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_prepopulate(mut self, prepopulate: bool) -> Self {
        self.prepopulate = prepopulate;
        self
    }

    /// Make dispatch without flags fail fast (`NOSLEEP`)
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast_default = fail_fast;
        self
    }

    /// Mark workers CPR-safe
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_cpr_safe(mut self, cpr_safe: bool) -> Self {
        self.cpr_safe = cpr_safe;
        self
    }

    /// Set the reserved capacity and the outstanding-task limit (0 = none)
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_alloc(mut self, min_alloc: usize, max_alloc: usize) -> Self {
        self.min_alloc = min_alloc;
        self.max_alloc = max_alloc;
        self
    }

    /// Set how long surplus workers of a dynamic queue linger when idle
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set how many extra queued tasks are tolerated before growing
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_low_water_mark(mut self, mark: usize) -> Self {
        self.low_water_mark = mark;
        self
    }

    /// Set the worker stack size
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ThreadError::invalid_config("name", "Task queue name must not be empty"));
        }
        match self.cpu_percent {
            Some(0) => {
                return Err(ThreadError::invalid_config(
                    "cpu_percent",
                    "CPU percentage must be greater than 0",
                ))
            }
            Some(pct) if pct > 100 => {
                return Err(ThreadError::invalid_config(
                    "cpu_percent",
                    format!("CPU percentage {} exceeds 100", pct),
                ))
            }
            Some(_) => {}
            None if self.max_threads == 0 => {
                return Err(ThreadError::invalid_config(
                    "max_threads",
                    "Number of threads must be greater than 0",
                ))
            }
            None => {}
        }
        if self.dynamic && self.cpu_percent.is_none() && self.min_threads > self.max_threads {
            return Err(ThreadError::invalid_config(
                "min_threads",
                format!(
                    "Thread floor {} exceeds ceiling {}",
                    self.min_threads, self.max_threads
                ),
            ));
        }
        if self.max_alloc > 0 && self.min_alloc > self.max_alloc {
            return Err(ThreadError::invalid_config(
                "min_alloc",
                format!(
                    "Reserved capacity {} exceeds limit {}",
                    self.min_alloc, self.max_alloc
                ),
            ));
        }
        if self.dynamic && self.idle_timeout.is_zero() {
            return Err(ThreadError::invalid_config(
                "idle_timeout",
                "Idle timeout must be non-zero",
            ));
        }
        Ok(())
    }

    /// Apply CPU-percentage sizing and settle the floor and ceiling.
    ///
    /// A percentage resolves to `max(ncpus * pct / 100, 1)` threads. Fixed
    /// queues run exactly that many; dynamic queues use it as the ceiling.
    pub(crate) fn resolve(mut self) -> Self {
        if let Some(pct) = self.cpu_percent {
            let nthreads = (num_cpus::get() * pct as usize / 100).max(1);
            if self.dynamic {
                self.max_threads = nthreads;
            } else {
                self.min_threads = nthreads;
                self.max_threads = nthreads;
            }
        }
        if self.dynamic {
            self.min_threads = self.min_threads.min(self.max_threads);
        } else {
            self.min_threads = self.max_threads;
        }
        self
    }

    /// Workers never retired: the floor of a dynamic queue, all of a fixed one
    pub(crate) fn floor(&self) -> usize {
        if self.dynamic {
            self.min_threads
        } else {
            self.max_threads
        }
    }
}
