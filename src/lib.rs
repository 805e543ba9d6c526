//! # Rust Kernel Context
//!
//! A userspace substrate for code written against a kernel threading model:
//! self-checking synchronization primitives, kernel threads with a
//! `curthread` lookup, elastic task queues and one process-wide task queue.
//!
//! ## Features
//!
//! - **Checked primitives**: [`KMutex`], [`KRwLock`] and [`KCondvar`] carry a
//!   lifecycle tag and owner bookkeeping; misuse is fatal and caught before
//!   it corrupts any state
//! - **Kernel threads**: [`thread_create`], [`curthread`], [`thread_exit`]
//!   and thread-specific data
//! - **Task queues**: fixed or dynamic worker pools with prepopulation,
//!   fail-fast dispatch, priority ordering and drain
//! - **System task queue**: explicit init and fini of a shared queue
//!
//! ## Quick Start
//!
//! ```rust
//! use rust_kernel_context::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<()> {
//! let tq = Taskq::create(TaskqConfig::new("quick_start", 4))?;
//! let lock = Arc::new(KMutex::initialized("counter_lock"));
//!
//! for _ in 0..10 {
//!     let lock = Arc::clone(&lock);
//!     tq.dispatch(
//!         move || {
//!             lock.enter();
//!             assert!(lock.held());
//!             lock.exit();
//!         },
//!         DispatchFlags::SLEEP,
//!     )?;
//! }
//!
//! tq.wait();
//! tq.destroy();
//! # Ok(())
//! # }
//! ```
//!
//! ## Dynamic Task Queues
//!
//! ```rust
//! use rust_kernel_context::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! let config = TaskqConfig::new("elastic", 1)
//!     .with_dynamic(1, 8)
//!     .with_prepopulate(true)
//!     .with_idle_timeout(Duration::from_millis(200));
//!
//! let tq = Taskq::create(config)?;
//! assert_eq!(tq.nthreads(), 1);
//! # tq.destroy();
//! # Ok(())
//! # }
//! ```
//!
//! ## Condition Variables
//!
//! ```rust
//! use rust_kernel_context::prelude::*;
//! use std::time::{Duration, Instant};
//!
//! let lock = KMutex::initialized("tx_sync_lock");
//! let cv = KCondvar::initialized("tx_sync_done_cv");
//!
//! lock.enter();
//! let result = cv.timed_wait(&lock, Instant::now() + Duration::from_millis(10));
//! assert!(result.timed_out());
//! assert!(lock.held());
//! lock.exit();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod core;
pub mod debug;
pub mod kernel;
pub mod pool;
pub mod prelude;
pub mod sync;
pub mod thread;
pub mod tracing;

pub use crate::core::{
    BoxedJob, ClosureJob, Job, Priority, RejectReason, Result, TaskqId, ThreadError,
};
pub use crate::pool::{
    system_taskq, system_taskq_fini, system_taskq_init, DispatchFlags, Taskq, TaskqConfig,
    TaskqFlags, TaskqStats,
};
pub use crate::sync::{CvWaitResult, KCondvar, KMutex, KRwLock, RwMode};
pub use crate::thread::{
    curthread, curthread_id, thread_create, thread_exit, KThread, KThreadId, RunState,
};
