//! Convenient re-exports for common types and traits

pub use crate::clock::{delay, lbolt, Clock, HZ};
pub use crate::core::{BoxedJob, ClosureJob, Job, Priority, Result, TaskqId, ThreadError};
pub use crate::debug::CeLevel;
pub use crate::kernel::{kernel_fini, kernel_init, KernelMode};
pub use crate::pool::{
    system_taskq, system_taskq_fini, system_taskq_init, taskq_create, DispatchFlags, Taskq,
    TaskqConfig, TaskqFlags, TaskqStats,
};
pub use crate::sync::{CallbCpr, CvWaitResult, KCondvar, KMutex, KRwLock, RwMode};
pub use crate::thread::{
    curthread, curthread_id, thread_create, thread_exit, KThread, KThreadId, RunState,
    MAXCLSYSPRI, MINCLSYSPRI, STACK_SIZE,
};
