//! Core types shared by the queues: tasks, priorities, errors

pub mod error;
pub mod job;
pub mod priority;

pub use error::{RejectReason, Result, ThreadError};
pub use job::{BoxedJob, ClosureJob, Job};
pub use priority::{Priority, TaskQueue, TaskqId, WorkItem};
