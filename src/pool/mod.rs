//! Task queues and the system task queue

mod config;
mod stats;
mod system;
mod taskq;
mod worker;

pub use config::{DispatchFlags, TaskqConfig, TaskqFlags};
pub use stats::{TaskqStats, TaskqStatsSnapshot};
pub use system::{
    system_taskq, system_taskq_config, system_taskq_fini, system_taskq_init, system_taskq_live,
};
pub use taskq::{
    taskq_create, taskq_destroy, taskq_dispatch, taskq_member, taskq_wait, Taskq, TaskqPhase,
};
