//! The process-wide task queue
//!
//! Exactly one `system_taskq` exists between [`system_taskq_init`] and
//! [`system_taskq_fini`]. Touching it outside that window is fatal.

use super::config::{TaskqConfig, TaskqFlags};
use super::taskq::Taskq;
use crate::debug::misuse;
use crate::kernel::MAX_NCPUS;
use crate::thread::MINCLSYSPRI;
use parking_lot::Mutex;
use std::sync::Arc;

const NAME: &str = "system_taskq";

enum Slot {
    Uninitialized,
    Live(Arc<Taskq>),
    Finished,
}

static SYSTEM_TASKQ: Mutex<Slot> = Mutex::new(Slot::Uninitialized);

/// Policy of the system task queue: dynamic up to [`MAX_NCPUS`] threads,
/// one thread prepopulated, CPR-safe
pub fn system_taskq_config() -> TaskqConfig {
    TaskqConfig::from_flags(
        NAME,
        MAX_NCPUS,
        MINCLSYSPRI,
        4,
        512,
        TaskqFlags::DYNAMIC | TaskqFlags::PREPOPULATE | TaskqFlags::CPR_SAFE,
    )
}

/// Create the system task queue. A second init without fini is fatal.
pub fn system_taskq_init() {
    let mut slot = SYSTEM_TASKQ.lock();
    if let Slot::Live(_) = *slot {
        drop(slot);
        misuse("taskq", Some(NAME), format_args!("system_taskq_init called twice"));
    }
    match Taskq::create(system_taskq_config()) {
        Ok(taskq) => *slot = Slot::Live(taskq),
        Err(e) => {
            drop(slot);
            misuse("taskq", Some(NAME), format_args!("system_taskq_init: {}", e))
        }
    }
}

/// Drain and destroy the system task queue. Fatal without a prior init.
pub fn system_taskq_fini() {
    let taskq = {
        let mut slot = SYSTEM_TASKQ.lock();
        match std::mem::replace(&mut *slot, Slot::Finished) {
            Slot::Live(taskq) => taskq,
            previous => {
                *slot = previous;
                drop(slot);
                misuse("taskq", Some(NAME), format_args!("system_taskq_fini without init"));
            }
        }
    };
    taskq.destroy();
}

/// The system task queue. Fatal before init or after fini.
pub fn system_taskq() -> Arc<Taskq> {
    let slot = SYSTEM_TASKQ.lock();
    match &*slot {
        Slot::Live(taskq) => Arc::clone(taskq),
        Slot::Uninitialized => {
            drop(slot);
            misuse("taskq", Some(NAME), format_args!("used before system_taskq_init"))
        }
        Slot::Finished => {
            drop(slot);
            misuse("taskq", Some(NAME), format_args!("used after system_taskq_fini"))
        }
    }
}

/// True between init and fini
pub fn system_taskq_live() -> bool {
    matches!(*SYSTEM_TASKQ.lock(), Slot::Live(_))
}
