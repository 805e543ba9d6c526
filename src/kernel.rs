//! Bring-up and teardown of the kernel context, plus small machine helpers

use crate::debug::misuse;
use crate::pool::{system_taskq_fini, system_taskq_init};
use crate::thread::curthread_id;
use parking_lot::Mutex;

/// Upper bound on CPU ids; [`cpu_seqid`] is always below it
pub const MAX_NCPUS: usize = 64;

/// Access mode the consumer is brought up in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelMode {
    /// Read-only (`FREAD`)
    Read,
    /// Read-write (`FREAD | FWRITE`)
    ReadWrite,
}

/// What [`kernel_init`] recorded about the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelInfo {
    /// Mode given to `kernel_init`
    pub mode: KernelMode,
    /// Online CPUs at init
    pub ncpus: usize,
}

static KERNEL: Mutex<Option<KernelInfo>> = Mutex::new(None);

/// Bring the context up: record the machine, then create the system task
/// queue. A second init without fini is fatal.
pub fn kernel_init(mode: KernelMode) {
    let mut kernel = KERNEL.lock();
    if kernel.is_some() {
        drop(kernel);
        misuse("kernel", None, format_args!("kernel_init called twice"));
    }
    let info = KernelInfo {
        mode,
        ncpus: num_cpus::get(),
    };
    log::info!("kernel_init: mode {:?}, {} cpus", info.mode, info.ncpus);
    system_taskq_init();
    *kernel = Some(info);
}

/// Tear the context down, draining the system task queue
pub fn kernel_fini() {
    let info = KERNEL.lock().take();
    match info {
        Some(info) => {
            system_taskq_fini();
            log::info!("kernel_fini: mode {:?}", info.mode);
        }
        None => misuse("kernel", None, format_args!("kernel_fini without kernel_init")),
    }
}

/// Machine facts recorded at init, if the context is up
pub fn kernel_info() -> Option<KernelInfo> {
    *KERNEL.lock()
}

/// Online CPUs
pub fn ncpus() -> usize {
    num_cpus::get()
}

/// 1-based index of the highest set bit; 0 for 0
pub fn highbit(i: u64) -> u32 {
    u64::BITS - i.leading_zeros()
}

/// A small per-thread number below [`MAX_NCPUS`], for spreading per-CPU state
pub fn cpu_seqid() -> usize {
    (curthread_id().get() as usize) & (MAX_NCPUS - 1)
}
