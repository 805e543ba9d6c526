//! Checkpoint/resume safe-region markers
//!
//! Long-running threads bracket the places where they sleep with
//! `safe_begin`/`safe_end`. In userspace there is nothing to checkpoint, so
//! the markers only assert that the bound mutex is held at each step.

use super::mutex::KMutex;

/// CPR bookkeeping bound to the mutex the owning thread sleeps under
#[derive(Debug)]
pub struct CallbCpr<'a> {
    lock: &'a KMutex,
    name: String,
}

impl<'a> CallbCpr<'a> {
    /// Bind to `lock` (`CALLB_CPR_INIT`)
    pub fn new(lock: &'a KMutex, name: &str) -> Self {
        log::trace!("callb_cpr '{}' registered", name);
        Self {
            lock,
            name: name.to_owned(),
        }
    }

    /// Name given at registration
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enter a region where the thread may be suspended. The lock must be held.
    pub fn safe_begin(&self) {
        self.lock.assert_held("CALLB_CPR_SAFE_BEGIN");
    }

    /// Leave the safe region. The lock must be held.
    pub fn safe_end(&self) {
        self.lock.assert_held("CALLB_CPR_SAFE_END");
    }

    /// Deregister and release the lock (`CALLB_CPR_EXIT`)
    pub fn exit(self) {
        self.lock.assert_held("CALLB_CPR_EXIT");
        log::trace!("callb_cpr '{}' exiting", self.name);
        self.lock.exit();
    }
}
