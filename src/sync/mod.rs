//! Kernel synchronization primitives
//!
//! [`KMutex`], [`KRwLock`] and [`KCondvar`] each wrap a native
//! `parking_lot` mutex/condvar pair that guards the primitive's bookkeeping:
//! a lifecycle tag, the owner and the waiter counts. The kernel-visible lock
//! is that bookkeeping, so ownership can be asserted and misuse caught
//! before it corrupts anything.

mod condvar;
mod cpr;
mod magic;
mod mutex;
mod rwlock;

pub use condvar::{CvType, CvWaitResult, KCondvar};
pub use cpr::CallbCpr;
pub use magic::{Tag, CV_MAGIC, MAGIC_DEST, MAGIC_INIT, MTX_MAGIC, RW_MAGIC};
pub use mutex::{KMutex, KMutexGuard, MutexType};
pub use rwlock::{KRwLock, RwMode, RwType};
