//! Condition variable paired with [`KMutex`]

use super::magic::{Header, Tag, CV_MAGIC};
use super::mutex::KMutex;
use crate::clock::{lbolt_to_instant, Clock};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::time::Instant;

/// Condvar variants accepted by [`KCondvar::init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CvType {
    /// `CV_DEFAULT`
    #[default]
    Default,
}

/// How a timed wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum CvWaitResult {
    /// Woken by `signal` or `broadcast`
    Signaled,
    /// The deadline passed first
    TimedOut,
}

impl CvWaitResult {
    /// True for [`CvWaitResult::TimedOut`]
    pub fn timed_out(self) -> bool {
        self == CvWaitResult::TimedOut
    }
}

#[derive(Debug)]
struct CvState {
    header: Header,
    waiters: u32,
}

/// A kernel condition variable.
///
/// Waiters register under the condvar's own native lock before releasing
/// the paired [`KMutex`], so a signal issued after the mutex is released
/// cannot be lost. Lock order is condvar state, then mutex state.
pub struct KCondvar {
    state: Mutex<CvState>,
    cond: Condvar,
}

impl fmt::Debug for KCondvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("KCondvar")
            .field("name", &state.header.name())
            .field("tag", &state.header.tag())
            .field("waiters", &state.waiters)
            .finish()
    }
}

impl Default for KCondvar {
    fn default() -> Self {
        Self::new()
    }
}

impl KCondvar {
    /// An uninitialized condvar; usable in `static`s
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(CvState {
                header: Header::new("condvar", CV_MAGIC),
                waiters: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// A live condvar named `name`
    pub fn initialized(name: &str) -> Self {
        let cv = Self::new();
        cv.init(Some(name), CvType::Default, None);
        cv
    }

    /// UNINITIALIZED or DESTROYED -> LIVE. Double init is fatal.
    pub fn init(&self, name: Option<&str>, _kind: CvType, _cookie: Option<usize>) {
        let mut state = self.state.lock();
        state.header.init(name);
        state.waiters = 0;
    }

    /// LIVE -> DESTROYED. Fatal while any thread is waiting.
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        state.header.verify_live("cv_destroy");
        if state.waiters > 0 {
            let waiters = state.waiters;
            state
                .header
                .fatal(format_args!("cv_destroy with {} waiters", waiters));
        }
        state.header.destroy();
    }

    /// Atomically release `mutex` and sleep until signaled, then reacquire
    /// `mutex` before returning. The caller must hold `mutex`.
    ///
    /// As with any condition variable, re-check the predicate on return.
    pub fn wait(&self, mutex: &KMutex) {
        let mut state = self.begin_wait(mutex, "cv_wait");
        self.cond.wait(&mut state);
        state.waiters -= 1;
        drop(state);
        mutex.enter();
    }

    /// [`wait`](Self::wait) with an absolute deadline. `mutex` is held again
    /// on return in both outcomes.
    pub fn timed_wait(&self, mutex: &KMutex, deadline: Instant) -> CvWaitResult {
        let mut state = self.begin_wait(mutex, "cv_timedwait");
        let timed_out = self.cond.wait_until(&mut state, deadline).timed_out();
        state.waiters -= 1;
        drop(state);
        mutex.enter();
        if timed_out {
            CvWaitResult::TimedOut
        } else {
            CvWaitResult::Signaled
        }
    }

    /// [`timed_wait`](Self::timed_wait) with the deadline given as an
    /// absolute [`lbolt`](crate::clock::lbolt) tick count
    pub fn timed_wait_ticks(&self, mutex: &KMutex, abstime: Clock) -> CvWaitResult {
        self.timed_wait(mutex, lbolt_to_instant(abstime))
    }

    fn begin_wait(&self, mutex: &KMutex, op: &str) -> parking_lot::MutexGuard<'_, CvState> {
        let mut state = self.state.lock();
        state.header.verify_live(op);
        mutex.assert_held(op);
        state.waiters += 1;
        mutex.exit();
        state
    }

    /// Wake one waiter, if any
    pub fn signal(&self) {
        let state = self.state.lock();
        state.header.verify_live("cv_signal");
        if state.waiters > 0 {
            self.cond.notify_one();
        }
    }

    /// Wake every waiter
    pub fn broadcast(&self) {
        let state = self.state.lock();
        state.header.verify_live("cv_broadcast");
        if state.waiters > 0 {
            self.cond.notify_all();
        }
    }

    /// Threads currently waiting
    pub fn waiters(&self) -> u32 {
        self.state.lock().waiters
    }

    /// Lifecycle tag
    pub fn tag(&self) -> Tag {
        self.state.lock().header.tag()
    }

    /// Name given at init
    pub fn name(&self) -> Option<String> {
        self.state.lock().header.name().map(str::to_owned)
    }
}
