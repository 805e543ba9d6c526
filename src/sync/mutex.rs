//! Exclusive lock with owner tracking

use super::magic::{Header, Tag, MTX_MAGIC};
use crate::thread::{curthread_id, KThreadId};
use parking_lot::{Condvar, Mutex};
use std::fmt;

/// Mutex variants accepted by [`KMutex::init`]. Only the default exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutexType {
    /// `MUTEX_DEFAULT`
    #[default]
    Default,
}

#[derive(Debug)]
struct MutexState {
    header: Header,
    owner: Option<KThreadId>,
    waiters: u32,
}

/// A kernel mutex: one owner at a time, owner recorded for assertions.
///
/// The lock is the `owner` field; the inner `parking_lot` mutex only guards
/// the bookkeeping and is never held across a blocking call.
pub struct KMutex {
    state: Mutex<MutexState>,
    released: Condvar,
}

impl fmt::Debug for KMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("KMutex")
            .field("name", &state.header.name())
            .field("tag", &state.header.tag())
            .field("owner", &state.owner)
            .field("waiters", &state.waiters)
            .finish()
    }
}

impl Default for KMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl KMutex {
    /// An uninitialized mutex; usable in `static`s. Call [`init`](Self::init)
    /// before use.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(MutexState {
                header: Header::new("mutex", MTX_MAGIC),
                owner: None,
                waiters: 0,
            }),
            released: Condvar::new(),
        }
    }

    /// A live mutex named `name`
    pub fn initialized(name: &str) -> Self {
        let mutex = Self::new();
        mutex.init(Some(name), MutexType::Default, None);
        mutex
    }

    /// UNINITIALIZED or DESTROYED -> LIVE. Double init is fatal.
    ///
    /// `cookie` is accepted for interface compatibility and ignored.
    pub fn init(&self, name: Option<&str>, _kind: MutexType, _cookie: Option<usize>) {
        let mut state = self.state.lock();
        state.header.init(name);
        state.owner = None;
        state.waiters = 0;
    }

    /// LIVE -> DESTROYED. Fatal if held or if threads are waiting for it.
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        state.header.verify_live("mutex_destroy");
        if let Some(owner) = state.owner {
            state
                .header
                .fatal(format_args!("mutex_destroy while held by {}", owner));
        }
        if state.waiters > 0 {
            let waiters = state.waiters;
            state
                .header
                .fatal(format_args!("mutex_destroy with {} waiters", waiters));
        }
        state.header.destroy();
    }

    /// Acquire, blocking while another thread owns the mutex.
    /// Recursive entry is fatal.
    pub fn enter(&self) {
        let me = curthread_id();
        let mut state = self.state.lock();
        state.header.verify_live("mutex_enter");
        if state.owner == Some(me) {
            state
                .header
                .fatal(format_args!("recursive mutex_enter by {}", me));
        }
        while state.owner.is_some() {
            state.waiters += 1;
            self.released.wait(&mut state);
            state.waiters -= 1;
        }
        state.owner = Some(me);
    }

    /// Acquire without blocking; false if another thread owns it
    pub fn try_enter(&self) -> bool {
        let me = curthread_id();
        let mut state = self.state.lock();
        state.header.verify_live("mutex_tryenter");
        if state.owner.is_some() {
            return false;
        }
        state.owner = Some(me);
        true
    }

    /// Release. Fatal unless the caller is the owner.
    pub fn exit(&self) {
        let me = curthread_id();
        let mut state = self.state.lock();
        state.header.verify_live("mutex_exit");
        match state.owner {
            Some(owner) if owner == me => {}
            Some(owner) => state
                .header
                .fatal(format_args!("mutex_exit by {} but owner is {}", me, owner)),
            None => state
                .header
                .fatal(format_args!("mutex_exit by {} of unheld mutex", me)),
        }
        state.owner = None;
        if state.waiters > 0 {
            self.released.notify_one();
        }
    }

    /// Acquire and release on drop
    pub fn lock(&self) -> KMutexGuard<'_> {
        self.enter();
        KMutexGuard { mutex: self }
    }

    /// True if the calling thread owns the mutex (`MUTEX_HELD`)
    pub fn held(&self) -> bool {
        self.owner() == Some(curthread_id())
    }

    /// Current owner, if any. A snapshot for assertions only.
    pub fn owner(&self) -> Option<KThreadId> {
        self.state.lock().owner
    }

    /// True if any thread owns the mutex
    pub fn is_locked(&self) -> bool {
        self.owner().is_some()
    }

    /// Lifecycle tag
    pub fn tag(&self) -> Tag {
        self.state.lock().header.tag()
    }

    /// Name given at init
    pub fn name(&self) -> Option<String> {
        self.state.lock().header.name().map(str::to_owned)
    }

    /// Fatal unless live and owned by the caller
    pub(crate) fn assert_held(&self, op: &str) {
        let me = curthread_id();
        let state = self.state.lock();
        state.header.verify_live(op);
        if state.owner != Some(me) {
            state
                .header
                .fatal(format_args!("{} by {} without holding the mutex", op, me));
        }
    }

    #[cfg(test)]
    fn scribble(&self, value: u64) {
        self.state.lock().header.scribble(value);
    }
}

/// RAII guard returned by [`KMutex::lock`]
#[must_use = "if unused the mutex will immediately unlock"]
pub struct KMutexGuard<'a> {
    mutex: &'a KMutex,
}

impl KMutexGuard<'_> {
    /// The guarded mutex, e.g. to pass to [`KCondvar::wait`](super::KCondvar::wait)
    pub fn mutex(&self) -> &KMutex {
        self.mutex
    }
}

impl Drop for KMutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::magic::Tag;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    static GLOBAL_LOCK: KMutex = KMutex::new();

    #[test]
    fn test_enter_exit_tracks_owner() {
        let m = KMutex::initialized("spa_props_lock");
        assert!(!m.held());
        assert!(!m.is_locked());

        m.enter();
        assert!(m.held());
        assert_eq!(m.owner(), Some(curthread_id()));

        m.exit();
        assert!(!m.held());
        assert_eq!(m.owner(), None);
    }

    #[test]
    fn test_static_mutex_lifecycle() {
        assert_eq!(GLOBAL_LOCK.tag(), Tag::Uninitialized);
        GLOBAL_LOCK.init(Some("global"), MutexType::Default, None);
        {
            let _guard = GLOBAL_LOCK.lock();
            assert!(GLOBAL_LOCK.held());
        }
        assert!(!GLOBAL_LOCK.is_locked());
        GLOBAL_LOCK.destroy();
        assert_eq!(GLOBAL_LOCK.tag(), Tag::Destroyed);
    }

    #[test]
    fn test_try_enter_contended() {
        let m = Arc::new(KMutex::initialized("contended"));
        m.enter();

        let m_clone = Arc::clone(&m);
        let got = thread::spawn(move || m_clone.try_enter()).join().unwrap();
        assert!(!got);

        m.exit();
        let m_clone = Arc::clone(&m);
        let got = thread::spawn(move || {
            let got = m_clone.try_enter();
            m_clone.exit();
            got
        })
        .join()
        .unwrap();
        assert!(got);
    }

    #[test]
    fn test_mutual_exclusion() {
        let m = Arc::new(KMutex::initialized("counter"));
        let inside = Arc::new(AtomicBool::new(false));
        let total = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&m);
                let inside = Arc::clone(&inside);
                let total = Arc::clone(&total);
                thread::spawn(move || {
                    for _ in 0..200 {
                        m.enter();
                        assert!(!inside.swap(true, Ordering::SeqCst));
                        assert!(m.held());
                        total.fetch_add(1, Ordering::Relaxed);
                        inside.store(false, Ordering::SeqCst);
                        m.exit();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("Thread panicked");
        }
        assert_eq!(total.load(Ordering::Relaxed), 1600);
    }

    #[test]
    fn test_exit_by_non_owner_is_fatal() {
        let m = Arc::new(KMutex::initialized("owned"));
        m.enter();

        let m_clone = Arc::clone(&m);
        let result = thread::spawn(move || m_clone.exit()).join();
        assert!(result.is_err());
        assert!(m.held());
        m.exit();
    }

    #[test]
    #[should_panic(expected = "of unheld mutex")]
    fn test_exit_unheld_is_fatal() {
        let m = KMutex::initialized("unheld");
        m.exit();
    }

    #[test]
    #[should_panic(expected = "recursive mutex_enter")]
    fn test_recursive_enter_is_fatal() {
        let m = KMutex::initialized("recursive");
        m.enter();
        m.enter();
    }

    #[test]
    #[should_panic(expected = "double init")]
    fn test_double_init_is_fatal() {
        let m = KMutex::initialized("twice");
        m.init(Some("twice"), MutexType::Default, None);
    }

    #[test]
    #[should_panic(expected = "on destroyed mutex")]
    fn test_double_destroy_is_fatal() {
        let m = KMutex::initialized("gone");
        m.destroy();
        m.destroy();
    }

    #[test]
    #[should_panic(expected = "on uninitialized mutex")]
    fn test_enter_uninitialized_is_fatal() {
        let m = KMutex::new();
        m.enter();
    }

    #[test]
    fn test_destroy_while_held_is_rejected_before_state_changes() {
        let m = Arc::new(KMutex::initialized("busy"));
        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let m_clone = Arc::clone(&m);
        let holder = thread::spawn(move || {
            m_clone.enter();
            held_tx.send(()).unwrap();
            let _ = release_rx.recv();
            m_clone.exit();
        });
        held_rx.recv().unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| m.destroy()));
        assert!(result.is_err());
        assert_eq!(m.tag(), Tag::Live);
        assert!(m.is_locked());
        assert!(!m.held());

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        m.destroy();
        assert_eq!(m.tag(), Tag::Destroyed);
    }

    #[test]
    fn test_reinit_after_destroy() {
        let m = KMutex::initialized("first");
        m.destroy();
        m.init(Some("second"), MutexType::Default, None);
        assert_eq!(m.tag(), Tag::Live);
        assert_eq!(m.name().as_deref(), Some("second"));
        m.enter();
        m.exit();
    }

    #[test]
    #[should_panic(expected = "corrupt magic")]
    fn test_corrupt_tag_is_fatal() {
        let m = KMutex::initialized("scribbled");
        m.scribble(0xdead_beef);
        m.enter();
    }

    #[test]
    fn test_blocked_enter_wakes_on_exit() {
        let m = Arc::new(KMutex::initialized("handoff"));
        m.enter();

        let acquired = Arc::new(AtomicBool::new(false));
        let m_clone = Arc::clone(&m);
        let acquired_clone = Arc::clone(&acquired);
        let waiter = thread::spawn(move || {
            m_clone.enter();
            acquired_clone.store(true, Ordering::SeqCst);
            m_clone.exit();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));
        m.exit();
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}
