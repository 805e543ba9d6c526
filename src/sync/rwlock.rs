//! Reader-writer lock with writer tracking
//!
//! Readers are counted, not identified, so read holds cannot be attributed
//! to a thread: `read_held` only says that *some* reader is inside.
//!
//! Fairness: writers are preferred. While a writer waits, new readers
//! block. When a writer releases, the readers that were waiting at that
//! moment get a batch pass and are admitted ahead of the next writer, so a
//! steady stream of writers cannot starve them.

use super::magic::{Header, Tag, RW_MAGIC};
use crate::thread::{curthread_id, KThreadId};
use parking_lot::{Condvar, Mutex};
use std::fmt;

/// Hold mode for [`KRwLock::enter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwMode {
    /// Shared (`RW_READER`)
    Read,
    /// Exclusive (`RW_WRITER`)
    Write,
}

/// Lock variants accepted by [`KRwLock::init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RwType {
    /// `RW_DEFAULT`
    #[default]
    Default,
}

#[derive(Debug)]
struct RwState {
    header: Header,
    writer: Option<KThreadId>,
    readers: u32,
    readers_waiting: u32,
    writers_waiting: u32,
    reader_pass: u32,
}

impl RwState {
    fn read_admissible(&self) -> bool {
        self.writer.is_none() && (self.writers_waiting == 0 || self.reader_pass > 0)
    }

    fn write_admissible(&self) -> bool {
        self.writer.is_none() && self.readers == 0 && self.reader_pass == 0
    }

    fn admit_reader(&mut self) {
        self.reader_pass = self.reader_pass.saturating_sub(1);
        self.readers += 1;
    }
}

/// A kernel reader-writer lock
pub struct KRwLock {
    state: Mutex<RwState>,
    read_cv: Condvar,
    write_cv: Condvar,
}

impl fmt::Debug for KRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("KRwLock")
            .field("name", &state.header.name())
            .field("tag", &state.header.tag())
            .field("writer", &state.writer)
            .field("readers", &state.readers)
            .field("readers_waiting", &state.readers_waiting)
            .field("writers_waiting", &state.writers_waiting)
            .finish()
    }
}

impl Default for KRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl KRwLock {
    /// An uninitialized lock; usable in `static`s
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RwState {
                header: Header::new("rwlock", RW_MAGIC),
                writer: None,
                readers: 0,
                readers_waiting: 0,
                writers_waiting: 0,
                reader_pass: 0,
            }),
            read_cv: Condvar::new(),
            write_cv: Condvar::new(),
        }
    }

    /// A live lock named `name`
    pub fn initialized(name: &str) -> Self {
        let lock = Self::new();
        lock.init(Some(name), RwType::Default, None);
        lock
    }

    /// UNINITIALIZED or DESTROYED -> LIVE. Double init is fatal.
    pub fn init(&self, name: Option<&str>, _kind: RwType, _cookie: Option<usize>) {
        let mut state = self.state.lock();
        state.header.init(name);
        state.writer = None;
        state.readers = 0;
        state.readers_waiting = 0;
        state.writers_waiting = 0;
        state.reader_pass = 0;
    }

    /// LIVE -> DESTROYED. Fatal if held in either mode or waited on.
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        state.header.verify_live("rw_destroy");
        if let Some(writer) = state.writer {
            state
                .header
                .fatal(format_args!("rw_destroy while write-held by {}", writer));
        }
        if state.readers > 0 {
            let readers = state.readers;
            state
                .header
                .fatal(format_args!("rw_destroy while held by {} readers", readers));
        }
        if state.readers_waiting > 0 || state.writers_waiting > 0 {
            let waiting = state.readers_waiting + state.writers_waiting;
            state
                .header
                .fatal(format_args!("rw_destroy with {} waiters", waiting));
        }
        state.header.destroy();
    }

    /// Acquire in `mode`, blocking until admitted.
    /// Entering in either mode while holding WRITE is fatal.
    pub fn enter(&self, mode: RwMode) {
        let me = curthread_id();
        let mut state = self.state.lock();
        state.header.verify_live("rw_enter");
        if state.writer == Some(me) {
            state
                .header
                .fatal(format_args!("recursive rw_enter({:?}) by writer {}", mode, me));
        }
        match mode {
            RwMode::Read => {
                while !state.read_admissible() {
                    state.readers_waiting += 1;
                    self.read_cv.wait(&mut state);
                    state.readers_waiting -= 1;
                }
                state.admit_reader();
            }
            RwMode::Write => {
                while !state.write_admissible() {
                    state.writers_waiting += 1;
                    self.write_cv.wait(&mut state);
                    state.writers_waiting -= 1;
                }
                state.writer = Some(me);
            }
        }
    }

    /// Acquire in `mode` if that is possible without blocking
    pub fn try_enter(&self, mode: RwMode) -> bool {
        let me = curthread_id();
        let mut state = self.state.lock();
        state.header.verify_live("rw_tryenter");
        match mode {
            RwMode::Read if state.read_admissible() => {
                state.admit_reader();
                true
            }
            RwMode::Write if state.write_admissible() => {
                state.writer = Some(me);
                true
            }
            _ => false,
        }
    }

    /// Release WRITE if the caller is the writer, otherwise one READ hold.
    /// Fatal if the lock is not held at all.
    pub fn exit(&self) {
        let me = curthread_id();
        let mut state = self.state.lock();
        state.header.verify_live("rw_exit");
        if state.writer == Some(me) {
            state.writer = None;
            state.reader_pass = state.readers_waiting;
            self.wake_after_write(&state);
        } else if state.readers > 0 {
            state.readers -= 1;
            if state.readers == 0 && state.writers_waiting > 0 {
                self.write_cv.notify_one();
            }
        } else {
            match state.writer {
                Some(writer) => state
                    .header
                    .fatal(format_args!("rw_exit by {} but writer is {}", me, writer)),
                None => state
                    .header
                    .fatal(format_args!("rw_exit by {} of unheld lock", me)),
            }
        }
    }

    /// Convert the caller's READ hold to WRITE without releasing, provided
    /// it is the only reader and no writer is waiting. On failure the READ
    /// hold is kept.
    pub fn try_upgrade(&self) -> bool {
        let me = curthread_id();
        let mut state = self.state.lock();
        state.header.verify_live("rw_tryupgrade");
        if state.writer == Some(me) {
            state
                .header
                .fatal(format_args!("rw_tryupgrade by {} already holding WRITE", me));
        }
        if state.readers == 0 {
            state
                .header
                .fatal(format_args!("rw_tryupgrade by {} without a READ hold", me));
        }
        if state.readers == 1 && state.writer.is_none() && state.writers_waiting == 0 {
            state.readers = 0;
            state.writer = Some(me);
            true
        } else {
            false
        }
    }

    /// Convert the caller's WRITE hold to READ and admit waiting readers
    pub fn downgrade(&self) {
        let me = curthread_id();
        let mut state = self.state.lock();
        state.header.verify_live("rw_downgrade");
        if state.writer != Some(me) {
            state
                .header
                .fatal(format_args!("rw_downgrade by {} without WRITE held", me));
        }
        state.writer = None;
        state.readers = 1;
        state.reader_pass = state.readers_waiting;
        if state.readers_waiting > 0 {
            self.read_cv.notify_all();
        }
    }

    fn wake_after_write(&self, state: &RwState) {
        if state.readers_waiting > 0 {
            self.read_cv.notify_all();
        }
        if state.writers_waiting > 0 {
            self.write_cv.notify_one();
        }
    }

    /// Some thread holds READ (`RW_READ_HELD`)
    pub fn read_held(&self) -> bool {
        self.state.lock().readers > 0
    }

    /// The caller holds WRITE (`RW_WRITE_HELD`)
    pub fn write_held(&self) -> bool {
        self.writer() == Some(curthread_id())
    }

    /// `read_held() || write_held()`
    pub fn lock_held(&self) -> bool {
        self.read_held() || self.write_held()
    }

    /// Number of READ holds
    pub fn readers(&self) -> u32 {
        self.state.lock().readers
    }

    /// Current writer, if any
    pub fn writer(&self) -> Option<KThreadId> {
        self.state.lock().writer
    }

    /// Lifecycle tag
    pub fn tag(&self) -> Tag {
        self.state.lock().header.tag()
    }

    /// Name given at init
    pub fn name(&self) -> Option<String> {
        self.state.lock().header.name().map(str::to_owned)
    }

    #[cfg(test)]
    fn scribble(&self, value: u64) {
        self.state.lock().header.scribble(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_read_holds_are_shared() {
        let rw = Arc::new(KRwLock::initialized("dn_struct_rwlock"));
        rw.enter(RwMode::Read);

        let rw_clone = Arc::clone(&rw);
        let got = thread::spawn(move || {
            let got = rw_clone.try_enter(RwMode::Read);
            if got {
                rw_clone.exit();
            }
            got
        })
        .join()
        .unwrap();

        assert!(got);
        assert!(rw.read_held());
        assert!(!rw.write_held());
        assert_eq!(rw.readers(), 1);
        rw.exit();
        assert!(!rw.lock_held());
    }

    #[test]
    fn test_write_excludes_everyone() {
        let rw = Arc::new(KRwLock::initialized("excl"));
        rw.enter(RwMode::Write);
        assert!(rw.write_held());
        assert_eq!(rw.writer(), Some(curthread_id()));

        let rw_clone = Arc::clone(&rw);
        let (r, w) = thread::spawn(move || {
            (
                rw_clone.try_enter(RwMode::Read),
                rw_clone.try_enter(RwMode::Write),
            )
        })
        .join()
        .unwrap();
        assert!(!r);
        assert!(!w);

        rw.exit();
        assert!(!rw.lock_held());
    }

    #[test]
    fn test_try_upgrade_sole_reader() {
        let rw = KRwLock::initialized("upgrade");
        rw.enter(RwMode::Read);
        assert!(rw.try_upgrade());
        assert!(rw.write_held());
        assert_eq!(rw.readers(), 0);
        rw.exit();
    }

    #[test]
    fn test_try_upgrade_fails_with_other_reader() {
        let rw = Arc::new(KRwLock::initialized("upgrade_busy"));
        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let rw_clone = Arc::clone(&rw);
        let other = thread::spawn(move || {
            rw_clone.enter(RwMode::Read);
            held_tx.send(()).unwrap();
            let _ = release_rx.recv();
            rw_clone.exit();
        });
        held_rx.recv().unwrap();

        rw.enter(RwMode::Read);
        assert!(!rw.try_upgrade());
        assert!(!rw.write_held());
        assert_eq!(rw.readers(), 2);

        release_tx.send(()).unwrap();
        other.join().unwrap();
        rw.exit();
        assert!(!rw.lock_held());
    }

    #[test]
    fn test_downgrade_admits_waiting_reader() {
        let rw = Arc::new(KRwLock::initialized("downgrade"));
        rw.enter(RwMode::Write);

        let admitted = Arc::new(AtomicBool::new(false));
        let rw_clone = Arc::clone(&rw);
        let admitted_clone = Arc::clone(&admitted);
        let reader = thread::spawn(move || {
            rw_clone.enter(RwMode::Read);
            admitted_clone.store(true, Ordering::SeqCst);
            rw_clone.exit();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!admitted.load(Ordering::SeqCst));

        rw.downgrade();
        assert!(!rw.write_held());
        reader.join().unwrap();
        assert!(admitted.load(Ordering::SeqCst));
        rw.exit();
        assert_eq!(rw.readers(), 0);
    }

    #[test]
    fn test_waiting_writer_blocks_new_readers() {
        let rw = Arc::new(KRwLock::initialized("writer_pref"));
        rw.enter(RwMode::Read);

        let rw_clone = Arc::clone(&rw);
        let writer = thread::spawn(move || {
            rw_clone.enter(RwMode::Write);
            rw_clone.exit();
        });
        while rw.state.lock().writers_waiting == 0 {
            thread::yield_now();
        }

        let rw_clone = Arc::clone(&rw);
        let got = thread::spawn(move || rw_clone.try_enter(RwMode::Read))
            .join()
            .unwrap();
        assert!(!got);

        rw.exit();
        writer.join().unwrap();
    }

    #[test]
    fn test_writers_do_not_starve_readers() {
        let rw = Arc::new(KRwLock::initialized("fair"));
        let stop = Arc::new(AtomicBool::new(false));
        let reads = Arc::new(AtomicUsize::new(0));

        let writers: Vec<_> = (0..3)
            .map(|_| {
                let rw = Arc::clone(&rw);
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    while !stop.load(Ordering::SeqCst) {
                        rw.enter(RwMode::Write);
                        thread::sleep(Duration::from_micros(200));
                        rw.exit();
                    }
                })
            })
            .collect();

        let rw_clone = Arc::clone(&rw);
        let reads_clone = Arc::clone(&reads);
        let reader = thread::spawn(move || {
            for _ in 0..20 {
                rw_clone.enter(RwMode::Read);
                reads_clone.fetch_add(1, Ordering::SeqCst);
                rw_clone.exit();
            }
        });

        reader.join().unwrap();
        stop.store(true, Ordering::SeqCst);
        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(reads.load(Ordering::SeqCst), 20);
    }

    #[test]
    #[should_panic(expected = "of unheld lock")]
    fn test_exit_unheld_is_fatal() {
        let rw = KRwLock::initialized("unheld");
        rw.exit();
    }

    #[test]
    #[should_panic(expected = "without WRITE held")]
    fn test_downgrade_without_write_is_fatal() {
        let rw = KRwLock::initialized("no_write");
        rw.enter(RwMode::Read);
        rw.downgrade();
    }

    #[test]
    #[should_panic(expected = "recursive rw_enter")]
    fn test_writer_reentry_is_fatal() {
        let rw = KRwLock::initialized("reenter");
        rw.enter(RwMode::Write);
        rw.enter(RwMode::Read);
    }

    #[test]
    fn test_destroy_while_read_held_is_rejected() {
        let rw = KRwLock::initialized("busy");
        rw.enter(RwMode::Read);

        let result = catch_unwind(AssertUnwindSafe(|| rw.destroy()));
        assert!(result.is_err());
        assert_eq!(rw.tag(), Tag::Live);
        assert_eq!(rw.readers(), 1);

        rw.exit();
        rw.destroy();
        assert_eq!(rw.tag(), Tag::Destroyed);
    }

    #[test]
    #[should_panic(expected = "corrupt magic")]
    fn test_corrupt_tag_is_fatal() {
        let rw = KRwLock::initialized("scribbled");
        rw.scribble(super::super::magic::MTX_MAGIC);
        rw.enter(RwMode::Read);
    }
}
