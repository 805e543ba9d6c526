//! Kernel threads on top of native threads
//!
//! Every native thread that touches the kernel context has exactly one
//! [`KThread`]. Threads started by [`thread_create`] get theirs before the
//! entry runs; any other thread (the main thread, test harness threads) is
//! adopted lazily the first time it asks for [`curthread`]. Lock owners are
//! recorded as [`KThreadId`]s, which are never reused.

mod tsd;

pub use tsd::{tsd_create, tsd_destroy, tsd_get, tsd_set, TsdDestructor, TsdKey, TsdValue};

use crate::core::{Result, ThreadError};
use crate::debug::misuse;
use crossbeam_utils::sync::{Parker, Unparker};
use parking_lot::Mutex;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::num::NonZeroU64;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

/// Scheduling priority hint. Passed through, never enforced.
pub type Pri = i32;

/// Lowest system-class priority
pub const MINCLSYSPRI: Pri = 60;
/// Highest system-class priority
pub const MAXCLSYSPRI: Pri = 99;

/// Stack size kernel callers customarily ask for
pub const STACK_SIZE: usize = 8192;

/// Smallest stack actually handed to the platform; requests below this are
/// rounded up.
pub const MIN_STACK_SIZE: usize = 256 * 1024;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Option<Arc<KThread>>> = const { RefCell::new(None) };
    static CURRENT_ID: Cell<Option<KThreadId>> = const { Cell::new(None) };
}

/// Identity of a kernel thread, used as the owner of locks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KThreadId(NonZeroU64);

impl KThreadId {
    fn next() -> Self {
        let raw = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        // The counter starts at 1 and would need 2^64 threads to wrap
        KThreadId(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Raw numeric value
    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for KThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kt{}", self.0)
    }
}

/// Initial run state of a new thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// Start running immediately (`TS_RUN`)
    #[default]
    Run,
    /// Park before the entry runs until [`KThread::set_run`] is called
    Stopped,
}

/// Unwind payload used by [`thread_exit`]
struct ThreadExit;

/// True if `payload` came from [`thread_exit`]
pub(crate) fn is_thread_exit(payload: &(dyn std::any::Any + Send)) -> bool {
    payload.is::<ThreadExit>()
}

/// A kernel thread handle
pub struct KThread {
    id: KThreadId,
    name: Option<String>,
    native: OnceLock<thread::ThreadId>,
    stack_size: usize,
    priority: Pri,
    adopted: bool,
    handle: Mutex<Option<JoinHandle<()>>>,
    start_gate: Mutex<Option<Unparker>>,
    running: AtomicBool,
    exited: AtomicBool,
}

impl fmt::Debug for KThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KThread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("stack_size", &self.stack_size)
            .field("priority", &self.priority)
            .field("adopted", &self.adopted)
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("exited", &self.exited.load(Ordering::Relaxed))
            .finish()
    }
}

impl KThread {
    fn adopt() -> Self {
        let native = OnceLock::new();
        let _ = native.set(thread::current().id());
        Self {
            id: KThreadId::next(),
            name: thread::current().name().map(str::to_owned),
            native,
            stack_size: 0,
            priority: MINCLSYSPRI,
            adopted: true,
            handle: Mutex::new(None),
            start_gate: Mutex::new(None),
            running: AtomicBool::new(true),
            exited: AtomicBool::new(false),
        }
    }

    /// Kernel thread id
    pub fn id(&self) -> KThreadId {
        self.id
    }

    /// Thread name, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Native thread id, once the thread exists
    pub fn native_id(&self) -> Option<thread::ThreadId> {
        self.native.get().copied()
    }

    /// Stack size handed to the platform (after rounding); 0 for adopted threads
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Priority hint given at creation
    pub fn priority(&self) -> Pri {
        self.priority
    }

    /// True for threads that were not started by [`thread_create`]
    pub fn is_adopted(&self) -> bool {
        self.adopted
    }

    /// True once the entry has been released to run
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// True once the entry returned or called [`thread_exit`]
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Release a thread created in [`RunState::Stopped`]. No-op otherwise.
    pub fn set_run(&self) {
        self.running.store(true, Ordering::Release);
        if let Some(unparker) = self.start_gate.lock().take() {
            unparker.unpark();
        }
    }

    /// Wait for a created thread to finish.
    ///
    /// A thread that panicked reports a join error; a thread that called
    /// [`thread_exit`] joins cleanly.
    pub fn join(&self) -> Result<()> {
        if self.adopted {
            return Err(ThreadError::join(self.id.get(), "adopted threads are not joinable"));
        }
        if curthread_id() == self.id {
            misuse("thread", self.name(), format_args!("{} joining itself", self.id));
        }
        let handle = self.handle.lock().take();
        match handle {
            Some(handle) => handle
                .join()
                .map_err(|_| ThreadError::join(self.id.get(), "thread panicked")),
            None => Ok(()),
        }
    }

    /// True if a join handle is still held for this thread
    pub fn is_joinable(&self) -> bool {
        self.handle.lock().is_some()
    }
}

/// Fallible thread creation; [`thread_create`] turns failure into the fatal path.
pub(crate) fn spawn<F>(
    name: Option<String>,
    stack_size: usize,
    entry: F,
    state: RunState,
    priority: Pri,
) -> Result<Arc<KThread>>
where
    F: FnOnce() + Send + 'static,
{
    let stack_size = stack_size.max(MIN_STACK_SIZE);
    let parker = match state {
        RunState::Run => None,
        RunState::Stopped => Some(Parker::new()),
    };

    let kt = Arc::new(KThread {
        id: KThreadId::next(),
        name: name.clone(),
        native: OnceLock::new(),
        stack_size,
        priority,
        adopted: false,
        handle: Mutex::new(None),
        start_gate: Mutex::new(parker.as_ref().map(|p| p.unparker().clone())),
        running: AtomicBool::new(parker.is_none()),
        exited: AtomicBool::new(false),
    });

    let me = Arc::clone(&kt);
    let mut builder = thread::Builder::new().stack_size(stack_size);
    if let Some(name) = name {
        builder = builder.name(name);
    }

    let handle = builder
        .spawn(move || trampoline(me, parker, entry))
        .map_err(|e| ThreadError::spawn_with_source(kt.id.get(), "thread creation failed", e))?;

    let _ = kt.native.set(handle.thread().id());
    *kt.handle.lock() = Some(handle);
    Ok(kt)
}

fn trampoline<F>(me: Arc<KThread>, parker: Option<Parker>, entry: F)
where
    F: FnOnce(),
{
    let _ = me.native.set(thread::current().id());
    CURRENT_ID.with(|id| id.set(Some(me.id)));
    CURRENT.with(|slot| *slot.borrow_mut() = Some(Arc::clone(&me)));

    if let Some(parker) = parker {
        while !me.running.load(Ordering::Acquire) {
            parker.park();
        }
    }

    let outcome = catch_unwind(AssertUnwindSafe(entry));

    me.exited.store(true, Ordering::Release);
    // Break the KThread -> JoinHandle -> thread-local -> KThread cycle
    CURRENT.with(|slot| slot.borrow_mut().take());

    if let Err(payload) = outcome {
        if !is_thread_exit(payload.as_ref()) {
            resume_unwind(payload);
        }
    }
}

/// Create and start a kernel thread.
///
/// `stack_size` is rounded up to [`MIN_STACK_SIZE`]. The argument of the
/// kernel's `func(arg)` pair is whatever `entry` captures. Failure to create
/// the native thread is resource exhaustion and takes the fatal path.
pub fn thread_create<F>(stack_size: usize, entry: F, state: RunState, priority: Pri) -> Arc<KThread>
where
    F: FnOnce() + Send + 'static,
{
    thread_create_named(None, stack_size, entry, state, priority)
}

/// [`thread_create`] with a thread name
pub fn thread_create_named<F>(
    name: Option<&str>,
    stack_size: usize,
    entry: F,
    state: RunState,
    priority: Pri,
) -> Arc<KThread>
where
    F: FnOnce() + Send + 'static,
{
    match spawn(name.map(str::to_owned), stack_size, entry, state, priority) {
        Ok(kt) => kt,
        Err(e) => misuse("thread", name, format_args!("{}", e)),
    }
}

/// Handle of the calling thread, adopting it if it was not created here
pub fn curthread() -> Arc<KThread> {
    CURRENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        let kt = slot.get_or_insert_with(|| {
            let kt = Arc::new(KThread::adopt());
            CURRENT_ID.with(|id| id.set(Some(kt.id)));
            kt
        });
        Arc::clone(kt)
    })
}

/// Id of the calling thread; cheaper than [`curthread`]
pub fn curthread_id() -> KThreadId {
    match CURRENT_ID.with(Cell::get) {
        Some(id) => id,
        None => curthread().id(),
    }
}

/// Terminate the calling thread. Does not return.
///
/// Only valid on threads created by [`thread_create`]; the stack unwinds
/// (running destructors) back to the creation trampoline.
pub fn thread_exit() -> ! {
    let me = curthread();
    if me.is_adopted() {
        misuse(
            "thread",
            me.name(),
            format_args!("thread_exit from {} which was not created by thread_create", me.id),
        );
    }
    drop(me);
    resume_unwind(Box::new(ThreadExit))
}
