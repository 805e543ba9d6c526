//! Thread-specific data keyed by process-wide keys
//!
//! A key is created once and used from any thread; each thread sees its own
//! value. Destructors run for a thread's non-empty slots when that thread
//! exits, provided the key is still live.

use crate::debug::misuse;
use parking_lot::Mutex;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Value stored under a key
pub type TsdValue = Arc<dyn Any + Send + Sync>;

/// Destructor run on thread exit for a non-empty slot
pub type TsdDestructor = fn(TsdValue);

struct KeySlot {
    live: bool,
    destructor: Option<TsdDestructor>,
}

static KEYS: Mutex<Vec<KeySlot>> = Mutex::new(Vec::new());

/// Per-thread slots; runs destructors when the thread's locals are torn down
struct ThreadSlots(HashMap<usize, TsdValue>);

impl Drop for ThreadSlots {
    fn drop(&mut self) {
        for (key, value) in self.0.drain() {
            let destructor = {
                let keys = KEYS.lock();
                keys.get(key).filter(|slot| slot.live).and_then(|slot| slot.destructor)
            };
            if let Some(destructor) = destructor {
                destructor(value);
            }
        }
    }
}

thread_local! {
    static SLOTS: RefCell<ThreadSlots> = RefCell::new(ThreadSlots(HashMap::new()));
}

/// A thread-specific data key
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TsdKey(usize);

fn check_live(key: &TsdKey, op: &str) {
    let keys = KEYS.lock();
    if !keys.get(key.0).is_some_and(|slot| slot.live) {
        drop(keys);
        misuse("tsd", None, format_args!("{} on destroyed key {}", op, key.0));
    }
}

/// Create a key, optionally with a destructor for values left at thread exit
pub fn tsd_create(destructor: Option<TsdDestructor>) -> TsdKey {
    let mut keys = KEYS.lock();
    keys.push(KeySlot {
        live: true,
        destructor,
    });
    TsdKey(keys.len() - 1)
}

/// Destroy a key. Values other threads still hold are dropped without the
/// destructor when those threads exit.
pub fn tsd_destroy(key: TsdKey) {
    check_live(&key, "tsd_destroy");
    KEYS.lock()[key.0] = KeySlot {
        live: false,
        destructor: None,
    };
    let _ = SLOTS.try_with(|slots| slots.borrow_mut().0.remove(&key.0));
}

/// Set (or clear, with `None`) the calling thread's value for `key`
pub fn tsd_set(key: &TsdKey, value: Option<TsdValue>) {
    check_live(key, "tsd_set");
    SLOTS.with(|slots| {
        let mut slots = slots.borrow_mut();
        match value {
            Some(value) => slots.0.insert(key.0, value),
            None => slots.0.remove(&key.0),
        };
    });
}

/// The calling thread's value for `key`, if set and of type `T`
pub fn tsd_get<T: Any + Send + Sync>(key: &TsdKey) -> Option<Arc<T>> {
    let value = SLOTS.with(|slots| slots.borrow().0.get(&key.0).cloned())?;
    value.downcast::<T>().ok()
}
