//! Type tags ("magic numbers") carried by every primitive
//!
//! The tag word holds one of three legal values: 0 before init, the kind's
//! magic while live, all-ones after destroy. Anything else means the memory
//! was scribbled on.

use crate::debug::misuse;

/// Live tag of a [`KMutex`](super::KMutex)
pub const MTX_MAGIC: u64 = 0x9522_f513_62a6_e326;
/// Live tag of a [`KRwLock`](super::KRwLock)
pub const RW_MAGIC: u64 = 0x4d31_fb12_3648_e78a;
/// Live tag of a [`KCondvar`](super::KCondvar)
pub const CV_MAGIC: u64 = 0xd31e_a9a8_3b1b_30c4;

/// Tag word before init
pub const MAGIC_INIT: u64 = 0;
/// Tag word after destroy
pub const MAGIC_DEST: u64 = u64::MAX;

/// Decoded lifecycle state of a primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Never initialized
    Uninitialized,
    /// Initialized and usable
    Live,
    /// Destroyed; only `init` is allowed
    Destroyed,
    /// The tag word holds none of the legal values
    Corrupt(u64),
}

/// Tag word plus the diagnostic identity of one primitive. Lives inside the
/// primitive's native lock.
#[derive(Debug)]
pub(crate) struct Header {
    magic: u64,
    live_magic: u64,
    kind: &'static str,
    name: Option<String>,
}

impl Header {
    pub(crate) const fn new(kind: &'static str, live_magic: u64) -> Self {
        Self {
            magic: MAGIC_INIT,
            live_magic,
            kind,
            name: None,
        }
    }

    pub(crate) fn tag(&self) -> Tag {
        match self.magic {
            MAGIC_INIT => Tag::Uninitialized,
            MAGIC_DEST => Tag::Destroyed,
            m if m == self.live_magic => Tag::Live,
            m => Tag::Corrupt(m),
        }
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Fatal unless live
    pub(crate) fn verify_live(&self, op: &str) {
        match self.tag() {
            Tag::Live => {}
            Tag::Uninitialized => self.fatal(format_args!("{} on uninitialized {}", op, self.kind)),
            Tag::Destroyed => self.fatal(format_args!("{} on destroyed {}", op, self.kind)),
            Tag::Corrupt(m) => self.fatal(format_args!("{}: corrupt magic {:#018x}", op, m)),
        }
    }

    /// UNINITIALIZED/DESTROYED -> LIVE
    pub(crate) fn init(&mut self, name: Option<&str>) {
        match self.tag() {
            Tag::Uninitialized | Tag::Destroyed => {
                self.magic = self.live_magic;
                self.name = name.map(str::to_owned);
            }
            Tag::Live => {
                let name = name.or(self.name()).unwrap_or("<unnamed>");
                self.fatal(format_args!("double init (re-init as '{}')", name))
            }
            Tag::Corrupt(m) => self.fatal(format_args!("init over corrupt magic {:#018x}", m)),
        }
    }

    /// LIVE -> DESTROYED. The caller has already checked held/waiter state.
    pub(crate) fn destroy(&mut self) {
        self.magic = MAGIC_DEST;
    }

    pub(crate) fn fatal(&self, invariant: std::fmt::Arguments<'_>) -> ! {
        misuse(self.kind, self.name(), invariant)
    }

    #[cfg(test)]
    pub(crate) fn scribble(&mut self, value: u64) {
        self.magic = value;
    }
}
