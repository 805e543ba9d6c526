//! Kernel-style console messages and the fatal path
//!
//! `cmn_err` maps the kernel severities onto the `log` facade. Misuse of a
//! primitive never returns: [`misuse`] logs the primitive and the violated
//! invariant, then panics. A panic (rather than an abort) lets test
//! harnesses observe the fatal path with `catch_unwind`; every check fires
//! before the offending operation touches any state.

use std::fmt;

/// Severity of a console message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeLevel {
    /// Continuation of the previous message
    Cont = 0,
    /// Notice
    Note = 1,
    /// Warning
    Warn = 2,
    /// Fatal: logs, then panics
    Panic = 3,
    /// Print nothing
    Ignore = 4,
}

/// Emit a console message at `level`. `CeLevel::Panic` does not return.
pub fn cmn_err(level: CeLevel, args: fmt::Arguments<'_>) {
    match level {
        CeLevel::Cont => log::info!(target: "cmn_err", "{}", args),
        CeLevel::Note => log::info!(target: "cmn_err", "NOTICE: {}", args),
        CeLevel::Warn => log::warn!(target: "cmn_err", "WARNING: {}", args),
        CeLevel::Panic => panic_with(args),
        CeLevel::Ignore => {}
    }
}

/// `cmn_err!(CeLevel::Warn, "spa {} degraded", name)`
#[macro_export]
macro_rules! cmn_err {
    ($level:expr, $($arg:tt)+) => {
        $crate::debug::cmn_err($level, format_args!($($arg)+))
    };
}

/// Log at error level and panic with the same message
pub fn panic_with(args: fmt::Arguments<'_>) -> ! {
    log::error!(target: "cmn_err", "PANIC: {}", args);
    panic!("{}", args);
}

/// Fatal programmer-misuse or resource-exhaustion condition.
///
/// `kind` names the primitive class (`"mutex"`, `"taskq"`, ...), `name` the
/// instance label given at init.
pub fn misuse(kind: &str, name: Option<&str>, invariant: fmt::Arguments<'_>) -> ! {
    let name = name.unwrap_or("<unnamed>");
    log::error!(target: "misuse", "{} '{}': {}", kind, name, invariant);
    panic!("{} '{}': {}", kind, name, invariant);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmn_err_non_fatal_levels_return() {
        cmn_err(CeLevel::Note, format_args!("pool {} imported", "tank"));
        cmn_err!(CeLevel::Warn, "vdev {} faulted", 3);
        cmn_err!(CeLevel::Ignore, "silent");
        cmn_err!(CeLevel::Cont, "...continued");
    }

    #[test]
    #[should_panic(expected = "assertion failed in zio")]
    fn test_cmn_err_panic_level_panics() {
        cmn_err!(CeLevel::Panic, "assertion failed in {}", "zio");
    }

    #[test]
    #[should_panic(expected = "mutex 'spa_namespace_lock': exit by non-owner")]
    fn test_misuse_message_names_instance_and_invariant() {
        misuse(
            "mutex",
            Some("spa_namespace_lock"),
            format_args!("exit by non-owner"),
        );
    }

    #[test]
    #[should_panic(expected = "rwlock '<unnamed>'")]
    fn test_misuse_unnamed_instance() {
        misuse("rwlock", None, format_args!("destroy while held"));
    }
}
