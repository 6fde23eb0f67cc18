//! Fatal errors.
//!
//! A fatal error means the heap can no longer be trusted. The context is
//! logged and the thread panics; embedders that must not unwind build with
//! `panic = "abort"`.

use std::fmt;

use itertools::Itertools;

use crate::runtime::Runtime;
use crate::value::Value;

/// Report a fatal error with the runtime context of `$rt`.
macro_rules! gc_fatal {
    ($rt:expr, $($arg:tt)+) => {
        $rt.fatal(format_args!($($arg)+))
    };
}

impl Runtime {
    /// Log `msg` with the frame backtrace and the loaded modules, then panic.
    #[cold]
    pub fn fatal(&self, msg: impl fmt::Display) -> ! {
        let frames = self.backtrace().iter().join(" <- ");
        let modules = self.module_names().iter().join(", ");
        tracing::error!(
            frames = %frames,
            modules = %modules,
            minor = self.stats.minor_collections,
            major = self.stats.major_collections,
            "fatal: {}",
            msg
        );
        log_native_backtrace();
        panic!("meltgc fatal error: {}", msg)
    }
}

/// A value whose header does not decode.
#[cold]
pub(crate) fn corrupted(v: Value, raw: u16) -> ! {
    tracing::error!(addr = v.addr(), magic = raw, "bad magic");
    log_native_backtrace();
    panic!("meltgc fatal error: bad magic {} at {:#x}", raw, v.addr())
}

#[cold]
pub(crate) fn missing_discr(v: Value) -> ! {
    tracing::error!(value = ?v, "value without discriminant");
    log_native_backtrace();
    panic!("meltgc fatal error: {:?} has no discriminant", v)
}

/// A heap request too large for any allocator.
#[cold]
pub(crate) fn oversized(size: usize) -> ! {
    tracing::error!(size, "allocation size overflows");
    log_native_backtrace();
    panic!("meltgc fatal error: cannot allocate {} bytes", size)
}

#[cfg(feature = "backtrace")]
fn log_native_backtrace() {
    let bt = backtrace::Backtrace::new();
    tracing::error!("native backtrace:\n{:?}", bt);
}

#[cfg(not(feature = "backtrace"))]
fn log_native_backtrace() {}
