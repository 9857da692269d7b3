//! Fatal diagnostics - the single "report and terminate" primitive
//!
//! Allocation failure and broken internal invariants are not recoverable for
//! the front-ends this crate serves. Every such path funnels through here:
//! the message is logged at ERROR with the caller's file and line, then the
//! thread panics. Release builds use `panic = "abort"`, so a fatal error ends
//! the process.

use core::fmt;
use std::panic::Location;

use crate::allocator::{AllocError, Layout};

/// Log `args` with the caller's location and terminate.
#[cold]
#[inline(never)]
#[track_caller]
pub fn fail(args: fmt::Arguments<'_>) -> ! {
    let location = Location::caller();
    tracing::error!(
        event = "fatal",
        file = location.file(),
        line = location.line(),
        message = %args,
        "Fatal error"
    );
    panic!("[FATAL] ({}:{}) {}", location.file(), location.line(), args)
}

/// Sink for the "or abort" allocation adapters.
#[cold]
#[inline(never)]
#[track_caller]
pub fn alloc_failure(operation: &str, layout: Layout, error: AllocError) -> ! {
    crate::logging::log_alloc_failure(operation, layout.size(), layout.align(), &error);
    fail(format_args!("{operation} failed for {layout}: {error}"))
}

/// Format a message and terminate.
///
/// Usage:
/// ```ignore
/// fatal!("slot {} already occupied", index);
/// ```
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)+) => {
        $crate::fatal::fail(::core::format_args!($($arg)+))
    };
}

/// Terminate through [`fatal!`] unless `cond` holds.
///
/// Unlike `debug_assert!` this check stays on in release builds.
#[macro_export]
macro_rules! fatal_assert {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::fatal!($($arg)+);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "[FATAL]")]
    fn fatal_macro_panics_with_tag() {
        fatal!("broken invariant {}", 42);
    }

    #[test]
    #[should_panic(expected = "fatal.rs:")]
    fn fatal_reports_caller_location() {
        fatal!("location check");
    }

    #[test]
    fn fatal_assert_passes_when_true() {
        fatal_assert!(1 + 1 == 2, "arithmetic is broken");
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn fatal_assert_fails_when_false() {
        let capacity = 0;
        fatal_assert!(capacity != 0, "capacity must be non-zero");
    }

    #[test]
    #[should_panic(expected = "allocate failed")]
    fn alloc_failure_names_operation() {
        let layout = Layout::from_size_align(64, 8).unwrap();
        alloc_failure("allocate", layout, AllocError::OutOfMemory { size: 64, align: 8 });
    }
}
