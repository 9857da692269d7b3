//! Allocation errors returned by the fallible primitives

use thiserror::Error;

/// Why an allocation request could not be served.
///
/// Only the fallible primitives return this; the `*_or_abort` adapters turn
/// it into a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The backing allocator could not supply memory
    #[error("out of memory ({size} bytes, align {align})")]
    OutOfMemory { size: usize, align: usize },

    /// An arena allocation limit would be exceeded
    #[error("allocation limit exceeded ({requested} bytes requested, {remaining} remaining)")]
    LimitExceeded { requested: usize, remaining: usize },

    /// Alignment was zero or not a power of two
    #[error("invalid alignment {align}: must be a power of two")]
    InvalidAlignment { align: usize },

    /// A size or alignment computation overflowed `usize`
    #[error("arithmetic overflow computing allocation size")]
    ArithmeticOverflow,
}

impl AllocError {
    /// True for failures caused by memory exhaustion, including an arena
    /// running into its configured limit.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. } | Self::LimitExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_exceeded_counts_as_out_of_memory() {
        assert!(AllocError::OutOfMemory { size: 8, align: 8 }.is_out_of_memory());
        assert!(AllocError::LimitExceeded { requested: 64, remaining: 0 }.is_out_of_memory());
        assert!(!AllocError::InvalidAlignment { align: 3 }.is_out_of_memory());
        assert!(!AllocError::ArithmeticOverflow.is_out_of_memory());
    }

    #[test]
    fn messages_carry_context() {
        let err = AllocError::InvalidAlignment { align: 12 };
        assert_eq!(err.to_string(), "invalid alignment 12: must be a power of two");

        let err = AllocError::LimitExceeded { requested: 4096, remaining: 100 };
        assert!(err.to_string().contains("4096"));
        assert!(err.to_string().contains("100"));
    }
}
