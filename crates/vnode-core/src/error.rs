//! Error types for the resource aggregate.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by quantity conversion and aggregate mutation.
///
/// Both variants are local to a single mutation attempt: the caller abandons
/// the mutation and the aggregate is left exactly as it was.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A quantity string could not be parsed, or an addition overflowed a
    /// dimension.
    #[error("invalid quantity {value:?}: {reason}")]
    InvalidQuantity {
        /// The offending quantity string (or dimension name on overflow).
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A subtraction would drive a dimension of the aggregate negative.
    #[error("insufficient {resource} capacity: have {have}, need {need}")]
    InsufficientCapacity {
        /// The dimension that would go negative.
        resource: &'static str,
        /// Current value of the dimension.
        have: u64,
        /// Amount the caller tried to subtract.
        need: u64,
    },
}

impl CoreError {
    pub(crate) fn invalid(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidQuantity {
            value: value.into(),
            reason: reason.into(),
        }
    }
}
