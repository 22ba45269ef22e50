//! VM error types

use crate::value::Value;
use thiserror::Error;

/// Errors raised by object model operations.
///
/// Handler and accessor failures travel as [`VmError::Exception`] and are
/// never caught or rewrapped by the core; they unwind through whatever
/// resolution was in progress.
#[derive(Debug, Error)]
pub enum VmError {
    /// Type error (non-callable `instanceof` operand, bad trap result, ...)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Range error (prototype chain exceeded the traversal bound)
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Re-entrant calls exceeded the configured depth
    #[error("RangeError: Maximum call stack size exceeded")]
    StackOverflow,

    /// Value thrown by user code (trap, accessor or native function)
    #[error("Uncaught exception: {0}")]
    Exception(Box<ThrownValue>),
}

/// A thrown JavaScript value
#[derive(Debug)]
pub struct ThrownValue {
    /// The thrown value
    pub value: Value,
    /// The thrown value (as a string representation)
    pub message: String,
}

impl std::fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl VmError {
    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a range error
    pub fn range_error(msg: impl Into<String>) -> Self {
        Self::RangeError(msg.into())
    }

    /// Create an exception from a thrown JS value
    pub fn exception(value: Value) -> Self {
        let message = match value.as_string() {
            Some(s) => s.to_string(),
            None => format!("{}", value),
        };
        Self::Exception(Box::new(ThrownValue { message, value }))
    }

    /// The thrown value, if this error came from user code.
    pub fn thrown_value(&self) -> Option<&Value> {
        match self {
            Self::Exception(thrown) => Some(&thrown.value),
            _ => None,
        }
    }

    /// True for the `TypeError` class.
    pub fn is_type_error(&self) -> bool {
        matches!(self, Self::TypeError(_))
    }

    /// True for the `RangeError` class, including call stack exhaustion.
    pub fn is_range_error(&self) -> bool {
        matches!(self, Self::RangeError(_) | Self::StackOverflow)
    }
}

/// Result type for VM operations
pub type VmResult<T> = std::result::Result<T, VmError>;
