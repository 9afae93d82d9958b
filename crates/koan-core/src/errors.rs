//! The error taxonomy.
//!
//! Language-level errors are values: Error nodes carrying one of the
//! closed [`ErrorKind`]s. Operators that detect a problem return one
//! instead of a regular value, and almost every builtin short-circuits
//! on an error operand, so an error propagates outward until a top
//! level prints it. Host-side failures (file mapping, path search) use
//! [`LoadError`] and are converted to error values at the builtin
//! boundary.

use thiserror::Error;

/// The closed set of runtime error kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorKind {
    /// Operator applied to ill-typed arguments.
    InvalidOperand = 0,
    /// Assignment target is absent or marked no-assign.
    InvalidReferent,
    /// Name lookup missed in all enclosing scopes.
    InvalidIdentifier,
    /// Operator index has no binding, or a non-operator binding.
    InvalidOperator,
    /// An external call reported failure.
    FailedOperation,
    /// Allocation failure propagated.
    OutOfMemory,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::InvalidOperand,
        ErrorKind::InvalidReferent,
        ErrorKind::InvalidIdentifier,
        ErrorKind::InvalidOperator,
        ErrorKind::FailedOperation,
        ErrorKind::OutOfMemory,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::InvalidOperand => "InvalidOperand",
            ErrorKind::InvalidReferent => "InvalidReferent",
            ErrorKind::InvalidIdentifier => "InvalidIdentifier",
            ErrorKind::InvalidOperator => "InvalidOperator",
            ErrorKind::FailedOperation => "FailedOperation",
            ErrorKind::OutOfMemory => "OutOfMemory",
        }
    }
}

/// Host-side failures while resolving or mapping source files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot map {path}: {source}")]
    Map {
        path: String,
        source: std::io::Error,
    },
    #[error("{path}: not found on any import path")]
    NotFound { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_match_kinds() {
        for kind in ErrorKind::ALL {
            assert!(!kind.name().is_empty());
        }
        assert_eq!(ErrorKind::InvalidIdentifier.name(), "InvalidIdentifier");
    }
}
