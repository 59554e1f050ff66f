//! Error types for named-cells-core

use std::fmt;

use thiserror::Error;

use crate::named_range::Shape;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by a backend (file, archive or process failure)
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while resolving, reading or writing named ranges
#[derive(Debug, Error)]
pub enum Error {
    /// The name is not in the workbook's name table
    #[error("Name not found: {0}")]
    NameNotFound(String),

    /// The name exists, but only with sheet scope
    #[error("Name '{name}' is scoped to sheet '{sheet}'; only workbook-scoped names are supported")]
    AmbiguousScope { name: String, sheet: String },

    /// The value's shape does not match the range's shape
    #[error("Shape mismatch for '{name}': range is {expected}, value is {actual}")]
    ShapeMismatch {
        name: String,
        expected: ShapeDims,
        actual: ShapeDims,
    },

    /// Header labels of a table are not unique
    #[error("Duplicate header '{label}' in table '{name}'")]
    HeaderConflict { name: String, label: String },

    /// A scalar or vector range was used as a table
    #[error("Range '{name}' is a {shape}, not a table")]
    NotTabular { name: String, shape: Shape },

    /// The name does not evaluate to a single rectangular cell span
    #[error("Name '{name}' refers to '{refers_to}': {reason}")]
    UnsupportedReference {
        name: String,
        refers_to: String,
        reason: String,
    },

    /// Invalid cell address or range text
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Failure inside the backend (IO, archive, external process)
    #[error("Backend error: {0}")]
    Backend(#[source] BackendError),
}

impl Error {
    /// Wrap any backend failure
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<BackendError>,
    {
        Error::Backend(err.into())
    }

    /// The fieldless kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NameNotFound(_) => ErrorKind::NameNotFound,
            Error::AmbiguousScope { .. } => ErrorKind::AmbiguousScope,
            Error::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            Error::HeaderConflict { .. } => ErrorKind::HeaderConflict,
            Error::NotTabular { .. } => ErrorKind::NotTabular,
            Error::UnsupportedReference { .. } | Error::InvalidAddress(_) => {
                ErrorKind::UnsupportedReference
            }
            Error::Backend(_) => ErrorKind::BackendIo,
        }
    }
}

/// Error classification, one variant per error family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NameNotFound,
    AmbiguousScope,
    ShapeMismatch,
    HeaderConflict,
    NotTabular,
    UnsupportedReference,
    BackendIo,
}

impl ErrorKind {
    /// Stable identifier used in diagnostics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NameNotFound => "NameNotFoundError",
            ErrorKind::AmbiguousScope => "AmbiguousScopeError",
            ErrorKind::ShapeMismatch => "ShapeMismatchError",
            ErrorKind::HeaderConflict => "HeaderConflictError",
            ErrorKind::NotTabular => "NotTabularError",
            ErrorKind::UnsupportedReference => "UnsupportedReferenceError",
            ErrorKind::BackendIo => "BackendIOError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dimensions reported by [`Error::ShapeMismatch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeDims {
    Scalar,
    Vector(usize),
    Table { rows: usize, cols: usize },
    /// Rows of different lengths
    Ragged,
}

impl fmt::Display for ShapeDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeDims::Scalar => write!(f, "a scalar"),
            ShapeDims::Vector(len) => write!(f, "a vector of {len}"),
            ShapeDims::Table { rows, cols } => write!(f, "a {rows}x{cols} table"),
            ShapeDims::Ragged => write!(f, "a ragged table"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            Error::NameNotFound("x".into()).kind(),
            ErrorKind::NameNotFound
        );
        assert_eq!(
            Error::InvalidAddress("A0".into()).kind(),
            ErrorKind::UnsupportedReference
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(Error::backend(io).kind(), ErrorKind::BackendIo);
    }

    #[test]
    fn test_shape_mismatch_message() {
        let err = Error::ShapeMismatch {
            name: "t.rates".into(),
            expected: ShapeDims::Table { rows: 2, cols: 2 },
            actual: ShapeDims::Vector(4),
        };
        assert_eq!(
            err.to_string(),
            "Shape mismatch for 't.rates': range is a 2x2 table, value is a vector of 4"
        );
    }
}
