//! Error types for the relfile storage engine.
//!
//! All public APIs return `RelResult<T>` — no panics in library code.

use thiserror::Error;

/// Unified error type for all relfile operations.
#[derive(Debug, Error)]
pub enum RelError {
    /// Malformed SQL, unknown statement shape, bad literal.
    #[error("parse error: {0}")]
    Parse(String),

    /// Unknown table, unknown attribute, type mismatch, duplicate key, unsupported
    /// index operation, DELETE without WHERE.
    #[error("schema error: {0}")]
    Schema(String),

    /// Standard I/O error (file not found, read/write failure, rename failure).
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Corrupt or unreadable metadata file.
    #[error("corrupt metadata: {0}")]
    Corrupt(String),

    /// Record number addressed a slot outside the data file, or past the
    /// directory/bucket array bounds of an index file.
    #[error("record {0} out of bounds")]
    OutOfBounds(u32),

    /// Type mismatch between expected and actual value kinds.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// An internal invariant was violated. Should never happen in correctly
    /// functioning code; surfaced rather than panicking because this engine is
    /// embedded by callers that must not be brought down by it.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for all relfile operations.
pub type RelResult<T> = Result<T, RelError>;

impl From<serde_json::Error> for RelError {
    fn from(err: serde_json::Error) -> Self {
        RelError::Corrupt(err.to_string())
    }
}

impl From<csv::Error> for RelError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            match err.into_kind() {
                csv::ErrorKind::Io(source) => return RelError::Io { source },
                kind => return RelError::Parse(kind.to_string()),
            }
        }
        RelError::Parse(format!("CSV error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_schema() {
        let err = RelError::Schema("duplicate key 1".to_string());
        assert_eq!(err.to_string(), "schema error: duplicate key 1");
    }

    #[test]
    fn error_display_type_mismatch() {
        let err = RelError::TypeMismatch {
            expected: "INT".to_string(),
            actual: "VARCHAR[20]".to_string(),
        };
        assert_eq!(err.to_string(), "type mismatch: expected INT, got VARCHAR[20]");
    }

    #[test]
    fn error_display_out_of_bounds() {
        let err = RelError::OutOfBounds(42);
        assert_eq!(err.to_string(), "record 42 out of bounds");
    }

    #[test]
    fn rel_result_ok_and_err() {
        let ok: RelResult<i32> = Ok(1);
        assert_eq!(ok.unwrap(), 1);
        let err: RelResult<i32> = Err(RelError::Internal("x".into()));
        assert!(err.is_err());
    }
}
