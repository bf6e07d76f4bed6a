//! Error types for Quarry.

use thiserror::Error;

/// The error type shared by every Quarry operation.
#[derive(Error, Debug)]
pub enum QuarryError {
    /// A document or field value was malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Disk or permission failure while reading or writing the index.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A predicate, query string or sort order could not be used.
    #[error("Query error: {0}")]
    Query(String),

    /// A requested item (result position, document, file) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Index data is corrupt or inconsistent.
    #[error("Index error: {0}")]
    Index(String),

    /// Storage backend failure that is not a plain I/O error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The service or writer has been closed.
    #[error("Index is closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for Quarry operations.
pub type Result<T> = std::result::Result<T, QuarryError>;

impl QuarryError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        QuarryError::Validation(msg.into())
    }

    pub fn query<S: Into<String>>(msg: S) -> Self {
        QuarryError::Query(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        QuarryError::NotFound(msg.into())
    }

    pub fn index<S: Into<String>>(msg: S) -> Self {
        QuarryError::Index(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        QuarryError::Storage(msg.into())
    }

    /// Whether the failure is transient and the operation may be retried.
    pub fn is_retriable(&self) -> bool {
        match self {
            QuarryError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuarryError::not_found("result 3 of 2");
        assert_eq!(err.to_string(), "Not found: result 3 of 2");

        let err = QuarryError::validation("empty identifier");
        assert_eq!(err.to_string(), "Validation error: empty identifier");
    }

    #[test]
    fn test_retriable_errors() {
        let transient = QuarryError::Io(std::io::Error::from(std::io::ErrorKind::Interrupted));
        assert!(transient.is_retriable());

        let permanent =
            QuarryError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(!permanent.is_retriable());
        assert!(!QuarryError::query("bad").is_retriable());
    }
}
