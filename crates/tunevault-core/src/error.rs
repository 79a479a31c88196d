//! Error types for Tunevault core operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Tunevault core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A Fingerprint or Track failed construction-time validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A local file is missing or unreadable.
    #[error("Cannot access file {path}: {message}")]
    FileAccess {
        /// Path that could not be accessed.
        path: PathBuf,
        /// Underlying error message.
        message: String,
    },

    /// Content retrieval failed after exhausting the retry budget.
    #[error("Retrieval of '{item_id}' failed after {attempts} attempt(s): {message}")]
    Retrieval {
        /// External item identifier that was being fetched.
        item_id: String,
        /// Number of attempts made.
        attempts: u32,
        /// Last underlying error message.
        message: String,
    },

    /// The fingerprint analyzer produced an unusable signature.
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// A durable write or rename failed; the in-memory mutation was rolled back.
    #[error("Persistence failed at {path}: {message}")]
    Persistence {
        /// Path of the file that could not be committed.
        path: PathBuf,
        /// Underlying error message.
        message: String,
    },

    /// Repository record not found.
    #[error("Track not found: {0}")]
    NotFound(String),

    /// Repository record already exists.
    #[error("Track already exists: {0}")]
    AlreadyExists(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a [`Error::FileAccess`] from a path and an io error.
    pub fn file_access(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::FileAccess {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Build a [`Error::Persistence`] from a path and an io error.
    pub fn persistence(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = Error::NotFound("yt:abc123".to_string());
        assert_eq!(err.to_string(), "Track not found: yt:abc123");
    }

    #[test]
    fn test_already_exists_display() {
        let err = Error::AlreadyExists("yt:abc123".to_string());
        assert_eq!(err.to_string(), "Track already exists: yt:abc123");
    }

    #[test]
    fn test_retrieval_display_includes_attempts() {
        let err = Error::Retrieval {
            item_id: "yt:abc".to_string(),
            attempts: 3,
            message: "connection reset".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("yt:abc"));
        assert!(text.contains('3'));
        assert!(text.contains("connection reset"));
    }

    #[test]
    fn test_file_access_display() {
        let err = Error::FileAccess {
            path: PathBuf::from("/test/path"),
            message: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("/test/path"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
