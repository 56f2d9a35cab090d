use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Local storage busy: {0}")]
    StorageBusy(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid note: {0}")]
    InvalidNote(String),

    #[error("Invalid instance id: {0}")]
    InvalidInstanceId(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Note not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns a stable error code for this error variant.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "IO_ERROR",
            Error::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Error::StorageBusy(_) => "STORAGE_BUSY",
            Error::Corruption(_) => "CORRUPTION",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::InvalidNote(_) => "INVALID_NOTE",
            Error::InvalidInstanceId(_) => "INVALID_INSTANCE_ID",
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if this error is potentially retryable.
    ///
    /// Transient conditions (IO hiccups, a busy store) are retryable. Validation
    /// failures and damaged or missing storage are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::StorageBusy(_) => true,

            Error::StorageUnavailable(_) => false,
            Error::Corruption(_) => false,
            Error::Serialization(_) => false,
            Error::InvalidNote(_) => false,
            Error::InvalidInstanceId(_) => false,
            Error::InvalidArgument(_) => false,
            Error::NotFound(_) => false,
            Error::Internal(_) => false,
        }
    }

    /// Returns true if the local store cannot be used at all.
    ///
    /// Fatal errors disable sync until the underlying storage problem is fixed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_) | Error::Corruption(_))
    }

    /// Returns true if the error rejects a single record rather than the store.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidNote(_) | Error::InvalidInstanceId(_) | Error::InvalidArgument(_)
        )
    }

    /// Adds context to an error by wrapping it in an Internal error.
    pub fn with_context(self, context: &str) -> Error {
        Error::Internal(format!("{}: {}", context, self))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            Error::StorageUnavailable("gone".to_string()).code(),
            "STORAGE_UNAVAILABLE"
        );
        assert_eq!(Error::InvalidNote("no id".to_string()).code(), "INVALID_NOTE");
        assert_eq!(Error::NotFound("n1".to_string()).code(), "NOT_FOUND");
    }

    #[test]
    fn test_classification() {
        let busy = Error::StorageBusy("locked".to_string());
        assert!(busy.is_retryable());
        assert!(!busy.is_fatal());

        let unavailable = Error::StorageUnavailable("permission denied".to_string());
        assert!(!unavailable.is_retryable());
        assert!(unavailable.is_fatal());

        let invalid = Error::InvalidNote("missing id".to_string());
        assert!(invalid.is_validation());
        assert!(!invalid.is_retryable());
    }

    #[test]
    fn test_with_context() {
        let err = Error::NotFound("n1".to_string()).with_context("updating note");
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(err.to_string().contains("updating note"));
    }
}
