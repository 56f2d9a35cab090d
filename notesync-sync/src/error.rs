use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Offline: no network connectivity")]
    Offline,

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Missing instance id")]
    MissingInstanceId,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Local store error: {0}")]
    Store(#[from] notesync_core::Error),
}

impl SyncError {
    /// Returns a stable error code for this error variant.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Offline => "OFFLINE",
            SyncError::Timeout(_) => "TIMEOUT",
            SyncError::Network(_) => "NETWORK_ERROR",
            SyncError::Server { .. } => "SERVER_ERROR",
            SyncError::InvalidResponse(_) => "INVALID_RESPONSE",
            SyncError::MissingInstanceId => "MISSING_INSTANCE_ID",
            SyncError::Config(_) => "CONFIG_ERROR",
            SyncError::Store(e) => e.code(),
        }
    }

    /// Returns true if a later attempt of the same pass may succeed.
    ///
    /// Server errors are retryable only for 5xx statuses.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Offline => true,
            SyncError::Timeout(_) => true,
            SyncError::Network(_) => true,
            SyncError::Server { status, .. } => *status >= 500,
            SyncError::Store(e) => e.is_retryable(),

            SyncError::InvalidResponse(_) => false,
            SyncError::MissingInstanceId => false,
            SyncError::Config(_) => false,
        }
    }

    /// Returns true if the local store is unusable and sync must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Store(e) if e.is_fatal())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_status_classification() {
        let unavailable = SyncError::Server {
            status: 503,
            message: "try later".to_string(),
        };
        assert!(unavailable.is_retryable());

        let bad_request = SyncError::Server {
            status: 400,
            message: "instanceId is required".to_string(),
        };
        assert!(!bad_request.is_retryable());
        assert_eq!(bad_request.code(), "SERVER_ERROR");
    }

    #[test]
    fn test_transient_errors() {
        assert!(SyncError::Offline.is_retryable());
        assert!(SyncError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(SyncError::Network("reset".to_string()).is_retryable());
        assert!(!SyncError::MissingInstanceId.is_retryable());
    }

    #[test]
    fn test_store_errors_keep_their_classification() {
        let busy: SyncError = notesync_core::Error::StorageBusy("locked".to_string()).into();
        assert!(busy.is_retryable());
        assert_eq!(busy.code(), "STORAGE_BUSY");

        let gone: SyncError = notesync_core::Error::StorageUnavailable("eacces".to_string()).into();
        assert!(gone.is_fatal());
        assert!(!gone.is_retryable());
    }
}
