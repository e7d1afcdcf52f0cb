//! # Cache Error Types
//!
//! Errors surfaced by the download-and-cache subsystem.
//!
//! Asynchronous transfer failures are never returned from these APIs; they are
//! logged and published as cache events. Only synchronous problems (invalid
//! input, a transport that refuses to start, filesystem errors on explicit
//! operations) become a [`CacheError`].

use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The URL cannot be mapped to a cache file name.
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// The transport refused to start a transfer.
    #[error("Transport error: {0}")]
    Transport(#[from] BridgeError),

    /// Filesystem operation on the local store failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport event pump is already running.
    #[error("Event pump already started")]
    AlreadyStarted,

    /// The event pump needs a Tokio runtime to run on.
    #[error("No Tokio runtime available: {0}")]
    RuntimeUnavailable(String),

    /// Cache configuration failed validation.
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    /// Returns `true` if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CacheError::Transport(BridgeError::OperationFailed(_)) => true,
            CacheError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_transient_classification() {
        assert!(CacheError::Transport(BridgeError::OperationFailed("busy".into())).is_transient());
        assert!(!CacheError::Transport(BridgeError::ChannelClosed).is_transient());
        assert!(CacheError::Io(io::Error::from(io::ErrorKind::Interrupted)).is_transient());
        assert!(!CacheError::Io(io::Error::from(io::ErrorKind::PermissionDenied)).is_transient());
        assert!(!CacheError::InvalidResource("https://example.com/".into()).is_transient());
    }

    #[test]
    fn test_error_messages() {
        let err = CacheError::InvalidConfig("directory_name cannot be empty".into());
        assert_eq!(
            err.to_string(),
            "Invalid cache configuration: directory_name cannot be empty"
        );
    }
}
