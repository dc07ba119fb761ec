//! Connection error types.

use thiserror::Error;

/// Errors returned by [`super::ConnectionManager::send`].
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// No ready session. Callers may retry.
    #[error("session is not connected")]
    NotConnected,

    /// The messaging library rejected the send.
    #[error("send failed: {0}")]
    SendFailed(String),
}
