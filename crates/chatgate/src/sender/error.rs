//! Send gateway error types.

use thiserror::Error;

/// Rejected send requests. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Recipient or body missing. The flags report which fields were present.
    #[error("recipient and message are required")]
    MissingFields {
        number_present: bool,
        message_present: bool,
    },

    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The session stayed unavailable for every attempt.
    #[error("connection unavailable after {attempts} attempts")]
    ConnectionUnavailable { attempts: u32 },

    /// The messaging library rejected the send.
    #[error("send failed: {0}")]
    SendFailed(String),
}
