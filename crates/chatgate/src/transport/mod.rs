//! Capability interface to the messaging library.
//!
//! The protocol itself (handshake, encryption, pairing, framing) is never
//! implemented here. A [`Transport`] opens one session at a time and hands
//! back a [`SessionLink`] for sending plus a stream of [`SessionEvent`]s.
//!
//! ```text
//!  ConnectionManager
//!       │  Transport::open(credentials)
//!       ▼
//!  OpenedSession ──── link: send_text / close ──────▶ library
//!       ▲
//!       └──────────── events: PairingChallenge | Open | Closed | CredentialsUpdated
//! ```

mod subprocess;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub use chatgate_bridge_protocol::DisconnectCause;
pub use subprocess::SubprocessTransport;

use crate::credentials::Credentials;

// ============================================================================
// Events
// ============================================================================

/// Notifications emitted by an open session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session needs out-of-band pairing.
    PairingChallenge(String),
    /// Handshake completed.
    Open,
    /// The session ended; no further events follow.
    Closed(DisconnectCause),
    /// New credentials to persist.
    CredentialsUpdated(Credentials),
}

// ============================================================================
// Capability Traits
// ============================================================================

/// Opens sessions against the messaging network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new session, resuming from `credentials` when present.
    async fn open(&self, credentials: Option<Credentials>) -> Result<OpenedSession, TransportError>;
}

/// Handle to one open session.
#[async_trait]
pub trait SessionLink: Send + Sync {
    /// Send a text message. Returns the network's message identifier.
    async fn send_text(&self, to: &str, body: &str) -> Result<String, TransportError>;

    /// Close the session. Idempotent.
    async fn close(&self);
}

/// A freshly opened session.
pub struct OpenedSession {
    pub link: Arc<dyn SessionLink>,
    pub events: mpsc::Receiver<SessionEvent>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to start bridge: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("bridge I/O failed: {0}")]
    Io(#[source] std::io::Error),

    #[error("session is not connected")]
    NotConnected,

    #[error("send rejected: {0}")]
    Rejected(String),

    #[error("timed out waiting for the bridge")]
    Timeout,

    #[error("session closed")]
    Closed,
}

impl TransportError {
    /// Errors that mean "no usable session right now" rather than a rejected send.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Closed)
    }
}
