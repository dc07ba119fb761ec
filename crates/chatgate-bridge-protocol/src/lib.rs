//! Bridge Protocol types for communication between Chatgate and a bridge process.
//!
//! A bridge is a small program that wraps a messaging library (handshake,
//! encryption, pairing, framing) and exposes one session to Chatgate.
//!
//! # Protocol Overview
//!
//! The protocol is bidirectional with JSON Lines (newline-delimited JSON) over stdio:
//!
//! - **Commands** (Chatgate → Bridge): connect, send text, close
//! - **Events** (Bridge → Chatgate): pairing challenges, connection state,
//!   credential updates, send acknowledgements
//!
//! # Example: Minimal Bridge
//!
//! ```ignore
//! use chatgate_bridge_protocol::{BridgeCommand, BridgeEvent};
//!
//! // Read commands from stdin
//! let line = read_line_from_stdin();
//! let command: BridgeCommand = serde_json::from_str(&line)?;
//!
//! // Send events to stdout
//! let event = BridgeEvent::ConnectionOpen;
//! println!("{}", serde_json::to_string(&event)?);
//! ```

use serde::{Deserialize, Serialize};

// ============================================================================
// Commands (Chatgate → Bridge)
// ============================================================================

/// Commands sent from Chatgate to a bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeCommand {
    /// Open the session, resuming from stored credentials when present.
    Connect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<serde_json::Value>,
    },

    /// Send a text message to a fully-qualified address.
    SendText {
        request_id: String,
        to: String,
        body: String,
    },

    /// Close the session and exit.
    Close,
}

// ============================================================================
// Events (Bridge → Chatgate)
// ============================================================================

/// Events sent from a bridge to Chatgate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// The library needs out-of-band pairing; `qr` is the payload to render.
    PairingChallenge { qr: String },

    /// Handshake completed, the session can send.
    ConnectionOpen,

    /// The session closed.
    ConnectionClosed { cause: DisconnectCause },

    /// The library rotated its credentials; they should be persisted.
    CredentialsUpdated { credentials: serde_json::Value },

    /// A `SendText` command was accepted by the network.
    SendOk {
        request_id: String,
        message_id: String,
    },

    /// A `SendText` command failed.
    SendError {
        request_id: String,
        #[serde(default)]
        code: String,
        message: String,
    },
}

// ============================================================================
// Disconnect Cause
// ============================================================================

/// Why a session closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectCause {
    /// Library status code, when one was reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Human-readable reason.
    #[serde(default)]
    pub reason: String,
}

impl DisconnectCause {
    pub fn new(status_code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            status_code,
            reason: reason.into(),
        }
    }

    /// A cause with no status code, used for local failures (spawn errors, EOF).
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::new(None, reason)
    }

    /// The account was logged out; reconnecting cannot succeed.
    pub fn logged_out() -> Self {
        Self::new(Some(status_codes::LOGGED_OUT), reasons::LOGGED_OUT)
    }

    /// Terminal causes must not trigger a reconnect.
    pub fn is_terminal(&self) -> bool {
        self.status_code == Some(status_codes::LOGGED_OUT) || self.reason == reasons::LOGGED_OUT
    }
}

impl std::fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (status {})", self.reason, code),
            None => write!(f, "{}", self.reason),
        }
    }
}

/// Well-known status codes carried in [`DisconnectCause`].
pub mod status_codes {
    pub const LOGGED_OUT: u16 = 401;
    pub const CONNECTION_LOST: u16 = 408;
    pub const RESTART_REQUIRED: u16 = 515;
}

/// Well-known reason strings carried in [`DisconnectCause`].
pub mod reasons {
    pub const LOGGED_OUT: &str = "logged_out";
}

/// Error codes carried in [`BridgeEvent::SendError`].
pub mod error_codes {
    /// The bridge has no open session.
    pub const NOT_CONNECTED: &str = "not_connected";
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_without_credentials_omits_field() {
        let json = serde_json::to_string(&BridgeCommand::Connect { credentials: None }).unwrap();
        assert_eq!(json, r#"{"type":"connect"}"#);
    }

    #[test]
    fn test_send_text_wire_format() {
        let cmd = BridgeCommand::SendText {
            request_id: "r1".to_string(),
            to: "254700000000@s.whatsapp.net".to_string(),
            body: "hi".to_string(),
        };
        let value: serde_json::Value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["type"], "send_text");
        assert_eq!(value["to"], "254700000000@s.whatsapp.net");
    }

    #[test]
    fn test_parse_connection_closed() {
        let line = r#"{"type":"connection_closed","cause":{"status_code":401,"reason":"logged_out"}}"#;
        let event: BridgeEvent = serde_json::from_str(line).unwrap();
        match event {
            BridgeEvent::ConnectionClosed { cause } => assert!(cause.is_terminal()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_send_error_without_code() {
        let line = r#"{"type":"send_error","request_id":"r1","message":"boom"}"#;
        let event: BridgeEvent = serde_json::from_str(line).unwrap();
        assert_eq!(
            event,
            BridgeEvent::SendError {
                request_id: "r1".to_string(),
                code: String::new(),
                message: "boom".to_string(),
            }
        );
    }

    #[test]
    fn test_terminal_classification() {
        assert!(DisconnectCause::logged_out().is_terminal());
        assert!(DisconnectCause::new(None, "logged_out").is_terminal());
        assert!(!DisconnectCause::new(Some(status_codes::CONNECTION_LOST), "timed out").is_terminal());
        assert!(!DisconnectCause::new(Some(status_codes::RESTART_REQUIRED), "restart").is_terminal());
        assert!(!DisconnectCause::transient("bridge exited").is_terminal());
    }

    #[test]
    fn test_cause_display() {
        assert_eq!(
            DisconnectCause::logged_out().to_string(),
            "logged_out (status 401)"
        );
        assert_eq!(DisconnectCause::transient("eof").to_string(), "eof");
    }
}
