//! Connection state machine.
//!
//! Pure bookkeeping: the manager feeds typed events in and acts on the
//! returned [`Transition`]. No I/O happens here.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use chatgate_bridge_protocol::DisconnectCause;

/// Lifecycle of the single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    /// The account was logged out. Needs re-pairing and a restart.
    LoggedOut,
    /// Reconnect attempts ran out.
    Exhausted,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::LoggedOut => "logged_out",
            Self::Exhausted => "exhausted",
        }
    }

    /// Terminal states are never left for the rest of the process lifetime.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LoggedOut | Self::Exhausted)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed input to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    PairingChallenge(String),
    Open,
    Closed(DisconnectCause),
}

/// What the manager should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Reconnect { attempt: u32 },
    LoggedOut,
    Exhausted,
}

/// Session bookkeeping owned by the connection manager.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub state: ConnectionState,
    pub retry_count: u32,
    pub pairing_code: Option<String>,
    pub last_disconnect: Option<DisconnectCause>,
    pub connected_since: Option<DateTime<Utc>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retry_count: 0,
            pairing_code: None,
            last_disconnect: None,
            connected_since: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Mark a connect attempt as in progress. Returns false in a terminal state.
    pub fn begin_connect(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = ConnectionState::Connecting;
        true
    }

    /// Force the session down without counting a retry (used on shutdown).
    pub fn mark_disconnected(&mut self) {
        if !self.state.is_terminal() {
            self.state = ConnectionState::Disconnected;
        }
        self.connected_since = None;
    }

    pub fn apply(&mut self, event: ConnectionEvent, max_retries: u32) -> Transition {
        if self.state.is_terminal() {
            return Transition::Stay;
        }

        match event {
            ConnectionEvent::PairingChallenge(code) => {
                self.pairing_code = Some(code);
                self.state = ConnectionState::Connecting;
                self.connected_since = None;
                Transition::Stay
            }
            ConnectionEvent::Open => {
                self.state = ConnectionState::Ready;
                self.retry_count = 0;
                self.pairing_code = None;
                self.connected_since = Some(Utc::now());
                Transition::Stay
            }
            ConnectionEvent::Closed(cause) => {
                self.connected_since = None;
                self.pairing_code = None;
                let terminal = cause.is_terminal();
                self.last_disconnect = Some(cause);

                if terminal {
                    self.state = ConnectionState::LoggedOut;
                    Transition::LoggedOut
                } else if self.retry_count < max_retries {
                    self.retry_count += 1;
                    self.state = ConnectionState::Disconnected;
                    Transition::Reconnect {
                        attempt: self.retry_count,
                    }
                } else {
                    self.state = ConnectionState::Exhausted;
                    Transition::Exhausted
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lost() -> ConnectionEvent {
        ConnectionEvent::Closed(DisconnectCause::transient("connection lost"))
    }

    #[test]
    fn test_open_sets_ready_and_resets_retries() {
        let mut s = SessionState::new();
        assert!(s.begin_connect());
        assert_eq!(s.apply(lost(), 3), Transition::Reconnect { attempt: 1 });
        assert_eq!(s.retry_count, 1);

        assert_eq!(s.apply(ConnectionEvent::Open, 3), Transition::Stay);
        assert!(s.is_ready());
        assert_eq!(s.retry_count, 0);
        assert!(s.connected_since.is_some());
    }

    #[test]
    fn test_pairing_challenge_marks_unready() {
        let mut s = SessionState::new();
        s.apply(ConnectionEvent::Open, 3);
        s.apply(ConnectionEvent::PairingChallenge("2@xyz".to_string()), 3);

        assert!(!s.is_ready());
        assert_eq!(s.state, ConnectionState::Connecting);
        assert_eq!(s.pairing_code.as_deref(), Some("2@xyz"));

        s.apply(ConnectionEvent::Open, 3);
        assert!(s.pairing_code.is_none());
    }

    #[test]
    fn test_retries_are_bounded() {
        let mut s = SessionState::new();
        for attempt in 1..=3 {
            assert_eq!(s.apply(lost(), 3), Transition::Reconnect { attempt });
        }
        assert_eq!(s.apply(lost(), 3), Transition::Exhausted);
        assert_eq!(s.state, ConnectionState::Exhausted);

        // Terminal: nothing moves it any more
        assert_eq!(s.apply(ConnectionEvent::Open, 3), Transition::Stay);
        assert!(!s.is_ready());
        assert!(!s.begin_connect());
    }

    #[test]
    fn test_zero_retries_exhausts_immediately() {
        let mut s = SessionState::new();
        assert_eq!(s.apply(lost(), 0), Transition::Exhausted);
    }

    #[test]
    fn test_logout_is_terminal() {
        let mut s = SessionState::new();
        s.apply(ConnectionEvent::Open, 3);

        let t = s.apply(ConnectionEvent::Closed(DisconnectCause::logged_out()), 3);
        assert_eq!(t, Transition::LoggedOut);
        assert_eq!(s.state, ConnectionState::LoggedOut);
        assert_eq!(s.retry_count, 0);
        assert!(s.last_disconnect.as_ref().is_some_and(|c| c.is_terminal()));
    }

    #[test]
    fn test_mark_disconnected_keeps_terminal_state() {
        let mut s = SessionState::new();
        s.apply(ConnectionEvent::Open, 3);
        s.mark_disconnected();
        assert_eq!(s.state, ConnectionState::Disconnected);

        s.apply(lost(), 0);
        s.mark_disconnected();
        assert_eq!(s.state, ConnectionState::Exhausted);
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&ConnectionState::LoggedOut).unwrap();
        assert_eq!(json, r#""logged_out""#);
        assert_eq!(ConnectionState::Ready.to_string(), "ready");
    }
}
