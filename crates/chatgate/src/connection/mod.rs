//! Lifecycle of the single chat session.
//!
//! # State Machine
//!
//! ```text
//!               start()
//!  Disconnected ───────▶ Connecting ──── Open ────▶ Ready
//!       ▲                    │  ▲                     │
//!       │ retry_delay        │  └─ PairingChallenge ──┤
//!       │ (retry_count <     │                        │
//!       │  max_retries)      ▼                        ▼
//!       └──────────────── Closed(cause) ◀─────────────┘
//!                            │
//!                            ├─ terminal cause ─────▶ LoggedOut
//!                            └─ retries used up ────▶ Exhausted
//! ```
//!
//! Reconnects are serialized: a new session is only opened after the previous
//! one reported closed. Failing to open a session counts as a close.

mod error;
mod manager;
mod pairing;
mod state;

pub use error::ConnectionError;
pub use manager::{ConnectionManager, ConnectionStatus, ReconnectPolicy};
pub use pairing::render_qr;
pub use state::{ConnectionEvent, ConnectionState, SessionState, Transition};
