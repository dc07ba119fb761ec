//! Send gateway: validation, readiness gating and duplicate suppression in
//! front of the connection manager.
//!
//! ```text
//!  SendRequest
//!       │  validate + normalize recipient
//!       ▼
//!  ready? ── no ──▶ wait retry_delay, retry (≤ attempts) ──▶ ConnectionUnavailable
//!       │ yes
//!       ▼
//!  DedupCache::should_suppress ── yes ──▶ Ok { deduped: true }
//!       │ no
//!       ▼
//!  ConnectionManager::send ── NotConnected ──▶ release entry, retry
//!       │                 └─ SendFailed ────▶ release entry, error
//!       ▼
//!  Ok { deduped: false, message_id }
//! ```

mod address;
mod error;

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use address::{ADDRESS_SEPARATOR, Recipient};
pub use error::{SendError, ValidationError};

use crate::connection::{ConnectionError, ConnectionManager};
use crate::dedup::{DedupCache, Fingerprint};

/// Retry and addressing rules for outbound sends.
#[derive(Debug, Clone)]
pub struct SendPolicy {
    pub attempts: u32,
    pub retry_delay: Duration,
    pub default_domain: String,
}

/// An outbound text message as supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub recipient: String,
    pub body: String,
}

impl SendRequest {
    pub fn new(recipient: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            body: body.into(),
        }
    }

    /// Check required fields and normalize the recipient.
    pub fn validate(&self, default_domain: &str) -> Result<Recipient, ValidationError> {
        let number_present = !self.recipient.trim().is_empty();
        let message_present = !self.body.is_empty();
        if !number_present || !message_present {
            return Err(ValidationError::MissingFields {
                number_present,
                message_present,
            });
        }
        Recipient::parse(&self.recipient, default_domain)
    }
}

/// Result of a handled send.
///
/// A suppressed duplicate counts as handled: `delivered` is true and
/// `deduped` tells the caller nothing went out on the network.
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub to: String,
    pub delivered: bool,
    pub deduped: bool,
    pub message_id: Option<String>,
}

// ============================================================================
// Send Gateway
// ============================================================================

#[derive(Clone)]
pub struct SendGateway {
    connection: ConnectionManager,
    dedup: DedupCache,
    policy: SendPolicy,
}

impl SendGateway {
    pub fn new(connection: ConnectionManager, dedup: DedupCache, policy: SendPolicy) -> Self {
        Self {
            connection,
            dedup,
            policy,
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    /// Drop every duplicate record. Returns how many there were.
    pub fn clear_duplicates(&self) -> usize {
        let cleared = self.dedup.clear();
        info!(cleared, "Duplicate cache cleared");
        cleared
    }

    pub async fn send_with_policy(&self, request: SendRequest) -> Result<SendOutcome, SendError> {
        let recipient = request.validate(&self.policy.default_domain)?;
        let body = request.body;
        let attempts = self.policy.attempts.max(1);

        for attempt in 1..=attempts {
            if !self.connection.is_ready().await {
                debug!(attempt, attempts, "Session not ready");
                self.pause_before_retry(attempt, attempts).await;
                continue;
            }

            let fingerprint = Fingerprint::new(recipient.as_str(), &body);
            let recorded_at = Instant::now();
            if self.dedup.should_suppress_at(&fingerprint, recorded_at) {
                info!(to = %recipient, "Duplicate message suppressed");
                return Ok(SendOutcome {
                    to: recipient.to_string(),
                    delivered: true,
                    deduped: true,
                    message_id: None,
                });
            }

            match self.connection.send(recipient.as_str(), &body).await {
                Ok(message_id) => {
                    info!(to = %recipient, message_id = %message_id, "Message sent");
                    return Ok(SendOutcome {
                        to: recipient.to_string(),
                        delivered: true,
                        deduped: false,
                        message_id: Some(message_id),
                    });
                }
                Err(ConnectionError::NotConnected) => {
                    self.dedup.release(&fingerprint, recorded_at);
                    warn!(to = %recipient, attempt, attempts, "Session dropped during send");
                    self.pause_before_retry(attempt, attempts).await;
                }
                Err(ConnectionError::SendFailed(details)) => {
                    self.dedup.release(&fingerprint, recorded_at);
                    warn!(to = %recipient, error = %details, "Message send failed");
                    return Err(SendError::SendFailed(details));
                }
            }
        }

        warn!(to = %recipient, attempts, "Giving up, session unavailable");
        Err(SendError::ConnectionUnavailable { attempts })
    }

    async fn pause_before_retry(&self, attempt: u32, attempts: u32) {
        if attempt < attempts {
            tokio::time::sleep(self.policy.retry_delay).await;
        }
    }
}
