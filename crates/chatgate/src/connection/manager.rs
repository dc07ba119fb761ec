//! Connection manager: owns the single session and drives reconnects.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use chatgate_bridge_protocol::DisconnectCause;

use super::error::ConnectionError;
use super::pairing::render_qr;
use super::state::{ConnectionEvent, ConnectionState, SessionState, Transition};
use crate::credentials::CredentialStore;
use crate::transport::{OpenedSession, SessionEvent, SessionLink, Transport};

/// How long shutdown waits for the supervisor task to wind down.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded, fixed-delay reconnect policy.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// Point-in-time view of the session for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub ready: bool,
    pub retry_count: u32,
    pub max_retries: u32,
    pub pairing_required: bool,
    pub last_disconnect: Option<String>,
    pub connected_since: Option<DateTime<Utc>>,
}

// ============================================================================
// Connection Manager
// ============================================================================

/// Owner of the single chat session.
///
/// Cheap to clone; all clones share the same session.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    policy: ReconnectPolicy,
    state: RwLock<SessionState>,
    link: Mutex<Option<Arc<dyn SessionLink>>>,
    started: AtomicBool,
    cancel: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                credentials,
                policy,
                state: RwLock::new(SessionState::new()),
                link: Mutex::new(None),
                started: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                supervisor: Mutex::new(None),
            }),
        }
    }

    /// Start the supervisor task. Subsequent calls are no-ops.
    pub async fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let manager = self.clone();
        let handle = tokio::spawn(async move {
            manager.supervise().await;
        });
        *self.inner.supervisor.lock().await = Some(handle);
    }

    pub async fn is_ready(&self) -> bool {
        self.inner.state.read().await.is_ready()
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.state.read().await.state
    }

    pub async fn status(&self) -> ConnectionStatus {
        let state = self.inner.state.read().await;
        ConnectionStatus {
            state: state.state,
            ready: state.is_ready(),
            retry_count: state.retry_count,
            max_retries: self.inner.policy.max_retries,
            pairing_required: state.pairing_code.is_some(),
            last_disconnect: state.last_disconnect.as_ref().map(|c| c.to_string()),
            connected_since: state.connected_since,
        }
    }

    /// Send a text message through the live session.
    pub async fn send(&self, to: &str, body: &str) -> Result<String, ConnectionError> {
        if !self.is_ready().await {
            return Err(ConnectionError::NotConnected);
        }

        let link = self
            .inner
            .link
            .lock()
            .await
            .clone()
            .ok_or(ConnectionError::NotConnected)?;

        link.send_text(to, body).await.map_err(|e| {
            if e.is_disconnect() {
                ConnectionError::NotConnected
            } else {
                ConnectionError::SendFailed(e.to_string())
            }
        })
    }

    /// Stop reconnecting and close the live session.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        if let Some(handle) = self.inner.supervisor.lock().await.take()
            && tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err()
        {
            warn!("Connection supervisor did not stop in time");
        }

        if let Some(link) = self.inner.link.lock().await.take() {
            link.close().await;
        }

        self.inner.state.write().await.mark_disconnected();
        info!("Connection closed");
    }

    // ========================================================================
    // Supervisor
    // ========================================================================

    async fn supervise(&self) {
        let policy = self.inner.policy;

        loop {
            if self.inner.cancel.is_cancelled() {
                break;
            }
            if !self.inner.state.write().await.begin_connect() {
                break;
            }

            let credentials = match self.inner.credentials.load().await {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "Failed to load credentials, connecting without them");
                    None
                }
            };
            info!(
                has_credentials = credentials.is_some(),
                "Opening chat session"
            );

            let cause = match self.inner.transport.open(credentials).await {
                Ok(session) => match self.run_session(session).await {
                    Some(cause) => cause,
                    None => break,
                },
                Err(e) => {
                    warn!(error = %e, "Failed to open chat session");
                    DisconnectCause::transient(e.to_string())
                }
            };

            let transition = self
                .inner
                .state
                .write()
                .await
                .apply(ConnectionEvent::Closed(cause.clone()), policy.max_retries);

            match transition {
                Transition::Reconnect { attempt } => {
                    warn!(
                        cause = %cause,
                        attempt,
                        max_retries = policy.max_retries,
                        delay_ms = policy.retry_delay.as_millis() as u64,
                        "Chat session closed, reconnecting"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(policy.retry_delay) => {}
                        _ = self.inner.cancel.cancelled() => break,
                    }
                }
                Transition::LoggedOut => {
                    error!(cause = %cause, "Chat session logged out, pair again and restart");
                    break;
                }
                Transition::Exhausted => {
                    error!(
                        cause = %cause,
                        max_retries = policy.max_retries,
                        "Reconnection exhausted, session will stay unavailable"
                    );
                    break;
                }
                Transition::Stay => {}
            }
        }

        debug!("Connection supervisor stopped");
    }

    /// Pump events for one session. Returns `None` when cancelled.
    async fn run_session(&self, session: OpenedSession) -> Option<DisconnectCause> {
        let OpenedSession { link, mut events } = session;
        *self.inner.link.lock().await = Some(link);

        let cause = loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = self.inner.cancel.cancelled() => break None,
            };

            match event {
                Some(SessionEvent::PairingChallenge(code)) => {
                    self.on_pairing_challenge(code).await;
                }
                Some(SessionEvent::Open) => {
                    self.apply(ConnectionEvent::Open).await;
                    info!("Chat session connected");
                }
                Some(SessionEvent::CredentialsUpdated(credentials)) => {
                    match self.inner.credentials.save(&credentials).await {
                        Ok(()) => debug!("Credentials saved"),
                        Err(e) => warn!(error = %e, "Failed to save credentials"),
                    }
                }
                Some(SessionEvent::Closed(cause)) => break Some(cause),
                None => break Some(DisconnectCause::transient("session event stream ended")),
            }
        };

        if let Some(link) = self.inner.link.lock().await.take() {
            link.close().await;
        }
        cause
    }

    async fn on_pairing_challenge(&self, code: String) {
        match render_qr(&code) {
            Some(rendered) => {
                info!("Pairing required, scan the QR code below with the phone app");
                println!("{rendered}");
            }
            None => warn!(payload = %code, "Pairing required, QR payload could not be rendered"),
        }
        self.apply(ConnectionEvent::PairingChallenge(code)).await;
    }

    async fn apply(&self, event: ConnectionEvent) {
        let max_retries = self.inner.policy.max_retries;
        self.inner.state.write().await.apply(event, max_retries);
    }
}

// ============================================================================
// Tests
// ============================================================================
