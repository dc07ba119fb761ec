//! Common test utilities.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::sync::mpsc;

use chatgate::connection::{ConnectionManager, ReconnectPolicy};
use chatgate::credentials::{CredentialResult, CredentialStore, Credentials};
use chatgate::dedup::DedupCache;
use chatgate::sender::{SendGateway, SendPolicy};
use chatgate::server::{self, AppState};
use chatgate::transport::{OpenedSession, SessionEvent, SessionLink, Transport, TransportError};

pub const DEFAULT_DOMAIN: &str = "s.whatsapp.net";

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
pub struct MemoryCredentialStore {
    stored: StdMutex<Option<Credentials>>,
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> CredentialResult<Option<Credentials>> {
        Ok(self.stored.lock().unwrap().clone())
    }

    async fn save(&self, credentials: &Credentials) -> CredentialResult<()> {
        *self.stored.lock().unwrap() = Some(credentials.clone());
        Ok(())
    }
}

/// Failure to inject into the next `send_text` call.
pub enum LinkFailure {
    Rejected(String),
    Disconnected,
}

/// Session link that records sends and replays queued failures.
#[derive(Default)]
pub struct ScriptedLink {
    sent: StdMutex<Vec<(String, String)>>,
    failures: StdMutex<VecDeque<LinkFailure>>,
}

impl ScriptedLink {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_next(&self, failure: LinkFailure) {
        self.failures.lock().unwrap().push_back(failure);
    }
}

#[async_trait]
impl SessionLink for ScriptedLink {
    async fn send_text(&self, to: &str, body: &str) -> Result<String, TransportError> {
        if let Some(failure) = self.failures.lock().unwrap().pop_front() {
            return Err(match failure {
                LinkFailure::Rejected(reason) => TransportError::Rejected(reason),
                LinkFailure::Disconnected => TransportError::NotConnected,
            });
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((to.to_string(), body.to_string()));
        Ok(format!("MSG{}", sent.len()))
    }

    async fn close(&self) {}
}

/// Transport whose sessions stay pending until the test emits events.
pub struct ScriptedTransport {
    opens: AtomicU32,
    event_tx: StdMutex<Option<mpsc::Sender<SessionEvent>>>,
    pub link: Arc<ScriptedLink>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            opens: AtomicU32::new(0),
            event_tx: StdMutex::new(None),
            link: Arc::new(ScriptedLink::default()),
        })
    }

    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    pub async fn emit(&self, event: SessionEvent) {
        let tx = self.event_tx.lock().unwrap().clone().expect("no open session");
        tx.send(event).await.unwrap();
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, _credentials: Option<Credentials>) -> Result<OpenedSession, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(16);
        *self.event_tx.lock().unwrap() = Some(tx);
        Ok(OpenedSession {
            link: self.link.clone(),
            events: rx,
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Fully wired gateway backed by a scripted transport.
pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub connection: ConnectionManager,
    pub dedup: DedupCache,
    pub sender: SendGateway,
    pub state: AppState,
}

impl Harness {
    /// Build and start a gateway. The session is opened but not yet ready.
    pub async fn start(window: Duration, attempts: u32, retry_delay: Duration) -> Self {
        let transport = ScriptedTransport::new();
        let connection = ConnectionManager::new(
            transport.clone(),
            Arc::new(MemoryCredentialStore::default()),
            ReconnectPolicy {
                max_retries: 3,
                retry_delay: Duration::from_millis(10),
            },
        );
        let dedup = DedupCache::new(window);
        let sender = SendGateway::new(
            connection.clone(),
            dedup.clone(),
            SendPolicy {
                attempts,
                retry_delay,
                default_domain: DEFAULT_DOMAIN.to_string(),
            },
        );
        let state = AppState::new(sender.clone());

        connection.start().await;
        let opened = transport.clone();
        wait_until(move || {
            let opened = opened.clone();
            async move { opened.opens() >= 1 }
        })
        .await;

        Self {
            transport,
            connection,
            dedup,
            sender,
            state,
        }
    }

    /// Gateway with a 30s dedup window and fast send retries.
    pub async fn default_start() -> Self {
        Self::start(Duration::from_secs(30), 3, Duration::from_millis(20)).await
    }

    pub fn app(&self) -> Router {
        server::build_app(self.state.clone(), 30)
    }

    /// Complete the handshake and wait until the session reports ready.
    pub async fn make_ready(&self) {
        self.transport.emit(SessionEvent::Open).await;
        let connection = self.connection.clone();
        wait_until(move || {
            let connection = connection.clone();
            async move { connection.is_ready().await }
        })
        .await;
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.transport.link.sent()
    }
}

/// Poll `check` until it returns true, panicking after two seconds.
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
