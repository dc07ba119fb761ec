//! Bridge process transport.
//!
//! Spawns the configured bridge command for every session and speaks the
//! bridge protocol with it over stdio. Sends are correlated with their
//! acknowledgements by a ULID request id.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, warn};

use chatgate_bridge_protocol::{BridgeCommand, BridgeEvent, DisconnectCause, error_codes};

use super::{OpenedSession, SessionEvent, SessionLink, Transport, TransportError};
use crate::config::BridgeConfig;
use crate::credentials::Credentials;

/// Grace period for the bridge to exit after a `Close` command.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Buffer size for the session event channel.
const EVENT_BUFFER: usize = 64;

type PendingSends = DashMap<String, oneshot::Sender<Result<String, TransportError>>>;

// ============================================================================
// Transport
// ============================================================================

/// Transport that runs the messaging library as a child process.
pub struct SubprocessTransport {
    config: BridgeConfig,
    send_timeout: Duration,
}

impl SubprocessTransport {
    pub fn new(config: BridgeConfig, send_timeout: Duration) -> Self {
        Self {
            config,
            send_timeout,
        }
    }

    fn spawn_child(&self) -> std::io::Result<Child> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        // On Linux, set PR_SET_PDEATHSIG to ensure child dies when parent dies
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        cmd.spawn()
    }
}

#[async_trait]
impl Transport for SubprocessTransport {
    async fn open(&self, credentials: Option<Credentials>) -> Result<OpenedSession, TransportError> {
        let mut child = self.spawn_child().map_err(TransportError::Spawn)?;
        debug!(command = %self.config.command, pid = ?child.id(), "Bridge process spawned");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Io(std::io::Error::other("bridge stdin not piped")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Io(std::io::Error::other("bridge stdout not piped")))?;

        let link = Arc::new(SubprocessLink {
            stdin: Mutex::new(stdin),
            child: Mutex::new(Some(child)),
            pending: Arc::new(DashMap::new()),
            closed: Arc::new(AtomicBool::new(false)),
            send_timeout: self.send_timeout,
        });

        let (evt_tx, evt_rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(read_events(
            stdout,
            evt_tx,
            link.pending.clone(),
            link.closed.clone(),
        ));

        link.write(&BridgeCommand::Connect { credentials }).await?;

        Ok(OpenedSession {
            link,
            events: evt_rx,
        })
    }
}

// ============================================================================
// Session Link
// ============================================================================

struct SubprocessLink {
    stdin: Mutex<ChildStdin>,
    child: Mutex<Option<Child>>,
    pending: Arc<PendingSends>,
    closed: Arc<AtomicBool>,
    send_timeout: Duration,
}

impl SubprocessLink {
    /// Track a send awaiting acknowledgement.
    ///
    /// `closed` is checked after the insert: the reader sets it before
    /// draining `pending`, so an entry is either drained or rejected here.
    fn register(
        &self,
        request_id: &str,
    ) -> Result<oneshot::Receiver<Result<String, TransportError>>, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.to_string(), tx);
        if self.closed.load(Ordering::SeqCst) {
            self.pending.remove(request_id);
            return Err(TransportError::Closed);
        }
        Ok(rx)
    }

    async fn write(&self, command: &BridgeCommand) -> Result<(), TransportError> {
        let json = serde_json::to_string(command)
            .map_err(|e| TransportError::Io(std::io::Error::other(e)))?;
        let line = format!("{}\n", json);

        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(TransportError::Io)?;
        stdin.flush().await.map_err(TransportError::Io)
    }
}

#[async_trait]
impl SessionLink for SubprocessLink {
    async fn send_text(&self, to: &str, body: &str) -> Result<String, TransportError> {
        let request_id = ulid::Ulid::new().to_string();
        let rx = self.register(&request_id)?;

        let command = BridgeCommand::SendText {
            request_id: request_id.clone(),
            to: to.to_string(),
            body: body.to_string(),
        };
        if let Err(e) = self.write(&command).await {
            self.pending.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.send_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.pending.remove(&request_id);
                Err(TransportError::Timeout)
            }
        }
    }

    async fn close(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };

        if !self.closed.load(Ordering::SeqCst)
            && let Err(e) = self.write(&BridgeCommand::Close).await
        {
            debug!(error = %e, "Failed to send close command to bridge");
        }

        match tokio::time::timeout(CLOSE_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "Bridge process exited"),
            Ok(Err(e)) => warn!(error = %e, "Failed to wait for bridge process"),
            Err(_) => {
                warn!("Bridge did not exit in time, killing");
                let _ = child.kill().await;
            }
        }
    }
}

// ============================================================================
// Event Reader
// ============================================================================

async fn read_events(
    stdout: ChildStdout,
    evt_tx: mpsc::Sender<SessionEvent>,
    pending: Arc<PendingSends>,
    closed: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(stdout).lines();
    let mut close_cause = None;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Bridge stdout closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Error reading bridge stdout");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let event = match serde_json::from_str::<BridgeEvent>(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = %line, error = %e, "Failed to parse bridge event");
                continue;
            }
        };

        let session_event = match event {
            BridgeEvent::PairingChallenge { qr } => SessionEvent::PairingChallenge(qr),
            BridgeEvent::ConnectionOpen => SessionEvent::Open,
            BridgeEvent::CredentialsUpdated { credentials } => {
                SessionEvent::CredentialsUpdated(credentials)
            }
            BridgeEvent::ConnectionClosed { cause } => {
                close_cause = Some(cause);
                break;
            }
            BridgeEvent::SendOk {
                request_id,
                message_id,
            } => {
                resolve(&pending, &request_id, Ok(message_id));
                continue;
            }
            BridgeEvent::SendError {
                request_id,
                code,
                message,
            } => {
                let err = if code == error_codes::NOT_CONNECTED {
                    TransportError::NotConnected
                } else {
                    TransportError::Rejected(message)
                };
                resolve(&pending, &request_id, Err(err));
                continue;
            }
        };

        if evt_tx.send(session_event).await.is_err() {
            debug!("Session event receiver dropped");
            break;
        }
    }

    closed.store(true, Ordering::SeqCst);

    let keys: Vec<String> = pending.iter().map(|e| e.key().clone()).collect();
    for key in keys {
        resolve(&pending, &key, Err(TransportError::Closed));
    }

    let cause = close_cause.unwrap_or_else(|| DisconnectCause::transient("bridge exited"));
    let _ = evt_tx.send(SessionEvent::Closed(cause)).await;
}

fn resolve(pending: &PendingSends, request_id: &str, result: Result<String, TransportError>) {
    match pending.remove(request_id) {
        Some((_, tx)) => {
            let _ = tx.send(result);
        }
        None => debug!(request_id = %request_id, "Acknowledgement for unknown send"),
    }
}

// ============================================================================
// Tests
// ============================================================================
