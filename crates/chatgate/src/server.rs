use std::future::Future;
use std::time::{Duration, Instant};

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::connection::ConnectionManager;
use crate::handlers;
use crate::sender::SendGateway;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub connection: ConnectionManager,
    pub sender: SendGateway,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(sender: SendGateway) -> Self {
        Self {
            connection: sender.connection().clone(),
            sender,
            started_at: Instant::now(),
        }
    }
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn build_app(state: AppState, request_timeout_seconds: u64) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/send", post(handlers::send_message))
        .route("/status", get(handlers::status))
        .route("/clear-duplicates", delete(handlers::clear_duplicates))
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/version", get(handlers::version))
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_seconds),
        ))
}

/// Serve `app` until `signal` fires, then run `teardown` while the server
/// drains. In-flight requests do not delay `teardown`.
///
/// `teardown` also runs if the server stops on its own.
pub async fn serve_until<S, T>(
    listener: TcpListener,
    app: Router,
    signal: S,
    teardown: T,
) -> std::io::Result<()>
where
    S: Future<Output = ()>,
    T: Future<Output = ()>,
{
    let stop = CancellationToken::new();

    let server = async {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(stop.clone().cancelled_owned())
            .await;
        stop.cancel();
        result
    };

    let on_stop = async {
        tokio::select! {
            _ = signal => {
                info!("Stopping server, in-flight requests are not awaited");
                stop.cancel();
            }
            _ = stop.cancelled() => {}
        }
        teardown.await;
    };

    let (served, ()) = tokio::join!(server, on_stop);
    served
}
