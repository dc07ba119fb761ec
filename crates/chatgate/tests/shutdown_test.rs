//! Integration tests for server shutdown ordering.

use std::cell::Cell;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

use chatgate::connection::ConnectionState;
use chatgate::dedup::Fingerprint;
use chatgate::server;

mod common;

use common::Harness;

async fn post_send(addr: std::net::SocketAddr) -> String {
    let body = r#"{"number":"254700000000","message":"hi"}"#;
    let request = format!(
        "POST /send HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_teardown_does_not_wait_for_in_flight_sends() {
    // The send below keeps retrying for about two seconds.
    let harness = Harness::start(Duration::from_secs(30), 40, Duration::from_millis(50)).await;
    harness
        .dedup
        .should_suppress(&Fingerprint::new("254711111111@s.whatsapp.net", "earlier"));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client = tokio::spawn(post_send(addr));

    let signalled = Cell::new(None);
    let torn_down = Cell::new(None);

    let signal = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        signalled.set(Some(Instant::now()));
    };
    let teardown = async {
        torn_down.set(Some(Instant::now()));
        harness.dedup.clear();
        harness.connection.shutdown().await;
    };

    server::serve_until(listener, harness.app(), signal, teardown)
        .await
        .unwrap();
    let finished = Instant::now();

    let signalled = signalled.get().expect("signal never fired");
    let torn_down = torn_down.get().expect("teardown never ran");
    assert!(torn_down - signalled < Duration::from_millis(200));
    assert!(finished - torn_down >= Duration::from_millis(500));

    assert!(harness.dedup.is_empty());
    assert_eq!(harness.connection.state().await, ConnectionState::Disconnected);

    let response = client.await.unwrap();
    assert!(response.starts_with("HTTP/1.1 503"), "{response}");
}

#[tokio::test]
async fn test_teardown_runs_when_idle() {
    let harness = Harness::default_start().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let torn_down = Cell::new(false);
    let teardown = async {
        harness.connection.shutdown().await;
        torn_down.set(true);
    };

    tokio::time::timeout(
        Duration::from_secs(2),
        server::serve_until(listener, harness.app(), async {}, teardown),
    )
    .await
    .expect("server did not stop")
    .unwrap();

    assert!(torn_down.get());
}
