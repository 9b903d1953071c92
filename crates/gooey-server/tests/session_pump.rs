//! Driving a single session pump from outside the crate.

use async_trait::async_trait;
use futures_util::StreamExt;
use gooey_server::{App, CloseNotifier, Outgoing, SessionOptions, SessionPump};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

const LIMIT: Duration = Duration::from_secs(10);

struct Hello;

#[async_trait]
impl App for Hello {
    async fn start(
        &self,
        closed: CancellationToken,
        _incoming: mpsc::Receiver<Vec<u8>>,
        outgoing: Outgoing,
    ) {
        let _ = outgoing.send("hello").await;
        closed.cancelled().await;
    }
}

#[tokio::test]
async fn test_pump_reports_its_own_close() {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    let (server, mut client) = tokio::join!(
        WebSocketStream::from_raw_socket(server_io, Role::Server, None),
        WebSocketStream::from_raw_socket(client_io, Role::Client, None),
    );

    let pump = SessionPump::new(Arc::new(Hello), Arc::new(SessionOptions::default()));
    let id = pump.id();
    let (close_tx, mut close_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(pump.run(
        server,
        CancellationToken::new(),
        CloseNotifier::new(id, close_tx),
    ));

    match timeout(LIMIT, client.next()).await.expect("timed out") {
        Some(Ok(Message::Text(text))) => assert_eq!(text, "\"hello\""),
        other => panic!("expected text frame, got {other:?}"),
    }

    client
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        }))
        .await
        .unwrap();
    timeout(LIMIT, handle).await.expect("pump kept running").unwrap();

    assert_eq!(close_rx.recv().await, Some(id));
    assert!(close_rx.recv().await.is_none());
}
