//! End-to-end tests over a real TCP listener.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use gooey_server::{App, Outgoing, Server, ServerConfig, ShutdownReason, RELOAD_MESSAGE};
use gooey_reload::{ReloadConfig, EMPTY_BODY};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const LIMIT: Duration = Duration::from_secs(10);

struct Greeter;

#[async_trait]
impl App for Greeter {
    async fn start(
        &self,
        closed: CancellationToken,
        mut incoming: mpsc::Receiver<Vec<u8>>,
        outgoing: Outgoing,
    ) {
        let _ = outgoing.send("hello").await;
        loop {
            tokio::select! {
                _ = closed.cancelled() => break,
                Some(msg) = incoming.recv() => {
                    let _ = outgoing.send(msg.len()).await;
                }
            }
        }
    }
}

async fn next_text<S>(client: &mut S) -> String
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match timeout(LIMIT, client.next()).await.expect("timed out") {
            Some(Ok(Message::Text(text))) => return text,
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_last_tab_closing_stops_server() {
    let server = Server::bind(ServerConfig::default()).await.unwrap();
    let url = format!("ws://{}", server.local_addr());
    let handle = tokio::spawn(server.run(CancellationToken::new(), Arc::new(Greeter)));

    let (mut client, _) = connect_async(url).await.unwrap();
    assert_eq!(next_text(&mut client).await, "\"hello\"");

    client.send(Message::Text("four".into())).await.unwrap();
    assert_eq!(next_text(&mut client).await, "4");

    client
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        }))
        .await
        .unwrap();
    while let Some(Ok(_)) = client.next().await {}

    let reason = timeout(LIMIT, handle).await.expect("server kept running").unwrap();
    assert_eq!(reason, ShutdownReason::Idle);
}

#[tokio::test]
async fn test_done_closes_open_sessions() {
    let server = Server::bind(ServerConfig::default()).await.unwrap();
    let url = format!("ws://{}", server.local_addr());
    let done = CancellationToken::new();
    let handle = tokio::spawn(server.run(done.clone(), Arc::new(Greeter)));

    let (mut client, _) = connect_async(url).await.unwrap();
    assert_eq!(next_text(&mut client).await, "\"hello\"");

    done.cancel();
    let reason = timeout(LIMIT, handle).await.expect("server kept running").unwrap();
    assert_eq!(reason, ShutdownReason::Terminated);

    match timeout(LIMIT, client.next()).await.expect("no close frame") {
        Some(Ok(Message::Close(Some(frame)))) => assert_eq!(frame.code, CloseCode::Normal),
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_body_change_is_pushed_to_page() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        reload: Some(ReloadConfig {
            poll_interval: Duration::from_millis(50),
            ..ReloadConfig::new(dir.path())
        }),
        ..ServerConfig::default()
    };
    let server = Server::bind(config).await.unwrap();
    let url = format!("ws://{}", server.local_addr());
    let done = CancellationToken::new();
    let handle = tokio::spawn(server.run(done.clone(), Arc::new(Greeter)));

    let (mut client, _) = connect_async(url).await.unwrap();
    assert_eq!(next_text(&mut client).await, "\"hello\"");

    // Give the watcher a moment to register before writing.
    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::write(dir.path().join("body.html"), "<p>hi</p>").unwrap();

    // The create may be seen before the write lands, so wait for the
    // update carrying the final content.
    loop {
        let json: serde_json::Value = serde_json::from_str(&next_text(&mut client).await).unwrap();
        assert_eq!(json["GooeyMessage"], RELOAD_MESSAGE);
        assert_ne!(json["GooeyContent"]["Body"], EMPTY_BODY);
        if json["GooeyContent"]["Body"] == "<p>hi</p>" {
            break;
        }
    }

    done.cancel();
    timeout(LIMIT, handle).await.expect("server kept running").unwrap();
}
