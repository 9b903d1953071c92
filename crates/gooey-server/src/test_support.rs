//! Shared fixtures for session tests.

use crate::app::{App, Outgoing};
use async_trait::async_trait;
use gooey_reload::{ChangeEvent, ChangeSource, WatchError};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

pub(crate) type MemoryWs = WebSocketStream<DuplexStream>;

/// A connected (server, client) WebSocket pair over an in-memory pipe.
pub(crate) async fn ws_pair() -> (MemoryWs, MemoryWs) {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    tokio::join!(
        WebSocketStream::from_raw_socket(server_io, Role::Server, None),
        WebSocketStream::from_raw_socket(client_io, Role::Client, None),
    )
}

pub(crate) fn normal_close() -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    }
}

/// Sends an optional greeting, then echoes every inbound message back as a
/// string. Reports on its channel once `closed` fires.
pub(crate) struct EchoApp {
    greeting: Option<&'static str>,
    closed_tx: mpsc::UnboundedSender<()>,
}

impl EchoApp {
    pub(crate) fn new(greeting: Option<&'static str>) -> (Arc<Self>, mpsc::UnboundedReceiver<()>) {
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                greeting,
                closed_tx,
            }),
            closed_rx,
        )
    }
}

#[async_trait]
impl App for EchoApp {
    async fn start(
        &self,
        closed: CancellationToken,
        mut incoming: mpsc::Receiver<Vec<u8>>,
        outgoing: Outgoing,
    ) {
        if let Some(greeting) = self.greeting {
            let _ = outgoing.send(greeting).await;
        }
        loop {
            tokio::select! {
                _ = closed.cancelled() => break,
                Some(msg) = incoming.recv() => {
                    let _ = outgoing.send(String::from_utf8_lossy(&msg).into_owned()).await;
                }
            }
        }
        let _ = self.closed_tx.send(());
    }
}

/// Hands out one pre-built batch channel and remembers the watch scope.
pub(crate) struct FakeChangeSource {
    batches: Mutex<Option<mpsc::Receiver<Vec<ChangeEvent>>>>,
    scope: Mutex<Option<CancellationToken>>,
}

impl FakeChangeSource {
    pub(crate) fn new() -> (Arc<Self>, mpsc::Sender<Vec<ChangeEvent>>) {
        let (tx, rx) = mpsc::channel(4);
        let source = Arc::new(Self {
            batches: Mutex::new(Some(rx)),
            scope: Mutex::new(None),
        });
        (source, tx)
    }

    pub(crate) fn scope(&self) -> Option<CancellationToken> {
        self.scope.lock().unwrap().clone()
    }
}

impl ChangeSource for FakeChangeSource {
    fn watch(
        &self,
        done: CancellationToken,
        root: &Path,
        _recursive: bool,
        _poll_interval: Duration,
    ) -> Result<mpsc::Receiver<Vec<ChangeEvent>>, WatchError> {
        *self.scope.lock().unwrap() = Some(done);
        self.batches
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| WatchError::Root {
                path: root.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "already watched"),
            })
    }
}
