//! TCP listener and WebSocket upgrade.
//!
//! Accepts connections, performs the handshake, and hands each upgraded
//! stream to the session coordinator.

use crate::app::App;
use crate::coordinator::{SessionCoordinator, ShutdownReason};
use crate::error::{ErrorSink, RuntimeError, ServerError};
use crate::pump::SessionOptions;
use gooey_reload::{ChangeSource, NotifyWatcher, ReloadConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const PENDING_SESSIONS: usize = 16;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to. Port 0 picks a free port.
    pub addr: SocketAddr,
    /// Hot reload settings; `None` disables reload.
    pub reload: Option<ReloadConfig>,
    /// Stop once the last session closes and none reopens.
    pub auto_shutdown: bool,
    /// Receives every non-fatal runtime error, in addition to the log.
    pub errors: Option<mpsc::UnboundedSender<RuntimeError>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            reload: None,
            auto_shutdown: true,
            errors: None,
        }
    }
}

/// The gooey WebSocket server.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    change_source: Arc<dyn ChangeSource>,
}

impl Server {
    /// Binds the listener. Nothing is accepted until [`Server::run`].
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.addr,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        Ok(Self {
            listener,
            local_addr,
            config,
            change_source: Arc::new(NotifyWatcher),
        })
    }

    /// Replaces the filesystem watcher used for hot reload.
    pub fn with_change_source(mut self, source: Arc<dyn ChangeSource>) -> Self {
        self.change_source = source;
        self
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves `app` until the coordinator decides to stop.
    pub async fn run<A: App>(self, done: CancellationToken, app: Arc<A>) -> ShutdownReason {
        let errors = ErrorSink::new(self.config.errors.clone());
        let options = SessionOptions {
            reload: self.config.reload.clone(),
            change_source: self.change_source.clone(),
            errors: errors.clone(),
        };

        info!("Gooey server listening on ws://{}", self.local_addr);
        if let Some(reload) = &options.reload {
            info!("Watching {} for changes", reload.watch_dir.display());
        }

        let (session_tx, session_rx) = mpsc::channel(PENDING_SESSIONS);
        let coordinator =
            SessionCoordinator::new(app, options).auto_shutdown(self.config.auto_shutdown);

        let accept = tokio::spawn(accept_loop(self.listener, session_tx, done.clone(), errors));
        let reason = coordinator.run(done, session_rx).await;
        accept.abort();
        reason
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Accept loop
// ─────────────────────────────────────────────────────────────────────────────

async fn accept_loop(
    listener: TcpListener,
    sessions: mpsc::Sender<WebSocketStream<TcpStream>>,
    done: CancellationToken,
    errors: ErrorSink,
) {
    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            _ = sessions.closed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!("New connection from {}", addr);
                    tokio::spawn(upgrade(stream, addr, sessions.clone(), errors.clone()));
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            },
        }
    }
}

async fn upgrade(
    stream: TcpStream,
    addr: SocketAddr,
    sessions: mpsc::Sender<WebSocketStream<TcpStream>>,
    errors: ErrorSink,
) {
    match accept_async(stream).await {
        Ok(ws) => {
            debug!("WebSocket handshake complete with {}", addr);
            if sessions.send(ws).await.is_err() {
                debug!("Server stopped before {} could join", addr);
            }
        }
        Err(e) => errors.report(RuntimeError::Handshake(e)),
    }
}
