use gooey_reload::{ReloadError, WatchError};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tracing::{error, warn};

/// Errors that prevent the server from starting.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read listener address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// Errors hit while the server is running. None of these are fatal: the
/// operation that failed is skipped and its loop carries on.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Failed to encode JSON message: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Failed to write message: {0}")]
    Write(#[source] tungstenite::Error),
    #[error("Failed to read message: {0}")]
    Read(#[source] tungstenite::Error),
    #[error("Client closed connection with unexpected code {0}")]
    UnexpectedClose(String),
    #[error("Failed to send close message: {0}")]
    CloseHandshake(String),
    #[error("Failed to upgrade connection: {0}")]
    Handshake(#[source] tungstenite::Error),
    #[error("Could not watch web files: {0}")]
    Watch(#[from] WatchError),
    #[error(transparent)]
    Reload(#[from] ReloadError),
}

/// Logs runtime errors and forwards them to an optional external channel.
#[derive(Debug, Clone, Default)]
pub struct ErrorSink {
    tx: Option<mpsc::UnboundedSender<RuntimeError>>,
}

impl ErrorSink {
    pub fn new(tx: Option<mpsc::UnboundedSender<RuntimeError>>) -> Self {
        Self { tx }
    }

    pub fn report(&self, err: RuntimeError) {
        match &err {
            RuntimeError::Reload(_) | RuntimeError::UnexpectedClose(_) => warn!("{}", err),
            _ => error!("{}", err),
        }
        self.forward(err);
    }

    /// Forwards an error that was already logged elsewhere.
    pub(crate) fn forward(&self, err: RuntimeError) {
        if let Some(tx) = &self.tx {
            // Nobody listening is fine.
            let _ = tx.send(err);
        }
    }
}
