//! Gooey Server - WebSocket sessions for live local pages
//!
//! This crate runs the server half of a Gooey app: a browser page connects
//! over WebSocket, and an [`App`] implementation talks to it through plain
//! channels.
//!
//! The server supports:
//! - Multiple concurrent sessions, each with its own app task
//! - JSON encoding of every outbound value
//! - Hot reload of body, CSS and JavaScript from a watched directory
//! - Automatic shutdown once the last tab closes and stays closed
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use gooey_server::{App, Outgoing, Server, ServerConfig};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl App for Hello {
//!     async fn start(
//!         &self,
//!         closed: CancellationToken,
//!         _incoming: mpsc::Receiver<Vec<u8>>,
//!         outgoing: Outgoing,
//!     ) {
//!         let _ = outgoing.send("hello").await;
//!         closed.cancelled().await;
//!     }
//! }
//!
//! # async fn run() -> Result<(), gooey_server::ServerError> {
//! let server = Server::bind(ServerConfig::default()).await?;
//! let reason = server.run(CancellationToken::new(), Arc::new(Hello)).await;
//! println!("stopped: {reason:?}");
//! # Ok(())
//! # }
//! ```

mod app;
mod coordinator;
mod error;
mod protocol;
mod pump;
mod server;

#[cfg(test)]
mod test_support;

pub use app::{App, OutboundMessage, Outgoing, SessionClosed};
pub use coordinator::{SessionCoordinator, ShutdownReason, SHUTDOWN_DEBOUNCE};
pub use error::{ErrorSink, RuntimeError, ServerError};
pub use protocol::{classify_close, shutdown_frame, CloseKind, ReloadEnvelope, RELOAD_MESSAGE};
pub use pump::{
    CloseNotifier, SessionOptions, SessionPump, Transport, CLOSE_HANDSHAKE_TIMEOUT,
};
pub use server::{Server, ServerConfig};
