//! The application seam.
//!
//! An `App` is whatever business logic sits behind the page. It never sees
//! the transport: it gets a close signal, a stream of inbound messages and a
//! way to send values back, and runs until the close signal fires.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Per-session application logic.
///
/// `start` is called once for every connecting client, each call on its own
/// task, so anything specific to one connection belongs in the `start`
/// future; state shared by every connection belongs in the `App` itself.
///
/// Inbound bytes are passed on exactly as the client sent them. Values given
/// to `outgoing` are encoded as JSON and sent as text frames. `closed` fires
/// when the session ends for any reason; `start` should return soon after.
#[async_trait]
pub trait App: Send + Sync + 'static {
    async fn start(
        &self,
        closed: CancellationToken,
        incoming: mpsc::Receiver<Vec<u8>>,
        outgoing: Outgoing,
    );
}

/// A value that can be written to the client.
///
/// Implemented for everything `Serialize`; encoding happens in the session,
/// so a value that fails to encode is dropped there and logged.
pub trait OutboundMessage: Send {
    fn to_json(&self) -> serde_json::Result<String>;
}

impl<T: Serialize + Send> OutboundMessage for T {
    fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// The session has ended and no longer accepts messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session closed")]
pub struct SessionClosed;

/// Sending half of a session's outbound queue.
#[derive(Clone)]
pub struct Outgoing {
    tx: mpsc::Sender<Box<dyn OutboundMessage>>,
}

impl Outgoing {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<Box<dyn OutboundMessage>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queues `value` for the client, waiting while the queue is full.
    pub async fn send<T>(&self, value: T) -> Result<(), SessionClosed>
    where
        T: Serialize + Send + 'static,
    {
        self.tx
            .send(Box::new(value))
            .await
            .map_err(|_| SessionClosed)
    }

    /// True once the session has stopped reading the queue.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for Outgoing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outgoing")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_values_are_encoded_on_demand() {
        let (outgoing, mut rx) = Outgoing::channel(4);
        outgoing.send("hello").await.unwrap();
        outgoing.send(vec![1, 2, 3]).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().to_json().unwrap(), "\"hello\"");
        assert_eq!(rx.recv().await.unwrap().to_json().unwrap(), "[1,2,3]");
    }

    #[tokio::test]
    async fn test_unencodable_value_fails_at_encode_time() {
        let (outgoing, mut rx) = Outgoing::channel(1);
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys are not JSON");

        outgoing.send(bad).await.unwrap();
        assert!(rx.recv().await.unwrap().to_json().is_err());
    }

    #[tokio::test]
    async fn test_send_after_close() {
        let (outgoing, rx) = Outgoing::channel(1);
        drop(rx);
        assert!(outgoing.is_closed());
        assert_eq!(outgoing.send("late").await, Err(SessionClosed));
    }
}
