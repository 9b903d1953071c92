//! Per-session message pump.
//!
//! One pump owns one client connection. It runs the app, forwards inbound
//! frames to it, writes everything the app sends back, and optionally pushes
//! reload content, all through a single loop so writes never interleave.

use crate::app::{App, OutboundMessage, Outgoing};
use crate::error::{ErrorSink, RuntimeError};
use crate::protocol::{classify_close, shutdown_frame, CloseKind, ReloadEnvelope};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use gooey_reload::{
    ChangeEvent, ChangeSource, ContentUpdate, NotifyWatcher, ReloadAggregator, ReloadConfig,
    ReloadError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

/// Upper bound on the close handshake when the server shuts down.
pub const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

const INBOUND_CAPACITY: usize = 32;
const OUTBOUND_CAPACITY: usize = 32;

/// A bidirectional WebSocket message channel.
pub trait Transport:
    Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin + Send + 'static
{
}

impl<T> Transport for T where
    T: Stream<Item = Result<Message, WsError>>
        + Sink<Message, Error = WsError>
        + Unpin
        + Send
        + 'static
{
}

/// Settings shared by every session of a server.
#[derive(Clone)]
pub struct SessionOptions {
    /// Hot reload settings; `None` disables reload.
    pub reload: Option<ReloadConfig>,
    /// Where reload change events come from.
    pub change_source: Arc<dyn ChangeSource>,
    pub errors: ErrorSink,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            reload: None,
            change_source: Arc::new(NotifyWatcher),
            errors: ErrorSink::default(),
        }
    }
}

/// Tells the coordinator a session has ended. Consumed on use.
#[derive(Debug)]
pub struct CloseNotifier {
    id: Uuid,
    tx: mpsc::UnboundedSender<Uuid>,
}

impl CloseNotifier {
    /// Sends `id` on `tx` when notified. Use the pump's own [`SessionPump::id`].
    pub fn new(id: Uuid, tx: mpsc::UnboundedSender<Uuid>) -> Self {
        Self { id, tx }
    }

    pub fn notify(self) {
        // The coordinator may already be gone.
        let _ = self.tx.send(self.id);
    }
}

/// Drives a single client session.
pub struct SessionPump<A> {
    id: Uuid,
    app: Arc<A>,
    options: Arc<SessionOptions>,
}

impl<A: App> SessionPump<A> {
    pub fn new(app: Arc<A>, options: Arc<SessionOptions>) -> Self {
        Self {
            id: Uuid::new_v4(),
            app,
            options,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Runs the session until the client leaves or `done` fires, then
    /// notifies `on_close`.
    pub async fn run<T: Transport>(self, transport: T, done: CancellationToken, on_close: CloseNotifier) {
        let span = info_span!("session", id = %self.id);
        self.pump(transport, done, on_close).instrument(span).await
    }

    async fn pump<T: Transport>(self, transport: T, done: CancellationToken, on_close: CloseNotifier) {
        let stop = CancellationToken::new();
        // Ends the reload watch together with this session.
        let scope = done.child_token();
        let _scope_guard = scope.clone().drop_guard();

        let (incoming_tx, incoming_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (outgoing, mut outgoing_rx) = Outgoing::channel(OUTBOUND_CAPACITY);

        let app = self.app.clone();
        let closed = stop.clone();
        tokio::spawn(
            async move { app.start(closed, incoming_rx, outgoing).await }.in_current_span(),
        );

        let mut reload_rx = self.start_reload(scope);

        let (mut sink, stream) = transport.split();
        tokio::spawn(
            read_inbound(
                stream,
                incoming_tx,
                stop.clone(),
                done.clone(),
                self.options.errors.clone(),
            )
            .in_current_span(),
        );

        info!("Session opened");

        loop {
            tokio::select! {
                biased;

                _ = stop.cancelled() => {
                    info!("Shutting down websocket connection");
                    if let Ok(Err(e)) = timeout(CLOSE_HANDSHAKE_TIMEOUT, sink.close()).await {
                        debug!("Transport already closed: {}", e);
                    }
                    break;
                }

                _ = done.cancelled() => {
                    self.close_handshake(&mut sink).await;
                    break;
                }

                Some(message) = outgoing_rx.recv() => {
                    let encoded = encode(message);
                    self.send_encoded(&mut sink, encoded).await;
                }

                Some(update) = next_update(&mut reload_rx) => {
                    info!("Reloading web content");
                    let encoded = ReloadEnvelope::new(update).to_json();
                    self.send_encoded(&mut sink, encoded).await;
                }
            }
        }

        // The app hears about every kind of shutdown, not just a client close.
        stop.cancel();
        on_close.notify();
    }

    /// Sends a normal-closure frame, then closes the transport regardless.
    async fn close_handshake<S>(&self, sink: &mut S)
    where
        S: Sink<Message, Error = WsError> + Unpin,
    {
        let frame = Message::Close(Some(shutdown_frame()));
        match timeout(CLOSE_HANDSHAKE_TIMEOUT, sink.send(frame)).await {
            Ok(Ok(())) => info!("Writing websocket close message"),
            Ok(Err(e)) => self
                .options
                .errors
                .report(RuntimeError::CloseHandshake(e.to_string())),
            Err(_) => self
                .options
                .errors
                .report(RuntimeError::CloseHandshake("timed out".to_string())),
        }
        let _ = timeout(CLOSE_HANDSHAKE_TIMEOUT, sink.close()).await;
    }

    /// Writes one JSON text frame. Failures are reported and skipped.
    async fn send_encoded<S>(&self, sink: &mut S, encoded: serde_json::Result<String>)
    where
        S: Sink<Message, Error = WsError> + Unpin,
    {
        let text = match encoded {
            Ok(text) => text,
            Err(e) => {
                self.options.errors.report(RuntimeError::Serialize(e));
                return;
            }
        };
        if let Err(e) = sink.send(Message::Text(text)).await {
            self.options.errors.report(RuntimeError::Write(e));
        }
    }

    /// Starts this session's private watch and aggregator, if reload is on.
    fn start_reload(&self, scope: CancellationToken) -> Option<mpsc::Receiver<ContentUpdate>> {
        let config = self.options.reload.as_ref()?;

        // Each session watches on its own; fine for the handful of tabs a
        // development session has open.
        let batches = match self.options.change_source.watch(
            scope.clone(),
            &config.watch_dir,
            config.recursive,
            config.poll_interval,
        ) {
            Ok(batches) => batches,
            Err(e) => {
                self.options.errors.report(RuntimeError::Watch(e));
                return None;
            }
        };

        let errors = self.options.errors.clone();
        let aggregator = ReloadAggregator::with_error_hook(
            &config.ignore_patterns,
            Some(Box::new(move |e: ReloadError| {
                errors.forward(RuntimeError::Reload(e))
            })),
        );

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(feed_reload(scope, batches, aggregator, tx).in_current_span());
        Some(rx)
    }
}

fn encode(message: Box<dyn OutboundMessage>) -> serde_json::Result<String> {
    message.to_json()
}

async fn next_update(rx: &mut Option<mpsc::Receiver<ContentUpdate>>) -> Option<ContentUpdate> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Reads client frames until the client leaves or the session stops.
async fn read_inbound<S>(
    mut stream: S,
    incoming: mpsc::Sender<Vec<u8>>,
    stop: CancellationToken,
    done: CancellationToken,
    errors: ErrorSink,
) where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            _ = done.cancelled() => return,
            next = stream.next() => next,
        };

        let bytes = match next {
            Some(Ok(Message::Text(text))) => text.into_bytes(),
            Some(Ok(Message::Binary(data))) => data,
            Some(Ok(Message::Close(frame))) => {
                match classify_close(frame.as_ref()) {
                    CloseKind::Clean => info!("Client closing connection"),
                    CloseKind::Unexpected(code) => {
                        if !(stop.is_cancelled() || done.is_cancelled()) {
                            errors.report(RuntimeError::UnexpectedClose(code));
                        }
                    }
                }
                stop.cancel();
                return;
            }
            // Ping and pong are answered by the transport.
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                if !(stop.is_cancelled() || done.is_cancelled()) {
                    errors.report(RuntimeError::Read(e));
                }
                stop.cancel();
                return;
            }
            None => {
                debug!("Transport ended");
                stop.cancel();
                return;
            }
        };

        tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            sent = incoming.send(bytes) => {
                if sent.is_err() {
                    debug!("App stopped reading, dropping inbound message");
                }
            }
        }
    }
}

/// Turns change batches into reload updates for one session.
async fn feed_reload(
    done: CancellationToken,
    mut batches: mpsc::Receiver<Vec<ChangeEvent>>,
    mut aggregator: ReloadAggregator,
    tx: mpsc::Sender<ContentUpdate>,
) {
    loop {
        let batch = tokio::select! {
            biased;
            _ = done.cancelled() => return,
            batch = batches.recv() => match batch {
                Some(batch) => batch,
                None => return,
            },
        };

        // Reads files; keep it off the async workers.
        let result = tokio::task::spawn_blocking(move || {
            let update = aggregator.aggregate(&batch);
            (aggregator, update)
        })
        .await;
        let update = match result {
            Ok((returned, update)) => {
                aggregator = returned;
                update
            }
            Err(e) => {
                error!("Reload aggregation failed: {}", e);
                return;
            }
        };

        if update.is_unchanged() {
            debug!("Batch changed nothing on the page");
            continue;
        }

        tokio::select! {
            biased;
            _ = done.cancelled() => return,
            sent = tx.send(update) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}
