//! Process-wide session lifecycle.
//!
//! The coordinator counts open sessions and decides when the whole server
//! should stop. Closing the last tab does not stop it immediately: a page
//! refresh closes the connection and opens a new one a moment later, so the
//! decision waits out a short debounce first.

use crate::app::App;
use crate::pump::{CloseNotifier, SessionOptions, SessionPump, Transport};
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// How long the session count must stay at zero before shutting down.
pub const SHUTDOWN_DEBOUNCE: Duration = Duration::from_millis(500);

/// Why the coordinator stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The last session closed and none reopened within the debounce.
    Idle,
    /// The process-wide terminate signal fired.
    Terminated,
}

/// Accepts sessions, spawns a pump for each, and decides when to stop.
pub struct SessionCoordinator<A> {
    app: Arc<A>,
    options: Arc<SessionOptions>,
    auto_shutdown: bool,
}

impl<A: App> SessionCoordinator<A> {
    pub fn new(app: Arc<A>, options: SessionOptions) -> Self {
        Self {
            app,
            options: Arc::new(options),
            auto_shutdown: true,
        }
    }

    /// With auto shutdown off, only `done` stops the coordinator.
    pub fn auto_shutdown(mut self, enabled: bool) -> Self {
        self.auto_shutdown = enabled;
        self
    }

    /// Runs until shutdown is decided.
    ///
    /// Pumps are spawned and never awaited; the coordinator only hears about
    /// them through their close notifications. Pumps still running when this
    /// returns keep going until they observe `done` or their client leaves.
    pub async fn run<T: Transport>(
        self,
        done: CancellationToken,
        mut sessions: mpsc::Receiver<T>,
    ) -> ShutdownReason {
        let (close_tx, mut close_rx) = mpsc::unbounded_channel::<Uuid>();
        let mut ledger = Ledger::default();
        let mut accepting = true;

        loop {
            tokio::select! {
                biased;

                _ = done.cancelled() => {
                    info!("Shutting down gooey web server");
                    return ShutdownReason::Terminated;
                }

                // A deadline that has passed is decided before any session
                // arriving in the same instant.
                _ = ledger.fired() => {
                    if ledger.decide() == Decision::Shutdown {
                        info!("No connections left, shutting down gooey web server");
                        return ShutdownReason::Idle;
                    }
                    debug!("Connections still open -- count {}", ledger.open());
                }

                Some(id) = close_rx.recv() => {
                    if self.auto_shutdown {
                        ledger.closed();
                    }
                    info!(session = %id, "Connection closed -- count {}", ledger.open());
                }

                session = sessions.recv(), if accepting => match session {
                    Some(transport) => {
                        if self.auto_shutdown {
                            ledger.opened();
                        }
                        let id = self.spawn(transport, &done, &close_tx);
                        info!(session = %id, "Connection opened -- count {}", ledger.open());
                    }
                    None => {
                        debug!("Session source closed");
                        accepting = false;
                    }
                },
            }
        }
    }

    fn spawn<T: Transport>(
        &self,
        transport: T,
        done: &CancellationToken,
        close_tx: &mpsc::UnboundedSender<Uuid>,
    ) -> Uuid {
        let pump = SessionPump::new(self.app.clone(), self.options.clone());
        let id = pump.id();
        let on_close = CloseNotifier::new(id, close_tx.clone());
        tokio::spawn(pump.run(transport, done.clone(), on_close));
        id
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ledger
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Shutdown,
    KeepRunning,
}

/// Shutdown debounce timer state.
#[derive(Debug, Default)]
enum Debounce {
    #[default]
    Idle,
    Armed(Pin<Box<Sleep>>),
    /// Fired; waiting for `decide`.
    Fired,
}

/// Open-session count and debounce timer. Only the coordinator loop touches
/// it, so the count needs no locking.
#[derive(Debug, Default)]
struct Ledger {
    open: i64,
    debounce: Debounce,
}

impl Ledger {
    fn open(&self) -> i64 {
        self.open
    }

    fn opened(&mut self) {
        match self.debounce {
            Debounce::Armed(_) => debug!("Connection reopened, cancelling shutdown timer"),
            Debounce::Fired => debug!("Connection opened while a shutdown decision was pending"),
            Debounce::Idle => {}
        }
        self.debounce = Debounce::Idle;
        self.open += 1;
    }

    fn closed(&mut self) {
        self.open -= 1;
        if matches!(self.debounce, Debounce::Idle) {
            self.debounce = Debounce::Armed(Box::pin(sleep(SHUTDOWN_DEBOUNCE)));
        }
    }

    /// Completes when an armed timer fires; pends forever otherwise.
    async fn fired(&mut self) {
        match &mut self.debounce {
            Debounce::Armed(timer) => {
                timer.as_mut().await;
                self.debounce = Debounce::Fired;
            }
            Debounce::Idle | Debounce::Fired => pending().await,
        }
    }

    fn decide(&mut self) -> Decision {
        debug_assert!(matches!(self.debounce, Debounce::Fired));
        self.debounce = Debounce::Idle;

        if self.open < 0 {
            panic!("Number of connections dropped below zero ({})", self.open);
        }
        if self.open == 0 {
            Decision::Shutdown
        } else {
            Decision::KeepRunning
        }
    }
}
