//! Built-in demo apps.

use async_trait::async_trait;
use gooey_server::{App, Outgoing};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Sends a running count to each page once per period.
#[derive(Debug, Clone)]
pub struct TickerApp {
    period: Duration,
}

impl Default for TickerApp {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
        }
    }
}

#[async_trait]
impl App for TickerApp {
    async fn start(
        &self,
        closed: CancellationToken,
        _incoming: mpsc::Receiver<Vec<u8>>,
        outgoing: Outgoing,
    ) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let mut count: u64 = 0;
        loop {
            tokio::select! {
                _ = closed.cancelled() => break,
                _ = ticker.tick() => {
                    let message = format!("Message from server.  Count {count}");
                    if outgoing.send(message).await.is_err() {
                        break;
                    }
                    count += 1;
                }
            }
        }
        debug!("Ticker stopped after {} messages", count);
    }
}

/// Sends every inbound message back as a string.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoApp;

#[async_trait]
impl App for EchoApp {
    async fn start(
        &self,
        closed: CancellationToken,
        mut incoming: mpsc::Receiver<Vec<u8>>,
        outgoing: Outgoing,
    ) {
        loop {
            tokio::select! {
                _ = closed.cancelled() => break,
                msg = incoming.recv() => match msg {
                    Some(bytes) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        if outgoing.send(text).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    }
}
