//! CLI command implementations.

use crate::demo::{EchoApp, TickerApp};
use crate::DemoApp;
use colored::Colorize;
use gooey_reload::ReloadConfig;
use gooey_server::{App, Server, ServerConfig, ShutdownReason};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Flags for `gooey serve`.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub addr: SocketAddr,
    pub watch: Option<PathBuf>,
    pub ignore: Vec<String>,
    pub poll_interval_ms: u64,
    pub auto_shutdown: bool,
    pub app: DemoApp,
}

impl ServeOptions {
    fn server_config(&self) -> ServerConfig {
        let reload = self.watch.as_ref().map(|dir| ReloadConfig {
            ignore_patterns: self.ignore.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            ..ReloadConfig::new(dir)
        });

        ServerConfig {
            addr: self.addr,
            reload,
            auto_shutdown: self.auto_shutdown,
            errors: None,
        }
    }
}

/// Start the server and block until it stops.
pub async fn serve(options: ServeOptions) -> Result<()> {
    if let Some(dir) = &options.watch {
        if !dir.is_dir() {
            return Err(format!("watch directory {} does not exist", dir.display()).into());
        }
    }

    let server = Server::bind(options.server_config()).await?;

    println!(
        "{} Gooey server running on {}",
        "✓".green(),
        format!("ws://{}", server.local_addr()).cyan()
    );
    if let Some(dir) = &options.watch {
        println!("  Reloading content from {}", dir.display());
    }
    println!("  Press {} to stop", "Ctrl+C".cyan());

    let done = CancellationToken::new();
    let signal_done = done.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal_done.cancel(),
            Err(e) => warn!("Could not listen for Ctrl+C: {}", e),
        }
    });

    let reason = match options.app {
        DemoApp::Ticker => run(server, done, TickerApp::default()).await,
        DemoApp::Echo => run(server, done, EchoApp).await,
    };

    match reason {
        ShutdownReason::Idle => println!("{} Last tab closed, server stopped", "✓".green()),
        ShutdownReason::Terminated => println!("{} Server stopped", "✓".green()),
    }
    Ok(())
}

async fn run<A: App>(server: Server, done: CancellationToken, app: A) -> ShutdownReason {
    server.run(done, Arc::new(app)).await
}
