//! Gooey CLI - run a Gooey app from the command line
//!
//! Starts the WebSocket server with one of the built-in demo apps, optionally
//! hot reloading page content from a directory.

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod demo;

#[derive(Parser)]
#[command(name = "gooey")]
#[command(author = "Gooey Contributors")]
#[command(version)]
#[command(about = "Local web UIs driven by a WebSocket session", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Gooey server
    Serve {
        /// Address to listen on (port 0 picks a free port)
        #[arg(short, long, default_value = "127.0.0.1:0")]
        addr: SocketAddr,

        /// Directory to hot reload page content from
        #[arg(short, long)]
        watch: Option<PathBuf>,

        /// Glob pattern for file names to skip when reloading (repeatable)
        #[arg(short, long = "ignore", value_name = "PATTERN")]
        ignore: Vec<String>,

        /// How often file changes are flushed, in milliseconds
        #[arg(long, default_value = "1000")]
        poll_interval_ms: u64,

        /// Keep running after the last tab closes
        #[arg(long)]
        no_auto_shutdown: bool,

        /// Demo app to serve
        #[arg(long, value_enum, default_value_t = DemoApp::Ticker)]
        app: DemoApp,
    },
}

/// Built-in apps for trying out the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DemoApp {
    /// Sends a counter once per second
    Ticker,
    /// Sends every message back
    Echo,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let result = match cli.command {
        Commands::Serve {
            addr,
            watch,
            ignore,
            poll_interval_ms,
            no_auto_shutdown,
            app,
        } => {
            let options = commands::ServeOptions {
                addr,
                watch,
                ignore,
                poll_interval_ms,
                auto_shutdown: !no_auto_shutdown,
                app,
            };
            commands::serve(options).await
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["gooey", "serve"]).unwrap();
        let Commands::Serve {
            addr,
            watch,
            ignore,
            poll_interval_ms,
            no_auto_shutdown,
            app,
        } = cli.command;

        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 0)));
        assert!(watch.is_none());
        assert!(ignore.is_empty());
        assert_eq!(poll_interval_ms, 1000);
        assert!(!no_auto_shutdown);
        assert_eq!(app, DemoApp::Ticker);
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::try_parse_from([
            "gooey",
            "serve",
            "--watch",
            "web",
            "--ignore",
            ".#*",
            "--ignore",
            "*~",
            "--app",
            "echo",
            "--no-auto-shutdown",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);

        let Commands::Serve {
            watch,
            ignore,
            no_auto_shutdown,
            app,
            ..
        } = cli.command;
        assert_eq!(watch, Some(PathBuf::from("web")));
        assert_eq!(ignore, vec![".#*".to_string(), "*~".to_string()]);
        assert!(no_auto_shutdown);
        assert_eq!(app, DemoApp::Echo);
    }
}
