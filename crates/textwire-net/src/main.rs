//! textwire: interactive console for framed TCP text messaging.
//!
//! Listens on one endpoint, sends to another.  Every message received on the
//! local endpoint is printed as `< text`; every line typed on stdin is sent to
//! the remote endpoint.  An empty line, end of input or Ctrl+C exits.
//!
//! # Usage
//!
//! ```text
//! textwire [OPTIONS]
//!
//! Options:
//!   --local  <HOST:PORT>      Address to listen on          [env: TEXTWIRE_LOCAL]
//!   --remote <HOST:PORT>      Address to send messages to   [env: TEXTWIRE_REMOTE]
//!   --config <PATH>           Optional TOML config file     [env: TEXTWIRE_CONFIG]
//!   --max-frame-bytes <N>     Largest accepted message body, 0 = unbounded
//! ```
//!
//! Two consoles talking to each other:
//!
//! ```text
//! textwire --local 127.0.0.1:1000 --remote 127.0.0.1:1001
//! textwire --local 127.0.0.1:1001 --remote 127.0.0.1:1000
//! ```
//!
//! Command-line values override the config file.  Logs go to stderr and are
//! filtered by `RUST_LOG`, falling back to the file's `log_level`.

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use textwire_net::domain::{AppConfig, Endpoint, MessageEvent};
use textwire_net::domain::config::{LocalSection, RemoteSection};
use textwire_net::infrastructure::{FramedReceiver, FramedSender};

const USAGE_EXAMPLE: &str = "textwire --local 127.0.0.1:1000 --remote 127.0.0.1:1001";

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Framed TCP text messaging console.
#[derive(Debug, Parser)]
#[command(
    name = "textwire",
    about = "Send and receive length-prefixed text messages over TCP",
    version
)]
struct Cli {
    /// Local `address:port` to accept messages on.
    #[arg(long, env = "TEXTWIRE_LOCAL", value_parser = Endpoint::parse)]
    local: Option<Endpoint>,

    /// Remote `host:port` to send typed lines to.
    #[arg(long, env = "TEXTWIRE_REMOTE", value_parser = Endpoint::parse)]
    remote: Option<Endpoint>,

    /// TOML config file; see `AppConfig` for the schema.
    #[arg(long, env = "TEXTWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Largest message body accepted from a peer, in bytes.  `0` removes the
    /// limit.
    #[arg(long)]
    max_frame_bytes: Option<u32>,
}

impl Cli {
    /// Loads the config file (if any) and applies command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if no
    /// local or remote endpoint is configured anywhere.
    fn into_app_config(self) -> anyhow::Result<AppConfig> {
        let mut app = match &self.config {
            Some(path) => AppConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => AppConfig::default(),
        };

        if let Some(local) = self.local {
            app.local = Some(LocalSection {
                address: local.host,
                port: local.port,
            });
        }
        if let Some(remote) = self.remote {
            app.remote = Some(RemoteSection {
                host: remote.host,
                port: remote.port,
            });
        }
        if let Some(max) = self.max_frame_bytes {
            app.limits.max_frame_bytes = max;
        }

        if app.local.is_none() || app.remote.is_none() {
            bail!("both a local and a remote endpoint are required, e.g.\n  {USAGE_EXAMPLE}");
        }
        Ok(app)
    }
}

// ── Console input ─────────────────────────────────────────────────────────────

/// Reads stdin on a dedicated thread and forwards each line.
///
/// A blocking read on tokio's own stdin handle would keep the runtime alive
/// after Ctrl+C until the user pressed Enter.
fn spawn_line_reader() -> anyhow::Result<mpsc::UnboundedReceiver<std::io::Result<String>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("failed to spawn stdin reader thread")?;
    Ok(rx)
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("TCP text message client/server");

    let app = Cli::parse().into_app_config()?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&app.log_level)),
        )
        .init();

    let sender = FramedSender::new(app.sender_config());
    if let Some(remote) = &app.remote {
        println!("Using remote party at {}:{}", remote.host, remote.port);
    }

    let mut receiver = FramedReceiver::new(
        app.receiver_config(),
        |event: &MessageEvent| -> anyhow::Result<()> {
            println!("< {}", event.text);
            Ok(())
        },
    );
    let local_addr = receiver.start().await.context("failed to start listener")?;
    println!("Listening at {local_addr}");

    let mut lines = spawn_line_reader()?;
    println!("Write text and press Enter to send message. Send empty message to exit");

    loop {
        let line = tokio::select! {
            line = lines.recv() => line,
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C");
                None
            }
        };
        let line = match line {
            Some(Ok(line)) if !line.is_empty() => line,
            Some(Err(e)) => {
                eprintln!("failed to read input: {e}");
                break;
            }
            _ => break,
        };

        if let Err(e) = sender.send(&line).await {
            println!("{e}");
        }
    }

    println!("Exit...");
    sender.close().await;
    receiver.shutdown().await;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
