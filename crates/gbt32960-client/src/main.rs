//! GB/T 32960.3 terminal: entry point.
//!
//! Connects to a monitoring platform, logs every packet it receives, and
//! acknowledges platform commands that wait for an answer.
//!
//! # Usage
//!
//! ```text
//! gbt32960-client [OPTIONS]
//!
//! Options:
//!   --config <PATH>   TOML configuration file [default: gbt32960-client.toml]
//!   --host   <HOST>   Platform hostname or IP (overrides the file)
//!   --port   <PORT>   Platform TCP port (overrides the file)
//!   --vin    <VIN>    Vehicle identification number (overrides the file)
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable          | Overrides   |
//! |-------------------|-------------|
//! | `GBT32960_CONFIG` | `--config`  |
//! | `GBT32960_HOST`   | `--host`    |
//! | `GBT32960_PORT`   | `--port`    |
//! | `GBT32960_VIN`    | `--vin`     |
//!
//! CLI args take precedence over environment variables, which take precedence
//! over the configuration file.
//!
//! # Event loop (for beginners)
//!
//! The session's reader task calls our packet handler for every decoded
//! packet.  Handlers must not block, so the handler only pushes the packet onto
//! an `mpsc` channel.  The `select!` loop below pulls packets off that channel,
//! logs them, and runs the auto-acknowledge use case, which may write a reply
//! back through the session.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gbt32960_core::SystemClock;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use gbt32960_client::application::respond::{AutoAckUseCase, PacketSender};
use gbt32960_client::infrastructure::network::Session;
use gbt32960_client::infrastructure::storage::config::{load_config, ClientConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// GB/T 32960.3 vehicle terminal.
#[derive(Debug, Parser)]
#[command(
    name = "gbt32960-client",
    about = "GB/T 32960.3 vehicle terminal: connects to a platform and acknowledges its commands",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.  A missing file means defaults.
    #[arg(long, default_value = "gbt32960-client.toml", env = "GBT32960_CONFIG")]
    config: PathBuf,

    /// Hostname or IP address of the platform.
    #[arg(long, env = "GBT32960_HOST")]
    host: Option<String>,

    /// TCP port of the platform.
    #[arg(long, env = "GBT32960_PORT")]
    port: Option<u16>,

    /// Vehicle identification number (at most 17 characters).
    #[arg(long, env = "GBT32960_VIN")]
    vin: Option<String>,
}

impl Cli {
    /// Applies the command-line overrides on top of the file configuration.
    fn apply_to(self, mut config: ClientConfig) -> ClientConfig {
        if let Some(host) = self.host {
            config.platform.host = host;
        }
        if let Some(port) = self.port {
            config.platform.port = port;
        }
        if let Some(vin) = self.vin {
            config.vehicle.vin = vin;
        }
        config
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone();
    let file_config = load_config(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let config = cli.apply_to(file_config);

    // `RUST_LOG` wins; otherwise the configured level applies.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let vin = config.vin().context("invalid VIN in configuration")?;
    let session_config = config.session_config();
    info!(
        "GB/T 32960 terminal starting: VIN={vin}, platform={}",
        session_config.address()
    );

    let session = Arc::new(Session::new(session_config));

    let (packet_tx, mut packet_rx) = mpsc::unbounded_channel();
    session.register_handler(move |packet| {
        let _ = packet_tx.send(packet);
    });

    let closed = Arc::new(Notify::new());
    let closed_hook = Arc::clone(&closed);
    session.register_disconnect_handler(move || closed_hook.notify_one());

    session
        .connect()
        .await
        .context("could not reach the platform")?;

    let sender: Arc<dyn PacketSender> = session.clone();
    let auto_ack = AutoAckUseCase::new(sender, Arc::new(SystemClock), config.session.auto_ack);

    // ── Event loop ────────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            // Packets already queued are handled before a disconnect is noticed.
            biased;

            Some(packet) = packet_rx.recv() => {
                info!("received {packet}");
                if packet.vin != vin {
                    debug!("packet addressed to VIN {} (configured {vin})", packet.vin);
                }
                if let Err(e) = auto_ack.handle(&packet).await {
                    warn!("{e}");
                }
            }
            _ = closed.notified() => {
                info!("platform connection closed");
                break;
            }
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("received Ctrl+C, disconnecting"),
                    Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
                }
                session.disconnect().await;
                break;
            }
        }
    }

    info!("GB/T 32960 terminal stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
