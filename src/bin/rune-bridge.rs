//! `rune-bridge` command line.
//!
//! ```text
//! rune-bridge relay --port 5173
//! rune-bridge host --origin http://127.0.0.1:5173 --transport socket
//! rune-bridge serve --port 3001 --ui
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rune_bridge::host::{HostConfig, HostRuntime, TransportPreference};
use rune_bridge::relay::{RelayConfig, RelayServer};
use rune_bridge::service::counter_service;
use rune_bridge::standalone::{AgentHttpService, ServiceConfig};
use rune_bridge::Result;

// ============================================================================
// Arguments
// ============================================================================

#[derive(Parser)]
#[command(name = "rune-bridge", version, about = "Development bridge for browser-hosted agent services")]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay that controllers and browser hosts connect to
    Relay {
        /// Bind host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Bind port
        #[arg(short, long, default_value_t = 5173)]
        port: u16,

        /// How long to wait for a host reply
        #[arg(long, default_value_t = 10_000)]
        relay_timeout_ms: u64,

        /// Host wait ceiling assumed when a wait omits timeoutMs
        #[arg(long, default_value_t = 30_000)]
        max_wait_ms: u64,
    },

    /// Run a host with the demo counter service
    Host {
        /// Relay origin
        #[arg(long, default_value = "http://127.0.0.1:5173")]
        origin: String,

        /// Transport: auto, socket or event-channel
        #[arg(long, default_value = "auto")]
        transport: TransportPreference,

        /// Delay between reconnect attempts
        #[arg(long, default_value_t = 1_000)]
        reconnect_ms: u64,

        /// Ceiling for wait timeouts
        #[arg(long, default_value_t = 30_000)]
        max_wait_ms: u64,
    },

    /// Serve the demo counter service directly over HTTP
    Serve {
        /// Bind host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Bind port
        #[arg(short, long, default_value_t = 3001)]
        port: u16,

        /// API base path
        #[arg(long, default_value = "/")]
        base_path: String,

        /// Ceiling for wait timeouts
        #[arg(long, default_value_t = 30_000)]
        max_wait_ms: u64,

        /// Serve the HTML console at /ui
        #[arg(long)]
        ui: bool,
    },
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match cli.command {
        Command::Relay {
            host,
            port,
            relay_timeout_ms,
            max_wait_ms,
        } => {
            let config = RelayConfig::new()
                .with_host(host)
                .with_port(port)
                .with_relay_timeout(Duration::from_millis(relay_timeout_ms))
                .with_max_wait(Duration::from_millis(max_wait_ms));
            let server = RelayServer::bind(config).await?;
            info!(origin = %server.origin(), "Relay ready, press Ctrl+C to exit");
            server.serve(shutdown_signal()).await?;
        }

        Command::Host {
            origin,
            transport,
            reconnect_ms,
            max_wait_ms,
        } => {
            let config = HostConfig::new()
                .with_relay_origin(origin)
                .with_transport(transport)
                .with_reconnect_delay(Duration::from_millis(reconnect_ms))
                .with_max_wait(Duration::from_millis(max_wait_ms));
            let runtime = HostRuntime::start(Arc::new(counter_service()), config)?;
            info!(host_id = runtime.host_id(), transport = %runtime.transport_kind(), "Host running, press Ctrl+C to exit");
            shutdown_signal().await;
            runtime.stop().await;
        }

        Command::Serve {
            host,
            port,
            base_path,
            max_wait_ms,
            ui,
        } => {
            let config = ServiceConfig::new()
                .with_host(host)
                .with_port(port)
                .with_base_path(base_path)
                .with_max_wait(Duration::from_millis(max_wait_ms))
                .with_ui(ui);
            let service = AgentHttpService::new(Arc::new(counter_service()), config);
            let info = service.start().await?;
            info!(url = %info.url, "Serving, press Ctrl+C to exit");
            shutdown_signal().await;
            service.dispose().await;
        }
    }

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn init_logging(debug: bool) {
    let fallback = if debug { "rune_bridge=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
}
