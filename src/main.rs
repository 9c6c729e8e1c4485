//! Real-time quote streaming gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌───────────────────────────────────────────────────────┐
//!                    │                    QUOTE GATEWAY                       │
//!                    │                                                        │
//!   Browser          │  ┌──────────┐   ┌──────────────┐   ┌───────────────┐  │
//!   ─────────────────┼─▶│   http   │──▶│ static_files │──▶│  ./webapp/*   │  │
//!                    │  │ dispatch │   └──────────────┘   └───────────────┘  │
//!                    │  └────┬─────┘                                         │
//!                    │       │ Upgrade                                        │
//!                    │       ▼                                                │
//!   Ticker channel   │  ┌──────────┐   ┌──────────────┐                      │
//!   ◀────────────────┼─▶│ channel  │──▶│   ticker     │                      │
//!                    │  │ session  │   │  registry    │                      │
//!                    │  └──────────┘   └──────┬───────┘                      │
//!                    │       ▲                │                              │
//!                    │       │         ┌──────▼───────┐     ┌─────────────┐  │
//!                    │       └─────────│ broadcaster  │────▶│ quote source│──┼──▶ Upstream
//!                    │                 └──────────────┘     └─────────────┘  │
//!                    └───────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use quote_gateway::config::{self, GatewayConfig, TlsConfig};
use quote_gateway::lifecycle::{spawn_signal_handler, Shutdown};
use quote_gateway::observability::{logging, metrics};
use quote_gateway::GatewayServer;

#[derive(Parser, Debug)]
#[command(name = "quote-gateway")]
#[command(about = "Static file server and real-time ticker channel", long_about = None)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the static file root.
    #[arg(long)]
    static_root: Option<String>,

    /// PEM certificate; enables TLS together with --tls-key.
    #[arg(long, requires = "tls_key")]
    tls_cert: Option<String>,

    /// PEM private key.
    #[arg(long, requires = "tls_cert")]
    tls_key: Option<String>,
}

fn apply_overrides(config: &mut GatewayConfig, args: Args) {
    if let Some(port) = args.port {
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{host}:{port}");
    }
    if let Some(root) = args.static_root {
        config.static_files.root = root;
    }
    if let (Some(cert_path), Some(key_path)) = (args.tls_cert, args.tls_key) {
        config.listener.tls = Some(TlsConfig {
            cert_path,
            key_path,
        });
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match config::load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration from {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => GatewayConfig::default(),
    };
    apply_overrides(&mut config, args);

    if let Err(errors) = config::validate_config(&config) {
        for error in &errors {
            eprintln!("Invalid configuration: {error}");
        }
        return ExitCode::FAILURE;
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "quote-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        encrypted = config.is_encrypted(),
        static_root = %config.static_files.root,
        broadcast_interval_ms = config.broadcaster.interval_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    spawn_signal_handler(shutdown.clone());

    let server = match GatewayServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize server");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.serve(receiver).await {
        tracing::error!(error = %e, "Server exited with error");
        return ExitCode::FAILURE;
    }

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
