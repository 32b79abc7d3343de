//! hotserve: serve an application bundle while it is being rebuilt.
//!
//! # Architecture Overview
//!
//! ```text
//!        ┌──────────────── builder ────────────────┐        ┌──────────────── server ─────────────────┐
//!        │                                         │        │                                          │
//!  fs ──▶│ BundleWatcher ──▶ BuildCoordinator      │◀─rpc──▶│ BuilderClient ──▶ RequestHandlerController│
//!        │   (debounce,       (serialized builds,  │        │                     (cache by builtAtMs)  │
//!        │    command)         builtAtMs)          │        │                          │                │
//!        └─────────────────────────────────────────┘        │                          ▼                │
//!                                                           │                 ExecutionBackend          │
//!   Client ──────────────────────────────────────────────▶ │  axum ──▶ dispatch ──▶ RouteBundle        │
//!                                                           │             (prefix, match, middleware)  │
//!                                                           └──────────────────────────────────────────┘
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

use hotserve::config::{load_config, validate_config, ConfigError, DevServerConfig};
use hotserve::lifecycle::shutdown_signal;
use hotserve::observability::{logging, metrics};
use hotserve::runtime::BackendKind;
use hotserve::{start_dev_server, DevServerOptions};

#[derive(Parser)]
#[command(name = "hotserve")]
#[command(about = "Serve an application bundle and reload it on every build", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bundle manifest to serve
    #[arg(short, long)]
    bundle: Option<PathBuf>,

    /// Port to listen on (keeps the configured address)
    #[arg(short, long)]
    port: Option<u16>,

    /// Execution backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Directory watched for source changes
    #[arg(long)]
    watch_dir: Option<PathBuf>,

    /// Command that rebuilds the bundle, e.g. `--build-command make bundle`
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    build_command: Option<Vec<String>>,
}

impl Cli {
    fn into_config(self) -> Result<DevServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => DevServerConfig::default(),
        };

        if let Some(bundle) = self.bundle {
            config.build.bundle_path = bundle;
        }
        if let Some(port) = self.port {
            let ip = config
                .listener
                .bind_address
                .parse::<SocketAddr>()
                .map(|addr| addr.ip())
                .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
            config.listener.bind_address = SocketAddr::new(ip, port).to_string();
        }
        if let Some(backend) = self.backend {
            config.runtime.backend = backend;
        }
        if let Some(dir) = self.watch_dir {
            config.build.watch_dir = Some(dir);
        }
        if let Some(command) = self.build_command {
            config.build.command = Some(command);
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init_logging(&config.observability.log_filter);
    tracing::info!("hotserve v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        bundle = %config.build.bundle_path.display(),
        backend = %config.runtime.backend,
        request_timeout_secs = config.timeouts.request_secs,
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

    let server = start_dev_server(DevServerOptions::new(config)).await?;
    tracing::info!(port = server.port(), "Ready");

    shutdown_signal().await;
    server.stop().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
