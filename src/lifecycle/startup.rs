//! Server startup.
//!
//! # Responsibilities
//! - Bind the listener
//! - Start the HTTP front door on a background task
//! - Hand back a handle that stops it
//! - Serve a fixed in-memory bundle without any builder
//!
//! # Design Decisions
//! - Fail fast: a bind error is returned before anything is spawned
//! - `stop` closes the listener first, then releases the cached handler

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::build::{BuildResult, FixedBuild};
use crate::config::DevServerConfig;
use crate::dev::controller::RequestHandlerController;
use crate::http::server::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::routing::router::RouteBundle;
use crate::runtime::PreloadedBackend;

/// Everything the front door needs.
pub struct StartOptions {
    pub config: DevServerConfig,
    pub controller: Arc<RequestHandlerController>,
}

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// A server accepting connections.
pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<io::Result<()>>,
    controller: Arc<RequestHandlerController>,
}

/// Bind and start serving.
pub async fn start(options: StartOptions) -> Result<RunningServer, StartError> {
    let StartOptions { config, controller } = options;
    let address = config.listener.bind_address.clone();

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartError::Bind {
            address: address.clone(),
            source,
        })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| StartError::Bind { address, source })?;

    tracing::info!(address = %local_addr, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, Arc::clone(&controller));
    let task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    Ok(RunningServer {
        local_addr,
        shutdown,
        task,
        controller,
    })
}

/// Serve `bundle` as the one and only build, with the dispatch options from `config`.
pub async fn serve_bundle(bundle: RouteBundle, config: DevServerConfig) -> Result<RunningServer, StartError> {
    let build = FixedBuild::new(BuildResult::Success {
        bundle_path: PathBuf::new(),
        built_at_ms: 0,
    });
    let backend = PreloadedBackend::new(bundle, config.dispatch.to_options());
    let controller = Arc::new(RequestHandlerController::new(Arc::new(build), Arc::new(backend)));
    start(StartOptions { config, controller }).await
}

impl RunningServer {
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, drain in-flight requests, then drop the cached handler.
    pub async fn stop(self) -> io::Result<()> {
        self.shutdown.trigger();
        let result = match self.task.await {
            Ok(result) => result,
            Err(e) => Err(io::Error::other(e)),
        };
        self.controller.teardown();
        result
    }
}
