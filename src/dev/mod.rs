//! Dev server assembly.
//!
//! # Data Flow
//! ```text
//! BundleWatcher ──▶ BuildCoordinator ◀──loopback channel──▶ BuilderClient
//!                                                              │
//!                 HTTP ──▶ HttpServer ──▶ RequestHandlerController
//!                                              │
//!                                              ▼
//!                                     ExecutionBackend (sandbox | direct)
//! ```
//!
//! # Design Decisions
//! - Server and builder only talk over the channel, even in one process
//! - Stopping shuts the server and the builder down concurrently, then closes
//!   both channel endpoints

pub mod controller;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::build::{BuildCoordinator, BuildHooks, BuilderClient, BundleWatcher, WatchOptions, WatcherHandle};
use crate::config::DevServerConfig;
use crate::http::middleware::MiddlewareStack;
use crate::lifecycle::{self, RunningServer, Shutdown, StartError, StartOptions};
use crate::rpc::Channel;
use crate::runtime::{backend_for, BundleLoader, ManifestLoader};

pub use controller::{CachedArtifact, ControllerError, RequestHandlerController};

/// Inputs for [`start_dev_server`].
pub struct DevServerOptions {
    pub config: DevServerConfig,
    pub loader: Arc<dyn BundleLoader>,
    /// Applied around every route of the served bundle.
    pub middleware: MiddlewareStack,
    /// Drive builds from the file system. When off, publish through
    /// [`DevServer::coordinator`].
    pub watch: bool,
    pub hooks: BuildHooks,
}

impl DevServerOptions {
    pub fn new(config: DevServerConfig) -> Self {
        Self {
            config,
            loader: Arc::new(ManifestLoader::new()),
            middleware: MiddlewareStack::new(),
            watch: true,
            hooks: BuildHooks::logging(),
        }
    }

    pub fn loader(mut self, loader: impl BundleLoader) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    pub fn middleware(mut self, middleware: MiddlewareStack) -> Self {
        self.middleware = middleware;
        self
    }

    pub fn watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    pub fn hooks(mut self, hooks: BuildHooks) -> Self {
        self.hooks = hooks;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DevServerError {
    #[error(transparent)]
    Start(#[from] StartError),
    #[error("failed to watch for changes: {0}")]
    Watch(#[from] notify::Error),
}

/// A running server plus its builder.
pub struct DevServer {
    server: RunningServer,
    coordinator: Arc<BuildCoordinator>,
    client: BuilderClient,
    watcher: Option<WatcherHandle>,
    builder_shutdown: Shutdown,
}

/// Wire the builder, channel, controller and HTTP server together and start them.
pub async fn start_dev_server(options: DevServerOptions) -> Result<DevServer, DevServerError> {
    let DevServerOptions {
        config,
        loader,
        middleware,
        watch,
        hooks,
    } = options;

    let coordinator = Arc::new(BuildCoordinator::new());
    let (server_end, builder_end) = Channel::loopback();
    coordinator.serve(builder_end);
    let client = BuilderClient::connect(server_end, config.build.wait_timeout(), hooks);

    let dispatch = config.dispatch.to_options().with_middleware(middleware);
    let backend = backend_for(config.runtime.backend, loader, dispatch);
    let controller = Arc::new(RequestHandlerController::new(Arc::new(client.clone()), backend));

    let builder_shutdown = Shutdown::new();
    let watcher = if watch {
        let watch_options = WatchOptions {
            bundle_path: config.build.bundle_path.clone(),
            watch_dir: config.build.watch_dir.clone(),
            command: config.build.command.clone(),
            debounce: config.build.debounce(),
        };
        match BundleWatcher::new(watch_options, Arc::clone(&coordinator)).spawn(builder_shutdown.subscribe()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                client.close().await;
                coordinator.disconnect_all().await;
                return Err(e.into());
            }
        }
    } else {
        None
    };

    tracing::info!(backend = %config.runtime.backend, watch, "Starting dev server");
    let server = match lifecycle::start(StartOptions { config, controller }).await {
        Ok(server) => server,
        Err(e) => {
            builder_shutdown.trigger();
            if let Some(watcher) = watcher {
                watcher.stopped().await;
            }
            client.close().await;
            coordinator.disconnect_all().await;
            return Err(e.into());
        }
    };

    Ok(DevServer {
        server,
        coordinator,
        client,
        watcher,
        builder_shutdown,
    })
}

impl DevServer {
    pub fn port(&self) -> u16 {
        self.server.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// The builder side, for publishing builds directly.
    pub fn coordinator(&self) -> &Arc<BuildCoordinator> {
        &self.coordinator
    }

    /// Stop the server and the builder, then close the channel.
    pub async fn stop(self) -> io::Result<()> {
        let DevServer {
            server,
            coordinator,
            client,
            watcher,
            builder_shutdown,
        } = self;

        builder_shutdown.trigger();
        let builder = async move {
            if let Some(watcher) = watcher {
                watcher.stopped().await;
            }
        };
        let (result, ()) = tokio::join!(server.stop(), builder);

        client.close().await;
        coordinator.disconnect_all().await;
        tracing::info!("Dev server stopped");
        result
    }
}
