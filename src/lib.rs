//! Development server that serves a continuously rebuilt application bundle.

// Core subsystems
pub mod build;
pub mod config;
pub mod dev;
pub mod http;
pub mod routing;
pub mod rpc;
pub mod runtime;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::DevServerConfig;
pub use dev::{start_dev_server, DevServer, DevServerOptions};
pub use http::HttpServer;
pub use lifecycle::{serve_bundle, Shutdown};
pub use routing::{MakeRequestOptions, RouteBundle};
