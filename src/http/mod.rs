//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, body buffering)
//!     → request.rs (immutable Request + mutable RequestContext)
//!     → controller → bundle → middleware/ (onion chain) → handler.rs
//!     → response.rs (buffered Response, fixed error bodies)
//!     → Send to client
//! ```

pub mod handler;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use handler::{handler_fn, BoxError, HandlerResult, RouteHandler};
pub use middleware::{from_fn, with_logger, Logger, Middleware, MiddlewareStack, Next};
pub use request::{Request, RequestContext, ResponseDefaults, X_REQUEST_ID};
pub use response::Response;
pub use server::HttpServer;
