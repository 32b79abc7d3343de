//! Route handler abstraction.

use std::any::Any;
use std::future::Future;

use futures_util::future::BoxFuture;

use crate::http::request::{Request, RequestContext};
use crate::http::response::Response;

/// Error type returned by handlers and middleware.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of running a handler.
pub type HandlerResult = Result<Response, BoxError>;

/// A function turning a request and its context into a response.
pub trait RouteHandler: Send + Sync + 'static {
    fn call(&self, req: Request, ctx: RequestContext) -> BoxFuture<'static, HandlerResult>;
}

/// Handler backed by an async closure. Build one with [`handler_fn`].
#[derive(Clone)]
pub struct FnHandler<F>(F);

/// Wrap an async closure as a [`RouteHandler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Request, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler(f)
}

impl<F, Fut> RouteHandler for FnHandler<F>
where
    F: Fn(Request, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, req: Request, ctx: RequestContext) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.0)(req, ctx))
    }
}

/// A panic caught while running bundle code.
#[derive(Debug, thiserror::Error)]
#[error("handler panicked: {message}")]
pub struct PanicError {
    pub message: String,
}

impl PanicError {
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}
