//! Onion-style middleware pipeline.
//!
//! # Data Flow
//! ```text
//! [A, B] around H:
//!     A enter → B enter → H → B exit → A exit
//! ```
//!
//! # Design Decisions
//! - The first middleware in the stack is the outermost one
//! - A middleware proceeds by calling [`Next::run`] or short-circuits by
//!   returning its own response
//! - The stack is shared (`Arc`) and cloned per request

mod logger;

pub use logger::{with_logger, Logger};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::http::handler::{HandlerResult, RouteHandler};
use crate::http::request::{Request, RequestContext};

/// A request/response transformer wrapped around a handler.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, ctx: RequestContext, next: Next)
        -> BoxFuture<'static, HandlerResult>;
}

/// Middleware backed by an async closure. Build one with [`from_fn`].
#[derive(Clone)]
pub struct FnMiddleware<F>(F);

/// Wrap an async closure as a [`Middleware`].
pub fn from_fn<F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(Request, RequestContext, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnMiddleware(f)
}

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Request, RequestContext, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(
        &self,
        req: Request,
        ctx: RequestContext,
        next: Next,
    ) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.0)(req, ctx, next))
    }
}

/// Ordered middleware list.
#[derive(Clone, Default)]
pub struct MiddlewareStack {
    layers: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware; it becomes the innermost layer so far.
    pub fn push(mut self, middleware: impl Middleware) -> Self {
        Arc::make_mut(&mut self.layers).push(Arc::new(middleware));
        self
    }

    pub fn push_arc(mut self, middleware: Arc<dyn Middleware>) -> Self {
        Arc::make_mut(&mut self.layers).push(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Run the stack around `endpoint`.
    pub fn run(
        &self,
        req: Request,
        ctx: RequestContext,
        endpoint: Arc<dyn RouteHandler>,
    ) -> BoxFuture<'static, HandlerResult> {
        Next {
            layers: Arc::clone(&self.layers),
            index: 0,
            endpoint,
        }
        .run(req, ctx)
    }
}

impl fmt::Debug for MiddlewareStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareStack")
            .field("len", &self.layers.len())
            .finish()
    }
}

impl<M: Middleware> FromIterator<M> for MiddlewareStack {
    fn from_iter<I: IntoIterator<Item = M>>(iter: I) -> Self {
        let layers: Vec<Arc<dyn Middleware>> = iter
            .into_iter()
            .map(|m| Arc::new(m) as Arc<dyn Middleware>)
            .collect();
        Self {
            layers: Arc::new(layers),
        }
    }
}

/// Continuation handed to each middleware.
pub struct Next {
    layers: Arc<Vec<Arc<dyn Middleware>>>,
    index: usize,
    endpoint: Arc<dyn RouteHandler>,
}

impl Next {
    /// Invoke the rest of the chain.
    pub fn run(self, req: Request, ctx: RequestContext) -> BoxFuture<'static, HandlerResult> {
        match self.layers.get(self.index).cloned() {
            Some(layer) => {
                let next = Next {
                    layers: self.layers,
                    index: self.index + 1,
                    endpoint: self.endpoint,
                };
                layer.handle(req, ctx, next)
            }
            None => self.endpoint.call(req, ctx),
        }
    }
}
