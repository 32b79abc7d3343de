//! Logger injection middleware.

use std::fmt::Display;

use tracing::{Instrument, Span};

use super::{from_fn, Middleware, Next};
use crate::http::request::{Request, RequestContext};

/// Application-facing logger stored in the request context.
///
/// Events are emitted through `tracing` inside the logger's span, so they land
/// in the same subscriber as the server's own logs.
#[derive(Debug, Clone)]
pub struct Logger {
    span: Span,
}

impl Logger {
    pub fn new(name: &str) -> Self {
        Self {
            span: tracing::info_span!("app", logger = %name),
        }
    }

    pub fn from_span(span: Span) -> Self {
        Self { span }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn debug(&self, message: impl Display) {
        self.span.in_scope(|| tracing::debug!("{message}"));
    }

    pub fn info(&self, message: impl Display) {
        self.span.in_scope(|| tracing::info!("{message}"));
    }

    pub fn warn(&self, message: impl Display) {
        self.span.in_scope(|| tracing::warn!("{message}"));
    }

    pub fn error(&self, message: impl Display) {
        self.span.in_scope(|| tracing::error!("{message}"));
    }
}

/// Attaches `logger` to the request context and runs the rest of the chain in its span.
pub fn with_logger(logger: Logger) -> impl Middleware {
    from_fn(move |req: Request, mut ctx: RequestContext, next: Next| {
        ctx.insert(logger.clone());
        next.run(req, ctx).instrument(logger.span().clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler::{handler_fn, RouteHandler};
    use crate::http::middleware::MiddlewareStack;
    use axum::body::Bytes;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_logger_is_available_to_handler() {
        let stack = MiddlewareStack::new().push(with_logger(Logger::new("test")));
        let endpoint: Arc<dyn RouteHandler> = Arc::new(handler_fn(|_req, ctx: RequestContext| async move {
            let logger = ctx.logger().cloned();
            if let Some(logger) = &logger {
                logger.info("handling request");
            }
            Ok(ctx.respond(if logger.is_some() { "logged" } else { "missing" }))
        }));

        let req = Request::from(axum::http::Request::get("/").body(Bytes::new()).unwrap());
        let response = stack.run(req, RequestContext::default(), endpoint).await.unwrap();
        assert_eq!(response.body().as_ref(), b"logged");
    }
}
