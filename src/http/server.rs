//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router; every path goes to the bundle
//! - Wire up middleware (tracing, timeout, request ID)
//! - Buffer the request body and translate to the internal request model
//! - Obtain the current handler from the controller and invoke it
//! - Turn every error or panic into a fixed response

use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::HeaderName;
use axum::Router;
use futures_util::FutureExt;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::build::BuildWaitError;
use crate::config::DevServerConfig;
use crate::dev::controller::{ControllerError, RequestHandlerController};
use crate::http::handler::PanicError;
use crate::http::request::{Request, X_REQUEST_ID};
use crate::http::response::{self, Response};
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<RequestHandlerController>,
    pub max_body_bytes: usize,
}

/// HTTP front door of the dev server.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &DevServerConfig, controller: Arc<RequestHandlerController>) -> Self {
        let state = AppState {
            controller,
            max_body_bytes: config.limits.max_body_bytes,
        };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &DevServerConfig, state: AppState) -> Router {
        let x_request_id = HeaderName::from_static(X_REQUEST_ID);
        Router::new()
            .fallback(serve_bundle)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn serve_bundle(State(state): State<AppState>, request: axum::extract::Request) -> axum::response::Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let (parts, body) = request.into_parts();

    let response = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(body) => dispatch(&state.controller, Request::from_parts(parts, body)).await,
        Err(e) => {
            tracing::warn!(error = %e, limit = state.max_body_bytes, "Rejected request body");
            response::payload_too_large()
        }
    };

    metrics::record_request(&method, response.status().as_u16(), start);
    response::into_axum(response)
}

/// Serve one request against the latest build. Never fails.
pub async fn dispatch(controller: &RequestHandlerController, req: Request) -> Response {
    let request_id = req.request_id().unwrap_or("unknown").to_string();
    tracing::debug!(request_id = %request_id, method = %req.method(), path = %req.pathname(), "Serving request");

    let artifact = match controller.handler().await {
        Ok(artifact) => artifact,
        Err(ControllerError::BuildWait(BuildWaitError::Timeout(waited))) => {
            tracing::warn!(request_id = %request_id, ?waited, "No build available yet");
            return response::build_not_ready();
        }
        Err(e @ (ControllerError::BuildWait(_) | ControllerError::Disposed)) => {
            tracing::error!(request_id = %request_id, error = %e, "Cannot reach builder");
            return response::builder_unavailable();
        }
        Err(e @ ControllerError::Load { .. }) => {
            log_unhandled(&request_id, &e);
            return response::internal_error();
        }
    };

    match AssertUnwindSafe(artifact.invoke(req)).catch_unwind().await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            log_unhandled(&request_id, e.as_ref());
            response::internal_error()
        }
        Err(payload) => {
            log_unhandled(&request_id, &PanicError::from_payload(payload));
            response::internal_error()
        }
    }
}

fn log_unhandled(request_id: &str, error: &(dyn std::error::Error + 'static)) {
    tracing::error!(
        request_id = %request_id,
        error = %error,
        detail = ?error,
        "Unhandled error while serving request"
    );
}
