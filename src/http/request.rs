//! Request model shared by the front door, the dispatcher and bundles.
//!
//! # Responsibilities
//! - Immutable request value (method, URI, headers, buffered body)
//! - Parent route parameters when a bundle is mounted under another one
//! - Mutable per-request context threaded through the middleware chain
//!
//! # Design Decisions
//! - Handlers never mutate the request; cross-cutting values go into
//!   [`RequestContext`] instead
//! - Host-side values (e.g. sandbox deferred work) ride in request extensions
//!   set before dispatch and are read-only afterwards

use axum::body::Bytes;
use axum::http::{self, Extensions, HeaderMap, Method, StatusCode, Uri};

use crate::http::middleware::Logger;
use crate::http::response::Response;
use crate::routing::params::{RouteParam, RouteParams};

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// An inbound request, buffered and immutable.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    mount_params: Option<RouteParams>,
    extensions: Extensions,
}

impl Request {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
            mount_params: None,
            extensions: Extensions::new(),
        }
    }

    /// Build a request from transport-level parts and an already buffered body.
    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        Self::new(parts.method, parts.uri, parts.headers, body)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn pathname(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn request_id(&self) -> Option<&str> {
        self.headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok())
    }

    /// Route parameters of the parent route hosting this bundle, if mounted.
    pub fn mount_params(&self) -> Option<&RouteParams> {
        self.mount_params.as_ref()
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Returns a copy of this request as seen by a bundle mounted under a parent route.
    pub fn with_mount_params(mut self, params: RouteParams) -> Self {
        self.mount_params = Some(params);
        self
    }

    /// Attach a host-provided value before dispatch.
    pub fn with_extension<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self::from_parts(parts, body)
    }
}

/// Status and headers every response starts from unless a handler overrides them.
#[derive(Debug, Clone)]
pub struct ResponseDefaults {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl Default for ResponseDefaults {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }
}

/// Mutable record threaded through the middleware chain alongside the request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    route_id: Option<String>,
    route_params: RouteParams,
    response_defaults: ResponseDefaults,
    extensions: Extensions,
}

impl RequestContext {
    pub fn new(route_id: Option<String>, route_params: RouteParams) -> Self {
        Self {
            route_id,
            route_params,
            ..Self::default()
        }
    }

    /// The matched route id, `None` when the not-found handler runs.
    pub fn route_id(&self) -> Option<&str> {
        self.route_id.as_deref()
    }

    pub fn route_params(&self) -> &RouteParams {
        &self.route_params
    }

    pub fn param(&self, name: &str) -> Option<&RouteParam> {
        self.route_params.get(name)
    }

    pub fn response_defaults(&self) -> &ResponseDefaults {
        &self.response_defaults
    }

    pub fn response_defaults_mut(&mut self) -> &mut ResponseDefaults {
        &mut self.response_defaults
    }

    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.extensions.insert(value)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    /// Logger injected by [`with_logger`](crate::http::middleware::with_logger).
    pub fn logger(&self) -> Option<&Logger> {
        self.get::<Logger>()
    }

    /// Build a response from the defaults scaffold.
    pub fn respond(&self, body: impl Into<Bytes>) -> Response {
        let mut response = Response::new(body.into());
        *response.status_mut() = self.response_defaults.status;
        for (name, value) in &self.response_defaults.headers {
            response.headers_mut().append(name.clone(), value.clone());
        }
        response
    }
}
