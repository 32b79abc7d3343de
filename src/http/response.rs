//! Response model and the fixed responses the server produces itself.
//!
//! # Design Decisions
//! - Bodies are buffered (`Bytes`); no streaming or multiplexing
//! - Error bodies are fixed strings; internal detail goes to the log only

use axum::body::{Body, Bytes};
use axum::http::{self, header, HeaderValue, StatusCode};
use serde::Serialize;

/// Response produced by handlers and middleware.
pub type Response = http::Response<Bytes>;

pub const NOT_FOUND_MESSAGE: &str = "Not found";
pub const BUILD_ERROR_MESSAGE: &str =
    "Could not build your app. Check your terminal for more information.";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
pub const BUILD_NOT_READY_MESSAGE: &str = "Build not ready";
pub const BUILDER_UNAVAILABLE_MESSAGE: &str = "Builder unavailable";
pub const PAYLOAD_TOO_LARGE_MESSAGE: &str = "Payload too large";

/// Plain-text response with the given status.
pub fn text(status: StatusCode, body: impl Into<Bytes>) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// JSON response with the given status.
pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Response, serde_json::Error> {
    let body = serde_json::to_vec(value)?;
    let mut response = Response::new(Bytes::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

pub fn not_found() -> Response {
    text(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE)
}

pub fn build_failure() -> Response {
    text(StatusCode::INTERNAL_SERVER_ERROR, BUILD_ERROR_MESSAGE)
}

pub fn internal_error() -> Response {
    text(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
}

pub fn build_not_ready() -> Response {
    text(StatusCode::SERVICE_UNAVAILABLE, BUILD_NOT_READY_MESSAGE)
}

pub fn builder_unavailable() -> Response {
    text(StatusCode::SERVICE_UNAVAILABLE, BUILDER_UNAVAILABLE_MESSAGE)
}

pub fn payload_too_large() -> Response {
    text(StatusCode::PAYLOAD_TOO_LARGE, PAYLOAD_TOO_LARGE_MESSAGE)
}

/// Hand a response back to axum.
pub fn into_axum(response: Response) -> axum::response::Response {
    let (parts, body) = response.into_parts();
    axum::response::Response::from_parts(parts, Body::from(body))
}
