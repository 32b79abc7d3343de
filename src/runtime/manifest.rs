//! JSON route manifests.
//!
//! A manifest describes static responses per route:
//!
//! ```json
//! {
//!   "routes": [
//!     { "route": "/users/[id]", "body": "user {{id}}" },
//!     { "route": "/api/[...path]", "status": 200, "json": { "path": "{{path}}" } }
//!   ],
//!   "not_found": { "status": 404, "body": "nothing here" }
//! }
//! ```
//!
//! `{{name}}` placeholders are replaced by the bound route parameter.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::bundle::{BundleArtifact, BundleError, BundleLoader};
use crate::http::handler::{handler_fn, HandlerResult};
use crate::http::request::{Request, RequestContext};
use crate::http::response::Response;
use crate::routing::params::RouteParams;
use crate::routing::router::RouteBundle;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    routes: Vec<RouteEntry>,
    #[serde(default)]
    not_found: Option<StaticResponse>,
}

#[derive(Debug, Deserialize)]
struct RouteEntry {
    route: String,
    #[serde(flatten)]
    response: StaticResponse,
}

#[derive(Debug, Clone, Deserialize)]
struct StaticResponse {
    #[serde(default = "default_status")]
    status: u16,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    json: Option<Value>,
}

fn default_status() -> u16 {
    200
}

/// Compiled form of [`StaticResponse`], validated at load time.
#[derive(Debug)]
struct ResponseTemplate {
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Body,
}

#[derive(Debug)]
enum Body {
    Text(String),
    Json(Value),
}

impl ResponseTemplate {
    fn compile(response: StaticResponse) -> Result<Self, String> {
        let status = StatusCode::from_u16(response.status).map_err(|e| format!("status {}: {e}", response.status))?;

        let mut headers = Vec::with_capacity(response.headers.len());
        for (name, value) in response.headers {
            let name = HeaderName::try_from(name.as_str()).map_err(|e| format!("header {name}: {e}"))?;
            let value = HeaderValue::try_from(value.as_str()).map_err(|e| format!("header {name}: {e}"))?;
            headers.push((name, value));
        }

        let body = match (response.body, response.json) {
            (Some(_), Some(_)) => return Err("`body` and `json` are mutually exclusive".into()),
            (_, Some(json)) => Body::Json(json),
            (body, None) => Body::Text(body.unwrap_or_default()),
        };

        Ok(Self { status, headers, body })
    }

    fn render(&self, ctx: &RequestContext) -> HandlerResult {
        let params = ctx.route_params();
        let (content_type, body) = match &self.body {
            Body::Text(text) => ("text/plain; charset=utf-8", Bytes::from(substitute(text, params))),
            Body::Json(value) => (
                "application/json",
                Bytes::from(serde_json::to_vec(&substitute_json(value, params))?),
            ),
        };

        let mut response: Response = ctx.respond(body);
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
        Ok(response)
    }
}

fn substitute(template: &str, params: &RouteParams) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match params.get(name) {
                    Some(param) => out.push_str(&param.to_path_string()),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn substitute_json(value: &Value, params: &RouteParams) -> Value {
    match value {
        Value::String(s) => Value::String(substitute(s, params)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute_json(v, params)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_json(v, params)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Loads [`RouteBundle`]s from JSON manifests on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestLoader;

impl ManifestLoader {
    pub fn new() -> Self {
        Self
    }

    /// Parse a manifest that is already in memory.
    pub fn parse(&self, artifact: &BundleArtifact, contents: &[u8]) -> Result<RouteBundle, BundleError> {
        let manifest: Manifest = serde_json::from_slice(contents).map_err(|source| BundleError::Manifest {
            path: artifact.path.clone(),
            source,
        })?;

        let mut builder = RouteBundle::builder();
        for entry in manifest.routes {
            let template = ResponseTemplate::compile(entry.response)
                .map_err(|reason| BundleError::invalid(&artifact.path, format!("route {}: {reason}", entry.route)))?;
            let template = Arc::new(template);
            builder = builder.route(entry.route, move |_req: Request, ctx: RequestContext| {
                let template = Arc::clone(&template);
                async move { template.render(&ctx) }
            });
        }

        if let Some(not_found) = manifest.not_found {
            let template = ResponseTemplate::compile(not_found)
                .map_err(|reason| BundleError::invalid(&artifact.path, format!("not_found: {reason}")))?;
            let template = Arc::new(template);
            builder = builder.not_found_handler(Arc::new(handler_fn(move |_req: Request, ctx: RequestContext| {
                let template = Arc::clone(&template);
                async move { template.render(&ctx) }
            })));
        }

        Ok(builder.build()?)
    }
}

impl BundleLoader for ManifestLoader {
    fn load(&self, artifact: &BundleArtifact) -> Result<RouteBundle, BundleError> {
        let contents = std::fs::read(&artifact.path).map_err(|source| BundleError::Io {
            path: artifact.path.clone(),
            source,
        })?;
        tracing::debug!(
            path = %artifact.path.display(),
            generation = artifact.generation,
            bytes = contents.len(),
            "Loading bundle manifest"
        );
        self.parse(artifact, &contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::router::MakeRequestOptions;
    use axum::http::{Method, Uri};
    use axum::http::HeaderMap;

    fn artifact() -> BundleArtifact {
        BundleArtifact::new("/tmp/manifest.json", 1)
    }

    fn get(path: &str) -> Request {
        Request::new(Method::GET, path.parse::<Uri>().unwrap(), HeaderMap::new(), Bytes::new())
    }

    async fn send(bundle: &RouteBundle, path: &str) -> Response {
        bundle.make_request(get(path), &MakeRequestOptions::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_serves_templated_routes() {
        let manifest = br#"{
            "routes": [
                { "route": "/users/[id]", "body": "user {{ id }}", "headers": { "x-kind": "user" } },
                { "route": "/files/[...path]", "status": 201, "json": { "path": "{{path}}", "n": 1 } }
            ]
        }"#;
        let bundle = ManifestLoader::new().parse(&artifact(), manifest).unwrap();

        let r = send(&bundle, "/users/42").await;
        assert_eq!(r.status(), StatusCode::OK);
        assert_eq!(r.body().as_ref(), b"user 42");
        assert_eq!(r.headers()["x-kind"], "user");

        let r = send(&bundle, "/files/a/b.txt").await;
        assert_eq!(r.status(), StatusCode::CREATED);
        let body: Value = serde_json::from_slice(r.body()).unwrap();
        assert_eq!(body, serde_json::json!({ "path": "a/b.txt", "n": 1 }));
    }

    #[tokio::test]
    async fn test_custom_not_found() {
        let manifest = br#"{ "routes": [], "not_found": { "status": 404, "body": "nothing here" } }"#;
        let bundle = ManifestLoader::new().parse(&artifact(), manifest).unwrap();

        let r = send(&bundle, "/missing").await;
        assert_eq!(r.status(), StatusCode::NOT_FOUND);
        assert_eq!(r.body().as_ref(), b"nothing here");
    }

    #[test]
    fn test_rejects_invalid_manifests() {
        let loader = ManifestLoader::new();
        assert!(matches!(
            loader.parse(&artifact(), b"{ not json"),
            Err(BundleError::Manifest { .. })
        ));
        assert!(matches!(
            loader.parse(&artifact(), br#"{ "routes": [{ "route": "/", "status": 1000 }] }"#),
            Err(BundleError::Invalid { .. })
        ));
        assert!(matches!(
            loader.parse(&artifact(), br#"{ "routes": [{ "route": "no-slash" }] }"#),
            Err(BundleError::Pattern(_))
        ));
    }

    #[test]
    fn test_unknown_placeholders_are_kept() {
        let params = RouteParams::new().with("id", "7");
        assert_eq!(substitute("{{id}}-{{other}}-{{", &params), "7-{{other}}-{{");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ManifestLoader::new()
            .load(&BundleArtifact::new("/definitely/not/here.json", 1))
            .unwrap_err();
        assert!(matches!(err, BundleError::Io { .. }));
    }
}
