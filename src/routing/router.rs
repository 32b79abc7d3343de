//! Route table and request dispatch.
//!
//! # Responsibilities
//! - Store the route map and its matcher
//! - Strip mounting prefixes (explicit or derived from parent parameters)
//! - Resolve the route and run the middleware chain around its handler
//!
//! # Design Decisions
//! - Immutable after construction (shared via `Arc`, no locks)
//! - Option conflicts are reported before any routing work happens
//! - Unmatched paths go through the same middleware chain as matched ones

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::http::handler::{handler_fn, BoxError, HandlerResult, RouteHandler};
use crate::http::middleware::MiddlewareStack;
use crate::http::request::{Request, RequestContext};
use crate::http::response::{self, Response};
use crate::routing::matcher::{PatternError, PatternMatcher, RouteMatch, RouteMatcher};

/// Misuse of the dispatch options. Never turned into an HTTP response by the
/// dispatcher itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("automatically_remove_pathname_prefix and remove_pathname_prefix cannot both be specified")]
    ConflictingPrefixOptions,
    #[error("no wildcard route parameters found")]
    NoWildcardParameter,
    #[error("only one wildcard route parameter is supported")]
    MultipleWildcardParameters,
}

/// Error returned by [`RouteBundle::make_request`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("route handler failed: {0}")]
    Handler(BoxError),
}

impl DispatchError {
    /// Flatten into the handler error type, unwrapping handler failures.
    pub fn into_handler_error(self) -> BoxError {
        match self {
            DispatchError::Handler(error) => error,
            other => Box::new(other),
        }
    }
}

/// Options for a single dispatch.
#[derive(Debug, Clone)]
pub struct MakeRequestOptions {
    /// Literal prefix to strip. Requires `automatically_remove_pathname_prefix = false`.
    pub remove_pathname_prefix: Option<String>,
    /// Derive the effective pathname from the parent route's wildcard parameter.
    pub automatically_remove_pathname_prefix: bool,
    pub middleware: MiddlewareStack,
}

impl Default for MakeRequestOptions {
    fn default() -> Self {
        Self {
            remove_pathname_prefix: None,
            automatically_remove_pathname_prefix: true,
            middleware: MiddlewareStack::default(),
        }
    }
}

impl MakeRequestOptions {
    /// Literal prefix to strip. An empty prefix is ignored.
    pub fn remove_pathname_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.remove_pathname_prefix = Some(prefix.into());
        self
    }

    pub fn automatically_remove_pathname_prefix(mut self, enabled: bool) -> Self {
        self.automatically_remove_pathname_prefix = enabled;
        self
    }

    pub fn with_middleware(mut self, middleware: MiddlewareStack) -> Self {
        self.middleware = middleware;
        self
    }

    /// Compute the pathname this router should route on.
    pub fn effective_pathname(&self, req: &Request) -> Result<String, ConfigurationError> {
        let pathname = req.pathname();

        // An empty prefix is the same as none.
        if let Some(prefix) = self.remove_pathname_prefix.as_deref().filter(|p| !p.is_empty()) {
            if self.automatically_remove_pathname_prefix {
                return Err(ConfigurationError::ConflictingPrefixOptions);
            }
            let stripped = pathname.strip_prefix(prefix).unwrap_or(pathname);
            return Ok(if stripped.is_empty() {
                "/".to_string()
            } else {
                stripped.to_string()
            });
        }

        if self.automatically_remove_pathname_prefix {
            if let Some(parent) = req.mount_params() {
                let wildcards = parent.wildcards();
                let segments = match wildcards.as_slice() {
                    [] => return Err(ConfigurationError::NoWildcardParameter),
                    [(_, segments)] => segments,
                    _ => return Err(ConfigurationError::MultipleWildcardParameters),
                };
                return Ok(format!("/{}", segments.join("/")));
            }
        }

        Ok(pathname.to_string())
    }
}

/// A resolved application: route map, matcher and not-found handler.
pub struct RouteBundle {
    routes: HashMap<String, Arc<dyn RouteHandler>>,
    matcher: Arc<dyn RouteMatcher>,
    not_found: Arc<dyn RouteHandler>,
}

impl RouteBundle {
    pub fn builder() -> RouteBundleBuilder {
        RouteBundleBuilder::default()
    }

    pub fn route_ids(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Resolve a pathname to a route registered in this bundle.
    pub fn match_path(&self, pathname: &str) -> Option<RouteMatch> {
        self.matcher
            .match_path(pathname)
            .filter(|m| self.routes.contains_key(&m.route_id))
    }

    /// Dispatch a request: strip prefixes, route, and run the middleware chain.
    ///
    /// Returns exactly one response, or the error raised by a handler or middleware.
    pub async fn make_request(
        &self,
        req: Request,
        options: &MakeRequestOptions,
    ) -> Result<Response, DispatchError> {
        let pathname = options.effective_pathname(&req)?;

        let (ctx, endpoint) = match self.match_path(&pathname) {
            Some(RouteMatch { route_id, params }) => {
                let handler = Arc::clone(&self.routes[&route_id]);
                (RequestContext::new(Some(route_id), params), handler)
            }
            None => {
                tracing::debug!(path = %pathname, "No route matched");
                (RequestContext::default(), Arc::clone(&self.not_found))
            }
        };

        options
            .middleware
            .run(req, ctx, endpoint)
            .await
            .map_err(DispatchError::Handler)
    }

    /// Host this bundle under a wildcard route of a parent bundle.
    ///
    /// The returned handler forwards with the parent's route parameters
    /// attached, so automatic prefix removal sees the wildcard segments.
    pub fn mount(self: Arc<Self>, options: MakeRequestOptions) -> Arc<dyn RouteHandler> {
        let options = Arc::new(options);
        Arc::new(handler_fn(move |req: Request, ctx: RequestContext| {
            let bundle = Arc::clone(&self);
            let options = Arc::clone(&options);
            async move {
                let req = req.with_mount_params(ctx.route_params().clone());
                bundle
                    .make_request(req, &options)
                    .await
                    .map_err(DispatchError::into_handler_error)
            }
        }))
    }
}

impl fmt::Debug for RouteBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut routes: Vec<&str> = self.route_ids().collect();
        routes.sort_unstable();
        f.debug_struct("RouteBundle")
            .field("routes", &routes)
            .field("matcher", &self.matcher)
            .finish()
    }
}

/// Builder for [`RouteBundle`].
#[derive(Default)]
pub struct RouteBundleBuilder {
    routes: Vec<(String, Arc<dyn RouteHandler>)>,
    matcher: Option<Arc<dyn RouteMatcher>>,
    not_found: Option<Arc<dyn RouteHandler>>,
}

impl RouteBundleBuilder {
    /// Register an async closure under a route id such as `/users/[userId]`.
    pub fn route<F, Fut>(self, route_id: impl Into<String>, f: F) -> Self
    where
        F: Fn(Request, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.route_handler(route_id, Arc::new(handler_fn(f)))
    }

    pub fn route_handler(mut self, route_id: impl Into<String>, handler: Arc<dyn RouteHandler>) -> Self {
        self.routes.push((route_id.into(), handler));
        self
    }

    /// Replace the default `404 Not found` handler.
    pub fn not_found<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Request, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.not_found = Some(Arc::new(handler_fn(f)));
        self
    }

    pub fn not_found_handler(mut self, handler: Arc<dyn RouteHandler>) -> Self {
        self.not_found = Some(handler);
        self
    }

    /// Use a custom matcher instead of compiling the route ids.
    pub fn matcher(mut self, matcher: Arc<dyn RouteMatcher>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn build(self) -> Result<RouteBundle, PatternError> {
        let matcher = match self.matcher {
            Some(matcher) => matcher,
            None => Arc::new(PatternMatcher::new(self.routes.iter().map(|(id, _)| id))?),
        };

        let mut routes = HashMap::with_capacity(self.routes.len());
        for (id, handler) in self.routes {
            if routes.insert(id.clone(), handler).is_some() {
                return Err(PatternError::DuplicateRoute(id));
            }
        }

        let not_found = self
            .not_found
            .unwrap_or_else(|| Arc::new(handler_fn(|_req, _ctx| async { Ok(response::not_found()) })));

        Ok(RouteBundle {
            routes,
            matcher,
            not_found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::middleware::{from_fn, Next};
    use crate::routing::params::{RouteParam, RouteParams};
    use axum::body::Bytes;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn get(uri: &str) -> Request {
        Request::from(axum::http::Request::get(uri).body(Bytes::new()).unwrap())
    }

    fn echo_path(_req: Request, ctx: RequestContext) -> impl Future<Output = HandlerResult> {
        async move {
            let id = ctx.route_id().unwrap_or("none").to_string();
            Ok(ctx.respond(id))
        }
    }

    fn bundle() -> RouteBundle {
        RouteBundle::builder()
            .route("/health", |_req, ctx: RequestContext| async move { Ok(ctx.respond("ok")) })
            .route("/a/b/health", echo_path)
            .route("/users/[userId]", |_req, ctx: RequestContext| async move {
                let id = ctx.param("userId").and_then(RouteParam::as_str).unwrap_or_default().to_string();
                Ok(response::json(StatusCode::OK, &serde_json::json!({ "userId": id }))?)
            })
            .build()
            .unwrap()
    }

    async fn body_of(response: Response) -> String {
        String::from_utf8(response.into_body().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_routes_simple_request() {
        let response = bundle()
            .make_request(get("https://example.com/health"), &MakeRequestOptions::default())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "ok");
    }

    #[tokio::test]
    async fn test_route_params_reach_handler() {
        let response = bundle()
            .make_request(get("/users/42"), &MakeRequestOptions::default())
            .await
            .unwrap();
        assert_eq!(body_of(response).await, r#"{"userId":"42"}"#);
    }

    #[tokio::test]
    async fn test_explicit_prefix_removal() {
        let options = MakeRequestOptions::default()
            .automatically_remove_pathname_prefix(false)
            .remove_pathname_prefix("/a/sample/module/sub/path");

        let response = bundle()
            .make_request(get("https://example.com/a/sample/module/sub/path/health"), &options)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "ok");
    }

    #[tokio::test]
    async fn test_conflicting_prefix_options_fail_before_routing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let bundle = RouteBundle::builder()
            .route("/x", move |_req, ctx: RequestContext| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(ctx.respond("x")) }
            })
            .build()
            .unwrap();

        let options = MakeRequestOptions::default().remove_pathname_prefix("/x");
        let err = bundle.make_request(get("/x/x"), &options).await.unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Configuration(ConfigurationError::ConflictingPrefixOptions)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_prefix_is_ignored() {
        let options = MakeRequestOptions::default().remove_pathname_prefix("");
        let response = bundle().make_request(get("/health"), &options).await.unwrap();
        assert_eq!(body_of(response).await, "ok");
    }

    #[tokio::test]
    async fn test_automatic_prefix_from_parent_wildcard() {
        let parent = RouteParams::new().with(
            "path",
            vec!["a".to_string(), "b".to_string(), "health".to_string()],
        );
        let req = get("/ignored/a/b/health").with_mount_params(parent);

        let response = bundle()
            .make_request(req, &MakeRequestOptions::default())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "/a/b/health");
    }

    #[tokio::test]
    async fn test_parent_without_wildcard_is_rejected() {
        let req = get("/x").with_mount_params(RouteParams::new().with("id", "1"));
        let err = bundle()
            .make_request(req, &MakeRequestOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no wildcard route parameters found");
    }

    #[tokio::test]
    async fn test_parent_with_two_wildcards_is_rejected() {
        let parent = RouteParams::new()
            .with("one", vec!["a".to_string()])
            .with("two", vec!["b".to_string()]);
        let err = bundle()
            .make_request(get("/x").with_mount_params(parent), &MakeRequestOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "only one wildcard route parameter is supported");
    }

    #[tokio::test]
    async fn test_default_not_found() {
        let response = bundle()
            .make_request(get("/missing"), &MakeRequestOptions::default())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(response).await, "Not found");
    }

    #[tokio::test]
    async fn test_custom_not_found_is_returned_verbatim() {
        let bundle = RouteBundle::builder()
            .not_found(|req: Request, _ctx| async move {
                Ok(response::text(StatusCode::IM_A_TEAPOT, format!("no {}", req.pathname())))
            })
            .build()
            .unwrap();

        let response = bundle
            .make_request(get("/tea"), &MakeRequestOptions::default())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(body_of(response).await, "no /tea");
    }

    #[tokio::test]
    async fn test_middleware_wraps_not_found() {
        let options = MakeRequestOptions::default().with_middleware(MiddlewareStack::new().push(
            from_fn(|req, ctx, next: Next| async move {
                let mut response = next.run(req, ctx).await?;
                response
                    .headers_mut()
                    .insert("x-wrapped", axum::http::HeaderValue::from_static("1"));
                Ok(response)
            }),
        ));

        let response = bundle().make_request(get("/missing"), &options).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-wrapped"], "1");
    }

    #[tokio::test]
    async fn test_mounted_bundle_sees_stripped_path() {
        let child = Arc::new(bundle());
        let parent = RouteBundle::builder()
            .route_handler("/svc/[...path]", child.mount(MakeRequestOptions::default()))
            .build()
            .unwrap();

        let response = parent
            .make_request(get("/svc/users/9"), &MakeRequestOptions::default())
            .await
            .unwrap();
        assert_eq!(body_of(response).await, r#"{"userId":"9"}"#);
    }

    #[tokio::test]
    async fn test_handler_error_is_surfaced() {
        let bundle = RouteBundle::builder()
            .route("/boom", |_req, _ctx| async { Err::<Response, BoxError>("kaboom".into()) })
            .build()
            .unwrap();

        let err = bundle
            .make_request(get("/boom"), &MakeRequestOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.into_handler_error().to_string(), "kaboom");
    }
}
