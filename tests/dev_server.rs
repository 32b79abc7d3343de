//! End-to-end tests: builder, channel, controller and HTTP server together.

use std::time::Duration;

use axum::http::HeaderValue;
use hotserve::build::{BuildError, BuildHooks};
use hotserve::http::middleware::{from_fn, MiddlewareStack, Next};
use hotserve::http::request::{Request, RequestContext};
use hotserve::http::handler::HandlerResult;
use hotserve::http::response::{BUILD_ERROR_MESSAGE, BUILD_NOT_READY_MESSAGE};
use hotserve::routing::RouteBundle;
use hotserve::runtime::{BackendKind, BundleArtifact, FnLoader};
use hotserve::{start_dev_server, DevServerOptions};

mod common;

#[tokio::test]
async fn test_serves_manifest_routes() {
    let (_dir, bundle) = common::bundle_dir(common::BASIC_MANIFEST);
    let server = common::start_manual(common::test_config(&bundle, BackendKind::Direct)).await;
    server.coordinator().publish(&bundle).await;

    assert_eq!(common::get(&server, "/").await, (200, "home".to_string()));
    assert_eq!(common::get(&server, "/hello/ada").await, (200, "Hello, ada!".to_string()));
    assert_eq!(common::get(&server, "/api/a/b/c").await, (200, r#"{"rest":"a/b/c"}"#.to_string()));
    assert_eq!(common::get(&server, "/nope").await, (404, "Not found".to_string()));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_sandbox_backend_serves_the_same_bundle() {
    let (_dir, bundle) = common::bundle_dir(common::BASIC_MANIFEST);
    let server = common::start_manual(common::test_config(&bundle, BackendKind::Sandbox)).await;
    server.coordinator().publish(&bundle).await;

    assert_eq!(common::get(&server, "/hello/grace").await, (200, "Hello, grace!".to_string()));
    assert_eq!(common::get(&server, "/missing").await, (404, "Not found".to_string()));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_rebuild_of_same_path_serves_new_contents() {
    let (_dir, bundle) = common::bundle_dir(r#"{ "routes": [{ "route": "/", "body": "v1" }] }"#);
    let server = common::start_manual(common::test_config(&bundle, BackendKind::Direct)).await;

    server.coordinator().publish(&bundle).await;
    assert_eq!(common::get(&server, "/").await.1, "v1");

    common::write_bundle(&bundle, r#"{ "routes": [{ "route": "/", "body": "v2" }] }"#);
    // Unchanged generation: the cached handler keeps serving v1.
    assert_eq!(common::get(&server, "/").await.1, "v1");

    server.coordinator().publish(&bundle).await;
    assert_eq!(common::get(&server, "/").await.1, "v2");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_build_failure_then_recovery() {
    let (_dir, bundle) = common::bundle_dir(common::BASIC_MANIFEST);
    let server = common::start_manual(common::test_config(&bundle, BackendKind::Direct)).await;

    server
        .coordinator()
        .publish_failure(BuildError::MissingBundle(bundle.clone()))
        .await;
    for path in ["/", "/hello/x", "/does/not/exist"] {
        assert_eq!(common::get(&server, path).await, (500, BUILD_ERROR_MESSAGE.to_string()));
    }

    server.coordinator().publish(&bundle).await;
    assert_eq!(common::get(&server, "/").await, (200, "home".to_string()));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_no_build_within_wait_timeout() {
    let (_dir, bundle) = common::bundle_dir(common::BASIC_MANIFEST);
    let mut config = common::test_config(&bundle, BackendKind::Direct);
    config.build.wait_timeout_ms = 100;
    let server = common::start_manual(config).await;

    assert_eq!(common::get(&server, "/").await, (503, BUILD_NOT_READY_MESSAGE.to_string()));

    server.coordinator().publish(&bundle).await;
    assert_eq!(common::get(&server, "/").await, (200, "home".to_string()));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_unloadable_bundle_is_internal_error_until_fixed() {
    let (_dir, bundle) = common::bundle_dir("this is not json");
    let server = common::start_manual(common::test_config(&bundle, BackendKind::Direct)).await;

    server.coordinator().publish(&bundle).await;
    assert_eq!(common::get(&server, "/").await, (500, "Internal server error".to_string()));

    common::write_bundle(&bundle, common::BASIC_MANIFEST);
    server.coordinator().publish(&bundle).await;
    assert_eq!(common::get(&server, "/").await, (200, "home".to_string()));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_custom_not_found_and_explicit_prefix() {
    let (_dir, bundle) = common::bundle_dir(
        r#"{
            "routes": [{ "route": "/", "body": "root" }],
            "not_found": { "status": 404, "body": "no such page" }
        }"#,
    );
    let mut config = common::test_config(&bundle, BackendKind::Direct);
    config.dispatch.remove_pathname_prefix = Some("/app".to_string());
    config.dispatch.automatically_remove_pathname_prefix = false;
    let server = common::start_manual(config).await;
    server.coordinator().publish(&bundle).await;

    assert_eq!(common::get(&server, "/app").await, (200, "root".to_string()));
    assert_eq!(common::get(&server, "/app/").await, (200, "root".to_string()));
    assert_eq!(common::get(&server, "/app/missing").await, (404, "no such page".to_string()));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_injected_middleware_wraps_every_response() {
    let (_dir, bundle) = common::bundle_dir(common::BASIC_MANIFEST);
    let middleware = MiddlewareStack::new().push(from_fn(|req: Request, ctx: RequestContext, next: Next| async move {
        let mut response = next.run(req, ctx).await?;
        response
            .headers_mut()
            .insert("x-served-by", HeaderValue::from_static("hotserve"));
        Ok(response)
    }));
    let options = DevServerOptions::new(common::test_config(&bundle, BackendKind::Direct))
        .watch(false)
        .hooks(BuildHooks::new())
        .middleware(middleware);
    let server = start_dev_server(options).await.unwrap();
    server.coordinator().publish(&bundle).await;

    for path in ["/", "/missing"] {
        let response = common::client().get(common::url(&server, path)).send().await.unwrap();
        assert_eq!(response.headers()["x-served-by"], "hotserve");
        assert!(response.headers().contains_key("x-request-id"));
    }

    server.stop().await.unwrap();
}

async fn explode(_req: Request, _ctx: RequestContext) -> HandlerResult {
    panic!("route exploded")
}

#[tokio::test]
async fn test_panicking_route_does_not_take_the_server_down() {
    let (_dir, bundle) = common::bundle_dir("{}");
    let loader = FnLoader::new(|_: &BundleArtifact| {
        Ok(RouteBundle::builder()
            .route("/ok", |_req, ctx: RequestContext| async move { Ok(ctx.respond("fine")) })
            .route("/panic", explode)
            .build()?)
    });

    for backend in [BackendKind::Direct, BackendKind::Sandbox] {
        let options = DevServerOptions::new(common::test_config(&bundle, backend))
            .watch(false)
            .hooks(BuildHooks::new())
            .loader(loader.clone());
        let server = start_dev_server(options).await.unwrap();
        server.coordinator().publish(&bundle).await;

        assert_eq!(common::get(&server, "/panic").await, (500, "Internal server error".to_string()));
        assert_eq!(common::get(&server, "/ok").await, (200, "fine".to_string()));

        server.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_watcher_publishes_initial_build_and_changes() {
    let (_dir, bundle) = common::bundle_dir(r#"{ "routes": [{ "route": "/", "body": "first" }] }"#);
    let options = DevServerOptions::new(common::test_config(&bundle, BackendKind::Direct)).hooks(BuildHooks::new());
    let server = start_dev_server(options).await.unwrap();

    assert_eq!(common::get(&server, "/").await, (200, "first".to_string()));

    // Filesystems with coarse timestamps may coalesce quick writes.
    tokio::time::sleep(Duration::from_millis(100)).await;
    common::write_bundle(&bundle, r#"{ "routes": [{ "route": "/", "body": "second" }] }"#);
    common::wait_for_body(&server, "/", "second").await;

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_closes_the_listener() {
    let (_dir, bundle) = common::bundle_dir(common::BASIC_MANIFEST);
    let server = common::start_manual(common::test_config(&bundle, BackendKind::Direct)).await;
    server.coordinator().publish(&bundle).await;
    let url = common::url(&server, "/");
    let coordinator = server.coordinator().clone();

    server.stop().await.unwrap();

    assert!(common::client().get(&url).send().await.is_err());
    // The builder side outlives the server but has no one left to notify.
    assert!(coordinator.latest().is_some());
}
