//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use hotserve::build::BuildHooks;
use hotserve::config::DevServerConfig;
use hotserve::runtime::BackendKind;
use hotserve::{start_dev_server, DevServer, DevServerOptions};
use tempfile::TempDir;

/// A manifest with `/`, `/hello/[name]` and `/api/[...rest]`.
pub const BASIC_MANIFEST: &str = r#"{
    "routes": [
        { "route": "/", "body": "home" },
        { "route": "/hello/[name]", "body": "Hello, {{name}}!" },
        { "route": "/api/[...rest]", "json": { "rest": "{{rest}}" } }
    ]
}"#;

/// Write `contents` as the bundle file, replacing any previous build.
pub fn write_bundle(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
}

/// Temporary directory holding `bundle.json`.
pub fn bundle_dir(contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let bundle = dir.path().join("bundle.json");
    write_bundle(&bundle, contents);
    (dir, bundle)
}

/// Config bound to an ephemeral port, serving `bundle`.
pub fn test_config(bundle: &Path, backend: BackendKind) -> DevServerConfig {
    let mut config = DevServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.build.bundle_path = bundle.to_path_buf();
    config.build.wait_timeout_ms = 5_000;
    config.build.debounce_ms = 20;
    config.runtime.backend = backend;
    config
}

/// Start a dev server whose builds are published by the test, not by a watcher.
pub async fn start_manual(config: DevServerConfig) -> DevServer {
    start_dev_server(DevServerOptions::new(config).watch(false).hooks(BuildHooks::new()))
        .await
        .unwrap()
}

pub fn url(server: &DevServer, path: &str) -> String {
    format!("http://127.0.0.1:{}{}", server.port(), path)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// GET `path` and return status and body.
pub async fn get(server: &DevServer, path: &str) -> (u16, String) {
    let response = client().get(url(server, path)).send().await.unwrap();
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}

/// Poll until `path` returns `expected`, or panic after a few seconds.
pub async fn wait_for_body(server: &DevServer, path: &str, expected: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let (_, body) = get(server, path).await;
        if body == expected {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {expected:?}, last body {body:?}");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
