//! Builder-side coordination.
//!
//! # Responsibilities
//! - Serialize builds (one at a time)
//! - Stamp each result with a strictly increasing `built_at_ms`
//! - Answer `waitForAvailableBuild` once the first build has finished
//! - Notify connected servers when builds start and end

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::watch;

use super::client::{BuildSource, BuildWaitError};
use super::result::BuildResult;
use super::{BuildError, BUILD_END, BUILD_START, WAIT_FOR_AVAILABLE_BUILD};
use crate::observability::metrics;
use crate::rpc::{Channel, RemoteError, RpcMethods, RpcPeer};

/// Authoritative source of the latest build.
pub struct BuildCoordinator {
    latest: watch::Sender<Option<BuildResult>>,
    /// Held for the whole build; stores the last issued timestamp.
    build_lock: tokio::sync::Mutex<u64>,
    servers: Mutex<Vec<RpcPeer>>,
}

impl BuildCoordinator {
    pub fn new() -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            latest,
            build_lock: tokio::sync::Mutex::new(0),
            servers: Mutex::new(Vec::new()),
        }
    }

    /// Run one build. Concurrent callers queue up behind each other.
    pub async fn run_build<F, Fut>(&self, build: F) -> BuildResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PathBuf, BuildError>>,
    {
        let mut last = self.build_lock.lock().await;
        self.broadcast(BUILD_START, ());
        tracing::info!("Build started");

        let outcome = build().await;
        let built_at_ms = next_timestamp(*last);
        *last = built_at_ms;

        let result = match outcome {
            Ok(bundle_path) => {
                tracing::info!(built_at_ms, bundle = %bundle_path.display(), "Build succeeded");
                BuildResult::Success {
                    bundle_path,
                    built_at_ms,
                }
            }
            Err(e) => {
                tracing::error!(built_at_ms, error = %e, "Build failed");
                BuildResult::Failure { built_at_ms }
            }
        };

        metrics::record_build(result.kind());
        self.latest.send_replace(Some(result.clone()));
        self.broadcast(BUILD_END, &result);
        result
    }

    /// Publish an already built bundle as a new generation.
    pub async fn publish(&self, bundle_path: impl Into<PathBuf>) -> BuildResult {
        let bundle_path = bundle_path.into();
        self.run_build(|| async move { Ok(bundle_path) }).await
    }

    /// Record a failed build attempt.
    pub async fn publish_failure(&self, error: BuildError) -> BuildResult {
        self.run_build(|| async move { Err::<PathBuf, _>(error) }).await
    }

    pub fn latest(&self) -> Option<BuildResult> {
        self.latest.borrow().clone()
    }

    /// Wait until at least one build attempt has completed, then return the latest.
    pub async fn wait_for_available_build(&self) -> BuildResult {
        let mut rx = self.latest.subscribe();
        loop {
            if let Some(build) = rx.borrow_and_update().clone() {
                return build;
            }
            // The sender lives in `self`, so this never reports closure while we are borrowed.
            if rx.changed().await.is_err() {
                continue;
            }
        }
    }

    /// Serve the build RPC on `channel` and register the peer for build notifications.
    pub fn serve(self: &Arc<Self>, channel: Channel) -> RpcPeer {
        let coordinator = Arc::clone(self);
        let methods = RpcMethods::new().register(WAIT_FOR_AVAILABLE_BUILD, move |_: ()| {
            let coordinator = Arc::clone(&coordinator);
            async move { Ok::<_, RemoteError>(coordinator.wait_for_available_build().await) }
        });

        let peer = RpcPeer::spawn("builder", channel, methods);
        self.servers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(peer.clone());
        peer
    }

    /// Close every served channel endpoint.
    pub async fn disconnect_all(&self) {
        let servers: Vec<RpcPeer> = self
            .servers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for peer in servers {
            peer.close().await;
        }
    }

    fn broadcast<P: serde::Serialize>(&self, method: &str, params: P) {
        let params = match serde_json::to_value(params) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!(method, error = %e, "Failed to encode build notification");
                return;
            }
        };
        let mut servers = self.servers.lock().unwrap_or_else(PoisonError::into_inner);
        servers.retain(|peer| !peer.is_closed());
        for peer in servers.iter() {
            if let Err(e) = peer.notify(method, &params) {
                tracing::debug!(method, error = %e, "Build notification not delivered");
            }
        }
    }
}

impl Default for BuildCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuildSource for BuildCoordinator {
    async fn wait_for_available_build(&self) -> Result<BuildResult, BuildWaitError> {
        Ok(BuildCoordinator::wait_for_available_build(self).await)
    }
}

fn next_timestamp(last: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    now.max(last + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_blocks_until_first_build() {
        let coordinator = Arc::new(BuildCoordinator::new());

        let waiter = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.wait_for_available_build().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        let published = coordinator.publish("/tmp/bundle.json").await;
        let seen = waiter.await.unwrap();
        assert_eq!(seen, published);
    }

    #[tokio::test]
    async fn test_failure_is_a_valid_build() {
        let coordinator = BuildCoordinator::new();
        let result = coordinator
            .publish_failure(BuildError::MissingBundle("/nope".into()))
            .await;

        assert!(!result.is_success());
        assert_eq!(coordinator.wait_for_available_build().await, result);
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let coordinator = BuildCoordinator::new();
        let mut previous = 0;
        for _ in 0..20 {
            let built_at = coordinator.publish("/tmp/b.json").await.built_at_ms();
            assert!(built_at > previous);
            previous = built_at;
        }
    }

    #[tokio::test]
    async fn test_builds_are_serialized() {
        let coordinator = Arc::new(BuildCoordinator::new());
        let running = Arc::new(AtomicBool::new(false));

        let builds = (0..4).map(|i| {
            let coordinator = coordinator.clone();
            let running = running.clone();
            tokio::spawn(async move {
                coordinator
                    .run_build(|| async move {
                        assert!(!running.swap(true, Ordering::SeqCst), "builds overlapped");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        running.store(false, Ordering::SeqCst);
                        Ok(PathBuf::from(format!("/tmp/{i}.json")))
                    })
                    .await
            })
        });

        let mut stamps: Vec<u64> = Vec::new();
        for build in builds.collect::<Vec<_>>() {
            stamps.push(build.await.unwrap().built_at_ms());
        }
        stamps.sort_unstable();
        stamps.dedup();
        assert_eq!(stamps.len(), 4);
    }

    #[tokio::test]
    async fn test_serves_build_over_rpc() {
        let coordinator = Arc::new(BuildCoordinator::new());
        let (server_end, builder_end) = Channel::loopback();
        let _builder = coordinator.serve(builder_end);
        let client = RpcPeer::spawn("server", server_end, RpcMethods::new());

        let published = coordinator.publish("/tmp/bundle.json").await;
        let seen: BuildResult = client.call(WAIT_FOR_AVAILABLE_BUILD, ()).await.unwrap();
        assert_eq!(seen, published);

        coordinator.disconnect_all().await;
    }

    #[tokio::test]
    async fn test_disconnect_releases_abandoned_waits() {
        let coordinator = Arc::new(BuildCoordinator::new());
        let (server_end, builder_end) = Channel::loopback();
        let _builder = coordinator.serve(builder_end);
        let client = RpcPeer::spawn("server", server_end, RpcMethods::new());

        for _ in 0..3 {
            let call = client.call::<_, BuildResult>(WAIT_FOR_AVAILABLE_BUILD, ());
            assert!(tokio::time::timeout(Duration::from_millis(20), call).await.is_err());
        }
        assert!(Arc::strong_count(&coordinator) > 1);

        coordinator.disconnect_all().await;
        client.close().await;
        tokio::time::timeout(Duration::from_secs(1), async {
            while Arc::strong_count(&coordinator) > 1 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
