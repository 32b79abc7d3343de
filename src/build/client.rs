//! Server-side view of the build pipeline.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::result::BuildResult;
use super::{BUILD_END, BUILD_START, WAIT_FOR_AVAILABLE_BUILD};
use crate::rpc::{Channel, RpcError, RpcMethods, RpcPeer};

/// Anything that can answer "what is the latest build?".
#[async_trait]
pub trait BuildSource: Send + Sync + 'static {
    /// Block until at least one build has completed and return the latest.
    async fn wait_for_available_build(&self) -> Result<BuildResult, BuildWaitError>;
}

/// Why the latest build could not be obtained.
#[derive(Debug, thiserror::Error)]
pub enum BuildWaitError {
    #[error("no build became available within {0:?}")]
    Timeout(Duration),
    #[error("builder unavailable: {0}")]
    Unavailable(#[from] RpcError),
}

/// A build that never changes, for serving an already resolved bundle.
#[derive(Debug, Clone)]
pub struct FixedBuild(BuildResult);

impl FixedBuild {
    pub fn new(build: BuildResult) -> Self {
        Self(build)
    }
}

#[async_trait]
impl BuildSource for FixedBuild {
    async fn wait_for_available_build(&self) -> Result<BuildResult, BuildWaitError> {
        Ok(self.0.clone())
    }
}

type StartHook = Arc<dyn Fn() + Send + Sync>;
type EndHook = Arc<dyn Fn(&BuildResult) + Send + Sync>;

/// Callbacks fired on builder notifications.
#[derive(Clone, Default)]
pub struct BuildHooks {
    on_build_start: Option<StartHook>,
    on_build_end: Option<EndHook>,
}

impl BuildHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_build_start(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_build_start = Some(Arc::new(f));
        self
    }

    pub fn on_build_end(mut self, f: impl Fn(&BuildResult) + Send + Sync + 'static) -> Self {
        self.on_build_end = Some(Arc::new(f));
        self
    }

    /// Hooks that log build progress.
    pub fn logging() -> Self {
        Self::new()
            .on_build_start(|| tracing::info!("Rebuilding..."))
            .on_build_end(|build| match build {
                BuildResult::Success { built_at_ms, .. } => {
                    tracing::info!(generation = built_at_ms, "Build ready")
                }
                BuildResult::Failure { built_at_ms } => {
                    tracing::warn!(generation = built_at_ms, "Build failed, serving error page")
                }
            })
    }

    fn into_methods(self) -> RpcMethods {
        let mut methods = RpcMethods::new();
        if let Some(hook) = self.on_build_start {
            methods = methods.on_notification(BUILD_START, move |_: serde_json::Value| hook());
        }
        if let Some(hook) = self.on_build_end {
            methods = methods.on_notification(BUILD_END, move |build: BuildResult| hook(&build));
        }
        methods
    }
}

impl fmt::Debug for BuildHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildHooks")
            .field("on_build_start", &self.on_build_start.is_some())
            .field("on_build_end", &self.on_build_end.is_some())
            .finish()
    }
}

/// Calls `waitForAvailableBuild` on a remote builder.
#[derive(Debug, Clone)]
pub struct BuilderClient {
    peer: RpcPeer,
    wait_timeout: Duration,
}

impl BuilderClient {
    pub fn connect(channel: Channel, wait_timeout: Duration, hooks: BuildHooks) -> Self {
        let peer = RpcPeer::spawn("server", channel, hooks.into_methods());
        Self { peer, wait_timeout }
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    pub async fn close(&self) {
        self.peer.close().await;
    }
}

#[async_trait]
impl BuildSource for BuilderClient {
    async fn wait_for_available_build(&self) -> Result<BuildResult, BuildWaitError> {
        let call = self.peer.call::<_, BuildResult>(WAIT_FOR_AVAILABLE_BUILD, ());
        match tokio::time::timeout(self.wait_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(BuildWaitError::Timeout(self.wait_timeout)),
        }
    }
}
