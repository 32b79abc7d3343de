//! Request handler cache keyed by build generation.
//!
//! # State
//! ```text
//! Empty ──load──▶ Cached(t) ──same t──▶ Cached(t)
//!                    │
//!                    └──newer t'──▶ Cached(t')
//! any ──teardown──▶ Disposed
//! ```
//!
//! # Design Decisions
//! - The builder is asked for the latest build on every acquisition
//! - Reads are lock-free (`ArcSwapOption`); requests keep their own snapshot
//! - Load failures are not cached, the next request retries

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::build::{BuildResult, BuildSource, BuildWaitError};
use crate::http::handler::HandlerResult;
use crate::http::request::Request;
use crate::http::response;
use crate::observability::metrics;
use crate::runtime::{BundleArtifact, BundleError, ExecutionBackend, LoadedBundle};

/// Why no handler could be produced for a request.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    BuildWait(#[from] BuildWaitError),
    #[error("failed to load bundle for generation {generation}: {source}")]
    Load {
        generation: u64,
        #[source]
        source: BundleError,
    },
    #[error("request handler controller has been torn down")]
    Disposed,
}

enum Handler {
    Bundle(Arc<dyn LoadedBundle>),
    /// Serves the fixed build error page.
    BuildFailure,
}

/// A handler paired with the generation it was built from.
pub struct CachedArtifact {
    generation: u64,
    handler: Handler,
}

impl CachedArtifact {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_build_failure(&self) -> bool {
        matches!(self.handler, Handler::BuildFailure)
    }

    pub async fn invoke(&self, req: Request) -> HandlerResult {
        match &self.handler {
            Handler::Bundle(bundle) => bundle.invoke(req).await,
            Handler::BuildFailure => Ok(response::build_failure()),
        }
    }
}

/// Hands out the handler for the latest build, reloading when the build changes.
pub struct RequestHandlerController {
    builds: Arc<dyn BuildSource>,
    backend: Arc<dyn ExecutionBackend>,
    cached: ArcSwapOption<CachedArtifact>,
    disposed: AtomicBool,
}

impl RequestHandlerController {
    pub fn new(builds: Arc<dyn BuildSource>, backend: Arc<dyn ExecutionBackend>) -> Self {
        Self {
            builds,
            backend,
            cached: ArcSwapOption::empty(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Obtain the handler for the latest build.
    pub async fn handler(&self) -> Result<Arc<CachedArtifact>, ControllerError> {
        if self.is_disposed() {
            return Err(ControllerError::Disposed);
        }

        let build = self.builds.wait_for_available_build().await?;
        let generation = build.built_at_ms();

        if let Some(cached) = self.cached.load_full() {
            if cached.generation == generation {
                return Ok(cached);
            }
        }

        let handler = match build {
            BuildResult::Failure { .. } => {
                tracing::warn!(generation, "Latest build failed");
                Handler::BuildFailure
            }
            BuildResult::Success { bundle_path, .. } => {
                tracing::info!(generation, path = %bundle_path.display(), backend = %self.backend.kind(), "Loading bundle");
                let artifact = BundleArtifact::new(bundle_path, generation);
                let loaded = self
                    .backend
                    .load(&artifact)
                    .await
                    .map_err(|source| ControllerError::Load { generation, source })?;
                Handler::Bundle(loaded)
            }
        };
        metrics::record_reload(self.backend.kind(), generation);

        let fresh = Arc::new(CachedArtifact { generation, handler });
        if self.is_disposed() {
            return Err(ControllerError::Disposed);
        }
        // A slower reload of an older generation must not replace a newer one.
        self.cached.rcu(|current| match current {
            Some(current) if current.generation > generation => Some(Arc::clone(current)),
            _ => Some(Arc::clone(&fresh)),
        });
        Ok(fresh)
    }

    /// Generation of the cached handler, if any.
    pub fn cached_generation(&self) -> Option<u64> {
        self.cached.load().as_ref().map(|cached| cached.generation)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Drop the cached handler and refuse further acquisitions.
    pub fn teardown(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.cached.store(None);
        tracing::debug!("Request handler controller torn down");
    }
}
