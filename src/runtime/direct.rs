//! In-process execution, from a loader or from a bundle already in memory.

use std::sync::Arc;

use async_trait::async_trait;

use super::bundle::{BundleArtifact, BundleError, BundleLoader};
use super::{BackendKind, ExecutionBackend, LoadedBundle};
use crate::http::handler::HandlerResult;
use crate::http::request::Request;
use crate::routing::router::{DispatchError, MakeRequestOptions, RouteBundle};

/// Loads bundles into the server process and calls them directly.
pub struct DirectBackend {
    loader: Arc<dyn BundleLoader>,
    options: Arc<MakeRequestOptions>,
}

impl DirectBackend {
    pub fn new(loader: Arc<dyn BundleLoader>, options: MakeRequestOptions) -> Self {
        Self {
            loader,
            options: Arc::new(options),
        }
    }
}

#[async_trait]
impl ExecutionBackend for DirectBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Direct
    }

    async fn load(&self, artifact: &BundleArtifact) -> Result<Arc<dyn LoadedBundle>, BundleError> {
        let loader = Arc::clone(&self.loader);
        let target = artifact.clone();
        let bundle = tokio::task::spawn_blocking(move || loader.load(&target))
            .await
            .map_err(|e| BundleError::Custom(Box::new(e)))??;

        tracing::debug!(generation = artifact.generation, routes = bundle.route_ids().count(), "Bundle loaded");
        Ok(Arc::new(DirectBundle {
            bundle: Arc::new(bundle),
            options: Arc::clone(&self.options),
            generation: artifact.generation,
        }))
    }
}

/// Serves one bundle that is already in memory, whatever the artifact.
pub struct PreloadedBackend {
    bundle: Arc<RouteBundle>,
    options: Arc<MakeRequestOptions>,
}

impl PreloadedBackend {
    pub fn new(bundle: RouteBundle, options: MakeRequestOptions) -> Self {
        Self {
            bundle: Arc::new(bundle),
            options: Arc::new(options),
        }
    }
}

#[async_trait]
impl ExecutionBackend for PreloadedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Direct
    }

    async fn load(&self, artifact: &BundleArtifact) -> Result<Arc<dyn LoadedBundle>, BundleError> {
        Ok(Arc::new(DirectBundle {
            bundle: Arc::clone(&self.bundle),
            options: Arc::clone(&self.options),
            generation: artifact.generation,
        }))
    }
}

struct DirectBundle {
    bundle: Arc<RouteBundle>,
    options: Arc<MakeRequestOptions>,
    generation: u64,
}

#[async_trait]
impl LoadedBundle for DirectBundle {
    fn generation(&self) -> u64 {
        self.generation
    }

    async fn invoke(&self, req: Request) -> HandlerResult {
        self.bundle
            .make_request(req, &self.options)
            .await
            .map_err(DispatchError::into_handler_error)
    }
}
