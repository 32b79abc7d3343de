//! Execution backends.
//!
//! # Data Flow
//! ```text
//! BundleArtifact{path, generation}
//!     → ExecutionBackend::load
//!         direct:  BundleLoader on a blocking thread → RouteBundle in process
//!         sandbox: dedicated thread + runtime, BundleLoader runs inside it
//!     → Arc<dyn LoadedBundle>
//!     → LoadedBundle::invoke(Request) → Response
//! ```
//!
//! # Design Decisions
//! - Both strategies dispatch through `RouteBundle::make_request`
//! - Loading is keyed on the generation, never on the path alone
//! - Dropping the last `Arc<dyn LoadedBundle>` releases the backend's resources

pub mod bundle;
pub mod direct;
pub mod manifest;
pub mod sandbox;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::http::handler::HandlerResult;
use crate::http::request::Request;
use crate::routing::router::MakeRequestOptions;

pub use bundle::{BundleArtifact, BundleError, BundleLoader, FnLoader};
pub use direct::{DirectBackend, PreloadedBackend};
pub use manifest::ManifestLoader;
pub use sandbox::{wait_until, SandboxBackend};

/// Which execution strategy serves requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Each generation runs on its own isolated thread and runtime.
    Sandbox,
    /// The bundle runs in the server's own runtime.
    #[default]
    Direct,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Sandbox => f.write_str("sandbox"),
            BackendKind::Direct => f.write_str("direct"),
        }
    }
}

/// A bundle loaded for one build generation.
#[async_trait]
pub trait LoadedBundle: Send + Sync + 'static {
    fn generation(&self) -> u64;

    async fn invoke(&self, req: Request) -> HandlerResult;
}

/// Strategy for loading and running bundles.
#[async_trait]
pub trait ExecutionBackend: Send + Sync + 'static {
    fn kind(&self) -> BackendKind;

    async fn load(&self, artifact: &BundleArtifact) -> Result<Arc<dyn LoadedBundle>, BundleError>;
}

/// Construct the backend selected by configuration.
pub fn backend_for(
    kind: BackendKind,
    loader: Arc<dyn BundleLoader>,
    options: MakeRequestOptions,
) -> Arc<dyn ExecutionBackend> {
    match kind {
        BackendKind::Sandbox => Arc::new(SandboxBackend::new(loader, options)),
        BackendKind::Direct => Arc::new(DirectBackend::new(loader, options)),
    }
}
