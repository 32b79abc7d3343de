//! Bundle artifacts and the loaders that turn them into route tables.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::http::handler::BoxError;
use crate::routing::matcher::PatternError;
use crate::routing::router::RouteBundle;

/// A successful build output, identified by its generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleArtifact {
    pub path: PathBuf,
    /// `builtAtMs` of the build that produced it.
    pub generation: u64,
}

impl BundleArtifact {
    pub fn new(path: impl Into<PathBuf>, generation: u64) -> Self {
        Self {
            path: path.into(),
            generation,
        }
    }
}

/// Why a bundle could not be loaded or executed.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("failed to read bundle {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed bundle manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid bundle {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("sandbox for generation {0} is no longer running")]
    SandboxTerminated(u64),
    #[error(transparent)]
    Custom(BoxError),
}

impl BundleError {
    pub fn invalid(path: &Path, reason: impl Into<String>) -> Self {
        BundleError::Invalid {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Turns a build artifact into a route table.
///
/// Called once per generation. Implementations must read the artifact afresh
/// and must not cache by path, since a rebuild reuses the same path.
pub trait BundleLoader: Send + Sync + 'static {
    fn load(&self, artifact: &BundleArtifact) -> Result<RouteBundle, BundleError>;
}

/// Loader backed by a closure, for route tables compiled into the binary.
#[derive(Clone)]
pub struct FnLoader(Arc<dyn Fn(&BundleArtifact) -> Result<RouteBundle, BundleError> + Send + Sync>);

impl FnLoader {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&BundleArtifact) -> Result<RouteBundle, BundleError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }
}

impl BundleLoader for FnLoader {
    fn load(&self, artifact: &BundleArtifact) -> Result<RouteBundle, BundleError> {
        (self.0)(artifact)
    }
}

impl fmt::Debug for FnLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnLoader")
    }
}
