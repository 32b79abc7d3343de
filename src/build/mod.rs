//! Build pipeline contract.
//!
//! # Data Flow
//! ```text
//! BundleWatcher (file events, optional command)
//!     → BuildCoordinator::run_build (serialized, stamps builtAtMs)
//!     → latest build + buildStart/buildEnd notifications
//!     ──(rpc channel)──▶ BuilderClient::wait_for_available_build
//!     → RequestHandlerController
//! ```
//!
//! # Design Decisions
//! - A failed build is data, never an RPC error
//! - `builtAtMs` is the only validity token handed to the server

pub mod client;
pub mod coordinator;
pub mod result;
pub mod watcher;

use std::path::PathBuf;
use std::process::ExitStatus;

pub use client::{BuildHooks, BuildSource, BuildWaitError, BuilderClient, FixedBuild};
pub use coordinator::BuildCoordinator;
pub use result::BuildResult;
pub use watcher::{BundleWatcher, WatchOptions, WatcherHandle};

/// Blocking call answered once the first build has completed.
pub const WAIT_FOR_AVAILABLE_BUILD: &str = "waitForAvailableBuild";
/// Notification sent when a build begins.
pub const BUILD_START: &str = "buildStart";
/// Notification carrying the finished [`BuildResult`].
pub const BUILD_END: &str = "buildEnd";

/// Reasons a build attempt produced no bundle.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("bundle not found at {}", .0.display())]
    MissingBundle(PathBuf),
    #[error("build command is empty")]
    EmptyCommand,
    #[error("build command `{command}` exited with {status}")]
    CommandFailed { command: String, status: ExitStatus },
    #[error("failed to run build command: {0}")]
    Io(#[from] std::io::Error),
}
