//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the dev server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::routing::router::MakeRequestOptions;
use crate::runtime::BackendKind;

/// Root configuration for the dev server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DevServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Where bundles come from and how long to wait for them.
    pub build: BuildConfig,

    /// Execution backend selection.
    pub runtime: RuntimeConfig,

    /// Prefix handling for dispatch.
    pub dispatch: DispatchConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:3000"). Port 0 picks a free port.
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Build pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Bundle produced by the build.
    pub bundle_path: PathBuf,

    /// Source directory to watch instead of the bundle itself.
    pub watch_dir: Option<PathBuf>,

    /// Program and arguments that (re)produce the bundle.
    pub command: Option<Vec<String>>,

    /// Quiet period after a file change before building, in milliseconds.
    pub debounce_ms: u64,

    /// How long a request waits for the first build, in milliseconds.
    /// Must stay below `timeouts.request_secs`.
    pub wait_timeout_ms: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            bundle_path: PathBuf::from("build/bundle.json"),
            watch_dir: None,
            command: None,
            debounce_ms: 100,
            wait_timeout_ms: 10_000,
        }
    }
}

impl BuildConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// Execution backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    /// "sandbox" or "direct".
    pub backend: BackendKind,
}

/// Dispatch options applied to the served bundle.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Literal pathname prefix to strip before routing.
    pub remove_pathname_prefix: Option<String>,

    /// Derive the pathname from a parent route's wildcard parameter.
    pub automatically_remove_pathname_prefix: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            remove_pathname_prefix: None,
            automatically_remove_pathname_prefix: true,
        }
    }
}

impl DispatchConfig {
    pub fn to_options(&self) -> MakeRequestOptions {
        MakeRequestOptions {
            remove_pathname_prefix: self.remove_pathname_prefix.clone(),
            automatically_remove_pathname_prefix: self.automatically_remove_pathname_prefix,
            ..MakeRequestOptions::default()
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest request body that will be buffered.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive, used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Exporter bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "hotserve=debug,tower_http=debug".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
