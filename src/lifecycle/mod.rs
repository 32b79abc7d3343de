//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind listener → spawn HTTP server → RunningServer{port}
//!     serve_bundle: fixed in-memory bundle, no builder
//!
//! Shutdown (shutdown.rs):
//!     stop() → broadcast → stop accepting → drain → teardown controller
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → stop()
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
pub use startup::{serve_bundle, start, RunningServer, StartError, StartOptions};
