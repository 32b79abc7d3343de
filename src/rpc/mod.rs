//! Message channel subsystem.
//!
//! # Data Flow
//! ```text
//! RpcPeer (server side)                     RpcPeer (builder side)
//!     call("waitForAvailableBuild") ──────▶ registered method
//!     ◀────────────────────────────── Response{BuildResult}
//!     notification handlers ◀────────────── notify("buildStart" / "buildEnd")
//!
//! Both peers sit on a Channel:
//!     loopback  (tokio mpsc, same process)
//!     framed    (length-delimited JSON over any AsyncRead + AsyncWrite)
//! ```
//!
//! # Design Decisions
//! - Framing and correlation are implemented once; transports only move frames
//! - Remote failures are data (`RemoteError`), distinct from transport failures

pub mod message;
pub mod peer;
pub mod transport;

pub use message::{ErrorCode, Message, RemoteError};
pub use peer::{RpcMethods, RpcPeer};
pub use transport::{Channel, MessageSink, MessageSource};

/// Failure of an RPC call or of the channel underneath it.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("rpc channel closed")]
    Closed,
    #[error("rpc transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed rpc payload: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}
