//! Correlated calls on top of a [`Channel`].
//!
//! # Data Flow
//! ```text
//! call(method, params)
//!     → allocate id, park a oneshot in `pending`
//!     → writer task sends Request{id}
//!     ... remote handler runs ...
//!     → reader task receives Response{id} → completes the oneshot
//!
//! Request{id} from the remote
//!     → reader task looks up the method → spawned handler → Response{id}
//! ```
//!
//! # Design Decisions
//! - One writer task owns the sink; callers never contend on it
//! - When the channel ends, every pending call fails with `Closed`
//! - A dropped call removes its own pending entry
//! - A request frame that cannot be written fails its call immediately
//! - Handlers for remote calls run in a `JoinSet` owned by the reader, so
//!   stopping the reader aborts them

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};

use super::message::{Message, RemoteError};
use super::transport::{Channel, MessageSink, MessageSource};
use super::RpcError;

type MethodFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, RemoteError>> + Send + Sync>;
type NotificationFn = Arc<dyn Fn(Value) + Send + Sync>;

/// Functions a peer exposes to the other side.
#[derive(Clone, Default)]
pub struct RpcMethods {
    methods: HashMap<String, MethodFn>,
    notifications: HashMap<String, NotificationFn>,
}

impl RpcMethods {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose a remotely callable method.
    pub fn register<P, R, F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, RemoteError>> + Send + 'static,
    {
        let f = Arc::new(f);
        let method: MethodFn = Arc::new(move |params: Value| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                let params: P = serde_json::from_value(params).map_err(RemoteError::invalid_params)?;
                let result = (*f)(params).await?;
                serde_json::to_value(result).map_err(RemoteError::internal)
            })
        });
        self.methods.insert(name.into(), method);
        self
    }

    /// Handle a fire-and-forget notification.
    pub fn on_notification<P, F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        P: DeserializeOwned + 'static,
        F: Fn(P) + Send + Sync + 'static,
    {
        let name = name.into();
        let method = name.clone();
        let handler: NotificationFn = Arc::new(move |params: Value| match serde_json::from_value(params) {
            Ok(params) => f(params),
            Err(e) => tracing::warn!(method = %method, error = %e, "Dropping malformed notification"),
        });
        self.notifications.insert(name, handler);
        self
    }
}

enum Outgoing {
    Frame(Message),
    Close(oneshot::Sender<()>),
}

type PendingMap = DashMap<u64, oneshot::Sender<Result<Value, RpcError>>>;

struct Shared {
    name: String,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    pending: Arc<PendingMap>,
    next_id: AtomicU64,
    closed: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn fail_pending(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(RpcError::Closed));
            }
        }
    }
}

/// One side of an RPC conversation. Cheap to clone.
#[derive(Clone)]
pub struct RpcPeer {
    shared: Arc<Shared>,
}

impl RpcPeer {
    /// Start serving `channel`. Must be called from within a Tokio runtime.
    pub fn spawn(name: impl Into<String>, channel: Channel, methods: RpcMethods) -> Self {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            name: name.into(),
            outgoing,
            pending: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            reader: Mutex::new(None),
        });

        tokio::spawn(write_loop(
            shared.name.clone(),
            channel.sink,
            outgoing_rx,
            Arc::clone(&shared.pending),
        ));
        let reader = tokio::spawn(read_loop(Arc::clone(&shared), channel.source, methods));
        *shared.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(reader);

        tracing::debug!(peer = %shared.name, "RPC peer started");
        Self { shared }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Call a remote method and wait for its reply.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        if self.is_closed() {
            return Err(RpcError::Closed);
        }

        let params = serde_json::to_value(params)?;
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(id, tx);
        let guard = PendingGuard {
            pending: self.shared.pending.as_ref(),
            id,
        };

        // The reader flips `closed` before draining, so re-checking here
        // guarantees the entry is either drained or rejected.
        if self.is_closed() {
            return Err(RpcError::Closed);
        }

        let request = Message::Request {
            id,
            method: method.to_string(),
            params,
        };
        self.shared
            .outgoing
            .send(Outgoing::Frame(request))
            .map_err(|_| RpcError::Closed)?;

        let value = rx.await.map_err(|_| RpcError::Closed)??;
        drop(guard);
        Ok(serde_json::from_value(value)?)
    }

    /// Send a notification without waiting for anything.
    pub fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<(), RpcError> {
        if self.is_closed() {
            return Err(RpcError::Closed);
        }
        let message = Message::Notification {
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        };
        self.shared
            .outgoing
            .send(Outgoing::Frame(message))
            .map_err(|_| RpcError::Closed)
    }

    /// Close the sending side, stop reading, and fail outstanding calls.
    pub async fn close(&self) {
        let (ack, done) = oneshot::channel();
        if self.shared.outgoing.send(Outgoing::Close(ack)).is_ok() {
            let _ = done.await;
        }

        let reader = self
            .shared
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }

        self.shared.fail_pending();
        tracing::debug!(peer = %self.shared.name, "RPC peer closed");
    }
}

impl fmt::Debug for RpcPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcPeer")
            .field("name", &self.shared.name)
            .field("pending", &self.shared.pending.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

async fn write_loop(
    name: String,
    mut sink: Box<dyn MessageSink>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    pending: Arc<PendingMap>,
) {
    while let Some(item) = outgoing.recv().await {
        match item {
            Outgoing::Frame(message) => {
                let call_id = match &message {
                    Message::Request { id, .. } => Some(*id),
                    _ => None,
                };
                if let Err(e) = sink.send(message).await {
                    tracing::warn!(peer = %name, error = %e, "RPC send failed");
                    if let Some((_, tx)) = call_id.and_then(|id| pending.remove(&id)) {
                        let _ = tx.send(Err(e));
                    }
                }
            }
            Outgoing::Close(ack) => {
                if let Err(e) = sink.close().await {
                    tracing::debug!(peer = %name, error = %e, "RPC sink close failed");
                }
                let _ = ack.send(());
                return;
            }
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(shared: Arc<Shared>, mut source: Box<dyn MessageSource>, methods: RpcMethods) {
    let mut handlers = JoinSet::new();
    loop {
        while handlers.try_join_next().is_some() {}

        let message = match source.receive().await {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::debug!(peer = %shared.name, "RPC channel ended");
                break;
            }
            Err(e) => {
                tracing::warn!(peer = %shared.name, error = %e, "RPC receive failed");
                break;
            }
        };

        match message {
            Message::Request { id, method, params } => {
                let outgoing = shared.outgoing.clone();
                match methods.methods.get(&method).cloned() {
                    Some(handler) => {
                        handlers.spawn(async move {
                            let outcome = handler(params).await;
                            let _ = outgoing.send(Outgoing::Frame(Message::reply(id, outcome)));
                        });
                    }
                    None => {
                        tracing::warn!(peer = %shared.name, method = %method, "Unknown RPC method");
                        let reply = Message::reply(id, Err(RemoteError::method_not_found(&method)));
                        let _ = outgoing.send(Outgoing::Frame(reply));
                    }
                }
            }
            Message::Response { id, result, error } => match shared.pending.remove(&id) {
                Some((_, tx)) => {
                    let outcome = match error {
                        Some(error) => Err(RpcError::Remote(error)),
                        None => Ok(result.unwrap_or(Value::Null)),
                    };
                    let _ = tx.send(outcome);
                }
                None => tracing::debug!(peer = %shared.name, id, "Reply for unknown call"),
            },
            Message::Notification { method, params } => match methods.notifications.get(&method) {
                Some(handler) => handler(params),
                None => tracing::trace!(peer = %shared.name, method = %method, "Unhandled notification"),
            },
        }
    }

    shared.fail_pending();
    handlers.abort_all();
}
