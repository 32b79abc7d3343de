//! Isolated execution.
//!
//! # Data Flow
//! ```text
//! SandboxBackend::load(artifact)
//!     → spawn thread "sandbox-<generation>" with a current-thread runtime
//!     → BundleLoader::load inside the thread (the RouteBundle never leaves it)
//!     → ready signal
//!
//! SandboxInstance::invoke(request)
//!     → post FetchEvent{request, respond_with} to the thread
//!     → make_request → settle wait_until work → respond_with
//! ```
//!
//! # Design Decisions
//! - One thread per generation; dropping the instance closes its event queue
//!   and the thread exits
//! - A panic in bundle code fails only the request that triggered it

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use async_trait::async_trait;
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot};

use super::bundle::{BundleArtifact, BundleError, BundleLoader};
use super::{BackendKind, ExecutionBackend, LoadedBundle};
use crate::http::handler::{BoxError, HandlerResult, PanicError};
use crate::http::request::Request;
use crate::routing::router::{MakeRequestOptions, RouteBundle};

/// Background work registered by a handler.
#[derive(Clone, Default)]
struct WaitUntil(Arc<Mutex<Vec<BoxFuture<'static, ()>>>>);

impl WaitUntil {
    fn push(&self, fut: BoxFuture<'static, ()>) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(fut);
    }

    /// Run registered work to completion, including work registered meanwhile.
    async fn settle(&self) {
        loop {
            let batch: Vec<_> = std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner));
            if batch.is_empty() {
                return;
            }
            let outcomes = join_all(batch.into_iter().map(|fut| AssertUnwindSafe(fut).catch_unwind())).await;
            for outcome in outcomes {
                if let Err(payload) = outcome {
                    let panic = PanicError::from_payload(payload);
                    tracing::error!(error = %panic, "Background task panicked");
                }
            }
        }
    }
}

/// Extend the lifetime of a request with background work.
///
/// Inside a sandbox the response is delivered only after `fut` completes.
/// Elsewhere the work is spawned onto the current runtime.
pub fn wait_until<F>(req: &Request, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match req.extensions().get::<WaitUntil>() {
        Some(registry) => registry.push(Box::pin(fut)),
        None => {
            tokio::spawn(fut);
        }
    }
}

struct FetchEvent {
    request: Request,
    respond_with: oneshot::Sender<HandlerResult>,
}

/// Runs every generation on its own thread and runtime.
pub struct SandboxBackend {
    loader: Arc<dyn BundleLoader>,
    options: Arc<MakeRequestOptions>,
}

impl SandboxBackend {
    pub fn new(loader: Arc<dyn BundleLoader>, options: MakeRequestOptions) -> Self {
        Self {
            loader,
            options: Arc::new(options),
        }
    }
}

#[async_trait]
impl ExecutionBackend for SandboxBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sandbox
    }

    async fn load(&self, artifact: &BundleArtifact) -> Result<Arc<dyn LoadedBundle>, BundleError> {
        let generation = artifact.generation;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let loader = Arc::clone(&self.loader);
        let options = Arc::clone(&self.options);
        let target = artifact.clone();
        thread::Builder::new()
            .name(format!("sandbox-{generation}"))
            .spawn(move || run_sandbox(loader, options, target, events_rx, ready_tx))
            .map_err(|source| BundleError::Io {
                path: artifact.path.clone(),
                source,
            })?;

        ready_rx
            .await
            .map_err(|_| BundleError::SandboxTerminated(generation))??;

        tracing::debug!(generation, "Sandbox ready");
        Ok(Arc::new(SandboxInstance {
            events: events_tx,
            generation,
        }))
    }
}

struct SandboxInstance {
    events: mpsc::UnboundedSender<FetchEvent>,
    generation: u64,
}

#[async_trait]
impl LoadedBundle for SandboxInstance {
    fn generation(&self) -> u64 {
        self.generation
    }

    async fn invoke(&self, request: Request) -> HandlerResult {
        let (respond_with, response) = oneshot::channel();
        self.events
            .send(FetchEvent { request, respond_with })
            .map_err(|_| BundleError::SandboxTerminated(self.generation))?;
        response
            .await
            .map_err(|_| BundleError::SandboxTerminated(self.generation))?
    }
}

fn run_sandbox(
    loader: Arc<dyn BundleLoader>,
    options: Arc<MakeRequestOptions>,
    artifact: BundleArtifact,
    mut events: mpsc::UnboundedReceiver<FetchEvent>,
    ready: oneshot::Sender<Result<(), BundleError>>,
) {
    let generation = artifact.generation;
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(source) => {
            let _ = ready.send(Err(BundleError::Io {
                path: artifact.path,
                source,
            }));
            return;
        }
    };

    let loaded = {
        let _entered = runtime.enter();
        std::panic::catch_unwind(AssertUnwindSafe(|| loader.load(&artifact)))
    };
    let bundle = match loaded {
        Ok(Ok(bundle)) => Arc::new(bundle),
        Ok(Err(e)) => {
            let _ = ready.send(Err(e));
            return;
        }
        Err(payload) => {
            let _ = ready.send(Err(BundleError::Custom(Box::new(PanicError::from_payload(payload)))));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    runtime.block_on(async move {
        while let Some(event) = events.recv().await {
            tokio::spawn(dispatch(Arc::clone(&bundle), Arc::clone(&options), event));
        }
    });
    tracing::debug!(generation, "Sandbox stopped");
}

async fn dispatch(bundle: Arc<RouteBundle>, options: Arc<MakeRequestOptions>, event: FetchEvent) {
    let FetchEvent { request, respond_with } = event;
    let background = WaitUntil::default();
    let request = request.with_extension(background.clone());

    let outcome = AssertUnwindSafe(bundle.make_request(request, &options))
        .catch_unwind()
        .await;
    let result = match outcome {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(e.into_handler_error()),
        Err(payload) => Err(Box::new(PanicError::from_payload(payload)) as BoxError),
    };

    background.settle().await;
    let _ = respond_with.send(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::RequestContext;
    use crate::runtime::FnLoader;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, Method};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn get(path: &str) -> Request {
        Request::new(Method::GET, path.parse().unwrap(), HeaderMap::new(), Bytes::new())
    }

    async fn explode(_req: Request, _ctx: RequestContext) -> HandlerResult {
        panic!("boom")
    }

    fn backend(flag: Arc<AtomicBool>) -> SandboxBackend {
        let loader = FnLoader::new(move |_: &BundleArtifact| {
            let flag = Arc::clone(&flag);
            Ok(RouteBundle::builder()
                .route("/thread", |_req, ctx: RequestContext| async move {
                    let name = thread::current().name().unwrap_or_default().to_string();
                    Ok(ctx.respond(name))
                })
                .route("/background", move |req: Request, ctx: RequestContext| {
                    let flag = Arc::clone(&flag);
                    async move {
                        wait_until(&req, async move {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            flag.store(true, Ordering::SeqCst);
                        });
                        Ok(ctx.respond("scheduled"))
                    }
                })
                .route("/panic", explode)
                .build()?)
        });
        SandboxBackend::new(Arc::new(loader), MakeRequestOptions::default())
    }

    #[tokio::test]
    async fn test_runs_on_dedicated_thread() {
        let loaded = backend(Arc::default()).load(&BundleArtifact::new("/b", 3)).await.unwrap();
        let response = loaded.invoke(get("/thread")).await.unwrap();
        assert_eq!(response.body().as_ref(), b"sandbox-3");
    }

    #[tokio::test]
    async fn test_waits_for_background_work() {
        let flag = Arc::new(AtomicBool::new(false));
        let loaded = backend(flag.clone()).load(&BundleArtifact::new("/b", 1)).await.unwrap();

        let response = loaded.invoke(get("/background")).await.unwrap();
        assert_eq!(response.body().as_ref(), b"scheduled");
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panic_fails_only_that_request() {
        let loaded = backend(Arc::default()).load(&BundleArtifact::new("/b", 1)).await.unwrap();

        let err = loaded.invoke(get("/panic")).await.unwrap_err();
        assert!(err.to_string().contains("boom"));

        let response = loaded.invoke(get("/thread")).await.unwrap();
        assert_eq!(response.body().as_ref(), b"sandbox-1");
    }

    #[tokio::test]
    async fn test_load_failure_is_reported() {
        let loader = FnLoader::new(|a: &BundleArtifact| Err(BundleError::invalid(&a.path, "nope")));
        let backend = SandboxBackend::new(Arc::new(loader), MakeRequestOptions::default());

        let err = backend.load(&BundleArtifact::new("/b", 1)).await.err().unwrap();
        assert!(matches!(err, BundleError::Invalid { .. }));
    }
}
