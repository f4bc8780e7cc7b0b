//! Background event sources.
//!
//! An [`EventSource`] pulls events from somewhere outside the process (a
//! queue, a socket, a timer) and feeds them to a [`Publisher`]. Every source
//! gets its own OS thread with its own single-threaded tokio runtime, so a
//! source is free to block its worker forever:
//!
//! ```text
//! start_all(publisher)
//!   ├─ thread "courier-source-ticker"  ── block_on(ticker.run(publisher))
//!   └─ thread "courier-source-inbox"   ── block_on(inbox.run(publisher))
//! ```
//!
//! A source that returns an error or panics is logged and its thread ends.
//! Nothing else is affected. Worker threads are detached, so they never keep
//! the process alive. Well-behaved sources watch
//! [`Publisher::cancelled`] to stop when the host shuts down.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use courier_core::{BoxError, EventSourceError};

use crate::mediator::Publisher;

/// Default prefix for source worker thread names.
pub const DEFAULT_THREAD_PREFIX: &str = "courier-source";

// =============================================================================
// EventSource Trait
// =============================================================================

/// A long-running producer of events.
///
/// ```rust,ignore
/// struct Ticker;
///
/// #[async_trait]
/// impl EventSource for Ticker {
///     fn name(&self) -> &str { "ticker" }
///
///     async fn run(&self, publisher: Publisher) -> Result<(), BoxError> {
///         let mut interval = tokio::time::interval(Duration::from_secs(1));
///         loop {
///             tokio::select! {
///                 _ = publisher.cancelled() => return Ok(()),
///                 _ = interval.tick() => publisher.publish(Tick).await?,
///             }
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait EventSource: Send + Sync + 'static {
    /// Name used for the worker thread and in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Runs the source until it is done or fails.
    async fn run(&self, publisher: Publisher) -> Result<(), BoxError>;
}

type SourceFn = Arc<dyn Fn(Publisher) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// An [`EventSource`] built from an async closure.
#[derive(Clone)]
pub struct FnSource {
    name: String,
    run: SourceFn,
}

/// Creates an [`EventSource`] from a name and an async closure.
pub fn source_fn<F, Fut, E>(name: impl Into<String>, f: F) -> FnSource
where
    F: Fn(Publisher) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
{
    FnSource {
        name: name.into(),
        run: Arc::new(move |publisher: Publisher| {
            f(publisher)
                .map(|res| res.map_err(Into::<BoxError>::into))
                .boxed()
        }),
    }
}

#[async_trait]
impl EventSource for FnSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, publisher: Publisher) -> Result<(), BoxError> {
        (self.run)(publisher).await
    }
}

impl fmt::Debug for FnSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSource")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Registry
// =============================================================================

struct SourceWorker {
    name: String,
    handle: JoinHandle<()>,
}

/// Holds the registered sources and the workers running them.
pub struct EventSourceRegistry {
    sources: RwLock<Vec<Arc<dyn EventSource>>>,
    workers: Mutex<Vec<SourceWorker>>,
    started: AtomicBool,
    thread_prefix: String,
}

impl Default for EventSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSourceRegistry {
    pub fn new() -> Self {
        Self::with_thread_prefix(DEFAULT_THREAD_PREFIX)
    }

    /// Creates a registry whose workers are named `{prefix}-{source name}`.
    pub fn with_thread_prefix(prefix: impl Into<String>) -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            thread_prefix: prefix.into(),
        }
    }

    /// Adds a source. Sources added after [`start_all`](Self::start_all)
    /// are kept but never started.
    pub fn register<S: EventSource>(&self, source: S) {
        self.register_arc(Arc::new(source));
    }

    /// Adds an already shared source.
    pub fn register_arc(&self, source: Arc<dyn EventSource>) {
        if self.is_started() {
            warn!(source = source.name(), "Event source registered after start; it will not run");
        } else {
            debug!(source = source.name(), "Registered event source");
        }
        self.sources.write().push(source);
    }

    /// Returns the number of registered sources.
    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    /// Returns `true` if no source is registered.
    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }

    /// Returns `true` once [`start_all`](Self::start_all) has run.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Returns the number of workers whose source has not finished yet.
    pub fn running_count(&self) -> usize {
        self.workers
            .lock()
            .iter()
            .filter(|w| !w.handle.is_finished())
            .count()
    }

    /// Returns the names of sources whose worker is still running.
    pub fn running(&self) -> Vec<String> {
        self.workers
            .lock()
            .iter()
            .filter(|w| !w.handle.is_finished())
            .map(|w| w.name.clone())
            .collect()
    }

    /// Launches every registered source on its own worker thread.
    ///
    /// Only the first call does anything. A source whose worker cannot be
    /// created is logged and skipped.
    pub fn start_all(&self, publisher: &Publisher) {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("Event sources already started");
            return;
        }

        let sources = self.sources.read().clone();
        let mut workers = self.workers.lock();
        for source in sources {
            let name = source.name().to_string();
            match self.spawn_worker(source, publisher.clone()) {
                Ok(handle) => {
                    info!(source = %name, "Started event source");
                    workers.push(SourceWorker { name, handle });
                }
                Err(err) => error!(error = %err, "Event source did not start"),
            }
        }
    }

    fn spawn_worker(
        &self,
        source: Arc<dyn EventSource>,
        publisher: Publisher,
    ) -> Result<JoinHandle<()>, EventSourceError> {
        let name = source.name().to_string();
        let thread_name = format!("{}-{}", self.thread_prefix, name);

        std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || run_worker(source, publisher))
            .map_err(|source| EventSourceError::Spawn { name, source })
    }
}

impl fmt::Debug for EventSourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSourceRegistry")
            .field("sources", &self.len())
            .field("started", &self.is_started())
            .field("thread_prefix", &self.thread_prefix)
            .finish_non_exhaustive()
    }
}

/// Body of a source worker thread.
fn run_worker(source: Arc<dyn EventSource>, publisher: Publisher) {
    let name = source.name().to_string();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(source) => {
            let err = EventSourceError::Spawn { name, source };
            error!(error = %err, "Event source did not start");
            return;
        }
    };

    let outcome = runtime.block_on(AssertUnwindSafe(source.run(publisher)).catch_unwind());
    let err = match outcome {
        Ok(Ok(())) => {
            info!(source = %name, "Event source finished");
            return;
        }
        Ok(Err(source)) => EventSourceError::Failed {
            name: name.clone(),
            source,
        },
        Err(payload) => EventSourceError::Panicked {
            name: name.clone(),
            message: courier_core::panic_message(payload.as_ref()),
        },
    };
    error!(source = %name, error = %err, "Event source stopped");
}
