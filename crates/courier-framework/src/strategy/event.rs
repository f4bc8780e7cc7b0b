//! Event invocation strategies.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::runtime::Handle;
use tracing::{error, trace};

use courier_core::{
    EventEnvelope, HandlerExecutionError, HandlerExecutionResult, InstanceProvider, Shape,
};

use super::EventErrorHandler;
use crate::handler::RegisteredEventHandler;

// =============================================================================
// Bound Handler
// =============================================================================

/// An event handler paired with the provider that resolves its owner.
#[derive(Clone)]
pub struct BoundEventHandler {
    handler: RegisteredEventHandler,
    provider: Arc<dyn InstanceProvider>,
}

impl BoundEventHandler {
    pub fn new(handler: RegisteredEventHandler, provider: Arc<dyn InstanceProvider>) -> Self {
        Self { handler, provider }
    }

    /// Returns the handler's name.
    pub fn name(&self) -> &'static str {
        self.handler.name()
    }

    /// Returns the event shape the handler accepts.
    pub fn shape(&self) -> Shape {
        self.handler.shape()
    }

    /// Runs the handler on the current task.
    pub async fn call(&self, envelope: EventEnvelope) -> HandlerExecutionResult<()> {
        let name = self.handler.name();
        self.handler
            .invoke(&self.provider, envelope)
            .await
            .map_err(|e| HandlerExecutionError::failed(name, e))
    }
}

impl fmt::Debug for BoundEventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundEventHandler")
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Strategy Trait
// =============================================================================

/// Decides how the handlers of one `publish` call execute.
///
/// `handlers` is in registration order.
#[async_trait]
pub trait EventInvocationStrategy: Send + Sync + 'static {
    async fn invoke_all(
        &self,
        handlers: Vec<BoundEventHandler>,
        envelope: EventEnvelope,
    ) -> HandlerExecutionResult<()>;
}

#[async_trait]
impl<S: EventInvocationStrategy + ?Sized> EventInvocationStrategy for Arc<S> {
    async fn invoke_all(
        &self,
        handlers: Vec<BoundEventHandler>,
        envelope: EventEnvelope,
    ) -> HandlerExecutionResult<()> {
        (**self).invoke_all(handlers, envelope).await
    }
}

// =============================================================================
// Sequential
// =============================================================================

/// Runs handlers one after another on the caller's task.
///
/// The first failure stops the loop and is returned; later handlers do not
/// run for that event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialEventStrategy;

#[async_trait]
impl EventInvocationStrategy for SequentialEventStrategy {
    async fn invoke_all(
        &self,
        handlers: Vec<BoundEventHandler>,
        envelope: EventEnvelope,
    ) -> HandlerExecutionResult<()> {
        for handler in &handlers {
            trace!(event = %envelope.shape(), handler = handler.name(), "Invoking event handler");
            handler.call(envelope.clone()).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Spawned
// =============================================================================

/// Spawns one task per handler and returns without waiting.
///
/// A failing or panicking handler has no effect on its siblings. Each failure
/// reaches the error handler exactly once, with the original event.
///
/// Handlers still running when the target runtime shuts down are dropped
/// with it and never reach the error handler.
#[derive(Clone)]
pub struct SpawnedEventStrategy {
    handle: Handle,
    on_error: EventErrorHandler,
}

impl SpawnedEventStrategy {
    /// Creates a strategy that spawns onto `handle`.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            on_error: Arc::new(|envelope: EventEnvelope, err: HandlerExecutionError| {
                error!(event = %envelope.shape(), error = %err, "Event handler failed");
            }),
        }
    }

    /// Creates a strategy that spawns onto the runtime of the calling task.
    ///
    /// Returns `None` when called outside a tokio runtime.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    /// Sets the callback that receives failures.
    pub fn with_error_handler<F>(mut self, on_error: F) -> Self
    where
        F: Fn(EventEnvelope, HandlerExecutionError) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(on_error);
        self
    }
}

impl fmt::Debug for SpawnedEventStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnedEventStrategy")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventInvocationStrategy for SpawnedEventStrategy {
    async fn invoke_all(
        &self,
        handlers: Vec<BoundEventHandler>,
        envelope: EventEnvelope,
    ) -> HandlerExecutionResult<()> {
        for handler in handlers {
            let on_error = Arc::clone(&self.on_error);
            let envelope = envelope.clone();

            self.handle.spawn(async move {
                let name = handler.name();
                let outcome = AssertUnwindSafe(handler.call(envelope.clone()))
                    .catch_unwind()
                    .await;
                let err = match outcome {
                    Ok(Ok(())) => return,
                    Ok(Err(err)) => err,
                    Err(payload) => HandlerExecutionError::panicked(name, payload),
                };
                on_error(envelope, err);
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::sync::{Notify, mpsc};

    use courier_core::{BoxError, InstanceRegistry};

    use super::*;
    use crate::handler::EventHandlerDescriptor;

    #[derive(Clone, Debug, PartialEq)]
    struct Shipped(u32);

    fn bind<H, M>(name: &'static str, handler: H) -> BoundEventHandler
    where
        H: crate::handler::EventHandler<Shipped, M>,
        M: 'static,
    {
        let registered = EventHandlerDescriptor::new::<Shipped, M, H>(handler)
            .named(name)
            .into_registered()
            .unwrap();
        BoundEventHandler::new(registered, Arc::new(InstanceRegistry::new()))
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> BoundEventHandler {
        let log = Arc::clone(log);
        bind(name, move |_e: Shipped| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(name);
                Ok::<(), BoxError>(())
            }
        })
    }

    fn failing(name: &'static str) -> BoundEventHandler {
        bind(name, |_e: Shipped| async { Err::<(), _>(BoxError::from("carrier offline")) })
    }

    #[tokio::test]
    async fn test_sequential_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handlers = vec![recorder(&log, "a"), recorder(&log, "b"), recorder(&log, "c")];

        SequentialEventStrategy
            .invoke_all(handlers, EventEnvelope::new(Shipped(1)))
            .await
            .unwrap();

        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_sequential_stops_at_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handlers = vec![recorder(&log, "a"), failing("b"), recorder(&log, "c")];

        let err = SequentialEventStrategy
            .invoke_all(handlers, EventEnvelope::new(Shipped(1)))
            .await
            .unwrap_err();

        assert_eq!(err.origin(), "b");
        assert_eq!(err.to_string(), "b failed: carrier offline");
        assert_eq!(*log.lock(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_sequential_with_no_handlers_is_ok() {
        let out = SequentialEventStrategy
            .invoke_all(Vec::new(), EventEnvelope::new(Shipped(1)))
            .await;
        assert!(out.is_ok());
    }

    #[tokio::test]
    async fn test_spawned_isolates_failures() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let strategy = SpawnedEventStrategy::new(Handle::current()).with_error_handler(
            move |envelope, err| {
                let _ = tx.send((envelope.downcast_ref::<Shipped>().cloned(), err));
            },
        );

        let log = Arc::new(Mutex::new(Vec::new()));
        let handlers = vec![failing("first"), recorder(&log, "second")];
        strategy
            .invoke_all(handlers, EventEnvelope::new(Shipped(9)))
            .await
            .unwrap();

        let (event, err) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, Some(Shipped(9)));
        assert_eq!(err.origin(), "first");

        tokio::time::timeout(Duration::from_secs(1), async {
            while log.lock().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(*log.lock(), vec!["second"]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spawned_returns_before_handlers_finish() {
        let gate = Arc::new(Notify::new());
        let finished = Arc::new(AtomicUsize::new(0));
        let (gate_h, finished_h) = (Arc::clone(&gate), Arc::clone(&finished));
        let slow = bind("slow", move |_e: Shipped| {
            let gate = Arc::clone(&gate_h);
            let finished = Arc::clone(&finished_h);
            async move {
                gate.notified().await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }
        });

        SpawnedEventStrategy::new(Handle::current())
            .invoke_all(vec![slow], EventEnvelope::new(Shipped(1)))
            .await
            .unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        gate.notify_one();
        tokio::time::timeout(Duration::from_secs(1), async {
            while finished.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_spawned_reports_panics_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let strategy = SpawnedEventStrategy::new(Handle::current())
            .with_error_handler(move |_envelope, err| {
                let _ = tx.send(err);
            });
        let panicking = bind("panicking", |_e: Shipped| async {
            if true {
                panic!("label printer jammed");
            }
            Ok::<(), BoxError>(())
        });

        strategy
            .invoke_all(vec![panicking], EventEnvelope::new(Shipped(1)))
            .await
            .unwrap();

        let err = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(err, HandlerExecutionError::Panicked { .. }));
        assert_eq!(err.origin(), "panicking");
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }
}
