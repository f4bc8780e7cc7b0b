//! Request invocation strategies.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::runtime::Handle;
use tower::ServiceExt;
use tracing::error;

use courier_core::{
    AnyResult, HandlerExecutionError, HandlerExecutionResult, RequestEnvelope, RoutingKey,
};

use super::RequestErrorHandler;
use crate::pipeline::Pipeline;

// =============================================================================
// Invocation
// =============================================================================

/// A fully resolved request call: the composed pipeline plus the request.
///
/// Running it consumes the invocation; clone it first to run it again.
#[derive(Clone)]
pub struct RequestInvocation {
    pipeline: Pipeline,
    envelope: RequestEnvelope,
    handler: &'static str,
}

impl RequestInvocation {
    pub fn new(pipeline: Pipeline, envelope: RequestEnvelope, handler: &'static str) -> Self {
        Self {
            pipeline,
            envelope,
            handler,
        }
    }

    /// Returns the request being dispatched.
    pub fn envelope(&self) -> &RequestEnvelope {
        &self.envelope
    }

    /// Returns the routing key of the request.
    pub fn key(&self) -> RoutingKey {
        self.envelope.key()
    }

    /// Returns the name of the terminal handler.
    pub fn handler(&self) -> &'static str {
        self.handler
    }

    /// Runs the pipeline on the current task.
    pub async fn run(self) -> HandlerExecutionResult<Option<AnyResult>> {
        let handler = self.handler;
        self.pipeline
            .oneshot(self.envelope)
            .await
            .map_err(|e| HandlerExecutionError::failed(handler, e))
    }
}

impl fmt::Debug for RequestInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestInvocation")
            .field("key", &self.key())
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Strategy Trait
// =============================================================================

/// Decides how a request pipeline executes.
///
/// Whatever `invoke` returns is handed back from `send` as-is (after the
/// result value is downcast to the caller's type).
#[async_trait]
pub trait RequestInvocationStrategy: Send + Sync + 'static {
    async fn invoke(
        &self,
        invocation: RequestInvocation,
    ) -> HandlerExecutionResult<Option<AnyResult>>;
}

#[async_trait]
impl<S: RequestInvocationStrategy + ?Sized> RequestInvocationStrategy for Arc<S> {
    async fn invoke(
        &self,
        invocation: RequestInvocation,
    ) -> HandlerExecutionResult<Option<AnyResult>> {
        (**self).invoke(invocation).await
    }
}

// =============================================================================
// Inline
// =============================================================================

/// Runs the pipeline on the caller's task and returns its outcome unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineRequestStrategy;

#[async_trait]
impl RequestInvocationStrategy for InlineRequestStrategy {
    async fn invoke(
        &self,
        invocation: RequestInvocation,
    ) -> HandlerExecutionResult<Option<AnyResult>> {
        invocation.run().await
    }
}

// =============================================================================
// Detached
// =============================================================================

/// Spawns the pipeline onto a runtime and returns `None` right away.
///
/// The handler's result is discarded. Errors and panics go to the error
/// handler, once per failed call, together with the original request.
///
/// A call still running when the target runtime shuts down is dropped with
/// the runtime's other tasks and never reaches the error handler.
#[derive(Clone)]
pub struct DetachedRequestStrategy {
    handle: Handle,
    on_error: RequestErrorHandler,
}

impl DetachedRequestStrategy {
    /// Creates a strategy that spawns onto `handle`.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            on_error: Arc::new(|envelope: RequestEnvelope, err: HandlerExecutionError| {
                error!(key = %envelope.key(), error = %err, "Detached request handler failed");
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
        F: Fn(RequestEnvelope, HandlerExecutionError) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(on_error);
        self
    }
}

impl fmt::Debug for DetachedRequestStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetachedRequestStrategy")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RequestInvocationStrategy for DetachedRequestStrategy {
    async fn invoke(
        &self,
        invocation: RequestInvocation,
    ) -> HandlerExecutionResult<Option<AnyResult>> {
        let on_error = Arc::clone(&self.on_error);
        let envelope = invocation.envelope().clone();
        let handler = invocation.handler();

        self.handle.spawn(async move {
            let outcome = AssertUnwindSafe(invocation.run()).catch_unwind().await;
            let err = match outcome {
                Ok(Ok(_)) => return,
                Ok(Err(err)) => err,
                Err(payload) => HandlerExecutionError::panicked(handler, payload),
            };
            on_error(envelope, err);
        });

        Ok(None)
    }
}
