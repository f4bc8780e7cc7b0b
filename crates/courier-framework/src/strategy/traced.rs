//! Tracing decorator for invocation strategies.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{Instrument, debug, info_span, warn};

use courier_core::{AnyResult, EventEnvelope, HandlerExecutionResult};

use super::event::{BoundEventHandler, EventInvocationStrategy};
use super::request::{RequestInvocation, RequestInvocationStrategy};

/// Wraps a strategy with a span per call and a completion event.
///
/// ```rust,ignore
/// let strategy = Traced::new(InlineRequestStrategy);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Traced<S> {
    inner: S,
}

impl<S> Traced<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Returns the wrapped strategy.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: RequestInvocationStrategy> RequestInvocationStrategy for Traced<S> {
    async fn invoke(
        &self,
        invocation: RequestInvocation,
    ) -> HandlerExecutionResult<Option<AnyResult>> {
        let span = info_span!(
            "request",
            key = %invocation.key(),
            handler = invocation.handler(),
        );
        let started = Instant::now();
        let outcome = self.inner.invoke(invocation).instrument(span.clone()).await;

        span.in_scope(|| match &outcome {
            Ok(result) => debug!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                has_result = result.is_some(),
                "Request handled"
            ),
            Err(err) => warn!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %err,
                "Request failed"
            ),
        });
        outcome
    }
}

#[async_trait]
impl<S: EventInvocationStrategy> EventInvocationStrategy for Traced<S> {
    async fn invoke_all(
        &self,
        handlers: Vec<BoundEventHandler>,
        envelope: EventEnvelope,
    ) -> HandlerExecutionResult<()> {
        let span = info_span!(
            "event",
            event = %envelope.shape(),
            handlers = handlers.len(),
        );
        let started = Instant::now();
        let outcome = self
            .inner
            .invoke_all(handlers, envelope)
            .instrument(span.clone())
            .await;

        span.in_scope(|| match &outcome {
            Ok(()) => debug!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Event published"
            ),
            Err(err) => warn!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %err,
                "Event handler failed"
            ),
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use courier_core::{BoxError, InstanceRegistry, RequestEnvelope};

    use super::*;
    use crate::handler::{EventHandlerDescriptor, HandlerService, RequestHandlerDescriptor};
    use crate::pipeline::Pipeline;
    use crate::strategy::{InlineRequestStrategy, SequentialEventStrategy};

    #[derive(Clone)]
    struct Ping;

    #[tokio::test]
    async fn test_traced_request_passes_result_through() {
        let registered = RequestHandlerDescriptor::new(|_p: Ping| async { Ok::<_, BoxError>(5u8) })
            .into_registered()
            .unwrap();
        let key = registered.key();
        let pipeline = Pipeline::new(HandlerService::new(
            registered,
            Arc::new(InstanceRegistry::new()),
        ));
        let invocation = RequestInvocation::new(pipeline, RequestEnvelope::new(key, Ping), "ping");

        let out = Traced::new(InlineRequestStrategy).invoke(invocation).await.unwrap();
        assert_eq!(out.and_then(|v| v.downcast::<u8>().ok()).map(|b| *b), Some(5));
    }

    #[tokio::test]
    async fn test_traced_event_passes_error_through() {
        let registered = EventHandlerDescriptor::new(|_p: Ping| async {
            Err::<(), _>(BoxError::from("nope"))
        })
        .named("ping-listener")
        .into_registered()
        .unwrap();
        let handlers = vec![BoundEventHandler::new(
            registered,
            Arc::new(InstanceRegistry::new()),
        )];

        let err = Traced::new(SequentialEventStrategy)
            .invoke_all(handlers, EventEnvelope::new(Ping))
            .await
            .unwrap_err();
        assert_eq!(err.origin(), "ping-listener");
    }
}
