//! Terminal tower service for a request pipeline.
//!
//! [`HandlerService`] wraps a [`RegisteredRequestHandler`] together with the
//! instance provider and implements `tower::Service<RequestEnvelope>`. Every
//! middleware is a tower [`Layer`](tower::Layer) stacked on top of it.

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Service};

use courier_core::{AnyResult, HandlerExecutionError, InstanceProvider, RequestEnvelope, RoutingKey};

use super::descriptor::RegisteredRequestHandler;

/// A tower [`Service`] that calls a single registered request handler.
///
/// Failures leave the service as a [`HandlerExecutionError`] naming the
/// handler, so middleware further out cannot be blamed for them.
#[derive(Clone)]
pub struct HandlerService {
    handler: RegisteredRequestHandler,
    provider: Arc<dyn InstanceProvider>,
}

impl HandlerService {
    pub fn new(handler: RegisteredRequestHandler, provider: Arc<dyn InstanceProvider>) -> Self {
        Self { handler, provider }
    }

    /// Returns the key of the wrapped handler.
    pub fn key(&self) -> RoutingKey {
        self.handler.key()
    }

    /// Returns the name of the wrapped handler.
    pub fn name(&self) -> &'static str {
        self.handler.name()
    }
}

impl fmt::Debug for HandlerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerService")
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

impl Service<RequestEnvelope> for HandlerService {
    type Response = Option<AnyResult>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, envelope: RequestEnvelope) -> Self::Future {
        let name = self.handler.name();
        let call = self.handler.invoke(&self.provider, envelope);
        async move {
            call.await
                .map_err(|e| BoxError::from(HandlerExecutionError::failed(name, e)))
        }
        .boxed()
    }
}
