//! Request middleware.
//!
//! A [`Middleware`] wraps the rest of a request pipeline. It receives the
//! request and a [`Next`] continuation; calling [`Next::run`] runs every
//! later middleware and then the handler. Returning without calling it
//! short-circuits the pipeline, which is how caching or authorization
//! middleware answer on the handler's behalf.
//!
//! ```rust,ignore
//! struct Audit;
//!
//! #[async_trait]
//! impl Middleware<CreateOrder, OrderId> for Audit {
//!     async fn handle(&self, request: &CreateOrder, next: Next<OrderId>) -> HandlerResult<Option<OrderId>> {
//!         info!(sku = %request.sku, "creating order");
//!         next.run().await
//!     }
//! }
//!
//! let cache = MiddlewareDescriptor::from_fn(|request: CreateOrder, next: Next<OrderId>| async move {
//!     match lookup(&request) {
//!         Some(id) => Ok(Some(id)),
//!         None => next.run().await,
//!     }
//! });
//! ```

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Service, ServiceExt};
use tower_layer::Layer;

use courier_core::{
    AnyResult, ConfigurationError, ConfigurationResult, HandlerExecutionError, InstanceProvider,
    Message, RequestEnvelope, RoutingKey, coerce,
};

use crate::error::PipelineError;
use crate::handler::{HandlerResult, erase_result};
use crate::pipeline::Pipeline;

// ============================================================================
// Middleware trait and continuation
// ============================================================================

/// An interceptor around request handlers for `Q` producing `R`.
#[async_trait]
pub trait Middleware<Q: Message, R: Send + 'static>: Send + Sync + 'static {
    /// Handles the request, optionally delegating to `next`.
    async fn handle(&self, request: &Q, next: Next<R>) -> HandlerResult<Option<R>>;
}

/// The remainder of a pipeline, runnable once.
pub struct Next<R> {
    inner: Pipeline,
    envelope: RequestEnvelope,
    _result: PhantomData<fn() -> R>,
}

impl<R: Send + 'static> Next<R> {
    pub(crate) fn new(inner: Pipeline, envelope: RequestEnvelope) -> Self {
        Self {
            inner,
            envelope,
            _result: PhantomData,
        }
    }

    /// Returns the key of the request being handled.
    pub fn key(&self) -> RoutingKey {
        self.envelope.key()
    }

    /// Runs the rest of the pipeline.
    ///
    /// A failure further in arrives as a boxed [`HandlerExecutionError`]
    /// naming the handler or middleware that failed; its
    /// [`downcast_ref`](HandlerExecutionError::downcast_ref) reaches the
    /// original error.
    pub async fn run(self) -> HandlerResult<Option<R>> {
        let key = self.envelope.key();
        match self.inner.oneshot(self.envelope).await? {
            Some(value) => coerce::<R>(value)
                .map(Some)
                .map_err(|_| PipelineError::result::<R>(key).into()),
            None => Ok(None),
        }
    }
}

impl<R> fmt::Debug for Next<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("key", &self.envelope.key())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// FromFn
// ============================================================================

/// Middleware built from an async closure. See [`MiddlewareDescriptor::from_fn`].
pub struct FromFn<F, Q, R> {
    f: F,
    _marker: PhantomData<fn(Q) -> R>,
}

#[async_trait]
impl<F, Fut, Q, R> Middleware<Q, R> for FromFn<F, Q, R>
where
    F: Fn(Q, Next<R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Option<R>>> + Send + 'static,
    Q: Message,
    R: Send + 'static,
{
    async fn handle(&self, request: &Q, next: Next<R>) -> HandlerResult<Option<R>> {
        (self.f)(request.clone(), next).await
    }
}

// ============================================================================
// Descriptors
// ============================================================================

type ErasedMiddlewareFn = Arc<
    dyn Fn(
            &Arc<dyn InstanceProvider>,
            RequestEnvelope,
            Pipeline,
        ) -> BoxFuture<'static, HandlerResult<Option<AnyResult>>>
        + Send
        + Sync,
>;

/// A middleware bound to its routing key.
#[derive(Clone)]
pub struct RegisteredMiddleware {
    key: RoutingKey,
    name: &'static str,
    invoke: ErasedMiddlewareFn,
}

impl RegisteredMiddleware {
    /// Returns the key the middleware applies to.
    pub fn key(&self) -> RoutingKey {
        self.key
    }

    /// Returns the middleware's name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for RegisteredMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredMiddleware")
            .field("key", &self.key)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Describes one middleware for registration.
#[derive(Clone, Debug)]
pub struct MiddlewareDescriptor {
    declared: Option<RoutingKey>,
    middleware: RegisteredMiddleware,
}

impl MiddlewareDescriptor {
    /// Describes a middleware value shared by every dispatch.
    pub fn new<Q, R, M>(middleware: M) -> Self
    where
        Q: Message,
        R: Send + 'static,
        M: Middleware<Q, R>,
    {
        let middleware = Arc::new(middleware);
        Self::erased::<Q, R, M>(move |_provider| Ok(Arc::clone(&middleware)))
    }

    /// Describes a middleware written as an async closure.
    pub fn from_fn<Q, R, F, Fut>(f: F) -> Self
    where
        Q: Message,
        R: Send + 'static,
        F: Fn(Q, Next<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Option<R>>> + Send + 'static,
    {
        let descriptor = Self::new::<Q, R, FromFn<F, Q, R>>(FromFn {
            f,
            _marker: PhantomData,
        });
        descriptor.named(std::any::type_name::<F>())
    }

    /// Describes a middleware type resolved through the instance provider on
    /// every dispatch.
    pub fn resolved<Q, R, M>() -> Self
    where
        Q: Message,
        R: Send + 'static,
        M: Middleware<Q, R>,
    {
        Self::erased::<Q, R, M>(|provider| provider.get::<M>().map_err(BoxError::from))
    }

    /// Attaches an explicitly declared key, checked at registration.
    pub fn for_key(mut self, key: RoutingKey) -> Self {
        self.declared = Some(key);
        self
    }

    /// Overrides the name used in logs and errors.
    pub fn named(mut self, name: &'static str) -> Self {
        self.middleware.name = name;
        self
    }

    /// Returns the key the descriptor registers under.
    pub fn key(&self) -> RoutingKey {
        self.declared.unwrap_or(self.middleware.key)
    }

    /// Returns the middleware's name.
    pub fn name(&self) -> &'static str {
        self.middleware.name
    }

    /// Checks the declared key against what the middleware handles.
    pub fn validate(&self) -> ConfigurationResult<()> {
        match self.declared {
            Some(declared) if declared != self.middleware.key => {
                Err(ConfigurationError::request_mismatch(
                    "middleware",
                    self.middleware.name,
                    declared,
                    self.middleware.key,
                ))
            }
            _ => Ok(()),
        }
    }

    /// Validates and yields the registered form.
    pub fn into_registered(self) -> ConfigurationResult<RegisteredMiddleware> {
        self.validate()?;
        Ok(self.middleware)
    }

    fn erased<Q, R, M>(
        acquire: impl Fn(&Arc<dyn InstanceProvider>) -> Result<Arc<M>, BoxError>
        + Send
        + Sync
        + 'static,
    ) -> Self
    where
        Q: Message,
        R: Send + 'static,
        M: Middleware<Q, R>,
    {
        let invoke: ErasedMiddlewareFn = Arc::new(
            move |provider: &Arc<dyn InstanceProvider>,
                  envelope: RequestEnvelope,
                  inner: Pipeline| {
                let middleware = acquire(provider);
                async move {
                    let middleware = middleware?;
                    let next = Next::<R>::new(inner, envelope.clone());
                    let Some(request) = envelope.downcast_ref::<Q>() else {
                        return Err(PipelineError::request::<Q>(envelope.key()).into());
                    };
                    let out = middleware.handle(request, next).await?;
                    Ok(out.and_then(erase_result))
                }
                .boxed()
            },
        );
        Self {
            declared: None,
            middleware: RegisteredMiddleware {
                key: RoutingKey::of::<Q, R>(),
                name: std::any::type_name::<M>(),
                invoke,
            },
        }
    }
}

// ============================================================================
// Tower layer
// ============================================================================

/// Wraps a pipeline in one registered middleware.
#[derive(Clone)]
pub struct MiddlewareLayer {
    middleware: RegisteredMiddleware,
    provider: Arc<dyn InstanceProvider>,
}

impl MiddlewareLayer {
    pub fn new(middleware: RegisteredMiddleware, provider: Arc<dyn InstanceProvider>) -> Self {
        Self {
            middleware,
            provider,
        }
    }
}

impl Layer<Pipeline> for MiddlewareLayer {
    type Service = MiddlewareService;

    fn layer(&self, inner: Pipeline) -> Self::Service {
        MiddlewareService {
            middleware: self.middleware.clone(),
            provider: Arc::clone(&self.provider),
            inner,
        }
    }
}

/// The service produced by [`MiddlewareLayer`].
#[derive(Clone)]
pub struct MiddlewareService {
    middleware: RegisteredMiddleware,
    provider: Arc<dyn InstanceProvider>,
    inner: Pipeline,
}

impl Service<RequestEnvelope> for MiddlewareService {
    type Response = Option<AnyResult>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // The inner pipeline is driven by `oneshot`, which polls readiness itself.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, envelope: RequestEnvelope) -> Self::Future {
        let name = self.middleware.name();
        let call = (self.middleware.invoke)(&self.provider, envelope, self.inner.clone());
        async move {
            // Errors that came out of `next` are already labelled and pass through.
            call.await
                .map_err(|e| BoxError::from(HandlerExecutionError::failed(name, e)))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use courier_core::InstanceRegistry;

    use super::*;
    use crate::handler::{HandlerService, RequestHandlerDescriptor};

    #[derive(Clone)]
    struct Lookup(u32);

    struct Double;

    #[async_trait]
    impl Middleware<Lookup, u32> for Double {
        async fn handle(&self, _request: &Lookup, next: Next<u32>) -> HandlerResult<Option<u32>> {
            Ok(next.run().await?.map(|v| v * 2))
        }
    }

    fn terminal() -> Pipeline {
        Pipeline::new(tower::service_fn(|envelope: RequestEnvelope| async move {
            let value = envelope.downcast_ref::<Lookup>().map(|l| l.0).unwrap_or(0);
            Ok::<_, BoxError>(Some(Box::new(value) as AnyResult))
        }))
    }

    #[test]
    fn test_descriptor_key_and_validation() {
        let descriptor = MiddlewareDescriptor::new(Double);
        assert_eq!(descriptor.key(), RoutingKey::of::<Lookup, u32>());
        assert!(descriptor.validate().is_ok());

        let mismatched =
            MiddlewareDescriptor::new(Double).for_key(RoutingKey::of::<Lookup, i64>());
        assert!(matches!(
            mismatched.validate(),
            Err(ConfigurationError::RequestShapeMismatch { kind: "middleware", .. })
        ));
    }

    #[tokio::test]
    async fn test_layer_wraps_pipeline() {
        let provider: Arc<dyn InstanceProvider> = Arc::new(InstanceRegistry::new());
        let middleware = MiddlewareDescriptor::new(Double).into_registered().unwrap();
        let service = MiddlewareLayer::new(middleware, provider).layer(terminal());

        let envelope = RequestEnvelope::new(RoutingKey::of::<Lookup, u32>(), Lookup(21));
        let out = service.oneshot(envelope).await.unwrap();
        assert_eq!(out.and_then(|v| v.downcast::<u32>().ok()).map(|b| *b), Some(42));
    }

    #[tokio::test]
    async fn test_from_fn_short_circuits() {
        let provider: Arc<dyn InstanceProvider> = Arc::new(InstanceRegistry::new());
        let middleware = MiddlewareDescriptor::from_fn(|_req: Lookup, _next: Next<u32>| async {
            Ok(Some(7))
        })
        .into_registered()
        .unwrap();
        let service = MiddlewareLayer::new(middleware, provider).layer(terminal());

        let envelope = RequestEnvelope::new(RoutingKey::of::<Lookup, u32>(), Lookup(1));
        let out = service.oneshot(envelope).await.unwrap();
        assert_eq!(out.and_then(|v| v.downcast::<u32>().ok()).map(|b| *b), Some(7));
    }

    #[tokio::test]
    async fn test_middleware_failure_names_the_middleware() {
        let provider: Arc<dyn InstanceProvider> = Arc::new(InstanceRegistry::new());
        let middleware = MiddlewareDescriptor::from_fn(|_req: Lookup, _next: Next<u32>| async {
            Err(BoxError::from("quota exceeded"))
        })
        .named("quota")
        .into_registered()
        .unwrap();
        let service = MiddlewareLayer::new(middleware, provider).layer(terminal());

        let envelope = RequestEnvelope::new(RoutingKey::of::<Lookup, u32>(), Lookup(1));
        let err = service.oneshot(envelope).await.unwrap_err();
        let err = err.downcast::<HandlerExecutionError>().unwrap();
        assert_eq!(err.origin(), "quota");
        assert_eq!(err.to_string(), "quota failed: quota exceeded");
    }

    #[tokio::test]
    async fn test_handler_failure_keeps_handler_name_through_middleware() {
        let provider: Arc<dyn InstanceProvider> = Arc::new(InstanceRegistry::new());
        let handler = RequestHandlerDescriptor::new(|_req: Lookup| async {
            Err::<u32, _>(BoxError::from("not found"))
        })
        .named("lookup")
        .into_registered()
        .unwrap();
        let terminal = Pipeline::new(HandlerService::new(handler, Arc::clone(&provider)));
        let middleware = MiddlewareDescriptor::new(Double)
            .named("double")
            .into_registered()
            .unwrap();
        let service = MiddlewareLayer::new(middleware, provider).layer(terminal);

        let envelope = RequestEnvelope::new(RoutingKey::of::<Lookup, u32>(), Lookup(1));
        let err = service.oneshot(envelope).await.unwrap_err();
        let err = err.downcast::<HandlerExecutionError>().unwrap();
        assert_eq!(err.origin(), "lookup");
        assert_eq!(err.to_string(), "lookup failed: not found");
    }

    #[tokio::test]
    async fn test_resolved_middleware_requires_binding() {
        let provider: Arc<dyn InstanceProvider> = Arc::new(InstanceRegistry::new());
        let middleware = MiddlewareDescriptor::resolved::<Lookup, u32, Double>()
            .into_registered()
            .unwrap();
        let service = MiddlewareLayer::new(middleware, provider).layer(terminal());

        let envelope = RequestEnvelope::new(RoutingKey::of::<Lookup, u32>(), Lookup(1));
        assert!(service.oneshot(envelope).await.is_err());
    }
}
