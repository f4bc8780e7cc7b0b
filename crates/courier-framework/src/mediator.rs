//! The composition root: [`Mediator`], [`Publisher`] and their builder.
//!
//! ```rust,ignore
//! let mediator = Mediator::builder()
//!     .instance_provider(InstanceRegistry::new().with_singleton(OrderBook::default()))
//!     .requests(|r| {
//!         r.handler(|book: Arc<OrderBook>, cmd: CreateOrder| async move { book.place(cmd) })
//!             .middleware_fn(|cmd: CreateOrder, next: Next<OrderId>| async move {
//!                 tracing::info!(sku = %cmd.sku, "placing order");
//!                 next.run().await
//!             })
//!     })
//!     .events(|e| e.handler(send_confirmation).handler(update_stock))
//!     .build()?;
//!
//! let id: Option<OrderId> = mediator.send(CreateOrder { sku: "A-1".into() }).await?;
//! mediator.publish(OrderPlaced { id: id.unwrap() }).await?;
//! ```
//!
//! # Dispatch
//!
//! `send` derives a [`RoutingKey`] from the request and result types, looks
//! the handler up, wraps it in the middleware registered for that key and
//! hands the pipeline to the request strategy. `publish` looks up every
//! handler for the event's type and hands them, in registration order, to
//! the event strategy.

use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use courier_core::{
    ConfigurationError, ConfigurationResult, DispatchError, DispatchResult, Event, EventEnvelope,
    HandlerExecutionResult, InstanceProvider, Message, Request, RequestEnvelope, RoutingKey,
    coerce,
};

use crate::handler::{
    EventHandler, EventHandlerDescriptor, HandlerResult, HandlerService, RequestHandler,
    RequestHandlerDescriptor,
};
use crate::middleware::{Middleware, MiddlewareDescriptor, Next};
use crate::pipeline::MiddlewarePipelineBuilder;
use crate::registry::{EventRegistry, RequestRegistry};
use crate::source::{DEFAULT_THREAD_PREFIX, EventSource, EventSourceRegistry};
use crate::strategy::{
    BoundEventHandler, EventInvocationStrategy, InlineRequestStrategy, RequestInvocation,
    RequestInvocationStrategy, SequentialEventStrategy,
};

// =============================================================================
// Publisher
// =============================================================================

struct EventBus {
    registry: Arc<EventRegistry>,
    strategy: Arc<dyn EventInvocationStrategy>,
    provider: Arc<dyn InstanceProvider>,
    shutdown: CancellationToken,
}

/// The event half of a [`Mediator`], cheap to clone and hand to sources.
#[derive(Clone)]
pub struct Publisher {
    bus: Arc<EventBus>,
}

impl Publisher {
    /// Publishes `event` to every handler registered for its type.
    ///
    /// With no handlers this is a no-op. What happens on failure depends on
    /// the event strategy; the default returns the first handler error.
    pub async fn publish<E: Event>(&self, event: E) -> HandlerExecutionResult<()> {
        self.publish_envelope(EventEnvelope::new(event)).await
    }

    /// Publishes an already erased event.
    pub async fn publish_envelope(&self, envelope: EventEnvelope) -> HandlerExecutionResult<()> {
        let shape = envelope.shape();
        let handlers = self.bus.registry.lookup_all(&shape);
        if handlers.is_empty() {
            trace!(event = %shape, "No event handlers registered");
            return Ok(());
        }

        let bound = handlers
            .iter()
            .map(|h| BoundEventHandler::new(h.clone(), Arc::clone(&self.bus.provider)))
            .collect();

        self.bus
            .strategy
            .invoke_all(bound, envelope)
            .await
            .inspect_err(|err| error!(event = %shape, error = %err, "Event publication failed"))
    }

    /// Returns the token cancelled by [`Mediator::shutdown`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.bus.shutdown.clone()
    }

    /// Returns `true` once shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        self.bus.shutdown.is_cancelled()
    }

    /// Completes when shutdown is requested.
    pub async fn cancelled(&self) {
        self.bus.shutdown.cancelled().await
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("event_handlers", &self.bus.registry.len())
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Mediator
// =============================================================================

struct MediatorInner {
    provider: Arc<dyn InstanceProvider>,
    requests: Arc<RequestRegistry>,
    pipelines: Arc<MiddlewarePipelineBuilder>,
    strategy: Arc<dyn RequestInvocationStrategy>,
    publisher: Publisher,
    sources: Arc<EventSourceRegistry>,
}

/// Routes requests to their handler and events to their handlers.
///
/// Clones share the same registries.
#[derive(Clone)]
pub struct Mediator {
    inner: Arc<MediatorInner>,
}

impl Mediator {
    pub fn builder() -> MediatorBuilder {
        MediatorBuilder::new()
    }

    /// Sends `request` to the handler registered for `(Q, R)`.
    ///
    /// Returns `Ok(None)` when the handler produces `()` or when the request
    /// strategy does not wait for a result.
    pub async fn send<Q, R>(&self, request: Q) -> DispatchResult<Option<R>>
    where
        Q: Request<R>,
        R: Send + 'static,
    {
        let key = RoutingKey::of::<Q, R>();
        let Some(handler) = self.inner.requests.lookup(&key) else {
            let err = DispatchError::NoHandler { key };
            error!(error = %err, "Dispatch failed");
            return Err(err);
        };

        let name = handler.name();
        let terminal = HandlerService::new(handler, Arc::clone(&self.inner.provider));
        let pipeline = self
            .inner
            .pipelines
            .build_pipeline(&key, &self.inner.provider, terminal);
        let invocation = RequestInvocation::new(pipeline, RequestEnvelope::new(key, request), name);

        trace!(key = %key, handler = name, "Dispatching request");
        let outcome = self.inner.strategy.invoke(invocation).await.map_err(|err| {
            error!(key = %key, error = %err, "Request handler failed");
            DispatchError::from(err)
        })?;

        match outcome {
            None => Ok(None),
            Some(value) => coerce::<R>(value).map(Some).map_err(|_| {
                let err = DispatchError::ResultTypeMismatch {
                    key,
                    expected: type_name::<R>(),
                };
                error!(error = %err, "Dispatch failed");
                err
            }),
        }
    }

    /// Publishes `event`. See [`Publisher::publish`].
    pub async fn publish<E: Event>(&self, event: E) -> HandlerExecutionResult<()> {
        self.inner.publisher.publish(event).await
    }

    /// Returns a publisher sharing this mediator's event registry.
    pub fn publisher(&self) -> Publisher {
        self.inner.publisher.clone()
    }

    /// Registers a request handler after construction.
    pub fn register_request_handler(
        &self,
        descriptor: RequestHandlerDescriptor,
    ) -> ConfigurationResult<()> {
        self.inner.requests.register(descriptor)
    }

    /// Registers an event handler after construction.
    pub fn register_event_handler(
        &self,
        descriptor: EventHandlerDescriptor,
    ) -> ConfigurationResult<()> {
        self.inner.publisher.bus.registry.register(descriptor)
    }

    /// Returns `true` if a handler is registered for `(Q, R)`.
    pub fn handles<Q, R>(&self) -> bool
    where
        Q: Request<R>,
        R: Send + 'static,
    {
        self.inner.requests.contains(&RoutingKey::of::<Q, R>())
    }

    pub fn request_registry(&self) -> &RequestRegistry {
        &self.inner.requests
    }

    pub fn event_registry(&self) -> &EventRegistry {
        &self.inner.publisher.bus.registry
    }

    pub fn event_sources(&self) -> &EventSourceRegistry {
        &self.inner.sources
    }

    /// Starts the registered event sources if that has not happened yet.
    pub fn start_sources(&self) {
        if !self.inner.sources.is_started() {
            self.inner.sources.start_all(&self.inner.publisher);
        }
    }

    /// Signals sources to stop. Handlers already running are not interrupted.
    pub fn shutdown(&self) {
        if !self.inner.publisher.is_shutdown() {
            info!("Mediator shutting down");
            self.inner.publisher.bus.shutdown.cancel();
        }
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) was called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.publisher.is_shutdown()
    }
}

impl fmt::Debug for Mediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mediator")
            .field("requests", &self.inner.requests)
            .field("middleware", &self.inner.pipelines)
            .field("events", &self.inner.publisher.bus.registry)
            .field("sources", &self.inner.sources)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Request-side registrations collected by [`MediatorBuilder::requests`].
#[derive(Default)]
pub struct RequestSetup {
    handlers: Vec<RequestHandlerDescriptor>,
    middleware: Vec<MiddlewareDescriptor>,
    strategy: Option<Arc<dyn RequestInvocationStrategy>>,
}

impl RequestSetup {
    /// Adds a handler; its key comes from its request and result types.
    pub fn handler<Q, O, M, H>(self, handler: H) -> Self
    where
        Q: Message,
        O: Send + 'static,
        H: RequestHandler<Q, O, M>,
    {
        self.descriptor(RequestHandlerDescriptor::new::<Q, O, M, H>(handler))
    }

    /// Adds a handler descriptor produced elsewhere.
    pub fn descriptor(mut self, descriptor: RequestHandlerDescriptor) -> Self {
        self.handlers.push(descriptor);
        self
    }

    /// Adds several handler descriptors, keeping their order.
    pub fn descriptors(
        mut self,
        descriptors: impl IntoIterator<Item = RequestHandlerDescriptor>,
    ) -> Self {
        self.handlers.extend(descriptors);
        self
    }

    /// Adds a middleware value for the `(Q, R)` key.
    pub fn middleware<Q, R, W>(self, middleware: W) -> Self
    where
        Q: Message,
        R: Send + 'static,
        W: Middleware<Q, R>,
    {
        self.middleware_descriptor(MiddlewareDescriptor::new::<Q, R, W>(middleware))
    }

    /// Adds an async closure as middleware for the `(Q, R)` key.
    pub fn middleware_fn<Q, R, F, Fut>(self, f: F) -> Self
    where
        Q: Message,
        R: Send + 'static,
        F: Fn(Q, Next<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Option<R>>> + Send + 'static,
    {
        self.middleware_descriptor(MiddlewareDescriptor::from_fn::<Q, R, F, Fut>(f))
    }

    /// Adds a middleware descriptor produced elsewhere.
    pub fn middleware_descriptor(mut self, descriptor: MiddlewareDescriptor) -> Self {
        self.middleware.push(descriptor);
        self
    }

    /// Replaces the default [`InlineRequestStrategy`].
    pub fn strategy<S: RequestInvocationStrategy>(mut self, strategy: S) -> Self {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    /// Returns `true` if a strategy was set.
    pub fn has_strategy(&self) -> bool {
        self.strategy.is_some()
    }
}

/// Event-side registrations collected by [`MediatorBuilder::events`].
#[derive(Default)]
pub struct EventSetup {
    handlers: Vec<EventHandlerDescriptor>,
    sources: Vec<Arc<dyn EventSource>>,
    strategy: Option<Arc<dyn EventInvocationStrategy>>,
}

impl EventSetup {
    /// Adds a handler for the event type it accepts.
    pub fn handler<E, M, H>(self, handler: H) -> Self
    where
        E: Event,
        H: EventHandler<E, M>,
    {
        self.descriptor(EventHandlerDescriptor::new::<E, M, H>(handler))
    }

    /// Adds a handler descriptor produced elsewhere.
    pub fn descriptor(mut self, descriptor: EventHandlerDescriptor) -> Self {
        self.handlers.push(descriptor);
        self
    }

    /// Adds several handler descriptors, keeping their order.
    pub fn descriptors(
        mut self,
        descriptors: impl IntoIterator<Item = EventHandlerDescriptor>,
    ) -> Self {
        self.handlers.extend(descriptors);
        self
    }

    /// Adds a background event source.
    pub fn source<S: EventSource>(mut self, source: S) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Replaces the default [`SequentialEventStrategy`].
    pub fn strategy<S: EventInvocationStrategy>(mut self, strategy: S) -> Self {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    /// Returns `true` if a strategy was set.
    pub fn has_strategy(&self) -> bool {
        self.strategy.is_some()
    }
}

/// Builder for [`Mediator`].
pub struct MediatorBuilder {
    provider: Option<Arc<dyn InstanceProvider>>,
    requests: RequestSetup,
    events: EventSetup,
    thread_prefix: String,
    autostart_sources: bool,
}

impl Default for MediatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MediatorBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            requests: RequestSetup::default(),
            events: EventSetup::default(),
            thread_prefix: DEFAULT_THREAD_PREFIX.to_string(),
            autostart_sources: true,
        }
    }

    /// Sets the provider that resolves handler owners. Required.
    pub fn instance_provider<P: InstanceProvider>(self, provider: P) -> Self {
        self.shared_instance_provider(Arc::new(provider))
    }

    /// Sets an already shared instance provider.
    pub fn shared_instance_provider(mut self, provider: Arc<dyn InstanceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Configures request handlers, middleware and the request strategy.
    ///
    /// May be called more than once; registrations accumulate.
    pub fn requests(mut self, configure: impl FnOnce(RequestSetup) -> RequestSetup) -> Self {
        self.requests = configure(std::mem::take(&mut self.requests));
        self
    }

    /// Configures event handlers, sources and the event strategy.
    ///
    /// May be called more than once; registrations accumulate.
    pub fn events(mut self, configure: impl FnOnce(EventSetup) -> EventSetup) -> Self {
        self.events = configure(std::mem::take(&mut self.events));
        self
    }

    /// Sets the name prefix of source worker threads.
    pub fn source_thread_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_prefix = prefix.into();
        self
    }

    /// Whether `build` starts the event sources. Defaults to `true`.
    pub fn autostart_sources(mut self, enabled: bool) -> Self {
        self.autostart_sources = enabled;
        self
    }

    /// Validates and applies every registration, in order, and returns the
    /// mediator.
    ///
    /// On error nothing built so far escapes and no source has started.
    pub fn build(self) -> ConfigurationResult<Mediator> {
        let provider = self
            .provider
            .ok_or(ConfigurationError::MissingInstanceProvider)?;

        let requests = RequestRegistry::new();
        for descriptor in self.requests.handlers {
            requests.register(descriptor)?;
        }

        let pipelines = MiddlewarePipelineBuilder::new();
        for descriptor in self.requests.middleware {
            pipelines.register(descriptor)?;
        }

        let events = EventRegistry::new();
        for descriptor in self.events.handlers {
            events.register(descriptor)?;
        }

        let sources = EventSourceRegistry::with_thread_prefix(self.thread_prefix);
        for source in self.events.sources {
            sources.register_arc(source);
        }

        let request_strategy = self
            .requests
            .strategy
            .unwrap_or_else(|| Arc::new(InlineRequestStrategy));
        let event_strategy = self
            .events
            .strategy
            .unwrap_or_else(|| Arc::new(SequentialEventStrategy));

        let publisher = Publisher {
            bus: Arc::new(EventBus {
                registry: Arc::new(events),
                strategy: event_strategy,
                provider: Arc::clone(&provider),
                shutdown: CancellationToken::new(),
            }),
        };

        info!(
            request_handlers = requests.len(),
            middleware = pipelines.len(),
            event_handlers = publisher.bus.registry.len(),
            sources = sources.len(),
            "Mediator built"
        );

        let mediator = Mediator {
            inner: Arc::new(MediatorInner {
                provider,
                requests: Arc::new(requests),
                pipelines: Arc::new(pipelines),
                strategy: request_strategy,
                publisher,
                sources: Arc::new(sources),
            }),
        };

        if self.autostart_sources {
            mediator.start_sources();
        } else if !mediator.inner.sources.is_empty() {
            debug!("Event sources registered but not started");
        }
        Ok(mediator)
    }
}

impl fmt::Debug for MediatorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediatorBuilder")
            .field("has_provider", &self.provider.is_some())
            .field("request_handlers", &self.requests.handlers.len())
            .field("middleware", &self.requests.middleware.len())
            .field("event_handlers", &self.events.handlers.len())
            .field("sources", &self.events.sources.len())
            .field("autostart_sources", &self.autostart_sources)
            .finish_non_exhaustive()
    }
}
