//! Registration descriptors and their type-erased handlers.
//!
//! A descriptor is what handler discovery hands to the registries: the erased
//! callable plus the key it was written for and, optionally, the key it was
//! declared under. Registries compare the two before accepting it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture};

use courier_core::{
    AnyResult, BoxError, ConfigurationError, ConfigurationResult, EventEnvelope, InstanceProvider,
    Message, RequestEnvelope, RoutingKey, Shape,
};

use super::traits::{EventHandler, HandlerResult, RequestHandler};
use crate::error::PipelineError;

type ErasedFuture = BoxFuture<'static, HandlerResult<Option<AnyResult>>>;

type ErasedRequestFn =
    Arc<dyn Fn(&Arc<dyn InstanceProvider>, RequestEnvelope) -> ErasedFuture + Send + Sync>;

type ErasedEventFn = Arc<
    dyn Fn(&Arc<dyn InstanceProvider>, EventEnvelope) -> BoxFuture<'static, HandlerResult<()>>
        + Send
        + Sync,
>;

/// Erases a produced value. Unit results erase to nothing.
pub(crate) fn erase_result<O: Send + 'static>(value: O) -> Option<AnyResult> {
    if Shape::of::<O>().is_unit() {
        None
    } else {
        Some(Box::new(value) as Box<dyn Any + Send>)
    }
}

// ============================================================================
// Request handlers
// ============================================================================

/// A request handler bound to its routing key.
#[derive(Clone)]
pub struct RegisteredRequestHandler {
    key: RoutingKey,
    name: &'static str,
    invoke: ErasedRequestFn,
}

impl RegisteredRequestHandler {
    /// Returns the key the handler serves.
    pub fn key(&self) -> RoutingKey {
        self.key
    }

    /// Returns the handler's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Runs the handler against an envelope.
    pub fn invoke(
        &self,
        provider: &Arc<dyn InstanceProvider>,
        envelope: RequestEnvelope,
    ) -> BoxFuture<'static, HandlerResult<Option<AnyResult>>> {
        (self.invoke)(provider, envelope)
    }
}

impl fmt::Debug for RegisteredRequestHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredRequestHandler")
            .field("key", &self.key)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Describes one request handler for registration.
///
/// # Example
///
/// ```rust,ignore
/// async fn create_order(cmd: CreateOrder) -> Result<OrderId, BoxError> { ... }
///
/// let descriptor = RequestHandlerDescriptor::new(create_order);
/// let explicit = RequestHandlerDescriptor::with_key(
///     RoutingKey::of::<CreateOrder, OrderId>(),
///     create_order,
/// );
/// ```
#[derive(Clone, Debug)]
pub struct RequestHandlerDescriptor {
    declared: Option<RoutingKey>,
    handler: RegisteredRequestHandler,
}

impl RequestHandlerDescriptor {
    /// Describes `handler` under the key derived from its own types.
    pub fn new<Q, O, M, H>(handler: H) -> Self
    where
        Q: Message,
        O: Send + 'static,
        H: RequestHandler<Q, O, M>,
    {
        let key = RoutingKey::of::<Q, O>();
        let invoke: ErasedRequestFn = Arc::new(
            move |provider: &Arc<dyn InstanceProvider>, envelope: RequestEnvelope| {
                let Some(request) = envelope.downcast_ref::<Q>().cloned() else {
                    let err = BoxError::from(PipelineError::request::<Q>(envelope.key()));
                    return future::ready(Err(err)).boxed();
                };
                handler
                    .call(provider, request)
                    .map(|res| res.map(erase_result))
                    .boxed()
            },
        );
        Self {
            declared: None,
            handler: RegisteredRequestHandler {
                key,
                name: std::any::type_name::<H>(),
                invoke,
            },
        }
    }

    /// Describes `handler` under an explicitly declared key.
    ///
    /// The declaration is checked when the descriptor is registered.
    pub fn with_key<Q, O, M, H>(key: RoutingKey, handler: H) -> Self
    where
        Q: Message,
        O: Send + 'static,
        H: RequestHandler<Q, O, M>,
    {
        Self {
            declared: Some(key),
            ..Self::new::<Q, O, M, H>(handler)
        }
    }

    /// Overrides the name used in logs and errors.
    pub fn named(mut self, name: &'static str) -> Self {
        self.handler.name = name;
        self
    }

    /// Returns the key the descriptor registers under.
    pub fn key(&self) -> RoutingKey {
        self.declared.unwrap_or(self.handler.key)
    }

    /// Returns the handler's name.
    pub fn name(&self) -> &'static str {
        self.handler.name
    }

    /// Checks the declared key against what the handler accepts and returns.
    pub fn validate(&self) -> ConfigurationResult<()> {
        match self.declared {
            Some(declared) if declared != self.handler.key => {
                Err(ConfigurationError::request_mismatch(
                    "request handler",
                    self.handler.name,
                    declared,
                    self.handler.key,
                ))
            }
            _ => Ok(()),
        }
    }

    /// Validates and yields the registered form.
    pub fn into_registered(self) -> ConfigurationResult<RegisteredRequestHandler> {
        self.validate()?;
        Ok(self.handler)
    }
}

// ============================================================================
// Event handlers
// ============================================================================

/// An event handler bound to its event shape.
#[derive(Clone)]
pub struct RegisteredEventHandler {
    shape: Shape,
    name: &'static str,
    invoke: ErasedEventFn,
}

impl RegisteredEventHandler {
    /// Returns the event shape the handler accepts.
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Returns the handler's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Runs the handler against an envelope.
    pub fn invoke(
        &self,
        provider: &Arc<dyn InstanceProvider>,
        envelope: EventEnvelope,
    ) -> BoxFuture<'static, HandlerResult<()>> {
        (self.invoke)(provider, envelope)
    }
}

impl fmt::Debug for RegisteredEventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredEventHandler")
            .field("shape", &self.shape)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Describes one event handler for registration.
#[derive(Clone, Debug)]
pub struct EventHandlerDescriptor {
    declared: Option<Shape>,
    handler: RegisteredEventHandler,
}

impl EventHandlerDescriptor {
    /// Describes `handler` under the event type it accepts.
    pub fn new<E, M, H>(handler: H) -> Self
    where
        E: Message,
        H: EventHandler<E, M>,
    {
        let invoke: ErasedEventFn = Arc::new(
            move |provider: &Arc<dyn InstanceProvider>, envelope: EventEnvelope| {
                let Some(event) = envelope.downcast_ref::<E>().cloned() else {
                    let err = BoxError::from(PipelineError::event::<E>(envelope.shape()));
                    return future::ready(Err(err)).boxed();
                };
                handler.call(provider, event)
            },
        );
        Self {
            declared: None,
            handler: RegisteredEventHandler {
                shape: Shape::of::<E>(),
                name: std::any::type_name::<H>(),
                invoke,
            },
        }
    }

    /// Describes `handler` under an explicitly declared event shape.
    pub fn with_shape<E, M, H>(shape: Shape, handler: H) -> Self
    where
        E: Message,
        H: EventHandler<E, M>,
    {
        Self {
            declared: Some(shape),
            ..Self::new::<E, M, H>(handler)
        }
    }

    /// Overrides the name used in logs and errors.
    pub fn named(mut self, name: &'static str) -> Self {
        self.handler.name = name;
        self
    }

    /// Returns the shape the descriptor registers under.
    pub fn shape(&self) -> Shape {
        self.declared.unwrap_or(self.handler.shape)
    }

    /// Returns the handler's name.
    pub fn name(&self) -> &'static str {
        self.handler.name
    }

    /// Checks the declared shape against what the handler accepts.
    pub fn validate(&self) -> ConfigurationResult<()> {
        match self.declared {
            Some(declared) if declared != self.handler.shape => {
                Err(ConfigurationError::EventShapeMismatch {
                    name: self.handler.name,
                    declared,
                    accepted: self.handler.shape,
                })
            }
            _ => Ok(()),
        }
    }

    /// Validates and yields the registered form.
    pub fn into_registered(self) -> ConfigurationResult<RegisteredEventHandler> {
        self.validate()?;
        Ok(self.handler)
    }
}

#[cfg(test)]
mod tests {
    use courier_core::InstanceRegistry;

    use super::*;

    #[derive(Clone)]
    struct CreateOrder;

    #[derive(Debug, PartialEq)]
    struct OrderId(u64);

    #[derive(Clone)]
    struct OrderPlaced;

    async fn create_order(_cmd: CreateOrder) -> Result<OrderId, BoxError> {
        Ok(OrderId(7))
    }

    async fn record(_cmd: CreateOrder) -> Result<(), BoxError> {
        Ok(())
    }

    async fn on_placed(_event: OrderPlaced) -> Result<(), BoxError> {
        Ok(())
    }

    fn provider() -> Arc<dyn InstanceProvider> {
        Arc::new(InstanceRegistry::new())
    }

    #[test]
    fn test_descriptor_derives_key() {
        let descriptor = RequestHandlerDescriptor::new(create_order);
        assert_eq!(descriptor.key(), RoutingKey::of::<CreateOrder, OrderId>());
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_declared_key_mismatch_is_rejected() {
        let key = RoutingKey::of::<CreateOrder, String>();
        let descriptor = RequestHandlerDescriptor::with_key(key, create_order);
        assert!(matches!(
            descriptor.validate(),
            Err(ConfigurationError::RequestShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_declared_boxed_key_is_accepted() {
        async fn count(_cmd: CreateOrder) -> Result<u32, BoxError> {
            Ok(1)
        }
        let key = RoutingKey::of::<CreateOrder, Box<u32>>();
        let descriptor = RequestHandlerDescriptor::with_key(key, count);
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_event_shape_mismatch_is_rejected() {
        let descriptor = EventHandlerDescriptor::with_shape(Shape::of::<CreateOrder>(), on_placed);
        assert!(matches!(
            descriptor.validate(),
            Err(ConfigurationError::EventShapeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_erased_invocation() {
        let handler = RequestHandlerDescriptor::new(create_order)
            .into_registered()
            .unwrap();
        let envelope = RequestEnvelope::new(handler.key(), CreateOrder);
        let value = handler.invoke(&provider(), envelope).await.unwrap();
        let id = value.and_then(|v| v.downcast::<OrderId>().ok());
        assert_eq!(id.map(|b| *b), Some(OrderId(7)));
    }

    #[tokio::test]
    async fn test_unit_result_erases_to_none() {
        let handler = RequestHandlerDescriptor::new(record)
            .into_registered()
            .unwrap();
        let envelope = RequestEnvelope::new(handler.key(), CreateOrder);
        assert!(handler.invoke(&provider(), envelope).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wrong_payload_is_an_error() {
        let handler = RequestHandlerDescriptor::new(create_order)
            .into_registered()
            .unwrap();
        let envelope = RequestEnvelope::new(handler.key(), OrderPlaced);
        let err = handler.invoke(&provider(), envelope).await.unwrap_err();
        assert!(err.downcast_ref::<PipelineError>().is_some());
    }

    #[tokio::test]
    async fn test_owner_is_resolved_per_call() {
        struct Counter(std::sync::atomic::AtomicUsize);

        async fn bump(counter: Arc<Counter>, _cmd: CreateOrder) -> Result<usize, BoxError> {
            Ok(counter.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1)
        }

        let provider: Arc<dyn InstanceProvider> = Arc::new(
            InstanceRegistry::new().with_factory(|| Ok(Counter(Default::default()))),
        );
        let handler = RequestHandlerDescriptor::new(bump).into_registered().unwrap();
        for _ in 0..2 {
            let envelope = RequestEnvelope::new(handler.key(), CreateOrder);
            let out = handler.invoke(&provider, envelope).await.unwrap();
            // A fresh owner each call, so the counter never passes one.
            assert_eq!(out.and_then(|v| v.downcast::<usize>().ok()).map(|b| *b), Some(1));
        }
    }
}
