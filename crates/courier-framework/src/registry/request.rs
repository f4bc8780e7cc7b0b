//! Request handler registry.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use parking_lot::RwLock;
use tracing::{debug, warn};

use courier_core::{ConfigurationError, ConfigurationResult, RoutingKey};

use crate::handler::{RegisteredRequestHandler, RequestHandlerDescriptor};

/// Maps each routing key to the single handler that serves it.
///
/// The first handler registered for a key is permanent: a duplicate
/// registration fails and leaves it in place.
#[derive(Default)]
pub struct RequestRegistry {
    handlers: RwLock<HashMap<RoutingKey, RegisteredRequestHandler>>,
}

impl RequestRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `descriptor` and binds it to its key.
    pub fn register(&self, descriptor: RequestHandlerDescriptor) -> ConfigurationResult<()> {
        let key = descriptor.key();
        let handler = descriptor.into_registered()?;

        match self.handlers.write().entry(key) {
            Entry::Occupied(existing) => {
                warn!(
                    key = %key,
                    existing = existing.get().name(),
                    rejected = handler.name(),
                    "Duplicate request handler registration"
                );
                Err(ConfigurationError::DuplicateRequestHandler {
                    key,
                    existing: existing.get().name(),
                    rejected: handler.name(),
                })
            }
            Entry::Vacant(slot) => {
                debug!(key = %key, handler = handler.name(), "Registered request handler");
                slot.insert(handler);
                Ok(())
            }
        }
    }

    /// Returns the handler bound to `key`, if any.
    pub fn lookup(&self, key: &RoutingKey) -> Option<RegisteredRequestHandler> {
        self.handlers.read().get(key).cloned()
    }

    /// Returns `true` if a handler is bound to `key`.
    pub fn contains(&self, key: &RoutingKey) -> bool {
        self.handlers.read().contains_key(key)
    }

    /// Returns every bound key.
    pub fn keys(&self) -> Vec<RoutingKey> {
        self.handlers.read().keys().copied().collect()
    }

    /// Returns the number of bound handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Returns `true` if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl fmt::Debug for RequestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRegistry")
            .field("handler_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use courier_core::{BoxError, InstanceProvider, InstanceRegistry, RequestEnvelope};

    use super::*;

    #[derive(Clone)]
    struct CreateOrder;

    #[derive(Debug, PartialEq)]
    struct OrderId(u64);

    async fn h1(_cmd: CreateOrder) -> Result<OrderId, BoxError> {
        Ok(OrderId(1))
    }

    async fn h2(_cmd: CreateOrder) -> Result<OrderId, BoxError> {
        Ok(OrderId(2))
    }

    async fn label(_cmd: CreateOrder) -> Result<String, BoxError> {
        Ok("label".into())
    }

    #[tokio::test]
    async fn test_duplicate_registration_keeps_first() {
        let registry = RequestRegistry::new();
        registry.register(RequestHandlerDescriptor::new(h1)).unwrap();

        let err = registry
            .register(RequestHandlerDescriptor::new(h2))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateRequestHandler { .. }));
        assert_eq!(registry.len(), 1);

        let key = RoutingKey::of::<CreateOrder, OrderId>();
        let handler = registry.lookup(&key).unwrap();
        let provider: Arc<dyn InstanceProvider> = Arc::new(InstanceRegistry::new());
        let out = handler
            .invoke(&provider, RequestEnvelope::new(key, CreateOrder))
            .await
            .unwrap();
        assert_eq!(
            out.and_then(|v| v.downcast::<OrderId>().ok()).map(|b| *b),
            Some(OrderId(1))
        );
    }

    #[test]
    fn test_same_request_different_results_coexist() {
        let registry = RequestRegistry::new();
        registry.register(RequestHandlerDescriptor::new(h1)).unwrap();
        registry.register(RequestHandlerDescriptor::new(label)).unwrap();

        assert!(registry.contains(&RoutingKey::of::<CreateOrder, OrderId>()));
        assert!(registry.contains(&RoutingKey::of::<CreateOrder, String>()));
        assert!(registry.lookup(&RoutingKey::of::<CreateOrder, u8>()).is_none());
    }

    #[test]
    fn test_boxed_and_primitive_collide() {
        async fn as_int(_cmd: CreateOrder) -> Result<i32, BoxError> {
            Ok(1)
        }
        async fn as_boxed(_cmd: CreateOrder) -> Result<Box<i32>, BoxError> {
            Ok(Box::new(1))
        }

        let registry = RequestRegistry::new();
        registry.register(RequestHandlerDescriptor::new(as_int)).unwrap();
        assert!(
            registry
                .register(RequestHandlerDescriptor::new(as_boxed))
                .is_err()
        );
    }

    #[test]
    fn test_invalid_descriptor_is_not_registered() {
        let registry = RequestRegistry::new();
        let key = RoutingKey::of::<CreateOrder, u64>();
        assert!(
            registry
                .register(RequestHandlerDescriptor::with_key(key, h1))
                .is_err()
        );
        assert!(registry.is_empty());
    }
}
