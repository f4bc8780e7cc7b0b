//! Event handler registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use courier_core::{ConfigurationResult, Shape};

use crate::handler::{EventHandlerDescriptor, RegisteredEventHandler};

/// Maps each event shape to its handlers in registration order.
///
/// Registering the same handler twice is allowed; it then runs twice.
#[derive(Default)]
pub struct EventRegistry {
    handlers: RwLock<HashMap<Shape, Arc<[RegisteredEventHandler]>>>,
}

impl EventRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `descriptor` and appends it to its shape's list.
    pub fn register(&self, descriptor: EventHandlerDescriptor) -> ConfigurationResult<()> {
        let shape = descriptor.shape();
        let handler = descriptor.into_registered()?;
        let name = handler.name();

        let mut handlers = self.handlers.write();
        let list = handlers.entry(shape).or_insert_with(|| Arc::from(Vec::new()));
        let mut updated = list.to_vec();
        updated.push(handler);
        *list = Arc::from(updated);

        debug!(event = %shape, handler = name, position = list.len(), "Registered event handler");
        Ok(())
    }

    /// Returns every handler for `shape` in registration order.
    ///
    /// The returned slice is a snapshot; later registrations do not affect it.
    pub fn lookup_all(&self, shape: &Shape) -> Arc<[RegisteredEventHandler]> {
        self.handlers
            .read()
            .get(shape)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Returns the number of shapes with at least one handler.
    pub fn shape_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Returns the total number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().values().map(|list| list.len()).sum()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("shape_count", &self.shape_count())
            .field("handler_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use courier_core::{BoxError, ConfigurationError};

    use super::*;

    #[derive(Clone)]
    struct OrderPlaced;

    #[derive(Clone)]
    struct OrderCancelled;

    async fn a(_e: OrderPlaced) -> Result<(), BoxError> {
        Ok(())
    }

    async fn b(_e: OrderPlaced) -> Result<(), BoxError> {
        Ok(())
    }

    #[test]
    fn test_lookup_all_preserves_order_and_duplicates() {
        let registry = EventRegistry::new();
        registry.register(EventHandlerDescriptor::new(a).named("a")).unwrap();
        registry.register(EventHandlerDescriptor::new(b).named("b")).unwrap();
        registry.register(EventHandlerDescriptor::new(a).named("a")).unwrap();

        let names: Vec<_> = registry
            .lookup_all(&Shape::of::<OrderPlaced>())
            .iter()
            .map(|h| h.name())
            .collect();
        assert_eq!(names, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_unknown_shape_is_empty() {
        let registry = EventRegistry::new();
        registry.register(EventHandlerDescriptor::new(a)).unwrap();
        assert!(registry.lookup_all(&Shape::of::<OrderCancelled>()).is_empty());
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_registrations() {
        let registry = EventRegistry::new();
        registry.register(EventHandlerDescriptor::new(a)).unwrap();
        let snapshot = registry.lookup_all(&Shape::of::<OrderPlaced>());
        registry.register(EventHandlerDescriptor::new(b)).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.lookup_all(&Shape::of::<OrderPlaced>()).len(), 2);
    }

    #[test]
    fn test_mismatched_shape_is_rejected() {
        let registry = EventRegistry::new();
        let descriptor = EventHandlerDescriptor::with_shape(Shape::of::<OrderCancelled>(), a);
        assert!(matches!(
            registry.register(descriptor),
            Err(ConfigurationError::EventShapeMismatch { .. })
        ));
        assert!(registry.is_empty());
    }
}
