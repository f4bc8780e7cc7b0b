//! Message traits and the type-erased envelopes that carry them.
//!
//! - [`Message`] - anything that can travel through the mediator
//! - [`Request<R>`] - a message answered by exactly one handler with an `R`
//! - [`Event`] - a message delivered to any number of handlers
//!
//! Envelopes hold the payload behind an `Arc<dyn Any>` so strategies, callbacks
//! and retries can share the exact value the caller submitted.
//!
//! # Example
//!
//! ```rust,ignore
//! #[derive(Clone)]
//! struct CreateOrder { sku: String }
//!
//! struct OrderId(u64);
//!
//! impl Request<OrderId> for CreateOrder {}
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::key::RoutingKey;
use crate::shape::Shape;

/// Base bound for every value routed by the mediator.
pub trait Message: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Message for T {}

/// A message answered by a single handler producing `R`.
///
/// A type may implement this for several result types; each pairing routes to
/// its own handler.
pub trait Request<R: Send + 'static>: Message {}

/// A message published to zero or more handlers.
pub trait Event: Message {}

impl<T: Message> Event for T {}

// ============================================================================
// RequestEnvelope
// ============================================================================

/// A request in flight, tagged with its routing key.
#[derive(Clone)]
pub struct RequestEnvelope {
    key: RoutingKey,
    payload: Arc<dyn Any + Send + Sync>,
}

impl RequestEnvelope {
    /// Wraps `request` under `key`.
    pub fn new<Q: Message>(key: RoutingKey, request: Q) -> Self {
        Self {
            key,
            payload: Arc::new(request),
        }
    }

    /// Returns the routing key.
    pub fn key(&self) -> RoutingKey {
        self.key
    }

    /// Returns the request if it is a `Q`.
    pub fn downcast_ref<Q: 'static>(&self) -> Option<&Q> {
        self.payload.downcast_ref::<Q>()
    }

    /// Returns `true` if the payload is a `Q`.
    pub fn is<Q: 'static>(&self) -> bool {
        self.payload.is::<Q>()
    }
}

impl fmt::Debug for RequestEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestEnvelope")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// EventEnvelope
// ============================================================================

/// An event in flight, tagged with its shape.
#[derive(Clone)]
pub struct EventEnvelope {
    shape: Shape,
    payload: Arc<dyn Any + Send + Sync>,
}

impl EventEnvelope {
    /// Wraps `event`.
    pub fn new<E: Event>(event: E) -> Self {
        Self {
            shape: Shape::of::<E>(),
            payload: Arc::new(event),
        }
    }

    /// Returns the event shape.
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Returns the event if it is an `E`.
    pub fn downcast_ref<E: 'static>(&self) -> Option<&E> {
        self.payload.downcast_ref::<E>()
    }

    /// Returns `true` if the payload is an `E`.
    pub fn is<E: 'static>(&self) -> bool {
        self.payload.is::<E>()
    }
}

impl fmt::Debug for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEnvelope")
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Ping(u8);

    impl Request<u8> for Ping {}

    #[test]
    fn test_request_envelope_downcast() {
        let envelope = RequestEnvelope::new(RoutingKey::of::<Ping, u8>(), Ping(3));
        assert!(envelope.is::<Ping>());
        assert_eq!(envelope.downcast_ref::<Ping>(), Some(&Ping(3)));
        assert!(envelope.downcast_ref::<String>().is_none());
    }

    #[test]
    fn test_event_envelope_clone_shares_payload() {
        let envelope = EventEnvelope::new(Ping(9));
        let copy = envelope.clone();
        assert_eq!(copy.shape(), Shape::of::<Ping>());
        assert!(std::ptr::eq(
            envelope.downcast_ref::<Ping>().unwrap(),
            copy.downcast_ref::<Ping>().unwrap()
        ));
    }
}
