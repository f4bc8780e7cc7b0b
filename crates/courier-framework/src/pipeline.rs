//! Middleware pipeline composition.
//!
//! [`MiddlewarePipelineBuilder`] keeps the middleware registered per routing
//! key and folds them around a terminal service on demand:
//!
//! ```text
//! register order:  m1, m2, m3
//! composed:        m1( m2( m3( handler ) ) )
//! entry order:     m1 → m2 → m3 → handler
//! exit order:      handler → m3 → m2 → m1
//! ```
//!
//! Each middleware becomes a tower [`Layer`]; the composed chain is a
//! [`Pipeline`], a boxed, cloneable service that strategies may call more
//! than once.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Service};
use tower_layer::Layer;
use tracing::{debug, trace};

use courier_core::{AnyResult, ConfigurationResult, InstanceProvider, RequestEnvelope, RoutingKey};

use crate::middleware::{MiddlewareDescriptor, MiddlewareLayer, RegisteredMiddleware};

/// A composed request pipeline.
pub type Pipeline = BoxCloneSyncService<RequestEnvelope, Option<AnyResult>, BoxError>;

/// Owns the ordered middleware lists and composes pipelines from them.
///
/// Lists are stored behind `Arc` and replaced on write, so a pipeline being
/// built never observes a half-applied registration.
#[derive(Default)]
pub struct MiddlewarePipelineBuilder {
    middleware: RwLock<HashMap<RoutingKey, Arc<[RegisteredMiddleware]>>>,
}

impl MiddlewarePipelineBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `descriptor` and appends it to its key's list.
    pub fn register(&self, descriptor: MiddlewareDescriptor) -> ConfigurationResult<()> {
        let middleware = descriptor.into_registered()?;
        let key = middleware.key();
        let name = middleware.name();

        let mut lists = self.middleware.write();
        let list = lists.entry(key).or_insert_with(|| Arc::from(Vec::new()));
        let mut updated = list.to_vec();
        updated.push(middleware);
        *list = Arc::from(updated);

        debug!(key = %key, middleware = name, position = list.len(), "Registered middleware");
        Ok(())
    }

    /// Returns the middleware registered for `key`, in registration order.
    pub fn middleware_for(&self, key: &RoutingKey) -> Arc<[RegisteredMiddleware]> {
        self.middleware
            .read()
            .get(key)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Returns the total number of registered middleware.
    pub fn len(&self) -> usize {
        self.middleware.read().values().map(|list| list.len()).sum()
    }

    /// Returns `true` if no middleware is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Composes the middleware for `key` around `terminal`.
    ///
    /// The list is folded from last-registered to first-registered, so the
    /// first-registered middleware ends up outermost.
    pub fn build_pipeline<S>(
        &self,
        key: &RoutingKey,
        provider: &Arc<dyn InstanceProvider>,
        terminal: S,
    ) -> Pipeline
    where
        S: Service<RequestEnvelope, Response = Option<AnyResult>, Error = BoxError>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        let middleware = self.middleware_for(key);
        trace!(key = %key, layers = middleware.len(), "Composing pipeline");

        middleware
            .iter()
            .rev()
            .fold(Pipeline::new(terminal), |inner, m| {
                Pipeline::new(MiddlewareLayer::new(m.clone(), Arc::clone(provider)).layer(inner))
            })
    }
}

impl fmt::Debug for MiddlewarePipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewarePipelineBuilder")
            .field("middleware_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use tower::ServiceExt;

    use courier_core::{BoxError, ConfigurationError, InstanceRegistry};

    use super::*;
    use crate::handler::{HandlerService, RequestHandlerDescriptor};
    use crate::middleware::Next;

    #[derive(Clone)]
    struct Quote;

    fn provider() -> Arc<dyn InstanceProvider> {
        Arc::new(InstanceRegistry::new())
    }

    fn recording(
        log: &Arc<Mutex<Vec<String>>>,
        label: &'static str,
    ) -> MiddlewareDescriptor {
        let log = Arc::clone(log);
        MiddlewareDescriptor::from_fn(move |_q: Quote, next: Next<u32>| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(format!("enter {label}"));
                let out = next.run().await;
                log.lock().push(format!("exit {label}"));
                out
            }
        })
    }

    fn terminal(log: &Arc<Mutex<Vec<String>>>, calls: &Arc<AtomicUsize>) -> HandlerService {
        let log = Arc::clone(log);
        let calls = Arc::clone(calls);
        let handler = move |_q: Quote| {
            let log = Arc::clone(&log);
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                log.lock().push("handler".to_string());
                Ok::<u32, BoxError>(99)
            }
        };
        let handler = RequestHandlerDescriptor::new(handler)
            .into_registered()
            .unwrap();
        HandlerService::new(handler, provider())
    }

    #[tokio::test]
    async fn test_onion_ordering() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let builder = MiddlewarePipelineBuilder::new();
        for label in ["m1", "m2", "m3"] {
            builder.register(recording(&log, label)).unwrap();
        }

        let key = RoutingKey::of::<Quote, u32>();
        let pipeline = builder.build_pipeline(&key, &provider(), terminal(&log, &calls));
        let out = pipeline
            .oneshot(RequestEnvelope::new(key, Quote))
            .await
            .unwrap();

        assert_eq!(out.and_then(|v| v.downcast::<u32>().ok()).map(|b| *b), Some(99));
        assert_eq!(
            *log.lock(),
            vec![
                "enter m1", "enter m2", "enter m3", "handler", "exit m3", "exit m2", "exit m1"
            ]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_later_middleware_and_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let builder = MiddlewarePipelineBuilder::new();
        builder.register(recording(&log, "outer")).unwrap();
        builder
            .register(MiddlewareDescriptor::from_fn(|_q: Quote, _next: Next<u32>| async {
                Ok(Some(1))
            }))
            .unwrap();
        builder.register(recording(&log, "inner")).unwrap();

        let key = RoutingKey::of::<Quote, u32>();
        let pipeline = builder.build_pipeline(&key, &provider(), terminal(&log, &calls));
        let out = pipeline
            .oneshot(RequestEnvelope::new(key, Quote))
            .await
            .unwrap();

        assert_eq!(out.and_then(|v| v.downcast::<u32>().ok()).map(|b| *b), Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(*log.lock(), vec!["enter outer", "exit outer"]);
    }

    #[tokio::test]
    async fn test_middleware_is_scoped_to_its_key() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let builder = MiddlewarePipelineBuilder::new();
        builder.register(recording(&log, "m1")).unwrap();

        assert_eq!(builder.middleware_for(&RoutingKey::of::<Quote, u64>()).len(), 0);

        let key = RoutingKey::of::<Quote, u32>();
        let pipeline = builder.build_pipeline(&key, &provider(), terminal(&log, &calls));
        // Pipelines are reusable.
        for _ in 0..2 {
            pipeline
                .clone()
                .oneshot(RequestEnvelope::new(key, Quote))
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_register_rejects_mismatched_key() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let builder = MiddlewarePipelineBuilder::new();
        let descriptor = recording(&log, "m").for_key(RoutingKey::of::<Quote, String>());
        assert!(matches!(
            builder.register(descriptor),
            Err(ConfigurationError::RequestShapeMismatch { .. })
        ));
        assert!(builder.is_empty());
    }
}
