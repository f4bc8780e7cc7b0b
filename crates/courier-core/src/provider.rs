//! Instance resolution for handler owners.
//!
//! Handlers bound to an owner type (`Fn(Arc<T>, Q)`) do not capture the owner;
//! it is looked up through an [`InstanceProvider`] each time the handler runs.
//! The host therefore decides whether `T` is a singleton or produced per call.
//!
//! [`InstanceRegistry`] is the stock provider:
//!
//! ```rust,ignore
//! let registry = InstanceRegistry::new()
//!     .with_singleton(OrderService::new(db))
//!     .with_factory(|| Ok(AuditTrail::open()?));
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{BoxError, ResolveError, ResolveResult};

/// A shared, type-erased instance.
pub type AnyInstance = Arc<dyn Any + Send + Sync>;

/// Produces handler owner instances on demand.
pub trait InstanceProvider: Send + Sync + 'static {
    /// Resolves an instance of the type identified by `id`.
    fn resolve(&self, id: TypeId, type_name: &'static str) -> ResolveResult<AnyInstance>;
}

impl dyn InstanceProvider {
    /// Resolves and downcasts an instance of `T`.
    pub fn get<T: Send + Sync + 'static>(&self) -> ResolveResult<Arc<T>> {
        let type_name = std::any::type_name::<T>();
        self.resolve(TypeId::of::<T>(), type_name)?
            .downcast::<T>()
            .map_err(|_| ResolveError::TypeMismatch { type_name })
    }
}

impl<F> InstanceProvider for F
where
    F: Fn(TypeId, &'static str) -> ResolveResult<AnyInstance> + Send + Sync + 'static,
{
    fn resolve(&self, id: TypeId, type_name: &'static str) -> ResolveResult<AnyInstance> {
        self(id, type_name)
    }
}

// ============================================================================
// InstanceRegistry
// ============================================================================

type Factory = Arc<dyn Fn() -> Result<AnyInstance, BoxError> + Send + Sync>;

#[derive(Clone)]
enum Binding {
    Singleton(AnyInstance),
    Factory(Factory),
}

/// A provider backed by explicit singleton and factory bindings.
///
/// Bindings may be added after the registry has been shared; later bindings
/// for the same type replace earlier ones.
#[derive(Default)]
pub struct InstanceRegistry {
    bindings: RwLock<HashMap<TypeId, Binding>>,
}

impl InstanceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a shared instance of `T`.
    pub fn singleton<T: Send + Sync + 'static>(&self, instance: T) {
        self.singleton_arc(Arc::new(instance));
    }

    /// Binds an already shared instance of `T`.
    pub fn singleton_arc<T: Send + Sync + 'static>(&self, instance: Arc<T>) {
        debug!(owner = std::any::type_name::<T>(), "Bound singleton instance");
        self.bindings
            .write()
            .insert(TypeId::of::<T>(), Binding::Singleton(instance));
    }

    /// Binds a factory that produces a fresh `T` on every resolution.
    pub fn factory<T, F>(&self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        debug!(owner = std::any::type_name::<T>(), "Bound instance factory");
        let factory: Factory = Arc::new(move || factory().map(|t| Arc::new(t) as AnyInstance));
        self.bindings
            .write()
            .insert(TypeId::of::<T>(), Binding::Factory(factory));
    }

    /// Builder-style [`singleton`](Self::singleton).
    pub fn with_singleton<T: Send + Sync + 'static>(self, instance: T) -> Self {
        self.singleton(instance);
        self
    }

    /// Builder-style [`factory`](Self::factory).
    pub fn with_factory<T, F>(self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.factory(factory);
        self
    }

    /// Returns `true` if something is bound for `T`.
    pub fn contains<T: 'static>(&self) -> bool {
        self.bindings.read().contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    /// Returns `true` if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }
}

impl InstanceProvider for InstanceRegistry {
    fn resolve(&self, id: TypeId, type_name: &'static str) -> ResolveResult<AnyInstance> {
        // Clone the binding out so factories run without holding the lock.
        let binding = self.bindings.read().get(&id).cloned();
        match binding {
            Some(Binding::Singleton(instance)) => Ok(instance),
            Some(Binding::Factory(factory)) => {
                factory().map_err(|source| ResolveError::Factory { type_name, source })
            }
            None => Err(ResolveError::NotRegistered { type_name }),
        }
    }
}

impl fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("bindings", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Greeter(&'static str);

    #[test]
    fn test_singleton_is_shared() {
        let registry: Arc<dyn InstanceProvider> =
            Arc::new(InstanceRegistry::new().with_singleton(Greeter("hi")));

        let a = registry.get::<Greeter>().unwrap();
        let b = registry.get::<Greeter>().unwrap();
        assert_eq!(a.0, "hi");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_factory_runs_per_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let registry = InstanceRegistry::new().with_factory(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(Greeter("fresh"))
        });
        let provider: &dyn InstanceProvider = &registry;

        let _ = provider.get::<Greeter>().unwrap();
        let _ = provider.get::<Greeter>().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_binding() {
        let registry = InstanceRegistry::new();
        let provider: &dyn InstanceProvider = &registry;
        assert!(matches!(
            provider.get::<Greeter>(),
            Err(ResolveError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_closure_provider() {
        let provider: Arc<dyn InstanceProvider> =
            Arc::new(|_id: TypeId, type_name: &'static str| {
                Err::<AnyInstance, _>(ResolveError::NotRegistered { type_name })
            });
        assert!(provider.get::<Greeter>().is_err());
    }
}
