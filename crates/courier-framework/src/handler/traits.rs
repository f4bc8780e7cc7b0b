//! Handler traits with blanket implementations for async functions.
//!
//! Two function forms are accepted for both requests and events:
//!
//! - **Free functions**: `async fn(Q) -> Result<O, E>`
//! - **Owner methods**: `async fn(Arc<T>, Q) -> Result<O, E>`, where `T` is
//!   resolved through the [`InstanceProvider`] on every call
//!
//! The marker parameter (`ByValue` / `ByOwner<T>`) only exists so the two
//! blanket implementations do not overlap; it is always inferred.
//!
//! ```rust,ignore
//! async fn create_order(cmd: CreateOrder) -> Result<OrderId, BoxError> {
//!     Ok(OrderId(1))
//! }
//!
//! async fn on_placed(store: Arc<Inventory>, event: OrderPlaced) -> Result<(), BoxError> {
//!     store.reserve(&event.sku).await
//! }
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture};

use courier_core::{BoxError, InstanceProvider, Message};

/// Result returned by handlers and middleware.
pub type HandlerResult<T> = Result<T, BoxError>;

/// Marker for handlers that take the message directly.
pub struct ByValue;

/// Marker for handlers that take a resolved owner `Arc<T>` first.
pub struct ByOwner<T>(PhantomData<fn() -> T>);

// ============================================================================
// RequestHandler
// ============================================================================

/// A callable answering requests of type `Q` with an `O`.
pub trait RequestHandler<Q, O, M>: Clone + Send + Sync + 'static {
    /// Runs the handler.
    fn call(
        &self,
        provider: &Arc<dyn InstanceProvider>,
        request: Q,
    ) -> BoxFuture<'static, HandlerResult<O>>;
}

impl<F, Fut, Q, O, E> RequestHandler<Q, O, ByValue> for F
where
    F: Fn(Q) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    Q: Message,
    O: Send + 'static,
    E: Into<BoxError>,
{
    fn call(
        &self,
        _provider: &Arc<dyn InstanceProvider>,
        request: Q,
    ) -> BoxFuture<'static, HandlerResult<O>> {
        (self)(request).map(|res| res.map_err(Into::<BoxError>::into)).boxed()
    }
}

impl<F, Fut, T, Q, O, E> RequestHandler<Q, O, ByOwner<T>> for F
where
    F: Fn(Arc<T>, Q) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    T: Send + Sync + 'static,
    Q: Message,
    O: Send + 'static,
    E: Into<BoxError>,
{
    fn call(
        &self,
        provider: &Arc<dyn InstanceProvider>,
        request: Q,
    ) -> BoxFuture<'static, HandlerResult<O>> {
        match provider.get::<T>() {
            Ok(owner) => (self)(owner, request)
                .map(|res| res.map_err(Into::<BoxError>::into))
                .boxed(),
            Err(e) => future::ready(Err(BoxError::from(e))).boxed(),
        }
    }
}

// ============================================================================
// EventHandler
// ============================================================================

/// A callable reacting to events of type `E`.
pub trait EventHandler<E, M>: Clone + Send + Sync + 'static {
    /// Runs the handler.
    fn call(
        &self,
        provider: &Arc<dyn InstanceProvider>,
        event: E,
    ) -> BoxFuture<'static, HandlerResult<()>>;
}

impl<F, Fut, Ev, Er> EventHandler<Ev, ByValue> for F
where
    F: Fn(Ev) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Er>> + Send + 'static,
    Ev: Message,
    Er: Into<BoxError>,
{
    fn call(
        &self,
        _provider: &Arc<dyn InstanceProvider>,
        event: Ev,
    ) -> BoxFuture<'static, HandlerResult<()>> {
        (self)(event).map(|res| res.map_err(Into::<BoxError>::into)).boxed()
    }
}

impl<F, Fut, T, Ev, Er> EventHandler<Ev, ByOwner<T>> for F
where
    F: Fn(Arc<T>, Ev) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Er>> + Send + 'static,
    T: Send + Sync + 'static,
    Ev: Message,
    Er: Into<BoxError>,
{
    fn call(
        &self,
        provider: &Arc<dyn InstanceProvider>,
        event: Ev,
    ) -> BoxFuture<'static, HandlerResult<()>> {
        match provider.get::<T>() {
            Ok(owner) => (self)(owner, event)
                .map(|res| res.map_err(Into::<BoxError>::into))
                .boxed(),
            Err(e) => future::ready(Err(BoxError::from(e))).boxed(),
        }
    }
}
