//! # Courier Framework
//!
//! The dispatch engine of the courier mediator.
//!
//! This layer provides:
//! - Handler traits and descriptors, with Axum-style blanket impls for async
//!   functions and for functions taking a provider-resolved owner
//! - [`RequestRegistry`] and [`EventRegistry`]
//! - [`MiddlewarePipelineBuilder`], composing tower layers around a handler
//! - Pluggable request and event invocation strategies
//! - [`EventSourceRegistry`] for background producers
//! - [`Mediator`] and [`Publisher`], the `send`/`publish` facade
//!
//! ```rust,ignore
//! use courier_framework::prelude::*;
//!
//! let mediator = Mediator::builder()
//!     .instance_provider(InstanceRegistry::new())
//!     .requests(|r| r.handler(create_order))
//!     .events(|e| e.handler(notify_warehouse))
//!     .build()?;
//! ```

pub mod error;
pub mod handler;
pub mod mediator;
pub mod middleware;
pub mod pipeline;
pub mod registry;
pub mod source;
pub mod strategy;

pub use error::PipelineError;
pub use handler::{
    ByOwner, ByValue, EventHandler, EventHandlerDescriptor, HandlerResult, HandlerService,
    RegisteredEventHandler, RegisteredRequestHandler, RequestHandler, RequestHandlerDescriptor,
};
pub use mediator::{EventSetup, Mediator, MediatorBuilder, Publisher, RequestSetup};
pub use middleware::{FromFn, Middleware, MiddlewareDescriptor, Next, RegisteredMiddleware};
pub use pipeline::{MiddlewarePipelineBuilder, Pipeline};
pub use registry::{EventRegistry, RequestRegistry};
pub use source::{EventSource, EventSourceRegistry, FnSource, source_fn};
pub use strategy::{
    BoundEventHandler, DetachedRequestStrategy, EventInvocationStrategy, InlineRequestStrategy,
    RequestInvocation, RequestInvocationStrategy, SequentialEventStrategy, SpawnedEventStrategy,
    Traced,
};

/// Prelude for common imports.
pub mod prelude {
    pub use courier_core::prelude::*;

    pub use super::handler::{EventHandlerDescriptor, HandlerResult, RequestHandlerDescriptor};
    pub use super::mediator::{Mediator, Publisher};
    pub use super::middleware::{Middleware, Next};
    pub use super::source::{EventSource, source_fn};
}
