//! # Courier Core
//!
//! Shared vocabulary of the courier mediator.
//!
//! This crate holds the pieces every other layer agrees on:
//!
//! - **Shapes and keys**: [`Shape`] and [`RoutingKey`], including the
//!   boxed/primitive result canonicalization
//! - **Messages**: the [`Request`] and [`Event`] marker traits and the
//!   type-erased [`RequestEnvelope`] / [`EventEnvelope`]
//! - **Instance resolution**: [`InstanceProvider`] and the stock
//!   [`InstanceRegistry`]
//! - **Errors**: the configuration/dispatch/execution/source taxonomy
//!
//! Registries, pipelines and strategies live in `courier-framework`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use courier_core::{Request, RoutingKey};
//!
//! #[derive(Clone)]
//! struct CreateOrder { sku: String }
//! struct OrderId(u64);
//!
//! impl Request<OrderId> for CreateOrder {}
//!
//! let key = RoutingKey::of::<CreateOrder, OrderId>();
//! println!("{key}"); // [request=app::CreateOrder, result=app::OrderId]
//! ```

pub mod error;
pub mod key;
pub mod message;
pub mod provider;
pub mod shape;

pub use error::{
    BoxError, ConfigurationError, ConfigurationResult, DispatchError, DispatchResult,
    EventSourceError, HandlerExecutionError, HandlerExecutionResult, ResolveError, ResolveResult,
    panic_message,
};
pub use key::RoutingKey;
pub use message::{Event, EventEnvelope, Message, Request, RequestEnvelope};
pub use provider::{AnyInstance, InstanceProvider, InstanceRegistry};
pub use shape::{AnyResult, Shape, coerce};

/// Prelude for common imports.
pub mod prelude {
    pub use super::error::{BoxError, DispatchError, HandlerExecutionError};
    pub use super::message::{Event, Message, Request};
    pub use super::provider::{InstanceProvider, InstanceRegistry};
}
