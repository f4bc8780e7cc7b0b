//! Handler system for the courier mediator.
//!
//! - **Traits** ([`traits`]) – [`RequestHandler`] and [`EventHandler`], blanket
//!   implemented for async functions, similar to Axum's handler system
//! - **Descriptors** ([`descriptor`]) – what discovery hands to the registries,
//!   and the erased forms the registries keep
//! - **Service** ([`service`]) – [`HandlerService`], the terminal tower service
//!   of a request pipeline
//!
//! ```rust,ignore
//! async fn create_order(cmd: CreateOrder) -> Result<OrderId, BoxError> {
//!     Ok(OrderId::next())
//! }
//!
//! let descriptor = RequestHandlerDescriptor::new(create_order);
//! ```

pub mod descriptor;
pub mod service;
pub mod traits;

pub use descriptor::{
    EventHandlerDescriptor, RegisteredEventHandler, RegisteredRequestHandler,
    RequestHandlerDescriptor,
};
pub use service::HandlerService;
pub use traits::{ByOwner, ByValue, EventHandler, HandlerResult, RequestHandler};

pub(crate) use descriptor::erase_result;
