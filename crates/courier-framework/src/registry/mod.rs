//! Handler registries.
//!
//! - [`RequestRegistry`] – at most one handler per [`RoutingKey`](courier_core::RoutingKey)
//! - [`EventRegistry`] – an ordered, possibly empty handler list per event shape
//!
//! Both are written during bootstrap and read on every dispatch, so they sit
//! behind a `parking_lot::RwLock` and hand out cheap clones rather than guards.

pub mod event;
pub mod request;

pub use event::EventRegistry;
pub use request::RequestRegistry;
