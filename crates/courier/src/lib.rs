//! # Courier
//!
//! A typed, in-process mediator for Rust.
//!
//! ## Overview
//!
//! Requests go to exactly one handler, chosen by the pair of request type
//! and result type. Events go to every handler registered for their type,
//! in registration order. Middleware wraps request handlers per key, and
//! pluggable strategies decide how handlers actually run.
//!
//! ```text
//!                ┌──────────────────┐   ┌───────────────────────────┐
//! send(req) ───▶ │ RequestRegistry  │──▶│ m1 ─▶ m2 ─▶ handler       │──▶ Option<R>
//!                └──────────────────┘   └───────────────────────────┘
//!                ┌──────────────────┐   ┌───────────────────────────┐
//! publish(ev) ─▶ │ EventRegistry    │──▶│ handler A, handler B, ... │
//!                └──────────────────┘   └───────────────────────────┘
//!                        ▲
//!   EventSource (own thread) ── Publisher
//! ```
//!
//! - **Core**: routing keys, message traits, errors, instance providers
//! - **Framework**: registries, middleware pipeline, strategies, mediator
//! - **Runtime**: configuration, logging, process hosting
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[derive(Clone, Request)]
//! #[request(result = "OrderId")]
//! struct CreateOrder { sku: String }
//!
//! #[derive(Clone)]
//! struct OrderPlaced { id: OrderId }
//!
//! async fn create_order(cmd: CreateOrder) -> Result<OrderId, BoxError> {
//!     Ok(OrderId::next())
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = CourierRuntime::builder()
//!         .instance_provider(InstanceRegistry::new())
//!         .requests(|r| r.handler(create_order))
//!         .events(|e| e.handler(|ev: OrderPlaced| async move { notify(ev).await }))
//!         .build()?;
//!
//!     let mediator = runtime.mediator();
//!     if let Some(id) = mediator.send::<_, OrderId>(CreateOrder { sku: "A-1".into() }).await? {
//!         mediator.publish(OrderPlaced { id }).await?;
//!     }
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `macros`: `#[derive(Request)]` (default)
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use courier_core as core;
pub use courier_framework as framework;
pub use courier_runtime as runtime;

#[cfg(feature = "macros")]
pub use courier_macros::Request;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use courier_runtime::{CourierRuntime, CourierConfig};

    // Mediator facade
    pub use courier_framework::{Mediator, MediatorBuilder, Publisher};

    // Handlers and middleware
    pub use courier_framework::{
        EventHandlerDescriptor, HandlerResult, Middleware, MiddlewareDescriptor, Next,
        RequestHandlerDescriptor,
    };

    // Strategies
    pub use courier_framework::{
        DetachedRequestStrategy, EventInvocationStrategy, InlineRequestStrategy,
        RequestInvocation, RequestInvocationStrategy, SequentialEventStrategy,
        SpawnedEventStrategy, Traced,
    };

    // Event sources
    pub use courier_framework::{EventSource, source_fn};

    // Core types
    pub use courier_core::{
        BoxError, DispatchError, Event, HandlerExecutionError, InstanceProvider,
        InstanceRegistry, Message, Request, RoutingKey,
    };

    #[cfg(feature = "macros")]
    pub use courier_macros::Request;

    pub use courier_runtime::prelude::*;
}
