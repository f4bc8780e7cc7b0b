//! Invocation strategies.
//!
//! A strategy decides how a resolved pipeline (for requests) or handler list
//! (for events) actually runs. The defaults run inline on the caller's task
//! and propagate failures; the detached/spawned variants hand work to a tokio
//! runtime and route failures to a callback instead.
//!
//! | Strategy | Returns | Failures |
//! |----------|---------|----------|
//! | [`InlineRequestStrategy`] *(default)* | the handler's result | returned to `send` |
//! | [`DetachedRequestStrategy`] | `None` immediately | error callback |
//! | [`SequentialEventStrategy`] *(default)* | after every handler ran | first one returned to `publish`, rest skipped |
//! | [`SpawnedEventStrategy`] | immediately | error callback, per handler |
//!
//! The callback covers calls that finish with an error or a panic. Calls
//! still pending when their runtime shuts down are dropped unreported.
//!
//! [`Traced`] wraps either kind and adds a tracing event and span per call.
//! Retries, timeouts or circuit breaking belong in custom strategies: a
//! [`RequestInvocation`] can be cloned and run again.

pub mod event;
pub mod request;
pub mod traced;

use std::sync::Arc;

use courier_core::{EventEnvelope, HandlerExecutionError, RequestEnvelope};

pub use event::{
    BoundEventHandler, EventInvocationStrategy, SequentialEventStrategy, SpawnedEventStrategy,
};
pub use request::{
    DetachedRequestStrategy, InlineRequestStrategy, RequestInvocation, RequestInvocationStrategy,
};
pub use traced::Traced;

/// Receives failures of detached request handlers.
pub type RequestErrorHandler = Arc<dyn Fn(RequestEnvelope, HandlerExecutionError) + Send + Sync>;

/// Receives failures of spawned event handlers.
pub type EventErrorHandler = Arc<dyn Fn(EventEnvelope, HandlerExecutionError) + Send + Sync>;
