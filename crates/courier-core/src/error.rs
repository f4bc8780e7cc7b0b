//! Error taxonomy for the courier mediator.
//!
//! | Error | Raised | Surfaces |
//! |-------|--------|----------|
//! | [`ConfigurationError`] | while building or registering | from `build()` / `register()` |
//! | [`DispatchError`] | no handler for a routing key | from `send` |
//! | [`HandlerExecutionError`] | a handler or middleware fails | from `send`/`publish`, or a strategy callback |
//! | [`EventSourceError`] | a background source fails | logged only |
//! | [`ResolveError`] | an instance provider cannot produce an owner | wrapped in [`HandlerExecutionError`] |

use std::any::Any;

use thiserror::Error;

use crate::key::RoutingKey;
use crate::shape::Shape;

/// Boxed error carried through handlers and pipelines.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors detected while the mediator is being assembled.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// `build()` was called without an instance provider.
    #[error("instance provider is required")]
    MissingInstanceProvider,

    /// A second handler was registered for an occupied key.
    #[error(
        "duplicate request handler registration for {key} (`{rejected}` conflicts with `{existing}`); \
         primitive and boxed result types are considered the same"
    )]
    DuplicateRequestHandler {
        /// The contested key.
        key: RoutingKey,
        /// The handler that keeps the key.
        existing: &'static str,
        /// The handler that was refused.
        rejected: &'static str,
    },

    /// A handler or middleware does not fit the key it was declared for.
    #[error("{kind} `{name}` cannot serve {key}: it accepts `{request}` and produces `{result}`")]
    RequestShapeMismatch {
        /// `"request handler"` or `"middleware"`.
        kind: &'static str,
        /// Name of the callable.
        name: &'static str,
        /// The declared key.
        key: RoutingKey,
        /// What the callable accepts.
        request: Shape,
        /// What the callable produces.
        result: Shape,
    },

    /// An event handler does not accept the event shape it was declared for.
    #[error("event handler `{name}` is declared for `{declared}` but accepts `{accepted}`")]
    EventShapeMismatch {
        /// Name of the handler.
        name: &'static str,
        /// The declared shape.
        declared: Shape,
        /// What the handler accepts.
        accepted: Shape,
    },
}

impl ConfigurationError {
    /// Creates a shape mismatch for a request-side callable.
    pub fn request_mismatch(
        kind: &'static str,
        name: &'static str,
        key: RoutingKey,
        actual: RoutingKey,
    ) -> Self {
        Self::RequestShapeMismatch {
            kind,
            name,
            key,
            request: actual.request(),
            result: actual.result(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;

// =============================================================================
// Handler Execution Errors
// =============================================================================

/// A handler, middleware or owner resolution failed while running.
#[derive(Debug, Error)]
pub enum HandlerExecutionError {
    /// The callable returned an error.
    #[error("{origin} failed: {source}")]
    Failed {
        /// What was running.
        origin: String,
        /// The error exactly as the callable produced it.
        source: BoxError,
    },

    /// The callable panicked.
    #[error("{origin} panicked: {message}")]
    Panicked {
        /// What was running.
        origin: String,
        /// The panic payload rendered as text.
        message: String,
    },
}

impl HandlerExecutionError {
    /// Wraps `source`, keeping an existing execution error as-is.
    pub fn failed(origin: impl Into<String>, source: BoxError) -> Self {
        match source.downcast::<HandlerExecutionError>() {
            Ok(inner) => *inner,
            Err(source) => Self::Failed {
                origin: origin.into(),
                source,
            },
        }
    }

    /// Creates an error from a caught panic payload.
    pub fn panicked(origin: impl Into<String>, payload: Box<dyn Any + Send>) -> Self {
        Self::Panicked {
            origin: origin.into(),
            message: panic_message(payload.as_ref()),
        }
    }

    /// Returns what was running when the failure happened.
    pub fn origin(&self) -> &str {
        match self {
            Self::Failed { origin, .. } | Self::Panicked { origin, .. } => origin,
        }
    }

    /// Returns the original error if it is an `E`.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Failed { source, .. } => source.downcast_ref::<E>(),
            Self::Panicked { .. } => None,
        }
    }

    /// Consumes the error and returns the original error value, if any.
    pub fn into_source(self) -> Option<BoxError> {
        match self {
            Self::Failed { source, .. } => Some(source),
            Self::Panicked { .. } => None,
        }
    }
}

/// Result type for handler execution.
pub type HandlerExecutionResult<T> = Result<T, HandlerExecutionError>;

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Errors returned from `send`.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Nothing is registered for the key.
    #[error("no request handler found for request key: {key}")]
    NoHandler {
        /// The key that was looked up.
        key: RoutingKey,
    },

    /// The pipeline ran and failed.
    #[error(transparent)]
    Handler(#[from] HandlerExecutionError),

    /// The pipeline produced a value the caller cannot receive.
    #[error("request key {key} produced a result that is not `{expected}`")]
    ResultTypeMismatch {
        /// The key that was dispatched.
        key: RoutingKey,
        /// The type the caller asked for.
        expected: &'static str,
    },
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

// =============================================================================
// Event Source Errors
// =============================================================================

/// Failure of a background event source. Reported through logging only.
#[derive(Debug, Error)]
pub enum EventSourceError {
    /// The source returned an error.
    #[error("registered event source \"{name}\" has thrown an error: {source}")]
    Failed {
        /// Source name.
        name: String,
        /// The error returned by the source.
        source: BoxError,
    },

    /// The source panicked.
    #[error("registered event source \"{name}\" panicked: {message}")]
    Panicked {
        /// Source name.
        name: String,
        /// The panic payload rendered as text.
        message: String,
    },

    /// The worker thread or its runtime could not be created.
    #[error("failed to start worker for event source \"{name}\": {source}")]
    Spawn {
        /// Source name.
        name: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

// =============================================================================
// Resolve Errors
// =============================================================================

/// Errors raised by an instance provider.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Nothing is bound for the requested type.
    #[error("no instance registered for `{type_name}`")]
    NotRegistered {
        /// Requested type.
        type_name: &'static str,
    },

    /// The bound instance is not of the requested type.
    #[error("instance registered for `{type_name}` has a different type")]
    TypeMismatch {
        /// Requested type.
        type_name: &'static str,
    },

    /// A factory failed to produce the instance.
    #[error("factory for `{type_name}` failed: {source}")]
    Factory {
        /// Requested type.
        type_name: &'static str,
        /// The factory's error.
        source: BoxError,
    },
}

/// Result type for instance resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Renders a panic payload as text.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
