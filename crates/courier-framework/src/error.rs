//! Error types raised inside erased pipelines.

use thiserror::Error;

use courier_core::{RoutingKey, Shape};

/// A type check failed at an erasure boundary.
///
/// These only occur when an envelope reaches a callable registered for a
/// different type, which the registries normally rule out.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// The request envelope carries an unexpected payload type.
    #[error("envelope for {key} does not carry a `{expected}`")]
    RequestTypeMismatch {
        /// Key of the envelope.
        key: RoutingKey,
        /// Type the callable expected.
        expected: &'static str,
    },

    /// The event envelope carries an unexpected payload type.
    #[error("event envelope of `{shape}` does not carry a `{expected}`")]
    EventTypeMismatch {
        /// Shape of the envelope.
        shape: Shape,
        /// Type the callable expected.
        expected: &'static str,
    },

    /// The rest of the pipeline produced a value of the wrong type.
    #[error("pipeline for {key} produced a result that is not `{expected}`")]
    ResultTypeMismatch {
        /// Key of the pipeline.
        key: RoutingKey,
        /// Type the middleware expected.
        expected: &'static str,
    },
}

impl PipelineError {
    /// Creates a request payload mismatch for `Q`.
    pub fn request<Q>(key: RoutingKey) -> Self {
        Self::RequestTypeMismatch {
            key,
            expected: std::any::type_name::<Q>(),
        }
    }

    /// Creates an event payload mismatch for `E`.
    pub fn event<E>(shape: Shape) -> Self {
        Self::EventTypeMismatch {
            shape,
            expected: std::any::type_name::<E>(),
        }
    }

    /// Creates a result mismatch for `R`.
    pub fn result<R>(key: RoutingKey) -> Self {
        Self::ResultTypeMismatch {
            key,
            expected: std::any::type_name::<R>(),
        }
    }
}
