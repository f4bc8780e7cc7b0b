//! Routing keys for request handlers.

use std::fmt;

use crate::shape::Shape;

/// Identifies a request handler by request type and canonical result type.
///
/// Two keys are equal when both shapes are equal; the result shape is always
/// stored in canonical form, so `Box<i32>` and `i32` results route alike.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoutingKey {
    request: Shape,
    result: Shape,
}

impl RoutingKey {
    /// Creates a key from explicit shapes.
    pub fn new(request: Shape, result: Shape) -> Self {
        Self {
            request,
            result: result.canonical(),
        }
    }

    /// Creates the key for request type `Q` producing `R`.
    pub fn of<Q: 'static, R: 'static>() -> Self {
        Self {
            request: Shape::of::<Q>(),
            result: Shape::result_of::<R>(),
        }
    }

    /// Returns the request shape.
    pub fn request(&self) -> Shape {
        self.request
    }

    /// Returns the canonical result shape.
    pub fn result(&self) -> Shape {
        self.result
    }
}

impl fmt::Debug for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingKey")
            .field("request", &self.request)
            .field("result", &self.result)
            .finish()
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[request={}, result={}]", self.request, self.result)
    }
}
