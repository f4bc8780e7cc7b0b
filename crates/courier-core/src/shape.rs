//! Runtime type identities for requests, results and events.
//!
//! A [`Shape`] pairs a [`TypeId`] with the type's name so that registries can
//! key on the id while diagnostics still print something readable.
//!
//! # Result canonicalization
//!
//! Result shapes go through [`Shape::result_of`], which folds `Box<N>` onto `N`
//! for the numeric primitives, `bool` and `char`. A handler producing `i32`
//! therefore serves a request declared to produce `Box<i32>`. The value itself
//! is converted at the boundary by [`coerce`].
//!
//! ```rust,ignore
//! assert_eq!(Shape::result_of::<Box<u64>>(), Shape::result_of::<u64>());
//! let boxed: Box<u64> = coerce(Box::new(7u64))?;
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A type-erased result value.
pub type AnyResult = Box<dyn Any + Send>;

/// Identity of a Rust type used as a routing shape.
#[derive(Clone, Copy)]
pub struct Shape {
    id: TypeId,
    name: &'static str,
}

impl Shape {
    /// Returns the shape of `T` as-is.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Returns the canonical result shape of `T`.
    ///
    /// `Box<N>` for a primitive `N` collapses onto `N`; every other type is
    /// returned unchanged.
    pub fn result_of<T: 'static>() -> Self {
        unboxed(TypeId::of::<T>()).unwrap_or_else(Self::of::<T>)
    }

    /// Returns the canonical form of this shape.
    pub fn canonical(self) -> Self {
        unboxed(self.id).unwrap_or(self)
    }

    /// Returns the underlying type id.
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Returns the type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if this shape is the unit type.
    pub fn is_unit(&self) -> bool {
        self.id == TypeId::of::<()>()
    }

    /// Returns `true` if both shapes are equal once canonicalized.
    pub fn is_compatible_with(&self, other: &Shape) -> bool {
        self.canonical() == other.canonical()
    }
}

impl PartialEq for Shape {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Shape {}

impl Hash for Shape {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ============================================================================
// Boxed/primitive equivalence
// ============================================================================

macro_rules! boxed_equivalents {
    ($($ty:ty),* $(,)?) => {
        /// Maps the type id of `Box<N>` to the shape of `N`.
        fn unboxed(id: TypeId) -> Option<Shape> {
            $(
                if id == TypeId::of::<Box<$ty>>() {
                    return Some(Shape::of::<$ty>());
                }
            )*
            None
        }

        /// Rewraps `value` as `R` when the two differ only by a `Box`.
        fn rebox<R: Any>(value: AnyResult) -> Result<R, AnyResult> {
            $(
                // N produced, Box<N> wanted
                if TypeId::of::<R>() == TypeId::of::<Box<$ty>>() && value.is::<$ty>() {
                    return match value.downcast::<$ty>() {
                        Ok(inner) => {
                            let wrapped: AnyResult = Box::new(inner);
                            wrapped.downcast::<R>().map(|r| *r)
                        }
                        Err(value) => Err(value),
                    };
                }
                // Box<N> produced, N wanted
                if TypeId::of::<R>() == TypeId::of::<$ty>() && value.is::<Box<$ty>>() {
                    return match value.downcast::<Box<$ty>>() {
                        Ok(outer) => {
                            let inner: AnyResult = *outer;
                            inner.downcast::<R>().map(|r| *r)
                        }
                        Err(value) => Err(value),
                    };
                }
            )*
            Err(value)
        }
    };
}

boxed_equivalents!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char,
);

/// Converts an erased result into `R`.
///
/// Succeeds when the value is an `R`, or when it differs from `R` only by a
/// boxed/primitive wrapping. On failure the original value is handed back.
pub fn coerce<R: Any>(value: AnyResult) -> Result<R, AnyResult> {
    match value.downcast::<R>() {
        Ok(r) => Ok(*r),
        Err(value) => rebox::<R>(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boxed_numeric_is_canonicalized() {
        assert_eq!(Shape::result_of::<Box<i32>>(), Shape::result_of::<i32>());
        assert_eq!(Shape::result_of::<Box<f64>>(), Shape::of::<f64>());
        assert_eq!(Shape::of::<Box<char>>().canonical(), Shape::of::<char>());
    }

    #[test]
    fn test_non_primitive_boxes_are_kept() {
        assert_ne!(Shape::result_of::<Box<String>>(), Shape::result_of::<String>());
        assert_ne!(Shape::result_of::<i32>(), Shape::result_of::<i64>());
    }

    #[test]
    fn test_coerce_exact_type() {
        let value: AnyResult = Box::new(String::from("ok"));
        assert_eq!(coerce::<String>(value).ok().as_deref(), Some("ok"));
    }

    #[test]
    fn test_coerce_primitive_into_box() {
        let value: AnyResult = Box::new(41u16);
        let boxed = coerce::<Box<u16>>(value).ok();
        assert_eq!(boxed, Some(Box::new(41u16)));
    }

    #[test]
    fn test_coerce_box_into_primitive() {
        let value: AnyResult = Box::new(Box::new(true));
        assert_eq!(coerce::<bool>(value).ok(), Some(true));
    }

    #[test]
    fn test_coerce_mismatch_returns_value() {
        let value: AnyResult = Box::new(5i64);
        let back = coerce::<i32>(value).err().map(|v| v.is::<i64>());
        assert_eq!(back, Some(true));
    }
}
