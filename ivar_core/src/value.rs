//! Values stored in attribute slots.
//!
//! Slots themselves are `Option<Value>`: `None` is the unset marker. Since
//! the marker is not a `Value`, callers can never store it by accident, and
//! deleting an attribute just writes `None` back in place.

use crate::ids::ObjectId;
use crate::name::Name;
use std::sync::Arc;

/// Reference to another object held in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    /// Identity of the referent.
    pub id: ObjectId,
    /// Whether the referent may be shared across isolation contexts.
    pub shareable: bool,
}

/// An attribute value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// The nil value.
    #[default]
    Nil,
    /// A boolean.
    Bool(bool),
    /// A 64-bit integer.
    Int(i64),
    /// A double.
    Float(f64),
    /// A symbol.
    Sym(Name),
    /// An immutable string.
    Str(Arc<str>),
    /// A reference to another object.
    Object(ObjectRef),
}

impl Value {
    /// Create a string value.
    #[inline]
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    /// Check if this is nil.
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Check if this value may cross isolation contexts.
    ///
    /// Immediates and immutable strings always can; object references carry
    /// the referent's shareable bit.
    #[inline]
    pub fn is_shareable(&self) -> bool {
        match self {
            Value::Object(obj) => obj.shareable,
            _ => true,
        }
    }

    /// Get the integer payload.
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the object reference payload.
    #[inline]
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(obj) => Some(*obj),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}
