//! JavaScript values and property keys
//!
//! Values are small enum handles: primitives are stored inline, objects are
//! referenced by [`ObjectId`] into the realm's heap. Strings share their
//! backing storage through `Arc<str>`.

use crate::object::ObjectId;
use std::fmt;
use std::sync::Arc;

/// Identity of a symbol.
///
/// Only well-known symbols exist in this crate; ids below
/// [`SymbolId::FIRST_USER`] are reserved for them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

impl SymbolId {
    /// `Symbol.hasInstance`
    pub const HAS_INSTANCE: SymbolId = SymbolId(1);
    /// First id available for embedder-created symbols
    pub const FIRST_USER: u32 = 64;

    /// Description used when printing the symbol.
    pub fn description(self) -> &'static str {
        match self {
            Self::HAS_INSTANCE => "Symbol.hasInstance",
            _ => "",
        }
    }
}

/// A JavaScript value
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Boolean(bool),
    /// IEEE 754 double
    Number(f64),
    /// Immutable string
    String(Arc<str>),
    /// Symbol
    Symbol(SymbolId),
    /// Reference to a heap object (ordinary, function or proxy)
    Object(ObjectId),
}

impl Value {
    /// `undefined`
    #[inline]
    pub const fn undefined() -> Self {
        Self::Undefined
    }

    /// `null`
    #[inline]
    pub const fn null() -> Self {
        Self::Null
    }

    /// Boolean value
    #[inline]
    pub const fn boolean(b: bool) -> Self {
        Self::Boolean(b)
    }

    /// Number value
    #[inline]
    pub const fn number(n: f64) -> Self {
        Self::Number(n)
    }

    /// Number value from a small integer
    #[inline]
    pub fn int32(n: i32) -> Self {
        Self::Number(f64::from(n))
    }

    /// String value
    pub fn string(s: &str) -> Self {
        Self::String(Arc::from(s))
    }

    /// Symbol value
    #[inline]
    pub const fn symbol(sym: SymbolId) -> Self {
        Self::Symbol(sym)
    }

    /// Object value
    #[inline]
    pub const fn object(id: ObjectId) -> Self {
        Self::Object(id)
    }

    /// `null` for `None`, the object otherwise
    pub fn from_object(id: Option<ObjectId>) -> Self {
        id.map_or(Self::Null, Self::Object)
    }

    /// Check if value is undefined
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Check if value is null
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if value is null or undefined
    #[inline]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Check if value is an object reference
    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Get the object handle
    #[inline]
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Self::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// Get the number
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the boolean
    #[inline]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the string contents
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// ES §7.1.2 ToBoolean
    pub fn to_boolean(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Boolean(b) => *b,
            Self::Number(n) => !(n.is_nan() || *n == 0.0),
            Self::String(s) => !s.is_empty(),
            Self::Symbol(_) | Self::Object(_) => true,
        }
    }

    /// Name of the value's type as reported by `typeof` (objects are
    /// reported as "object"; callability needs the realm).
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "object",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Object(_) => "object",
        }
    }

    /// SameValue comparison (ES §7.2.11)
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => {
                if a.is_nan() && b.is_nan() {
                    return true;
                }
                if *a == 0.0 && *b == 0.0 {
                    return a.is_sign_positive() == b.is_sign_positive();
                }
                a == b
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Number(n) => {
                if n.is_nan() {
                    f.write_str("NaN")
                } else if n.is_infinite() {
                    f.write_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
                } else if n.fract() == 0.0 && n.abs() < 1e21 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Self::String(s) => f.write_str(s),
            Self::Symbol(sym) => write!(f, "Symbol({})", sym.description()),
            Self::Object(_) => f.write_str("[object Object]"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::int32(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Self::Object(id)
    }
}

/// Property key (string or symbol)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String property key
    String(Arc<str>),
    /// Symbol property key
    Symbol(SymbolId),
}

impl PropertyKey {
    /// Create a string property key
    pub fn string(s: &str) -> Self {
        Self::String(Arc::from(s))
    }

    /// `Symbol.hasInstance`
    pub const fn has_instance() -> Self {
        Self::Symbol(SymbolId::HAS_INSTANCE)
    }

    /// The key as a value, as passed to proxy traps.
    pub fn to_value(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Symbol(sym) => Value::Symbol(*sym),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<SymbolId> for PropertyKey {
    fn from(sym: SymbolId) -> Self {
        Self::Symbol(sym)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Symbol(sym) => write!(f, "[{}]", sym.description()),
        }
    }
}
