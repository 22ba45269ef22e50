//! Object records
//!
//! An object is a structure reference plus a vector of slots. The structure
//! (see [`crate::structure`]) says which key lives in which slot, whether the
//! slot holds a data value or an accessor pair, and what the object's
//! prototype is. Objects never store their own prototype link.

use std::fmt;
use std::rc::Rc;

use crate::error::VmResult;
use crate::proxy::JsProxy;
use crate::realm::Realm;
use crate::structure::StructureId;
use crate::value::Value;

/// Handle to an object in the realm's heap
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) u32);

impl ObjectId {
    /// Index into the heap
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Property attributes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PropertyAttributes {
    /// Property is writable (ignored for accessors)
    pub writable: bool,
    /// Property is enumerable
    pub enumerable: bool,
    /// Property is configurable
    pub configurable: bool,
}

impl PropertyAttributes {
    /// Default data property attributes
    pub const fn data() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Attributes of an accessor installed with `__defineGetter__`
    pub const fn accessor() -> Self {
        Self {
            writable: false,
            enumerable: true,
            configurable: true,
        }
    }

    /// Writable, non-enumerable, configurable (built-in methods, `constructor`)
    pub const fn hidden() -> Self {
        Self {
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    /// Non-writable, non-enumerable, non-configurable
    pub const fn frozen() -> Self {
        Self {
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }
}

impl Default for PropertyAttributes {
    fn default() -> Self {
        Self::data()
    }
}

/// Property descriptor
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyDescriptor {
    /// Data property
    Data {
        /// The value
        value: Value,
        /// Attributes
        attributes: PropertyAttributes,
    },
    /// Accessor property
    Accessor {
        /// Getter function
        get: Option<Value>,
        /// Setter function
        set: Option<Value>,
        /// Attributes
        attributes: PropertyAttributes,
    },
}

impl PropertyDescriptor {
    /// Create a data property
    pub fn data(value: Value) -> Self {
        Self::Data {
            value,
            attributes: PropertyAttributes::data(),
        }
    }

    /// Create a data property with specific attributes
    pub fn data_with_attrs(value: Value, attributes: PropertyAttributes) -> Self {
        Self::Data { value, attributes }
    }

    /// Create an accessor property with default accessor attributes
    pub fn accessor(get: Option<Value>, set: Option<Value>) -> Self {
        Self::Accessor {
            get,
            set,
            attributes: PropertyAttributes::accessor(),
        }
    }

    /// Get the value (for data properties)
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Data { value, .. } => Some(value),
            Self::Accessor { .. } => None,
        }
    }

    /// Attributes of either kind
    pub fn attributes(&self) -> PropertyAttributes {
        match self {
            Self::Data { attributes, .. } | Self::Accessor { attributes, .. } => *attributes,
        }
    }

    /// Check if writable
    pub fn is_writable(&self) -> bool {
        match self {
            Self::Data { attributes, .. } => attributes.writable,
            Self::Accessor { .. } => false,
        }
    }

    /// Check if configurable
    pub fn is_configurable(&self) -> bool {
        self.attributes().configurable
    }

    /// Check if this is an accessor descriptor
    pub fn is_accessor(&self) -> bool {
        matches!(self, Self::Accessor { .. })
    }
}

/// Storage for one property
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Slot {
    /// Data value; also used for holes left by deleted properties
    Data(Value),
    /// Getter/setter pair
    Accessor {
        get: Option<Value>,
        set: Option<Value>,
    },
}

impl Slot {
    pub(crate) fn hole() -> Self {
        Self::Data(Value::Undefined)
    }

    pub(crate) fn from_descriptor(desc: &PropertyDescriptor) -> Self {
        match desc {
            PropertyDescriptor::Data { value, .. } => Self::Data(value.clone()),
            PropertyDescriptor::Accessor { get, set, .. } => Self::Accessor {
                get: get.clone(),
                set: set.clone(),
            },
        }
    }
}

/// Native function signature: `(realm, this, args) -> result`.
///
/// Every getter, setter, proxy trap and constructor is one of these. They
/// receive the realm mutably and may call back into any object operation.
pub type NativeFn = Rc<dyn Fn(&mut Realm, &Value, &[Value]) -> VmResult<Value>>;

/// Callable payload of a function object
#[derive(Clone)]
pub struct NativeFunction {
    /// Function name (for diagnostics)
    pub name: Rc<str>,
    /// The callback
    pub func: NativeFn,
}

impl NativeFunction {
    /// Wrap a Rust closure
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&mut Realm, &Value, &[Value]) -> VmResult<Value> + 'static,
    {
        Self {
            name: Rc::from(name),
            func: Rc::new(func),
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction {{ name: {:?} }}", self.name)
    }
}

/// What kind of object a record is
#[derive(Debug)]
pub enum ObjectKind {
    /// Plain object
    Ordinary,
    /// Callable object
    Function(NativeFunction),
    /// Proxy exotic object; its own slots are unused
    Proxy(JsProxy),
}

/// A heap object
#[derive(Debug)]
pub struct ObjectRecord {
    pub(crate) structure: StructureId,
    pub(crate) slots: Vec<Slot>,
    pub(crate) kind: ObjectKind,
    /// Set once the object is some structure's prototype
    pub(crate) is_prototype: bool,
}

impl ObjectRecord {
    pub(crate) fn new(structure: StructureId, kind: ObjectKind) -> Self {
        Self {
            structure,
            slots: Vec::new(),
            kind,
            is_prototype: false,
        }
    }

    /// Current structure
    #[inline]
    pub fn structure(&self) -> StructureId {
        self.structure
    }

    /// Object kind
    #[inline]
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// Is this a proxy
    #[inline]
    pub fn is_proxy(&self) -> bool {
        matches!(self.kind, ObjectKind::Proxy(_))
    }

    /// Whether the object has been used as a prototype
    #[inline]
    pub fn is_prototype(&self) -> bool {
        self.is_prototype
    }

    /// Is this a function object
    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }

    /// Proxy payload
    pub fn as_proxy(&self) -> Option<&JsProxy> {
        match &self.kind {
            ObjectKind::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub(crate) fn as_proxy_mut(&mut self) -> Option<&mut JsProxy> {
        match &mut self.kind {
            ObjectKind::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    /// Function payload
    pub fn as_function(&self) -> Option<&NativeFunction> {
        match &self.kind {
            ObjectKind::Function(func) => Some(func),
            _ => None,
        }
    }

    pub(crate) fn slot(&self, offset: u32) -> Option<&Slot> {
        self.slots.get(offset as usize)
    }

    pub(crate) fn set_slot(&mut self, offset: u32, slot: Slot) {
        let index = offset as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, Slot::hole());
        }
        self.slots[index] = slot;
    }
}
