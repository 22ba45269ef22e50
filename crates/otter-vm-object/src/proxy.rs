//! JavaScript Proxy objects
//!
//! A proxy pairs a target with a handler object. Traps are looked up on the
//! handler by name on every operation; the handler is an ordinary mutable
//! object, so nothing about it is cached.

use std::fmt;

use crate::object::ObjectId;

/// The fundamental operations a handler may intercept
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProxyTrap {
    /// `[[GetPrototypeOf]]`
    GetPrototypeOf,
    /// `[[Get]]`
    Get,
    /// `[[Set]]`
    Set,
    /// `[[HasProperty]]`
    Has,
    /// `[[DefineOwnProperty]]`
    DefineProperty,
    /// `[[Delete]]`
    DeleteProperty,
}

impl ProxyTrap {
    /// Every trap, in declaration order
    pub const ALL: [ProxyTrap; 6] = [
        Self::GetPrototypeOf,
        Self::Get,
        Self::Set,
        Self::Has,
        Self::DefineProperty,
        Self::DeleteProperty,
    ];

    /// Handler property name
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetPrototypeOf => "getPrototypeOf",
            Self::Get => "get",
            Self::Set => "set",
            Self::Has => "has",
            Self::DefineProperty => "defineProperty",
            Self::DeleteProperty => "deleteProperty",
        }
    }
}

impl fmt::Display for ProxyTrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A JavaScript Proxy
pub struct JsProxy {
    target: ObjectId,
    handler: ObjectId,
    revoked: bool,
}

impl fmt::Debug for JsProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_revoked() {
            write!(f, "Proxy {{ <revoked> }}")
        } else {
            write!(f, "Proxy {{ target: {:?} }}", self.target)
        }
    }
}

impl JsProxy {
    /// Create a new proxy
    pub fn new(target: ObjectId, handler: ObjectId) -> Self {
        Self {
            target,
            handler,
            revoked: false,
        }
    }

    /// Get the target object
    ///
    /// Returns `None` if the proxy has been revoked.
    pub fn target(&self) -> Option<ObjectId> {
        (!self.revoked).then_some(self.target)
    }

    /// Get the raw target without revocation checks.
    pub fn target_raw(&self) -> ObjectId {
        self.target
    }

    /// Get the handler object
    ///
    /// Returns `None` if the proxy has been revoked.
    pub fn handler(&self) -> Option<ObjectId> {
        (!self.revoked).then_some(self.handler)
    }

    /// Check if this proxy has been revoked
    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    /// Revoke this proxy
    ///
    /// After revocation, all trap operations throw a TypeError.
    pub fn revoke(&mut self) {
        self.revoked = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_revoke() {
        let mut proxy = JsProxy::new(ObjectId(1), ObjectId(2));
        assert!(!proxy.is_revoked());
        assert_eq!(proxy.target(), Some(ObjectId(1)));
        assert_eq!(proxy.handler(), Some(ObjectId(2)));

        proxy.revoke();
        assert!(proxy.is_revoked());
        assert!(proxy.target().is_none());
        assert!(proxy.handler().is_none());
        assert_eq!(proxy.target_raw(), ObjectId(1));
    }

    #[test]
    fn test_trap_names() {
        let names: Vec<_> = ProxyTrap::ALL.iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            [
                "getPrototypeOf",
                "get",
                "set",
                "has",
                "defineProperty",
                "deleteProperty"
            ]
        );
    }
}
