//! Proxy trap dispatch (ES2026 §10.5)
//!
//! Every operation on a proxy looks the trap up on the handler at call time,
//! calls it with the handler as `this`, and validates the result against the
//! target. A missing trap (undefined or null) forwards the operation to the
//! target. Traps run arbitrary code: by the time one returns, any structure,
//! prototype or cache may have changed, so nothing here holds on to state
//! across the call.

use crate::error::{VmError, VmResult};
use crate::object::{ObjectId, PropertyAttributes, PropertyDescriptor};
use crate::proxy::ProxyTrap;
use crate::realm::Realm;
use crate::value::{PropertyKey, Value};

/// Outcome of dispatching one operation to a proxy
pub(crate) enum ProxyStep<T> {
    /// The handler's trap produced the result
    Trapped(T),
    /// The handler has no trap; the operation continues on the target
    Forward(ObjectId),
}

/// Target and handler of a live proxy.
fn proxy_parts(realm: &Realm, proxy: ObjectId, trap: ProxyTrap) -> VmResult<(ObjectId, ObjectId)> {
    let record = realm
        .object(proxy)
        .as_proxy()
        .ok_or_else(|| VmError::type_error("Object is not a proxy"))?;
    match (record.target(), record.handler()) {
        (Some(target), Some(handler)) => Ok((target, handler)),
        _ => Err(VmError::type_error(format!(
            "Cannot perform '{}' on a revoked proxy",
            trap
        ))),
    }
}

/// Look the trap up on the handler and call it.
///
/// Returns `Ok(None)` when the handler has no such trap, in which case the
/// caller forwards to the target.
fn invoke_trap(
    realm: &mut Realm,
    proxy: ObjectId,
    trap: ProxyTrap,
    args: &[Value],
) -> VmResult<Option<Value>> {
    let (_, handler) = proxy_parts(realm, proxy, trap)?;
    let trap_fn = realm.get_property(handler, &PropertyKey::string(trap.name()))?;

    if trap_fn.is_nullish() {
        return Ok(None);
    }

    if !realm.is_callable(&trap_fn) {
        return Err(VmError::type_error(format!(
            "Proxy handler's '{}' trap must be a function",
            trap
        )));
    }

    realm.stats.trap_invocations += 1;
    tracing::trace!(target: "otter::proxy", proxy = %proxy, trap = %trap, "invoking trap");

    let result = realm.call(&trap_fn, Value::object(handler), args)?;
    Ok(Some(result))
}

/// ES §10.5.1: [[GetPrototypeOf]]
pub fn proxy_get_prototype_of(realm: &mut Realm, proxy: ObjectId) -> VmResult<Option<ObjectId>> {
    let (target, _) = proxy_parts(realm, proxy, ProxyTrap::GetPrototypeOf)?;

    let trap_result = invoke_trap(realm, proxy, ProxyTrap::GetPrototypeOf, &[Value::object(target)])?;
    let proto_value = match trap_result {
        Some(r) => r,
        None => return realm.forward_prototype_of(target),
    };

    let trap_proto = if proto_value.is_null() {
        None
    } else if let Some(obj) = proto_value.as_object() {
        Some(obj)
    } else {
        return Err(VmError::type_error(
            "Proxy 'getPrototypeOf' trap must return an object or null",
        ));
    };

    validate_get_prototype_of_invariants(realm, target, trap_proto)?;
    Ok(trap_proto)
}

fn validate_get_prototype_of_invariants(
    realm: &mut Realm,
    target: ObjectId,
    trap_proto: Option<ObjectId>,
) -> VmResult<()> {
    if realm.is_extensible(target)? {
        return Ok(());
    }
    if realm.forward_prototype_of(target)? != trap_proto {
        return Err(VmError::type_error(
            "Proxy 'getPrototypeOf' trap result must match target's prototype for non-extensible target",
        ));
    }
    Ok(())
}

/// ES §10.5.8: [[Get]]
pub fn proxy_get(
    realm: &mut Realm,
    proxy: ObjectId,
    key: &PropertyKey,
    receiver: Value,
) -> VmResult<Value> {
    match proxy_get_step(realm, proxy, key, &receiver)? {
        ProxyStep::Trapped(value) => Ok(value),
        ProxyStep::Forward(target) => realm.get(target, key, &receiver),
    }
}

/// [[Get]] on a proxy without following a missing trap to the target.
/// [`Realm::get`] continues the lookup itself so that cycles through
/// trap-less proxies stay under the chain length bound.
pub(crate) fn proxy_get_step(
    realm: &mut Realm,
    proxy: ObjectId,
    key: &PropertyKey,
    receiver: &Value,
) -> VmResult<ProxyStep<Value>> {
    let (target, _) = proxy_parts(realm, proxy, ProxyTrap::Get)?;

    let trap_args = [Value::object(target), key.to_value(), receiver.clone()];
    let Some(result) = invoke_trap(realm, proxy, ProxyTrap::Get, &trap_args)? else {
        return Ok(ProxyStep::Forward(target));
    };

    validate_get_trap_invariants(realm, target, key, &result)?;
    Ok(ProxyStep::Trapped(result))
}

fn validate_get_trap_invariants(
    realm: &mut Realm,
    target: ObjectId,
    key: &PropertyKey,
    trap_result: &Value,
) -> VmResult<()> {
    match realm.get_own_property(target, key)? {
        Some(PropertyDescriptor::Data { value, attributes })
            if !attributes.configurable && !attributes.writable =>
        {
            if !trap_result.same_value(&value) {
                return Err(VmError::type_error(
                    "Proxy 'get' trap returned value that doesn't match non-configurable, non-writable data property",
                ));
            }
        }
        Some(PropertyDescriptor::Accessor {
            get: None,
            attributes,
            ..
        }) if !attributes.configurable => {
            if !trap_result.is_undefined() {
                return Err(VmError::type_error(
                    "Proxy 'get' trap must return undefined for non-configurable accessor property with undefined getter",
                ));
            }
        }
        _ => {}
    }
    Ok(())
}

/// ES §10.5.9: [[Set]]
pub fn proxy_set(
    realm: &mut Realm,
    proxy: ObjectId,
    key: &PropertyKey,
    value: Value,
    receiver: Value,
) -> VmResult<bool> {
    match proxy_set_step(realm, proxy, key, &value, &receiver)? {
        ProxyStep::Trapped(success) => Ok(success),
        ProxyStep::Forward(target) => realm.set(target, key, value, &receiver),
    }
}

pub(crate) fn proxy_set_step(
    realm: &mut Realm,
    proxy: ObjectId,
    key: &PropertyKey,
    value: &Value,
    receiver: &Value,
) -> VmResult<ProxyStep<bool>> {
    let (target, _) = proxy_parts(realm, proxy, ProxyTrap::Set)?;

    let trap_args = [
        Value::object(target),
        key.to_value(),
        value.clone(),
        receiver.clone(),
    ];
    let Some(result) = invoke_trap(realm, proxy, ProxyTrap::Set, &trap_args)? else {
        return Ok(ProxyStep::Forward(target));
    };

    let success = result.to_boolean();
    if success {
        validate_set_trap_invariants(realm, target, key, value)?;
    }
    Ok(ProxyStep::Trapped(success))
}

fn validate_set_trap_invariants(
    realm: &mut Realm,
    target: ObjectId,
    key: &PropertyKey,
    value: &Value,
) -> VmResult<()> {
    match realm.get_own_property(target, key)? {
        Some(PropertyDescriptor::Data {
            value: target_value,
            attributes,
        }) if !attributes.configurable && !attributes.writable => {
            if !value.same_value(&target_value) {
                return Err(VmError::type_error(
                    "Proxy 'set' trap cannot change the value of a non-configurable, non-writable property",
                ));
            }
        }
        Some(PropertyDescriptor::Accessor {
            set: None,
            attributes,
            ..
        }) if !attributes.configurable => {
            return Err(VmError::type_error(
                "Proxy 'set' trap cannot succeed for a non-configurable accessor without a setter",
            ));
        }
        _ => {}
    }
    Ok(())
}

/// ES §10.5.7: [[HasProperty]]
pub fn proxy_has(realm: &mut Realm, proxy: ObjectId, key: &PropertyKey) -> VmResult<bool> {
    match proxy_has_step(realm, proxy, key)? {
        ProxyStep::Trapped(found) => Ok(found),
        ProxyStep::Forward(target) => realm.has_property(target, key),
    }
}

pub(crate) fn proxy_has_step(
    realm: &mut Realm,
    proxy: ObjectId,
    key: &PropertyKey,
) -> VmResult<ProxyStep<bool>> {
    let (target, _) = proxy_parts(realm, proxy, ProxyTrap::Has)?;

    let trap_args = [Value::object(target), key.to_value()];
    let Some(result) = invoke_trap(realm, proxy, ProxyTrap::Has, &trap_args)? else {
        return Ok(ProxyStep::Forward(target));
    };

    let found = result.to_boolean();
    if !found {
        validate_hidden_property(realm, target, key, ProxyTrap::Has)?;
    }
    Ok(ProxyStep::Trapped(found))
}

/// A trap may not report an own property of the target as missing (`has`)
/// or gone (`deleteProperty`) when it is non-configurable, or when the
/// target is non-extensible.
fn validate_hidden_property(
    realm: &mut Realm,
    target: ObjectId,
    key: &PropertyKey,
    trap: ProxyTrap,
) -> VmResult<()> {
    let Some(desc) = realm.get_own_property(target, key)? else {
        return Ok(());
    };
    if !desc.is_configurable() {
        return Err(VmError::type_error(format!(
            "Proxy '{}' trap cannot hide non-configurable property '{}'",
            trap, key
        )));
    }
    if !realm.is_extensible(target)? {
        return Err(VmError::type_error(format!(
            "Proxy '{}' trap cannot hide property '{}' of a non-extensible target",
            trap, key
        )));
    }
    Ok(())
}

/// ES §10.5.10: [[Delete]]
pub fn proxy_delete_property(
    realm: &mut Realm,
    proxy: ObjectId,
    key: &PropertyKey,
) -> VmResult<bool> {
    let (target, _) = proxy_parts(realm, proxy, ProxyTrap::DeleteProperty)?;

    let trap_args = [Value::object(target), key.to_value()];
    let deleted = match invoke_trap(realm, proxy, ProxyTrap::DeleteProperty, &trap_args)? {
        Some(r) => r.to_boolean(),
        None => return realm.delete_property(target, key),
    };

    if deleted {
        validate_hidden_property(realm, target, key, ProxyTrap::DeleteProperty)?;
    }
    Ok(deleted)
}

/// ES §10.5.6: [[DefineOwnProperty]]
pub fn proxy_define_property(
    realm: &mut Realm,
    proxy: ObjectId,
    key: &PropertyKey,
    desc: PropertyDescriptor,
) -> VmResult<bool> {
    let (target, _) = proxy_parts(realm, proxy, ProxyTrap::DefineProperty)?;

    let desc_obj = descriptor_to_object(realm, &desc);
    let trap_args = [Value::object(target), key.to_value(), Value::object(desc_obj)];
    let success = match invoke_trap(realm, proxy, ProxyTrap::DefineProperty, &trap_args)? {
        Some(r) => r.to_boolean(),
        None => return realm.define_property(target, key, desc),
    };

    if success {
        validate_define_property_invariants(realm, target, key, &desc)?;
    }
    Ok(success)
}

fn validate_define_property_invariants(
    realm: &mut Realm,
    target: ObjectId,
    key: &PropertyKey,
    desc: &PropertyDescriptor,
) -> VmResult<()> {
    let target_desc = realm.get_own_property(target, key)?;
    match target_desc {
        None => {
            if !realm.is_extensible(target)? {
                return Err(VmError::type_error(format!(
                    "Proxy 'defineProperty' trap cannot add property '{}' to a non-extensible target",
                    key
                )));
            }
            if !desc.is_configurable() {
                return Err(VmError::type_error(format!(
                    "Proxy 'defineProperty' trap cannot define non-configurable property '{}' missing on the target",
                    key
                )));
            }
        }
        Some(existing) => {
            if !desc.is_configurable() && existing.is_configurable() {
                return Err(VmError::type_error(format!(
                    "Proxy 'defineProperty' trap cannot report property '{}' as non-configurable",
                    key
                )));
            }
        }
    }
    Ok(())
}

/// Materialize a descriptor as a plain object for the `defineProperty` trap.
fn descriptor_to_object(realm: &mut Realm, desc: &PropertyDescriptor) -> ObjectId {
    let obj = realm.create_object();
    let put = |realm: &mut Realm, name: &str, value: Value| {
        realm.define_own_data(obj, &PropertyKey::string(name), value, PropertyAttributes::data());
    };

    match desc {
        PropertyDescriptor::Data { value, attributes } => {
            put(realm, "value", value.clone());
            put(realm, "writable", Value::boolean(attributes.writable));
        }
        PropertyDescriptor::Accessor { get, set, .. } => {
            put(realm, "get", get.clone().unwrap_or_default());
            put(realm, "set", set.clone().unwrap_or_default());
        }
    }
    let attributes = desc.attributes();
    put(realm, "enumerable", Value::boolean(attributes.enumerable));
    put(realm, "configurable", Value::boolean(attributes.configurable));
    obj
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn handler_with(realm: &mut Realm, trap: &str, func: ObjectId) -> ObjectId {
        let handler = realm.create_object();
        realm.define_own_data(
            handler,
            &PropertyKey::string(trap),
            Value::object(func),
            PropertyAttributes::data(),
        );
        handler
    }

    #[test]
    fn test_missing_trap_forwards_to_target() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        realm
            .set_property(target, &"x".into(), Value::int32(7))
            .unwrap();
        let handler = realm.create_object();
        let proxy = realm
            .create_proxy(&Value::object(target), &Value::object(handler))
            .unwrap();

        let x = proxy_get(&mut realm, proxy, &"x".into(), Value::object(proxy)).unwrap();
        assert_eq!(x, Value::int32(7));
        assert_eq!(realm.stats().trap_invocations, 0);
    }

    #[test]
    fn test_get_prototype_of_counts_one_read() {
        let mut realm = Realm::new();
        let proto = realm.create_object();
        let target = realm.create_object_with_prototype(Some(proto));
        let handler = realm.create_object();
        let proxy = realm
            .create_proxy(&Value::object(target), &Value::object(handler))
            .unwrap();

        realm.reset_stats();
        assert_eq!(realm.get_prototype_of(proxy).unwrap(), Some(proto));
        assert_eq!(realm.stats().prototype_reads, 1);

        // The non-extensible invariant check reads the target's link too
        realm.prevent_extensions(target).unwrap();
        let trap = realm.create_function("getPrototypeOf", move |_, _, _| Ok(Value::object(proto)));
        realm.define_own_data(
            handler,
            &PropertyKey::string("getPrototypeOf"),
            Value::object(trap),
            PropertyAttributes::data(),
        );
        realm.reset_stats();
        assert_eq!(realm.get_prototype_of(proxy).unwrap(), Some(proto));
        assert_eq!(realm.stats().prototype_reads, 1);
        assert_eq!(realm.stats().trap_invocations, 1);
    }

    #[test]
    fn test_set_forwards_to_target_without_trap() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        let handler = realm.create_object();
        let proxy = realm
            .create_proxy(&Value::object(target), &Value::object(handler))
            .unwrap();

        assert!(proxy_set(&mut realm, proxy, &"x".into(), Value::int32(4), Value::object(target)).unwrap());
        assert_eq!(realm.get_property(target, &"x".into()).unwrap(), Value::int32(4));
        assert_eq!(realm.stats().trap_invocations, 0);
    }

    #[test]
    fn test_get_trap_called_with_handler_this() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        let seen_this = Rc::new(Cell::new(None));
        let seen = seen_this.clone();
        let trap = realm.create_function("get", move |_, this, args| {
            seen.set(this.as_object());
            assert_eq!(args.len(), 3);
            Ok(Value::int32(99))
        });
        let handler = handler_with(&mut realm, "get", trap);
        let proxy = realm
            .create_proxy(&Value::object(target), &Value::object(handler))
            .unwrap();

        let v = proxy_get(&mut realm, proxy, &"anything".into(), Value::object(proxy)).unwrap();
        assert_eq!(v, Value::int32(99));
        assert_eq!(seen_this.get(), Some(handler));
        assert_eq!(realm.stats().trap_invocations, 1);
    }

    #[test]
    fn test_non_callable_trap_is_type_error() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        let handler = realm.create_object();
        realm.define_own_data(
            handler,
            &PropertyKey::string("has"),
            Value::int32(1),
            PropertyAttributes::data(),
        );
        let proxy = realm
            .create_proxy(&Value::object(target), &Value::object(handler))
            .unwrap();

        let err = proxy_has(&mut realm, proxy, &"x".into()).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_get_prototype_of_rejects_primitive() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        let trap = realm.create_function("getPrototypeOf", |_, _, _| Ok(Value::int32(3)));
        let handler = handler_with(&mut realm, "getPrototypeOf", trap);
        let proxy = realm
            .create_proxy(&Value::object(target), &Value::object(handler))
            .unwrap();

        let err = proxy_get_prototype_of(&mut realm, proxy).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_get_prototype_of_non_extensible_invariant() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        let other = realm.create_object();
        realm.prevent_extensions(target).unwrap();
        let trap = realm.create_function("getPrototypeOf", move |_, _, _| {
            Ok(Value::object(other))
        });
        let handler = handler_with(&mut realm, "getPrototypeOf", trap);
        let proxy = realm
            .create_proxy(&Value::object(target), &Value::object(handler))
            .unwrap();

        let err = proxy_get_prototype_of(&mut realm, proxy).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_get_invariant_non_writable() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        realm
            .define_property(
                target,
                &"c".into(),
                PropertyDescriptor::data_with_attrs(Value::int32(1), PropertyAttributes::frozen()),
            )
            .unwrap();
        let trap = realm.create_function("get", |_, _, _| Ok(Value::int32(2)));
        let handler = handler_with(&mut realm, "get", trap);
        let proxy = realm
            .create_proxy(&Value::object(target), &Value::object(handler))
            .unwrap();

        let err = proxy_get(&mut realm, proxy, &"c".into(), Value::object(proxy)).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_has_cannot_hide_non_configurable() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        realm
            .define_property(
                target,
                &"c".into(),
                PropertyDescriptor::data_with_attrs(Value::int32(1), PropertyAttributes::frozen()),
            )
            .unwrap();
        let trap = realm.create_function("has", |_, _, _| Ok(Value::boolean(false)));
        let handler = handler_with(&mut realm, "has", trap);
        let proxy = realm
            .create_proxy(&Value::object(target), &Value::object(handler))
            .unwrap();

        assert!(proxy_has(&mut realm, proxy, &"c".into()).is_err());
        assert!(!proxy_has(&mut realm, proxy, &"other".into()).unwrap());
    }

    #[test]
    fn test_define_property_trap_receives_descriptor_object() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        let trap = realm.create_function("defineProperty", |realm, _, args| {
            let desc = args[2].as_object().unwrap();
            let value = realm.get_property(desc, &"value".into())?;
            assert_eq!(value, Value::int32(5));
            let writable = realm.get_property(desc, &"writable".into())?;
            assert_eq!(writable, Value::boolean(true));
            Ok(Value::boolean(true))
        });
        let handler = handler_with(&mut realm, "defineProperty", trap);
        let proxy = realm
            .create_proxy(&Value::object(target), &Value::object(handler))
            .unwrap();

        let ok = proxy_define_property(
            &mut realm,
            proxy,
            &"v".into(),
            PropertyDescriptor::data(Value::int32(5)),
        )
        .unwrap();
        assert!(ok);
        // The trap reported success without touching the target
        assert!(realm.get_own_property(target, &"v".into()).unwrap().is_none());
    }

    #[test]
    fn test_delete_forwarding_and_trap() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        realm
            .set_property(target, &"x".into(), Value::int32(1))
            .unwrap();
        let handler = realm.create_object();
        let proxy = realm
            .create_proxy(&Value::object(target), &Value::object(handler))
            .unwrap();

        assert!(proxy_delete_property(&mut realm, proxy, &"x".into()).unwrap());
        assert!(!realm.has_property(target, &"x".into()).unwrap());
    }

    #[test]
    fn test_revoked_proxy_rejects_every_trap() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        let handler = realm.create_object();
        let (proxy, revoke) = realm
            .create_revocable_proxy(&Value::object(target), &Value::object(handler))
            .unwrap();
        realm
            .call(&Value::object(revoke), Value::undefined(), &[])
            .unwrap();

        let err = proxy_get_prototype_of(&mut realm, proxy).unwrap_err();
        assert!(err.to_string().contains("revoked"));
        assert!(proxy_get(&mut realm, proxy, &"x".into(), Value::object(proxy)).is_err());
        assert!(proxy_has(&mut realm, proxy, &"x".into()).is_err());
    }
}
