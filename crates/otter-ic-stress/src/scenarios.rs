//! Stress scenarios
//!
//! Each scenario drives hot inline cache sites while re-entrant code mutates
//! the objects those sites depend on, then checks that every answer matches
//! what an uncached evaluation would produce.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::{Context, ensure};
use clap::ValueEnum;
use otter_vm_object::{ObjectId, PropertyKey, Realm, RealmStats, RuntimeConfig, Value};
use serde::Serialize;

/// A named stress scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// `instanceof` against a constructor whose prototype is a proxy
    InstanceofProxyLoop,
    /// One read site fed more shapes than it can hold
    PolymorphicGet,
    /// Prototype values replaced from inside a proxy trap
    PrototypeReplacement,
}

/// Outcome of one scenario run.
#[derive(Debug, Serialize)]
pub struct Report {
    pub scenario: Scenario,
    pub loop_count: usize,
    pub inline_caches: bool,
    /// Assertions that held
    pub checks: usize,
    pub stats: RealmStats,
}

impl Scenario {
    pub fn all() -> &'static [Scenario] {
        &[
            Scenario::InstanceofProxyLoop,
            Scenario::PolymorphicGet,
            Scenario::PrototypeReplacement,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            Scenario::InstanceofProxyLoop => "instanceof-proxy-loop",
            Scenario::PolymorphicGet => "polymorphic-get",
            Scenario::PrototypeReplacement => "prototype-replacement",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Scenario::InstanceofProxyLoop => {
                "getPrototypeOf trap replaces a cached data property with a getter"
            }
            Scenario::PolymorphicGet => "eight shapes through one get_by_id site",
            Scenario::PrototypeReplacement => {
                "get trap overwrites a prototype constant read by a hot site"
            }
        }
    }

    pub fn run(self, config: &RuntimeConfig, loop_count: usize) -> anyhow::Result<Report> {
        tracing::info!(scenario = self.name(), loop_count, "running scenario");
        let mut realm = Realm::with_config(config.clone());
        let checks = match self {
            Scenario::InstanceofProxyLoop => instanceof_proxy_loop(&mut realm, loop_count)?,
            Scenario::PolymorphicGet => polymorphic_get(&mut realm, loop_count)?,
            Scenario::PrototypeReplacement => prototype_replacement(&mut realm, loop_count)?,
        };
        let stats = realm.stats();
        tracing::debug!(scenario = self.name(), ?stats, "scenario finished");
        Ok(Report {
            scenario: self,
            loop_count,
            inline_caches: config.inline_caches_enabled,
            checks,
            stats,
        })
    }
}

fn key(name: &str) -> PropertyKey {
    PropertyKey::string(name)
}

fn prototype_of(realm: &mut Realm, ctor: ObjectId) -> anyhow::Result<Value> {
    let prototype = realm.get_property(ctor, &key("prototype"))?;
    ensure!(prototype.is_object(), "constructor prototype is not an object");
    Ok(prototype)
}

fn number(value: &Value) -> anyhow::Result<f64> {
    value
        .as_number()
        .with_context(|| format!("expected a number, got {}", value.type_name()))
}

fn instanceof_proxy_loop(realm: &mut Realm, loop_count: usize) -> anyhow::Result<usize> {
    let globals = realm.create_object();
    let foo = realm.create_constructor("Foo", |_, _, _| Ok(Value::undefined()));
    let bar = realm.create_constructor("Bar", |_, _, _| Ok(Value::undefined()));
    let foo_prototype = prototype_of(realm, foo)?;

    let noop = realm.create_function("doBadThings", |_, _, _| Ok(Value::undefined()));
    realm.set_property(globals, &key("doBadThings"), Value::object(noop))?;

    let trap_calls = Rc::new(Cell::new(0usize));
    let counter = trap_calls.clone();
    let trap = realm.create_function("getPrototypeOf", move |realm, _, _| {
        counter.set(counter.get() + 1);
        let bad_things = realm.get_property(globals, &PropertyKey::string("doBadThings"))?;
        realm.call(&bad_things, Value::undefined(), &[])?;
        Ok(foo_prototype.clone())
    });
    let handler = realm.create_object();
    realm.set_property(handler, &key("getPrototypeOf"), Value::object(trap))?;
    let target = realm.create_object();
    let proxy = realm.create_proxy(&Value::object(target), &Value::object(handler))?;
    realm.set_property(bar, &key("prototype"), Value::object(proxy))?;

    let first_read = realm.create_get_by_id_site("f");
    let second_read = realm.create_get_by_id_site("f");
    let site = realm.create_instance_of_site();
    let mut checks = 0;

    let mut body = |realm: &mut Realm, o: &Value, p: &Value| -> anyhow::Result<f64> {
        let first = realm.get_by_id(first_read, o)?;
        for _ in 0..5 {
            ensure!(
                realm.instance_of(site, p, &Value::object(foo))?,
                "Bar instance is not instanceof Foo"
            );
            checks += 1;
        }
        let second = realm.get_by_id(second_read, o)?;
        Ok(number(&first)? + number(&second)?)
    };

    for i in 0..loop_count {
        let o = realm.create_object();
        realm.set_property(o, &key("f"), Value::int32(42))?;
        let p = realm.construct(&Value::object(bar), &[])?;
        let result = body(&mut *realm, &Value::object(o), &p)?;
        ensure!(result == 84.0, "bad result in loop iteration {}: {}", i, result);
    }
    ensure!(
        trap_calls.get() == loop_count * 5,
        "trap ran {} times, expected {}",
        trap_calls.get(),
        loop_count * 5
    );

    let global_o = realm.create_object();
    realm.set_property(global_o, &key("f"), Value::int32(42))?;
    let did_call_getter = Rc::new(Cell::new(false));
    let flag = did_call_getter.clone();
    let getter = realm.create_function("f", move |_, _, _| {
        flag.set(true);
        Ok(Value::int32(43))
    });
    let bad_things = realm.create_function("doBadThings", move |realm, _, _| {
        realm.delete_property(global_o, &PropertyKey::string("f"))?;
        realm.define_getter(global_o, &PropertyKey::string("f"), Value::object(getter))?;
        Ok(Value::undefined())
    });
    realm.set_property(globals, &key("doBadThings"), Value::object(bad_things))?;

    let p = realm.construct(&Value::object(bar), &[])?;
    let result = body(&mut *realm, &Value::object(global_o), &p)?;
    ensure!(result == 85.0, "bad result after doBadThings: {}", result);
    ensure!(did_call_getter.get(), "getter installed by the trap was not called");
    Ok(checks + loop_count + 3)
}

fn polymorphic_get(realm: &mut Realm, loop_count: usize) -> anyhow::Result<usize> {
    let site = realm.create_get_by_id_site("x");
    let mut objects = Vec::new();
    for width in 0..8 {
        let o = realm.create_object();
        for i in 0..width {
            realm.set_property(o, &key(&format!("pad{}", i)), Value::int32(-1))?;
        }
        realm.set_property(o, &key("x"), Value::int32(width))?;
        objects.push((Value::object(o), width));
    }

    let mut checks = 0;
    for _ in 0..loop_count {
        for (o, width) in &objects {
            let value = realm.get_by_id(site, o)?;
            ensure!(
                value == Value::int32(*width),
                "shape {} read {:?}",
                width,
                value
            );
            checks += 1;
        }
    }
    if realm.config().inline_caches_enabled && loop_count > 0 {
        ensure!(
            realm.caches().site(site).is_megamorphic(),
            "site did not go megamorphic"
        );
        checks += 1;
    }
    Ok(checks)
}

fn prototype_replacement(realm: &mut Realm, loop_count: usize) -> anyhow::Result<usize> {
    let proto = realm.create_object();
    realm.set_property(proto, &key("m"), Value::int32(0))?;
    let o = Value::object(realm.create_object_with_prototype(Some(proto)));
    let read_m = realm.create_get_by_id_site("m");
    let read_x = realm.create_get_by_id_site("x");

    let trap = realm.create_function("get", move |realm, _, _| {
        let current = realm.get_property(proto, &PropertyKey::string("m"))?;
        let next = current.as_number().unwrap_or(0.0) as i32 + 1;
        realm.set_property(proto, &PropertyKey::string("m"), Value::int32(next))?;
        Ok(Value::int32(next))
    });
    let handler = realm.create_object();
    realm.set_property(handler, &key("get"), Value::object(trap))?;
    let target = realm.create_object();
    let proxy = Value::object(realm.create_proxy(&Value::object(target), &Value::object(handler))?);

    let mut checks = 0;
    for i in 0..loop_count {
        let expected = Value::int32(i as i32);
        for _ in 0..3 {
            let value = realm.get_by_id(read_m, &o)?;
            ensure!(value == expected, "iteration {}: read {:?}, expected {:?}", i, value, expected);
            checks += 1;
        }
        realm.get_by_id(read_x, &proxy)?;
    }
    Ok(checks)
}
