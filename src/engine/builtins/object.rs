//! The Object constructor and prototype, §15.2.

use super::{arg, has_unknown};
use crate::engine::conversions::to_boolean;
use crate::engine::types::*;
use crate::engine::{Engine, ErrorKind};
use crate::tryc;
use crate::types::{JsString, Value};

impl Engine {
    pub(crate) fn setup_object_builtin(&mut self) {
        let proto = self.object_prototype.clone().unwrap();

        // §15.2.1 / §15.2.2 — Object(value)
        let ctor = self.define_constructor("Object", 1, &proto, |engine, _this, args| {
            let value = arg(args, 0);
            match value {
                Value::Undefined | Value::Null => {
                    Completion::Normal(Engine::handle_of(&engine.create_object()))
                }
                other => engine.to_object(&other),
            }
        });
        let ctor_obj = self.resolve_object(&ctor).unwrap();

        // §15.2.3.2
        self.add_native(&ctor_obj, "getPrototypeOf", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(obj) = engine.resolve_object(&arg(args, 0)) else {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Object.getPrototypeOf called on non-object",
                );
            };
            let (proto, unknown) = {
                let b = obj.borrow();
                (b.prototype.clone(), b.prototype_unknown)
            };
            if unknown {
                return engine.unknown_value();
            }
            Completion::Normal(match proto {
                Some(p) => Engine::handle_of(&p),
                None => Value::Null,
            })
        });

        // §15.2.3.3
        self.add_native(
            &ctor_obj,
            "getOwnPropertyDescriptor",
            2,
            |engine, this, args| {
                if has_unknown(this, args) {
                    return engine.unknown_value();
                }
                let Some(obj) = engine.resolve_object(&arg(args, 0)) else {
                    return engine.handle_recoverable_native_exception(
                        ErrorKind::TypeError,
                        "Object.getOwnPropertyDescriptor called on non-object",
                    );
                };
                let Some(name) = tryc!(engine.string_arg(&arg(args, 1))) else {
                    return engine.unknown_value();
                };
                let desc = obj.borrow().get_own_property(&name);
                match desc {
                    Some(d) => Completion::Normal(engine.from_property_descriptor(&d)),
                    None => Completion::Normal(Value::Undefined),
                }
            },
        );

        // §15.2.3.4
        self.add_native(&ctor_obj, "getOwnPropertyNames", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(obj) = engine.resolve_object(&arg(args, 0)) else {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Object.getOwnPropertyNames called on non-object",
                );
            };
            let names = own_property_names(&obj, false);
            let elements = names
                .into_iter()
                .map(|n| Value::String(JsString::from_str(&n)))
                .collect();
            Completion::Normal(engine.create_array(elements))
        });

        // §15.2.3.5
        self.add_native(&ctor_obj, "create", 2, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let proto_arg = arg(args, 0);
            let obj = engine.create_bare_object();
            match &proto_arg {
                Value::Object(p) => obj.borrow_mut().prototype = engine.get_object(p.id),
                Value::Null => {}
                _ => {
                    return engine.handle_recoverable_native_exception(
                        ErrorKind::TypeError,
                        "Object prototype may only be an Object or null",
                    );
                }
            }
            let result = Engine::handle_of(&obj);
            let props = arg(args, 1);
            if !props.is_undefined() {
                let id = obj.borrow().id.unwrap();
                let comp = engine.define_properties_from(id, &props);
                if comp.is_abrupt() {
                    return comp;
                }
            }
            Completion::Normal(result)
        });

        // §15.2.3.6
        self.add_native(&ctor_obj, "defineProperty", 3, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let target = arg(args, 0);
            let Some(obj) = engine.resolve_object(&target) else {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Object.defineProperty called on non-object",
                );
            };
            let Some(name) = tryc!(engine.string_arg(&arg(args, 1))) else {
                return engine.unknown_value();
            };
            let desc = match engine.to_property_descriptor(&arg(args, 2)) {
                Ok(d) => d,
                Err(comp) => return comp,
            };
            let id = obj.borrow().id.unwrap();
            let result = engine.object_define_own_property(id, &name, desc, true);
            if result.is_abrupt() {
                return result;
            }
            Completion::Normal(target)
        });

        // §15.2.3.7
        self.add_native(&ctor_obj, "defineProperties", 2, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let target = arg(args, 0);
            let Some(obj) = engine.resolve_object(&target) else {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Object.defineProperties called on non-object",
                );
            };
            let id = obj.borrow().id.unwrap();
            let comp = engine.define_properties_from(id, &arg(args, 1));
            if comp.is_abrupt() {
                return comp;
            }
            Completion::Normal(target)
        });

        // §15.2.3.8 / §15.2.3.9 / §15.2.3.10
        self.add_native(&ctor_obj, "seal", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let target = arg(args, 0);
            let Some(obj) = engine.resolve_object(&target) else {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Object.seal called on non-object",
                );
            };
            let mut b = obj.borrow_mut();
            for prop in b.properties.values_mut() {
                prop.desc.configurable = Some(false);
            }
            b.extensible = false;
            drop(b);
            Completion::Normal(target)
        });

        self.add_native(&ctor_obj, "freeze", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let target = arg(args, 0);
            let Some(obj) = engine.resolve_object(&target) else {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Object.freeze called on non-object",
                );
            };
            let mut b = obj.borrow_mut();
            for prop in b.properties.values_mut() {
                if prop.desc.is_data_descriptor() {
                    prop.desc.writable = Some(false);
                }
                prop.desc.configurable = Some(false);
            }
            b.extensible = false;
            drop(b);
            Completion::Normal(target)
        });

        self.add_native(&ctor_obj, "preventExtensions", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let target = arg(args, 0);
            let Some(obj) = engine.resolve_object(&target) else {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Object.preventExtensions called on non-object",
                );
            };
            obj.borrow_mut().extensible = false;
            Completion::Normal(target)
        });

        // §15.2.3.11 / §15.2.3.12 / §15.2.3.13
        self.add_native(&ctor_obj, "isSealed", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(obj) = engine.resolve_object(&arg(args, 0)) else {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Object.isSealed called on non-object",
                );
            };
            let b = obj.borrow();
            let sealed = !b.extensible
                && b.properties
                    .values()
                    .all(|p| p.desc.configurable != Some(true));
            Completion::Normal(Value::Boolean(sealed))
        });

        self.add_native(&ctor_obj, "isFrozen", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(obj) = engine.resolve_object(&arg(args, 0)) else {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Object.isFrozen called on non-object",
                );
            };
            let b = obj.borrow();
            let frozen = !b.extensible
                && b.properties.values().all(|p| {
                    p.desc.configurable != Some(true)
                        && (!p.desc.is_data_descriptor() || p.desc.writable != Some(true))
                });
            Completion::Normal(Value::Boolean(frozen))
        });

        self.add_native(&ctor_obj, "isExtensible", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(obj) = engine.resolve_object(&arg(args, 0)) else {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Object.isExtensible called on non-object",
                );
            };
            let extensible = obj.borrow().extensible;
            Completion::Normal(Value::Boolean(extensible))
        });

        // §15.2.3.14
        self.add_native(&ctor_obj, "keys", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(obj) = engine.resolve_object(&arg(args, 0)) else {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Object.keys called on non-object",
                );
            };
            let names = own_property_names(&obj, true);
            let elements = names
                .into_iter()
                .map(|n| Value::String(JsString::from_str(&n)))
                .collect();
            Completion::Normal(engine.create_array(elements))
        });

        // Object.prototype methods, §15.2.4

        self.add_native(&proto, "toString", 0, |engine, this, _args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            let tag = match this {
                Value::Undefined => "Undefined".to_string(),
                Value::Null => "Null".to_string(),
                other => match engine.resolve_object(other) {
                    Some(obj) => obj.borrow().class_name.clone(),
                    None => match other {
                        Value::Boolean(_) => "Boolean".to_string(),
                        Value::Number(_) => "Number".to_string(),
                        Value::String(_) => "String".to_string(),
                        _ => "Object".to_string(),
                    },
                },
            };
            Completion::Normal(Value::String(JsString::from_str(&format!(
                "[object {tag}]"
            ))))
        });

        self.add_native(&proto, "toLocaleString", 0, |engine, this, _args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            let id = tryc!(engine.this_object_id(this));
            let to_string = match engine.object_get(id, "toString") {
                Completion::Normal(v) => v,
                other => return other,
            };
            if !engine.is_callable_value(&to_string) {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "toString is not callable",
                );
            }
            engine.call_function(&to_string, this, &[], true)
        });

        self.add_native(&proto, "valueOf", 0, |engine, this, _args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            engine.to_object(this)
        });

        // §15.2.4.5
        self.add_native(&proto, "hasOwnProperty", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(name) = tryc!(engine.string_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let id = tryc!(engine.this_object_id(this));
            let Some(obj) = engine.get_object(id) else {
                return Completion::Normal(Value::Boolean(false));
            };
            let has = obj.borrow().get_own_property(&name).is_some();
            Completion::Normal(Value::Boolean(has))
        });

        // §15.2.4.6 — the check is `o === v` on every iteration after
        // stepping v to its prototype.
        self.add_native(&proto, "isPrototypeOf", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(candidate) = engine.resolve_object(&arg(args, 0)) else {
                return Completion::Normal(Value::Boolean(false));
            };
            let id = tryc!(engine.this_object_id(this));
            let Some(o) = engine.get_object(id) else {
                return Completion::Normal(Value::Boolean(false));
            };
            let mut chain_unknown = candidate.borrow().prototype_unknown;
            let mut v = candidate.borrow().prototype.clone();
            while let Some(current) = v {
                if std::rc::Rc::ptr_eq(&current, &o) {
                    return Completion::Normal(Value::Boolean(true));
                }
                chain_unknown |= current.borrow().prototype_unknown;
                let next = current.borrow().prototype.clone();
                if let Some(n) = &next {
                    if std::rc::Rc::ptr_eq(n, &current) {
                        break;
                    }
                }
                v = next;
            }
            if chain_unknown {
                engine.unknown_value()
            } else {
                Completion::Normal(Value::Boolean(false))
            }
        });

        // §15.2.4.7
        self.add_native(&proto, "propertyIsEnumerable", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(name) = tryc!(engine.string_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let id = tryc!(engine.this_object_id(this));
            let Some(obj) = engine.get_object(id) else {
                return Completion::Normal(Value::Boolean(false));
            };
            let enumerable = obj
                .borrow()
                .get_own_property(&name)
                .map(|d| d.enumerable == Some(true))
                .unwrap_or(false);
            Completion::Normal(Value::Boolean(enumerable))
        });
    }

    /// §8.10.5 ToPropertyDescriptor, including the accessor/data conflict
    /// and callability checks.
    pub(crate) fn to_property_descriptor(
        &mut self,
        val: &Value,
    ) -> Result<PropertyDescriptor, Completion> {
        let Some(obj) = self.resolve_object(val) else {
            if val.is_unknown() {
                return Err(self.unknown_value());
            }
            return Err(self.handle_recoverable_native_exception(
                ErrorKind::TypeError,
                "Property description must be an object",
            ));
        };
        let id = obj.borrow().id.unwrap();
        let mut desc = PropertyDescriptor::default();

        let has = |engine: &Engine, name: &str| -> bool {
            engine
                .get_object(id)
                .map(|o| o.borrow().has_property(name) != Some(false))
                .unwrap_or(false)
        };

        if has(self, "enumerable") {
            let v = match self.object_get(id, "enumerable") {
                Completion::Normal(v) => v,
                other => return Err(other),
            };
            desc.enumerable = Some(to_boolean(&v).unwrap_or(false));
        }
        if has(self, "configurable") {
            let v = match self.object_get(id, "configurable") {
                Completion::Normal(v) => v,
                other => return Err(other),
            };
            desc.configurable = Some(to_boolean(&v).unwrap_or(false));
        }
        if has(self, "value") {
            let v = match self.object_get(id, "value") {
                Completion::Normal(v) => v,
                other => return Err(other),
            };
            desc.value = Some(v);
        }
        if has(self, "writable") {
            let v = match self.object_get(id, "writable") {
                Completion::Normal(v) => v,
                other => return Err(other),
            };
            desc.writable = Some(to_boolean(&v).unwrap_or(false));
        }
        if has(self, "get") {
            let v = match self.object_get(id, "get") {
                Completion::Normal(v) => v,
                other => return Err(other),
            };
            if !v.is_undefined() && !v.is_unknown() && !self.is_callable_value(&v) {
                return Err(self.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Getter must be a function",
                ));
            }
            desc.get = Some(v);
        }
        if has(self, "set") {
            let v = match self.object_get(id, "set") {
                Completion::Normal(v) => v,
                other => return Err(other),
            };
            if !v.is_undefined() && !v.is_unknown() && !self.is_callable_value(&v) {
                return Err(self.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Setter must be a function",
                ));
            }
            desc.set = Some(v);
        }

        if desc.is_accessor_descriptor() && (desc.value.is_some() || desc.writable.is_some()) {
            return Err(self.handle_recoverable_native_exception(
                ErrorKind::TypeError,
                "Invalid property descriptor: cannot both specify accessors and a value or writable attribute",
            ));
        }
        Ok(desc)
    }

    /// §8.10.4 FromPropertyDescriptor
    pub(crate) fn from_property_descriptor(&mut self, desc: &PropertyDescriptor) -> Value {
        let obj = self.create_object();
        {
            let mut o = obj.borrow_mut();
            if let Some(v) = &desc.value {
                o.insert_value("value".to_string(), v.clone());
            }
            if let Some(w) = desc.writable {
                o.insert_value("writable".to_string(), Value::Boolean(w));
            }
            if let Some(g) = &desc.get {
                o.insert_value("get".to_string(), g.clone());
            }
            if let Some(s) = &desc.set {
                o.insert_value("set".to_string(), s.clone());
            }
            if let Some(e) = desc.enumerable {
                o.insert_value("enumerable".to_string(), Value::Boolean(e));
            }
            if let Some(c) = desc.configurable {
                o.insert_value("configurable".to_string(), Value::Boolean(c));
            }
        }
        Engine::handle_of(&obj)
    }

    fn define_properties_from(&mut self, id: u64, props: &Value) -> Completion {
        let Some(props_obj) = self.resolve_object(props) else {
            if props.is_unknown() {
                return self.unknown_value();
            }
            return self.handle_recoverable_native_exception(
                ErrorKind::TypeError,
                "Properties argument must be an object",
            );
        };
        let names = own_property_names(&props_obj, true);
        let props_id = props_obj.borrow().id.unwrap();
        for name in names {
            let desc_val = match self.object_get(props_id, &name) {
                Completion::Normal(v) => v,
                other => return other,
            };
            let desc = match self.to_property_descriptor(&desc_val) {
                Ok(d) => d,
                Err(comp) => return comp,
            };
            let result = self.object_define_own_property(id, &name, desc, true);
            if result.is_abrupt() {
                return result;
            }
        }
        Completion::Normal(Value::Undefined)
    }
}

/// Own property names: integer indices in ascending order first, then the
/// rest sorted by name; optionally restricted to enumerable ones.
pub(crate) fn own_property_names(obj: &ObjRef, enumerable_only: bool) -> Vec<String> {
    let b = obj.borrow();
    let mut named: Vec<(String, u32)> = b
        .properties
        .iter()
        .filter(|(_, p)| !enumerable_only || p.desc.enumerable == Some(true))
        .map(|(name, _)| (name.clone(), array_index_of(name).unwrap_or(u32::MAX)))
        .collect();
    if b.class_name == "String" {
        if let Some(Value::String(s)) = &b.primitive_value {
            for i in 0..s.len() {
                let name = i.to_string();
                if !b.properties.contains_key(&name) {
                    named.push((name, i as u32));
                }
            }
            if !enumerable_only && !b.properties.contains_key("length") {
                named.push(("length".to_string(), u32::MAX));
            }
        }
    }
    named.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    named.into_iter().map(|(n, _)| n).collect()
}
