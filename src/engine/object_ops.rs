//! The §8.12 internal methods over the property map, with the Array,
//! String and Arguments overrides. Pure descriptor machinery lives on
//! `ObjectData`; the operations that can run user code or fire analysis
//! events ([[Get]], [[Put]], [[DefaultValue]] and the event-wrapped
//! define/delete) are engine methods.

use std::rc::Rc;

use crate::engine::conversions::{self, PrimitiveHint, same_value};
use crate::engine::types::*;
use crate::engine::{AnalysisEvent, Engine, ErrorKind};
use crate::types::{Value, number_ops};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CanPut {
    Yes,
    No,
    Unknown,
}

impl ObjectData {
    /// Character-index and length properties synthesised from the wrapped
    /// primitive of a String object, §15.5.5.
    fn string_index_descriptor(&self, name: &str) -> Option<PropertyDescriptor> {
        if self.class_name != "String" {
            return None;
        }
        let Some(Value::String(s)) = &self.primitive_value else {
            return None;
        };
        if name == "length" {
            return Some(PropertyDescriptor::data(
                Value::Number(s.len() as f64),
                false,
                false,
                false,
            ));
        }
        let index: usize = name.parse().ok()?;
        if index.to_string() != name {
            return None;
        }
        s.char_at(index)
            .map(|ch| PropertyDescriptor::data(Value::String(ch), false, true, false))
    }

    // §8.12.1 [[GetOwnProperty]]
    pub fn get_own_property(&self, name: &str) -> Option<PropertyDescriptor> {
        let mut desc = match self.properties.get(name) {
            Some(p) => Some(p.desc.clone()),
            None => self.string_index_descriptor(name),
        }?;
        // Arguments override, §10.6: a mapped index reads through to the
        // named formal parameter binding.
        if let Some(map) = &self.parameter_map {
            if let Some((env, param)) = map.get(name) {
                if let Some(v) = read_declarative_binding(env, param) {
                    desc.value = Some(v);
                }
            }
        }
        Some(desc)
    }

    /// §8.12.2 [[GetProperty]]: own properties then the prototype chain.
    /// The second component is true when the chain contains an Unknown
    /// link, in which case a miss is indeterminate rather than definite.
    pub fn get_property_descriptor(&self, name: &str) -> (Option<PropertyDescriptor>, bool) {
        if let Some(d) = self.get_own_property(name) {
            return (Some(d), false);
        }
        let mut chain_unknown = self.prototype_unknown;
        let mut current = self.prototype.clone();
        while let Some(proto) = current {
            let found = proto.borrow().get_own_property(name);
            if let Some(d) = found {
                return (Some(d), chain_unknown);
            }
            chain_unknown |= proto.borrow().prototype_unknown;
            let next = proto.borrow().prototype.clone();
            // Prototype chains terminate on self-reference.
            if let Some(n) = &next {
                if Rc::ptr_eq(n, &proto) {
                    break;
                }
            }
            current = next;
        }
        (None, chain_unknown)
    }

    // §8.12.6 [[HasProperty]]; None when the prototype chain is Unknown.
    pub fn has_property(&self, name: &str) -> Option<bool> {
        match self.get_property_descriptor(name) {
            (Some(_), _) => Some(true),
            (None, true) => None,
            (None, false) => Some(false),
        }
    }

    // §8.12.4 [[CanPut]]
    pub fn can_put(&self, name: &str) -> CanPut {
        if let Some(desc) = self.get_own_property(name) {
            if desc.is_accessor_descriptor() {
                return if matches!(desc.set, Some(Value::Object(_))) {
                    CanPut::Yes
                } else {
                    CanPut::No
                };
            }
            return if desc.writable == Some(true) {
                CanPut::Yes
            } else {
                CanPut::No
            };
        }
        let (inherited, chain_unknown) = self.get_property_descriptor(name);
        match inherited {
            Some(desc) if desc.is_accessor_descriptor() => {
                if matches!(desc.set, Some(Value::Object(_))) {
                    CanPut::Yes
                } else {
                    CanPut::No
                }
            }
            Some(desc) => {
                if !self.extensible {
                    CanPut::No
                } else if desc.writable == Some(true) {
                    CanPut::Yes
                } else {
                    CanPut::No
                }
            }
            None => {
                if chain_unknown {
                    CanPut::Unknown
                } else if self.extensible {
                    CanPut::Yes
                } else {
                    CanPut::No
                }
            }
        }
    }

    pub fn array_length(&self) -> Option<u32> {
        match self.properties.get("length").and_then(|p| p.desc.value.clone()) {
            Some(Value::Number(n)) => Some(number_ops::to_uint32(n)),
            _ => None,
        }
    }

    /// §8.12.9 [[DefineOwnProperty]], with the §15.4.5.1 Array override.
    /// `Err` carries the rejection reason; the engine wrapper decides
    /// whether that becomes a TypeError or a silent false.
    pub fn define_own_property_raw(
        &mut self,
        name: &str,
        desc: &PropertyDescriptor,
    ) -> Result<bool, &'static str> {
        if self.is_array() {
            if name == "length" {
                if desc.value.is_some() {
                    return self.define_array_length(desc);
                }
            } else if let Some(index) = array_index_of(name) {
                let old_len = self.array_length();
                if let Some(old_len) = old_len {
                    let length_writable = self
                        .properties
                        .get("length")
                        .map(|p| p.desc.writable == Some(true))
                        .unwrap_or(true);
                    if index >= old_len && !length_writable {
                        return Err("cannot add property, length is not writable");
                    }
                    self.define_own_property_ordinary(name, desc)?;
                    if index >= old_len {
                        if let Some(p) = self.properties.get_mut("length") {
                            p.desc.value = Some(Value::Number(index as f64 + 1.0));
                        }
                    }
                    return Ok(true);
                }
            }
        }
        self.define_own_property_ordinary(name, desc)
    }

    /// The Array length write: truncates integer-indexed properties when
    /// the length decreases, stopping at the first undeletable index.
    fn define_array_length(&mut self, desc: &PropertyDescriptor) -> Result<bool, &'static str> {
        let length_writable = self
            .properties
            .get("length")
            .map(|p| p.desc.writable == Some(true))
            .unwrap_or(true);
        let new_value = desc.value.clone().unwrap();

        if new_value.is_unknown() {
            if !length_writable {
                return Err("length is not writable");
            }
            let mut new_desc = desc.clone();
            new_desc.value = Some(Value::Unknown);
            return self.define_own_property_ordinary("length", &new_desc);
        }

        let n = match &new_value {
            Value::Number(n) => *n,
            other => conversions::primitive_to_number(other).unwrap_or(f64::NAN),
        };
        let new_len = number_ops::to_uint32(n);
        if new_len as f64 != n {
            return Err("invalid array length");
        }
        let old_len = self.array_length().unwrap_or(0);
        if new_len >= old_len {
            let mut new_desc = desc.clone();
            new_desc.value = Some(Value::Number(new_len as f64));
            return self.define_own_property_ordinary("length", &new_desc);
        }
        if !length_writable {
            return Err("length is not writable");
        }
        let mut final_len = new_len;
        let mut indices: Vec<u32> = self
            .properties
            .keys()
            .filter_map(|k| array_index_of(k))
            .filter(|&i| i >= new_len)
            .collect();
        indices.sort_unstable_by(|a, b| b.cmp(a));
        let mut rejected = false;
        for index in indices {
            let key = index.to_string();
            let deletable = self
                .properties
                .get(&key)
                .map(|p| p.desc.configurable == Some(true))
                .unwrap_or(true);
            if deletable {
                self.properties.remove(&key);
            } else {
                final_len = index + 1;
                rejected = true;
                break;
            }
        }
        let mut new_desc = desc.clone();
        new_desc.value = Some(Value::Number(final_len as f64));
        self.define_own_property_ordinary("length", &new_desc)?;
        if rejected {
            return Err("cannot delete non-configurable array element");
        }
        Ok(true)
    }

    /// §8.12.9 proper, mirroring the spec's clause structure.
    fn define_own_property_ordinary(
        &mut self,
        name: &str,
        desc: &PropertyDescriptor,
    ) -> Result<bool, &'static str> {
        let current = match self.properties.get(name) {
            Some(p) => Some(p.desc.clone()),
            None => self.string_index_descriptor(name),
        };

        let current = match current {
            None => {
                // Steps 3-4: new property
                if !self.extensible {
                    return Err("object is not extensible");
                }
                self.properties
                    .entry(name.to_string())
                    .or_default()
                    .desc = desc.clone().complete();
                return Ok(true);
            }
            Some(cur) => cur,
        };

        // Step 5: no fields at all
        if desc.is_empty() {
            return Ok(true);
        }
        // Step 6: every present field already holds the same value
        if fields_present_and_same(desc, &current) {
            return Ok(true);
        }
        // Step 7: non-configurable constraints
        if current.configurable != Some(true) {
            if desc.configurable == Some(true) {
                return Err("cannot redefine non-configurable property");
            }
            if desc.enumerable.is_some() && desc.enumerable != current.enumerable {
                return Err("cannot change enumerability of non-configurable property");
            }
        }

        let mut new_desc = current.clone();
        if desc.is_generic_descriptor() {
            // Step 8: no further validation
        } else if current.is_data_descriptor() != desc.is_data_descriptor() {
            // Step 9: conversion between data and accessor
            if current.configurable != Some(true) {
                return Err("cannot convert non-configurable property");
            }
            new_desc = if current.is_data_descriptor() {
                PropertyDescriptor {
                    value: None,
                    writable: None,
                    get: Some(Value::Undefined),
                    set: Some(Value::Undefined),
                    enumerable: current.enumerable,
                    configurable: current.configurable,
                }
            } else {
                PropertyDescriptor {
                    value: Some(Value::Undefined),
                    writable: Some(false),
                    get: None,
                    set: None,
                    enumerable: current.enumerable,
                    configurable: current.configurable,
                }
            };
        } else if current.is_data_descriptor() && desc.is_data_descriptor() {
            // Step 10
            if current.configurable != Some(true) {
                if current.writable == Some(false) {
                    if desc.writable == Some(true) {
                        return Err("cannot make non-writable property writable");
                    }
                    if let (Some(v), Some(cur_v)) = (&desc.value, &current.value) {
                        if !same_value(v, cur_v) {
                            return Err("cannot change value of non-writable property");
                        }
                    }
                }
            }
        } else {
            // Step 11: both accessor descriptors
            if current.configurable != Some(true) {
                if let (Some(s), Some(cur_s)) = (&desc.set, &current.set) {
                    if !same_value(s, cur_s) {
                        return Err("cannot change setter of non-configurable property");
                    }
                }
                if let (Some(g), Some(cur_g)) = (&desc.get, &current.get) {
                    if !same_value(g, cur_g) {
                        return Err("cannot change getter of non-configurable property");
                    }
                }
            }
        }

        // Step 12: apply every present field
        if let Some(v) = &desc.value {
            new_desc.value = Some(v.clone());
            new_desc.writable.get_or_insert(false);
        }
        if let Some(w) = desc.writable {
            new_desc.writable = Some(w);
            if new_desc.value.is_none() && new_desc.get.is_none() {
                new_desc.value = Some(Value::Undefined);
            }
        }
        if let Some(g) = &desc.get {
            new_desc.get = Some(g.clone());
            new_desc.value = None;
            new_desc.writable = None;
            new_desc.set.get_or_insert(Value::Undefined);
        }
        if let Some(s) = &desc.set {
            new_desc.set = Some(s.clone());
            new_desc.value = None;
            new_desc.writable = None;
            new_desc.get.get_or_insert(Value::Undefined);
        }
        if let Some(e) = desc.enumerable {
            new_desc.enumerable = Some(e);
        }
        if let Some(c) = desc.configurable {
            new_desc.configurable = Some(c);
        }

        self.properties.entry(name.to_string()).or_default().desc = new_desc.complete();
        Ok(true)
    }

    // §8.12.7 [[Delete]]: true when the property is gone afterwards.
    pub fn delete_raw(&mut self, name: &str) -> bool {
        match self.properties.get(name) {
            None => true,
            Some(p) => {
                if p.desc.configurable == Some(true) {
                    self.properties.remove(name);
                    if let Some(map) = &mut self.parameter_map {
                        map.remove(name);
                    }
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn write_alternate(&mut self, name: &str, section: u64, value: Value) {
        if let Some(p) = self.properties.get_mut(name) {
            p.alternates.insert(section, value);
        } else {
            self.alternate_only
                .entry(name.to_string())
                .or_default()
                .insert(section, value);
        }
    }

    /// The most recent skipped-mode write for a name, across both live
    /// properties and names that never existed before the skip.
    pub fn latest_alternate(&self, name: &str) -> Option<Value> {
        let from_prop = self
            .properties
            .get(name)
            .and_then(|p| p.alternates.iter().max_by_key(|(id, _)| **id));
        let from_only = self
            .alternate_only
            .get(name)
            .and_then(|m| m.iter().max_by_key(|(id, _)| **id));
        match (from_prop, from_only) {
            (Some((a, va)), Some((b, vb))) => Some(if a >= b { va.clone() } else { vb.clone() }),
            (Some((_, v)), None) | (None, Some((_, v))) => Some(v.clone()),
            (None, None) => None,
        }
    }

    /// A skipped-section's view of a property, for callers that query
    /// alternate state explicitly.
    pub fn alternate_value(&self, name: &str, section: u64) -> Option<Value> {
        self.properties
            .get(name)
            .and_then(|p| p.alternates.get(&section))
            .or_else(|| {
                self.alternate_only
                    .get(name)
                    .and_then(|m| m.get(&section))
            })
            .cloned()
    }
}

/// §8.12.9 step 6: every field of `desc` is present in `current` with the
/// same value.
fn fields_present_and_same(desc: &PropertyDescriptor, current: &PropertyDescriptor) -> bool {
    fn same_opt(a: &Option<Value>, b: &Option<Value>) -> bool {
        match (a, b) {
            (None, _) => true,
            (Some(x), Some(y)) => same_value(x, y),
            (Some(_), None) => false,
        }
    }
    fn same_flag(a: Option<bool>, b: Option<bool>) -> bool {
        a.is_none() || a == b
    }
    same_opt(&desc.value, &current.value)
        && same_flag(desc.writable, current.writable)
        && same_opt(&desc.get, &current.get)
        && same_opt(&desc.set, &current.set)
        && same_flag(desc.enumerable, current.enumerable)
        && same_flag(desc.configurable, current.configurable)
}

fn read_declarative_binding(env: &EnvRef, name: &str) -> Option<Value> {
    let env = env.borrow();
    if let EnvRecord::Declarative(rec) = &env.record {
        rec.bindings.get(name).map(|b| b.value.clone())
    } else {
        None
    }
}

fn write_declarative_binding(env: &EnvRef, name: &str, value: Value) {
    let mut env = env.borrow_mut();
    if let EnvRecord::Declarative(rec) = &mut env.record {
        if let Some(b) = rec.bindings.get_mut(name) {
            b.value = value;
        }
    }
}

impl Engine {
    // §8.12.3 [[Get]]
    pub fn object_get(&mut self, id: u64, name: &str) -> Completion {
        self.object_get_impl(id, name, false)
    }

    /// [[Get]] that prefers the most recent skipped-mode alternate value,
    /// for analyzers inspecting speculative state.
    pub fn object_get_alternate(&mut self, id: u64, name: &str) -> Completion {
        self.object_get_impl(id, name, true)
    }

    fn object_get_impl(&mut self, id: u64, name: &str, alternate: bool) -> Completion {
        let Some(obj) = self.get_object(id) else {
            return Completion::Normal(Value::Undefined);
        };
        if alternate {
            let alt = obj.borrow().latest_alternate(name);
            if let Some(v) = alt {
                return Completion::Normal(v);
            }
        }
        let (desc, chain_unknown) = obj.borrow().get_property_descriptor(name);
        self.emit(AnalysisEvent::PropertyReferenced {
            object: id,
            name: name.to_string(),
            descriptor: desc.clone(),
        });
        match desc {
            None => {
                if chain_unknown {
                    self.unknown_value()
                } else {
                    Completion::Normal(Value::Undefined)
                }
            }
            Some(d) if d.is_accessor_descriptor() => {
                let getter = d.get.unwrap_or(Value::Undefined);
                if getter.is_undefined() {
                    Completion::Normal(Value::Undefined)
                } else if getter.is_unknown() {
                    self.unknown_value()
                } else {
                    let this = Value::Object(crate::types::ObjectHandle { id });
                    self.call_function(&getter, &this, &[], true)
                }
            }
            Some(d) => Completion::Normal(d.value.unwrap_or(Value::Undefined)),
        }
    }

    /// [[Get]] on a value of any type: primitives are boxed through
    /// ToObject first, Unknown stays Unknown.
    pub fn get_value_property(&mut self, base: &Value, name: &str) -> Completion {
        match base {
            Value::Object(o) => self.object_get(o.id, name),
            Value::Unknown => self.unknown_value(),
            Value::Undefined | Value::Null => self.handle_recoverable_native_exception(
                ErrorKind::TypeError,
                &format!("Cannot read property '{name}' of {base}"),
            ),
            primitive => {
                let boxed = match self.to_object(primitive) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                match boxed {
                    Value::Object(o) => self.object_get(o.id, name),
                    _ => self.unknown_value(),
                }
            }
        }
    }

    // §8.12.5 [[Put]]
    pub fn object_put(&mut self, id: u64, name: &str, value: Value, throw: bool) -> Completion {
        let Some(obj) = self.get_object(id) else {
            return Completion::Normal(Value::Undefined);
        };

        // Skipped mode diverts the write to the alternate slot for the
        // active section, leaving primary state untouched.
        if let Some(section) = self.skipped_section() {
            obj.borrow_mut().write_alternate(name, section, value.clone());
            self.emit(AnalysisEvent::PropertySet {
                object: id,
                name: name.to_string(),
                value,
            });
            return Completion::Normal(Value::Undefined);
        }

        let can_put = obj.borrow().can_put(name);
        let mut value = value;
        match can_put {
            CanPut::No => {
                if throw {
                    return self.handle_recoverable_native_exception(
                        ErrorKind::TypeError,
                        &format!("Cannot assign to read only property '{name}'"),
                    );
                }
                return Completion::Normal(Value::Undefined);
            }
            CanPut::Unknown => {
                value = match self.unknown_value() {
                    Completion::Normal(v) => v,
                    other => return other,
                };
            }
            CanPut::Yes => {}
        }

        let own_is_data = obj
            .borrow()
            .get_own_property(name)
            .map(|d| d.is_data_descriptor())
            .unwrap_or(false);
        if own_is_data {
            let desc = PropertyDescriptor {
                value: Some(value.clone()),
                ..Default::default()
            };
            let result = self.object_define_own_property(id, name, desc, throw);
            if result.is_abrupt() {
                return result;
            }
            // Arguments override: a mapped index writes through to the
            // named parameter binding.
            let mapping = obj
                .borrow()
                .parameter_map
                .as_ref()
                .and_then(|m| m.get(name).cloned());
            if let Some((env, param)) = mapping {
                write_declarative_binding(&env, &param, value.clone());
            }
            self.emit(AnalysisEvent::PropertySet {
                object: id,
                name: name.to_string(),
                value,
            });
            return Completion::Normal(Value::Undefined);
        }

        let (inherited, _) = obj.borrow().get_property_descriptor(name);
        if let Some(d) = &inherited {
            if d.is_accessor_descriptor() {
                let setter = d.set.clone().unwrap_or(Value::Undefined);
                if setter.is_undefined() {
                    if throw {
                        return self.handle_recoverable_native_exception(
                            ErrorKind::TypeError,
                            &format!("Cannot set property '{name}' which has only a getter"),
                        );
                    }
                    return Completion::Normal(Value::Undefined);
                }
                let this = Value::Object(crate::types::ObjectHandle { id });
                let result = self.call_function(&setter, &this, &[value.clone()], true);
                if result.is_abrupt() {
                    return result;
                }
                self.emit(AnalysisEvent::PropertySet {
                    object: id,
                    name: name.to_string(),
                    value,
                });
                return Completion::Normal(Value::Undefined);
            }
        }

        let desc = PropertyDescriptor::data(value.clone(), true, true, true);
        let result = self.object_define_own_property(id, name, desc, throw);
        if result.is_abrupt() {
            return result;
        }
        self.emit(AnalysisEvent::PropertySet {
            object: id,
            name: name.to_string(),
            value,
        });
        Completion::Normal(Value::Undefined)
    }

    /// [[DefineOwnProperty]] with event and mode handling. The normal
    /// result is Boolean(success).
    pub fn object_define_own_property(
        &mut self,
        id: u64,
        name: &str,
        mut desc: PropertyDescriptor,
        throw: bool,
    ) -> Completion {
        let Some(obj) = self.get_object(id) else {
            return Completion::Normal(Value::Boolean(false));
        };

        if let Some(section) = self.skipped_section() {
            let value = desc.value.clone().unwrap_or(Value::Undefined);
            obj.borrow_mut().write_alternate(name, section, value);
            self.emit(AnalysisEvent::PropertyDefined {
                object: id,
                name: name.to_string(),
            });
            return Completion::Normal(Value::Boolean(true));
        }

        // An assignment escaping its birth scope inside an ambiguous
        // block surfaces as Unknown unless it would be a no-op.
        if let Some(new_value) = &desc.value {
            let ambient = obj.borrow().ambient_at_creation;
            if self.is_escaping_write(ambient) {
                let existing = obj
                    .borrow()
                    .get_own_property(name)
                    .and_then(|d| d.value);
                let unchanged = existing
                    .map(|old| same_value(&old, new_value))
                    .unwrap_or(false);
                if !unchanged {
                    desc.value = Some(match self.unknown_value() {
                        Completion::Normal(v) => v,
                        other => return other,
                    });
                }
            }
        }

        let result = obj.borrow_mut().define_own_property_raw(name, &desc);
        match result {
            Ok(_) => {
                // Arguments override, §10.6: defining over a mapped index
                // feeds the binding or breaks the alias.
                let mapping = obj
                    .borrow()
                    .parameter_map
                    .as_ref()
                    .and_then(|m| m.get(name).cloned());
                if let Some((env, param)) = mapping {
                    if desc.is_accessor_descriptor() {
                        if let Some(map) = &mut obj.borrow_mut().parameter_map {
                            map.remove(name);
                        }
                    } else {
                        if let Some(v) = &desc.value {
                            write_declarative_binding(&env, &param, v.clone());
                        }
                        if desc.writable == Some(false) {
                            if let Some(map) = &mut obj.borrow_mut().parameter_map {
                                map.remove(name);
                            }
                        }
                    }
                }
                self.emit(AnalysisEvent::PropertyDefined {
                    object: id,
                    name: name.to_string(),
                });
                Completion::Normal(Value::Boolean(true))
            }
            Err(reason) => {
                if throw {
                    self.handle_recoverable_native_exception(ErrorKind::TypeError, reason)
                } else {
                    Completion::Normal(Value::Boolean(false))
                }
            }
        }
    }

    // §8.12.7 [[Delete]] with events.
    pub fn object_delete(&mut self, id: u64, name: &str, throw: bool) -> Completion {
        let Some(obj) = self.get_object(id) else {
            return Completion::Normal(Value::Boolean(true));
        };
        let deleted = obj.borrow_mut().delete_raw(name);
        if deleted {
            self.emit(AnalysisEvent::PropertyDeleted {
                object: id,
                name: name.to_string(),
            });
            Completion::Normal(Value::Boolean(true))
        } else if throw {
            self.handle_recoverable_native_exception(
                ErrorKind::TypeError,
                &format!("Cannot delete property '{name}'"),
            )
        } else {
            Completion::Normal(Value::Boolean(false))
        }
    }

    // §8.12.8 [[DefaultValue]]
    pub fn default_value(&mut self, id: u64, hint: PrimitiveHint) -> Completion {
        let Some(obj) = self.get_object(id) else {
            return Completion::Normal(Value::Undefined);
        };
        let hint = if hint == PrimitiveHint::Default {
            // Date objects treat the default hint as String, §8.12.8.
            if obj.borrow().class_name == "Date" {
                PrimitiveHint::String
            } else {
                PrimitiveHint::Number
            }
        } else {
            hint
        };
        let order: [&str; 2] = if hint == PrimitiveHint::String {
            ["toString", "valueOf"]
        } else {
            ["valueOf", "toString"]
        };
        let this = Value::Object(crate::types::ObjectHandle { id });
        for method_name in order {
            let method = match self.object_get(id, method_name) {
                Completion::Normal(v) => v,
                other => return other,
            };
            let callable = self
                .resolve_object(&method)
                .map(|o| o.borrow().is_callable())
                .unwrap_or(false);
            if callable {
                let result = match self.call_function(&method, &this, &[], true) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                if !result.is_object() {
                    return Completion::Normal(result);
                }
            } else if method.is_unknown() {
                return self.unknown_value();
            }
        }
        self.handle_recoverable_native_exception(
            ErrorKind::TypeError,
            "Cannot convert object to primitive value",
        )
    }

    pub fn is_callable_value(&self, val: &Value) -> bool {
        self.resolve_object(val)
            .map(|o| o.borrow().is_callable())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::types::JsString;

    fn engine() -> Engine {
        Engine::new()
    }

    #[test]
    fn define_then_get_round_trips() {
        let mut engine = engine();
        let obj = engine.create_object();
        let id = obj.borrow().id.unwrap();
        let desc = PropertyDescriptor::data(Value::Number(7.0), true, true, true);
        let result = engine.object_define_own_property(id, "p", desc, true);
        assert!(matches!(result, Completion::Normal(Value::Boolean(true))));
        match engine.object_get(id, "p") {
            Completion::Normal(Value::Number(n)) => assert_eq!(n, 7.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_extensible_rejects_new_properties() {
        let mut engine = engine();
        let obj = engine.create_object();
        let id = obj.borrow().id.unwrap();
        obj.borrow_mut().extensible = false;
        let desc = PropertyDescriptor::data(Value::Number(1.0), true, true, true);
        let result = engine.object_define_own_property(id, "p", desc, false);
        assert!(matches!(result, Completion::Normal(Value::Boolean(false))));
    }

    #[test]
    fn non_configurable_rejects_reconfigure() {
        let mut engine = engine();
        let obj = engine.create_object();
        let id = obj.borrow().id.unwrap();
        let desc = PropertyDescriptor::data(Value::Number(1.0), false, false, false);
        engine.object_define_own_property(id, "p", desc, true);
        let change = PropertyDescriptor {
            configurable: Some(true),
            ..Default::default()
        };
        let result = engine.object_define_own_property(id, "p", change, false);
        assert!(matches!(result, Completion::Normal(Value::Boolean(false))));
        // Same-value redefinition is allowed
        let same = PropertyDescriptor::data(Value::Number(1.0), false, false, false);
        let result = engine.object_define_own_property(id, "p", same, false);
        assert!(matches!(result, Completion::Normal(Value::Boolean(true))));
    }

    #[test]
    fn put_respects_non_writable() {
        let mut engine = engine();
        let obj = engine.create_object();
        let id = obj.borrow().id.unwrap();
        let desc = PropertyDescriptor::data(Value::Number(7.0), false, true, true);
        engine.object_define_own_property(id, "p", desc, true);
        engine.object_put(id, "p", Value::Number(8.0), false);
        match engine.object_get(id, "p") {
            Completion::Normal(Value::Number(n)) => assert_eq!(n, 7.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn array_index_define_updates_length() {
        let mut engine = engine();
        let arr = engine.create_array(vec![]);
        let Value::Object(h) = arr else { unreachable!() };
        let desc = PropertyDescriptor::data(Value::Number(9.0), true, true, true);
        engine.object_define_own_property(h.id, "4", desc, true);
        let obj = engine.get_object(h.id).unwrap();
        assert_eq!(obj.borrow().array_length(), Some(5));
    }

    #[test]
    fn array_length_truncates() {
        let mut engine = engine();
        let arr = engine.create_array(vec![
            Value::Number(1.0),
            Value::Number(2.0),
            Value::Number(3.0),
        ]);
        let Value::Object(h) = arr else { unreachable!() };
        let desc = PropertyDescriptor {
            value: Some(Value::Number(1.0)),
            ..Default::default()
        };
        engine.object_define_own_property(h.id, "length", desc, true);
        let obj = engine.get_object(h.id).unwrap();
        assert_eq!(obj.borrow().array_length(), Some(1));
        assert!(obj.borrow().properties.contains_key("0"));
        assert!(!obj.borrow().properties.contains_key("2"));
    }

    #[test]
    fn string_wrapper_synthesises_characters() {
        let mut engine = engine();
        let s = engine.create_wrapper_object("String", Value::String(JsString::from_str("abc")));
        let Value::Object(h) = s else { unreachable!() };
        match engine.object_get(h.id, "1") {
            Completion::Normal(Value::String(c)) => assert_eq!(c.to_rust_string(), "b"),
            other => panic!("unexpected {other:?}"),
        }
        match engine.object_get(h.id, "length") {
            Completion::Normal(Value::Number(n)) => assert_eq!(n, 3.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn skipped_mode_writes_to_alternates() {
        let mut engine = engine();
        let obj = engine.create_object();
        let id = obj.borrow().id.unwrap();
        engine.object_put(id, "p", Value::Number(1.0), false);
        engine.process_in_skipped_mode(|engine| {
            engine.object_put(id, "p", Value::Number(2.0), false)
        });
        match engine.object_get(id, "p") {
            Completion::Normal(Value::Number(n)) => assert_eq!(n, 1.0),
            other => panic!("unexpected {other:?}"),
        }
        match engine.object_get_alternate(id, "p") {
            Completion::Normal(Value::Number(n)) => assert_eq!(n, 2.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ambiguous_escaping_write_degrades_to_unknown() {
        let mut engine = engine();
        let obj = engine.create_object();
        let id = obj.borrow().id.unwrap();
        engine.object_put(id, "p", Value::Number(1.0), false);
        engine.enter_ambiguous_block();
        engine.object_put(id, "p", Value::Number(2.0), false);
        engine.exit_ambiguous_block();
        match engine.object_get(id, "p") {
            Completion::Normal(Value::Unknown) => {}
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn ambiguous_local_write_stays_precise() {
        let mut engine = engine();
        engine.enter_ambiguous_block();
        let obj = engine.create_object();
        let id = obj.borrow().id.unwrap();
        engine.object_put(id, "p", Value::Number(2.0), false);
        engine.exit_ambiguous_block();
        match engine.object_get(id, "p") {
            Completion::Normal(Value::Number(n)) => assert_eq!(n, 2.0),
            other => panic!("unexpected {other:?}"),
        }
    }
}
