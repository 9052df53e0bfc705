//! The Array constructor and prototype, §15.4.

use super::{arg, has_unknown};
use crate::engine::conversions::{self, to_boolean};
use crate::engine::types::*;
use crate::engine::{Engine, ErrorKind};
use crate::tryc;
use crate::types::{JsString, Value, number_ops};

/// The receiver's length as a concrete index count; None when the length
/// itself is statically indeterminate.
fn length_of(engine: &mut Engine, id: u64) -> Result<Option<u32>, Completion> {
    let length = match engine.object_get(id, "length") {
        Completion::Normal(v) => v,
        other => return Err(other),
    };
    match engine.number_arg(&length) {
        Ok(Some(n)) => Ok(Some(number_ops::to_uint32(n))),
        Ok(None) => Ok(None),
        Err(comp) => Err(comp),
    }
}

fn element(engine: &mut Engine, id: u64, index: u32) -> Result<Value, Completion> {
    match engine.object_get(id, &index.to_string()) {
        Completion::Normal(v) => Ok(v),
        other => Err(other),
    }
}

fn set_element(engine: &mut Engine, id: u64, index: u32, value: Value) -> Result<(), Completion> {
    match engine.object_put(id, &index.to_string(), value, false) {
        Completion::Normal(_) => Ok(()),
        other => Err(other),
    }
}

fn set_length(engine: &mut Engine, id: u64, length: u32) -> Result<(), Completion> {
    match engine.object_put(id, "length", Value::Number(length as f64), false) {
        Completion::Normal(_) => Ok(()),
        other => Err(other),
    }
}

/// A mutator invoked on a receiver whose shape is indeterminate: run the
/// mutation speculatively so the writes land in alternate slots, then
/// answer Unknown.
fn mutate_in_skipped_mode(
    engine: &mut Engine,
    f: impl FnOnce(&mut Engine) -> Completion + 'static,
) -> Completion {
    engine.process_in_skipped_mode(f);
    engine.unknown_value()
}

// §9.6-adjacent: relative index clamping used by slice/splice/indexOf
fn clamp_index(n: f64, length: u32) -> u32 {
    if n < 0.0 {
        let from_end = length as f64 + n;
        if from_end < 0.0 { 0 } else { from_end as u32 }
    } else if n > length as f64 {
        length
    } else {
        n as u32
    }
}

impl Engine {
    pub(crate) fn setup_array_builtin(&mut self) {
        let proto = self.array_prototype.clone().unwrap();

        // §15.4.1 / §15.4.2 — Array(len) and Array(...items)
        let ctor = self.define_constructor("Array", 1, &proto, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            if args.len() == 1 {
                if let Value::Number(n) = &args[0] {
                    let len = number_ops::to_uint32(*n);
                    if len as f64 != *n {
                        return engine.handle_recoverable_native_exception(
                            ErrorKind::RangeError,
                            "Invalid array length",
                        );
                    }
                    let array = engine.create_array(Vec::new());
                    if let Value::Object(h) = &array {
                        let obj = engine.get_object(h.id).unwrap();
                        if let Some(p) = obj.borrow_mut().properties.get_mut("length") {
                            p.desc.value = Some(Value::Number(len as f64));
                        }
                    }
                    return Completion::Normal(array);
                }
            }
            Completion::Normal(engine.create_array(args.to_vec()))
        });
        let ctor_obj = self.resolve_object(&ctor).unwrap();

        // §15.4.3.2
        self.add_native(&ctor_obj, "isArray", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let is_array = engine
                .resolve_object(&arg(args, 0))
                .map(|o| o.borrow().is_array())
                .unwrap_or(false);
            Completion::Normal(Value::Boolean(is_array))
        });

        // §15.4.4.2
        self.add_native(&proto, "toString", 0, |engine, this, _args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            let id = tryc!(engine.this_object_id(this));
            let join = match engine.object_get(id, "join") {
                Completion::Normal(v) => v,
                other => return other,
            };
            if engine.is_callable_value(&join) {
                engine.call_function(&join, this, &[], true)
            } else {
                // Fall back to Object.prototype.toString semantics.
                Completion::Normal(Value::String(JsString::from_str("[object Array]")))
            }
        });

        // §15.4.4.5
        self.add_native(&proto, "join", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let id = tryc!(engine.this_object_id(this));
            let Some(length) = tryc!(length_of(engine, id)) else {
                return engine.unknown_value();
            };
            let separator = match &arg(args, 0) {
                Value::Undefined => ",".to_string(),
                sep => {
                    let Some(s) = tryc!(engine.string_arg(sep)) else {
                        return engine.unknown_value();
                    };
                    s
                }
            };
            let mut parts = Vec::with_capacity(length as usize);
            for i in 0..length {
                let v = tryc!(element(engine, id, i));
                if v.is_unknown() {
                    return engine.unknown_value();
                }
                if v.is_nullish() {
                    parts.push(String::new());
                } else {
                    let Some(s) = tryc!(engine.string_arg(&v)) else {
                        return engine.unknown_value();
                    };
                    parts.push(s);
                }
            }
            Completion::Normal(Value::String(JsString::from_str(&parts.join(&separator))))
        });

        // §15.4.4.6
        self.add_native(&proto, "pop", 0, |engine, this, _args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            let id = tryc!(engine.this_object_id(this));
            let Some(length) = tryc!(length_of(engine, id)) else {
                return mutate_in_skipped_mode(engine, move |engine| {
                    engine.object_put(id, "length", Value::Unknown, false)
                });
            };
            if length == 0 {
                if let Err(c) = set_length(engine, id, 0) {
                    return c;
                }
                return Completion::Normal(Value::Undefined);
            }
            let last = length - 1;
            let value = tryc!(element(engine, id, last));
            let comp = engine.object_delete(id, &last.to_string(), false);
            if comp.is_abrupt() {
                return comp;
            }
            if let Err(comp) = set_length(engine, id, last) {
                return comp;
            }
            Completion::Normal(value)
        });

        // §15.4.4.7
        self.add_native(&proto, "push", 1, |engine, this, args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            let id = tryc!(engine.this_object_id(this));
            let Some(length) = tryc!(length_of(engine, id)) else {
                let args = args.to_vec();
                return mutate_in_skipped_mode(engine, move |engine| {
                    for v in args {
                        engine.object_put(id, "length", v, false);
                    }
                    Completion::Normal(Value::Undefined)
                });
            };
            let mut index = length;
            for v in args {
                if let Err(comp) = set_element(engine, id, index, v.clone()) {
                    return comp;
                }
                index += 1;
            }
            if let Err(comp) = set_length(engine, id, index) {
                return comp;
            }
            Completion::Normal(Value::Number(index as f64))
        });

        // §15.4.4.8 — swap from both ends; holes transfer via delete.
        self.add_native(&proto, "reverse", 0, |engine, this, _args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            let id = tryc!(engine.this_object_id(this));
            let Some(length) = tryc!(length_of(engine, id)) else {
                return mutate_in_skipped_mode(engine, move |engine| {
                    engine.object_put(id, "0", Value::Unknown, false)
                });
            };
            let middle = length / 2;
            for lower in 0..middle {
                let upper = length - lower - 1;
                let lower_key = lower.to_string();
                let upper_key = upper.to_string();
                let lower_exists = engine
                    .get_object(id)
                    .map(|o| o.borrow().get_own_property(&lower_key).is_some())
                    .unwrap_or(false);
                let upper_exists = engine
                    .get_object(id)
                    .map(|o| o.borrow().get_own_property(&upper_key).is_some())
                    .unwrap_or(false);
                let lower_value = tryc!(element(engine, id, lower));
                let upper_value = tryc!(element(engine, id, upper));
                match (lower_exists, upper_exists) {
                    (true, true) => {
                        if let Err(c) = set_element(engine, id, lower, upper_value) {
                            return c;
                        }
                        if let Err(c) = set_element(engine, id, upper, lower_value) {
                            return c;
                        }
                    }
                    (false, true) => {
                        if let Err(c) = set_element(engine, id, lower, upper_value) {
                            return c;
                        }
                        let comp = engine.object_delete(id, &upper_key, true);
                        if comp.is_abrupt() {
                            return comp;
                        }
                    }
                    (true, false) => {
                        if let Err(c) = set_element(engine, id, upper, lower_value) {
                            return c;
                        }
                        let comp = engine.object_delete(id, &lower_key, true);
                        if comp.is_abrupt() {
                            return comp;
                        }
                    }
                    (false, false) => {}
                }
            }
            Completion::Normal(this.clone())
        });

        // §15.4.4.9
        self.add_native(&proto, "shift", 0, |engine, this, _args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            let id = tryc!(engine.this_object_id(this));
            let Some(length) = tryc!(length_of(engine, id)) else {
                return mutate_in_skipped_mode(engine, move |engine| {
                    engine.object_put(id, "length", Value::Unknown, false)
                });
            };
            if length == 0 {
                if let Err(c) = set_length(engine, id, 0) {
                    return c;
                }
                return Completion::Normal(Value::Undefined);
            }
            let first = tryc!(element(engine, id, 0));
            for i in 1..length {
                let v = tryc!(element(engine, id, i));
                if let Err(c) = set_element(engine, id, i - 1, v) {
                    return c;
                }
            }
            let comp = engine.object_delete(id, &(length - 1).to_string(), false);
            if comp.is_abrupt() {
                return comp;
            }
            if let Err(c) = set_length(engine, id, length - 1) {
                return c;
            }
            Completion::Normal(first)
        });

        // §15.4.4.13
        self.add_native(&proto, "unshift", 1, |engine, this, args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            let id = tryc!(engine.this_object_id(this));
            let Some(length) = tryc!(length_of(engine, id)) else {
                let args = args.to_vec();
                return mutate_in_skipped_mode(engine, move |engine| {
                    for v in args {
                        engine.object_put(id, "0", v, false);
                    }
                    Completion::Normal(Value::Undefined)
                });
            };
            let shift_by = args.len() as u32;
            for i in (0..length).rev() {
                let v = tryc!(element(engine, id, i));
                if let Err(c) = set_element(engine, id, i + shift_by, v) {
                    return c;
                }
            }
            for (i, v) in args.iter().enumerate() {
                if let Err(c) = set_element(engine, id, i as u32, v.clone()) {
                    return c;
                }
            }
            if let Err(c) = set_length(engine, id, length + shift_by) {
                return c;
            }
            Completion::Normal(Value::Number((length + shift_by) as f64))
        });

        // §15.4.4.10
        self.add_native(&proto, "slice", 2, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let id = tryc!(engine.this_object_id(this));
            let Some(length) = tryc!(length_of(engine, id)) else {
                return engine.unknown_value();
            };
            let Some(start_num) = tryc!(engine.number_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let start = clamp_index(conversions::to_integer(start_num), length);
            let end = match &arg(args, 1) {
                Value::Undefined => length,
                v => {
                    let Some(n) = tryc!(engine.number_arg(v)) else {
                        return engine.unknown_value();
                    };
                    clamp_index(conversions::to_integer(n), length)
                }
            };
            let mut elements = Vec::new();
            for i in start..end {
                elements.push(tryc!(element(engine, id, i)));
            }
            Completion::Normal(engine.create_array(elements))
        });

        // §15.4.4.12
        self.add_native(&proto, "splice", 2, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let id = tryc!(engine.this_object_id(this));
            let Some(length) = tryc!(length_of(engine, id)) else {
                let args = args.to_vec();
                return mutate_in_skipped_mode(engine, move |engine| {
                    for v in args {
                        engine.object_put(id, "length", v, false);
                    }
                    Completion::Normal(Value::Undefined)
                });
            };
            let Some(start_num) = tryc!(engine.number_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let start = clamp_index(conversions::to_integer(start_num), length);
            let delete_count = if args.len() < 2 {
                length - start
            } else {
                let Some(n) = tryc!(engine.number_arg(&arg(args, 1))) else {
                    return engine.unknown_value();
                };
                (conversions::to_integer(n).max(0.0) as u32).min(length - start)
            };
            let inserted: Vec<Value> = if args.len() > 2 {
                args[2..].to_vec()
            } else {
                Vec::new()
            };

            let mut removed = Vec::with_capacity(delete_count as usize);
            for i in start..start + delete_count {
                removed.push(tryc!(element(engine, id, i)));
            }
            let mut tail = Vec::new();
            for i in start + delete_count..length {
                tail.push(tryc!(element(engine, id, i)));
            }
            let mut index = start;
            for v in inserted {
                if let Err(c) = set_element(engine, id, index, v) {
                    return c;
                }
                index += 1;
            }
            for v in tail {
                if let Err(c) = set_element(engine, id, index, v) {
                    return c;
                }
                index += 1;
            }
            for i in index..length {
                let comp = engine.object_delete(id, &i.to_string(), false);
                if comp.is_abrupt() {
                    return comp;
                }
            }
            if let Err(c) = set_length(engine, id, index) {
                return c;
            }
            Completion::Normal(engine.create_array(removed))
        });

        // §15.4.4.11 — in-place sort. An Unknown element poisons every
        // index, since its ordering cannot be decided.
        self.add_native(&proto, "sort", 1, |engine, this, args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            let id = tryc!(engine.this_object_id(this));
            let Some(length) = tryc!(length_of(engine, id)) else {
                return mutate_in_skipped_mode(engine, move |engine| {
                    engine.object_put(id, "0", Value::Unknown, false)
                });
            };
            let compare_fn = arg(args, 0);
            let mut elements = Vec::with_capacity(length as usize);
            for i in 0..length {
                elements.push(tryc!(element(engine, id, i)));
            }
            if elements.iter().any(|v| v.is_unknown()) || compare_fn.is_unknown() {
                for i in 0..length {
                    if let Err(c) = set_element(engine, id, i, Value::Unknown) {
                        return c;
                    }
                }
                return Completion::Normal(this.clone());
            }

            // Undefined sorts last; otherwise comparator, else ToString
            // order. Comparator failures abort the sort.
            let mut failure: Option<Completion> = None;
            let use_comparator = engine.is_callable_value(&compare_fn);
            elements.sort_by(|a, b| {
                if failure.is_some() {
                    return std::cmp::Ordering::Equal;
                }
                if a.is_undefined() && b.is_undefined() {
                    return std::cmp::Ordering::Equal;
                }
                if a.is_undefined() {
                    return std::cmp::Ordering::Greater;
                }
                if b.is_undefined() {
                    return std::cmp::Ordering::Less;
                }
                if use_comparator {
                    match engine.call_function(
                        &compare_fn,
                        &Value::Undefined,
                        &[a.clone(), b.clone()],
                        false,
                    ) {
                        Completion::Normal(v) => match conversions::primitive_to_number(&v) {
                            Some(n) if n < 0.0 => std::cmp::Ordering::Less,
                            Some(n) if n > 0.0 => std::cmp::Ordering::Greater,
                            _ => std::cmp::Ordering::Equal,
                        },
                        other => {
                            failure = Some(other);
                            std::cmp::Ordering::Equal
                        }
                    }
                } else {
                    let sa = engine.string_arg(a).ok().flatten().unwrap_or_default();
                    let sb = engine.string_arg(b).ok().flatten().unwrap_or_default();
                    sa.cmp(&sb)
                }
            });
            if let Some(comp) = failure {
                return comp;
            }
            for (i, v) in elements.into_iter().enumerate() {
                if let Err(c) = set_element(engine, id, i as u32, v) {
                    return c;
                }
            }
            Completion::Normal(this.clone())
        });

        // §15.4.4.4
        self.add_native(&proto, "concat", 1, |engine, this, args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            let mut elements = Vec::new();
            let mut push_value = |engine: &mut Engine, v: &Value| -> Result<(), Completion> {
                let spreadable = engine
                    .resolve_object(v)
                    .map(|o| o.borrow().is_array())
                    .unwrap_or(false);
                if spreadable {
                    let Value::Object(h) = v else { unreachable!() };
                    let Some(len) = length_of(engine, h.id)? else {
                        elements.push(Value::Unknown);
                        return Ok(());
                    };
                    for i in 0..len {
                        elements.push(element(engine, h.id, i)?);
                    }
                } else {
                    elements.push(v.clone());
                }
                Ok(())
            };
            if let Err(c) = push_value(engine, this) {
                return c;
            }
            for v in args {
                if let Err(c) = push_value(engine, v) {
                    return c;
                }
            }
            Completion::Normal(engine.create_array(elements))
        });

        // §15.4.4.14 / §15.4.4.15
        self.add_native(&proto, "indexOf", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let id = tryc!(engine.this_object_id(this));
            let Some(length) = tryc!(length_of(engine, id)) else {
                return engine.unknown_value();
            };
            let search = arg(args, 0);
            let from = match args.get(1) {
                Some(v) => {
                    let Some(n) = tryc!(engine.number_arg(v)) else {
                        return engine.unknown_value();
                    };
                    clamp_index(conversions::to_integer(n), length)
                }
                None => 0,
            };
            for i in from..length {
                let v = tryc!(element(engine, id, i));
                if v.is_unknown() {
                    return engine.unknown_value();
                }
                if conversions::strict_equals(&v, &search) == Some(true) {
                    return Completion::Normal(Value::Number(i as f64));
                }
            }
            Completion::Normal(Value::Number(-1.0))
        });

        self.add_native(&proto, "lastIndexOf", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let id = tryc!(engine.this_object_id(this));
            let Some(length) = tryc!(length_of(engine, id)) else {
                return engine.unknown_value();
            };
            let search = arg(args, 0);
            for i in (0..length).rev() {
                let v = tryc!(element(engine, id, i));
                if v.is_unknown() {
                    return engine.unknown_value();
                }
                if conversions::strict_equals(&v, &search) == Some(true) {
                    return Completion::Normal(Value::Number(i as f64));
                }
            }
            Completion::Normal(Value::Number(-1.0))
        });

        // §15.4.4.16-20: the callback-iteration family
        self.add_iteration_method(&proto, "every", IterationKind::Every);
        self.add_iteration_method(&proto, "some", IterationKind::Some);
        self.add_iteration_method(&proto, "forEach", IterationKind::ForEach);
        self.add_iteration_method(&proto, "map", IterationKind::Map);
        self.add_iteration_method(&proto, "filter", IterationKind::Filter);

        // §15.4.4.21 / §15.4.4.22
        self.add_native(&proto, "reduce", 1, |engine, this, args| {
            reduce_impl(engine, this, args, false)
        });
        self.add_native(&proto, "reduceRight", 1, |engine, this, args| {
            reduce_impl(engine, this, args, true)
        });
    }

    fn add_iteration_method(&mut self, proto: &ObjRef, name: &str, kind: IterationKind) {
        self.add_native(proto, name, 1, move |engine, this, args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            let id = tryc!(engine.this_object_id(this));
            let Some(length) = tryc!(length_of(engine, id)) else {
                // An indeterminate receiver still gets its callback
                // scanned so API references inside it surface.
                let callback = arg(args, 0);
                if engine.is_callable_value(&callback) {
                    engine.process_in_skipped_mode(move |engine| {
                        engine.call_function(
                            &callback,
                            &Value::Undefined,
                            &[Value::Unknown, Value::Unknown, Value::Unknown],
                            true,
                        )
                    });
                }
                return engine.unknown_value();
            };
            let callback = arg(args, 0);
            if !engine.is_callable_value(&callback) {
                if callback.is_unknown() {
                    return engine.unknown_value();
                }
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    &format!("{} is not a function", callback.type_name()),
                );
            }
            let this_arg = arg(args, 1);

            let mut map_result = Vec::new();
            let mut filter_result = Vec::new();
            let mut unknown_outcome = false;
            for i in 0..length {
                let exists = engine
                    .get_object(id)
                    .map(|o| o.borrow().has_property(&i.to_string()) != Some(false))
                    .unwrap_or(false);
                if !exists {
                    if kind == IterationKind::Map {
                        map_result.push(Value::Undefined);
                    }
                    continue;
                }
                let v = tryc!(element(engine, id, i));
                let call_args = [v.clone(), Value::Number(i as f64), this.clone()];
                let result = match engine.call_function(&callback, &this_arg, &call_args, false) {
                    Completion::Normal(r) => r,
                    other => return other,
                };
                match kind {
                    IterationKind::Every => match to_boolean(&result) {
                        Some(false) => return Completion::Normal(Value::Boolean(false)),
                        Some(true) => {}
                        None => unknown_outcome = true,
                    },
                    IterationKind::Some => match to_boolean(&result) {
                        Some(true) => return Completion::Normal(Value::Boolean(true)),
                        Some(false) => {}
                        None => unknown_outcome = true,
                    },
                    IterationKind::ForEach => {}
                    IterationKind::Map => map_result.push(result),
                    IterationKind::Filter => match to_boolean(&result) {
                        Some(true) => filter_result.push(v),
                        Some(false) => {}
                        None => {
                            filter_result.push(Value::Unknown);
                            unknown_outcome = true;
                        }
                    },
                }
            }
            match kind {
                IterationKind::Every => {
                    if unknown_outcome {
                        engine.unknown_value()
                    } else {
                        Completion::Normal(Value::Boolean(true))
                    }
                }
                IterationKind::Some => {
                    if unknown_outcome {
                        engine.unknown_value()
                    } else {
                        Completion::Normal(Value::Boolean(false))
                    }
                }
                IterationKind::ForEach => Completion::Normal(Value::Undefined),
                IterationKind::Map => Completion::Normal(engine.create_array(map_result)),
                IterationKind::Filter => Completion::Normal(engine.create_array(filter_result)),
            }
        });
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum IterationKind {
    Every,
    Some,
    ForEach,
    Map,
    Filter,
}

fn reduce_impl(engine: &mut Engine, this: &Value, args: &[Value], right: bool) -> Completion {
    if this.is_unknown() {
        return engine.unknown_value();
    }
    let id = tryc!(engine.this_object_id(this));
    let Some(length) = tryc!(length_of(engine, id)) else {
        return engine.unknown_value();
    };
    let callback = arg(args, 0);
    if !engine.is_callable_value(&callback) {
        if callback.is_unknown() {
            return engine.unknown_value();
        }
        return engine.handle_recoverable_native_exception(
            ErrorKind::TypeError,
            "Reduce callback is not a function",
        );
    }
    let indices: Vec<u32> = if right {
        (0..length).rev().collect()
    } else {
        (0..length).collect()
    };
    let mut iter = indices.into_iter();
    let mut accumulator = match args.get(1) {
        Some(v) => v.clone(),
        None => loop {
            let Some(i) = iter.next() else {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Reduce of empty array with no initial value",
                );
            };
            let exists = engine
                .get_object(id)
                .map(|o| o.borrow().has_property(&i.to_string()) != Some(false))
                .unwrap_or(false);
            if exists {
                break tryc!(element(engine, id, i));
            }
        },
    };
    for i in iter {
        let exists = engine
            .get_object(id)
            .map(|o| o.borrow().has_property(&i.to_string()) != Some(false))
            .unwrap_or(false);
        if !exists {
            continue;
        }
        let v = tryc!(element(engine, id, i));
        let call_args = [
            accumulator,
            v,
            Value::Number(i as f64),
            this.clone(),
        ];
        accumulator = match engine.call_function(&callback, &Value::Undefined, &call_args, false) {
            Completion::Normal(r) => r,
            other => return other,
        };
    }
    Completion::Normal(accumulator)
}
