//! The String constructor and prototype, §15.5.

use super::{arg, has_unknown};
use crate::engine::conversions;
use crate::engine::types::*;
use crate::engine::{Engine, ErrorKind};
use crate::tryc;
use crate::types::{JsString, Value, number_ops};

/// The receiver as a string value, §15.5.4.x step 1: CheckObjectCoercible
/// then ToString. Ok(None) when the receiver is Unknown.
fn this_string(engine: &mut Engine, this: &Value) -> Result<Option<JsString>, Completion> {
    if this.is_unknown() {
        return Ok(None);
    }
    if let Some(comp) = engine.check_object_coercible(this) {
        return Err(comp);
    }
    engine.js_string_arg(this)
}

impl Engine {
    pub(crate) fn setup_string_builtin(&mut self) {
        let proto = self.string_prototype.clone().unwrap();

        // §15.5.1 / §15.5.2
        let ctor = self.define_constructor("String", 1, &proto, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let s = if args.is_empty() {
                JsString::from_str("")
            } else {
                let Some(s) = tryc!(engine.js_string_arg(&args[0])) else {
                    return engine.unknown_value();
                };
                s
            };
            // As a constructor the result is a wrapper; as a function it
            // is the primitive.
            if engine.is_construct_call() {
                if let Some(obj) = engine.resolve_object(this) {
                    let mut b = obj.borrow_mut();
                    b.class_name = "String".to_string();
                    b.primitive_value = Some(Value::String(s));
                    b.prototype = engine.string_prototype.clone();
                }
                return Completion::Normal(this.clone());
            }
            Completion::Normal(Value::String(s))
        });
        let ctor_obj = self.resolve_object(&ctor).unwrap();

        // §15.5.3.2
        self.add_native(&ctor_obj, "fromCharCode", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let mut units = Vec::with_capacity(args.len());
            for v in args {
                let Some(n) = tryc!(engine.number_arg(v)) else {
                    return engine.unknown_value();
                };
                units.push(number_ops::to_uint16(n));
            }
            Completion::Normal(Value::String(JsString { code_units: units }))
        });

        // §15.5.4.2 / §15.5.4.3
        self.add_native(&proto, "toString", 0, |engine, this, _args| {
            string_value_of(engine, this)
        });
        self.add_native(&proto, "valueOf", 0, |engine, this, _args| {
            string_value_of(engine, this)
        });

        // §15.5.4.4 / §15.5.4.5
        self.add_native(&proto, "charAt", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(s) = tryc!(this_string(engine, this)) else {
                return engine.unknown_value();
            };
            let Some(n) = tryc!(engine.number_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let pos = conversions::to_integer(n);
            if pos < 0.0 || pos >= s.len() as f64 {
                return Completion::Normal(Value::String(JsString::from_str("")));
            }
            Completion::Normal(Value::String(s.char_at(pos as usize).unwrap()))
        });

        self.add_native(&proto, "charCodeAt", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(s) = tryc!(this_string(engine, this)) else {
                return engine.unknown_value();
            };
            let Some(n) = tryc!(engine.number_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let pos = conversions::to_integer(n);
            if pos < 0.0 || pos >= s.len() as f64 {
                return Completion::Normal(Value::Number(f64::NAN));
            }
            Completion::Normal(Value::Number(s.code_units[pos as usize] as f64))
        });

        // §15.5.4.6
        self.add_native(&proto, "concat", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(mut s) = tryc!(this_string(engine, this)) else {
                return engine.unknown_value();
            };
            for v in args {
                let Some(part) = tryc!(engine.js_string_arg(v)) else {
                    return engine.unknown_value();
                };
                s = s.concat(&part);
            }
            Completion::Normal(Value::String(s))
        });

        // §15.5.4.7 / §15.5.4.8
        self.add_native(&proto, "indexOf", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(s) = tryc!(this_string(engine, this)) else {
                return engine.unknown_value();
            };
            let Some(search) = tryc!(engine.js_string_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let Some(n) = tryc!(engine.number_arg(&arg(args, 1))) else {
                return engine.unknown_value();
            };
            let from = conversions::to_integer(n).clamp(0.0, s.len() as f64) as usize;
            let result = s.index_of(&search, from).map(|i| i as f64).unwrap_or(-1.0);
            Completion::Normal(Value::Number(result))
        });

        self.add_native(&proto, "lastIndexOf", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(s) = tryc!(this_string(engine, this)) else {
                return engine.unknown_value();
            };
            let Some(search) = tryc!(engine.js_string_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let Some(n) = tryc!(engine.number_arg(&arg(args, 1))) else {
                return engine.unknown_value();
            };
            let from = if n.is_nan() {
                s.len()
            } else {
                conversions::to_integer(n).clamp(0.0, s.len() as f64) as usize
            };
            let result = s
                .last_index_of(&search, from)
                .map(|i| i as f64)
                .unwrap_or(-1.0);
            Completion::Normal(Value::Number(result))
        });

        // §15.5.4.9 — bitwise comparison stands in for locale order.
        self.add_native(&proto, "localeCompare", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(s) = tryc!(this_string(engine, this)) else {
                return engine.unknown_value();
            };
            let Some(that) = tryc!(engine.js_string_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let result = match s.code_units.cmp(&that.code_units) {
                std::cmp::Ordering::Less => -1.0,
                std::cmp::Ordering::Equal => 0.0,
                std::cmp::Ordering::Greater => 1.0,
            };
            Completion::Normal(Value::Number(result))
        });

        // §15.5.4.10
        self.add_native(&proto, "match", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(s) = tryc!(this_string(engine, this)) else {
                return engine.unknown_value();
            };
            let regexp = tryc!(engine.coerce_to_regexp(&arg(args, 0)));
            engine.regexp_match(&regexp, &s)
        });

        // §15.5.4.11
        self.add_native(&proto, "replace", 2, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(s) = tryc!(this_string(engine, this)) else {
                return engine.unknown_value();
            };
            engine.string_replace(&s, &arg(args, 0), &arg(args, 1))
        });

        // §15.5.4.12
        self.add_native(&proto, "search", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(s) = tryc!(this_string(engine, this)) else {
                return engine.unknown_value();
            };
            let regexp = tryc!(engine.coerce_to_regexp(&arg(args, 0)));
            engine.regexp_search(&regexp, &s)
        });

        // §15.5.4.13
        self.add_native(&proto, "slice", 2, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(s) = tryc!(this_string(engine, this)) else {
                return engine.unknown_value();
            };
            let len = s.len() as f64;
            let Some(start_num) = tryc!(engine.number_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let mut start = conversions::to_integer(start_num);
            if start < 0.0 {
                start = (len + start).max(0.0);
            } else {
                start = start.min(len);
            }
            let mut end = match &arg(args, 1) {
                Value::Undefined => len,
                v => {
                    let Some(n) = tryc!(engine.number_arg(v)) else {
                        return engine.unknown_value();
                    };
                    conversions::to_integer(n)
                }
            };
            if end < 0.0 {
                end = (len + end).max(0.0);
            } else {
                end = end.min(len);
            }
            Completion::Normal(Value::String(s.slice_utf16(start as usize, end as usize)))
        });

        // §15.5.4.14
        self.add_native(&proto, "split", 2, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(s) = tryc!(this_string(engine, this)) else {
                return engine.unknown_value();
            };
            let limit = match &arg(args, 1) {
                Value::Undefined => u32::MAX,
                v => {
                    let Some(n) = tryc!(engine.number_arg(v)) else {
                        return engine.unknown_value();
                    };
                    number_ops::to_uint32(n)
                }
            };
            engine.string_split(&s, &arg(args, 0), limit)
        });

        // §15.5.4.15
        self.add_native(&proto, "substring", 2, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(s) = tryc!(this_string(engine, this)) else {
                return engine.unknown_value();
            };
            let len = s.len() as f64;
            let Some(start_num) = tryc!(engine.number_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let start = conversions::to_integer(start_num).clamp(0.0, len);
            let end = match &arg(args, 1) {
                Value::Undefined => len,
                v => {
                    let Some(n) = tryc!(engine.number_arg(v)) else {
                        return engine.unknown_value();
                    };
                    conversions::to_integer(n).clamp(0.0, len)
                }
            };
            let (from, to) = if start <= end { (start, end) } else { (end, start) };
            Completion::Normal(Value::String(s.slice_utf16(from as usize, to as usize)))
        });

        // §B.2.3 substr, carried for compatibility with analysed code
        self.add_native(&proto, "substr", 2, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(s) = tryc!(this_string(engine, this)) else {
                return engine.unknown_value();
            };
            let len = s.len() as f64;
            let Some(start_num) = tryc!(engine.number_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let mut start = conversions::to_integer(start_num);
            if start < 0.0 {
                start = (len + start).max(0.0);
            }
            let count = match &arg(args, 1) {
                Value::Undefined => f64::INFINITY,
                v => {
                    let Some(n) = tryc!(engine.number_arg(v)) else {
                        return engine.unknown_value();
                    };
                    conversions::to_integer(n)
                }
            };
            let end = (start + count.max(0.0)).min(len);
            Completion::Normal(Value::String(
                s.slice_utf16(start.min(len) as usize, end as usize),
            ))
        });

        // §15.5.4.16-19
        self.add_native(&proto, "toLowerCase", 0, |engine, this, _args| {
            case_convert(engine, this, false)
        });
        self.add_native(&proto, "toLocaleLowerCase", 0, |engine, this, _args| {
            case_convert(engine, this, false)
        });
        self.add_native(&proto, "toUpperCase", 0, |engine, this, _args| {
            case_convert(engine, this, true)
        });
        self.add_native(&proto, "toLocaleUpperCase", 0, |engine, this, _args| {
            case_convert(engine, this, true)
        });

        // §15.5.4.20
        self.add_native(&proto, "trim", 0, |engine, this, _args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            let Some(s) = tryc!(this_string(engine, this)) else {
                return engine.unknown_value();
            };
            Completion::Normal(Value::String(JsString::from_str(
                s.to_rust_string().trim(),
            )))
        });
    }
}

fn string_value_of(engine: &mut Engine, this: &Value) -> Completion {
    match this {
        Value::String(s) => Completion::Normal(Value::String(s.clone())),
        Value::Unknown => engine.unknown_value(),
        Value::Object(o) => {
            let primitive = engine
                .get_object(o.id)
                .and_then(|obj| obj.borrow().primitive_value.clone());
            match primitive {
                Some(Value::String(s)) => Completion::Normal(Value::String(s)),
                _ => engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "String.prototype.valueOf called on incompatible receiver",
                ),
            }
        }
        _ => engine.handle_recoverable_native_exception(
            ErrorKind::TypeError,
            "String.prototype.valueOf called on incompatible receiver",
        ),
    }
}

fn case_convert(engine: &mut Engine, this: &Value, upper: bool) -> Completion {
    if this.is_unknown() {
        return engine.unknown_value();
    }
    let Some(s) = tryc!(this_string(engine, this)) else {
        return engine.unknown_value();
    };
    let text = s.to_rust_string();
    let converted = if upper {
        text.to_uppercase()
    } else {
        text.to_lowercase()
    };
    Completion::Normal(Value::String(JsString::from_str(&converted)))
}
