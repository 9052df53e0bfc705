//! The §9 abstract conversion operations and the §11.9 equality
//! predicates. Pure primitive kernels live as free functions; conversions
//! that can run user code (ToPrimitive on objects and everything built on
//! it) are engine methods. Every operation yields Unknown when any input
//! is Unknown.

use crate::engine::types::*;
use crate::engine::{Engine, ErrorKind};
use crate::types::{JsString, Value, number_ops};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveHint {
    Default,
    Number,
    String,
}

// §9.2 ToBoolean. Total on primitives; None for Unknown.
pub fn to_boolean(val: &Value) -> Option<bool> {
    match val {
        Value::Undefined | Value::Null => Some(false),
        Value::Boolean(b) => Some(*b),
        Value::Number(n) => Some(*n != 0.0 && !n.is_nan()),
        Value::String(s) => Some(!s.is_empty()),
        Value::Object(_) => Some(true),
        Value::Unknown => None,
    }
}

// §9.3 ToNumber restricted to primitives.
pub fn primitive_to_number(val: &Value) -> Option<f64> {
    match val {
        Value::Undefined => Some(f64::NAN),
        Value::Null => Some(0.0),
        Value::Boolean(b) => Some(*b as u8 as f64),
        Value::Number(n) => Some(*n),
        Value::String(s) => Some(string_to_number(s)),
        Value::Object(_) | Value::Unknown => None,
    }
}

// §9.3.1 ToNumber applied to the String type
pub fn string_to_number(s: &JsString) -> f64 {
    let rust_str = s.to_rust_string();
    let trimmed = rust_str.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }
    if trimmed == "Infinity" || trimmed == "+Infinity" {
        return f64::INFINITY;
    }
    if trimmed == "-Infinity" {
        return f64::NEG_INFINITY;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

// §9.4 ToInteger
pub fn to_integer(n: f64) -> f64 {
    if n.is_nan() {
        0.0
    } else if n.is_infinite() || n == 0.0 {
        n
    } else {
        n.trunc()
    }
}

// §9.8 ToString restricted to primitives.
pub fn primitive_to_string(val: &Value) -> Option<JsString> {
    match val {
        Value::Undefined => Some(JsString::from_str("undefined")),
        Value::Null => Some(JsString::from_str("null")),
        Value::Boolean(b) => Some(JsString::from_str(if *b { "true" } else { "false" })),
        Value::Number(n) => Some(JsString::from_str(&number_ops::to_string(*n))),
        Value::String(s) => Some(s.clone()),
        Value::Object(_) | Value::Unknown => None,
    }
}

// §11.9.6 — the strict equality comparison algorithm. None when either
// side is Unknown.
pub fn strict_equals(left: &Value, right: &Value) -> Option<bool> {
    match (left, right) {
        (Value::Unknown, _) | (_, Value::Unknown) => None,
        (Value::Undefined, Value::Undefined) => Some(true),
        (Value::Null, Value::Null) => Some(true),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a == b),
        (Value::Number(a), Value::Number(b)) => Some(number_ops::equal(*a, *b)),
        (Value::String(a), Value::String(b)) => Some(a == b),
        (Value::Object(a), Value::Object(b)) => Some(a.id == b.id),
        _ => Some(false),
    }
}

// §9.12 SameValue: differs from strict equality at ±0 and NaN. Two
// Unknowns compare as the same value so descriptor comparison does not
// manufacture spurious redefinition rejections.
pub fn same_value(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Unknown, Value::Unknown) => true,
        (Value::Number(a), Value::Number(b)) => number_ops::same_value(*a, *b),
        _ => strict_equals(left, right).unwrap_or(false),
    }
}

impl Engine {
    // §9.1 ToPrimitive
    pub fn to_primitive(&mut self, val: &Value, hint: PrimitiveHint) -> Completion {
        match val {
            Value::Object(o) => self.default_value(o.id, hint),
            Value::Unknown => Completion::Normal(Value::Unknown),
            other => Completion::Normal(other.clone()),
        }
    }

    // §9.3 ToNumber
    pub fn to_number(&mut self, val: &Value) -> Completion {
        match val {
            Value::Object(_) => {
                let prim = match self.to_primitive(val, PrimitiveHint::Number) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                self.to_number(&prim)
            }
            Value::Unknown => Completion::Normal(Value::Unknown),
            other => Completion::Normal(Value::Number(
                primitive_to_number(other).unwrap_or(f64::NAN),
            )),
        }
    }

    // §9.8 ToString
    pub fn to_string_value(&mut self, val: &Value) -> Completion {
        match val {
            Value::Object(_) => {
                let prim = match self.to_primitive(val, PrimitiveHint::String) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                self.to_string_value(&prim)
            }
            Value::Unknown => Completion::Normal(Value::Unknown),
            other => Completion::Normal(Value::String(primitive_to_string(other).unwrap())),
        }
    }

    /// ToString that flattens to a Rust string for property-name use;
    /// Unknown becomes None.
    pub fn to_property_name(&mut self, val: &Value) -> Result<Option<String>, Completion> {
        match self.to_string_value(val) {
            Completion::Normal(Value::String(s)) => Ok(Some(s.to_rust_string())),
            Completion::Normal(Value::Unknown) => Ok(None),
            Completion::Normal(_) => Ok(None),
            other => Err(other),
        }
    }

    // §9.9 ToObject
    pub fn to_object(&mut self, val: &Value) -> Completion {
        match val {
            Value::Undefined | Value::Null => self.handle_recoverable_native_exception(
                ErrorKind::TypeError,
                "Cannot convert undefined or null to object",
            ),
            Value::Boolean(b) => {
                let obj = self.create_wrapper_object("Boolean", Value::Boolean(*b));
                Completion::Normal(obj)
            }
            Value::Number(n) => {
                let obj = self.create_wrapper_object("Number", Value::Number(*n));
                Completion::Normal(obj)
            }
            Value::String(s) => {
                let obj = self.create_wrapper_object("String", Value::String(s.clone()));
                Completion::Normal(obj)
            }
            Value::Object(_) => Completion::Normal(val.clone()),
            Value::Unknown => Completion::Normal(Value::Unknown),
        }
    }

    // §9.10 CheckObjectCoercible: returns the failure completion, if any.
    pub fn check_object_coercible(&mut self, val: &Value) -> Option<Completion> {
        match val {
            Value::Undefined | Value::Null => Some(self.handle_recoverable_native_exception(
                ErrorKind::TypeError,
                "Cannot convert undefined or null to object",
            )),
            _ => None,
        }
    }

    /// Convert and truncate per §9.4; Err carries the abrupt completion,
    /// Ok(None) means the input was Unknown.
    pub fn to_integer_value(&mut self, val: &Value) -> Result<Option<f64>, Completion> {
        match self.to_number(val) {
            Completion::Normal(Value::Number(n)) => Ok(Some(to_integer(n))),
            Completion::Normal(Value::Unknown) => Ok(None),
            Completion::Normal(_) => Ok(Some(0.0)),
            other => Err(other),
        }
    }

    // §11.9.3 — the abstract equality comparison algorithm.
    pub fn abstract_equals(&mut self, left: &Value, right: &Value) -> Completion {
        if left.is_unknown() || right.is_unknown() {
            return Completion::Normal(Value::Unknown);
        }
        let result = match (left, right) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Boolean(_), Value::Boolean(_))
            | (Value::Undefined, _)
            | (_, Value::Undefined)
            | (Value::Null, _)
            | (_, Value::Null)
            | (Value::Object(_), Value::Object(_)) => {
                return Completion::Normal(Value::Boolean(
                    strict_equals(left, right).unwrap_or(false),
                ));
            }
            (Value::Number(_), Value::String(s)) => {
                return self
                    .abstract_equals(left, &Value::Number(string_to_number(s)));
            }
            (Value::String(s), Value::Number(_)) => {
                return self
                    .abstract_equals(&Value::Number(string_to_number(s)), right);
            }
            (Value::Boolean(b), _) => {
                return self.abstract_equals(&Value::Number(*b as u8 as f64), right);
            }
            (_, Value::Boolean(b)) => {
                return self.abstract_equals(left, &Value::Number(*b as u8 as f64));
            }
            (Value::Number(_) | Value::String(_), Value::Object(_)) => {
                let prim = match self.to_primitive(right, PrimitiveHint::Default) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                return self.abstract_equals(left, &prim);
            }
            (Value::Object(_), Value::Number(_) | Value::String(_)) => {
                let prim = match self.to_primitive(left, PrimitiveHint::Default) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                return self.abstract_equals(&prim, right);
            }
            _ => false,
        };
        Completion::Normal(Value::Boolean(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_boolean_table() {
        assert_eq!(to_boolean(&Value::Undefined), Some(false));
        assert_eq!(to_boolean(&Value::Null), Some(false));
        assert_eq!(to_boolean(&Value::Number(0.0)), Some(false));
        assert_eq!(to_boolean(&Value::Number(f64::NAN)), Some(false));
        assert_eq!(to_boolean(&Value::Number(1.5)), Some(true));
        assert_eq!(to_boolean(&Value::String(JsString::from_str(""))), Some(false));
        assert_eq!(to_boolean(&Value::String(JsString::from_str("x"))), Some(true));
        assert_eq!(to_boolean(&Value::Unknown), None);
    }

    #[test]
    fn string_to_number_forms() {
        assert_eq!(string_to_number(&JsString::from_str("")), 0.0);
        assert_eq!(string_to_number(&JsString::from_str("  42  ")), 42.0);
        assert_eq!(string_to_number(&JsString::from_str("0x10")), 16.0);
        assert_eq!(string_to_number(&JsString::from_str("Infinity")), f64::INFINITY);
        assert!(string_to_number(&JsString::from_str("12px")).is_nan());
    }

    #[test]
    fn to_integer_truncates() {
        assert_eq!(to_integer(4.7), 4.0);
        assert_eq!(to_integer(-4.7), -4.0);
        assert_eq!(to_integer(f64::NAN), 0.0);
        assert_eq!(to_integer(f64::INFINITY), f64::INFINITY);
    }

    #[test]
    fn round_trip_on_finite_primitives() {
        // ToBoolean(ToString(ToNumber(x))) is defined for all primitives
        for v in [
            Value::Undefined,
            Value::Null,
            Value::Boolean(true),
            Value::Number(12.5),
            Value::String(JsString::from_str("3e2")),
        ] {
            let n = primitive_to_number(&v).unwrap();
            let s = primitive_to_string(&Value::Number(n)).unwrap();
            assert!(to_boolean(&Value::String(s)).is_some());
        }
    }

    #[test]
    fn strict_equals_laws() {
        // strictEquals(x, x) iff x is not NaN
        for v in [
            Value::Undefined,
            Value::Null,
            Value::Boolean(false),
            Value::Number(3.0),
            Value::String(JsString::from_str("s")),
        ] {
            assert_eq!(strict_equals(&v, &v), Some(true));
        }
        assert_eq!(
            strict_equals(&Value::Number(f64::NAN), &Value::Number(f64::NAN)),
            Some(false)
        );
        assert_eq!(strict_equals(&Value::Unknown, &Value::Unknown), None);
    }

    #[test]
    fn same_value_zero_and_nan() {
        assert!(same_value(
            &Value::Number(f64::NAN),
            &Value::Number(f64::NAN)
        ));
        assert!(!same_value(&Value::Number(0.0), &Value::Number(-0.0)));
        assert!(same_value(&Value::Unknown, &Value::Unknown));
    }
}
