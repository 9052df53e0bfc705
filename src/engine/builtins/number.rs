//! The Number constructor and prototype, §15.7.

use super::{arg, has_unknown};
use crate::engine::conversions;
use crate::engine::types::*;
use crate::engine::{Engine, ErrorKind};
use crate::tryc;
use crate::types::{JsString, Value, number_ops};

/// The receiver's number value: a Number primitive or wrapper, §15.7.4.
fn this_number(engine: &mut Engine, this: &Value) -> Result<Option<f64>, Completion> {
    match this {
        Value::Number(n) => Ok(Some(*n)),
        Value::Unknown => Ok(None),
        Value::Object(o) => {
            let primitive = engine
                .get_object(o.id)
                .and_then(|obj| obj.borrow().primitive_value.clone());
            match primitive {
                Some(Value::Number(n)) => Ok(Some(n)),
                _ => Err(engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Number.prototype method called on incompatible receiver",
                )),
            }
        }
        _ => Err(engine.handle_recoverable_native_exception(
            ErrorKind::TypeError,
            "Number.prototype method called on incompatible receiver",
        )),
    }
}

impl Engine {
    pub(crate) fn setup_number_builtin(&mut self) {
        let proto = self.number_prototype.clone().unwrap();

        // §15.7.1 / §15.7.2
        let ctor = self.define_constructor("Number", 1, &proto, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let n = if args.is_empty() {
                0.0
            } else {
                let Some(n) = tryc!(engine.number_arg(&args[0])) else {
                    return engine.unknown_value();
                };
                n
            };
            if engine.is_construct_call() {
                if let Some(obj) = engine.resolve_object(this) {
                    let mut b = obj.borrow_mut();
                    b.class_name = "Number".to_string();
                    b.primitive_value = Some(Value::Number(n));
                    b.prototype = engine.number_prototype.clone();
                }
                return Completion::Normal(this.clone());
            }
            Completion::Normal(Value::Number(n))
        });

        // §15.7.3 constants
        if let Some(ctor_obj) = self.resolve_object(&ctor) {
            let mut b = ctor_obj.borrow_mut();
            for (name, value) in [
                ("MAX_VALUE", f64::MAX),
                ("MIN_VALUE", 5e-324),
                ("NaN", f64::NAN),
                ("NEGATIVE_INFINITY", f64::NEG_INFINITY),
                ("POSITIVE_INFINITY", f64::INFINITY),
            ] {
                b.properties.insert(
                    name.to_string(),
                    Property::new(PropertyDescriptor::data(
                        Value::Number(value),
                        false,
                        false,
                        false,
                    )),
                );
            }
        }

        // §15.7.4.2 — toString with optional radix
        self.add_native(&proto, "toString", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(n) = tryc!(this_number(engine, this)) else {
                return engine.unknown_value();
            };
            let radix = match &arg(args, 0) {
                Value::Undefined => 10,
                v => {
                    let Some(r) = tryc!(engine.number_arg(v)) else {
                        return engine.unknown_value();
                    };
                    let r = conversions::to_integer(r);
                    if !(2.0..=36.0).contains(&r) {
                        return engine.handle_recoverable_native_exception(
                            ErrorKind::RangeError,
                            "toString() radix must be between 2 and 36",
                        );
                    }
                    r as u32
                }
            };
            let rendered = if radix == 10 {
                number_ops::to_string(n)
            } else {
                format_radix(n, radix)
            };
            Completion::Normal(Value::String(JsString::from_str(&rendered)))
        });

        self.add_native(&proto, "toLocaleString", 0, |engine, this, _args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            let Some(n) = tryc!(this_number(engine, this)) else {
                return engine.unknown_value();
            };
            Completion::Normal(Value::String(JsString::from_str(&number_ops::to_string(n))))
        });

        // §15.7.4.4
        self.add_native(&proto, "valueOf", 0, |engine, this, _args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            match tryc!(this_number(engine, this)) {
                Some(n) => Completion::Normal(Value::Number(n)),
                None => engine.unknown_value(),
            }
        });

        // §15.7.4.5
        self.add_native(&proto, "toFixed", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(n) = tryc!(this_number(engine, this)) else {
                return engine.unknown_value();
            };
            let Some(digits) = tryc!(engine.number_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let digits = conversions::to_integer(digits);
            if !(0.0..=20.0).contains(&digits) {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::RangeError,
                    "toFixed() digits argument must be between 0 and 20",
                );
            }
            let rendered = if n.abs() >= 1e21 || n.is_nan() || n.is_infinite() {
                number_ops::to_string(n)
            } else {
                format!("{:.*}", digits as usize, n)
            };
            Completion::Normal(Value::String(JsString::from_str(&rendered)))
        });

        // §15.7.4.6
        self.add_native(&proto, "toExponential", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(n) = tryc!(this_number(engine, this)) else {
                return engine.unknown_value();
            };
            if n.is_nan() || n.is_infinite() {
                return Completion::Normal(Value::String(JsString::from_str(
                    &number_ops::to_string(n),
                )));
            }
            let rendered = match &arg(args, 0) {
                Value::Undefined => format_exponential(n, None),
                v => {
                    let Some(d) = tryc!(engine.number_arg(v)) else {
                        return engine.unknown_value();
                    };
                    let d = conversions::to_integer(d);
                    if !(0.0..=20.0).contains(&d) {
                        return engine.handle_recoverable_native_exception(
                            ErrorKind::RangeError,
                            "toExponential() argument must be between 0 and 20",
                        );
                    }
                    format_exponential(n, Some(d as usize))
                }
            };
            Completion::Normal(Value::String(JsString::from_str(&rendered)))
        });

        // §15.7.4.7
        self.add_native(&proto, "toPrecision", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(n) = tryc!(this_number(engine, this)) else {
                return engine.unknown_value();
            };
            match &arg(args, 0) {
                Value::Undefined => Completion::Normal(Value::String(JsString::from_str(
                    &number_ops::to_string(n),
                ))),
                v => {
                    let Some(p) = tryc!(engine.number_arg(v)) else {
                        return engine.unknown_value();
                    };
                    let p = conversions::to_integer(p);
                    if !(1.0..=21.0).contains(&p) {
                        return engine.handle_recoverable_native_exception(
                            ErrorKind::RangeError,
                            "toPrecision() argument must be between 1 and 21",
                        );
                    }
                    if n.is_nan() || n.is_infinite() {
                        return Completion::Normal(Value::String(JsString::from_str(
                            &number_ops::to_string(n),
                        )));
                    }
                    let rendered = format!("{:.*}", p as usize - 1, n);
                    Completion::Normal(Value::String(JsString::from_str(&rendered)))
                }
            }
        });
    }
}

fn format_radix(n: f64, radix: u32) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let negative = n < 0.0;
    let mut int_part = n.abs().trunc() as u64;
    let mut digits = Vec::new();
    if int_part == 0 {
        digits.push('0');
    }
    while int_part > 0 {
        let d = (int_part % radix as u64) as u32;
        digits.push(char::from_digit(d, radix).unwrap());
        int_part /= radix as u64;
    }
    if negative {
        digits.push('-');
    }
    let mut out: String = digits.into_iter().rev().collect();
    // A handful of fractional digits is enough for analysis output.
    let mut frac = n.abs().fract();
    if frac > 0.0 {
        out.push('.');
        for _ in 0..20 {
            frac *= radix as f64;
            let d = frac.trunc() as u32;
            out.push(char::from_digit(d, radix).unwrap());
            frac -= frac.trunc();
            if frac == 0.0 {
                break;
            }
        }
    }
    out
}

fn format_exponential(n: f64, digits: Option<usize>) -> String {
    let formatted = match digits {
        Some(d) => format!("{:.*e}", d, n),
        None => format!("{:e}", n),
    };
    // Rust renders `1e2`; ECMAScript wants an explicit exponent sign.
    match formatted.find('e') {
        Some(pos) if !formatted[pos + 1..].starts_with('-') => {
            format!("{}e+{}", &formatted[..pos], &formatted[pos + 1..])
        }
        _ => formatted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radix_formatting() {
        assert_eq!(format_radix(255.0, 16), "ff");
        assert_eq!(format_radix(-8.0, 2), "-1000");
        assert_eq!(format_radix(0.0, 8), "0");
        assert_eq!(format_radix(0.5, 2), "0.1");
    }

    #[test]
    fn exponential_formatting() {
        assert_eq!(format_exponential(100.0, Some(2)), "1.00e+2");
        assert_eq!(format_exponential(0.001, Some(1)), "1.0e-3");
    }
}
