//! The Math object, §15.8. `Math.random` is the lone non-deterministic
//! member: outside exact mode its result is Unknown.

use super::{arg, has_unknown};
use crate::engine::types::*;
use crate::engine::Engine;
use crate::tryc;
use crate::types::Value;

impl Engine {
    pub(crate) fn setup_math_builtin(&mut self) {
        let math = self.create_object();
        math.borrow_mut().class_name = "Math".to_string();

        // §15.8.1 value properties
        {
            let mut m = math.borrow_mut();
            for (name, value) in [
                ("E", std::f64::consts::E),
                ("LN10", std::f64::consts::LN_10),
                ("LN2", std::f64::consts::LN_2),
                ("LOG2E", std::f64::consts::LOG2_E),
                ("LOG10E", std::f64::consts::LOG10_E),
                ("PI", std::f64::consts::PI),
                ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
                ("SQRT2", std::f64::consts::SQRT_2),
            ] {
                m.properties.insert(
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

        // §15.8.2 single-argument functions
        let unary: [(&str, fn(f64) -> f64); 12] = [
            ("abs", f64::abs),
            ("acos", f64::acos),
            ("asin", f64::asin),
            ("atan", f64::atan),
            ("ceil", f64::ceil),
            ("cos", f64::cos),
            ("exp", f64::exp),
            ("floor", f64::floor),
            ("log", f64::ln),
            ("sin", f64::sin),
            ("sqrt", f64::sqrt),
            ("tan", f64::tan),
        ];
        for (name, f) in unary {
            self.add_native(&math, name, 1, move |engine, this, args| {
                if has_unknown(this, args) {
                    return engine.unknown_value();
                }
                let Some(n) = tryc!(engine.number_arg(&arg(args, 0))) else {
                    return engine.unknown_value();
                };
                Completion::Normal(Value::Number(f(n)))
            });
        }

        // §15.8.2.17.2 round: ties go toward +Infinity
        self.add_native(&math, "round", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(n) = tryc!(engine.number_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let rounded = if n.is_nan() || n.is_infinite() || n == 0.0 {
                n
            } else {
                (n + 0.5).floor()
            };
            Completion::Normal(Value::Number(rounded))
        });

        // §15.8.2.5
        self.add_native(&math, "atan2", 2, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(y) = tryc!(engine.number_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let Some(x) = tryc!(engine.number_arg(&arg(args, 1))) else {
                return engine.unknown_value();
            };
            Completion::Normal(Value::Number(y.atan2(x)))
        });

        // §15.8.2.13
        self.add_native(&math, "pow", 2, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(base) = tryc!(engine.number_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let Some(exponent) = tryc!(engine.number_arg(&arg(args, 1))) else {
                return engine.unknown_value();
            };
            Completion::Normal(Value::Number(base.powf(exponent)))
        });

        // §15.8.2.11 / §15.8.2.12 — variadic max/min
        self.add_native(&math, "max", 2, |engine, this, args| {
            math_min_max(engine, this, args, true)
        });
        self.add_native(&math, "min", 2, |engine, this, args| {
            math_min_max(engine, this, args, false)
        });

        // §15.8.2.14 — non-deterministic
        self.add_native(&math, "random", 0, |engine, this, _args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            if engine.options.exact_mode {
                // A fixed seedless source keeps exact mode deterministic
                // across runs while staying within [0, 1).
                use std::collections::hash_map::RandomState;
                use std::hash::{BuildHasher, Hasher};
                let hash = RandomState::new().build_hasher().finish();
                return Completion::Normal(Value::Number(
                    (hash % (1u64 << 53)) as f64 / (1u64 << 53) as f64,
                ));
            }
            engine.unknown_value()
        });

        let math_val = Engine::handle_of(&math);
        self.global_object()
            .borrow_mut()
            .insert_builtin("Math".to_string(), math_val);
    }
}

fn math_min_max(engine: &mut Engine, this: &Value, args: &[Value], max: bool) -> Completion {
    if has_unknown(this, args) {
        return engine.unknown_value();
    }
    let mut best = if max { f64::NEG_INFINITY } else { f64::INFINITY };
    for v in args {
        let Some(n) = tryc!(engine.number_arg(v)) else {
            return engine.unknown_value();
        };
        if n.is_nan() {
            return Completion::Normal(Value::Number(f64::NAN));
        }
        if (max && n > best) || (!max && n < best) {
            best = n;
        }
    }
    Completion::Normal(Value::Number(best))
}
