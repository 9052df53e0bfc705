//! The Boolean constructor and prototype, §15.6.

use super::has_unknown;
use crate::engine::conversions::to_boolean;
use crate::engine::types::*;
use crate::engine::{Engine, ErrorKind};
use crate::types::{JsString, Value};

fn this_boolean(engine: &mut Engine, this: &Value) -> Result<Option<bool>, Completion> {
    match this {
        Value::Boolean(b) => Ok(Some(*b)),
        Value::Unknown => Ok(None),
        Value::Object(o) => {
            let primitive = engine
                .get_object(o.id)
                .and_then(|obj| obj.borrow().primitive_value.clone());
            match primitive {
                Some(Value::Boolean(b)) => Ok(Some(b)),
                _ => Err(engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Boolean.prototype method called on incompatible receiver",
                )),
            }
        }
        _ => Err(engine.handle_recoverable_native_exception(
            ErrorKind::TypeError,
            "Boolean.prototype method called on incompatible receiver",
        )),
    }
}

impl Engine {
    pub(crate) fn setup_boolean_builtin(&mut self) {
        let proto = self.boolean_prototype.clone().unwrap();

        // §15.6.1 / §15.6.2
        self.define_constructor("Boolean", 1, &proto, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let b = to_boolean(args.first().unwrap_or(&Value::Undefined)).unwrap_or(false);
            if engine.is_construct_call() {
                if let Some(obj) = engine.resolve_object(this) {
                    let mut o = obj.borrow_mut();
                    o.class_name = "Boolean".to_string();
                    o.primitive_value = Some(Value::Boolean(b));
                    o.prototype = engine.boolean_prototype.clone();
                }
                return Completion::Normal(this.clone());
            }
            Completion::Normal(Value::Boolean(b))
        });

        // §15.6.4.2
        self.add_native(&proto, "toString", 0, |engine, this, _args| {
            match crate::tryc!(this_boolean(engine, this)) {
                Some(b) => Completion::Normal(Value::String(JsString::from_str(if b {
                    "true"
                } else {
                    "false"
                }))),
                None => engine.unknown_value(),
            }
        });

        // §15.6.4.3
        self.add_native(&proto, "valueOf", 0, |engine, this, _args| {
            match crate::tryc!(this_boolean(engine, this)) {
                Some(b) => Completion::Normal(Value::Boolean(b)),
                None => engine.unknown_value(),
            }
        });
    }
}
