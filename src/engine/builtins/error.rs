//! The Error constructor hierarchy, §15.11: Error plus the six native
//! error kinds, sharing one toString on Error.prototype.

use super::{arg, has_unknown};
use crate::engine::types::*;
use crate::engine::{Engine, ErrorKind};
use crate::tryc;
use crate::types::{JsString, Value};

impl Engine {
    pub(crate) fn setup_error_builtins(&mut self) {
        let error_proto = self.error_prototypes.get(&ErrorKind::Error).unwrap().clone();

        error_proto.borrow_mut().insert_builtin(
            "name".to_string(),
            Value::String(JsString::from_str("Error")),
        );
        error_proto.borrow_mut().insert_builtin(
            "message".to_string(),
            Value::String(JsString::from_str("")),
        );

        // §15.11.4.4
        self.add_native(&error_proto, "toString", 0, |engine, this, _args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            let id = tryc!(engine.this_object_id(this));
            let name = match engine.object_get(id, "name") {
                Completion::Normal(Value::Undefined) => "Error".to_string(),
                Completion::Normal(v) => {
                    let Some(s) = tryc!(engine.string_arg(&v)) else {
                        return engine.unknown_value();
                    };
                    s
                }
                other => return other,
            };
            let message = match engine.object_get(id, "message") {
                Completion::Normal(Value::Undefined) => String::new(),
                Completion::Normal(v) => {
                    let Some(s) = tryc!(engine.string_arg(&v)) else {
                        return engine.unknown_value();
                    };
                    s
                }
                other => return other,
            };
            let rendered = if message.is_empty() {
                name
            } else if name.is_empty() {
                message
            } else {
                format!("{name}: {message}")
            };
            Completion::Normal(Value::String(JsString::from_str(&rendered)))
        });

        self.install_error_constructor(ErrorKind::Error);
        for kind in [
            ErrorKind::EvalError,
            ErrorKind::RangeError,
            ErrorKind::ReferenceError,
            ErrorKind::SyntaxError,
            ErrorKind::TypeError,
            ErrorKind::UriError,
        ] {
            let proto = self.error_prototypes.get(&kind).unwrap().clone();
            proto.borrow_mut().insert_builtin(
                "name".to_string(),
                Value::String(JsString::from_str(kind.as_str())),
            );
            proto.borrow_mut().insert_builtin(
                "message".to_string(),
                Value::String(JsString::from_str("")),
            );
            self.install_error_constructor(kind);
        }
    }

    /// §15.11.1 / §15.11.2: called or constructed, the result is a fresh
    /// error whose class names its kind.
    fn install_error_constructor(&mut self, kind: ErrorKind) {
        let proto = self.error_prototypes.get(&kind).unwrap().clone();
        self.define_constructor(kind.as_str(), 1, &proto, move |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let message = match &arg(args, 0) {
                Value::Undefined => None,
                v => {
                    let Some(s) = tryc!(engine.string_arg(v)) else {
                        return engine.unknown_value();
                    };
                    Some(s)
                }
            };
            let target = if engine.is_construct_call() {
                engine.resolve_object(this)
            } else {
                None
            };
            let obj = match target {
                Some(obj) => {
                    let mut b = obj.borrow_mut();
                    b.class_name = kind.as_str().to_string();
                    b.prototype = engine.error_prototypes.get(&kind).cloned();
                    drop(b);
                    obj
                }
                None => {
                    let obj = engine.create_bare_object();
                    let mut b = obj.borrow_mut();
                    b.class_name = kind.as_str().to_string();
                    b.prototype = engine.error_prototypes.get(&kind).cloned();
                    drop(b);
                    obj
                }
            };
            if let Some(message) = message {
                obj.borrow_mut().insert_builtin(
                    "message".to_string(),
                    Value::String(JsString::from_str(&message)),
                );
            }
            Completion::Normal(Engine::handle_of(&obj))
        });
    }
}
