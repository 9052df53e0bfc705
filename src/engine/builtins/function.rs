//! The Function constructor and prototype, §15.3.

use super::{arg, has_unknown};
use crate::engine::types::*;
use crate::engine::{Engine, ErrorKind};
use crate::tryc;
use crate::types::{JsString, Value};

impl Engine {
    pub(crate) fn setup_function_builtin(&mut self) {
        let proto = self.function_prototype.clone().unwrap();

        // §15.3.2.1 — assemble and parse a function from source text.
        self.define_constructor("Function", 1, &proto, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let mut params = Vec::new();
            for param_arg in &args[..args.len().saturating_sub(1)] {
                let Some(p) = tryc!(engine.string_arg(param_arg)) else {
                    return engine.unknown_value();
                };
                params.push(p);
            }
            let body = match args.last() {
                Some(b) => {
                    let Some(s) = tryc!(engine.string_arg(b)) else {
                        return engine.unknown_value();
                    };
                    s
                }
                None => String::new(),
            };
            let source = format!("function anonymous({}) {{\n{}\n}}", params.join(", "), body);
            let program = match crate::parser::parse_string(&source, None) {
                Ok(p) => p,
                Err(err) => {
                    return engine.handle_recoverable_native_exception(
                        ErrorKind::SyntaxError,
                        &err.message,
                    );
                }
            };
            let Some(crate::ast::StatementKind::FunctionDeclaration(func)) =
                program.body.first().map(|s| &s.kind)
            else {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::SyntaxError,
                    "Malformed function body",
                );
            };
            // Functions created this way close over the global scope.
            let global_env = engine.global_env();
            let mut func = func.clone();
            func.name = None;
            Completion::Normal(engine.instantiate_function(&func, &global_env))
        });

        // §15.3.4.2
        self.add_native(&proto, "toString", 0, |engine, this, _args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            let Some(obj) = engine.resolve_object(this) else {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Function.prototype.toString called on non-function",
                );
            };
            let callable = obj.borrow().callable.clone();
            let Some(func) = callable else {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Function.prototype.toString called on non-function",
                );
            };
            let rendered = match &func {
                JsFunction::User { name, params, .. } => format!(
                    "function {}({}) {{ [analysed code] }}",
                    name.as_deref().unwrap_or(""),
                    params.join(", ")
                ),
                JsFunction::Native(name, _, _) => {
                    format!("function {name}() {{ [native code] }}")
                }
            };
            Completion::Normal(Value::String(JsString::from_str(&rendered)))
        });

        // §15.3.4.3
        self.add_native(&proto, "apply", 2, |engine, this, args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            if !engine.is_callable_value(this) {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Function.prototype.apply called on non-function",
                );
            }
            let this_arg = arg(args, 0);
            let arg_array = arg(args, 1);
            let call_args = match &arg_array {
                Value::Undefined | Value::Null => Vec::new(),
                Value::Unknown => return engine.unknown_value(),
                Value::Object(o) => {
                    let length = match engine.object_get(o.id, "length") {
                        Completion::Normal(v) => v,
                        other => return other,
                    };
                    let Some(n) = tryc!(engine.number_arg(&length)) else {
                        return engine.unknown_value();
                    };
                    let count = crate::engine::conversions::to_integer(n).max(0.0) as usize;
                    let mut out = Vec::with_capacity(count.min(1 << 16));
                    for i in 0..count.min(1 << 16) {
                        match engine.object_get(o.id, &i.to_string()) {
                            Completion::Normal(v) => out.push(v),
                            other => return other,
                        }
                    }
                    out
                }
                _ => {
                    return engine.handle_recoverable_native_exception(
                        ErrorKind::TypeError,
                        "CreateListFromArrayLike called on non-object",
                    );
                }
            };
            engine.call_function(this, &this_arg, &call_args, true)
        });

        // §15.3.4.4
        self.add_native(&proto, "call", 1, |engine, this, args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            if !engine.is_callable_value(this) {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Function.prototype.call called on non-function",
                );
            }
            let this_arg = arg(args, 0);
            let rest = if args.is_empty() { &[] } else { &args[1..] };
            engine.call_function(this, &this_arg, rest, true)
        });

        // §15.3.4.5 — the bound function forwards to the target with the
        // fixed receiver and partial arguments.
        self.add_native(&proto, "bind", 1, |engine, this, args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            if !engine.is_callable_value(this) {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "Function.prototype.bind called on non-function",
                );
            }
            let target = this.clone();
            let bound_this = arg(args, 0);
            let bound_args: Vec<Value> = if args.is_empty() {
                Vec::new()
            } else {
                args[1..].to_vec()
            };
            let bound = JsFunction::native(
                "bound".to_string(),
                0,
                move |engine: &mut Engine, _this: &Value, call_args: &[Value]| {
                    let mut all = bound_args.clone();
                    all.extend_from_slice(call_args);
                    engine.call_function(&target, &bound_this, &all, true)
                },
            );
            Completion::Normal(engine.create_function(bound))
        });
    }
}
