//! The §15 standard library: global object and functions, prototypes and
//! constructors. Prototype objects are singletons shared by every
//! instance of their kind; constructors live on the global object.

mod array;
mod boolean;
mod date;
mod error;
mod function;
mod global;
mod json;
mod math;
mod number;
mod object;
mod regexp;
mod string;

use std::cell::RefCell;
use std::rc::Rc;

use crate::engine::types::*;
use crate::engine::{Engine, ErrorKind};
use crate::types::{JsString, Value};

pub(crate) fn setup(engine: &mut Engine) {
    // Bare prototype shells first; the chain hangs off Object.prototype.
    let object_proto = bare(engine, "Object", None);
    engine.object_prototype = Some(object_proto.clone());

    let function_proto = bare(engine, "Function", Some(object_proto.clone()));
    // Function.prototype is itself callable and returns undefined.
    function_proto.borrow_mut().callable = Some(JsFunction::native(
        String::new(),
        0,
        |_engine, _this, _args| Completion::Normal(Value::Undefined),
    ));
    engine.function_prototype = Some(function_proto);

    engine.array_prototype = Some(bare(engine, "Array", Some(object_proto.clone())));
    let string_proto = bare(engine, "String", Some(object_proto.clone()));
    string_proto.borrow_mut().primitive_value = Some(Value::String(JsString::from_str("")));
    engine.string_prototype = Some(string_proto);
    let number_proto = bare(engine, "Number", Some(object_proto.clone()));
    number_proto.borrow_mut().primitive_value = Some(Value::Number(0.0));
    engine.number_prototype = Some(number_proto);
    let boolean_proto = bare(engine, "Boolean", Some(object_proto.clone()));
    boolean_proto.borrow_mut().primitive_value = Some(Value::Boolean(false));
    engine.boolean_prototype = Some(boolean_proto);
    engine.date_prototype = Some(bare(engine, "Date", Some(object_proto.clone())));
    engine.regexp_prototype = Some(bare(engine, "RegExp", Some(object_proto.clone())));

    let error_proto = bare(engine, "Error", Some(object_proto.clone()));
    engine
        .error_prototypes
        .insert(ErrorKind::Error, error_proto.clone());
    for kind in [
        ErrorKind::EvalError,
        ErrorKind::RangeError,
        ErrorKind::ReferenceError,
        ErrorKind::SyntaxError,
        ErrorKind::TypeError,
        ErrorKind::UriError,
    ] {
        let proto = bare(engine, kind.as_str(), Some(error_proto.clone()));
        engine.error_prototypes.insert(kind, proto);
    }

    // The global object; its properties become the global scope.
    let global = bare(engine, "global", Some(object_proto));
    engine.set_global_object(global.clone());

    for (name, value) in [
        ("undefined", Value::Undefined),
        ("NaN", Value::Number(f64::NAN)),
        ("Infinity", Value::Number(f64::INFINITY)),
    ] {
        global.borrow_mut().properties.insert(
            name.to_string(),
            Property::new(PropertyDescriptor::data(value, false, false, false)),
        );
    }

    engine.setup_object_builtin();
    engine.setup_function_builtin();
    engine.setup_array_builtin();
    engine.setup_string_builtin();
    engine.setup_boolean_builtin();
    engine.setup_number_builtin();
    engine.setup_math_builtin();
    engine.setup_date_builtin();
    engine.setup_regexp_builtin();
    engine.setup_json_builtin();
    engine.setup_error_builtins();
    engine.setup_global_functions();
}

fn bare(engine: &mut Engine, class: &str, proto: Option<ObjRef>) -> ObjRef {
    let mut data = ObjectData::new();
    data.class_name = class.to_string();
    data.prototype = proto;
    let obj = Rc::new(RefCell::new(data));
    engine.allocate_object_slot(obj.clone());
    obj
}

/// True when the receiver or any argument is Unknown: the built-in must
/// then answer Unknown rather than compute a wrong concrete result.
pub(crate) fn has_unknown(this_val: &Value, args: &[Value]) -> bool {
    this_val.is_unknown() || args.iter().any(|a| a.is_unknown())
}

pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

impl Engine {
    pub(crate) fn set_global_object(&mut self, obj: ObjRef) {
        self.global_object = Some(obj);
    }

    /// Install a native method on a prototype or namespace object.
    pub(crate) fn add_native(
        &mut self,
        target: &ObjRef,
        name: &str,
        arity: usize,
        f: impl Fn(&mut Engine, &Value, &[Value]) -> Completion + 'static,
    ) {
        let val = self.create_function(JsFunction::native(name.to_string(), arity, f));
        target.borrow_mut().insert_builtin(name.to_string(), val);
    }

    /// Install a constructor: a native function whose `prototype` is the
    /// shared singleton, a `constructor` back-link, and a global binding.
    pub(crate) fn define_constructor(
        &mut self,
        name: &str,
        arity: usize,
        proto: &ObjRef,
        f: impl Fn(&mut Engine, &Value, &[Value]) -> Completion + 'static,
    ) -> Value {
        let ctor = self.create_function(JsFunction::native(name.to_string(), arity, f));
        if let Some(ctor_obj) = self.resolve_object(&ctor) {
            ctor_obj.borrow_mut().properties.insert(
                "prototype".to_string(),
                Property::new(PropertyDescriptor::data(
                    Engine::handle_of(proto),
                    false,
                    false,
                    false,
                )),
            );
        }
        proto
            .borrow_mut()
            .insert_builtin("constructor".to_string(), ctor.clone());
        self.global_object()
            .borrow_mut()
            .insert_builtin(name.to_string(), ctor.clone());
        ctor
    }

    /// The receiver's object id, after Unknown and coercibility checks.
    pub(crate) fn this_object_id(&mut self, this_val: &Value) -> Result<u64, Completion> {
        match this_val {
            Value::Object(o) => Ok(o.id),
            Value::Unknown => Err(self.unknown_value()),
            _ => {
                let boxed = match self.to_object(this_val) {
                    Completion::Normal(v) => v,
                    other => return Err(other),
                };
                match boxed {
                    Value::Object(o) => Ok(o.id),
                    _ => Err(self.unknown_value()),
                }
            }
        }
    }

    /// ToNumber an argument, with Err carrying the abrupt completion and
    /// Ok(None) meaning Unknown.
    pub(crate) fn number_arg(&mut self, val: &Value) -> Result<Option<f64>, Completion> {
        match self.to_number(val) {
            Completion::Normal(Value::Number(n)) => Ok(Some(n)),
            Completion::Normal(_) => Ok(None),
            other => Err(other),
        }
    }

    /// ToString an argument as a Rust string; Ok(None) means Unknown.
    pub(crate) fn string_arg(&mut self, val: &Value) -> Result<Option<String>, Completion> {
        match self.to_string_value(val) {
            Completion::Normal(Value::String(s)) => Ok(Some(s.to_rust_string())),
            Completion::Normal(_) => Ok(None),
            other => Err(other),
        }
    }

    /// ToString an argument preserving UTF-16; Ok(None) means Unknown.
    pub(crate) fn js_string_arg(&mut self, val: &Value) -> Result<Option<JsString>, Completion> {
        match self.to_string_value(val) {
            Completion::Normal(Value::String(s)) => Ok(Some(s)),
            Completion::Normal(_) => Ok(None),
            other => Err(other),
        }
    }
}
