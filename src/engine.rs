//! The analysis engine: an abstract ES5.1 interpreter that executes a
//! parsed program to the extent statically knowable, tolerating branches
//! whose runtime outcome is indeterminate.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::ast::Program;
use crate::parser;
use crate::types::{JsString, Value};

/// Unwrap a `Result<T, Completion>`, propagating the abrupt completion.
#[macro_export]
macro_rules! tryc {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(comp) => return comp,
        }
    };
}

pub mod types;
pub mod events;
pub mod builtins;
pub mod context;
pub mod conversions;
pub mod eval;
pub mod exec;
pub mod object_ops;
pub mod reference;

pub use context::ExecutionContext;
pub use events::{AnalysisEvent, Diagnostic, EventListener, Report};
pub use types::{
    Binding, Completion, EnvRef, JsFunction, LexicalEnvironment, NativeFn, ObjRef, ObjectData,
    Property, PropertyDescriptor, Reference, ReferenceBase, RefOrValue,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Error,
    EvalError,
    RangeError,
    ReferenceError,
    SyntaxError,
    TypeError,
    UriError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::EvalError => "EvalError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::UriError => "URIError",
        }
    }
}

#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// Forbid Unknown values entirely; the engine behaves as a strict
    /// interpreter and any ambiguity aborts the analysis.
    pub exact_mode: bool,
    /// When false, most function calls return Unknown without executing
    /// the callee body (the body is still scanned in skipped mode).
    pub invoke_methods: bool,
    /// When true, recoverable native exceptions are reported as
    /// diagnostics and replaced by Unknown instead of being thrown.
    pub native_exception_recovery: bool,
    /// Call-recursion depth bound before the analysis unrolls.
    pub max_recursion_limit: u32,
    /// Loop iteration bound before a loop is declared ambiguous.
    pub max_cycles: u32,
    /// Files never processed in skipped mode.
    pub skipped_mode_blacklist: Vec<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            exact_mode: false,
            invoke_methods: true,
            native_exception_recovery: true,
            max_recursion_limit: 500,
            max_cycles: 200_000,
            skipped_mode_blacklist: Vec::new(),
        }
    }
}

/// A plugin-registered replacement for calls whose fully qualified name
/// (e.g. `App.Logger.debug`) matches the pattern.
pub struct FunctionOverride {
    pub pattern: regex::Regex,
    pub call: NativeFn,
}

pub struct Engine {
    pub options: EngineOptions,
    global_env: EnvRef,
    global_object: Option<ObjRef>,
    objects: Vec<Option<ObjRef>>,
    free_list: Vec<usize>,
    pub(crate) contexts: Vec<ExecutionContext>,

    // Prototype singletons, built once by init and shared by every
    // instance of their kind.
    pub(crate) object_prototype: Option<ObjRef>,
    pub(crate) function_prototype: Option<ObjRef>,
    pub(crate) array_prototype: Option<ObjRef>,
    pub(crate) string_prototype: Option<ObjRef>,
    pub(crate) number_prototype: Option<ObjRef>,
    pub(crate) boolean_prototype: Option<ObjRef>,
    pub(crate) date_prototype: Option<ObjRef>,
    pub(crate) regexp_prototype: Option<ObjRef>,
    pub(crate) error_prototypes: HashMap<ErrorKind, ObjRef>,

    ambiguous_depth: u32,
    skipped_stack: Vec<u64>,
    next_skipped_id: u64,
    skipped_blacklist: HashSet<String>,
    try_catch_depth: u32,
    pub(crate) call_depth: u32,
    /// Set by `construct` for the immediately following call so native
    /// constructors can distinguish `new F()` from `F()`.
    pub(crate) pending_construct: bool,
    /// The engine-thrown exception currently unwinding, if any.
    exception: Option<Value>,

    listeners: Vec<Box<dyn EventListener>>,
    pub(crate) overrides: Vec<FunctionOverride>,
    report: Report,
    current_file: Option<String>,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        let placeholder_env = LexicalEnvironment::new_declarative(None, 0);
        let blacklist = options.skipped_mode_blacklist.iter().cloned().collect();
        let mut engine = Engine {
            options,
            global_env: placeholder_env,
            global_object: None,
            objects: Vec::new(),
            free_list: Vec::new(),
            contexts: Vec::new(),
            object_prototype: None,
            function_prototype: None,
            array_prototype: None,
            string_prototype: None,
            number_prototype: None,
            boolean_prototype: None,
            date_prototype: None,
            regexp_prototype: None,
            error_prototypes: HashMap::new(),
            ambiguous_depth: 0,
            skipped_stack: Vec::new(),
            next_skipped_id: 1,
            skipped_blacklist: blacklist,
            try_catch_depth: 0,
            call_depth: 0,
            pending_construct: false,
            exception: None,
            listeners: Vec::new(),
            overrides: Vec::new(),
            report: Report::default(),
            current_file: None,
        };
        engine.init();
        engine
    }

    fn init(&mut self) {
        builtins::setup(self);
        let global_obj = self
            .global_object
            .clone()
            .expect("init built no global object");
        self.global_env = LexicalEnvironment::new_object(global_obj, true, None, 0);
    }

    pub fn global_env(&self) -> EnvRef {
        self.global_env.clone()
    }

    pub fn global_object(&self) -> ObjRef {
        self.global_object.clone().expect("engine not initialised")
    }

    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub fn register_override(&mut self, pattern: regex::Regex, call: NativeFn) {
        self.overrides.push(FunctionOverride { pattern, call });
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    // Object allocation

    pub(crate) fn allocate_object_slot(&mut self, obj: ObjRef) -> u64 {
        let id = if let Some(idx) = self.free_list.pop() {
            self.objects[idx] = Some(obj.clone());
            idx as u64
        } else {
            let idx = self.objects.len();
            self.objects.push(Some(obj.clone()));
            idx as u64
        };
        obj.borrow_mut().id = Some(id);
        id
    }

    pub fn get_object(&self, id: u64) -> Option<ObjRef> {
        self.objects.get(id as usize).and_then(|slot| slot.clone())
    }

    pub fn resolve_object(&self, val: &Value) -> Option<ObjRef> {
        if let Value::Object(o) = val {
            self.get_object(o.id)
        } else {
            None
        }
    }

    pub(crate) fn handle_of(obj: &ObjRef) -> Value {
        let id = obj.borrow().id.expect("object not in slot table");
        Value::Object(crate::types::ObjectHandle { id })
    }

    pub fn create_object(&mut self) -> ObjRef {
        let mut data = ObjectData::new();
        data.prototype = self.object_prototype.clone();
        data.ambient_at_creation = self.ambiguous_depth;
        let obj = Rc::new(std::cell::RefCell::new(data));
        self.allocate_object_slot(obj.clone());
        obj
    }

    pub fn create_bare_object(&mut self) -> ObjRef {
        let mut data = ObjectData::new();
        data.ambient_at_creation = self.ambiguous_depth;
        let obj = Rc::new(std::cell::RefCell::new(data));
        self.allocate_object_slot(obj.clone());
        obj
    }

    pub fn create_array(&mut self, elements: Vec<Value>) -> Value {
        let obj = self.create_bare_object();
        {
            let mut o = obj.borrow_mut();
            o.prototype = self.array_prototype.clone();
            o.class_name = "Array".to_string();
            o.properties.insert(
                "length".to_string(),
                Property::new(PropertyDescriptor::data(
                    Value::Number(elements.len() as f64),
                    true,
                    false,
                    false,
                )),
            );
            for (i, val) in elements.into_iter().enumerate() {
                o.insert_value(i.to_string(), val);
            }
        }
        Engine::handle_of(&obj)
    }

    pub(crate) fn create_wrapper_object(&mut self, class: &str, primitive: Value) -> Value {
        let obj = self.create_bare_object();
        {
            let mut o = obj.borrow_mut();
            o.class_name = class.to_string();
            o.prototype = match class {
                "String" => self.string_prototype.clone(),
                "Number" => self.number_prototype.clone(),
                "Boolean" => self.boolean_prototype.clone(),
                _ => self.object_prototype.clone(),
            };
            o.primitive_value = Some(primitive);
        }
        Engine::handle_of(&obj)
    }

    pub fn create_function(&mut self, func: JsFunction) -> Value {
        let is_user = matches!(func, JsFunction::User { .. });
        let (fn_name, fn_length) = match &func {
            JsFunction::User { name, params, .. } => {
                (name.clone().unwrap_or_default(), params.len())
            }
            JsFunction::Native(name, arity, _) => (name.clone(), *arity),
        };
        let obj = self.create_bare_object();
        {
            let mut o = obj.borrow_mut();
            o.prototype = self.function_prototype.clone();
            o.class_name = "Function".to_string();
            o.callable = Some(func);
            o.properties.insert(
                "length".to_string(),
                Property::new(PropertyDescriptor::data(
                    Value::Number(fn_length as f64),
                    false,
                    false,
                    false,
                )),
            );
            o.properties.insert(
                "name".to_string(),
                Property::new(PropertyDescriptor::data(
                    Value::String(JsString::from_str(&fn_name)),
                    false,
                    false,
                    true,
                )),
            );
        }
        let func_val = Engine::handle_of(&obj);
        // User functions get a fresh prototype object with a constructor
        // back-link; built-ins install theirs explicitly.
        if is_user {
            let proto = self.create_object();
            proto
                .borrow_mut()
                .insert_builtin("constructor".to_string(), func_val.clone());
            obj.borrow_mut().properties.insert(
                "prototype".to_string(),
                Property::new(PropertyDescriptor::data(
                    Engine::handle_of(&proto),
                    true,
                    false,
                    false,
                )),
            );
        }
        func_val
    }

    pub fn create_error(&mut self, kind: ErrorKind, message: &str) -> Value {
        let obj = self.create_bare_object();
        {
            let mut o = obj.borrow_mut();
            o.class_name = kind.as_str().to_string();
            o.prototype = self.error_prototypes.get(&kind).cloned();
            o.insert_builtin(
                "message".to_string(),
                Value::String(JsString::from_str(message)),
            );
        }
        Engine::handle_of(&obj)
    }

    // Ambiguous-mode bookkeeping

    pub fn enter_ambiguous_block(&mut self) {
        self.ambiguous_depth += 1;
        if let Some(ctx) = self.contexts.last_mut() {
            ctx.ambiguous_block += 1;
        }
    }

    pub fn exit_ambiguous_block(&mut self) {
        assert!(self.ambiguous_depth > 0, "ambiguous block underflow");
        self.ambiguous_depth -= 1;
        if let Some(ctx) = self.contexts.last_mut() {
            assert!(ctx.ambiguous_block > 0, "ambiguous block underflow");
            ctx.ambiguous_block -= 1;
        }
    }

    pub fn in_ambiguous_block(&self) -> bool {
        self.ambiguous_depth > 0
    }

    pub fn ambiguous_depth(&self) -> u32 {
        self.ambiguous_depth
    }

    /// A write to a target created at `target_ambient` escapes its birth
    /// scope when the current ambiguity is deeper; such writes degrade to
    /// Unknown.
    pub(crate) fn is_escaping_write(&self, target_ambient: u32) -> bool {
        self.ambiguous_depth > target_ambient
    }

    // Skipped mode

    pub fn in_skipped_mode(&self) -> bool {
        !self.skipped_stack.is_empty()
    }

    pub(crate) fn skipped_section(&self) -> Option<u64> {
        self.skipped_stack.last().copied()
    }

    /// Run `f` speculatively: a fresh skipped-section id is pushed, writes
    /// are diverted to alternate-value slots, and exceptions other than
    /// the engine's own unroll signal are swallowed.
    pub fn process_in_skipped_mode<F>(&mut self, f: F) -> Completion
    where
        F: FnOnce(&mut Engine) -> Completion,
    {
        if let Some(file) = &self.current_file {
            if self.skipped_blacklist.contains(file) {
                return Completion::Normal(Value::Undefined);
            }
        }
        let id = self.next_skipped_id;
        self.next_skipped_id += 1;
        self.skipped_stack.push(id);
        let result = f(self);
        self.skipped_stack.pop();
        match result {
            Completion::Unroll => Completion::Unroll,
            _ => Completion::Normal(Value::Undefined),
        }
    }

    /// Produce an Unknown value, or abort the analysis in exact mode
    /// where no Unknown may ever be constructed.
    pub fn unknown_value(&mut self) -> Completion {
        if self.options.exact_mode {
            let stack = self.capture_stack_trace();
            self.emit(AnalysisEvent::ErrorReported {
                kind: "ExactModeViolation".to_string(),
                message: "encountered a statically indeterminate value in exact mode".to_string(),
                stack_trace: stack,
            });
            Completion::Unroll
        } else {
            Completion::Normal(Value::Unknown)
        }
    }

    // Exceptions

    pub fn in_try_catch(&self) -> bool {
        self.try_catch_depth > 0
    }

    pub(crate) fn enter_try_catch(&mut self) {
        self.try_catch_depth += 1;
    }

    pub(crate) fn exit_try_catch(&mut self) {
        assert!(self.try_catch_depth > 0, "try-catch counter underflow");
        self.try_catch_depth -= 1;
    }

    pub fn current_exception(&self) -> Option<&Value> {
        self.exception.as_ref()
    }

    pub(crate) fn clear_exception(&mut self) {
        self.exception = None;
    }

    pub fn throw_native_exception(&mut self, kind: ErrorKind, message: &str) -> Completion {
        let err = self.create_error(kind, message);
        self.exception = Some(err.clone());
        Completion::Throw(err)
    }

    /// A recoverable program error: reported and replaced by Unknown in
    /// recovery mode, a real throw in exact mode or when the program has
    /// a try/catch in flight that should see it.
    pub fn handle_recoverable_native_exception(
        &mut self,
        kind: ErrorKind,
        message: &str,
    ) -> Completion {
        if self.options.exact_mode || !self.options.native_exception_recovery || self.in_try_catch()
        {
            return self.throw_native_exception(kind, message);
        }
        // Speculative evaluation swallows its failures silently; only
        // real execution paths produce diagnostics.
        if !self.in_skipped_mode() {
            let stack = self.capture_stack_trace();
            self.emit(AnalysisEvent::ErrorReported {
                kind: kind.as_str().to_string(),
                message: message.to_string(),
                stack_trace: stack,
            });
        }
        Completion::Normal(Value::Unknown)
    }

    pub fn report_warning(&mut self, kind: &str, message: &str) {
        if self.in_skipped_mode() {
            return;
        }
        let stack = self.capture_stack_trace();
        self.emit(AnalysisEvent::WarningReported {
            kind: kind.to_string(),
            message: message.to_string(),
            stack_trace: stack,
        });
    }

    pub(crate) fn capture_stack_trace(&self) -> Vec<String> {
        self.contexts
            .iter()
            .rev()
            .map(|ctx| {
                let name = ctx
                    .function_name
                    .as_deref()
                    .unwrap_or(if ctx.is_function_context {
                        "<anonymous>"
                    } else {
                        "<global>"
                    });
                match &ctx.loc {
                    Some(loc) => format!("{name} ({loc})"),
                    None => name.to_string(),
                }
            })
            .collect()
    }

    // Events

    pub(crate) fn emit(&mut self, event: AnalysisEvent) {
        match &event {
            AnalysisEvent::ErrorReported {
                kind,
                message,
                stack_trace,
            } => self.report.errors.push(Diagnostic {
                kind: kind.clone(),
                message: message.clone(),
                stack_trace: stack_trace.clone(),
            }),
            AnalysisEvent::WarningReported {
                kind,
                message,
                stack_trace,
            } => self.report.warnings.push(Diagnostic {
                kind: kind.clone(),
                message: message.clone(),
                stack_trace: stack_trace.clone(),
            }),
            AnalysisEvent::EnteredFile { filename } => {
                self.report.entered_files.push(filename.clone());
            }
            _ => {}
        }
        if self.listeners.is_empty() {
            return;
        }
        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in listeners.iter_mut() {
            listener.on_event(self, &event);
        }
        self.listeners.append(&mut listeners);
    }

    // Entry points

    /// Parse and analyse a source file; the collected report survives the
    /// run and accumulates across runs on the same engine.
    pub fn process_source(&mut self, source: &str, filename: Option<&str>) -> Completion {
        match parser::parse_string(source, filename) {
            Ok(program) => self.process_program(&program, filename),
            Err(err) => {
                self.handle_recoverable_native_exception(ErrorKind::SyntaxError, &err.message)
            }
        }
    }

    pub fn process_program(&mut self, program: &Program, filename: Option<&str>) -> Completion {
        if let Some(file) = filename {
            self.current_file = Some(file.to_string());
            self.emit(AnalysisEvent::EnteredFile {
                filename: file.to_string(),
            });
        }

        let global_env = self.global_env.clone();
        let this = Engine::handle_of(&self.global_object());
        self.push_context(ExecutionContext {
            lexical_environment: global_env.clone(),
            variable_environment: global_env.clone(),
            this_binding: this,
            strict: program.strict,
            ambiguous_block: 0,
            is_function_context: false,
            return_is_unknown: false,
            function_name: None,
            loc: None,
            constructing: false,
        });

        self.hoist_declarations(&program.body, &global_env, program.strict);
        let result = self.exec_statements(&program.body, &global_env);
        self.pop_context();

        match result {
            Completion::Throw(err) => {
                let message = self.describe_thrown_value(&err);
                let stack = self.capture_stack_trace();
                self.emit(AnalysisEvent::ErrorReported {
                    kind: "UncaughtException".to_string(),
                    message,
                    stack_trace: stack,
                });
                Completion::Throw(err)
            }
            other => other,
        }
    }

    pub(crate) fn describe_thrown_value(&mut self, err: &Value) -> String {
        if let Some(obj) = self.resolve_object(err) {
            let b = obj.borrow();
            let name = b.class_name.clone();
            let msg = match b.get_property_value("message") {
                Some(Value::String(s)) => s.to_rust_string(),
                _ => String::new(),
            };
            if msg.is_empty() {
                name
            } else {
                format!("{name}: {msg}")
            }
        } else {
            format!("{err}")
        }
    }

    pub(crate) fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    pub(crate) fn set_current_file(&mut self, file: Option<String>) {
        self.current_file = file;
    }

    // Context stack

    pub(crate) fn push_context(&mut self, ctx: ExecutionContext) {
        self.contexts.push(ctx);
    }

    pub(crate) fn pop_context(&mut self) -> ExecutionContext {
        self.contexts.pop().expect("execution context stack underflow")
    }

    pub(crate) fn current_context(&self) -> &ExecutionContext {
        self.contexts.last().expect("no execution context")
    }

    pub(crate) fn current_context_mut(&mut self) -> &mut ExecutionContext {
        self.contexts.last_mut().expect("no execution context")
    }

    /// True inside a native constructor invoked via `new`.
    pub(crate) fn is_construct_call(&self) -> bool {
        self.contexts.last().map(|c| c.constructing).unwrap_or(false)
    }

    /// Seed a global binding before analysis; this is how drivers inject
    /// host namespaces (or explicit Unknowns) into the analysed program.
    pub fn define_global(&mut self, name: &str, value: Value) {
        self.global_object()
            .borrow_mut()
            .insert_value(name.to_string(), value);
    }

    /// Look up a global binding after analysis; test and plugin helper.
    pub fn global_value(&mut self, name: &str) -> Option<Value> {
        let global = self.global_object();
        let (id, has) = {
            let b = global.borrow();
            (b.id.unwrap(), b.properties.contains_key(name))
        };
        if has {
            match self.object_get(id, name) {
                Completion::Normal(v) => Some(v),
                _ => None,
            }
        } else {
            None
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn analyse(src: &str) -> Engine {
        let mut engine = Engine::new();
        engine.process_source(src, Some("test.js"));
        engine
    }

    fn number_global(engine: &mut Engine, name: &str) -> f64 {
        match engine.global_value(name) {
            Some(Value::Number(n)) => n,
            other => panic!("expected Number for '{name}', got {other:?}"),
        }
    }

    fn string_global(engine: &mut Engine, name: &str) -> String {
        match engine.global_value(name) {
            Some(Value::String(s)) => s.to_rust_string(),
            other => panic!("expected String for '{name}', got {other:?}"),
        }
    }

    #[test]
    fn constant_folding_through_variables() {
        let mut engine = analyse("var x = 1 + 2;");
        assert_eq!(number_global(&mut engine, "x"), 3.0);
        assert!(engine.report().errors.is_empty());
    }

    #[test]
    fn function_invocation_produces_result() {
        let mut engine = analyse("function f(a) { return a + 1; } var y = f(4);");
        assert_eq!(number_global(&mut engine, "y"), 5.0);
    }

    #[test]
    fn unknown_condition_processes_both_branches() {
        let mut engine = Engine::new();
        engine.define_global("someUnknown", Value::Unknown);
        engine.process_source(
            "if (someUnknown) { a = 1; } else { a = 2; } var b = a;",
            Some("test.js"),
        );
        assert!(matches!(engine.global_value("b"), Some(Value::Unknown)));
        // Both branches ran: the undeclared global exists (as Unknown)
        assert!(matches!(engine.global_value("a"), Some(Value::Unknown)));
        assert!(engine.report().errors.is_empty());
        assert_eq!(engine.ambiguous_depth(), 0);
    }

    #[test]
    fn non_writable_assignment_is_silent_outside_strict() {
        let mut engine = analyse(
            "var o = {}; Object.defineProperty(o, 'p', {value: 7, writable: false}); o.p = 8; var v = o.p;",
        );
        assert_eq!(number_global(&mut engine, "v"), 7.0);
        assert!(engine.report().errors.is_empty());
    }

    #[test]
    fn non_writable_assignment_reports_in_strict() {
        let mut engine = Engine::new();
        engine.process_source(
            "'use strict'; var o = {}; Object.defineProperty(o, 'p', {value: 7, writable: false}); o.p = 8;",
            Some("test.js"),
        );
        assert_eq!(engine.report().errors.len(), 1);
        assert_eq!(engine.report().errors[0].kind, "TypeError");
    }

    #[test]
    fn caught_type_error_exposes_name() {
        let mut engine = analyse("try { null.x; } catch (e) { var k = e.name; }");
        assert_eq!(string_global(&mut engine, "k"), "TypeError");
        assert!(engine.report().errors.is_empty());
    }

    #[test]
    fn sort_and_join_concrete_array() {
        let mut engine = analyse("var r = [3, 1, 2].sort().join('-');");
        assert_eq!(string_global(&mut engine, "r"), "1-2-3");
    }

    #[test]
    fn sort_with_unknown_element_poisons_indices() {
        let mut engine = Engine::new();
        engine.define_global("u", Value::Unknown);
        engine.process_source("var a = [3, 1, u].sort();", Some("test.js"));
        let Some(Value::Object(h)) = engine.global_value("a") else {
            panic!("expected array");
        };
        for i in 0..3 {
            match engine.object_get(h.id, &i.to_string()) {
                Completion::Normal(Value::Unknown) => {}
                other => panic!("expected Unknown at index {i}, got {other:?}"),
            }
        }
    }

    #[test]
    fn direct_eval_sees_caller_scope() {
        let mut engine = analyse("var n = 20; var z = eval('n + 2');");
        assert_eq!(number_global(&mut engine, "z"), 22.0);
    }

    #[test]
    fn eval_parse_failure_is_recoverable_syntax_error() {
        let mut engine = analyse("var z = eval('var = ;');");
        assert!(matches!(engine.global_value("z"), Some(Value::Unknown)));
        assert_eq!(engine.report().errors[0].kind, "SyntaxError");
    }

    #[test]
    fn json_round_trip() {
        let mut engine = analyse(
            r#"var s = JSON.stringify(JSON.parse('{"a":[1,2],"b":"x"}'));"#,
        );
        assert_eq!(string_global(&mut engine, "s"), r#"{"a":[1,2],"b":"x"}"#);
    }

    #[test]
    fn json_stringify_with_gap_and_replacer() {
        let mut engine = analyse(
            "var s = JSON.stringify({a: 1, b: 2}, ['a'], 2);",
        );
        assert_eq!(string_global(&mut engine, "s"), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn undeclared_assignment_creates_global_and_event() {
        let mut engine = analyse("undeclared = 5;");
        assert_eq!(number_global(&mut engine, "undeclared"), 5.0);
    }

    #[test]
    fn typeof_undeclared_is_undefined_without_error() {
        let mut engine = analyse("var t = typeof missingThing;");
        assert_eq!(string_global(&mut engine, "t"), "undefined");
        assert!(engine.report().errors.is_empty());
    }

    #[test]
    fn arguments_alias_named_formals() {
        let mut engine =
            analyse("function h(x) { arguments[0] = 9; return x; } var w = h(1);");
        assert_eq!(number_global(&mut engine, "w"), 9.0);
    }

    #[test]
    fn declined_invocation_yields_unknown() {
        let options = EngineOptions {
            invoke_methods: false,
            ..Default::default()
        };
        let mut engine = Engine::with_options(options);
        engine.process_source(
            "function f(a) { return a + 1; } var y = f(4);",
            Some("test.js"),
        );
        assert!(matches!(engine.global_value("y"), Some(Value::Unknown)));
    }

    #[test]
    fn math_random_is_unknown_outside_exact_mode() {
        let mut engine = analyse("var r = Math.random();");
        assert!(matches!(engine.global_value("r"), Some(Value::Unknown)));
    }

    #[test]
    fn exact_mode_computes_date_now() {
        let options = EngineOptions {
            exact_mode: true,
            ..Default::default()
        };
        let mut engine = Engine::with_options(options);
        engine.process_source("var t = Date.now();", Some("test.js"));
        match engine.global_value("t") {
            Some(Value::Number(n)) => assert!(n > 0.0),
            other => panic!("expected a real timestamp, got {other:?}"),
        }
    }

    #[test]
    fn recursion_limit_unrolls_and_reports() {
        let options = EngineOptions {
            max_recursion_limit: 16,
            ..Default::default()
        };
        let mut engine = Engine::with_options(options);
        engine.process_source("function r() { return r(); } r();", Some("test.js"));
        assert!(
            engine
                .report()
                .errors
                .iter()
                .any(|e| e.kind == "RecursionLimit")
        );
    }

    #[test]
    fn loop_limit_declares_loop_ambiguous() {
        let options = EngineOptions {
            max_cycles: 32,
            ..Default::default()
        };
        let mut engine = Engine::with_options(options);
        engine.process_source("var i = 0; while (true) { i = i + 1; }", Some("test.js"));
        assert!(
            engine
                .report()
                .warnings
                .iter()
                .any(|w| w.kind == "LoopLimitExceeded")
        );
        // The final value of i cannot be pinned down.
        assert!(matches!(engine.global_value("i"), Some(Value::Unknown)));
    }

    #[test]
    fn plugin_override_intercepts_qualified_call() {
        let mut engine = Engine::new();
        engine.process_source(
            "var App = { Logger: { debug: function (m) { return m; } } };",
            Some("setup.js"),
        );
        let hits = Rc::new(Cell::new(0u32));
        let seen = hits.clone();
        engine.register_override(
            regex::Regex::new(r"^App\.Logger\.debug$").unwrap(),
            Rc::new(move |_engine, _this, _args| {
                seen.set(seen.get() + 1);
                Completion::Normal(Value::Undefined)
            }),
        );
        engine.process_source("App.Logger.debug('hello'); App.Logger.debug('again');", Some("app.js"));
        assert_eq!(hits.get(), 2);
        assert_eq!(
            engine.report().entered_files,
            vec!["setup.js".to_string(), "app.js".to_string()]
        );
    }

    #[test]
    fn closures_capture_lexical_environment() {
        let mut engine = analyse(
            "function counter() { var n = 0; return function () { n = n + 1; return n; }; } \
             var c = counter(); c(); var second = c();",
        );
        assert_eq!(number_global(&mut engine, "second"), 2.0);
    }

    #[test]
    fn constructor_produces_instances() {
        let mut engine = analyse(
            "function Point(x, y) { this.x = x; this.y = y; } \
             Point.prototype.sum = function () { return this.x + this.y; }; \
             var p = new Point(3, 4); var s = p.sum(); var isP = p instanceof Point;",
        );
        assert_eq!(number_global(&mut engine, "s"), 7.0);
        assert!(matches!(
            engine.global_value("isP"),
            Some(Value::Boolean(true))
        ));
    }

    #[test]
    fn for_in_enumerates_own_properties() {
        let mut engine = analyse(
            "var o = {a: 1, b: 2}; var keys = ''; for (var k in o) { keys = keys + k; } ",
        );
        let keys = string_global(&mut engine, "keys");
        assert_eq!(keys, "ab");
    }

    #[test]
    fn skipped_mode_scans_remainder_after_return() {
        // The statements after an early return are still scanned so that
        // the API reference inside them is observed.
        let mut engine = Engine::new();
        engine.process_source(
            "var hits = 0; \
             function mark() { hits = hits + 1; } \
             function f() { return 1; mark(); } \
             var y = f();",
            Some("test.js"),
        );
        assert_eq!(number_global(&mut engine, "y"), 1.0);
        // The write to hits happened only speculatively.
        assert_eq!(number_global(&mut engine, "hits"), 0.0);
    }

    #[test]
    fn string_wrapper_character_access() {
        let mut engine = analyse("var s = 'hello'; var c = s.charAt(1); var i = s[1];");
        assert_eq!(string_global(&mut engine, "c"), "e");
        assert_eq!(string_global(&mut engine, "i"), "e");
    }

    #[test]
    fn catch_with_unknown_trigger_runs_in_skipped_mode() {
        let mut engine = Engine::new();
        engine.define_global("mystery", Value::Unknown);
        engine.process_source(
            "var flag = 0; try { throw mystery; } catch (e) { flag = 1; }",
            Some("test.js"),
        );
        // The handler ran speculatively; the primary value is untouched.
        assert_eq!(number_global(&mut engine, "flag"), 0.0);
    }
}
