//! Execution contexts (§10.3), declaration hoisting (§10.5) and the
//! arguments object (§10.6).

use std::collections::HashMap;

use crate::ast::{
    ForInLeft, ForInit, FunctionNode, SourceLocation, Statement, StatementKind, VarKind,
};
use crate::engine::types::*;
use crate::engine::{Engine, ErrorKind};
use crate::types::Value;

pub struct ExecutionContext {
    pub lexical_environment: EnvRef,
    pub variable_environment: EnvRef,
    pub this_binding: Value,
    pub strict: bool,
    /// Nesting count of ambiguous blocks opened inside this context.
    pub ambiguous_block: u32,
    pub is_function_context: bool,
    /// Set when a return value inside this context depended on Unknown;
    /// an ambiguous call site then surfaces Unknown as the call result.
    pub return_is_unknown: bool,
    pub function_name: Option<String>,
    pub loc: Option<SourceLocation>,
    /// True on a native constructor's context during `new F(…)`.
    pub constructing: bool,
}

/// The declarations a code unit hoists before any statement runs.
#[derive(Default)]
pub struct HoistedDeclarations {
    pub functions: Vec<FunctionNode>,
    pub variables: Vec<String>,
    pub constants: Vec<String>,
}

/// Walk a statement list for function declarations and var declarations,
/// without descending into nested function bodies.
pub fn collect_declarations(body: &[Statement]) -> HoistedDeclarations {
    let mut out = HoistedDeclarations::default();
    collect_into(body, &mut out);
    out
}

fn collect_into(body: &[Statement], out: &mut HoistedDeclarations) {
    for stmt in body {
        collect_statement(stmt, out);
    }
}

fn collect_statement(stmt: &Statement, out: &mut HoistedDeclarations) {
    match &stmt.kind {
        StatementKind::FunctionDeclaration(f) => out.functions.push(f.clone()),
        StatementKind::Variable(decl) => {
            let names = decl.declarations.iter().map(|d| d.name.clone());
            if decl.kind == VarKind::Const {
                out.constants.extend(names);
            } else {
                out.variables.extend(names);
            }
        }
        StatementKind::Block(stmts) => collect_into(stmts, out),
        StatementKind::If(s) => {
            collect_statement(&s.consequent, out);
            if let Some(alt) = &s.alternate {
                collect_statement(alt, out);
            }
        }
        StatementKind::While(s) => collect_statement(&s.body, out),
        StatementKind::DoWhile(s) => collect_statement(&s.body, out),
        StatementKind::For(s) => {
            if let Some(ForInit::Variable(decl)) = &s.init {
                let names = decl.declarations.iter().map(|d| d.name.clone());
                if decl.kind == VarKind::Const {
                    out.constants.extend(names);
                } else {
                    out.variables.extend(names);
                }
            }
            collect_statement(&s.body, out);
        }
        StatementKind::ForIn(s) => {
            if let ForInLeft::Variable(decl) = &s.left {
                out.variables.push(decl.name.clone());
            }
            collect_statement(&s.body, out);
        }
        StatementKind::Try(s) => {
            collect_into(&s.block, out);
            if let Some(handler) = &s.handler {
                collect_into(&handler.body, out);
            }
            if let Some(finalizer) = &s.finalizer {
                collect_into(finalizer, out);
            }
        }
        StatementKind::Switch(s) => {
            for case in &s.cases {
                collect_into(&case.body, out);
            }
        }
        StatementKind::Labeled(_, inner) => collect_statement(inner, out),
        StatementKind::With(_, inner) => collect_statement(inner, out),
        _ => {}
    }
}

impl Engine {
    /// Declaration binding instantiation, §10.5: functions first, then
    /// variables not already bound, all against the variable environment.
    pub fn hoist_declarations(&mut self, body: &[Statement], env: &EnvRef, strict: bool) {
        let decls = collect_declarations(body);

        for func in &decls.functions {
            let name = func.name.clone().unwrap_or_default();
            let value = self.instantiate_function(func, env);

            // A pre-existing non-configurable, non-writable global of the
            // same name cannot be redeclared as a function.
            let blocked = match &env.borrow().record {
                EnvRecord::Object(rec) => rec
                    .binding_object
                    .borrow()
                    .get_own_property(&name)
                    .map(|desc| {
                        desc.configurable == Some(false)
                            && desc.is_data_descriptor()
                            && desc.writable == Some(false)
                    })
                    .unwrap_or(false),
                EnvRecord::Declarative(_) => false,
            };
            if blocked {
                self.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    &format!("Cannot redeclare non-configurable global '{name}'"),
                );
                continue;
            }

            if self.env_has_binding(env, &name) != Some(true) {
                self.env_create_mutable_binding(env, &name, false);
            }
            self.env_set_mutable_binding(env, &name, value, strict);
        }

        for name in &decls.variables {
            if self.env_has_binding(env, name) != Some(true) {
                self.env_create_mutable_binding(env, name, false);
            }
        }

        let declarative = matches!(env.borrow().record, EnvRecord::Declarative(_));
        for name in &decls.constants {
            if self.env_has_binding(env, name) != Some(true) {
                if declarative {
                    self.env_create_immutable_binding(env, name);
                } else {
                    self.env_create_mutable_binding(env, name, false);
                }
            }
        }
    }

    /// Build a Function value from its AST node and the environment it
    /// closes over.
    pub fn instantiate_function(&mut self, func: &FunctionNode, closure: &EnvRef) -> Value {
        self.create_function(JsFunction::User {
            name: func.name.clone(),
            params: func.params.clone(),
            body: func.body.clone(),
            closure: closure.clone(),
            strict: func.strict,
        })
    }

    /// The arguments object, §10.6. In non-strict functions numeric
    /// indices alias the named formals through the parameter map until an
    /// index's alias is broken; in strict functions `caller` and `callee`
    /// are poisoned accessors.
    pub fn create_arguments_object(
        &mut self,
        args: &[Value],
        callee: Value,
        strict: bool,
        func_env: &EnvRef,
        param_names: &[String],
    ) -> Value {
        let obj = self.create_object();
        {
            let mut o = obj.borrow_mut();
            o.class_name = "Arguments".to_string();
            o.properties.insert(
                "length".to_string(),
                Property::new(PropertyDescriptor::data(
                    Value::Number(args.len() as f64),
                    true,
                    false,
                    true,
                )),
            );
            for (i, val) in args.iter().enumerate() {
                o.insert_value(i.to_string(), val.clone());
            }
            if !strict {
                o.properties.insert(
                    "callee".to_string(),
                    Property::new(PropertyDescriptor::data(callee.clone(), true, false, true)),
                );
                let mut map = HashMap::new();
                for (i, name) in param_names.iter().enumerate() {
                    if i < args.len() {
                        map.insert(i.to_string(), (func_env.clone(), name.clone()));
                    }
                }
                if !map.is_empty() {
                    o.parameter_map = Some(map);
                }
            }
        }
        let result = Engine::handle_of(&obj);

        if strict {
            let thrower = self.create_poisoned_accessor();
            for name in ["caller", "callee"] {
                obj.borrow_mut().properties.insert(
                    name.to_string(),
                    Property::new(PropertyDescriptor::accessor(
                        Some(thrower.clone()),
                        Some(thrower.clone()),
                        false,
                        false,
                    )),
                );
            }
        }
        result
    }

    fn create_poisoned_accessor(&mut self) -> Value {
        self.create_function(JsFunction::native(
            "ThrowTypeError".to_string(),
            0,
            |engine: &mut Engine, _this: &Value, _args: &[Value]| {
                engine.throw_native_exception(
                    ErrorKind::TypeError,
                    "'caller' and 'callee' may not be accessed in strict mode",
                )
            },
        ))
    }

    /// Set up a function invocation context: fresh declarative
    /// environment over the closure, formals bound to arguments, the
    /// arguments object, then hoisting of the body's declarations.
    #[allow(clippy::too_many_arguments)]
    pub fn enter_function_context(
        &mut self,
        name: Option<String>,
        params: &[String],
        body: &[Statement],
        closure: &EnvRef,
        strict: bool,
        this_val: Value,
        args: &[Value],
        callee: Value,
        loc: Option<SourceLocation>,
    ) -> EnvRef {
        let func_env = LexicalEnvironment::new_declarative(
            Some(closure.clone()),
            self.ambiguous_depth(),
        );

        // §10.4.3: undefined/null this becomes the global object outside
        // strict mode; primitives are boxed.
        let this_binding = if strict {
            this_val
        } else {
            match this_val {
                Value::Undefined | Value::Null => Engine::handle_of(&self.global_object()),
                Value::Boolean(_) | Value::Number(_) | Value::String(_) => {
                    match self.to_object(&this_val) {
                        Completion::Normal(v) => v,
                        _ => Value::Undefined,
                    }
                }
                other => other,
            }
        };

        for (i, param) in params.iter().enumerate() {
            let val = args.get(i).cloned().unwrap_or(Value::Undefined);
            if self.env_has_binding(&func_env, param) != Some(true) {
                self.env_create_mutable_binding(&func_env, param, false);
            }
            self.env_set_mutable_binding(&func_env, param, val, strict);
        }

        if self.env_has_binding(&func_env, "arguments") != Some(true) {
            let arguments_obj =
                self.create_arguments_object(args, callee, strict, &func_env, params);
            self.env_create_mutable_binding(&func_env, "arguments", false);
            self.env_set_mutable_binding(&func_env, "arguments", arguments_obj, false);
        }

        self.push_context(ExecutionContext {
            lexical_environment: func_env.clone(),
            variable_environment: func_env.clone(),
            this_binding,
            strict,
            ambiguous_block: 0,
            is_function_context: true,
            return_is_unknown: false,
            function_name: name,
            loc,
            constructing: false,
        });

        self.hoist_declarations(body, &func_env, strict);
        func_env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_string;

    fn body_of(src: &str) -> Vec<Statement> {
        parse_string(src, None).unwrap().body
    }

    #[test]
    fn collects_vars_through_blocks_and_loops() {
        let body = body_of("var a; { var b; } for (var c = 0; c < 1; c++) { var d; }");
        let decls = collect_declarations(&body);
        assert_eq!(decls.variables, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn does_not_descend_into_nested_functions() {
        let body = body_of("function f() { var inner; } var outer;");
        let decls = collect_declarations(&body);
        assert_eq!(decls.functions.len(), 1);
        assert_eq!(decls.variables, vec!["outer"]);
    }

    #[test]
    fn collects_for_in_and_catch_vars() {
        let body = body_of("for (var k in o) {} try { var t; } catch (e) { var u; }");
        let decls = collect_declarations(&body);
        assert_eq!(decls.variables, vec!["k", "t", "u"]);
    }

    #[test]
    fn hoisting_binds_functions_and_vars() {
        let mut engine = Engine::new();
        let env = LexicalEnvironment::new_declarative(None, 0);
        let body = body_of("var x = 1; function f() { return 2; }");
        engine.hoist_declarations(&body, &env, false);
        assert_eq!(engine.env_has_binding(&env, "x"), Some(true));
        assert_eq!(engine.env_has_binding(&env, "f"), Some(true));
        // x is hoisted as undefined; its initialiser has not run
        match engine.env_get_binding_value(&env, "x", false, false) {
            Completion::Normal(Value::Undefined) => {}
            other => panic!("unexpected {other:?}"),
        }
        // f is already callable
        match engine.env_get_binding_value(&env, "f", false, false) {
            Completion::Normal(v) => assert!(engine.is_callable_value(&v)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn arguments_object_aliases_formals() {
        let mut engine = Engine::new();
        let env = LexicalEnvironment::new_declarative(None, 0);
        engine.env_create_mutable_binding(&env, "a", false);
        engine.env_set_mutable_binding(&env, "a", Value::Number(1.0), false);
        let args_obj = engine.create_arguments_object(
            &[Value::Number(1.0)],
            Value::Undefined,
            false,
            &env,
            &["a".to_string()],
        );
        let Value::Object(h) = args_obj else { unreachable!() };

        // Read through the alias
        match engine.object_get(h.id, "0") {
            Completion::Normal(Value::Number(n)) => assert_eq!(n, 1.0),
            other => panic!("unexpected {other:?}"),
        }
        // Write through the alias updates the binding
        engine.object_put(h.id, "0", Value::Number(5.0), false);
        match engine.env_get_binding_value(&env, "a", false, false) {
            Completion::Normal(Value::Number(n)) => assert_eq!(n, 5.0),
            other => panic!("unexpected {other:?}"),
        }
        // Defining a new descriptor over the index breaks the alias
        let desc = PropertyDescriptor::data(Value::Number(9.0), false, false, false);
        engine.object_define_own_property(h.id, "0", desc, false);
        engine.object_put(h.id, "0", Value::Number(11.0), false);
        match engine.env_get_binding_value(&env, "a", false, false) {
            Completion::Normal(Value::Number(n)) => assert_eq!(n, 9.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn strict_arguments_poisons_callee() {
        let mut engine = Engine::new();
        let env = LexicalEnvironment::new_declarative(None, 0);
        let args_obj =
            engine.create_arguments_object(&[], Value::Undefined, true, &env, &[]);
        let Value::Object(h) = args_obj else { unreachable!() };
        match engine.object_get(h.id, "callee") {
            Completion::Throw(err) => {
                let desc = engine.describe_thrown_value(&err);
                assert!(desc.starts_with("TypeError"));
            }
            other => panic!("expected throw, got {other:?}"),
        }
    }
}
