//! Statement evaluation (§12). Control flow gated on an Unknown value
//! enters ambiguous mode and processes every reachable body; loops are
//! additionally bounded by `max_cycles` before being declared ambiguous.

use crate::ast::*;
use crate::engine::conversions::{strict_equals, to_boolean};
use crate::engine::types::*;
use crate::engine::Engine;
use crate::types::Value;

impl Engine {
    pub fn exec_statements(&mut self, stmts: &[Statement], env: &EnvRef) -> Completion {
        let mut result = Value::Undefined;
        for stmt in stmts {
            let comp = self.exec_statement(stmt, env);
            match comp {
                Completion::Normal(val) => result = val,
                other => return other,
            }
        }
        Completion::Normal(result)
    }

    pub fn exec_statement(&mut self, stmt: &Statement, env: &EnvRef) -> Completion {
        self.exec_statement_labeled(stmt, env, None)
    }

    fn exec_statement_labeled(
        &mut self,
        stmt: &Statement,
        env: &EnvRef,
        label: Option<&str>,
    ) -> Completion {
        match &stmt.kind {
            StatementKind::Empty | StatementKind::Debugger => {
                Completion::Normal(Value::Undefined)
            }
            StatementKind::Expression(expr) => self.eval_expr(expr, env),
            StatementKind::Block(stmts) => self.exec_statements(stmts, env),
            StatementKind::Variable(decl) => self.exec_variable_declaration(decl, env),
            StatementKind::If(s) => self.exec_if(s, env),
            StatementKind::While(s) => self.exec_while(s, env, label),
            StatementKind::DoWhile(s) => self.exec_do_while(s, env, label),
            StatementKind::For(s) => self.exec_for(s, env, label),
            StatementKind::ForIn(s) => self.exec_for_in(s, env, label),
            StatementKind::Return(expr) => self.exec_return(expr.as_ref(), env),
            StatementKind::Break(label) => Completion::Break(label.clone()),
            StatementKind::Continue(label) => Completion::Continue(label.clone()),
            StatementKind::Throw(expr) => {
                let val = match self.eval_expr(expr, env) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                Completion::Throw(val)
            }
            StatementKind::Try(s) => self.exec_try(s, env),
            StatementKind::Switch(s) => self.exec_switch(s, env),
            StatementKind::Labeled(name, inner) => {
                let comp = self.exec_statement_labeled(inner, env, Some(name));
                match comp {
                    Completion::Break(Some(l)) if l == *name => {
                        Completion::Normal(Value::Undefined)
                    }
                    other => other,
                }
            }
            StatementKind::With(expr, body) => self.exec_with(expr, body, env),
            // Bound during hoisting
            StatementKind::FunctionDeclaration(_) => Completion::Normal(Value::Undefined),
        }
    }

    fn exec_variable_declaration(
        &mut self,
        decl: &VariableDeclaration,
        env: &EnvRef,
    ) -> Completion {
        for d in &decl.declarations {
            let Some(init) = &d.init else { continue };
            let value = match self.eval_expr(init, env) {
                Completion::Normal(v) => v,
                other => return other,
            };
            // Constants on a declarative record initialise the immutable
            // binding; on the global (object) record they behave as vars.
            let declarative_const = decl.kind == VarKind::Const
                && matches!(env.borrow().record, EnvRecord::Declarative(_));
            if declarative_const {
                self.env_initialize_immutable_binding(env, &d.name, value);
            } else {
                let strict = self.current_context().strict;
                let target = self.resolve_identifier(env, &d.name, strict);
                let result = self.put_value(&RefOrValue::Ref(target), value);
                if result.is_abrupt() {
                    return result;
                }
            }
        }
        Completion::Normal(Value::Undefined)
    }

    fn exec_return(&mut self, expr: Option<&Expression>, env: &EnvRef) -> Completion {
        let val = match expr {
            Some(e) => match self.eval_expr(e, env) {
                Completion::Normal(v) => v,
                other => return other,
            },
            None => Value::Undefined,
        };
        // A return reached under ambiguity may or may not execute, so the
        // enclosing call's result is indeterminate.
        if self.in_ambiguous_block() || val.is_unknown() {
            let ctx = self.current_context_mut();
            if ctx.is_function_context {
                ctx.return_is_unknown = true;
            }
        }
        Completion::Return(val)
    }

    fn exec_if(&mut self, s: &IfStatement, env: &EnvRef) -> Completion {
        let test = match self.eval_expr(&s.test, env) {
            Completion::Normal(v) => v,
            other => return other,
        };
        match to_boolean(&test) {
            Some(true) => self.exec_statement(&s.consequent, env),
            Some(false) => match &s.alternate {
                Some(alt) => self.exec_statement(alt, env),
                None => Completion::Normal(Value::Undefined),
            },
            None => {
                // Indeterminate condition: both branches are reachable,
                // so process both ambiguously.
                self.enter_ambiguous_block();
                let first = self.exec_statement(&s.consequent, env);
                if matches!(first, Completion::Unroll) {
                    self.exit_ambiguous_block();
                    return Completion::Unroll;
                }
                let second = match &s.alternate {
                    Some(alt) => self.exec_statement(alt, env),
                    None => Completion::Normal(Value::Undefined),
                };
                self.exit_ambiguous_block();
                if first.is_abrupt() {
                    first
                } else {
                    second
                }
            }
        }
    }

    /// Loop completion plumbing shared by every iteration statement.
    /// Returns Some(completion) when the loop must end with it, None to
    /// keep iterating.
    fn handle_loop_completion(
        comp: Completion,
        label: Option<&str>,
    ) -> Option<Option<Completion>> {
        match comp {
            Completion::Normal(_) => None,
            Completion::Break(None) => Some(None),
            Completion::Break(Some(l)) if Some(l.as_str()) == label => Some(None),
            Completion::Continue(None) => None,
            Completion::Continue(Some(l)) if Some(l.as_str()) == label => None,
            other => Some(Some(other)),
        }
    }

    /// Run a loop body once under ambiguity, for conditions that cannot
    /// be decided statically.
    fn exec_body_ambiguously(&mut self, body: &Statement, env: &EnvRef) -> Completion {
        self.enter_ambiguous_block();
        let comp = self.exec_statement(body, env);
        self.exit_ambiguous_block();
        match comp {
            Completion::Unroll => Completion::Unroll,
            Completion::Throw(e) => Completion::Throw(e),
            Completion::Return(v) => Completion::Return(v),
            _ => Completion::Normal(Value::Undefined),
        }
    }

    fn exec_while(&mut self, s: &WhileStatement, env: &EnvRef, label: Option<&str>) -> Completion {
        let mut iterations: u32 = 0;
        loop {
            let test = match self.eval_expr(&s.test, env) {
                Completion::Normal(v) => v,
                other => return other,
            };
            match to_boolean(&test) {
                Some(false) => return Completion::Normal(Value::Undefined),
                Some(true) => {
                    let comp = self.exec_statement(&s.body, env);
                    if let Some(result) = Self::handle_loop_completion(comp, label) {
                        return result.unwrap_or(Completion::Normal(Value::Undefined));
                    }
                }
                None => return self.exec_body_ambiguously(&s.body, env),
            }
            iterations += 1;
            if iterations >= self.options.max_cycles {
                self.report_warning(
                    "LoopLimitExceeded",
                    "loop exceeded the iteration bound and was declared ambiguous",
                );
                return self.exec_body_ambiguously(&s.body, env);
            }
        }
    }

    fn exec_do_while(
        &mut self,
        s: &DoWhileStatement,
        env: &EnvRef,
        label: Option<&str>,
    ) -> Completion {
        let mut iterations: u32 = 0;
        loop {
            let comp = self.exec_statement(&s.body, env);
            if let Some(result) = Self::handle_loop_completion(comp, label) {
                return result.unwrap_or(Completion::Normal(Value::Undefined));
            }
            let test = match self.eval_expr(&s.test, env) {
                Completion::Normal(v) => v,
                other => return other,
            };
            match to_boolean(&test) {
                Some(false) => return Completion::Normal(Value::Undefined),
                Some(true) => {}
                None => return self.exec_body_ambiguously(&s.body, env),
            }
            iterations += 1;
            if iterations >= self.options.max_cycles {
                self.report_warning(
                    "LoopLimitExceeded",
                    "loop exceeded the iteration bound and was declared ambiguous",
                );
                return self.exec_body_ambiguously(&s.body, env);
            }
        }
    }

    fn exec_for(&mut self, s: &ForStatement, env: &EnvRef, label: Option<&str>) -> Completion {
        match &s.init {
            Some(ForInit::Variable(decl)) => {
                let comp = self.exec_variable_declaration(decl, env);
                if comp.is_abrupt() {
                    return comp;
                }
            }
            Some(ForInit::Expression(expr)) => {
                let comp = self.eval_expr(expr, env);
                if comp.is_abrupt() {
                    return comp;
                }
            }
            None => {}
        }
        let mut iterations: u32 = 0;
        loop {
            if let Some(test) = &s.test {
                let test_val = match self.eval_expr(test, env) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                match to_boolean(&test_val) {
                    Some(false) => return Completion::Normal(Value::Undefined),
                    Some(true) => {}
                    None => return self.exec_body_ambiguously(&s.body, env),
                }
            }
            let comp = self.exec_statement(&s.body, env);
            if let Some(result) = Self::handle_loop_completion(comp, label) {
                return result.unwrap_or(Completion::Normal(Value::Undefined));
            }
            if let Some(update) = &s.update {
                let comp = self.eval_expr(update, env);
                if comp.is_abrupt() {
                    return comp;
                }
            }
            iterations += 1;
            if iterations >= self.options.max_cycles {
                self.report_warning(
                    "LoopLimitExceeded",
                    "loop exceeded the iteration bound and was declared ambiguous",
                );
                return self.exec_body_ambiguously(&s.body, env);
            }
        }
    }

    fn assign_for_in_target(
        &mut self,
        left: &ForInLeft,
        value: Value,
        env: &EnvRef,
    ) -> Completion {
        let strict = self.current_context().strict;
        match left {
            ForInLeft::Variable(decl) => {
                let target = self.resolve_identifier(env, &decl.name, strict);
                self.put_value(&RefOrValue::Ref(target), value)
            }
            ForInLeft::Expression(expr) => {
                let target = match self.eval_expr_ref(expr, env) {
                    Ok(t) => t,
                    Err(comp) => return comp,
                };
                self.put_value(&target, value)
            }
        }
    }

    fn exec_for_in(&mut self, s: &ForInStatement, env: &EnvRef, label: Option<&str>) -> Completion {
        let right = match self.eval_expr(&s.right, env) {
            Completion::Normal(v) => v,
            other => return other,
        };
        if right.is_nullish() {
            return Completion::Normal(Value::Undefined);
        }
        if right.is_unknown() {
            // The enumerated object is indeterminate: the loop variable
            // becomes Unknown and the body runs once, ambiguously.
            let unknown = match self.unknown_value() {
                Completion::Normal(v) => v,
                other => return other,
            };
            self.enter_ambiguous_block();
            let assigned = self.assign_for_in_target(&s.left, unknown, env);
            let result = if assigned.is_abrupt() {
                assigned
            } else {
                self.exec_statement(&s.body, env)
            };
            self.exit_ambiguous_block();
            return match result {
                Completion::Unroll => Completion::Unroll,
                Completion::Throw(e) => Completion::Throw(e),
                Completion::Return(v) => Completion::Return(v),
                _ => Completion::Normal(Value::Undefined),
            };
        }

        let obj_val = match self.to_object(&right) {
            Completion::Normal(v) => v,
            other => return other,
        };
        let Value::Object(handle) = obj_val else {
            return Completion::Normal(Value::Undefined);
        };
        let keys = self.enumerable_keys(handle.id);

        for key in keys {
            // A property deleted during iteration is not visited.
            let still_there = self
                .get_object(handle.id)
                .map(|o| o.borrow().has_property(&key) != Some(false))
                .unwrap_or(false);
            if !still_there {
                continue;
            }
            let comp = self.assign_for_in_target(
                &s.left,
                Value::String(crate::types::JsString::from_str(&key)),
                env,
            );
            if comp.is_abrupt() {
                return comp;
            }
            let comp = self.exec_statement(&s.body, env);
            if let Some(result) = Self::handle_loop_completion(comp, label) {
                return result.unwrap_or(Completion::Normal(Value::Undefined));
            }
        }
        Completion::Normal(Value::Undefined)
    }

    /// Enumerable property names, own before inherited, shadowed names
    /// visited once.
    pub(crate) fn enumerable_keys(&self, id: u64) -> Vec<String> {
        let mut keys = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut current = self.get_object(id);
        while let Some(obj) = current {
            let b = obj.borrow();
            let mut own: Vec<(String, u32)> = Vec::new();
            for (name, prop) in &b.properties {
                if prop.desc.enumerable == Some(true) && !seen.contains(name) {
                    // Integer indices first in ascending order, then the
                    // rest in insertion-agnostic name order.
                    let rank = array_index_of(name).unwrap_or(u32::MAX);
                    own.push((name.clone(), rank));
                }
            }
            own.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            for (name, _) in own {
                seen.insert(name.clone());
                keys.push(name);
            }
            // String wrapper indices are enumerable but synthesised.
            if b.class_name == "String" {
                if let Some(Value::String(s)) = &b.primitive_value {
                    for i in 0..s.len() {
                        let name = i.to_string();
                        if seen.insert(name.clone()) {
                            keys.push(name);
                        }
                    }
                }
            }
            let next = b.prototype.clone();
            drop(b);
            if let Some(n) = &next {
                if std::rc::Rc::ptr_eq(&obj, n) {
                    break;
                }
            }
            current = next;
        }
        keys
    }

    fn exec_try(&mut self, s: &TryStatement, env: &EnvRef) -> Completion {
        self.enter_try_catch();
        let block_result = self.exec_statements(&s.block, env);
        self.exit_try_catch();

        let mut result = match block_result {
            Completion::Throw(err) => {
                if let Some(handler) = &s.handler {
                    self.clear_exception();
                    if err.is_unknown() {
                        // The trigger is indeterminate, so the handler
                        // may or may not run: scan it in skipped mode.
                        let handler = handler.clone();
                        let env = env.clone();
                        self.process_in_skipped_mode(move |engine| {
                            engine.exec_catch_clause(&handler, Value::Unknown, &env)
                        })
                    } else {
                        self.exec_catch_clause(handler, err, env)
                    }
                } else {
                    Completion::Throw(err)
                }
            }
            other => other,
        };

        if let Some(finalizer) = &s.finalizer {
            let fin = self.exec_statements(finalizer, env);
            if fin.is_abrupt() {
                result = fin;
            }
        }
        result
    }

    pub(crate) fn exec_catch_clause(
        &mut self,
        handler: &CatchClause,
        err: Value,
        env: &EnvRef,
    ) -> Completion {
        // The catch parameter lives in its own environment, §12.14.
        let catch_env =
            LexicalEnvironment::new_declarative(Some(env.clone()), self.ambiguous_depth());
        self.env_create_mutable_binding(&catch_env, &handler.param, false);
        self.env_set_mutable_binding(&catch_env, &handler.param, err, false);
        self.exec_statements(&handler.body, &catch_env)
    }

    fn exec_switch(&mut self, s: &SwitchStatement, env: &EnvRef) -> Completion {
        let discriminant = match self.eval_expr(&s.discriminant, env) {
            Completion::Normal(v) => v,
            other => return other,
        };

        let mut start = None;
        if !discriminant.is_unknown() {
            let mut indeterminate = false;
            for (i, case) in s.cases.iter().enumerate() {
                let Some(test) = &case.test else { continue };
                let test_val = match self.eval_expr(test, env) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                match strict_equals(&discriminant, &test_val) {
                    Some(true) => {
                        start = Some(i);
                        break;
                    }
                    Some(false) => {}
                    None => {
                        indeterminate = true;
                        break;
                    }
                }
            }
            if start.is_none() && !indeterminate {
                start = s.cases.iter().position(|c| c.test.is_none());
            }
            if let Some(start) = start {
                for case in &s.cases[start..] {
                    let comp = self.exec_statements(&case.body, env);
                    match comp {
                        Completion::Normal(_) => {}
                        Completion::Break(None) => return Completion::Normal(Value::Undefined),
                        other => return other,
                    }
                }
                return Completion::Normal(Value::Undefined);
            }
            if !indeterminate {
                return Completion::Normal(Value::Undefined);
            }
        }

        // Unknown discriminant (or an Unknown case test): any case may be
        // the entry point, so process every body ambiguously in order.
        self.enter_ambiguous_block();
        let mut result = Completion::Normal(Value::Undefined);
        for case in &s.cases {
            let comp = self.exec_statements(&case.body, env);
            match comp {
                Completion::Normal(_) | Completion::Break(None) => {}
                Completion::Unroll => {
                    result = Completion::Unroll;
                    break;
                }
                other => {
                    result = other;
                    break;
                }
            }
        }
        self.exit_ambiguous_block();
        match result {
            Completion::Break(_) | Completion::Continue(_) => {
                Completion::Normal(Value::Undefined)
            }
            other => other,
        }
    }

    fn exec_with(&mut self, expr: &Expression, body: &Statement, env: &EnvRef) -> Completion {
        let val = match self.eval_expr(expr, env) {
            Completion::Normal(v) => v,
            other => return other,
        };
        if val.is_unknown() {
            // Scope augmentation by an indeterminate object poisons every
            // lookup in the body.
            self.enter_ambiguous_block();
            let result = self.exec_statement(body, env);
            self.exit_ambiguous_block();
            return result;
        }
        let obj_val = match self.to_object(&val) {
            Completion::Normal(v) => v,
            other => return other,
        };
        let Value::Object(handle) = obj_val else {
            return self.exec_statement(body, env);
        };
        let Some(obj) = self.get_object(handle.id) else {
            return self.exec_statement(body, env);
        };
        let with_env = LexicalEnvironment::new_object(
            obj,
            true,
            Some(env.clone()),
            self.ambiguous_depth(),
        );
        self.exec_statement(body, &with_env)
    }
}
