//! Expression evaluation (§11) and function invocation (§13.2.1), the
//! construct semantics, and the plugin override hook for matched calls.

use crate::ast::*;
use crate::engine::conversions::{self, PrimitiveHint, to_boolean};
use crate::engine::types::*;
use crate::engine::{Engine, ErrorKind};
use crate::types::{JsString, Value, number_ops};

/// The dotted name of a callee built from plain identifiers, e.g.
/// `App.Logger.debug`; used to match plugin overrides.
pub fn qualified_callee_name(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Identifier(n) => Some(n.clone()),
        Expression::Member(base, MemberProperty::Dot(name)) => {
            qualified_callee_name(base).map(|b| format!("{b}.{name}"))
        }
        _ => None,
    }
}

impl Engine {
    pub fn eval_expr(&mut self, expr: &Expression, env: &EnvRef) -> Completion {
        match self.eval_expr_ref(expr, env) {
            Ok(r) => self.get_value(r),
            Err(comp) => comp,
        }
    }

    /// Evaluate to a Reference where the grammar produces one
    /// (identifiers and member accesses), a plain value otherwise.
    pub fn eval_expr_ref(
        &mut self,
        expr: &Expression,
        env: &EnvRef,
    ) -> Result<RefOrValue, Completion> {
        match expr {
            Expression::Identifier(name) => {
                let strict = self.current_context().strict;
                Ok(RefOrValue::Ref(self.resolve_identifier(env, name, strict)))
            }
            Expression::Member(base_expr, prop) => {
                let base = match self.eval_expr(base_expr, env) {
                    Completion::Normal(v) => v,
                    other => return Err(other),
                };
                let name = match prop {
                    MemberProperty::Dot(n) => n.clone(),
                    MemberProperty::Computed(e) => {
                        let prop_val = match self.eval_expr(e, env) {
                            Completion::Normal(v) => v,
                            other => return Err(other),
                        };
                        match self.to_property_name(&prop_val)? {
                            Some(s) => s,
                            // Indeterminate property name: the access
                            // itself is indeterminate.
                            None => {
                                return match self.unknown_value() {
                                    Completion::Normal(v) => Ok(RefOrValue::Value(v)),
                                    other => Err(other),
                                };
                            }
                        }
                    }
                };
                let strict = self.current_context().strict;
                Ok(RefOrValue::Ref(Reference {
                    base: ReferenceBase::Value(base),
                    referenced_name: name,
                    strict,
                }))
            }
            other => match self.eval_non_reference(other, env) {
                Completion::Normal(v) => Ok(RefOrValue::Value(v)),
                comp => Err(comp),
            },
        }
    }

    fn eval_non_reference(&mut self, expr: &Expression, env: &EnvRef) -> Completion {
        match expr {
            Expression::Literal(lit) => self.eval_literal(lit),
            Expression::This => Completion::Normal(self.current_context().this_binding.clone()),
            Expression::Array(elements) => self.eval_array_literal(elements, env),
            Expression::Object(props) => self.eval_object_literal(props, env),
            Expression::Function(f) => Completion::Normal(self.eval_function_expression(f, env)),
            Expression::Unary(op, operand) => self.eval_unary(*op, operand, env),
            Expression::Update(op, prefix, target) => self.eval_update(*op, *prefix, target, env),
            Expression::Binary(op, left, right) => {
                let lval = match self.eval_expr(left, env) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                let rval = match self.eval_expr(right, env) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                self.eval_binary_values(*op, &lval, &rval)
            }
            Expression::Logical(op, left, right) => self.eval_logical(*op, left, right, env),
            Expression::Assign(op, left, right) => self.eval_assign(*op, left, right, env),
            Expression::Conditional(test, consequent, alternate) => {
                self.eval_conditional(test, consequent, alternate, env)
            }
            Expression::Call(callee, args) => self.eval_call(callee, args, env),
            Expression::New(callee, args) => self.eval_new(callee, args, env),
            Expression::Sequence(exprs) => {
                let mut result = Value::Undefined;
                for e in exprs {
                    result = match self.eval_expr(e, env) {
                        Completion::Normal(v) => v,
                        other => return other,
                    };
                }
                Completion::Normal(result)
            }
            Expression::Typeof(operand) => self.eval_typeof(operand, env),
            Expression::Delete(operand) => self.eval_delete(operand, env),
            Expression::Void(operand) => {
                let comp = self.eval_expr(operand, env);
                if comp.is_abrupt() {
                    return comp;
                }
                Completion::Normal(Value::Undefined)
            }
            Expression::Identifier(_) | Expression::Member(_, _) => {
                unreachable!("references handled by eval_expr_ref")
            }
        }
    }

    fn eval_literal(&mut self, lit: &Literal) -> Completion {
        match lit {
            Literal::Null => Completion::Normal(Value::Null),
            Literal::Boolean(b) => Completion::Normal(Value::Boolean(*b)),
            Literal::Number(n) => Completion::Normal(Value::Number(*n)),
            Literal::String(s) => Completion::Normal(Value::String(JsString::from_str(s))),
            Literal::RegExp { pattern, flags } => self.create_regexp_object(pattern, flags),
        }
    }

    fn eval_array_literal(
        &mut self,
        elements: &[Option<Expression>],
        env: &EnvRef,
    ) -> Completion {
        let array = self.create_array(Vec::new());
        let Value::Object(handle) = &array else {
            unreachable!()
        };
        let id = handle.id;
        let mut length = 0u32;
        for (i, element) in elements.iter().enumerate() {
            length = i as u32 + 1;
            let Some(expr) = element else { continue };
            let value = match self.eval_expr(expr, env) {
                Completion::Normal(v) => v,
                other => return other,
            };
            let desc = PropertyDescriptor::data(value, true, true, true);
            let result = self.object_define_own_property(id, &i.to_string(), desc, false);
            if result.is_abrupt() {
                return result;
            }
        }
        // Trailing elisions still count toward length.
        if let Some(obj) = self.get_object(id) {
            if let Some(p) = obj.borrow_mut().properties.get_mut("length") {
                p.desc.value = Some(Value::Number(length as f64));
            }
        }
        Completion::Normal(array)
    }

    fn eval_object_literal(&mut self, props: &[ObjectProperty], env: &EnvRef) -> Completion {
        let obj = self.create_object();
        let id = obj.borrow().id.unwrap();
        for prop in props {
            let result = match prop {
                ObjectProperty::KeyValue(key, expr) => {
                    let value = match self.eval_expr(expr, env) {
                        Completion::Normal(v) => v,
                        other => return other,
                    };
                    let desc = PropertyDescriptor::data(value, true, true, true);
                    self.object_define_own_property(id, &key.as_property_name(), desc, false)
                }
                ObjectProperty::Getter(key, func) => {
                    let getter = self.instantiate_function(func, env);
                    let desc = PropertyDescriptor {
                        get: Some(getter),
                        enumerable: Some(true),
                        configurable: Some(true),
                        ..Default::default()
                    };
                    self.object_define_own_property(id, &key.as_property_name(), desc, false)
                }
                ObjectProperty::Setter(key, func) => {
                    let setter = self.instantiate_function(func, env);
                    let desc = PropertyDescriptor {
                        set: Some(setter),
                        enumerable: Some(true),
                        configurable: Some(true),
                        ..Default::default()
                    };
                    self.object_define_own_property(id, &key.as_property_name(), desc, false)
                }
            };
            if result.is_abrupt() {
                return result;
            }
        }
        Completion::Normal(Engine::handle_of(&obj))
    }

    /// §13: a named function expression binds its own name, immutably, in
    /// a dedicated environment the closure captures.
    fn eval_function_expression(&mut self, func: &FunctionNode, env: &EnvRef) -> Value {
        if let Some(name) = &func.name {
            let func_env =
                LexicalEnvironment::new_declarative(Some(env.clone()), self.ambiguous_depth());
            self.env_create_immutable_binding(&func_env, name);
            let value = self.instantiate_function(func, &func_env);
            self.env_initialize_immutable_binding(&func_env, name, value.clone());
            value
        } else {
            self.instantiate_function(func, env)
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expression, env: &EnvRef) -> Completion {
        let val = match self.eval_expr(operand, env) {
            Completion::Normal(v) => v,
            other => return other,
        };
        if val.is_unknown() {
            return self.unknown_value();
        }
        match op {
            UnaryOp::Minus => match self.to_number(&val) {
                Completion::Normal(Value::Number(n)) => Completion::Normal(Value::Number(-n)),
                other => other,
            },
            UnaryOp::Plus => self.to_number(&val),
            UnaryOp::Not => match to_boolean(&val) {
                Some(b) => Completion::Normal(Value::Boolean(!b)),
                None => self.unknown_value(),
            },
            UnaryOp::BitNot => match self.to_number(&val) {
                Completion::Normal(Value::Number(n)) => {
                    Completion::Normal(Value::Number(f64::from(!number_ops::to_int32(n))))
                }
                other => other,
            },
        }
    }

    fn eval_typeof(&mut self, operand: &Expression, env: &EnvRef) -> Completion {
        let target = match self.eval_expr_ref(operand, env) {
            Ok(t) => t,
            Err(comp) => return comp,
        };
        if let RefOrValue::Ref(r) = &target {
            if r.is_unresolvable() {
                return Completion::Normal(Value::String(JsString::from_str("undefined")));
            }
        }
        let val = match self.get_value(target) {
            Completion::Normal(v) => v,
            other => return other,
        };
        let name = match &val {
            Value::Unknown => return self.unknown_value(),
            Value::Object(_) if self.is_callable_value(&val) => "function",
            other => other.type_name(),
        };
        Completion::Normal(Value::String(JsString::from_str(name)))
    }

    // §11.4.1
    fn eval_delete(&mut self, operand: &Expression, env: &EnvRef) -> Completion {
        let target = match self.eval_expr_ref(operand, env) {
            Ok(t) => t,
            Err(comp) => return comp,
        };
        let r = match target {
            RefOrValue::Value(_) => return Completion::Normal(Value::Boolean(true)),
            RefOrValue::Ref(r) => r,
        };
        match &r.base {
            ReferenceBase::Unresolvable => {
                if r.strict {
                    self.handle_recoverable_native_exception(
                        ErrorKind::SyntaxError,
                        "Delete of an unqualified identifier in strict mode",
                    )
                } else {
                    Completion::Normal(Value::Boolean(true))
                }
            }
            ReferenceBase::Value(base) => match base {
                Value::Object(o) => self.object_delete(o.id, &r.referenced_name, r.strict),
                Value::Unknown => self.unknown_value(),
                _ => Completion::Normal(Value::Boolean(true)),
            },
            ReferenceBase::Env(e) => {
                let e = e.clone();
                self.env_delete_binding(&e, &r.referenced_name)
            }
        }
    }

    fn eval_update(
        &mut self,
        op: UpdateOp,
        prefix: bool,
        target: &Expression,
        env: &EnvRef,
    ) -> Completion {
        let target_ref = match self.eval_expr_ref(target, env) {
            Ok(t) => t,
            Err(comp) => return comp,
        };
        let old = match &target_ref {
            RefOrValue::Ref(r) => match self.get_value(RefOrValue::Ref(r.clone())) {
                Completion::Normal(v) => v,
                other => return other,
            },
            RefOrValue::Value(v) => v.clone(),
        };
        let old_num = match self.to_number(&old) {
            Completion::Normal(v) => v,
            other => return other,
        };
        let (old_val, new_val) = match old_num {
            Value::Number(n) => {
                let delta = if op == UpdateOp::Increment { 1.0 } else { -1.0 };
                (Value::Number(n), Value::Number(n + delta))
            }
            _ => {
                let unknown = match self.unknown_value() {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                (unknown.clone(), unknown)
            }
        };
        if let RefOrValue::Ref(_) = &target_ref {
            let result = self.put_value(&target_ref, new_val.clone());
            if result.is_abrupt() {
                return result;
            }
        }
        Completion::Normal(if prefix { new_val } else { old_val })
    }

    fn eval_logical(
        &mut self,
        op: LogicalOp,
        left: &Expression,
        right: &Expression,
        env: &EnvRef,
    ) -> Completion {
        let lval = match self.eval_expr(left, env) {
            Completion::Normal(v) => v,
            other => return other,
        };
        match to_boolean(&lval) {
            Some(b) => {
                let short_circuit = match op {
                    LogicalOp::And => !b,
                    LogicalOp::Or => b,
                };
                if short_circuit {
                    Completion::Normal(lval)
                } else {
                    self.eval_expr(right, env)
                }
            }
            None => {
                // Whether the right operand evaluates is indeterminate.
                self.enter_ambiguous_block();
                let comp = self.eval_expr(right, env);
                self.exit_ambiguous_block();
                if comp.is_abrupt() {
                    return comp;
                }
                self.unknown_value()
            }
        }
    }

    fn eval_conditional(
        &mut self,
        test: &Expression,
        consequent: &Expression,
        alternate: &Expression,
        env: &EnvRef,
    ) -> Completion {
        let test_val = match self.eval_expr(test, env) {
            Completion::Normal(v) => v,
            other => return other,
        };
        match to_boolean(&test_val) {
            Some(true) => self.eval_expr(consequent, env),
            Some(false) => self.eval_expr(alternate, env),
            None => {
                self.enter_ambiguous_block();
                let first = self.eval_expr(consequent, env);
                let second = if first.is_abrupt() {
                    Completion::Normal(Value::Undefined)
                } else {
                    self.eval_expr(alternate, env)
                };
                self.exit_ambiguous_block();
                if first.is_abrupt() {
                    return first;
                }
                if second.is_abrupt() {
                    return second;
                }
                self.unknown_value()
            }
        }
    }

    fn eval_assign(
        &mut self,
        op: AssignOp,
        left: &Expression,
        right: &Expression,
        env: &EnvRef,
    ) -> Completion {
        let target = match self.eval_expr_ref(left, env) {
            Ok(t) => t,
            Err(comp) => return comp,
        };

        let value = if op == AssignOp::Assign {
            match self.eval_expr(right, env) {
                Completion::Normal(v) => v,
                other => return other,
            }
        } else {
            let old = match &target {
                RefOrValue::Ref(r) => match self.get_value(RefOrValue::Ref(r.clone())) {
                    Completion::Normal(v) => v,
                    other => return other,
                },
                RefOrValue::Value(v) => v.clone(),
            };
            let rhs = match self.eval_expr(right, env) {
                Completion::Normal(v) => v,
                other => return other,
            };
            let binary = compound_op(op);
            match self.eval_binary_values(binary, &old, &rhs) {
                Completion::Normal(v) => v,
                other => return other,
            }
        };

        match &target {
            // A write through an indeterminate name cannot land anywhere
            // specific; the value of the expression is still the rhs.
            RefOrValue::Value(_) => Completion::Normal(value),
            RefOrValue::Ref(_) => {
                let result = self.put_value(&target, value.clone());
                if result.is_abrupt() {
                    return result;
                }
                Completion::Normal(value)
            }
        }
    }

    pub(crate) fn eval_binary_values(
        &mut self,
        op: BinaryOp,
        left: &Value,
        right: &Value,
    ) -> Completion {
        if left.is_unknown() || right.is_unknown() {
            return self.unknown_value();
        }
        match op {
            BinaryOp::Add => {
                let lprim = match self.to_primitive(left, PrimitiveHint::Default) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                let rprim = match self.to_primitive(right, PrimitiveHint::Default) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                if lprim.is_unknown() || rprim.is_unknown() {
                    return self.unknown_value();
                }
                if matches!(lprim, Value::String(_)) || matches!(rprim, Value::String(_)) {
                    let ls = conversions::primitive_to_string(&lprim).unwrap();
                    let rs = conversions::primitive_to_string(&rprim).unwrap();
                    Completion::Normal(Value::String(ls.concat(&rs)))
                } else {
                    let ln = conversions::primitive_to_number(&lprim).unwrap_or(f64::NAN);
                    let rn = conversions::primitive_to_number(&rprim).unwrap_or(f64::NAN);
                    Completion::Normal(Value::Number(ln + rn))
                }
            }
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let ln = match self.to_number(left) {
                    Completion::Normal(Value::Number(n)) => n,
                    Completion::Normal(_) => return self.unknown_value(),
                    other => return other,
                };
                let rn = match self.to_number(right) {
                    Completion::Normal(Value::Number(n)) => n,
                    Completion::Normal(_) => return self.unknown_value(),
                    other => return other,
                };
                let result = match op {
                    BinaryOp::Sub => ln - rn,
                    BinaryOp::Mul => ln * rn,
                    BinaryOp::Div => ln / rn,
                    BinaryOp::Mod => ln % rn,
                    _ => unreachable!(),
                };
                Completion::Normal(Value::Number(result))
            }
            BinaryOp::LShift | BinaryOp::RShift | BinaryOp::URShift => {
                let ln = match self.to_number(left) {
                    Completion::Normal(Value::Number(n)) => n,
                    Completion::Normal(_) => return self.unknown_value(),
                    other => return other,
                };
                let rn = match self.to_number(right) {
                    Completion::Normal(Value::Number(n)) => n,
                    Completion::Normal(_) => return self.unknown_value(),
                    other => return other,
                };
                let shift = number_ops::to_uint32(rn) & 0x1F;
                let result = match op {
                    BinaryOp::LShift => {
                        f64::from(number_ops::to_int32(ln).wrapping_shl(shift))
                    }
                    BinaryOp::RShift => {
                        f64::from(number_ops::to_int32(ln).wrapping_shr(shift))
                    }
                    BinaryOp::URShift => {
                        number_ops::to_uint32(ln).wrapping_shr(shift) as f64
                    }
                    _ => unreachable!(),
                };
                Completion::Normal(Value::Number(result))
            }
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                let ln = match self.to_number(left) {
                    Completion::Normal(Value::Number(n)) => number_ops::to_int32(n),
                    Completion::Normal(_) => return self.unknown_value(),
                    other => return other,
                };
                let rn = match self.to_number(right) {
                    Completion::Normal(Value::Number(n)) => number_ops::to_int32(n),
                    Completion::Normal(_) => return self.unknown_value(),
                    other => return other,
                };
                let result = match op {
                    BinaryOp::BitAnd => ln & rn,
                    BinaryOp::BitOr => ln | rn,
                    BinaryOp::BitXor => ln ^ rn,
                    _ => unreachable!(),
                };
                Completion::Normal(Value::Number(f64::from(result)))
            }
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
                self.eval_relational(op, left, right)
            }
            BinaryOp::Eq => self.abstract_equals(left, right),
            BinaryOp::NotEq => match self.abstract_equals(left, right) {
                Completion::Normal(Value::Boolean(b)) => {
                    Completion::Normal(Value::Boolean(!b))
                }
                other => other,
            },
            BinaryOp::StrictEq => match conversions::strict_equals(left, right) {
                Some(b) => Completion::Normal(Value::Boolean(b)),
                None => self.unknown_value(),
            },
            BinaryOp::StrictNotEq => match conversions::strict_equals(left, right) {
                Some(b) => Completion::Normal(Value::Boolean(!b)),
                None => self.unknown_value(),
            },
            BinaryOp::In => {
                let Value::Object(o) = right else {
                    return self.handle_recoverable_native_exception(
                        ErrorKind::TypeError,
                        "Cannot use 'in' operator on a non-object",
                    );
                };
                let name = match self.to_property_name(left) {
                    Ok(Some(s)) => s,
                    Ok(None) => return self.unknown_value(),
                    Err(comp) => return comp,
                };
                let has = self
                    .get_object(o.id)
                    .and_then(|obj| obj.borrow().has_property(&name));
                match has {
                    Some(b) => Completion::Normal(Value::Boolean(b)),
                    None => self.unknown_value(),
                }
            }
            BinaryOp::Instanceof => self.eval_instanceof(left, right),
        }
    }

    // §11.8.5, the abstract relational comparison
    fn eval_relational(&mut self, op: BinaryOp, left: &Value, right: &Value) -> Completion {
        let lprim = match self.to_primitive(left, PrimitiveHint::Number) {
            Completion::Normal(v) => v,
            other => return other,
        };
        let rprim = match self.to_primitive(right, PrimitiveHint::Number) {
            Completion::Normal(v) => v,
            other => return other,
        };
        if lprim.is_unknown() || rprim.is_unknown() {
            return self.unknown_value();
        }
        let result = if let (Value::String(ls), Value::String(rs)) = (&lprim, &rprim) {
            let (a, b) = (&ls.code_units, &rs.code_units);
            match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Gt => a > b,
                BinaryOp::LtEq => a <= b,
                BinaryOp::GtEq => a >= b,
                _ => unreachable!(),
            }
        } else {
            let ln = conversions::primitive_to_number(&lprim).unwrap_or(f64::NAN);
            let rn = conversions::primitive_to_number(&rprim).unwrap_or(f64::NAN);
            if ln.is_nan() || rn.is_nan() {
                false
            } else {
                match op {
                    BinaryOp::Lt => ln < rn,
                    BinaryOp::Gt => ln > rn,
                    BinaryOp::LtEq => ln <= rn,
                    BinaryOp::GtEq => ln >= rn,
                    _ => unreachable!(),
                }
            }
        };
        Completion::Normal(Value::Boolean(result))
    }

    // §11.8.6 / §15.3.5.3
    fn eval_instanceof(&mut self, left: &Value, right: &Value) -> Completion {
        let Some(func_obj) = self.resolve_object(right) else {
            return self.handle_recoverable_native_exception(
                ErrorKind::TypeError,
                "Right-hand side of 'instanceof' is not callable",
            );
        };
        if !func_obj.borrow().is_callable() {
            return self.handle_recoverable_native_exception(
                ErrorKind::TypeError,
                "Right-hand side of 'instanceof' is not callable",
            );
        }
        let Value::Object(lh) = left else {
            return Completion::Normal(Value::Boolean(false));
        };
        let func_id = func_obj.borrow().id.unwrap();
        let proto_val = match self.object_get(func_id, "prototype") {
            Completion::Normal(v) => v,
            other => return other,
        };
        let Some(proto_obj) = self.resolve_object(&proto_val) else {
            if proto_val.is_unknown() {
                return self.unknown_value();
            }
            return self.handle_recoverable_native_exception(
                ErrorKind::TypeError,
                "Function has non-object prototype in 'instanceof' check",
            );
        };

        let mut current = self
            .get_object(lh.id)
            .and_then(|o| o.borrow().prototype.clone());
        let mut chain_unknown = self
            .get_object(lh.id)
            .map(|o| o.borrow().prototype_unknown)
            .unwrap_or(false);
        while let Some(obj) = current {
            if std::rc::Rc::ptr_eq(&obj, &proto_obj) {
                return Completion::Normal(Value::Boolean(true));
            }
            chain_unknown |= obj.borrow().prototype_unknown;
            let next = obj.borrow().prototype.clone();
            if let Some(n) = &next {
                if std::rc::Rc::ptr_eq(n, &obj) {
                    break;
                }
            }
            current = next;
        }
        if chain_unknown {
            self.unknown_value()
        } else {
            Completion::Normal(Value::Boolean(false))
        }
    }

    // Calls

    fn eval_call(&mut self, callee: &Expression, args: &[Expression], env: &EnvRef) -> Completion {
        let qualified = qualified_callee_name(callee);
        let target = match self.eval_expr_ref(callee, env) {
            Ok(t) => t,
            Err(comp) => return comp,
        };
        let this_val = match &target {
            RefOrValue::Ref(r) => match &r.base {
                ReferenceBase::Value(v) => v.clone(),
                ReferenceBase::Env(e) => self.env_implicit_this(e),
                ReferenceBase::Unresolvable => Value::Undefined,
            },
            RefOrValue::Value(_) => Value::Undefined,
        };
        let func = match &target {
            RefOrValue::Ref(r) => match self.get_value(RefOrValue::Ref(r.clone())) {
                Completion::Normal(v) => v,
                other => return other,
            },
            RefOrValue::Value(v) => v.clone(),
        };

        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            match self.eval_expr(arg, env) {
                Completion::Normal(v) => arg_values.push(v),
                other => return other,
            }
        }

        // Plugin overrides supersede the real callee.
        if let Some(name) = &qualified {
            let matched = self
                .overrides
                .iter()
                .find(|o| o.pattern.is_match(name))
                .map(|o| o.call.clone());
            if let Some(call) = matched {
                return call(self, &this_val, &arg_values);
            }
        }

        // Direct eval runs in the caller's environment.
        if qualified.as_deref() == Some("eval") && self.is_global_eval(&func) {
            let source = arg_values.first().cloned().unwrap_or(Value::Undefined);
            return self.eval_in_env(&source, env);
        }

        if func.is_unknown() {
            return self.unknown_value();
        }
        if !self.is_callable_value(&func) {
            let name = qualified.unwrap_or_else(|| "expression".to_string());
            return self.handle_recoverable_native_exception(
                ErrorKind::TypeError,
                &format!("'{name}' is not a function"),
            );
        }
        self.call_function(&func, &this_val, &arg_values, false)
    }

    /// Invoke a function value. `force` bypasses the `invoke_methods`
    /// configuration for engine-internal calls (accessors, conversions,
    /// built-in callbacks).
    pub fn call_function(
        &mut self,
        func_val: &Value,
        this_val: &Value,
        args: &[Value],
        force: bool,
    ) -> Completion {
        let constructing = std::mem::take(&mut self.pending_construct);
        if func_val.is_unknown() {
            return self.unknown_value();
        }
        let Some(func_obj) = self.resolve_object(func_val) else {
            return self.handle_recoverable_native_exception(
                ErrorKind::TypeError,
                "Called value is not a function",
            );
        };
        let callable = func_obj.borrow().callable.clone();
        let Some(func) = callable else {
            return self.handle_recoverable_native_exception(
                ErrorKind::TypeError,
                "Called value is not a function",
            );
        };

        match func {
            JsFunction::Native(name, _, f) => {
                // Natives run on their own context so nested events are
                // attributed correctly.
                let global_env = self.global_env();
                self.push_context(crate::engine::ExecutionContext {
                    lexical_environment: global_env.clone(),
                    variable_environment: global_env,
                    this_binding: this_val.clone(),
                    strict: false,
                    ambiguous_block: 0,
                    is_function_context: true,
                    return_is_unknown: false,
                    function_name: Some(name),
                    loc: None,
                    constructing,
                });
                let result = f(self, this_val, args);
                self.pop_context();
                result
            }
            JsFunction::User {
                name,
                params,
                body,
                closure,
                strict,
            } => {
                let always_invoke = func_obj.borrow().always_invoke;
                if !force && !self.options.invoke_methods && !always_invoke {
                    // Declined invocation: the call yields Unknown but the
                    // body is still scanned so API references surface.
                    let params = params.clone();
                    let body = body.clone();
                    let closure = closure.clone();
                    let this_val = this_val.clone();
                    let args = args.to_vec();
                    let callee = func_val.clone();
                    self.process_in_skipped_mode(move |engine| {
                        let env = engine.enter_function_context(
                            name, &params, &body, &closure, strict, this_val, &args, callee,
                            None,
                        );
                        let result = engine.exec_statements(&body, &env);
                        engine.pop_context();
                        result
                    });
                    return self.unknown_value();
                }

                if self.call_depth >= self.options.max_recursion_limit {
                    let stack = self.capture_stack_trace();
                    self.emit(crate::engine::AnalysisEvent::ErrorReported {
                        kind: "RecursionLimit".to_string(),
                        message: "maximum recursion limit reached".to_string(),
                        stack_trace: stack,
                    });
                    return Completion::Unroll;
                }
                self.call_depth += 1;
                let call_site_ambiguous = self.in_ambiguous_block();

                let env = self.enter_function_context(
                    name,
                    &params,
                    &body,
                    &closure,
                    strict,
                    this_val.clone(),
                    args,
                    func_val.clone(),
                    None,
                );

                let mut completion = Completion::Normal(Value::Undefined);
                for (i, stmt) in body.iter().enumerate() {
                    let comp = self.exec_statement(stmt, &env);
                    if comp.is_abrupt() {
                        // §13.2.1 with analysis semantics: the remaining
                        // statements are still scanned in skipped mode so
                        // the API references inside them are collected.
                        if i + 1 < body.len() && !matches!(comp, Completion::Unroll) {
                            let rest: Vec<Statement> = body[i + 1..].to_vec();
                            let env = env.clone();
                            self.process_in_skipped_mode(move |engine| {
                                engine.exec_statements(&rest, &env)
                            });
                        }
                        completion = comp;
                        break;
                    }
                }

                let ctx = self.pop_context();
                self.call_depth -= 1;

                let result = match completion {
                    Completion::Return(v) => Completion::Normal(v),
                    Completion::Normal(_) | Completion::Break(_) | Completion::Continue(_) => {
                        Completion::Normal(Value::Undefined)
                    }
                    other => other,
                };
                if call_site_ambiguous && ctx.return_is_unknown {
                    if let Completion::Normal(_) = result {
                        return self.unknown_value();
                    }
                }
                result
            }
        }
    }

    fn eval_new(&mut self, callee: &Expression, args: &[Expression], env: &EnvRef) -> Completion {
        let func = match self.eval_expr(callee, env) {
            Completion::Normal(v) => v,
            other => return other,
        };
        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            match self.eval_expr(arg, env) {
                Completion::Normal(v) => arg_values.push(v),
                other => return other,
            }
        }
        self.construct(&func, &arg_values)
    }

    /// `new F(args)`, §13.2.2: a fresh object whose prototype comes from
    /// `F.prototype`, with the constructor's object result (or Unknown)
    /// taking precedence.
    pub fn construct(&mut self, func_val: &Value, args: &[Value]) -> Completion {
        if func_val.is_unknown() {
            return self.unknown_value();
        }
        if !self.is_callable_value(func_val) {
            return self.handle_recoverable_native_exception(
                ErrorKind::TypeError,
                "Constructor is not a function",
            );
        }
        let func_obj = self.resolve_object(func_val).unwrap();
        let func_id = func_obj.borrow().id.unwrap();
        let proto_val = match self.object_get(func_id, "prototype") {
            Completion::Normal(v) => v,
            other => return other,
        };

        let new_obj = self.create_bare_object();
        match &proto_val {
            Value::Object(p) => {
                new_obj.borrow_mut().prototype = self.get_object(p.id);
            }
            Value::Unknown => {
                let mut o = new_obj.borrow_mut();
                o.prototype = self.object_prototype.clone();
                o.prototype_unknown = true;
            }
            _ => {
                new_obj.borrow_mut().prototype = self.object_prototype.clone();
            }
        }
        let this = Engine::handle_of(&new_obj);

        self.pending_construct = true;
        let result = match self.call_function(func_val, &this, args, false) {
            Completion::Normal(v) => v,
            other => return other,
        };
        match result {
            Value::Object(_) | Value::Unknown => Completion::Normal(result),
            _ => Completion::Normal(this),
        }
    }

    fn is_global_eval(&self, func: &Value) -> bool {
        if let Some(obj) = self.resolve_object(func) {
            if let Some(JsFunction::Native(name, _, _)) = &obj.borrow().callable {
                return name == "eval";
            }
        }
        false
    }

    /// The body of `eval`: parse the source and execute it in the given
    /// environment. Parse failures surface as recoverable SyntaxErrors.
    pub fn eval_in_env(&mut self, source: &Value, env: &EnvRef) -> Completion {
        let Value::String(s) = source else {
            if source.is_unknown() {
                return self.unknown_value();
            }
            // A non-string argument is returned unchanged, §15.1.2.1.
            return Completion::Normal(source.clone());
        };
        let text = s.to_rust_string();
        let program = match crate::parser::parse_string(&text, None) {
            Ok(p) => p,
            Err(err) => {
                return self.handle_recoverable_native_exception(
                    ErrorKind::SyntaxError,
                    &err.message,
                );
            }
        };
        self.hoist_declarations(&program.body, env, program.strict);
        match self.exec_statements(&program.body, env) {
            Completion::Normal(v) => Completion::Normal(v),
            other => other,
        }
    }
}

fn compound_op(op: AssignOp) -> BinaryOp {
    match op {
        AssignOp::AddAssign => BinaryOp::Add,
        AssignOp::SubAssign => BinaryOp::Sub,
        AssignOp::MulAssign => BinaryOp::Mul,
        AssignOp::DivAssign => BinaryOp::Div,
        AssignOp::ModAssign => BinaryOp::Mod,
        AssignOp::LShiftAssign => BinaryOp::LShift,
        AssignOp::RShiftAssign => BinaryOp::RShift,
        AssignOp::URShiftAssign => BinaryOp::URShift,
        AssignOp::BitAndAssign => BinaryOp::BitAnd,
        AssignOp::BitOrAssign => BinaryOp::BitOr,
        AssignOp::BitXorAssign => BinaryOp::BitXor,
        AssignOp::Assign => unreachable!("simple assignment handled directly"),
    }
}
