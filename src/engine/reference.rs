//! The ECMAScript Reference pseudo-type (§8.7) and the environment-record
//! operations it reads and writes through (§10.2.1). Declarative records
//! are plain binding maps; object records delegate to the binding
//! object's property machinery so the same analysis events fire.

use crate::engine::object_ops::CanPut;
use crate::engine::types::*;
use crate::engine::{AnalysisEvent, Engine, ErrorKind};
use crate::types::Value;

impl Engine {
    // HasBinding, §10.2.1.1.1 / §10.2.1.2.1. None when the answer is
    // indeterminate (an Unknown link in the binding object's chain).
    pub fn env_has_binding(&self, env: &EnvRef, name: &str) -> Option<bool> {
        match &env.borrow().record {
            EnvRecord::Declarative(rec) => Some(rec.bindings.contains_key(name)),
            EnvRecord::Object(rec) => rec.binding_object.borrow().has_property(name),
        }
    }

    // CreateMutableBinding, §10.2.1.1.2 / §10.2.1.2.2
    pub fn env_create_mutable_binding(&mut self, env: &EnvRef, name: &str, deletable: bool) {
        let record_kind = {
            let mut env_mut = env.borrow_mut();
            match &mut env_mut.record {
                EnvRecord::Declarative(rec) => {
                    // Recreating an existing declarative binding is an
                    // engine bug, not a program error.
                    assert!(
                        !rec.bindings.contains_key(name),
                        "duplicate declarative binding '{name}'"
                    );
                    rec.bindings
                        .insert(name.to_string(), Binding::mutable(Value::Undefined, deletable));
                    None
                }
                EnvRecord::Object(rec) => Some(rec.binding_object.borrow().id.unwrap()),
            }
        };
        if let Some(id) = record_kind {
            let desc = PropertyDescriptor::data(Value::Undefined, true, true, deletable);
            self.object_define_own_property(id, name, desc, true);
        }
    }

    // CreateImmutableBinding, §10.2.1.1.7 (declarative records only)
    pub fn env_create_immutable_binding(&mut self, env: &EnvRef, name: &str) {
        let mut env_mut = env.borrow_mut();
        if let EnvRecord::Declarative(rec) = &mut env_mut.record {
            assert!(
                !rec.bindings.contains_key(name),
                "duplicate declarative binding '{name}'"
            );
            rec.bindings
                .insert(name.to_string(), Binding::immutable_uninitialized());
        }
    }

    // InitializeImmutableBinding, §10.2.1.1.8
    pub fn env_initialize_immutable_binding(&mut self, env: &EnvRef, name: &str, value: Value) {
        let mut env_mut = env.borrow_mut();
        if let EnvRecord::Declarative(rec) = &mut env_mut.record {
            if let Some(binding) = rec.bindings.get_mut(name) {
                assert!(
                    !binding.is_initialized,
                    "immutable binding '{name}' initialised twice"
                );
                binding.value = value;
                binding.is_initialized = true;
            }
        }
    }

    // SetMutableBinding, §10.2.1.1.3 / §10.2.1.2.3, with the analysis
    // modes layered in: skipped mode diverts to the alternate slot; an
    // Unknown value or a write escaping its birth scope degrades the
    // stored value to Unknown.
    pub fn env_set_mutable_binding(
        &mut self,
        env: &EnvRef,
        name: &str,
        value: Value,
        strict: bool,
    ) -> Completion {
        enum Target {
            Declarative,
            Immutable,
            Object(u64),
            Missing,
        }
        let target = {
            let env_ref = env.borrow();
            match &env_ref.record {
                EnvRecord::Declarative(rec) => match rec.bindings.get(name) {
                    Some(b) if b.is_mutable => Target::Declarative,
                    Some(_) => Target::Immutable,
                    None => Target::Missing,
                },
                EnvRecord::Object(rec) => Target::Object(rec.binding_object.borrow().id.unwrap()),
            }
        };

        match target {
            Target::Missing => {
                if strict {
                    return self.handle_recoverable_native_exception(
                        ErrorKind::ReferenceError,
                        &format!("'{name}' is not defined"),
                    );
                }
                Completion::Normal(Value::Undefined)
            }
            Target::Immutable => {
                if strict {
                    return self.handle_recoverable_native_exception(
                        ErrorKind::TypeError,
                        &format!("Assignment to constant variable '{name}'"),
                    );
                }
                Completion::Normal(Value::Undefined)
            }
            Target::Object(id) => self.object_put(id, name, value, strict),
            Target::Declarative => {
                if let Some(section) = self.skipped_section() {
                    let mut env_mut = env.borrow_mut();
                    if let EnvRecord::Declarative(rec) = &mut env_mut.record {
                        if let Some(b) = rec.bindings.get_mut(name) {
                            b.alternates.insert(section, value);
                        }
                    }
                    return Completion::Normal(Value::Undefined);
                }
                let ambient = env.borrow().ambient_at_creation;
                let stored = if value.is_unknown() || self.is_escaping_write(ambient) {
                    match self.unknown_value() {
                        Completion::Normal(v) => v,
                        other => return other,
                    }
                } else {
                    value
                };
                let mut env_mut = env.borrow_mut();
                if let EnvRecord::Declarative(rec) = &mut env_mut.record {
                    if let Some(b) = rec.bindings.get_mut(name) {
                        b.value = stored;
                    }
                }
                Completion::Normal(Value::Undefined)
            }
        }
    }

    // GetBindingValue, §10.2.1.1.4 / §10.2.1.2.4. `alternate` selects the
    // most recent skipped-mode write when one exists.
    pub fn env_get_binding_value(
        &mut self,
        env: &EnvRef,
        name: &str,
        strict: bool,
        alternate: bool,
    ) -> Completion {
        enum Found {
            Value(Value),
            Uninitialized,
            Object(u64),
            Missing,
        }
        let found = {
            let env_ref = env.borrow();
            match &env_ref.record {
                EnvRecord::Declarative(rec) => match rec.bindings.get(name) {
                    Some(b) if !b.is_initialized => Found::Uninitialized,
                    Some(b) => {
                        if alternate {
                            if let Some((_, v)) =
                                b.alternates.iter().max_by_key(|(id, _)| **id)
                            {
                                Found::Value(v.clone())
                            } else {
                                Found::Value(b.value.clone())
                            }
                        } else {
                            Found::Value(b.value.clone())
                        }
                    }
                    None => Found::Missing,
                },
                EnvRecord::Object(rec) => Found::Object(rec.binding_object.borrow().id.unwrap()),
            }
        };
        match found {
            Found::Value(v) => Completion::Normal(v),
            Found::Uninitialized => {
                if strict {
                    self.handle_recoverable_native_exception(
                        ErrorKind::ReferenceError,
                        &format!("'{name}' is not initialised"),
                    )
                } else {
                    Completion::Normal(Value::Undefined)
                }
            }
            Found::Object(id) => {
                if alternate {
                    self.object_get_alternate(id, name)
                } else {
                    self.object_get(id, name)
                }
            }
            Found::Missing => self.handle_recoverable_native_exception(
                ErrorKind::ReferenceError,
                &format!("'{name}' is not defined"),
            ),
        }
    }

    // DeleteBinding, §10.2.1.1.5 / §10.2.1.2.5
    pub fn env_delete_binding(&mut self, env: &EnvRef, name: &str) -> Completion {
        let object_id = {
            let mut env_mut = env.borrow_mut();
            match &mut env_mut.record {
                EnvRecord::Declarative(rec) => {
                    let deletable = match rec.bindings.get(name) {
                        None => return Completion::Normal(Value::Boolean(true)),
                        Some(b) => b.is_deletable,
                    };
                    if deletable {
                        rec.bindings.remove(name);
                        return Completion::Normal(Value::Boolean(true));
                    }
                    return Completion::Normal(Value::Boolean(false));
                }
                EnvRecord::Object(rec) => rec.binding_object.borrow().id.unwrap(),
            }
        };
        self.object_delete(object_id, name, false)
    }

    // ImplicitThisValue, §10.2.1.1.6 / §10.2.1.2.6
    pub fn env_implicit_this(&self, env: &EnvRef) -> Value {
        match &env.borrow().record {
            EnvRecord::Declarative(_) => Value::Undefined,
            EnvRecord::Object(rec) => {
                if rec.provide_this {
                    let id = rec.binding_object.borrow().id.unwrap();
                    Value::Object(crate::types::ObjectHandle { id })
                } else {
                    Value::Undefined
                }
            }
        }
    }

    /// GetIdentifierReference, §10.2.2.1: walk the scope chain from the
    /// innermost environment outward. An indeterminate HasBinding answer
    /// counts as a hit so reads surface Unknown instead of a false
    /// ReferenceError.
    pub fn resolve_identifier(&mut self, env: &EnvRef, name: &str, strict: bool) -> Reference {
        let mut current = Some(env.clone());
        while let Some(lex) = current {
            match self.env_has_binding(&lex, name) {
                Some(true) | None => {
                    return Reference {
                        base: ReferenceBase::Env(lex),
                        referenced_name: name.to_string(),
                        strict,
                    };
                }
                Some(false) => {}
            }
            current = lex.borrow().outer.clone();
        }
        Reference::unresolvable(name.to_string(), strict)
    }

    // GetValue, §8.7.1
    pub fn get_value(&mut self, v: RefOrValue) -> Completion {
        match v {
            RefOrValue::Value(val) => Completion::Normal(val),
            RefOrValue::Ref(r) => match &r.base {
                ReferenceBase::Unresolvable => self.handle_recoverable_native_exception(
                    ErrorKind::ReferenceError,
                    &format!("'{}' is not defined", r.referenced_name),
                ),
                ReferenceBase::Value(base) => {
                    let base = base.clone();
                    self.get_value_property(&base, &r.referenced_name)
                }
                ReferenceBase::Env(env) => {
                    let env = env.clone();
                    self.env_get_binding_value(&env, &r.referenced_name, r.strict, false)
                }
            },
        }
    }

    // PutValue, §8.7.2
    pub fn put_value(&mut self, target: &RefOrValue, value: Value) -> Completion {
        let r = match target {
            RefOrValue::Value(_) => {
                return self.handle_recoverable_native_exception(
                    ErrorKind::ReferenceError,
                    "Invalid assignment target",
                );
            }
            RefOrValue::Ref(r) => r,
        };
        match &r.base {
            ReferenceBase::Unresolvable => {
                if r.strict {
                    return self.handle_recoverable_native_exception(
                        ErrorKind::ReferenceError,
                        &format!("'{}' is not defined", r.referenced_name),
                    );
                }
                // Non-strict assignment to an unresolvable reference
                // creates a global binding.
                let global_id = self.global_object().borrow().id.unwrap();
                let result = self.object_put(global_id, &r.referenced_name, value, false);
                if result.is_abrupt() {
                    return result;
                }
                self.emit(AnalysisEvent::UndeclaredGlobalVariableCreated {
                    name: r.referenced_name.clone(),
                });
                Completion::Normal(Value::Undefined)
            }
            ReferenceBase::Value(base) => match base {
                Value::Unknown => Completion::Normal(Value::Undefined),
                Value::Object(o) => self.object_put(o.id, &r.referenced_name, value, r.strict),
                Value::Undefined | Value::Null => self.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    &format!(
                        "Cannot set property '{}' of {base}",
                        r.referenced_name
                    ),
                ),
                primitive => {
                    // Implicit boxing; the write lands on the transient
                    // wrapper and is observable only through events.
                    let primitive = primitive.clone();
                    let boxed = match self.to_object(&primitive) {
                        Completion::Normal(v) => v,
                        other => return other,
                    };
                    if let Value::Object(o) = boxed {
                        // Writes through a primitive-based reference fail
                        // in strict mode since the wrapper is transient.
                        self.object_put(o.id, &r.referenced_name, value, r.strict)
                    } else {
                        Completion::Normal(Value::Undefined)
                    }
                }
            },
            ReferenceBase::Env(env) => {
                let env = env.clone();
                self.env_set_mutable_binding(&env, &r.referenced_name, value, r.strict)
            }
        }
    }

    /// [[CanPut]] exposed at the value level for analyzers.
    pub fn value_can_put(&self, base: &Value, name: &str) -> CanPut {
        match base {
            Value::Object(o) => self
                .get_object(o.id)
                .map(|obj| obj.borrow().can_put(name))
                .unwrap_or(CanPut::No),
            Value::Unknown => CanPut::Unknown,
            _ => CanPut::No,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    #[test]
    fn declarative_binding_round_trip() {
        let mut engine = Engine::new();
        let env = LexicalEnvironment::new_declarative(None, 0);
        engine.env_create_mutable_binding(&env, "x", false);
        engine.env_set_mutable_binding(&env, "x", Value::Number(3.0), false);
        match engine.env_get_binding_value(&env, "x", false, false) {
            Completion::Normal(Value::Number(n)) => assert_eq!(n, 3.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn immutable_binding_initialises_once() {
        let mut engine = Engine::new();
        let env = LexicalEnvironment::new_declarative(None, 0);
        engine.env_create_immutable_binding(&env, "c");
        engine.env_initialize_immutable_binding(&env, "c", Value::Number(1.0));
        // Non-strict assignment to an immutable binding is a no-op.
        engine.env_set_mutable_binding(&env, "c", Value::Number(2.0), false);
        match engine.env_get_binding_value(&env, "c", false, false) {
            Completion::Normal(Value::Number(n)) => assert_eq!(n, 1.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn identifier_resolution_walks_outward() {
        let mut engine = Engine::new();
        let outer = LexicalEnvironment::new_declarative(None, 0);
        engine.env_create_mutable_binding(&outer, "x", false);
        let inner = LexicalEnvironment::new_declarative(Some(outer.clone()), 0);
        let reference = engine.resolve_identifier(&inner, "x", false);
        assert!(matches!(reference.base, ReferenceBase::Env(_)));
        let missing = engine.resolve_identifier(&inner, "zzz", false);
        assert!(missing.is_unresolvable());
    }

    #[test]
    fn unresolvable_put_creates_global_and_fires_event() {
        let mut engine = Engine::new();
        let r = RefOrValue::Ref(Reference::unresolvable("implicitGlobal".to_string(), false));
        engine.put_value(&r, Value::Number(5.0));
        let global = engine.global_object();
        let id = global.borrow().id.unwrap();
        match engine.object_get(id, "implicitGlobal") {
            Completion::Normal(Value::Number(n)) => assert_eq!(n, 5.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unresolvable_get_recovers_with_unknown() {
        let mut engine = Engine::new();
        let r = RefOrValue::Ref(Reference::unresolvable("missing".to_string(), false));
        match engine.get_value(r) {
            Completion::Normal(Value::Unknown) => {}
            other => panic!("expected Unknown, got {other:?}"),
        }
        assert_eq!(engine.report().errors.len(), 1);
        assert_eq!(engine.report().errors[0].kind, "ReferenceError");
    }

    #[test]
    fn skipped_mode_binding_write_preserves_primary() {
        let mut engine = Engine::new();
        let env = LexicalEnvironment::new_declarative(None, 0);
        engine.env_create_mutable_binding(&env, "x", false);
        engine.env_set_mutable_binding(&env, "x", Value::Number(1.0), false);
        let env2 = env.clone();
        engine.process_in_skipped_mode(move |engine| {
            engine.env_set_mutable_binding(&env2, "x", Value::Number(9.0), false)
        });
        match engine.env_get_binding_value(&env, "x", false, false) {
            Completion::Normal(Value::Number(n)) => assert_eq!(n, 1.0),
            other => panic!("unexpected {other:?}"),
        }
        match engine.env_get_binding_value(&env, "x", false, true) {
            Completion::Normal(Value::Number(n)) => assert_eq!(n, 9.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ambiguous_escaping_binding_write_degrades() {
        let mut engine = Engine::new();
        let env = LexicalEnvironment::new_declarative(None, 0);
        engine.env_create_mutable_binding(&env, "x", false);
        engine.env_set_mutable_binding(&env, "x", Value::Number(1.0), false);
        engine.enter_ambiguous_block();
        engine.env_set_mutable_binding(&env, "x", Value::Number(7.0), false);
        engine.exit_ambiguous_block();
        match engine.env_get_binding_value(&env, "x", false, false) {
            Completion::Normal(Value::Unknown) => {}
            other => panic!("expected Unknown, got {other:?}"),
        }
    }
}
