use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::Statement;
use crate::engine::Engine;
use crate::types::{Value, number_ops};

/// Completion records, §8.9. `Unroll` is not part of the language: it is
/// the engine's own signal for unwinding out of a runaway recursion or
/// iteration, and unlike `Throw` it is never swallowed by skipped mode.
#[derive(Debug)]
pub enum Completion {
    Normal(Value),
    Return(Value),
    Throw(Value),
    Break(Option<String>),
    Continue(Option<String>),
    Unroll,
}

impl Completion {
    pub fn is_abrupt(&self) -> bool {
        !matches!(self, Completion::Normal(_))
    }
}

pub type NativeFn = Rc<dyn Fn(&mut Engine, &Value, &[Value]) -> Completion>;

pub enum JsFunction {
    User {
        name: Option<String>,
        params: Vec<String>,
        body: Rc<Vec<Statement>>,
        closure: EnvRef,
        strict: bool,
    },
    Native(String, usize, NativeFn),
}

impl JsFunction {
    pub fn native(
        name: String,
        arity: usize,
        f: impl Fn(&mut Engine, &Value, &[Value]) -> Completion + 'static,
    ) -> Self {
        JsFunction::Native(name, arity, Rc::new(f))
    }

    pub fn name(&self) -> &str {
        match self {
            JsFunction::User { name, .. } => name.as_deref().unwrap_or(""),
            JsFunction::Native(name, _, _) => name,
        }
    }
}

impl Clone for JsFunction {
    fn clone(&self) -> Self {
        match self {
            JsFunction::User {
                name,
                params,
                body,
                closure,
                strict,
            } => JsFunction::User {
                name: name.clone(),
                params: params.clone(),
                body: body.clone(),
                closure: closure.clone(),
                strict: *strict,
            },
            JsFunction::Native(name, arity, f) => JsFunction::Native(name.clone(), *arity, f.clone()),
        }
    }
}

impl std::fmt::Debug for JsFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsFunction::User { name, .. } => write!(f, "JsFunction::User({name:?})"),
            JsFunction::Native(name, _, _) => write!(f, "JsFunction::Native({name:?})"),
        }
    }
}

/// A property descriptor, §8.10. Fields are `None` when absent so the
/// present/missing distinctions of the spec algorithms are representable.
#[derive(Clone, Debug, Default)]
pub struct PropertyDescriptor {
    pub value: Option<Value>,
    pub writable: Option<bool>,
    pub get: Option<Value>,
    pub set: Option<Value>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

impl PropertyDescriptor {
    pub fn data(value: Value, writable: bool, enumerable: bool, configurable: bool) -> Self {
        PropertyDescriptor {
            value: Some(value),
            writable: Some(writable),
            get: None,
            set: None,
            enumerable: Some(enumerable),
            configurable: Some(configurable),
        }
    }

    pub fn accessor(
        get: Option<Value>,
        set: Option<Value>,
        enumerable: bool,
        configurable: bool,
    ) -> Self {
        PropertyDescriptor {
            value: None,
            writable: None,
            get,
            set,
            enumerable: Some(enumerable),
            configurable: Some(configurable),
        }
    }

    // §8.10.2
    pub fn is_data_descriptor(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    // §8.10.1
    pub fn is_accessor_descriptor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    // §8.10.3
    pub fn is_generic_descriptor(&self) -> bool {
        !self.is_data_descriptor() && !self.is_accessor_descriptor()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
            && self.writable.is_none()
            && self.get.is_none()
            && self.set.is_none()
            && self.enumerable.is_none()
            && self.configurable.is_none()
    }

    /// Field-by-field equality for §8.12.9 step 6, using SameValue on
    /// values. Both data and accessor branches yield a boolean.
    pub fn same_desc(&self, other: &PropertyDescriptor) -> bool {
        fn opt_same(a: &Option<Value>, b: &Option<Value>) -> bool {
            match (a, b) {
                (None, None) => true,
                (Some(x), Some(y)) => super::conversions::same_value(x, y),
                _ => false,
            }
        }
        opt_same(&self.value, &other.value)
            && self.writable == other.writable
            && opt_same(&self.get, &other.get)
            && opt_same(&self.set, &other.set)
            && self.enumerable == other.enumerable
            && self.configurable == other.configurable
    }

    /// Fill in defaults per §8.12.9 step 4 so a stored descriptor is
    /// always fully populated.
    pub fn complete(mut self) -> PropertyDescriptor {
        if self.is_accessor_descriptor() {
            self.get.get_or_insert(Value::Undefined);
            self.set.get_or_insert(Value::Undefined);
        } else {
            self.value.get_or_insert(Value::Undefined);
            self.writable.get_or_insert(false);
        }
        self.enumerable.get_or_insert(false);
        self.configurable.get_or_insert(false);
        self
    }
}

/// One named property of one object: the live descriptor plus the
/// alternate values written while skipped mode was active, keyed by
/// skipped-section id.
#[derive(Clone, Debug, Default)]
pub struct Property {
    pub desc: PropertyDescriptor,
    pub alternates: HashMap<u64, Value>,
}

impl Property {
    pub fn new(desc: PropertyDescriptor) -> Self {
        Property {
            desc,
            alternates: HashMap::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RegExpData {
    pub source: String,
    pub flags: String,
    pub global: bool,
    pub ignore_case: bool,
    pub multiline: bool,
    pub compiled: Option<regex::Regex>,
}

pub type ObjRef = Rc<RefCell<ObjectData>>;

pub struct ObjectData {
    pub id: Option<u64>,
    pub properties: HashMap<String, Property>,
    pub prototype: Option<ObjRef>,
    /// Set when the prototype link is statically indeterminate; [[CanPut]]
    /// then answers Unknown for properties not found on the object itself.
    pub prototype_unknown: bool,
    pub extensible: bool,
    pub class_name: String,
    pub callable: Option<JsFunction>,
    /// Wrapped primitive for String/Number/Boolean wrappers and the time
    /// value for Date objects.
    pub primitive_value: Option<Value>,
    pub regexp: Option<RegExpData>,
    /// Arguments-object alias map: index name -> (environment, formal
    /// parameter name). Present only on non-strict Arguments objects and
    /// consulted until the alias for an index is broken.
    pub parameter_map: Option<HashMap<String, (EnvRef, String)>>,
    /// Per-call override of the engine's `invoke_methods` setting.
    pub always_invoke: bool,
    /// Ambiguity depth at creation; the "creation closure" tag used to
    /// decide whether a mutation is local to its birth scope.
    pub ambient_at_creation: u32,
    /// Skipped-mode writes to names with no primary property yet, keyed
    /// name -> skipped-section id -> value. Keeps the pre-skip property
    /// map untouched.
    pub alternate_only: HashMap<String, HashMap<u64, Value>>,
}

impl ObjectData {
    pub fn new() -> Self {
        ObjectData {
            id: None,
            properties: HashMap::new(),
            prototype: None,
            prototype_unknown: false,
            extensible: true,
            class_name: "Object".to_string(),
            callable: None,
            primitive_value: None,
            regexp: None,
            parameter_map: None,
            always_invoke: false,
            ambient_at_creation: 0,
            alternate_only: HashMap::new(),
        }
    }

    pub fn is_callable(&self) -> bool {
        self.callable.is_some()
    }

    pub fn is_array(&self) -> bool {
        self.class_name == "Array"
    }

    /// Convenience used by the built-in library to install a method or
    /// constant without the full descriptor ceremony.
    pub fn insert_builtin(&mut self, name: String, value: Value) {
        self.properties.insert(
            name,
            Property::new(PropertyDescriptor::data(value, true, false, true)),
        );
    }

    pub fn insert_value(&mut self, name: String, value: Value) {
        self.properties.insert(
            name,
            Property::new(PropertyDescriptor::data(value, true, true, true)),
        );
    }

    pub fn get_property_value(&self, name: &str) -> Option<Value> {
        self.properties
            .get(name)
            .and_then(|p| p.desc.value.clone())
    }
}

impl Default for ObjectData {
    fn default() -> Self {
        ObjectData::new()
    }
}

/// Parse a property name as an array index, §15.4: a string whose
/// ToUint32 round-trips and is below 2^32-1.
pub fn array_index_of(name: &str) -> Option<u32> {
    let n: f64 = name.parse().ok()?;
    let idx = number_ops::to_uint32(n);
    if idx as f64 == n && idx != u32::MAX && number_ops::to_string(n) == name {
        Some(idx)
    } else {
        None
    }
}

// Environment records, §10.2.1

pub type EnvRef = Rc<RefCell<LexicalEnvironment>>;

pub struct LexicalEnvironment {
    pub record: EnvRecord,
    pub outer: Option<EnvRef>,
    /// Ambiguity depth when the environment was created; writes from a
    /// deeper ambiguous block are escaping writes and degrade to Unknown.
    pub ambient_at_creation: u32,
}

impl LexicalEnvironment {
    pub fn new_declarative(outer: Option<EnvRef>, ambient: u32) -> EnvRef {
        Rc::new(RefCell::new(LexicalEnvironment {
            record: EnvRecord::Declarative(DeclarativeRecord {
                bindings: HashMap::new(),
            }),
            outer,
            ambient_at_creation: ambient,
        }))
    }

    pub fn new_object(
        binding_object: ObjRef,
        provide_this: bool,
        outer: Option<EnvRef>,
        ambient: u32,
    ) -> EnvRef {
        Rc::new(RefCell::new(LexicalEnvironment {
            record: EnvRecord::Object(ObjectRecord {
                binding_object,
                provide_this,
            }),
            outer,
            ambient_at_creation: ambient,
        }))
    }
}

pub enum EnvRecord {
    Declarative(DeclarativeRecord),
    Object(ObjectRecord),
}

pub struct DeclarativeRecord {
    pub bindings: HashMap<String, Binding>,
}

#[derive(Clone, Debug)]
pub struct Binding {
    pub value: Value,
    pub alternates: HashMap<u64, Value>,
    pub is_deletable: bool,
    pub is_mutable: bool,
    pub is_initialized: bool,
}

impl Binding {
    pub fn mutable(value: Value, deletable: bool) -> Self {
        Binding {
            value,
            alternates: HashMap::new(),
            is_deletable: deletable,
            is_mutable: true,
            is_initialized: true,
        }
    }

    pub fn immutable_uninitialized() -> Self {
        Binding {
            value: Value::Undefined,
            alternates: HashMap::new(),
            is_deletable: false,
            is_mutable: false,
            is_initialized: false,
        }
    }
}

pub struct ObjectRecord {
    pub binding_object: ObjRef,
    pub provide_this: bool,
}

// References, §8.7

#[derive(Clone)]
pub enum ReferenceBase {
    Unresolvable,
    Value(Value),
    Env(EnvRef),
}

#[derive(Clone)]
pub struct Reference {
    pub base: ReferenceBase,
    pub referenced_name: String,
    pub strict: bool,
}

impl Reference {
    pub fn unresolvable(name: String, strict: bool) -> Self {
        Reference {
            base: ReferenceBase::Unresolvable,
            referenced_name: name,
            strict,
        }
    }

    pub fn is_property_reference(&self) -> bool {
        matches!(self.base, ReferenceBase::Value(_))
    }

    pub fn has_primitive_base(&self) -> bool {
        matches!(
            self.base,
            ReferenceBase::Value(
                Value::Boolean(_) | Value::Number(_) | Value::String(_)
            )
        )
    }

    pub fn is_unresolvable(&self) -> bool {
        matches!(self.base, ReferenceBase::Unresolvable)
    }
}

/// What the rule processor produces for an expression: either a resolved
/// value or a Reference awaiting GetValue/PutValue.
pub enum RefOrValue {
    Ref(Reference),
    Value(Value),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_kind_predicates() {
        let data = PropertyDescriptor::data(Value::Number(1.0), true, true, true);
        assert!(data.is_data_descriptor());
        assert!(!data.is_accessor_descriptor());

        let accessor = PropertyDescriptor::accessor(Some(Value::Undefined), None, false, false);
        assert!(accessor.is_accessor_descriptor());
        assert!(!accessor.is_data_descriptor());

        let generic = PropertyDescriptor {
            enumerable: Some(true),
            ..Default::default()
        };
        assert!(generic.is_generic_descriptor());
    }

    #[test]
    fn descriptor_complete_fills_defaults() {
        let d = PropertyDescriptor {
            value: Some(Value::Number(7.0)),
            ..Default::default()
        }
        .complete();
        assert_eq!(d.writable, Some(false));
        assert_eq!(d.enumerable, Some(false));
        assert_eq!(d.configurable, Some(false));
    }

    #[test]
    fn same_desc_uses_same_value() {
        let a = PropertyDescriptor::data(Value::Number(f64::NAN), false, false, false);
        let b = PropertyDescriptor::data(Value::Number(f64::NAN), false, false, false);
        assert!(a.same_desc(&b));

        let plus = PropertyDescriptor::data(Value::Number(0.0), false, false, false);
        let minus = PropertyDescriptor::data(Value::Number(-0.0), false, false, false);
        assert!(!plus.same_desc(&minus));
    }

    #[test]
    fn array_index_parsing() {
        assert_eq!(array_index_of("0"), Some(0));
        assert_eq!(array_index_of("42"), Some(42));
        assert_eq!(array_index_of("-1"), None);
        assert_eq!(array_index_of("01"), None);
        assert_eq!(array_index_of("1.5"), None);
        assert_eq!(array_index_of("4294967295"), None);
        assert_eq!(array_index_of("length"), None);
    }
}
