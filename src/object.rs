//! The polymorphic value model.
//!
//! Every value the interpreter touches is an [`Object`]: a handle that owns
//! one underlying storage or is void. Storage comes in two kinds:
//!
//! - **Host-backed** - wraps a concrete Rust value `T`. Which operators the
//!   value supports is fixed when `T` is registered, through its
//!   [`OpTable`]; invoking anything else fails with a typed error. Fields,
//!   methods and constructors registered against `T` travel with every
//!   clone, so a method invoked on a copy always works on the copy's
//!   storage.
//! - **Script-backed** - a map of named members plus a map of methods,
//!   produced by `struct` declarations in source. Operators apply
//!   member-wise; equality is all-members-equal, ordering is
//!   all-members-satisfy.
//!
//! Handles can also be views: a member view projects into a named field of
//! a host value and an element view into an indexed slot, so that writing
//! through the view mutates the parent. Views stack - `points[1].y` is a
//! member view over an element view, and a write walks back through both
//! levels. Script members are shared cells and alias naturally.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::function::Function;
use crate::scope::Scope;

/// Arithmetic operator selector used across the value model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithKind {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithKind {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithKind::Add => "+",
            ArithKind::Sub => "-",
            ArithKind::Mul => "*",
            ArithKind::Div => "/",
        }
    }
}

/// Comparison operator selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareKind {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
}

impl CompareKind {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareKind::Less => "<",
            CompareKind::LessEqual => "<=",
            CompareKind::Greater => ">",
            CompareKind::GreaterEqual => ">=",
            CompareKind::Equal => "==",
            CompareKind::NotEqual => "!=",
        }
    }
}

/// Operator set of a host type, chosen at registration time.
///
/// Every entry is optional; a `None` means the operator is not available
/// and using it from script is a typed error. The numeric bridge
/// (`to_num`/`from_num`) is what allows C-style conversions between the
/// arithmetic types.
pub struct OpTable<T> {
    pub add: Option<fn(&mut T, &T) -> Result<()>>,
    pub sub: Option<fn(&mut T, &T) -> Result<()>>,
    pub mul: Option<fn(&mut T, &T) -> Result<()>>,
    pub div: Option<fn(&mut T, &T) -> Result<()>>,
    pub neg: Option<fn(&T) -> T>,
    pub inc: Option<fn(&mut T)>,
    pub dec: Option<fn(&mut T)>,
    pub lt: Option<fn(&T, &T) -> bool>,
    pub le: Option<fn(&T, &T) -> bool>,
    pub gt: Option<fn(&T, &T) -> bool>,
    pub ge: Option<fn(&T, &T) -> bool>,
    pub eq: Option<fn(&T, &T) -> bool>,
    pub ne: Option<fn(&T, &T) -> bool>,
    pub to_num: Option<fn(&T) -> f64>,
    pub from_num: Option<fn(f64) -> T>,
    pub index_get: Option<fn(&T, usize) -> Result<Object>>,
    pub index_set: Option<fn(&mut T, usize, &Object) -> Result<()>>,
}

impl<T> Default for OpTable<T> {
    fn default() -> Self {
        OpTable {
            add: None,
            sub: None,
            mul: None,
            div: None,
            neg: None,
            inc: None,
            dec: None,
            lt: None,
            le: None,
            gt: None,
            ge: None,
            eq: None,
            ne: None,
            to_num: None,
            from_num: None,
            index_get: None,
            index_set: None,
        }
    }
}

impl<T> Clone for OpTable<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for OpTable<T> {}

/// A Rust type that can cross the host/script boundary.
///
/// The associated name is the canonical script-side type name; the op table
/// declares which operators instances support. Custom host types usually
/// keep the default (empty) table and expose behavior through registered
/// methods instead.
pub trait ScriptType: Clone + Default + 'static {
    fn type_name() -> String;

    fn ops() -> OpTable<Self> {
        OpTable::default()
    }
}

macro_rules! integer_script_type {
    ($ty:ty, $name:literal) => {
        impl ScriptType for $ty {
            fn type_name() -> String {
                $name.to_string()
            }

            fn ops() -> OpTable<Self> {
                OpTable {
                    add: Some(|a, b| {
                        *a = a.wrapping_add(*b);
                        Ok(())
                    }),
                    sub: Some(|a, b| {
                        *a = a.wrapping_sub(*b);
                        Ok(())
                    }),
                    mul: Some(|a, b| {
                        *a = a.wrapping_mul(*b);
                        Ok(())
                    }),
                    div: Some(|a, b| {
                        if *b == 0 {
                            return Err(Error::runtime("division by zero"));
                        }
                        *a = a.wrapping_div(*b);
                        Ok(())
                    }),
                    neg: Some(|a| a.wrapping_neg()),
                    inc: Some(|a| *a = a.wrapping_add(1)),
                    dec: Some(|a| *a = a.wrapping_sub(1)),
                    lt: Some(|a, b| a < b),
                    le: Some(|a, b| a <= b),
                    gt: Some(|a, b| a > b),
                    ge: Some(|a, b| a >= b),
                    eq: Some(|a, b| a == b),
                    ne: Some(|a, b| a != b),
                    to_num: Some(|a| *a as f64),
                    from_num: Some(|v| v as $ty),
                    index_get: None,
                    index_set: None,
                }
            }
        }
    };
}

macro_rules! float_script_type {
    ($ty:ty, $name:literal) => {
        impl ScriptType for $ty {
            fn type_name() -> String {
                $name.to_string()
            }

            fn ops() -> OpTable<Self> {
                OpTable {
                    add: Some(|a, b| {
                        *a += *b;
                        Ok(())
                    }),
                    sub: Some(|a, b| {
                        *a -= *b;
                        Ok(())
                    }),
                    mul: Some(|a, b| {
                        *a *= *b;
                        Ok(())
                    }),
                    div: Some(|a, b| {
                        *a /= *b;
                        Ok(())
                    }),
                    neg: Some(|a| -*a),
                    inc: Some(|a| *a += 1.0),
                    dec: Some(|a| *a -= 1.0),
                    lt: Some(|a, b| a < b),
                    le: Some(|a, b| a <= b),
                    gt: Some(|a, b| a > b),
                    ge: Some(|a, b| a >= b),
                    eq: Some(|a, b| a == b),
                    ne: Some(|a, b| a != b),
                    to_num: Some(|a| *a as f64),
                    from_num: Some(|v| v as $ty),
                    index_get: None,
                    index_set: None,
                }
            }
        }
    };
}

integer_script_type!(i8, "int8_t");
integer_script_type!(i16, "int16_t");
integer_script_type!(i32, "int");
integer_script_type!(i64, "int64_t");
integer_script_type!(u8, "uint8_t");
integer_script_type!(u16, "uint16_t");
integer_script_type!(u32, "uint32_t");
integer_script_type!(u64, "uint64_t");
float_script_type!(f32, "float");
float_script_type!(f64, "double");

impl ScriptType for bool {
    fn type_name() -> String {
        "bool".to_string()
    }

    fn ops() -> OpTable<Self> {
        OpTable {
            eq: Some(|a, b| a == b),
            ne: Some(|a, b| a != b),
            to_num: Some(|a| {
                if *a {
                    1.0
                } else {
                    0.0
                }
            }),
            from_num: Some(|v| v != 0.0),
            ..OpTable::default()
        }
    }
}

impl ScriptType for char {
    fn type_name() -> String {
        "char".to_string()
    }

    fn ops() -> OpTable<Self> {
        OpTable {
            lt: Some(|a, b| a < b),
            le: Some(|a, b| a <= b),
            gt: Some(|a, b| a > b),
            ge: Some(|a, b| a >= b),
            eq: Some(|a, b| a == b),
            ne: Some(|a, b| a != b),
            to_num: Some(|a| *a as u32 as f64),
            ..OpTable::default()
        }
    }
}

impl ScriptType for String {
    fn type_name() -> String {
        "string".to_string()
    }

    fn ops() -> OpTable<Self> {
        OpTable {
            add: Some(|a, b| {
                a.push_str(b);
                Ok(())
            }),
            lt: Some(|a, b| a < b),
            le: Some(|a, b| a <= b),
            gt: Some(|a, b| a > b),
            ge: Some(|a, b| a >= b),
            eq: Some(|a, b| a == b),
            ne: Some(|a, b| a != b),
            ..OpTable::default()
        }
    }
}

impl<T: ScriptType> ScriptType for Vec<T> {
    fn type_name() -> String {
        format!("vector<{}>", T::type_name())
    }

    fn ops() -> OpTable<Self> {
        OpTable {
            index_get: Some(|v, i| match v.get(i) {
                Some(element) => Ok(Object::from_value(element.clone())),
                None => Err(Error::runtime(format!(
                    "index {} is out of range [0, {})",
                    i,
                    v.len()
                ))),
            }),
            index_set: Some(|v, i, value| {
                let new_value = value.as_::<T>()?;
                let len = v.len();
                match v.get_mut(i) {
                    Some(slot) => {
                        *slot = new_value;
                        Ok(())
                    }
                    None => Err(Error::runtime(format!(
                        "index {} is out of range [0, {})",
                        i, len
                    ))),
                }
            }),
            ..OpTable::default()
        }
    }
}

/// A method bound against a host type, invoked with a mutable receiver.
pub trait HostMethod<T> {
    fn invoke(&self, receiver: &mut T, args: &[Object]) -> Result<Option<Object>>;
}

/// A registered constructor: tried in registration order, viable when the
/// arity matches and every argument converts.
pub struct HostCtor<T> {
    pub(crate) arity: usize,
    pub(crate) build: Rc<dyn Fn(&[Object]) -> Option<T>>,
}

impl<T> Clone for HostCtor<T> {
    fn clone(&self) -> Self {
        HostCtor {
            arity: self.arity,
            build: Rc::clone(&self.build),
        }
    }
}

struct FieldAccessor<T> {
    read: Rc<dyn Fn(&mut T) -> Object>,
    write: Rc<dyn Fn(&mut T, &Object) -> Result<()>>,
}

impl<T> Clone for FieldAccessor<T> {
    fn clone(&self) -> Self {
        FieldAccessor {
            read: Rc::clone(&self.read),
            write: Rc::clone(&self.write),
        }
    }
}

/// Everything registered against one host type, keyed by `TypeId` in the
/// thread-local registry below. Every new wrap of the type (declared
/// variables, container elements, host-function returns) picks these up,
/// so registrations follow the type rather than one exemplar.
struct RegisteredParts<T: ScriptType> {
    fields: BTreeMap<String, FieldAccessor<T>>,
    methods: BTreeMap<String, Rc<dyn HostMethod<T>>>,
    ctors: Vec<HostCtor<T>>,
}

impl<T: ScriptType> Default for RegisteredParts<T> {
    fn default() -> Self {
        RegisteredParts {
            fields: BTreeMap::new(),
            methods: BTreeMap::new(),
            ctors: Vec::new(),
        }
    }
}

thread_local! {
    static HOST_REGISTRY: RefCell<HashMap<TypeId, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

fn with_registered_parts<T: ScriptType>(f: impl FnOnce(&mut RegisteredParts<T>)) {
    HOST_REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        let entry = registry
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(RegisteredParts::<T>::default()) as Box<dyn Any>);
        if let Some(parts) = entry.downcast_mut::<RegisteredParts<T>>() {
            f(parts);
        }
    });
}

/// Type-erased face of a host-backed storage.
pub(crate) trait HostStore {
    fn clone_box(&self) -> Box<dyn HostStore>;
    fn type_name(&self) -> &str;
    fn value_any(&self) -> &dyn Any;
    fn store_any_mut(&mut self) -> &mut dyn Any;
    fn to_num(&self) -> Option<f64>;
    fn assign(&mut self, rhs: &Object) -> Result<()>;
    fn arith(&mut self, kind: ArithKind, rhs: &Object) -> Result<()>;
    fn neg_in_place(&mut self) -> Result<()>;
    fn step(&mut self, dec: bool) -> Result<()>;
    fn compare(&self, kind: CompareKind, rhs: &Object) -> Result<bool>;
    fn get_element(&self, index: usize) -> Result<Object>;
    fn set_element(&mut self, index: usize, value: &Object) -> Result<()>;
    fn has_field(&self, name: &str) -> bool;
    fn read_field(&mut self, name: &str) -> Result<Object>;
    fn write_field(&mut self, name: &str, value: &Object) -> Result<()>;
    fn has_method(&self, name: &str) -> bool;
    fn call_method(&mut self, name: &str, args: &[Object]) -> Result<Option<Object>>;
    fn construct(&self, args: &[Object]) -> Result<Object>;
}

/// Host-backed storage: the wrapped value plus everything registered
/// against its type.
pub(crate) struct HostValue<T: ScriptType> {
    value: T,
    type_name: String,
    ops: OpTable<T>,
    fields: BTreeMap<String, FieldAccessor<T>>,
    methods: BTreeMap<String, Rc<dyn HostMethod<T>>>,
    ctors: Vec<HostCtor<T>>,
}

impl<T: ScriptType> Clone for HostValue<T> {
    fn clone(&self) -> Self {
        HostValue {
            value: self.value.clone(),
            type_name: self.type_name.clone(),
            ops: self.ops,
            fields: self.fields.clone(),
            methods: self.methods.clone(),
            ctors: self.ctors.clone(),
        }
    }
}

impl<T: ScriptType> HostValue<T> {
    pub(crate) fn new(value: T) -> Self {
        let mut host = HostValue {
            value,
            type_name: T::type_name(),
            ops: T::ops(),
            fields: BTreeMap::new(),
            methods: BTreeMap::new(),
            ctors: Vec::new(),
        };
        HOST_REGISTRY.with(|registry| {
            if let Some(parts) = registry.borrow().get(&TypeId::of::<T>()) {
                if let Some(parts) = parts.downcast_ref::<RegisteredParts<T>>() {
                    host.fields = parts.fields.clone();
                    host.methods = parts.methods.clone();
                    host.ctors = parts.ctors.clone();
                }
            }
        });
        host
    }

    pub(crate) fn add_field<M: ScriptType>(&mut self, name: &str, project: fn(&mut T) -> &mut M) {
        let read = move |value: &mut T| Object::from_value(project(value).clone());
        let write = move |value: &mut T, rhs: &Object| -> Result<()> {
            *project(value) = rhs.as_::<M>()?;
            Ok(())
        };
        let accessor = FieldAccessor {
            read: Rc::new(read),
            write: Rc::new(write),
        };
        self.fields.insert(name.to_string(), accessor.clone());
        with_registered_parts::<T>(|parts| {
            parts.fields.insert(name.to_string(), accessor);
        });
    }

    pub(crate) fn add_method(&mut self, name: &str, method: Rc<dyn HostMethod<T>>) {
        self.methods.insert(name.to_string(), Rc::clone(&method));
        with_registered_parts::<T>(|parts| {
            parts.methods.insert(name.to_string(), method);
        });
    }

    pub(crate) fn add_ctor(&mut self, ctor: HostCtor<T>) {
        self.ctors.push(ctor.clone());
        with_registered_parts::<T>(|parts| {
            parts.ctors.push(ctor);
        });
    }

    fn missing_operator(&self, symbol: &str) -> Error {
        Error::type_error(format!(
            "type \"{}\" does not have operator \"{}\"",
            self.type_name, symbol
        ))
    }

    fn coerce(&self, rhs: &Object) -> Result<T> {
        rhs.as_opt::<T>().ok_or_else(|| {
            Error::type_error(format!(
                "cannot convert type \"{}\" to type \"{}\"",
                rhs.type_name(),
                self.type_name
            ))
        })
    }
}

impl<T: ScriptType> HostStore for HostValue<T> {
    fn clone_box(&self) -> Box<dyn HostStore> {
        Box::new(self.clone())
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn value_any(&self) -> &dyn Any {
        &self.value
    }

    fn store_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn to_num(&self) -> Option<f64> {
        self.ops.to_num.map(|f| f(&self.value))
    }

    fn assign(&mut self, rhs: &Object) -> Result<()> {
        let new_value = rhs.as_opt::<T>().ok_or_else(|| {
            Error::type_error(format!(
                "cannot assign type \"{}\" to type \"{}\"",
                rhs.type_name(),
                self.type_name
            ))
        })?;
        self.value = new_value;
        Ok(())
    }

    fn arith(&mut self, kind: ArithKind, rhs: &Object) -> Result<()> {
        let op = match kind {
            ArithKind::Add => self.ops.add,
            ArithKind::Sub => self.ops.sub,
            ArithKind::Mul => self.ops.mul,
            ArithKind::Div => self.ops.div,
        };
        let op = op.ok_or_else(|| self.missing_operator(kind.symbol()))?;
        let rhs_value = self.coerce(rhs)?;
        op(&mut self.value, &rhs_value)
    }

    fn neg_in_place(&mut self) -> Result<()> {
        let neg = self.ops.neg.ok_or_else(|| self.missing_operator("-"))?;
        self.value = neg(&self.value);
        Ok(())
    }

    fn step(&mut self, dec: bool) -> Result<()> {
        let (op, symbol) = if dec {
            (self.ops.dec, "--")
        } else {
            (self.ops.inc, "++")
        };
        let op = op.ok_or_else(|| self.missing_operator(symbol))?;
        op(&mut self.value);
        Ok(())
    }

    fn compare(&self, kind: CompareKind, rhs: &Object) -> Result<bool> {
        let op = match kind {
            CompareKind::Less => self.ops.lt,
            CompareKind::LessEqual => self.ops.le,
            CompareKind::Greater => self.ops.gt,
            CompareKind::GreaterEqual => self.ops.ge,
            CompareKind::Equal => self.ops.eq,
            CompareKind::NotEqual => self.ops.ne,
        };
        let op = op.ok_or_else(|| self.missing_operator(kind.symbol()))?;
        let rhs_value = self.coerce(rhs)?;
        Ok(op(&self.value, &rhs_value))
    }

    fn get_element(&self, index: usize) -> Result<Object> {
        let get = self
            .ops
            .index_get
            .ok_or_else(|| self.missing_operator("[]"))?;
        get(&self.value, index)
    }

    fn set_element(&mut self, index: usize, value: &Object) -> Result<()> {
        let set = self
            .ops
            .index_set
            .ok_or_else(|| self.missing_operator("[]"))?;
        set(&mut self.value, index, value)
    }

    fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    fn read_field(&mut self, name: &str) -> Result<Object> {
        let accessor = self.fields.get(name).cloned().ok_or_else(|| {
            Error::resolution(format!(
                "type \"{}\" does not have a member named \"{}\"",
                self.type_name, name
            ))
        })?;
        Ok((accessor.read)(&mut self.value))
    }

    fn write_field(&mut self, name: &str, value: &Object) -> Result<()> {
        let accessor = self.fields.get(name).cloned().ok_or_else(|| {
            Error::resolution(format!(
                "type \"{}\" does not have a member named \"{}\"",
                self.type_name, name
            ))
        })?;
        (accessor.write)(&mut self.value, value)
    }

    fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    fn call_method(&mut self, name: &str, args: &[Object]) -> Result<Option<Object>> {
        let method = self.methods.get(name).cloned().ok_or_else(|| {
            Error::resolution(format!(
                "type \"{}\" does not have a method named \"{}\"",
                self.type_name, name
            ))
        })?;
        method.invoke(&mut self.value, args)
    }

    fn construct(&self, args: &[Object]) -> Result<Object> {
        for ctor in &self.ctors {
            if ctor.arity != args.len() {
                continue;
            }
            if let Some(value) = (ctor.build)(args) {
                let mut built = self.clone();
                built.value = value;
                return Ok(Object::from_storage(Storage::Host(Box::new(built))));
            }
        }
        Err(Error::runtime(format!(
            "no viable constructor for type \"{}\" taking {} argument(s)",
            self.type_name,
            args.len()
        )))
    }
}

/// Script-backed storage: the authoritative state is the member map.
pub(crate) struct ScriptValue {
    pub(crate) type_name: String,
    pub(crate) members: BTreeMap<String, Object>,
    pub(crate) methods: BTreeMap<String, Function>,
    /// Keeps the struct body's scope alive; method definition scopes hang
    /// off it for lexical lookups.
    pub(crate) lexical: Option<Rc<Scope>>,
}

impl ScriptValue {
    fn deep_clone(&self) -> Result<ScriptValue> {
        let mut members = BTreeMap::new();
        for (name, cell) in &self.members {
            members.insert(name.clone(), cell.snapshot()?);
        }
        Ok(ScriptValue {
            type_name: self.type_name.clone(),
            members,
            methods: self.methods.clone(),
            lexical: self.lexical.clone(),
        })
    }

}

pub(crate) enum Storage {
    Host(Box<dyn HostStore>),
    Script(ScriptValue),
}

impl Storage {
    fn type_name(&self) -> String {
        match self {
            Storage::Host(host) => host.type_name().to_string(),
            Storage::Script(sv) => sv.type_name.clone(),
        }
    }

    fn deep_clone(&self) -> Result<Storage> {
        match self {
            Storage::Host(host) => Ok(Storage::Host(host.clone_box())),
            Storage::Script(sv) => Ok(Storage::Script(sv.deep_clone()?)),
        }
    }

    fn expect_same_script(&self, sv: &ScriptValue, rhs: &Object, what: &str) -> Result<()> {
        if rhs.type_name() != sv.type_name {
            return Err(Error::type_error(format!(
                "cannot {} type \"{}\" and type \"{}\"",
                what,
                sv.type_name,
                rhs.type_name()
            )));
        }
        Ok(())
    }

    fn assign_value(&mut self, rhs: &Object) -> Result<()> {
        match self {
            Storage::Host(host) => host.assign(rhs),
            Storage::Script(sv) => {
                if rhs.type_name() != sv.type_name {
                    return Err(Error::type_error(format!(
                        "cannot assign type \"{}\" to type \"{}\"",
                        rhs.type_name(),
                        sv.type_name
                    )));
                }
                for (name, cell) in &sv.members {
                    cell.assign(&rhs.member(name)?)?;
                }
                Ok(())
            }
        }
    }

    fn arith_in_place(&mut self, kind: ArithKind, rhs: &Object) -> Result<()> {
        match self {
            Storage::Host(host) => host.arith(kind, rhs),
            Storage::Script(sv) => {
                let sv_name = sv.type_name.clone();
                if rhs.type_name() != sv_name {
                    return Err(Error::type_error(format!(
                        "cannot apply operator \"{}\" to type \"{}\" and type \"{}\"",
                        kind.symbol(),
                        sv_name,
                        rhs.type_name()
                    )));
                }
                for (name, cell) in &sv.members {
                    cell.arith_assign(kind, &rhs.member(name)?)?;
                }
                Ok(())
            }
        }
    }

    fn neg_in_place(&mut self) -> Result<()> {
        match self {
            Storage::Host(host) => host.neg_in_place(),
            Storage::Script(sv) => {
                for cell in sv.members.values() {
                    cell.neg_in_place()?;
                }
                Ok(())
            }
        }
    }

    fn step_in_place(&mut self, dec: bool) -> Result<()> {
        match self {
            Storage::Host(host) => host.step(dec),
            Storage::Script(sv) => {
                for cell in sv.members.values() {
                    cell.step(dec)?;
                }
                Ok(())
            }
        }
    }

    fn compare_with(&self, kind: CompareKind, rhs: &Object) -> Result<bool> {
        match self {
            Storage::Host(host) => host.compare(kind, rhs),
            Storage::Script(sv) => {
                self.expect_same_script(sv, rhs, "compare")?;
                match kind {
                    // inequality holds as soon as one member differs
                    CompareKind::NotEqual => {
                        for (name, cell) in &sv.members {
                            if cell.compare_bool(kind, &rhs.member(name)?)? {
                                return Ok(true);
                            }
                        }
                        Ok(false)
                    }
                    // every member must satisfy the predicate
                    _ => {
                        for (name, cell) in &sv.members {
                            if !cell.compare_bool(kind, &rhs.member(name)?)? {
                                return Ok(false);
                            }
                        }
                        Ok(true)
                    }
                }
            }
        }
    }

    fn get_element(&self, index: usize) -> Result<Object> {
        match self {
            Storage::Host(host) => host.get_element(index),
            Storage::Script(sv) => Err(Error::type_error(format!(
                "type \"{}\" does not have operator \"[]\"",
                sv.type_name
            ))),
        }
    }

    fn set_element(&mut self, index: usize, value: &Object) -> Result<()> {
        match self {
            Storage::Host(host) => host.set_element(index, value),
            Storage::Script(sv) => Err(Error::type_error(format!(
                "type \"{}\" does not have operator \"[]\"",
                sv.type_name
            ))),
        }
    }
}

#[derive(Clone)]
enum Handle {
    Void,
    Owned(Rc<RefCell<Storage>>),
    /// Result of `new`: shares the pointee cell, reports the pointee's
    /// type name with a `*` suffix, and otherwise forwards every operation.
    Pointer {
        target: Rc<RefCell<Storage>>,
        type_name: String,
    },
    /// View into a named field of a host value; reads copy out, writes go
    /// back through the registered accessor. The parent may itself be a
    /// view, so chains like `points[1].y` resolve level by level.
    Member {
        parent: Box<Object>,
        name: String,
    },
    /// View into an indexed slot; chains the same way.
    Element {
        parent: Box<Object>,
        index: usize,
    },
}

/// Handle to a value: owns one storage, aliases one, or is void.
///
/// Cloning an `Object` clones the handle (aliases the same storage);
/// [`Object::snapshot`] makes the deep, detached copy that expression
/// evaluation hands around.
#[derive(Clone)]
pub struct Object {
    handle: Handle,
}

fn void_error() -> Error {
    Error::type_error("cannot use a void value")
}

fn check_index(index: i64) -> Result<usize> {
    usize::try_from(index)
        .map_err(|_| Error::runtime(format!("index {} is out of range", index)))
}

impl Object {
    pub fn void() -> Object {
        Object {
            handle: Handle::Void,
        }
    }

    /// Wraps a host value. Fields, methods and constructors registered
    /// against `T` are attached from the type registry, so container
    /// elements and host-function returns behave like declared variables.
    pub fn from_value<T: ScriptType>(value: T) -> Object {
        Object::from_storage(Storage::Host(Box::new(HostValue::new(value))))
    }

    pub(crate) fn from_storage(storage: Storage) -> Object {
        Object {
            handle: Handle::Owned(Rc::new(RefCell::new(storage))),
        }
    }

    pub(crate) fn from_script(value: ScriptValue) -> Object {
        Object::from_storage(Storage::Script(value))
    }

    pub fn is_void(&self) -> bool {
        matches!(self.handle, Handle::Void)
    }

    pub fn type_name(&self) -> String {
        match &self.handle {
            Handle::Void => "void".to_string(),
            Handle::Pointer { type_name, .. } => type_name.clone(),
            _ => self
                .with_resolved(|storage| Ok(storage.type_name()))
                .unwrap_or_else(|_| "void".to_string()),
        }
    }

    pub(crate) fn cell(&self) -> Result<Rc<RefCell<Storage>>> {
        match &self.handle {
            Handle::Owned(cell) | Handle::Pointer { target: cell, .. } => Ok(Rc::clone(cell)),
            Handle::Void => Err(void_error()),
            _ => Err(Error::type_error("cannot take a reference to a temporary value")),
        }
    }

    /// The value a view points at: a member or element copy for host
    /// paths, the shared cell for script members.
    fn view_read(&self) -> Result<Object> {
        match &self.handle {
            Handle::Void => Err(void_error()),
            Handle::Member { parent, name } => parent.read_member(name),
            Handle::Element { parent, index } => parent.read_element(*index),
            Handle::Owned(_) | Handle::Pointer { .. } => self.snapshot(),
        }
    }

    /// The member behind `name`: the shared cell for script storage, a
    /// detached copy read through the accessor for host storage. These
    /// read/write primitives are deliberately non-generic; the generic
    /// `with_resolved` pair leans on them so view chains resolve by plain
    /// runtime recursion.
    fn read_member(&self, name: &str) -> Result<Object> {
        match &self.handle {
            Handle::Void => Err(void_error()),
            Handle::Owned(cell) | Handle::Pointer { target: cell, .. } => {
                let mut storage = cell.borrow_mut();
                match &mut *storage {
                    Storage::Host(host) => host.read_field(name),
                    Storage::Script(sv) => sv.members.get(name).cloned().ok_or_else(|| {
                        Error::resolution(format!(
                            "type \"{}\" does not have a member named \"{}\"",
                            sv.type_name, name
                        ))
                    }),
                }
            }
            Handle::Member { .. } | Handle::Element { .. } => {
                let temp = self.view_read()?;
                temp.read_member(name)
            }
        }
    }

    fn write_member(&self, name: &str, value: &Object) -> Result<()> {
        match &self.handle {
            Handle::Void => Err(void_error()),
            Handle::Owned(cell) | Handle::Pointer { target: cell, .. } => {
                let mut storage = cell.borrow_mut();
                match &mut *storage {
                    Storage::Host(host) => host.write_field(name, value),
                    // script members are shared cells; the write already
                    // landed through the cell
                    Storage::Script(_) => Ok(()),
                }
            }
            Handle::Member { parent, name: own } => {
                let temp = parent.read_member(own)?;
                temp.write_member(name, value)?;
                parent.write_member(own, &temp)
            }
            Handle::Element { parent, index } => {
                let temp = parent.read_element(*index)?;
                temp.write_member(name, value)?;
                parent.write_element(*index, &temp)
            }
        }
    }

    fn read_element(&self, index: usize) -> Result<Object> {
        match &self.handle {
            Handle::Void => Err(void_error()),
            Handle::Owned(cell) | Handle::Pointer { target: cell, .. } => {
                cell.borrow().get_element(index)
            }
            Handle::Member { .. } | Handle::Element { .. } => {
                let temp = self.view_read()?;
                temp.read_element(index)
            }
        }
    }

    fn write_element(&self, index: usize, value: &Object) -> Result<()> {
        match &self.handle {
            Handle::Void => Err(void_error()),
            Handle::Owned(cell) | Handle::Pointer { target: cell, .. } => {
                cell.borrow_mut().set_element(index, value)
            }
            Handle::Member { parent, name } => {
                let temp = parent.read_member(name)?;
                temp.write_element(index, value)?;
                parent.write_member(name, &temp)
            }
            Handle::Element { parent, index: own } => {
                let temp = parent.read_element(*own)?;
                temp.write_element(index, value)?;
                parent.write_element(*own, &temp)
            }
        }
    }

    fn with_resolved<R>(&self, f: impl FnOnce(&Storage) -> Result<R>) -> Result<R> {
        match &self.handle {
            Handle::Void => Err(void_error()),
            Handle::Owned(cell) | Handle::Pointer { target: cell, .. } => {
                let storage = cell.borrow();
                f(&storage)
            }
            Handle::Member { .. } | Handle::Element { .. } => {
                // materialized view targets are owned handles, so this
                // recursion bottoms out one level down
                let temp = self.view_read()?;
                temp.with_resolved(f)
            }
        }
    }

    fn with_resolved_mut<R>(&self, f: impl FnOnce(&mut Storage) -> Result<R>) -> Result<R> {
        match &self.handle {
            Handle::Void => Err(void_error()),
            Handle::Owned(cell) | Handle::Pointer { target: cell, .. } => {
                let mut storage = cell.borrow_mut();
                f(&mut storage)
            }
            Handle::Member { parent, name } => {
                let temp = parent.read_member(name)?;
                let result = temp.with_resolved_mut(f)?;
                parent.write_member(name, &temp)?;
                Ok(result)
            }
            Handle::Element { parent, index } => {
                let temp = parent.read_element(*index)?;
                let result = temp.with_resolved_mut(f)?;
                parent.write_element(*index, &temp)?;
                Ok(result)
            }
        }
    }

    /// Deep, detached copy. For host storage this clones the wrapped value
    /// together with its registered accessors, methods and constructors;
    /// for script storage every member cell is copied.
    pub fn snapshot(&self) -> Result<Object> {
        match &self.handle {
            Handle::Void => Ok(Object::void()),
            _ => self.with_resolved(|storage| Ok(Object::from_storage(storage.deep_clone()?))),
        }
    }

    /// Reads the wrapped value out, converting between arithmetic types
    /// C-style; fails with a readable error otherwise.
    pub fn as_<T: ScriptType>(&self) -> Result<T> {
        self.as_opt::<T>().ok_or_else(|| {
            Error::type_error(format!(
                "cannot convert type \"{}\" to type \"{}\"",
                self.type_name(),
                T::type_name()
            ))
        })
    }

    /// Non-failing variant of [`Object::as_`]; empty exactly when `as_`
    /// would fail.
    pub fn as_opt<T: ScriptType>(&self) -> Option<T> {
        self.with_resolved(|storage| {
            Ok(match storage {
                Storage::Host(host) => {
                    if let Some(value) = host.value_any().downcast_ref::<T>() {
                        Some(value.clone())
                    } else if let (Some(from_num), Some(num)) =
                        (T::ops().from_num, host.to_num())
                    {
                        Some(from_num(num))
                    } else {
                        None
                    }
                }
                Storage::Script(_) => None,
            })
        })
        .ok()
        .flatten()
    }

    /// Self adopts the contents of `rhs`; both sides must be non-void and
    /// the types must match up to arithmetic coercion.
    pub fn assign(&self, rhs: &Object) -> Result<()> {
        if rhs.is_void() {
            return Err(Error::type_error("cannot assign a void value"));
        }
        let value = rhs.snapshot()?;
        self.with_resolved_mut(|storage| storage.assign_value(&value))
    }

    pub fn arith(&self, kind: ArithKind, rhs: &Object) -> Result<Object> {
        let result = self.snapshot()?;
        result.arith_assign(kind, rhs)?;
        Ok(result)
    }

    pub fn arith_assign(&self, kind: ArithKind, rhs: &Object) -> Result<()> {
        let value = rhs.snapshot()?;
        self.with_resolved_mut(|storage| storage.arith_in_place(kind, &value))
    }

    pub fn neg(&self) -> Result<Object> {
        let result = self.snapshot()?;
        result.neg_in_place()?;
        Ok(result)
    }

    fn neg_in_place(&self) -> Result<()> {
        self.with_resolved_mut(|storage| storage.neg_in_place())
    }

    /// Pre/post increment or decrement; mutates in place. The caller keeps
    /// the prior value when post semantics are wanted.
    pub fn step(&self, dec: bool) -> Result<()> {
        self.with_resolved_mut(|storage| storage.step_in_place(dec))
    }

    pub fn compare(&self, kind: CompareKind, rhs: &Object) -> Result<Object> {
        Ok(Object::from_value(self.compare_bool(kind, rhs)?))
    }

    fn compare_bool(&self, kind: CompareKind, rhs: &Object) -> Result<bool> {
        let value = rhs.snapshot()?;
        self.with_resolved(|storage| storage.compare_with(kind, &value))
    }

    pub fn get_element(&self, index: i64) -> Result<Object> {
        let index = check_index(index)?;
        self.with_resolved(|storage| storage.get_element(index))
    }

    pub fn set_element(&self, index: i64, value: &Object) -> Result<()> {
        let index = check_index(index)?;
        let value = value.snapshot()?;
        self.with_resolved_mut(|storage| storage.set_element(index, &value))
    }

    /// Aliasing view of an indexed slot, for in-place mutation.
    pub fn element_view(&self, index: i64) -> Result<Object> {
        let index = check_index(index)?;
        if self.is_void() {
            return Err(void_error());
        }
        Ok(Object {
            handle: Handle::Element {
                parent: Box::new(self.clone()),
                index,
            },
        })
    }

    /// Member lookup. Script members are shared cells; host members are
    /// accessor views writing through to this object's storage. Views may
    /// stack, so a member of an indexed slot writes through both levels.
    pub fn member(&self, name: &str) -> Result<Object> {
        if self.is_void() {
            return Err(void_error());
        }
        if let Handle::Owned(cell) | Handle::Pointer { target: cell, .. } = &self.handle {
            let storage = cell.borrow();
            if let Storage::Script(sv) = &*storage {
                return sv.members.get(name).cloned().ok_or_else(|| {
                    Error::resolution(format!(
                        "type \"{}\" does not have a member named \"{}\"",
                        sv.type_name, name
                    ))
                });
            }
        }
        let (found, type_name) = self.with_resolved(|storage| {
            Ok(match storage {
                Storage::Host(host) => (host.has_field(name), host.type_name().to_string()),
                Storage::Script(sv) => (sv.members.contains_key(name), sv.type_name.clone()),
            })
        })?;
        if found {
            Ok(Object {
                handle: Handle::Member {
                    parent: Box::new(self.clone()),
                    name: name.to_string(),
                },
            })
        } else {
            Err(Error::resolution(format!(
                "type \"{}\" does not have a member named \"{}\"",
                type_name, name
            )))
        }
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.with_resolved(|storage| {
            Ok(match storage {
                Storage::Host(host) => host.has_method(name),
                Storage::Script(sv) => sv.methods.contains_key(name),
            })
        })
        .unwrap_or(false)
    }

    /// Uniform method invocation for host-bound and script-defined methods.
    /// Arguments are detached before the receiver is borrowed, so an
    /// argument may freely reference the receiver. A method on a view runs
    /// against a copy that is written back through the view afterwards.
    pub fn call_method(&self, name: &str, args: &[Object]) -> Result<Option<Object>> {
        let args: Vec<Object> = args
            .iter()
            .map(|a| a.snapshot())
            .collect::<Result<Vec<_>>>()?;
        let cell = match &self.handle {
            Handle::Owned(cell) | Handle::Pointer { target: cell, .. } => Rc::clone(cell),
            Handle::Void => return Err(void_error()),
            Handle::Member { .. } | Handle::Element { .. } => {
                let receiver = self.snapshot()?;
                let result = receiver.call_method(name, &args)?;
                self.assign(&receiver)?;
                return Ok(result);
            }
        };
        let script_method = {
            let storage = cell.borrow();
            match &*storage {
                Storage::Script(sv) => {
                    Some(sv.methods.get(name).cloned().ok_or_else(|| {
                        Error::resolution(format!(
                            "type \"{}\" does not have a method named \"{}\"",
                            sv.type_name, name
                        ))
                    })?)
                }
                Storage::Host(_) => None,
            }
        };
        match script_method {
            Some(function) => function.call_as_method(self, args),
            None => {
                let mut storage = cell.borrow_mut();
                match &mut *storage {
                    Storage::Host(host) => host.call_method(name, &args),
                    Storage::Script(_) => unreachable!("storage kind changed during dispatch"),
                }
            }
        }
    }

    /// Constructor selection: the first registered constructor whose arity
    /// and argument conversions all succeed wins.
    pub fn construct(&self, args: &[Object]) -> Result<Object> {
        let args: Vec<Object> = args
            .iter()
            .map(|a| a.snapshot())
            .collect::<Result<Vec<_>>>()?;
        self.with_resolved(|storage| match storage {
            Storage::Host(host) => host.construct(&args),
            Storage::Script(sv) => Err(Error::type_error(format!(
                "type \"{}\" cannot be constructed with arguments",
                sv.type_name
            ))),
        })
    }

    /// The single-level `new`: copies this value into a fresh cell and
    /// returns a pointer-typed object sharing it.
    pub fn alloc(&self) -> Result<Object> {
        match &self.handle {
            Handle::Void => Err(void_error()),
            Handle::Pointer { .. } => Err(Error::type_error(
                "multi-level indirection is not supported",
            )),
            _ => {
                let type_name = format!("{}*", self.type_name());
                let copy = self.snapshot()?;
                let cell = copy.cell()?;
                if matches!(&*cell.borrow(), Storage::Script(_)) {
                    return Err(Error::type_error(
                        "script-defined types cannot be allocated with \"new\"",
                    ));
                }
                Ok(Object {
                    handle: Handle::Pointer {
                        target: cell,
                        type_name,
                    },
                })
            }
        }
    }

    pub(crate) fn script_members(&self) -> Result<Vec<(String, Object)>> {
        let cell = self.cell()?;
        let storage = cell.borrow();
        match &*storage {
            Storage::Script(sv) => Ok(sv
                .members
                .iter()
                .map(|(name, cell)| (name.clone(), cell.clone()))
                .collect()),
            Storage::Host(_) => Err(Error::type_error(
                "host-backed value does not have script members",
            )),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object(\"{}\")", self.type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_opt_is_total() {
        let value = Object::from_value(3i32);
        assert_eq!(value.as_opt::<i32>(), Some(3));
        assert_eq!(value.as_opt::<f32>(), Some(3.0));
        assert_eq!(value.as_opt::<String>(), None);
        assert!(Object::void().as_opt::<i32>().is_none());
    }

    #[test]
    fn arithmetic_coerces_toward_lhs() {
        let lhs = Object::from_value(7i32);
        let rhs = Object::from_value(2.5f32);
        let sum = lhs.arith(ArithKind::Add, &rhs).unwrap();
        assert_eq!(sum.as_::<i32>().unwrap(), 9);
        assert_eq!(sum.type_name(), "int");
    }

    #[test]
    fn missing_operator_is_typed_error() {
        let lhs = Object::from_value(true);
        let rhs = Object::from_value(false);
        let err = lhs.arith(ArithKind::Add, &rhs).unwrap_err();
        assert!(err.message.contains("does not have operator \"+\""));
    }

    #[test]
    fn bool_has_no_increment() {
        let value = Object::from_value(true);
        let err = value.step(false).unwrap_err();
        assert!(err.message.contains("\"++\""));
    }

    #[test]
    fn element_out_of_range_reports_range_and_index() {
        let list = Object::from_value(vec![1i32, 2, 3]);
        let err = list.get_element(3).unwrap_err();
        assert!(err.message.contains("index 3"));
        assert!(err.message.contains("[0, 3)"));
    }

    #[test]
    fn alloc_is_single_level() {
        let value = Object::from_value(5i32);
        let ptr = value.alloc().unwrap();
        assert_eq!(ptr.type_name(), "int*");
        assert_eq!(ptr.as_::<i32>().unwrap(), 5);
        let err = ptr.alloc().unwrap_err();
        assert!(err.message.contains("multi-level"));
    }
}
