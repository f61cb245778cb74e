//! Provides a dynamic value type abstraction.
//!
//! This module gives access to the dynamically typed value which is used by
//! the template engine during execution.
//!
//! For the most part the existence of the value type can be ignored as the
//! engine will perform the necessary conversions for you.  For instance if
//! you write a filter that converts a string you can directly declare the
//! filter to take a [`String`](std::string::String).  However for some more
//! advanced use cases it's useful to know that this type exists.
//!
//! # Converting Values
//!
//! Values are typically created via the [`From`] trait:
//!
//! ```
//! # use tempera::value::Value;
//! let value = Value::from(42);
//! ```
//!
//! The engine however creates values via an indirection through [`serde`]
//! when a template is rendered.  This can also be triggered manually by
//! using the [`Value::from_serialize`] method:
//!
//! ```
//! # use tempera::value::Value;
//! let value = Value::from_serialize(&[1, 2, 3]);
//! ```
//!
//! # Memory Management
//!
//! Values are immutable objects which are internally reference counted which
//! means they can be copied relatively cheaply.  A full structural copy with
//! disjoint allocations is only performed through the explicit
//! [`Value::deep_copy`] method.
//!
//! # HTML Escaping
//!
//! A value can carry a string that is already escaped (a *safe* string).
//! Escaping a safe string is a no-op and escaping any other value produces
//! a safe string.  The [`safe`](crate::filters::safe) filter and
//! [`Value::from_safe_string`] create such strings.
//!
//! # Dynamic Objects
//!
//! Values can also hold host objects implementing the [`Object`] trait.
//! These can be used to expose stateful values with fields and methods to
//! templates.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use serde::ser::{Serialize, SerializeStruct as _, Serializer};

use crate::error::{Error, ErrorKind};
use crate::eval::State;
use crate::utils::UndefinedBehavior;

// We use in-band signalling to roundtrip some internal values through
// serde.  Values that cannot be represented structurally (safe strings,
// undefineds, callables, objects, async results) are parked in a thread
// local registry and serialized as a marker struct carrying the handle,
// which the value serializer resolves back.  The marker only appears while
// `from_serialize` runs; external serialization (eg `tojson`) stays
// structural.
pub(crate) const VALUE_HANDLE_MARKER: &str = "\x01__tempera_ValueHandle";

thread_local! {
    static INTERNAL_SERIALIZATION: AtomicBool = const { AtomicBool::new(false) };
    static LAST_VALUE_HANDLE: AtomicUsize = const { AtomicUsize::new(0) };
    static VALUE_HANDLES: RefCell<BTreeMap<usize, Value>> = const { RefCell::new(BTreeMap::new()) };
}

fn in_internal_serialization() -> bool {
    INTERNAL_SERIALIZATION.with(|flag| flag.load(AtomicOrdering::Relaxed))
}

fn register_value_handle(value: Value) -> usize {
    let handle = LAST_VALUE_HANDLE.with(|x| x.fetch_add(1, AtomicOrdering::Relaxed)) + 1;
    VALUE_HANDLES.with(|handles| handles.borrow_mut().insert(handle, value));
    handle
}

pub(crate) fn take_value_handle(handle: usize) -> Option<Value> {
    VALUE_HANDLES.with(|handles| handles.borrow_mut().remove(&handle))
}

mod argtypes;
mod object;
pub(crate) mod ops;
mod serialize;

pub use self::argtypes::{ArgType, FunctionArgs, Kwargs, Rest};
pub use self::object::Object;

/// The type of map used for value maps.
///
/// Keys are owned strings; insertion order is not preserved.
pub type ValueMap = BTreeMap<String, Value>;

/// Describes the kind of value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum ValueKind {
    Undefined,
    None,
    Bool,
    Number,
    String,
    Seq,
    Map,
    Callable,
    Object,
    AsyncResult,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::Undefined => "undefined",
            ValueKind::None => "none",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Seq => "sequence",
            ValueKind::Map => "map",
            ValueKind::Callable => "callable",
            ValueKind::Object => "object",
            ValueKind::AsyncResult => "async result",
        })
    }
}

/// Distinguishes plain strings from safe (pre-escaped markup) strings.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StringKind {
    Normal,
    Safe,
}

/// The sentinel payload for missing values.
///
/// An undefined remembers the name it was resolved under (if any) and the
/// behavior the environment was configured with when it was created.  The
/// behavior travels with the value so that operations on it can fail without
/// access to the environment.
#[derive(Debug)]
pub struct Undefined {
    pub(crate) name: Option<String>,
    pub(crate) behavior: UndefinedBehavior,
}

/// A future-like wrapper for asynchronous host results.
///
/// When the environment has async support enabled, completed results resolve
/// to their value at expression boundaries; pending results produce an
/// error when they are used.
#[derive(Debug)]
pub struct AsyncResult {
    pub id: u64,
    pub completed: bool,
    pub value: Option<Value>,
    pub error: Option<String>,
}

impl AsyncResult {
    /// Creates a completed async result holding a value.
    pub fn ready(id: u64, value: Value) -> AsyncResult {
        AsyncResult {
            id,
            completed: true,
            value: Some(value),
            error: None,
        }
    }

    /// Creates a pending async result.
    pub fn pending(id: u64) -> AsyncResult {
        AsyncResult {
            id,
            completed: false,
            value: None,
            error: None,
        }
    }

    /// Creates a completed async result holding an error.
    pub fn failed(id: u64, error: impl Into<String>) -> AsyncResult {
        AsyncResult {
            id,
            completed: true,
            value: None,
            error: Some(error.into()),
        }
    }
}

type FuncObj = Arc<dyn Fn(&State, &[Value]) -> Result<Value, Error> + Send + Sync>;

/// Data for a macro defined in a template.
///
/// The body of the macro is addressed indirectly: the render state owns a
/// table of macro bodies and `macro_id` indexes into it, while `state_id`
/// guards against invoking the value in a different render.
pub(crate) struct MacroData {
    pub macro_id: usize,
    pub state_id: u64,
    pub arg_names: Vec<String>,
    pub defaults: Vec<Value>,
    /// Deep copied snapshot of the scope locals visible at definition time.
    pub closure: Value,
    /// The base context value of the defining render, so macro bodies can
    /// still see the caller supplied variables.
    pub base: Value,
    pub is_caller: bool,
}

pub(crate) enum CallableKind {
    /// A native function registered by the host.
    Function(FuncObj),
    /// A macro (or `caller()`) defined in a template.
    Macro(MacroData),
    /// Renders the named block of the current template (`self.block()`).
    Block(String),
}

/// A callable value: a host function, a template macro, or a block
/// reference.
pub struct Callable {
    pub(crate) name: String,
    pub(crate) kind: CallableKind,
    pub(crate) is_async: bool,
    pub(crate) unsafe_callable: bool,
    pub(crate) alters_data: bool,
}

impl Callable {
    /// The name of the callable.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this callable suspends.
    pub fn is_async(&self) -> bool {
        self.is_async
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CallableKind::Function(_) => write!(f, "<function {}>", self.name),
            CallableKind::Macro(_) => write!(f, "<macro {}>", self.name),
            CallableKind::Block(_) => write!(f, "<block {}>", self.name),
        }
    }
}

#[derive(Clone)]
pub(crate) enum ValueRepr {
    Undefined(Arc<Undefined>),
    None,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(Arc<str>, StringKind),
    List(Arc<Vec<Value>>),
    Map(Arc<ValueMap>),
    Kwargs(Arc<ValueMap>),
    Callable(Arc<Callable>),
    Object(Arc<dyn Object>),
    AsyncResult(Arc<AsyncResult>),
}

/// Represents a dynamically typed value in the template engine.
#[derive(Clone)]
pub struct Value(pub(crate) ValueRepr);

impl Default for Value {
    fn default() -> Value {
        Value(ValueRepr::None)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ValueRepr::Undefined(_) => write!(f, "undefined"),
            ValueRepr::None => write!(f, "none"),
            ValueRepr::Bool(val) => write!(f, "{val}"),
            ValueRepr::I64(val) => write!(f, "{val}"),
            ValueRepr::F64(val) => write!(f, "{}", FloatRepr(*val)),
            ValueRepr::String(val, _) => write!(f, "{val:?}"),
            ValueRepr::List(val) => f.debug_list().entries(val.iter()).finish(),
            ValueRepr::Map(val) | ValueRepr::Kwargs(val) => {
                f.debug_map().entries(val.iter()).finish()
            }
            ValueRepr::Callable(val) => fmt::Debug::fmt(val, f),
            ValueRepr::Object(val) => fmt::Debug::fmt(val, f),
            ValueRepr::AsyncResult(val) => write!(f, "<async result {}>", val.id),
        }
    }
}

struct FloatRepr(f64);

impl fmt::Display for FloatRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_finite() && self.0.fract() == 0.0 {
            write!(f, "{:.1}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ValueRepr::Undefined(u) => {
                if u.behavior == UndefinedBehavior::Debug {
                    match u.name {
                        Some(ref name) => write!(f, "{{ undefined variable '{name}' }}"),
                        None => write!(f, "{{ undefined value }}"),
                    }
                } else {
                    Ok(())
                }
            }
            ValueRepr::None => write!(f, "none"),
            ValueRepr::Bool(val) => write!(f, "{val}"),
            ValueRepr::I64(val) => write!(f, "{val}"),
            ValueRepr::F64(val) => write!(f, "{}", FloatRepr(*val)),
            ValueRepr::String(val, _) => write!(f, "{val}"),
            ValueRepr::List(_) | ValueRepr::Map(_) | ValueRepr::Kwargs(_) => {
                fmt::Debug::fmt(self, f)
            }
            ValueRepr::Callable(val) => fmt::Debug::fmt(val, f),
            ValueRepr::Object(val) => fmt::Display::fmt(val, f),
            ValueRepr::AsyncResult(val) => match (&val.value, &val.error) {
                (Some(value), _) if val.completed => fmt::Display::fmt(value, f),
                _ => write!(f, "<async result {}>", val.id),
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        ops::loose_eq(self, other)
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        ops::partial_cmp(self, other)
    }
}

macro_rules! value_from {
    ($src:ty, $dst:ident) => {
        impl From<$src> for Value {
            #[inline(always)]
            fn from(val: $src) -> Self {
                Value(ValueRepr::$dst(val as _))
            }
        }
    };
}

value_from!(bool, Bool);
value_from!(u8, I64);
value_from!(u16, I64);
value_from!(u32, I64);
value_from!(i8, I64);
value_from!(i16, I64);
value_from!(i32, I64);
value_from!(i64, I64);
value_from!(f32, F64);
value_from!(f64, F64);

impl From<usize> for Value {
    #[inline(always)]
    fn from(val: usize) -> Self {
        Value(ValueRepr::I64(val as i64))
    }
}

impl From<u64> for Value {
    #[inline(always)]
    fn from(val: u64) -> Self {
        Value(ValueRepr::I64(val as i64))
    }
}

impl From<()> for Value {
    #[inline(always)]
    fn from(_: ()) -> Self {
        Value(ValueRepr::None)
    }
}

impl<'a> From<&'a str> for Value {
    #[inline(always)]
    fn from(val: &'a str) -> Self {
        Value(ValueRepr::String(Arc::from(val), StringKind::Normal))
    }
}

impl From<String> for Value {
    #[inline(always)]
    fn from(val: String) -> Self {
        Value(ValueRepr::String(Arc::from(val), StringKind::Normal))
    }
}

impl<'a> From<std::borrow::Cow<'a, str>> for Value {
    #[inline(always)]
    fn from(val: std::borrow::Cow<'a, str>) -> Self {
        match val {
            std::borrow::Cow::Borrowed(x) => x.into(),
            std::borrow::Cow::Owned(x) => x.into(),
        }
    }
}

impl From<char> for Value {
    #[inline(always)]
    fn from(val: char) -> Self {
        Value::from(val.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(val: Vec<T>) -> Self {
        Value(ValueRepr::List(Arc::new(
            val.into_iter().map(Into::into).collect(),
        )))
    }
}

impl<K: Into<String>, V: Into<Value>> From<BTreeMap<K, V>> for Value {
    fn from(val: BTreeMap<K, V>) -> Self {
        Value(ValueRepr::Map(Arc::new(
            val.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        )))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(val: Option<T>) -> Self {
        match val {
            Some(val) => val.into(),
            None => Value(ValueRepr::None),
        }
    }
}

impl From<AsyncResult> for Value {
    fn from(val: AsyncResult) -> Self {
        Value(ValueRepr::AsyncResult(Arc::new(val)))
    }
}

impl<T: Into<Value>> FromIterator<T> for Value {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Value(ValueRepr::List(Arc::new(
            iter.into_iter().map(Into::into).collect(),
        )))
    }
}

impl Value {
    /// Creates an anonymous undefined value with lenient behavior.
    pub fn undefined() -> Value {
        Value(ValueRepr::Undefined(Arc::new(Undefined {
            name: None,
            behavior: UndefinedBehavior::Lenient,
        })))
    }

    /// Creates an undefined value that remembers the name it was resolved
    /// under and the undefined behavior of the environment.
    pub fn undefined_named(name: &str, behavior: UndefinedBehavior) -> Value {
        Value(ValueRepr::Undefined(Arc::new(Undefined {
            name: Some(name.to_string()),
            behavior,
        })))
    }

    /// Creates a value from a safe string.
    ///
    /// A safe string is already escaped markup and will not be escaped
    /// again when auto escaping is active.
    pub fn from_safe_string(value: String) -> Value {
        Value(ValueRepr::String(Arc::from(value), StringKind::Safe))
    }

    /// Creates a value from a map.
    pub fn from_map(map: ValueMap) -> Value {
        Value(ValueRepr::Map(Arc::new(map)))
    }

    /// Creates a value from a host object.
    pub fn from_object<T: Object + 'static>(object: T) -> Value {
        Value(ValueRepr::Object(Arc::new(object)))
    }

    pub(crate) fn from_object_arc(object: Arc<dyn Object>) -> Value {
        Value(ValueRepr::Object(object))
    }

    /// Creates a callable value from a native function.
    pub fn from_function<F>(name: &str, f: F) -> Value
    where
        F: Fn(&State, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Value(ValueRepr::Callable(Arc::new(Callable {
            name: name.to_string(),
            kind: CallableKind::Function(Arc::new(f)),
            is_async: false,
            unsafe_callable: false,
            alters_data: false,
        })))
    }

    /// Creates a callable value with explicit safety flags.
    ///
    /// Callables flagged as unsafe or as altering data are refused by
    /// sandboxed environments.
    pub fn from_function_with_flags<F>(
        name: &str,
        f: F,
        is_async: bool,
        unsafe_callable: bool,
        alters_data: bool,
    ) -> Value
    where
        F: Fn(&State, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Value(ValueRepr::Callable(Arc::new(Callable {
            name: name.to_string(),
            kind: CallableKind::Function(Arc::new(f)),
            is_async,
            unsafe_callable,
            alters_data,
        })))
    }

    pub(crate) fn from_callable(callable: Callable) -> Value {
        Value(ValueRepr::Callable(Arc::new(callable)))
    }

    /// Creates a value by serializing any serde serializable value.
    pub fn from_serialize<T: Serialize>(value: &T) -> Value {
        INTERNAL_SERIALIZATION.with(|flag| {
            let old = flag.swap(true, AtomicOrdering::Relaxed);
            let rv = value.serialize(serialize::ValueSerializer);
            flag.store(old, AtomicOrdering::Relaxed);
            match rv {
                Ok(rv) => rv,
                Err(_) => Value(ValueRepr::None),
            }
        })
    }

    /// Returns the kind of the value.
    pub fn kind(&self) -> ValueKind {
        match self.0 {
            ValueRepr::Undefined(_) => ValueKind::Undefined,
            ValueRepr::None => ValueKind::None,
            ValueRepr::Bool(_) => ValueKind::Bool,
            ValueRepr::I64(_) | ValueRepr::F64(_) => ValueKind::Number,
            ValueRepr::String(..) => ValueKind::String,
            ValueRepr::List(_) => ValueKind::Seq,
            ValueRepr::Map(_) | ValueRepr::Kwargs(_) => ValueKind::Map,
            ValueRepr::Callable(_) => ValueKind::Callable,
            ValueRepr::Object(_) => ValueKind::Object,
            ValueRepr::AsyncResult(_) => ValueKind::AsyncResult,
        }
    }

    /// Is this value undefined?
    pub fn is_undefined(&self) -> bool {
        matches!(self.0, ValueRepr::Undefined(_))
    }

    /// Is this value none?
    pub fn is_none(&self) -> bool {
        matches!(self.0, ValueRepr::None)
    }

    /// Is this value a safe (pre-escaped) string?
    pub fn is_safe(&self) -> bool {
        matches!(self.0, ValueRepr::String(_, StringKind::Safe))
    }

    /// Is this value callable?
    pub fn is_callable(&self) -> bool {
        matches!(self.0, ValueRepr::Callable(_) | ValueRepr::Object(_))
    }

    pub(crate) fn undefined_info(&self) -> Option<&Undefined> {
        match self.0 {
            ValueRepr::Undefined(ref u) => Some(u),
            _ => None,
        }
    }

    /// If the value is a string, returns it.
    pub fn as_str(&self) -> Option<&str> {
        match self.0 {
            ValueRepr::String(ref s, _) => Some(s),
            _ => None,
        }
    }

    /// If the value is a sequence, returns a slice of its items.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self.0 {
            ValueRepr::List(ref items) => Some(items),
            _ => None,
        }
    }

    pub(crate) fn as_map(&self) -> Option<&ValueMap> {
        match self.0 {
            ValueRepr::Map(ref map) | ValueRepr::Kwargs(ref map) => Some(map),
            _ => None,
        }
    }

    /// Returns the truthiness of the value.
    ///
    /// This never fails; strict undefined handling happens in
    /// [`truthy`](Self::truthy) which the evaluator uses.
    pub fn is_true(&self) -> bool {
        match &self.0 {
            ValueRepr::Undefined(_) => false,
            ValueRepr::None => false,
            ValueRepr::Bool(val) => *val,
            ValueRepr::I64(val) => *val != 0,
            ValueRepr::F64(val) => *val != 0.0,
            ValueRepr::String(s, _) => !s.is_empty(),
            ValueRepr::List(items) => !items.is_empty(),
            ValueRepr::Map(map) | ValueRepr::Kwargs(map) => !map.is_empty(),
            ValueRepr::Callable(_) => true,
            ValueRepr::Object(obj) => obj.is_true(),
            ValueRepr::AsyncResult(res) => res.completed && res.value.is_some(),
        }
    }

    /// Returns the truthiness of the value, failing on strict undefineds.
    pub(crate) fn truthy(&self) -> Result<bool, Error> {
        if let ValueRepr::Undefined(ref u) = self.0 {
            if u.behavior == UndefinedBehavior::Strict {
                return Err(u.error());
            }
        }
        Ok(self.is_true())
    }

    /// Returns the length of the value.
    ///
    /// Defined for strings (in bytes), sequences, maps and objects.
    pub fn len(&self) -> Option<usize> {
        match &self.0 {
            ValueRepr::String(s, _) => Some(s.len()),
            ValueRepr::List(items) => Some(items.len()),
            ValueRepr::Map(map) | ValueRepr::Kwargs(map) => Some(map.len()),
            ValueRepr::Object(obj) => obj.len(),
            _ => None,
        }
    }

    /// Returns true if the value is empty (length 0).
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Performs a structural copy with disjoint interior allocations.
    ///
    /// Scalars are returned as-is; host objects and callables are shared
    /// since their state cannot be cloned through the vtable.
    pub fn deep_copy(&self) -> Value {
        match &self.0 {
            ValueRepr::String(s, kind) => {
                Value(ValueRepr::String(Arc::from(s.to_string()), *kind))
            }
            ValueRepr::List(items) => Value(ValueRepr::List(Arc::new(
                items.iter().map(|x| x.deep_copy()).collect(),
            ))),
            ValueRepr::Map(map) | ValueRepr::Kwargs(map) => Value(ValueRepr::Map(Arc::new(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.deep_copy()))
                    .collect(),
            ))),
            _ => self.clone(),
        }
    }

    /// Looks up an attribute by name.
    ///
    /// This works for maps (key lookup), sequences (integer-like names
    /// index) and objects (vtable field access).  Missing attributes
    /// produce an undefined value.
    pub fn get_attr(&self, key: &str) -> Result<Value, Error> {
        Ok(self
            .get_attr_fast(key)
            .unwrap_or_else(Value::undefined))
    }

    pub(crate) fn get_attr_fast(&self, key: &str) -> Option<Value> {
        match self.0 {
            ValueRepr::Map(ref map) | ValueRepr::Kwargs(ref map) => map.get(key).cloned(),
            ValueRepr::List(ref items) => {
                let idx: usize = key.parse().ok()?;
                items.get(idx).cloned()
            }
            ValueRepr::Object(ref obj) => obj.get_field(key),
            ValueRepr::AsyncResult(ref res) => match key {
                "id" => Some(Value::from(res.id)),
                "completed" => Some(Value::from(res.completed)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Looks up an item by value.
    ///
    /// This is the implementation of the subscript syntax: map keys,
    /// sequence and string indexes (negative indexes count from the end)
    /// and object items.
    pub fn get_item(&self, key: &Value) -> Result<Value, Error> {
        Ok(self.get_item_opt(key).unwrap_or_else(Value::undefined))
    }

    pub(crate) fn get_item_opt(&self, key: &Value) -> Option<Value> {
        match self.0 {
            ValueRepr::Map(ref map) | ValueRepr::Kwargs(ref map) => match key.0 {
                ValueRepr::String(ref s, _) => map.get(s as &str).cloned(),
                ValueRepr::I64(val) => map.get(&val.to_string()).cloned(),
                _ => None,
            },
            ValueRepr::List(ref items) => {
                let idx = some!(seq_index(key, items.len()));
                items.get(idx).cloned()
            }
            ValueRepr::String(ref s, _) => {
                let chars = s.chars().count();
                let idx = some!(seq_index(key, chars));
                s.chars().nth(idx).map(Value::from)
            }
            ValueRepr::Object(ref obj) => obj.get_item(key),
            _ => None,
        }
    }

    /// Iterates over the value.
    ///
    /// Sequences yield their items, maps their keys, strings their
    /// characters, objects whatever their vtable materializes.  Undefined
    /// values yield an empty iteration (strictness is checked by the
    /// evaluator before iterating).
    pub fn try_iter(&self) -> Result<ValueIter, Error> {
        let repr = match &self.0 {
            ValueRepr::Undefined(_) | ValueRepr::None => ValueIterRepr::Empty,
            ValueRepr::String(s, _) => {
                ValueIterRepr::Items(s.chars().map(Value::from).collect::<Vec<_>>().into_iter())
            }
            ValueRepr::List(items) => ValueIterRepr::Seq(0, items.clone()),
            ValueRepr::Map(map) | ValueRepr::Kwargs(map) => ValueIterRepr::Items(
                map.keys()
                    .map(|k| Value::from(k.as_str()))
                    .collect::<Vec<_>>()
                    .into_iter(),
            ),
            ValueRepr::Object(obj) => match obj.iter_items() {
                Some(items) => ValueIterRepr::Items(items.into_iter()),
                None => {
                    return Err(Error::new(
                        ErrorKind::TypeError,
                        format!("object of type {} is not iterable", obj.type_name()),
                    ))
                }
            },
            _ => {
                return Err(Error::new(
                    ErrorKind::TypeError,
                    format!("{} is not iterable", self.kind()),
                ))
            }
        };
        Ok(ValueIter { repr })
    }

    /// Returns the value as an i64 if it is number-like.
    pub(crate) fn as_i64(&self) -> Option<i64> {
        match self.0 {
            ValueRepr::I64(val) => Some(val),
            ValueRepr::Bool(val) => Some(val as i64),
            ValueRepr::F64(val) if val == val.trunc() => Some(val as i64),
            _ => None,
        }
    }

    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self.0 {
            ValueRepr::I64(val) => Some(val as f64),
            ValueRepr::F64(val) => Some(val),
            ValueRepr::Bool(val) => Some(val as i64 as f64),
            _ => None,
        }
    }

}

impl Undefined {
    pub(crate) fn error(&self) -> Error {
        match self.name {
            Some(ref name) => Error::new(
                ErrorKind::UndefinedError,
                format!("'{name}' is undefined"),
            ),
            None => Error::from(ErrorKind::UndefinedError),
        }
    }
}

fn seq_index(key: &Value, len: usize) -> Option<usize> {
    let idx = some!(key.as_i64());
    if idx < 0 {
        let idx = -idx as usize;
        if idx > len {
            None
        } else {
            Some(len - idx)
        }
    } else {
        Some(idx as usize)
    }
}

/// An iterator over a value.
pub struct ValueIter {
    repr: ValueIterRepr,
}

enum ValueIterRepr {
    Empty,
    Seq(usize, Arc<Vec<Value>>),
    Items(std::vec::IntoIter<Value>),
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self.repr {
            ValueIterRepr::Empty => None,
            ValueIterRepr::Seq(ref mut idx, ref items) => {
                let rv = items.get(*idx).cloned();
                *idx += 1;
                rv
            }
            ValueIterRepr::Items(ref mut iter) => iter.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.repr {
            ValueIterRepr::Empty => (0, Some(0)),
            ValueIterRepr::Seq(idx, ref items) => {
                let rest = items.len().saturating_sub(idx);
                (rest, Some(rest))
            }
            ValueIterRepr::Items(ref iter) => iter.size_hint(),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // while the engine itself converts context data, values that cannot
        // be represented structurally travel through the handle registry
        if in_internal_serialization()
            && matches!(
                self.0,
                ValueRepr::Undefined(_)
                    | ValueRepr::String(_, StringKind::Safe)
                    | ValueRepr::Kwargs(_)
                    | ValueRepr::Callable(_)
                    | ValueRepr::Object(_)
                    | ValueRepr::AsyncResult(_)
            )
        {
            let handle = register_value_handle(self.clone());
            let mut s = ok!(serializer.serialize_struct(VALUE_HANDLE_MARKER, 1));
            ok!(s.serialize_field("handle", &handle));
            return s.end();
        }

        match &self.0 {
            ValueRepr::Undefined(_) | ValueRepr::None => serializer.serialize_unit(),
            ValueRepr::Bool(b) => serializer.serialize_bool(*b),
            ValueRepr::I64(i) => serializer.serialize_i64(*i),
            ValueRepr::F64(f) => serializer.serialize_f64(*f),
            ValueRepr::String(s, _) => serializer.serialize_str(s),
            ValueRepr::List(items) => serializer.collect_seq(items.iter()),
            ValueRepr::Map(map) | ValueRepr::Kwargs(map) => serializer.collect_map(map.iter()),
            ValueRepr::Callable(_) | ValueRepr::Object(_) => {
                serializer.serialize_str(&self.to_string())
            }
            ValueRepr::AsyncResult(res) => match (&res.value, res.completed) {
                (Some(value), true) => value.serialize(serializer),
                _ => serializer.serialize_unit(),
            },
        }
    }
}

macro_rules! primitive_try_from {
    ($ty:ident, {
        $($pat:pat => $expr:expr,)*
    }) => {
        impl TryFrom<Value> for $ty {
            type Error = Error;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                let opt = match value.0 {
                    $($pat => TryFrom::try_from($expr).ok(),)*
                    _ => None,
                };
                opt.ok_or_else(|| {
                    Error::new(
                        ErrorKind::TypeError,
                        concat!("cannot convert to ", stringify!($ty)),
                    )
                })
            }
        }
    };
}

macro_rules! primitive_int_try_from {
    ($ty:ident) => {
        primitive_try_from!($ty, {
            ValueRepr::Bool(val) => val as i64,
            ValueRepr::I64(val) => val,
        });
    };
}

primitive_int_try_from!(u8);
primitive_int_try_from!(u16);
primitive_int_try_from!(u32);
primitive_int_try_from!(u64);
primitive_int_try_from!(i8);
primitive_int_try_from!(i16);
primitive_int_try_from!(i32);
primitive_int_try_from!(i64);
primitive_int_try_from!(usize);

primitive_try_from!(bool, {
    ValueRepr::Bool(val) => val,
});

primitive_try_from!(f64, {
    ValueRepr::Bool(val) => val as i64 as f64,
    ValueRepr::I64(val) => val as f64,
    ValueRepr::F64(val) => val,
});

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value.0 {
            ValueRepr::String(ref s, _) => Ok(s.to_string()),
            ValueRepr::Undefined(_) | ValueRepr::None => Err(Error::new(
                ErrorKind::TypeError,
                "cannot convert to string",
            )),
            _ => Ok(value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_basic_conversions() {
        assert_eq!(Value::from(42).to_string(), "42");
        assert_eq!(Value::from(42.0).to_string(), "42.0");
        assert_eq!(Value::from(42.5).to_string(), "42.5");
        assert_eq!(Value::from("blub").to_string(), "blub");
        assert_eq!(Value::from(()).to_string(), "none");
        assert_eq!(Value::from(vec![1, 2, 3]).to_string(), "[1, 2, 3]");
    }

    #[test]
    fn test_equality() {
        assert_eq!(Value::from(1), Value::from(1.0));
        assert_eq!(Value::from("a"), Value::from("a"));
        assert_eq!(Value::from_safe_string("a".into()), Value::from("a"));
        assert_eq!(Value::from(()), Value::from(()));
        assert_ne!(Value::from(1), Value::from(2));
        assert_ne!(Value::from("1"), Value::from(1));
    }

    #[test]
    fn test_deep_copy_is_disjoint() {
        let value = Value::from_serialize(&std::collections::BTreeMap::from([(
            "items",
            vec![1, 2, 3],
        )]));
        let copy = value.deep_copy();
        assert_eq!(value, copy);
        match (&value.0, &copy.0) {
            (ValueRepr::Map(a), ValueRepr::Map(b)) => {
                assert!(!Arc::ptr_eq(a, b));
            }
            _ => panic!("expected maps"),
        }
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::from(true).is_true());
        assert!(Value::from(1).is_true());
        assert!(Value::from("x").is_true());
        assert!(!Value::from(0).is_true());
        assert!(!Value::from("").is_true());
        assert!(!Value::from(()).is_true());
        assert!(!Value::undefined().is_true());
        assert!(Value::from(AsyncResult::ready(1, Value::from(42))).is_true());
        assert!(!Value::from(AsyncResult::pending(1)).is_true());
    }

    #[test]
    fn test_negative_index() {
        let v = Value::from(vec![1, 2, 3]);
        assert_eq!(v.get_item(&Value::from(-1)).unwrap(), Value::from(3));
        assert_eq!(v.get_item(&Value::from(0)).unwrap(), Value::from(1));
        assert!(v.get_item(&Value::from(3)).unwrap().is_undefined());
    }
}
