use std::fmt;

use crate::error::{Error, ErrorKind};
use crate::eval::State;
use crate::value::Value;

/// A trait that host objects need to implement to be exposed to templates.
///
/// Objects are stored in values behind reference counting.  The engine only
/// talks to them through this vtable: field access, subscripting, calls,
/// length, iteration and truthiness all dispatch here.  Dropping the owning
/// value runs the object's `Drop` implementation.
///
/// The default implementations make all operations unavailable, so an
/// implementation only needs to provide what the exposed type supports.
pub trait Object: fmt::Display + fmt::Debug + Send + Sync {
    /// The name of the exposed type, used in error messages.
    fn type_name(&self) -> &'static str {
        "object"
    }

    /// Looks up a field by name (`obj.field`).
    fn get_field(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Looks up an item by value (`obj[key]`).
    ///
    /// The default forwards string keys to [`get_field`](Self::get_field).
    fn get_item(&self, key: &Value) -> Option<Value> {
        key.as_str().and_then(|name| self.get_field(name))
    }

    /// Enumerates the field names of the object, if it has any.
    fn fields(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Invokes the object as a callable.
    fn call(&self, _state: &State, _args: &[Value]) -> Result<Value, Error> {
        Err(Error::new(
            ErrorKind::NotCallable,
            format!("object of type {} is not callable", self.type_name()),
        ))
    }

    /// Invokes a method on the object (`obj.method(...)`).
    fn call_method(&self, _state: &State, name: &str, _args: &[Value]) -> Result<Value, Error> {
        Err(Error::new(
            ErrorKind::TypeError,
            format!("object of type {} has no method {name}", self.type_name()),
        ))
    }

    /// The length of the object, if it has one.
    fn len(&self) -> Option<usize> {
        None
    }

    /// Iterates over the object, materializing the items.
    ///
    /// The default iterates the declared [`fields`](Self::fields).
    fn iter_items(&self) -> Option<Vec<Value>> {
        let fields = self.fields();
        if fields.is_empty() {
            None
        } else {
            Some(fields.into_iter().map(Value::from).collect())
        }
    }

    /// The truthiness of the object.
    fn is_true(&self) -> bool {
        true
    }
}
