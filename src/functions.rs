//! Global functions and abstractions.
//!
//! This module provides the abstractions for functions that can be
//! registered as global variables of the environment with
//! [`add_function`](crate::Environment::add_function), as well as the
//! built-in functions `range` and `dict`.
//!
//! # Custom Functions
//!
//! A custom global function is a simple function which accepts a
//! [`&State`](crate::State) and typed parameters and returns a value:
//!
//! ```
//! # use tempera::{Environment, State, Error};
//! # let mut env = Environment::new();
//! fn is_adult(_state: &State, age: u32) -> Result<bool, Error> {
//!     Ok(age >= 18)
//! }
//!
//! env.add_function("is_adult", is_adult);
//! ```
use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::eval::State;
use crate::value::{ArgType, FunctionArgs, Kwargs, Value, ValueMap};

/// A utility trait that represents global functions.
pub trait Function<Rv = Value, Args = Vec<Value>>: Send + Sync + 'static {
    /// Calls the function with the given arguments.
    fn invoke(&self, state: &State, args: Args) -> Result<Rv, Error>;
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<Func, Rv, $($name),*> Function<Rv, ($($name,)*)> for Func
        where
            Func: Fn(&State, $($name),*) -> Result<Rv, Error> + Send + Sync + 'static
        {
            fn invoke(&self, state: &State, args: ($($name,)*)) -> Result<Rv, Error> {
                #[allow(non_snake_case)]
                let ($($name,)*) = args;
                (self)(state, $($name,)*)
            }
        }
    };
}

tuple_impls! {}
tuple_impls! { A }
tuple_impls! { A B }
tuple_impls! { A B C }
tuple_impls! { A B C D }

type FuncFunc = dyn Fn(&State, &[Value]) -> Result<Value, Error> + Send + Sync;

pub(crate) struct BoxedFunction {
    name: String,
    func: Arc<FuncFunc>,
}

impl BoxedFunction {
    /// Wraps a typed function.
    pub fn new<F, Rv, Args>(name: &str, f: F) -> BoxedFunction
    where
        F: Function<Rv, Args>,
        Rv: Into<Value>,
        Args: FunctionArgs,
    {
        BoxedFunction {
            name: name.to_string(),
            func: Arc::new(move |state, args| {
                f.invoke(state, ok!(FunctionArgs::from_values(args.to_vec())))
                    .map(Into::into)
            }),
        }
    }

    /// Converts the function into a callable value.
    pub fn to_value(&self) -> Value {
        let func = self.func.clone();
        Value::from_function(&self.name, move |state, args| func(state, args))
    }
}

/// Returns a range of numbers.
///
/// With one argument it counts from 0 to the argument, with two arguments
/// from the first to the second, the optional third argument is the step:
///
/// ```jinja
/// {% for i in range(10) %}{{ i }}{% endfor %}
/// ```
pub fn range(
    _state: &State,
    lower: i64,
    upper: Option<i64>,
    step: Option<i64>,
) -> Result<Value, Error> {
    let rng = match upper {
        Some(upper) => (lower, upper),
        None => (0, lower),
    };
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            "range step must not be zero",
        ));
    }
    let mut rv = Vec::new();
    let mut i = rng.0;
    if step > 0 {
        while i < rng.1 {
            rv.push(Value::from(i));
            i += step;
        }
    } else {
        while i > rng.1 {
            rv.push(Value::from(i));
            i += step;
        }
    }
    if rv.len() > 100_000 {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            "range has too many elements",
        ));
    }
    Ok(Value::from(rv))
}

/// Creates a dictionary from keyword arguments.
///
/// ```jinja
/// {{ dict(a=1, b=2) }}
/// ```
pub fn dict(_state: &State, value: Option<Value>, kwargs: Kwargs) -> Result<Value, Error> {
    let mut rv = ValueMap::new();
    if let Some(value) = value {
        match value.as_map() {
            Some(map) => {
                for (key, value) in map.iter() {
                    rv.insert(key.clone(), value.clone());
                }
            }
            None => {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    "dict argument must be a map",
                ))
            }
        }
    }
    for (key, value) in kwargs.entries() {
        rv.insert(key, value);
    }
    Ok(Value::from_map(rv))
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_range() {
        let env = crate::Environment::new();
        crate::eval::with_test_state(&env, |state| {
            assert_eq!(
                range(state, 3, None, None).unwrap(),
                Value::from(vec![0, 1, 2])
            );
            assert_eq!(
                range(state, 2, Some(5), None).unwrap(),
                Value::from(vec![2, 3, 4])
            );
            assert_eq!(
                range(state, 9, Some(0), Some(-3)).unwrap(),
                Value::from(vec![9, 6, 3])
            );
            assert!(range(state, 1, None, Some(0)).is_err());
        });
    }
}
