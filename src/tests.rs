//! Test functions and abstractions.
//!
//! Test functions in this engine are like [filters](crate::filters) but a
//! different syntax is used to invoke them and they have to return boolean
//! values.  For instance the expression `{% if foo is odd %}` invokes the
//! [`is_odd`] test to check if the value is indeed an odd number.
//!
//! The engine comes with the built-in tests listed below.  To create a
//! custom test write a function that takes at least a
//! [`&State`](crate::State) and value argument and returns a boolean
//! result, then register it with [`add_test`](crate::Environment::add_test).
//!
//! # Custom Tests
//!
//! A custom test function is just a simple function which accepts its
//! inputs as parameters and then returns a bool.  For instance the
//! following shows a test function which takes an input value and checks
//! if it's lowercase:
//!
//! ```
//! # use tempera::{State, Environment, Error};
//! # let mut env = Environment::new();
//! fn is_lowercase(_state: &State, value: String) -> Result<bool, Error> {
//!    Ok(value.chars().all(|x| x.is_lowercase()))
//! }
//!
//! env.add_test("lowercase", is_lowercase);
//! ```
//!
//! The engine will perform the necessary conversions automatically via the
//! [`FunctionArgs`](crate::value::FunctionArgs) trait.
use std::sync::Arc;

use crate::error::Error;
use crate::eval::State;
use crate::value::{ops, ArgType, FunctionArgs, Value, ValueKind, ValueRepr};

type TestFunc = dyn Fn(&State, Value, Vec<Value>) -> Result<bool, Error> + Sync + Send + 'static;

#[derive(Clone)]
pub(crate) struct BoxedTest(Arc<TestFunc>);

/// A utility trait that represents tests.
pub trait Test<V = Value, Args = Vec<Value>>: Send + Sync + 'static {
    /// Performs a test on a value with the given arguments.
    fn perform(&self, state: &State, value: V, args: Args) -> Result<bool, Error>;
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<Func, V, $($name),*> Test<V, ($($name,)*)> for Func
        where
            Func: Fn(&State, V, $($name),*) -> Result<bool, Error> + Send + Sync + 'static
        {
            fn perform(&self, state: &State, value: V, args: ($($name,)*)) -> Result<bool, Error> {
                #[allow(non_snake_case)]
                let ($($name,)*) = args;
                (self)(state, value, $($name,)*)
            }
        }
    };
}

tuple_impls! {}
tuple_impls! { A }
tuple_impls! { A B }
tuple_impls! { A B C }
tuple_impls! { A B C D }

impl BoxedTest {
    /// Creates a new boxed test.
    pub fn new<F, V, Args>(f: F) -> BoxedTest
    where
        F: Test<V, Args>,
        V: ArgType,
        Args: FunctionArgs,
    {
        BoxedTest(Arc::new(move |state, value, args| -> Result<bool, Error> {
            f.perform(
                state,
                ok!(ArgType::from_value(Some(value))),
                ok!(FunctionArgs::from_values(args)),
            )
        }))
    }

    /// Performs the test on a value and arguments.
    pub fn perform(&self, state: &State, value: Value, args: Vec<Value>) -> Result<bool, Error> {
        (self.0)(state, value, args)
    }
}

/// Helper that calls the test conversion machinery without boxing.
pub(crate) fn call_test<F, V, Args>(
    f: F,
    state: &State,
    value: Value,
    args: Vec<Value>,
) -> Result<bool, Error>
where
    F: Test<V, Args>,
    V: ArgType,
    Args: FunctionArgs,
{
    f.perform(
        state,
        ok!(ArgType::from_value(Some(value))),
        ok!(FunctionArgs::from_values(args)),
    )
}

/// Checks if a value is undefined.
pub fn is_undefined(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.is_undefined())
}

/// Checks if a value is defined.
pub fn is_defined(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(!v.is_undefined())
}

/// Checks if a value is none.
pub fn is_none(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.is_none())
}

/// Checks if a value is a boolean.
pub fn is_boolean(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.kind(), ValueKind::Bool))
}

/// Checks if a value is `true`.
pub fn is_true(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.0, ValueRepr::Bool(true)))
}

/// Checks if a value is `false`.
pub fn is_false(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.0, ValueRepr::Bool(false)))
}

/// Checks if a value is an integer.
pub fn is_integer(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.0, ValueRepr::I64(_)))
}

/// Checks if a value is a float.
pub fn is_float(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.0, ValueRepr::F64(_)))
}

/// Checks if a value is a number.
pub fn is_number(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.kind(), ValueKind::Number))
}

/// Checks if a value is a string.
pub fn is_string(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.kind(), ValueKind::String))
}

/// Checks if a value is a mapping.
pub fn is_mapping(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.kind(), ValueKind::Map))
}

/// Checks if a value is a sequence.
pub fn is_sequence(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.kind(), ValueKind::Seq))
}

/// Checks if a value can be iterated over.
pub fn is_iterable(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.try_iter().is_ok())
}

/// Checks if a value is callable.
pub fn is_callable(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.is_callable())
}

/// Checks if a value has a length of zero.
pub fn is_empty(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.is_empty())
}

/// Checks if a value is odd.
pub fn is_odd(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.as_i64().map_or(false, |x| x % 2 != 0))
}

/// Checks if a value is even.
pub fn is_even(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.as_i64().map_or(false, |x| x % 2 == 0))
}

/// Checks if a value is divisible by another number.
pub fn is_divisibleby(_state: &State, v: Value, other: i64) -> Result<bool, Error> {
    Ok(v.as_i64().map_or(false, |x| other != 0 && x % other == 0))
}

/// Checks if a string is all lowercase.
pub fn is_lower(_state: &State, v: String) -> Result<bool, Error> {
    Ok(!v.chars().any(|c| c.is_uppercase()))
}

/// Checks if a string is all uppercase.
pub fn is_upper(_state: &State, v: String) -> Result<bool, Error> {
    Ok(!v.chars().any(|c| c.is_lowercase()))
}

/// Checks if a value is a safe (already escaped) string.
///
/// By default this test is also registered under the alias `safe`.
pub fn is_escaped(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.is_safe())
}

/// Checks if a value is contained in another one.
pub fn is_in(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    ops::contains(&other, &v).map(|rv| rv.is_true())
}

/// Checks if two values are equal.
///
/// By default this test is also registered under the aliases `equalto`
/// and `==`.
pub fn is_eq(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    ops::eq_checked(&v, &other)
}

/// Checks if two values are not equal.
pub fn is_ne(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    ops::eq_checked(&v, &other).map(|rv| !rv)
}

/// Checks if a value is less than another.
pub fn is_lt(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    ops::cmp_checked(&v, &other).map(|rv| rv.is_lt())
}

/// Checks if a value is less than or equal to another.
pub fn is_le(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    ops::cmp_checked(&v, &other).map(|rv| rv.is_le())
}

/// Checks if a value is greater than another.
pub fn is_gt(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    ops::cmp_checked(&v, &other).map(|rv| rv.is_gt())
}

/// Checks if a value is greater than or equal to another.
pub fn is_ge(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    ops::cmp_checked(&v, &other).map(|rv| rv.is_ge())
}

/// Checks if two values point to the same object or are the same
/// primitive.
pub fn is_sameas(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    Ok(match (&v.0, &other.0) {
        (ValueRepr::Object(a), ValueRepr::Object(b)) => Arc::ptr_eq(a, b),
        (ValueRepr::Callable(a), ValueRepr::Callable(b)) => Arc::ptr_eq(a, b),
        (ValueRepr::String(a, _), ValueRepr::String(b, _)) => a == b,
        (ValueRepr::None, ValueRepr::None) => true,
        (ValueRepr::Bool(a), ValueRepr::Bool(b)) => a == b,
        (ValueRepr::I64(a), ValueRepr::I64(b)) => a == b,
        _ => false,
    })
}

/// Checks if a filter with the given name is registered.
pub fn is_filter(state: &State, v: String) -> Result<bool, Error> {
    Ok(state.env().has_filter(&v))
}

/// Checks if a test with the given name is registered.
pub fn is_test(state: &State, v: String) -> Result<bool, Error> {
    Ok(state.env().has_test(&v))
}

/// Checks if the value starts with a string.
pub fn is_startingwith(_state: &State, v: String, other: String) -> Result<bool, Error> {
    Ok(v.starts_with(&other))
}

/// Checks if the value ends with a string.
pub fn is_endingwith(_state: &State, v: String, other: String) -> Result<bool, Error> {
    Ok(v.ends_with(&other))
}

#[cfg(test)]
mod test_module {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_basics() {
        fn test(_: &State, a: u32, b: u32) -> Result<bool, Error> {
            Ok(a == b)
        }

        let env = crate::Environment::new();
        crate::eval::with_test_state(&env, |state| {
            let bx = BoxedTest::new(test);
            assert!(bx
                .perform(state, Value::from(23), vec![Value::from(23)])
                .unwrap());
        });
    }

    #[test]
    fn test_number_tests() {
        let env = crate::Environment::new();
        crate::eval::with_test_state(&env, |state| {
            assert!(is_odd(state, Value::from(3)).unwrap());
            assert!(!is_odd(state, Value::from(4)).unwrap());
            assert!(is_even(state, Value::from(4)).unwrap());
            assert!(is_divisibleby(state, Value::from(15), 3).unwrap());
            assert!(is_divisibleby(state, Value::from(15), 5).unwrap());
            assert!(!is_divisibleby(state, Value::from(15), 4).unwrap());
            assert_eq!(is_divisibleby(state, Value::from(1), 0).unwrap(), false);
        });
    }
}
