use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::value::{Value, ValueMap, ValueRepr};

/// Helper trait representing valid filter, test and function arguments.
///
/// Since it's more convenient to write filters and tests with concrete types
/// instead of values, this helper trait exists to automatically perform this
/// conversion.  It is implemented for functions up to an arity of 5
/// parameters.
pub trait FunctionArgs: Sized {
    /// Converts to function arguments from a vector of values.
    fn from_values(values: Vec<Value>) -> Result<Self, Error>;
}

/// A trait implemented by all filter/test argument types.
///
/// This trait is the companion to [`FunctionArgs`].  It's passed an
/// `Option<Value>` where `Some` means the argument was provided or `None` if
/// it was not.  This is used to implement optional arguments to functions.
pub trait ArgType: Sized {
    /// Marks the argument slot that receives trailing keyword arguments.
    const IS_KWARGS: bool = false;

    /// Marks the argument slot that swallows all remaining positional
    /// arguments.
    const IS_REST: bool = false;

    fn from_value(value: Option<Value>) -> Result<Self, Error>;
}

/// Collects all remaining positional arguments.
///
/// Declaring a [`Rest`] parameter makes a filter or function variadic:
///
/// ```
/// # use tempera::{Environment, Error, State};
/// # use tempera::value::{Rest, Value};
/// # let mut env = Environment::new();
/// fn coalesce(_state: &State, value: Value, rest: Rest) -> Result<Value, Error> {
///     Ok(std::iter::once(value)
///         .chain(rest.0)
///         .find(|x| !x.is_undefined() && !x.is_none())
///         .unwrap_or_default())
/// }
/// env.add_filter("coalesce", coalesce);
/// ```
#[derive(Debug, Default)]
pub struct Rest(pub Vec<Value>);

impl ArgType for Rest {
    const IS_REST: bool = true;

    fn from_value(value: Option<Value>) -> Result<Self, Error> {
        match value {
            None => Ok(Rest(Vec::new())),
            Some(value) => match value.0 {
                ValueRepr::List(ref items) => Ok(Rest(items.to_vec())),
                _ => Ok(Rest(vec![value])),
            },
        }
    }
}

/// The keyword arguments passed to a filter, test or function.
///
/// Declare a trailing [`Kwargs`] parameter to receive keyword arguments:
///
/// ```
/// # use tempera::{Environment, Error, State};
/// # use tempera::value::{Kwargs, Value};
/// # let mut env = Environment::new();
/// fn shout(_state: &State, value: String, kwargs: Kwargs) -> Result<String, Error> {
///     let suffix: Option<String> = kwargs.get("suffix")?;
///     Ok(format!("{}{}", value.to_uppercase(), suffix.unwrap_or_default()))
/// }
/// env.add_filter("shout", shout);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Kwargs {
    values: Arc<ValueMap>,
}

impl Kwargs {
    pub(crate) fn wrap(map: ValueMap) -> Value {
        Value(ValueRepr::Kwargs(Arc::new(map)))
    }

    /// Fetches a keyword argument converted to the desired type.
    ///
    /// Missing arguments convert the way an omitted positional argument
    /// would, so `Option<T>` returns `None`.
    pub fn get<T: ArgType>(&self, name: &str) -> Result<T, Error> {
        T::from_value(self.values.get(name).cloned()).map_err(|err| {
            Error::new(
                ErrorKind::InvalidArgument,
                format!("invalid keyword argument {name:?}: {err}"),
            )
        })
    }

    /// Checks if a keyword argument was provided.
    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Returns true if no keyword arguments were provided.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the keyword arguments as owned pairs.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl ArgType for Kwargs {
    const IS_KWARGS: bool = true;

    fn from_value(value: Option<Value>) -> Result<Self, Error> {
        match value {
            None => Ok(Kwargs::default()),
            Some(Value(ValueRepr::Kwargs(values))) => Ok(Kwargs { values }),
            Some(_) => Err(Error::new(
                ErrorKind::InvalidArgument,
                "expected keyword arguments",
            )),
        }
    }
}

impl ArgType for Value {
    fn from_value(value: Option<Value>) -> Result<Self, Error> {
        value.ok_or_else(|| Error::new(ErrorKind::InvalidArgument, "missing argument"))
    }
}

impl ArgType for Vec<Value> {
    fn from_value(value: Option<Value>) -> Result<Self, Error> {
        match value {
            None => Ok(Vec::new()),
            Some(value) => Ok(ok!(value.try_iter()).collect()),
        }
    }
}

macro_rules! arg_type_from_try_from {
    ($ty:ident) => {
        impl ArgType for $ty {
            fn from_value(value: Option<Value>) -> Result<Self, Error> {
                match value {
                    Some(value) => TryFrom::try_from(value),
                    None => Err(Error::new(ErrorKind::InvalidArgument, "missing argument")),
                }
            }
        }
    };
}

arg_type_from_try_from!(bool);
arg_type_from_try_from!(u8);
arg_type_from_try_from!(u16);
arg_type_from_try_from!(u32);
arg_type_from_try_from!(u64);
arg_type_from_try_from!(i8);
arg_type_from_try_from!(i16);
arg_type_from_try_from!(i32);
arg_type_from_try_from!(i64);
arg_type_from_try_from!(usize);
arg_type_from_try_from!(f64);
arg_type_from_try_from!(String);

impl<T: ArgType> ArgType for Option<T> {
    fn from_value(value: Option<Value>) -> Result<Self, Error> {
        match value {
            Some(value) => {
                if value.is_undefined() || value.is_none() {
                    Ok(None)
                } else {
                    T::from_value(Some(value)).map(Some)
                }
            }
            None => Ok(None),
        }
    }
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<$($name: ArgType,)*> FunctionArgs for ($($name,)*) {
            fn from_values(values: Vec<Value>) -> Result<Self, Error> {
                #![allow(non_snake_case, unused)]
                let mut values = values;
                let mut kwargs = None;
                if matches!(values.last().map(|x| &x.0), Some(ValueRepr::Kwargs(_))) {
                    kwargs = values.pop();
                }
                let positional_count = 0 $(
                    + if $name::IS_KWARGS || $name::IS_REST { 0 } else { 1 }
                )*;
                let has_rest = false $( || $name::IS_REST )*;
                if !has_rest && values.len() > positional_count {
                    return Err(Error::new(
                        ErrorKind::InvalidArgument,
                        "received unexpected extra arguments",
                    ));
                }
                let mut idx = 0;
                $(
                    let $name = if $name::IS_KWARGS {
                        ok!($name::from_value(kwargs.take()))
                    } else if $name::IS_REST {
                        let rest = if idx < values.len() {
                            values.split_off(idx)
                        } else {
                            Vec::new()
                        };
                        ok!($name::from_value(Some(Value::from(rest))))
                    } else {
                        let arg = values.get(idx).cloned();
                        idx += 1;
                        ok!($name::from_value(arg))
                    };
                )*
                if kwargs.is_some() {
                    return Err(Error::new(
                        ErrorKind::InvalidArgument,
                        "unexpected keyword arguments",
                    ));
                }
                Ok(($($name,)*))
            }
        }
    };
}

tuple_impls! {}
tuple_impls! { A }
tuple_impls! { A B }
tuple_impls! { A B C }
tuple_impls! { A B C D }
tuple_impls! { A B C D E }
