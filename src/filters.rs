//! Filter functions and abstractions.
//!
//! This engine inherits from Jinja2 the concept of filter functions.  These
//! are functions which are applied to values to modify them.  For example
//! the expression `{{ 42|filter(23) }}` invokes the filter `filter` with the
//! arguments `42` and `23`.
//!
//! The engine comes with the built-in filters listed below.  To create a
//! custom filter write a function that takes at least a
//! [`&State`](crate::State) and value argument, then register it with
//! [`add_filter`](crate::Environment::add_filter).
//!
//! # Custom Filters
//!
//! A custom filter is just a simple function which accepts its inputs as
//! parameters and then returns a new value.  For instance the following
//! shows a filter which takes an input value and replaces whitespace with
//! dashes and converts it to lowercase:
//!
//! ```
//! # use tempera::{Environment, State, Error};
//! # let mut env = Environment::new();
//! fn slugify(_state: &State, value: String) -> Result<String, Error> {
//!     Ok(value.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-"))
//! }
//!
//! env.add_filter("slugify", slugify);
//! ```
//!
//! The engine will perform the necessary conversions automatically via the
//! [`FunctionArgs`](crate::value::FunctionArgs) and [`Into`] traits.
use std::cmp::Ordering;
use std::fmt::Write;
use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::eval::State;
use crate::utils::HtmlEscape;
use crate::value::{ops, ArgType, FunctionArgs, Kwargs, Rest, Value, ValueKind, ValueRepr};

type FilterFunc = dyn Fn(&State, Value, Vec<Value>) -> Result<Value, Error> + Sync + Send + 'static;

#[derive(Clone)]
pub(crate) struct BoxedFilter(Arc<FilterFunc>);

/// A utility trait that represents filters.
pub trait Filter<V = Value, Rv = Value, Args = Vec<Value>>: Send + Sync + 'static {
    /// Applies a filter to value with the given arguments.
    fn apply_to(&self, state: &State, value: V, args: Args) -> Result<Rv, Error>;
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<Func, V, Rv, $($name),*> Filter<V, Rv, ($($name,)*)> for Func
        where
            Func: Fn(&State, V, $($name),*) -> Result<Rv, Error> + Send + Sync + 'static
        {
            fn apply_to(&self, state: &State, value: V, args: ($($name,)*)) -> Result<Rv, Error> {
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

impl BoxedFilter {
    /// Creates a new boxed filter.
    pub fn new<F, V, Rv, Args>(f: F) -> BoxedFilter
    where
        F: Filter<V, Rv, Args>,
        V: ArgType,
        Rv: Into<Value>,
        Args: FunctionArgs,
    {
        BoxedFilter(Arc::new(
            move |state, value, args| -> Result<Value, Error> {
                f.apply_to(
                    state,
                    ok!(ArgType::from_value(Some(value))),
                    ok!(FunctionArgs::from_values(args)),
                )
                .map(Into::into)
            },
        ))
    }

    /// Applies the filter to a value and arguments.
    pub fn apply_to(&self, state: &State, value: Value, args: Vec<Value>) -> Result<Value, Error> {
        (self.0)(state, value, args)
    }
}

/// Helper that calls the filter conversion machinery without boxing.
///
/// The built-in dispatch table in `defaults` goes through this so filter
/// lookups stay a compile-time name match.
pub(crate) fn call_filter<F, V, Rv, Args>(
    f: F,
    state: &State,
    value: Value,
    args: Vec<Value>,
) -> Result<Value, Error>
where
    F: Filter<V, Rv, Args>,
    V: ArgType,
    Rv: Into<Value>,
    Args: FunctionArgs,
{
    f.apply_to(
        state,
        ok!(ArgType::from_value(Some(value))),
        ok!(FunctionArgs::from_values(args)),
    )
    .map(Into::into)
}

/// Looks up an attribute, following dotted paths.
fn lookup_path(value: &Value, path: &str) -> Result<Value, Error> {
    let mut rv = value.clone();
    for part in path.split('.') {
        rv = ok!(rv.get_attr(part));
    }
    Ok(rv)
}

fn iterable(value: &Value) -> Result<Vec<Value>, Error> {
    Ok(ok!(value.try_iter()).collect())
}

/// Marks a value as safe.  This converts it into a string.
pub fn safe(_state: &State, v: String) -> Result<Value, Error> {
    Ok(Value::from_safe_string(v))
}

/// HTML escapes a string.
///
/// By default this filter is also registered under the alias `e`.
pub fn escape(_state: &State, v: Value) -> Result<Value, Error> {
    if v.is_safe() {
        Ok(v)
    } else {
        Ok(Value::from_safe_string(
            HtmlEscape(&v.to_string()).to_string(),
        ))
    }
}

/// Converts a value to uppercase.
pub fn upper(_state: &State, v: String) -> Result<String, Error> {
    Ok(v.to_uppercase())
}

/// Converts a value to lowercase.
pub fn lower(_state: &State, v: String) -> Result<String, Error> {
    Ok(v.to_lowercase())
}

/// Converts a value to title case.
pub fn title(_state: &State, v: String) -> Result<String, Error> {
    let mut rv = String::with_capacity(v.len());
    let mut capitalize = true;
    for c in v.chars() {
        if c.is_alphanumeric() {
            if capitalize {
                rv.extend(c.to_uppercase());
                capitalize = false;
            } else {
                rv.extend(c.to_lowercase());
            }
        } else {
            rv.push(c);
            capitalize = true;
        }
    }
    Ok(rv)
}

/// Capitalizes a string: the first character upper, the rest lower.
pub fn capitalize(_state: &State, v: String) -> Result<String, Error> {
    let mut chars = v.chars();
    match chars.next() {
        None => Ok(v),
        Some(first) => Ok(first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()),
    }
}

/// Does a string replace.
pub fn replace(_state: &State, v: String, from: String, to: String) -> Result<String, Error> {
    Ok(v.replace(&from, &to))
}

/// Trims a value.
pub fn trim(_state: &State, s: String, chars: Option<String>) -> Result<String, Error> {
    match chars {
        Some(chars) => {
            let chars = chars.chars().collect::<Vec<_>>();
            Ok(s.trim_matches(&chars[..]).to_string())
        }
        None => Ok(s.trim().to_string()),
    }
}

/// Trims leading whitespace or the given characters.
pub fn lstrip(_state: &State, s: String, chars: Option<String>) -> Result<String, Error> {
    match chars {
        Some(chars) => {
            let chars = chars.chars().collect::<Vec<_>>();
            Ok(s.trim_start_matches(&chars[..]).to_string())
        }
        None => Ok(s.trim_start().to_string()),
    }
}

/// Trims trailing whitespace or the given characters.
pub fn rstrip(_state: &State, s: String, chars: Option<String>) -> Result<String, Error> {
    match chars {
        Some(chars) => {
            let chars = chars.chars().collect::<Vec<_>>();
            Ok(s.trim_end_matches(&chars[..]).to_string())
        }
        None => Ok(s.trim_end().to_string()),
    }
}

/// Returns the "length" of the value.
///
/// By default this filter is also registered under the alias `count`.
pub fn length(_state: &State, v: Value) -> Result<Value, Error> {
    v.len().map(Value::from).ok_or_else(|| {
        Error::new(
            ErrorKind::TypeError,
            format!("cannot calculate length of value of type {}", v.kind()),
        )
    })
}

/// Returns the first item of a sequence or the first character of a string.
pub fn first(_state: &State, v: Value) -> Result<Value, Error> {
    match v.0 {
        ValueRepr::String(ref s, _) => Ok(s.chars().next().map_or_else(Value::undefined, Value::from)),
        ValueRepr::List(ref items) => {
            Ok(items.first().cloned().unwrap_or_else(Value::undefined))
        }
        _ => Err(Error::new(
            ErrorKind::TypeError,
            "cannot get first item of this value",
        )),
    }
}

/// Returns the last item of a sequence or the last character of a string.
pub fn last(_state: &State, v: Value) -> Result<Value, Error> {
    match v.0 {
        ValueRepr::String(ref s, _) => Ok(s.chars().last().map_or_else(Value::undefined, Value::from)),
        ValueRepr::List(ref items) => Ok(items.last().cloned().unwrap_or_else(Value::undefined)),
        _ => Err(Error::new(
            ErrorKind::TypeError,
            "cannot get last item of this value",
        )),
    }
}

/// Reverses a list or string.
pub fn reverse(_state: &State, v: Value) -> Result<Value, Error> {
    if let Some(s) = v.as_str() {
        Ok(Value::from(s.chars().rev().collect::<String>()))
    } else if matches!(v.kind(), ValueKind::Seq) {
        let mut items = ok!(iterable(&v));
        items.reverse();
        Ok(Value::from(items))
    } else {
        Err(Error::new(
            ErrorKind::TypeError,
            format!("cannot reverse value of type {}", v.kind()),
        ))
    }
}

/// Sorts a sequence.
///
/// The sort is stable.  With `attribute` the items are sorted by the named
/// (optionally dotted) attribute, `reverse` flips the order and
/// `case_sensitive` disables the default case insensitive comparison of
/// strings:
///
/// ```jinja
/// {% for user in users|sort(attribute="name") %}...{% endfor %}
/// ```
pub fn sort(_state: &State, v: Value, kwargs: Kwargs) -> Result<Value, Error> {
    let mut items = ok!(iterable(&v));
    let reverse: Option<bool> = ok!(kwargs.get("reverse"));
    let case_sensitive: Option<bool> = ok!(kwargs.get("case_sensitive"));
    let attribute: Option<String> = ok!(kwargs.get("attribute"));

    let case_sensitive = case_sensitive.unwrap_or(false);
    let sort_key = |value: &Value| -> Result<Value, Error> {
        let key = match attribute {
            Some(ref attribute) => ok!(lookup_path(value, attribute)),
            None => value.clone(),
        };
        Ok(match key.as_str() {
            Some(s) if !case_sensitive => Value::from(s.to_lowercase()),
            _ => key,
        })
    };

    let mut failed = None;
    items.sort_by(|a, b| {
        if failed.is_some() {
            return Ordering::Equal;
        }
        match (sort_key(a), sort_key(b)) {
            (Ok(a), Ok(b)) => ops::total_cmp(&a, &b),
            (Err(err), _) | (_, Err(err)) => {
                failed = Some(err);
                Ordering::Equal
            }
        }
    });
    if let Some(err) = failed {
        return Err(err);
    }
    if reverse.unwrap_or(false) {
        items.reverse();
    }
    Ok(Value::from(items))
}

/// Removes duplicates from a sequence, preserving order.
pub fn unique(_state: &State, v: Value, kwargs: Kwargs) -> Result<Value, Error> {
    let attribute: Option<String> = ok!(kwargs.get("attribute"));
    let items = ok!(iterable(&v));
    let mut seen: Vec<Value> = Vec::new();
    let mut rv = Vec::new();
    for item in items {
        let key = match attribute {
            Some(ref attribute) => ok!(lookup_path(&item, attribute)),
            None => item.clone(),
        };
        if !seen.iter().any(|x| ops::loose_eq(x, &key)) {
            seen.push(key);
            rv.push(item);
        }
    }
    Ok(Value::from(rv))
}

/// Batches items into chunks of the given size.
///
/// The optional second argument fills up the last chunk:
///
/// ```jinja
/// {% for row in items|batch(3, '&nbsp;') %}...{% endfor %}
/// ```
pub fn batch(
    _state: &State,
    v: Value,
    count: usize,
    fill_with: Option<Value>,
) -> Result<Value, Error> {
    if count == 0 {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            "batch size must be positive",
        ));
    }
    let mut rv = Vec::new();
    let mut tmp = Vec::with_capacity(count);
    for item in ok!(iterable(&v)) {
        if tmp.len() == count {
            rv.push(Value::from(std::mem::replace(
                &mut tmp,
                Vec::with_capacity(count),
            )));
        }
        tmp.push(item);
    }
    if !tmp.is_empty() {
        if let Some(ref fill_with) = fill_with {
            while tmp.len() < count {
                tmp.push(fill_with.clone());
            }
        }
        rv.push(Value::from(tmp));
    }
    Ok(Value::from(rv))
}

/// Slices an iterable into the given number of columns.
///
/// This is the counterpart to `batch`: it returns the requested number of
/// groups, distributing the items over them.
pub fn slice(
    _state: &State,
    v: Value,
    count: usize,
    fill_with: Option<Value>,
) -> Result<Value, Error> {
    if count == 0 {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            "slice count must be positive",
        ));
    }
    let items = ok!(iterable(&v));
    let len = items.len();
    let items_per_slice = len / count;
    let slices_with_extra = len % count;
    let mut offset = 0;
    let mut rv = Vec::with_capacity(count);
    for slice in 0..count {
        let size = items_per_slice + usize::from(slice < slices_with_extra);
        let mut tmp = items[offset..offset + size].to_vec();
        offset += size;
        if let Some(ref fill_with) = fill_with {
            if slice >= slices_with_extra && slices_with_extra > 0 {
                tmp.push(fill_with.clone());
            }
        }
        rv.push(Value::from(tmp));
    }
    Ok(Value::from(rv))
}

/// Applies a filter to each item, or looks up an attribute on each item.
///
/// ```jinja
/// {{ titles|map('lower')|join(', ') }}
/// {{ users|map(attribute='name')|join(', ') }}
/// ```
pub fn map(state: &State, v: Value, rest: Rest, kwargs: Kwargs) -> Result<Value, Error> {
    let items = ok!(iterable(&v));
    if let Some(attribute) = ok!(kwargs.get::<Option<String>>("attribute")) {
        let default: Option<Value> = ok!(kwargs.get("default"));
        let mut rv = Vec::with_capacity(items.len());
        for item in items {
            let mut value = ok!(lookup_path(&item, &attribute));
            if value.is_undefined() {
                if let Some(ref default) = default {
                    value = default.clone();
                }
            }
            rv.push(value);
        }
        return Ok(Value::from(rv));
    }

    let mut args = rest.0;
    if args.is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            "map requires a filter name or attribute",
        ));
    }
    let filter_name = match args.remove(0).as_str() {
        Some(name) => name.to_string(),
        None => {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "filter name must be a string",
            ))
        }
    };
    let mut rv = Vec::with_capacity(items.len());
    for item in items {
        rv.push(ok!(state.apply_filter(&filter_name, item, args.clone())));
    }
    Ok(Value::from(rv))
}

fn select_or_reject(
    state: &State,
    v: Value,
    mut args: Vec<Value>,
    attribute: Option<&str>,
    invert: bool,
) -> Result<Value, Error> {
    let items = ok!(iterable(&v));
    let test_name = if args.is_empty() {
        None
    } else {
        match args.remove(0).as_str() {
            Some(name) => Some(name.to_string()),
            None => {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    "test name must be a string",
                ))
            }
        }
    };
    let mut rv = Vec::new();
    for item in items {
        let value = match attribute {
            Some(attribute) => ok!(lookup_path(&item, attribute)),
            None => item.clone(),
        };
        let passed = match test_name {
            Some(ref name) => ok!(state.perform_test(name, value, args.clone())),
            None => value.is_true(),
        };
        if passed != invert {
            rv.push(item);
        }
    }
    Ok(Value::from(rv))
}

/// Keeps the items that pass a test (or are truthy without a test).
pub fn select(state: &State, v: Value, rest: Rest) -> Result<Value, Error> {
    select_or_reject(state, v, rest.0, None, false)
}

/// Drops the items that pass a test (or are truthy without a test).
pub fn reject(state: &State, v: Value, rest: Rest) -> Result<Value, Error> {
    select_or_reject(state, v, rest.0, None, true)
}

/// Keeps the items whose attribute passes a test.
///
/// ```jinja
/// {{ users|selectattr('is_active')|map(attribute='name')|join(', ') }}
/// ```
pub fn selectattr(state: &State, v: Value, attr: String, rest: Rest) -> Result<Value, Error> {
    select_or_reject(state, v, rest.0, Some(&attr), false)
}

/// Drops the items whose attribute passes a test.
pub fn rejectattr(state: &State, v: Value, attr: String, rest: Rest) -> Result<Value, Error> {
    select_or_reject(state, v, rest.0, Some(&attr), true)
}

/// Sums up a sequence, optionally by attribute and with a start value.
pub fn sum(_state: &State, v: Value, kwargs: Kwargs) -> Result<Value, Error> {
    let attribute: Option<String> = ok!(kwargs.get("attribute"));
    let start: Option<Value> = ok!(kwargs.get("start"));
    let mut rv = start.unwrap_or_else(|| Value::from(0));
    for item in ok!(iterable(&v)) {
        let item = match attribute {
            Some(ref attribute) => ok!(lookup_path(&item, attribute)),
            None => item,
        };
        rv = ok!(ops::add(&rv, &item));
    }
    Ok(rv)
}

/// Converts a value into a list.
pub fn list(_state: &State, v: Value) -> Result<Value, Error> {
    Ok(Value::from(ok!(iterable(&v))))
}

/// Groups a sequence of objects by an attribute.
///
/// The result is a sequence of `[grouper, items]` pairs which also unpack
/// in for loops:
///
/// ```jinja
/// {% for city, users in users|groupby('city') %}...{% endfor %}
/// ```
pub fn groupby(_state: &State, v: Value, attribute: String) -> Result<Value, Error> {
    let items = ok!(iterable(&v));
    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
    for item in items {
        let key = ok!(lookup_path(&item, &attribute));
        match groups.iter_mut().find(|(k, _)| ops::loose_eq(k, &key)) {
            Some((_, group)) => group.push(item),
            None => groups.push((key, vec![item])),
        }
    }
    groups.sort_by(|a, b| ops::total_cmp(&a.0, &b.0));
    Ok(Value::from(
        groups
            .into_iter()
            .map(|(key, group)| Value::from(vec![key, Value::from(group)]))
            .collect::<Vec<_>>(),
    ))
}

/// Joins a sequence by a separator.
pub fn join(_state: &State, val: Value, joiner: Option<String>) -> Result<String, Error> {
    if val.is_undefined() || val.is_none() {
        return Ok(String::new());
    }

    let joiner = joiner.as_deref().unwrap_or("");

    if let Some(s) = val.as_str() {
        let mut rv = String::new();
        for c in s.chars() {
            if !rv.is_empty() {
                rv.push_str(joiner);
            }
            rv.push(c);
        }
        return Ok(rv);
    }

    let mut rv = String::new();
    for item in ok!(iterable(&val)) {
        if !rv.is_empty() {
            rv.push_str(joiner);
        }
        if let Some(s) = item.as_str() {
            rv.push_str(s);
        } else {
            write!(rv, "{item}").ok();
        }
    }
    Ok(rv)
}

/// Returns the value if it is defined, otherwise the fallback.
///
/// With `true` as second argument falsy values trigger the fallback as
/// well.  By default this filter is also registered under the alias `d`.
pub fn default(
    _state: &State,
    value: Value,
    other: Option<Value>,
    boolean: Option<bool>,
) -> Result<Value, Error> {
    let use_default = if boolean.unwrap_or(false) {
        !value.is_true()
    } else {
        value.is_undefined()
    };
    Ok(if use_default {
        other.unwrap_or_else(|| Value::from(""))
    } else {
        value
    })
}

/// Returns the absolute value of a number.
pub fn abs(_state: &State, value: Value) -> Result<Value, Error> {
    match value.0 {
        ValueRepr::I64(v) => v
            .checked_abs()
            .map(Value::from)
            .ok_or_else(|| Error::new(ErrorKind::TypeError, "integer arithmetic overflowed")),
        ValueRepr::F64(v) => Ok(Value::from(v.abs())),
        _ => Err(Error::new(
            ErrorKind::TypeError,
            format!("cannot get absolute value of {}", value.kind()),
        )),
    }
}

/// Converts a value into an integer.
///
/// An optional fallback is returned for values that cannot be converted;
/// strings may carry a base as third argument.
pub fn int(
    _state: &State,
    value: Value,
    default: Option<i64>,
    base: Option<u32>,
) -> Result<Value, Error> {
    let converted = match value.0 {
        ValueRepr::I64(v) => Some(v),
        ValueRepr::Bool(v) => Some(v as i64),
        ValueRepr::F64(v) => Some(v as i64),
        ValueRepr::String(ref s, _) => {
            let s = s.trim();
            match base {
                Some(base) => {
                    let digits = match base {
                        16 => s.strip_prefix("0x").unwrap_or(s),
                        8 => s.strip_prefix("0o").unwrap_or(s),
                        2 => s.strip_prefix("0b").unwrap_or(s),
                        _ => s,
                    };
                    i64::from_str_radix(digits, base).ok()
                }
                None => s
                    .parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|v| v as i64)),
            }
        }
        _ => None,
    };
    Ok(Value::from(converted.unwrap_or(default.unwrap_or(0))))
}

/// Converts a value into a float.
pub fn float(_state: &State, value: Value, default: Option<f64>) -> Result<Value, Error> {
    let converted = match value.0 {
        ValueRepr::I64(v) => Some(v as f64),
        ValueRepr::Bool(v) => Some(v as i64 as f64),
        ValueRepr::F64(v) => Some(v),
        ValueRepr::String(ref s, _) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(Value::from(converted.unwrap_or(default.unwrap_or(0.0))))
}

/// Rounds a number.
///
/// `precision` controls the number of kept fractional digits and `method`
/// can be `common` (the default), `ceil` or `floor`.
pub fn round(
    _state: &State,
    value: Value,
    precision: Option<i32>,
    method: Option<String>,
) -> Result<Value, Error> {
    let v = match value.as_f64() {
        Some(v) => v,
        None => {
            return Err(Error::new(
                ErrorKind::TypeError,
                format!("cannot round value of type {}", value.kind()),
            ))
        }
    };
    let factor = 10f64.powi(precision.unwrap_or(0));
    let scaled = v * factor;
    let rounded = match method.as_deref() {
        None | Some("common") => scaled.round(),
        Some("ceil") => scaled.ceil(),
        Some("floor") => scaled.floor(),
        Some(other) => {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("unknown rounding method {other:?}"),
            ))
        }
    };
    Ok(Value::from(rounded / factor))
}

/// Returns the smallest item of a sequence.
pub fn min(_state: &State, v: Value) -> Result<Value, Error> {
    let items = ok!(iterable(&v));
    Ok(items
        .into_iter()
        .min_by(|a, b| ops::total_cmp(a, b))
        .unwrap_or_else(Value::undefined))
}

/// Returns the largest item of a sequence.
pub fn max(_state: &State, v: Value) -> Result<Value, Error> {
    let items = ok!(iterable(&v));
    Ok(items
        .into_iter()
        .max_by(|a, b| ops::total_cmp(a, b))
        .unwrap_or_else(Value::undefined))
}

/// Sorts a map and returns a list of `[key, value]` pairs.
///
/// `by` can be set to `"value"` to sort by value instead of by key;
/// `reverse` flips the order.
pub fn dictsort(_state: &State, v: Value, kwargs: Kwargs) -> Result<Value, Error> {
    let map = match v.as_map() {
        Some(map) => map,
        None => {
            return Err(Error::new(
                ErrorKind::TypeError,
                "cannot convert value into pair list",
            ))
        }
    };
    let by: Option<String> = ok!(kwargs.get("by"));
    let case_sensitive: Option<bool> = ok!(kwargs.get("case_sensitive"));
    let reverse: Option<bool> = ok!(kwargs.get("reverse"));
    let by_value = match by.as_deref() {
        None | Some("key") => false,
        Some("value") => true,
        Some(other) => {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("invalid dictsort by argument {other:?}"),
            ))
        }
    };

    let mut pairs = map
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect::<Vec<_>>();
    pairs.sort_by(|a, b| {
        if by_value {
            ops::total_cmp(&a.1, &b.1)
        } else if case_sensitive.unwrap_or(false) {
            a.0.cmp(&b.0)
        } else {
            a.0.to_lowercase().cmp(&b.0.to_lowercase())
        }
    });
    if reverse.unwrap_or(false) {
        pairs.reverse();
    }
    Ok(Value::from(
        pairs
            .into_iter()
            .map(|(k, v)| Value::from(vec![Value::from(k), v]))
            .collect::<Vec<_>>(),
    ))
}

/// Returns a list of `[key, value]` pairs of a map.
pub fn items(_state: &State, v: Value) -> Result<Value, Error> {
    let map = match v.as_map() {
        Some(map) => map,
        None => {
            return Err(Error::new(
                ErrorKind::TypeError,
                "cannot convert value into pair list",
            ))
        }
    };
    Ok(Value::from(
        map.iter()
            .map(|(k, v)| Value::from(vec![Value::from(k.as_str()), v.clone()]))
            .collect::<Vec<_>>(),
    ))
}

/// Formats a printf-style format string with the given arguments.
///
/// Supported placeholders are `%s`, `%d`, `%f` and the literal `%%`.
///
/// ```jinja
/// {{ "%s - %d"|format("fish", 2) }}
/// ```
pub fn format(_state: &State, fmt: String, rest: Rest) -> Result<String, Error> {
    let mut rv = String::with_capacity(fmt.len());
    let mut args = rest.0.into_iter();
    let mut chars = fmt.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            rv.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => rv.push('%'),
            Some('s') => {
                let arg = ok!(next_format_arg(&mut args));
                write!(rv, "{arg}").ok();
            }
            Some('d') => {
                let arg = ok!(next_format_arg(&mut args));
                match arg.as_i64() {
                    Some(v) => {
                        write!(rv, "{v}").ok();
                    }
                    None => {
                        return Err(Error::new(
                            ErrorKind::InvalidArgument,
                            "%d requires an integer argument",
                        ))
                    }
                }
            }
            Some('f') => {
                let arg = ok!(next_format_arg(&mut args));
                match arg.as_f64() {
                    Some(v) => {
                        write!(rv, "{v:.6}").ok();
                    }
                    None => {
                        return Err(Error::new(
                            ErrorKind::InvalidArgument,
                            "%f requires a numeric argument",
                        ))
                    }
                }
            }
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    "unsupported format placeholder",
                ))
            }
        }
    }
    Ok(rv)
}

fn next_format_arg(args: &mut std::vec::IntoIter<Value>) -> Result<Value, Error> {
    args.next().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidArgument,
            "not enough arguments for format string",
        )
    })
}

/// Truncates a string to the given length.
///
/// If `killwords` is false (the default) the string is cut at the last
/// word boundary before the limit.  `end` is appended to signal the cut
/// and `leeway` permits slightly longer strings to pass unchanged.
pub fn truncate(
    _state: &State,
    v: String,
    length: Option<usize>,
    killwords: Option<bool>,
    end: Option<String>,
    kwargs: Kwargs,
) -> Result<String, Error> {
    let length = length.unwrap_or(255);
    let killwords = killwords.unwrap_or(false);
    let end = end.unwrap_or_else(|| "...".to_string());
    let leeway: usize = ok!(kwargs.get::<Option<usize>>("leeway")).unwrap_or(5);
    if length < end.chars().count() {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            "expected length >= end length",
        ));
    }

    let total = v.chars().count();
    if total <= length + leeway {
        return Ok(v);
    }
    let keep = length - end.chars().count();
    let cut: String = v.chars().take(keep).collect();
    let cut = if killwords {
        cut
    } else {
        match cut.rfind(' ') {
            Some(idx) => cut[..idx].to_string(),
            None => cut,
        }
    };
    Ok(format!("{cut}{end}"))
}

/// Counts the words in a string.
pub fn wordcount(_state: &State, v: String) -> Result<Value, Error> {
    Ok(Value::from(v.split_whitespace().count()))
}

/// Wraps text to the given width.
///
/// Wrapping is greedy on whitespace boundaries; the newline sequence of
/// the environment joins the lines.
pub fn wordwrap(state: &State, v: String, kwargs: Kwargs) -> Result<String, Error> {
    let width: usize = ok!(kwargs.get::<Option<usize>>("width")).unwrap_or(79);
    let break_long_words: bool =
        ok!(kwargs.get::<Option<bool>>("break_long_words")).unwrap_or(true);
    let newline = state.env().newline_sequence().to_string();

    let mut lines: Vec<String> = Vec::new();
    for input_line in v.lines() {
        let mut line = String::new();
        for word in input_line.split_whitespace() {
            let word_len = word.chars().count();
            let line_len = line.chars().count();
            if line.is_empty() {
                if word_len > width && break_long_words {
                    let mut rest = word;
                    while rest.chars().count() > width {
                        let cut: String = rest.chars().take(width).collect();
                        lines.push(cut.clone());
                        rest = &rest[cut.len()..];
                    }
                    line.push_str(rest);
                } else {
                    line.push_str(word);
                }
            } else if line_len + 1 + word_len <= width {
                line.push(' ');
                line.push_str(word);
            } else {
                lines.push(std::mem::take(&mut line));
                line.push_str(word);
            }
        }
        lines.push(line);
    }
    Ok(lines.join(&newline))
}

/// URL encodes a value.
///
/// If given a map it encodes the parameters into a query set, otherwise it
/// encodes the stringified value.  If the value is none or undefined, an
/// empty string is returned.
pub fn urlencode(_state: &State, value: Value) -> Result<String, Error> {
    const SET: &percent_encoding::AsciiSet =
        &percent_encoding::NON_ALPHANUMERIC.remove(b'/').add(b' ');
    match value.0 {
        ValueRepr::None | ValueRepr::Undefined(_) => Ok("".into()),
        ValueRepr::String(ref s, _) => {
            Ok(percent_encoding::utf8_percent_encode(s, SET).to_string())
        }
        ValueRepr::Map(ref map) | ValueRepr::Kwargs(ref map) => {
            let mut rv = String::new();
            for (idx, (k, v)) in map.iter().enumerate() {
                if idx > 0 {
                    rv.push('&');
                }
                write!(rv, "{}", percent_encoding::utf8_percent_encode(k, SET)).ok();
                write!(
                    rv,
                    "={}",
                    percent_encoding::utf8_percent_encode(&v.to_string(), SET)
                )
                .ok();
            }
            Ok(rv)
        }
        _ => Ok(percent_encoding::utf8_percent_encode(&value.to_string(), SET).to_string()),
    }
}

/// Converts URLs in text into clickable links.
pub fn urlize(_state: &State, v: String) -> Result<Value, Error> {
    // quotes would break out of the href attribute, the rest of the url is
    // emitted verbatim
    fn attr_safe(url: &str) -> String {
        url.replace('"', "%22")
    }

    let mut rv = String::with_capacity(v.len());
    for (idx, word) in v.split(' ').enumerate() {
        if idx > 0 {
            rv.push(' ');
        }
        let trimmed = word.trim_end_matches(['.', ',', ')', '>', '\n']);
        let trailing = &word[trimmed.len()..];
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            write!(
                rv,
                "<a href=\"{}\">{}</a>{}",
                attr_safe(trimmed),
                trimmed,
                HtmlEscape(trailing)
            )
            .ok();
        } else if trimmed.starts_with("www.") {
            write!(
                rv,
                "<a href=\"https://{}\">{}</a>{}",
                attr_safe(trimmed),
                trimmed,
                HtmlEscape(trailing)
            )
            .ok();
        } else {
            write!(rv, "{}", HtmlEscape(word)).ok();
        }
    }
    Ok(Value::from_safe_string(rv))
}

/// Removes HTML tags and normalizes whitespace.
pub fn striptags(_state: &State, v: String) -> Result<String, Error> {
    let mut rv = String::with_capacity(v.len());
    let mut in_tag = false;
    for c in v.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => rv.push(c),
            _ => {}
        }
    }
    Ok(rv.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Creates an HTML/XML attribute string from a map.
///
/// Entries with none or undefined values are skipped.  The result is safe
/// for interpolation into markup.
pub fn xmlattr(_state: &State, v: Value, autospace: Option<bool>) -> Result<Value, Error> {
    let map = match v.as_map() {
        Some(map) => map,
        None => {
            return Err(Error::new(
                ErrorKind::TypeError,
                "xmlattr requires a map of attributes",
            ))
        }
    };
    let mut rv = String::new();
    for (key, value) in map.iter() {
        if value.is_none() || value.is_undefined() {
            continue;
        }
        if !rv.is_empty() {
            rv.push(' ');
        }
        write!(rv, "{}=\"{}\"", key, HtmlEscape(&value.to_string())).ok();
    }
    if autospace.unwrap_or(true) && !rv.is_empty() {
        rv.insert(0, ' ');
    }
    Ok(Value::from_safe_string(rv))
}

/// Indents every line of text by the given width.
///
/// The first line and blank lines are not indented by default.
pub fn indent(
    _state: &State,
    v: String,
    width: Option<usize>,
    indent_first_line: Option<bool>,
    indent_blank_lines: Option<bool>,
) -> Result<String, Error> {
    let width = width.unwrap_or(4);
    let pad = " ".repeat(width);
    let mut rv = String::new();
    for (idx, line) in v.lines().enumerate() {
        if idx > 0 {
            rv.push('\n');
        }
        let indent_this = (idx > 0 || indent_first_line.unwrap_or(false))
            && (!line.trim().is_empty() || indent_blank_lines.unwrap_or(false));
        if indent_this {
            rv.push_str(&pad);
        }
        rv.push_str(line);
    }
    Ok(rv)
}

/// Centers a string within the given width.
pub fn center(_state: &State, v: String, width: Option<usize>) -> Result<String, Error> {
    let width = width.unwrap_or(80);
    let len = v.chars().count();
    if len >= width {
        return Ok(v);
    }
    let left = (width - len) / 2;
    let right = width - len - left;
    Ok(format!("{}{}{}", " ".repeat(left), v, " ".repeat(right)))
}

/// Looks up an attribute on an object.
///
/// This is the programmatic counterpart of the `.` operator:
/// `foo|attr("bar")` behaves like `foo.bar`.
pub fn attr(_state: &State, value: Value, name: String) -> Result<Value, Error> {
    value.get_attr(&name)
}

/// Converts a value into a string.
pub fn string(_state: &State, value: Value) -> Result<Value, Error> {
    if matches!(value.kind(), ValueKind::String) {
        Ok(value)
    } else {
        Ok(Value::from(value.to_string()))
    }
}

/// Formats a number of bytes into a human readable size.
///
/// The optional argument switches between decimal (kB, MB) and binary
/// (KiB, MiB) prefixes.
pub fn filesizeformat(_state: &State, value: Value, binary: Option<bool>) -> Result<String, Error> {
    let bytes = match value.as_f64() {
        Some(v) => v,
        None => {
            return Err(Error::new(
                ErrorKind::TypeError,
                "filesizeformat requires a number",
            ))
        }
    };
    let binary = binary.unwrap_or(false);
    let base: f64 = if binary { 1024.0 } else { 1000.0 };
    const DECIMAL: [&str; 8] = ["kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];
    const BINARY: [&str; 8] = ["KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];
    let prefixes = if binary { &BINARY } else { &DECIMAL };

    if bytes == 1.0 {
        return Ok("1 Byte".into());
    }
    if bytes.abs() < base {
        return Ok(format!("{:.0} Bytes", bytes));
    }
    let mut unit = base;
    for (idx, prefix) in prefixes.iter().enumerate() {
        unit = base.powi(idx as i32 + 2);
        if bytes.abs() < unit || idx == prefixes.len() - 1 {
            return Ok(format!("{:.1} {}", base * bytes / unit, prefix));
        }
    }
    unreachable!()
}

/// Pretty prints a value using the engine's debug representation.
///
/// Maps are ordered, so the output is deterministic: sequences and maps
/// expand over multiple lines the way Rust's alternate debug formatting
/// does.
pub fn pprint(_state: &State, value: Value) -> Result<String, Error> {
    Ok(format!("{value:#?}"))
}

/// Picks a random item from a sequence or a random character from a
/// string.
pub fn random(_state: &State, value: Value) -> Result<Value, Error> {
    use rand::Rng;

    let items = match value.as_str() {
        Some(s) => s.chars().map(Value::from).collect::<Vec<_>>(),
        None => ok!(iterable(&value)),
    };
    if items.is_empty() {
        return Ok(Value::undefined());
    }
    let idx = rand::thread_rng().gen_range(0..items.len());
    Ok(items[idx].clone())
}

/// Dumps a value to JSON.
///
/// The resulting string is safe to use in HTML: the characters `<`, `>`,
/// `&` and `'` are emitted as unicode escapes.  The optional `indent`
/// keyword argument enables pretty printing.
pub fn tojson(_state: &State, value: Value, kwargs: Kwargs) -> Result<Value, Error> {
    let indent: Option<usize> = ok!(kwargs.get("indent"));
    let dumped = if indent.is_some() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    dumped
        .map_err(|err| {
            Error::new(ErrorKind::BadSerialization, "cannot serialize to JSON").with_source(err)
        })
        .map(|s| {
            let mut rv = String::with_capacity(s.len());
            for c in s.chars() {
                match c {
                    '<' => rv.push_str("\\u003c"),
                    '>' => rv.push_str("\\u003e"),
                    '&' => rv.push_str("\\u0026"),
                    '\'' => rv.push_str("\\u0027"),
                    _ => rv.push(c),
                }
            }
            Value::from_safe_string(rv)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    fn with_state<R>(f: impl FnOnce(&State) -> R) -> R {
        let env = crate::Environment::new();
        crate::eval::with_test_state(&env, f)
    }

    #[test]
    fn test_basics() {
        fn test(_: &State, a: u32, b: u32) -> Result<u32, Error> {
            Ok(a + b)
        }

        with_state(|state| {
            let bx = BoxedFilter::new(test);
            assert_eq!(
                bx.apply_to(state, Value::from(23), vec![Value::from(42)])
                    .unwrap(),
                Value::from(65)
            );
        });
    }

    #[test]
    fn test_optional_args() {
        fn add(_: &State, val: u32, a: u32, b: Option<u32>) -> Result<u32, Error> {
            let mut sum = val + a;
            if let Some(b) = b {
                sum += b;
            }
            Ok(sum)
        }

        with_state(|state| {
            let bx = BoxedFilter::new(add);
            assert_eq!(
                bx.apply_to(state, Value::from(23), vec![Value::from(42)])
                    .unwrap(),
                Value::from(65)
            );
            assert_eq!(
                bx.apply_to(
                    state,
                    Value::from(23),
                    vec![Value::from(42), Value::undefined()]
                )
                .unwrap(),
                Value::from(65)
            );
            assert_eq!(
                bx.apply_to(state, Value::from(23), vec![Value::from(42), Value::from(1)])
                    .unwrap(),
                Value::from(66)
            );
        });
    }

    #[test]
    fn test_truncate() {
        with_state(|state| {
            assert_eq!(
                truncate(
                    state,
                    "foo bar baz qux".into(),
                    Some(9),
                    None,
                    None,
                    Kwargs::default()
                )
                .unwrap(),
                "foo..."
            );
            assert_eq!(
                truncate(
                    state,
                    "foo bar baz qux".into(),
                    Some(9),
                    Some(true),
                    None,
                    Kwargs::default()
                )
                .unwrap(),
                "foo ba..."
            );
        });
    }

    #[test]
    fn test_indent() {
        with_state(|state| {
            assert_eq!(
                indent(state, "a\nb\nc".into(), Some(2), None, None).unwrap(),
                "a\n  b\n  c"
            );
            assert_eq!(
                indent(state, "a\nb".into(), Some(2), Some(true), None).unwrap(),
                "  a\n  b"
            );
        });
    }

    #[test]
    fn test_filesizeformat() {
        with_state(|state| {
            assert_eq!(
                filesizeformat(state, Value::from(0), None).unwrap(),
                "0 Bytes"
            );
            assert_eq!(
                filesizeformat(state, Value::from(1), None).unwrap(),
                "1 Byte"
            );
            assert_eq!(
                filesizeformat(state, Value::from(1000), None).unwrap(),
                "1.0 kB"
            );
            assert_eq!(
                filesizeformat(state, Value::from(1024), Some(true)).unwrap(),
                "1.0 KiB"
            );
        });
    }
}
