use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::error::Error;
use crate::eval::State;
use crate::filters::{self, call_filter};
use crate::functions::{self, BoxedFunction};
use crate::tests::{self, call_test};
use crate::utils::AutoEscape;
use crate::value::Value;

pub(crate) fn no_auto_escape(_: &str) -> AutoEscape {
    AutoEscape::None
}

/// The default logic for auto escaping based on file extension.
///
/// * [`Html`](AutoEscape::Html): `.html`, `.htm`, `.xml`
/// * [`None`](AutoEscape::None): _all others_
pub fn default_auto_escape_callback(name: &str) -> AutoEscape {
    match name.rsplit('.').next() {
        Some("html" | "htm" | "xml") => AutoEscape::Html,
        _ => AutoEscape::None,
    }
}

/// Dispatches a built-in filter by name.
///
/// The match is a compile-time string table: lookups do not allocate and
/// do not touch the environment's registries.
pub(crate) fn apply_builtin_filter(
    name: &str,
    state: &State,
    value: Value,
    args: Vec<Value>,
) -> Option<Result<Value, Error>> {
    Some(match name {
        "safe" => call_filter(filters::safe, state, value, args),
        "escape" | "e" => call_filter(filters::escape, state, value, args),
        "upper" => call_filter(filters::upper, state, value, args),
        "lower" => call_filter(filters::lower, state, value, args),
        "title" => call_filter(filters::title, state, value, args),
        "capitalize" => call_filter(filters::capitalize, state, value, args),
        "replace" => call_filter(filters::replace, state, value, args),
        "trim" => call_filter(filters::trim, state, value, args),
        "lstrip" => call_filter(filters::lstrip, state, value, args),
        "rstrip" => call_filter(filters::rstrip, state, value, args),
        "length" | "count" => call_filter(filters::length, state, value, args),
        "first" => call_filter(filters::first, state, value, args),
        "last" => call_filter(filters::last, state, value, args),
        "reverse" => call_filter(filters::reverse, state, value, args),
        "sort" => call_filter(filters::sort, state, value, args),
        "unique" => call_filter(filters::unique, state, value, args),
        "batch" => call_filter(filters::batch, state, value, args),
        "slice" => call_filter(filters::slice, state, value, args),
        "map" => call_filter(filters::map, state, value, args),
        "select" => call_filter(filters::select, state, value, args),
        "reject" => call_filter(filters::reject, state, value, args),
        "selectattr" => call_filter(filters::selectattr, state, value, args),
        "rejectattr" => call_filter(filters::rejectattr, state, value, args),
        "sum" => call_filter(filters::sum, state, value, args),
        "list" => call_filter(filters::list, state, value, args),
        "groupby" => call_filter(filters::groupby, state, value, args),
        "join" => call_filter(filters::join, state, value, args),
        "default" | "d" => call_filter(filters::default, state, value, args),
        "abs" => call_filter(filters::abs, state, value, args),
        "int" => call_filter(filters::int, state, value, args),
        "float" => call_filter(filters::float, state, value, args),
        "round" => call_filter(filters::round, state, value, args),
        "min" => call_filter(filters::min, state, value, args),
        "max" => call_filter(filters::max, state, value, args),
        "dictsort" => call_filter(filters::dictsort, state, value, args),
        "items" => call_filter(filters::items, state, value, args),
        "format" => call_filter(filters::format, state, value, args),
        "truncate" => call_filter(filters::truncate, state, value, args),
        "wordcount" => call_filter(filters::wordcount, state, value, args),
        "wordwrap" => call_filter(filters::wordwrap, state, value, args),
        "urlencode" => call_filter(filters::urlencode, state, value, args),
        "urlize" => call_filter(filters::urlize, state, value, args),
        "striptags" => call_filter(filters::striptags, state, value, args),
        "xmlattr" => call_filter(filters::xmlattr, state, value, args),
        "indent" => call_filter(filters::indent, state, value, args),
        "center" => call_filter(filters::center, state, value, args),
        "attr" => call_filter(filters::attr, state, value, args),
        "string" => call_filter(filters::string, state, value, args),
        "filesizeformat" => call_filter(filters::filesizeformat, state, value, args),
        "pprint" => call_filter(filters::pprint, state, value, args),
        "random" => call_filter(filters::random, state, value, args),
        "tojson" => call_filter(filters::tojson, state, value, args),
        _ => return None,
    })
}

pub(crate) fn is_builtin_filter(name: &str) -> bool {
    matches!(
        name,
        "safe"
            | "escape"
            | "e"
            | "upper"
            | "lower"
            | "title"
            | "capitalize"
            | "replace"
            | "trim"
            | "lstrip"
            | "rstrip"
            | "length"
            | "count"
            | "first"
            | "last"
            | "reverse"
            | "sort"
            | "unique"
            | "batch"
            | "slice"
            | "map"
            | "select"
            | "reject"
            | "selectattr"
            | "rejectattr"
            | "sum"
            | "list"
            | "groupby"
            | "join"
            | "default"
            | "d"
            | "abs"
            | "int"
            | "float"
            | "round"
            | "min"
            | "max"
            | "dictsort"
            | "items"
            | "format"
            | "truncate"
            | "wordcount"
            | "wordwrap"
            | "urlencode"
            | "urlize"
            | "striptags"
            | "xmlattr"
            | "indent"
            | "center"
            | "attr"
            | "string"
            | "filesizeformat"
            | "pprint"
            | "random"
            | "tojson"
    )
}

/// Dispatches a built-in test by name.
pub(crate) fn perform_builtin_test(
    name: &str,
    state: &State,
    value: Value,
    args: Vec<Value>,
) -> Option<Result<bool, Error>> {
    Some(match name {
        "undefined" => call_test(tests::is_undefined, state, value, args),
        "defined" => call_test(tests::is_defined, state, value, args),
        "none" => call_test(tests::is_none, state, value, args),
        "boolean" => call_test(tests::is_boolean, state, value, args),
        "true" => call_test(tests::is_true, state, value, args),
        "false" => call_test(tests::is_false, state, value, args),
        "integer" => call_test(tests::is_integer, state, value, args),
        "float" => call_test(tests::is_float, state, value, args),
        "number" => call_test(tests::is_number, state, value, args),
        "string" => call_test(tests::is_string, state, value, args),
        "mapping" => call_test(tests::is_mapping, state, value, args),
        "sequence" => call_test(tests::is_sequence, state, value, args),
        "iterable" => call_test(tests::is_iterable, state, value, args),
        "callable" => call_test(tests::is_callable, state, value, args),
        "empty" => call_test(tests::is_empty, state, value, args),
        "odd" => call_test(tests::is_odd, state, value, args),
        "even" => call_test(tests::is_even, state, value, args),
        "divisibleby" => call_test(tests::is_divisibleby, state, value, args),
        "lower" => call_test(tests::is_lower, state, value, args),
        "upper" => call_test(tests::is_upper, state, value, args),
        "escaped" | "safe" => call_test(tests::is_escaped, state, value, args),
        "in" => call_test(tests::is_in, state, value, args),
        "eq" | "equalto" | "==" => call_test(tests::is_eq, state, value, args),
        "ne" | "!=" => call_test(tests::is_ne, state, value, args),
        "lt" | "lessthan" | "<" => call_test(tests::is_lt, state, value, args),
        "le" | "<=" => call_test(tests::is_le, state, value, args),
        "gt" | "greaterthan" | ">" => call_test(tests::is_gt, state, value, args),
        "ge" | ">=" => call_test(tests::is_ge, state, value, args),
        "sameas" => call_test(tests::is_sameas, state, value, args),
        "filter" => call_test(tests::is_filter, state, value, args),
        "test" => call_test(tests::is_test, state, value, args),
        "startingwith" => call_test(tests::is_startingwith, state, value, args),
        "endingwith" => call_test(tests::is_endingwith, state, value, args),
        _ => return None,
    })
}

pub(crate) fn is_builtin_test(name: &str) -> bool {
    matches!(
        name,
        "undefined"
            | "defined"
            | "none"
            | "boolean"
            | "true"
            | "false"
            | "integer"
            | "float"
            | "number"
            | "string"
            | "mapping"
            | "sequence"
            | "iterable"
            | "callable"
            | "empty"
            | "odd"
            | "even"
            | "divisibleby"
            | "lower"
            | "upper"
            | "escaped"
            | "safe"
            | "in"
            | "eq"
            | "equalto"
            | "=="
            | "ne"
            | "!="
            | "lt"
            | "lessthan"
            | "<"
            | "le"
            | "<="
            | "gt"
            | "greaterthan"
            | ">"
            | "ge"
            | ">="
            | "sameas"
            | "filter"
            | "test"
            | "startingwith"
            | "endingwith"
    )
}

pub(crate) fn get_globals() -> BTreeMap<Cow<'static, str>, Value> {
    let mut rv = BTreeMap::new();
    rv.insert(
        Cow::Borrowed("range"),
        BoxedFunction::new("range", functions::range).to_value(),
    );
    rv.insert(
        Cow::Borrowed("dict"),
        BoxedFunction::new("dict", functions::dict).to_value(),
    );
    rv
}
