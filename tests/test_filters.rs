use similar_asserts::assert_eq;

use tempera::value::Value;
use tempera::{context, Environment, ErrorKind};

fn render(source: &str, ctx: Value) -> String {
    let env = Environment::new();
    env.render_str(source, ctx).unwrap()
}

fn render_ok(source: &str) -> String {
    render(source, context!())
}

#[test]
fn test_string_filters() {
    assert_eq!(render_ok("{{ 'hello'|upper }}"), "HELLO");
    assert_eq!(render_ok("{{ 'HELLO'|lower }}"), "hello");
    assert_eq!(render_ok("{{ 'hello world'|title }}"), "Hello World");
    assert_eq!(render_ok("{{ 'hELLO'|capitalize }}"), "Hello");
    assert_eq!(render_ok("{{ '  x  '|trim }}"), "x");
    assert_eq!(render_ok("{{ 'xxaxx'|trim('x') }}"), "a");
    assert_eq!(render_ok("{{ '  x'|lstrip }}"), "x");
    assert_eq!(render_ok("{{ 'x  '|rstrip }}"), "x");
    assert_eq!(render_ok("{{ 'foo bar'|replace('bar', 'baz') }}"), "foo baz");
    assert_eq!(render_ok("{{ 'a b c'|wordcount }}"), "3");
    assert_eq!(render_ok("{{ 'x'|center(5) }}"), "  x  ");
    assert_eq!(render_ok("{{ 'abc'|first }}"), "a");
    assert_eq!(render_ok("{{ 'abc'|last }}"), "c");
    assert_eq!(render_ok("{{ 'abc'|reverse }}"), "cba");
    assert_eq!(render_ok("{{ 'abc'|length }}"), "3");
    assert_eq!(render_ok("{{ 42|string is string }}"), "true");
}

#[test]
fn test_format_filter() {
    assert_eq!(render_ok("{{ '%s - %d'|format('fish', 2) }}"), "fish - 2");
    assert_eq!(render_ok("{{ '100%%'|format }}"), "100%");
    let env = Environment::new();
    let err = env
        .render_str("{{ '%s %s'|format('one') }}", context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_truncate_filter() {
    assert_eq!(
        render_ok("{{ 'foo bar baz qux'|truncate(9) }}"),
        "foo..."
    );
    assert_eq!(
        render_ok("{{ 'foo bar baz qux'|truncate(9, true) }}"),
        "foo ba..."
    );
    assert_eq!(render_ok("{{ 'short'|truncate(10) }}"), "short");
}

#[test]
fn test_wordwrap_filter() {
    assert_eq!(
        render_ok("{{ 'aaa bbb ccc'|wordwrap(width=7) }}"),
        "aaa bbb\nccc"
    );
}

#[test]
fn test_indent_filter() {
    assert_eq!(
        render_ok("{{ 'a\nb'|indent(2) }}"),
        "a\n  b"
    );
    assert_eq!(
        render_ok("{{ 'a\nb'|indent(2, true) }}"),
        "  a\n  b"
    );
}

#[test]
fn test_sequence_filters() {
    assert_eq!(render_ok("{{ [1, 2, 3]|first }}"), "1");
    assert_eq!(render_ok("{{ [1, 2, 3]|last }}"), "3");
    assert_eq!(render_ok("{{ [1, 2, 3]|length }}"), "3");
    assert_eq!(render_ok("{{ [1, 2, 3]|count }}"), "3");
    assert_eq!(render_ok("{{ [3, 1, 2]|sort }}"), "[1, 2, 3]");
    assert_eq!(render_ok("{{ [1, 2, 3]|sort(reverse=true) }}"), "[3, 2, 1]");
    assert_eq!(render_ok("{{ ['b', 'A', 'c']|sort }}"), "[\"A\", \"b\", \"c\"]");
    assert_eq!(render_ok("{{ [1, 2, 1, 3]|unique }}"), "[1, 2, 3]");
    assert_eq!(render_ok("{{ [1, 2, 3]|reverse }}"), "[3, 2, 1]");
    assert_eq!(render_ok("{{ [1, 2, 3]|join('-') }}"), "1-2-3");
    assert_eq!(render_ok("{{ 'abc'|join(',') }}"), "a,b,c");
    assert_eq!(render_ok("{{ [1, 2, 3]|sum }}"), "6");
    assert_eq!(render_ok("{{ [1, 2, 3]|min }}"), "1");
    assert_eq!(render_ok("{{ [1, 2, 3]|max }}"), "3");
    assert_eq!(render_ok("{{ 'abc'|list }}"), "[\"a\", \"b\", \"c\"]");
    assert_eq!(
        render_ok("{{ [1, 2, 3, 4, 5]|batch(2) }}"),
        "[[1, 2], [3, 4], [5]]"
    );
    assert_eq!(
        render_ok("{{ [1, 2, 3, 4, 5]|batch(3, 0) }}"),
        "[[1, 2, 3], [4, 5, 0]]"
    );
    assert_eq!(
        render_ok("{{ [1, 2, 3, 4, 5]|slice(2) }}"),
        "[[1, 2, 3], [4, 5]]"
    );
}

#[test]
fn test_sort_by_attribute() {
    let ctx = context!(users => vec![
        context!(name => "bob", age => 32),
        context!(name => "alice", age => 28),
    ]);
    assert_eq!(
        render(
            "{{ users|sort(attribute='name')|map(attribute='name')|join(',') }}",
            ctx.clone()
        ),
        "alice,bob"
    );
    assert_eq!(
        render(
            "{{ users|sort(attribute='age', reverse=true)|map(attribute='age')|join(',') }}",
            ctx
        ),
        "32,28"
    );
}

#[test]
fn test_map_select_reject() {
    assert_eq!(
        render_ok("{{ ['a', 'b']|map('upper')|join(',') }}"),
        "A,B"
    );
    assert_eq!(
        render_ok("{{ [1, 0, 2, '']|select|join(',') }}"),
        "1,2"
    );
    assert_eq!(
        render_ok("{{ [1, 2, 3, 4]|select('even')|join(',') }}"),
        "2,4"
    );
    assert_eq!(
        render_ok("{{ [1, 2, 3, 4]|reject('even')|join(',') }}"),
        "1,3"
    );
    assert_eq!(
        render_ok("{{ [1, 2, 3, 4]|select('divisibleby', 2)|join(',') }}"),
        "2,4"
    );
}

#[test]
fn test_selectattr_rejectattr() {
    let ctx = context!(users => vec![
        context!(name => "a", active => true),
        context!(name => "b", active => false),
    ]);
    assert_eq!(
        render(
            "{{ users|selectattr('active')|map(attribute='name')|join(',') }}",
            ctx.clone()
        ),
        "a"
    );
    assert_eq!(
        render(
            "{{ users|rejectattr('active')|map(attribute='name')|join(',') }}",
            ctx
        ),
        "b"
    );
}

#[test]
fn test_groupby() {
    let ctx = context!(xs => vec![
        context!(c => "x", n => 1),
        context!(c => "y", n => 2),
        context!(c => "x", n => 3),
    ]);
    assert_eq!(
        render(
            "{% for g, items in xs|groupby('c') %}{{ g }}:{{ items|length }};{% endfor %}",
            ctx
        ),
        "x:2;y:1;"
    );
}

#[test]
fn test_map_attribute_default() {
    let ctx = context!(xs => vec![context!(a => 1), context!(b => 2)]);
    assert_eq!(
        render("{{ xs|map(attribute='a', default=0)|join(',') }}", ctx),
        "1,0"
    );
}

#[test]
fn test_numeric_filters() {
    assert_eq!(render_ok("{{ -3|abs }}"), "3");
    assert_eq!(render_ok("{{ 2.5|round }}"), "3.0");
    assert_eq!(render_ok("{{ 1.25|round(1) }}"), "1.3");
    assert_eq!(render_ok("{{ 1.25|round(1, 'floor') }}"), "1.2");
    assert_eq!(render_ok("{{ 1.25|round(1, 'ceil') }}"), "1.3");
    assert_eq!(render_ok("{{ '42'|int }}"), "42");
    assert_eq!(render_ok("{{ 'nope'|int }}"), "0");
    assert_eq!(render_ok("{{ 'nope'|int(7) }}"), "7");
    assert_eq!(render_ok("{{ 'ff'|int(0, 16) }}"), "255");
    assert_eq!(render_ok("{{ '1.5'|float }}"), "1.5");
    assert_eq!(render_ok("{{ 1|float }}"), "1.0");
}

#[test]
fn test_mapping_filters() {
    assert_eq!(render_ok("{{ {'a': 1}|items }}"), "[[\"a\", 1]]");
    assert_eq!(
        render_ok("{{ {'b': 1, 'a': 2}|dictsort }}"),
        "[[\"a\", 2], [\"b\", 1]]"
    );
    assert_eq!(
        render_ok("{{ {'a': 1, 'b': 2}|dictsort(by='value', reverse=true) }}"),
        "[[\"b\", 2], [\"a\", 1]]"
    );
}

#[test]
fn test_default_filter() {
    assert_eq!(render_ok("{{ missing|default('x') }}"), "x");
    assert_eq!(render_ok("{{ 'v'|default('x') }}"), "v");
    assert_eq!(render_ok("{{ ''|default('x') }}"), "");
    assert_eq!(render_ok("{{ ''|default('x', true) }}"), "x");
    assert_eq!(render_ok("{{ missing|d('x') }}"), "x");
}

#[test]
fn test_escape_and_safe() {
    assert_eq!(render_ok("{{ '<b>'|escape }}"), "&lt;b&gt;");
    assert_eq!(render_ok("{{ '<b>'|e }}"), "&lt;b&gt;");
    let env = Environment::new();
    assert_eq!(
        env.render_named_str("x.html", "{{ v|safe }}", context!(v => "<b>"))
            .unwrap(),
        "<b>"
    );
}

#[test]
fn test_urlencode() {
    assert_eq!(render_ok("{{ 'a b/c'|urlencode }}"), "a%20b/c");
    assert_eq!(
        render_ok("{{ {'a': 'x y'}|urlencode }}"),
        "a=x%20y"
    );
}

#[test]
fn test_urlize() {
    assert_eq!(
        render_ok("{{ 'visit https://example.com now'|urlize }}"),
        "visit <a href=\"https://example.com\">https://example.com</a> now"
    );
}

#[test]
fn test_striptags() {
    assert_eq!(
        render_ok("{{ '<b>Hi</b>  there'|striptags }}"),
        "Hi there"
    );
}

#[test]
fn test_xmlattr() {
    assert_eq!(
        render_ok("{{ {'id': 'x'}|xmlattr }}"),
        " id=\"x\""
    );
    assert_eq!(
        render_ok("{{ {'id': 'x', 'skip': none}|xmlattr(false) }}"),
        "id=\"x\""
    );
}

#[test]
fn test_attr_filter() {
    assert_eq!(
        render("{{ user|attr('name') }}", context!(user => context!(name => "x"))),
        "x"
    );
}

#[test]
fn test_filesizeformat() {
    assert_eq!(render_ok("{{ 1000000|filesizeformat }}"), "1.0 MB");
    assert_eq!(render_ok("{{ 999|filesizeformat }}"), "999 Bytes");
}

#[test]
fn test_tojson() {
    assert_eq!(render_ok("{{ [1, 2]|tojson }}"), "[1,2]");
    assert_eq!(
        render_ok("{{ {'a': [1, 2]}|tojson }}"),
        "{\"a\":[1,2]}"
    );
    // html relevant characters are escaped
    assert_eq!(
        render_ok("{{ '<b>'|tojson }}"),
        "\"\\u003cb\\u003e\""
    );
}

#[test]
fn test_pprint() {
    assert_eq!(
        render_ok("{{ {'b': 1, 'a': 2}|pprint }}"),
        "{\n    \"a\": 2,\n    \"b\": 1,\n}"
    );
}

#[test]
fn test_random() {
    let rendered = render_ok("{{ [1, 2, 3]|random }}");
    assert!(["1", "2", "3"].contains(&rendered.as_str()));
}

#[test]
fn test_custom_filter_shadows_builtin() {
    fn bracketed(_state: &tempera::State, v: String) -> Result<String, tempera::Error> {
        Ok(format!("[{v}]"))
    }

    let mut env = Environment::new();
    env.add_filter("upper", bracketed);
    assert_eq!(env.render_str("{{ 'x'|upper }}", context!()).unwrap(), "[x]");
    env.remove_filter("upper");
    assert_eq!(env.render_str("{{ 'x'|upper }}", context!()).unwrap(), "X");
}

#[test]
fn test_unknown_filter() {
    let env = Environment::new();
    let err = env.render_str("{{ 1|nope }}", context!()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownFilter);
}

#[test]
fn test_filter_does_not_swallow_item_errors() {
    let env = Environment::new();
    let err = env
        .render_str("{{ [1, 'x']|map('abs')|join(',') }}", context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeError);
}
