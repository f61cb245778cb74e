use similar_asserts::assert_eq;

use tempera::value::Value;
use tempera::{context, Environment, ErrorKind};

fn render(source: &str, ctx: Value) -> String {
    let env = Environment::new();
    env.render_str(source, ctx).unwrap()
}

fn test_passes(source: &str) -> bool {
    render(&format!("{{% if {source} %}}y{{% else %}}n{{% endif %}}"), context!()) == "y"
}

#[test]
fn test_defined_undefined() {
    assert_eq!(
        render("{{ x is defined }}|{{ x is undefined }}", context!(x => 1)),
        "true|false"
    );
    assert_eq!(
        render("{{ y is defined }}|{{ y is undefined }}", context!()),
        "false|true"
    );
}

#[test]
fn test_type_tests() {
    assert!(test_passes("none is none"));
    assert!(test_passes("true is boolean"));
    assert!(test_passes("true is true"));
    assert!(test_passes("false is false"));
    assert!(test_passes("42 is integer"));
    assert!(test_passes("42.0 is float"));
    assert!(test_passes("42 is number"));
    assert!(test_passes("42.5 is number"));
    assert!(test_passes("'x' is string"));
    assert!(test_passes("{'a': 1} is mapping"));
    assert!(test_passes("[1] is sequence"));
    assert!(test_passes("[1] is iterable"));
    assert!(test_passes("'ab' is iterable"));
    assert!(test_passes("range is callable"));
    assert!(test_passes("'' is empty"));
    assert!(test_passes("[] is empty"));
    assert!(!test_passes("[1] is empty"));
}

#[test]
fn test_number_tests() {
    assert!(test_passes("3 is odd"));
    assert!(test_passes("4 is even"));
    assert!(test_passes("15 is divisibleby(3)"));
    assert!(test_passes("15 is divisibleby 5"));
    assert!(!test_passes("15 is divisibleby(4)"));
}

#[test]
fn test_case_tests() {
    assert!(test_passes("'abc' is lower"));
    assert!(test_passes("'ABC' is upper"));
    assert!(!test_passes("'Abc' is lower"));
}

#[test]
fn test_escaped_test() {
    assert!(test_passes("'<b>'|safe is escaped"));
    assert!(!test_passes("'<b>' is escaped"));
    assert!(test_passes("'<b>'|escape is safe"));
}

#[test]
fn test_comparison_tests() {
    assert!(test_passes("1 is eq 1"));
    assert!(test_passes("1 is equalto(1)"));
    assert!(test_passes("1 is ne 2"));
    assert!(test_passes("1 is lt 2"));
    assert!(test_passes("2 is le 2"));
    assert!(test_passes("3 is gt 2"));
    assert!(test_passes("3 is ge 3"));
    assert!(test_passes("2 is in([1, 2])"));
}

#[test]
fn test_negated_tests() {
    assert!(test_passes("1 is not string"));
    assert!(test_passes("'x' is not number"));
}

#[test]
fn test_sameas() {
    assert!(test_passes("none is sameas none"));
    assert!(test_passes("true is sameas true"));
    assert!(!test_passes("1 is sameas 2"));
}

#[test]
fn test_filter_and_test_tests() {
    assert!(test_passes("'upper' is filter"));
    assert!(!test_passes("'nope' is filter"));
    assert!(test_passes("'odd' is test"));
    assert!(!test_passes("'nope' is test"));
}

#[test]
fn test_starting_ending_with() {
    assert!(test_passes("'foobar' is startingwith 'foo'"));
    assert!(test_passes("'foobar' is endingwith('bar')"));
}

#[test]
fn test_custom_test() {
    fn is_fourty_two(_state: &tempera::State, v: i64) -> Result<bool, tempera::Error> {
        Ok(v == 42)
    }

    let mut env = Environment::new();
    env.add_test("fourtytwo", is_fourty_two);
    assert_eq!(
        env.render_str("{{ 42 is fourtytwo }}", context!()).unwrap(),
        "true"
    );
}

#[test]
fn test_unknown_test() {
    let env = Environment::new();
    let err = env.render_str("{{ 1 is frobnicated }}", context!()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownTest);
}
