use similar_asserts::assert_eq;

use tempera::value::Value;
use tempera::{context, CancelToken, Environment, ErrorKind, UndefinedBehavior};

fn render(source: &str, ctx: Value) -> String {
    let env = Environment::new();
    env.render_str(source, ctx).unwrap()
}

#[test]
fn test_simple_substitution() {
    assert_eq!(
        render("Hello, {{ name }}!", context!(name => "World")),
        "Hello, World!"
    );
}

#[test]
fn test_empty_template() {
    assert_eq!(render("", context!()), "");
}

#[test]
fn test_literals() {
    assert_eq!(render("{{ 42 }}", context!()), "42");
    assert_eq!(render("{{ 42.5 }}", context!()), "42.5");
    assert_eq!(render("{{ 42.0 }}", context!()), "42.0");
    assert_eq!(render("{{ true }}|{{ false }}", context!()), "true|false");
    assert_eq!(render("{{ none }}", context!()), "none");
    assert_eq!(render("{{ 'a' 'b' }}", context!()), "ab");
    assert_eq!(render("{{ [1, 2, 3] }}", context!()), "[1, 2, 3]");
    assert_eq!(render("{{ {'a': 1} }}", context!()), "{\"a\": 1}");
}

#[test]
fn test_arithmetic() {
    assert_eq!(render("{{ 1 + 2 * 3 }}", context!()), "7");
    assert_eq!(render("{{ 3 - 4 }}", context!()), "-1");
    assert_eq!(render("{{ 7 / 2 }}", context!()), "3.5");
    assert_eq!(render("{{ 7 // 2 }}", context!()), "3");
    assert_eq!(render("{{ 7 % 2 }}", context!()), "1");
    assert_eq!(render("{{ 2 ** 10 }}", context!()), "1024");
    assert_eq!(render("{{ -3 }}", context!()), "-3");
    assert_eq!(render("{{ 'x' ~ 1 }}", context!()), "x1");
}

#[test]
fn test_comparisons_and_logic() {
    assert_eq!(render("{{ 1 < 2 }}", context!()), "true");
    assert_eq!(render("{{ 2 <= 1 }}", context!()), "false");
    assert_eq!(render("{{ 1 == 1.0 }}", context!()), "true");
    assert_eq!(render("{{ 1 != 2 }}", context!()), "true");
    assert_eq!(render("{{ 2 in [1, 2] }}", context!()), "true");
    assert_eq!(render("{{ 3 not in [1, 2] }}", context!()), "true");
    // and/or yield their operands
    assert_eq!(render("{{ 0 or 'a' }}", context!()), "a");
    assert_eq!(render("{{ 1 and 2 }}", context!()), "2");
    assert_eq!(render("{{ not 0 }}", context!()), "true");
}

#[test]
fn test_conditional_expression() {
    assert_eq!(render("{{ 1 if true else 2 }}", context!()), "1");
    assert_eq!(render("{{ 1 if false else 2 }}", context!()), "2");
    assert_eq!(
        render("{{ 'yes' if flag else 'no' }}", context!(flag => false)),
        "no"
    );
}

#[test]
fn test_attribute_and_subscript() {
    let ctx = context!(user => std::collections::BTreeMap::from([("name", "Peter")]));
    assert_eq!(render("{{ user.name }}", ctx.clone()), "Peter");
    assert_eq!(render("{{ user['name'] }}", ctx), "Peter");
    assert_eq!(
        render("{{ items[-1] }}", context!(items => vec![1, 2, 3])),
        "3"
    );
    assert_eq!(render("{{ pair.0 }}{{ pair.1 }}", context!(pair => vec![7, 8])), "78");
    assert_eq!(render("{{ 'hello'[1] }}", context!()), "e");
}

#[test]
fn test_slicing() {
    assert_eq!(render("{{ 'hello'[1:3] }}", context!()), "el");
    assert_eq!(
        render("{{ [1, 2, 3, 4][::2] }}", context!()),
        "[1, 3]"
    );
    assert_eq!(render("{{ [1, 2, 3][1:] }}", context!()), "[2, 3]");
}

#[test]
fn test_if_statement() {
    assert_eq!(
        render(
            "{% if n > 2 %}big{% elif n > 0 %}small{% else %}neg{% endif %}",
            context!(n => 1)
        ),
        "small"
    );
}

#[test]
fn test_for_loop_basics() {
    assert_eq!(
        render(
            "{% for i in xs %}{{ loop.index }}:{{ i }},{% endfor %}",
            context!(xs => vec![10, 20, 30])
        ),
        "1:10,2:20,3:30,"
    );
}

#[test]
fn test_for_loop_variables() {
    assert_eq!(
        render(
            "{% for x in [1, 2, 3] %}{{ loop.revindex }}{{ loop.first }}{{ loop.last }};{% endfor %}",
            context!()
        ),
        "3truefalse;2falsefalse;1falsetrue;"
    );
    assert_eq!(
        render(
            "{% for x in [1, 2, 3] %}{{ loop.previtem|default('-') }}{% endfor %}",
            context!()
        ),
        "-12"
    );
    assert_eq!(
        render(
            "{% for x in [1, 2, 3] %}{{ loop.nextitem|default('-') }}{% endfor %}",
            context!()
        ),
        "23-"
    );
    assert_eq!(
        render(
            "{% for x in [1, 2, 3] %}{{ loop.cycle('a', 'b') }}{% endfor %}",
            context!()
        ),
        "aba"
    );
    assert_eq!(
        render(
            "{% for x in [1, 1, 2] %}{{ loop.changed(x) }}{% endfor %}",
            context!()
        ),
        "truefalsetrue"
    );
}

#[test]
fn test_for_else_and_empty() {
    assert_eq!(
        render("{% for x in [] %}{{ x }}{% endfor %}", context!()),
        ""
    );
    assert_eq!(
        render(
            "{% for x in [] %}{{ x }}{% else %}empty{% endfor %}",
            context!()
        ),
        "empty"
    );
}

#[test]
fn test_for_tuple_unpacking() {
    assert_eq!(
        render(
            "{% for a, b in [[1, 2], [3, 4]] %}{{ a }}-{{ b }};{% endfor %}",
            context!()
        ),
        "1-2;3-4;"
    );
}

#[test]
fn test_for_inline_condition() {
    assert_eq!(
        render(
            "{% for x in [1, 2, 3, 4] if x % 2 == 0 %}{{ x }}:{{ loop.length }};{% endfor %}",
            context!()
        ),
        "2:2;4:2;"
    );
}

#[test]
fn test_loop_controls() {
    assert_eq!(
        render(
            "{% for i in [1, 2, 3, 4] %}{% if i == 2 %}{% continue %}{% endif %}{% if i == 4 %}{% break %}{% endif %}{{ i }}{% endfor %}",
            context!()
        ),
        "13"
    );
}

#[test]
fn test_recursive_loop() {
    let ctx = context!(items => vec![
        context!(name => "a", children => vec![
            context!(name => "b", children => Vec::<Value>::new()),
        ]),
    ]);
    insta::assert_snapshot!(
        render(
            "{% for item in items recursive %}{{ item.name }}{% if item.children %}[{{ loop(item.children) }}]{% endif %}{% endfor %}",
            ctx
        ),
        @"a[b]"
    );
}

#[test]
fn test_loop_iterates_map_keys_and_strings() {
    assert_eq!(
        render(
            "{% for k in {'b': 1, 'a': 2} %}{{ k }}{% endfor %}",
            context!()
        ),
        "ab"
    );
    assert_eq!(
        render("{% for c in 'abc' %}{{ c }}.{% endfor %}", context!()),
        "a.b.c."
    );
}

#[test]
fn test_set_and_with() {
    assert_eq!(
        render("{% set x = 42 %}{{ x }}", context!()),
        "42"
    );
    assert_eq!(
        render("{% set (a, b) = [1, 2] %}{{ a }}{{ b }}", context!()),
        "12"
    );
    assert_eq!(
        render("{% with a = 1, b = 2 %}{{ a + b }}{% endwith %}", context!()),
        "3"
    );
    // with scopes do not leak
    assert_eq!(
        render(
            "{% with a = 1 %}{{ a }}{% endwith %}{{ a|default('gone') }}",
            context!()
        ),
        "1gone"
    );
}

#[test]
fn test_set_block() {
    assert_eq!(
        render("{% set x %}abc{% endset %}{{ x }}", context!()),
        "abc"
    );
    assert_eq!(
        render("{% set x | upper %}abc{% endset %}{{ x }}", context!()),
        "ABC"
    );
}

#[test]
fn test_filter_block() {
    assert_eq!(
        render("{% filter upper %}abc{% endfilter %}", context!()),
        "ABC"
    );
    assert_eq!(
        render(
            "{% filter replace('a', 'b')|upper %}aaa{% endfilter %}",
            context!()
        ),
        "BBB"
    );
}

#[test]
fn test_raw_and_comments() {
    assert_eq!(
        render("{% raw %}{{ not rendered }}{% endraw %}", context!()),
        "{{ not rendered }}"
    );
    assert_eq!(render("a{# a comment #}b", context!()), "ab");
}

#[test]
fn test_autoescape_blocks() {
    assert_eq!(
        render(
            "{% autoescape true %}{{ '<b>' }}{% endautoescape %}{{ '<b>' }}",
            context!()
        ),
        "&lt;b&gt;<b>"
    );
    let env = Environment::new();
    assert_eq!(
        env.render_named_str(
            "t.html",
            "{% autoescape false %}{{ '<b>' }}{% endautoescape %}",
            context!()
        )
        .unwrap(),
        "<b>"
    );
}

#[test]
fn test_autoescape_by_template_name() {
    let env = Environment::new();
    assert_eq!(
        env.render_named_str("t.html", "{{ x }}", context!(x => "<b>"))
            .unwrap(),
        "&lt;b&gt;"
    );
    assert_eq!(
        env.render_named_str("t.html", "{{ x|safe }}", context!(x => "<b>"))
            .unwrap(),
        "<b>"
    );
    assert_eq!(
        env.render_named_str("t.txt", "{{ x }}", context!(x => "<b>"))
            .unwrap(),
        "<b>"
    );
}

#[test]
fn test_escape_is_idempotent() {
    let env = Environment::new();
    assert_eq!(
        env.render_named_str("t.html", "{{ x|escape|escape }}", context!(x => "<b>"))
            .unwrap(),
        "&lt;b&gt;"
    );
}

#[test]
fn test_macro_basics() {
    assert_eq!(
        render(
            "{% macro m(a, b=2) %}{{ a }}{{ b }}{% endmacro %}{{ m(1) }}|{{ m(1, 3) }}|{{ m(b=4, a=1) }}",
            context!()
        ),
        "12|13|14"
    );
}

#[test]
fn test_macro_sees_context() {
    assert_eq!(
        render(
            "{% macro hello() %}Hello {{ name }}{% endmacro %}{{ hello() }}",
            context!(name => "World")
        ),
        "Hello World"
    );
}

#[test]
fn test_macro_too_many_args() {
    let env = Environment::new();
    let err = env
        .render_str("{% macro m(a) %}{{ a }}{% endmacro %}{{ m(1, 2) }}", context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_call_block() {
    assert_eq!(
        render(
            "{% macro list(items) %}<ul>{% for item in items %}<li>{{ caller(item) }}</li>{% endfor %}</ul>{% endmacro %}{% call(item) list([1, 2]) %}{{ item * 2 }}{% endcall %}",
            context!()
        ),
        "<ul><li>2</li><li>4</li></ul>"
    );
}

#[test]
fn test_do_statement() {
    assert_eq!(render("{% do range(3) %}done", context!()), "done");
}

#[test]
fn test_include() {
    let mut env = Environment::new();
    env.add_template("inc", "{{ x }}d").unwrap();
    env.add_template("main", "{% include 'inc' %}").unwrap();
    env.add_template("main_without", "{% include 'inc' without context %}")
        .unwrap();
    let tmpl = env.get_template("main").unwrap();
    assert_eq!(tmpl.render(context!(x => "v")).unwrap(), "vd");
    let tmpl = env.get_template("main_without").unwrap();
    assert_eq!(tmpl.render(context!(x => "v")).unwrap(), "d");
}

#[test]
fn test_include_ignore_missing() {
    let env = Environment::new();
    assert_eq!(
        env.render_str("a{% include 'nope' ignore missing %}b", context!())
            .unwrap(),
        "ab"
    );
    let err = env
        .render_str("{% include 'nope' %}", context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
}

#[test]
fn test_import() {
    let mut env = Environment::new();
    env.add_template(
        "helpers",
        "{% set punct = '!' %}{% macro greet(name) %}Hello {{ name }}{{ punct }}{% endmacro %}",
    )
    .unwrap();
    env.add_template("main", "{% import 'helpers' as h %}{{ h.greet('World') }}")
        .unwrap();
    env.add_template(
        "main_from",
        "{% from 'helpers' import greet as hi %}{{ hi('World') }}",
    )
    .unwrap();
    let tmpl = env.get_template("main").unwrap();
    assert_eq!(tmpl.render(context!()).unwrap(), "Hello World!");
    let tmpl = env.get_template("main_from").unwrap();
    assert_eq!(tmpl.render(context!()).unwrap(), "Hello World!");
}

#[test]
fn test_from_import_missing_name() {
    let mut env = Environment::new();
    env.add_template("helpers", "{% set a = 1 %}").unwrap();
    env.add_template("main", "{% from 'helpers' import nope %}")
        .unwrap();
    let err = env.get_template("main").unwrap().render(context!()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);
}

#[test]
fn test_basic_inheritance() {
    let mut env = Environment::new();
    env.add_template("base", "{% block t %}A{% endblock %}-B")
        .unwrap();
    env.add_template(
        "child",
        "{% extends 'base' %}{% block t %}C{{ super() }}{% endblock %}",
    )
    .unwrap();
    let tmpl = env.get_template("child").unwrap();
    insta::assert_snapshot!(tmpl.render(context!()).unwrap(), @"CA-B");
}

#[test]
fn test_multi_level_inheritance() {
    let mut env = Environment::new();
    env.add_template("a", "{% block x %}A{% endblock %}").unwrap();
    env.add_template(
        "b",
        "{% extends 'a' %}{% block x %}B{{ super() }}{% endblock %}",
    )
    .unwrap();
    env.add_template(
        "c",
        "{% extends 'b' %}{% block x %}C{{ super() }}{% endblock %}",
    )
    .unwrap();
    let tmpl = env.get_template("c").unwrap();
    assert_eq!(tmpl.render(context!()).unwrap(), "CBA");
}

#[test]
fn test_super_at_bottom_is_empty() {
    let mut env = Environment::new();
    env.add_template("base", "{% block t %}A{{ super() }}B{% endblock %}")
        .unwrap();
    let tmpl = env.get_template("base").unwrap();
    assert_eq!(tmpl.render(context!()).unwrap(), "AB");
}

#[test]
fn test_extends_cycle_errors() {
    let mut env = Environment::new();
    env.add_template("a", "{% extends 'b' %}").unwrap();
    env.add_template("b", "{% extends 'a' %}").unwrap();
    let err = env.get_template("a").unwrap().render(context!()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Recursion);
}

#[test]
fn test_dynamic_extends() {
    let mut env = Environment::new();
    env.add_template("base", "[{% block t %}{% endblock %}]")
        .unwrap();
    env.add_template(
        "child",
        "{% extends layout %}{% block t %}x{% endblock %}",
    )
    .unwrap();
    let tmpl = env.get_template("child").unwrap();
    assert_eq!(tmpl.render(context!(layout => "base")).unwrap(), "[x]");
}

#[test]
fn test_self_block_reference() {
    assert_eq!(
        render(
            "{% block greeting %}Hello{% endblock %} {{ self.greeting() }}",
            context!()
        ),
        "Hello Hello"
    );
}

#[test]
fn test_blocks_see_surrounding_scope() {
    let mut env = Environment::new();
    env.add_template("base", "{% block t %}{% endblock %}").unwrap();
    env.add_template(
        "child",
        "{% extends 'base' %}{% block t %}{{ greeting }}{% endblock %}",
    )
    .unwrap();
    let tmpl = env.get_template("child").unwrap();
    assert_eq!(tmpl.render(context!(greeting => "hi")).unwrap(), "hi");
}

#[test]
fn test_cancellation() {
    let env = Environment::new();
    let tmpl = env.template_from_str("{% for i in range(100) %}{{ i }}{% endfor %}").unwrap();
    let token = CancelToken::new();
    token.cancel();
    let err = tmpl.render_cancellable(context!(), &token).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn test_sandbox_refuses_unsafe_callables() {
    let mut env = Environment::new();
    env.add_global(
        "dangerous",
        Value::from_function_with_flags(
            "dangerous",
            |_state: &tempera::State, _args: &[Value]| Ok(Value::from("boom")),
            false,
            true,
            false,
        ),
    );
    assert_eq!(
        env.render_str("{{ dangerous() }}", context!()).unwrap(),
        "boom"
    );
    env.set_sandboxed(true);
    let err = env.render_str("{{ dangerous() }}", context!()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SecurityError);
}

#[test]
fn test_not_callable() {
    let env = Environment::new();
    let err = env.render_str("{{ x() }}", context!(x => 42)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotCallable);
}

#[test]
fn test_runtime_error_location() {
    let env = Environment::new();
    let err = env
        .render_named_str("bad.txt", "ok\n{{ 1 + [] }}", context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeError);
    assert_eq!(err.name(), Some("bad.txt"));
    assert_eq!(err.line(), Some(2));
}

#[test]
fn test_division_by_zero_at_runtime() {
    let env = Environment::new();
    let err = env
        .render_str("{{ a / b }}", context!(a => 1, b => 0))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeError);
}

#[test]
fn test_expression_api() {
    let env = Environment::new();
    let expr = env.compile_expression("number < 42").unwrap();
    assert!(expr.eval(context!(number => 23)).unwrap().is_true());
    assert!(!expr.eval(context!(number => 66)).unwrap().is_true());
}

#[test]
fn test_fizzbuzz_scenario() {
    let source = "{% if n is divisibleby(3) %}fizz{% endif %}{% if n is divisibleby(5) %}buzz{% endif %}";
    assert_eq!(render(source, context!(n => 15)), "fizzbuzz");
    assert_eq!(render(source, context!(n => 9)), "fizz");
    assert_eq!(render(source, context!(n => 10)), "buzz");
    assert_eq!(render(source, context!(n => 7)), "");
}

#[test]
fn test_optimizer_preserves_behavior() {
    let sources = [
        "{{ 1 + 2 * 3 }}",
        "a{% if true %}b{% endif %}c",
        "a{% if false %}b{% else %}d{% endif %}c",
        "{{ 'a' ~ 'b' ~ 'c' }}",
        "{% for x in [1, 2, 3] %}{{ x * 2 }}{% endfor %}",
        "{{ [1, 2, 3]|sort|join('-') }}",
        "{{ 'x' if 1 > 2 else 'y' }}",
    ];
    let mut optimized = Environment::new();
    optimized.set_optimized(true);
    let mut plain = Environment::new();
    plain.set_optimized(false);
    for source in sources {
        assert_eq!(
            optimized.render_str(source, context!()).unwrap(),
            plain.render_str(source, context!()).unwrap(),
            "optimizer changed behavior of {source:?}"
        );
    }
}

#[test]
fn test_undefined_behaviors() {
    let mut env = Environment::new();

    // lenient renders empty
    assert_eq!(env.render_str("[{{ missing }}]", context!()).unwrap(), "[]");

    // debug renders a placeholder
    env.set_undefined_behavior(UndefinedBehavior::Debug);
    assert_eq!(
        env.render_str("{{ missing }}", context!()).unwrap(),
        "{ undefined variable 'missing' }"
    );

    // chainable allows attribute chains
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    assert_eq!(env.render_str("[{{ a.b.c }}]", context!()).unwrap(), "[]");

    // strict errors on output, comparison and iteration
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    assert_eq!(
        env.render_str("{{ missing }}", context!()).unwrap_err().kind(),
        ErrorKind::UndefinedError
    );
    assert_eq!(
        env.render_str("{{ missing == 1 }}", context!())
            .unwrap_err()
            .kind(),
        ErrorKind::UndefinedError
    );
    assert_eq!(
        env.render_str("{% if missing %}x{% endif %}", context!())
            .unwrap_err()
            .kind(),
        ErrorKind::UndefinedError
    );
    assert_eq!(
        env.render_str("{% for x in missing %}x{% endfor %}", context!())
            .unwrap_err()
            .kind(),
        ErrorKind::UndefinedError
    );
    // default still applies
    assert_eq!(
        env.render_str("{{ missing|default('x') }}", context!())
            .unwrap(),
        "x"
    );
}

#[test]
fn test_lenient_attribute_on_undefined_errors() {
    let env = Environment::new();
    let err = env.render_str("{{ a.b }}", context!()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);
}

#[test]
fn test_context_values_roundtrip_through_serde() {
    #[derive(serde::Serialize)]
    struct User {
        name: &'static str,
        age: u32,
    }
    assert_eq!(
        render(
            "{{ user.name }} is {{ user.age }}",
            context!(user => User { name: "Peter", age: 23 })
        ),
        "Peter is 23"
    );
}
