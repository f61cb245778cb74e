use similar_asserts::assert_eq;

use tempera::value::Value;
use tempera::{context, Environment, ErrorKind, Syntax};

fn render(source: &str, ctx: Value) -> String {
    let env = Environment::new();
    env.render_str(source, ctx).unwrap()
}

#[test]
fn test_whitespace_control_markers() {
    assert_eq!(render("  {{- 'x' -}}  y", context!()), "xy");
    assert_eq!(render("a\n{%- if true %}b{% endif -%}\nc", context!()), "abc");
    assert_eq!(render("a  {#- comment -#}  b", context!()), "ab");
}

#[test]
fn test_trailing_newline_handling() {
    let mut env = Environment::new();
    assert_eq!(env.render_str("x\n", context!()).unwrap(), "x");
    env.set_keep_trailing_newline(true);
    assert_eq!(env.render_str("x\n", context!()).unwrap(), "x\n");
}

#[test]
fn test_trim_blocks() {
    let mut env = Environment::new();
    assert_eq!(
        env.render_str("{% if true %}\nx\n{% endif %}", context!())
            .unwrap(),
        "\nx\n"
    );
    env.set_trim_blocks(true);
    assert_eq!(
        env.render_str("{% if true %}\nx\n{% endif %}", context!())
            .unwrap(),
        "x\n"
    );
}

#[test]
fn test_lstrip_blocks() {
    let mut env = Environment::new();
    env.set_lstrip_blocks(true);
    assert_eq!(
        env.render_str("  {% if true %}x{% endif %}", context!())
            .unwrap(),
        "x"
    );
    // variable tags are not stripped
    assert_eq!(
        env.render_str("  {{ 'x' }}", context!()).unwrap(),
        "  x"
    );
}

#[test]
fn test_line_statements() {
    let mut env = Environment::new();
    env.set_syntax(Syntax {
        line_statement_prefix: Some("#".into()),
        ..Syntax::default()
    })
    .unwrap();
    assert_eq!(
        env.render_str("# for item in [1, 2]\n{{ item }}\n# endfor", context!())
            .unwrap(),
        "1\n2\n"
    );
}

#[test]
fn test_line_comments() {
    let mut env = Environment::new();
    env.set_syntax(Syntax {
        line_comment_prefix: Some("##".into()),
        ..Syntax::default()
    })
    .unwrap();
    assert_eq!(
        env.render_str("a ## ignored\nb", context!()).unwrap(),
        "a \nb"
    );
}

#[test]
fn test_raw_block_with_trim() {
    assert_eq!(
        render("x {%- raw -%} {{ a }} {%- endraw -%} y", context!()),
        "x{{ a }}y"
    );
}

#[test]
fn test_string_literals() {
    assert_eq!(render(r#"{{ "double" }}"#, context!()), "double");
    assert_eq!(render("{{ 'single' }}", context!()), "single");
    assert_eq!(render(r#"{{ "a\nb" }}"#, context!()), "a\nb");
    assert_eq!(render(r#"{{ "tab\there" }}"#, context!()), "tab\there");
    assert_eq!(render(r#"{{ "☃" }}"#, context!()), "\u{2603}");
}

#[test]
fn test_number_literals() {
    assert_eq!(render("{{ 0 }}", context!()), "0");
    assert_eq!(render("{{ 1e3 }}", context!()), "1000.0");
    assert_eq!(render("{{ 2.5e-1 }}", context!()), "0.25");
}

#[test]
fn test_unterminated_constructs_fail() {
    let env = Environment::new();
    for source in ["{{ 'oops }}", "{# never closed", "{% raw %}no end"] {
        let err = env.render_str(source, context!()).unwrap_err();
        assert!(
            matches!(err.kind(), ErrorKind::Lexical | ErrorKind::Syntax),
            "expected lexical or syntax error for {source:?}, got {:?}",
            err.kind()
        );
    }
}

#[test]
fn test_error_carries_location() {
    let env = Environment::new();
    let err = env
        .render_named_str("demo.txt", "line one\n{{ § }}", context!())
        .unwrap_err();
    assert_eq!(err.name(), Some("demo.txt"));
    assert_eq!(err.line(), Some(2));
}
