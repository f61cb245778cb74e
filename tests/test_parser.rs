use similar_asserts::assert_eq;

use tempera::{context, Environment, ErrorKind};

fn parse_error(source: &str) -> tempera::Error {
    let env = Environment::new();
    env.template_from_str(source).unwrap_err()
}

#[test]
fn test_unclosed_tags() {
    assert_eq!(parse_error("{% if true %}").kind(), ErrorKind::Syntax);
    assert_eq!(parse_error("{% for x in y %}").kind(), ErrorKind::Syntax);
    assert_eq!(parse_error("{{ 1 + }}").kind(), ErrorKind::Syntax);
    assert_eq!(parse_error("{% endif %}").kind(), ErrorKind::Syntax);
}

#[test]
fn test_unknown_statement() {
    let err = parse_error("{% frobnicate %}");
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert!(err.detail().unwrap().contains("unknown statement"));
}

#[test]
fn test_error_location() {
    let env = Environment::new();
    let err = env
        .template_from_named_str("broken.txt", "ok\nok\n{% if %}")
        .unwrap_err();
    assert_eq!(err.name(), Some("broken.txt"));
    assert_eq!(err.line(), Some(3));
}

#[test]
fn test_reserved_assignment_names() {
    assert_eq!(parse_error("{% set true = 1 %}").kind(), ErrorKind::Syntax);
    assert_eq!(parse_error("{% set loop = 1 %}").kind(), ErrorKind::Syntax);
    assert_eq!(parse_error("{% for self in x %}{% endfor %}").kind(), ErrorKind::Syntax);
}

#[test]
fn test_duplicate_block_names() {
    let err = parse_error("{% block a %}{% endblock %}{% block a %}{% endblock %}");
    assert_eq!(err.kind(), ErrorKind::Syntax);
}

#[test]
fn test_mismatched_endblock_name() {
    let err = parse_error("{% block a %}{% endblock b %}");
    assert_eq!(err.kind(), ErrorKind::Syntax);
    // a matching trailing name is fine
    let env = Environment::new();
    env.template_from_str("{% block a %}{% endblock a %}").unwrap();
}

#[test]
fn test_blocks_in_macros_rejected() {
    let err = parse_error("{% macro m() %}{% block b %}{% endblock %}{% endmacro %}");
    assert_eq!(err.kind(), ErrorKind::Syntax);
}

#[test]
fn test_loop_controls_outside_loops_rejected() {
    assert_eq!(parse_error("{% break %}").kind(), ErrorKind::Syntax);
    assert_eq!(parse_error("{% continue %}").kind(), ErrorKind::Syntax);
}

#[test]
fn test_keyword_argument_ordering() {
    let err = parse_error("{{ m(a=1, 2) }}");
    assert_eq!(err.kind(), ErrorKind::Syntax);
}

#[test]
fn test_precedence() {
    let env = Environment::new();
    assert_eq!(env.render_str("{{ 2 + 3 * 4 }}", context!()).unwrap(), "14");
    assert_eq!(env.render_str("{{ (2 + 3) * 4 }}", context!()).unwrap(), "20");
    assert_eq!(
        env.render_str("{{ 2 * 2 ** 3 }}", context!()).unwrap(),
        "16"
    );
    assert_eq!(
        env.render_str("{{ not true and false }}", context!()).unwrap(),
        "false"
    );
    assert_eq!(
        env.render_str("{{ 1 + 2 ~ 'x' }}", context!()).unwrap(),
        "3x"
    );
    assert_eq!(
        env.render_str("{{ 1 < 2 and 3 < 4 }}", context!()).unwrap(),
        "true"
    );
    assert_eq!(env.render_str("{{ +3 }}", context!()).unwrap(), "3");
    assert_eq!(env.render_str("{{ -3|abs }}", context!()).unwrap(), "3");
}

#[test]
fn test_tuple_syntax() {
    let env = Environment::new();
    assert_eq!(env.render_str("{{ () }}", context!()).unwrap(), "[]");
    assert_eq!(env.render_str("{{ (1,) }}", context!()).unwrap(), "[1]");
    assert_eq!(env.render_str("{{ (1, 2) }}", context!()).unwrap(), "[1, 2]");
    assert_eq!(env.render_str("{{ (1) }}", context!()).unwrap(), "1");
}

#[test]
fn test_trailing_commas() {
    let env = Environment::new();
    assert_eq!(env.render_str("{{ [1, 2,] }}", context!()).unwrap(), "[1, 2]");
    assert_eq!(
        env.render_str("{{ {'a': 1,} }}", context!()).unwrap(),
        "{\"a\": 1}"
    );
}

#[test]
fn test_deeply_nested_expression_hits_parser_limit() {
    let source = format!("{{{{ {}1{} }}}}", "(".repeat(200), ")".repeat(200));
    assert_eq!(parse_error(&source).kind(), ErrorKind::Syntax);
}
