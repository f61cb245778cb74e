use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use similar_asserts::assert_eq;

use tempera::value::Value;
use tempera::{context, Environment, ErrorKind, Syntax, TemplateSource};

#[test]
fn test_add_and_get_template() {
    let mut env = Environment::new();
    env.add_template("hello", "Hello {{ name }}!").unwrap();
    let tmpl = env.get_template("hello").unwrap();
    assert_eq!(tmpl.name(), "hello");
    assert_eq!(tmpl.source(), "Hello {{ name }}!");
    assert_eq!(tmpl.render(context!(name => "World")).unwrap(), "Hello World!");
}

#[test]
fn test_unknown_template() {
    let env = Environment::new();
    let err = env.get_template("missing").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
}

#[test]
fn test_remove_and_clear_templates() {
    let mut env = Environment::new();
    env.add_template("a", "A").unwrap();
    env.add_template("b", "B").unwrap();
    assert_eq!(env.templates().count(), 2);
    env.remove_template("a");
    assert_eq!(env.templates().count(), 1);
    env.clear_templates();
    assert_eq!(env.templates().count(), 0);
}

#[test]
fn test_syntax_errors_are_reported_at_add() {
    let mut env = Environment::new();
    let err = env.add_template("broken", "{% if %}").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert_eq!(err.name(), Some("broken"));
}

#[test]
fn test_loader_and_cache() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut env = Environment::new();
    {
        let counter = counter.clone();
        env.set_loader(move |name| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("template {name}")))
        });
    }
    env.set_cache_size(1);

    assert_eq!(
        env.get_template("a").unwrap().render(context!()).unwrap(),
        "template a"
    );
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    // second lookup is served from the cache
    env.get_template("a").unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    // loading another template evicts the first with a cache size of one
    env.get_template("b").unwrap();
    env.get_template("a").unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 3);

    let stats = env.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 3);
    assert_eq!(stats.evictions, 2);
    assert_eq!(stats.hit_rate(), 0.25);
}

#[test]
fn test_cache_disabled() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut env = Environment::new();
    {
        let counter = counter.clone();
        env.set_loader(move |name| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("template {name}")))
        });
    }
    env.set_cache_size(0);
    env.get_template("a").unwrap();
    env.get_template("a").unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn test_auto_reload() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut env = Environment::new();
    {
        let counter = counter.clone();
        env.set_loader(move |name| {
            counter.fetch_add(1, Ordering::SeqCst);
            // report the cached entry as stale on every check
            Ok(Some(
                TemplateSource::new(format!("template {name}")).with_uptodate(|| false),
            ))
        });
    }
    env.set_auto_reload(true);
    env.get_template("a").unwrap();
    env.get_template("a").unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    env.set_auto_reload(false);
    env.get_template("a").unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    env.get_template("a").unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[test]
fn test_custom_syntax() {
    let mut env = Environment::new();
    env.set_syntax(Syntax {
        block_start: "<%".into(),
        block_end: "%>".into(),
        variable_start: "${".into(),
        variable_end: "}".into(),
        comment_start: "<#".into(),
        comment_end: "#>".into(),
        ..Syntax::default()
    })
    .unwrap();
    assert_eq!(
        env.render_str(
            "<% for x in [1, 2] %>${ x }<# nope #><% endfor %>",
            context!()
        )
        .unwrap(),
        "12"
    );
}

#[test]
fn test_invalid_syntax_config() {
    let mut env = Environment::new();
    let err = env
        .set_syntax(Syntax {
            block_start: "{{".into(),
            ..Syntax::default()
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_globals() {
    let mut env = Environment::new();
    env.add_global("version", Value::from("1.0"));
    assert_eq!(env.render_str("{{ version }}", context!()).unwrap(), "1.0");
    // context variables shadow globals
    assert_eq!(
        env.render_str("{{ version }}", context!(version => "2.0"))
            .unwrap(),
        "2.0"
    );
    env.remove_global("version");
    assert_eq!(env.render_str("[{{ version }}]", context!()).unwrap(), "[]");
}

#[test]
fn test_add_function() {
    fn double(_state: &tempera::State, x: i64) -> Result<i64, tempera::Error> {
        Ok(x * 2)
    }

    let mut env = Environment::new();
    env.add_function("double", double);
    assert_eq!(env.render_str("{{ double(21) }}", context!()).unwrap(), "42");
}

#[test]
fn test_builtin_functions() {
    let env = Environment::new();
    assert_eq!(
        env.render_str("{% for i in range(3) %}{{ i }}{% endfor %}", context!())
            .unwrap(),
        "012"
    );
    assert_eq!(
        env.render_str("{{ range(1, 4)|join(',') }}", context!())
            .unwrap(),
        "1,2,3"
    );
    assert_eq!(
        env.render_str("{{ dict(a=1)['a'] }}", context!()).unwrap(),
        "1"
    );
}

#[test]
fn test_empty_environment_has_no_builtins() {
    let env = Environment::empty();
    let err = env.render_str("{{ 'x'|upper }}", context!()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownFilter);
}

#[test]
fn test_newline_sequence() {
    let mut env = Environment::new();
    env.set_newline_sequence("\r\n");
    assert_eq!(
        env.render_str("{{ 'aaa bbb ccc'|wordwrap(width=7) }}", context!())
            .unwrap(),
        "aaa bbb\r\nccc"
    );
}

#[test]
fn test_async_results() {
    use tempera::value::AsyncResult;

    let mut env = Environment::new();
    // with async support disabled the wrapper value passes through
    assert_eq!(
        env.render_str(
            "{{ pending.completed }}",
            context!(pending => Value::from(AsyncResult::pending(1)))
        )
        .unwrap(),
        "false"
    );

    env.set_async_enabled(true);
    assert_eq!(
        env.render_str(
            "{{ answer }}",
            context!(answer => Value::from(AsyncResult::ready(1, Value::from(42))))
        )
        .unwrap(),
        "42"
    );
    let err = env
        .render_str(
            "{{ pending }}",
            context!(pending => Value::from(AsyncResult::pending(2)))
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeError);
}
