use std::collections::BTreeMap;

use similar_asserts::assert_eq;

use tempera::value::{Object, Value, ValueKind};
use tempera::{context, Environment, ErrorKind};

#[test]
fn test_kinds() {
    assert_eq!(Value::from(()).kind(), ValueKind::None);
    assert_eq!(Value::from(true).kind(), ValueKind::Bool);
    assert_eq!(Value::from(42).kind(), ValueKind::Number);
    assert_eq!(Value::from(42.5).kind(), ValueKind::Number);
    assert_eq!(Value::from("x").kind(), ValueKind::String);
    assert_eq!(Value::from(vec![1, 2]).kind(), ValueKind::Seq);
    assert_eq!(
        Value::from(BTreeMap::from([("a", 1)])).kind(),
        ValueKind::Map
    );
    assert_eq!(Value::undefined().kind(), ValueKind::Undefined);
}

#[test]
fn test_serde_conversion() {
    #[derive(serde::Serialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    let value = Value::from_serialize(&Point { x: 1, y: -1 });
    assert_eq!(value.kind(), ValueKind::Map);
    assert_eq!(value.get_attr("x").unwrap(), Value::from(1));
    assert_eq!(value.get_attr("y").unwrap(), Value::from(-1));

    let value = Value::from_serialize(&vec![Some(1), None]);
    assert_eq!(value, Value::from(vec![Value::from(1), Value::from(())]));
}

#[test]
fn test_deep_copy_equality() {
    let value = Value::from_serialize(&BTreeMap::from([("items", vec![1, 2, 3])]));
    let copy = value.deep_copy();
    assert_eq!(value, copy);
}

#[test]
fn test_markup_dominates_escape() {
    let safe = Value::from_safe_string("&lt;b&gt;".into());
    assert!(safe.is_safe());
    // escaping markup is the identity; the content compares equal to the
    // plain string
    assert_eq!(safe, Value::from("&lt;b&gt;"));
}

#[test]
fn test_json_roundtrip() {
    let env = Environment::new();
    let dumped = env
        .render_str(
            "{{ data|tojson }}",
            context!(data => context!(a => vec![1, 2], b => "x")),
        )
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&dumped).unwrap();
    assert_eq!(parsed, serde_json::json!({"a": [1, 2], "b": "x"}));
}

#[test]
fn test_safe_strings_survive_the_context_boundary() {
    let env = Environment::new();
    assert_eq!(
        env.render_named_str(
            "t.html",
            "{{ v }}",
            context!(v => Value::from_safe_string("<b>ok</b>".into()))
        )
        .unwrap(),
        "<b>ok</b>"
    );
}

#[derive(Debug)]
struct Point {
    x: i64,
    y: i64,
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl Object for Point {
    fn type_name(&self) -> &'static str {
        "point"
    }

    fn fields(&self) -> Vec<&'static str> {
        vec!["x", "y"]
    }

    fn get_field(&self, name: &str) -> Option<Value> {
        match name {
            "x" => Some(Value::from(self.x)),
            "y" => Some(Value::from(self.y)),
            _ => None,
        }
    }

    fn call_method(
        &self,
        _state: &tempera::State,
        name: &str,
        _args: &[Value],
    ) -> Result<Value, tempera::Error> {
        if name == "swapped" {
            Ok(Value::from_object(Point {
                x: self.y,
                y: self.x,
            }))
        } else {
            Err(tempera::Error::new(
                ErrorKind::TypeError,
                "unknown method",
            ))
        }
    }

    fn len(&self) -> Option<usize> {
        Some(2)
    }
}

#[test]
fn test_host_objects() {
    let env = Environment::new();
    let ctx = context!(p => Value::from_object(Point { x: 1, y: 2 }));
    assert_eq!(
        env.render_str("{{ p.x }},{{ p.y }}", ctx.clone()).unwrap(),
        "1,2"
    );
    assert_eq!(env.render_str("{{ p }}", ctx.clone()).unwrap(), "(1, 2)");
    assert_eq!(
        env.render_str("{{ p.swapped() }}", ctx.clone()).unwrap(),
        "(2, 1)"
    );
    assert_eq!(env.render_str("{{ p|length }}", ctx.clone()).unwrap(), "2");
    assert_eq!(
        env.render_str("{{ p['x'] }}", ctx.clone()).unwrap(),
        "1"
    );
    // identity based equality
    assert_eq!(
        env.render_str("{{ p is sameas p }}", ctx).unwrap(),
        "true"
    );
}

#[test]
fn test_value_display() {
    assert_eq!(Value::from(42).to_string(), "42");
    assert_eq!(Value::from(1.0).to_string(), "1.0");
    assert_eq!(Value::from(()).to_string(), "none");
    assert_eq!(Value::undefined().to_string(), "");
    assert_eq!(
        Value::from(vec![Value::from(1), Value::from("a")]).to_string(),
        "[1, \"a\"]"
    );
}

#[test]
fn test_nested_lookup() {
    let env = Environment::new();
    let ctx = context!(cfg => context!(servers => vec![context!(host => "a"), context!(host => "b")]));
    assert_eq!(
        env.render_str("{{ cfg.servers[1].host }}", ctx).unwrap(),
        "b"
    );
}
