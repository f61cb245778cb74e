use std::cmp::Ordering;
use std::fmt::Write;
use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::utils::UndefinedBehavior;
use crate::value::{Value, ValueRepr};

/// Numeric values cross-compare between the integer and float variants;
/// the tolerance used for such mixed comparisons.
const FLOAT_EPSILON: f64 = 1e-10;

enum CoerceResult {
    I64(i64, i64),
    F64(f64, f64),
}

fn coerce(a: &Value, b: &Value) -> Option<CoerceResult> {
    match (&a.0, &b.0) {
        (ValueRepr::I64(a), ValueRepr::I64(b)) => Some(CoerceResult::I64(*a, *b)),
        (ValueRepr::F64(_), _) | (_, ValueRepr::F64(_)) => {
            Some(CoerceResult::F64(some!(a.as_f64()), some!(b.as_f64())))
        }
        (ValueRepr::Bool(_), _) | (_, ValueRepr::Bool(_)) => {
            Some(CoerceResult::I64(some!(a.as_i64()), some!(b.as_i64())))
        }
        _ => None,
    }
}

fn impossible_op(op: &str, lhs: &Value, rhs: &Value) -> Error {
    Error::new(
        ErrorKind::TypeError,
        format!(
            "tried to use {op} operator on unsupported types {} and {}",
            lhs.kind(),
            rhs.kind()
        ),
    )
}

fn int_overflow() -> Error {
    Error::new(ErrorKind::TypeError, "integer arithmetic overflowed")
}

macro_rules! math_binop {
    ($name:ident, $int:ident, $float:tt) => {
        pub fn $name(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
            match coerce(lhs, rhs) {
                Some(CoerceResult::I64(a, b)) => match a.$int(b) {
                    Some(rv) => Ok(Value::from(rv)),
                    None => Err(int_overflow()),
                },
                Some(CoerceResult::F64(a, b)) => Ok(Value::from(a $float b)),
                None => Err(impossible_op(stringify!($float), lhs, rhs)),
            }
        }
    };
}

math_binop!(sub, checked_sub, -);
math_binop!(mul, checked_mul, *);

/// Implements the remainder operator.
pub fn rem(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(_, 0)) => {
            Err(Error::new(ErrorKind::TypeError, "division by zero"))
        }
        Some(CoerceResult::I64(a, b)) => a
            .checked_rem_euclid(b)
            .map(Value::from)
            .ok_or_else(int_overflow),
        Some(CoerceResult::F64(a, b)) => {
            if b == 0.0 {
                Err(Error::new(ErrorKind::TypeError, "division by zero"))
            } else {
                Ok(Value::from(a % b))
            }
        }
        None => Err(impossible_op("%", lhs, rhs)),
    }
}

/// Implements a binary `add` operation on values.
///
/// Strings concatenate with `+` as well.
pub fn add(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    if let (Some(a), Some(b)) = (lhs.as_str(), rhs.as_str()) {
        let mut rv = String::with_capacity(a.len() + b.len());
        rv.push_str(a);
        rv.push_str(b);
        return Ok(Value::from(rv));
    }
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(a, b)) => match a.checked_add(b) {
            Some(rv) => Ok(Value::from(rv)),
            None => Err(int_overflow()),
        },
        Some(CoerceResult::F64(a, b)) => Ok(Value::from(a + b)),
        None => Err(impossible_op("+", lhs, rhs)),
    }
}

/// Implements the true division operator.  The result is always a float.
pub fn div(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => {
            if b == 0.0 {
                Err(Error::new(ErrorKind::TypeError, "division by zero"))
            } else {
                Ok(Value::from(a / b))
            }
        }
        _ => Err(impossible_op("/", lhs, rhs)),
    }
}

/// Implements the floor division operator.
pub fn int_div(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(a, b)) => {
            if b == 0 {
                Err(Error::new(ErrorKind::TypeError, "division by zero"))
            } else {
                a.checked_div_euclid(b)
                    .map(Value::from)
                    .ok_or_else(int_overflow)
            }
        }
        Some(CoerceResult::F64(a, b)) => {
            if b == 0.0 {
                Err(Error::new(ErrorKind::TypeError, "division by zero"))
            } else {
                Ok(Value::from((a / b).floor()))
            }
        }
        None => Err(impossible_op("//", lhs, rhs)),
    }
}

/// Implements a binary `pow` operation on values.
pub fn pow(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(a, b)) => {
            if b < 0 {
                // negative exponents flip into float land
                Ok(Value::from((a as f64).powf(b as f64)))
            } else {
                match u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp)) {
                    Some(rv) => Ok(Value::from(rv)),
                    None => Err(int_overflow()),
                }
            }
        }
        Some(CoerceResult::F64(a, b)) => Ok(Value::from(a.powf(b))),
        None => Err(impossible_op("**", lhs, rhs)),
    }
}

/// Implements an unary `neg` operation on a value.
pub fn neg(val: &Value) -> Result<Value, Error> {
    match val.0 {
        ValueRepr::I64(v) => v
            .checked_neg()
            .map(Value::from)
            .ok_or_else(int_overflow),
        ValueRepr::F64(v) => Ok(Value::from(-v)),
        _ => Err(Error::new(
            ErrorKind::TypeError,
            format!("cannot negate value of type {}", val.kind()),
        )),
    }
}

/// Attempts a string concatenation (`~` operator).
pub fn string_concat(left: &Value, right: &Value) -> Value {
    let mut rv = left.to_string();
    write!(rv, "{right}").ok();
    Value::from(rv)
}

/// Implements a containment check (`in` operator).
pub fn contains(container: &Value, value: &Value) -> Result<Value, Error> {
    match container.0 {
        ValueRepr::List(ref items) => Ok(Value::from(items.iter().any(|x| loose_eq(x, value)))),
        ValueRepr::Map(ref map) => {
            let key = match value.0 {
                ValueRepr::String(ref s, _) => s.to_string(),
                ValueRepr::I64(val) => val.to_string(),
                _ => return Ok(Value::from(false)),
            };
            Ok(Value::from(map.contains_key(&key)))
        }
        ValueRepr::String(ref s, _) => Ok(Value::from(match value.as_str() {
            Some(s2) => s.contains(s2),
            None => s.contains(&value.to_string()),
        })),
        ValueRepr::Object(ref obj) => match obj.iter_items() {
            Some(items) => Ok(Value::from(items.iter().any(|x| loose_eq(x, value)))),
            None => Err(Error::new(
                ErrorKind::TypeError,
                "cannot perform a containment check on this value",
            )),
        },
        _ => Err(Error::new(
            ErrorKind::TypeError,
            "cannot perform a containment check on this value",
        )),
    }
}

/// Equality that never fails.
///
/// Same variants compare structurally, numbers cross-compare (mixed
/// integer/float comparisons use a small epsilon), safe strings equal
/// plain strings by content, objects compare by identity, undefineds by
/// name and behavior.
pub fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (&lhs.0, &rhs.0) {
        (ValueRepr::None, ValueRepr::None) => true,
        (ValueRepr::Undefined(a), ValueRepr::Undefined(b)) => {
            a.name == b.name && a.behavior == b.behavior
        }
        (ValueRepr::String(a, _), ValueRepr::String(b, _)) => a == b,
        (ValueRepr::I64(a), ValueRepr::I64(b)) => a == b,
        (ValueRepr::Bool(a), ValueRepr::Bool(b)) => a == b,
        (ValueRepr::I64(_) | ValueRepr::F64(_) | ValueRepr::Bool(_),
         ValueRepr::I64(_) | ValueRepr::F64(_) | ValueRepr::Bool(_)) => {
            match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => (a - b).abs() < FLOAT_EPSILON,
                _ => false,
            }
        }
        (ValueRepr::List(a), ValueRepr::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| loose_eq(a, b))
        }
        (ValueRepr::Map(a), ValueRepr::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|((ak, av), (bk, bv))| ak == bk && loose_eq(av, bv))
        }
        (ValueRepr::Object(a), ValueRepr::Object(b)) => {
            // identity: same allocation and vtable
            Arc::ptr_eq(a, b)
        }
        (ValueRepr::Callable(a), ValueRepr::Callable(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// Equality used by the evaluator; fails when a strict undefined is
/// compared.
pub fn eq_checked(lhs: &Value, rhs: &Value) -> Result<bool, Error> {
    ok!(assert_comparable(lhs));
    ok!(assert_comparable(rhs));
    Ok(loose_eq(lhs, rhs))
}

fn assert_comparable(value: &Value) -> Result<(), Error> {
    if let Some(u) = value.undefined_info() {
        if u.behavior == UndefinedBehavior::Strict {
            return Err(u.error());
        }
    }
    Ok(())
}

/// Partial ordering over values: numbers and strings order, everything
/// else does not.
pub fn partial_cmp(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (&lhs.0, &rhs.0) {
        (ValueRepr::String(a, _), ValueRepr::String(b, _)) => a.partial_cmp(b),
        (ValueRepr::I64(a), ValueRepr::I64(b)) => a.partial_cmp(b),
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    }
}

/// Ordered comparison used by the comparison operators; fails on
/// incomparable or strict undefined operands.
pub fn cmp_checked(lhs: &Value, rhs: &Value) -> Result<Ordering, Error> {
    ok!(assert_comparable(lhs));
    ok!(assert_comparable(rhs));
    partial_cmp(lhs, rhs).ok_or_else(|| {
        Error::new(
            ErrorKind::TypeError,
            format!("cannot compare {} with {}", lhs.kind(), rhs.kind()),
        )
    })
}

/// Total ordering used for sorting: comparable values order naturally,
/// everything else falls back to ordering by kind.
pub fn total_cmp(lhs: &Value, rhs: &Value) -> Ordering {
    partial_cmp(lhs, rhs).unwrap_or_else(|| lhs.kind().cmp(&rhs.kind()))
}

/// Implements slicing (`x[start:stop:step]`).
pub fn slice(
    value: Value,
    start: Value,
    stop: Value,
    step: Value,
) -> Result<Value, Error> {
    let start = if start.is_none() || start.is_undefined() {
        None
    } else {
        Some(ok!(i64::try_from(start)))
    };
    let stop = if stop.is_none() || stop.is_undefined() {
        None
    } else {
        Some(ok!(i64::try_from(stop)))
    };
    let step = if step.is_none() || step.is_undefined() {
        1
    } else {
        ok!(i64::try_from(step))
    };
    if step <= 0 {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            "slice steps must be positive",
        ));
    }

    fn clamp(idx: Option<i64>, len: usize, default: usize) -> usize {
        match idx {
            None => default,
            Some(idx) if idx < 0 => len.saturating_sub(-idx as usize),
            Some(idx) => (idx as usize).min(len),
        }
    }

    if let Some(s) = value.as_str() {
        let chars = s.chars().collect::<Vec<_>>();
        let start = clamp(start, chars.len(), 0);
        let stop = clamp(stop, chars.len(), chars.len());
        let rv = chars
            .get(start..stop.max(start))
            .unwrap_or_default()
            .iter()
            .step_by(step as usize)
            .collect::<String>();
        return Ok(Value::from(rv));
    }

    let items = ok!(value.try_iter()).collect::<Vec<_>>();
    let start = clamp(start, items.len(), 0);
    let stop = clamp(stop, items.len(), items.len());
    Ok(Value::from(
        items
            .get(start..stop.max(start))
            .unwrap_or_default()
            .iter()
            .step_by(step as usize)
            .cloned()
            .collect::<Vec<_>>(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_arithmetic() {
        assert_eq!(add(&Value::from(1), &Value::from(2)).unwrap(), Value::from(3));
        assert_eq!(
            add(&Value::from("a"), &Value::from("b")).unwrap(),
            Value::from("ab")
        );
        assert_eq!(sub(&Value::from(5), &Value::from(2)).unwrap(), Value::from(3));
        assert_eq!(mul(&Value::from(4), &Value::from(2)).unwrap(), Value::from(8));
        assert_eq!(
            div(&Value::from(5), &Value::from(2)).unwrap(),
            Value::from(2.5)
        );
        assert_eq!(
            int_div(&Value::from(5), &Value::from(2)).unwrap(),
            Value::from(2)
        );
        assert_eq!(
            rem(&Value::from(5), &Value::from(2)).unwrap(),
            Value::from(1)
        );
        assert_eq!(
            pow(&Value::from(2), &Value::from(10)).unwrap(),
            Value::from(1024)
        );
    }

    #[test]
    fn test_overflow_errors() {
        assert!(add(&Value::from(i64::MAX), &Value::from(1)).is_err());
        assert!(mul(&Value::from(i64::MAX), &Value::from(2)).is_err());
        assert!(neg(&Value::from(i64::MIN)).is_err());
    }

    #[test]
    fn test_division_by_zero() {
        assert!(div(&Value::from(1), &Value::from(0)).is_err());
        assert!(int_div(&Value::from(1), &Value::from(0)).is_err());
    }

    #[test]
    fn test_epsilon_equality() {
        assert!(loose_eq(&Value::from(1), &Value::from(1.0)));
        assert!(loose_eq(&Value::from(1), &Value::from(1.0 + 1e-12)));
        assert!(!loose_eq(&Value::from(1), &Value::from(1.001)));
    }

    #[test]
    fn test_contains() {
        let seq = Value::from(vec![1, 2, 3]);
        assert!(contains(&seq, &Value::from(2)).unwrap().is_true());
        assert!(!contains(&seq, &Value::from(4)).unwrap().is_true());
        let s = Value::from("hello");
        assert!(contains(&s, &Value::from("ell")).unwrap().is_true());
    }

    #[test]
    fn test_slice() {
        let seq = Value::from(vec![1, 2, 3, 4, 5]);
        assert_eq!(
            slice(seq.clone(), Value::from(1), Value::from(3), Value::from(())).unwrap(),
            Value::from(vec![2, 3])
        );
        assert_eq!(
            slice(seq, Value::from(()), Value::from(()), Value::from(2)).unwrap(),
            Value::from(vec![1, 3, 5])
        );
    }
}
