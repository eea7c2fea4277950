//! Deep structural equality for document field values.
//!
//! Fields are passed as `Option<&Value>` so that a field that is absent can
//! be told apart from a field that is present and `null`.

use serde_json::{Number, Value};

/// Compare two field values.
///
/// - absent/absent and null/null are equal
/// - absent and null are not equal
/// - objects compare key-by-key regardless of key order
/// - arrays compare element-by-element, order-sensitive
/// - numbers compare by value, so `1` equals `1.0`
pub fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => value_eq(a, b),
        _ => false,
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => number_eq(x, y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| value_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map_or(false, |y| value_eq(x, y)))
        }
        _ => false,
    }
}

fn number_eq(x: &Number, y: &Number) -> bool {
    if x.is_f64() || y.is_f64() {
        return match (x.as_f64(), y.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
    }

    // Integers compare exactly; a negative i64 never equals a u64 above i64::MAX.
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    matches!((x.as_u64(), y.as_u64()), (Some(a), Some(b)) if a == b)
}
