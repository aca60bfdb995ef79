//! Expression evaluation: JSONPath with `States.*` intrinsics, and the
//! JSONata engine with the Step Functions extensions.

pub mod intrinsics;
pub mod jsonata;
pub mod jsonpath;

use serde_json::{Number, Value};

/// Build a JSON number from an f64, preferring the integer representation
/// when the value is integral. Keeps arithmetic results like `50 + 100`
/// rendering as `150` rather than `150.0`.
#[must_use]
pub(crate) fn num_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.is_finite() && f.abs() < 9.007_199_254_740_992e15 {
        Value::Number(Number::from(f as i64))
    } else {
        Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}
