use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use stepbench::expr::intrinsics;
use stepbench::expr::jsonpath::EvalScope;

fn eval_with(expr: &str, data: Value) -> Result<Value, stepbench::errors::StatesError> {
    let context = json!({ "Execution": { "Name": "run-1" } });
    let variables: FxHashMap<String, Value> =
        [("threshold".to_string(), json!(7))].into_iter().collect();
    let scope = EvalScope::new(&data, &context, &variables);
    intrinsics::evaluate(expr, &scope)
}

fn eval(expr: &str) -> Value {
    eval_with(expr, json!({ "name": "world", "items": [1, 2, 2, 3] })).expect("intrinsic evaluates")
}

#[test]
fn format_substitutes_left_to_right() {
    assert_eq!(
        eval("States.Format('{} and {}', 'a', 'b')"),
        json!("a and b")
    );
    assert_eq!(eval("States.Format('hi {}', $.name)"), json!("hi world"));
}

#[test]
fn format_placeholder_count_must_match() {
    let err = eval_with("States.Format('{} {}', 'only')", json!({})).expect_err("mismatch");
    assert_eq!(err.error, "States.Runtime");
}

#[test]
fn array_family() {
    assert_eq!(eval("States.Array(1, 'two', $.name)"), json!([1, "two", "world"]));
    assert_eq!(
        eval("States.ArrayPartition(States.Array(1, 2, 3, 4, 5), 2)"),
        json!([[1, 2], [3, 4], [5]])
    );
    assert_eq!(eval("States.ArrayContains($.items, 3)"), json!(true));
    assert_eq!(eval("States.ArrayContains($.items, 9)"), json!(false));
    assert_eq!(eval("States.ArrayLength($.items)"), json!(4));
    assert_eq!(eval("States.ArrayUnique($.items)"), json!([1, 2, 3]));
}

#[test]
fn array_range_is_inclusive_and_bounded() {
    assert_eq!(eval("States.ArrayRange(1, 9, 2)"), json!([1, 3, 5, 7, 9]));
    assert_eq!(eval("States.ArrayRange(9, 1, -2)"), json!([9, 7, 5, 3, 1]));
    let err = eval_with("States.ArrayRange(0, 2000, 1)", json!({})).expect_err("too large");
    assert!(err.cause.contains("1000"));
}

#[test]
fn array_get_item_rounds_and_bounds() {
    assert_eq!(eval("States.ArrayGetItem($.items, 1.4)"), json!(2));
    let err = eval_with("States.ArrayGetItem(States.Array(1), 5)", json!({}))
        .expect_err("out of range");
    assert_eq!(err.error, "States.Runtime");
}

#[test]
fn base64_round_trip() {
    assert_eq!(eval("States.Base64Encode('hello')"), json!("aGVsbG8="));
    assert_eq!(eval("States.Base64Decode('aGVsbG8=')"), json!("hello"));
}

#[test]
fn hash_defaults_to_sha256() {
    assert_eq!(
        eval("States.Hash('test')"),
        json!("9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08")
    );
    assert_eq!(
        eval("States.Hash('test', 'SHA-256')"),
        eval("States.Hash('test')")
    );
}

#[test]
fn json_merge_is_shallow_only() {
    assert_eq!(
        eval("States.JsonMerge(States.StringToJson('{\"a\":1,\"b\":1}'), States.StringToJson('{\"b\":2}'), false)"),
        json!({ "a": 1, "b": 2 })
    );
    let err =
        eval_with("States.JsonMerge(States.StringToJson('{}'), States.StringToJson('{}'), true)", json!({}))
            .expect_err("deep merge unsupported");
    assert_eq!(err.error, "States.Runtime");
}

#[test]
fn string_json_round_trip() {
    assert_eq!(
        eval("States.StringToJson('{\"x\": [1, 2]}')"),
        json!({ "x": [1, 2] })
    );
    assert_eq!(eval("States.JsonToString($.items)"), json!("[1,2,2,3]"));
}

#[test]
fn math_add_is_bounded_to_int32() {
    assert_eq!(eval("States.MathAdd(40, 2)"), json!(42));
    assert_eq!(eval("States.MathAdd(-5, 2)"), json!(-3));
    let err = eval_with("States.MathAdd(2147483647, 1)", json!({})).expect_err("overflow");
    assert_eq!(err.error, "States.Runtime");
}

#[test]
fn string_split_delimiter_modes() {
    // A repeated single character splits on the whole delimiter.
    assert_eq!(
        eval("States.StringSplit('a::b::c', '::')"),
        json!(["a", "b", "c"])
    );
    // Mixed characters act as a character class.
    assert_eq!(
        eval("States.StringSplit('a-b.c', '-.')"),
        json!(["a", "b", "c"])
    );
}

#[test]
fn math_random_seeded_is_deterministic() {
    let first = eval("States.MathRandom(1, 100, 42)");
    let second = eval("States.MathRandom(1, 100, 42)");
    assert_eq!(first, second);
    let n = first.as_i64().expect("integer");
    assert!((1..100).contains(&n));
}

#[test]
fn uuid_shape() {
    let value = eval("States.UUID()");
    let s = value.as_str().expect("string");
    assert_eq!(s.len(), 36);
    assert_eq!(s.matches('-').count(), 4);
}

#[test]
fn nested_calls_and_variable_references() {
    assert_eq!(
        eval("States.Format('len={}', States.ArrayLength($.items))"),
        json!("len=4")
    );
    // `$threshold` resolves from the variable store.
    assert_eq!(eval("States.MathAdd($threshold, 1)"), json!(8));
    // `$$` reads the context object.
    assert_eq!(
        eval("States.Format('run {}', $$.Execution.Name)"),
        json!("run run-1")
    );
}

#[test]
fn unknown_intrinsic_is_an_error() {
    let err = eval_with("States.Nope(1)", json!({})).expect_err("unknown");
    assert!(err.cause.contains("Unknown intrinsic"));
}

proptest! {
    #[test]
    fn base64_round_trips_any_string(s in "\\PC*") {
        let encoded = eval_with(
            "States.Base64Encode($.s)",
            json!({ "s": s }),
        ).unwrap();
        let decoded = eval_with(
            "States.Base64Decode($.e)",
            json!({ "e": encoded }),
        ).unwrap();
        prop_assert_eq!(decoded, json!(s));
    }

    #[test]
    fn math_random_is_pure_in_seed(seed in -1000i64..1000, span in 2i64..500) {
        let expr = format!("States.MathRandom(0, {span}, {seed})");
        let a = eval_with(&expr, json!({})).unwrap();
        let b = eval_with(&expr, json!({})).unwrap();
        prop_assert_eq!(a.clone(), b);
        let n = a.as_i64().unwrap();
        prop_assert!((0..span).contains(&n));
    }
}
