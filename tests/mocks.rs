use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use stepbench::asl::ItemReaderConfig;
use stepbench::mocks::{
    ConditionalRule, ExhaustPolicy, InMemoryLoader, ItemReaderMock, MockConfig, MockEngine,
    MockKind, MockReply, StateMock,
};

fn engine_of(mocks: Vec<StateMock>) -> MockEngine {
    MockEngine::new(&MockConfig::new(mocks))
}

fn reader_config(resource: &str, config: serde_json::Value) -> ItemReaderConfig {
    ItemReaderConfig {
        resource: resource.to_string(),
        reader_config: config,
        parameters: None,
        arguments: None,
    }
}

#[test]
fn fixed_mock_returns_its_literal() {
    let engine = engine_of(vec![StateMock::fixed("A", json!({ "ok": true }))]);
    let response = engine.resolve("A", &json!({})).expect("response");
    assert_eq!(response.value, json!({ "ok": true }));
    assert_eq!(engine.call_count("A"), 1);
}

#[test]
fn missing_mock_is_mock_not_found() {
    let engine = engine_of(vec![]);
    let error = engine.resolve("Ghost", &json!({})).expect_err("no mock");
    assert_eq!(error.error, "MockNotFound");
}

#[test]
fn error_mock_raises_its_typed_error() {
    let engine = engine_of(vec![StateMock::error("A", "Custom.Boom", "it broke")]);
    let error = engine.resolve("A", &json!({})).expect_err("typed error");
    assert_eq!(error.error, "Custom.Boom");
    assert_eq!(error.cause, "it broke");
    assert_eq!(error.to_string(), "Custom.Boom: it broke");
}

#[test]
fn conditional_mock_matches_in_order() {
    let engine = engine_of(vec![StateMock::conditional(
        "A",
        vec![
            ConditionalRule {
                when: Some(json!({ "kind": "a", "nested": { "flag": true } })),
                is_default: false,
                reply: MockReply::response(json!("first")),
            },
            ConditionalRule {
                when: Some(json!({ "kind": "a" })),
                is_default: false,
                reply: MockReply::response(json!("second")),
            },
            ConditionalRule {
                when: None,
                is_default: true,
                reply: MockReply::response(json!("default")),
            },
        ],
    )]);

    // Deep subset: extra keys in the input are fine.
    let r = engine
        .resolve("A", &json!({ "kind": "a", "nested": { "flag": true, "extra": 1 } }))
        .expect("match");
    assert_eq!(r.value, json!("first"));

    let r = engine
        .resolve("A", &json!({ "kind": "a", "nested": { "flag": false } }))
        .expect("match");
    assert_eq!(r.value, json!("second"));

    let r = engine.resolve("A", &json!({ "kind": "z" })).expect("default");
    assert_eq!(r.value, json!("default"));
}

#[test]
fn conditional_mock_without_default_raises() {
    let engine = engine_of(vec![StateMock::conditional(
        "A",
        vec![ConditionalRule {
            when: Some(json!({ "kind": "a" })),
            is_default: false,
            reply: MockReply::response(json!(1)),
        }],
    )]);
    let error = engine.resolve("A", &json!({ "kind": "z" })).expect_err("no match");
    assert_eq!(error.error, "MockNotFound");
}

#[test]
fn stateful_mock_consumes_its_sequence() {
    let engine = engine_of(vec![StateMock::stateful(
        "A",
        vec![
            MockReply::response(json!(1)),
            MockReply::error("E", "second call fails"),
            MockReply::response(json!(3)),
        ],
    )]);
    assert_eq!(engine.resolve("A", &json!({})).expect("first").value, json!(1));
    let error = engine.resolve("A", &json!({})).expect_err("second");
    assert_eq!(error.error, "E");
    assert_eq!(engine.resolve("A", &json!({})).expect("third").value, json!(3));
    // Past the end: the default policy repeats the last entry.
    assert_eq!(engine.resolve("A", &json!({})).expect("fourth").value, json!(3));
    assert_eq!(engine.call_count("A"), 4);
}

#[test]
fn stateful_mock_exhaustion_can_error() {
    let engine = engine_of(vec![StateMock {
        state: "A".to_string(),
        kind: MockKind::Stateful {
            responses: vec![MockReply::response(json!(1))],
            on_exhausted: Some(ExhaustPolicy::Error),
        },
    }]);
    assert!(engine.resolve("A", &json!({})).is_ok());
    let error = engine.resolve("A", &json!({})).expect_err("exhausted");
    assert_eq!(error.error, "MockNotFound");
}

#[test]
fn overrides_shadow_by_state_name() {
    let base = engine_of(vec![
        StateMock::fixed("A", json!("base-a")),
        StateMock::fixed("B", json!("base-b")),
    ]);
    let derived = base.with_overrides(&[StateMock::fixed("A", json!("override"))]);
    assert_eq!(derived.resolve("A", &json!({})).expect("a").value, json!("override"));
    assert_eq!(derived.resolve("B", &json!({})).expect("b").value, json!("base-b"));
    // The base engine's counters are untouched.
    assert_eq!(base.call_count("A"), 0);
}

#[tokio::test]
async fn item_reader_list_objects_augments_metadata() {
    let engine = engine_of(vec![StateMock::item_reader(
        "M",
        ItemReaderMock {
            data: Some(json!([
                { "key": "a.json", "size": 10 },
                { "Key": "b.json" }
            ])),
            data_file: None,
        },
    )]);
    let reader = reader_config("arn:aws:states:::s3:listObjectsV2", json!({}));
    let items = engine.resolve_item_reader("M", &reader).await.expect("items");
    assert_eq!(items.len(), 2);
    // Case-insensitive key matching, canonical casing out, defaults in.
    assert_eq!(items[0]["Key"], json!("a.json"));
    assert_eq!(items[0]["Size"], json!(10));
    assert_eq!(items[0]["StorageClass"], json!("STANDARD"));
    assert_eq!(items[1]["Key"], json!("b.json"));
    assert_eq!(items[1]["Size"], json!(0));
    assert!(items[1]["LastModified"].is_string());
    assert!(items[1]["ETag"].is_string());
}

#[tokio::test]
async fn item_reader_list_objects_requires_key() {
    let engine = engine_of(vec![StateMock::item_reader(
        "M",
        ItemReaderMock {
            data: Some(json!([{ "size": 1 }])),
            data_file: None,
        },
    )]);
    let reader = reader_config("arn:aws:states:::s3:listObjectsV2", json!({}));
    let error = engine
        .resolve_item_reader("M", &reader)
        .await
        .expect_err("missing Key");
    assert_eq!(error.error, "MapItemReaderFormatMismatch");
}

#[tokio::test]
async fn item_reader_csv_projects_rows_onto_headers() {
    let engine = engine_of(vec![StateMock::item_reader(
        "M",
        ItemReaderMock {
            data: Some(json!([
                { "name": "ada", "AGE": 36, "extra": "dropped" },
                ["grace", 45, "dropped"],
                { "name": "alan" }
            ])),
            data_file: None,
        },
    )]);
    let reader = reader_config(
        "arn:aws:states:::s3:getObject",
        json!({ "InputType": "CSV", "CSVHeaders": ["name", "age"] }),
    );
    let items = engine.resolve_item_reader("M", &reader).await.expect("items");
    assert_eq!(
        items,
        vec![
            json!({ "name": "ada", "age": 36 }),
            json!({ "name": "grace", "age": 45 }),
            json!({ "name": "alan", "age": "" }),
        ]
    );
}

#[tokio::test]
async fn item_reader_jsonl_lines_must_be_objects() {
    let engine = engine_of(vec![StateMock::item_reader(
        "M",
        ItemReaderMock {
            data: Some(json!([{ "ok": 1 }, "not an object"])),
            data_file: None,
        },
    )]);
    let reader = reader_config(
        "arn:aws:states:::s3:getObject",
        json!({ "InputType": "JSONL" }),
    );
    let error = engine
        .resolve_item_reader("M", &reader)
        .await
        .expect_err("bad line");
    assert_eq!(error.error, "MapItemReaderFormatMismatch");
}

#[tokio::test]
async fn item_reader_manifest_requires_bucket_and_key() {
    let engine = engine_of(vec![StateMock::item_reader(
        "M",
        ItemReaderMock {
            data: Some(json!([{ "bucket": "b", "key": "k" }])),
            data_file: None,
        },
    )]);
    let reader = reader_config(
        "arn:aws:states:::s3:getObject",
        json!({ "InputType": "MANIFEST" }),
    );
    let items = engine.resolve_item_reader("M", &reader).await.expect("items");
    assert_eq!(items, vec![json!({ "Bucket": "b", "Key": "k" })]);

    let engine = engine_of(vec![StateMock::item_reader(
        "M",
        ItemReaderMock {
            data: Some(json!([{ "Bucket": "b" }])),
            data_file: None,
        },
    )]);
    let error = engine
        .resolve_item_reader("M", &reader)
        .await
        .expect_err("missing Key");
    assert_eq!(error.error, "MapItemReaderFormatMismatch");
}

#[tokio::test]
async fn item_reader_caps_at_max_items() {
    let engine = engine_of(vec![StateMock::item_reader(
        "M",
        ItemReaderMock {
            data: Some(json!([{ "id": 1 }, { "id": 2 }, { "id": 3 }])),
            data_file: None,
        },
    )]);
    let reader = reader_config("arn:aws:states:::s3:getObject", json!({ "MaxItems": 2 }));
    let items = engine.resolve_item_reader("M", &reader).await.expect("items");
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn item_reader_resolves_data_files_through_the_loader() {
    let loader = InMemoryLoader::new().with_file("rows.json", json!([{ "id": 7 }]));
    let engine = engine_of(vec![StateMock::item_reader(
        "M",
        ItemReaderMock {
            data: None,
            data_file: Some("rows.json".to_string()),
        },
    )])
    .with_loader(Arc::new(loader));
    let reader = reader_config("arn:aws:states:::s3:getObject", json!({}));
    let items = engine.resolve_item_reader("M", &reader).await.expect("items");
    assert_eq!(items, vec![json!({ "id": 7 })]);
}

#[tokio::test]
async fn item_reader_without_mock_generates_a_default_dataset() {
    let engine = engine_of(vec![]);
    let reader = reader_config("arn:aws:states:::s3:listObjectsV2", json!({}));
    let items = engine.resolve_item_reader("M", &reader).await.expect("items");
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|i| i["Key"].is_string()));
}

#[test]
fn result_writer_records_calls_and_returns_details() {
    let engine = engine_of(vec![StateMock::result_writer(
        "M",
        Some(json!({ "Bucket": "out", "Key": "r.json" })),
    )]);
    let details = engine.write_results("M", "arn:writer", &json!({}), &[json!(1), json!(2)]);
    assert_eq!(details, json!({ "Bucket": "out", "Key": "r.json" }));
    let calls = engine.writer_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].results, vec![json!(1), json!(2)]);
}
