//! Item-reader dataset validation.
//!
//! The raw dataset (inline, file-loaded, or generated) is validated and
//! normalized against the Map state's `ItemReader` configuration before
//! the iteration sees it: S3 listings get their object metadata
//! defaulted, CSV rows are projected onto the declared headers, JSONL
//! lines must be objects, and manifests must name `Bucket` and `Key`.
//! Field names are matched case-insensitively and normalized to their
//! canonical casing.

use serde_json::{Map, Value, json};

use crate::asl::ItemReaderConfig;
use crate::errors::{StatesError, names};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReaderKind {
    S3List,
    Csv,
    Jsonl,
    Manifest,
    Json,
}

pub(crate) fn materialize(
    reader: &ItemReaderConfig,
    raw: Option<Value>,
) -> Result<Vec<Value>, StatesError> {
    let kind = classify(reader);
    let raw = raw.unwrap_or_else(|| default_dataset(kind));
    let rows = match raw {
        Value::Array(rows) => rows,
        other => {
            return Err(format_mismatch(format!(
                "itemReader dataset must be an array, got {}",
                crate::utils::json_ext::value_type_name(&other)
            )));
        }
    };

    let mut items = match kind {
        ReaderKind::S3List => rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| normalize_s3_object(index, row))
            .collect::<Result<Vec<_>, _>>()?,
        ReaderKind::Csv => {
            let headers = csv_headers(reader)?;
            rows.into_iter()
                .map(|row| project_csv_row(&headers, row))
                .collect::<Result<Vec<_>, _>>()?
        }
        ReaderKind::Jsonl => rows
            .into_iter()
            .map(|row| match row {
                Value::Object(_) => Ok(row),
                other => Err(format_mismatch(format!(
                    "JSONL line must be an object, got {}",
                    crate::utils::json_ext::value_type_name(&other)
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        ReaderKind::Manifest => rows
            .into_iter()
            .map(normalize_manifest_entry)
            .collect::<Result<Vec<_>, _>>()?,
        ReaderKind::Json => rows,
    };

    if let Some(max) = max_items(reader) {
        items.truncate(max);
    }
    Ok(items)
}

fn classify(reader: &ItemReaderConfig) -> ReaderKind {
    if reader.resource.contains("listObjectsV2") {
        return ReaderKind::S3List;
    }
    let input_type = get_ci(reader.reader_config.as_object(), "InputType")
        .and_then(Value::as_str)
        .unwrap_or("JSON");
    match input_type {
        "CSV" => ReaderKind::Csv,
        "JSONL" => ReaderKind::Jsonl,
        "MANIFEST" => ReaderKind::Manifest,
        _ => ReaderKind::Json,
    }
}

fn default_dataset(kind: ReaderKind) -> Value {
    match kind {
        ReaderKind::S3List => json!([
            { "Key": "items/000.json" },
            { "Key": "items/001.json" },
            { "Key": "items/002.json" },
        ]),
        _ => json!([{ "id": 0 }, { "id": 1 }, { "id": 2 }]),
    }
}

fn format_mismatch(cause: String) -> StatesError {
    StatesError::new(names::ITEM_READER_FORMAT_MISMATCH, cause)
}

fn max_items(reader: &ItemReaderConfig) -> Option<usize> {
    get_ci(reader.reader_config.as_object(), "MaxItems")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
}

fn csv_headers(reader: &ItemReaderConfig) -> Result<Vec<String>, StatesError> {
    get_ci(reader.reader_config.as_object(), "CSVHeaders")
        .and_then(Value::as_array)
        .map(|headers| {
            headers
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .ok_or_else(|| format_mismatch("CSV itemReader requires CSVHeaders".to_string()))
}

/// Case-insensitive object field lookup.
fn get_ci<'a>(obj: Option<&'a Map<String, Value>>, field: &str) -> Option<&'a Value> {
    let obj = obj?;
    obj.get(field)
        .or_else(|| {
            obj.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(field))
                .map(|(_, v)| v)
        })
}

/// Every listing entry must carry a `Key`; the remaining S3 metadata is
/// defaulted when absent.
fn normalize_s3_object(index: usize, row: Value) -> Result<Value, StatesError> {
    let Value::Object(row) = row else {
        return Err(format_mismatch(
            "listObjectsV2 entries must be objects".to_string(),
        ));
    };
    let key = get_ci(Some(&row), "Key")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            format_mismatch(format!("listObjectsV2 entry {index} is missing a Key"))
        })?;
    let mut out = Map::new();
    out.insert("Key".to_string(), Value::String(key));
    out.insert(
        "Size".to_string(),
        get_ci(Some(&row), "Size")
            .cloned()
            .unwrap_or_else(|| json!(0)),
    );
    out.insert(
        "LastModified".to_string(),
        get_ci(Some(&row), "LastModified")
            .cloned()
            .unwrap_or_else(|| json!("2024-01-01T00:00:00Z")),
    );
    out.insert(
        "ETag".to_string(),
        get_ci(Some(&row), "ETag")
            .cloned()
            .unwrap_or_else(|| json!(format!("\"etag-{index:03}\""))),
    );
    out.insert(
        "StorageClass".to_string(),
        get_ci(Some(&row), "StorageClass")
            .cloned()
            .unwrap_or_else(|| json!("STANDARD")),
    );
    Ok(Value::Object(out))
}

/// Project one CSV row onto the declared headers: objects are matched by
/// header name (case-insensitively), arrays positionally. Missing columns
/// become empty strings; extra columns are dropped.
fn project_csv_row(headers: &[String], row: Value) -> Result<Value, StatesError> {
    let mut out = Map::new();
    match row {
        Value::Object(row) => {
            for header in headers {
                let value = get_ci(Some(&row), header)
                    .cloned()
                    .unwrap_or_else(|| json!(""));
                out.insert(header.clone(), value);
            }
        }
        Value::Array(cells) => {
            for (i, header) in headers.iter().enumerate() {
                out.insert(
                    header.clone(),
                    cells.get(i).cloned().unwrap_or_else(|| json!("")),
                );
            }
        }
        other => {
            return Err(format_mismatch(format!(
                "CSV rows must be objects or arrays, got {}",
                crate::utils::json_ext::value_type_name(&other)
            )));
        }
    }
    Ok(Value::Object(out))
}

fn normalize_manifest_entry(row: Value) -> Result<Value, StatesError> {
    let Value::Object(row) = row else {
        return Err(format_mismatch(
            "MANIFEST entries must be objects".to_string(),
        ));
    };
    let bucket = get_ci(Some(&row), "Bucket").and_then(Value::as_str);
    let key = get_ci(Some(&row), "Key").and_then(Value::as_str);
    match (bucket, key) {
        (Some(bucket), Some(key)) => Ok(json!({ "Bucket": bucket, "Key": key })),
        _ => Err(format_mismatch(
            "MANIFEST entries require Bucket and Key".to_string(),
        )),
    }
}
