use super::{DecodedResponse, RawRecord, ResponseDecoder};
use crate::error::{ReconError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

const ITEM_CONTAINER_KEYS: &[&str] = &["items", "list", "item"];
const IMAGE_LIST_KEY: &str = "imageList";

/// Decodes the JSON envelopes the service uses:
///
/// - `{"response": {"header": {...}, "body": {"items": ..., "totalCount": n}}}`
/// - `{"resultCode": ..., "totalCount": n, "list": [...]}` (flat)
///
/// Item containers may be an array, a single object, or an object wrapping
/// an `item` array.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl ResponseDecoder for JsonDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedResponse> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let root: Value = serde_json::from_slice(bytes)
            .map_err(|e| ReconError::Parse(format!("invalid JSON: {e}")))?;
        let root = root
            .as_object()
            .ok_or_else(|| ReconError::Parse("JSON root is not an object".into()))?;

        let response = root.get("response").and_then(Value::as_object).unwrap_or(root);
        let header = response.get("header").and_then(Value::as_object).unwrap_or(response);
        let body = response.get("body").and_then(Value::as_object).unwrap_or(response);

        let result_code = scalar_text(header.get("resultCode")).unwrap_or_default();
        let result_msg = scalar_text(header.get("resultMsg")).unwrap_or_default();
        let total_count = scalar_text(body.get("totalCount")).and_then(|s| s.trim().parse().ok());

        let records: Vec<RawRecord> = ITEM_CONTAINER_KEYS
            .iter()
            .find_map(|key| body.get(*key))
            .map(item_objects)
            .unwrap_or_default()
            .into_iter()
            .map(raw_record)
            .collect();

        debug!(
            "JsonDecoder: code={} total={:?} records={}",
            result_code,
            total_count,
            records.len()
        );

        Ok(DecodedResponse {
            result_code,
            result_msg,
            total_count,
            records,
        })
    }
}

/// Text form of a scalar; `None` for null, arrays and objects.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Objects held by an item container, whichever shape it takes.
fn item_objects(container: &Value) -> Vec<&Map<String, Value>> {
    match container {
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        Value::Object(obj) => match obj.get("item") {
            Some(inner @ (Value::Array(_) | Value::Object(_))) => item_objects(inner),
            _ => vec![obj],
        },
        _ => Vec::new(),
    }
}

fn flatten_into(prefix: &str, obj: &Map<String, Value>, out: &mut BTreeMap<String, String>) {
    for (key, value) in obj {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(nested) => flatten_into(&full_key, nested, out),
            other => {
                if let Some(text) = scalar_text(Some(other)) {
                    out.insert(full_key, text);
                }
            }
        }
    }
}

fn raw_record(obj: &Map<String, Value>) -> RawRecord {
    let mut fields = BTreeMap::new();
    let mut images = Vec::new();

    for (key, value) in obj {
        if key == IMAGE_LIST_KEY {
            for image in item_objects(value) {
                let mut image_fields = BTreeMap::new();
                flatten_into("", image, &mut image_fields);
                images.push(image_fields);
            }
            continue;
        }
        match value {
            Value::Object(nested) => flatten_into(key, nested, &mut fields),
            other => {
                if let Some(text) = scalar_text(Some(other)) {
                    fields.insert(key.clone(), text);
                }
            }
        }
    }

    RawRecord { fields, images }
}
