use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::task::{NodeId, TaskNode, dedup_tags};

#[derive(Debug, Default)]
pub struct Decoded {
    pub nodes: BTreeMap<NodeId, TaskNode>,
    pub skipped: usize,
}

/// Serializes the collection into the stored form: an object keyed by id.
pub fn encode_nodes(nodes: &BTreeMap<NodeId, TaskNode>) -> serde_json::Result<String> {
    serde_json::to_string(nodes)
}

pub fn encode_nodes_value(nodes: &BTreeMap<NodeId, TaskNode>) -> serde_json::Result<Value> {
    serde_json::to_value(nodes)
}

/// Decodes either an id-keyed object or a legacy array of nodes. Returns
/// `None` when the value is neither shape.
pub fn decode_collection(value: Value) -> Option<Decoded> {
    let records: Vec<(Option<String>, Value)> = match value {
        Value::Object(map) => map.into_iter().map(|(k, v)| (Some(k), v)).collect(),
        Value::Array(items) => items.into_iter().map(|v| (None, v)).collect(),
        _ => return None,
    };

    let mut decoded = Decoded::default();
    for (key, record) in records {
        match decode_record(record) {
            Ok(node) => {
                if let Some(key) = key.as_deref()
                    && key != node.id.as_str()
                {
                    debug!(key, id = %node.id, "record key differs from id; using id");
                }
                if decoded.nodes.insert(node.id.clone(), node).is_some() {
                    warn!("duplicate node id in collection; keeping the later record");
                }
            }
            Err(reason) => {
                warn!(key = key.as_deref().unwrap_or("-"), %reason, "skipping invalid node record");
                decoded.skipped += 1;
            }
        }
    }
    Some(decoded)
}

pub fn decode_record(record: Value) -> Result<TaskNode, String> {
    let Value::Object(map) = &record else {
        return Err("record is not an object".to_string());
    };
    validate_shape(map)?;
    let mut node: TaskNode = serde_json::from_value(record).map_err(|err| err.to_string())?;
    node.tags = dedup_tags(node.tags);
    Ok(node)
}

fn validate_shape(map: &Map<String, Value>) -> Result<(), String> {
    for field in ["id", "title"] {
        match map.get(field) {
            Some(Value::String(text)) if !(field == "id" && text.trim().is_empty()) => {}
            Some(Value::String(_)) => return Err(format!("`{field}` is empty")),
            _ => return Err(format!("`{field}` must be a string")),
        }
    }
    if let Some(description) = map.get("description")
        && !description.is_string()
        && !description.is_null()
    {
        return Err("`description` must be a string".to_string());
    }

    check_numeric(map, "position", &["x", "y"])?;
    check_numeric(map, "size", &["width", "height"])?;

    if let Some(tags) = map.get("tags")
        && !tags.is_null()
    {
        let ok = tags
            .as_array()
            .map(|items| items.iter().all(Value::is_string))
            .unwrap_or(false);
        if !ok {
            return Err("`tags` must be an array of strings".to_string());
        }
    }
    Ok(())
}

fn check_numeric(map: &Map<String, Value>, field: &str, keys: &[&str]) -> Result<(), String> {
    let Some(Value::Object(inner)) = map.get(field) else {
        return Err(format!("`{field}` must be an object"));
    };
    for key in keys {
        let finite = inner
            .get(*key)
            .and_then(Value::as_f64)
            .map(f64::is_finite)
            .unwrap_or(false);
        if !finite {
            return Err(format!("`{field}.{key}` must be a number"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(id: &str) -> Value {
        json!({
            "id": id,
            "title": "t",
            "description": "",
            "status": "todo",
            "priority": "medium",
            "createdAt": "2026-02-16T05:00:00.000Z",
            "updatedAt": "2026-02-16T05:00:00.000Z",
            "tags": [],
            "position": {"x": 0, "y": 0},
            "size": {"width": 100, "height": 100}
        })
    }

    #[test]
    fn skips_invalid_records_individually() {
        let mut bad_position = record("b");
        bad_position["position"]["x"] = json!("left");
        let mut bad_status = record("c");
        bad_status["status"] = json!("someday");

        let decoded = decode_collection(json!({
            "a": record("a"),
            "b": bad_position,
            "c": bad_status,
            "d": 42
        }))
        .expect("object shape");

        assert_eq!(decoded.nodes.len(), 1);
        assert!(decoded.nodes.contains_key(&NodeId::from("a")));
        assert_eq!(decoded.skipped, 3);
    }

    #[test]
    fn accepts_legacy_arrays_and_rekeys_by_id() {
        let decoded = decode_collection(json!([record("x"), record("y")])).expect("array shape");
        assert_eq!(decoded.nodes.len(), 2);

        let decoded = decode_collection(json!({"wrong": record("right")})).expect("object shape");
        assert!(decoded.nodes.contains_key(&NodeId::from("right")));
    }

    #[test]
    fn rejects_scalar_collections() {
        assert!(decode_collection(json!("nodes")).is_none());
        assert!(decode_collection(json!(null)).is_none());
    }

    #[test]
    fn missing_title_is_invalid() {
        let mut value = record("a");
        value.as_object_mut().expect("object").remove("title");
        assert!(decode_record(value).is_err());
    }

    #[test]
    fn duplicate_tags_collapse_on_decode() {
        let mut tagged = record("a");
        tagged["tags"] = json!(["x", "home", "x"]);
        let node = decode_record(tagged).expect("valid record");
        assert_eq!(node.tags, vec!["x".to_string(), "home".to_string()]);
    }
}
