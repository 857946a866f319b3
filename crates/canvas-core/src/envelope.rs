use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::codec::{decode_collection, encode_nodes_value};
use crate::datetime::format_iso;
use crate::task::{NodeId, TaskNode};

pub const EXPORT_VERSION: &str = "1.0";

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("no file was selected")]
    MissingFile,

    #[error("could not read the file: {0}")]
    Unreadable(String),

    #[error("the file is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("invalid file format: task data is missing")]
    MissingNodes,

    #[error("invalid file format: task data must be an object or an array")]
    MalformedNodes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope {
    pub version: String,
    pub export_date: String,
    pub count: usize,
    pub nodes: Value,
}

/// A ready-to-download export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub file_name: String,
    pub mime_type: &'static str,
    pub contents: String,
}

#[instrument(skip(nodes), fields(count = nodes.len()))]
pub fn export_document(
    nodes: &BTreeMap<NodeId, TaskNode>,
    now: DateTime<Utc>,
) -> anyhow::Result<ExportFile> {
    let envelope = ExportEnvelope {
        version: EXPORT_VERSION.to_string(),
        export_date: format_iso(&now),
        count: nodes.len(),
        nodes: encode_nodes_value(nodes).context("failed to encode nodes for export")?,
    };
    let contents =
        serde_json::to_string_pretty(&envelope).context("failed to serialize export envelope")?;
    info!(count = nodes.len(), "exported nodes");
    Ok(ExportFile {
        file_name: export_file_name(now),
        mime_type: "application/json",
        contents,
    })
}

pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("todo-backup-{}.json", now.format("%Y-%m-%d"))
}

/// Parses an export document. Accepts the id-keyed `nodes` object and the
/// legacy array form; individually invalid records are dropped.
#[instrument(skip(contents), fields(bytes = contents.len()))]
pub fn parse_import(contents: &str) -> Result<BTreeMap<NodeId, TaskNode>, ImportError> {
    let mut document: Value = serde_json::from_str(contents)?;
    let nodes = match document.get_mut("nodes") {
        None | Some(Value::Null) => return Err(ImportError::MissingNodes),
        Some(nodes) => nodes.take(),
    };

    let version = document.get("version").and_then(Value::as_str);
    if let Some(version) = version
        && version != EXPORT_VERSION
    {
        warn!(version, "importing file from a different export version");
    }

    let decoded = decode_collection(nodes).ok_or(ImportError::MalformedNodes)?;
    if let Some(count) = document.get("count").and_then(Value::as_u64)
        && count as usize != decoded.nodes.len() + decoded.skipped
    {
        warn!(declared = count, found = decoded.nodes.len(), "export count does not match its nodes");
    }

    info!(count = decoded.nodes.len(), skipped = decoded.skipped, "parsed import file");
    Ok(decoded.nodes)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::store::{NodeDefaults, NodeStore};
    use crate::task::{NewNode, Position};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 9, 12, 30, 0).unwrap()
    }

    #[test]
    fn export_then_import_is_lossless() {
        let mut store = NodeStore::new(NodeDefaults::default());
        let a = store.create(NewNode::titled("Buy milk"));
        store.add_tag(&a, "errands");
        let b = store.create_at_position(Position::new(300.0, 40.0), NewNode::titled("Plan trip"));
        store.finish_editing(&b);
        let nodes = store.nodes().clone();

        let file = export_document(&nodes, now()).expect("export");
        assert_eq!(file.file_name, "todo-backup-2026-03-09.json");
        assert_eq!(file.mime_type, "application/json");

        let envelope: ExportEnvelope = serde_json::from_str(&file.contents).expect("envelope");
        assert_eq!(envelope.version, "1.0");
        assert_eq!(envelope.count, 2);
        assert_eq!(envelope.export_date, "2026-03-09T12:30:00.000Z");
        assert!(envelope.nodes.is_object());

        assert_eq!(parse_import(&file.contents).expect("import"), nodes);
    }

    #[test]
    fn rejects_documents_without_nodes() {
        let err = parse_import(r#"{"version":"1.0"}"#).expect_err("missing nodes");
        assert!(matches!(err, ImportError::MissingNodes));

        let err = parse_import(r#"{"nodes": 5}"#).expect_err("scalar nodes");
        assert!(matches!(err, ImportError::MalformedNodes));

        let err = parse_import("not json").expect_err("bad json");
        assert!(matches!(err, ImportError::InvalidJson(_)));
        assert!(err.to_string().starts_with("the file is not valid JSON"));
    }

    #[test]
    fn accepts_legacy_array_envelopes() {
        let contents = json!({
            "version": "1.0",
            "exportDate": "2025-12-01T00:00:00.000Z",
            "count": 1,
            "nodes": [{
                "id": "abc",
                "title": "Legacy",
                "description": "",
                "status": "done",
                "priority": "high",
                "createdAt": "2025-11-30T10:00:00.000Z",
                "updatedAt": "2025-11-30T10:00:00.000Z",
                "dueDate": "2025-12-24",
                "tags": ["old"],
                "position": {"x": 10, "y": 10},
                "size": {"width": 200, "height": 150}
            }]
        })
        .to_string();

        let nodes = parse_import(&contents).expect("import");
        let node = nodes.get(&NodeId::from("abc")).expect("node");
        assert_eq!(node.title, "Legacy");
        assert!(node.due_date.is_some());
        assert_eq!(node.z_index, 1);
    }
}
