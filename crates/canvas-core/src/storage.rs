use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::codec::{decode_collection, encode_nodes};
use crate::datetime::{format_iso, parse_iso_lenient};
use crate::envelope::{self, ExportFile, ImportError};
use crate::task::{NodeId, Position, Size, Status, TaskNode};

const PROBE_KEY: &str = "__storage_test__";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{0} is not available")]
    Unavailable(String),

    #[error("{backend} quota exceeded: {needed} bytes needed, {limit} allowed")]
    QuotaExceeded {
        backend: String,
        needed: usize,
        limit: usize,
    },

    #[error("{backend} failed: {message}")]
    Backend { backend: String, message: String },

    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

/// A string key-value store the adapter can persist into.
pub trait StorageBackend {
    fn name(&self) -> &str;

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Largest value this backend accepts, if it has a hard limit.
    fn max_value_len(&self) -> Option<usize> {
        None
    }

    /// Writes and removes a probe key.
    fn is_available(&self) -> bool {
        self.set_item(PROBE_KEY, PROBE_KEY)
            .and_then(|_| self.remove_item(PROBE_KEY))
            .is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub namespace: String,
    pub nodes: String,
    pub last_save: String,
}

impl StorageKeys {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            nodes: format!("{namespace}-nodes-v1"),
            last_save: format!("{namespace}-last-save"),
        }
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::new("todo-app")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStatus {
    pub name: String,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub has_data: bool,
    pub node_count: usize,
    pub last_save: Option<String>,
    pub backends: Vec<BackendStatus>,
}

/// Persists the node collection into an ordered list of backends. The first
/// backend is the primary one; the rest are mirrors consulted on load when
/// the primary has nothing usable.
///
/// No method here returns a storage error: failures are logged and turned
/// into `false` or an empty collection.
pub struct StorageAdapter {
    backends: Vec<Box<dyn StorageBackend>>,
    keys: StorageKeys,
}

impl StorageAdapter {
    pub fn new(keys: StorageKeys) -> Self {
        Self {
            backends: Vec::new(),
            keys,
        }
    }

    pub fn with_backend(mut self, backend: impl StorageBackend + 'static) -> Self {
        self.push_backend(backend);
        self
    }

    pub fn push_backend(&mut self, backend: impl StorageBackend + 'static) {
        debug!(backend = backend.name(), "registered storage backend");
        self.backends.push(Box::new(backend));
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    #[instrument(skip(self, nodes), fields(count = nodes.len()))]
    pub fn save(&self, nodes: &BTreeMap<NodeId, TaskNode>, now: DateTime<Utc>) -> bool {
        self.save_under(&self.keys, nodes, now)
    }

    #[instrument(skip(self))]
    pub fn load(&self) -> BTreeMap<NodeId, TaskNode> {
        self.load_under(&self.keys)
    }

    #[instrument(skip(self))]
    pub fn clear(&self) -> bool {
        self.clear_under(&self.keys)
    }

    fn save_under(
        &self,
        keys: &StorageKeys,
        nodes: &BTreeMap<NodeId, TaskNode>,
        now: DateTime<Utc>,
    ) -> bool {
        let data = match encode_nodes(nodes) {
            Ok(data) => data,
            Err(err) => {
                warn!(error = %err, "failed to serialize nodes");
                return false;
            }
        };

        let mut saved_to: Vec<&str> = Vec::new();
        for (idx, backend) in self.backends.iter().enumerate() {
            if !backend.is_available() {
                warn!(backend = backend.name(), "storage backend unavailable");
                continue;
            }
            if let Some(limit) = backend.max_value_len()
                && data.len() >= limit
            {
                debug!(backend = backend.name(), size = data.len(), limit, "payload too large for backend; skipping");
                continue;
            }
            if let Err(err) = backend.set_item(&keys.nodes, &data) {
                warn!(backend = backend.name(), error = %err, "failed to write nodes");
                continue;
            }
            if idx == 0
                && let Err(err) = backend.set_item(&keys.last_save, &format_iso(&now))
            {
                warn!(backend = backend.name(), error = %err, "failed to write last-save timestamp");
            }
            saved_to.push(backend.name());
        }

        if saved_to.is_empty() {
            warn!("nodes were not saved to any backend");
            false
        } else {
            info!(count = nodes.len(), backends = %saved_to.join(", "), "saved nodes");
            true
        }
    }

    fn load_under(&self, keys: &StorageKeys) -> BTreeMap<NodeId, TaskNode> {
        for backend in &self.backends {
            if !backend.is_available() {
                warn!(backend = backend.name(), "storage backend unavailable");
                continue;
            }
            let raw = match backend.get_item(&keys.nodes) {
                Ok(Some(raw)) if !raw.trim().is_empty() => raw,
                Ok(_) => continue,
                Err(err) => {
                    warn!(backend = backend.name(), error = %err, "failed to read nodes");
                    continue;
                }
            };
            let value = match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(err) => {
                    warn!(backend = backend.name(), error = %err, "stored nodes are not valid json");
                    continue;
                }
            };
            let Some(decoded) = decode_collection(value) else {
                warn!(backend = backend.name(), "stored nodes have an unexpected shape");
                continue;
            };
            info!(
                backend = backend.name(),
                count = decoded.nodes.len(),
                skipped = decoded.skipped,
                "loaded nodes"
            );
            return decoded.nodes;
        }

        info!("no saved nodes found");
        BTreeMap::new()
    }

    fn clear_under(&self, keys: &StorageKeys) -> bool {
        let mut cleared = false;
        for backend in &self.backends {
            if !backend.is_available() {
                continue;
            }
            let nodes = backend.remove_item(&keys.nodes);
            let stamp = backend.remove_item(&keys.last_save);
            match nodes.and(stamp) {
                Ok(()) => cleared = true,
                Err(err) => warn!(backend = backend.name(), error = %err, "failed to clear"),
            }
        }
        info!(cleared, "cleared stored nodes");
        cleared
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        let primary = self.backends.first()?;
        if !primary.is_available() {
            return None;
        }
        match primary.get_item(&self.keys.last_save) {
            Ok(Some(raw)) => parse_iso_lenient(&raw),
            Ok(None) => None,
            Err(err) => {
                warn!(backend = primary.name(), error = %err, "failed to read last-save timestamp");
                None
            }
        }
    }

    pub fn saved_count(&self) -> usize {
        self.load().len()
    }

    pub fn has_saved_data(&self) -> bool {
        self.saved_count() > 0
    }

    pub fn stats(&self) -> StorageStats {
        let node_count = self.saved_count();
        StorageStats {
            has_data: node_count > 0,
            node_count,
            last_save: self.last_saved().map(|dt| format_iso(&dt)),
            backends: self
                .backends
                .iter()
                .map(|b| BackendStatus {
                    name: b.name().to_string(),
                    available: b.is_available(),
                })
                .collect(),
        }
    }

    /// Size of the stored collection, e.g. `1.5 KB`.
    pub fn data_size(&self) -> String {
        let bytes = encode_nodes(&self.load()).map(|s| s.len()).unwrap_or(0);
        readable_size(bytes)
    }

    /// Saves, reloads and removes a probe node under a separate namespace.
    #[instrument(skip(self))]
    pub fn self_test(&self, now: DateTime<Utc>) -> bool {
        let keys = StorageKeys::new(&format!("{}-selftest", self.keys.namespace));
        let node = probe_node(now);
        let mut nodes = BTreeMap::new();
        nodes.insert(node.id.clone(), node.clone());

        if !self.save_under(&keys, &nodes, now) {
            warn!("storage self-test failed: save");
            return false;
        }
        let loaded = self.load_under(&keys);
        self.clear_under(&keys);
        if loaded.get(&node.id) != Some(&node) {
            warn!("storage self-test failed: load");
            return false;
        }
        info!("storage self-test passed");
        true
    }

    pub fn export_to_file(
        &self,
        nodes: &BTreeMap<NodeId, TaskNode>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ExportFile> {
        envelope::export_document(nodes, now)
    }

    /// Parses an export file. The caller decides what to do with the nodes.
    pub fn import_from_file(
        &self,
        contents: Option<&str>,
    ) -> Result<BTreeMap<NodeId, TaskNode>, ImportError> {
        let contents = contents.ok_or(ImportError::MissingFile)?;
        envelope::parse_import(contents)
    }
}

fn probe_node(now: DateTime<Utc>) -> TaskNode {
    TaskNode {
        id: NodeId::from("test"),
        title: "Storage test".to_string(),
        description: "Storage round trip".to_string(),
        status: Status::Todo,
        priority: Default::default(),
        created_at: crate::datetime::truncate_millis(now),
        updated_at: crate::datetime::truncate_millis(now),
        due_date: None,
        tags: vec!["test".to_string()],
        parent_id: None,
        assignee: None,
        position: Position::new(0.0, 0.0),
        size: Size::new(100.0, 100.0),
        z_index: 1,
        is_editing: false,
        kind: Default::default(),
    }
}

pub fn readable_size(bytes: usize) -> String {
    let kilobytes = bytes as f64 / 1024.0;
    if kilobytes < 1024.0 {
        format!("{kilobytes:.1} KB")
    } else {
        format!("{:.2} MB", kilobytes / 1024.0)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    items: BTreeMap<String, String>,
    blocked: bool,
    quota: Option<usize>,
}

/// In-process backend. Clones share the same items, which lets a test keep a
/// handle after giving one to the adapter.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    name: String,
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Rc::new(RefCell::new(MemoryState::default())),
        }
    }

    /// Makes every access fail, like storage disabled by the browser.
    pub fn set_blocked(&self, blocked: bool) {
        self.state.borrow_mut().blocked = blocked;
    }

    /// Caps the total bytes held, keys included.
    pub fn set_quota(&self, quota: Option<usize>) {
        self.state.borrow_mut().quota = quota;
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.state.borrow().items.get(key).cloned()
    }

    pub fn insert_raw(&self, key: &str, value: &str) {
        self.state
            .borrow_mut()
            .items
            .insert(key.to_string(), value.to_string());
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.borrow().items.keys().cloned().collect()
    }

    fn check_blocked(&self) -> Result<(), StorageError> {
        if self.state.borrow().blocked {
            Err(StorageError::Unavailable(self.name.clone()))
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_blocked()?;
        Ok(self.raw(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_blocked()?;
        let mut state = self.state.borrow_mut();
        if let Some(limit) = state.quota {
            let used: usize = state
                .items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = used + key.len() + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded {
                    backend: self.name.clone(),
                    needed,
                    limit,
                });
            }
        }
        state.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.check_blocked()?;
        self.state.borrow_mut().items.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::store::{NodeDefaults, NodeStore};
    use crate::task::NewNode;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap()
    }

    fn sample_nodes() -> BTreeMap<NodeId, TaskNode> {
        let mut store = NodeStore::new(NodeDefaults::default());
        let a = store.create(NewNode::titled("Buy milk"));
        store.add_tag(&a, "home");
        store.create(NewNode {
            position: Some(Position::new(-40.5, 12.25)),
            ..NewNode::titled("Call mom")
        });
        store.nodes().clone()
    }

    #[test]
    fn save_then_load_round_trips() {
        let primary = MemoryBackend::new("primary");
        let adapter = StorageAdapter::new(StorageKeys::default()).with_backend(primary.clone());
        let nodes = sample_nodes();

        assert!(adapter.save(&nodes, now()));
        assert_eq!(adapter.load(), nodes);
        assert_eq!(adapter.last_saved(), Some(now()));
        assert!(primary.raw("todo-app-nodes-v1").is_some());
        assert!(!primary.keys().iter().any(|k| k == PROBE_KEY));
    }

    #[test]
    fn corrupt_blob_yields_empty_collection() {
        let primary = MemoryBackend::new("primary");
        primary.insert_raw("todo-app-nodes-v1", "{not json");
        let adapter = StorageAdapter::new(StorageKeys::default()).with_backend(primary);
        assert!(adapter.load().is_empty());
    }

    #[test]
    fn blocked_storage_degrades_without_errors() {
        let primary = MemoryBackend::new("primary");
        primary.set_blocked(true);
        let adapter = StorageAdapter::new(StorageKeys::default()).with_backend(primary);

        assert!(!adapter.save(&sample_nodes(), now()));
        assert!(adapter.load().is_empty());
        assert!(!adapter.clear());
        assert_eq!(adapter.last_saved(), None);
    }

    #[test]
    fn falls_back_to_mirror_when_primary_fails() {
        let primary = MemoryBackend::new("primary");
        let mirror = MemoryBackend::new("mirror");
        let adapter = StorageAdapter::new(StorageKeys::default())
            .with_backend(primary.clone())
            .with_backend(mirror.clone());
        let nodes = sample_nodes();

        assert!(adapter.save(&nodes, now()));
        assert!(mirror.raw("todo-app-nodes-v1").is_some());
        assert!(mirror.raw("todo-app-last-save").is_none());

        primary.set_blocked(true);
        assert!(adapter.save(&nodes, now()));
        assert_eq!(adapter.load(), nodes);
    }

    #[test]
    fn quota_exceeded_on_primary_still_saves_to_mirror() {
        let primary = MemoryBackend::new("primary");
        primary.set_quota(Some(200));
        let mirror = MemoryBackend::new("mirror");
        let adapter = StorageAdapter::new(StorageKeys::default())
            .with_backend(primary.clone())
            .with_backend(mirror);
        let nodes = sample_nodes();

        assert!(adapter.save(&nodes, now()));
        assert!(primary.raw("todo-app-nodes-v1").is_none());
        assert_eq!(adapter.load(), nodes);
    }

    #[test]
    fn size_limited_backend_is_skipped() {
        struct Tiny(MemoryBackend);
        impl StorageBackend for Tiny {
            fn name(&self) -> &str {
                self.0.name()
            }
            fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
                self.0.get_item(key)
            }
            fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
                self.0.set_item(key, value)
            }
            fn remove_item(&self, key: &str) -> Result<(), StorageError> {
                self.0.remove_item(key)
            }
            fn max_value_len(&self) -> Option<usize> {
                Some(10)
            }
        }

        let inner = MemoryBackend::new("tiny");
        let adapter = StorageAdapter::new(StorageKeys::default()).with_backend(Tiny(inner.clone()));
        assert!(!adapter.save(&sample_nodes(), now()));
        assert!(inner.raw("todo-app-nodes-v1").is_none());
    }

    #[test]
    fn clear_removes_both_keys() {
        let primary = MemoryBackend::new("primary");
        let adapter = StorageAdapter::new(StorageKeys::new("board")).with_backend(primary.clone());
        adapter.save(&sample_nodes(), now());
        assert!(adapter.clear());
        assert!(primary.keys().is_empty());
        assert!(!adapter.has_saved_data());
    }

    #[test]
    fn stats_report_counts_and_backends() {
        let primary = MemoryBackend::new("primary");
        let adapter = StorageAdapter::new(StorageKeys::default()).with_backend(primary);
        adapter.save(&sample_nodes(), now());
        let stats = adapter.stats();
        assert!(stats.has_data);
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.last_save.as_deref(), Some("2026-02-16T05:00:00.000Z"));
        assert_eq!(stats.backends.len(), 1);
        assert!(stats.backends[0].available);
        assert!(adapter.data_size().ends_with(" KB"));
    }

    #[test]
    fn self_test_leaves_real_data_alone() {
        let primary = MemoryBackend::new("primary");
        let adapter = StorageAdapter::new(StorageKeys::default()).with_backend(primary.clone());
        let nodes = sample_nodes();
        adapter.save(&nodes, now());

        assert!(adapter.self_test(now()));
        assert_eq!(adapter.load(), nodes);
        assert!(!primary.keys().iter().any(|k| k.contains("selftest")));
    }

    #[test]
    fn readable_size_switches_units() {
        assert_eq!(readable_size(512), "0.5 KB");
        assert_eq!(readable_size(3 * 1024 * 1024), "3.00 MB");
    }
}
