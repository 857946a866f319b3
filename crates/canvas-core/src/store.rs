use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, trace};

use crate::datetime::now_millis;
use crate::task::{
    NewNode, NodeId, NodeKind, NodePatch, Position, Priority, Size, Status, TaskNode, dedup_tags,
};

/// How soon a mutation wants to reach storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SaveUrgency {
    /// Wait for the auto-save quiet period.
    Debounced,
    /// Save on the next turn of the event loop.
    Deferred,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeDefaults {
    pub position: Position,
    pub size: Size,
    pub quick_size: Size,
    pub title: String,
    pub duplicate_offset: f64,
}

impl Default for NodeDefaults {
    fn default() -> Self {
        Self {
            position: Position::new(100.0, 100.0),
            size: Size::new(200.0, 150.0),
            quick_size: Size::new(280.0, 180.0),
            title: "New task".to_string(),
            duplicate_offset: 20.0,
        }
    }
}

/// Normalized collection of task nodes plus selection and edit state.
///
/// Every operation that names an id is a no-op when the id is unknown.
/// Operations that change persisted fields record a [`SaveUrgency`] that the
/// owner drains with [`NodeStore::take_pending_save`].
#[derive(Debug, Clone, Default)]
pub struct NodeStore {
    nodes: BTreeMap<NodeId, TaskNode>,
    selected: Vec<NodeId>,
    editing: Option<NodeId>,
    defaults: NodeDefaults,
    pending_save: Option<SaveUrgency>,
    revision: u64,
}

impl NodeStore {
    pub fn new(defaults: NodeDefaults) -> Self {
        Self {
            defaults,
            ..Self::default()
        }
    }

    /// Seeds the store from storage without marking anything dirty.
    pub fn with_nodes(defaults: NodeDefaults, nodes: BTreeMap<NodeId, TaskNode>) -> Self {
        let mut store = Self::new(defaults);
        store.nodes = normalize_keys(nodes);
        store
    }

    pub fn defaults(&self) -> &NodeDefaults {
        &self.defaults
    }

    pub fn nodes(&self) -> &BTreeMap<NodeId, TaskNode> {
        &self.nodes
    }

    pub fn get(&self, id: &NodeId) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn selected_ids(&self) -> &[NodeId] {
        &self.selected
    }

    pub fn editing_id(&self) -> Option<&NodeId> {
        self.editing.as_ref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Nodes in paint order: lowest `zIndex` first, ties by creation time.
    pub fn all(&self) -> Vec<&TaskNode> {
        let mut out: Vec<&TaskNode> = self.nodes.values().collect();
        out.sort_by(|a, b| {
            a.z_index
                .cmp(&b.z_index)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        out
    }

    pub fn selected_nodes(&self) -> Vec<&TaskNode> {
        self.selected
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    pub fn editing_node(&self) -> Option<&TaskNode> {
        self.editing.as_ref().and_then(|id| self.nodes.get(id))
    }

    pub fn by_status(&self, status: Status) -> Vec<&TaskNode> {
        self.all()
            .into_iter()
            .filter(|node| node.status == status)
            .collect()
    }

    pub fn by_priority(&self, priority: Priority) -> Vec<&TaskNode> {
        self.all()
            .into_iter()
            .filter(|node| node.priority == priority)
            .collect()
    }

    pub fn is_selected(&self, id: &NodeId) -> bool {
        self.selected.contains(id)
    }

    /// Topmost node under a canvas point.
    pub fn node_at(&self, point: Position) -> Option<&TaskNode> {
        self.nodes
            .values()
            .filter(|node| node.contains(point))
            .max_by(|a, b| {
                a.z_index
                    .cmp(&b.z_index)
                    .then(a.updated_at.cmp(&b.updated_at))
            })
    }

    /// Drains the urgency accumulated since the last call.
    pub fn take_pending_save(&mut self) -> Option<SaveUrgency> {
        self.pending_save.take()
    }

    #[instrument(skip(self, attrs))]
    pub fn create(&mut self, attrs: NewNode) -> NodeId {
        let id = self.fresh_id();
        let now = now_millis();
        let node = TaskNode {
            id: id.clone(),
            title: attrs.title.unwrap_or_else(|| self.defaults.title.clone()),
            description: attrs.description.unwrap_or_default(),
            status: attrs.status.unwrap_or_default(),
            priority: attrs.priority.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            due_date: attrs.due_date,
            tags: dedup_tags(attrs.tags.unwrap_or_default()),
            parent_id: attrs.parent_id,
            assignee: attrs.assignee,
            position: attrs.position.unwrap_or(self.defaults.position),
            size: attrs.size.unwrap_or(self.defaults.size),
            z_index: 1,
            is_editing: false,
            kind: attrs.kind.unwrap_or_default(),
        };
        self.nodes.insert(id.clone(), node);
        self.mark(SaveUrgency::Deferred);
        info!(id = %id, count = self.nodes.len(), "created node");
        id
    }

    /// Creates a node and puts it straight into inline edit mode as the only
    /// selected node.
    #[instrument(skip(self, overrides))]
    pub fn create_at_position(&mut self, position: Position, overrides: NewNode) -> NodeId {
        let attrs = NewNode {
            position: Some(position),
            size: Some(overrides.size.unwrap_or(self.defaults.quick_size)),
            kind: Some(overrides.kind.unwrap_or(NodeKind::Default)),
            ..overrides
        };
        let id = self.create(attrs);

        self.clear_editing_flag();
        if let Some(node) = self.nodes.get_mut(&id) {
            node.is_editing = true;
        }
        self.selected = vec![id.clone()];
        self.editing = Some(id.clone());
        id
    }

    #[instrument(skip(self))]
    pub fn duplicate(&mut self, id: &NodeId) -> Option<NodeId> {
        let original = self.nodes.get(id)?.clone();
        let new_id = self.fresh_id();
        let now = now_millis();
        let offset = self.defaults.duplicate_offset;

        let copy = TaskNode {
            id: new_id.clone(),
            title: format!("{} (copy)", original.title),
            position: original.position.offset(offset, offset),
            created_at: now,
            updated_at: now,
            is_editing: false,
            ..original
        };
        self.nodes.insert(new_id.clone(), copy);

        self.clear_editing_flag();
        self.editing = None;
        self.selected = vec![new_id.clone()];
        self.mark(SaveUrgency::Deferred);
        info!(source = %id, id = %new_id, "duplicated node");
        Some(new_id)
    }

    /// Commits an edit: merges the patch and leaves edit mode for this node.
    #[instrument(skip(self, patch))]
    pub fn update(&mut self, id: &NodeId, patch: NodePatch) -> bool {
        if !self.apply(id, SaveUrgency::Deferred, |node| {
            patch.apply_to(node);
            node.is_editing = false;
        }) {
            return false;
        }
        if self.editing.as_ref() == Some(id) {
            self.editing = None;
        }
        true
    }

    /// Merges fields without touching edit mode.
    pub fn update_partial(&mut self, id: &NodeId, patch: NodePatch) -> bool {
        self.apply(id, SaveUrgency::Deferred, |node| patch.apply_to(node))
    }

    #[instrument(skip(self))]
    pub fn delete(&mut self, id: &NodeId) -> bool {
        if self.nodes.remove(id).is_none() {
            trace!(id = %id, "delete ignored for unknown node");
            return false;
        }
        self.selected.retain(|selected| selected != id);
        if self.editing.as_ref() == Some(id) {
            self.editing = None;
        }
        self.mark(SaveUrgency::Deferred);
        info!(id = %id, count = self.nodes.len(), "deleted node");
        true
    }

    #[instrument(skip(self))]
    pub fn delete_selected(&mut self) -> usize {
        let selected = std::mem::take(&mut self.selected);
        let mut removed = 0;
        for id in &selected {
            if self.nodes.remove(id).is_some() {
                removed += 1;
            }
        }
        if let Some(editing) = &self.editing
            && selected.contains(editing)
        {
            self.editing = None;
        }
        if removed > 0 {
            self.mark(SaveUrgency::Deferred);
        }
        info!(removed, count = self.nodes.len(), "deleted selected nodes");
        removed
    }

    pub fn move_node(&mut self, id: &NodeId, position: Position) -> bool {
        self.apply(id, SaveUrgency::Deferred, |node| node.position = position)
    }

    pub fn resize(&mut self, id: &NodeId, size: Size) -> bool {
        self.apply(id, SaveUrgency::Debounced, |node| node.size = size)
    }

    pub fn set_status(&mut self, id: &NodeId, status: Status) -> bool {
        self.apply(id, SaveUrgency::Debounced, |node| node.status = status)
    }

    pub fn set_priority(&mut self, id: &NodeId, priority: Priority) -> bool {
        self.apply(id, SaveUrgency::Debounced, |node| node.priority = priority)
    }

    pub fn add_tag(&mut self, id: &NodeId, tag: &str) -> bool {
        match self.nodes.get(id) {
            Some(node) if !node.has_tag(tag) => {}
            _ => return false,
        }
        self.apply(id, SaveUrgency::Debounced, |node| node.tags.push(tag.to_string()))
    }

    pub fn remove_tag(&mut self, id: &NodeId, tag: &str) -> bool {
        self.apply(id, SaveUrgency::Debounced, |node| node.tags.retain(|t| t != tag))
    }

    pub fn bring_to_front(&mut self, id: &NodeId) -> bool {
        let max = self.nodes.values().map(|n| n.z_index).fold(1, i64::max);
        self.apply(id, SaveUrgency::Debounced, |node| {
            node.z_index = max.saturating_add(1)
        })
    }

    pub fn send_to_back(&mut self, id: &NodeId) -> bool {
        let min = self.nodes.values().map(|n| n.z_index).fold(1, i64::min);
        self.apply(id, SaveUrgency::Debounced, |node| {
            node.z_index = min.saturating_sub(1).max(1)
        })
    }

    pub fn select(&mut self, id: &NodeId) -> bool {
        if !self.nodes.contains_key(id) || self.selected.contains(id) {
            return false;
        }
        self.selected.push(id.clone());
        self.revision += 1;
        true
    }

    pub fn deselect(&mut self, id: &NodeId) -> bool {
        let before = self.selected.len();
        self.selected.retain(|selected| selected != id);
        let changed = self.selected.len() != before;
        if changed {
            self.revision += 1;
        }
        changed
    }

    pub fn toggle_select(&mut self, id: &NodeId) -> bool {
        if self.selected.contains(id) {
            self.deselect(id)
        } else {
            self.select(id)
        }
    }

    pub fn select_only(&mut self, id: &NodeId) -> bool {
        if !self.nodes.contains_key(id) {
            return false;
        }
        self.selected = vec![id.clone()];
        self.revision += 1;
        true
    }

    /// Click selection: additive clicks toggle membership, plain clicks
    /// replace the selection unless the node is already part of it.
    pub fn select_with_modifier(&mut self, id: &NodeId, additive: bool) -> bool {
        if additive {
            self.toggle_select(id)
        } else if self.selected.contains(id) {
            false
        } else {
            self.select_only(id)
        }
    }

    pub fn clear_selection(&mut self) -> bool {
        if self.selected.is_empty() {
            return false;
        }
        self.selected.clear();
        self.revision += 1;
        true
    }

    pub fn start_editing(&mut self, id: &NodeId) -> bool {
        if !self.nodes.contains_key(id) {
            return false;
        }
        self.clear_editing_flag();
        if let Some(node) = self.nodes.get_mut(id) {
            node.is_editing = true;
        }
        self.editing = Some(id.clone());
        self.revision += 1;
        debug!(id = %id, "editing started");
        true
    }

    pub fn finish_editing(&mut self, id: &NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        node.is_editing = false;
        if self.editing.as_ref() == Some(id) {
            self.editing = None;
        }
        self.revision += 1;
        debug!(id = %id, "editing finished");
        true
    }

    /// Replaces the whole collection and resets selection and editing.
    #[instrument(skip(self, nodes), fields(count = nodes.len()))]
    pub fn import_all(&mut self, nodes: BTreeMap<NodeId, TaskNode>) {
        self.nodes = normalize_keys(nodes);
        for node in self.nodes.values_mut() {
            node.is_editing = false;
        }
        self.selected.clear();
        self.editing = None;
        self.mark(SaveUrgency::Deferred);
        info!(count = self.nodes.len(), "imported nodes");
    }

    #[instrument(skip(self))]
    pub fn clear_all(&mut self) {
        let before = self.nodes.len();
        self.nodes.clear();
        self.selected.clear();
        self.editing = None;
        self.mark(SaveUrgency::Deferred);
        info!(removed = before, "cleared all nodes");
    }

    fn apply<F>(&mut self, id: &NodeId, urgency: SaveUrgency, mutate: F) -> bool
    where
        F: FnOnce(&mut TaskNode),
    {
        let Some(node) = self.nodes.get_mut(id) else {
            trace!(id = %id, "mutation ignored for unknown node");
            return false;
        };
        let previous = node.updated_at;
        mutate(node);
        node.updated_at = next_stamp(previous);
        self.mark(urgency);
        true
    }

    fn mark(&mut self, urgency: SaveUrgency) {
        self.revision += 1;
        self.pending_save = Some(match self.pending_save {
            Some(existing) => existing.max(urgency),
            None => urgency,
        });
    }

    fn clear_editing_flag(&mut self) {
        if let Some(previous) = self.editing.take()
            && let Some(node) = self.nodes.get_mut(&previous)
        {
            node.is_editing = false;
        }
    }

    fn fresh_id(&self) -> NodeId {
        loop {
            let id = NodeId::generate();
            if !self.nodes.contains_key(&id) {
                return id;
            }
        }
    }
}

/// Current time, nudged forward so it always lands after `previous`.
fn next_stamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = now_millis();
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}

/// The record id is authoritative; map keys are rebuilt from it.
fn normalize_keys(nodes: BTreeMap<NodeId, TaskNode>) -> BTreeMap<NodeId, TaskNode> {
    nodes
        .into_values()
        .map(|mut node| {
            node.tags = dedup_tags(std::mem::take(&mut node.tags));
            (node.id.clone(), node)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> NodeStore {
        NodeStore::new(NodeDefaults::default())
    }

    #[test]
    fn create_fills_defaults() {
        let mut store = store();
        let id = store.create(NewNode::titled("Write report"));
        let node = store.get(&id).expect("node exists");
        assert_eq!(node.status, Status::Todo);
        assert_eq!(node.priority, Priority::Medium);
        assert_eq!(node.size, Size::new(200.0, 150.0));
        assert_eq!(node.position, Position::new(100.0, 100.0));
        assert_eq!(node.z_index, 1);
        assert_eq!(node.created_at, node.updated_at);
        assert!(store.selected_ids().is_empty());
        assert_eq!(store.take_pending_save(), Some(SaveUrgency::Deferred));
        assert_eq!(store.take_pending_save(), None);
    }

    #[test]
    fn create_at_position_selects_and_edits() {
        let mut store = store();
        let first = store.create_at_position(Position::new(0.0, 0.0), NewNode::default());
        let id = store.create_at_position(Position::new(100.0, 100.0), NewNode::titled("Buy milk"));

        assert_eq!(store.selected_ids(), &[id.clone()]);
        assert_eq!(store.editing_id(), Some(&id));
        let node = store.get(&id).expect("node exists");
        assert!(node.is_editing);
        assert_eq!(node.size, Size::new(280.0, 180.0));
        assert!(!store.get(&first).expect("first").is_editing);
    }

    #[test]
    fn duplicate_offsets_and_selects_copy() {
        let mut store = store();
        let id = store.create(NewNode {
            position: Some(Position::new(5.0, 7.0)),
            tags: Some(vec!["x".to_string()]),
            ..NewNode::titled("Plan")
        });
        store.start_editing(&id);

        let copy_id = store.duplicate(&id).expect("duplicated");
        assert_ne!(copy_id, id);
        let copy = store.get(&copy_id).expect("copy");
        assert_eq!(copy.title, "Plan (copy)");
        assert_eq!(copy.position, Position::new(25.0, 27.0));
        assert_eq!(copy.tags, vec!["x".to_string()]);
        assert!(!copy.is_editing);
        assert_eq!(store.selected_ids(), &[copy_id]);
        assert_eq!(store.editing_id(), None);

        assert_eq!(store.duplicate(&NodeId::from("missing")), None);
    }

    #[test]
    fn update_refreshes_timestamp_and_ends_editing() {
        let mut store = store();
        let id = store.create(NewNode::titled("a"));
        store.start_editing(&id);
        let before = store.get(&id).expect("node").updated_at;

        assert!(store.update(
            &id,
            NodePatch {
                title: Some("b".to_string()),
                ..NodePatch::default()
            }
        ));
        let node = store.get(&id).expect("node");
        assert_eq!(node.title, "b");
        assert!(node.updated_at > before);
        assert!(!node.is_editing);
        assert_eq!(store.editing_id(), None);
    }

    #[test]
    fn update_partial_keeps_edit_mode() {
        let mut store = store();
        let id = store.create(NewNode::titled("a"));
        store.start_editing(&id);
        store.update_partial(
            &id,
            NodePatch {
                description: Some("more".to_string()),
                ..NodePatch::default()
            },
        );
        assert_eq!(store.editing_id(), Some(&id));
    }

    #[test]
    fn delete_purges_selection_and_editing() {
        let mut store = store();
        let id = store.create_at_position(Position::new(1.0, 1.0), NewNode::default());
        assert!(store.delete(&id));
        assert!(!store.contains(&id));
        assert!(!store.is_selected(&id));
        assert_eq!(store.editing_id(), None);
    }

    #[test]
    fn delete_unknown_id_is_a_noop() {
        let mut store = store();
        store.create(NewNode::titled("keep"));
        store.take_pending_save();
        let revision = store.revision();

        assert!(!store.delete(&NodeId::from("ghost")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.revision(), revision);
        assert_eq!(store.take_pending_save(), None);
    }

    #[test]
    fn delete_selected_removes_only_selection() {
        let mut store = store();
        let a = store.create(NewNode::titled("a"));
        let b = store.create(NewNode::titled("b"));
        let c = store.create(NewNode::titled("c"));
        store.select(&a);
        store.select(&b);
        store.start_editing(&b);

        assert_eq!(store.delete_selected(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&c));
        assert!(store.selected_ids().is_empty());
        assert_eq!(store.editing_id(), None);
    }

    #[test]
    fn bring_to_front_with_equal_z_indexes() {
        let mut store = store();
        let a = store.create(NewNode::titled("A"));
        let b = store.create(NewNode::titled("B"));
        store.bring_to_front(&a);
        assert_eq!(store.get(&a).expect("a").z_index, 2);
        assert_eq!(store.get(&b).expect("b").z_index, 1);

        store.bring_to_front(&b);
        assert_eq!(store.get(&b).expect("b").z_index, 3);
    }

    #[test]
    fn send_to_back_never_drops_below_one() {
        let mut store = store();
        let a = store.create(NewNode::titled("A"));
        let b = store.create(NewNode::titled("B"));
        store.bring_to_front(&a);
        store.bring_to_front(&a);
        store.send_to_back(&a);
        assert_eq!(store.get(&a).expect("a").z_index, 1);
        assert_eq!(store.get(&b).expect("b").z_index, 1);
    }

    #[test]
    fn z_order_on_unknown_id_in_empty_store() {
        let mut store = store();
        assert!(!store.bring_to_front(&NodeId::from("x")));
        assert!(!store.send_to_back(&NodeId::from("x")));
    }

    #[test]
    fn z_order_saturates_at_extreme_indexes() {
        let mut seed = store();
        let top = seed.create(NewNode::titled("top"));
        let bottom = seed.create(NewNode::titled("bottom"));
        let mut nodes = seed.nodes().clone();
        nodes.get_mut(&top).expect("top").z_index = i64::MAX;
        nodes.get_mut(&bottom).expect("bottom").z_index = i64::MIN;

        let mut store = NodeStore::with_nodes(NodeDefaults::default(), nodes);
        let fresh = store.create(NewNode::titled("fresh"));
        assert!(store.bring_to_front(&fresh));
        assert_eq!(store.get(&fresh).expect("fresh").z_index, i64::MAX);

        assert!(store.send_to_back(&fresh));
        assert_eq!(store.get(&fresh).expect("fresh").z_index, 1);
    }

    #[test]
    fn select_is_idempotent() {
        let mut store = store();
        let id = store.create(NewNode::titled("a"));
        assert!(store.select(&id));
        assert!(!store.select(&id));
        assert_eq!(store.selected_ids(), &[id.clone()]);
        assert!(store.deselect(&id));
        assert!(!store.deselect(&id));
        assert!(!store.select(&NodeId::from("ghost")));
    }

    #[test]
    fn modifier_selection_toggles_and_replaces() {
        let mut store = store();
        let a = store.create(NewNode::titled("a"));
        let b = store.create(NewNode::titled("b"));
        store.select_with_modifier(&a, false);
        store.select_with_modifier(&b, true);
        assert_eq!(store.selected_ids(), &[a.clone(), b.clone()]);

        store.select_with_modifier(&a, false);
        assert_eq!(store.selected_ids(), &[a.clone(), b.clone()]);

        store.select_with_modifier(&a, true);
        assert_eq!(store.selected_ids(), &[b.clone()]);

        store.select_with_modifier(&a, false);
        assert_eq!(store.selected_ids(), &[a]);
    }

    #[test]
    fn tags_are_unique() {
        let mut store = store();
        let id = store.create(NewNode::titled("a"));
        assert!(store.add_tag(&id, "home"));
        assert!(!store.add_tag(&id, "home"));
        assert!(store.add_tag(&id, "work"));
        assert_eq!(
            store.get(&id).expect("node").tags,
            vec!["home".to_string(), "work".to_string()]
        );
        store.remove_tag(&id, "home");
        assert_eq!(store.get(&id).expect("node").tags, vec!["work".to_string()]);
    }

    #[test]
    fn selection_and_editing_do_not_request_saves() {
        let mut store = store();
        let id = store.create(NewNode::titled("a"));
        store.take_pending_save();
        store.select(&id);
        store.start_editing(&id);
        store.finish_editing(&id);
        assert_eq!(store.take_pending_save(), None);

        store.set_status(&id, Status::Done);
        assert_eq!(store.take_pending_save(), Some(SaveUrgency::Debounced));
        store.set_status(&id, Status::Blocked);
        store.move_node(&id, Position::new(3.0, 3.0));
        assert_eq!(store.take_pending_save(), Some(SaveUrgency::Deferred));
    }

    #[test]
    fn import_all_resets_transient_state() {
        let mut store = store();
        let id = store.create_at_position(Position::new(1.0, 1.0), NewNode::default());
        let mut replacement = BTreeMap::new();
        let mut node = store.get(&id).expect("node").clone();
        node.id = NodeId::from("other");
        replacement.insert(NodeId::from("stale-key"), node);

        store.import_all(replacement);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&NodeId::from("other")));
        assert!(store.selected_ids().is_empty());
        assert_eq!(store.editing_id(), None);
        assert!(!store.get(&NodeId::from("other")).expect("node").is_editing);

        store.clear_all();
        assert!(store.is_empty());
    }

    #[test]
    fn import_all_collapses_duplicate_tags() {
        let mut store = store();
        let id = store.create(NewNode::titled("a"));
        let mut node = store.get(&id).expect("node").clone();
        node.tags = vec!["x".to_string(), "x".to_string()];
        store.import_all(BTreeMap::from([(id.clone(), node)]));
        assert_eq!(store.get(&id).expect("node").tags, vec!["x".to_string()]);

        store.remove_tag(&id, "x");
        assert!(!store.get(&id).expect("node").has_tag("x"));
    }

    #[test]
    fn node_at_prefers_topmost() {
        let mut store = store();
        let low = store.create(NewNode {
            position: Some(Position::new(0.0, 0.0)),
            ..NewNode::titled("low")
        });
        let high = store.create(NewNode {
            position: Some(Position::new(50.0, 50.0)),
            ..NewNode::titled("high")
        });
        store.bring_to_front(&high);

        let hit = store.node_at(Position::new(60.0, 60.0)).expect("hit");
        assert_eq!(hit.id, high);
        let hit = store.node_at(Position::new(10.0, 10.0)).expect("hit");
        assert_eq!(hit.id, low);
        assert!(store.node_at(Position::new(-5.0, -5.0)).is_none());
    }
}
