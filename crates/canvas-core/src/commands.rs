use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::store::NodeStore;
use crate::task::{NewNode, NodeId, NodePatch, Position, Priority, Size, Status, TaskNode};

/// Every mutation the store accepts. Controllers and hosts never touch node
/// fields directly; they build one of these and hand it to
/// [`Command::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    Create {
        #[serde(default)]
        attrs: NewNode,
    },
    CreateAt {
        position: Position,
        #[serde(default)]
        attrs: NewNode,
    },
    Duplicate {
        id: NodeId,
    },
    Update {
        id: NodeId,
        patch: NodePatch,
    },
    UpdatePartial {
        id: NodeId,
        patch: NodePatch,
    },
    Delete {
        id: NodeId,
    },
    DeleteSelected,
    Move {
        id: NodeId,
        position: Position,
    },
    Resize {
        id: NodeId,
        size: Size,
    },
    SetStatus {
        id: NodeId,
        status: Status,
    },
    SetPriority {
        id: NodeId,
        priority: Priority,
    },
    AddTag {
        id: NodeId,
        tag: String,
    },
    RemoveTag {
        id: NodeId,
        tag: String,
    },
    BringToFront {
        id: NodeId,
    },
    SendToBack {
        id: NodeId,
    },
    Select {
        id: NodeId,
    },
    Deselect {
        id: NodeId,
    },
    ToggleSelect {
        id: NodeId,
    },
    SelectOnly {
        id: NodeId,
    },
    ClearSelection,
    StartEditing {
        id: NodeId,
    },
    FinishEditing {
        id: NodeId,
    },
    ImportAll {
        nodes: BTreeMap<NodeId, TaskNode>,
    },
    ClearAll,
}

/// What a command did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Unknown id or nothing to change.
    Noop,
    Changed,
    Created(NodeId),
    Removed(usize),
}

impl Applied {
    pub fn changed(&self) -> bool {
        !matches!(self, Applied::Noop | Applied::Removed(0))
    }

    pub fn created_id(&self) -> Option<&NodeId> {
        match self {
            Applied::Created(id) => Some(id),
            _ => None,
        }
    }

    fn from_flag(changed: bool) -> Self {
        if changed { Applied::Changed } else { Applied::Noop }
    }
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Create { .. } => "create",
            Command::CreateAt { .. } => "createAt",
            Command::Duplicate { .. } => "duplicate",
            Command::Update { .. } => "update",
            Command::UpdatePartial { .. } => "updatePartial",
            Command::Delete { .. } => "delete",
            Command::DeleteSelected => "deleteSelected",
            Command::Move { .. } => "move",
            Command::Resize { .. } => "resize",
            Command::SetStatus { .. } => "setStatus",
            Command::SetPriority { .. } => "setPriority",
            Command::AddTag { .. } => "addTag",
            Command::RemoveTag { .. } => "removeTag",
            Command::BringToFront { .. } => "bringToFront",
            Command::SendToBack { .. } => "sendToBack",
            Command::Select { .. } => "select",
            Command::Deselect { .. } => "deselect",
            Command::ToggleSelect { .. } => "toggleSelect",
            Command::SelectOnly { .. } => "selectOnly",
            Command::ClearSelection => "clearSelection",
            Command::StartEditing { .. } => "startEditing",
            Command::FinishEditing { .. } => "finishEditing",
            Command::ImportAll { .. } => "importAll",
            Command::ClearAll => "clearAll",
        }
    }

    #[instrument(skip(self, store), fields(command = self.name()))]
    pub fn apply(self, store: &mut NodeStore) -> Applied {
        let applied = match self {
            Command::Create { attrs } => Applied::Created(store.create(attrs)),
            Command::CreateAt { position, attrs } => {
                Applied::Created(store.create_at_position(position, attrs))
            }
            Command::Duplicate { id } => match store.duplicate(&id) {
                Some(copy) => Applied::Created(copy),
                None => Applied::Noop,
            },
            Command::Update { id, patch } => Applied::from_flag(store.update(&id, patch)),
            Command::UpdatePartial { id, patch } => {
                Applied::from_flag(store.update_partial(&id, patch))
            }
            Command::Delete { id } => {
                if store.delete(&id) {
                    Applied::Removed(1)
                } else {
                    Applied::Noop
                }
            }
            Command::DeleteSelected => Applied::Removed(store.delete_selected()),
            Command::Move { id, position } => Applied::from_flag(store.move_node(&id, position)),
            Command::Resize { id, size } => Applied::from_flag(store.resize(&id, size)),
            Command::SetStatus { id, status } => Applied::from_flag(store.set_status(&id, status)),
            Command::SetPriority { id, priority } => {
                Applied::from_flag(store.set_priority(&id, priority))
            }
            Command::AddTag { id, tag } => Applied::from_flag(store.add_tag(&id, &tag)),
            Command::RemoveTag { id, tag } => Applied::from_flag(store.remove_tag(&id, &tag)),
            Command::BringToFront { id } => Applied::from_flag(store.bring_to_front(&id)),
            Command::SendToBack { id } => Applied::from_flag(store.send_to_back(&id)),
            Command::Select { id } => Applied::from_flag(store.select(&id)),
            Command::Deselect { id } => Applied::from_flag(store.deselect(&id)),
            Command::ToggleSelect { id } => Applied::from_flag(store.toggle_select(&id)),
            Command::SelectOnly { id } => Applied::from_flag(store.select_only(&id)),
            Command::ClearSelection => Applied::from_flag(store.clear_selection()),
            Command::StartEditing { id } => Applied::from_flag(store.start_editing(&id)),
            Command::FinishEditing { id } => Applied::from_flag(store.finish_editing(&id)),
            Command::ImportAll { nodes } => {
                store.import_all(nodes);
                Applied::Changed
            }
            Command::ClearAll => {
                store.clear_all();
                Applied::Changed
            }
        };
        debug!(?applied, "command applied");
        applied
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::NodeDefaults;

    #[test]
    fn commands_decode_from_host_json() {
        let command: Command = serde_json::from_value(json!({
            "type": "createAt",
            "position": {"x": 100.0, "y": 100.0},
            "attrs": {"title": "Buy milk"}
        }))
        .expect("decode");
        assert_eq!(
            command,
            Command::CreateAt {
                position: Position::new(100.0, 100.0),
                attrs: NewNode::titled("Buy milk"),
            }
        );

        let command: Command =
            serde_json::from_value(json!({"type": "deleteSelected"})).expect("decode");
        assert_eq!(command, Command::DeleteSelected);

        let command: Command = serde_json::from_value(json!({
            "type": "setStatus",
            "id": "abc",
            "status": "in-progress"
        }))
        .expect("decode");
        assert_eq!(command.name(), "setStatus");
    }

    #[test]
    fn apply_reports_created_ids_and_noops() {
        let mut store = NodeStore::new(NodeDefaults::default());
        let applied = Command::CreateAt {
            position: Position::new(100.0, 100.0),
            attrs: NewNode::titled("Buy milk"),
        }
        .apply(&mut store);
        let id = applied.created_id().expect("created").clone();
        assert_eq!(store.editing_id(), Some(&id));
        assert_eq!(store.selected_ids(), &[id.clone()]);

        let missing = NodeId::from("missing");
        assert_eq!(Command::Delete { id: missing.clone() }.apply(&mut store), Applied::Noop);
        assert_eq!(Command::BringToFront { id: missing }.apply(&mut store), Applied::Noop);
        assert_eq!(store.len(), 1);

        assert_eq!(Command::DeleteSelected.apply(&mut store), Applied::Removed(1));
        assert!(store.is_empty());
        assert!(!Command::DeleteSelected.apply(&mut store).changed());
    }
}
