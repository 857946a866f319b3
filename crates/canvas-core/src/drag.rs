use tracing::{debug, trace};

use crate::store::NodeStore;
use crate::task::{NodeId, Position};

#[derive(Debug, Clone, PartialEq)]
pub struct DropZone {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DropZone {
    pub fn contains(&self, point: Position) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveDrag {
    pub node_id: NodeId,
    pub pointer_id: i32,
    pub start: Position,
    pub current: Position,
    /// Pointer position relative to the node's top-left corner.
    pub offset: Position,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(ActiveDrag),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragSummary {
    pub node_id: NodeId,
    pub start: Position,
    pub end: Position,
    pub delta: Position,
    pub drop_zone: Option<String>,
    pub cancelled: bool,
}

/// Tracks one pointer drag at a time and streams moves into the store. All
/// positions are canvas coordinates.
#[derive(Debug, Clone, Default)]
pub struct DragController {
    state: DragState,
    drop_zones: Vec<DropZone>,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    pub fn dragged_node(&self) -> Option<&NodeId> {
        match &self.state {
            DragState::Dragging(drag) => Some(&drag.node_id),
            DragState::Idle => None,
        }
    }

    /// Starts dragging `node_id`. Ignored while another pointer already
    /// drives a drag, which keeps extra touch points out of it.
    pub fn begin(
        &mut self,
        node_id: NodeId,
        pointer_id: i32,
        pointer: Position,
        node_origin: Position,
    ) -> bool {
        if self.is_dragging() {
            trace!(pointer_id, "ignoring extra pointer during drag");
            return false;
        }
        debug!(node = %node_id, pointer_id, "drag started");
        self.state = DragState::Dragging(ActiveDrag {
            node_id,
            pointer_id,
            start: pointer,
            current: pointer,
            offset: pointer.minus(node_origin),
        });
        true
    }

    /// Applies a pointer move immediately. Returns whether the store moved a
    /// node.
    pub fn pointer_move(
        &mut self,
        pointer_id: i32,
        pointer: Position,
        store: &mut NodeStore,
    ) -> bool {
        let DragState::Dragging(drag) = &mut self.state else {
            return false;
        };
        if drag.pointer_id != pointer_id {
            return false;
        }
        drag.current = pointer;
        let target = pointer.minus(drag.offset);
        store.move_node(&drag.node_id, target)
    }

    pub fn end(&mut self, pointer_id: i32) -> Option<DragSummary> {
        match &self.state {
            DragState::Dragging(drag) if drag.pointer_id == pointer_id => self.finish(false),
            _ => None,
        }
    }

    pub fn cancel(&mut self) -> Option<DragSummary> {
        self.finish(true)
    }

    fn finish(&mut self, cancelled: bool) -> Option<DragSummary> {
        let DragState::Dragging(drag) = std::mem::take(&mut self.state) else {
            return None;
        };
        let drop_zone = self.drop_zone_at(drag.current).map(|zone| zone.id.clone());
        debug!(node = %drag.node_id, cancelled, ?drop_zone, "drag ended");
        Some(DragSummary {
            node_id: drag.node_id,
            start: drag.start,
            end: drag.current,
            delta: drag.current.minus(drag.start),
            drop_zone,
            cancelled,
        })
    }

    pub fn add_drop_zone(&mut self, zone: DropZone) {
        self.drop_zones.push(zone);
    }

    pub fn remove_drop_zone(&mut self, id: &str) {
        self.drop_zones.retain(|zone| zone.id != id);
    }

    pub fn clear_drop_zones(&mut self) {
        self.drop_zones.clear();
    }

    pub fn drop_zones(&self) -> &[DropZone] {
        &self.drop_zones
    }

    pub fn drop_zone_at(&self, point: Position) -> Option<&DropZone> {
        self.drop_zones.iter().find(|zone| zone.contains(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NodeDefaults;
    use crate::task::NewNode;

    fn store_with_node() -> (NodeStore, NodeId) {
        let mut store = NodeStore::new(NodeDefaults::default());
        let id = store.create(NewNode {
            position: Some(Position::new(100.0, 100.0)),
            ..NewNode::titled("drag me")
        });
        (store, id)
    }

    #[test]
    fn moves_track_pointer_minus_offset() {
        let (mut store, id) = store_with_node();
        let mut drag = DragController::new();
        assert!(drag.begin(id.clone(), 1, Position::new(130.0, 110.0), Position::new(100.0, 100.0)));

        assert!(drag.pointer_move(1, Position::new(200.0, 300.0), &mut store));
        assert_eq!(store.get(&id).expect("node").position, Position::new(170.0, 290.0));

        assert!(drag.pointer_move(1, Position::new(31.0, 11.0), &mut store));
        assert_eq!(store.get(&id).expect("node").position, Position::new(1.0, 1.0));

        let summary = drag.end(1).expect("summary");
        assert_eq!(summary.delta, Position::new(-99.0, -99.0));
        assert!(!summary.cancelled);
        assert!(!drag.is_dragging());
    }

    #[test]
    fn second_touch_point_is_ignored() {
        let (mut store, id) = store_with_node();
        let mut drag = DragController::new();
        drag.begin(id.clone(), 1, Position::new(100.0, 100.0), Position::new(100.0, 100.0));
        assert!(!drag.begin(id.clone(), 2, Position::new(0.0, 0.0), Position::new(100.0, 100.0)));
        assert!(!drag.pointer_move(2, Position::new(500.0, 500.0), &mut store));
        assert_eq!(store.get(&id).expect("node").position, Position::new(100.0, 100.0));
        assert!(drag.end(2).is_none());
        assert!(drag.is_dragging());
    }

    #[test]
    fn moves_while_idle_do_nothing() {
        let (mut store, _) = store_with_node();
        let mut drag = DragController::new();
        assert!(!drag.pointer_move(1, Position::new(5.0, 5.0), &mut store));
        assert!(drag.cancel().is_none());
    }

    #[test]
    fn drag_of_deleted_node_is_harmless() {
        let (mut store, id) = store_with_node();
        let mut drag = DragController::new();
        drag.begin(id.clone(), 1, Position::new(100.0, 100.0), Position::new(100.0, 100.0));
        store.delete(&id);
        assert!(!drag.pointer_move(1, Position::new(120.0, 120.0), &mut store));
        assert!(drag.cancel().expect("summary").cancelled);
    }

    #[test]
    fn reports_drop_zone_under_pointer() {
        let (mut store, id) = store_with_node();
        let mut drag = DragController::new();
        drag.add_drop_zone(DropZone {
            id: "done".to_string(),
            x: 500.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
        });
        drag.begin(id, 7, Position::new(100.0, 100.0), Position::new(100.0, 100.0));
        drag.pointer_move(7, Position::new(550.0, 50.0), &mut store);
        let summary = drag.end(7).expect("summary");
        assert_eq!(summary.drop_zone.as_deref(), Some("done"));

        drag.remove_drop_zone("done");
        assert!(drag.drop_zones().is_empty());
    }
}
