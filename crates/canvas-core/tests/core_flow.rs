use canvas_core::commands::{Applied, Command};
use canvas_core::store::{NodeDefaults, NodeStore};
use canvas_core::task::{NewNode, NodeId, NodePatch, Position, Priority, Status};

fn store() -> NodeStore {
    NodeStore::new(NodeDefaults::default())
}

fn create(store: &mut NodeStore, title: &str) -> NodeId {
    Command::Create {
        attrs: NewNode::titled(title),
    }
    .apply(store)
    .created_id()
    .cloned()
    .expect("created")
}

#[test]
fn create_at_position_selects_and_edits_new_node() {
    let mut store = store();
    let id = Command::CreateAt {
        position: Position::new(100.0, 100.0),
        attrs: NewNode::titled("Buy milk"),
    }
    .apply(&mut store)
    .created_id()
    .cloned()
    .expect("created");

    assert_eq!(store.len(), 1);
    assert_eq!(store.selected_ids(), &[id.clone()]);
    assert_eq!(store.editing_id(), Some(&id));
    let node = store.get(&id).expect("node");
    assert_eq!(node.status, Status::Todo);
    assert_eq!(node.priority, Priority::Medium);
    assert_eq!(node.title, "Buy milk");
    assert!(node.is_editing);
}

#[test]
fn delete_purges_every_reference() {
    let mut store = store();
    let a = create(&mut store, "a");
    let b = create(&mut store, "b");
    store.select(&a);
    store.select(&b);
    store.start_editing(&a);

    assert_eq!(Command::Delete { id: a.clone() }.apply(&mut store), Applied::Removed(1));
    assert!(!store.contains(&a));
    assert_eq!(store.selected_ids(), &[b.clone()]);
    assert_eq!(store.editing_id(), None);

    let before = store.nodes().clone();
    assert_eq!(Command::Delete { id: a }.apply(&mut store), Applied::Noop);
    assert_eq!(store.nodes(), &before);
}

#[test]
fn updates_always_move_the_timestamp_forward() {
    let mut store = store();
    let id = create(&mut store, "a");
    for round in 0..20 {
        let before = store.get(&id).expect("node").updated_at;
        Command::UpdatePartial {
            id: id.clone(),
            patch: NodePatch {
                title: Some(format!("a{round}")),
                ..NodePatch::default()
            },
        }
        .apply(&mut store);
        assert!(store.get(&id).expect("node").updated_at > before);
    }
}

#[test]
fn bring_to_front_puts_node_on_top() {
    let mut store = store();
    let a = create(&mut store, "a");
    let b = create(&mut store, "b");
    Command::BringToFront { id: a.clone() }.apply(&mut store);
    assert_eq!(store.get(&a).expect("a").z_index, 2);
    assert_eq!(store.get(&b).expect("b").z_index, 1);

    let c = create(&mut store, "c");
    Command::BringToFront { id: c.clone() }.apply(&mut store);
    let top = store.get(&c).expect("c").z_index;
    assert!(store.nodes().values().all(|node| node.z_index <= top));
    assert_eq!(store.all().last().map(|node| &node.id), Some(&c));
}

#[test]
fn duplicate_offsets_and_renames() {
    let mut store = store();
    let original = create(&mut store, "Plan trip");
    let copy = Command::Duplicate {
        id: original.clone(),
    }
    .apply(&mut store)
    .created_id()
    .cloned()
    .expect("copy");

    assert_ne!(copy, original);
    let source = store.get(&original).expect("original");
    let dup = store.get(&copy).expect("copy");
    assert_eq!(dup.position, source.position.offset(20.0, 20.0));
    assert_eq!(dup.title, "Plan trip (copy)");
    assert_eq!(store.selected_ids(), &[copy]);
}

#[test]
fn select_is_idempotent_and_toggle_flips() {
    let mut store = store();
    let id = create(&mut store, "a");
    Command::Select { id: id.clone() }.apply(&mut store);
    Command::Select { id: id.clone() }.apply(&mut store);
    assert_eq!(store.selected_ids(), &[id.clone()]);

    Command::ToggleSelect { id: id.clone() }.apply(&mut store);
    assert!(store.selected_ids().is_empty());
    Command::ToggleSelect { id: id.clone() }.apply(&mut store);
    assert!(store.is_selected(&id));
}
