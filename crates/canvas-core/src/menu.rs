use serde::Serialize;
use tracing::{debug, warn};

use crate::commands::Command;
use crate::input::Key;
use crate::task::{NewNode, NodeId, Position, Priority, Status};

const ITEM_HEIGHT: f64 = 32.0;
const DIVIDER_HEIGHT: f64 = 9.0;
const MENU_WIDTH: f64 = 200.0;
const MENU_PADDING: f64 = 8.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: String,
    pub label: String,
    pub icon: Option<String>,
    pub shortcut: Option<String>,
    pub disabled: bool,
    #[serde(skip)]
    pub action: Command,
}

impl MenuItem {
    pub fn new(id: &str, label: &str, action: Command) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            icon: None,
            shortcut: None,
            disabled: false,
            action,
        }
    }

    pub fn icon(mut self, icon: &str) -> Self {
        self.icon = Some(icon.to_string());
        self
    }

    pub fn shortcut(mut self, shortcut: &str) -> Self {
        self.shortcut = Some(shortcut.to_string());
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MenuEntry {
    Item(MenuItem),
    Divider,
}

/// What the menu was opened on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MenuContext {
    Node { id: NodeId },
    Canvas { position: Position },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MenuBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl MenuBounds {
    pub fn contains(&self, point: Position) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleMenu {
    pub position: Position,
    pub entries: Vec<MenuEntry>,
    pub context: MenuContext,
    pub bounds: MenuBounds,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum MenuState {
    #[default]
    Hidden,
    Visible(VisibleMenu),
}

/// Result of activating an item.
#[derive(Debug)]
pub enum Activation {
    /// The action ran; carries its outcome.
    Ran(anyhow::Result<()>),
    /// Divider, disabled or unknown item.
    Skipped,
}

/// Single context menu. Positions are screen coordinates.
#[derive(Debug, Clone, Default)]
pub struct ContextMenu {
    state: MenuState,
}

impl ContextMenu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &MenuState {
        &self.state
    }

    pub fn visible(&self) -> Option<&VisibleMenu> {
        match &self.state {
            MenuState::Visible(menu) => Some(menu),
            MenuState::Hidden => None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible().is_some()
    }

    /// Shows the menu, replacing whatever was open.
    pub fn open(&mut self, position: Position, entries: Vec<MenuEntry>, context: MenuContext) {
        debug!(x = position.x, y = position.y, items = entries.len(), "context menu opened");
        let bounds = estimate_bounds(position, &entries);
        self.state = MenuState::Visible(VisibleMenu {
            position,
            entries,
            context,
            bounds,
        });
    }

    pub fn close(&mut self) {
        if self.is_visible() {
            debug!("context menu closed");
        }
        self.state = MenuState::Hidden;
    }

    /// Returns whether the key closed the menu.
    pub fn handle_key(&mut self, key: &Key) -> bool {
        if *key == Key::Escape && self.is_visible() {
            self.close();
            return true;
        }
        false
    }

    /// Closes the menu when the pointer lands outside it. Returns whether the
    /// menu was closed.
    pub fn pointer_down(&mut self, point: Position) -> bool {
        match &self.state {
            MenuState::Visible(menu) if !menu.bounds.contains(point) => {
                self.close();
                true
            }
            _ => false,
        }
    }

    /// Runs the item's action and closes the menu whether or not the action
    /// succeeds.
    pub fn activate<F>(&mut self, item_id: &str, run: F) -> Activation
    where
        F: FnOnce(Command) -> anyhow::Result<()>,
    {
        let MenuState::Visible(menu) = std::mem::take(&mut self.state) else {
            return Activation::Skipped;
        };
        let item = menu.entries.into_iter().find_map(|entry| match entry {
            MenuEntry::Item(item) if item.id == item_id => Some(item),
            _ => None,
        });
        match item {
            Some(item) if !item.disabled => {
                debug!(item = item_id, "context menu item activated");
                let result = run(item.action);
                if let Err(err) = &result {
                    warn!(item = item_id, error = %err, "context menu action failed");
                }
                Activation::Ran(result)
            }
            _ => Activation::Skipped,
        }
    }

    pub fn set_items(&mut self, entries: Vec<MenuEntry>) {
        if let MenuState::Visible(menu) = &mut self.state {
            menu.bounds = estimate_bounds(menu.position, &entries);
            menu.entries = entries;
        }
    }

    pub fn update_position(&mut self, position: Position) {
        if let MenuState::Visible(menu) = &mut self.state {
            menu.bounds.x = position.x;
            menu.bounds.y = position.y;
            menu.position = position;
        }
    }

    /// Replaces the estimated bounds with the rendered ones.
    pub fn set_bounds(&mut self, bounds: MenuBounds) {
        if let MenuState::Visible(menu) = &mut self.state {
            menu.bounds = bounds;
        }
    }
}

fn estimate_bounds(position: Position, entries: &[MenuEntry]) -> MenuBounds {
    let height = entries
        .iter()
        .map(|entry| match entry {
            MenuEntry::Item(_) => ITEM_HEIGHT,
            MenuEntry::Divider => DIVIDER_HEIGHT,
        })
        .sum::<f64>()
        + MENU_PADDING * 2.0;
    MenuBounds {
        x: position.x,
        y: position.y,
        width: MENU_WIDTH,
        height,
    }
}

pub fn node_menu(id: &NodeId) -> Vec<MenuEntry> {
    let mut entries = vec![
        MenuEntry::Item(
            MenuItem::new("edit", "Edit", Command::StartEditing { id: id.clone() })
                .icon("edit")
                .shortcut("Enter"),
        ),
        MenuEntry::Item(
            MenuItem::new("duplicate", "Duplicate", Command::Duplicate { id: id.clone() })
                .icon("copy"),
        ),
        MenuEntry::Divider,
    ];
    for status in [Status::Todo, Status::InProgress, Status::Done] {
        entries.push(MenuEntry::Item(MenuItem::new(
            &format!("status-{}", status.as_str()),
            &format!("Mark as {}", status.label()),
            Command::SetStatus {
                id: id.clone(),
                status,
            },
        )));
    }
    entries.push(MenuEntry::Divider);
    for priority in Priority::ALL {
        entries.push(MenuEntry::Item(MenuItem::new(
            &format!("priority-{}", priority.as_str()),
            &format!("{} priority", priority.label()),
            Command::SetPriority {
                id: id.clone(),
                priority,
            },
        )));
    }
    entries.extend([
        MenuEntry::Divider,
        MenuEntry::Item(MenuItem::new(
            "bring-to-front",
            "Bring to front",
            Command::BringToFront { id: id.clone() },
        )),
        MenuEntry::Item(MenuItem::new(
            "send-to-back",
            "Send to back",
            Command::SendToBack { id: id.clone() },
        )),
        MenuEntry::Divider,
        MenuEntry::Item(
            MenuItem::new("delete", "Delete", Command::Delete { id: id.clone() })
                .icon("trash")
                .shortcut("Del"),
        ),
    ]);
    entries
}

/// `position` is in canvas coordinates; that is where the task lands.
pub fn canvas_menu(position: Position) -> Vec<MenuEntry> {
    vec![MenuEntry::Item(
        MenuItem::new(
            "create-here",
            "New task here",
            Command::CreateAt {
                position,
                attrs: NewNode::default(),
            },
        )
        .icon("plus"),
    )]
}
