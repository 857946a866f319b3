use serde::{Deserialize, Serialize};

use crate::task::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub meta: bool,
}

impl Modifiers {
    /// Whether a click should add to the selection instead of replacing it.
    pub fn additive(self) -> bool {
        self.ctrl || self.meta || self.shift
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    Escape,
    Delete,
    Backspace,
    Enter,
    Other(String),
}

impl Key {
    /// Maps a DOM `KeyboardEvent.key` value.
    pub fn from_dom(key: &str) -> Self {
        match key {
            "Escape" | "Esc" => Key::Escape,
            "Delete" => Key::Delete,
            "Backspace" => Key::Backspace,
            "Enter" => Key::Enter,
            other => Key::Other(other.to_string()),
        }
    }
}

/// Pointer and keyboard input in screen coordinates. Touch contacts and mouse
/// share the pointer variants; `pointer_id` tells them apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    PointerDown {
        pointer_id: i32,
        position: Position,
        button: PointerButton,
        modifiers: Modifiers,
    },
    PointerMove {
        pointer_id: i32,
        position: Position,
    },
    PointerUp {
        pointer_id: i32,
        position: Position,
    },
    PointerCancel {
        pointer_id: i32,
    },
    Wheel {
        position: Position,
        delta_y: f64,
    },
    KeyDown {
        key: Key,
        modifiers: Modifiers,
    },
}
