use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::commands::Command;
use crate::task::{
    NewNode, NodeKind, Position, Priority, Status, dedup_tags, patch_date, patch_field,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("a task needs a title")]
    EmptyTitle,
    #[error("the form is not open")]
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormData {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: Status,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub assignee: Option<String>,
    #[serde(rename = "type")]
    pub kind: NodeKind,
}

/// Partial form edit; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "patch_date")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "patch_field")]
    pub assignee: Option<Option<String>>,
    #[serde(default, rename = "type")]
    pub kind: Option<NodeKind>,
}

/// The task creation form: a full dialog and a quick inline variant.
#[derive(Debug, Clone, Default)]
pub struct TaskForm {
    is_open: bool,
    is_quick_open: bool,
    data: FormData,
    position: Option<Position>,
    quick_title: String,
}

impl TaskForm {
    pub fn new(quick_title: &str) -> Self {
        Self {
            quick_title: quick_title.to_string(),
            ..Self::default()
        }
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn is_quick_open(&self) -> bool {
        self.is_quick_open
    }

    pub fn data(&self) -> &FormData {
        &self.data
    }

    pub fn position(&self) -> Option<Position> {
        self.position
    }

    pub fn open(&mut self, position: Option<Position>) {
        debug!(?position, "form opened");
        self.is_open = true;
        self.is_quick_open = false;
        self.position = position;
        self.data = FormData::default();
    }

    pub fn open_quick(&mut self, position: Position) {
        debug!(x = position.x, y = position.y, "quick form opened");
        self.is_open = false;
        self.is_quick_open = true;
        self.position = Some(position);
        self.data = FormData {
            title: self.quick_title.clone(),
            ..FormData::default()
        };
    }

    pub fn close(&mut self) {
        self.is_open = false;
        self.is_quick_open = false;
        self.position = None;
        self.data = FormData::default();
    }

    pub fn update(&mut self, patch: FormPatch) {
        let data = &mut self.data;
        if let Some(title) = patch.title {
            data.title = title;
        }
        if let Some(description) = patch.description {
            data.description = description;
        }
        if let Some(priority) = patch.priority {
            data.priority = priority;
        }
        if let Some(status) = patch.status {
            data.status = status;
        }
        if let Some(tags) = patch.tags {
            data.tags = tags;
        }
        if let Some(due_date) = patch.due_date {
            data.due_date = due_date;
        }
        if let Some(assignee) = patch.assignee {
            data.assignee = assignee;
        }
        if let Some(kind) = patch.kind {
            data.kind = kind;
        }
    }

    /// Clears the fields but keeps the form open.
    pub fn reset(&mut self) {
        self.data = FormData::default();
    }

    /// Turns the form into a create command and closes it. A blank title
    /// leaves the form open.
    pub fn submit(&mut self) -> Result<Command, FormError> {
        if !self.is_open && !self.is_quick_open {
            return Err(FormError::Closed);
        }
        let title = self.data.title.trim();
        if title.is_empty() {
            return Err(FormError::EmptyTitle);
        }

        let data = &self.data;
        let tags = dedup_tags(
            data.tags
                .iter()
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
        );
        let attrs = NewNode {
            title: Some(title.to_string()),
            description: Some(data.description.trim().to_string()),
            status: Some(data.status),
            priority: Some(data.priority),
            due_date: data.due_date,
            tags: Some(tags),
            parent_id: None,
            assignee: data
                .assignee
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
            position: None,
            size: None,
            kind: Some(data.kind),
        };

        let command = match (self.is_quick_open, self.position) {
            (true, Some(position)) => Command::CreateAt { position, attrs },
            (_, position) => Command::Create {
                attrs: NewNode { position, ..attrs },
            },
        };
        self.close();
        Ok(command)
    }
}
