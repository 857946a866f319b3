use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::autosave::{AutoSaver, SaveOutcome};
use crate::commands::{Applied, Command};
use crate::config::Settings;
use crate::drag::{DragController, DragState, DragSummary};
use crate::envelope::{ExportFile, ImportError};
use crate::form::{FormData, FormError, TaskForm};
use crate::input::{InputEvent, Key, Modifiers, PointerButton};
use crate::menu::{self, Activation, ContextMenu, MenuContext, VisibleMenu};
use crate::storage::{StorageAdapter, StorageStats};
use crate::store::NodeStore;
use crate::task::{NodeId, Position, TaskNode};
use crate::viewport::Viewport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A non-fatal message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputOutcome {
    Ignored,
    Handled,
    DragEnded(DragSummary),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSnapshot<'a> {
    pub is_open: bool,
    pub is_quick_open: bool,
    pub data: &'a FormData,
    pub position: Option<Position>,
}

/// Everything a presentation layer needs to draw one frame.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot<'a> {
    pub nodes: Vec<&'a TaskNode>,
    pub selected_node_ids: &'a [NodeId],
    pub editing_node_id: Option<&'a NodeId>,
    pub dragging_node_id: Option<&'a NodeId>,
    pub viewport: &'a Viewport,
    pub context_menu: Option<&'a VisibleMenu>,
    pub form: FormSnapshot<'a>,
}

#[derive(Debug, Clone, Copy)]
struct PanGesture {
    pointer_id: i32,
    last: Position,
}

/// Application root: owns the store and every controller, and is the only
/// place commands are applied.
pub struct CanvasSession {
    settings: Settings,
    store: NodeStore,
    adapter: StorageAdapter,
    saver: AutoSaver,
    drag: DragController,
    menu: ContextMenu,
    form: TaskForm,
    viewport: Viewport,
    pan: Option<PanGesture>,
    notices: Vec<Notice>,
    save_failing: bool,
}

impl CanvasSession {
    /// Builds a session and seeds the store from `adapter`.
    #[instrument(skip(settings, adapter))]
    pub fn open(settings: Settings, adapter: StorageAdapter) -> Self {
        let nodes = adapter.load();
        let mut saver = AutoSaver::new(settings.autosave_delay, settings.autosave_enabled);
        if adapter.has_saved_data() {
            saver.mark_written(&nodes);
        }

        let mut notices = Vec::new();
        let stats = adapter.stats();
        if !stats.backends.iter().any(|backend| backend.available) {
            warn!("no storage backend is available; changes will not persist");
            notices.push(Notice::new(
                NoticeLevel::Warning,
                "Storage is unavailable. Changes will not be saved; use export to keep a copy.",
            ));
        }

        info!(count = nodes.len(), backends = ?adapter.backend_names(), "session opened");
        Self {
            store: NodeStore::with_nodes(settings.node_defaults.clone(), nodes),
            saver,
            drag: DragController::new(),
            menu: ContextMenu::new(),
            form: TaskForm::new(&settings.node_defaults.title),
            viewport: Viewport::new(settings.min_zoom, settings.max_zoom, settings.zoom_step),
            pan: None,
            notices,
            save_failing: false,
            adapter,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub fn adapter(&self) -> &StorageAdapter {
        &self.adapter
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn menu(&self) -> &ContextMenu {
        &self.menu
    }

    pub fn form(&self) -> &TaskForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut TaskForm {
        &mut self.form
    }

    pub fn drag(&self) -> &DragController {
        &self.drag
    }

    /// For registering drop zones.
    pub fn drag_mut(&mut self) -> &mut DragController {
        &mut self.drag
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            nodes: self.store.all(),
            selected_node_ids: self.store.selected_ids(),
            editing_node_id: self.store.editing_id(),
            dragging_node_id: self.drag.dragged_node(),
            viewport: &self.viewport,
            context_menu: self.menu.visible(),
            form: FormSnapshot {
                is_open: self.form.is_open(),
                is_quick_open: self.form.is_quick_open(),
                data: self.form.data(),
                position: self.form.position(),
            },
        }
    }

    pub fn dispatch(&mut self, command: Command, now: DateTime<Utc>) -> Applied {
        apply_command(&mut self.store, &mut self.saver, command, now)
    }

    /// Routes one input event. The menu only sees events while it is
    /// visible and the drag controller only while a drag is active.
    pub fn handle_input(&mut self, event: InputEvent, now: DateTime<Utc>) -> InputOutcome {
        match event {
            InputEvent::PointerDown {
                pointer_id,
                position,
                button,
                modifiers,
            } => self.pointer_down(pointer_id, position, button, modifiers, now),
            InputEvent::PointerMove {
                pointer_id,
                position,
            } => self.pointer_move(pointer_id, position, now),
            InputEvent::PointerUp { pointer_id, .. } => self.pointer_up(pointer_id),
            InputEvent::PointerCancel { pointer_id } => self.pointer_cancel(pointer_id),
            InputEvent::Wheel { position, delta_y } => {
                self.viewport.wheel(delta_y, position);
                InputOutcome::Handled
            }
            InputEvent::KeyDown { key, .. } => self.key_down(key, now),
        }
    }

    fn pointer_down(
        &mut self,
        pointer_id: i32,
        position: Position,
        button: PointerButton,
        modifiers: Modifiers,
        now: DateTime<Utc>,
    ) -> InputOutcome {
        if self.menu.is_visible() {
            // clicks inside the menu are activations, reported separately
            self.menu.pointer_down(position);
            return InputOutcome::Handled;
        }

        let canvas = self.viewport.screen_to_canvas(position);
        let hit = self.store.node_at(canvas).map(|node| (node.id.clone(), node.position));

        match button {
            PointerButton::Secondary => {
                match hit {
                    Some((id, _)) => self.menu.open(
                        position,
                        menu::node_menu(&id),
                        MenuContext::Node { id },
                    ),
                    None => self.menu.open(
                        position,
                        menu::canvas_menu(canvas),
                        MenuContext::Canvas { position: canvas },
                    ),
                }
                InputOutcome::Handled
            }
            PointerButton::Middle => {
                self.viewport.set_panning(true);
                self.pan = Some(PanGesture {
                    pointer_id,
                    last: position,
                });
                InputOutcome::Handled
            }
            PointerButton::Primary => match hit {
                Some((id, origin)) => {
                    self.store.select_with_modifier(&id, modifiers.additive());
                    if self.store.editing_id() != Some(&id) {
                        self.drag.begin(id, pointer_id, canvas, origin);
                    }
                    InputOutcome::Handled
                }
                None => {
                    if let Some(editing) = self.store.editing_id().cloned() {
                        self.dispatch(Command::FinishEditing { id: editing }, now);
                    }
                    self.store.clear_selection();
                    InputOutcome::Handled
                }
            },
        }
    }

    fn pointer_move(
        &mut self,
        pointer_id: i32,
        position: Position,
        now: DateTime<Utc>,
    ) -> InputOutcome {
        if self.drag.is_dragging() {
            let canvas = self.viewport.screen_to_canvas(position);
            if self.drag.pointer_move(pointer_id, canvas, &mut self.store) {
                self.schedule_pending(now);
                return InputOutcome::Handled;
            }
            return InputOutcome::Ignored;
        }
        match &mut self.pan {
            Some(pan) if pan.pointer_id == pointer_id => {
                let delta = position.minus(pan.last);
                pan.last = position;
                self.viewport.pan_by(delta.x, delta.y);
                InputOutcome::Handled
            }
            _ => InputOutcome::Ignored,
        }
    }

    fn pointer_up(&mut self, pointer_id: i32) -> InputOutcome {
        if let Some(summary) = self.drag.end(pointer_id) {
            return InputOutcome::DragEnded(summary);
        }
        self.end_pan(pointer_id)
    }

    fn pointer_cancel(&mut self, pointer_id: i32) -> InputOutcome {
        let owns_drag = matches!(
            self.drag.state(),
            DragState::Dragging(drag) if drag.pointer_id == pointer_id
        );
        if owns_drag && let Some(summary) = self.drag.cancel() {
            return InputOutcome::DragEnded(summary);
        }
        self.end_pan(pointer_id)
    }

    fn end_pan(&mut self, pointer_id: i32) -> InputOutcome {
        match self.pan {
            Some(pan) if pan.pointer_id == pointer_id => {
                self.pan = None;
                self.viewport.set_panning(false);
                InputOutcome::Handled
            }
            _ => InputOutcome::Ignored,
        }
    }

    fn key_down(&mut self, key: Key, now: DateTime<Utc>) -> InputOutcome {
        if self.menu.is_visible() && self.menu.handle_key(&key) {
            return InputOutcome::Handled;
        }
        match key {
            Key::Escape => {
                if let Some(summary) = self.drag.cancel() {
                    return InputOutcome::DragEnded(summary);
                }
                if self.form.is_open() || self.form.is_quick_open() {
                    self.form.close();
                    return InputOutcome::Handled;
                }
                match self.store.editing_id().cloned() {
                    Some(id) => {
                        self.dispatch(Command::FinishEditing { id }, now);
                        InputOutcome::Handled
                    }
                    None if !self.store.selected_ids().is_empty() => {
                        self.store.clear_selection();
                        InputOutcome::Handled
                    }
                    None => InputOutcome::Ignored,
                }
            }
            Key::Delete | Key::Backspace => {
                if self.store.editing_id().is_some() || self.store.selected_ids().is_empty() {
                    return InputOutcome::Ignored;
                }
                self.dispatch(Command::DeleteSelected, now);
                InputOutcome::Handled
            }
            Key::Enter => match self.store.selected_ids() {
                [only] if self.store.editing_id().is_none() => {
                    let id = only.clone();
                    self.dispatch(Command::StartEditing { id }, now);
                    InputOutcome::Handled
                }
                _ => InputOutcome::Ignored,
            },
            Key::Other(_) => InputOutcome::Ignored,
        }
    }

    /// Runs a context menu item. The menu closes even when the action fails;
    /// failures become notices.
    pub fn activate_menu_item(&mut self, item_id: &str, now: DateTime<Utc>) -> Activation {
        let store = &mut self.store;
        let saver = &mut self.saver;
        let activation = self.menu.activate(item_id, |command| {
            let needs_target = command_target(&command).cloned();
            match apply_command(store, saver, command, now) {
                Applied::Noop if needs_target.is_some() => Err(anyhow::anyhow!(
                    "task {} no longer exists",
                    needs_target.map(|id| id.to_string()).unwrap_or_default()
                )),
                _ => Ok(()),
            }
        });
        if let Activation::Ran(Err(err)) = &activation {
            self.notices
                .push(Notice::new(NoticeLevel::Error, format!("Action failed: {err}")));
        }
        activation
    }

    pub fn open_form(&mut self, position: Option<Position>) {
        self.menu.close();
        self.form.open(position);
    }

    /// `screen` is where the user clicked.
    pub fn open_quick_form(&mut self, screen: Position) {
        self.menu.close();
        self.form.open_quick(self.viewport.screen_to_canvas(screen));
    }

    pub fn submit_form(&mut self, now: DateTime<Utc>) -> Result<NodeId, FormError> {
        let command = self.form.submit()?;
        let applied = self.dispatch(command, now);
        applied.created_id().cloned().ok_or(FormError::Closed)
    }

    /// Saves if the auto-save deadline has passed. Hosts call this from their
    /// timer.
    pub fn tick(&mut self, now: DateTime<Utc>) -> SaveOutcome {
        let outcome = self.saver.flush_if_due(&self.adapter, self.store.nodes(), now);
        self.note_save(outcome);
        outcome
    }

    /// Saves immediately; the unload hook.
    pub fn flush(&mut self, now: DateTime<Utc>) -> SaveOutcome {
        let outcome = self.saver.flush(&self.adapter, self.store.nodes(), now);
        self.note_save(outcome);
        outcome
    }

    pub fn millis_until_save(&self, now: DateTime<Utc>) -> Option<u64> {
        self.saver.millis_until_due(now)
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.adapter.last_saved()
    }

    pub fn storage_stats(&self) -> StorageStats {
        self.adapter.stats()
    }

    pub fn export_file(&mut self, now: DateTime<Utc>) -> anyhow::Result<ExportFile> {
        match self.adapter.export_to_file(self.store.nodes(), now) {
            Ok(file) => {
                self.notices.push(Notice::new(
                    NoticeLevel::Success,
                    format!("Exported {} tasks to {}", self.store.len(), file.file_name),
                ));
                Ok(file)
            }
            Err(err) => {
                self.notices
                    .push(Notice::new(NoticeLevel::Error, format!("Export failed: {err}")));
                Err(err)
            }
        }
    }

    /// Replaces every node with the file's contents. On any error the store
    /// is left as it was.
    #[instrument(skip(self, contents))]
    pub fn import_file(
        &mut self,
        contents: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<usize, ImportError> {
        let nodes = match self.adapter.import_from_file(contents) {
            Ok(nodes) => nodes,
            Err(err) => {
                warn!(error = %err, "import rejected");
                self.notices
                    .push(Notice::new(NoticeLevel::Error, format!("Import failed: {err}")));
                return Err(err);
            }
        };
        let count = nodes.len();
        self.drag.cancel();
        self.menu.close();
        self.dispatch(Command::ImportAll { nodes }, now);
        self.notices.push(Notice::new(
            NoticeLevel::Success,
            format!("Imported {count} tasks"),
        ));
        Ok(count)
    }

    /// Removes every node and the stored copy.
    pub fn clear_all(&mut self, now: DateTime<Utc>) -> bool {
        self.drag.cancel();
        self.menu.close();
        self.dispatch(Command::ClearAll, now);
        self.saver.mark_written(&BTreeMap::new());
        self.adapter.clear()
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn schedule_pending(&mut self, now: DateTime<Utc>) {
        if let Some(urgency) = self.store.take_pending_save() {
            self.saver.schedule(urgency, now);
        }
    }

    fn note_save(&mut self, outcome: SaveOutcome) {
        match outcome {
            SaveOutcome::Failed if !self.save_failing => {
                self.save_failing = true;
                self.notices.push(Notice::new(
                    NoticeLevel::Warning,
                    "Changes could not be saved. Export a backup to avoid losing work.",
                ));
            }
            SaveOutcome::Saved if self.save_failing => {
                self.save_failing = false;
                self.notices
                    .push(Notice::new(NoticeLevel::Info, "Saving works again."));
            }
            _ => {}
        }
    }
}

fn apply_command(
    store: &mut NodeStore,
    saver: &mut AutoSaver,
    command: Command,
    now: DateTime<Utc>,
) -> Applied {
    let applied = command.apply(store);
    if let Some(urgency) = store.take_pending_save() {
        saver.schedule(urgency, now);
    }
    debug!(revision = store.revision(), "store revision");
    applied
}

fn command_target(command: &Command) -> Option<&NodeId> {
    match command {
        Command::Duplicate { id }
        | Command::Update { id, .. }
        | Command::UpdatePartial { id, .. }
        | Command::Delete { id }
        | Command::Move { id, .. }
        | Command::Resize { id, .. }
        | Command::SetStatus { id, .. }
        | Command::SetPriority { id, .. }
        | Command::BringToFront { id }
        | Command::SendToBack { id }
        | Command::StartEditing { id } => Some(id),
        _ => None,
    }
}
