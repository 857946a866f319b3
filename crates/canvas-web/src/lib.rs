//! Browser host for the task canvas. A presentation layer constructs a
//! [`CanvasHandle`], forwards DOM input to it, and redraws from
//! [`CanvasHandle::snapshot`].

mod files;
mod web_storage;

use std::cell::RefCell;
use std::rc::Rc;

use canvas_core::commands::Command;
use canvas_core::config::{
  Config,
  Settings
};
use canvas_core::drag::DropZone;
use canvas_core::form::FormPatch;
use canvas_core::input::{
  InputEvent,
  Key,
  Modifiers,
  PointerButton
};
use canvas_core::menu::Activation;
use canvas_core::session::{
  CanvasSession,
  InputOutcome
};
use canvas_core::storage::StorageAdapter;
use canvas_core::task::Position;
use chrono::Utc;
use gloo::events::EventListener;
use gloo::timers::callback::Timeout;
use serde::Serialize;
use tracing::{
  debug,
  info,
  warn
};
use wasm_bindgen::prelude::*;

pub use files::{
  download,
  read_text
};
pub use web_storage::{
  CookieBackend,
  WebStorageBackend
};

const CONFIG_KEY: &str = "todo-app-config";

#[wasm_bindgen(start)]
pub fn start() {
  console_error_panic_hook::set_once();
  wasm_tracing::set_as_global_default();
  info!("task canvas loaded");
}

type Shared<T> = Rc<RefCell<T>>;

#[wasm_bindgen]
pub struct CanvasHandle {
  session: Shared<CanvasSession>,
  timer:   Shared<Option<Timeout>>,
  _unload: Option<EventListener>
}

#[wasm_bindgen]
impl CanvasHandle {
  #[wasm_bindgen(constructor)]
  pub fn new() -> Result<CanvasHandle, JsValue> {
    let settings = load_settings()
      .map_err(|err| {
        JsValue::from_str(&format!(
          "{err:#}"
        ))
      })?;

    let keys = settings.storage_keys.clone();
    let mut adapter =
      StorageAdapter::new(keys.clone());
    adapter.push_backend(
      WebStorageBackend::local()
    );
    adapter.push_backend(
      WebStorageBackend::session()
    );
    adapter.push_backend(CookieBackend::new(
      &keys,
      &settings.cookie_key,
      settings.cookie_max_bytes,
      settings.cookie_expiry_days
    ));

    let session = Rc::new(RefCell::new(
      CanvasSession::open(
        settings, adapter
      )
    ));

    let unload = web_sys::window().map(
      |window| {
        let session = session.clone();
        EventListener::new(
          &window,
          "beforeunload",
          move |_| {
            if let Ok(mut session) =
              session.try_borrow_mut()
            {
              let outcome =
                session.flush(Utc::now());
              debug!(?outcome, "flushed on unload");
            }
          }
        )
      }
    );

    Ok(CanvasHandle {
      session,
      timer: Rc::new(RefCell::new(None)),
      _unload: unload
    })
  }

  /// Applies a command given as `{ type: "...", ... }`. Returns the new
  /// node id for create and duplicate commands, otherwise `null`.
  pub fn dispatch(
    &self,
    command: JsValue
  ) -> Result<JsValue, JsValue> {
    let command: Command =
      serde_wasm_bindgen::from_value(
        command
      )?;
    let applied = self
      .session
      .borrow_mut()
      .dispatch(command, Utc::now());
    self.arm_timer();
    Ok(
      applied
        .created_id()
        .map(|id| {
          JsValue::from_str(id.as_str())
        })
        .unwrap_or(JsValue::NULL)
    )
  }

  /// `button` follows `PointerEvent.button`.
  #[allow(clippy::too_many_arguments)]
  pub fn pointer_down(
    &self,
    pointer_id: i32,
    x: f64,
    y: f64,
    button: i16,
    shift: bool,
    ctrl: bool,
    meta: bool
  ) -> bool {
    let button = match button {
      | 1 => PointerButton::Middle,
      | 2 => PointerButton::Secondary,
      | _ => PointerButton::Primary
    };
    self.input(InputEvent::PointerDown {
      pointer_id,
      position: Position::new(x, y),
      button,
      modifiers: Modifiers {
        shift,
        ctrl,
        meta
      }
    })
  }

  pub fn pointer_move(
    &self,
    pointer_id: i32,
    x: f64,
    y: f64
  ) -> bool {
    self.input(InputEvent::PointerMove {
      pointer_id,
      position: Position::new(x, y)
    })
  }

  pub fn pointer_up(
    &self,
    pointer_id: i32,
    x: f64,
    y: f64
  ) -> bool {
    self.input(InputEvent::PointerUp {
      pointer_id,
      position: Position::new(x, y)
    })
  }

  pub fn pointer_cancel(
    &self,
    pointer_id: i32
  ) -> bool {
    self.input(
      InputEvent::PointerCancel {
        pointer_id
      }
    )
  }

  pub fn wheel(
    &self,
    x: f64,
    y: f64,
    delta_y: f64
  ) -> bool {
    self.input(InputEvent::Wheel {
      position: Position::new(x, y),
      delta_y
    })
  }

  /// `key` is `KeyboardEvent.key`.
  pub fn key_down(
    &self,
    key: &str,
    shift: bool,
    ctrl: bool,
    meta: bool
  ) -> bool {
    self.input(InputEvent::KeyDown {
      key:       Key::from_dom(key),
      modifiers: Modifiers {
        shift,
        ctrl,
        meta
      }
    })
  }

  pub fn activate_menu_item(
    &self,
    item_id: &str
  ) -> bool {
    let activation = self
      .session
      .borrow_mut()
      .activate_menu_item(
        item_id,
        Utc::now()
      );
    self.arm_timer();
    matches!(
      activation,
      Activation::Ran(Ok(()))
    )
  }

  pub fn open_form(
    &self,
    x: Option<f64>,
    y: Option<f64>
  ) {
    let position = x
      .zip(y)
      .map(|(x, y)| Position::new(x, y));
    self
      .session
      .borrow_mut()
      .open_form(position);
  }

  pub fn open_quick_form(
    &self,
    x: f64,
    y: f64
  ) {
    self
      .session
      .borrow_mut()
      .open_quick_form(Position::new(
        x, y
      ));
  }

  pub fn update_form(
    &self,
    patch: JsValue
  ) -> Result<(), JsValue> {
    let patch: FormPatch =
      serde_wasm_bindgen::from_value(
        patch
      )?;
    self
      .session
      .borrow_mut()
      .form_mut()
      .update(patch);
    Ok(())
  }

  pub fn close_form(&self) {
    self
      .session
      .borrow_mut()
      .form_mut()
      .close();
  }

  /// Returns the created node id.
  pub fn submit_form(
    &self
  ) -> Result<String, JsValue> {
    let created = self
      .session
      .borrow_mut()
      .submit_form(Utc::now());
    self.arm_timer();
    created
      .map(|id| id.to_string())
      .map_err(|err| {
        JsValue::from_str(
          &err.to_string()
        )
      })
  }

  pub fn add_drop_zone(
    &self,
    id: &str,
    x: f64,
    y: f64,
    width: f64,
    height: f64
  ) {
    self
      .session
      .borrow_mut()
      .drag_mut()
      .add_drop_zone(DropZone {
        id: id.to_string(),
        x,
        y,
        width,
        height
      });
  }

  pub fn remove_drop_zone(
    &self,
    id: &str
  ) {
    self
      .session
      .borrow_mut()
      .drag_mut()
      .remove_drop_zone(id);
  }

  pub fn snapshot(
    &self
  ) -> Result<JsValue, JsValue> {
    let session = self.session.borrow();
    to_js(&session.snapshot())
  }

  /// Drains pending user notices.
  pub fn notices(
    &self
  ) -> Result<JsValue, JsValue> {
    let notices = self
      .session
      .borrow_mut()
      .take_notices();
    to_js(&notices)
  }

  pub fn storage_stats(
    &self
  ) -> Result<JsValue, JsValue> {
    let stats = self
      .session
      .borrow()
      .storage_stats();
    to_js(&stats)
  }

  /// Saves now, skipping the debounce.
  pub fn flush(&self) -> bool {
    self.timer.borrow_mut().take();
    let outcome = self
      .session
      .borrow_mut()
      .flush(Utc::now());
    !matches!(
      outcome,
      canvas_core::autosave::SaveOutcome::Failed
    )
  }

  pub fn export_file(
    &self
  ) -> Result<(), JsValue> {
    let file = self
      .session
      .borrow_mut()
      .export_file(Utc::now())
      .map_err(|err| {
        JsValue::from_str(&format!(
          "{err:#}"
        ))
      })?;
    files::download(&file).map_err(
      |err| {
        JsValue::from_str(&format!(
          "{err:#}"
        ))
      }
    )
  }

  /// Resolves to the number of imported tasks. The canvas is untouched when
  /// the file cannot be read or parsed.
  pub fn import_file(
    &self,
    file: Option<web_sys::File>
  ) -> js_sys::Promise {
    let session = self.session.clone();
    let timer = self.timer.clone();
    wasm_bindgen_futures::future_to_promise(
      async move {
        let contents = match file {
          | Some(file) => {
            match files::read_text(file)
              .await
            {
              | Ok(text) => Some(text),
              | Err(err) => {
                warn!(error = %err, "import file unreadable");
                return Err(
                  JsValue::from_str(
                    &err.to_string()
                  )
                );
              }
            }
          }
          | None => None
        };
        let imported = session
          .borrow_mut()
          .import_file(
            contents.as_deref(),
            Utc::now()
          );
        arm_timer(&session, &timer);
        imported
          .map(|count| {
            JsValue::from_f64(count as f64)
          })
          .map_err(|err| {
            JsValue::from_str(
              &err.to_string()
            )
          })
      }
    )
  }

  fn input(
    &self,
    event: InputEvent
  ) -> bool {
    let outcome = self
      .session
      .borrow_mut()
      .handle_input(event, Utc::now());
    self.arm_timer();
    if let InputOutcome::DragEnded(
      summary
    ) = &outcome
    {
      debug!(node = %summary.node_id, drop_zone = ?summary.drop_zone, "drag finished");
    }
    !matches!(
      outcome,
      InputOutcome::Ignored
    )
  }

  fn arm_timer(&self) {
    arm_timer(
      &self.session,
      &self.timer
    );
  }
}

/// Replaces the pending auto-save timer, which cancels the previous one.
fn arm_timer(
  session: &Shared<CanvasSession>,
  timer: &Shared<Option<Timeout>>
) {
  let Some(millis) = session
    .borrow()
    .millis_until_save(Utc::now())
  else {
    return;
  };
  let millis =
    u32::try_from(millis).unwrap_or(u32::MAX);
  let session = session.clone();
  let next = Timeout::new(millis, move || {
    if let Ok(mut session) =
      session.try_borrow_mut()
    {
      let outcome =
        session.tick(Utc::now());
      debug!(?outcome, "auto-save tick");
    }
  });
  timer.borrow_mut().replace(next);
}

fn load_settings()
-> anyhow::Result<Settings> {
  let mut cfg = Config::default();
  let stored = web_sys::window()
    .and_then(|window| {
      window
        .local_storage()
        .ok()
        .flatten()
    })
    .and_then(|storage| {
      storage
        .get_item(CONFIG_KEY)
        .ok()
        .flatten()
    });
  if let Some(text) = stored {
    if let Err(err) = cfg.merge_toml(&text)
    {
      warn!(error = %err, "ignoring invalid stored config");
      cfg = Config::default();
    }
  }
  Settings::from_config(&cfg)
}

fn to_js<T: Serialize + ?Sized>(
  value: &T
) -> Result<JsValue, JsValue> {
  value
    .serialize(
      &serde_wasm_bindgen::Serializer::json_compatible()
    )
    .map_err(JsValue::from)
}

