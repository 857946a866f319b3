use canvas_core::storage::{
  StorageBackend,
  StorageError,
  StorageKeys
};
use tracing::trace;
use wasm_bindgen::{
  JsCast,
  JsValue
};

#[derive(Debug, Clone, Copy)]
enum WebStorageKind {
  Local,
  Session
}

/// `window.localStorage` or `window.sessionStorage`.
#[derive(Debug, Clone)]
pub struct WebStorageBackend {
  kind: WebStorageKind
}

impl WebStorageBackend {
  pub fn local() -> Self {
    Self {
      kind: WebStorageKind::Local
    }
  }

  pub fn session() -> Self {
    Self {
      kind: WebStorageKind::Session
    }
  }

  fn storage(
    &self
  ) -> Result<web_sys::Storage, StorageError>
  {
    let window =
      web_sys::window().ok_or_else(|| {
        StorageError::Unavailable(
          self.name().to_string()
        )
      })?;
    let storage = match self.kind {
      | WebStorageKind::Local => {
        window.local_storage()
      }
      | WebStorageKind::Session => {
        window.session_storage()
      }
    };
    storage.ok().flatten().ok_or_else(
      || {
        StorageError::Unavailable(
          self.name().to_string()
        )
      }
    )
  }
}

impl StorageBackend for WebStorageBackend {
  fn name(&self) -> &str {
    match self.kind {
      | WebStorageKind::Local => {
        "localStorage"
      }
      | WebStorageKind::Session => {
        "sessionStorage"
      }
    }
  }

  fn get_item(
    &self,
    key: &str
  ) -> Result<Option<String>, StorageError>
  {
    self
      .storage()?
      .get_item(key)
      .map_err(|err| {
        StorageError::backend(
          self.name(),
          js_message(&err)
        )
      })
  }

  fn set_item(
    &self,
    key: &str,
    value: &str
  ) -> Result<(), StorageError> {
    trace!(backend = self.name(), key, bytes = value.len(), "writing key");
    self
      .storage()?
      .set_item(key, value)
      .map_err(|err| {
        if is_quota_error(&err) {
          StorageError::QuotaExceeded {
            backend: self
              .name()
              .to_string(),
            needed:  key.len()
              + value.len(),
            limit:   0
          }
        } else {
          StorageError::backend(
            self.name(),
            js_message(&err)
          )
        }
      })
  }

  fn remove_item(
    &self,
    key: &str
  ) -> Result<(), StorageError> {
    self
      .storage()?
      .remove_item(key)
      .map_err(|err| {
        StorageError::backend(
          self.name(),
          js_message(&err)
        )
      })
  }
}

/// Last-resort mirror in `document.cookie`. Only small payloads fit, so
/// anything over `max_bytes` is refused.
#[derive(Debug, Clone)]
pub struct CookieBackend {
  nodes_key:   String,
  cookie_name: String,
  max_bytes:   usize,
  expiry_days: u32
}

impl CookieBackend {
  pub fn new(
    keys: &StorageKeys,
    cookie_name: &str,
    max_bytes: usize,
    expiry_days: u32
  ) -> Self {
    Self {
      nodes_key: keys.nodes.clone(),
      cookie_name: cookie_name
        .to_string(),
      max_bytes,
      expiry_days
    }
  }

  fn name_for<'a>(
    &'a self,
    key: &'a str
  ) -> &'a str {
    if key == self.nodes_key {
      &self.cookie_name
    } else {
      key
    }
  }

  fn document(
    &self
  ) -> Result<web_sys::HtmlDocument, StorageError>
  {
    web_sys::window()
      .and_then(|window| {
        window.document()
      })
      .and_then(|document| {
        document
          .dyn_into::<web_sys::HtmlDocument>()
          .ok()
      })
      .ok_or_else(|| {
        StorageError::Unavailable(
          "cookies".to_string()
        )
      })
  }

  fn write_cookie(
    &self,
    cookie: &str
  ) -> Result<(), StorageError> {
    self
      .document()?
      .set_cookie(cookie)
      .map_err(|err| {
        StorageError::backend(
          "cookies",
          js_message(&err)
        )
      })
  }
}

impl StorageBackend for CookieBackend {
  fn name(&self) -> &str {
    "cookies"
  }

  fn max_value_len(
    &self
  ) -> Option<usize> {
    Some(self.max_bytes)
  }

  fn get_item(
    &self,
    key: &str
  ) -> Result<Option<String>, StorageError>
  {
    let jar = self
      .document()?
      .cookie()
      .map_err(|err| {
        StorageError::backend(
          "cookies",
          js_message(&err)
        )
      })?;
    let Some(raw) = find_cookie(
      &jar,
      self.name_for(key)
    ) else {
      return Ok(None);
    };
    js_sys::decode_uri_component(raw)
      .map(String::from)
      .map(Some)
      .map_err(|err| {
        StorageError::backend(
          "cookies",
          js_message(&err)
        )
      })
  }

  fn set_item(
    &self,
    key: &str,
    value: &str
  ) -> Result<(), StorageError> {
    let encoded = String::from(
      js_sys::encode_uri_component(value)
    );
    if encoded.len() > self.max_bytes {
      return Err(
        StorageError::QuotaExceeded {
          backend: "cookies".to_string(),
          needed:  encoded.len(),
          limit:   self.max_bytes
        }
      );
    }
    let max_age =
      u64::from(self.expiry_days) * 86_400;
    self.write_cookie(&format!(
      "{}={encoded}; max-age={max_age}; \
       path=/; SameSite=Lax",
      self.name_for(key)
    ))
  }

  fn remove_item(
    &self,
    key: &str
  ) -> Result<(), StorageError> {
    self.write_cookie(&format!(
      "{}=; max-age=0; path=/",
      self.name_for(key)
    ))
  }
}

fn find_cookie<'a>(
  jar: &'a str,
  name: &str
) -> Option<&'a str> {
  jar.split(';').find_map(|pair| {
    let (k, v) =
      pair.trim().split_once('=')?;
    (k == name).then_some(v)
  })
}

fn is_quota_error(err: &JsValue) -> bool {
  js_sys::Reflect::get(
    err,
    &JsValue::from_str("name")
  )
  .ok()
  .and_then(|name| name.as_string())
  .is_some_and(|name| {
    name == "QuotaExceededError"
      || name
        == "NS_ERROR_DOM_QUOTA_REACHED"
  })
}

pub(crate) fn js_message(
  err: &JsValue
) -> String {
  err
    .dyn_ref::<js_sys::Error>()
    .map(|e| String::from(e.message()))
    .or_else(|| err.as_string())
    .unwrap_or_else(|| format!("{err:?}"))
}
