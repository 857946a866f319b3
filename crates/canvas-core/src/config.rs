use std::collections::HashMap;
#[cfg(not(target_arch = "wasm32"))]
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow,
  bail
};
use chrono::Duration;
use tracing::{
  debug,
  trace,
  warn
};

use crate::storage::StorageKeys;
use crate::store::NodeDefaults;
use crate::task::{
  Position,
  Size
};

const DEFAULTS: &[(&str, &str)] = &[
  ("storage.namespace", "todo-app"),
  ("storage.cookie_max_bytes", "2000"),
  ("storage.cookie_expiry_days", "7"),
  ("autosave.delay_ms", "3000"),
  ("autosave.enabled", "true"),
  ("node.default_x", "100"),
  ("node.default_y", "100"),
  ("node.width", "200"),
  ("node.height", "150"),
  ("node.quick_width", "280"),
  ("node.quick_height", "180"),
  ("node.quick_title", "New task"),
  ("node.duplicate_offset", "20"),
  ("viewport.min_zoom", "0.1"),
  ("viewport.max_zoom", "5.0"),
  ("viewport.zoom_step", "1.1")
];

/// Flat `section.key` string map with built-in defaults.
#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  #[cfg(not(target_arch = "wasm32"))]
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      map: DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      #[cfg(not(target_arch = "wasm32"))]
      loaded_files: vec![]
    }
  }
}

impl Config {
  /// Defaults overlaid with a TOML document. Tables become dotted key
  /// prefixes.
  #[tracing::instrument(skip(text))]
  pub fn from_toml_str(
    text: &str
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();
    cfg.merge_toml(text)?;
    Ok(cfg)
  }

  pub fn merge_toml(
    &mut self,
    text: &str
  ) -> anyhow::Result<()> {
    let table =
      toml::from_str::<toml::Table>(text)
        .context(
          "failed to parse config TOML"
        )?;
    flatten_into(
      &mut self.map,
      "",
      &table
    );
    Ok(())
  }

  /// Defaults plus the config file at `override_path`, `$CANVAS_CONFIG`,
  /// or the platform config directory, whichever is found first.
  #[cfg(not(target_arch = "wasm32"))]
  #[tracing::instrument(skip(
    override_path
  ))]
  pub fn load(
    override_path: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();
    match resolve_config_path(
      override_path
    ) {
      | Some(path) if path.exists() => {
        tracing::info!(config = %path.display(), "loading config");
        let text =
          std::fs::read_to_string(&path)
            .with_context(|| {
              format!(
                "failed to read {}",
                path.display()
              )
            })?;
        cfg.merge_toml(&text).with_context(
          || {
            format!(
              "invalid config {}",
              path.display()
            )
          }
        )?;
        cfg.loaded_files.push(path);
      }
      | Some(path) => {
        warn!(config = %path.display(), "config file does not exist; using defaults");
      }
      | None => {
        debug!(
          "no config file; using \
           defaults"
        );
      }
    }
    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn get_u64(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u64>> {
    self
      .map
      .get(key)
      .map(|v| {
        v.trim().parse::<u64>().map_err(
          |_| {
            anyhow!(
              "{key} must be a whole \
               number, got {v:?}"
            )
          }
        )
      })
      .transpose()
  }

  pub fn get_f64(
    &self,
    key: &str
  ) -> anyhow::Result<Option<f64>> {
    self
      .map
      .get(key)
      .map(|v| {
        v.trim()
          .parse::<f64>()
          .ok()
          .filter(|n| n.is_finite())
          .ok_or_else(|| {
            anyhow!(
              "{key} must be a number, \
               got {v:?}"
            )
          })
      })
      .transpose()
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  fn require_u64(
    &self,
    key: &str
  ) -> anyhow::Result<u64> {
    self.get_u64(key)?.ok_or_else(|| {
      anyhow!("missing config key {key}")
    })
  }

  fn require_f64(
    &self,
    key: &str
  ) -> anyhow::Result<f64> {
    self.get_f64(key)?.ok_or_else(|| {
      anyhow!("missing config key {key}")
    })
  }
}

/// Typed, validated view of a [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
  pub storage_keys:       StorageKeys,
  pub cookie_key:         String,
  pub cookie_max_bytes:   usize,
  pub cookie_expiry_days: u32,
  pub autosave_delay:     Duration,
  pub autosave_enabled:   bool,
  pub node_defaults:      NodeDefaults,
  pub min_zoom:           f64,
  pub max_zoom:           f64,
  pub zoom_step:          f64
}

impl Default for Settings {
  fn default() -> Self {
    Settings {
      storage_keys:       StorageKeys::default(),
      cookie_key:         "todo-app-nodes-backup"
        .to_string(),
      cookie_max_bytes:   2000,
      cookie_expiry_days: 7,
      autosave_delay:     Duration::milliseconds(
        3000
      ),
      autosave_enabled:   true,
      node_defaults:      NodeDefaults::default(),
      min_zoom:           0.1,
      max_zoom:           5.0,
      zoom_step:          1.1
    }
  }
}

impl Settings {
  #[tracing::instrument(skip(cfg))]
  pub fn from_config(
    cfg: &Config
  ) -> anyhow::Result<Self> {
    let namespace = cfg
      .get("storage.namespace")
      .unwrap_or_default()
      .trim()
      .to_string();
    if namespace.is_empty() {
      bail!(
        "storage.namespace cannot be \
         empty"
      );
    }

    let positive = |key: &str| -> anyhow::Result<f64> {
      let value = cfg.require_f64(key)?;
      if value <= 0.0 {
        bail!(
          "{key} must be greater than \
           zero"
        );
      }
      Ok(value)
    };

    let node_defaults = NodeDefaults {
      position:         Position::new(
        cfg.require_f64("node.default_x")?,
        cfg.require_f64("node.default_y")?
      ),
      size:             Size::new(
        positive("node.width")?,
        positive("node.height")?
      ),
      quick_size:       Size::new(
        positive("node.quick_width")?,
        positive("node.quick_height")?
      ),
      title:            cfg
        .get("node.quick_title")
        .unwrap_or_default(),
      duplicate_offset: cfg.require_f64(
        "node.duplicate_offset"
      )?
    };

    let min_zoom =
      positive("viewport.min_zoom")?;
    let max_zoom =
      positive("viewport.max_zoom")?;
    if min_zoom > max_zoom {
      bail!(
        "viewport.min_zoom ({min_zoom}) \
         exceeds viewport.max_zoom \
         ({max_zoom})"
      );
    }
    let zoom_step =
      cfg.require_f64("viewport.zoom_step")?;
    if zoom_step <= 1.0 {
      bail!(
        "viewport.zoom_step must be \
         greater than 1"
      );
    }

    let delay_ms =
      cfg.require_u64("autosave.delay_ms")?;
    let delay_ms = i64::try_from(delay_ms)
      .context(
        "autosave.delay_ms is too large"
      )?;
    let cookie_expiry_days = u32::try_from(
      cfg.require_u64(
        "storage.cookie_expiry_days"
      )?
    )
    .context(
      "storage.cookie_expiry_days is too \
       large"
    )?;
    let cookie_max_bytes = usize::try_from(
      cfg.require_u64(
        "storage.cookie_max_bytes"
      )?
    )
    .context(
      "storage.cookie_max_bytes is too \
       large"
    )?;

    let settings = Settings {
      storage_keys: StorageKeys::new(
        &namespace
      ),
      cookie_key: format!(
        "{namespace}-nodes-backup"
      ),
      cookie_max_bytes,
      cookie_expiry_days,
      autosave_delay: Duration::milliseconds(
        delay_ms
      ),
      autosave_enabled: cfg
        .get_bool("autosave.enabled")
        .unwrap_or(true),
      node_defaults,
      min_zoom,
      max_zoom,
      zoom_step
    };
    trace!(?settings, "resolved settings");
    Ok(settings)
  }
}

fn flatten_into(
  map: &mut HashMap<String, String>,
  prefix: &str,
  table: &toml::Table
) {
  for (key, value) in table {
    let full = if prefix.is_empty() {
      key.clone()
    } else {
      format!("{prefix}.{key}")
    };
    match value {
      | toml::Value::Table(inner) => {
        flatten_into(map, &full, inner)
      }
      | toml::Value::String(s) => {
        map.insert(full, s.clone());
      }
      | toml::Value::Integer(n) => {
        map.insert(full, n.to_string());
      }
      | toml::Value::Float(n) => {
        map.insert(full, n.to_string());
      }
      | toml::Value::Boolean(b) => {
        map.insert(full, b.to_string());
      }
      | toml::Value::Datetime(dt) => {
        map.insert(full, dt.to_string());
      }
      | toml::Value::Array(_) => {
        warn!(key = %full, "array config values are not supported; skipping");
      }
    }
  }
}

#[cfg(not(target_arch = "wasm32"))]
fn resolve_config_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(expand_tilde(path));
  }

  if let Ok(env_path) =
    std::env::var("CANVAS_CONFIG")
  {
    if env_path == "/dev/null" {
      return None;
    }
    return Some(expand_tilde(
      Path::new(&env_path)
    ));
  }

  dirs::config_dir().map(|dir| {
    dir
      .join("todo-canvas")
      .join("config.toml")
  })
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
