pub mod autosave;
pub mod codec;
pub mod commands;
pub mod config;
#[cfg(not(target_arch = "wasm32"))]
pub mod datastore;
pub mod datetime;
pub mod drag;
pub mod envelope;
pub mod form;
pub mod input;
#[cfg(not(target_arch = "wasm32"))]
pub mod logging;
pub mod menu;
pub mod session;
pub mod storage;
pub mod store;
pub mod task;
pub mod viewport;

#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;

#[cfg(not(target_arch = "wasm32"))]
use anyhow::Context;
#[cfg(not(target_arch = "wasm32"))]
use tracing::{
  debug,
  info
};

pub use commands::{
  Applied,
  Command
};
pub use config::{
  Config,
  Settings
};
pub use session::CanvasSession;
pub use storage::{
  StorageAdapter,
  StorageBackend
};
pub use task::{
  NodeId,
  TaskNode
};

/// Opens a session backed by the native data directory.
#[cfg(not(target_arch = "wasm32"))]
#[tracing::instrument(skip_all)]
pub fn open_native_session(
  config_path: Option<&Path>,
  data_dir: Option<&Path>,
  overrides: Vec<(String, String)>
) -> anyhow::Result<CanvasSession> {
  let mut cfg =
    config::Config::load(config_path)?;
  debug!(?overrides, "config overrides");
  cfg.apply_overrides(overrides);

  let settings =
    config::Settings::from_config(&cfg)
      .context("invalid configuration")?;

  let data_dir =
    datastore::resolve_data_dir(
      &cfg, data_dir
    )
    .context(
      "failed to resolve data \
       directory"
    )?;
  let backend =
    datastore::DirBackend::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open storage at {}",
        data_dir.display()
      )
    })?;

  let adapter =
    storage::StorageAdapter::new(
      settings.storage_keys.clone()
    )
    .with_backend(backend);

  info!(
    data_dir = %data_dir.display(),
    "opening canvas session"
  );
  Ok(CanvasSession::open(
    settings, adapter
  ))
}
