use anyhow::{
  Context,
  anyhow
};
use canvas_core::envelope::{
  ExportFile,
  ImportError
};
use gloo::file::{
  Blob,
  ObjectUrl
};
use gloo::timers::callback::Timeout;
use tracing::{
  debug,
  info
};
use wasm_bindgen::JsCast;

use crate::web_storage::js_message;

/// Triggers a browser download of `file` through a temporary anchor.
pub fn download(
  file: &ExportFile
) -> anyhow::Result<()> {
  let document = web_sys::window()
    .and_then(|window| {
      window.document()
    })
    .ok_or_else(|| {
      anyhow!("no document to attach the download to")
    })?;
  let body =
    document.body().ok_or_else(|| {
      anyhow!("document has no body")
    })?;

  let blob = Blob::new_with_options(
    file.contents.as_str(),
    Some(file.mime_type)
  );
  let url = ObjectUrl::from(blob);

  let anchor = document
    .create_element("a")
    .map_err(|err| {
      anyhow!(js_message(&err))
    })
    .context("failed to create anchor")?
    .dyn_into::<web_sys::HtmlAnchorElement>()
    .map_err(|_| {
      anyhow!(
        "created element is not an \
         anchor"
      )
    })?;
  anchor.set_href(&url);
  anchor.set_download(&file.file_name);
  body
    .append_child(&anchor)
    .map_err(|err| {
      anyhow!(js_message(&err))
    })
    .context("failed to attach anchor")?;
  anchor.click();
  anchor.remove();

  // the object url is revoked on drop; give the download a moment first
  Timeout::new(1_000, move || drop(url))
    .forget();

  info!(file = %file.file_name, bytes = file.contents.len(), "download started");
  Ok(())
}

/// Reads a picked file as text.
pub async fn read_text(
  file: web_sys::File
) -> Result<String, ImportError> {
  let file = gloo::file::File::from(file);
  debug!(name = %file.name(), bytes = file.size(), "reading import file");
  gloo::file::futures::read_as_text(
    &file
  )
  .await
  .map_err(|err| {
    ImportError::Unreadable(
      err.to_string()
    )
  })
}
