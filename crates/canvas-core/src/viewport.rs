use serde::{
  Deserialize,
  Serialize
};
use tracing::trace;

use crate::task::Position;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Serialize,
  Deserialize,
)]
pub struct Viewport {
  pub x:          f64,
  pub y:          f64,
  pub zoom:       f64,
  pub min_zoom:   f64,
  pub max_zoom:   f64,
  pub zoom_step:  f64,
  #[serde(skip)]
  pub is_panning: bool
}

impl Default for Viewport {
  fn default() -> Self {
    Self {
      x:          0.0,
      y:          0.0,
      zoom:       1.0,
      min_zoom:   0.1,
      max_zoom:   5.0,
      zoom_step:  1.1,
      is_panning: false
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Serialize,
  Deserialize,
)]
pub struct TransformPatch {
  pub x:    Option<f64>,
  pub y:    Option<f64>,
  pub zoom: Option<f64>
}

impl Viewport {
  pub fn new(
    min_zoom: f64,
    max_zoom: f64,
    zoom_step: f64
  ) -> Self {
    Self {
      min_zoom,
      max_zoom,
      zoom_step,
      ..Self::default()
    }
  }

  pub fn screen_to_canvas(
    &self,
    screen: Position
  ) -> Position {
    Position::new(
      (screen.x - self.x) / self.zoom,
      (screen.y - self.y) / self.zoom
    )
  }

  pub fn canvas_to_screen(
    &self,
    canvas: Position
  ) -> Position {
    Position::new(
      canvas.x * self.zoom + self.x,
      canvas.y * self.zoom + self.y
    )
  }

  /// Rescales around `pointer` (screen space) so the canvas point under it
  /// stays put.
  pub fn zoom_at(
    &mut self,
    pointer: Position,
    new_zoom: f64
  ) {
    let anchor =
      self.screen_to_canvas(pointer);
    let zoom = self.clamp_zoom(new_zoom);
    self.zoom = zoom;
    self.x = pointer.x - anchor.x * zoom;
    self.y = pointer.y - anchor.y * zoom;
    trace!(
      zoom,
      x = self.x,
      y = self.y,
      "viewport zoomed"
    );
  }

  /// Wheel zoom: scrolling down zooms out by one step.
  pub fn wheel(
    &mut self,
    delta_y: f64,
    pointer: Position
  ) {
    if delta_y == 0.0 {
      return;
    }
    let target = if delta_y > 0.0 {
      self.zoom / self.zoom_step
    } else {
      self.zoom * self.zoom_step
    };
    self.zoom_at(pointer, target);
  }

  pub fn pan_by(
    &mut self,
    dx: f64,
    dy: f64
  ) {
    self.x += dx;
    self.y += dy;
  }

  pub fn set_transform(
    &mut self,
    patch: TransformPatch
  ) {
    if let Some(x) = patch.x {
      self.x = x;
    }
    if let Some(y) = patch.y {
      self.y = y;
    }
    if let Some(zoom) = patch.zoom {
      self.zoom = self.clamp_zoom(zoom);
    }
  }

  pub fn reset(&mut self) {
    self.x = 0.0;
    self.y = 0.0;
    self.zoom = 1.0;
    self.is_panning = false;
  }

  pub fn set_panning(
    &mut self,
    panning: bool
  ) {
    self.is_panning = panning;
  }

  fn clamp_zoom(
    &self,
    zoom: f64
  ) -> f64 {
    if !zoom.is_finite() || zoom <= 0.0 {
      return self.zoom;
    }
    zoom.clamp(
      self.min_zoom,
      self.max_zoom
    )
  }
}
