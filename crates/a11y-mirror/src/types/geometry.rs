/*! Geometry types for accessible bounding boxes. */

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Rectangle in device pixels, as reported by the native accessibility API.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, TS)]
#[ts(export)]
pub struct Bounds {
  pub x: f64,
  pub y: f64,
  pub w: f64,
  pub h: f64,
}

impl Bounds {
  /// The zero rectangle. Substituted when bounds cannot be computed.
  pub const ZERO: Self = Self {
    x: 0.0,
    y: 0.0,
    w: 0.0,
    h: 0.0,
  };

  pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
    Self { x, y, w, h }
  }

  /// True for rectangles with no area.
  pub fn is_empty(&self) -> bool {
    self.w <= 0.0 || self.h <= 0.0
  }

  /// Check if two bounds match within a margin of error.
  pub fn matches(&self, other: &Bounds, margin: f64) -> bool {
    (self.x - other.x).abs() <= margin
      && (self.y - other.y).abs() <= margin
      && (self.w - other.w).abs() <= margin
      && (self.h - other.h).abs() <= margin
  }

  /// Check if a point is contained within these bounds.
  pub fn contains(&self, point: Point) -> bool {
    point.x >= self.x
      && point.x <= self.x + self.w
      && point.y >= self.y
      && point.y <= self.y + self.h
  }

  /// Scale every component by `factor`.
  #[must_use]
  pub fn scale(&self, factor: f64) -> Self {
    Self {
      x: self.x * factor,
      y: self.y * factor,
      w: self.w * factor,
      h: self.h * factor,
    }
  }

  /// Move the origin by `(dx, dy)`.
  #[must_use]
  pub fn translate(&self, dx: f64, dy: f64) -> Self {
    Self {
      x: self.x + dx,
      y: self.y + dy,
      ..*self
    }
  }
}

/// A 2D point.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, TS)]
#[ts(export)]
pub struct Point {
  pub x: f64,
  pub y: f64,
}

impl Point {
  pub const fn new(x: f64, y: f64) -> Self {
    Self { x, y }
  }
}

/// Screen metrics of the document's top-level window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, TS)]
#[ts(export)]
pub struct Viewport {
  pub device_pixel_ratio: f64,
  /// Screen position of the document's inner area, in CSS pixels.
  pub offset: Point,
}

impl Default for Viewport {
  fn default() -> Self {
    Self {
      device_pixel_ratio: 1.0,
      offset: Point::default(),
    }
  }
}

/// Response to a bounds query: raw device-pixel bounds plus the metrics
/// needed to place them in the document's viewport.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, TS)]
#[ts(export)]
pub struct BoundsInfo {
  pub bounds: Bounds,
  pub device_pixel_ratio: f64,
  pub offset: Point,
}

impl BoundsInfo {
  pub const fn new(bounds: Bounds, viewport: Viewport) -> Self {
    Self {
      bounds,
      device_pixel_ratio: viewport.device_pixel_ratio,
      offset: viewport.offset,
    }
  }

  /// Bounds in viewport (CSS pixel) coordinates, ready for a highlighter.
  pub fn viewport_rect(&self) -> Bounds {
    let ratio = if self.device_pixel_ratio > 0.0 {
      self.device_pixel_ratio
    } else {
      1.0
    };
    self
      .bounds
      .scale(1.0 / ratio)
      .translate(-self.offset.x, -self.offset.y)
  }
}


#[cfg(test)]
mod proptests {
  use super::*;
  use proptest::prelude::*;

  fn coord() -> impl Strategy<Value = f64> {
    -10000.0..10000.0f64
  }

  fn dimension() -> impl Strategy<Value = f64> {
    0.0..5000.0f64
  }

  proptest! {
    /// Bounds::matches is symmetric
    #[test]
    fn matches_symmetric(
      x1 in coord(), y1 in coord(), w1 in dimension(), h1 in dimension(),
      x2 in coord(), y2 in coord(), w2 in dimension(), h2 in dimension(),
      m in 0.0..100.0f64
    ) {
      let a = Bounds { x: x1, y: y1, w: w1, h: h1 };
      let b = Bounds { x: x2, y: y2, w: w2, h: h2 };
      prop_assert_eq!(a.matches(&b, m), b.matches(&a, m), "matches should be symmetric");
    }

    /// Scaling back by the inverse ratio recovers the original rectangle
    #[test]
    fn scale_round_trips(x in coord(), y in coord(), w in dimension(), h in dimension(), ratio in 0.5..4.0f64) {
      let bounds = Bounds { x, y, w, h };
      let back = bounds.scale(ratio).scale(1.0 / ratio);
      prop_assert!(bounds.matches(&back, 1e-6));
    }
  }
}
