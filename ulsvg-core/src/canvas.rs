//! Canvas Registry - Canonical Coordinate Spaces
//!
//! Every document is authored on a fixed canonical canvas (max dimension 512).
//! Display scaling is a separate linear transform applied by the caller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest canonical dimension for any aspect ratio.
pub const CANONICAL_MAX: f64 = 512.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "16:9")]
    Widescreen,
    #[serde(rename = "3:2")]
    Photo,
    #[serde(rename = "2:3")]
    Portrait,
    #[serde(rename = "9:16")]
    Story,
}

impl AspectRatio {
    /// Table order. Tie-breaks in [`closest_ratio`] follow this order.
    pub const ALL: [AspectRatio; 6] = [
        AspectRatio::Square,
        AspectRatio::Landscape,
        AspectRatio::Widescreen,
        AspectRatio::Photo,
        AspectRatio::Portrait,
        AspectRatio::Story,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Widescreen => "16:9",
            AspectRatio::Photo => "3:2",
            AspectRatio::Portrait => "2:3",
            AspectRatio::Story => "9:16",
        }
    }

    /// Canonical canvas dimensions in pixels.
    pub fn dimensions(self) -> (f64, f64) {
        match self {
            AspectRatio::Square => (512.0, 512.0),
            AspectRatio::Landscape => (512.0, 384.0),
            AspectRatio::Widescreen => (512.0, 288.0),
            AspectRatio::Photo => (512.0, 341.0),
            AspectRatio::Portrait => (341.0, 512.0),
            AspectRatio::Story => (288.0, 512.0),
        }
    }

    /// Width over height of the canonical canvas.
    pub fn ratio(self) -> f64 {
        let (w, h) = self.dimensions();
        w / h
    }

    pub fn config(self) -> CanvasConfig {
        let (width, height) = self.dimensions();
        CanvasConfig {
            aspect_ratio: self,
            width,
            height,
            view_box: format!("0 0 {} {}", width, height),
        }
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        AspectRatio::Square
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported aspect ratio: {0}")]
pub struct UnknownAspectRatio(pub String);

impl FromStr for AspectRatio {
    type Err = UnknownAspectRatio;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        AspectRatio::ALL
            .iter()
            .copied()
            .find(|r| r.tag() == trimmed)
            .ok_or_else(|| UnknownAspectRatio(s.to_string()))
    }
}

/// Canonical canvas for one aspect ratio. Always an owned copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasConfig {
    pub aspect_ratio: AspectRatio,
    pub width: f64,
    pub height: f64,
    pub view_box: String,
}

pub fn canvas_config(ratio: AspectRatio) -> CanvasConfig {
    ratio.config()
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle. Used for both normalized and pixel bounds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Inclusive containment.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }

    /// Intersection area; rectangles sharing only an edge yield 0.
    pub fn intersection_area(&self, other: &Rect) -> f64 {
        let w = self.right().min(other.right()) - self.x.max(other.x);
        let h = self.bottom().min(other.bottom()) - self.y.max(other.y);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    pub fn scaled(&self, sx: f64, sy: f64) -> Rect {
        Rect::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
    }
}

pub fn validate_coordinates(x: f64, y: f64, ratio: AspectRatio) -> bool {
    let (w, h) = ratio.dimensions();
    x.is_finite() && y.is_finite() && (0.0..=w).contains(&x) && (0.0..=h).contains(&y)
}

pub fn clamp_coordinates(x: f64, y: f64, ratio: AspectRatio) -> (f64, f64) {
    let (w, h) = ratio.dimensions();
    (clamp_axis(x, w), clamp_axis(y, h))
}

fn clamp_axis(v: f64, max: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, max)
    }
}

/// Canonical coordinates to a display size.
pub fn scale_coordinates(
    x: f64,
    y: f64,
    ratio: AspectRatio,
    display_width: f64,
    display_height: f64,
) -> (f64, f64) {
    let (w, h) = ratio.dimensions();
    (x * display_width / w, y * display_height / h)
}

/// Canonical pixels to the unit square.
pub fn normalize_coordinates(x: f64, y: f64, ratio: AspectRatio) -> (f64, f64) {
    let (w, h) = ratio.dimensions();
    (x / w, y / h)
}

pub fn denormalize_coordinates(x: f64, y: f64, ratio: AspectRatio) -> (f64, f64) {
    let (w, h) = ratio.dimensions();
    (x * w, y * h)
}

/// Ratio whose width/height is nearest to `width / height`. Falls back to 1:1
/// for degenerate input.
pub fn closest_ratio(width: f64, height: f64) -> AspectRatio {
    if !(width > 0.0 && height > 0.0) || !width.is_finite() || !height.is_finite() {
        return AspectRatio::Square;
    }
    let target = width / height;
    let mut best = AspectRatio::ALL[0];
    let mut best_diff = f64::INFINITY;
    for ratio in AspectRatio::ALL {
        let diff = (ratio.ratio() - target).abs();
        // strict less-than keeps the earliest entry on ties
        if diff < best_diff {
            best = ratio;
            best_diff = diff;
        }
    }
    best
}

/// Parses a `WIDTHxHEIGHT` display size such as `1024x768`.
pub fn parse_size(size: &str) -> Option<(u32, u32)> {
    let (w, h) = size.trim().split_once(['x', 'X'])?;
    let w: u32 = w.trim().parse().ok()?;
    let h: u32 = h.trim().parse().ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    Some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_max_dimension() {
        for ratio in AspectRatio::ALL {
            let (w, h) = ratio.dimensions();
            assert_eq!(w.max(h), CANONICAL_MAX, "{}", ratio);
        }
    }

    #[test]
    fn test_config_is_owned_copy() {
        let mut config = canvas_config(AspectRatio::Widescreen);
        config.width = 1.0;
        assert_eq!(canvas_config(AspectRatio::Widescreen).width, 512.0);
        assert_eq!(canvas_config(AspectRatio::Widescreen).view_box, "0 0 512 288");
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!("16:9".parse::<AspectRatio>().unwrap(), AspectRatio::Widescreen);
        assert_eq!(" 2:3 ".parse::<AspectRatio>().unwrap(), AspectRatio::Portrait);
        assert!("5:4".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_closest_ratio() {
        assert_eq!(closest_ratio(1920.0, 1080.0), AspectRatio::Widescreen);
        assert_eq!(closest_ratio(1000.0, 1000.0), AspectRatio::Square);
        assert_eq!(closest_ratio(1080.0, 1920.0), AspectRatio::Story);
        assert_eq!(closest_ratio(0.0, 10.0), AspectRatio::Square);
    }

    #[test]
    fn test_clamp_and_validate() {
        assert_eq!(clamp_coordinates(-5.0, 600.0, AspectRatio::Square), (0.0, 512.0));
        assert_eq!(clamp_coordinates(600.0, 300.0, AspectRatio::Widescreen), (512.0, 288.0));
        assert!(validate_coordinates(512.0, 288.0, AspectRatio::Widescreen));
        assert!(!validate_coordinates(10.0, 289.0, AspectRatio::Widescreen));
    }

    #[test]
    fn test_scale_to_display() {
        let (x, y) = scale_coordinates(256.0, 256.0, AspectRatio::Square, 1024.0, 1024.0);
        assert_eq!((x, y), (512.0, 512.0));
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024x768"), Some((1024, 768)));
        assert_eq!(parse_size("0x10"), None);
        assert_eq!(parse_size("big"), None);
    }

    #[test]
    fn test_touching_rects_do_not_overlap() {
        let a = Rect::new(0.0, 0.0, 0.5, 0.5);
        let b = Rect::new(0.5, 0.0, 0.5, 0.5);
        assert_eq!(a.intersection_area(&b), 0.0);
    }
}
