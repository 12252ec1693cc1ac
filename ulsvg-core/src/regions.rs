//! Region Resolver - Named Placement Zones
//!
//! Regions are normalized rectangles over the unit square. Proportions are
//! aspect-ratio independent; only pixel bounds follow the canonical canvas.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::canvas::{AspectRatio, CanvasConfig, Point, Rect};
use crate::document::CustomRegion;

/// Tolerance on the far edges of a region.
pub const REGION_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("Unknown region: {0}")]
    UnknownRegion(String),

    #[error("Unknown anchor: {0}")]
    UnknownAnchor(String),

    #[error("Invalid bounds for region '{name}': {reason}")]
    InvalidBounds { name: String, reason: String },

    #[error("Region name '{0}' conflicts with a standard region")]
    NameConflict(String),

    #[error("Standard region '{0}' cannot be removed")]
    StandardRegionImmutable(String),

    #[error("Region name must not be empty")]
    EmptyName,

    #[error("Size variants are mutually exclusive, found: {}", .0.join(", "))]
    ConflictingSize(Vec<&'static str>),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Repeat must be either grid or radial, not both")]
    ConflictingRepeat,

    #[error("Repeat expands to {requested} instances, limit is {max}")]
    RepeatTooLarge { requested: u64, max: u64 },
}

/// The ten standard regions. `full_canvas` is last so that point lookups
/// prefer the more specific grid cells.
pub const STANDARD_REGIONS: [(&str, Rect); 10] = [
    ("top_left", Rect::new(0.0, 0.0, 0.33, 0.33)),
    ("top_center", Rect::new(0.33, 0.0, 0.34, 0.33)),
    ("top_right", Rect::new(0.67, 0.0, 0.33, 0.33)),
    ("middle_left", Rect::new(0.0, 0.33, 0.33, 0.34)),
    ("center", Rect::new(0.33, 0.33, 0.34, 0.34)),
    ("middle_right", Rect::new(0.67, 0.33, 0.33, 0.34)),
    ("bottom_left", Rect::new(0.0, 0.67, 0.33, 0.33)),
    ("bottom_center", Rect::new(0.33, 0.67, 0.34, 0.33)),
    ("bottom_right", Rect::new(0.67, 0.67, 0.33, 0.33)),
    ("full_canvas", Rect::new(0.0, 0.0, 1.0, 1.0)),
];

pub fn standard_region(name: &str) -> Option<Rect> {
    STANDARD_REGIONS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, r)| *r)
}

pub fn is_standard_region(name: &str) -> bool {
    standard_region(name).is_some()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    Center,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Anchor {
    pub const ALL: [Anchor; 9] = [
        Anchor::TopLeft,
        Anchor::TopCenter,
        Anchor::TopRight,
        Anchor::MiddleLeft,
        Anchor::Center,
        Anchor::MiddleRight,
        Anchor::BottomLeft,
        Anchor::BottomCenter,
        Anchor::BottomRight,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Anchor::TopLeft => "top_left",
            Anchor::TopCenter => "top_center",
            Anchor::TopRight => "top_right",
            Anchor::MiddleLeft => "middle_left",
            Anchor::Center => "center",
            Anchor::MiddleRight => "middle_right",
            Anchor::BottomLeft => "bottom_left",
            Anchor::BottomCenter => "bottom_center",
            Anchor::BottomRight => "bottom_right",
        }
    }

    /// Normalized offset inside a bounding box.
    pub fn offset(self) -> Point {
        let (x, y) = match self {
            Anchor::TopLeft => (0.0, 0.0),
            Anchor::TopCenter => (0.5, 0.0),
            Anchor::TopRight => (1.0, 0.0),
            Anchor::MiddleLeft => (0.0, 0.5),
            Anchor::Center => (0.5, 0.5),
            Anchor::MiddleRight => (1.0, 0.5),
            Anchor::BottomLeft => (0.0, 1.0),
            Anchor::BottomCenter => (0.5, 1.0),
            Anchor::BottomRight => (1.0, 1.0),
        };
        Point::new(x, y)
    }
}

impl FromStr for Anchor {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Anchor::ALL
            .iter()
            .copied()
            .find(|a| a.name() == s)
            .ok_or_else(|| LayoutError::UnknownAnchor(s.to_string()))
    }
}

/// Checks that `bounds` is a proper sub-rectangle of the unit square.
pub fn check_bounds(name: &str, bounds: &Rect) -> Result<(), LayoutError> {
    let invalid = |reason: &str| LayoutError::InvalidBounds {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    let values = [bounds.x, bounds.y, bounds.width, bounds.height];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(invalid("non-finite value"));
    }
    if bounds.x < 0.0 || bounds.y < 0.0 || bounds.x > 1.0 || bounds.y > 1.0 {
        return Err(invalid("origin outside [0,1]"));
    }
    if bounds.width <= 0.0 || bounds.height <= 0.0 {
        return Err(invalid("width and height must be positive"));
    }
    if bounds.right() > 1.0 + REGION_EPSILON || bounds.bottom() > 1.0 + REGION_EPSILON {
        return Err(invalid("extends past the unit square"));
    }
    Ok(())
}

/// Standard regions plus per-instance custom regions for one canvas.
#[derive(Debug, Clone)]
pub struct RegionResolver {
    canvas: CanvasConfig,
    // insertion order decides point-lookup priority among custom regions
    custom: Vec<(String, Rect)>,
}

impl RegionResolver {
    pub fn new(ratio: AspectRatio) -> Self {
        Self {
            canvas: ratio.config(),
            custom: Vec::new(),
        }
    }

    /// Resolver with a document's declared regions registered.
    pub fn with_custom_regions(
        ratio: AspectRatio,
        regions: &[CustomRegion],
    ) -> Result<Self, LayoutError> {
        let mut resolver = Self::new(ratio);
        for region in regions {
            resolver.add_custom_region(
                &region.name,
                Rect::new(region.x, region.y, region.width, region.height),
            )?;
        }
        Ok(resolver)
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.canvas.aspect_ratio
    }

    pub fn canvas(&self) -> &CanvasConfig {
        &self.canvas
    }

    /// Changes the canvas only. Normalized bounds are untouched.
    pub fn update_aspect_ratio(&mut self, ratio: AspectRatio) {
        self.canvas = ratio.config();
    }

    /// Registers or replaces a custom region.
    pub fn add_custom_region(&mut self, name: &str, bounds: Rect) -> Result<(), LayoutError> {
        if name.trim().is_empty() {
            return Err(LayoutError::EmptyName);
        }
        if is_standard_region(name) {
            return Err(LayoutError::NameConflict(name.to_string()));
        }
        check_bounds(name, &bounds)?;
        match self.custom.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = bounds,
            None => self.custom.push((name.to_string(), bounds)),
        }
        Ok(())
    }

    /// Returns whether a custom region was removed.
    pub fn remove_custom_region(&mut self, name: &str) -> Result<bool, LayoutError> {
        if is_standard_region(name) {
            return Err(LayoutError::StandardRegionImmutable(name.to_string()));
        }
        let before = self.custom.len();
        self.custom.retain(|(n, _)| n != name);
        Ok(self.custom.len() != before)
    }

    pub fn custom_regions(&self) -> impl Iterator<Item = (&str, &Rect)> {
        self.custom.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn has_region(&self, name: &str) -> bool {
        self.region_bounds(name).is_some()
    }

    /// All region names: standard first, then custom.
    pub fn region_names(&self) -> Vec<String> {
        STANDARD_REGIONS
            .iter()
            .map(|(n, _)| n.to_string())
            .chain(self.custom.iter().map(|(n, _)| n.clone()))
            .collect()
    }

    /// Normalized bounds of a region.
    pub fn region_bounds(&self, name: &str) -> Option<Rect> {
        self.custom
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| *r)
            .or_else(|| standard_region(name))
    }

    pub fn pixel_bounds(&self, name: &str) -> Result<Rect, LayoutError> {
        self.region_bounds(name)
            .map(|r| r.scaled(self.canvas.width, self.canvas.height))
            .ok_or_else(|| LayoutError::UnknownRegion(name.to_string()))
    }

    /// Pixel position of `anchor` inside `region`.
    pub fn anchor_point(&self, region: &str, anchor: &str) -> Result<Point, LayoutError> {
        let bounds = self.pixel_bounds(region)?;
        let a = anchor.parse::<Anchor>()?.offset();
        Ok(Point::new(
            bounds.x + a.x * bounds.width,
            bounds.y + a.y * bounds.height,
        ))
    }

    /// First region containing the normalized point; custom regions win.
    pub fn find_region_at_point(&self, x: f64, y: f64) -> Option<String> {
        self.custom
            .iter()
            .find(|(_, r)| r.contains(x, y))
            .map(|(n, _)| n.clone())
            .or_else(|| {
                STANDARD_REGIONS
                    .iter()
                    .find(|(_, r)| r.contains(x, y))
                    .map(|(n, _)| n.to_string())
            })
    }

    pub fn find_region_at_pixel(&self, x: f64, y: f64) -> Option<String> {
        let p = self.pixel_to_normalized(x, y);
        self.find_region_at_point(p.x, p.y)
    }

    /// Intersection area of two regions over the unit square.
    pub fn region_overlap(&self, a: &str, b: &str) -> Result<f64, LayoutError> {
        let ra = self
            .region_bounds(a)
            .ok_or_else(|| LayoutError::UnknownRegion(a.to_string()))?;
        let rb = self
            .region_bounds(b)
            .ok_or_else(|| LayoutError::UnknownRegion(b.to_string()))?;
        Ok(ra.intersection_area(&rb))
    }

    pub fn normalized_to_pixel(&self, x: f64, y: f64) -> Point {
        Point::new(x * self.canvas.width, y * self.canvas.height)
    }

    pub fn pixel_to_normalized(&self, x: f64, y: f64) -> Point {
        Point::new(x / self.canvas.width, y / self.canvas.height)
    }
}

impl Default for RegionResolver {
    fn default() -> Self {
        Self::new(AspectRatio::Square)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_center_pixel_bounds_square() {
        let resolver = RegionResolver::new(AspectRatio::Square);
        let b = resolver.pixel_bounds("center").unwrap();
        assert!(approx(b.x, 168.96));
        assert!(approx(b.y, 168.96));
        assert!(approx(b.width, 174.08));
        assert!(approx(b.height, 174.08));
    }

    #[test]
    fn test_custom_region_rules() {
        let mut resolver = RegionResolver::default();
        assert_eq!(
            resolver.add_custom_region("center", Rect::new(0.1, 0.1, 0.2, 0.2)),
            Err(LayoutError::NameConflict("center".into()))
        );
        assert!(matches!(
            resolver.add_custom_region("wide", Rect::new(0.5, 0.0, 0.8, 0.2)),
            Err(LayoutError::InvalidBounds { .. })
        ));
        assert!(matches!(
            resolver.add_custom_region("neg", Rect::new(-0.1, 0.0, 0.2, 0.2)),
            Err(LayoutError::InvalidBounds { .. })
        ));
        assert_eq!(
            resolver.add_custom_region(" ", Rect::new(0.0, 0.0, 0.2, 0.2)),
            Err(LayoutError::EmptyName)
        );
        resolver
            .add_custom_region("logo", Rect::new(0.05, 0.05, 0.2, 0.1))
            .unwrap();
        assert!(resolver.has_region("logo"));
        assert_eq!(resolver.remove_custom_region("logo"), Ok(true));
        assert_eq!(resolver.remove_custom_region("logo"), Ok(false));
        assert_eq!(
            resolver.remove_custom_region("full_canvas"),
            Err(LayoutError::StandardRegionImmutable("full_canvas".into()))
        );
    }

    #[test]
    fn test_custom_regions_win_point_lookup() {
        let mut resolver = RegionResolver::default();
        assert_eq!(resolver.find_region_at_point(0.5, 0.5).as_deref(), Some("center"));
        resolver
            .add_custom_region("focus", Rect::new(0.4, 0.4, 0.2, 0.2))
            .unwrap();
        assert_eq!(resolver.find_region_at_point(0.5, 0.5).as_deref(), Some("focus"));
        assert_eq!(resolver.find_region_at_point(0.1, 0.1).as_deref(), Some("top_left"));
        assert_eq!(resolver.find_region_at_point(1.5, 0.1), None);
    }

    #[test]
    fn test_overlap() {
        let resolver = RegionResolver::default();
        assert_eq!(resolver.region_overlap("top_left", "top_center").unwrap(), 0.0);
        assert!(approx(
            resolver.region_overlap("center", "full_canvas").unwrap(),
            0.34 * 0.34
        ));
        assert!(resolver.region_overlap("center", "nowhere").is_err());
    }

    #[test]
    fn test_anchor_point() {
        let resolver = RegionResolver::new(AspectRatio::Widescreen);
        let p = resolver.anchor_point("full_canvas", "bottom_right").unwrap();
        assert_eq!((p.x, p.y), (512.0, 288.0));
        assert_eq!(
            resolver.anchor_point("full_canvas", "middle"),
            Err(LayoutError::UnknownAnchor("middle".into()))
        );
    }
}
