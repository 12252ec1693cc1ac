//! Coordinate Mapper - Layout Specifications to Pixel Geometry

use chrono::Duration;
use log::debug;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::cache::{self, SharedCache};
use crate::config::ValidationThresholds;
use crate::canvas::{Point, Rect};
use crate::document::{LayoutSpecification, SizeSpec};
use crate::hashing::cache_key;
use crate::regions::{Anchor, LayoutError, RegionResolver};

/// Resolved placement of one layout specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResult {
    /// Anchor point after the offset, clamped to the canvas.
    pub position: Point,
    /// Content box, clamped to the canvas.
    pub bounds: Rect,
    pub region_bounds: Rect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i32>,
}

pub struct CoordinateMapper {
    resolver: RegionResolver,
    cache: Option<SharedCache>,
    cache_ttl: Option<Duration>,
    max_repeat_instances: u64,
}

impl CoordinateMapper {
    pub fn new(resolver: RegionResolver) -> Self {
        Self {
            resolver,
            cache: None,
            cache_ttl: None,
            max_repeat_instances: ValidationThresholds::default().max_repeat_instances,
        }
    }

    pub fn with_max_repeat_instances(mut self, max: u64) -> Self {
        self.max_repeat_instances = max;
        self
    }

    pub fn with_cache(mut self, cache: SharedCache, ttl: Option<Duration>) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    pub fn resolver(&self) -> &RegionResolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut RegionResolver {
        &mut self.resolver
    }

    pub fn calculate_position(&self, spec: &LayoutSpecification) -> Result<PositionResult, LayoutError> {
        let key = self.cache.as_ref().and_then(|_| self.cache_key("layout", spec));
        if let (Some(store), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache::get_json::<PositionResult>(store.as_ref(), key) {
                return Ok(hit);
            }
        }

        let result = self.resolve(spec)?;

        if let (Some(store), Some(key)) = (&self.cache, &key) {
            cache::set_json(store.as_ref(), key, &result, self.cache_ttl);
        }
        Ok(result)
    }

    fn resolve(&self, spec: &LayoutSpecification) -> Result<PositionResult, LayoutError> {
        let region = self.resolver.pixel_bounds(&spec.region)?;
        let anchor = spec.anchor.parse::<Anchor>()?.offset();

        let px = region.x + anchor.x * region.width + spec.offset.x * region.width;
        let py = region.y + anchor.y * region.height + spec.offset.y * region.height;

        let (width, height) = match &spec.size {
            Some(size) => resolve_size(size, &region)?,
            None => (region.width, region.height),
        };

        // the box's own anchor sits on the resolved point
        let unclamped = Rect::new(px - anchor.x * width, py - anchor.y * height, width, height);
        let canvas = self.resolver.canvas();
        let (cx, cy) = (clamp(px, canvas.width), clamp(py, canvas.height));

        Ok(PositionResult {
            position: Point::new(cx, cy),
            bounds: clamp_rect(&unclamped, canvas.width, canvas.height),
            region_bounds: region,
            z_index: spec.z_index,
        })
    }

    /// Instance positions for a repeated layout. Without `repeat` this is the
    /// single resolved position.
    pub fn calculate_repeat_positions(
        &self,
        spec: &LayoutSpecification,
    ) -> Result<Vec<Point>, LayoutError> {
        let origin = self.calculate_position(spec)?.position;
        let Some(repeat) = &spec.repeat else {
            return Ok(vec![origin]);
        };
        let canvas = self.resolver.canvas();
        let clamp_point = |x: f64, y: f64| Point::new(clamp(x, canvas.width), clamp(y, canvas.height));

        match (&repeat.grid, &repeat.radial) {
            (Some(_), Some(_)) => Err(LayoutError::ConflictingRepeat),
            (Some(grid), None) => {
                let (cols, rows) = grid.count.columns_rows();
                let total = self.repeat_capacity(grid.count.instances().unwrap_or(u64::MAX))?;
                let mut points = Vec::with_capacity(total);
                let half_w = (cols.max(1) - 1) as f64 / 2.0;
                let half_h = (rows.max(1) - 1) as f64 / 2.0;
                for row in 0..rows {
                    for col in 0..cols {
                        points.push(clamp_point(
                            origin.x + (col as f64 - half_w) * grid.spacing,
                            origin.y + (row as f64 - half_h) * grid.spacing,
                        ));
                    }
                }
                Ok(points)
            }
            (None, Some(radial)) => {
                self.repeat_capacity(u64::from(radial.count))?;
                let points = (0..radial.count)
                    .map(|k| {
                        let angle = -PI / 2.0 + 2.0 * PI * k as f64 / radial.count as f64;
                        clamp_point(
                            origin.x + radial.radius * angle.cos(),
                            origin.y + radial.radius * angle.sin(),
                        )
                    })
                    .collect();
                Ok(points)
            }
            (None, None) => Ok(vec![origin]),
        }
    }

    fn repeat_capacity(&self, requested: u64) -> Result<usize, LayoutError> {
        let too_large = || LayoutError::RepeatTooLarge {
            requested,
            max: self.max_repeat_instances,
        };
        if requested > self.max_repeat_instances {
            return Err(too_large());
        }
        usize::try_from(requested).map_err(|_| too_large())
    }

    fn cache_key(&self, namespace: &str, spec: &LayoutSpecification) -> Option<String> {
        let customs: Vec<(&str, &Rect)> = self.resolver.custom_regions().collect();
        let ratio = self.resolver.aspect_ratio();
        match cache_key(namespace, &(ratio, customs, spec)) {
            Ok(key) => Some(key),
            Err(e) => {
                debug!("layout cache key unavailable: {}", e);
                None
            }
        }
    }
}

/// Width and height for a size specification inside `region`.
pub fn resolve_size(size: &SizeSpec, region: &Rect) -> Result<(f64, f64), LayoutError> {
    let variants = size.variants();
    if variants.len() > 1 {
        return Err(LayoutError::ConflictingSize(variants));
    }
    if let Some(abs) = size.absolute {
        if !(abs.width > 0.0 && abs.height > 0.0) {
            return Err(LayoutError::InvalidSize(format!(
                "absolute size must be positive, got {}x{}",
                abs.width, abs.height
            )));
        }
        return Ok((abs.width, abs.height));
    }
    if let Some(fraction) = size.relative {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(LayoutError::InvalidSize(format!(
                "relative size must be in (0, 1], got {}",
                fraction
            )));
        }
        let side = fraction * region.width.min(region.height);
        return Ok((side, side));
    }
    if let Some(ac) = size.aspect_constrained {
        if !(ac.width > 0.0 && ac.aspect > 0.0) {
            return Err(LayoutError::InvalidSize(format!(
                "aspect_constrained needs positive width and aspect, got {} / {}",
                ac.width, ac.aspect
            )));
        }
        return Ok((ac.width, ac.width / ac.aspect));
    }
    Ok((region.width, region.height))
}

fn clamp(v: f64, max: f64) -> f64 {
    v.clamp(0.0, max)
}

fn clamp_rect(r: &Rect, max_w: f64, max_h: f64) -> Rect {
    let x0 = clamp(r.x, max_w);
    let y0 = clamp(r.y, max_h);
    let x1 = clamp(r.right(), max_w);
    let y1 = clamp(r.bottom(), max_h);
    Rect::new(x0, y0, x1 - x0, y1 - y0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::canvas::AspectRatio;
    use crate::document::{GridCount, GridRepeat, RadialRepeat, RepeatSpec};

    fn mapper() -> CoordinateMapper {
        CoordinateMapper::new(RegionResolver::new(AspectRatio::Square))
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_offset_is_fraction_of_region() {
        let spec = LayoutSpecification::new("center", "center").with_offset(0.5, -0.25);
        let pos = mapper().calculate_position(&spec).unwrap();
        assert!(approx(pos.position.x, 256.0 + 0.5 * 174.08));
        assert!(approx(pos.position.y, 256.0 - 0.25 * 174.08));
    }

    #[test]
    fn test_top_left_anchor_aligns_box_corner() {
        let spec = LayoutSpecification::new("bottom_right", "top_left")
            .with_size(SizeSpec::absolute(40.0, 20.0));
        let pos = mapper().calculate_position(&spec).unwrap();
        assert!(approx(pos.bounds.x, 0.67 * 512.0));
        assert!(approx(pos.bounds.y, 0.67 * 512.0));
        assert_eq!((pos.bounds.width, pos.bounds.height), (40.0, 20.0));
    }

    #[test]
    fn test_aspect_constrained_height() {
        let spec = LayoutSpecification::new("full_canvas", "center")
            .with_size(SizeSpec::aspect_constrained(200.0, 2.0));
        let pos = mapper().calculate_position(&spec).unwrap();
        assert!(approx(pos.bounds.height, 100.0));
    }

    #[test]
    fn test_box_clamped_to_canvas() {
        let spec = LayoutSpecification::new("bottom_right", "bottom_right")
            .with_offset(1.0, 1.0)
            .with_size(SizeSpec::absolute(100.0, 100.0));
        let pos = mapper().calculate_position(&spec).unwrap();
        assert!(pos.bounds.right() <= 512.0);
        assert!(pos.bounds.bottom() <= 512.0);
        assert_eq!(pos.position, Point::new(512.0, 512.0));
    }

    #[test]
    fn test_errors_not_panics() {
        let m = mapper();
        assert_eq!(
            m.calculate_position(&LayoutSpecification::new("moon", "center")),
            Err(LayoutError::UnknownRegion("moon".into()))
        );
        assert_eq!(
            m.calculate_position(&LayoutSpecification::new("center", "middle")),
            Err(LayoutError::UnknownAnchor("middle".into()))
        );
        let mut size = SizeSpec::relative(0.5);
        size.absolute = Some(crate::document::AbsoluteSize { width: 5.0, height: 5.0 });
        let spec = LayoutSpecification::new("center", "center").with_size(size);
        assert!(matches!(
            m.calculate_position(&spec),
            Err(LayoutError::ConflictingSize(_))
        ));
        let spec = LayoutSpecification::new("center", "center").with_size(SizeSpec::relative(1.5));
        assert!(matches!(m.calculate_position(&spec), Err(LayoutError::InvalidSize(_))));
    }

    #[test]
    fn test_grid_repeat_centered_on_anchor() {
        let mut spec = LayoutSpecification::new("center", "center");
        spec.repeat = Some(RepeatSpec {
            grid: Some(GridRepeat { count: GridCount::ColumnsRows([3, 1]), spacing: 10.0 }),
            radial: None,
        });
        let points = mapper().calculate_repeat_positions(&spec).unwrap();
        let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
        assert_eq!(points.len(), 3);
        assert!(approx(xs[0], 246.0) && approx(xs[1], 256.0) && approx(xs[2], 266.0));
    }

    #[test]
    fn test_radial_repeat_starts_at_top() {
        let mut spec = LayoutSpecification::new("center", "center");
        spec.repeat = Some(RepeatSpec {
            grid: None,
            radial: Some(RadialRepeat { count: 4, radius: 50.0 }),
        });
        let points = mapper().calculate_repeat_positions(&spec).unwrap();
        assert_eq!(points.len(), 4);
        assert!(approx(points[0].x, 256.0) && approx(points[0].y, 206.0));
        assert!(approx(points[1].x, 306.0) && approx(points[1].y, 256.0));
    }

    #[test]
    fn test_oversized_repeat_is_an_error() {
        let mut spec = LayoutSpecification::new("center", "center");
        spec.repeat = Some(RepeatSpec {
            grid: Some(GridRepeat { count: GridCount::ColumnsRows([70000, 70000]), spacing: 1.0 }),
            radial: None,
        });
        assert!(matches!(
            mapper().calculate_repeat_positions(&spec),
            Err(LayoutError::RepeatTooLarge { requested: 4_900_000_000, max: 1000 })
        ));

        spec.repeat = Some(RepeatSpec {
            grid: None,
            radial: Some(RadialRepeat { count: 12, radius: 20.0 }),
        });
        let capped = mapper().with_max_repeat_instances(8);
        assert!(matches!(
            capped.calculate_repeat_positions(&spec),
            Err(LayoutError::RepeatTooLarge { requested: 12, max: 8 })
        ));
        assert_eq!(mapper().calculate_repeat_positions(&spec).unwrap().len(), 12);
    }

    #[test]
    fn test_cached_result_reused() {
        let store = MemoryCache::shared();
        let m = mapper().with_cache(store.clone(), None);
        let spec = LayoutSpecification::new("top_left", "center");
        let first = m.calculate_position(&spec).unwrap();
        let second = m.calculate_position(&spec).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.cleanup().deleted_count, 0);
        let key = m.cache_key("layout", &spec).unwrap();
        assert!(store.get(&key).is_some());
    }
}
