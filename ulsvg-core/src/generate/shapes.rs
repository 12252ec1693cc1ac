//! Geometry helpers shared by the deterministic generators.

use std::f64::consts::PI;

use crate::canvas::Point;
use crate::document::PathCommand;

/// Cubic Bézier handle length for a quarter circle.
const KAPPA: f64 = 0.552_284_749_8;

pub fn ellipse(cx: f64, cy: f64, rx: f64, ry: f64) -> Vec<PathCommand> {
    let (kx, ky) = (rx * KAPPA, ry * KAPPA);
    vec![
        PathCommand::move_to(cx, cy - ry),
        PathCommand::cubic_to(cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy),
        PathCommand::cubic_to(cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry),
        PathCommand::cubic_to(cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy),
        PathCommand::cubic_to(cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry),
        PathCommand::close(),
    ]
}

pub fn circle(cx: f64, cy: f64, r: f64) -> Vec<PathCommand> {
    ellipse(cx, cy, r, r)
}

pub fn rect(x: f64, y: f64, width: f64, height: f64) -> Vec<PathCommand> {
    vec![
        PathCommand::move_to(x, y),
        PathCommand::line_to(x + width, y),
        PathCommand::line_to(x + width, y + height),
        PathCommand::line_to(x, y + height),
        PathCommand::close(),
    ]
}

pub fn polygon(points: &[Point]) -> Vec<PathCommand> {
    let mut commands = Vec::with_capacity(points.len() + 1);
    let mut iter = points.iter();
    if let Some(first) = iter.next() {
        commands.push(PathCommand::move_to(first.x, first.y));
        commands.extend(iter.map(|p| PathCommand::line_to(p.x, p.y)));
        commands.push(PathCommand::close());
    }
    commands
}

/// Open polyline.
pub fn polyline(points: &[Point]) -> Vec<PathCommand> {
    let mut commands = polygon(points);
    commands.pop();
    commands
}

/// Vertices of a regular polygon, first vertex at 12 o'clock.
pub fn regular_polygon(cx: f64, cy: f64, r: f64, sides: u32) -> Vec<Point> {
    (0..sides)
        .map(|i| {
            let a = -PI / 2.0 + 2.0 * PI * i as f64 / sides as f64;
            Point::new(cx + r * a.cos(), cy + r * a.sin())
        })
        .collect()
}

/// Alternating outer/inner vertices of an n-pointed star.
pub fn star_points(cx: f64, cy: f64, outer: f64, inner: f64, points: u32) -> Vec<Point> {
    let n = points * 2;
    (0..n)
        .map(|i| {
            let r = if i % 2 == 0 { outer } else { inner };
            let a = -PI / 2.0 + PI * i as f64 / points as f64;
            Point::new(cx + r * a.cos(), cy + r * a.sin())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circle_shape() {
        let cmds = circle(100.0, 100.0, 50.0);
        assert_eq!(cmds.len(), 6);
        assert_eq!(cmds[0].coords, vec![100.0, 50.0]);
        assert_eq!(cmds[2].coords[4..], [100.0, 150.0]);
    }

    #[test]
    fn test_star_alternates_radius() {
        let pts = star_points(0.0, 0.0, 10.0, 4.0, 5);
        assert_eq!(pts.len(), 10);
        assert!((pts[0].y + 10.0).abs() < 1e-9);
        let r1 = (pts[1].x.powi(2) + pts[1].y.powi(2)).sqrt();
        assert!((r1 - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_polyline_is_open() {
        let pts = [Point::new(0.0, 0.0), Point::new(1.0, 1.0)];
        assert_eq!(polygon(&pts).len(), 3);
        assert_eq!(polyline(&pts).len(), 2);
    }
}
