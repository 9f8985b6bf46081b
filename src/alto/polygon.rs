//! Polygon point-list parsing
//!
//! Layout polygons are whitespace-separated `"x,y"` pairs. A pair that does
//! not parse as two finite numbers is dropped on its own; the rest of the
//! polygon survives.

use super::types::Point;

/// Parse a point list into a flat `[x0, y0, x1, y1, ...]` vector
pub fn parse_polygon_points(points: &str) -> Vec<f64> {
    let mut flat = Vec::new();
    let mut dropped = 0usize;

    for pair in points.split_whitespace() {
        match parse_pair(pair) {
            Some((x, y)) => {
                flat.push(x);
                flat.push(y);
            }
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        tracing::debug!(dropped, "Dropped malformed polygon pairs");
    }

    flat
}

/// Parse a point list into vertices
pub fn parse_polygon(points: &str) -> Vec<Point> {
    parse_polygon_points(points)
        .chunks_exact(2)
        .map(|xy| Point::new(xy[0], xy[1]))
        .collect()
}

fn parse_pair(pair: &str) -> Option<(f64, f64)> {
    let (x, y) = pair.split_once(',')?;
    let x: f64 = x.trim().parse().ok()?;
    let y: f64 = y.trim().parse().ok()?;
    (x.is_finite() && y.is_finite()).then_some((x, y))
}
