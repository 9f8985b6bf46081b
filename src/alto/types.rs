//! Region model types
//!
//! In-memory representation of the OCR text lines on a single page.

use serde::{Deserialize, Serialize};

/// Fallback page width when the layout declares no size
pub const DEFAULT_PAGE_WIDTH: u32 = 6192;

/// Fallback page height when the layout declares no size
pub const DEFAULT_PAGE_HEIGHT: u32 = 5432;

/// Minimum number of polygon vertices for a region to be kept
pub const MIN_POLYGON_POINTS: usize = 3;

/// A point in source-image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box in source-image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Compute the bounding box of a polygon, `None` for an empty one
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = Self {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in &points[1..] {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.max_y = bbox.max_y.max(p.y);
        }
        Some(bbox)
    }

    /// Inclusive containment test
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// One OCR-detected line of text on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRegion {
    /// Identifier, unique within the page
    pub id: String,
    /// Closed polygon, at least three vertices
    pub polygon: Vec<Point>,
    /// Words of the line joined with single spaces
    pub transcription: String,
    /// Bounding rectangle as declared by the layout (or derived from the polygon)
    pub hpos: i64,
    pub vpos: i64,
    pub width: i64,
    pub height: i64,
    /// Recognition confidence in `0.0..=1.0`, when the layout carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl TextRegion {
    /// Bounding box of the polygon
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.polygon)
    }

    /// Polygon as a flat `[x0, y0, x1, y1, ...]` list
    pub fn flattened_polygon(&self) -> Vec<f64> {
        self.polygon.iter().flat_map(|p| [p.x, p.y]).collect()
    }
}

/// Layout description dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutFormat {
    Alto,
    Page,
}

/// Result of parsing one page's layout description
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    /// Regions in source document order
    pub regions: Vec<TextRegion>,
    pub page_width: u32,
    pub page_height: u32,
    /// False when the fallback dimensions were used
    pub dimensions_declared: bool,
    /// Transcriptions joined with newlines
    pub full_text: String,
    pub format: LayoutFormat,
}

impl ParsedPage {
    pub(crate) fn new(format: LayoutFormat) -> Self {
        Self {
            regions: Vec::new(),
            page_width: DEFAULT_PAGE_WIDTH,
            page_height: DEFAULT_PAGE_HEIGHT,
            dimensions_declared: false,
            full_text: String::new(),
            format,
        }
    }

    pub(crate) fn finish(mut self) -> Self {
        self.full_text = self
            .regions
            .iter()
            .map(|r| r.transcription.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self
    }

    /// Page dimensions `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.page_width, self.page_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_from_points() {
        let points = vec![Point::new(10.0, 20.0), Point::new(30.0, 5.0), Point::new(15.0, 40.0)];
        let bbox = BoundingBox::from_points(&points).unwrap();

        assert_eq!(bbox.min_x, 10.0);
        assert_eq!(bbox.min_y, 5.0);
        assert_eq!(bbox.max_x, 30.0);
        assert_eq!(bbox.max_y, 40.0);
        assert!(bbox.contains(20.0, 20.0));
        assert!(!bbox.contains(31.0, 20.0));
    }

    #[test]
    fn test_bounding_box_empty() {
        assert!(BoundingBox::from_points(&[]).is_none());
    }

    #[test]
    fn test_flattened_polygon() {
        let region = TextRegion {
            id: "l1".to_string(),
            polygon: vec![Point::new(1.0, 2.0), Point::new(3.0, 4.0), Point::new(5.0, 6.0)],
            transcription: "abc".to_string(),
            hpos: 0,
            vpos: 0,
            width: 0,
            height: 0,
            confidence: None,
        };
        assert_eq!(region.flattened_polygon(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
