//! Region Model
//!
//! Turns a page's layout description (ALTO or PAGE XML) into an ordered list
//! of [`TextRegion`]s plus page dimensions.
//!
//! Parsing degrades instead of failing: garbled markup yields fewer regions,
//! missing sizes fall back to [`DEFAULT_PAGE_WIDTH`] x [`DEFAULT_PAGE_HEIGHT`],
//! and lines without a polygon (three or more points) or without text are
//! dropped.

mod parser;
mod polygon;
mod types;

pub use parser::{detect_and_parse, detect_format, parse_alto_xml, parse_page_xml};
pub use polygon::{parse_polygon, parse_polygon_points};
pub use types::{
    BoundingBox, LayoutFormat, ParsedPage, Point, TextRegion, DEFAULT_PAGE_HEIGHT,
    DEFAULT_PAGE_WIDTH, MIN_POLYGON_POINTS,
};
