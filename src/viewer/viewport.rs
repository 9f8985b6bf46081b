//! Viewport/overlay synchronization
//!
//! The image surface pans and zooms on its own; the vector surface carrying
//! the line shapes has to follow it. Both are traits so the same logic runs
//! against a real renderer or the headless surfaces below.
//!
//! Viewport coordinates follow the deep-zoom convention: the image is 1.0
//! wide, and `bounds_origin` is the top-left of the visible area in those
//! units. Source-image pixels map to the screen as
//!
//! ```text
//! scale  = container_width * zoom / image_width
//! offset = -bounds_origin * container_width * zoom
//! screen = image * scale + offset
//! ```

use std::io::Cursor;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::alto::{Point, TextRegion};

/// Container size in screen pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Pan/zoom state reported by the image surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    /// 1.0 shows the full image width across the container
    pub zoom: f64,
    /// Top-left of the visible area, in image-width units
    pub bounds_origin: Point,
    pub container: Size,
}

impl ViewportState {
    pub fn home(container: Size) -> Self {
        Self {
            zoom: 1.0,
            bounds_origin: Point::new(0.0, 0.0),
            container,
        }
    }
}

/// Source-image pixels to screen pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportTransform {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl ViewportTransform {
    pub const IDENTITY: ViewportTransform = ViewportTransform {
        scale: 1.0,
        offset_x: 0.0,
        offset_y: 0.0,
    };

    /// Transform for an image `image_width` pixels wide
    ///
    /// `None` when either width is not positive.
    pub fn compute(image_width: f64, viewport: &ViewportState) -> Option<Self> {
        if !(image_width > 0.0) || !(viewport.container.width > 0.0) {
            return None;
        }
        let span = viewport.container.width * viewport.zoom;
        Some(Self {
            scale: span / image_width,
            offset_x: -viewport.bounds_origin.x * span,
            offset_y: -viewport.bounds_origin.y * span,
        })
    }

    pub fn image_to_screen(&self, point: Point) -> Point {
        Point::new(
            point.x * self.scale + self.offset_x,
            point.y * self.scale + self.offset_y,
        )
    }

    pub fn screen_to_image(&self, point: Point) -> Option<Point> {
        if self.scale == 0.0 {
            return None;
        }
        Some(Point::new(
            (point.x - self.offset_x) / self.scale,
            (point.y - self.offset_y) / self.scale,
        ))
    }
}

// ============================================================================
// Surfaces
// ============================================================================

/// Pan/zoom image display
pub trait ImageSurface: Send {
    /// Open an image; readiness is the `Ok` return
    fn open(&mut self, image: &[u8]) -> Result<(u32, u32), String>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Current pan/zoom state, `None` until an image is open
    fn viewport(&self) -> Option<ViewportState>;

    /// Screen point to source-image pixels, `None` while not open
    fn screen_to_image(&self, x: f64, y: f64) -> Option<Point>;
}

/// Visual state of one overlay shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeStyle {
    Normal,
    Highlighted,
}

/// Vector layer stacked over the image surface
pub trait VectorSurface: Send {
    /// Destroy every shape
    fn clear(&mut self);

    fn add_shape(&mut self, id: &str, polygon: &[Point]);

    fn set_style(&mut self, id: &str, style: ShapeStyle);

    /// Move the whole layer; shapes keep their image-space geometry
    fn set_transform(&mut self, transform: ViewportTransform);

    fn set_visible(&mut self, visible: bool);

    fn redraw(&mut self);
}

// ============================================================================
// Headless surfaces
// ============================================================================

#[derive(Debug)]
struct HeadlessImageState {
    size: Option<(u32, u32)>,
    viewport: ViewportState,
    opened: u32,
}

/// Image surface without a display; decodes only the image header
///
/// Clones share state, so a test can keep a handle while the session owns
/// another.
#[derive(Debug, Clone)]
pub struct HeadlessImageSurface {
    state: Arc<Mutex<HeadlessImageState>>,
}

impl HeadlessImageSurface {
    pub fn new(container: Size) -> Self {
        Self {
            state: Arc::new(Mutex::new(HeadlessImageState {
                size: None,
                viewport: ViewportState::home(container),
                opened: 0,
            })),
        }
    }

    pub fn image_size(&self) -> Option<(u32, u32)> {
        self.state.lock().size
    }

    /// Number of successful opens
    pub fn open_count(&self) -> u32 {
        self.state.lock().opened
    }

    pub fn set_zoom(&self, zoom: f64) {
        self.state.lock().viewport.zoom = zoom;
    }

    pub fn pan_to(&self, origin: Point) {
        self.state.lock().viewport.bounds_origin = origin;
    }

    pub fn resize(&self, container: Size) {
        self.state.lock().viewport.container = container;
    }

    fn transform(state: &HeadlessImageState) -> Option<ViewportTransform> {
        let (width, _) = state.size?;
        ViewportTransform::compute(width as f64, &state.viewport)
    }
}

impl ImageSurface for HeadlessImageSurface {
    fn open(&mut self, image: &[u8]) -> Result<(u32, u32), String> {
        let dimensions = image::ImageReader::new(Cursor::new(image))
            .with_guessed_format()
            .map_err(|e| e.to_string())?
            .into_dimensions()
            .map_err(|e| e.to_string())?;

        let mut state = self.state.lock();
        state.size = Some(dimensions);
        state.opened += 1;
        Ok(dimensions)
    }

    fn close(&mut self) {
        self.state.lock().size = None;
    }

    fn is_open(&self) -> bool {
        self.state.lock().size.is_some()
    }

    fn viewport(&self) -> Option<ViewportState> {
        let state = self.state.lock();
        state.size.map(|_| state.viewport)
    }

    fn screen_to_image(&self, x: f64, y: f64) -> Option<Point> {
        let state = self.state.lock();
        Self::transform(&state)?.screen_to_image(Point::new(x, y))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneShape {
    pub id: String,
    pub polygon: Vec<Point>,
    pub style: ShapeStyle,
}

#[derive(Debug)]
struct SceneState {
    shapes: Vec<SceneShape>,
    transform: ViewportTransform,
    visible: bool,
    redraws: u64,
    transform_updates: u64,
}

/// In-memory vector layer
#[derive(Debug, Clone)]
pub struct SceneGraph {
    state: Arc<Mutex<SceneState>>,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SceneState {
                shapes: Vec::new(),
                transform: ViewportTransform::IDENTITY,
                visible: true,
                redraws: 0,
                transform_updates: 0,
            })),
        }
    }

    pub fn shapes(&self) -> Vec<SceneShape> {
        self.state.lock().shapes.clone()
    }

    pub fn shape_ids(&self) -> Vec<String> {
        self.state.lock().shapes.iter().map(|s| s.id.clone()).collect()
    }

    pub fn shape_count(&self) -> usize {
        self.state.lock().shapes.len()
    }

    pub fn highlighted(&self) -> Vec<String> {
        self.state
            .lock()
            .shapes
            .iter()
            .filter(|s| s.style == ShapeStyle::Highlighted)
            .map(|s| s.id.clone())
            .collect()
    }

    pub fn transform(&self) -> ViewportTransform {
        self.state.lock().transform
    }

    pub fn is_visible(&self) -> bool {
        self.state.lock().visible
    }

    pub fn redraw_count(&self) -> u64 {
        self.state.lock().redraws
    }

    pub fn transform_updates(&self) -> u64 {
        self.state.lock().transform_updates
    }
}

impl VectorSurface for SceneGraph {
    fn clear(&mut self) {
        self.state.lock().shapes.clear();
    }

    fn add_shape(&mut self, id: &str, polygon: &[Point]) {
        self.state.lock().shapes.push(SceneShape {
            id: id.to_string(),
            polygon: polygon.to_vec(),
            style: ShapeStyle::Normal,
        });
    }

    fn set_style(&mut self, id: &str, style: ShapeStyle) {
        if let Some(shape) = self.state.lock().shapes.iter_mut().find(|s| s.id == id) {
            shape.style = style;
        }
    }

    fn set_transform(&mut self, transform: ViewportTransform) {
        let mut state = self.state.lock();
        state.transform = transform;
        state.transform_updates += 1;
    }

    fn set_visible(&mut self, visible: bool) {
        self.state.lock().visible = visible;
    }

    fn redraw(&mut self) {
        self.state.lock().redraws += 1;
    }
}

// ============================================================================
// Synchronizer
// ============================================================================

/// Region coordinates measured against the opened image
///
/// Layout files may describe a larger rendition than the image actually
/// served. The overlay is drawn in region units, so points reported by the
/// image surface are scaled by `region_width / image_width` before any hit
/// test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionSpace {
    pub region_width: f64,
    pub image_width: f64,
}

impl RegionSpace {
    pub fn new(region_width: f64, image_width: f64) -> Self {
        Self {
            region_width,
            image_width,
        }
    }

    /// Regions already in image pixels
    pub fn uniform(width: f64) -> Self {
        Self::new(width, width)
    }

    pub fn image_to_region(&self, point: Point) -> Option<Point> {
        if self.image_width <= 0.0 || self.region_width <= 0.0 {
            return None;
        }
        let k = self.region_width / self.image_width;
        Some(Point::new(point.x * k, point.y * k))
    }
}

/// Keeps the vector layer's transform equal to the image viewport
///
/// Viewport changes only mark a sync as requested; the recompute happens
/// once on the next animation frame, however many changes arrived.
#[derive(Debug, Default)]
pub struct OverlaySynchronizer {
    sync_requested: bool,
    /// Coordinate space the shapes live in
    space: Option<RegionSpace>,
    last: Option<ViewportTransform>,
    recomputes: u64,
}

impl OverlaySynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note a viewport change; `true` if a frame must be scheduled
    pub fn request_sync(&mut self) -> bool {
        let schedule = !self.sync_requested;
        self.sync_requested = true;
        schedule
    }

    /// Container resized; same path as a viewport change
    pub fn on_resize(&mut self) -> bool {
        self.request_sync()
    }

    pub fn is_sync_requested(&self) -> bool {
        self.sync_requested
    }

    /// Run the pending recompute, if any
    pub fn on_animation_frame(
        &mut self,
        image: &dyn ImageSurface,
        overlay: &mut dyn VectorSurface,
    ) -> Option<ViewportTransform> {
        if !self.sync_requested {
            return None;
        }
        self.sync_requested = false;
        self.sync_now(image, overlay)
    }

    /// Recompute and apply immediately
    pub fn sync_now(&mut self, image: &dyn ImageSurface, overlay: &mut dyn VectorSurface) -> Option<ViewportTransform> {
        let width = self.space?.region_width;
        let viewport = image.viewport()?;
        let transform = ViewportTransform::compute(width, &viewport)?;

        overlay.set_transform(transform);
        overlay.redraw();
        self.last = Some(transform);
        self.recomputes += 1;
        Some(transform)
    }

    /// Replace every shape with the given regions, then align the layer
    pub fn rebuild(
        &mut self,
        image: &dyn ImageSurface,
        overlay: &mut dyn VectorSurface,
        regions: &[TextRegion],
        space: RegionSpace,
    ) -> Option<ViewportTransform> {
        overlay.clear();
        for region in regions {
            overlay.add_shape(&region.id, &region.polygon);
        }
        self.space = Some(space);
        self.sync_requested = false;
        tracing::debug!(
            shapes = regions.len(),
            region_width = space.region_width,
            image_width = space.image_width,
            "Rebuilt overlay"
        );
        self.sync_now(image, overlay)
    }

    /// Drop all shapes and stop syncing until the next rebuild
    pub fn clear(&mut self, overlay: &mut dyn VectorSurface) {
        overlay.clear();
        overlay.redraw();
        self.space = None;
        self.sync_requested = false;
        self.last = None;
    }

    /// Map a point from the image surface into region units
    pub fn image_to_region(&self, point: Point) -> Option<Point> {
        self.space?.image_to_region(point)
    }

    pub fn last_transform(&self) -> Option<ViewportTransform> {
        self.last
    }

    /// Recomputes performed so far
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::new(width, height);
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}
