//! Hit testing and pointer interaction
//!
//! Pointer positions arrive in screen pixels, are converted to image pixels
//! by the image surface and then into region units by the overlay
//! synchronizer, and are resolved against the page's line polygons. Overlapping polygons resolve to the first region in document
//! order.

use crate::alto::{BoundingBox, Point, TextRegion};
use crate::proxy::RegionBounds;

use super::viewport::{ShapeStyle, VectorSurface};

/// Squared screen distance from which a press/release counts as a drag
pub const CLICK_THRESHOLD_SQ: f64 = 25.0;

/// Ray-casting (odd crossings) test against a flat `[x0, y0, x1, y1, ...]`
/// polygon, implicitly closed
pub fn point_in_polygon(x: f64, y: f64, polygon: &[f64]) -> bool {
    let n = polygon.len() / 2;
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (polygon[2 * i], polygon[2 * i + 1]);
        let (xj, yj) = (polygon[2 * j], polygon[2 * j + 1]);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[derive(Debug, Clone)]
struct HitEntry {
    index: usize,
    bbox: BoundingBox,
    points: Vec<f64>,
}

/// Flat hit list parallel to a page's regions
#[derive(Debug, Clone, Default)]
pub struct HitTester {
    entries: Vec<HitEntry>,
}

impl HitTester {
    pub fn new(regions: &[TextRegion]) -> Self {
        let entries = regions
            .iter()
            .enumerate()
            .filter_map(|(index, region)| {
                Some(HitEntry {
                    index,
                    bbox: region.bounding_box()?,
                    points: region.flattened_polygon(),
                })
            })
            .collect();
        Self { entries }
    }

    /// Index of the first region containing the point
    pub fn hit(&self, point: Point) -> Option<usize> {
        self.entries
            .iter()
            .filter(|e| e.bbox.contains(point.x, point.y))
            .find(|e| point_in_polygon(point.x, point.y, &e.points))
            .map(|e| e.index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Interaction state machine
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoverState {
    Idle,
    Hovering(String),
}

/// Tooltip following the pointer
#[derive(Debug, Clone, PartialEq)]
pub struct Tooltip {
    pub text: String,
    /// Screen position
    pub position: Point,
}

/// A clicked line, ready to send on
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub region_id: String,
    pub transcription: String,
    pub bounds: RegionBounds,
}

/// What a pointer release amounted to
#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    /// Moved too far between press and release
    Drag,
    /// Click outside every region
    Miss,
    Select(Selection),
    /// No press recorded, overlay hidden, or image not ready
    Ignored,
}

/// Hover, tooltip, highlight and click handling for one page
#[derive(Debug)]
pub struct InteractionEngine {
    regions: Vec<TextRegion>,
    tester: HitTester,
    hover: HoverState,
    tooltip: Option<Tooltip>,
    pointer_down: Option<Point>,
    enabled: bool,
}

impl Default for InteractionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionEngine {
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
            tester: HitTester::default(),
            hover: HoverState::Idle,
            tooltip: None,
            pointer_down: None,
            enabled: true,
        }
    }

    /// Attach a page's regions
    pub fn attach(&mut self, regions: Vec<TextRegion>) {
        self.tester = HitTester::new(&regions);
        self.regions = regions;
        self.hover = HoverState::Idle;
        self.tooltip = None;
        self.pointer_down = None;
    }

    /// Detach from the current page
    pub fn detach(&mut self) {
        self.attach(Vec::new());
    }

    pub fn hover(&self) -> &HoverState {
        &self.hover
    }

    pub fn tooltip(&self) -> Option<&Tooltip> {
        self.tooltip.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Overlay shown or hidden; hidden disables all hit testing
    pub fn set_enabled(&mut self, enabled: bool, overlay: &mut dyn VectorSurface) {
        self.enabled = enabled;
        overlay.set_visible(enabled);
        if !enabled {
            self.leave(overlay);
            self.pointer_down = None;
        }
        overlay.redraw();
    }

    /// Pointer moved; `image` is `None` while the surface is not ready
    pub fn pointer_move(&mut self, screen: Point, image: Option<Point>, overlay: &mut dyn VectorSurface) {
        if !self.enabled {
            return;
        }
        let Some(image) = image else {
            return;
        };

        let hit = self.tester.hit(image);
        let target = hit.map(|i| self.regions[i].id.clone());
        if let HoverState::Hovering(current) = &self.hover {
            if Some(current) == target.as_ref() {
                if let Some(tooltip) = &mut self.tooltip {
                    tooltip.position = screen;
                }
                return;
            }
        }

        self.leave(overlay);
        if let Some(index) = hit {
            let region = &self.regions[index];
            overlay.set_style(&region.id, ShapeStyle::Highlighted);
            overlay.redraw();
            self.tooltip = Some(Tooltip {
                text: region.transcription.clone(),
                position: screen,
            });
            self.hover = HoverState::Hovering(region.id.clone());
        }
    }

    /// Pointer left the viewer
    pub fn pointer_leave(&mut self, overlay: &mut dyn VectorSurface) {
        self.leave(overlay);
        self.pointer_down = None;
    }

    pub fn pointer_down(&mut self, screen: Point) {
        if self.enabled {
            self.pointer_down = Some(screen);
        }
    }

    /// Pointer released: a click selects, a drag is suppressed
    pub fn pointer_up(&mut self, screen: Point, image: Option<Point>) -> ClickOutcome {
        let Some(down) = self.pointer_down.take() else {
            return ClickOutcome::Ignored;
        };
        if !self.enabled {
            return ClickOutcome::Ignored;
        }

        let dx = screen.x - down.x;
        let dy = screen.y - down.y;
        if dx * dx + dy * dy >= CLICK_THRESHOLD_SQ {
            return ClickOutcome::Drag;
        }

        let Some(image) = image else {
            return ClickOutcome::Ignored;
        };
        match self.tester.hit(image) {
            Some(index) => {
                let region = &self.regions[index];
                ClickOutcome::Select(Selection {
                    region_id: region.id.clone(),
                    transcription: region.transcription.clone(),
                    bounds: RegionBounds {
                        hpos: region.hpos,
                        vpos: region.vpos,
                        width: region.width,
                        height: region.height,
                    },
                })
            }
            None => ClickOutcome::Miss,
        }
    }

    fn leave(&mut self, overlay: &mut dyn VectorSurface) {
        if let HoverState::Hovering(id) = std::mem::replace(&mut self.hover, HoverState::Idle) {
            overlay.set_style(&id, ShapeStyle::Normal);
            overlay.redraw();
        }
        self.tooltip = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::viewport::SceneGraph;

    fn square(id: &str, x: f64, y: f64, size: f64) -> TextRegion {
        TextRegion {
            id: id.to_string(),
            polygon: vec![
                Point::new(x, y),
                Point::new(x + size, y),
                Point::new(x + size, y + size),
                Point::new(x, y + size),
            ],
            transcription: format!("text {}", id),
            hpos: x as i64,
            vpos: y as i64,
            width: size as i64,
            height: size as i64,
            confidence: None,
        }
    }

    fn engine_with(regions: Vec<TextRegion>) -> (InteractionEngine, SceneGraph) {
        let mut scene = SceneGraph::new();
        for r in &regions {
            scene.add_shape(&r.id, &r.polygon);
        }
        let mut engine = InteractionEngine::new();
        engine.attach(regions);
        (engine, scene)
    }

    #[test]
    fn test_point_in_convex_polygon() {
        let triangle = [0.0, 0.0, 10.0, 0.0, 5.0, 10.0];
        assert!(point_in_polygon(5.0, 3.0, &triangle));
        assert!(!point_in_polygon(9.0, 9.0, &triangle));
        assert!(!point_in_polygon(-1.0, 0.5, &triangle));
        assert!(!point_in_polygon(5.0, 5.0, &[0.0, 0.0, 10.0, 0.0]));
    }

    #[test]
    fn test_point_in_concave_polygon() {
        // U shape, open at the top between x=3 and x=7
        let u = [0.0, 0.0, 3.0, 0.0, 3.0, 7.0, 7.0, 7.0, 7.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0];
        assert!(point_in_polygon(1.0, 5.0, &u));
        assert!(point_in_polygon(5.0, 8.0, &u));
        assert!(!point_in_polygon(5.0, 3.0, &u));
    }

    #[test]
    fn test_hit_is_order_independent_of_approach() {
        let tester = HitTester::new(&[square("a", 0.0, 0.0, 10.0)]);
        let target = Point::new(4.0, 6.0);
        let mut results = Vec::new();
        for from in [Point::new(-5.0, 6.0), Point::new(20.0, 6.0), Point::new(4.0, -8.0)] {
            tester.hit(from);
            results.push(tester.hit(target));
        }
        assert!(results.iter().all(|r| *r == Some(0)));
    }

    #[test]
    fn test_overlap_resolves_to_first_region() {
        let tester = HitTester::new(&[square("a", 0.0, 0.0, 10.0), square("b", 5.0, 5.0, 10.0)]);
        assert_eq!(tester.hit(Point::new(7.0, 7.0)), Some(0));
        assert_eq!(tester.hit(Point::new(12.0, 12.0)), Some(1));
        assert_eq!(tester.hit(Point::new(30.0, 30.0)), None);
    }

    #[test]
    fn test_hover_enter_leave() {
        let (mut engine, mut scene) = engine_with(vec![square("a", 0.0, 0.0, 10.0), square("b", 20.0, 0.0, 10.0)]);

        engine.pointer_move(Point::new(1.0, 1.0), Some(Point::new(5.0, 5.0)), &mut scene);
        assert_eq!(engine.hover(), &HoverState::Hovering("a".to_string()));
        assert_eq!(engine.tooltip().unwrap().text, "text a");
        assert_eq!(scene.highlighted(), vec!["a"]);

        // Tooltip follows the pointer within the same region
        engine.pointer_move(Point::new(2.0, 3.0), Some(Point::new(6.0, 5.0)), &mut scene);
        assert_eq!(engine.tooltip().unwrap().position, Point::new(2.0, 3.0));

        engine.pointer_move(Point::new(9.0, 1.0), Some(Point::new(25.0, 5.0)), &mut scene);
        assert_eq!(scene.highlighted(), vec!["b"]);

        engine.pointer_move(Point::new(9.0, 9.0), Some(Point::new(50.0, 50.0)), &mut scene);
        assert_eq!(engine.hover(), &HoverState::Idle);
        assert!(engine.tooltip().is_none());
        assert!(scene.highlighted().is_empty());
    }

    #[test]
    fn test_click_vs_drag() {
        let (mut engine, _) = engine_with(vec![square("a", 0.0, 0.0, 10.0)]);
        let inside = Some(Point::new(5.0, 5.0));

        engine.pointer_down(Point::new(100.0, 100.0));
        assert!(matches!(
            engine.pointer_up(Point::new(103.0, 104.0), inside),
            ClickOutcome::Drag
        ));

        engine.pointer_down(Point::new(100.0, 100.0));
        match engine.pointer_up(Point::new(103.0, 103.0), inside) {
            ClickOutcome::Select(selection) => {
                assert_eq!(selection.region_id, "a");
                assert_eq!(selection.bounds.width, 10);
            }
            other => panic!("expected selection, got {:?}", other),
        }

        engine.pointer_down(Point::new(0.0, 0.0));
        assert_eq!(engine.pointer_up(Point::new(0.0, 0.0), Some(Point::new(50.0, 50.0))), ClickOutcome::Miss);

        // Release without press
        assert_eq!(engine.pointer_up(Point::new(0.0, 0.0), inside), ClickOutcome::Ignored);
    }

    #[test]
    fn test_unready_surface_is_noop() {
        let (mut engine, mut scene) = engine_with(vec![square("a", 0.0, 0.0, 10.0)]);
        engine.pointer_move(Point::new(5.0, 5.0), None, &mut scene);
        assert_eq!(engine.hover(), &HoverState::Idle);

        engine.pointer_down(Point::new(5.0, 5.0));
        assert_eq!(engine.pointer_up(Point::new(5.0, 5.0), None), ClickOutcome::Ignored);
    }

    #[test]
    fn test_hidden_overlay_disables_hit_testing() {
        let (mut engine, mut scene) = engine_with(vec![square("a", 0.0, 0.0, 10.0)]);
        engine.pointer_move(Point::new(5.0, 5.0), Some(Point::new(5.0, 5.0)), &mut scene);

        engine.set_enabled(false, &mut scene);
        assert!(!scene.is_visible());
        assert!(scene.highlighted().is_empty());
        assert_eq!(engine.hover(), &HoverState::Idle);

        engine.pointer_move(Point::new(5.0, 5.0), Some(Point::new(5.0, 5.0)), &mut scene);
        assert_eq!(engine.hover(), &HoverState::Idle);
        engine.pointer_down(Point::new(5.0, 5.0));
        assert_eq!(
            engine.pointer_up(Point::new(5.0, 5.0), Some(Point::new(5.0, 5.0))),
            ClickOutcome::Ignored
        );

        engine.set_enabled(true, &mut scene);
        engine.pointer_move(Point::new(5.0, 5.0), Some(Point::new(5.0, 5.0)), &mut scene);
        assert_eq!(engine.hover(), &HoverState::Hovering("a".to_string()));
    }
}
