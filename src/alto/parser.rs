//! ALTO and PAGE XML layout parsers
//!
//! Both parsers are event-driven (`quick-xml`) and never fail: malformed
//! markup stops the scan, keeping every region completed before the error.
//! Lines without a usable polygon or without text are filtered out.

use std::collections::HashSet;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::polygon::parse_polygon;
use super::types::{
    BoundingBox, LayoutFormat, ParsedPage, Point, TextRegion, MIN_POLYGON_POINTS,
};

// ============================================================================
// Format detection
// ============================================================================

/// Detect the layout dialect from the root element
pub fn detect_format(xml: &str) -> LayoutFormat {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return match e.local_name().as_ref() {
                    b"PcGts" => LayoutFormat::Page,
                    _ => LayoutFormat::Alto,
                };
            }
            Ok(Event::Eof) | Err(_) => return LayoutFormat::Alto,
            _ => {}
        }
    }
}

/// Parse a layout document of either dialect
pub fn detect_and_parse(xml: &str) -> ParsedPage {
    match detect_format(xml) {
        LayoutFormat::Alto => parse_alto_xml(xml),
        LayoutFormat::Page => parse_page_xml(xml),
    }
}

// ============================================================================
// Line accumulation
// ============================================================================

/// A text line under construction
#[derive(Default)]
struct LineBuilder {
    id: Option<String>,
    hpos: Option<i64>,
    vpos: Option<i64>,
    width: Option<i64>,
    height: Option<i64>,
    confidence: Option<f64>,
    polygon: Option<Vec<Point>>,
    words: Vec<String>,
    word_confidences: Vec<f64>,
    line_text: Option<String>,
}

/// Counters for lines that did not make it into the model
#[derive(Default)]
struct SkipStats {
    no_polygon: usize,
    no_transcription: usize,
}

impl SkipStats {
    /// A self-closing line, which has neither polygon nor text
    fn skip_bare_line(&mut self) {
        self.no_polygon += 1;
        self.no_transcription += 1;
    }
}

impl LineBuilder {
    /// Finish the line, `None` if it lacks a polygon or text
    ///
    /// A line without an id gets an empty one; see [`assign_missing_ids`].
    fn build(self, stats: &mut SkipStats) -> Option<TextRegion> {
        let polygon = self.polygon.unwrap_or_default();
        let transcription = match self.line_text {
            Some(text) => text.trim().to_string(),
            None => self.words.join(" "),
        };

        let mut keep = true;
        if polygon.len() < MIN_POLYGON_POINTS {
            stats.no_polygon += 1;
            keep = false;
        }
        if transcription.trim().is_empty() {
            stats.no_transcription += 1;
            keep = false;
        }
        if !keep {
            return None;
        }

        let confidence = self.confidence.or_else(|| {
            (!self.word_confidences.is_empty()).then(|| {
                self.word_confidences.iter().sum::<f64>() / self.word_confidences.len() as f64
            })
        });

        // Declared rectangle wins; otherwise derive it from the polygon
        let bbox = BoundingBox::from_points(&polygon);
        let derived = |f: fn(&BoundingBox) -> f64| bbox.as_ref().map(f).unwrap_or(0.0).round() as i64;

        Some(TextRegion {
            id: self.id.unwrap_or_default(),
            hpos: self.hpos.unwrap_or_else(|| derived(|b| b.min_x)),
            vpos: self.vpos.unwrap_or_else(|| derived(|b| b.min_y)),
            width: self.width.unwrap_or_else(|| derived(|b| b.width())),
            height: self.height.unwrap_or_else(|| derived(|b| b.height())),
            polygon,
            transcription,
            confidence,
        })
    }
}

/// Give every id-less region a `line{n}` id no other region uses
fn assign_missing_ids(regions: &mut [TextRegion]) {
    let mut taken: HashSet<String> = regions
        .iter()
        .filter(|r| !r.id.is_empty())
        .map(|r| r.id.clone())
        .collect();

    let mut next = 0usize;
    for region in regions.iter_mut().filter(|r| r.id.is_empty()) {
        let id = loop {
            let candidate = format!("line{}", next);
            next += 1;
            if !taken.contains(&candidate) {
                break candidate;
            }
        };
        taken.insert(id.clone());
        region.id = id;
    }
}

fn attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn attr_num(e: &BytesStart, name: &[u8]) -> Option<f64> {
    attr(e, name)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn attr_int(e: &BytesStart, name: &[u8]) -> Option<i64> {
    attr_num(e, name).map(|v| v.round() as i64)
}

fn attr_dim(e: &BytesStart, name: &[u8]) -> Option<u32> {
    attr_num(e, name).filter(|v| *v > 0.0).map(|v| v.round() as u32)
}

fn log_summary(page: &ParsedPage, line_tags: usize, stats: &SkipStats) {
    tracing::debug!(
        format = ?page.format,
        width = page.page_width,
        height = page.page_height,
        line_tags,
        kept = page.regions.len(),
        "Parsed layout"
    );
    if !page.dimensions_declared {
        tracing::warn!(
            width = page.page_width,
            height = page.page_height,
            "No page dimensions found, using defaults"
        );
    }
    if stats.no_polygon > 0 {
        tracing::debug!(count = stats.no_polygon, "Skipped lines with no polygon");
    }
    if stats.no_transcription > 0 {
        tracing::debug!(count = stats.no_transcription, "Skipped lines with no transcription");
    }
}

// ============================================================================
// ALTO
// ============================================================================

/// Parse an ALTO document
///
/// Reads `Page@WIDTH/HEIGHT`, and for every `TextLine` its `ID`, `HPOS`,
/// `VPOS`, `WIDTH`, `HEIGHT`, `WC`, the first `Polygon@POINTS` and the
/// `String@CONTENT` words.
pub fn parse_alto_xml(xml: &str) -> ParsedPage {
    let mut page = ParsedPage::new(LayoutFormat::Alto);
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut current: Option<LineBuilder> = None;
    let mut line_tags = 0usize;
    let mut stats = SkipStats::default();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    position = reader.buffer_position(),
                    error = %e,
                    "Malformed ALTO, keeping regions parsed so far"
                );
                break;
            }
        };

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"Page" if !page.dimensions_declared => {
                        if let (Some(w), Some(h)) = (attr_dim(e, b"WIDTH"), attr_dim(e, b"HEIGHT")) {
                            page.page_width = w;
                            page.page_height = h;
                            page.dimensions_declared = true;
                        }
                    }
                    b"TextLine" => {
                        line_tags += 1;
                        if is_empty {
                            stats.skip_bare_line();
                        } else {
                            current = Some(LineBuilder {
                                id: attr(e, b"ID"),
                                hpos: attr_int(e, b"HPOS"),
                                vpos: attr_int(e, b"VPOS"),
                                width: attr_int(e, b"WIDTH"),
                                height: attr_int(e, b"HEIGHT"),
                                confidence: attr_num(e, b"WC"),
                                ..Default::default()
                            });
                        }
                    }
                    b"Polygon" => {
                        if let Some(line) = current.as_mut() {
                            if line.polygon.is_none() {
                                line.polygon = attr(e, b"POINTS").map(|p| parse_polygon(&p));
                            }
                        }
                    }
                    b"String" => {
                        if let Some(line) = current.as_mut() {
                            if let Some(content) = attr(e, b"CONTENT").filter(|c| !c.is_empty()) {
                                line.words.push(content);
                            }
                            if let Some(wc) = attr_num(e, b"WC") {
                                line.word_confidences.push(wc);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref e) if e.local_name().as_ref() == b"TextLine" => {
                if let Some(region) = current.take().and_then(|line| line.build(&mut stats)) {
                    page.regions.push(region);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    assign_missing_ids(&mut page.regions);
    let page = page.finish();
    log_summary(&page, line_tags, &stats);
    page
}

// ============================================================================
// PAGE XML
// ============================================================================

/// Parse a PAGE XML (PcGts) document
///
/// Reads `Page@imageWidth/imageHeight`, and for every `TextLine` its `id`,
/// the line-level `Coords@points` and the first line-level
/// `TextEquiv/Unicode` (with `conf`). Word and glyph children are skipped.
/// The bounding rectangle is derived from the polygon.
pub fn parse_page_xml(xml: &str) -> ParsedPage {
    let mut page = ParsedPage::new(LayoutFormat::Page);
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut current: Option<LineBuilder> = None;
    let mut line_tags = 0usize;
    let mut stats = SkipStats::default();

    // Depth of Word/Glyph elements inside the current line
    let mut nested_depth = 0usize;
    let mut in_equiv = false;
    let mut in_unicode = false;
    let mut unicode_buf = String::new();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    position = reader.buffer_position(),
                    error = %e,
                    "Malformed PAGE XML, keeping regions parsed so far"
                );
                break;
            }
        };

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"Page" if !page.dimensions_declared => {
                        if let (Some(w), Some(h)) =
                            (attr_dim(e, b"imageWidth"), attr_dim(e, b"imageHeight"))
                        {
                            page.page_width = w;
                            page.page_height = h;
                            page.dimensions_declared = true;
                        }
                    }
                    b"TextLine" => {
                        line_tags += 1;
                        if is_empty {
                            stats.skip_bare_line();
                        } else {
                            current = Some(LineBuilder {
                                id: attr(e, b"id"),
                                ..Default::default()
                            });
                            nested_depth = 0;
                        }
                    }
                    b"Word" | b"Glyph" if current.is_some() && !is_empty => {
                        nested_depth += 1;
                    }
                    b"Coords" if nested_depth == 0 => {
                        if let Some(line) = current.as_mut() {
                            if line.polygon.is_none() {
                                line.polygon = attr(e, b"points").map(|p| parse_polygon(&p));
                            }
                        }
                    }
                    b"TextEquiv" if nested_depth == 0 && !is_empty => {
                        if let Some(line) = current.as_mut() {
                            if line.line_text.is_none() {
                                in_equiv = true;
                                line.confidence = attr_num(e, b"conf");
                            }
                        }
                    }
                    b"Unicode" if in_equiv && !is_empty => {
                        in_unicode = true;
                        unicode_buf.clear();
                    }
                    _ => {}
                }
            }
            Event::Text(ref t) if in_unicode => {
                if let Ok(text) = t.unescape() {
                    unicode_buf.push_str(&text);
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"Unicode" if in_unicode => {
                    in_unicode = false;
                    if let Some(line) = current.as_mut() {
                        line.line_text = Some(std::mem::take(&mut unicode_buf));
                    }
                }
                b"TextEquiv" if in_equiv => {
                    in_equiv = false;
                }
                b"Word" | b"Glyph" if nested_depth > 0 => {
                    nested_depth -= 1;
                }
                b"TextLine" => {
                    if let Some(region) = current.take().and_then(|line| line.build(&mut stats)) {
                        page.regions.push(region);
                    }
                    in_equiv = false;
                    in_unicode = false;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    assign_missing_ids(&mut page.regions);
    let page = page.finish();
    log_summary(&page, line_tags, &stats);
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alto::{DEFAULT_PAGE_HEIGHT, DEFAULT_PAGE_WIDTH};

    const ALTO_WORD_LEVEL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<alto xmlns="http://www.loc.gov/standards/alto/ns-v4#">
  <Layout>
    <Page ID="p1" WIDTH="5379" HEIGHT="600">
      <PrintSpace>
        <TextBlock ID="region0">
          <TextLine ID="_30002056_00010_region0_line0" HPOS="10" VPOS="20" HEIGHT="40" WIDTH="300">
            <Shape><Polygon POINTS="10,20 310,20 310,60 10,60"/></Shape>
            <String CONTENT="sedan" HPOS="10" VPOS="20" WIDTH="120" HEIGHT="40"/>
            <SP/>
            <String CONTENT="han" HPOS="140" VPOS="20" WIDTH="100" HEIGHT="40"/>
          </TextLine>
          <TextLine ID="line1" HPOS="10" VPOS="70" HEIGHT="40" WIDTH="300">
            <Shape><Polygon POINTS="10,70 310,70 310,110"/></Shape>
            <String CONTENT="och"/>
          </TextLine>
          <TextLine ID="no-polygon" HPOS="10" VPOS="120" HEIGHT="40" WIDTH="300">
            <String CONTENT="lost"/>
          </TextLine>
          <TextLine ID="no-text" HPOS="10" VPOS="170" HEIGHT="40" WIDTH="300">
            <Shape><Polygon POINTS="10,170 310,170 310,210 10,210"/></Shape>
          </TextLine>
          <TextLine ID="two-points" HPOS="10" VPOS="220" HEIGHT="40" WIDTH="300">
            <Shape><Polygon POINTS="10,220 310,220 bogus"/></Shape>
            <String CONTENT="short"/>
          </TextLine>
        </TextBlock>
      </PrintSpace>
    </Page>
  </Layout>
</alto>"#;

    const ALTO_LINE_LEVEL: &str = r#"<alto xmlns="http://www.loc.gov/standards/alto/ns-v4#">
  <Layout>
    <Page WIDTH="1511" HEIGHT="2413" PHYSICAL_IMG_NR="1">
      <PrintSpace>
        <TextBlock>
          <TextLine WIDTH="500" VPOS="203" HPOS="355" ID="451511_1512_01_textline0" HEIGHT="57">
            <Shape><Polygon POINTS="355,203 855,203 855,260 355,260"/></Shape>
            <String CONTENT="Mommouth den 29 1882." WC="0.9862444319434949"/>
          </TextLine>
        </TextBlock>
      </PrintSpace>
    </Page>
  </Layout>
</alto>"#;

    const PAGE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<PcGts xmlns="http://schema.primaresearch.org/PAGE/gts/pagecontent/2013-07-15">
  <Page imageFilename="451511.jpg" imageWidth="1511" imageHeight="2413">
    <TextRegion id="r0">
      <Coords points="300,150 1400,150 1400,900 300,900"/>
      <TextLine id="451511_1512_01_textline0">
        <Coords points="355,203 855,203 855,260 355,260"/>
        <Baseline points="355,250 855,250"/>
        <Word id="w0">
          <Coords points="1,1 2,2 3,3"/>
          <TextEquiv conf="0.5"><Unicode>Mommouth</Unicode></TextEquiv>
        </Word>
        <TextEquiv conf="0.9862444319434949">
          <Unicode>Mommouth den 29 1882.</Unicode>
        </TextEquiv>
      </TextLine>
      <TextLine id="empty-line">
        <Coords points="355,300 855,300 855,360 355,360"/>
        <TextEquiv><Unicode></Unicode></TextEquiv>
      </TextLine>
    </TextRegion>
  </Page>
</PcGts>"#;

    #[test]
    fn test_parse_alto_word_level() {
        let data = parse_alto_xml(ALTO_WORD_LEVEL);

        assert_eq!(data.page_width, 5379);
        assert_eq!(data.page_height, 600);
        assert!(data.dimensions_declared);
        assert_eq!(data.regions.len(), 2);

        let first = &data.regions[0];
        assert_eq!(first.id, "_30002056_00010_region0_line0");
        assert_eq!(first.transcription, "sedan han");
        assert_eq!(first.polygon.len(), 4);
        assert_eq!((first.hpos, first.vpos, first.width, first.height), (10, 20, 300, 40));
        assert!(first.confidence.is_none());

        assert_eq!(data.regions[1].id, "line1");
        assert_eq!(data.full_text, "sedan han\noch");
    }

    #[test]
    fn test_parse_alto_line_level_confidence() {
        let data = parse_alto_xml(ALTO_LINE_LEVEL);

        assert_eq!(data.dimensions(), (1511, 2413));
        assert_eq!(data.regions.len(), 1);

        let first = &data.regions[0];
        assert_eq!(first.id, "451511_1512_01_textline0");
        assert_eq!(first.transcription, "Mommouth den 29 1882.");
        assert!((first.confidence.unwrap() - 0.9862444319434949).abs() < 1e-6);
    }

    #[test]
    fn test_attribute_order_does_not_matter() {
        let data = parse_alto_xml(ALTO_LINE_LEVEL);
        let first = &data.regions[0];
        assert_eq!((first.hpos, first.vpos, first.width, first.height), (355, 203, 500, 57));
    }

    #[test]
    fn test_missing_page_dimensions_use_defaults() {
        let xml = r#"<alto><Layout><Page>
            <TextLine ID="a"><Polygon POINTS="0,0 1,0 1,1"/><String CONTENT="x"/></TextLine>
        </Page></Layout></alto>"#;
        let data = parse_alto_xml(xml);

        assert_eq!(data.page_width, DEFAULT_PAGE_WIDTH);
        assert_eq!(data.page_height, DEFAULT_PAGE_HEIGHT);
        assert!(!data.dimensions_declared);
        assert_eq!(data.regions.len(), 1);
    }

    #[test]
    fn test_missing_id_gets_generated() {
        let xml = r#"<alto><Page WIDTH="10" HEIGHT="10">
            <TextLine><Polygon POINTS="0,0 1,0 1,1"/><String CONTENT="x"/></TextLine>
            <TextLine><Polygon POINTS="0,0 1,0 1,1"/><String CONTENT="y"/></TextLine>
        </Page></alto>"#;
        let data = parse_alto_xml(xml);
        let ids: Vec<_> = data.regions.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["line0", "line1"]);
    }

    #[test]
    fn test_generated_ids_skip_explicit_ones() {
        let xml = r#"<alto><Page WIDTH="10" HEIGHT="10">
            <TextLine><Polygon POINTS="0,0 1,0 1,1"/><String CONTENT="x"/></TextLine>
            <TextLine ID="line0"><Polygon POINTS="0,0 1,0 1,1"/><String CONTENT="y"/></TextLine>
            <TextLine ID=""><Polygon POINTS="0,0 1,0 1,1"/><String CONTENT="z"/></TextLine>
            <TextLine ID="line2"><Polygon POINTS="0,0 1,0 1,1"/><String CONTENT="w"/></TextLine>
        </Page></alto>"#;
        let data = parse_alto_xml(xml);
        let ids: Vec<_> = data.regions.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["line1", "line0", "line3", "line2"]);

        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_self_closing_lines_are_skipped() {
        let xml = r#"<alto><Page WIDTH="10" HEIGHT="10">
            <TextLine ID="bare"/>
            <TextLine><Polygon POINTS="0,0 1,0 1,1"/><String CONTENT="x"/></TextLine>
        </Page></alto>"#;
        let data = parse_alto_xml(xml);
        assert_eq!(data.regions.len(), 1);
        assert_eq!(data.regions[0].id, "line0");
    }

    #[test]
    fn test_truncated_xml_keeps_completed_regions() {
        let truncated = &ALTO_WORD_LEVEL[..ALTO_WORD_LEVEL.find("no-polygon").unwrap()];
        let data = parse_alto_xml(truncated);
        assert_eq!(data.regions.len(), 2);
    }

    #[test]
    fn test_garbage_input_yields_empty_page() {
        let data = parse_alto_xml("this is <<< not xml at all");
        assert!(data.regions.is_empty());

        let data = parse_alto_xml("");
        assert!(data.regions.is_empty());
        assert_eq!(data.page_width, DEFAULT_PAGE_WIDTH);
    }

    #[test]
    fn test_mismatched_tags_degrade() {
        let xml = r#"<alto><Page WIDTH="10" HEIGHT="10">
            <TextLine ID="ok"><Polygon POINTS="0,0 1,0 1,1"/><String CONTENT="x"/></TextLine>
            <TextLine ID="broken"><Polygon POINTS="0,0 1,0 1,1"/><String CONTENT="y"/></Nope>
        </Page></alto>"#;
        let data = parse_alto_xml(xml);
        assert_eq!(data.regions.len(), 1);
        assert_eq!(data.regions[0].id, "ok");
    }

    #[test]
    fn test_filter_is_idempotent() {
        let data = parse_alto_xml(ALTO_WORD_LEVEL);
        for region in &data.regions {
            assert!(region.polygon.len() >= MIN_POLYGON_POINTS);
            assert!(!region.transcription.is_empty());
        }
    }

    #[test]
    fn test_parse_page_xml() {
        let data = parse_page_xml(PAGE_XML);

        assert_eq!(data.dimensions(), (1511, 2413));
        assert_eq!(data.format, LayoutFormat::Page);
        assert_eq!(data.regions.len(), 1);

        let first = &data.regions[0];
        assert_eq!(first.id, "451511_1512_01_textline0");
        assert_eq!(first.transcription, "Mommouth den 29 1882.");
        assert!((first.confidence.unwrap() - 0.9862444319434949).abs() < 1e-6);
        // Line Coords, not the word's
        assert_eq!(first.polygon.len(), 4);
        // Bounding box computed from polygon coords
        assert_eq!(first.hpos, 355);
        assert_eq!(first.vpos, 203);
        assert_eq!(first.width, 500);
        assert_eq!(first.height, 57);
    }

    #[test]
    fn test_detect_and_parse() {
        assert_eq!(detect_format(ALTO_LINE_LEVEL), LayoutFormat::Alto);
        assert_eq!(detect_format(PAGE_XML), LayoutFormat::Page);

        let alto = detect_and_parse(ALTO_LINE_LEVEL);
        let page = detect_and_parse(PAGE_XML);
        assert_eq!(alto.regions[0].transcription, page.regions[0].transcription);
        assert_eq!(alto.regions[0].id, page.regions[0].id);
        assert_eq!(alto.dimensions(), page.dimensions());
    }
}
