//! Document and page model on the view side

use std::sync::Arc;

use crate::alto::TextRegion;
use crate::proxy::DocumentMetadata;

use super::local::LocalPage;

/// Where a page's image and regions come from
#[derive(Debug, Clone)]
pub enum PageSource {
    /// Fetched through the backend
    Remote {
        image_locator: String,
        region_locator: String,
    },
    /// Already in memory from local files
    Local(Arc<LocalPage>),
}

impl PageSource {
    /// Whether both name the same page content
    pub fn same_as(&self, other: &PageSource) -> bool {
        match (self, other) {
            (
                PageSource::Remote {
                    image_locator: a,
                    region_locator: ra,
                },
                PageSource::Remote {
                    image_locator: b,
                    region_locator: rb,
                },
            ) => a == b && ra == rb,
            (PageSource::Local(a), PageSource::Local(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// One page of the open document
#[derive(Debug, Clone)]
pub struct Page {
    pub index: usize,
    pub label: String,
    pub source: PageSource,
    /// Region coordinate space, known once the page has loaded
    pub dimensions: Option<(u32, u32)>,
    /// Populated when the page is viewed; replaced on every visit
    pub regions: Option<Vec<TextRegion>>,
    /// Transcription, one line per region, set with `regions`
    pub text: Option<String>,
    /// JPEG data URL for the page strip
    pub thumbnail: Option<String>,
}

impl Page {
    pub fn image_locator(&self) -> Option<&str> {
        match &self.source {
            PageSource::Remote { image_locator, .. } => Some(image_locator),
            PageSource::Local(_) => None,
        }
    }
}

/// Sequence of pages, replaced wholesale on every load
#[derive(Debug, Clone)]
pub struct Document {
    pub title: Option<String>,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn from_metadata(metadata: DocumentMetadata) -> Self {
        let DocumentMetadata {
            title,
            page_locators,
            alto_locators,
            labels,
            ..
        } = metadata;

        let pages = page_locators
            .into_iter()
            .zip(alto_locators)
            .enumerate()
            .map(|(index, (image_locator, region_locator))| Page {
                index,
                label: labels
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| format!("Page {}", index + 1)),
                source: PageSource::Remote {
                    image_locator,
                    region_locator,
                },
                dimensions: None,
                regions: None,
                text: None,
                thumbnail: None,
            })
            .collect();

        Self { title, pages }
    }

    pub fn from_local(page: LocalPage) -> Self {
        Self {
            title: Some(page.name.clone()),
            pages: vec![Page {
                index: 0,
                label: page.name.clone(),
                source: PageSource::Local(Arc::new(page)),
                dimensions: None,
                regions: None,
                text: None,
                thumbnail: None,
            }],
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_metadata_pairs_locators() {
        let document = Document::from_metadata(DocumentMetadata {
            title: Some("Protokoll".to_string()),
            total_pages: 2,
            page_locators: vec!["i0".to_string(), "i1".to_string()],
            alto_locators: vec!["a0".to_string(), "a1".to_string()],
            labels: vec!["Bild 1".to_string()],
        });

        assert_eq!(document.page_count(), 2);
        assert_eq!(document.pages[0].label, "Bild 1");
        assert_eq!(document.pages[1].label, "Page 2");
        assert_eq!(document.pages[1].image_locator(), Some("i1"));
        assert!(document.pages[1].regions.is_none());
    }

    #[test]
    fn test_same_source() {
        let remote = |image: &str| PageSource::Remote {
            image_locator: image.to_string(),
            region_locator: "a0".to_string(),
        };
        assert!(remote("i0").same_as(&remote("i0")));
        assert!(!remote("i0").same_as(&remote("i1")));
    }
}
