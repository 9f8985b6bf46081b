//! Local file ingestion
//!
//! Builds a page from a region document and an image supplied directly by
//! the user, without any backend round trip. Both inputs must carry an
//! allowed extension, checked before anything is parsed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::alto::{detect_and_parse, ParsedPage};
use crate::proxy::thumbnail_data_url;

/// Extensions accepted for the region document
pub const REGION_EXTENSIONS: &[&str] = &["xml", "alto"];

/// Extensions accepted for the page image
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "webp", "gif"];

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Unsupported region document: {0} (expected .xml or .alto)")]
    UnsupportedRegionFile(String),

    #[error("Unsupported image file: {0} (expected jpg, png, tif, webp or gif)")]
    UnsupportedImageFile(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A page assembled from local files
#[derive(Debug, Clone)]
pub struct LocalPage {
    /// Image file name, used as the page label
    pub name: String,
    pub image: Arc<[u8]>,
    pub content_type: String,
    pub page: ParsedPage,
    /// Size read from the image header, when the header is readable
    pub image_size: Option<(u32, u32)>,
}

impl LocalPage {
    /// Coordinate space of the regions
    ///
    /// The layout's declared size wins; without one the image header is
    /// used, and only then the fallback.
    pub fn dimensions(&self) -> (u32, u32) {
        match (self.page.dimensions_declared, self.image_size) {
            (false, Some(size)) => size,
            _ => self.page.dimensions(),
        }
    }

    /// Thumbnail of the page image as a JPEG data URL
    pub fn thumbnail(&self, max_width: u32) -> Result<String, image::ImageError> {
        thumbnail_data_url(&self.image, Some(&self.content_type), max_width)
    }
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn has_extension(name: &str, allowed: &[&str]) -> bool {
    extension_of(name).is_some_and(|ext| allowed.contains(&ext.as_str()))
}

/// Check both names against the allowlists
pub fn check_file_types(region_name: &str, image_name: &str) -> Result<(), IngestError> {
    if !has_extension(region_name, REGION_EXTENSIONS) {
        return Err(IngestError::UnsupportedRegionFile(region_name.to_string()));
    }
    if !has_extension(image_name, IMAGE_EXTENSIONS) {
        return Err(IngestError::UnsupportedImageFile(image_name.to_string()));
    }
    Ok(())
}

/// Build a page from in-memory file contents
pub fn ingest_bytes(
    region_name: &str,
    region_bytes: &[u8],
    image_name: &str,
    image_bytes: Vec<u8>,
) -> Result<LocalPage, IngestError> {
    check_file_types(region_name, image_name)?;

    let xml = String::from_utf8_lossy(region_bytes);
    let page = detect_and_parse(&xml);

    let content_type = mime_guess::from_path(image_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    let image_size = image::ImageReader::new(std::io::Cursor::new(&image_bytes))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.into_dimensions().ok());
    if image_size.is_none() {
        tracing::warn!(image = image_name, "Could not read image header");
    }

    tracing::info!(
        regions = page.regions.len(),
        image = image_name,
        size = ?image_size,
        "Ingested local page"
    );

    Ok(LocalPage {
        name: image_name.to_string(),
        image: image_bytes.into(),
        content_type,
        page,
        image_size,
    })
}

/// Build a page from files on disk
pub async fn ingest_files(region_path: &Path, image_path: &Path) -> Result<LocalPage, IngestError> {
    let region_name = file_name(region_path);
    let image_name = file_name(image_path);
    check_file_types(&region_name, &image_name)?;

    let region_bytes = tokio::fs::read(region_path).await.map_err(|source| IngestError::Io {
        path: region_path.to_path_buf(),
        source,
    })?;
    let image_bytes = tokio::fs::read(image_path).await.map_err(|source| IngestError::Io {
        path: image_path.to_path_buf(),
        source,
    })?;

    ingest_bytes(&region_name, &region_bytes, &image_name, image_bytes)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::viewport::png_bytes;

    const ALTO: &str = r#"<alto><Layout><Page WIDTH="200" HEIGHT="100"><PrintSpace>
        <TextLine ID="l1" HPOS="0" VPOS="0" WIDTH="50" HEIGHT="10">
          <Shape><Polygon POINTS="0,0 50,0 50,10 0,10"/></Shape>
          <String CONTENT="Anno"/><String CONTENT="1723"/>
        </TextLine>
    </PrintSpace></Page></Layout></alto>"#;

    #[test]
    fn test_allowlists() {
        assert!(check_file_types("page.XML", "scan.JPG").is_ok());
        assert!(check_file_types("page.alto", "scan.tiff").is_ok());
        assert!(matches!(
            check_file_types("page.json", "scan.jpg"),
            Err(IngestError::UnsupportedRegionFile(_))
        ));
        assert!(matches!(
            check_file_types("page.xml", "scan.pdf"),
            Err(IngestError::UnsupportedImageFile(_))
        ));
        assert!(check_file_types("page", "scan.jpg").is_err());
    }

    #[test]
    fn test_ingest_bytes() {
        let page = ingest_bytes("p.xml", ALTO.as_bytes(), "p.png", png_bytes(200, 100)).unwrap();
        assert_eq!(page.page.regions.len(), 1);
        assert_eq!(page.page.regions[0].transcription, "Anno 1723");
        assert_eq!(page.content_type, "image/png");
        assert_eq!(page.image_size, Some((200, 100)));
        assert_eq!(page.dimensions(), (200, 100));
    }

    #[test]
    fn test_image_size_used_when_layout_has_none() {
        let xml = ALTO.replace(r#"<Page WIDTH="200" HEIGHT="100">"#, "<Page>");
        let page = ingest_bytes("p.xml", xml.as_bytes(), "p.png", png_bytes(300, 150)).unwrap();
        assert!(!page.page.dimensions_declared);
        assert_eq!(page.dimensions(), (300, 150));
    }

    #[test]
    fn test_local_thumbnail() {
        let page = ingest_bytes("p.xml", ALTO.as_bytes(), "p.png", png_bytes(300, 150)).unwrap();
        let url = page.thumbnail(150).unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));

        let broken = ingest_bytes("p.xml", ALTO.as_bytes(), "p.png", b"not a png".to_vec()).unwrap();
        assert!(broken.thumbnail(150).is_err());
    }

    #[test]
    fn test_rejected_before_parsing() {
        // Garbage that would otherwise parse to nothing
        let err = ingest_bytes("p.txt", b"\xff\xfe", "p.png", Vec::new()).unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedRegionFile(_)));
    }

    #[tokio::test]
    async fn test_ingest_files() {
        let dir = tempfile::tempdir().unwrap();
        let region_path = dir.path().join("page.xml");
        let image_path = dir.path().join("page.png");
        std::fs::write(&region_path, ALTO).unwrap();
        std::fs::write(&image_path, png_bytes(200, 100)).unwrap();

        let page = ingest_files(&region_path, &image_path).await.unwrap();
        assert_eq!(page.name, "page.png");
        assert_eq!(page.page.regions.len(), 1);

        let missing = dir.path().join("missing.png");
        let err = ingest_files(&region_path, &missing).await.unwrap_err();
        assert!(matches!(err, IngestError::Io { .. }));
    }
}
