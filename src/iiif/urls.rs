//! IIIF Image API and archive download URLs

/// Default archive host serving both the IIIF image API and ALTO downloads
pub const DEFAULT_ARCHIVE_BASE: &str = "https://lbiiif.riksarkivet.se";

/// Base URLs of the document archive
#[derive(Debug, Clone)]
pub struct ArchiveEndpoints {
    pub base_url: String,
}

impl Default for ArchiveEndpoints {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ARCHIVE_BASE.to_string(),
        }
    }
}

impl ArchiveEndpoints {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// IIIF image service for an archive image id
    pub fn service_for(&self, image_id: &str) -> String {
        format!("{}/arkis!{}", self.base_url, image_id)
    }

    /// Full page image for an archive image id
    pub fn image_url(&self, image_id: &str, size: &str) -> String {
        image_url_for_service(&self.service_for(image_id), size)
    }

    /// ALTO download for an archive image id
    pub fn alto_url(&self, image_id: &str) -> String {
        alto_url_for_image(&self.base_url, image_id)
    }
}

/// Document part of an archive image id (`A0068523_00007` -> `A0068523`)
pub fn document_id_of(image_id: &str) -> &str {
    image_id.split('_').next().unwrap_or(image_id)
}

/// `{service}/full/{size}/0/default.jpg`
pub fn image_url_for_service(service: &str, size: &str) -> String {
    format!("{}/full/{}/0/default.jpg", service.trim_end_matches('/'), size)
}

/// ALTO download URL for an archive image id
pub fn alto_url_for_image(base_url: &str, image_id: &str) -> String {
    format!(
        "{}/download/current/alto/{}?format=xml&imageid={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(document_id_of(image_id)),
        urlencoding::encode(image_id)
    )
}

/// Strip the region/size/rotation/quality segments off an Image API URL
///
/// Returns `None` when the URL has no `/full/` region segment.
pub fn service_base_of(image_url: &str) -> Option<String> {
    let url = image_url.trim_end_matches('/');
    let parts: Vec<&str> = url.split('/').collect();
    parts
        .iter()
        .position(|p| *p == "full")
        .filter(|i| *i >= 1)
        .map(|i| parts[..i].join("/"))
}

/// `info.json` endpoint describing the image behind a URL
///
/// Accepts an info URL as is, an Image API URL, or a bare service id.
pub fn info_url_for(image_url: &str) -> String {
    let url = image_url.trim_end_matches('/');
    if url.ends_with("/info.json") {
        return url.to_string();
    }
    let service = service_base_of(url).unwrap_or_else(|| url.to_string());
    format!("{}/info.json", service)
}

/// Region crop of a service, padded and clamped at the image origin
pub fn crop_url(service: &str, x: i64, y: i64, width: i64, height: i64, padding: i64) -> String {
    let crop_x = (x - padding).max(0);
    let crop_y = (y - padding).max(0);
    let crop_w = width.max(0) + padding * 2;
    let crop_h = height.max(0) + padding * 2;
    format!(
        "{}/{},{},{},{}/max/0/default.jpg",
        service.trim_end_matches('/'),
        crop_x,
        crop_y,
        crop_w,
        crop_h
    )
}

/// Archive image id from a service id
///
/// `https://lbiiif.riksarkivet.se/arkis!A0068523_00007` -> `A0068523_00007`,
/// otherwise the last path segment.
pub fn image_id_from_service(service_id: &str) -> String {
    if let Some((_, id)) = service_id.rsplit_once("arkis!") {
        return id.trim_end_matches('/').to_string();
    }
    service_id
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}
