//! IIIF helpers
//!
//! Presentation-manifest parsing (API 2 and 3) and Image API URL building
//! for the document archive.

mod manifest;
mod urls;

pub use manifest::{extract_label, manifest_title, parse_manifest_pages, ManifestPage};
pub use urls::{
    alto_url_for_image, crop_url, document_id_of, image_id_from_service,
    image_url_for_service, info_url_for, service_base_of, ArchiveEndpoints,
};
