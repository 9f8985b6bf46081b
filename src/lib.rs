//! Alto Viewer
//!
//! Document viewer core for archive page images with OCR text-line
//! overlays. The backend half proxies the archive behind locator
//! validation and a slice cache; the view half moves payloads over a
//! size-limited call channel, keeps a vector overlay registered to a
//! pan/zoom image surface, hit-tests pointer events against line polygons
//! and drives page navigation.

pub mod alto;
pub mod config;
pub mod error;
pub mod iiif;
pub mod proxy;
pub mod routes;
pub mod state;
pub mod viewer;
