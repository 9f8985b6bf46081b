//! Backend Proxy
//!
//! Validates source locators, fetches from the archive, caches bodies that
//! are read in slices, and answers the view's calls with tagged results.

mod cache;
mod error;
mod facade;
mod thumbnail;
mod types;
mod upstream;
mod validate;

pub use cache::{ByteCache, CachePolicy, CacheStats, CachedBody};
pub use error::ProxyError;
pub use facade::{ProxyFacade, CROP_PADDING, INFO_TIMEOUT, THUMBNAIL_CONCURRENCY};
pub use thumbnail::{thumbnail_data_url, THUMBNAIL_MAX_WIDTH, THUMBNAIL_QUALITY};
pub use types::{
    ChunkResponse, DocumentMetadata, DocumentSource, ErrorCode, ImageInfo, ReadBytesRequest,
    ReadImageInfoRequest, ReadRegionsRequest, RegionBounds, RegionsResponse, SelectionAck,
    SelectionRequest, Thumbnail, ThumbnailRequest, ThumbnailsResponse, ToolCall, ToolError,
    ToolResponse,
};
pub use upstream::{parse_content_range, ByteRange, HttpUpstream, Upstream, UpstreamBody, UpstreamResponse};
pub use validate::{is_forbidden_ip, LocatorValidator, ValidationError};

#[cfg(test)]
pub use upstream::MockUpstream;
