//! View Side
//!
//! Everything that runs next to the page image: the call channel to the
//! host, chunked payload transfer, the overlay kept registered to the image
//! surface, pointer hit testing, and the session that ties them together.

mod cancel;
mod channel;
mod document;
mod error;
mod hit_test;
mod local;
mod session;
mod transfer;
mod viewport;

pub use cancel::{GenerationCounter, GenerationToken};
pub use channel::{
    request_image_info, request_metadata, request_regions, request_thumbnails, send_selection, HostChannel,
    HttpChannel, InProcessChannel,
};
pub use document::{Document, Page, PageSource};
pub use error::{ChannelError, TransferError, ViewerError};
pub use hit_test::{
    point_in_polygon, ClickOutcome, HitTester, HoverState, InteractionEngine, Selection, Tooltip,
    CLICK_THRESHOLD_SQ,
};
pub use local::{check_file_types, ingest_bytes, ingest_files, IngestError, LocalPage, IMAGE_EXTENSIONS, REGION_EXTENSIONS};
pub use session::{PageOutcome, SessionSnapshot, ViewState, ViewerConfig, ViewerEvent, ViewerSession, STATUS_TTL};
pub use transfer::{ChunkedTransferClient, TransferProgress, TransferSession, DEFAULT_CHUNK_BYTES};
pub use viewport::{
    HeadlessImageSurface, ImageSurface, OverlaySynchronizer, RegionSpace, SceneGraph, SceneShape, ShapeStyle, Size,
    VectorSurface, ViewportState, ViewportTransform,
};

#[cfg(test)]
pub use channel::MockChannel;
#[cfg(test)]
pub(crate) use viewport::png_bytes;
