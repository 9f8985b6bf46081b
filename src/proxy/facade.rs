//! Backend proxy façade
//!
//! Serves the view's calls against the archive. Every call validates its
//! locators first; nothing reaches the network before that.
//!
//! Byte reads ask the upstream for just the requested window. When the
//! upstream honors the range the slice is returned as is; when it sends the
//! whole body instead, the body is cached and later offsets are served from
//! the cached copy.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use futures::stream::{self, StreamExt};
use lru::LruCache;
use parking_lot::Mutex;
use reqwest::Url;

use super::cache::{ByteCache, CachePolicy, CachedBody};
use super::error::ProxyError;
use super::thumbnail::{thumbnail_data_url, THUMBNAIL_MAX_WIDTH};
use super::types::{
    ChunkResponse, DocumentMetadata, DocumentSource, ImageInfo, ReadBytesRequest, RegionsResponse,
    SelectionAck, SelectionRequest, Thumbnail, ThumbnailRequest, ThumbnailsResponse, ToolCall, ToolResponse,
};
use super::upstream::{ByteRange, HttpUpstream, Upstream, UpstreamBody};
use super::validate::{LocatorValidator, ValidationError};
use crate::alto::detect_and_parse;
use crate::config::ProxyConfig;
use crate::iiif::{
    crop_url, image_url_for_service, info_url_for, manifest_title, parse_manifest_pages, service_base_of,
};

/// Padding around a selected line in the crop URL, in image pixels
pub const CROP_PADDING: i64 = 20;

/// Thumbnails fetched at once per batch
pub const THUMBNAIL_CONCURRENCY: usize = 4;

/// Encoded thumbnails kept, keyed by locator and width
const THUMBNAIL_CACHE_ENTRIES: usize = 128;

/// Upper bound on an `info.json` lookup
pub const INFO_TIMEOUT: Duration = Duration::from_secs(15);

/// Backend entry point for all proxied calls
#[derive(Clone)]
pub struct ProxyFacade {
    inner: Arc<FacadeInner>,
}

struct FacadeInner {
    config: ProxyConfig,
    validator: LocatorValidator,
    upstream: Arc<dyn Upstream>,
    cache: ByteCache,
    thumbnails: Mutex<LruCache<String, String>>,
}

impl ProxyFacade {
    pub fn new(config: ProxyConfig, upstream: Arc<dyn Upstream>) -> Self {
        let validator = LocatorValidator::new(&config.allowed_hosts, config.resolve_dns);
        let cache = ByteCache::new(CachePolicy::from(&config));
        Self {
            inner: Arc::new(FacadeInner {
                config,
                validator,
                upstream,
                cache,
                thumbnails: Mutex::new(LruCache::new(
                    NonZeroUsize::new(THUMBNAIL_CACHE_ENTRIES).unwrap_or(NonZeroUsize::MIN),
                )),
            }),
        }
    }

    /// Façade over HTTP upstreams
    pub fn from_config(config: ProxyConfig) -> Result<Self, ProxyError> {
        let upstream = HttpUpstream::new(&config)?;
        Ok(Self::new(config, Arc::new(upstream)))
    }

    pub fn cache(&self) -> &ByteCache {
        &self.inner.cache
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.inner.config
    }

    async fn validated(&self, locator: &str) -> Result<Url, ProxyError> {
        match self.inner.validator.validate_and_resolve(locator).await {
            Ok(url) => Ok(url),
            Err(e) => {
                tracing::warn!(locator, error = %e, "Rejected locator");
                Err(e.into())
            }
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Page list for a document, without fetching any page body
    pub async fn get_metadata(&self, source: &DocumentSource) -> Result<DocumentMetadata, ProxyError> {
        match source {
            DocumentSource::Urls { image_urls, alto_urls } => {
                if image_urls.len() != alto_urls.len() {
                    return Err(ValidationError::MismatchedLists {
                        images: image_urls.len(),
                        regions: alto_urls.len(),
                    }
                    .into());
                }
                if image_urls.is_empty() {
                    return Err(ProxyError::InvalidRequest("Document has no pages".to_string()));
                }
                for locator in image_urls.iter().chain(alto_urls) {
                    self.validated(locator).await?;
                }

                Ok(DocumentMetadata {
                    title: None,
                    total_pages: image_urls.len(),
                    page_locators: image_urls.clone(),
                    alto_locators: alto_urls.clone(),
                    labels: (1..=image_urls.len()).map(|n| format!("Page {}", n)).collect(),
                })
            }
            DocumentSource::Manifest { url } => self.manifest_metadata(url).await,
            DocumentSource::ImageId { image_id } => {
                let image_id = image_id.trim();
                if !is_valid_image_id(image_id) {
                    return Err(ValidationError::InvalidImageId(image_id.to_string()).into());
                }
                let archive = &self.inner.config.archive;
                let page_locator = archive.image_url(image_id, "max");
                let alto_locator = archive.alto_url(image_id);
                self.validated(&page_locator).await?;
                self.validated(&alto_locator).await?;

                Ok(DocumentMetadata {
                    title: Some(image_id.to_string()),
                    total_pages: 1,
                    page_locators: vec![page_locator],
                    alto_locators: vec![alto_locator],
                    labels: vec![image_id.to_string()],
                })
            }
        }
    }

    async fn manifest_metadata(&self, locator: &str) -> Result<DocumentMetadata, ProxyError> {
        let url = self.validated(locator).await?;
        let body = self.fetch_whole(&url).await?;
        let manifest: serde_json::Value = serde_json::from_slice(&body.data)
            .map_err(|e| ProxyError::MalformedUpstream(format!("Manifest is not JSON: {}", e)))?;

        let pages = parse_manifest_pages(&manifest);
        if pages.is_empty() {
            return Err(ProxyError::MalformedUpstream(
                "Manifest has no canvases with an image service".to_string(),
            ));
        }

        let archive = &self.inner.config.archive;
        let metadata = DocumentMetadata {
            title: manifest_title(&manifest),
            total_pages: pages.len(),
            page_locators: pages
                .iter()
                .map(|p| image_url_for_service(&p.service_id, "max"))
                .collect(),
            alto_locators: pages.iter().map(|p| archive.alto_url(&p.image_id)).collect(),
            labels: pages.iter().map(|p| p.label.clone()).collect(),
        };

        tracing::info!(manifest = %url, pages = metadata.total_pages, "Loaded manifest");
        Ok(metadata)
    }

    /// One window of a byte payload
    pub async fn read_bytes(&self, request: &ReadBytesRequest) -> Result<ChunkResponse, ProxyError> {
        let url = self.validated(&request.locator).await?;
        let max_bytes = request.max_bytes.min(self.inner.config.max_chunk_bytes as u64);
        if max_bytes == 0 {
            return Err(ProxyError::InvalidRequest("maxBytes must be positive".to_string()));
        }
        let key = url.as_str();

        if let Some(body) = self.inner.cache.get(key) {
            tracing::debug!(locator = key, offset = request.offset, "Serving chunk from cache");
            return slice_chunk(&body.data, request.offset, max_bytes);
        }

        let response = self
            .inner
            .upstream
            .fetch(&url, Some(ByteRange::new(request.offset, max_bytes)))
            .await?;

        match response.body {
            UpstreamBody::Partial { mut data, offset, total } => {
                if offset != request.offset {
                    return Err(ProxyError::MalformedUpstream(format!(
                        "Asked for offset {}, upstream sent {}",
                        request.offset, offset
                    )));
                }
                if total > self.inner.config.max_payload_bytes as u64 {
                    return Err(ProxyError::PayloadTooLarge {
                        limit: self.inner.config.max_payload_bytes,
                    });
                }
                if offset > total {
                    return Err(ProxyError::OffsetOutOfRange { offset, total });
                }
                data.truncate(max_bytes as usize);
                if data.is_empty() && offset < total {
                    return Err(ProxyError::MalformedUpstream("Empty partial response".to_string()));
                }

                let end = offset + data.len() as u64;
                tracing::debug!(locator = key, offset, size = data.len(), total, "Served ranged chunk");
                Ok(encode_chunk(&data, offset, total, end < total))
            }
            UpstreamBody::Full { data } => {
                self.check_payload(&data)?;
                let body = CachedBody::new(data, response.content_type);
                if !self.inner.cache.insert(key, body.clone()) {
                    tracing::info!(locator = key, size = body.len(), "Serving uncached oversize body");
                }
                slice_chunk(&body.data, request.offset, max_bytes)
            }
        }
    }

    /// Parsed regions for one page, in a single response
    pub async fn read_regions(&self, locator: &str) -> Result<RegionsResponse, ProxyError> {
        let url = self.validated(locator).await?;
        let body = self.fetch_whole(&url).await?;
        let xml = String::from_utf8_lossy(&body.data);
        let page = detect_and_parse(&xml);

        tracing::info!(
            locator = %url,
            regions = page.regions.len(),
            format = ?page.format,
            "Parsed region document"
        );
        let summary = format!(
            "{} text lines on a {}x{} page.",
            page.regions.len(),
            page.page_width,
            page.page_height
        );
        Ok(RegionsResponse {
            text_lines: page.regions,
            page_width: page.page_width,
            page_height: page.page_height,
            dimensions_declared: page.dimensions_declared,
            full_text: page.full_text,
            summary,
        })
    }

    /// Pixel size of the image behind a locator, from its `info.json`
    pub async fn read_image_info(&self, locator: &str) -> Result<ImageInfo, ProxyError> {
        let url = self.validated(&info_url_for(locator)).await?;
        let body = tokio::time::timeout(INFO_TIMEOUT, self.fetch_whole(&url))
            .await
            .map_err(|_| ProxyError::Timeout(url.to_string()))??;

        let info: ImageInfo = serde_json::from_slice(&body.data)
            .map_err(|e| ProxyError::MalformedUpstream(format!("Bad info.json: {}", e)))?;
        if info.width == 0 || info.height == 0 {
            return Err(ProxyError::MalformedUpstream("info.json has an empty size".to_string()));
        }

        tracing::debug!(locator = %url, width = info.width, height = info.height, "Read image info");
        Ok(info)
    }

    /// Shrink a batch of page images, at most four fetches at a time
    ///
    /// A page that fails is left out and reported in `errors`; the batch
    /// itself only fails on a malformed request.
    pub async fn load_thumbnails(&self, request: &ThumbnailRequest) -> Result<ThumbnailsResponse, ProxyError> {
        if request.image_urls.len() != request.page_indices.len() {
            return Err(ProxyError::InvalidRequest(format!(
                "{} image URLs for {} page indices",
                request.image_urls.len(),
                request.page_indices.len()
            )));
        }
        let max_width = request.max_width.unwrap_or(THUMBNAIL_MAX_WIDTH);
        if max_width == 0 {
            return Err(ProxyError::InvalidRequest("maxWidth must be positive".to_string()));
        }

        let results: Vec<(usize, Result<String, ProxyError>)> =
            stream::iter(
                request
                    .image_urls
                    .iter()
                    .cloned()
                    .zip(request.page_indices.iter().copied())
                    .collect::<Vec<(String, usize)>>(),
            )
            .map(|(locator, index)| async move { (index, self.thumbnail(&locator, max_width).await) })
                .buffer_unordered(THUMBNAIL_CONCURRENCY)
                .collect()
                .await;

        let mut thumbnails = Vec::new();
        let mut failed = Vec::new();
        for (index, result) in results {
            match result {
                Ok(data_url) => thumbnails.push(Thumbnail { index, data_url }),
                Err(e) => {
                    tracing::warn!(page = index, error = %e, "Thumbnail failed");
                    failed.push((index, e.to_string()));
                }
            }
        }
        thumbnails.sort_by_key(|t| t.index);
        failed.sort_by_key(|(index, _)| *index);

        let errors: Vec<String> = failed
            .into_iter()
            .map(|(index, message)| format!("Page {}: {}", index + 1, message))
            .collect();
        let mut summary = format!("Generated {} thumbnails.", thumbnails.len());
        if !errors.is_empty() {
            summary.push_str(&format!(" Errors: {}", errors.join("; ")));
        }

        tracing::info!(generated = thumbnails.len(), failed = errors.len(), "Loaded thumbnails");
        Ok(ThumbnailsResponse {
            thumbnails,
            errors,
            summary,
        })
    }

    async fn thumbnail(&self, locator: &str, max_width: u32) -> Result<String, ProxyError> {
        let url = self.validated(locator).await?;
        let key = format!("{}#{}", url, max_width);
        let cached = self.inner.thumbnails.lock().get(&key).cloned();
        if let Some(data_url) = cached {
            return Ok(data_url);
        }

        let body = match self.inner.cache.get(url.as_str()) {
            Some(body) => body,
            None => self.fetch_whole(&url).await?,
        };
        let data_url = tokio::task::spawn_blocking(move || {
            thumbnail_data_url(&body.data, body.content_type.as_deref(), max_width)
        })
        .await
        .map_err(|e| ProxyError::Image(e.to_string()))?
        .map_err(|e| ProxyError::Image(e.to_string()))?;

        self.inner.thumbnails.lock().put(key, data_url.clone());
        Ok(data_url)
    }

    /// Turn a selected line into a message for the model
    pub async fn notify_selection(&self, request: &SelectionRequest) -> Result<SelectionAck, ProxyError> {
        let crop = match (&request.image_locator, &request.bounds) {
            (Some(locator), Some(bounds)) => {
                self.validated(locator).await?;
                service_base_of(locator).map(|service| {
                    crop_url(
                        &service,
                        bounds.hpos,
                        bounds.vpos,
                        bounds.width,
                        bounds.height,
                        CROP_PADDING,
                    )
                })
            }
            _ => None,
        };

        let mut message = format!(
            "Text line selected\n\nPage: {}\nLine ID: {}\n\n",
            request.page_index + 1,
            request.region_id
        );
        if let Some(crop) = crop {
            message.push_str(&format!("Cropped image of text line:\n{}\n\n", crop));
        }
        message.push_str(&format!("Transcription:\n\"{}\"", request.transcription));

        tracing::info!(
            page = request.page_index,
            region = %request.region_id,
            "Selection forwarded"
        );
        Ok(SelectionAck { message })
    }

    /// Run a call, folding failures into the tagged error result
    pub async fn dispatch(&self, call: ToolCall) -> ToolResponse {
        let name = call.name();
        let result = match &call {
            ToolCall::GetDocumentMetadata(source) => self.get_metadata(source).await.map(ToolResponse::Metadata),
            ToolCall::ReadBytes(request) => self.read_bytes(request).await.map(ToolResponse::Chunk),
            ToolCall::ReadRegions(request) => self.read_regions(&request.locator).await.map(ToolResponse::Regions),
            ToolCall::ReadImageInfo(request) => {
                self.read_image_info(&request.locator).await.map(ToolResponse::ImageInfo)
            }
            ToolCall::LoadThumbnails(request) => self.load_thumbnails(request).await.map(ToolResponse::Thumbnails),
            ToolCall::NotifySelection(request) => {
                self.notify_selection(request).await.map(ToolResponse::SelectionAck)
            }
        };

        result.unwrap_or_else(|e| {
            tracing::warn!(tool = name, error = %e, "Tool call failed");
            ToolResponse::Error(e.to_tool_error())
        })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn fetch_whole(&self, url: &Url) -> Result<CachedBody, ProxyError> {
        let response = self.inner.upstream.fetch(url, None).await?;
        let data = match response.body {
            UpstreamBody::Full { data } => data,
            UpstreamBody::Partial { data, offset: 0, total } if data.len() as u64 == total => data,
            UpstreamBody::Partial { .. } => {
                return Err(ProxyError::MalformedUpstream(
                    "Partial response to a whole-body request".to_string(),
                ))
            }
        };
        self.check_payload(&data)?;
        Ok(CachedBody::new(data, response.content_type))
    }

    fn check_payload(&self, data: &[u8]) -> Result<(), ProxyError> {
        let limit = self.inner.config.max_payload_bytes;
        if data.len() > limit {
            return Err(ProxyError::PayloadTooLarge { limit });
        }
        Ok(())
    }
}

/// `A0068523_00007`-style ids: ASCII alphanumerics, `_` and `-`
fn is_valid_image_id(image_id: &str) -> bool {
    !image_id.is_empty()
        && image_id.len() <= 128
        && image_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn slice_chunk(data: &[u8], offset: u64, max_bytes: u64) -> Result<ChunkResponse, ProxyError> {
    let total = data.len() as u64;
    if offset > total {
        return Err(ProxyError::OffsetOutOfRange { offset, total });
    }
    let end = (offset + max_bytes).min(total);
    Ok(encode_chunk(&data[offset as usize..end as usize], offset, total, end < total))
}

fn encode_chunk(data: &[u8], offset: u64, total: u64, has_more: bool) -> ChunkResponse {
    ChunkResponse {
        bytes: base64::engine::general_purpose::STANDARD.encode(data),
        offset,
        byte_count: data.len() as u64,
        total_bytes: total,
        has_more,
    }
}
