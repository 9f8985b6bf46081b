//! Wire types for the host-proxied call interface
//!
//! Every call and every result is a tagged variant, so both ends decide the
//! shape once at the boundary instead of probing for fields.

use serde::{Deserialize, Serialize};

use crate::alto::TextRegion;

// ============================================================================
// Calls
// ============================================================================

/// A call from the view to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "kebab-case")]
pub enum ToolCall {
    GetDocumentMetadata(DocumentSource),
    ReadBytes(ReadBytesRequest),
    ReadRegions(ReadRegionsRequest),
    ReadImageInfo(ReadImageInfoRequest),
    LoadThumbnails(ThumbnailRequest),
    NotifySelection(SelectionRequest),
}

impl ToolCall {
    /// Tool name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::GetDocumentMetadata(_) => "get-document-metadata",
            ToolCall::ReadBytes(_) => "read-bytes",
            ToolCall::ReadRegions(_) => "read-regions",
            ToolCall::ReadImageInfo(_) => "read-image-info",
            ToolCall::LoadThumbnails(_) => "load-thumbnails",
            ToolCall::NotifySelection(_) => "notify-selection",
        }
    }
}

/// Where a document's pages come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DocumentSource {
    /// Paired lists: `image_urls[i]` goes with `alto_urls[i]`
    Urls {
        #[serde(rename = "imageUrls")]
        image_urls: Vec<String>,
        #[serde(rename = "altoUrls")]
        alto_urls: Vec<String>,
    },
    /// IIIF Presentation manifest
    Manifest { url: String },
    /// Single archive image id, e.g. `A0068523_00007`
    ImageId {
        #[serde(rename = "imageId")]
        image_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadBytesRequest {
    pub locator: String,
    pub offset: u64,
    pub max_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRegionsRequest {
    pub locator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadImageInfoRequest {
    /// Image API URL, service id, or `info.json` URL
    pub locator: String,
}

/// Batch of page images to shrink; `image_urls[i]` is page `page_indices[i]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailRequest {
    pub image_urls: Vec<String>,
    pub page_indices: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,
}

/// Rectangle of a selected line, in source-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionBounds {
    pub hpos: i64,
    pub vpos: i64,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRequest {
    pub page_index: usize,
    pub region_id: String,
    pub transcription: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<RegionBounds>,
}

// ============================================================================
// Results
// ============================================================================

/// A backend result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ToolResponse {
    Metadata(DocumentMetadata),
    Chunk(ChunkResponse),
    Regions(RegionsResponse),
    ImageInfo(ImageInfo),
    Thumbnails(ThumbnailsResponse),
    SelectionAck(SelectionAck),
    Error(ToolError),
}

impl ToolResponse {
    /// Variant name, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            ToolResponse::Metadata(_) => "metadata",
            ToolResponse::Chunk(_) => "chunk",
            ToolResponse::Regions(_) => "regions",
            ToolResponse::ImageInfo(_) => "imageInfo",
            ToolResponse::Thumbnails(_) => "thumbnails",
            ToolResponse::SelectionAck(_) => "selectionAck",
            ToolResponse::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub total_pages: usize,
    pub page_locators: Vec<String>,
    pub alto_locators: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// One slice of a byte payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    /// Base64 (standard alphabet, padded) chunk data
    pub bytes: String,
    /// Offset this chunk starts at
    pub offset: u64,
    /// Decoded length of `bytes`
    pub byte_count: u64,
    pub total_bytes: u64,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionsResponse {
    pub text_lines: Vec<TextRegion>,
    pub page_width: u32,
    pub page_height: u32,
    /// False when the size is the fallback rather than read from the layout
    #[serde(default)]
    pub dimensions_declared: bool,
    /// Transcriptions joined line by line
    #[serde(default)]
    pub full_text: String,
    /// One-line description for the model
    #[serde(default)]
    pub summary: String,
}

/// Pixel size from an image service's `info.json`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thumbnail {
    pub index: usize,
    /// `data:image/jpeg;base64,...`
    pub data_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailsResponse {
    /// Sorted by page index; failed pages are absent
    pub thumbnails: Vec<Thumbnail>,
    #[serde(default)]
    pub errors: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionAck {
    /// Model-facing description of the selection
    pub message: String,
}

/// Failure category carried across the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Locator rejected; never retried
    Validation,
    /// Upstream fetch failed, payload too large, or chunk malformed
    Transfer,
    /// Arguments could not be served
    InvalidRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_wire_shape() {
        let call = ToolCall::ReadBytes(ReadBytesRequest {
            locator: "https://h/x.jpg".to_string(),
            offset: 1024,
            max_bytes: 512,
        });
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(
            value,
            json!({
                "tool": "read-bytes",
                "arguments": {"locator": "https://h/x.jpg", "offset": 1024, "maxBytes": 512}
            })
        );
        assert_eq!(call.name(), "read-bytes");
    }

    #[test]
    fn test_document_source_shape() {
        let source: DocumentSource = serde_json::from_value(json!({
            "type": "urls",
            "imageUrls": ["a"],
            "altoUrls": ["b"]
        }))
        .unwrap();
        assert_eq!(
            source,
            DocumentSource::Urls {
                image_urls: vec!["a".to_string()],
                alto_urls: vec!["b".to_string()],
            }
        );

        let source: DocumentSource =
            serde_json::from_value(json!({"type": "imageId", "imageId": "A1_2"})).unwrap();
        assert_eq!(source, DocumentSource::ImageId { image_id: "A1_2".to_string() });
    }

    #[test]
    fn test_response_is_tagged() {
        let response = ToolResponse::Error(ToolError {
            code: ErrorCode::Validation,
            message: "nope".to_string(),
            retryable: false,
        });
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["kind"], "error");
        assert_eq!(value["code"], "validation");

        let chunk: ToolResponse = serde_json::from_value(json!({
            "kind": "chunk",
            "bytes": "",
            "offset": 0,
            "byteCount": 0,
            "totalBytes": 0,
            "hasMore": false
        }))
        .unwrap();
        assert_eq!(chunk.kind(), "chunk");
    }

    #[test]
    fn test_thumbnail_call_shape() {
        let call: ToolCall = serde_json::from_value(json!({
            "tool": "load-thumbnails",
            "arguments": {"imageUrls": ["https://h/a.jpg"], "pageIndices": [3]}
        }))
        .unwrap();
        assert_eq!(call.name(), "load-thumbnails");
        assert_eq!(
            call,
            ToolCall::LoadThumbnails(ThumbnailRequest {
                image_urls: vec!["https://h/a.jpg".to_string()],
                page_indices: vec![3],
                max_width: None,
            })
        );

        // Older peers omit the text fields
        let regions: ToolResponse = serde_json::from_value(json!({
            "kind": "regions",
            "textLines": [],
            "pageWidth": 10,
            "pageHeight": 20
        }))
        .unwrap();
        match regions {
            ToolResponse::Regions(r) => {
                assert!(!r.dimensions_declared);
                assert!(r.full_text.is_empty());
            }
            other => panic!("expected regions, got {:?}", other),
        }
    }
}
