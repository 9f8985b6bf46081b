//! Host channel
//!
//! The view reaches the backend only through a request/response channel
//! relayed by the host. The channel is injected into the session; there is
//! no ambient connection.

use async_trait::async_trait;

use super::error::{ChannelError, TransferError};
use crate::proxy::{
    DocumentMetadata, DocumentSource, ImageInfo, ProxyFacade, ReadImageInfoRequest, ReadRegionsRequest,
    RegionsResponse, SelectionAck, SelectionRequest, ThumbnailRequest, ThumbnailsResponse, ToolCall,
    ToolResponse,
};

/// One round trip to the backend
#[async_trait]
pub trait HostChannel: Send + Sync {
    async fn call(&self, call: ToolCall) -> Result<ToolResponse, ChannelError>;
}

// ============================================================================
// Implementations
// ============================================================================

/// Channel over the server's HTTP tool-call endpoint
pub struct HttpChannel {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpChannel {
    /// `base_url` is the server root, e.g. `http://localhost:3001`
    pub fn new(base_url: &str) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/v1/tools/call", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl HostChannel for HttpChannel {
    async fn call(&self, call: ToolCall) -> Result<ToolResponse, ChannelError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&call)
            .send()
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ToolResponse>()
            .await
            .map_err(|e| ChannelError::Decode(e.to_string()))
    }
}

/// Channel straight into a façade in the same process
#[derive(Clone)]
pub struct InProcessChannel {
    facade: ProxyFacade,
}

impl InProcessChannel {
    pub fn new(facade: ProxyFacade) -> Self {
        Self { facade }
    }
}

#[async_trait]
impl HostChannel for InProcessChannel {
    async fn call(&self, call: ToolCall) -> Result<ToolResponse, ChannelError> {
        Ok(self.facade.dispatch(call).await)
    }
}

// ============================================================================
// Typed calls
// ============================================================================

fn unexpected(expected: &'static str, response: ToolResponse) -> TransferError {
    match response {
        ToolResponse::Error(e) => TransferError::Remote(e),
        other => TransferError::UnexpectedResponse {
            expected,
            got: other.kind(),
        },
    }
}

pub async fn request_metadata(
    channel: &dyn HostChannel,
    source: DocumentSource,
) -> Result<DocumentMetadata, TransferError> {
    match channel.call(ToolCall::GetDocumentMetadata(source)).await? {
        ToolResponse::Metadata(metadata) => Ok(metadata),
        other => Err(unexpected("metadata", other)),
    }
}

pub async fn request_regions(channel: &dyn HostChannel, locator: &str) -> Result<RegionsResponse, TransferError> {
    let call = ToolCall::ReadRegions(ReadRegionsRequest {
        locator: locator.to_string(),
    });
    match channel.call(call).await? {
        ToolResponse::Regions(regions) => Ok(regions),
        other => Err(unexpected("regions", other)),
    }
}

pub async fn request_image_info(channel: &dyn HostChannel, locator: &str) -> Result<ImageInfo, TransferError> {
    let call = ToolCall::ReadImageInfo(ReadImageInfoRequest {
        locator: locator.to_string(),
    });
    match channel.call(call).await? {
        ToolResponse::ImageInfo(info) => Ok(info),
        other => Err(unexpected("imageInfo", other)),
    }
}

pub async fn request_thumbnails(
    channel: &dyn HostChannel,
    request: ThumbnailRequest,
) -> Result<ThumbnailsResponse, TransferError> {
    match channel.call(ToolCall::LoadThumbnails(request)).await? {
        ToolResponse::Thumbnails(response) => Ok(response),
        other => Err(unexpected("thumbnails", other)),
    }
}

pub async fn send_selection(
    channel: &dyn HostChannel,
    selection: SelectionRequest,
) -> Result<SelectionAck, TransferError> {
    match channel.call(ToolCall::NotifySelection(selection)).await? {
        ToolResponse::SelectionAck(ack) => Ok(ack),
        other => Err(unexpected("selectionAck", other)),
    }
}

// ============================================================================
// Test double
// ============================================================================

#[cfg(test)]
pub use mock::MockChannel;


#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{ErrorCode, ToolError};

    #[tokio::test]
    async fn test_error_result_becomes_remote_error() {
        let channel = MockChannel::scripted(vec![Ok(ToolResponse::Error(ToolError {
            code: ErrorCode::Validation,
            message: "Host is not a trusted origin: evil.test".to_string(),
            retryable: false,
        }))]);

        let err = request_regions(&channel, "https://evil.test/a.xml").await.unwrap_err();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_wrong_variant_is_rejected() {
        let channel = MockChannel::scripted(vec![Ok(ToolResponse::SelectionAck(SelectionAck {
            message: "ok".to_string(),
        }))]);

        let err = request_metadata(
            &channel,
            DocumentSource::ImageId {
                image_id: "A1_1".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            TransferError::UnexpectedResponse {
                expected: "metadata",
                got: "selectionAck"
            }
        ));
    }

    #[tokio::test]
    async fn test_http_channel_endpoint() {
        let channel = HttpChannel::new("http://localhost:3001/").unwrap();
        assert_eq!(channel.endpoint(), "http://localhost:3001/api/v1/tools/call");
    }
}
