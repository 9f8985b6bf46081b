//! Backend proxy errors

use super::types::{ErrorCode, ToolError};
use super::validate::ValidationError;

/// Failure of a proxied operation
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Locator rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error("Upstream returned {status} for {url}")]
    UpstreamStatus { status: u16, url: String },

    #[error("Upstream timed out: {0}")]
    Timeout(String),

    #[error("Upstream request failed: {0}")]
    Network(String),

    #[error("Payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Malformed upstream response: {0}")]
    MalformedUpstream(String),

    #[error("Could not decode image: {0}")]
    Image(String),

    #[error("Offset {offset} is beyond the payload size {total}")]
    OffsetOutOfRange { offset: u64, total: u64 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProxyError {
    /// Wire category
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::OffsetOutOfRange { .. } | Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::UpstreamStatus { .. }
            | Self::Timeout(_)
            | Self::Network(_)
            | Self::PayloadTooLarge { .. }
            | Self::MalformedUpstream(_)
            | Self::Image(_) => ErrorCode::Transfer,
        }
    }

    /// Whether repeating the same call may succeed
    pub fn retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) => true,
            Self::UpstreamStatus { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn to_tool_error(&self) -> ToolError {
        ToolError {
            code: self.code(),
            message: self.to_string(),
            retryable: self.retryable(),
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        if err.is_timeout() {
            ProxyError::Timeout(url)
        } else if let Some(status) = err.status() {
            ProxyError::UpstreamStatus {
                status: status.as_u16(),
                url,
            }
        } else {
            ProxyError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_is_distinguishable() {
        let err = ProxyError::from(ValidationError::HostNotAllowed("evil.test".to_string()));
        let wire = err.to_tool_error();
        assert_eq!(wire.code, ErrorCode::Validation);
        assert!(!wire.retryable);
    }

    #[test]
    fn test_retryable_statuses() {
        let status = |status| ProxyError::UpstreamStatus {
            status,
            url: "https://h/x".to_string(),
        };
        assert!(status(503).retryable());
        assert!(status(429).retryable());
        assert!(!status(404).retryable());
        assert!(ProxyError::Timeout("https://h/x".to_string()).retryable());
        assert!(!ProxyError::PayloadTooLarge { limit: 1 }.retryable());
        assert_eq!(status(404).code(), ErrorCode::Transfer);
    }
}
