//! View-side errors

use crate::proxy::{ErrorCode, ToolError};

use super::local::IngestError;

/// The host channel could not complete a round trip
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    #[error("Host channel is not connected")]
    Disconnected,

    #[error("Host transport failed: {0}")]
    Transport(String),

    #[error("Host returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unreadable host response: {0}")]
    Decode(String),
}

/// A transfer or backend call that did not produce a usable result
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransferError {
    /// The backend answered with a tagged error
    #[error("{}", .0.message)]
    Remote(ToolError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Expected a {expected} result, got {got}")]
    UnexpectedResponse { expected: &'static str, got: &'static str },

    #[error("Chunk offset {got} does not match requested offset {expected}")]
    OffsetMismatch { expected: u64, got: u64 },

    #[error("Chunk declares {declared} bytes but carries {decoded}")]
    ByteCountMismatch { declared: u64, decoded: u64 },

    #[error("Empty chunk at offset {offset} with more data pending")]
    EmptyChunk { offset: u64 },

    #[error("Payload size changed mid-transfer from {before} to {after}")]
    TotalChanged { before: u64, after: u64 },

    #[error("Received {received} bytes of a {total}-byte payload")]
    Overrun { received: u64, total: u64 },

    #[error("Transfer ended at {received} of {total} bytes")]
    Truncated { received: u64, total: u64 },

    #[error("Chunk is not valid base64: {0}")]
    Decode(String),

    /// A newer navigation started; the result was dropped
    #[error("Superseded by a newer request")]
    Superseded,
}

impl TransferError {
    /// The backend rejected the locator itself
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Remote(e) if e.code == ErrorCode::Validation)
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded)
    }

    /// Whether re-triggering the operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote(e) => e.retryable,
            Self::Channel(ChannelError::Transport(_)) => true,
            _ => false,
        }
    }
}

/// Session-level failure
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Image could not be opened: {0}")]
    Surface(String),

    #[error("Document has no pages")]
    EmptyDocument,

    #[error("Not allowed while {0}")]
    InvalidState(&'static str),
}
