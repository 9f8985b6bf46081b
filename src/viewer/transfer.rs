//! Chunked transfer client
//!
//! Pulls a payload through the host channel one bounded chunk at a time.
//! Requests are strictly sequential: the next offset is only asked for once
//! the previous chunk has been checked and appended. Any failure aborts the
//! whole transfer and a retry starts again from offset 0.

use std::sync::Arc;

use base64::Engine;

use super::cancel::GenerationToken;
use super::channel::HostChannel;
use super::error::TransferError;
use crate::proxy::{ChunkResponse, ReadBytesRequest, ToolCall, ToolResponse};

/// Default per-call chunk size, matching the backend ceiling
pub const DEFAULT_CHUNK_BYTES: u64 = 512 * 1024;

/// Bytes received so far out of the payload size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub received: u64,
    pub total: u64,
}

impl TransferProgress {
    /// Fraction in `0.0..=1.0`; an empty payload counts as complete
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.received as f64 / self.total as f64
        }
    }
}

/// State of one chunked fetch
#[derive(Debug)]
pub struct TransferSession {
    locator: String,
    offset: u64,
    total: Option<u64>,
    buffer: Vec<u8>,
    done: bool,
}

impl TransferSession {
    pub fn new(locator: &str) -> Self {
        Self {
            locator: locator.to_string(),
            offset: 0,
            total: None,
            buffer: Vec::new(),
            done: false,
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Offset the next request must ask for
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn progress(&self) -> Option<TransferProgress> {
        self.total.map(|total| TransferProgress {
            received: self.offset,
            total,
        })
    }

    /// Check a chunk against the session and append it
    pub fn apply(&mut self, chunk: &ChunkResponse) -> Result<(), TransferError> {
        if chunk.offset != self.offset {
            return Err(TransferError::OffsetMismatch {
                expected: self.offset,
                got: chunk.offset,
            });
        }

        match self.total {
            Some(total) if total != chunk.total_bytes => {
                return Err(TransferError::TotalChanged {
                    before: total,
                    after: chunk.total_bytes,
                })
            }
            Some(_) => {}
            None => {
                self.total = Some(chunk.total_bytes);
                self.buffer.reserve(chunk.total_bytes.min(64 * 1024 * 1024) as usize);
            }
        }

        let data = base64::engine::general_purpose::STANDARD
            .decode(chunk.bytes.as_bytes())
            .map_err(|e| TransferError::Decode(e.to_string()))?;
        if data.len() as u64 != chunk.byte_count {
            return Err(TransferError::ByteCountMismatch {
                declared: chunk.byte_count,
                decoded: data.len() as u64,
            });
        }
        if data.is_empty() && chunk.has_more {
            return Err(TransferError::EmptyChunk { offset: chunk.offset });
        }

        let received = self.offset + chunk.byte_count;
        if received > chunk.total_bytes {
            return Err(TransferError::Overrun {
                received,
                total: chunk.total_bytes,
            });
        }

        if !chunk.has_more && received != chunk.total_bytes {
            tracing::warn!(
                locator = %self.locator,
                received,
                total = chunk.total_bytes,
                "Transfer ended short of declared size"
            );
            return Err(TransferError::Truncated {
                received,
                total: chunk.total_bytes,
            });
        }

        self.buffer.extend_from_slice(&data);
        self.offset = received;
        self.done = !chunk.has_more;
        Ok(())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Client for chunked payload fetches over a host channel
#[derive(Clone)]
pub struct ChunkedTransferClient {
    channel: Arc<dyn HostChannel>,
    chunk_bytes: u64,
}

impl ChunkedTransferClient {
    pub fn new(channel: Arc<dyn HostChannel>) -> Self {
        Self::with_chunk_size(channel, DEFAULT_CHUNK_BYTES)
    }

    pub fn with_chunk_size(channel: Arc<dyn HostChannel>, chunk_bytes: u64) -> Self {
        Self {
            channel,
            chunk_bytes: chunk_bytes.max(1),
        }
    }

    pub fn chunk_bytes(&self) -> u64 {
        self.chunk_bytes
    }

    /// Fetch a whole payload
    ///
    /// `on_progress` runs after every accepted chunk. Returns
    /// [`TransferError::Superseded`] as soon as `token` goes stale; the call
    /// in flight at that moment still completes but its chunk is dropped.
    pub async fn fetch<F>(
        &self,
        locator: &str,
        token: &GenerationToken,
        mut on_progress: F,
    ) -> Result<Vec<u8>, TransferError>
    where
        F: FnMut(TransferProgress) + Send,
    {
        let mut session = TransferSession::new(locator);
        let mut requests = 0u32;

        while !session.is_done() {
            if token.is_stale() {
                tracing::debug!(locator, offset = session.offset(), "Transfer superseded");
                return Err(TransferError::Superseded);
            }

            let call = ToolCall::ReadBytes(ReadBytesRequest {
                locator: locator.to_string(),
                offset: session.offset(),
                max_bytes: self.chunk_bytes,
            });
            let response = self.channel.call(call).await?;
            requests += 1;

            if token.is_stale() {
                tracing::debug!(locator, offset = session.offset(), "Dropping chunk of superseded transfer");
                return Err(TransferError::Superseded);
            }

            let chunk = match response {
                ToolResponse::Chunk(chunk) => chunk,
                ToolResponse::Error(e) => {
                    tracing::warn!(locator, offset = session.offset(), error = %e.message, "Transfer aborted");
                    return Err(TransferError::Remote(e));
                }
                other => {
                    return Err(TransferError::UnexpectedResponse {
                        expected: "chunk",
                        got: other.kind(),
                    })
                }
            };

            session.apply(&chunk)?;
            if let Some(progress) = session.progress() {
                on_progress(progress);
            }
        }

        tracing::debug!(
            locator,
            size = session.offset(),
            requests,
            "Transfer complete"
        );
        Ok(session.into_bytes())
    }
}
