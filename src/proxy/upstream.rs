//! Upstream fetches
//!
//! The façade talks to the archive through the [`Upstream`] trait so tests
//! can count fetches and script range support.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::{StatusCode, Url};

use super::error::ProxyError;
use crate::config::ProxyConfig;

/// Inclusive-start byte window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub len: u64,
}

impl ByteRange {
    pub fn new(start: u64, len: u64) -> Self {
        Self { start, len }
    }

    /// `Range` header value
    pub fn header_value(&self) -> String {
        let end = self.start + self.len.max(1) - 1;
        format!("bytes={}-{}", self.start, end)
    }
}

/// What the upstream sent back
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamBody {
    /// The range was honored: `data` starts at `offset` of a `total`-byte body
    Partial { data: Vec<u8>, offset: u64, total: u64 },
    /// The full body, whether or not a range was asked for
    Full { data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub body: UpstreamBody,
    pub content_type: Option<String>,
}

/// Source of upstream bytes
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetch a URL, optionally asking for a byte range
    ///
    /// Implementations may ignore the range and return the full body.
    async fn fetch(&self, url: &Url, range: Option<ByteRange>) -> Result<UpstreamResponse, ProxyError>;
}

// ============================================================================
// HTTP
// ============================================================================

/// reqwest-backed upstream with a payload ceiling
pub struct HttpUpstream {
    client: reqwest::Client,
    max_payload_bytes: usize,
}

impl HttpUpstream {
    pub fn new(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .connect_timeout(Duration::from_secs(10))
            // Redirects would bypass locator validation
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("alto-viewer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProxyError::Network(e.to_string()))?;

        Ok(Self {
            client,
            max_payload_bytes: config.max_payload_bytes,
        })
    }

    async fn read_body(&self, mut response: reqwest::Response, expected: Option<u64>) -> Result<Vec<u8>, ProxyError> {
        let limit = self.max_payload_bytes;
        if let Some(length) = expected {
            if length > limit as u64 {
                return Err(ProxyError::PayloadTooLarge { limit });
            }
        }

        let mut data = Vec::with_capacity(expected.unwrap_or(0) as usize);
        while let Some(chunk) = response.chunk().await? {
            if data.len() + chunk.len() > limit {
                return Err(ProxyError::PayloadTooLarge { limit });
            }
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, url: &Url, range: Option<ByteRange>) -> Result<UpstreamResponse, ProxyError> {
        let mut request = self.client.get(url.clone());
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        tracing::debug!(url = %url, range = ?range, "Fetching upstream");
        let response = request.send().await?;
        let status = response.status();

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        match status {
            StatusCode::PARTIAL_CONTENT => {
                let header = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let (offset, total) = parse_content_range(&header)
                    .ok_or_else(|| ProxyError::MalformedUpstream(format!("Content-Range: {:?}", header)))?;
                if total > self.max_payload_bytes as u64 {
                    return Err(ProxyError::PayloadTooLarge {
                        limit: self.max_payload_bytes,
                    });
                }
                let data = self.read_body(response, content_length).await?;
                Ok(UpstreamResponse {
                    body: UpstreamBody::Partial { data, offset, total },
                    content_type,
                })
            }
            s if s.is_success() => {
                let data = self.read_body(response, content_length).await?;
                tracing::debug!(url = %url, size = data.len(), "Upstream returned full body");
                Ok(UpstreamResponse {
                    body: UpstreamBody::Full { data },
                    content_type,
                })
            }
            s => {
                tracing::warn!(url = %url, status = s.as_u16(), "Upstream request failed");
                Err(ProxyError::UpstreamStatus {
                    status: s.as_u16(),
                    url: url.to_string(),
                })
            }
        }
    }
}

/// Parse `bytes {start}-{end}/{total}` into `(start, total)`
pub fn parse_content_range(value: &str) -> Option<(u64, u64)> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;
    let (start, end) = span.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end: u64 = end.trim().parse().ok()?;
    let total: u64 = total.trim().parse().ok()?;
    if end < start || end >= total {
        return None;
    }
    Some((start, total))
}

// ============================================================================
// Test double
// ============================================================================

#[cfg(test)]
pub use mock::MockUpstream;

#[cfg(test)]
mod mock {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    /// Scripted upstream with fetch counting
    #[derive(Default)]
    pub struct MockUpstream {
        bodies: Mutex<HashMap<String, (Vec<u8>, Option<String>)>>,
        failures: Mutex<HashMap<String, u16>>,
        delays: Mutex<HashMap<String, Duration>>,
        honor_ranges: bool,
        calls: Mutex<Vec<(String, Option<ByteRange>)>>,
        count: AtomicUsize,
    }

    impl MockUpstream {
        /// Upstream that always returns full bodies
        pub fn new() -> Self {
            Self::default()
        }

        /// Upstream that answers range requests with 206-style partials
        pub fn with_ranges() -> Self {
            Self {
                honor_ranges: true,
                ..Self::default()
            }
        }

        pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>, content_type: Option<&str>) {
            self.bodies
                .lock()
                .insert(url.to_string(), (body.into(), content_type.map(str::to_string)));
        }

        pub fn fail(&self, url: &str, status: u16) {
            self.failures.lock().insert(url.to_string(), status);
        }

        pub fn delay(&self, url: &str, delay: Duration) {
            self.delays.lock().insert(url.to_string(), delay);
        }

        pub fn fetch_count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }

        pub fn fetches_of(&self, url: &str) -> usize {
            self.calls.lock().iter().filter(|(u, _)| u == url).count()
        }

        pub fn calls(&self) -> Vec<(String, Option<ByteRange>)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Upstream for MockUpstream {
        async fn fetch(&self, url: &Url, range: Option<ByteRange>) -> Result<UpstreamResponse, ProxyError> {
            let key = url.to_string();
            self.count.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().push((key.clone(), range));

            let delay = self.delays.lock().get(&key).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if let Some(status) = self.failures.lock().get(&key).copied() {
                return Err(ProxyError::UpstreamStatus { status, url: key });
            }

            let Some((data, content_type)) = self.bodies.lock().get(&key).cloned() else {
                return Err(ProxyError::UpstreamStatus { status: 404, url: key });
            };

            let body = match range {
                Some(range) if self.honor_ranges => {
                    let total = data.len() as u64;
                    let start = range.start.min(total) as usize;
                    let end = (range.start + range.len).min(total) as usize;
                    UpstreamBody::Partial {
                        data: data[start..end].to_vec(),
                        offset: range.start,
                        total,
                    }
                }
                _ => UpstreamBody::Full { data },
            };
            Ok(UpstreamResponse { body, content_type })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_header() {
        assert_eq!(ByteRange::new(0, 512).header_value(), "bytes=0-511");
        assert_eq!(ByteRange::new(1024, 1).header_value(), "bytes=1024-1024");
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("bytes 0-99/1234"), Some((0, 1234)));
        assert_eq!(parse_content_range("bytes 100-199/200"), Some((100, 200)));
        assert_eq!(parse_content_range("bytes 0-99/*"), None);
        assert_eq!(parse_content_range("bytes 50-10/100"), None);
        assert_eq!(parse_content_range("items 0-1/2"), None);
    }

    #[tokio::test]
    async fn test_mock_honors_ranges() {
        let upstream = MockUpstream::with_ranges();
        upstream.serve("https://h.test/a", b"0123456789".to_vec(), None);
        let url = Url::parse("https://h.test/a").unwrap();

        let response = upstream.fetch(&url, Some(ByteRange::new(8, 4))).await.unwrap();
        assert_eq!(
            response.body,
            UpstreamBody::Partial {
                data: b"89".to_vec(),
                offset: 8,
                total: 10
            }
        );
        assert_eq!(upstream.fetch_count(), 1);
    }
}
