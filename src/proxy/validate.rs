//! Source locator validation
//!
//! Runs before every upstream access: scheme and shape checks, the trusted
//! host allowlist, and a ban on private, loopback and link-local addresses,
//! both as literals and (optionally) after DNS resolution.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use reqwest::Url;

/// Why a locator was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Locator is empty")]
    Empty,

    #[error("Locator is not a valid URL: {0}")]
    Malformed(String),

    #[error("URL scheme not allowed: {0}")]
    SchemeNotAllowed(String),

    #[error("Locator has no host")]
    MissingHost,

    #[error("Credentials in locator are not allowed")]
    CredentialsNotAllowed,

    #[error("Host is not a trusted origin: {0}")]
    HostNotAllowed(String),

    #[error("Address range not allowed: {0}")]
    ForbiddenAddress(String),

    #[error("Host could not be resolved: {0}")]
    Unresolvable(String),

    #[error("Mismatched page lists: {images} images vs {regions} region documents")]
    MismatchedLists { images: usize, regions: usize },

    #[error("Invalid image id: {0}")]
    InvalidImageId(String),
}

/// Allowlist-based locator validator
#[derive(Debug, Clone)]
pub struct LocatorValidator {
    allowed_hosts: Vec<String>,
    resolve_dns: bool,
}

impl LocatorValidator {
    pub fn new(allowed_hosts: &[String], resolve_dns: bool) -> Self {
        Self {
            allowed_hosts: allowed_hosts
                .iter()
                .map(|h| h.trim().trim_end_matches('.').to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
            resolve_dns,
        }
    }

    /// Shape, scheme, allowlist and address-literal checks
    pub fn validate(&self, locator: &str) -> Result<Url, ValidationError> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(ValidationError::Empty);
        }

        let url = Url::parse(locator).map_err(|e| ValidationError::Malformed(e.to_string()))?;

        match url.scheme() {
            "http" | "https" => {}
            other => return Err(ValidationError::SchemeNotAllowed(other.to_string())),
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(ValidationError::CredentialsNotAllowed);
        }

        let host = url
            .host_str()
            .ok_or(ValidationError::MissingHost)?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .trim_end_matches('.')
            .to_ascii_lowercase();

        if let Ok(ip) = host.parse::<IpAddr>() {
            if is_forbidden_ip(&ip) {
                return Err(ValidationError::ForbiddenAddress(ip.to_string()));
            }
        } else if host == "localhost" || host.ends_with(".localhost") {
            return Err(ValidationError::ForbiddenAddress(host));
        }

        if !self.is_allowed_host(&host) {
            return Err(ValidationError::HostNotAllowed(host));
        }

        Ok(url)
    }

    /// Reject hosts whose DNS answers include a forbidden address
    pub async fn check_resolution(&self, url: &Url) -> Result<(), ValidationError> {
        if !self.resolve_dns {
            return Ok(());
        }
        let host = url.host_str().ok_or(ValidationError::MissingHost)?;
        if host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>().is_ok() {
            // Literal addresses were checked in `validate`
            return Ok(());
        }
        let port = url.port_or_known_default().unwrap_or(443);

        let addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| ValidationError::Unresolvable(format!("{}: {}", host, e)))?;

        let mut resolved_any = false;
        for addr in addrs {
            resolved_any = true;
            if is_forbidden_ip(&addr.ip()) {
                tracing::warn!(host, address = %addr.ip(), "Host resolves to a forbidden address");
                return Err(ValidationError::ForbiddenAddress(format!("{} -> {}", host, addr.ip())));
            }
        }
        if !resolved_any {
            return Err(ValidationError::Unresolvable(host.to_string()));
        }
        Ok(())
    }

    /// Full check, run on every call
    pub async fn validate_and_resolve(&self, locator: &str) -> Result<Url, ValidationError> {
        let url = self.validate(locator)?;
        self.check_resolution(&url).await?;
        Ok(url)
    }

    fn is_allowed_host(&self, host: &str) -> bool {
        self.allowed_hosts.iter().any(|allowed| {
            host == allowed
                || (host.len() > allowed.len()
                    && host.ends_with(allowed.as_str())
                    && host.as_bytes()[host.len() - allowed.len() - 1] == b'.')
        })
    }
}

/// Loopback, private, link-local, shared, unspecified and similar ranges
pub fn is_forbidden_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_forbidden_v4(v4),
        IpAddr::V6(v6) => is_forbidden_v6(v6),
    }
}

fn is_forbidden_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        // 0.0.0.0/8
        || a == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (64..=127).contains(&b))
}

fn is_forbidden_v6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_forbidden_v4(&v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80
}
