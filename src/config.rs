//! Configuration management for the Alto Viewer server

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::iiif::ArchiveEndpoints;

/// Hosts allowed as upstream sources when `ALLOWED_HOSTS` is unset
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &["lbiiif.riksarkivet.se", "iiifintern.ra.se"];

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Backend proxy limits and cache policy
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Trusted upstream hosts; subdomains of an entry are trusted too
    pub allowed_hosts: Vec<String>,
    /// Per-call response ceiling for `read-bytes`
    pub max_chunk_bytes: usize,
    /// Hard ceiling on any upstream body
    pub max_payload_bytes: usize,
    /// Bodies larger than this are served but never cached
    pub max_cache_entry_bytes: usize,
    /// Maximum number of cached bodies
    pub cache_capacity: usize,
    /// Eviction after this long without access
    pub cache_idle: Duration,
    /// Eviction this long after creation, regardless of access
    pub cache_lifetime: Duration,
    pub upstream_timeout: Duration,
    /// Reject hosts that resolve to private or link-local addresses
    pub resolve_dns: bool,
    pub archive: ArchiveEndpoints,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
            max_chunk_bytes: 512 * 1024,
            max_payload_bytes: 64 * 1024 * 1024,
            max_cache_entry_bytes: 32 * 1024 * 1024,
            cache_capacity: 32,
            cache_idle: Duration::from_secs(10),
            cache_lifetime: Duration::from_secs(60),
            upstream_timeout: Duration::from_secs(30),
            resolve_dns: true,
            archive: ArchiveEndpoints::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3001,
            },
            proxy: ProxyConfig::default(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = ProxyConfig::default();

        let port = match env::var("SERVER_PORT") {
            Ok(_) => parse_var("SERVER_PORT", 3001)?,
            Err(_) => parse_var("PORT", 3001)?,
        };

        let allowed_hosts = match env::var("ALLOWED_HOSTS") {
            Ok(list) => list
                .split(',')
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
            Err(_) => defaults.allowed_hosts,
        };

        let archive = match env::var("ARCHIVE_BASE_URL") {
            Ok(url) => ArchiveEndpoints::new(&url),
            Err(_) => defaults.archive,
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port,
            },
            proxy: ProxyConfig {
                allowed_hosts,
                max_chunk_bytes: parse_var("MAX_CHUNK_BYTES", defaults.max_chunk_bytes)?,
                max_payload_bytes: parse_var("MAX_PAYLOAD_BYTES", defaults.max_payload_bytes)?,
                max_cache_entry_bytes: parse_var(
                    "MAX_CACHE_ENTRY_BYTES",
                    defaults.max_cache_entry_bytes,
                )?,
                cache_capacity: parse_var("CACHE_CAPACITY", defaults.cache_capacity)?,
                cache_idle: Duration::from_secs(parse_var(
                    "CACHE_IDLE_SECS",
                    defaults.cache_idle.as_secs(),
                )?),
                cache_lifetime: Duration::from_secs(parse_var(
                    "CACHE_LIFETIME_SECS",
                    defaults.cache_lifetime.as_secs(),
                )?),
                upstream_timeout: Duration::from_secs(parse_var(
                    "UPSTREAM_TIMEOUT_SECS",
                    defaults.upstream_timeout.as_secs(),
                )?),
                resolve_dns: parse_var("RESOLVE_DNS", defaults.resolve_dns)?,
                archive,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let config = Config::default();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.proxy.max_chunk_bytes, 512 * 1024);
        assert_eq!(config.proxy.cache_idle, Duration::from_secs(10));
        assert_eq!(config.proxy.cache_lifetime, Duration::from_secs(60));
        assert!(config.proxy.max_cache_entry_bytes <= config.proxy.max_payload_bytes);
        assert!(config
            .proxy
            .allowed_hosts
            .contains(&"lbiiif.riksarkivet.se".to_string()));
    }
}
