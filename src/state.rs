//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::proxy::{ByteCache, ProxyError, ProxyFacade};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    facade: ProxyFacade,
}

impl AppState {
    /// State backed by HTTP upstreams
    pub fn new(config: Config) -> Result<Self, ProxyError> {
        let facade = ProxyFacade::from_config(config.proxy.clone())?;
        Ok(Self::with_facade(config, facade))
    }

    /// State around an existing façade
    pub fn with_facade(config: Config, facade: ProxyFacade) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, facade }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the proxy façade
    pub fn facade(&self) -> &ProxyFacade {
        &self.inner.facade
    }

    /// Get the upstream body cache
    pub fn cache(&self) -> &ByteCache {
        self.inner.facade.cache()
    }
}
