//! Cache configuration loading: API location, page size and response ordering.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::store::ResponseOrdering;
#[cfg(feature = "http-transport")]
use crate::transport::http::HttpConfig;

/// Default location on disk where the cache looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/cache.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ENTITY_CACHE_CONFIG_PATH";
/// Environment variable that overrides the API base URL.
const API_URL_ENV: &str = "ENTITY_CACHE_API_URL";
/// Environment variable that overrides the page size.
const PAGE_SIZE_ENV: &str = "ENTITY_CACHE_PAGE_SIZE";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_PAGE_SIZE: u32 = 20;

/// Runtime configuration of the cache and its HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Base URL relative endpoints are joined to.
    pub api_base_url: String,
    /// Items requested per page by paginated fetches.
    pub page_size: u32,
    /// How overlapping responses for the same key are applied.
    pub response_ordering: ResponseOrdering,
    /// Basic-auth user name.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
}

impl CacheConfig {
    /// Load the configuration from disk and the environment, falling back to defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        api_base_url = %config.api_base_url,
                        page_size = config.page_size,
                        "loaded cache config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        config.with_overrides(|name| env::var(name).ok())
    }

    /// Apply environment-style overrides looked up through `lookup`.
    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(API_URL_ENV).filter(|url| !url.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(raw) = lookup(PAGE_SIZE_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(size) if size > 0 => self.page_size = size,
                _ => warn!(value = %raw, "ignoring invalid {PAGE_SIZE_ENV}"),
            }
        }
        self
    }

    /// Transport settings derived from this configuration.
    #[cfg(feature = "http-transport")]
    pub fn http(&self) -> HttpConfig {
        let config = HttpConfig::new(&self.api_base_url);
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => config.with_credentials(username, password),
            _ => config,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            page_size: DEFAULT_PAGE_SIZE,
            response_ordering: ResponseOrdering::default(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    api_base_url: Option<String>,
    page_size: Option<u32>,
    #[serde(default)]
    response_ordering: ResponseOrdering,
    username: Option<String>,
    password: Option<String>,
}

impl From<RawConfig> for CacheConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            api_base_url: value.api_base_url.unwrap_or(defaults.api_base_url),
            page_size: value
                .page_size
                .filter(|size| *size > 0)
                .unwrap_or(defaults.page_size),
            response_ordering: value.response_ordering,
            username: value.username,
            password: value.password,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
