use serde::Deserialize;
use std::fs;
use tracing::debug;

use crate::brokers::AtlasCredentials;
use crate::constants::{
    ALERCE_API_URL, ALERCE_CATSHTM_URL, ANTARES_API_URL, ATLAS_BASE_URL, FINK_API_URL,
    LASAIR_API_URL, TNS_PUBLIC_OBJECTS_URL,
};
use crate::error::{MetabrokerError, Result};
use crate::types::TnsCredentials;

/// Which store backs the catalog cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    File,
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub upstream: UpstreamConfig,
    pub brokers: BrokersConfig,
    pub atlas: AtlasConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub url: String,
    /// The bulk archive runs to tens of megabytes, so this is generous.
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokersConfig {
    /// Deadline for one broker's whole query chain during a fan-out.
    pub timeout_seconds: u64,
    /// Timeout for a single HTTP request inside a chain.
    pub request_timeout_seconds: u64,
    pub alerce_url: String,
    pub alerce_catshtm_url: String,
    pub antares_url: String,
    pub fink_url: String,
    pub lasair_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    pub base_url: String,
    pub cache_dir: String,
    pub cache_days: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::File,
            path: "tns_cache.json".to_string(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: TNS_PUBLIC_OBJECTS_URL.to_string(),
            timeout_seconds: 300,
        }
    }
}

impl Default for BrokersConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            request_timeout_seconds: 10,
            alerce_url: ALERCE_API_URL.to_string(),
            alerce_catshtm_url: ALERCE_CATSHTM_URL.to_string(),
            antares_url: ANTARES_API_URL.to_string(),
            fink_url: FINK_API_URL.to_string(),
            lasair_url: LASAIR_API_URL.to_string(),
        }
    }
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            base_url: ATLAS_BASE_URL.to_string(),
            cache_dir: "atlas_cache".to_string(),
            cache_days: 7,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load configuration from a TOML file. A missing file is not an
    /// error; every setting has a default.
    pub fn load_from(path: &str) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path, "no config file found, using defaults");
                Ok(Config::default())
            }
            Err(e) => Err(MetabrokerError::Config(format!(
                "Failed to read config file '{}': {}",
                path, e
            ))),
        }
    }
}

/// TNS credentials from TNS_ID and TNS_USERNAME. Without both, refreshes
/// fall back to the anonymous user agent.
pub fn tns_credentials_from_env() -> Option<TnsCredentials> {
    let tns_id = env_nonempty("TNS_ID")?;
    let tns_username = env_nonempty("TNS_USERNAME")?;
    Some(TnsCredentials {
        tns_id,
        tns_username,
    })
}

pub fn lasair_token_from_env() -> Option<String> {
    env_nonempty("LASAIR_API_TOKEN")
}

pub fn atlas_credentials_from_env() -> Option<AtlasCredentials> {
    let username = env_nonempty("ATLAS_USERNAME")?;
    let password = env_nonempty("ATLAS_PASSWORD")?;
    Some(AtlasCredentials { username, password })
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
