//! Configuration loading
//!
//! Settings come from a TOML file (by default
//! `~/.config/weatherdesk/config.toml` on Linux) with every field optional:
//!
//! ```toml
//! [api]
//! key = "YOUR_API_KEY"
//! base_uri = "https://weather.visualcrossing.com/VisualCrossingWebServices/rest/services/timeline"
//! include = "days"
//! elements = "tempmax,temp,tempmin,description,conditions,datetime"
//!
//! [cache]
//! redis_url = "redis://127.0.0.1:6379/"
//! file = "/tmp/weatherdesk-cache.json"
//!
//! [defaults]
//! units = "metric"
//! lang = "en"
//! ```
//!
//! `WEATHERDESK_API_KEY` in the environment overrides `api.key`.

use directories::ProjectDirs;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cache::DocumentStore;
use crate::data::weather::DEFAULT_BASE_URI;
use crate::data::UnitGroup;
use crate::settings::{Settings, DEFAULT_LANG};

/// Environment variable overriding the API key
pub const API_KEY_ENV: &str = "WEATHERDESK_API_KEY";

/// Default `include` list: only the daily forecast section
pub const DEFAULT_INCLUDE: &str = "days";

/// Default `elements` list
pub const DEFAULT_ELEMENTS: &str = "tempmax,temp,tempmin,description,conditions,datetime";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has wrongly typed fields
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field has an unusable value
    #[error("Invalid config value for {field}: {message}")]
    Invalid { field: String, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Forecast service settings
    pub api: ApiConfig,
    /// Cache backend settings
    pub cache: CacheConfig,
    /// Initial request settings, overridden by values persisted in the cache
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API key of the forecast service
    pub key: Option<String>,
    /// Base URI of the timeline endpoint
    pub base_uri: String,
    /// Comma-separated response sections
    pub include: String,
    /// Comma-separated per-day fields
    pub elements: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: None,
            base_uri: DEFAULT_BASE_URI.to_string(),
            include: DEFAULT_INCLUDE.to_string(),
            elements: DEFAULT_ELEMENTS.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis server to try first; the local file is used if unset or unreachable
    pub redis_url: Option<String>,
    /// Local cache file, defaults to the XDG cache directory
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub units: UnitGroup,
    pub lang: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            units: UnitGroup::default(),
            lang: DEFAULT_LANG.to_string(),
        }
    }
}

/// Request parameters the gateway needs besides location, range and settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    pub api_key: Option<String>,
    pub base_uri: String,
    pub include: Vec<String>,
    pub elements: Vec<String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        ApiConfig::default().request_config()
    }
}

impl RequestConfig {
    /// Returns the API key if one is set and not blank
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

impl ApiConfig {
    pub fn request_config(&self) -> RequestConfig {
        RequestConfig {
            api_key: self.key.clone(),
            base_uri: self.base_uri.trim().to_string(),
            include: split_list(&self.include),
            elements: split_list(&self.elements),
        }
    }
}

/// Splits a comma-separated list, dropping blanks and duplicates
pub fn split_list(list: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !items.iter().any(|existing| existing == item) {
            items.push(item.to_string());
        }
    }
    items
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "weatherdesk")?;
        Some(project_dirs.config_dir().join("config.toml"))
    }

    /// Loads the config file and applies environment overrides
    ///
    /// With `path = None` the default location is used and a missing file
    /// yields the defaults. An explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env_override(std::env::var(API_KEY_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Loaded config from {}", path.display());
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Replaces the API key with `value` if it is set and not blank
    pub fn apply_env_override(&mut self, value: Option<String>) {
        if let Some(key) = value.filter(|v| !v.trim().is_empty()) {
            tracing::debug!("Using API key from {}", API_KEY_ENV);
            self.api.key = Some(key);
        }
    }

    /// Rejects values that would make every request fail
    ///
    /// A missing API key is not rejected here: cached forecasts can still be
    /// served without one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_uri = self.api.base_uri.trim();
        match Url::parse(base_uri) {
            Ok(url) if url.cannot_be_a_base() => Err(ConfigError::Invalid {
                field: "api.base_uri".to_string(),
                message: format!("{} cannot be used as a base URI", base_uri),
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(ConfigError::Invalid {
                field: "api.base_uri".to_string(),
                message: e.to_string(),
            }),
        }?;

        if split_list(&self.api.include).is_empty() {
            return Err(ConfigError::Invalid {
                field: "api.include".to_string(),
                message: "at least one section is required".to_string(),
            });
        }

        if self.api.key.is_none() {
            tracing::warn!("No API key configured; only cached forecasts are available");
        }
        Ok(())
    }

    pub fn request_config(&self) -> RequestConfig {
        self.api.request_config()
    }

    pub fn settings(&self) -> Settings {
        Settings::new(self.defaults.units, self.defaults.lang.clone())
    }

    /// Cache file to use: configured path, XDG cache dir, or the working directory
    pub fn cache_file(&self) -> PathBuf {
        self.cache
            .file
            .clone()
            .or_else(DocumentStore::default_path)
            .unwrap_or_else(|| PathBuf::from("weatherdesk-cache.json"))
    }
}
