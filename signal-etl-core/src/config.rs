//! TOML configuration: database location and per-source request overrides.
//!
//! Every field is optional. Anything a file leaves out falls back to the
//! source's built-in [`Endpoint`]; API keys come from the file or, more
//! usually, from the environment variable the source names.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::fetch::FetchRequest;
use crate::sources::{Endpoint, KeyPlacement, Source, SourceKind};

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "signal-etl.toml";

/// Environment override for [`DatabaseConfig::path`].
pub const DATABASE_PATH_ENV: &str = "SIGNAL_DATABASE_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no API key for '{job}': set {env} or sources.{job}.api_key")]
    MissingApiKey { job: SourceKind, env: String },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub database: DatabaseConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("signal.db"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub crypto: SourceConfig,
    pub gold: SourceConfig,
    pub news_sentiment: SourceConfig,
    pub sp500: SourceConfig,
    pub treasury_yield: SourceConfig,
}

impl SourcesConfig {
    pub fn get(&self, kind: SourceKind) -> &SourceConfig {
        match kind {
            SourceKind::Crypto => &self.crypto,
            SourceKind::Gold => &self.gold,
            SourceKind::NewsSentiment => &self.news_sentiment,
            SourceKind::Sp500 => &self.sp500,
            SourceKind::TreasuryYield => &self.treasury_yield,
        }
    }
}

/// Per-source overrides. Params and headers merge over the built-in ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: Option<String>,
    pub params: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    /// Literal key; takes precedence over `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable holding the key; defaults to the source's own.
    pub api_key_env: Option<String>,
}

impl SourceConfig {
    /// Resolve the final request for a source. `env` looks up environment
    /// variables by name.
    pub fn request(
        &self,
        kind: SourceKind,
        endpoint: &Endpoint,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<FetchRequest, ConfigError> {
        let key_env = self.api_key_env.as_deref().unwrap_or(endpoint.key_env);
        let key = self
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| env(key_env).filter(|k| !k.is_empty()))
            .ok_or_else(|| ConfigError::MissingApiKey {
                job: kind,
                env: key_env.to_string(),
            })?;

        let mut params: BTreeMap<String, String> = endpoint
            .params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        params.extend(self.params.clone());

        let mut headers: BTreeMap<String, String> = endpoint
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        headers.extend(self.headers.clone());

        match endpoint.key {
            KeyPlacement::Header(name) => {
                headers.insert(name.to_string(), key);
            }
            KeyPlacement::Query(name) => {
                params.insert(name.to_string(), key);
            }
        }

        Ok(FetchRequest {
            url: self.url.clone().unwrap_or_else(|| endpoint.url.to_string()),
            query: params.into_iter().collect(),
            headers: headers.into_iter().collect(),
        })
    }
}

impl EtlConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Explicit path if given, else `signal-etl.toml` if present, else defaults.
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|k| std::env::var(k).ok());
        Ok(config)
    }

    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(path) = env(DATABASE_PATH_ENV).filter(|p| !p.is_empty()) {
            self.database.path = PathBuf::from(path);
        }
    }

    /// Resolved request for `source` using the process environment.
    pub fn request_for(&self, source: &dyn Source) -> Result<FetchRequest, ConfigError> {
        let kind = source.kind();
        self.sources
            .get(kind)
            .request(kind, &source.endpoint(), |k| std::env::var(k).ok())
    }
}
