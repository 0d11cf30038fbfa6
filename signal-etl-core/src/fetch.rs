//! HTTP fetcher: one blocking GET per run, JSON body or a failure.
//!
//! The [`PayloadSource`] trait abstracts over where a payload comes from so the
//! pipeline can be driven by static fixtures in tests.

use reqwest::StatusCode;
use serde_json::Value as Json;
use thiserror::Error;
use tracing::debug;

/// A fully resolved request: URL, query parameters and headers.
///
/// API keys live in `query` or `headers`, never in `url`, so the URL is safe
/// to log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Why a fetch produced no payload.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: StatusCode },

    #[error("response from {url} is not valid JSON: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Anything that can turn a request into a raw JSON payload.
pub trait PayloadSource {
    fn fetch(&self, request: &FetchRequest) -> Result<Json, FetchError>;
}

/// Blocking `reqwest` fetcher with the client's default timeouts.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("signal-etl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

impl PayloadSource for HttpFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<Json, FetchError> {
        let url = request.url.clone();
        debug!(%url, params = request.query.len(), "GET");

        let mut builder = self.client.get(&request.url).query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        // `without_url` keeps query-string API keys out of error messages.
        let resp = builder.send().map_err(|e| FetchError::Transport {
            url: url.clone(),
            source: e.without_url(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { url, status });
        }

        resp.json::<Json>().map_err(|e| FetchError::Decode {
            url,
            source: e.without_url(),
        })
    }
}
