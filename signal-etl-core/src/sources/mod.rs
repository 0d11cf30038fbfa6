//! Data sources: one [`Source`] implementation per upstream API.
//!
//! A source knows three things: which endpoint to call by default, which table
//! its rows land in, and how to reshape the API's JSON into rows for that
//! table. Everything else (fetching, validation, upsert) is shared.

pub mod crypto;
pub mod gold;
pub mod news;
pub mod sp500;
pub mod treasury;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as Json;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::error;

use crate::record::{Cell, Record, RecordBatch, RecordSchema};

pub use crypto::CryptoListings;
pub use gold::GoldSpot;
pub use news::NewsSentiment;
pub use sp500::Sp500Daily;
pub use treasury::TreasuryYield;

static NULL: Json = Json::Null;

/// Keys some providers return in place of data (rate limits, bad parameters).
const NOTICE_KEYS: [&str; 3] = ["Error Message", "Information", "Note"];

/// The payload did not have the shape the transformer expects.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeMismatch {
    #[error("missing key '{key}' in {context}")]
    MissingKey { key: String, context: String },

    #[error("expected {expected} at '{key}'")]
    WrongType { key: String, expected: &'static str },

    #[error("provider returned a notice instead of data: {0}")]
    ProviderNotice(String),

    #[error("malformed {context}: {message}")]
    Malformed {
        context: &'static str,
        message: String,
    },
}

/// Where a source expects its API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPlacement {
    Header(&'static str),
    Query(&'static str),
}

/// Built-in request settings for a source; config can override any of them.
#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    pub url: &'static str,
    pub params: &'static [(&'static str, &'static str)],
    pub headers: &'static [(&'static str, &'static str)],
    pub key: KeyPlacement,
    /// Environment variable consulted when no literal key is configured.
    pub key_env: &'static str,
}

/// A pipeline variant: endpoint defaults, destination schema and reshaping.
pub trait Source: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn endpoint(&self) -> Endpoint;

    fn schema(&self) -> &'static RecordSchema;

    /// Reshape one payload into rows in schema order.
    ///
    /// `pulled` is the processing wall-clock time stamped onto every row.
    fn transform(&self, payload: &Json, pulled: NaiveDateTime)
        -> Result<Vec<Record>, ShapeMismatch>;
}

/// Selector for the five built-in sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Crypto,
    Gold,
    NewsSentiment,
    Sp500,
    TreasuryYield,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Crypto,
        SourceKind::Gold,
        SourceKind::NewsSentiment,
        SourceKind::Sp500,
        SourceKind::TreasuryYield,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SourceKind::Crypto => "crypto",
            SourceKind::Gold => "gold",
            SourceKind::NewsSentiment => "news_sentiment",
            SourceKind::Sp500 => "sp500",
            SourceKind::TreasuryYield => "treasury_yield",
        }
    }

    pub fn source(self) -> Box<dyn Source> {
        match self {
            SourceKind::Crypto => Box::new(CryptoListings),
            SourceKind::Gold => Box::new(GoldSpot),
            SourceKind::NewsSentiment => Box::new(NewsSentiment),
            SourceKind::Sp500 => Box::new(Sp500Daily),
            SourceKind::TreasuryYield => Box::new(TreasuryYield),
        }
    }

    pub fn schema(self) -> &'static RecordSchema {
        match self {
            SourceKind::Crypto => &crypto::SCHEMA,
            SourceKind::Gold => &gold::SCHEMA,
            SourceKind::NewsSentiment => &news::SCHEMA,
            SourceKind::Sp500 => &sp500::SCHEMA,
            SourceKind::TreasuryYield => &treasury::SCHEMA,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown source '{0}'. Valid: crypto, gold, news_sentiment, sp500, treasury_yield")]
pub struct UnknownSource(pub String);

impl FromStr for SourceKind {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        SourceKind::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| UnknownSource(s.to_string()))
    }
}

/// Run a source's transformer, turning a shape mismatch into an empty batch.
pub fn transform_payload(source: &dyn Source, payload: &Json, pulled: NaiveDateTime) -> RecordBatch {
    let schema = source.schema();
    match source.transform(payload, pulled) {
        Ok(rows) => RecordBatch::new(schema, rows),
        Err(e) => {
            error!(source = %source.kind(), table = schema.table, "error processing data: {e}");
            RecordBatch::empty(schema)
        }
    }
}

/// True for payloads that carry nothing at all (`null`, `{}`, `[]`).
pub fn is_empty_payload(payload: &Json) -> bool {
    match payload {
        Json::Null => true,
        Json::Object(map) => map.is_empty(),
        Json::Array(items) => items.is_empty(),
        _ => false,
    }
}

// ── Shape helpers ────────────────────────────────────────────────────

/// Look up a top-level key, quoting any provider notice when it is absent.
pub(crate) fn top_level<'a>(payload: &'a Json, key: &str) -> Result<&'a Json, ShapeMismatch> {
    if let Some(value) = payload.get(key) {
        return Ok(value);
    }
    if let Some(notice) = provider_notice(payload) {
        return Err(ShapeMismatch::ProviderNotice(notice));
    }
    Err(ShapeMismatch::MissingKey {
        key: key.to_string(),
        context: "payload".into(),
    })
}

/// Decode a strictly shaped response body; serde's message names the offending field.
pub(crate) fn decode<T: DeserializeOwned>(value: &Json, context: &'static str) -> Result<T, ShapeMismatch> {
    T::deserialize(value).map_err(|e| ShapeMismatch::Malformed {
        context,
        message: e.to_string(),
    })
}

/// `deserialize_with` target for fields that must be present but may be `null`.
///
/// A plain `Option` field would also accept an absent key.
pub(crate) fn nullable<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de)
}

/// Per-item lookup where an absent key reads as JSON `null`.
pub(crate) fn lenient<'a>(obj: &'a Json, key: &str) -> &'a Json {
    obj.get(key).unwrap_or(&NULL)
}

pub(crate) fn array<'a>(value: &'a Json, key: &str) -> Result<&'a [Json], ShapeMismatch> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| ShapeMismatch::WrongType {
            key: key.to_string(),
            expected: "an array",
        })
}

fn provider_notice(payload: &Json) -> Option<String> {
    NOTICE_KEYS.iter().find_map(|k| {
        payload.get(*k).map(|v| match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        })
    })
}

// ── Cell coercion ────────────────────────────────────────────────────

/// Numeric coercion: numbers pass, numeric strings parse, anything else is null.
pub(crate) fn real(value: &Json) -> Cell {
    let parsed = match value {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Cell::Real(v),
        _ => Cell::Null,
    }
}

/// Integer coercion; integral floats are accepted, fractional ones are not.
pub(crate) fn integer(value: &Json) -> Cell {
    let parsed = match value {
        Json::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Json::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    };
    parsed.map_or(Cell::Null, Cell::Integer)
}

fn integral(v: f64) -> Option<i64> {
    (v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64).then_some(v as i64)
}

pub(crate) fn text(value: &Json) -> Cell {
    match value {
        Json::String(s) => Cell::Text(s.clone()),
        Json::Number(n) => Cell::Text(n.to_string()),
        Json::Bool(b) => Cell::Text(b.to_string()),
        _ => Cell::Null,
    }
}

pub(crate) fn rfc3339_utc(value: Option<&str>) -> Cell {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or(Cell::Null, |dt| Cell::Timestamp(dt.with_timezone(&Utc).naive_utc()))
}

/// Finite reals pass, everything else is null.
pub(crate) fn finite(value: Option<f64>) -> Cell {
    value.filter(|v| v.is_finite()).map_or(Cell::Null, Cell::Real)
}

pub(crate) fn timestamp_with(value: &Json, format: &str) -> Cell {
    value
        .as_str()
        .and_then(|s| NaiveDateTime::parse_from_str(s, format).ok())
        .map_or(Cell::Null, Cell::Timestamp)
}

pub(crate) fn date(value: &str) -> Cell {
    NaiveDate::parse_from_str(value.trim(), crate::record::DATE_FORMAT).map_or(Cell::Null, Cell::Date)
}
