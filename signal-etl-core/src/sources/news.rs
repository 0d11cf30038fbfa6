//! Alpha Vantage NEWS_SENTIMENT feed → `news_sentiment`.

use chrono::NaiveDateTime;
use serde_json::Value as Json;

use super::{
    array, lenient, real, text, timestamp_with, top_level, Endpoint, KeyPlacement,
    ShapeMismatch, Source, SourceKind,
};
use crate::record::{Cell, Column, ColumnType, Record, RecordSchema, RequiredColumns};

/// Compact publish time used by the feed, e.g. `20240102T153000`.
const PUBLISHED_FORMAT: &str = "%Y%m%dT%H%M%S";

pub static SCHEMA: RecordSchema = RecordSchema {
    table: "news_sentiment",
    columns: &[
        Column::new("title", ColumnType::Text),
        Column::new("url", ColumnType::Text),
        Column::new("time_published", ColumnType::Timestamp),
        Column::new("summary", ColumnType::Text),
        Column::new("source", ColumnType::Text),
        Column::new("overall_sentiment_score", ColumnType::Real),
        Column::new("overall_sentiment_label", ColumnType::Text),
        Column::new("pulled_on", ColumnType::Timestamp),
    ],
    natural_key: &["url", "time_published"],
    required: RequiredColumns::Only(&[
        "title",
        "url",
        "time_published",
        "overall_sentiment_score",
    ]),
};

#[derive(Debug, Clone, Copy, Default)]
pub struct NewsSentiment;

impl Source for NewsSentiment {
    fn kind(&self) -> SourceKind {
        SourceKind::NewsSentiment
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint {
            url: "https://www.alphavantage.co/query",
            params: &[("function", "NEWS_SENTIMENT"), ("tickers", "CRYPTO:BTC")],
            headers: &[],
            key: KeyPlacement::Query("apikey"),
            key_env: "ALPHAVANTAGE_API_KEY",
        }
    }

    fn schema(&self) -> &'static RecordSchema {
        &SCHEMA
    }

    /// Articles missing individual fields still produce a row; validation
    /// decides whether it survives.
    fn transform(
        &self,
        payload: &Json,
        pulled: NaiveDateTime,
    ) -> Result<Vec<Record>, ShapeMismatch> {
        let feed = array(top_level(payload, "feed")?, "feed")?;
        let rows = feed
            .iter()
            .map(|article| {
                let get = |key: &str| lenient(article, key);
                vec![
                    text(get("title")),
                    text(get("url")),
                    timestamp_with(get("time_published"), PUBLISHED_FORMAT),
                    text(get("summary")),
                    text(get("source")),
                    real(get("overall_sentiment_score")),
                    text(get("overall_sentiment_label")),
                    Cell::Timestamp(pulled),
                ]
            })
            .collect();
        Ok(rows)
    }
}
