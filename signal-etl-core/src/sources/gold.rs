//! GoldAPI spot quote for XAU/USD → `gold_price_history`.

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value as Json;

use super::{
    decode, finite, nullable, top_level, Endpoint, KeyPlacement, ShapeMismatch, Source,
    SourceKind,
};
use crate::record::{Cell, Column, ColumnType, Record, RecordSchema, RequiredColumns};

pub static SCHEMA: RecordSchema = RecordSchema {
    table: "gold_price_history",
    columns: &[
        Column::new("timestamp", ColumnType::Timestamp),
        Column::new("prev_close_price", ColumnType::Real),
        Column::new("open_price", ColumnType::Real),
        Column::new("low_price", ColumnType::Real),
        Column::new("high_price", ColumnType::Real),
        Column::new("price", ColumnType::Real),
        Column::new("ch", ColumnType::Real),
        Column::new("chp", ColumnType::Real),
        Column::new("ask", ColumnType::Real),
        Column::new("bid", ColumnType::Real),
        Column::new("pulled_at", ColumnType::Timestamp),
    ],
    natural_key: &["timestamp"],
    required: RequiredColumns::All,
};

/// Single spot quote; the payload is one object, not an array.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoldSpot;

/// goldapi response body. Metadata such as `metal` and `exchange` is ignored.
#[derive(Debug, Deserialize)]
struct SpotQuote {
    #[serde(deserialize_with = "nullable")]
    timestamp: Option<i64>,
    #[serde(deserialize_with = "nullable")]
    prev_close_price: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    open_price: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    low_price: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    high_price: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    price: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    ch: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    chp: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    ask: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    bid: Option<f64>,
}

impl SpotQuote {
    fn into_row(self, pulled: NaiveDateTime) -> Record {
        vec![
            epoch_seconds(self.timestamp),
            finite(self.prev_close_price),
            finite(self.open_price),
            finite(self.low_price),
            finite(self.high_price),
            finite(self.price),
            finite(self.ch),
            finite(self.chp),
            finite(self.ask),
            finite(self.bid),
            Cell::Timestamp(pulled),
        ]
    }
}

/// Unix epoch seconds → UTC timestamp.
fn epoch_seconds(secs: Option<i64>) -> Cell {
    secs.and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map_or(Cell::Null, |dt| Cell::Timestamp(dt.naive_utc()))
}

impl Source for GoldSpot {
    fn kind(&self) -> SourceKind {
        SourceKind::Gold
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint {
            url: "https://www.goldapi.io/api/XAU/USD",
            params: &[],
            headers: &[("Content-Type", "application/json")],
            key: KeyPlacement::Header("x-access-token"),
            key_env: "GOLDAPI_KEY",
        }
    }

    fn schema(&self) -> &'static RecordSchema {
        &SCHEMA
    }

    fn transform(
        &self,
        payload: &Json,
        pulled: NaiveDateTime,
    ) -> Result<Vec<Record>, ShapeMismatch> {
        // Surfaces a provider notice before the strict decode.
        top_level(payload, "timestamp")?;
        let quote: SpotQuote = decode(payload, "spot quote")?;
        Ok(vec![quote.into_row(pulled)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn pulled() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn quote() -> Json {
        json!({
            "timestamp": 1_717_200_000,
            "metal": "XAU",
            "currency": "USD",
            "prev_close_price": 2345.1,
            "open_price": 2345.1,
            "low_price": 2320.0,
            "high_price": 2360.5,
            "price": 2327.4,
            "ch": -17.7,
            "chp": -0.75,
            "ask": 2327.9,
            "bid": 2327.1
        })
    }

    #[test]
    fn single_object_becomes_single_row() {
        let rows = GoldSpot.transform(&quote(), pulled()).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.len(), SCHEMA.columns.len());
        assert_eq!(row[0].render().unwrap(), "2024-06-01 00:00:00");
        assert_eq!(row[SCHEMA.column_index("price").unwrap()], Cell::Real(2327.4));
        assert_eq!(row[SCHEMA.column_index("bid").unwrap()], Cell::Real(2327.1));
    }

    #[test]
    fn missing_quote_field_is_a_shape_mismatch() {
        let mut payload = quote();
        payload.as_object_mut().unwrap().remove("ask");
        let err = GoldSpot.transform(&payload, pulled()).unwrap_err();
        assert!(
            matches!(err, ShapeMismatch::Malformed { ref message, .. } if message.contains("ask")),
            "got: {err}"
        );
    }

    #[test]
    fn out_of_range_epoch_becomes_null() {
        assert_eq!(epoch_seconds(Some(i64::MAX)), Cell::Null);
        assert_eq!(epoch_seconds(None), Cell::Null);
    }

    #[test]
    fn null_quote_field_becomes_null_cell() {
        let mut payload = quote();
        payload["bid"] = json!(null);
        let rows = GoldSpot.transform(&payload, pulled()).unwrap();
        assert!(rows[0][SCHEMA.column_index("bid").unwrap()].is_null());
    }
}
