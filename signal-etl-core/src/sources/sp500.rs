//! Alpha Vantage TIME_SERIES_DAILY bars → `sp500_index_data`.

use chrono::NaiveDateTime;
use serde_json::Value as Json;

use super::{
    date, integer, lenient, real, top_level, Endpoint, KeyPlacement, ShapeMismatch, Source,
    SourceKind,
};
use crate::record::{Cell, Column, ColumnType, Record, RecordSchema, RequiredColumns};

const SERIES_KEY: &str = "Time Series (Daily)";

pub static SCHEMA: RecordSchema = RecordSchema {
    table: "sp500_index_data",
    columns: &[
        Column::new("date", ColumnType::Date),
        Column::new("open", ColumnType::Real),
        Column::new("high", ColumnType::Real),
        Column::new("low", ColumnType::Real),
        Column::new("close", ColumnType::Real),
        Column::new("volume", ColumnType::Integer),
        Column::new("pulled_on", ColumnType::Timestamp),
    ],
    natural_key: &["date"],
    required: RequiredColumns::All,
};

/// Daily OHLCV for an S&P 500 tracker (VOO by default).
#[derive(Debug, Clone, Copy, Default)]
pub struct Sp500Daily;

impl Source for Sp500Daily {
    fn kind(&self) -> SourceKind {
        SourceKind::Sp500
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint {
            url: "https://www.alphavantage.co/query",
            params: &[("function", "TIME_SERIES_DAILY"), ("symbol", "VOO")],
            headers: &[],
            key: KeyPlacement::Query("apikey"),
            key_env: "ALPHAVANTAGE_API_KEY",
        }
    }

    fn schema(&self) -> &'static RecordSchema {
        &SCHEMA
    }

    /// One row per date key, oldest first. ISO dates sort lexically, so the
    /// keys are ordered as strings regardless of how the map iterates.
    fn transform(
        &self,
        payload: &Json,
        pulled: NaiveDateTime,
    ) -> Result<Vec<Record>, ShapeMismatch> {
        let series = top_level(payload, SERIES_KEY)?
            .as_object()
            .ok_or_else(|| ShapeMismatch::WrongType {
                key: SERIES_KEY.into(),
                expected: "an object keyed by date",
            })?;

        let mut bars: Vec<(&String, &Json)> = series.iter().collect();
        bars.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let rows = bars
            .into_iter()
            .map(|(day, bar)| {
                let get = |key: &str| lenient(bar, key);
                vec![
                    date(day),
                    real(get("1. open")),
                    real(get("2. high")),
                    real(get("3. low")),
                    real(get("4. close")),
                    integer(get("5. volume")),
                    Cell::Timestamp(pulled),
                ]
            })
            .collect();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn pulled() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 4)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap()
    }

    #[test]
    fn date_keys_become_rows_in_ascending_order() {
        let payload = json!({
            "Meta Data": {"2. Symbol": "VOO"},
            "Time Series (Daily)": {
                "2024-01-03": {"1. open": "435.1", "2. high": "436.0", "3. low": "432.2",
                               "4. close": "433.5", "5. volume": "4100000"},
                "2024-01-02": {"1. open": "437.9", "2. high": "438.6", "3. low": "435.0",
                               "4. close": "436.8", "5. volume": "5200000"}
            }
        });
        let rows = Sp500Daily.transform(&payload, pulled()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0].render().unwrap(), "2024-01-02");
        assert_eq!(rows[0][1], Cell::Real(437.9));
        assert_eq!(rows[0][5], Cell::Integer(5_200_000));
        assert_eq!(rows[1][0].render().unwrap(), "2024-01-03");
    }

    #[test]
    fn unparseable_fields_become_null() {
        let payload = json!({"Time Series (Daily)": {
            "not-a-date": {"1. open": "x", "2. high": "1", "3. low": "1", "4. close": "1", "5. volume": "1"}
        }});
        let rows = Sp500Daily.transform(&payload, pulled()).unwrap();
        assert!(rows[0][0].is_null());
        assert!(rows[0][1].is_null());
    }

    #[test]
    fn missing_series_is_a_shape_mismatch() {
        let err = Sp500Daily
            .transform(&json!({"Meta Data": {}}), pulled())
            .unwrap_err();
        assert!(matches!(err, ShapeMismatch::MissingKey { .. }));
    }
}
