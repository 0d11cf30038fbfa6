//! Alpha Vantage TREASURY_YIELD series → `treasury_yields`.

use chrono::NaiveDateTime;
use serde_json::Value as Json;

use super::{array, date, real, top_level, Endpoint, KeyPlacement, ShapeMismatch, Source, SourceKind};
use crate::record::{Cell, Column, ColumnType, Record, RecordSchema, RequiredColumns};

pub static SCHEMA: RecordSchema = RecordSchema {
    table: "treasury_yields",
    columns: &[
        Column::new("date", ColumnType::Date),
        Column::new("yield_value", ColumnType::Real),
        Column::new("pulled_on", ColumnType::Timestamp),
    ],
    natural_key: &["date"],
    required: RequiredColumns::All,
};

/// Daily 10-year yield by default. Holidays come back as `"."`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreasuryYield;

impl Source for TreasuryYield {
    fn kind(&self) -> SourceKind {
        SourceKind::TreasuryYield
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint {
            url: "https://www.alphavantage.co/query",
            params: &[
                ("function", "TREASURY_YIELD"),
                ("interval", "daily"),
                ("maturity", "10year"),
            ],
            headers: &[],
            key: KeyPlacement::Query("apikey"),
            key_env: "ALPHAVANTAGE_API_KEY",
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
        let points = array(top_level(payload, "data")?, "data")?;
        let rows = points
            .iter()
            .map(|point| {
                vec![
                    point.get("date").and_then(Json::as_str).map_or(Cell::Null, date),
                    point.get("value").map_or(Cell::Null, real),
                    Cell::Timestamp(pulled),
                ]
            })
            .collect();
        Ok(rows)
    }
}
