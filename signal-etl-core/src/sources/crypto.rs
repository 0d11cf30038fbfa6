//! CoinMarketCap latest listings → `crypto_price_history`.

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value as Json;

use super::{
    decode, finite, nullable, rfc3339_utc, top_level, Endpoint, KeyPlacement, ShapeMismatch,
    Source, SourceKind,
};
use crate::record::{Bound, Cell, Column, ColumnType, Record, RecordSchema, RequiredColumns};

/// Ceiling for magnitude columns stored as NUMERIC(15, 2) upstream.
pub const MAX_MAGNITUDE: f64 = 999_999_999_999.0;
/// Ceiling for market-cap dominance (NUMERIC(5, 2)).
pub const MAX_DOMINANCE: f64 = 999.99;
/// Two-sided limit for percent changes (NUMERIC(8, 4)).
pub const MAX_PERCENT_CHANGE: f64 = 9_999.9999;

const PERCENT_CHANGE: Bound = Bound::Within {
    min: -MAX_PERCENT_CHANGE,
    max: MAX_PERCENT_CHANGE,
};

pub static SCHEMA: RecordSchema = RecordSchema {
    table: "crypto_price_history",
    columns: &[
        Column::new("cmc_id", ColumnType::Integer),
        Column::bounded("name", ColumnType::Text, Bound::MaxChars(50)),
        Column::bounded("symbol", ColumnType::Text, Bound::MaxChars(10)),
        Column::new("cmc_rank", ColumnType::Integer),
        Column::bounded("price", ColumnType::Real, Bound::AtMost(MAX_MAGNITUDE)),
        Column::bounded("volume_24h", ColumnType::Real, Bound::AtMost(MAX_MAGNITUDE)),
        Column::bounded("market_cap", ColumnType::Real, Bound::AtMost(MAX_MAGNITUDE)),
        Column::bounded(
            "market_cap_dominance",
            ColumnType::Real,
            Bound::AtMost(MAX_DOMINANCE),
        ),
        Column::bounded(
            "circulating_supply",
            ColumnType::Real,
            Bound::AtMost(MAX_MAGNITUDE),
        ),
        Column::bounded("max_supply", ColumnType::Real, Bound::AtMost(MAX_MAGNITUDE)),
        Column::bounded("percent_change_1h", ColumnType::Real, PERCENT_CHANGE),
        Column::bounded("percent_change_24h", ColumnType::Real, PERCENT_CHANGE),
        Column::bounded("percent_change_7d", ColumnType::Real, PERCENT_CHANGE),
        Column::new("last_updated", ColumnType::Timestamp),
        Column::new("pulled_at", ColumnType::Timestamp),
    ],
    natural_key: &["symbol", "last_updated"],
    required: RequiredColumns::Only(&["symbol", "last_updated"]),
};

/// One entry of the listings `data` array. Every key must be present;
/// CoinMarketCap sends `null` for values it does not have.
#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(deserialize_with = "nullable")]
    id: Option<i64>,
    #[serde(deserialize_with = "nullable")]
    name: Option<String>,
    #[serde(deserialize_with = "nullable")]
    symbol: Option<String>,
    #[serde(deserialize_with = "nullable")]
    cmc_rank: Option<i64>,
    #[serde(deserialize_with = "nullable")]
    circulating_supply: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    max_supply: Option<f64>,
    quote: Quotes,
}

#[derive(Debug, Deserialize)]
struct Quotes {
    #[serde(rename = "USD")]
    usd: UsdQuote,
}

#[derive(Debug, Deserialize)]
struct UsdQuote {
    #[serde(deserialize_with = "nullable")]
    price: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    volume_24h: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    market_cap: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    market_cap_dominance: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    percent_change_1h: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    percent_change_24h: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    percent_change_7d: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    last_updated: Option<String>,
}

impl Listing {
    fn into_row(self, pulled: NaiveDateTime) -> Record {
        let usd = self.quote.usd;
        vec![
            self.id.map_or(Cell::Null, Cell::Integer),
            self.name.map_or(Cell::Null, Cell::Text),
            self.symbol.map_or(Cell::Null, Cell::Text),
            self.cmc_rank.map_or(Cell::Null, Cell::Integer),
            finite(usd.price),
            finite(usd.volume_24h),
            finite(usd.market_cap),
            finite(usd.market_cap_dominance),
            finite(self.circulating_supply),
            finite(self.max_supply),
            finite(usd.percent_change_1h),
            finite(usd.percent_change_24h),
            finite(usd.percent_change_7d),
            rfc3339_utc(usd.last_updated.as_deref()),
            Cell::Timestamp(pulled),
        ]
    }
}

/// Top-N cryptocurrency listings with their USD quote.
#[derive(Debug, Clone, Copy, Default)]
pub struct CryptoListings;

impl Source for CryptoListings {
    fn kind(&self) -> SourceKind {
        SourceKind::Crypto
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint {
            url: "https://pro-api.coinmarketcap.com/v1/cryptocurrency/listings/latest",
            params: &[("start", "1"), ("limit", "100"), ("convert", "USD")],
            headers: &[("Accepts", "application/json")],
            key: KeyPlacement::Header("X-CMC_PRO_API_KEY"),
            key_env: "CMC_PRO_API_KEY",
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
        let listings: Vec<Listing> = decode(top_level(payload, "data")?, "listings")?;
        Ok(listings
            .into_iter()
            .map(|listing| listing.into_row(pulled))
            .collect())
    }
}
