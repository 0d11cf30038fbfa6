//! signal-etl core: market and sentiment data jobs for SQLite.
//!
//! Every job follows the same shape:
//! - fetch one JSON payload over HTTP ([`fetch`])
//! - reshape it into typed rows for a static table schema ([`sources`], [`record`])
//! - clamp values to column bounds and drop incomplete rows ([`validate`])
//! - insert-or-ignore on the table's natural key ([`store`])
//!
//! [`pipeline`] wires the stages together; [`config`] resolves endpoints,
//! API keys and the database path.

pub mod config;
pub mod fetch;
pub mod pipeline;
pub mod record;
pub mod sources;
pub mod store;
pub mod validate;

pub use config::{ConfigError, EtlConfig};
pub use fetch::{FetchError, FetchRequest, HttpFetcher, PayloadSource};
pub use pipeline::{Pipeline, RunOutcome, RunReport, Stage};
pub use record::{Cell, RecordBatch, RecordSchema};
pub use sources::{Source, SourceKind};
pub use store::{Store, StoreError};
