//! One-shot job runner: fetch → transform → validate → upsert.
//!
//! Each stage runs at most once. A fetch that yields nothing ends the run
//! straight away; every other failure is logged and recorded in the
//! [`RunReport`], never propagated. The database is only opened once a
//! non-empty batch reaches the upsert stage, and only if it already exists.

use std::fmt;
use std::path::PathBuf;

use chrono::{Local, NaiveDateTime};
use tracing::{error, info, warn};

use crate::fetch::{FetchRequest, PayloadSource};
use crate::sources::{is_empty_payload, transform_payload, Source, SourceKind};
use crate::store::Store;
use crate::validate::validate;

/// Last stage a run entered before it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Transforming,
    Validating,
    Upserting,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Upsert committed; number of newly inserted rows (0 if all conflicted
    /// or the validated batch was empty).
    Inserted(usize),
    /// The provider answered with an empty body.
    NoPayload,
    FetchFailed(String),
    UpsertFailed(String),
    /// Dry run: rows that would have been offered to the upsert.
    DryRun(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub source: SourceKind,
    pub stage: Stage,
    /// Rows produced by the transformer.
    pub transformed: usize,
    /// Rows surviving validation.
    pub validated: usize,
    pub outcome: RunOutcome,
}

impl RunReport {
    fn new(source: SourceKind) -> Self {
        Self {
            source,
            stage: Stage::Fetching,
            transformed: 0,
            validated: 0,
            outcome: RunOutcome::NoPayload,
        }
    }

    fn finish(mut self, outcome: RunOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.outcome,
            RunOutcome::FetchFailed(_) | RunOutcome::UpsertFailed(_)
        )
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Inserted(0) => f.write_str("No new records inserted."),
            RunOutcome::Inserted(n) => write!(f, "Upsert completed. {n} new records inserted."),
            RunOutcome::NoPayload => f.write_str("No data to insert."),
            RunOutcome::FetchFailed(e) => write!(f, "Failed to fetch data: {e}"),
            RunOutcome::UpsertFailed(e) => write!(f, "Error during upsert: {e}"),
            RunOutcome::DryRun(n) => write!(f, "Dry run: {n} records ready to insert."),
        }
    }
}

/// A configured job. Borrowed pieces keep the runner agnostic of where the
/// source and fetcher come from (live HTTP or test fixtures).
pub struct Pipeline<'a> {
    pub source: &'a dyn Source,
    pub fetcher: &'a dyn PayloadSource,
    pub request: FetchRequest,
    pub database: PathBuf,
    pub dry_run: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        source: &'a dyn Source,
        fetcher: &'a dyn PayloadSource,
        request: FetchRequest,
        database: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            fetcher,
            request,
            database: database.into(),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run once, stamping rows with the current local time.
    pub fn run(&self) -> RunReport {
        self.run_at(Local::now().naive_local())
    }

    pub fn run_at(&self, pulled: NaiveDateTime) -> RunReport {
        let kind = self.source.kind();
        let mut report = RunReport::new(kind);

        // Fetching
        let payload = match self.fetcher.fetch(&self.request) {
            Ok(payload) => payload,
            Err(e) => {
                error!(source = %kind, "failed to fetch data: {e}");
                return report.finish(RunOutcome::FetchFailed(e.to_string()));
            }
        };
        if is_empty_payload(&payload) {
            warn!(source = %kind, "no data to insert");
            return report.finish(RunOutcome::NoPayload);
        }

        report.stage = Stage::Transforming;
        let batch = transform_payload(self.source, &payload, pulled);
        report.transformed = batch.len();

        report.stage = Stage::Validating;
        let batch = validate(batch);
        report.validated = batch.len();
        info!(
            source = %kind,
            rows = report.transformed,
            valid = report.validated,
            "batch prepared"
        );

        if self.dry_run {
            let validated = report.validated;
            return report.finish(RunOutcome::DryRun(validated));
        }

        report.stage = Stage::Upserting;
        if batch.is_empty() {
            info!(source = %kind, "no data to insert");
            return report.finish(RunOutcome::Inserted(0));
        }
        let result = Store::open_existing(&self.database).and_then(|mut store| store.upsert(&batch));
        match result {
            Ok(inserted) => report.finish(RunOutcome::Inserted(inserted)),
            Err(e) => {
                error!(source = %kind, table = batch.schema().table, "error during upsert: {e}");
                report.finish(RunOutcome::UpsertFailed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use crate::sources::TreasuryYield;
    use serde_json::{json, Value as Json};

    struct Fixed(Json);

    impl PayloadSource for Fixed {
        fn fetch(&self, _: &FetchRequest) -> Result<Json, FetchError> {
            Ok(self.0.clone())
        }
    }

    fn pulled() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 1, 4)
            .unwrap()
            .and_hms_opt(6, 30, 0)
            .unwrap()
    }

    #[test]
    fn empty_payload_exits_before_transform() {
        let fetcher = Fixed(json!({}));
        let report = Pipeline::new(&TreasuryYield, &fetcher, FetchRequest::default(), "unused.db")
            .run_at(pulled());
        assert_eq!(report.outcome, RunOutcome::NoPayload);
        assert_eq!(report.stage, Stage::Fetching);
        assert_eq!(report.transformed, 0);
    }

    #[test]
    fn dry_run_never_opens_the_database() {
        let fetcher = Fixed(json!({"data": [{"date": "2024-01-02", "value": "4.05"}]}));
        let missing_dir = std::env::temp_dir()
            .join("signal-etl-dry-run-never-created")
            .join("x.db");
        let report = Pipeline::new(&TreasuryYield, &fetcher, FetchRequest::default(), &missing_dir)
            .dry_run(true)
            .run_at(pulled());
        assert_eq!(report.outcome, RunOutcome::DryRun(1));
        assert_eq!(report.stage, Stage::Validating);
        assert_eq!(report.validated, 1);
        assert!(!missing_dir.exists());
    }

    #[test]
    fn outcome_messages() {
        assert_eq!(
            RunOutcome::Inserted(3).to_string(),
            "Upsert completed. 3 new records inserted."
        );
        assert_eq!(RunOutcome::NoPayload.to_string(), "No data to insert.");
    }
}
