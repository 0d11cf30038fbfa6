//! Record model: static table schemas, typed cells, and row batches.
//!
//! Every source declares one [`RecordSchema`] up front. Transformers emit rows
//! in that schema's column order, the validator applies the schema's bounds and
//! required-column policy, and the store writes the rows to the schema's table.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Storage format for timestamp cells (UTC or local wall clock, no offset).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Storage format for date cells.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Timestamp,
    Date,
}

impl ColumnType {
    /// SQLite type affinity used in table DDL.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text | ColumnType::Timestamp | ColumnType::Date => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

/// Column constraint enforced by clamping, never by rejecting the row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    /// Text is cut to at most this many characters.
    MaxChars(usize),
    /// Numbers above the ceiling are replaced by the ceiling.
    AtMost(f64),
    /// Numbers outside the inclusive range are replaced by the nearest end.
    Within { min: f64, max: f64 },
}

/// One column of a table schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnType,
    pub bound: Option<Bound>,
}

impl Column {
    pub const fn new(name: &'static str, kind: ColumnType) -> Self {
        Self {
            name,
            kind,
            bound: None,
        }
    }

    pub const fn bounded(name: &'static str, kind: ColumnType, bound: Bound) -> Self {
        Self {
            name,
            kind,
            bound: Some(bound),
        }
    }
}

/// Which columns must be non-null for a row to survive validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredColumns {
    /// Any null anywhere drops the row.
    All,
    /// Only the listed columns are checked.
    Only(&'static [&'static str]),
}

/// Static description of a destination table.
#[derive(Debug, PartialEq)]
pub struct RecordSchema {
    pub table: &'static str,
    pub columns: &'static [Column],
    /// Columns covered by the table's UNIQUE constraint.
    pub natural_key: &'static [&'static str],
    pub required: RequiredColumns,
}

impl RecordSchema {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }

    pub fn is_required(&self, name: &str) -> bool {
        match self.required {
            RequiredColumns::All => self.column_index(name).is_some(),
            RequiredColumns::Only(names) => names.contains(&name),
        }
    }

    /// Positions of required columns, in schema order.
    pub fn required_indices(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| self.is_required(c.name))
            .map(|(i, _)| i)
            .collect()
    }
}

/// A single typed value in a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Real(v) => Some(*v),
            Cell::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text form used for storage and display; `None` for null.
    pub fn render(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Integer(v) => Some(v.to_string()),
            Cell::Real(v) => Some(v.to_string()),
            Cell::Timestamp(ts) => Some(ts.format(TIMESTAMP_FORMAT).to_string()),
            Cell::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
        }
    }
}

/// One flat row, cells in schema column order.
pub type Record = Vec<Cell>;

/// Ordered rows sharing one schema.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    schema: &'static RecordSchema,
    rows: Vec<Record>,
}

impl RecordBatch {
    pub fn new(schema: &'static RecordSchema, rows: Vec<Record>) -> Self {
        debug_assert!(
            rows.iter().all(|r| r.len() == schema.columns.len()),
            "row width does not match schema for {}",
            schema.table
        );
        Self { schema, rows }
    }

    pub fn empty(schema: &'static RecordSchema) -> Self {
        Self::new(schema, Vec::new())
    }

    pub fn schema(&self) -> &'static RecordSchema {
        self.schema
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }

    /// Cell at `row` in the named column.
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.schema.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SAMPLE: RecordSchema = RecordSchema {
        table: "sample",
        columns: &[
            Column::bounded("symbol", ColumnType::Text, Bound::MaxChars(4)),
            Column::new("price", ColumnType::Real),
            Column::new("day", ColumnType::Date),
        ],
        natural_key: &["symbol", "day"],
        required: RequiredColumns::Only(&["symbol", "day"]),
    };

    #[test]
    fn required_indices_follow_policy() {
        assert_eq!(SAMPLE.required_indices(), vec![0, 2]);
        assert!(!SAMPLE.is_required("price"));
        assert!(!SAMPLE.is_required("nope"));
    }

    #[test]
    fn batch_lookup_by_column_name() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let batch = RecordBatch::new(
            &SAMPLE,
            vec![vec![Cell::Text("BTC".into()), Cell::Real(1.5), Cell::Date(day)]],
        );
        assert_eq!(batch.get(0, "price"), Some(&Cell::Real(1.5)));
        assert_eq!(batch.get(0, "missing"), None);
        assert_eq!(batch.get(1, "price"), None);
    }

    #[test]
    fn render_uses_storage_formats() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(5, 6, 7)
            .unwrap();
        assert_eq!(Cell::Timestamp(ts).render().unwrap(), "2024-03-04 05:06:07");
        assert_eq!(Cell::Date(ts.date()).render().unwrap(), "2024-03-04");
        assert_eq!(Cell::Null.render(), None);
    }
}
