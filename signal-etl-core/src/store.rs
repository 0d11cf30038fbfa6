//! SQLite destination tables and the insert-or-ignore upsert.
//!
//! Each schema maps to one table with a UNIQUE constraint over its natural
//! key. Upserts never update: a row whose key already exists is skipped by
//! `ON CONFLICT DO NOTHING`, and only newly inserted rows are counted.

use std::path::{Path, PathBuf};

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;
use tracing::{debug, info};

use crate::record::{Cell, RecordBatch, RecordSchema, DATE_FORMAT, TIMESTAMP_FORMAT};

/// Upper bound on `?` placeholders per statement (SQLite ≥ 3.32 default).
const MAX_BOUND_PARAMS: usize = 32_766;

/// Errors from the destination database.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database {} does not exist (run `signal-etl init-db` first)", .path.display())]
    DatabaseMissing { path: PathBuf },

    #[error("table '{table}' does not exist (run `signal-etl init-db` first)")]
    TableMissing { table: String },

    #[error("table '{table}' is missing column(s): {}", .missing.join(", "))]
    SchemaMismatch { table: String, missing: Vec<String> },
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Cell::Null => ToSqlOutput::Owned(SqlValue::Null),
            Cell::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Cell::Integer(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            Cell::Real(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Cell::Timestamp(ts) => {
                ToSqlOutput::Owned(SqlValue::Text(ts.format(TIMESTAMP_FORMAT).to_string()))
            }
            Cell::Date(d) => ToSqlOutput::Owned(SqlValue::Text(d.format(DATE_FORMAT).to_string())),
        })
    }
}

/// A connection to the destination database.
///
/// Create with [`Store::open`] for a file-backed database or
/// [`Store::in_memory`] for tests.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Open a database that `init-db` already created. Never creates the file.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(StoreError::DatabaseMissing {
                path: path.to_path_buf(),
            });
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Create the table for `schema` if it does not exist yet.
    pub fn create_table(&self, schema: &RecordSchema) -> Result<()> {
        self.conn.execute_batch(&create_table_sql(schema))?;
        debug!(table = schema.table, "table ready");
        Ok(())
    }

    /// Column names of the live table, in table order. Empty if the table is absent.
    pub fn live_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// Check that the live table carries every column the schema declares.
    pub fn verify_table(&self, schema: &RecordSchema) -> Result<()> {
        let live = self.live_columns(schema.table)?;
        if live.is_empty() {
            return Err(StoreError::TableMissing {
                table: schema.table.to_string(),
            });
        }
        let missing: Vec<String> = schema
            .column_names()
            .filter(|name| !live.iter().any(|l| l == name))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::SchemaMismatch {
                table: schema.table.to_string(),
                missing,
            });
        }
        Ok(())
    }

    /// Insert every row of `batch`, skipping rows whose natural key exists.
    ///
    /// Returns the number of rows actually inserted. All statements run in one
    /// transaction, so a failure leaves the table untouched.
    pub fn upsert(&mut self, batch: &RecordBatch) -> Result<usize> {
        let schema = batch.schema();
        if batch.is_empty() {
            info!(table = schema.table, "no data to insert");
            return Ok(0);
        }
        self.verify_table(schema)?;

        let rows_per_statement = (MAX_BOUND_PARAMS / schema.columns.len()).max(1);
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        for chunk in batch.rows().chunks(rows_per_statement) {
            let sql = insert_sql(schema, chunk.len());
            inserted += tx.execute(&sql, rusqlite::params_from_iter(chunk.iter().flatten()))?;
        }
        tx.commit()?;

        info!(
            table = schema.table,
            rows = batch.len(),
            inserted,
            "upsert completed"
        );
        Ok(inserted)
    }

    pub fn count_rows(&self, table: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Read one column as rendered text, in insertion order (test and CLI helper).
    pub fn column_values(&self, table: &str, column: &str) -> Result<Vec<Option<String>>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT CAST({col} AS TEXT) FROM {tbl} ORDER BY rowid",
            col = quote_ident(column),
            tbl = quote_ident(table)
        ))?;
        let values = stmt
            .query_map([], |row| row.get::<_, Option<String>>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(values)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Idempotent DDL: surrogate id, one column per schema column, UNIQUE natural key.
pub fn create_table_sql(schema: &RecordSchema) -> String {
    let mut lines = vec!["    id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    for column in schema.columns {
        let not_null = if schema.is_required(column.name) {
            " NOT NULL"
        } else {
            ""
        };
        lines.push(format!(
            "    {} {}{not_null}",
            quote_ident(column.name),
            column.kind.sql_type()
        ));
    }
    let key: Vec<String> = schema.natural_key.iter().map(|k| quote_ident(k)).collect();
    lines.push(format!("    UNIQUE ({})", key.join(", ")));

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
        quote_ident(schema.table),
        lines.join(",\n")
    )
}

fn insert_sql(schema: &RecordSchema, rows: usize) -> String {
    let columns: Vec<String> = schema.column_names().map(quote_ident).collect();
    let placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
    let values = vec![placeholders.as_str(); rows].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES {} ON CONFLICT DO NOTHING",
        quote_ident(schema.table),
        columns.join(", "),
        values
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Column, ColumnType, RequiredColumns};

    static PRICES: RecordSchema = RecordSchema {
        table: "prices",
        columns: &[
            Column::new("symbol", ColumnType::Text),
            Column::new("price", ColumnType::Real),
        ],
        natural_key: &["symbol"],
        required: RequiredColumns::Only(&["symbol"]),
    };

    fn row(symbol: &str, price: f64) -> Vec<Cell> {
        vec![Cell::Text(symbol.into()), Cell::Real(price)]
    }

    #[test]
    fn ddl_declares_unique_natural_key() {
        let sql = create_table_sql(&PRICES);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"prices\""));
        assert!(sql.contains("\"symbol\" TEXT NOT NULL"));
        assert!(sql.contains("\"price\" REAL,"));
        assert!(sql.contains("UNIQUE (\"symbol\")"));
    }

    #[test]
    fn insert_sql_has_one_tuple_per_row() {
        let sql = insert_sql(&PRICES, 2);
        assert_eq!(
            sql,
            "INSERT INTO \"prices\" (\"symbol\", \"price\") VALUES (?, ?), (?, ?) ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn conflicting_rows_are_skipped_not_updated() {
        let mut store = Store::in_memory().unwrap();
        store.create_table(&PRICES).unwrap();

        let first = RecordBatch::new(&PRICES, vec![row("BTC", 1.0), row("ETH", 2.0)]);
        assert_eq!(store.upsert(&first).unwrap(), 2);

        let second = RecordBatch::new(&PRICES, vec![row("BTC", 99.0), row("SOL", 3.0)]);
        assert_eq!(store.upsert(&second).unwrap(), 1);

        assert_eq!(store.count_rows("prices").unwrap(), 3);
        let prices = store.column_values("prices", "price").unwrap();
        assert_eq!(prices[0].as_deref(), Some("1.0"));
    }

    #[test]
    fn empty_batch_does_not_need_a_table() {
        let mut store = Store::in_memory().unwrap();
        assert_eq!(store.upsert(&RecordBatch::empty(&PRICES)).unwrap(), 0);
    }

    #[test]
    fn missing_table_fails_fast() {
        let mut store = Store::in_memory().unwrap();
        let err = store
            .upsert(&RecordBatch::new(&PRICES, vec![row("BTC", 1.0)]))
            .unwrap_err();
        assert!(matches!(err, StoreError::TableMissing { .. }), "got: {err}");
    }

    #[test]
    fn drifted_table_reports_missing_columns() {
        let mut store = Store::in_memory().unwrap();
        store
            .conn
            .execute_batch("CREATE TABLE prices (id INTEGER PRIMARY KEY, symbol TEXT UNIQUE)")
            .unwrap();
        let err = store
            .upsert(&RecordBatch::new(&PRICES, vec![row("BTC", 1.0)]))
            .unwrap_err();
        match err {
            StoreError::SchemaMismatch { missing, .. } => assert_eq!(missing, vec!["price"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn large_batches_are_chunked_within_one_transaction() {
        let mut store = Store::in_memory().unwrap();
        store.create_table(&PRICES).unwrap();
        let rows: Vec<_> = (0..20_000).map(|i| row(&format!("S{i}"), i as f64)).collect();
        let inserted = store.upsert(&RecordBatch::new(&PRICES, rows)).unwrap();
        assert_eq!(inserted, 20_000);
        assert_eq!(store.count_rows("prices").unwrap(), 20_000);
    }

    #[test]
    fn open_existing_never_creates_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("signal.db");

        let err = Store::open_existing(&path).err().unwrap();
        assert!(matches!(err, StoreError::DatabaseMissing { .. }), "got: {err}");
        assert!(err.to_string().contains("init-db"));
        assert!(!path.exists());
        assert!(!path.parent().unwrap().exists());

        Store::open(&path).unwrap().create_table(&PRICES).unwrap();
        let mut store = Store::open_existing(&path).unwrap();
        let inserted = store
            .upsert(&RecordBatch::new(&PRICES, vec![row("BTC", 1.0)]))
            .unwrap();
        assert_eq!(inserted, 1);
    }
}
