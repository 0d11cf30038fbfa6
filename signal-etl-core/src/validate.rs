//! Field-level validation: clamp cells to column bounds, drop incomplete rows.
//!
//! Bounds come from the batch's schema. Out-of-range values are capped or
//! truncated in place; a row is only ever dropped for a null in a required
//! column.

use tracing::debug;

use crate::record::{Bound, Cell, Record, RecordBatch};

/// Apply the schema's bounds and required-column policy to a batch.
pub fn validate(batch: RecordBatch) -> RecordBatch {
    let schema = batch.schema();
    let required = schema.required_indices();
    let before = batch.len();

    let rows: Vec<Record> = batch
        .into_rows()
        .into_iter()
        .filter(|row| required.iter().all(|&i| !row[i].is_null()))
        .map(|row| {
            row.into_iter()
                .zip(schema.columns)
                .map(|(cell, column)| match column.bound {
                    Some(bound) => clamp(cell, bound),
                    None => cell,
                })
                .collect()
        })
        .collect();

    let dropped = before - rows.len();
    if dropped > 0 {
        debug!(
            table = schema.table,
            dropped, "dropped rows with missing required values"
        );
    }
    RecordBatch::new(schema, rows)
}

/// Clamp a single cell to a bound. Nulls and cells of another kind pass through.
pub fn clamp(cell: Cell, bound: Bound) -> Cell {
    match (cell, bound) {
        (Cell::Text(s), Bound::MaxChars(max)) => Cell::Text(truncate_chars(s, max)),
        (Cell::Real(v), Bound::AtMost(max)) => Cell::Real(v.min(max)),
        (Cell::Real(v), Bound::Within { min, max }) => Cell::Real(v.clamp(min, max)),
        (Cell::Integer(v), Bound::AtMost(max)) if v as f64 > max => Cell::Integer(max.floor() as i64),
        (Cell::Integer(v), Bound::Within { min, max }) => {
            Cell::Integer(v.clamp(min.ceil() as i64, max.floor() as i64))
        }
        (cell, _) => cell,
    }
}

fn truncate_chars(s: String, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => s[..cut].to_string(),
        None => s,
    }
}
