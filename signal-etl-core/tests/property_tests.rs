//! Property tests for validation invariants.
//!
//! 1. Clamping keeps every real inside its bound and leaves in-range values alone
//! 2. Truncation keeps a prefix of at most N characters
//! 3. Validation never yields a null in a required column

use proptest::prelude::*;
use signal_etl_core::record::{Bound, Cell, RecordBatch};
use signal_etl_core::sources::crypto::{self, MAX_DOMINANCE, MAX_MAGNITUDE, MAX_PERCENT_CHANGE};
use signal_etl_core::validate::{clamp, validate};

// ── Strategies ───────────────────────────────────────────────────────

fn arb_real() -> impl Strategy<Value = f64> {
    prop_oneof![-1e16..1e16_f64, -20_000.0..20_000.0_f64, -2_000.0..2_000.0_f64]
}

fn arb_cell_text() -> impl Strategy<Value = Cell> {
    prop_oneof![
        Just(Cell::Null),
        "\\PC{0,24}".prop_map(Cell::Text),
    ]
}

fn arb_cell_real() -> impl Strategy<Value = Cell> {
    prop_oneof![Just(Cell::Null), arb_real().prop_map(Cell::Real)]
}

// ── 1. Numeric clamps ────────────────────────────────────────────────

proptest! {
    #[test]
    fn upper_bound_caps_and_preserves(v in arb_real()) {
        let Cell::Real(out) = clamp(Cell::Real(v), Bound::AtMost(MAX_MAGNITUDE)) else {
            panic!("clamp changed cell kind");
        };
        prop_assert!(out <= MAX_MAGNITUDE);
        if v <= MAX_MAGNITUDE {
            prop_assert_eq!(out, v);
        }
    }

    #[test]
    fn two_sided_bound_stays_within(v in arb_real()) {
        let bound = Bound::Within { min: -MAX_PERCENT_CHANGE, max: MAX_PERCENT_CHANGE };
        let Cell::Real(out) = clamp(Cell::Real(v), bound) else {
            panic!("clamp changed cell kind");
        };
        prop_assert!((-MAX_PERCENT_CHANGE..=MAX_PERCENT_CHANGE).contains(&out));
        if v.abs() <= MAX_PERCENT_CHANGE {
            prop_assert_eq!(out, v);
        }
    }

    #[test]
    fn clamp_is_idempotent(v in arb_real()) {
        let once = clamp(Cell::Real(v), Bound::AtMost(MAX_DOMINANCE));
        let twice = clamp(once.clone(), Bound::AtMost(MAX_DOMINANCE));
        prop_assert_eq!(once, twice);
    }
}

// ── 2. Truncation ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn truncation_is_a_char_prefix(s in "\\PC{0,80}", max in 0usize..60) {
        let Cell::Text(out) = clamp(Cell::Text(s.clone()), Bound::MaxChars(max)) else {
            panic!("clamp changed cell kind");
        };
        prop_assert!(out.chars().count() <= max);
        prop_assert!(s.starts_with(&out));
        if s.chars().count() <= max {
            prop_assert_eq!(out, s);
        }
    }
}

// ── 3. Required columns ──────────────────────────────────────────────

proptest! {
    #[test]
    fn validated_crypto_rows_have_symbol_and_timestamp(
        symbols in prop::collection::vec(arb_cell_text(), 1..20),
        stamps in prop::collection::vec(prop::bool::ANY, 1..20),
        prices in prop::collection::vec(arb_cell_real(), 1..20),
    ) {
        let schema = &crypto::SCHEMA;
        let symbol = schema.column_index("symbol").unwrap();
        let updated = schema.column_index("last_updated").unwrap();
        let price = schema.column_index("price").unwrap();
        let when = chrono::NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();

        let n = symbols.len().min(stamps.len()).min(prices.len());
        let rows = (0..n)
            .map(|i| {
                let mut row = vec![Cell::Null; schema.columns.len()];
                row[symbol] = symbols[i].clone();
                row[updated] = if stamps[i] { Cell::Timestamp(when) } else { Cell::Null };
                row[price] = prices[i].clone();
                row
            })
            .collect();

        let out = validate(RecordBatch::new(schema, rows));
        for row in out.rows() {
            prop_assert!(!row[symbol].is_null());
            prop_assert!(!row[updated].is_null());
            if let Some(p) = row[price].as_f64() {
                prop_assert!(p <= MAX_MAGNITUDE);
            }
            if let Some(s) = row[symbol].as_str() {
                prop_assert!(s.chars().count() <= 10);
            }
        }
    }
}
