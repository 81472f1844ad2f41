//! Read path: turns persisted `stat1`/`stat4` rows back into the
//! in-memory estimates a query planner would consult (§4.2 "Loading
//! statistics back").
//!
//! Parse failures are recovered locally here, never propagated: a
//! malformed row just means that index keeps its default (empty)
//! estimates, per §7's `Corrupt` propagation policy.

use super::stat::{Stat1Row, Stat4Row};

/// Per-index row-count estimates recovered from a `stat1` row: `row_est[0]`
/// is the table's row count, `row_est[1..=K]` are the per-prefix averages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowEstimates {
    pub row_est: Vec<u64>,
    pub unordered: bool,
}

impl RowEstimates {
    fn from_stat1(row: &Stat1Row) -> Self {
        let mut row_est = Vec::with_capacity(row.avg.len() + 1);
        row_est.push(row.rowcount);
        row_est.extend_from_slice(&row.avg);
        Self {
            row_est,
            unordered: row.unordered,
        }
    }
}

/// Parses one raw `stat1.stat` field into [`RowEstimates`]. Returns
/// `None` on any parse failure — the caller leaves the index at its
/// default estimates rather than failing database open.
pub fn load_stat1_row(table: &str, index: Option<&str>, stat: &str) -> Option<RowEstimates> {
    match Stat1Row::parse(table.to_string(), index.map(str::to_string), stat) {
        Ok(row) => Some(RowEstimates::from_stat1(&row)),
        Err(_) => None,
    }
}

/// Derives the `avgEq` estimate for the leading index column from an
/// ordered group of `stat4` rows belonging to one index (§4.2):
/// `(last.lt[0] - sum(earlier rows' eq[0])) / last.dlt[0]`, clamped to
/// at least 1 so a planner never divides by (or multiplies against) zero.
///
/// `samples` must be in the arrival order they were written in (stat4
/// row order is otherwise implementation-defined, per §5's ordering
/// guarantees — the caller is responsible for preserving write order
/// across the reload, e.g. by an autoincrementing row id on the table).
pub fn avg_eq_from_samples(samples: &[Stat4Row]) -> u64 {
    let Some(last) = samples.last() else {
        return 1;
    };
    let Some(&last_dlt0) = last.dlt.first() else {
        return 1;
    };
    if last_dlt0 == 0 {
        return 1;
    }
    let earlier_eq0: u64 = samples[..samples.len() - 1].iter().map(|s| s.eq.first().copied().unwrap_or(0)).sum();
    let last_lt0 = last.lt.first().copied().unwrap_or(0);
    (last_lt0.saturating_sub(earlier_eq0) / last_dlt0).max(1)
}
