//! `ANALYZE`-style index statistics: `stat1` summaries and `stat4` sample
//! histograms (§4.2).
//!
//! [`analyze_index`] drives an already-populated [`Sorter`] to
//! completion (calling [`Sorter::rewind`] itself) and walks its sorted
//! output exactly once, maintaining the per-column-prefix change
//! detection state described in §4.2 and feeding every row to a bounded
//! [`reservoir::Reservoir`]. One forward pass produces both a `stat1`
//! row and the index's `stat4` sample rows; neither needs the full key
//! set materialized in memory.

pub mod load;
mod reservoir;
pub mod stat;

#[cfg(test)]
mod tests;

use rand::RngCore;
use thiserror::Error;
use tracing::{debug, info, info_span, trace};

use crate::comparator::Comparator;
use crate::key::IndexKeyCodec;
use crate::sorter::{Sorter, SorterError};
use crate::store::StoreError;

pub use load::{RowEstimates, avg_eq_from_samples, load_stat1_row};
use reservoir::Reservoir;
pub use stat::{Stat1Row, Stat4Row};

/// Errors surfaced by [`analyze_index`].
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// Allocation failure while growing a per-row or per-sample buffer.
    #[error("out of memory")]
    OutOfMemory,

    /// The collaborator store failed while the analyzer was scanning.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The sorter driving this scan failed or was misused.
    #[error("sorter error: {0}")]
    Sorter(#[from] SorterError),

    /// A `stat1`/`stat4` row, or an index key during the scan itself,
    /// failed to parse. Recovered locally by the load path (§7); during
    /// a live scan this aborts only the current index.
    #[error("corrupt: {0}")]
    Corrupt(String),
}

/// Tuning knobs for [`analyze_index`].
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Reservoir capacity `S` (§4.2.1). Default 24.
    pub sample_capacity: usize,

    /// Divisor used to size the periodic stride `P = ceil(rowcount /
    /// (S/divisor + 1)) + 1`. Default 3.
    pub periodic_divisor: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sample_capacity: 24,
            periodic_divisor: 3,
        }
    }
}

/// The rows one `analyze_index` call produces: at most one `stat1` row
/// (`None` when the index is empty, per §4.2's "vacuous division" rule)
/// and zero or more `stat4` sample rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzeOutput {
    pub stat1: Option<Stat1Row>,
    pub stat4: Vec<Stat4Row>,
}

/// Whether two decoded column values are the same group. `prev`/`cur` are
/// already-decoded single-column values (from [`IndexKeyCodec::column`]),
/// never whole keys — comparing them through a whole-key [`Comparator`]
/// (e.g. [`RecordComparator`](crate::key::RecordComparator)) would feed it
/// a bare field it cannot decode as a record, so equality here is a direct
/// byte comparison; only the NULL-equals-NULL flag is still the
/// comparator's call (§6.2).
fn columns_equal(prev: Option<&[u8]>, cur: Option<&[u8]>, comparator: &dyn Comparator) -> bool {
    match (prev, cur) {
        (None, None) => comparator.null_eq(),
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn decode_column<'a>(codec: &dyn IndexKeyCodec, key: &'a [u8], ncols: usize, col: usize) -> Result<Option<&'a [u8]>, AnalyzerError> {
    codec
        .column(key, ncols, col)
        .ok_or_else(|| AnalyzerError::Corrupt(format!("index key too short for column {col}")))
}

/// Computes `stat1_row` and `stat4_rows[]` for one index (§4.2's public
/// contract `analyze_index(table, index) -> {stat1_row, stat4_rows[]}`).
///
/// `sorter` must be freshly opened and fully populated via
/// [`Sorter::insert`] (one insert per index row, keys encoded with
/// `codec`) — this function calls [`Sorter::rewind`] itself and then
/// drains the sorter completely, realizing §2's data flow (`Sorter.insert
/// -> Sorter.rewind -> Sorter.next/key -> Analyzer`) as a single call.
///
/// `row_count_hint` only sizes the reservoir's periodic stride `P` ahead
/// of the scan (§3's "periodicity parameter" is defined in terms of the
/// final rowcount, which isn't known until the scan completes; a rough
/// upfront estimate — e.g. the table's previous `stat1` rowcount, or a
/// pager page-count estimate — is what a real query planner already has
/// lying around, and is all §4.2.1's stride needs). `seed` is the VFS
/// randomness source of §6.3, consumed as the reservoir's initial hash
/// state. Callers without their own entropy source can draw one from
/// [`generate_seed`].
pub fn analyze_index(
    sorter: &mut Sorter<'_>,
    codec: &dyn IndexKeyCodec,
    comparator: &dyn Comparator,
    table: &str,
    index: &str,
    ncols: usize,
    unordered: bool,
    row_count_hint: u64,
    seed: [u8; 32],
    config: &AnalyzerConfig,
) -> Result<AnalyzeOutput, AnalyzerError> {
    if ncols == 0 {
        return Err(AnalyzerError::Corrupt("index has zero columns".into()));
    }

    let span = info_span!("analyze_index", table = %table, index = %index, ncols);
    let _enter = span.enter();
    info!("analyze_index started");

    let mut eof = sorter.rewind()?;
    if eof {
        info!("index is empty, no stat1/stat4 rows emitted");
        return Ok(AnalyzeOutput::default());
    }

    let denom = (config.sample_capacity as u64 / config.periodic_divisor) + 1;
    let period = row_count_hint.div_ceil(denom.max(1)) + 1;
    let mut reservoir = Reservoir::new(config.sample_capacity, period, &seed);

    let mut prev: Vec<Option<Vec<u8>>> = vec![None; ncols];
    let mut eq = vec![0u64; ncols];
    let mut lt = vec![0u64; ncols];
    let mut dlt = vec![0u64; ncols];
    let mut rowcount: u64 = 0;
    let mut first_row = true;

    while !eof {
        let key = sorter.current_key()?.to_vec();
        rowcount += 1;

        let boundary = if first_row {
            Some(0)
        } else {
            let mut changed = None;
            for c in 0..ncols {
                let cur = decode_column(codec, &key, ncols, c)?;
                if !columns_equal(prev[c].as_deref(), cur, comparator) {
                    changed = Some(c);
                    break;
                }
            }
            changed
        };

        if let Some(bc) = boundary {
            for c in bc..ncols {
                lt[c] += eq[c];
                dlt[c] += 1;
                eq[c] = 0;
                let cur = decode_column(codec, &key, ncols, c)?;
                prev[c] = cur.map(|v| v.to_vec());
            }
            trace!(rowcount, boundary = bc, "prefix-boundary event");
        }
        for c in 0..ncols {
            eq[c] += 1;
        }

        reservoir.push(key, eq.clone(), lt.clone(), dlt.clone());

        first_row = false;
        eof = sorter.next()?;
    }

    // Every group's `dlt` increment already happened when that group's
    // first row was seen (including the final, still-open group), so no
    // extra "emit one last event" fold is needed for stat1 — see §9's
    // discussion of the reference's delayed-fold bookkeeping, which this
    // immediate-fold formulation replaces without changing the output.
    let avg: Vec<u64> = (0..ncols)
        .map(|c| if dlt[c] == 0 { rowcount } else { rowcount.div_ceil(dlt[c]) })
        .collect();

    debug!(rowcount, ?avg, ?dlt, "stat1 computed");

    let stat1 = Some(Stat1Row {
        table: table.to_string(),
        index: Some(index.to_string()),
        rowcount,
        avg,
        unordered,
    });

    let stat4: Vec<Stat4Row> = reservoir
        .into_samples()
        .into_iter()
        .map(|s| Stat4Row {
            table: table.to_string(),
            index: index.to_string(),
            eq: s.eq,
            lt: s.lt,
            dlt: s.dlt,
            sample: s.key,
        })
        .collect();

    info!(rowcount, samples = stat4.len(), "analyze_index completed");

    Ok(AnalyzeOutput { stat1, stat4 })
}

/// Draws a fresh reservoir seed from the process's own entropy source.
///
/// §6.3 specifies the reservoir's LCG is seeded from "the VFS randomness
/// source (16 to 32 bytes)" — a collaborator this crate has no handle on
/// (the VFS layer is out of scope per §1). A caller that is itself the
/// host engine's VFS can supply its own bytes directly to
/// [`analyze_index`]; one that isn't can call this instead of rolling
/// its own `rand` plumbing.
pub fn generate_seed() -> [u8; 32] {
    let mut seed = [0u8; 32];
    rand::rng().fill_bytes(&mut seed);
    seed
}

/// Builds the optional table-level `stat1` row (§4.2: `(table_name,
/// NULL, "rowcount")`), independent of any particular index.
pub fn table_row_count_stat1(table: &str, rowcount: u64) -> Stat1Row {
    Stat1Row {
        table: table.to_string(),
        index: None,
        rowcount,
        avg: Vec::new(),
        unordered: false,
    }
}
