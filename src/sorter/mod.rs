//! External-merge sorter.
//!
//! A [`Sorter`] accepts keys in arbitrary order via [`Sorter::insert`],
//! spilling to bounded-size runs in the collaborator [`PagedStore`] once
//! the store reports its cache has overflowed, then merges those runs
//! back into a single ascending stream on [`Sorter::rewind`] /
//! [`Sorter::next`]. See the crate-level documentation for the full
//! lifecycle and the module's design notes for the merge-pass strategy.

mod tournament;

#[cfg(test)]
mod tests;

use std::cmp::Ordering;

use thiserror::Error;
use tracing::{debug, info, info_span, trace};

use crate::comparator::Comparator;
use crate::store::{PagedStore, SegmentId, StoreCursor, StoreError};

use tournament::Tournament;

/// Tuning knobs for a [`Sorter`].
#[derive(Debug, Clone)]
pub struct SorterConfig {
    /// Floor on the run size `W` (in pages), no matter how small the
    /// store's observed spill overshoot looks. Prevents degenerate
    /// single-page runs from a noisy early page-count sample.
    pub min_segment: u64,

    /// Fraction of `W` the merge's outstanding page-reference count may
    /// reach before the fan-in stops opening further runs in a pass.
    pub fanin_cap_ratio: f64,
}

impl Default for SorterConfig {
    fn default() -> Self {
        Self {
            min_segment: 10,
            fanin_cap_ratio: 0.9,
        }
    }
}

/// Errors surfaced by [`Sorter`] operations.
#[derive(Debug, Error)]
pub enum SorterError {
    /// Allocation failed while growing a tournament tree or a key buffer.
    #[error("out of memory")]
    OutOfMemory,

    /// The collaborator store reported a failure (including, per its own
    /// variant, an observed interrupt). Once returned, the sorter is
    /// poisoned: only [`Sorter::close`] remains valid.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Called out of the `open` → `insert`* → `rewind` → `next`* lifecycle,
    /// or called again on an already-poisoned sorter.
    #[error("misuse: {0}")]
    Misuse(&'static str),
}

/// A single opened merge input: a read cursor plus its own owned copy of
/// the key at the cursor's current position. Always owning rather than
/// borrowing from the cursor sidesteps lifetime entanglement between the
/// tournament tree and the cursors it orders.
struct IterSlot<'s> {
    cursor: Box<dyn StoreCursor + 's>,
    segment: SegmentId,
    buf: Vec<u8>,
    len: usize,
    eof: bool,
}

enum IterError {
    Store(StoreError),
    OutOfMemory,
}

impl From<StoreError> for IterError {
    fn from(e: StoreError) -> Self {
        IterError::Store(e)
    }
}

impl IterSlot<'_> {
    fn current_key(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    fn load_current(&mut self) -> Result<(), IterError> {
        let size = self.cursor.key_size()?;
        if self.buf.len() < size {
            self.buf
                .try_reserve(size - self.buf.len())
                .map_err(|_| IterError::OutOfMemory)?;
            self.buf.resize(size, 0);
        }
        self.cursor.key_read(0, size, &mut self.buf[..size])?;
        self.len = size;
        Ok(())
    }

    fn position_first(&mut self) -> Result<(), IterError> {
        self.eof = !self.cursor.first()?;
        if !self.eof {
            self.load_current()?;
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<(), IterError> {
        self.eof = !self.cursor.next()?;
        if !self.eof {
            self.load_current()?;
        }
        Ok(())
    }
}

/// Picks the winner between slots `a` and `b`, where any index `>= active`
/// is virtual (always loses), and any real slot at EOF is treated the
/// same as virtual. Ties prefer the lower index, which is what keeps the
/// overall merge stable: `iters` is always ordered so a lower index was
/// sealed no later than a higher one.
fn pick_among(iters: &[IterSlot], active: usize, comparator: &dyn Comparator, a: usize, b: usize) -> usize {
    let a_live = a < active && !iters[a].eof;
    let b_live = b < active && !iters[b].eof;
    match (a_live, b_live) {
        (false, false) => a.min(b),
        (false, true) => b,
        (true, false) => a,
        (true, true) => match comparator.compare(iters[a].current_key(), iters[b].current_key()) {
            Ordering::Greater => b,
            _ => a,
        },
    }
}

struct OpenRun<'s> {
    segment: SegmentId,
    cursor: Box<dyn StoreCursor + 's>,
    count: u64,
}

enum Phase<'s> {
    /// Accepting keys via `insert`. Invariant: `open_run` is always
    /// `Some` while in this phase.
    Ingesting,
    /// Merged output available via `current_key` / `next`.
    Reading {
        iters: Vec<IterSlot<'s>>,
        tree: Tournament,
        at_eof: bool,
    },
}

/// An external-merge sorter over a [`PagedStore`] and a [`Comparator`].
///
/// See the crate documentation for the full `open` → `insert`* →
/// `rewind` → (`current_key` / `next`)* → `close` lifecycle.
pub struct Sorter<'s> {
    store: &'s dyn PagedStore,
    comparator: &'s dyn Comparator,
    config: SorterConfig,
    runs: Vec<SegmentId>,
    open_run: Option<OpenRun<'s>>,
    /// Target run size in pages, in the store's page-count units. `0`
    /// until the store's cache first overflows (no spill has happened
    /// yet, so there is no overshoot to size `W` from).
    w: u64,
    /// Store page count observed when the currently-open run started.
    p_run_start: u64,
    phase: Phase<'s>,
    poisoned: bool,
    closed: bool,
}

impl<'s> Sorter<'s> {
    /// Opens a new sorter against `store`, ordering keys with `comparator`.
    pub fn open(
        store: &'s dyn PagedStore,
        comparator: &'s dyn Comparator,
        config: SorterConfig,
    ) -> Result<Self, SorterError> {
        info!(min_segment = config.min_segment, fanin_cap_ratio = config.fanin_cap_ratio, "sorter opened");
        let mut sorter = Self {
            store,
            comparator,
            config,
            runs: Vec::new(),
            open_run: None,
            w: 0,
            p_run_start: store.page_count(),
            phase: Phase::Ingesting,
            poisoned: false,
            closed: false,
        };
        sorter.open_new_run()?;
        Ok(sorter)
    }

    fn open_new_run(&mut self) -> Result<(), SorterError> {
        let segment = self.store.create_blob_segment().map_err(|e| self.poison_err(e))?;
        let cursor = self
            .store
            .open_cursor(segment, true, self.comparator)
            .map_err(|e| self.poison_err(e))?;
        self.open_run = Some(OpenRun {
            segment,
            cursor,
            count: 0,
        });
        Ok(())
    }

    fn poison_err(&mut self, e: StoreError) -> SorterError {
        self.poisoned = true;
        SorterError::Store(e)
    }

    fn check_usable(&self) -> Result<(), SorterError> {
        if self.poisoned {
            Err(SorterError::Misuse("sorter is poisoned; only close() is valid"))
        } else {
            Ok(())
        }
    }

    /// Appends one key to the unsorted input. Only valid before the
    /// first [`Sorter::rewind`] call.
    pub fn insert(&mut self, key: &[u8]) -> Result<(), SorterError> {
        self.check_usable()?;
        if !matches!(self.phase, Phase::Ingesting) {
            return Err(SorterError::Misuse("insert() called after rewind()"));
        }

        {
            let run = self.open_run.as_mut().expect("Ingesting implies an open run");
            if let Err(e) = run.cursor.insert(key, &[]) {
                return Err(self.poison_err(e));
            }
            run.count += 1;
        }

        let p_now = self.store.page_count();
        trace!(p_now, w = self.w, p_run_start = self.p_run_start, "run-seal check");
        if self.w == 0 {
            if self.store.backing_file_exists() {
                self.w = p_now.saturating_sub(5).max(self.config.min_segment);
                self.p_run_start = p_now;
                debug!(w = self.w, "working-set size established from spill overshoot");
            }
        } else if p_now >= self.p_run_start + self.w {
            self.seal_open_run()?;
            self.open_new_run()?;
            self.p_run_start = self.store.page_count();
        }
        Ok(())
    }

    fn seal_open_run(&mut self) -> Result<(), SorterError> {
        let run = self.open_run.take().expect("seal_open_run called with no open run");
        if let Err(e) = run.cursor.close() {
            return Err(self.poison_err(e));
        }
        if run.count > 0 {
            debug!(segment = run.segment.0, rows = run.count, "run sealed");
            self.runs.push(run.segment);
        } else if let Err(e) = self.store.drop_segment(run.segment) {
            return Err(self.poison_err(e));
        }
        Ok(())
    }

    /// Opens the runs one by one (in run order, i.e. oldest first),
    /// stopping either once every remaining run is open or once the
    /// store's outstanding page-reference count reaches
    /// `fanin_cap_ratio * W`. Always opens at least two runs when at
    /// least two remain, so a pass that isn't the final one always
    /// reduces the run count — a single run's footprint alone clearing
    /// the cap must never stall progress.
    fn open_fanin_iters(&mut self) -> Result<Vec<IterSlot<'s>>, SorterError> {
        let threshold = if self.w > 0 {
            (self.config.fanin_cap_ratio * self.w as f64).ceil() as u64
        } else {
            u64::MAX
        };
        let segs = self.runs.clone();
        let mut iters = Vec::new();
        for seg in segs {
            let cursor = match self.store.open_cursor(seg, false, self.comparator) {
                Ok(c) => c,
                Err(e) => return Err(self.poison_err(e)),
            };
            iters.push(IterSlot {
                cursor,
                segment: seg,
                buf: Vec::new(),
                len: 0,
                eof: false,
            });
            if iters.len() >= 2 && self.store.page_ref_count() >= threshold {
                break;
            }
        }
        Ok(iters)
    }

    fn position_all(&mut self, iters: &mut [IterSlot<'s>]) -> Result<(), SorterError> {
        for it in iters {
            if let Err(e) = it.position_first() {
                return Err(self.iter_err(e));
            }
        }
        Ok(())
    }

    fn iter_err(&mut self, e: IterError) -> SorterError {
        match e {
            IterError::Store(e) => self.poison_err(e),
            IterError::OutOfMemory => {
                self.poisoned = true;
                SorterError::OutOfMemory
            }
        }
    }

    /// Ends the insertion phase and positions the sorter at the first
    /// (smallest) key of the merged output, running as many merge passes
    /// as the fan-in cap requires. Returns `true` if the output is empty.
    pub fn rewind(&mut self) -> Result<bool, SorterError> {
        self.check_usable()?;
        if !matches!(self.phase, Phase::Ingesting) {
            return Err(SorterError::Misuse("rewind() called more than once"));
        }
        let span = info_span!("rewind", runs = self.runs.len() + 1);
        let _enter = span.enter();
        info!("merge started");
        self.seal_open_run()?;

        let mut pass = 0u32;
        loop {
            if self.runs.len() <= 1 {
                break;
            }
            let total_before = self.runs.len();
            pass += 1;

            let mut iters = self.open_fanin_iters()?;
            self.position_all(&mut iters)?;
            let active = iters.len();
            debug!(pass, fanin = active, runs_remaining = total_before, "merge pass started");
            let comparator = self.comparator;
            let tree = Tournament::try_build(active, |a, b| pick_among(&iters, active, comparator, a, b))
                .map_err(|_| {
                    self.poisoned = true;
                    SorterError::OutOfMemory
                })?;

            if active == total_before {
                // Every remaining run fit in one pass: keep this tree and
                // these cursors alive as the live readout state instead of
                // draining them into a redundant final output segment.
                self.runs.drain(..active);
                let at_eof = iters.is_empty() || iters[tree.winner()].eof;
                info!(pass, "merge finished, final pass read in place");
                self.phase = Phase::Reading { iters, tree, at_eof };
                return Ok(at_eof);
            }

            let merged = self.drain_to_new_run(iters, tree)?;
            debug!(pass, output_segment = merged.0, "merge pass finished");
            self.runs.splice(..active, std::iter::once(merged));
        }

        match self.runs.pop() {
            None => {
                let tree = Tournament::try_build(0, |_, _| 0).map_err(|_| {
                    self.poisoned = true;
                    SorterError::OutOfMemory
                })?;
                self.phase = Phase::Reading {
                    iters: Vec::new(),
                    tree,
                    at_eof: true,
                };
                info!("merge finished, sorter empty");
                Ok(true)
            }
            Some(seg) => {
                let cursor = self
                    .store
                    .open_cursor(seg, false, self.comparator)
                    .map_err(|e| self.poison_err(e))?;
                let mut it = IterSlot {
                    cursor,
                    segment: seg,
                    buf: Vec::new(),
                    len: 0,
                    eof: false,
                };
                if let Err(e) = it.position_first() {
                    return Err(self.iter_err(e));
                }
                let at_eof = it.eof;
                let iters = vec![it];
                let comparator = self.comparator;
                let tree = Tournament::try_build(1, |a, b| pick_among(&iters, 1, comparator, a, b)).map_err(|_| {
                    self.poisoned = true;
                    SorterError::OutOfMemory
                })?;
                info!("merge finished, single run remained");
                self.phase = Phase::Reading { iters, tree, at_eof };
                Ok(at_eof)
            }
        }
    }

    /// Fully merges `iters` (already positioned and ordered by `tree`)
    /// into a freshly-allocated segment, closing and dropping every input
    /// segment once consumed.
    fn drain_to_new_run(&mut self, mut iters: Vec<IterSlot<'s>>, mut tree: Tournament) -> Result<SegmentId, SorterError> {
        let out_seg = self.store.create_blob_segment().map_err(|e| self.poison_err(e))?;
        {
            let mut out_cursor = self
                .store
                .open_cursor(out_seg, true, self.comparator)
                .map_err(|e| self.poison_err(e))?;
            let active = iters.len();
            let comparator = self.comparator;
            while !iters.is_empty() {
                let w_idx = tree.winner();
                if iters[w_idx].eof {
                    break;
                }
                let key = iters[w_idx].current_key().to_vec();
                if let Err(e) = out_cursor.insert(&key, &[]) {
                    return Err(self.poison_err(e));
                }
                if let Err(e) = iters[w_idx].advance() {
                    return Err(self.iter_err(e));
                }
                tree.advance(w_idx, |a, b| pick_among(&iters, active, comparator, a, b));
            }
            if let Err(e) = out_cursor.close() {
                return Err(self.poison_err(e));
            }
        }
        for it in iters {
            if let Err(e) = it.cursor.close() {
                return Err(self.poison_err(e));
            }
            if let Err(e) = self.store.drop_segment(it.segment) {
                return Err(self.poison_err(e));
            }
        }
        Ok(out_seg)
    }

    /// Advances past the current key. Returns `true` once there is no
    /// further key (matching `true` meaning "at EOF", consistent with
    /// `rewind`'s return convention).
    pub fn next(&mut self) -> Result<bool, SorterError> {
        self.check_usable()?;
        let comparator = self.comparator;
        let Phase::Reading { iters, tree, at_eof } = &mut self.phase else {
            return Err(SorterError::Misuse("next() called before rewind()"));
        };
        if *at_eof || iters.is_empty() {
            *at_eof = true;
            return Ok(true);
        }
        let active = iters.len();
        let w_idx = tree.winner();
        if let Err(e) = iters[w_idx].advance() {
            self.poisoned = true;
            return Err(match e {
                IterError::Store(e) => SorterError::Store(e),
                IterError::OutOfMemory => SorterError::OutOfMemory,
            });
        }
        tree.advance(w_idx, |a, b| pick_among(iters, active, comparator, a, b));
        *at_eof = iters[tree.winner()].eof;
        Ok(*at_eof)
    }

    /// The key at the current read position. Valid only between
    /// `rewind`/`next` calls that returned `false`.
    pub fn current_key(&self) -> Result<&[u8], SorterError> {
        self.check_usable()?;
        match &self.phase {
            Phase::Reading { iters, tree, at_eof } => {
                if *at_eof {
                    Err(SorterError::Misuse("current_key() called at EOF"))
                } else {
                    Ok(iters[tree.winner()].current_key())
                }
            }
            Phase::Ingesting => Err(SorterError::Misuse("current_key() called before rewind()")),
        }
    }

    /// Releases every segment still owned by this sorter (the open input
    /// run, any unmerged runs, or the live merge's input segments).
    /// Idempotent; also run implicitly on drop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(run) = self.open_run.take() {
            let _ = run.cursor.close();
            let _ = self.store.drop_segment(run.segment);
        }
        if let Phase::Reading { iters, .. } = std::mem::replace(&mut self.phase, Phase::Ingesting) {
            for it in iters {
                let _ = it.cursor.close();
                let _ = self.store.drop_segment(it.segment);
            }
        }
        let leftover = self.runs.len();
        for seg in self.runs.drain(..) {
            let _ = self.store.drop_segment(seg);
        }
        debug!(leftover_runs = leftover, "sorter closed");
    }
}

impl Drop for Sorter<'_> {
    fn drop(&mut self) {
        self.close();
    }
}
