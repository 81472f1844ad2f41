//! Paged store collaborator interface.
//!
//! The sorter and analyzer never manage pages, files, or transactions
//! themselves — they drive a narrow [`PagedStore`] interface that, in a
//! full deployment, is implemented by the pager/B-tree layer of the
//! surrounding database engine. This module specifies that interface
//! (§6.1 of the design) and ships two reference implementations
//! ([`memory::MemoryStore`], [`file::FileStore`]) so the sorter and
//! analyzer have something real to run against in tests and benchmarks.
//!
//! # On-disk framing (`file::FileStore`)
//!
//! ```text
//! [SEG_HDR_MAGIC][SEG_HDR_VERSION][HDR_CRC32_LE]
//! [ENTRY_LEN_LE][ENTRY_BYTES][ENTRY_CRC32_LE]
//! [ENTRY_LEN_LE][ENTRY_BYTES][ENTRY_CRC32_LE]
//! ...
//! [FOOTER_COUNT_LE][FOOTER_CRC32_LE]
//! ```
//!
//! Each entry is `[KEY_LEN_LE][KEY_BYTES][PAYLOAD_LEN_LE][PAYLOAD_BYTES]`.
//! Segment files are written to a `.tmp` path and renamed into place on
//! success, matching the atomicity discipline used elsewhere in this
//! codebase's on-disk formats.

pub mod file;
pub mod memory;

#[cfg(test)]
mod tests;

use std::io;

use thiserror::Error;

use crate::comparator::Comparator;

/// Opaque handle identifying a segment (run) inside a [`PagedStore`].
///
/// Corresponds to an integer page id in the collaborator pager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub u64);

/// Errors surfaced by a [`PagedStore`] or its cursors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read returned fewer bytes than the on-disk length prefix promised.
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead {
        /// Bytes the length prefix promised.
        expected: usize,
        /// Bytes actually available.
        got: usize,
    },

    /// A block or footer CRC32 did not match its payload.
    #[error("checksum mismatch in segment {0:?}")]
    ChecksumMismatch(SegmentId),

    /// Reference to a segment that does not exist (or was already dropped).
    #[error("unknown segment {0:?}")]
    UnknownSegment(SegmentId),

    /// Allocation failure while growing an in-memory buffer.
    #[error("out of memory")]
    OutOfMemory,

    /// The caller's interrupt flag was observed between operations.
    #[error("interrupted")]
    Interrupted,

    /// Operation attempted in the wrong cursor state (e.g. insert on a
    /// read-only cursor, or read before `first()`).
    #[error("misuse: {0}")]
    Misuse(&'static str),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Configuration for a reference [`PagedStore`] implementation.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Nominal page size in bytes, used to translate buffered byte counts
    /// into the page-count figures the sorter consults.
    pub page_size: usize,

    /// Number of pages the store's cache may hold before it reports
    /// [`PagedStore::backing_file_exists`] as `true`. Mirrors a pager's
    /// `cache_size` setting.
    pub cache_pages: u64,

    /// Directory backing on-disk segments. Ignored by [`memory::MemoryStore`].
    pub data_dir: std::path::PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            cache_pages: 2000,
            data_dir: std::path::PathBuf::from("."),
        }
    }
}

/// A positioned cursor over one segment's keys, in ascending order.
///
/// Mirrors the narrow collaborator contract of §6.1: `first`/`next`
/// reposition, `key_size`/`key_read` expose the current key without
/// requiring the caller to know the store's internal page layout, and
/// `insert` is only valid on a cursor opened `writable`.
pub trait StoreCursor {
    /// Positions at the first row. Returns `true` if a row exists.
    fn first(&mut self) -> Result<bool, StoreError>;

    /// Advances to the next row. Returns `true` if a row exists.
    fn next(&mut self) -> Result<bool, StoreError>;

    /// Whether the cursor is currently positioned on a valid row.
    fn valid(&self) -> bool;

    /// Size in bytes of the key at the current row.
    fn key_size(&self) -> Result<usize, StoreError>;

    /// Copies `len` bytes of the current key starting at `offset` into `buf`.
    fn key_read(&self, offset: usize, len: usize, buf: &mut [u8]) -> Result<(), StoreError>;

    /// Appends `key` (with an opaque `payload`) to the segment. Only valid
    /// on a cursor opened with `writable = true`; the store maintains the
    /// segment in ascending order, with ties broken by insertion order
    /// (stable), exactly as an ordered B-tree segment would.
    fn insert(&mut self, key: &[u8], payload: &[u8]) -> Result<(), StoreError>;

    /// Closes the cursor. For a writable cursor, this finalizes the
    /// segment (persisting it where the implementation is disk-backed).
    fn close(self: Box<Self>) -> Result<(), StoreError>;
}

/// The narrow paged-store interface the sorter and analyzer depend on.
///
/// See the module documentation for the on-disk framing used by
/// [`file::FileStore`], the disk-backed reference implementation.
pub trait PagedStore: Send + Sync {
    /// Allocates a new, empty, ordered segment with no associated value
    /// payload — a "blob segment" in the terminology of §6.1.
    fn create_blob_segment(&self) -> Result<SegmentId, StoreError>;

    /// Opens a cursor over `segment`. `comparator` determines the sort
    /// order a writable cursor maintains on insert.
    fn open_cursor<'a>(
        &'a self,
        segment: SegmentId,
        writable: bool,
        comparator: &'a (dyn Comparator + 'a),
    ) -> Result<Box<dyn StoreCursor + 'a>, StoreError>;

    /// Drops a segment. In a real pager this is usually a no-op: segments
    /// are freed implicitly when the enclosing transaction ends.
    fn drop_segment(&self, segment: SegmentId) -> Result<(), StoreError>;

    /// Current total page count observed by the store.
    fn page_count(&self) -> u64;

    /// Current count of pages pinned by outstanding cursors.
    fn page_ref_count(&self) -> u64;

    /// Whether the store's cache has overflowed to a backing file on disk.
    fn backing_file_exists(&self) -> bool;
}

/// Finds the insertion index for `key` within `entries` (sorted by
/// `comparator` over `key_of`) that preserves stability: equal keys are
/// inserted after all existing equal keys, so insertion order is
/// preserved among ties.
pub(crate) fn stable_insert_index<T>(
    entries: &[T],
    key: &[u8],
    comparator: &dyn Comparator,
    key_of: impl Fn(&T) -> &[u8],
) -> usize {
    // Upper-bound binary search: first index where `key_of(entries[i]) > key`.
    let mut lo = 0usize;
    let mut hi = entries.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if comparator.compare(key_of(&entries[mid]), key) == std::cmp::Ordering::Greater {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}
