//! Pure in-memory [`PagedStore`] implementation.
//!
//! Segments are plain sorted vectors; nothing ever touches disk. Spill
//! behavior (`backing_file_exists`) is driven by a synthetic page
//! threshold so sorter spill logic can be exercised deterministically in
//! unit tests without materializing gigabytes of data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, trace};

use crate::comparator::Comparator;

use super::{PagedStore, SegmentId, StoreCursor, StoreError, stable_insert_index};

/// One (key, payload) pair stored in a [`MemoryStore`] segment.
type Entry = (Vec<u8>, Vec<u8>);

struct Segment {
    entries: Vec<Entry>,
    /// Count of currently open read cursors, for `page_ref_count`.
    read_pins: u64,
}

/// An in-memory [`PagedStore`] with synthetic spill accounting.
///
/// `spill_after_pages` is the page-count threshold at which
/// [`PagedStore::backing_file_exists`] flips to `true` (no real file is
/// ever written). `page_size` controls how buffered bytes translate to
/// page counts.
pub struct MemoryStore {
    page_size: usize,
    spill_after_pages: u64,
    next_id: AtomicU64,
    segments: RwLock<HashMap<SegmentId, Mutex<Segment>>>,
    total_bytes: AtomicU64,
    interrupted: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Creates a store with the given page size and synthetic spill
    /// threshold (in pages).
    pub fn new(page_size: usize, spill_after_pages: u64) -> Self {
        Self {
            page_size,
            spill_after_pages,
            next_id: AtomicU64::new(1),
            segments: RwLock::new(HashMap::new()),
            total_bytes: AtomicU64::new(0),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a shared handle a caller can flip to request cancellation
    /// of whatever core operation is currently driving this store (§5's
    /// "process-wide interrupt flag"). The next cursor operation this
    /// store services observes the flag and fails with
    /// [`StoreError::Interrupted`].
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    fn check_interrupted(&self) -> Result<(), StoreError> {
        if self.interrupted.load(AtomicOrdering::SeqCst) {
            Err(StoreError::Interrupted)
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(4096, 2000)
    }
}

impl PagedStore for MemoryStore {
    fn create_blob_segment(&self) -> Result<SegmentId, StoreError> {
        let id = SegmentId(self.next_id.fetch_add(1, AtomicOrdering::SeqCst));
        self.segments.write().map_err(poison)?.insert(
            id,
            Mutex::new(Segment {
                entries: Vec::new(),
                read_pins: 0,
            }),
        );
        trace!(segment = id.0, "segment created");
        Ok(id)
    }

    fn open_cursor<'a>(
        &'a self,
        segment: SegmentId,
        writable: bool,
        comparator: &'a (dyn Comparator + 'a),
    ) -> Result<Box<dyn StoreCursor + 'a>, StoreError> {
        if !self
            .segments
            .read()
            .map_err(poison)?
            .contains_key(&segment)
        {
            return Err(StoreError::UnknownSegment(segment));
        }
        trace!(segment = segment.0, writable, "cursor opened");
        if writable {
            Ok(Box::new(MemoryWriteCursor {
                store: self,
                segment,
                comparator,
            }))
        } else {
            self.segments
                .read()
                .map_err(poison)?
                .get(&segment)
                .expect("checked above")
                .lock()
                .map_err(poison)?
                .read_pins += 1;
            Ok(Box::new(MemoryReadCursor {
                store: self,
                segment,
                pos: None,
            }))
        }
    }

    fn drop_segment(&self, segment: SegmentId) -> Result<(), StoreError> {
        self.segments.write().map_err(poison)?.remove(&segment);
        trace!(segment = segment.0, "segment dropped");
        Ok(())
    }

    fn page_count(&self) -> u64 {
        let bytes = self.total_bytes.load(AtomicOrdering::SeqCst);
        bytes.div_ceil(self.page_size as u64)
    }

    fn page_ref_count(&self) -> u64 {
        let segments = match self.segments.read() {
            Ok(s) => s,
            Err(_) => return 0,
        };
        segments
            .values()
            .map(|seg| {
                let seg = seg.lock().expect("segment mutex poisoned");
                if seg.read_pins == 0 {
                    0
                } else {
                    let bytes: usize = seg.entries.iter().map(|(k, v)| k.len() + v.len()).sum();
                    (bytes as u64).div_ceil(self.page_size as u64) * seg.read_pins
                }
            })
            .sum()
    }

    fn backing_file_exists(&self) -> bool {
        self.page_count() >= self.spill_after_pages
    }
}

fn poison<T>(_: T) -> StoreError {
    StoreError::Internal("lock poisoned".into())
}

struct MemoryWriteCursor<'a> {
    store: &'a MemoryStore,
    segment: SegmentId,
    comparator: &'a dyn Comparator,
}

impl StoreCursor for MemoryWriteCursor<'_> {
    fn first(&mut self) -> Result<bool, StoreError> {
        Err(StoreError::Misuse("first() on a writable cursor"))
    }

    fn next(&mut self) -> Result<bool, StoreError> {
        Err(StoreError::Misuse("next() on a writable cursor"))
    }

    fn valid(&self) -> bool {
        false
    }

    fn key_size(&self) -> Result<usize, StoreError> {
        Err(StoreError::Misuse("key_size() on a writable cursor"))
    }

    fn key_read(&self, _offset: usize, _len: usize, _buf: &mut [u8]) -> Result<(), StoreError> {
        Err(StoreError::Misuse("key_read() on a writable cursor"))
    }

    fn insert(&mut self, key: &[u8], payload: &[u8]) -> Result<(), StoreError> {
        self.store.check_interrupted()?;
        let segments = self.store.segments.read().map_err(poison)?;
        let mut seg = segments
            .get(&self.segment)
            .ok_or(StoreError::UnknownSegment(self.segment))?
            .lock()
            .map_err(poison)?;
        let idx = stable_insert_index(&seg.entries, key, self.comparator, |e| e.0.as_slice());
        seg.entries.insert(idx, (key.to_vec(), payload.to_vec()));
        let was_spilled = self.store.backing_file_exists();
        self.store
            .total_bytes
            .fetch_add((key.len() + payload.len()) as u64, AtomicOrdering::SeqCst);
        if !was_spilled && self.store.backing_file_exists() {
            debug!(page_count = self.store.page_count(), "synthetic spill threshold crossed");
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

struct MemoryReadCursor<'a> {
    store: &'a MemoryStore,
    segment: SegmentId,
    pos: Option<usize>,
}

impl MemoryReadCursor<'_> {
    fn with_entries<R>(&self, f: impl FnOnce(&[Entry]) -> R) -> Result<R, StoreError> {
        let segments = self.store.segments.read().map_err(poison)?;
        let seg = segments
            .get(&self.segment)
            .ok_or(StoreError::UnknownSegment(self.segment))?
            .lock()
            .map_err(poison)?;
        Ok(f(&seg.entries))
    }
}

impl StoreCursor for MemoryReadCursor<'_> {
    fn first(&mut self) -> Result<bool, StoreError> {
        self.store.check_interrupted()?;
        let len = self.with_entries(|e| e.len())?;
        self.pos = if len > 0 { Some(0) } else { None };
        Ok(self.pos.is_some())
    }

    fn next(&mut self) -> Result<bool, StoreError> {
        self.store.check_interrupted()?;
        let len = self.with_entries(|e| e.len())?;
        self.pos = match self.pos {
            Some(p) if p + 1 < len => Some(p + 1),
            _ => None,
        };
        Ok(self.pos.is_some())
    }

    fn valid(&self) -> bool {
        self.pos.is_some()
    }

    fn key_size(&self) -> Result<usize, StoreError> {
        let pos = self.pos.ok_or(StoreError::Misuse("key_size() at EOF"))?;
        self.with_entries(|e| e[pos].0.len())
    }

    fn key_read(&self, offset: usize, len: usize, buf: &mut [u8]) -> Result<(), StoreError> {
        let pos = self.pos.ok_or(StoreError::Misuse("key_read() at EOF"))?;
        self.with_entries(|e| {
            let key = &e[pos].0;
            if offset + len > key.len() {
                return Err(StoreError::ShortRead {
                    expected: offset + len,
                    got: key.len(),
                });
            }
            buf[..len].copy_from_slice(&key[offset..offset + len]);
            Ok(())
        })?
    }

    fn insert(&mut self, _key: &[u8], _payload: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::Misuse("insert() on a read-only cursor"))
    }

    fn close(self: Box<Self>) -> Result<(), StoreError> {
        if let Ok(segments) = self.store.segments.read()
            && let Some(seg) = segments.get(&self.segment)
            && let Ok(mut seg) = seg.lock()
        {
            seg.read_pins = seg.read_pins.saturating_sub(1);
        }
        Ok(())
    }
}
