//! Disk-backed [`PagedStore`] implementation.
//!
//! Each segment is buffered in memory while open for append, then
//! persisted to its own file under `data_dir` on close: a magic+version
//! header, one `[len][bytes][crc32]` frame per entry, and a
//! `[count][crc32]` footer — the same framing discipline this codebase
//! uses for its write-ahead log and on-disk tables. Sealed segments are
//! read back via `memmap2` so repeated scans (merge passes) don't
//! re-read the file from disk.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};

use crc32fast::Hasher as Crc32;
use memmap2::Mmap;
use tracing::{debug, trace, warn};

use crate::comparator::Comparator;

use super::{PagedStore, SegmentId, StoreConfig, StoreCursor, StoreError, stable_insert_index};

const SEG_HDR_MAGIC: [u8; 4] = *b"SRT0";
const SEG_HDR_VERSION: u32 = 1;
const SEG_HDR_SIZE: usize = 4 + 4 + 4; // magic + version + crc32
const SEG_FOOTER_SIZE: usize = 8 + 4; // entry_count (u64) + crc32

pub(crate) type Entry = (Vec<u8>, Vec<u8>);

/// A single entry's location inside a sealed segment's mmap.
#[derive(Clone, Copy)]
struct EntryLoc {
    key_off: usize,
    key_len: usize,
}

pub(crate) struct SealedSegment {
    mmap: Mmap,
    entries: Vec<EntryLoc>,
    byte_size: u64,
}

enum SegState {
    Building(Vec<Entry>),
    Sealed(Arc<SealedSegment>),
}

struct SegmentSlot {
    state: SegState,
    read_pins: u64,
}

/// A disk-backed [`PagedStore`]: segments are files under `data_dir`,
/// read via `memmap2` once sealed.
pub struct FileStore {
    data_dir: PathBuf,
    page_size: usize,
    cache_pages: u64,
    next_id: AtomicU64,
    segments: RwLock<HashMap<SegmentId, Mutex<SegmentSlot>>>,
    total_bytes: AtomicU64,
    spilled: AtomicBool,
}

impl FileStore {
    /// Opens (creating if necessary) a file-backed store rooted at
    /// `config.data_dir`.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self {
            data_dir: config.data_dir,
            page_size: config.page_size,
            cache_pages: config.cache_pages,
            next_id: AtomicU64::new(1),
            segments: RwLock::new(HashMap::new()),
            total_bytes: AtomicU64::new(0),
            spilled: AtomicBool::new(false),
        })
    }

    fn segment_path(&self, id: SegmentId) -> PathBuf {
        self.data_dir.join(format!("seg-{:020}.blob", id.0))
    }

    fn note_bytes_written(&self, n: u64) {
        let total = self.total_bytes.fetch_add(n, AtomicOrdering::SeqCst) + n;
        if total >= self.cache_pages.saturating_mul(self.page_size as u64)
            && !self.spilled.swap(true, AtomicOrdering::SeqCst)
        {
            debug!(total_bytes = total, cache_pages = self.cache_pages, "spill threshold crossed");
        }
    }
}

fn poison<T>(_: T) -> StoreError {
    StoreError::Internal("lock poisoned".into())
}

pub(crate) fn write_segment_file(path: &Path, entries: &[Entry]) -> Result<u64, StoreError> {
    let tmp_path = path.with_extension("blob.tmp");
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)?;

    let mut header = Vec::with_capacity(SEG_HDR_SIZE);
    header.extend_from_slice(&SEG_HDR_MAGIC);
    header.extend_from_slice(&SEG_HDR_VERSION.to_le_bytes());
    let hdr_crc = crc32(&header);
    header.extend_from_slice(&hdr_crc.to_le_bytes());
    file.write_all(&header)?;

    for (key, payload) in entries {
        let mut frame = Vec::with_capacity(8 + key.len() + payload.len());
        frame.extend_from_slice(&(key.len() as u32).to_le_bytes());
        frame.extend_from_slice(key);
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(payload);
        let crc = crc32(&frame);
        file.write_all(&frame)?;
        file.write_all(&crc.to_le_bytes())?;
    }

    let mut footer = Vec::with_capacity(SEG_FOOTER_SIZE);
    footer.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    let footer_crc = crc32(&footer);
    file.write_all(&footer)?;
    file.write_all(&footer_crc.to_le_bytes())?;

    file.flush()?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, path)?;

    let size = fs::metadata(path)?.len();
    debug!(path = %path.display(), entries = entries.len(), bytes = size, "segment sealed to disk");
    Ok(size)
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(bytes);
    hasher.finalize()
}

pub(crate) fn read_segment_file(path: &Path, segment: SegmentId) -> Result<SealedSegment, StoreError> {
    let file = File::open(path)?;
    let byte_size = file.metadata()?.len();
    // SAFETY: the file is exclusively owned by this store once sealed and
    // is never mutated in place (rewrites go through a fresh tmp + rename).
    let mmap = unsafe { Mmap::map(&file)? };

    if mmap.len() < SEG_HDR_SIZE + SEG_FOOTER_SIZE {
        return Err(StoreError::ShortRead {
            expected: SEG_HDR_SIZE + SEG_FOOTER_SIZE,
            got: mmap.len(),
        });
    }

    let hdr = &mmap[..SEG_HDR_SIZE];
    if hdr[..4] != SEG_HDR_MAGIC {
        return Err(StoreError::Internal("bad segment magic".into()));
    }
    let hdr_crc = u32::from_le_bytes(hdr[8..12].try_into().unwrap());
    if crc32(&hdr[..8]) != hdr_crc {
        warn!(segment = segment.0, path = %path.display(), "segment header checksum mismatch");
        return Err(StoreError::ChecksumMismatch(segment));
    }

    let footer_start = mmap.len() - SEG_FOOTER_SIZE;
    let footer = &mmap[footer_start..];
    let entry_count = u64::from_le_bytes(footer[..8].try_into().unwrap());
    let footer_crc = u32::from_le_bytes(footer[8..12].try_into().unwrap());
    if crc32(&footer[..8]) != footer_crc {
        warn!(segment = segment.0, path = %path.display(), "segment footer checksum mismatch");
        return Err(StoreError::ChecksumMismatch(segment));
    }

    let mut entries = Vec::with_capacity(entry_count as usize);
    let mut pos = SEG_HDR_SIZE;
    for _ in 0..entry_count {
        if pos + 4 > footer_start {
            return Err(StoreError::ShortRead {
                expected: pos + 4,
                got: footer_start,
            });
        }
        let key_len = u32::from_le_bytes(mmap[pos..pos + 4].try_into().unwrap()) as usize;
        let key_off = pos + 4;
        pos = key_off + key_len;
        if pos + 4 > footer_start {
            return Err(StoreError::ShortRead {
                expected: pos + 4,
                got: footer_start,
            });
        }
        let payload_len = u32::from_le_bytes(mmap[pos..pos + 4].try_into().unwrap()) as usize;
        let payload_off = pos + 4;
        pos = payload_off + payload_len;
        if pos + 4 > footer_start {
            return Err(StoreError::ShortRead {
                expected: pos + 4,
                got: footer_start,
            });
        }
        let entry_crc = u32::from_le_bytes(mmap[pos..pos + 4].try_into().unwrap());
        let frame_start = key_off - 4;
        if crc32(&mmap[frame_start..pos]) != entry_crc {
            warn!(segment = segment.0, path = %path.display(), entry = entries.len(), "segment entry checksum mismatch");
            return Err(StoreError::ChecksumMismatch(segment));
        }
        pos += 4;
        entries.push(EntryLoc { key_off, key_len });
    }

    Ok(SealedSegment {
        mmap,
        entries,
        byte_size,
    })
}

impl PagedStore for FileStore {
    fn create_blob_segment(&self) -> Result<SegmentId, StoreError> {
        let id = SegmentId(self.next_id.fetch_add(1, AtomicOrdering::SeqCst));
        self.segments.write().map_err(poison)?.insert(
            id,
            Mutex::new(SegmentSlot {
                state: SegState::Building(Vec::new()),
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
        if writable {
            let segments = self.segments.read().map_err(poison)?;
            let slot = segments
                .get(&segment)
                .ok_or(StoreError::UnknownSegment(segment))?;
            if !matches!(slot.lock().map_err(poison)?.state, SegState::Building(_)) {
                return Err(StoreError::Misuse("cannot append to a sealed segment"));
            }
            Ok(Box::new(FileWriteCursor {
                store: self,
                segment,
                comparator,
            }))
        } else {
            let sealed = {
                let segments = self.segments.read().map_err(poison)?;
                let slot = segments
                    .get(&segment)
                    .ok_or(StoreError::UnknownSegment(segment))?;
                let mut guard = slot.lock().map_err(poison)?;
                match &guard.state {
                    SegState::Sealed(sealed) => Arc::clone(sealed),
                    SegState::Building(entries) => {
                        // Reading an in-progress run seals it first —
                        // mirrors closing the append cursor before rewind.
                        debug!(segment = segment.0, "sealing segment on first read");
                        let path = self.segment_path(segment);
                        write_segment_file(&path, entries)?;
                        let sealed = Arc::new(read_segment_file(&path, segment)?);
                        guard.state = SegState::Sealed(Arc::clone(&sealed));
                        sealed
                    }
                }
            };
            {
                let segments = self.segments.read().map_err(poison)?;
                let slot = segments
                    .get(&segment)
                    .ok_or(StoreError::UnknownSegment(segment))?;
                slot.lock().map_err(poison)?.read_pins += 1;
            }
            Ok(Box::new(FileReadCursor {
                store: self,
                segment,
                sealed,
                pos: None,
            }))
        }
    }

    fn drop_segment(&self, segment: SegmentId) -> Result<(), StoreError> {
        if let Some(slot) = self.segments.write().map_err(poison)?.remove(&segment) {
            let path = self.segment_path(segment);
            if matches!(slot.into_inner().map_err(poison)?.state, SegState::Sealed(_)) {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(segment = segment.0, path = %path.display(), %e, "failed to remove segment file");
                } else {
                    trace!(segment = segment.0, "segment file removed");
                }
            }
        }
        Ok(())
    }

    fn page_count(&self) -> u64 {
        self.total_bytes
            .load(AtomicOrdering::SeqCst)
            .div_ceil(self.page_size as u64)
    }

    fn page_ref_count(&self) -> u64 {
        let segments = match self.segments.read() {
            Ok(s) => s,
            Err(_) => return 0,
        };
        segments
            .values()
            .map(|slot| {
                let slot = slot.lock().expect("segment mutex poisoned");
                if slot.read_pins == 0 {
                    return 0;
                }
                let bytes = match &slot.state {
                    SegState::Sealed(sealed) => sealed.byte_size,
                    SegState::Building(entries) => {
                        entries.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum()
                    }
                };
                bytes.div_ceil(self.page_size as u64) * slot.read_pins
            })
            .sum()
    }

    fn backing_file_exists(&self) -> bool {
        self.spilled.load(AtomicOrdering::SeqCst)
    }
}

struct FileWriteCursor<'a> {
    store: &'a FileStore,
    segment: SegmentId,
    comparator: &'a dyn Comparator,
}

impl StoreCursor for FileWriteCursor<'_> {
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
        let segments = self.store.segments.read().map_err(poison)?;
        let mut slot = segments
            .get(&self.segment)
            .ok_or(StoreError::UnknownSegment(self.segment))?
            .lock()
            .map_err(poison)?;
        match &mut slot.state {
            SegState::Building(entries) => {
                let idx =
                    stable_insert_index(entries, key, self.comparator, |e: &Entry| e.0.as_slice());
                entries.insert(idx, (key.to_vec(), payload.to_vec()));
            }
            SegState::Sealed(_) => return Err(StoreError::Misuse("segment already sealed")),
        }
        self.store
            .note_bytes_written((key.len() + payload.len()) as u64);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), StoreError> {
        // Sealing happens lazily, the first time a read cursor is opened
        // (or eagerly here if the caller never reads this segment back).
        let segments = self.store.segments.read().map_err(poison)?;
        let mut slot = segments
            .get(&self.segment)
            .ok_or(StoreError::UnknownSegment(self.segment))?
            .lock()
            .map_err(poison)?;
        if let SegState::Building(entries) = &slot.state {
            let path = self.store.segment_path(self.segment);
            write_segment_file(&path, entries)?;
            let sealed = read_segment_file(&path, self.segment)?;
            slot.state = SegState::Sealed(Arc::new(sealed));
        }
        Ok(())
    }
}

struct FileReadCursor<'a> {
    store: &'a FileStore,
    segment: SegmentId,
    sealed: Arc<SealedSegment>,
    pos: Option<usize>,
}

impl StoreCursor for FileReadCursor<'_> {
    fn first(&mut self) -> Result<bool, StoreError> {
        self.pos = if self.sealed.entries.is_empty() {
            None
        } else {
            Some(0)
        };
        Ok(self.pos.is_some())
    }

    fn next(&mut self) -> Result<bool, StoreError> {
        self.pos = match self.pos {
            Some(p) if p + 1 < self.sealed.entries.len() => Some(p + 1),
            _ => None,
        };
        Ok(self.pos.is_some())
    }

    fn valid(&self) -> bool {
        self.pos.is_some()
    }

    fn key_size(&self) -> Result<usize, StoreError> {
        let pos = self.pos.ok_or(StoreError::Misuse("key_size() at EOF"))?;
        Ok(self.sealed.entries[pos].key_len)
    }

    fn key_read(&self, offset: usize, len: usize, buf: &mut [u8]) -> Result<(), StoreError> {
        let pos = self.pos.ok_or(StoreError::Misuse("key_read() at EOF"))?;
        let loc = self.sealed.entries[pos];
        if offset + len > loc.key_len {
            return Err(StoreError::ShortRead {
                expected: offset + len,
                got: loc.key_len,
            });
        }
        let start = loc.key_off + offset;
        buf[..len].copy_from_slice(&self.sealed.mmap[start..start + len]);
        Ok(())
    }

    fn insert(&mut self, _key: &[u8], _payload: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::Misuse("insert() on a read-only cursor"))
    }

    fn close(self: Box<Self>) -> Result<(), StoreError> {
        if let Ok(segments) = self.store.segments.read()
            && let Some(slot) = segments.get(&self.segment)
            && let Ok(mut slot) = slot.lock()
        {
            slot.read_pins = slot.read_pins.saturating_sub(1);
        }
        Ok(())
    }
}
