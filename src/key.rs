//! Index key encoding: splits an opaque key blob into per-column values
//! plus a trailing rowid, and a [`RecordComparator`] that orders keys
//! column-by-column using that split.
//!
//! Neither the sorter nor the analyzer core requires this module — both
//! only ever see [`Comparator`] and raw byte slices (§6.2). This is the
//! "shared glue" a real caller (the SQL engine's VDBE, out of scope per
//! §1) would supply in its place: something that turns a row's indexed
//! columns into the flat byte string the sorter spills and the analyzer
//! walks. It exists here so the crate is runnable end to end in tests
//! and benchmarks without a real SQL engine attached.

use std::cmp::Ordering;

use crate::comparator::Comparator;

/// Splits an opaque index-key blob into its constituent column values
/// (any of which may be SQL `NULL`) and a trailing rowid.
///
/// Implementations need not be injective over malformed input; `column`
/// and `rowid` return `None` when `key` is too short to contain the
/// requested field, which callers treat as a corrupt/misuse condition
/// rather than panicking.
pub trait IndexKeyCodec: Send + Sync {
    /// The value of column `col` (`0`-indexed) within `key`, encoded for
    /// an index of `ncols` columns. Outer `None` means `key` does not
    /// have that many columns (malformed); inner `None` means the
    /// column's value is SQL `NULL`.
    fn column(&self, key: &[u8], ncols: usize, col: usize) -> Option<Option<&[u8]>>;

    /// The rowid trailer appended after the last indexed column.
    fn rowid(&self, key: &[u8]) -> Option<u64>;
}

/// Reference [`IndexKeyCodec`]: each column is `[tag:u8][len:u32 LE][bytes]`
/// (`tag == 0` encodes NULL, with no length/bytes following), and the key
/// ends with an 8-byte big-endian rowid. This is the encoding
/// [`Sorter`](crate::sorter::Sorter) callers in this crate's own tests
/// and benchmarks use to build keys; a real VDBE would use its own
/// record format instead (see §9's "owned vs borrowed" discussion for
/// why the core never needs to know which one).
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthPrefixedCodec;

const NULL_TAG: u8 = 0;
const VALUE_TAG: u8 = 1;
const ROWID_LEN: usize = 8;

impl LengthPrefixedCodec {
    /// Encodes `columns` (`None` entries become SQL NULL) followed by
    /// `rowid` into one opaque key blob.
    pub fn encode_key(columns: &[Option<&[u8]>], rowid: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(columns.iter().map(|c| c.map_or(1, |v| 5 + v.len())).sum::<usize>() + ROWID_LEN);
        for col in columns {
            match col {
                None => out.push(NULL_TAG),
                Some(v) => {
                    out.push(VALUE_TAG);
                    out.extend_from_slice(&(v.len() as u32).to_le_bytes());
                    out.extend_from_slice(v);
                }
            }
        }
        out.extend_from_slice(&rowid.to_be_bytes());
        out
    }

    /// Walks `key` from the front, returning the byte offset just past
    /// column `col`'s encoded field (i.e. the start of column `col+1`).
    fn field_end(key: &[u8], col: usize) -> Option<usize> {
        let mut off = 0usize;
        for _ in 0..=col {
            let tag = *key.get(off)?;
            off += 1;
            match tag {
                NULL_TAG => {}
                VALUE_TAG => {
                    let len_bytes: [u8; 4] = key.get(off..off + 4)?.try_into().ok()?;
                    let len = u32::from_le_bytes(len_bytes) as usize;
                    off += 4 + len;
                }
                _ => return None,
            }
        }
        Some(off)
    }
}

impl IndexKeyCodec for LengthPrefixedCodec {
    fn column(&self, key: &[u8], ncols: usize, col: usize) -> Option<Option<&[u8]>> {
        if col >= ncols {
            return None;
        }
        let start = if col == 0 { 0 } else { Self::field_end(key, col - 1)? };
        let tag = *key.get(start)?;
        match tag {
            NULL_TAG => Some(None),
            VALUE_TAG => {
                let len_bytes: [u8; 4] = key.get(start + 1..start + 5)?.try_into().ok()?;
                let len = u32::from_le_bytes(len_bytes) as usize;
                Some(Some(key.get(start + 5..start + 5 + len)?))
            }
            _ => None,
        }
    }

    fn rowid(&self, key: &[u8]) -> Option<u64> {
        if key.len() < ROWID_LEN {
            return None;
        }
        let bytes: [u8; 8] = key[key.len() - ROWID_LEN..].try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }
}

/// A [`Comparator`] that orders two [`LengthPrefixedCodec`]-style keys
/// column by column (bytewise per field, `NULL` sorting first), falling
/// back to the trailing rowid as a final tiebreak.
///
/// This is what a caller hands to [`Sorter::open`](crate::sorter::Sorter::open)
/// so the spilled/merged order matches the column order the analyzer's
/// change-detection loop expects.
pub struct RecordComparator<'c> {
    codec: &'c dyn IndexKeyCodec,
    ncols: usize,
    null_eq: bool,
}

impl<'c> RecordComparator<'c> {
    /// `null_eq` is the NULL-equals-NULL flag in effect at this call
    /// site (§6.2); it does not affect ordering here (NULLs always sort
    /// first), only what the analyzer's change-detection considers "the
    /// same value" once it calls [`Comparator::null_eq`].
    pub fn new(codec: &'c dyn IndexKeyCodec, ncols: usize, null_eq: bool) -> Self {
        Self { codec, ncols, null_eq }
    }
}

impl Comparator for RecordComparator<'_> {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        for c in 0..self.ncols {
            let av = self.codec.column(a, self.ncols, c).flatten();
            let bv = self.codec.column(b, self.ncols, c).flatten();
            let ord = match (av, bv) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => x.cmp(y),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        let ar = self.codec.rowid(a).unwrap_or(0);
        let br = self.codec.rowid(b).unwrap_or(0);
        ar.cmp(&br)
    }

    fn null_eq(&self) -> bool {
        self.null_eq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_columns() {
        let key = LengthPrefixedCodec::encode_key(&[Some(b"a".as_slice()), Some(b"bb".as_slice())], 42);
        let codec = LengthPrefixedCodec;
        assert_eq!(codec.column(&key, 2, 0), Some(Some(b"a".as_slice())));
        assert_eq!(codec.column(&key, 2, 1), Some(Some(b"bb".as_slice())));
        assert_eq!(codec.rowid(&key), Some(42));
    }

    #[test]
    fn round_trips_null_columns() {
        let key = LengthPrefixedCodec::encode_key(&[None, Some(b"x".as_slice())], 7);
        let codec = LengthPrefixedCodec;
        assert_eq!(codec.column(&key, 2, 0), Some(None));
        assert_eq!(codec.column(&key, 2, 1), Some(Some(b"x".as_slice())));
        assert_eq!(codec.rowid(&key), Some(7));
    }

    #[test]
    fn column_out_of_range_is_none() {
        let key = LengthPrefixedCodec::encode_key(&[Some(b"a".as_slice())], 1);
        let codec = LengthPrefixedCodec;
        assert_eq!(codec.column(&key, 1, 1), None);
    }

    #[test]
    fn comparator_orders_by_leading_column_first() {
        let codec = LengthPrefixedCodec;
        let cmp = RecordComparator::new(&codec, 2, true);
        let a = LengthPrefixedCodec::encode_key(&[Some(b"1".as_slice()), Some(b"z".as_slice())], 1);
        let b = LengthPrefixedCodec::encode_key(&[Some(b"2".as_slice()), Some(b"a".as_slice())], 2);
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn comparator_sorts_null_first() {
        let codec = LengthPrefixedCodec;
        let cmp = RecordComparator::new(&codec, 1, true);
        let a = LengthPrefixedCodec::encode_key(&[None], 1);
        let b = LengthPrefixedCodec::encode_key(&[Some(b"0".as_slice())], 2);
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn comparator_breaks_ties_by_rowid() {
        let codec = LengthPrefixedCodec;
        let cmp = RecordComparator::new(&codec, 1, true);
        let a = LengthPrefixedCodec::encode_key(&[Some(b"x".as_slice())], 1);
        let b = LengthPrefixedCodec::encode_key(&[Some(b"x".as_slice())], 2);
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
    }
}
