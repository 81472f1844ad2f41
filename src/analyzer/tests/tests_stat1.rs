use crate::analyzer::{AnalyzerConfig, analyze_index};
use crate::key::{LengthPrefixedCodec, RecordComparator};
use crate::sorter::{Sorter, SorterConfig};
use crate::store::memory::MemoryStore;

/// Cartesian grid of two columns with varying field lengths (so a plain
/// bytewise whole-key comparator would *not* reproduce column-major
/// order) and varying per-combination multiplicities, to exercise
/// [`RecordComparator`] end to end.
const COL0: &[&[u8]] = &[b"a", b"bb", b"ccc"];
const COL1: &[&[u8]] = &[b"x", b"yy"];

#[test]
fn stat1_avg_matches_brute_force_distinct_prefix_counts() {
    let store = MemoryStore::default();
    let codec = LengthPrefixedCodec;
    let cmp = RecordComparator::new(&codec, 2, true);
    let mut sorter = Sorter::open(&store, &cmp, SorterConfig::default()).unwrap();

    let mut rowid = 0u64;
    let mut rows: Vec<(&[u8], &[u8])> = Vec::new();
    for (i, &c0) in COL0.iter().enumerate() {
        for (j, &c1) in COL1.iter().enumerate() {
            let mult = i + j + 1;
            for _ in 0..mult {
                let key = LengthPrefixedCodec::encode_key(&[Some(c0), Some(c1)], rowid);
                sorter.insert(&key).unwrap();
                rows.push((c0, c1));
                rowid += 1;
            }
        }
    }
    let rowcount = rows.len() as u64;

    let out = analyze_index(&mut sorter, &codec, &cmp, "t", "idx", 2, false, rowcount, [7u8; 32], &AnalyzerConfig::default()).unwrap();
    let stat1 = out.stat1.expect("non-empty index");
    assert_eq!(stat1.rowcount, rowcount);

    let dlt0 = COL0.len() as u64;
    let dlt1 = (COL0.len() * COL1.len()) as u64;
    assert_eq!(stat1.avg, vec![rowcount.div_ceil(dlt0), rowcount.div_ceil(dlt1)]);

    for c in 0..2 {
        let avg = stat1.avg[c];
        let dlt = [dlt0, dlt1][c];
        assert!(avg * dlt >= rowcount);
        assert!((avg - 1) * dlt < rowcount);
    }
}

#[test]
fn null_columns_use_null_eq_flag_for_grouping() {
    let store = MemoryStore::default();
    let codec = LengthPrefixedCodec;
    let cmp = RecordComparator::new(&codec, 1, true);
    let mut sorter = Sorter::open(&store, &cmp, SorterConfig::default()).unwrap();
    for rowid in 0..5u64 {
        let key = LengthPrefixedCodec::encode_key(&[None], rowid);
        sorter.insert(&key).unwrap();
    }
    let out = analyze_index(&mut sorter, &codec, &cmp, "t", "idx", 1, false, 5, [0u8; 32], &AnalyzerConfig::default()).unwrap();
    // null_eq() == true: all five NULLs count as one group.
    assert_eq!(out.stat1.unwrap().avg, vec![5]);
}

#[test]
fn non_null_eq_treats_every_null_as_distinct() {
    let store = MemoryStore::default();
    let codec = LengthPrefixedCodec;
    let cmp = RecordComparator::new(&codec, 1, false);
    let mut sorter = Sorter::open(&store, &cmp, SorterConfig::default()).unwrap();
    for rowid in 0..5u64 {
        let key = LengthPrefixedCodec::encode_key(&[None], rowid);
        sorter.insert(&key).unwrap();
    }
    let out = analyze_index(&mut sorter, &codec, &cmp, "t", "idx", 1, false, 5, [0u8; 32], &AnalyzerConfig::default()).unwrap();
    // null_eq() == false: every NULL starts a fresh group (5 groups of 1).
    assert_eq!(out.stat1.unwrap().avg, vec![1]);
}
