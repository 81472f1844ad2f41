use crate::comparator::BytewiseComparator;
use crate::sorter::{Sorter, SorterConfig, SorterError};
use crate::store::memory::MemoryStore;

#[test]
fn insert_after_rewind_is_misuse() {
    let store = MemoryStore::default();
    let cmp = BytewiseComparator;
    let mut sorter = Sorter::open(&store, &cmp, SorterConfig::default()).unwrap();
    sorter.insert(b"a").unwrap();
    sorter.rewind().unwrap();
    assert!(matches!(sorter.insert(b"b"), Err(SorterError::Misuse(_))));
}

#[test]
fn rewind_twice_is_misuse() {
    let store = MemoryStore::default();
    let cmp = BytewiseComparator;
    let mut sorter = Sorter::open(&store, &cmp, SorterConfig::default()).unwrap();
    sorter.insert(b"a").unwrap();
    sorter.rewind().unwrap();
    assert!(matches!(sorter.rewind(), Err(SorterError::Misuse(_))));
}

#[test]
fn next_before_rewind_is_misuse() {
    let store = MemoryStore::default();
    let cmp = BytewiseComparator;
    let mut sorter = Sorter::open(&store, &cmp, SorterConfig::default()).unwrap();
    sorter.insert(b"a").unwrap();
    assert!(matches!(sorter.next(), Err(SorterError::Misuse(_))));
}

#[test]
fn current_key_before_rewind_is_misuse() {
    let store = MemoryStore::default();
    let cmp = BytewiseComparator;
    let sorter = Sorter::open(&store, &cmp, SorterConfig::default()).unwrap();
    assert!(matches!(sorter.current_key(), Err(SorterError::Misuse(_))));
}

#[test]
fn current_key_at_eof_is_misuse() {
    let store = MemoryStore::default();
    let cmp = BytewiseComparator;
    let mut sorter = Sorter::open(&store, &cmp, SorterConfig::default()).unwrap();
    assert!(sorter.rewind().unwrap());
    assert!(matches!(sorter.current_key(), Err(SorterError::Misuse(_))));
}

#[test]
fn close_is_idempotent() {
    let store = MemoryStore::default();
    let cmp = BytewiseComparator;
    let mut sorter = Sorter::open(&store, &cmp, SorterConfig::default()).unwrap();
    sorter.insert(b"a").unwrap();
    sorter.close();
    sorter.close();
}
