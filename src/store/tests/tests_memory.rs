use crate::comparator::BytewiseComparator;
use crate::store::memory::MemoryStore;
use crate::store::{PagedStore, StoreError};

fn read_all(store: &MemoryStore, segment: crate::store::SegmentId, cmp: &BytewiseComparator) -> Vec<Vec<u8>> {
    let mut cursor = store.open_cursor(segment, false, cmp).unwrap();
    let mut out = Vec::new();
    if cursor.first().unwrap() {
        loop {
            let size = cursor.key_size().unwrap();
            let mut buf = vec![0u8; size];
            cursor.key_read(0, size, &mut buf).unwrap();
            out.push(buf);
            if !cursor.next().unwrap() {
                break;
            }
        }
    }
    cursor.close().unwrap();
    out
}

#[test]
fn insert_maintains_sorted_order() {
    let store = MemoryStore::new(4096, 2000);
    let cmp = BytewiseComparator;
    let seg = store.create_blob_segment().unwrap();

    let mut cursor = store.open_cursor(seg, true, &cmp).unwrap();
    for key in [b"d".as_slice(), b"b", b"a", b"c"] {
        cursor.insert(key, &[]).unwrap();
    }
    cursor.close().unwrap();

    assert_eq!(read_all(&store, seg, &cmp), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
}

#[test]
fn insert_is_stable_on_ties() {
    let store = MemoryStore::new(4096, 2000);
    let cmp = BytewiseComparator;
    let seg = store.create_blob_segment().unwrap();

    let mut cursor = store.open_cursor(seg, true, &cmp).unwrap();
    // Three equal keys inserted in a known order, interleaved with a
    // distinct key, must come back with the duplicates in insertion order.
    cursor.insert(b"a", &[1]).unwrap();
    cursor.insert(b"a", &[2]).unwrap();
    cursor.insert(b"b", &[]).unwrap();
    cursor.insert(b"a", &[3]).unwrap();
    cursor.close().unwrap();

    assert_eq!(
        read_all(&store, seg, &cmp),
        vec![b"a".to_vec(), b"a".to_vec(), b"a".to_vec(), b"b".to_vec()]
    );
}

#[test]
fn write_cursor_rejects_reads() {
    let store = MemoryStore::new(4096, 2000);
    let cmp = BytewiseComparator;
    let seg = store.create_blob_segment().unwrap();
    let mut cursor = store.open_cursor(seg, true, &cmp).unwrap();
    assert!(matches!(cursor.first(), Err(StoreError::Misuse(_))));
}

#[test]
fn read_cursor_rejects_insert() {
    let store = MemoryStore::new(4096, 2000);
    let cmp = BytewiseComparator;
    let seg = store.create_blob_segment().unwrap();
    store.open_cursor(seg, true, &cmp).unwrap().close().unwrap();
    let mut cursor = store.open_cursor(seg, false, &cmp).unwrap();
    assert!(matches!(cursor.insert(b"x", &[]), Err(StoreError::Misuse(_))));
}

#[test]
fn unknown_segment_is_an_error() {
    let store = MemoryStore::new(4096, 2000);
    let cmp = BytewiseComparator;
    let bogus = crate::store::SegmentId(9999);
    assert!(matches!(
        store.open_cursor(bogus, false, &cmp),
        Err(StoreError::UnknownSegment(_))
    ));
}

#[test]
fn backing_file_exists_flips_after_spill_threshold() {
    let store = MemoryStore::new(8, 4); // page_size=8 bytes, spill after 4 pages (32 bytes)
    let cmp = BytewiseComparator;
    let seg = store.create_blob_segment().unwrap();
    let mut cursor = store.open_cursor(seg, true, &cmp).unwrap();

    assert!(!store.backing_file_exists());
    for _ in 0..5 {
        cursor.insert(b"01234567", &[]).unwrap(); // 8 bytes/key, no payload
    }
    assert!(store.backing_file_exists());
}

#[test]
fn page_ref_count_tracks_open_read_cursors() {
    let store = MemoryStore::new(4, 1000);
    let cmp = BytewiseComparator;
    let seg = store.create_blob_segment().unwrap();
    let mut cursor = store.open_cursor(seg, true, &cmp).unwrap();
    cursor.insert(b"abcd", &[]).unwrap();
    cursor.close().unwrap();

    assert_eq!(store.page_ref_count(), 0);
    let read = store.open_cursor(seg, false, &cmp).unwrap();
    assert!(store.page_ref_count() > 0);
    read.close().unwrap();
    assert_eq!(store.page_ref_count(), 0);
}

#[test]
fn drop_segment_removes_it() {
    let store = MemoryStore::new(4096, 2000);
    let cmp = BytewiseComparator;
    let seg = store.create_blob_segment().unwrap();
    store.drop_segment(seg).unwrap();
    assert!(matches!(store.open_cursor(seg, false, &cmp), Err(StoreError::UnknownSegment(_))));
}
