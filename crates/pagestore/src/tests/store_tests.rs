use crate::{compress_page, Pagestore, PAGESIZE};
use std::fs::File;
use std::io::Write;
use tempfile::tempdir;

/// Writes `data` into `file` as compressed-or-raw pages and returns the
/// configured store plus the page payload layout for reference.
fn build_store(path: &std::path::Path, data: &[u8]) -> Pagestore {
    let mut file = File::create(path).expect("create backing file");
    let mut store = Pagestore::new();
    let mut offset = 0u64;
    for chunk in data.chunks(PAGESIZE) {
        let packed = compress_page(chunk);
        let (bytes, compressed) = if packed.len() < chunk.len() {
            (packed.as_slice(), true)
        } else {
            (chunk, false)
        };
        file.write_all(bytes).expect("write page");
        store.add_page(offset, bytes.len() as u32, compressed);
        offset += bytes.len() as u64;
    }
    file.flush().expect("flush");
    store.set_backing(File::open(path).expect("reopen"), data.len() as u64);
    store
}

fn sample_blob(pages: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(pages * PAGESIZE);
    for p in 0..pages {
        for i in 0..PAGESIZE {
            data.push((p * 7 + i * 3) as u8);
        }
    }
    data
}

#[test]
fn single_page_loads_and_matches() {
    let dir = tempdir().unwrap();
    let data = sample_blob(3);
    let mut store = build_store(&dir.path().join("pages.bin"), &data);
    assert_eq!(store.npages(), 3);
    let page1 = store.load_page_range(1, 1).unwrap();
    assert_eq!(page1, &data[PAGESIZE..2 * PAGESIZE]);
}

#[test]
fn range_is_contiguous_and_correct() {
    let dir = tempdir().unwrap();
    let data = sample_blob(4);
    let mut store = build_store(&dir.path().join("pages.bin"), &data);
    let span = store.load_page_range(1, 3).unwrap();
    assert_eq!(span.len(), 3 * PAGESIZE, "span must cover the whole range");
    assert_eq!(span, &data[PAGESIZE..4 * PAGESIZE]);
}

#[test]
fn reload_after_eviction_still_matches() {
    let dir = tempdir().unwrap();
    let data = sample_blob(6);
    let mut store = build_store(&dir.path().join("pages.bin"), &data);
    // bounce between disjoint ranges so slots get evicted and refilled
    for _ in 0..4 {
        let a = store.load_page_range(0, 1).unwrap().to_vec();
        assert_eq!(a, &data[..2 * PAGESIZE]);
        let b = store.load_page_range(4, 5).unwrap().to_vec();
        assert_eq!(b, &data[4 * PAGESIZE..6 * PAGESIZE]);
    }
    // a widening load must relocate rather than corrupt
    let wide = store.load_page_range(0, 5).unwrap();
    assert_eq!(wide, &data[..]);
}

#[test]
fn repeated_load_is_stable() {
    let dir = tempdir().unwrap();
    let data = sample_blob(2);
    let mut store = build_store(&dir.path().join("pages.bin"), &data);
    let first = store.load_page_range(0, 1).unwrap().to_vec();
    let second = store.load_page_range(0, 1).unwrap().to_vec();
    assert_eq!(first, second, "already-resident range must be returned as-is");
}

#[test]
fn short_last_page() {
    let dir = tempdir().unwrap();
    let mut data = sample_blob(1);
    data.extend_from_slice(b"tail beyond the first page");
    let mut store = build_store(&dir.path().join("pages.bin"), &data);
    assert_eq!(store.blob_len(), data.len() as u64);
    let span = store.load_page_range(0, 1).unwrap();
    // the slice is page-granular, content beyond blob_len is zero padding
    assert_eq!(&span[..data.len()], &data[..]);
    assert!(span[data.len()..].iter().all(|&b| b == 0));
}

#[test]
fn out_of_range_page_is_rejected() {
    let dir = tempdir().unwrap();
    let data = sample_blob(2);
    let mut store = build_store(&dir.path().join("pages.bin"), &data);
    assert!(store.load_page_range(0, 2).is_err());
}

#[test]
fn corrupt_page_fails_only_on_access() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pages.bin");
    let data = sample_blob(2);
    let mut store = {
        // write page 0 normally, then garbage claiming to be page 1
        let mut file = File::create(&path).unwrap();
        let mut store = Pagestore::new();
        let packed = compress_page(&data[..PAGESIZE]);
        file.write_all(&packed).unwrap();
        store.add_page(0, packed.len() as u32, true);
        let garbage = [0xffu8; 40];
        file.write_all(&garbage).unwrap();
        store.add_page(packed.len() as u64, garbage.len() as u32, true);
        store.set_backing(File::open(&path).unwrap(), data.len() as u64);
        store
    };
    // the good page is unaffected
    assert_eq!(store.load_page_range(0, 0).unwrap(), &data[..PAGESIZE]);
    // the bad page errors when, and only when, it is paged in
    assert!(store.load_page_range(1, 1).is_err());
    assert_eq!(store.load_page_range(0, 0).unwrap(), &data[..PAGESIZE]);
}
