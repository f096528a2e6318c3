use criterion::{criterion_group, criterion_main, Criterion};
use pagestore::{compress_page, decompress_page, PAGESIZE};

/// A page shaped like real metadata: repetitive runs with some noise.
fn build_page() -> Vec<u8> {
    let mut page = Vec::with_capacity(PAGESIZE);
    let mut x: u32 = 0x1234_5678;
    while page.len() < PAGESIZE {
        page.extend_from_slice(b"/usr/share/licenses/package-");
        x = x.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        page.extend_from_slice(&x.to_be_bytes());
    }
    page.truncate(PAGESIZE);
    page
}

fn compress_benchmark(c: &mut Criterion) {
    let page = build_page();
    c.bench_function("pagestore_compress_32k", |b| {
        b.iter(|| compress_page(&page));
    });
}

fn decompress_benchmark(c: &mut Criterion) {
    let page = build_page();
    let packed = compress_page(&page);
    assert!(packed.len() < page.len());
    c.bench_function("pagestore_decompress_32k", |b| {
        let mut out = vec![0u8; PAGESIZE];
        b.iter(|| decompress_page(&packed, &mut out).unwrap());
    });
}

criterion_group!(benches, compress_benchmark, decompress_benchmark);
criterion_main!(benches);
