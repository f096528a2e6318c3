use crate::{compress_page, decompress_page, PageError, PAGESIZE};

fn roundtrip(data: &[u8]) -> Vec<u8> {
    let packed = compress_page(data);
    let mut out = vec![0u8; data.len()];
    let n = decompress_page(&packed, &mut out).expect("decompression must succeed");
    assert_eq!(n, data.len(), "decoded length mismatch");
    assert_eq!(&out[..n], data, "decoded bytes differ from input");
    packed
}

/// Deterministic pseudo-random bytes, xorshift-based.
fn noise(len: usize, mut seed: u32) -> Vec<u8> {
    let mut v = Vec::with_capacity(len);
    for _ in 0..len {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        v.push(seed as u8);
    }
    v
}

#[test]
fn empty_page() {
    assert!(roundtrip(&[]).is_empty());
}

#[test]
fn ascii_text_compresses_and_roundtrips() {
    let text = "the quick brown fox jumps over the lazy dog. "
        .repeat(600)
        .into_bytes();
    let text = &text[..text.len().min(PAGESIZE)];
    let packed = roundtrip(text);
    assert!(
        packed.len() < text.len() / 4,
        "repetitive text should shrink a lot, got {} of {}",
        packed.len(),
        text.len()
    );
}

#[test]
fn all_zero_page_compresses_hard() {
    let zeros = vec![0u8; PAGESIZE];
    let packed = roundtrip(&zeros);
    assert!(
        packed.len() < 128,
        "a zero page must collapse to a few copy ops, got {}",
        packed.len()
    );
}

#[test]
fn all_distinct_bytes_expand_only_slightly() {
    let data: Vec<u8> = (0u8..=255).collect();
    let packed = roundtrip(&data);
    // literal runs add at most one byte per 32 high bytes
    assert!(
        packed.len() <= data.len() + data.len() / 32 + 2,
        "expansion bound violated: {} for {}",
        packed.len(),
        data.len()
    );
}

#[test]
fn incompressible_noise_stays_bounded() {
    let data = noise(PAGESIZE, 0x3779_41c3);
    let packed = roundtrip(&data);
    // every low byte costs 1, every high byte at most 2 (run-of-1)
    assert!(
        packed.len() <= data.len() * 3 / 2 + 16,
        "expansion bound violated: {} for {}",
        packed.len(),
        data.len()
    );
}

#[test]
fn short_inputs_roundtrip() {
    roundtrip(b"a");
    roundtrip(b"ab");
    roundtrip(b"aaa");
    roundtrip(&[0xfe, 0xff]);
    roundtrip(b"abcabcabcabc");
}

#[test]
fn long_range_copies_roundtrip() {
    // repeat a distinctive 300-byte block far apart so the long-distance
    // tiers get exercised
    let block = noise(300, 42);
    let mut data = Vec::new();
    data.extend_from_slice(&block);
    data.extend_from_slice(&noise(70_000 % PAGESIZE, 7));
    data.extend_from_slice(&block);
    let data = &data[..data.len().min(PAGESIZE)];
    roundtrip(data);
}

#[test]
fn overlapping_copy_rle() {
    let mut data = vec![b'x'];
    data.extend(std::iter::repeat(b'x').take(5000));
    data.push(b'y');
    roundtrip(&data);
}

#[test]
fn truncated_stream_is_corrupt() {
    let data = b"hello hello hello hello hello hello".repeat(40);
    let mut packed = compress_page(&data);
    packed.truncate(packed.len() / 2);
    let mut out = vec![0u8; data.len()];
    // either a truncated op or a short output, never a panic or success
    // with wrong length
    match decompress_page(&packed, &mut out) {
        Ok(n) => assert!(n < data.len()),
        Err(PageError::Corrupt(_)) => {}
        Err(e) => panic!("unexpected error kind: {e}"),
    }
}

#[test]
fn bogus_backref_is_corrupt() {
    // copy op with distance 200 at output position 0
    let packed = [0xe0u8, 0x00, 0xc7];
    let mut out = vec![0u8; 64];
    assert!(matches!(
        decompress_page(&packed, &mut out),
        Err(PageError::Corrupt(_))
    ));
}

#[test]
fn output_overrun_is_corrupt() {
    let data = vec![7u8; 100];
    let packed = compress_page(&data);
    let mut out = vec![0u8; 10];
    assert!(matches!(
        decompress_page(&packed, &mut out),
        Err(PageError::Corrupt(_))
    ));
}
