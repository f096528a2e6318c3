use pool::{knownid, Pool};
use repodata::EntityId;

use crate::SolvError;

use super::{to_bytes, try_from_bytes};

fn sample_bytes() -> Vec<u8> {
    let mut pool = Pool::new();
    let mut data = repodata::Repodata::new();
    let s0 = EntityId::Solvable(0);
    data.set_id(s0, knownid::SOLVABLE_NAME, pool.str2id("pkg"));
    data.set_str(s0, knownid::SOLVABLE_SUMMARY, "a package");
    data.set_str(
        s0,
        knownid::SOLVABLE_DESCRIPTION,
        &"vertical payload ".repeat(64),
    );
    to_bytes(&pool, &mut data)
}

#[test]
fn wrong_magic_is_not_this_format() {
    let mut bytes = sample_bytes();
    bytes[0] = b'X';
    assert!(matches!(
        try_from_bytes(&bytes),
        Err(SolvError::NotThisFormat)
    ));
}

#[test]
fn future_versions_are_rejected() {
    let mut bytes = sample_bytes();
    bytes[4..8].copy_from_slice(&9u32.to_be_bytes());
    assert!(matches!(
        try_from_bytes(&bytes),
        Err(SolvError::UnsupportedVersion(9))
    ));
}

#[test]
fn empty_input_errors_cleanly() {
    assert!(try_from_bytes(&[]).is_err());
}

#[test]
fn truncation_never_panics() {
    let bytes = sample_bytes();
    for cut in [4, 8, 20, 36, bytes.len() / 2, bytes.len() - 3] {
        assert!(
            try_from_bytes(&bytes[..cut]).is_err(),
            "cut at {cut} must error"
        );
    }
}

#[test]
fn solvable_count_mismatch_is_corrupt() {
    let mut bytes = sample_bytes();
    // numsolv lives right after magic, version, numid, numrel, numdir
    let numsolv = u32::from_be_bytes(bytes[20..24].try_into().unwrap());
    assert_eq!(numsolv, 1);
    bytes[20..24].copy_from_slice(&2u32.to_be_bytes());
    assert!(matches!(
        try_from_bytes(&bytes),
        Err(SolvError::Corrupt("wrong solvable count"))
    ));
}

#[test]
fn dropped_storage_in_the_key_section_is_rejected() {
    let mut pool = Pool::new();
    let mut data = repodata::Repodata::new();
    data.set_id(
        EntityId::Solvable(0),
        knownid::SOLVABLE_NAME,
        pool.str2id("pkg"),
    );
    let bytes = to_bytes(&pool, &mut data);
    assert!(try_from_bytes(&bytes).is_ok());
    // the file has one real key; patch its storage tag to 0 (dropped)
    let tag_pos = find_storage_tag(&bytes);
    let mut bad = bytes;
    bad[tag_pos] = 0;
    assert!(matches!(
        try_from_bytes(&bad),
        Err(SolvError::Corrupt("dropped key in key section"))
    ));
}

#[test]
fn key_name_id_at_declared_max_is_out_of_range() {
    let mut pool = Pool::new();
    let mut data = repodata::Repodata::new();
    data.set_id(
        EntityId::Solvable(0),
        knownid::SOLVABLE_NAME,
        pool.str2id("pkg"),
    );
    let mut bytes = to_bytes(&pool, &mut data);
    let numid = u32::from_be_bytes(bytes[8..12].try_into().unwrap());
    // the first key record starts right after the string section; its
    // name id is a single-byte varint in this sample
    assert!(numid < 0x80);
    let pfsize = u32::from_be_bytes(bytes[40..44].try_into().unwrap());
    let name_pos = 44 + pfsize as usize;
    assert_eq!(bytes[name_pos] & 0x80, 0);
    bytes[name_pos] = numid as u8;
    assert!(matches!(
        try_from_bytes(&bytes),
        Err(SolvError::Decode(
            codec::DecodeError::IdOutOfRange { .. }
        ))
    ));
}

/// Byte offset of the first key's storage tag, located by re-parsing the
/// fixed-layout sections in front of it.
fn find_storage_tag(bytes: &[u8]) -> usize {
    let pfsize = u32::from_be_bytes(bytes[40..44].try_into().unwrap());
    // header (36), sizeid + pfsize words, prefix data; no rels or dirs
    // in this sample, so the key section follows directly
    let mut p = 44 + pfsize as usize;
    // key record: name id, type name id, size, storage tag
    for _ in 0..3 {
        while bytes[p] & 0x80 != 0 {
            p += 1;
        }
        p += 1;
    }
    p
}
