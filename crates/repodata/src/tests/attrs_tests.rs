use codec::KeyType;
use pool::{knownid, Pool};

use crate::{DataError, EntityId, Repodata};

#[test]
fn staged_values_become_visible_after_internalize() {
    let mut pool = Pool::new();
    let mut data = Repodata::new();
    let s0 = EntityId::Solvable(0);
    let s1 = EntityId::Solvable(1);

    data.set_id(s0, knownid::SOLVABLE_NAME, pool.str2id("foo"));
    data.set_str(s0, knownid::SOLVABLE_SUMMARY, "first package");
    data.set_num(s0, knownid::SOLVABLE_INSTALLSIZE, 12345);
    data.set_id(s1, knownid::SOLVABLE_NAME, pool.str2id("bar"));
    data.set_str(EntityId::Meta, knownid::SOLVABLE_VENDOR, "acme");

    assert_eq!(
        data.lookup_id(s0, knownid::SOLVABLE_NAME),
        None,
        "staged values must stay invisible until internalized"
    );

    data.internalize().unwrap();

    assert_eq!(data.nsolvables(), 2);
    assert_eq!(data.lookup_id(s0, knownid::SOLVABLE_NAME), pool.find_str("foo"));
    assert_eq!(
        data.lookup_str(&pool, s0, knownid::SOLVABLE_SUMMARY).as_deref(),
        Some("first package")
    );
    assert_eq!(data.lookup_num(s0, knownid::SOLVABLE_INSTALLSIZE), Some(12345));
    assert_eq!(data.lookup_id(s1, knownid::SOLVABLE_NAME), pool.find_str("bar"));
    assert_eq!(
        data.lookup_str(&pool, EntityId::Meta, knownid::SOLVABLE_VENDOR)
            .as_deref(),
        Some("acme")
    );
}

#[test]
fn internalize_without_staged_data_is_a_noop() {
    let mut data = Repodata::new();
    data.internalize().unwrap();
    assert_eq!(data.nsolvables(), 0);
    assert!(data.incore_data().is_empty());
}

#[test]
fn overwrite_keeps_key_position_and_updates_value() {
    let mut pool = Pool::new();
    let mut data = Repodata::new();
    let s0 = EntityId::Solvable(0);

    data.set_str(s0, knownid::SOLVABLE_SUMMARY, "one");
    data.set_num(s0, knownid::SOLVABLE_INSTALLSIZE, 10);
    data.set_str(s0, knownid::SOLVABLE_DESCRIPTION, "two");
    data.internalize().unwrap();

    data.set_num(s0, knownid::SOLVABLE_INSTALLSIZE, 20);
    data.internalize().unwrap();

    let mut names = Vec::new();
    data.search(&pool, s0, 0, 0, None, |key, _| {
        names.push(key.name);
        crate::SearchAction::Continue
    })
    .unwrap();
    assert_eq!(
        names,
        vec![
            knownid::SOLVABLE_SUMMARY,
            knownid::SOLVABLE_INSTALLSIZE,
            knownid::SOLVABLE_DESCRIPTION
        ],
        "an overwritten key must keep its place in the schema"
    );
    assert_eq!(data.lookup_num(s0, knownid::SOLVABLE_INSTALLSIZE), Some(20));
    assert_eq!(
        data.lookup_str(&pool, s0, knownid::SOLVABLE_SUMMARY).as_deref(),
        Some("one"),
        "untouched values survive span-wise"
    );
}

#[test]
fn unset_removes_internalized_keys() {
    let pool = Pool::new();
    let mut data = Repodata::new();
    let s0 = EntityId::Solvable(0);

    data.set_str(s0, knownid::SOLVABLE_SUMMARY, "doomed");
    data.set_num(s0, knownid::SOLVABLE_INSTALLSIZE, 7);
    data.internalize().unwrap();
    assert!(data.lookup_type(s0, knownid::SOLVABLE_SUMMARY).is_some());

    data.unset(s0, knownid::SOLVABLE_SUMMARY);
    data.internalize().unwrap();

    assert_eq!(data.lookup_type(s0, knownid::SOLVABLE_SUMMARY), None);
    assert_eq!(data.lookup_num(s0, knownid::SOLVABLE_INSTALLSIZE), Some(7));
    let mut seen = 0;
    data.search(&pool, s0, 0, 0, None, |_, _| {
        seen += 1;
        crate::SearchAction::Continue
    })
    .unwrap();
    assert_eq!(seen, 1, "the unset key must not be walked");
}

#[test]
fn idarray_preserves_insertion_order() {
    let mut pool = Pool::new();
    let mut data = Repodata::new();
    let s0 = EntityId::Solvable(0);

    let ids: Vec<_> = ["z", "a", "m"].iter().map(|s| pool.str2id(s)).collect();
    for &id in &ids {
        data.add_idarray(s0, knownid::SOLVABLE_AUTHORS, id);
    }
    data.internalize().unwrap();
    assert_eq!(data.lookup_idarray(s0, knownid::SOLVABLE_AUTHORS), Some(ids));
}

#[test]
fn deparray_sorts_sections_around_the_marker() {
    let mut data = Repodata::new();
    let s0 = EntityId::Solvable(0);

    for dep in [300, 100, knownid::SOLVABLE_PREREQMARKER, 250, 50] {
        data.add_deparray(s0, knownid::SOLVABLE_REQUIRES, dep);
    }
    data.internalize().unwrap();

    assert_eq!(
        data.lookup_idarray(s0, knownid::SOLVABLE_REQUIRES),
        Some(vec![100, 300, knownid::SOLVABLE_PREREQMARKER, 50, 250]),
        "both sections sort ascending, marker position survives"
    );
}

#[test]
fn checksums_validate_digest_length() {
    let mut data = Repodata::new();
    let s0 = EntityId::Solvable(0);

    let err = data.set_checksum(s0, knownid::SOLVABLE_CHECKSUM, KeyType::Sha256, &[0u8; 16]);
    assert!(matches!(err, Err(DataError::TypeMismatch)));

    let hex = "00112233445566778899aabbccddeeff0102030405060708090a0b0c0d0e0f10";
    data.set_checksum_hex(s0, knownid::SOLVABLE_CHECKSUM, KeyType::Sha256, hex)
        .unwrap();
    data.internalize().unwrap();

    let (ty, out) = data.lookup_checksum_hex(s0, knownid::SOLVABLE_CHECKSUM).unwrap();
    assert_eq!(ty, KeyType::Sha256);
    assert_eq!(out, hex);
}

#[test]
fn flexarray_subrecords_are_reachable_with_sub() {
    let mut pool = Pool::new();
    let mut data = Repodata::new();
    let keyname = pool.str2id("repository:products");

    for name in ["alpha", "beta"] {
        let h = data.new_handle();
        data.set_str(h, knownid::SOLVABLE_SUMMARY, name);
        data.add_flexarray(EntityId::Meta, keyname, h).unwrap();
    }
    data.internalize().unwrap();

    let mut found = Vec::new();
    data.search(
        &pool,
        EntityId::Meta,
        knownid::SOLVABLE_SUMMARY,
        crate::searchflags::SUB,
        None,
        |_, kv| {
            if let crate::Value::Str(s) = &kv.value {
                found.push(s.clone());
            }
            crate::SearchAction::Continue
        },
    )
    .unwrap();
    assert_eq!(found, vec!["alpha", "beta"]);
}

#[test]
fn fixarray_rejects_mixed_schemas() {
    let mut pool = Pool::new();
    let mut data = Repodata::new();
    let keyname = pool.str2id("repository:updates");

    let h1 = data.new_handle();
    data.set_num(h1, knownid::SOLVABLE_INSTALLSIZE, 1);
    let h2 = data.new_handle();
    data.set_str(h2, knownid::SOLVABLE_SUMMARY, "odd one out");
    data.add_fixarray(EntityId::Meta, keyname, h1).unwrap();
    data.add_fixarray(EntityId::Meta, keyname, h2).unwrap();

    assert!(matches!(data.internalize(), Err(DataError::MixedFixArray)));
}

#[test]
fn handles_only_attach_through_array_calls() {
    let mut data = Repodata::new();
    let s0 = EntityId::Solvable(0);
    assert!(matches!(
        data.add_flexarray(s0, knownid::SOLVABLE_AUTHORS, EntityId::Solvable(1)),
        Err(DataError::BadHandle)
    ));
    assert!(matches!(
        data.add_flexarray(s0, knownid::SOLVABLE_AUTHORS, EntityId::Handle(42)),
        Err(DataError::BadHandle)
    ));
}

#[test]
fn dirnumnum_and_dirstr_arrays_roundtrip() {
    let mut pool = Pool::new();
    let mut data = Repodata::new();
    let s0 = EntityId::Solvable(0);
    let diskusage = pool.str2id("solvable:diskusage");

    let bin = data.str2dir(&mut pool, "/usr/bin");
    let share = data.str2dir(&mut pool, "/usr/share");
    data.add_dirnumnum(s0, diskusage, bin, 100, 3);
    data.add_dirnumnum(s0, diskusage, share, 200, 7);
    data.add_dirstr(s0, knownid::SOLVABLE_FILELIST, bin, "foo");
    data.add_dirstr(s0, knownid::SOLVABLE_FILELIST, bin, "bar");
    data.internalize().unwrap();

    let mut dnn = Vec::new();
    let mut files = Vec::new();
    data.search(&pool, s0, 0, 0, None, |key, kv| {
        match &kv.value {
            crate::Value::DirNumNum(d, a, b) if key.name == diskusage => dnn.push((*d, *a, *b)),
            crate::Value::DirStr(d, f) => files.push((*d, f.clone())),
            _ => {}
        }
        crate::SearchAction::Continue
    })
    .unwrap();
    assert_eq!(dnn, vec![(bin, 100, 3), (share, 200, 7)]);
    let files: Vec<String> = files
        .iter()
        .map(|(d, f)| data.dir2str(&pool, *d, Some(f)))
        .collect();
    assert_eq!(files, vec!["/usr/bin/foo", "/usr/bin/bar"]);
}
