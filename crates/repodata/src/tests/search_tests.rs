use pool::{knownid, Pool};

use crate::{searchflags, Datamatcher, EntityId, Repodata, SearchAction, Value};

fn sample_repo(pool: &mut Pool) -> Repodata {
    let mut data = Repodata::new();
    for (i, (name, summary)) in [
        ("libfoo", "a foo library"),
        ("foobar", "tools built on foo"),
        ("quux", "unrelated"),
    ]
    .iter()
    .enumerate()
    {
        let s = EntityId::Solvable(i as u32);
        data.set_id(s, knownid::SOLVABLE_NAME, pool.str2id(name));
        data.set_str(s, knownid::SOLVABLE_SUMMARY, summary);
        data.set_num(s, knownid::SOLVABLE_INSTALLSIZE, (i as u64 + 1) * 1000);
    }
    data.internalize().unwrap();
    data
}

#[test]
fn keyname_filter_limits_the_walk() {
    let mut pool = Pool::new();
    let mut data = sample_repo(&mut pool);

    let mut hits = 0;
    data.search(
        &pool,
        EntityId::Solvable(0),
        knownid::SOLVABLE_SUMMARY,
        0,
        None,
        |key, kv| {
            assert_eq!(key.name, knownid::SOLVABLE_SUMMARY);
            assert_eq!(kv.value, Value::Str("a foo library".into()));
            hits += 1;
            SearchAction::Continue
        },
    )
    .unwrap();
    assert_eq!(hits, 1);
}

#[test]
fn stop_aborts_the_walk() {
    let mut pool = Pool::new();
    let mut data = sample_repo(&mut pool);

    let mut seen = 0;
    let completed = data
        .search(&pool, EntityId::Solvable(0), 0, 0, None, |_, _| {
            seen += 1;
            SearchAction::Stop
        })
        .unwrap();
    assert!(!completed);
    assert_eq!(seen, 1);
}

#[test]
fn search_all_visits_every_solvable() {
    let mut pool = Pool::new();
    let mut data = sample_repo(&mut pool);

    let mut names = Vec::new();
    data.search_all(&pool, knownid::SOLVABLE_NAME, 0, None, |e, _, kv| {
        if let Value::Id(id) = kv.value {
            names.push((e, pool.id2str(id).to_string()));
        }
        SearchAction::Continue
    })
    .unwrap();
    assert_eq!(
        names,
        vec![
            (EntityId::Solvable(0), "libfoo".to_string()),
            (EntityId::Solvable(1), "foobar".to_string()),
            (EntityId::Solvable(2), "quux".to_string()),
        ]
    );
}

#[test]
fn substring_matcher_filters_values() {
    let mut pool = Pool::new();
    let mut data = sample_repo(&mut pool);

    let m = Datamatcher::new("foo", searchflags::SUBSTRING);
    let mut hits = Vec::new();
    data.search_all(&pool, knownid::SOLVABLE_SUMMARY, 0, Some(&m), |e, _, _| {
        hits.push(e);
        SearchAction::Continue
    })
    .unwrap();
    assert_eq!(hits, vec![EntityId::Solvable(0), EntityId::Solvable(1)]);
}

#[test]
fn glob_matcher_on_names() {
    let mut pool = Pool::new();
    let mut data = sample_repo(&mut pool);

    let m = Datamatcher::new("lib*", searchflags::GLOB);
    let mut hits = Vec::new();
    data.search_all(&pool, knownid::SOLVABLE_NAME, 0, Some(&m), |e, _, _| {
        hits.push(e);
        SearchAction::Continue
    })
    .unwrap();
    assert_eq!(hits, vec![EntityId::Solvable(0)]);
}

#[test]
fn nocase_exact_match() {
    let m = Datamatcher::new("LibFOO", searchflags::STRING | searchflags::NOCASE);
    assert!(m.matches("libfoo"));
    assert!(!m.matches("libfool"));
}

#[test]
fn glob_patterns() {
    let glob = |pat: &str, s: &str| Datamatcher::new(pat, searchflags::GLOB).matches(s);
    assert!(glob("*.so.[0-9]", "libz.so.1"));
    assert!(!glob("*.so.[0-9]", "libz.so.1.2"));
    assert!(glob("??x", "qux"));
    assert!(!glob("??x", "quux"));
    assert!(glob("[!a-m]oo*", "zootools"));
    assert!(!glob("[!a-m]oo*", "footools"));
    assert!(glob("exact", "exact"));
}

#[test]
fn string_mode_anchors() {
    assert!(Datamatcher::new("lib", searchflags::STRINGSTART).matches("libfoo"));
    assert!(!Datamatcher::new("lib", searchflags::STRINGSTART).matches("zlib"));
    assert!(Datamatcher::new("foo", searchflags::STRINGEND).matches("libfoo"));
    assert!(!Datamatcher::new("foo", searchflags::STRINGEND).matches("foolib"));
}

#[test]
fn array_sentinel_fires_after_last_element() {
    let mut pool = Pool::new();
    let mut data = Repodata::new();
    let keyname = pool.str2id("repository:products");
    for name in ["one", "two"] {
        let h = data.new_handle();
        data.set_str(h, knownid::SOLVABLE_SUMMARY, name);
        data.add_flexarray(EntityId::Meta, keyname, h).unwrap();
    }
    data.internalize().unwrap();

    let mut events = Vec::new();
    data.search(
        &pool,
        EntityId::Meta,
        0,
        searchflags::SUB | searchflags::ARRAYSENTINEL,
        None,
        |key, kv| {
            if key.name == keyname {
                events.push((kv.entry, kv.eof));
            }
            SearchAction::Continue
        },
    )
    .unwrap();
    assert_eq!(
        events,
        vec![
            (0, crate::Eof::More),
            (1, crate::Eof::Last),
            (2, crate::Eof::Sentinel)
        ]
    );
}

#[test]
fn lookup_on_missing_keys_and_entities() {
    let mut pool = Pool::new();
    let mut data = sample_repo(&mut pool);

    assert_eq!(data.lookup_num(EntityId::Solvable(0), knownid::SOLVABLE_MEDIAFILE), None);
    assert_eq!(data.lookup_id(EntityId::Solvable(99), knownid::SOLVABLE_NAME), None);
    assert_eq!(data.lookup_str(&pool, EntityId::Meta, knownid::SOLVABLE_NAME), None);
    assert!(!data.lookup_void(EntityId::Solvable(0), knownid::SOLVABLE_NAME));
}

#[test]
fn constant_keys_answer_num_and_id_lookups() {
    let mut pool = Pool::new();
    let mut data = Repodata::new();
    let s0 = EntityId::Solvable(0);
    let medianr = pool.str2id("solvable:medianr");

    data.set_constant(s0, medianr, 7);
    data.set_constantid(s0, knownid::SOLVABLE_ARCH, pool.str2id("x86_64"));
    data.set_void(s0, pool.str2id("solvable:installonly"));
    data.internalize().unwrap();

    assert_eq!(data.lookup_num(s0, medianr), Some(7));
    assert_eq!(
        data.lookup_str(&pool, s0, knownid::SOLVABLE_ARCH).as_deref(),
        Some("x86_64")
    );
    assert!(data.lookup_void(s0, pool.find_str("solvable:installonly").unwrap()));
}
