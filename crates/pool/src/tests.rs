use crate::*;

#[test]
fn empty_string_is_id_zero() {
    let pool = Pool::new();
    assert_eq!(pool.strings.find(""), Some(0));
    assert_eq!(pool.id2str(0), "");
}

#[test]
fn intern_is_idempotent() {
    let mut pool = Pool::new();
    let a = pool.str2id("zlib");
    let b = pool.str2id("zlib");
    assert_eq!(a, b, "same string must yield the same id");
    assert_eq!(pool.id2str(a), "zlib");
}

#[test]
fn find_does_not_intern() {
    let pool = Pool::new();
    let before = pool.strings.len();
    assert_eq!(pool.find_str("never-seen"), None);
    assert_eq!(pool.strings.len(), before, "find must not mutate the pool");
}

#[test]
fn known_strings_have_fixed_ids() {
    let pool = Pool::new();
    assert_eq!(pool.id2str(knownid::TYPE_VOID), "repokey:type:void");
    assert_eq!(pool.id2str(knownid::TYPE_FLEXARRAY), "repokey:type:flexarray");
    assert_eq!(
        pool.id2str(knownid::REPOSITORY_SOLVABLES),
        "repository:solvables"
    );
    assert_eq!(
        pool.id2str(knownid::SOLVABLE_PREREQMARKER),
        "solvable:prereqmarker"
    );
    // a second pool gets identical ids
    let other = Pool::new();
    assert_eq!(other.find_str("solvable:name"), Some(knownid::SOLVABLE_NAME));
}

#[test]
fn rel_interning_and_tagging() {
    let mut pool = Pool::new();
    let foo = pool.str2id("foo");
    let v1 = pool.str2id("1.0");
    let a = pool.rel2id(foo, v1, relflags::GT | relflags::EQ);
    let b = pool.rel2id(foo, v1, relflags::GT | relflags::EQ);
    assert_eq!(a, b, "identical triples must share one rel id");
    assert!(is_rel_id(a));
    assert!(!is_rel_id(foo));
    let rel = pool.rel(a);
    assert_eq!((rel.name, rel.evr, rel.flags), (foo, v1, 6));
    // different flags make a different rel
    let c = pool.rel2id(foo, v1, relflags::EQ);
    assert_ne!(a, c);
}

#[test]
fn find_rel_does_not_intern() {
    let mut pool = Pool::new();
    let foo = pool.str2id("foo");
    assert_eq!(pool.find_rel(foo, 0, relflags::EQ), None);
    let nrels = pool.nrels();
    let id = pool.rel2id(foo, 0, relflags::EQ);
    assert_eq!(pool.nrels(), nrels + 1);
    assert_eq!(pool.find_rel(foo, 0, relflags::EQ), Some(id));
}

#[test]
fn dep2str_renders_operators() {
    let mut pool = Pool::new();
    let foo = pool.str2id("foo");
    let bar = pool.str2id("bar");
    let ge = pool.rel2id(foo, bar, relflags::GT | relflags::EQ);
    assert_eq!(pool.dep2str(ge), "foo >= bar");
    assert_eq!(pool.dep2str(foo), "foo");

    let x86 = pool.str2id("x86_64");
    let arch = pool.rel2id(foo, x86, relflags::ARCH);
    assert_eq!(pool.dep2str(arch), "foo.x86_64");

    let both = pool.rel2id(ge, arch, relflags::AND);
    assert_eq!(pool.dep2str(both), "foo >= bar & foo.x86_64");
}

#[test]
fn dirpool_roots_and_dedup() {
    let mut dirs = DirPool::new();
    assert_eq!(dirs.len(), 2);
    assert_eq!(dirs.parent(1), 0);
    assert_eq!(dirs.comp(1), 0, "dir 1 is '/' with the empty component");

    let mut pool = Pool::new();
    let usr = pool.str2id("usr");
    let bin = pool.str2id("bin");
    let d_usr = dirs.add_dir(1, usr);
    let d_bin = dirs.add_dir(d_usr, bin);
    assert_eq!(dirs.add_dir(1, usr), d_usr, "dir interning is idempotent");
    assert_eq!(dirs.parent(d_bin), d_usr);
    assert_eq!(dirs.comp(d_bin), bin);
    assert_eq!(dirs.find_dir(d_usr, bin), Some(d_bin));
    assert_eq!(dirs.find_dir(d_bin, usr), None);
}
