/// Integration tests for solvtool.
/// Cover: file round-trips through the real binary, stats/dump output,
/// dump limits, and the provides-array scenario end to end.
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use pool::{knownid, relflags, Pool};
use repodata::{EntityId, Repodata};
use solvfile::WriteOptions;
use tempfile::tempdir;

/// Writes a small two-package repo to `<dir>/repo.solv`.
fn write_fixture(dir: &Path) -> PathBuf {
    let mut pool = Pool::new();
    let mut data = Repodata::new();

    let foo = EntityId::Solvable(0);
    data.set_id(foo, knownid::SOLVABLE_NAME, pool.str2id("foo"));
    data.set_id(foo, knownid::SOLVABLE_EVR, pool.str2id("1.0-1"));
    data.set_str(foo, knownid::SOLVABLE_SUMMARY, "foos things");
    let bar = pool.str2id("bar");
    let v2 = pool.str2id("2.0");
    let dep = pool.rel2id(bar, v2, relflags::GT | relflags::EQ);
    data.add_deparray(foo, knownid::SOLVABLE_REQUIRES, dep);

    let barpkg = EntityId::Solvable(1);
    data.set_id(barpkg, knownid::SOLVABLE_NAME, bar);
    data.set_id(barpkg, knownid::SOLVABLE_EVR, pool.str2id("2.0-1"));
    data.set_str(barpkg, knownid::SOLVABLE_SUMMARY, "bars things");

    let path = dir.join("repo.solv");
    let mut out = File::create(&path).unwrap();
    solvfile::write(&pool, &mut data, &mut out, &WriteOptions::default()).unwrap();
    path
}

fn run_solvtool(args: &[&str], envs: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new("cargo");
    cmd.args(["run", "-p", "cli", "--"]).args(args);
    for (k, v) in envs {
        cmd.env(k, v);
    }
    cmd.output().expect("failed to run solvtool")
}

#[test]
fn stats_reports_section_counts() {
    let dir = tempdir().unwrap();
    let path = write_fixture(dir.path());

    let out = run_solvtool(&["stats", path.to_str().unwrap()], &[]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("solvables:  2"), "got: {stdout}");
    assert!(stdout.contains("relations:  1"), "got: {stdout}");
}

#[test]
fn dump_prints_names_and_dependencies() {
    let dir = tempdir().unwrap();
    let path = write_fixture(dir.path());

    let out = run_solvtool(&["dump", path.to_str().unwrap()], &[]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("solvable 0"), "got: {stdout}");
    assert!(stdout.contains("solvable:name: foo"), "got: {stdout}");
    assert!(stdout.contains("bar >= 2.0"), "got: {stdout}");
    assert!(stdout.contains("solvable:name: bar"), "got: {stdout}");
}

#[test]
fn dump_limit_caps_the_output() {
    let dir = tempdir().unwrap();
    let path = write_fixture(dir.path());

    let out = run_solvtool(
        &["dump", path.to_str().unwrap()],
        &[("SOLVTOOL_DUMP_LIMIT", "1")],
    );
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("solvable 0"), "got: {stdout}");
    assert!(!stdout.contains("solvable 1"), "got: {stdout}");
    assert!(stdout.contains("1 more solvable"), "got: {stdout}");
}

#[test]
fn roundtrip_produces_an_equivalent_file() {
    let dir = tempdir().unwrap();
    let path = write_fixture(dir.path());
    let copy = dir.path().join("copy.solv");

    let out = run_solvtool(
        &[
            "roundtrip",
            path.to_str().unwrap(),
            copy.to_str().unwrap(),
        ],
        &[],
    );
    assert!(out.status.success());

    let mut pool = Pool::new();
    let mut data = solvfile::read(&mut pool, File::open(&copy).unwrap()).unwrap();
    assert_eq!(data.nsolvables(), 2);
    assert_eq!(
        data.lookup_str(&pool, EntityId::Solvable(0), knownid::SOLVABLE_NAME)
            .as_deref(),
        Some("foo")
    );
    let reqs = data
        .lookup_idarray(EntityId::Solvable(0), knownid::SOLVABLE_REQUIRES)
        .unwrap();
    assert_eq!(reqs.len(), 1);
    assert_eq!(pool.dep2str(reqs[0]), "bar >= 2.0");
}

#[test]
fn missing_arguments_fail_with_usage() {
    let out = run_solvtool(&[], &[]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("usage"), "got: {stderr}");
}

#[test]
fn unreadable_files_fail_cleanly() {
    let out = run_solvtool(&["stats", "/no/such/file.solv"], &[]);
    assert!(!out.status.success());
}

#[test]
fn provides_arrays_keep_order_and_relations() {
    // a plain id array mixing a relation and a string id keeps both and
    // their order across write and read
    let mut pool = Pool::new();
    let mut data = Repodata::new();
    let fooid = pool.str2id("foo");
    let barid = pool.str2id("bar");
    let rel = pool.rel2id(fooid, barid, relflags::GT | relflags::EQ);
    let ent = EntityId::Solvable(5);
    data.add_idarray(ent, knownid::SOLVABLE_PROVIDES, rel);
    data.add_idarray(ent, knownid::SOLVABLE_PROVIDES, fooid);

    let dir = tempdir().unwrap();
    let path = dir.path().join("provides.solv");
    let mut out = File::create(&path).unwrap();
    solvfile::write(&pool, &mut data, &mut out, &WriteOptions::default()).unwrap();

    let mut p2 = Pool::new();
    let mut d2 = solvfile::read(&mut p2, File::open(&path).unwrap()).unwrap();
    assert_eq!(d2.nsolvables(), 6, "earlier empty solvables are kept");
    let provs = d2.lookup_idarray(ent, knownid::SOLVABLE_PROVIDES).unwrap();
    assert_eq!(provs.len(), 2);
    assert_eq!(p2.dep2str(provs[0]), "foo >= bar");
    assert_eq!(p2.dep2str(provs[1]), "foo");
    let foo2 = p2.find_str("foo").unwrap();
    let bar2 = p2.find_str("bar").unwrap();
    assert_eq!(
        p2.find_rel(foo2, bar2, relflags::GT | relflags::EQ),
        Some(provs[0])
    );
}
