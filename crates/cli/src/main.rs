///! # solvtool - solv file inspector
///!
///! A small command-line front end for the solv file reader and writer.
///! Loads a file into a fresh pool, then prints statistics, dumps its
///! contents, or re-encodes it.
///!
///! ## Commands
///!
///! ```text
///! solvtool stats <file>            Print section and pool counts
///! solvtool dump <file>             Print every entity's keys and values
///! solvtool roundtrip <in> <out>    Read <in> and re-encode it as <out>
///! ```
///!
///! ## Configuration
///!
///! All settings are controlled via environment variables:
///!
///! ```text
///! SOLVTOOL_DUMP_LIMIT   Max solvables printed by dump (default: 0 = all)
///! ```
///!
///! ## Example
///!
///! ```text
///! $ solvtool stats repo.solv
///! solvables:  2
///! keys:       7
///! schemata:   3
///! strings:    48
///! relations:  1
///! dirs:       5
///! paged data: 0 bytes
///! ```

use std::fs::File;

use anyhow::{bail, Context, Result};
use pool::{Id, Pool};
use repodata::{searchflags, EntityId, Repodata, SearchAction, Value};
use solvfile::WriteOptions;

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match (args.get(1).map(String::as_str), &args[2..]) {
        (Some("stats"), [path]) => stats(path),
        (Some("dump"), [path]) => dump(path),
        (Some("roundtrip"), [input, output]) => roundtrip(input, output),
        _ => bail!("usage: solvtool <stats|dump> <file> | solvtool roundtrip <in> <out>"),
    }
}

fn load(path: &str) -> Result<(Pool, Repodata)> {
    let file = File::open(path).with_context(|| format!("cannot open {path}"))?;
    let mut pool = Pool::new();
    let data = solvfile::read(&mut pool, file).with_context(|| format!("cannot read {path}"))?;
    Ok((pool, data))
}

fn stats(path: &str) -> Result<()> {
    let (pool, data) = load(path)?;
    println!("solvables:  {}", data.nsolvables());
    println!("keys:       {}", data.nkeys() - 1);
    println!("schemata:   {}", data.nschemata() - 1);
    println!("strings:    {}", pool.strings.len());
    println!("relations:  {}", pool.nrels() - 1);
    println!("dirs:       {}", data.dirpool.len());
    println!("paged data: {} bytes", data.paged_len());
    Ok(())
}

fn dump(path: &str) -> Result<()> {
    let limit: u32 = env_or("SOLVTOOL_DUMP_LIMIT", "0").parse().unwrap_or(0);
    let (pool, mut data) = load(path)?;

    // the meta walk must not descend, it would revisit every solvable
    // through the solvables array
    dump_entity(&pool, &mut data, EntityId::Meta, "meta", 0)?;
    let mut n = data.nsolvables();
    if limit > 0 {
        n = n.min(limit);
    }
    for i in 0..n {
        let label = format!("solvable {i}");
        dump_entity(&pool, &mut data, EntityId::Solvable(i), &label, searchflags::SUB)?;
    }
    if n < data.nsolvables() {
        println!("... {} more solvables", data.nsolvables() - n);
    }
    Ok(())
}

fn dump_entity(
    pool: &Pool,
    data: &mut Repodata,
    entity: EntityId,
    label: &str,
    flags: u32,
) -> Result<()> {
    // rendering dirs needs the repodata, which search borrows mutably,
    // so collect first and format afterwards
    let mut rows: Vec<(Id, Value)> = Vec::new();
    data.search(pool, entity, 0, flags, None, |key, kv| {
        rows.push((key.name, kv.value.clone()));
        SearchAction::Continue
    })?;
    if rows.is_empty() {
        return Ok(());
    }
    println!("{label}:");
    for (name, value) in &rows {
        println!("  {}: {}", pool.id2str(*name), render(pool, data, value));
    }
    Ok(())
}

fn render(pool: &Pool, data: &Repodata, v: &Value) -> String {
    match v {
        Value::Void => "(void)".to_string(),
        Value::Id(id) => pool.dep2str(*id),
        Value::Num(n) => n.to_string(),
        Value::Str(s) => s.clone(),
        Value::Binary(b) => format!("({} bytes)", b.len()),
        Value::Checksum(ty, sum) => {
            let mut hex = String::with_capacity(sum.len() * 2);
            for b in sum {
                hex.push_str(&format!("{b:02x}"));
            }
            format!("{}:{hex}", pool.id2str(ty.name_id()))
        }
        Value::Dir(d) => data.dir2str(pool, *d, None),
        Value::DirNumNum(d, n1, n2) => {
            format!("{} {n1} {n2}", data.dir2str(pool, *d, None))
        }
        Value::DirStr(d, s) => data.dir2str(pool, *d, Some(s)),
        Value::Array(n) => format!("[{n} elements]"),
    }
}

fn roundtrip(input: &str, output: &str) -> Result<()> {
    let (pool, mut data) = load(input)?;
    let mut out = File::create(output).with_context(|| format!("cannot create {output}"))?;
    solvfile::write(&pool, &mut data, &mut out, &WriteOptions::default())
        .with_context(|| format!("cannot write {output}"))?;
    let insize = std::fs::metadata(input)?.len();
    let outsize = std::fs::metadata(output)?.len();
    println!("{input} ({insize} bytes) -> {output} ({outsize} bytes)");
    Ok(())
}
