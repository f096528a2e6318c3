mod corrupt_tests;

use std::io::{Seek, SeekFrom, Write as _};

use pool::Pool;
use repodata::Repodata;

use crate::WriteOptions;

/// Serializes `data` with the default options.
fn to_bytes(pool: &Pool, data: &mut Repodata) -> Vec<u8> {
    let mut buf = Vec::new();
    crate::write(pool, data, &mut buf, &WriteOptions::default()).unwrap();
    buf
}

/// Round-trips raw solv bytes through a real file so the pagestore gets
/// a seekable backing handle.
fn from_bytes(bytes: &[u8]) -> (Pool, Repodata) {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(bytes).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    let mut pool = Pool::new();
    let data = crate::read(&mut pool, file).unwrap();
    (pool, data)
}

fn try_from_bytes(bytes: &[u8]) -> crate::SolvResult<(Pool, Repodata)> {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(bytes).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    let mut pool = Pool::new();
    let data = crate::read(&mut pool, file)?;
    Ok((pool, data))
}
