//! # Pagestore - compressed, lazily loaded vertical storage
//!
//! Bulk attribute values (descriptions, file lists, checksums) are kept
//! out-of-line from the compact per-entity records, split into fixed 32 KiB
//! pages. Each page is compressed independently with a small LZ77-family
//! coder and loaded from the backing solv file only when something actually
//! asks for a value on it.
//!
//! [`Pagestore`] keeps a bounded set of decompressed page slots and
//! guarantees that [`Pagestore::load_page_range`] leaves the requested page
//! run *contiguous* in memory, so a value spanning a page boundary can be
//! decoded from a single slice without any special casing.
//!
//! The store is read-only: pages are written once at file-write time,
//! straight from the in-memory vertical buffer, never through this cache.

use thiserror::Error;

mod compress;
mod store;

pub use compress::{compress_page, decompress_page};
pub use store::Pagestore;

#[cfg(test)]
mod tests;

/// Size of one vertical storage page. Also the only page size the file
/// format accepts.
pub const PAGESIZE: usize = 32768;

/// Errors from page decompression or lazy page loading.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("i/o error reading page: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt compressed page: {0}")]
    Corrupt(&'static str),
    #[error("page {0} out of range")]
    OutOfRange(u32),
    #[error("page store has no backing file")]
    NoBackingFile,
}
