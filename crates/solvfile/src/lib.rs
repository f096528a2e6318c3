//! Binary interchange for [`Repodata`]: the solv file format.
//!
//! A solv file carries one repodata's worth of package metadata in a
//! pool-relative form: its own string and relation numbering, a
//! directory table, the key and schema registries, a flat incore blob
//! and an optional page-compressed vertical blob. [`read`] merges a
//! file into a caller-supplied [`pool::Pool`] and produces a ready
//! [`Repodata`]; [`write`] serializes a repodata, renumbering every id
//! it references into a dense file-local space.
//!
//! Vertical data is not read eagerly. The reader records page
//! descriptors and hands the backing file to a [`pagestore::Pagestore`]
//! so lookups page in only what they touch.

use thiserror::Error;

mod format;
mod reader;
mod writer;

pub use reader::read;
pub use writer::{write, WriteOptions};

#[derive(Debug, Error)]
pub enum SolvError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a solv file")]
    NotThisFormat,
    #[error("unsupported solv version {0}")]
    UnsupportedVersion(u32),
    #[error(transparent)]
    Decode(#[from] codec::DecodeError),
    #[error(transparent)]
    Page(#[from] pagestore::PageError),
    #[error(transparent)]
    Data(#[from] repodata::DataError),
    #[error("corrupt solv file: {0}")]
    Corrupt(&'static str),
    #[error("unsupported solv feature: {0}")]
    Unsupported(&'static str),
}

pub type SolvResult<T> = Result<T, SolvError>;

#[cfg(test)]
mod tests;
