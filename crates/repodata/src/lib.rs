//! Attribute storage for package metadata.
//!
//! A [`Repodata`] holds per-entity key/value data in two layers:
//!
//! ```text
//!   staged attrs  --internalize-->  incore blob  <--lazy--  pagestore
//!   (HashMap)                       (flat varint           (vertical,
//!                                    records)               compressed)
//! ```
//!
//! Writes go through typed `set_*`/`add_*` calls that stage values in a
//! side table. [`Repodata::internalize`] merges the staged values into
//! the flat incore encoding, after which they are visible to `search`
//! and the `lookup_*` accessors. Bulky values (file lists, descriptions)
//! may live outside the incore blob, either in a vertical in-memory
//! area or behind a page-compressed [`Pagestore`].

use std::collections::HashMap;

use codec::{DecodeError, KeyType};
use pagestore::{PageError, Pagestore, PAGESIZE};
use pool::{DirPool, Id};
use thiserror::Error;

mod attrs;
mod internalize;
mod search;

pub use search::{searchflags, Datamatcher, Eof, KeyValue, SearchAction, Value};

#[derive(Debug, Error)]
pub enum DataError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error("fixarray elements must share a single schema")]
    MixedFixArray,
    #[error("value does not fit key type")]
    TypeMismatch,
    #[error("handle is not part of this repodata")]
    BadHandle,
    #[error("sub-record nesting too deep")]
    TooDeep,
}

pub type DataResult<T> = Result<T, DataError>;

/// Where a key's values live once internalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStorage {
    /// Key is slated for removal and never serialized.
    Dropped,
    /// Stored inline in the incore blob. The separate on-disk tag for
    /// data folded into solvable structs is mapped to this as well.
    Incore,
    /// Incore holds an (offset, length) pair into the vertical area.
    VerticalOffset,
}

impl KeyStorage {
    pub fn to_tag(self) -> Id {
        match self {
            KeyStorage::Dropped => 0,
            KeyStorage::Incore => 2,
            KeyStorage::VerticalOffset => 3,
        }
    }

    /// Decode an on-disk storage tag. Tag 1 marks data that the
    /// original consumer folds into fixed solvable structs; we keep
    /// everything incore so it collapses to `Incore`.
    pub fn from_tag(tag: Id) -> Option<KeyStorage> {
        match tag {
            0 => Some(KeyStorage::Dropped),
            1 | 2 => Some(KeyStorage::Incore),
            3 => Some(KeyStorage::VerticalOffset),
            _ => None,
        }
    }
}

/// A registered key: interned name, value type, storage class and a
/// type-dependent size (constant value, constant id, or total vertical
/// byte count).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repokey {
    pub name: Id,
    pub ty: KeyType,
    pub size: u32,
    pub storage: KeyStorage,
}

/// Addressable attribute owners. `Meta` is the per-repodata record,
/// `Solvable` indexes into the solvable array, `Handle` names a staged
/// sub-record created with [`Repodata::new_handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityId {
    Meta,
    Solvable(u32),
    Handle(u32),
}

/// A staged, not yet internalized value.
#[derive(Debug, Clone)]
pub(crate) enum StagedValue {
    Void,
    Constant(u32),
    ConstantId(Id),
    Id(Id),
    Num(u64),
    U32(u32),
    Str(String),
    Binary(Vec<u8>),
    Checksum(Vec<u8>),
    Dir(Id),
    IdArray(Vec<Id>),
    DirNumNum(Vec<(Id, u32, u32)>),
    DirStr(Vec<(Id, String)>),
    Array(Vec<u32>),
    Deleted,
}

pub struct Repodata {
    /// Key registry, `keys[0]` is a null sentinel.
    keys: Vec<Repokey>,
    key_index: HashMap<(Id, KeyType, u32), Id>,
    /// Schema registry, `schemata[0]` is the empty schema.
    schemata: Vec<Vec<Id>>,
    schema_index: HashMap<Vec<Id>, Id>,
    pub dirpool: DirPool,

    nsolvables: u32,
    /// Flat internalized data: main schema id, meta record, then one
    /// record (schema id + values) per solvable.
    incoredata: Vec<u8>,
    /// Offset of each solvable's record in `incoredata`.
    incoreoffset: Vec<usize>,
    mainschema: Id,
    /// Value offset per main schema key, parallel to the schema.
    mainschemaoffsets: Vec<usize>,
    /// Offset of the meta record's first value (right after the main
    /// schema id).
    meta_offset: usize,

    /// Vertical data kept in memory, logically appended after the
    /// paged area.
    vincore: Vec<u8>,
    store: Option<Pagestore>,

    /// Staged attributes per entity, in first-set order.
    attrs: HashMap<EntityId, Vec<(Id, StagedValue)>>,
    /// Arena of staged sub-records addressed by `EntityId::Handle`.
    handles: Vec<Vec<(Id, StagedValue)>>,
}

impl Default for Repodata {
    fn default() -> Self {
        Self::new()
    }
}

impl Repodata {
    pub fn new() -> Repodata {
        let null_key = Repokey {
            name: 0,
            ty: KeyType::Void,
            size: 0,
            storage: KeyStorage::Incore,
        };
        let mut schema_index = HashMap::new();
        schema_index.insert(Vec::new(), 0);
        Repodata {
            keys: vec![null_key],
            key_index: HashMap::new(),
            schemata: vec![Vec::new()],
            schema_index,
            dirpool: DirPool::new(),
            nsolvables: 0,
            incoredata: Vec::new(),
            incoreoffset: Vec::new(),
            mainschema: 0,
            mainschemaoffsets: Vec::new(),
            meta_offset: 0,
            vincore: Vec::new(),
            store: None,
            attrs: HashMap::new(),
            handles: Vec::new(),
        }
    }

    /// Intern a key, reusing an existing id when name, type and (for
    /// constant types) size all match.
    pub fn key2id(&mut self, key: &Repokey) -> Id {
        let size_tag = match key.ty {
            KeyType::Constant | KeyType::ConstantId => key.size,
            _ => 0,
        };
        if let Some(&id) = self.key_index.get(&(key.name, key.ty, size_tag)) {
            return id;
        }
        let id = self.keys.len() as Id;
        self.keys.push(key.clone());
        self.key_index.insert((key.name, key.ty, size_tag), id);
        id
    }

    #[must_use]
    pub fn nkeys(&self) -> u32 {
        self.keys.len() as u32
    }

    #[must_use]
    pub fn key(&self, id: Id) -> &Repokey {
        &self.keys[id as usize]
    }

    /// Intern a schema (ordered key id list).
    pub fn schema2id(&mut self, keys: &[Id]) -> Id {
        if let Some(&id) = self.schema_index.get(keys) {
            return id;
        }
        let id = self.schemata.len() as Id;
        self.schemata.push(keys.to_vec());
        self.schema_index.insert(keys.to_vec(), id);
        id
    }

    #[must_use]
    pub fn nschemata(&self) -> u32 {
        self.schemata.len() as u32
    }

    #[must_use]
    pub fn schema(&self, id: Id) -> &[Id] {
        &self.schemata[id as usize]
    }

    #[must_use]
    pub fn nsolvables(&self) -> u32 {
        self.nsolvables
    }

    #[must_use]
    pub fn mainschema(&self) -> Id {
        self.mainschema
    }

    #[must_use]
    pub fn incore_data(&self) -> &[u8] {
        &self.incoredata
    }

    #[must_use]
    pub fn meta_offset(&self) -> usize {
        self.meta_offset
    }

    #[must_use]
    pub fn solvable_offset(&self, idx: u32) -> usize {
        self.incoreoffset[idx as usize]
    }

    #[must_use]
    pub fn has_staged(&self) -> bool {
        !self.attrs.is_empty()
    }

    /// Byte count of the paged vertical area (0 without a backing
    /// store). In-memory vertical data starts at this offset.
    #[must_use]
    pub fn paged_len(&self) -> u64 {
        self.store.as_ref().map_or(0, Pagestore::blob_len)
    }

    /// Install internalized state produced by a file reader.
    #[allow(clippy::too_many_arguments)]
    pub fn install_incore(
        &mut self,
        incoredata: Vec<u8>,
        incoreoffset: Vec<usize>,
        mainschema: Id,
        mainschemaoffsets: Vec<usize>,
        meta_offset: usize,
        nsolvables: u32,
    ) {
        self.incoredata = incoredata;
        self.incoreoffset = incoreoffset;
        self.mainschema = mainschema;
        self.mainschemaoffsets = mainschemaoffsets;
        self.meta_offset = meta_offset;
        self.nsolvables = nsolvables;
    }

    pub fn install_pagestore(&mut self, store: Pagestore) {
        self.store = Some(store);
    }

    /// Record the total vertical byte count for a key after writing.
    pub fn set_key_size(&mut self, id: Id, size: u32) {
        self.keys[id as usize].size = size;
    }

    pub fn append_vertical(&mut self, data: &[u8]) -> u64 {
        let off = self.paged_len() + self.vincore.len() as u64;
        self.vincore.extend_from_slice(data);
        off
    }

    /// Fetch `len` vertical bytes at logical offset `off`, paging in
    /// from the backing store when needed.
    pub fn vertical_bytes(&mut self, off: u64, len: usize) -> DataResult<Vec<u8>> {
        fetch_vertical(&mut self.store, &self.vincore, off, len)
    }
}

/// Standalone form of [`Repodata::vertical_bytes`] so callers holding
/// other borrows of the repodata can still page data in.
pub(crate) fn fetch_vertical(
    store: &mut Option<Pagestore>,
    vincore: &[u8],
    off: u64,
    len: usize,
) -> DataResult<Vec<u8>> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let paged = store.as_ref().map_or(0, Pagestore::blob_len);
    if off >= paged {
        let start = (off - paged) as usize;
        let end = start
            .checked_add(len)
            .filter(|&e| e <= vincore.len())
            .ok_or(DecodeError::Corrupt("vertical offset out of bounds"))?;
        return Ok(vincore[start..end].to_vec());
    }
    let end = off
        .checked_add(len as u64)
        .filter(|&e| e <= paged)
        .ok_or(DecodeError::Corrupt("vertical value spans paged boundary"))?;
    let store = store
        .as_mut()
        .ok_or(DecodeError::Corrupt("no backing store"))?;
    let pstart = (off / PAGESIZE as u64) as u32;
    let pend = ((end - 1) / PAGESIZE as u64) as u32;
    let data = store.load_page_range(pstart, pend)?;
    let skip = (off - pstart as u64 * PAGESIZE as u64) as usize;
    Ok(data[skip..skip + len].to_vec())
}

#[cfg(test)]
mod tests;
