//! # Pool - interned string, relation and directory storage
//!
//! Every other layer of the engine speaks in `Id`s: small integer handles
//! produced by interning a value into one of three pools.
//!
//! * [`StringPool`] — unique strings. Id 0 is always the empty string and
//!   interning is idempotent: the same string always yields the same id.
//! * Relations — `(name, evr, operator-flags)` triples such as
//!   `pkg >= 1.2`, interned inside the [`Pool`] and addressed by ids with
//!   bit 31 set so they share a namespace with string ids.
//! * [`DirPool`] — filesystem paths as a tree of `(parent, component)`
//!   nodes. Dir 0 is a virtual root, dir 1 is `/`.
//!
//! Ids are positional: pools only ever append, so an id stays valid for the
//! lifetime of its pool. Ids from one pool are meaningless in another.
//!
//! A [`Pool`] is created with a table of well-known strings already
//! interned (see [`knownid`]) so that key type names and standard attribute
//! names have fixed ids in every pool.

use std::collections::HashMap;

#[cfg(test)]
mod tests;

/// Integer handle into a pool. Bit 31 tags relation ids.
pub type Id = u32;

/// Tag bit marking an id as a relation id.
pub const RELDEP_TAG: Id = 1 << 31;

/// Tags a relation index as a relation id.
#[must_use]
pub fn make_rel_id(index: Id) -> Id {
    index | RELDEP_TAG
}

/// True if `id` addresses the relation table rather than the string pool.
#[must_use]
pub fn is_rel_id(id: Id) -> bool {
    id & RELDEP_TAG != 0
}

/// Strips the relation tag, yielding an index into the relation table.
#[must_use]
pub fn rel_index(id: Id) -> Id {
    id & !RELDEP_TAG
}

/// Relational operator bits for [`Reldep::flags`].
pub mod relflags {
    pub const GT: u8 = 1;
    pub const EQ: u8 = 2;
    pub const LT: u8 = 4;
    /// `a & b` — both deps must hold.
    pub const AND: u8 = 16;
    /// `a | b` — either dep may hold.
    pub const OR: u8 = 17;
    /// `a + b` — dep with an attached filter.
    pub const WITH: u8 = 18;
    /// Namespace-qualified dep.
    pub const NAMESPACE: u8 = 19;
    /// `name.arch` qualification.
    pub const ARCH: u8 = 20;
}

/// Well-known strings interned by [`Pool::new`] at fixed ids.
///
/// The first block is the key type names used by the data codec; the file
/// format stores key types as plain string ids, so fixing them here lets a
/// freshly created pool decode any key table without a lookup pass.
pub mod knownid {
    use super::Id;

    pub const STR_EMPTY: Id = 0;

    pub const TYPE_VOID: Id = 1;
    pub const TYPE_CONSTANT: Id = 2;
    pub const TYPE_CONSTANTID: Id = 3;
    pub const TYPE_ID: Id = 4;
    pub const TYPE_NUM: Id = 5;
    pub const TYPE_U32: Id = 6;
    pub const TYPE_STR: Id = 7;
    pub const TYPE_BINARY: Id = 8;
    pub const TYPE_IDARRAY: Id = 9;
    pub const TYPE_REL_IDARRAY: Id = 10;
    pub const TYPE_DIR: Id = 11;
    pub const TYPE_DIRNUMNUMARRAY: Id = 12;
    pub const TYPE_DIRSTRARRAY: Id = 13;
    pub const TYPE_MD5: Id = 14;
    pub const TYPE_SHA1: Id = 15;
    pub const TYPE_SHA256: Id = 16;
    pub const TYPE_FIXARRAY: Id = 17;
    pub const TYPE_FLEXARRAY: Id = 18;
    pub const TYPE_DELETED: Id = 19;

    /// The meta-level FLEXARRAY holding all per-solvable records.
    pub const REPOSITORY_SOLVABLES: Id = 20;

    pub const SOLVABLE_NAME: Id = 21;
    pub const SOLVABLE_ARCH: Id = 22;
    pub const SOLVABLE_EVR: Id = 23;
    pub const SOLVABLE_VENDOR: Id = 24;
    pub const SOLVABLE_PROVIDES: Id = 25;
    pub const SOLVABLE_REQUIRES: Id = 26;
    pub const SOLVABLE_SUMMARY: Id = 27;
    pub const SOLVABLE_DESCRIPTION: Id = 28;
    pub const SOLVABLE_AUTHORS: Id = 29;
    pub const SOLVABLE_CHECKSUM: Id = 30;
    pub const SOLVABLE_FILELIST: Id = 31;
    pub const SOLVABLE_INSTALLSIZE: Id = 32;
    pub const SOLVABLE_MEDIAFILE: Id = 33;

    /// Boundary marker inside `solvable:provides` dep arrays.
    pub const SOLVABLE_FILEMARKER: Id = 34;
    /// Boundary marker inside `solvable:requires` dep arrays.
    pub const SOLVABLE_PREREQMARKER: Id = 35;

    pub(crate) const STRINGS: &[&str] = &[
        "",
        "repokey:type:void",
        "repokey:type:constant",
        "repokey:type:constantid",
        "repokey:type:id",
        "repokey:type:num",
        "repokey:type:u32",
        "repokey:type:str",
        "repokey:type:binary",
        "repokey:type:idarray",
        "repokey:type:rel_idarray",
        "repokey:type:dir",
        "repokey:type:dirnumnumarray",
        "repokey:type:dirstrarray",
        "repokey:type:md5",
        "repokey:type:sha1",
        "repokey:type:sha256",
        "repokey:type:fixarray",
        "repokey:type:flexarray",
        "repokey:type:deleted",
        "repository:solvables",
        "solvable:name",
        "solvable:arch",
        "solvable:evr",
        "solvable:vendor",
        "solvable:provides",
        "solvable:requires",
        "solvable:summary",
        "solvable:description",
        "solvable:authors",
        "solvable:checksum",
        "solvable:filelist",
        "solvable:installsize",
        "solvable:mediafile",
        "solvable:filemarker",
        "solvable:prereqmarker",
    ];
}

/// An interned `(name, evr, flags)` dependency triple.
///
/// `name` and `evr` may themselves be relation ids, which is how compound
/// expressions like `(a | b) & c` nest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reldep {
    pub name: Id,
    pub evr: Id,
    pub flags: u8,
}

/// Ordered set of unique strings with id-by-content lookup.
#[derive(Debug, Default)]
pub struct StringPool {
    strings: Vec<String>,
    index: HashMap<String, Id>,
}

impl StringPool {
    /// Creates a pool containing only the empty string at id 0.
    #[must_use]
    pub fn new() -> Self {
        let mut pool = StringPool {
            strings: Vec::new(),
            index: HashMap::new(),
        };
        pool.intern("");
        pool
    }

    /// Interns `s`, returning its id. Idempotent.
    pub fn intern(&mut self, s: &str) -> Id {
        if let Some(&id) = self.index.get(s) {
            return id;
        }
        let id = self.strings.len() as Id;
        self.strings.push(s.to_owned());
        self.index.insert(s.to_owned(), id);
        id
    }

    /// Looks up `s` without interning it.
    #[must_use]
    pub fn find(&self, s: &str) -> Option<Id> {
        self.index.get(s).copied()
    }

    /// The string behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this pool.
    #[must_use]
    pub fn id2str(&self, id: Id) -> &str {
        &self.strings[id as usize]
    }

    /// Number of interned strings (ids are `0..len()`).
    #[must_use]
    pub fn len(&self) -> u32 {
        self.strings.len() as u32
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// The shared interning context: strings plus relations.
///
/// Everything holding an `Id` borrows meaning from exactly one `Pool`.
#[derive(Debug)]
pub struct Pool {
    pub strings: StringPool,
    rels: Vec<Reldep>,
    relindex: HashMap<(Id, Id, u8), Id>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    /// Creates a pool with the [`knownid`] strings preloaded.
    #[must_use]
    pub fn new() -> Self {
        let mut strings = StringPool::new();
        for s in knownid::STRINGS {
            strings.intern(s);
        }
        Pool {
            strings,
            // index 0 is reserved so that a tagged rel id is never 0
            rels: vec![Reldep {
                name: 0,
                evr: 0,
                flags: 0,
            }],
            relindex: HashMap::new(),
        }
    }

    /// Interns a string, returning its id.
    pub fn str2id(&mut self, s: &str) -> Id {
        self.strings.intern(s)
    }

    /// Looks up a string id without interning.
    #[must_use]
    pub fn find_str(&self, s: &str) -> Option<Id> {
        self.strings.find(s)
    }

    /// The string behind a plain string id.
    #[must_use]
    pub fn id2str(&self, id: Id) -> &str {
        self.strings.id2str(id)
    }

    /// Interns a relation, returning its tagged id. Idempotent.
    pub fn rel2id(&mut self, name: Id, evr: Id, flags: u8) -> Id {
        if let Some(&idx) = self.relindex.get(&(name, evr, flags)) {
            return make_rel_id(idx);
        }
        let idx = self.rels.len() as Id;
        self.rels.push(Reldep { name, evr, flags });
        self.relindex.insert((name, evr, flags), idx);
        make_rel_id(idx)
    }

    /// Looks up a relation without interning it.
    #[must_use]
    pub fn find_rel(&self, name: Id, evr: Id, flags: u8) -> Option<Id> {
        self.relindex
            .get(&(name, evr, flags))
            .map(|&idx| make_rel_id(idx))
    }

    /// The triple behind a tagged relation id.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a relation id of this pool.
    #[must_use]
    pub fn rel(&self, id: Id) -> &Reldep {
        assert!(is_rel_id(id), "not a relation id: {id}");
        &self.rels[rel_index(id) as usize]
    }

    /// Number of interned relations, counting the reserved slot 0.
    #[must_use]
    pub fn nrels(&self) -> u32 {
        self.rels.len() as u32
    }

    /// Renders a dependency id human-readably, e.g. `"foo >= 1.2"`.
    ///
    /// Plain string ids render as the string itself; compound relations
    /// recurse into their operands.
    #[must_use]
    pub fn dep2str(&self, id: Id) -> String {
        if !is_rel_id(id) {
            return self.id2str(id).to_owned();
        }
        let rel = self.rel(id);
        let name = self.dep2str(rel.name);
        let evr = self.dep2str(rel.evr);
        match rel.flags {
            relflags::ARCH => format!("{name}.{evr}"),
            relflags::AND => format!("{name} & {evr}"),
            relflags::OR => format!("{name} | {evr}"),
            relflags::WITH => format!("{name} + {evr}"),
            relflags::NAMESPACE => format!("{name}({evr})"),
            bits => {
                let mut op = String::new();
                if bits & relflags::LT != 0 {
                    op.push('<');
                }
                if bits & relflags::GT != 0 {
                    op.push('>');
                }
                if bits & relflags::EQ != 0 {
                    op.push('=');
                }
                format!("{name} {op} {evr}")
            }
        }
    }
}

/// One directory node: a path component under a parent directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DirEntry {
    comp: Id,
    parent: Id,
}

/// Tree of interned directories.
///
/// Dir 0 is the virtual root above `/`; dir 1 is `/` itself (component
/// id 0, the empty string). Every other node is created by
/// [`DirPool::add_dir`] with a component string id and a parent dir id.
#[derive(Debug)]
pub struct DirPool {
    dirs: Vec<DirEntry>,
    index: HashMap<(Id, Id), Id>,
}

impl Default for DirPool {
    fn default() -> Self {
        Self::new()
    }
}

impl DirPool {
    #[must_use]
    pub fn new() -> Self {
        let mut pool = DirPool {
            dirs: Vec::new(),
            index: HashMap::new(),
        };
        // dir 0: virtual root, dir 1: "/"
        pool.dirs.push(DirEntry { comp: 0, parent: 0 });
        pool.dirs.push(DirEntry { comp: 0, parent: 0 });
        pool.index.insert((0, 0), 1);
        pool
    }

    /// Interns the directory `parent`/`comp`, returning its dir id.
    pub fn add_dir(&mut self, parent: Id, comp: Id) -> Id {
        if let Some(&id) = self.index.get(&(parent, comp)) {
            return id;
        }
        let id = self.dirs.len() as Id;
        self.dirs.push(DirEntry { comp, parent });
        self.index.insert((parent, comp), id);
        id
    }

    /// Looks up a directory without interning it.
    #[must_use]
    pub fn find_dir(&self, parent: Id, comp: Id) -> Option<Id> {
        self.index.get(&(parent, comp)).copied()
    }

    /// Parent dir id of `did` (0 for the roots).
    #[must_use]
    pub fn parent(&self, did: Id) -> Id {
        self.dirs[did as usize].parent
    }

    /// Component string id of `did`.
    #[must_use]
    pub fn comp(&self, did: Id) -> Id {
        self.dirs[did as usize].comp
    }

    /// Number of directories, counting the two implicit roots.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.dirs.len() as u32
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// True if `did` names an existing directory.
    #[must_use]
    pub fn contains(&self, did: Id) -> bool {
        (did as usize) < self.dirs.len()
    }
}
