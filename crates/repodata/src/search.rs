//! Decoding walk over internalized data: `search` with key filtering
//! and string matching, plus the typed `lookup_*` accessors.

use codec::{marker_for_keyname, Cursor, DecodeError, KeyType};
use pagestore::Pagestore;
use pool::{DirPool, Id, Pool};

use crate::{DataResult, EntityId, KeyStorage, Repodata, Repokey};

pub mod searchflags {
    /// Low bits select the string match mode.
    pub const STRINGMASK: u32 = 15;
    pub const STRING: u32 = 1;
    pub const STRINGSTART: u32 = 2;
    pub const STRINGEND: u32 = 3;
    pub const SUBSTRING: u32 = 4;
    pub const GLOB: u32 = 5;
    /// Case-fold both pattern and candidate.
    pub const NOCASE: u32 = 1 << 7;
    /// Descend into fixarray/flexarray sub-records.
    pub const SUB: u32 = 1 << 9;
    /// Report an extra callback after the last array element.
    pub const ARRAYSENTINEL: u32 = 1 << 10;
}

/// One decoded value handed to the search callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Id(Id),
    Num(u64),
    Str(String),
    Binary(Vec<u8>),
    Checksum(KeyType, Vec<u8>),
    Dir(Id),
    DirNumNum(Id, u32, u32),
    DirStr(Id, String),
    /// A fixarray/flexarray container; the payload is the element count.
    Array(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eof {
    /// More elements of the same array follow.
    More,
    /// Last (or only) value under this key.
    Last,
    /// Extra end-of-array callback, only with `ARRAYSENTINEL`.
    Sentinel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue {
    pub value: Value,
    /// Element index within an array value, 0 for scalars.
    pub entry: u32,
    pub eof: Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchAction {
    Continue,
    Stop,
}

/// Compiled string matcher for search.
#[derive(Debug, Clone)]
pub struct Datamatcher {
    mode: u32,
    nocase: bool,
    pattern: String,
}

impl Datamatcher {
    #[must_use]
    pub fn new(pattern: &str, flags: u32) -> Datamatcher {
        let nocase = flags & searchflags::NOCASE != 0;
        let pattern = if nocase {
            pattern.to_lowercase()
        } else {
            pattern.to_string()
        };
        Datamatcher {
            mode: flags & searchflags::STRINGMASK,
            nocase,
            pattern,
        }
    }

    #[must_use]
    pub fn matches(&self, s: &str) -> bool {
        let folded;
        let s = if self.nocase {
            folded = s.to_lowercase();
            &folded[..]
        } else {
            s
        };
        match self.mode {
            searchflags::STRING => s == self.pattern,
            searchflags::STRINGSTART => s.starts_with(&self.pattern),
            searchflags::STRINGEND => s.ends_with(&self.pattern),
            searchflags::SUBSTRING => s.contains(&self.pattern),
            searchflags::GLOB => {
                let pat: Vec<char> = self.pattern.chars().collect();
                let sc: Vec<char> = s.chars().collect();
                glob_match(&pat, &sc)
            }
            _ => true,
        }
    }
}

fn glob_match(pat: &[char], s: &[char]) -> bool {
    match pat.first() {
        None => s.is_empty(),
        Some('*') => (0..=s.len()).any(|i| glob_match(&pat[1..], &s[i..])),
        Some('?') => !s.is_empty() && glob_match(&pat[1..], &s[1..]),
        Some('[') => {
            let Some(&c) = s.first() else { return false };
            match match_set(&pat[1..], c) {
                Some((hit, used)) => hit && glob_match(&pat[1 + used..], &s[1..]),
                // unterminated set, treat '[' as a literal
                None => c == '[' && glob_match(&pat[1..], &s[1..]),
            }
        }
        Some(&c) => s.first() == Some(&c) && glob_match(&pat[1..], &s[1..]),
    }
}

/// Match `c` against a bracket set body (after the `[`). Returns the
/// outcome and the number of pattern chars consumed including `]`.
fn match_set(pat: &[char], c: char) -> Option<(bool, usize)> {
    let mut i = 0;
    let negate = pat.first() == Some(&'!');
    if negate {
        i = 1;
    }
    let mut matched = false;
    let mut first = true;
    loop {
        let pc = *pat.get(i)?;
        if pc == ']' && !first {
            i += 1;
            break;
        }
        first = false;
        if pat.get(i + 1) == Some(&'-') && pat.get(i + 2).is_some_and(|&e| e != ']') {
            let hi = *pat.get(i + 2)?;
            if pc <= c && c <= hi {
                matched = true;
            }
            i += 3;
        } else {
            if pc == c {
                matched = true;
            }
            i += 1;
        }
    }
    Some((matched != negate, i))
}

/// Render a value as a string for matching, if it has a string form.
fn stringify(pool: &Pool, dirpool: &DirPool, value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.clone()),
        Value::Id(id) => Some(pool.dep2str(*id)),
        Value::DirStr(did, name) => Some(dir_to_string(pool, dirpool, *did, Some(name))),
        _ => None,
    }
}

pub(crate) fn dir_to_string(pool: &Pool, dirpool: &DirPool, mut did: Id, suffix: Option<&str>) -> String {
    let mut parts = Vec::new();
    while did > 1 && dirpool.contains(did) {
        parts.push(pool.id2str(dirpool.comp(did)).to_string());
        did = dirpool.parent(did);
    }
    let rooted = did == 1;
    parts.reverse();
    let mut out = parts.join("/");
    if rooted {
        out.insert(0, '/');
    }
    if let Some(sfx) = suffix {
        if !out.is_empty() && !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(sfx);
    }
    out
}

/// Skip over one encoded value of `key`, without paging anything in.
pub(crate) fn skip_value(
    keys: &[Repokey],
    schemata: &[Vec<Id>],
    key: &Repokey,
    cur: &mut Cursor,
) -> DataResult<()> {
    if key.storage == KeyStorage::VerticalOffset {
        cur.read_id(0)?;
        cur.read_id(0)?;
        return Ok(());
    }
    match key.ty {
        KeyType::Void | KeyType::Constant | KeyType::ConstantId | KeyType::Deleted => {}
        KeyType::Id | KeyType::Dir => {
            cur.read_id(0)?;
        }
        KeyType::Num => {
            cur.read_num64()?;
        }
        KeyType::U32 => {
            cur.skip_bytes(4)?;
        }
        KeyType::Str => {
            cur.read_str()?;
        }
        KeyType::Binary => {
            cur.read_blob()?;
        }
        KeyType::Md5 | KeyType::Sha1 | KeyType::Sha256 => {
            let n = key
                .ty
                .checksum_len()
                .ok_or(DecodeError::Corrupt("bad checksum type"))?;
            cur.skip_bytes(n)?;
        }
        KeyType::IdArray | KeyType::RelIdArray => loop {
            let (_, more) = cur.read_ideof(0)?;
            if !more {
                break;
            }
        },
        KeyType::DirNumNumArray => loop {
            cur.read_id(0)?;
            cur.read_id(0)?;
            let (_, more) = cur.read_ideof(0)?;
            if !more {
                break;
            }
        },
        KeyType::DirStrArray => loop {
            let (_, more) = cur.read_ideof(0)?;
            cur.read_str()?;
            if !more {
                break;
            }
        },
        KeyType::FixArray => {
            let n = cur.read_id(0)?;
            if n > 0 {
                let sid = cur.read_id(schemata.len() as u32)?;
                for _ in 0..n {
                    skip_record(keys, schemata, sid, cur)?;
                }
            }
        }
        KeyType::FlexArray => {
            let n = cur.read_id(0)?;
            for _ in 0..n {
                let sid = cur.read_id(schemata.len() as u32)?;
                skip_record(keys, schemata, sid, cur)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn skip_record(
    keys: &[Repokey],
    schemata: &[Vec<Id>],
    schema: Id,
    cur: &mut Cursor,
) -> DataResult<()> {
    for &kid in &schemata[schema as usize] {
        skip_value(keys, schemata, &keys[kid as usize], cur)?;
    }
    Ok(())
}

struct Walker<'a, F> {
    keys: &'a [Repokey],
    schemata: &'a [Vec<Id>],
    vincore: &'a [u8],
    store: &'a mut Option<Pagestore>,
    pool: &'a Pool,
    dirpool: &'a DirPool,
    keyname: Id,
    flags: u32,
    matcher: Option<&'a Datamatcher>,
    cb: &'a mut F,
}

impl<F> Walker<'_, F>
where
    F: FnMut(&Repokey, &KeyValue) -> SearchAction,
{
    fn emit(&mut self, key: &Repokey, kv: &KeyValue) -> SearchAction {
        if let Some(m) = self.matcher {
            match stringify(self.pool, self.dirpool, &kv.value) {
                Some(s) if m.matches(&s) => {}
                _ => return SearchAction::Continue,
            }
        }
        (self.cb)(key, kv)
    }

    fn emit_scalar(&mut self, key: &Repokey, value: Value) -> bool {
        let kv = KeyValue {
            value,
            entry: 0,
            eof: Eof::Last,
        };
        self.emit(key, &kv) != SearchAction::Stop
    }

    fn emit_elem(&mut self, key: &Repokey, value: Value, entry: u32, n: u32) -> bool {
        let kv = KeyValue {
            value,
            entry,
            eof: if entry + 1 == n { Eof::Last } else { Eof::More },
        };
        self.emit(key, &kv) != SearchAction::Stop
    }

    /// Walk the values of one record. Returns false once the callback
    /// asked to stop.
    fn walk_keys(&mut self, schema: Id, cur: &mut Cursor) -> DataResult<bool> {
        let keys = self.keys;
        let schemata = self.schemata;
        for &kid in &schemata[schema as usize] {
            let key = &keys[kid as usize];
            let wanted = self.keyname == 0 || key.name == self.keyname;
            match key.ty {
                KeyType::Deleted => {}
                KeyType::FixArray | KeyType::FlexArray => {
                    if key.storage == KeyStorage::VerticalOffset {
                        return Err(DecodeError::Corrupt("vertical array container").into());
                    }
                    let descend = self.flags & searchflags::SUB != 0;
                    if !wanted && !descend {
                        skip_value(keys, schemata, key, cur)?;
                    } else if !self.walk_container(key, cur, wanted, descend)? {
                        return Ok(false);
                    }
                }
                _ => {
                    if key.storage == KeyStorage::VerticalOffset {
                        let off = u64::from(cur.read_id(0)?);
                        let len = cur.read_id(0)? as usize;
                        if !wanted {
                            continue;
                        }
                        let vbuf = crate::fetch_vertical(self.store, self.vincore, off, len)?;
                        let mut vcur = Cursor::new(&vbuf);
                        if !self.emit_value(key, &mut vcur)? {
                            return Ok(false);
                        }
                    } else if !wanted {
                        skip_value(keys, schemata, key, cur)?;
                    } else if !self.emit_value(key, cur)? {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    fn walk_container(
        &mut self,
        key: &Repokey,
        cur: &mut Cursor,
        wanted: bool,
        descend: bool,
    ) -> DataResult<bool> {
        let schemata = self.schemata;
        let nschemata = schemata.len() as u32;
        let n = cur.read_id(0)?;
        let fixed_schema = if key.ty == KeyType::FixArray && n > 0 {
            Some(cur.read_id(nschemata)?)
        } else {
            None
        };
        if !descend {
            if wanted {
                let kv = KeyValue {
                    value: Value::Array(n),
                    entry: 0,
                    eof: Eof::Last,
                };
                if self.emit(key, &kv) == SearchAction::Stop {
                    return Ok(false);
                }
            }
            for _ in 0..n {
                let sid = match fixed_schema {
                    Some(s) => s,
                    None => cur.read_id(nschemata)?,
                };
                skip_record(self.keys, schemata, sid, cur)?;
            }
            return Ok(true);
        }
        for i in 0..n {
            let sid = match fixed_schema {
                Some(s) => s,
                None => cur.read_id(nschemata)?,
            };
            if wanted {
                let kv = KeyValue {
                    value: Value::Array(n),
                    entry: i,
                    eof: if i + 1 == n { Eof::Last } else { Eof::More },
                };
                if self.emit(key, &kv) == SearchAction::Stop {
                    return Ok(false);
                }
            }
            if !self.walk_keys(sid, cur)? {
                return Ok(false);
            }
        }
        if wanted && n > 0 && self.flags & searchflags::ARRAYSENTINEL != 0 {
            let kv = KeyValue {
                value: Value::Array(n),
                entry: n,
                eof: Eof::Sentinel,
            };
            if self.emit(key, &kv) == SearchAction::Stop {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn emit_value(&mut self, key: &Repokey, cur: &mut Cursor) -> DataResult<bool> {
        let ok = match key.ty {
            KeyType::Void => self.emit_scalar(key, Value::Void),
            KeyType::Constant => self.emit_scalar(key, Value::Num(u64::from(key.size))),
            KeyType::ConstantId => self.emit_scalar(key, Value::Id(key.size)),
            KeyType::Id => {
                let id = cur.read_id(0)?;
                self.emit_scalar(key, Value::Id(id))
            }
            KeyType::Dir => {
                let did = cur.read_id(0)?;
                self.emit_scalar(key, Value::Dir(did))
            }
            KeyType::Num => {
                let v = cur.read_num64()?;
                self.emit_scalar(key, Value::Num(v))
            }
            KeyType::U32 => {
                let v = cur.read_u32be()?;
                self.emit_scalar(key, Value::Num(u64::from(v)))
            }
            KeyType::Str => {
                let s = cur.read_str()?.to_string();
                self.emit_scalar(key, Value::Str(s))
            }
            KeyType::Binary => {
                let b = cur.read_blob()?.to_vec();
                self.emit_scalar(key, Value::Binary(b))
            }
            KeyType::Md5 | KeyType::Sha1 | KeyType::Sha256 => {
                let n = key
                    .ty
                    .checksum_len()
                    .ok_or(DecodeError::Corrupt("bad checksum type"))?;
                let b = cur.read_bytes(n)?.to_vec();
                self.emit_scalar(key, Value::Checksum(key.ty, b))
            }
            KeyType::IdArray => {
                let ids = cur.read_idarray(0)?;
                let n = ids.len() as u32;
                let mut ok = true;
                for (i, id) in ids.into_iter().enumerate() {
                    if !self.emit_elem(key, Value::Id(id), i as u32, n) {
                        ok = false;
                        break;
                    }
                }
                ok
            }
            KeyType::RelIdArray => {
                let marker = marker_for_keyname(key.name);
                let ids = cur.read_rel_idarray(0, marker)?;
                let n = ids.len() as u32;
                let mut ok = true;
                for (i, id) in ids.into_iter().enumerate() {
                    if !self.emit_elem(key, Value::Id(id), i as u32, n) {
                        ok = false;
                        break;
                    }
                }
                ok
            }
            KeyType::DirNumNumArray => {
                let mut elems = Vec::new();
                loop {
                    let did = cur.read_id(0)?;
                    let num = cur.read_id(0)?;
                    let (num2, more) = cur.read_ideof(0)?;
                    elems.push((did, num, num2));
                    if !more {
                        break;
                    }
                }
                let n = elems.len() as u32;
                let mut ok = true;
                for (i, (did, num, num2)) in elems.into_iter().enumerate() {
                    if !self.emit_elem(key, Value::DirNumNum(did, num, num2), i as u32, n) {
                        ok = false;
                        break;
                    }
                }
                ok
            }
            KeyType::DirStrArray => {
                let mut elems = Vec::new();
                loop {
                    let (did, more) = cur.read_ideof(0)?;
                    let s = cur.read_str()?.to_string();
                    elems.push((did, s));
                    if !more {
                        break;
                    }
                }
                let n = elems.len() as u32;
                let mut ok = true;
                for (i, (did, s)) in elems.into_iter().enumerate() {
                    if !self.emit_elem(key, Value::DirStr(did, s), i as u32, n) {
                        ok = false;
                        break;
                    }
                }
                ok
            }
            KeyType::FixArray | KeyType::FlexArray | KeyType::Deleted => {
                return Err(DecodeError::Corrupt("container type in scalar path").into())
            }
        };
        Ok(ok)
    }
}

impl Repodata {
    /// Schema id and value offset of an entity's record, if it has
    /// internalized data.
    fn entity_data(&self, entity: EntityId) -> Option<(Id, usize)> {
        match entity {
            EntityId::Meta => {
                if self.incoredata.is_empty() {
                    return None;
                }
                Some((self.mainschema, self.meta_offset))
            }
            EntityId::Solvable(i) => {
                let off = *self.incoreoffset.get(i as usize)?;
                let mut cur = Cursor::new(&self.incoredata);
                cur.skip_bytes(off).ok()?;
                let schema = cur.read_id(self.schemata.len() as u32).ok()?;
                Some((schema, cur.pos()))
            }
            EntityId::Handle(_) => None,
        }
    }

    /// Walk all values of one entity, invoking `cb` for each decoded
    /// value. `keyname` 0 visits every key. Returns false if the
    /// callback stopped the walk.
    pub fn search<F>(
        &mut self,
        pool: &Pool,
        entity: EntityId,
        keyname: Id,
        flags: u32,
        matcher: Option<&Datamatcher>,
        mut cb: F,
    ) -> DataResult<bool>
    where
        F: FnMut(&Repokey, &KeyValue) -> SearchAction,
    {
        let Some((schema, pos)) = self.entity_data(entity) else {
            return Ok(true);
        };
        let mut cur = Cursor::new(&self.incoredata);
        cur.skip_bytes(pos)?;
        let mut walker = Walker {
            keys: &self.keys,
            schemata: &self.schemata,
            vincore: &self.vincore,
            store: &mut self.store,
            pool,
            dirpool: &self.dirpool,
            keyname,
            flags,
            matcher,
            cb: &mut cb,
        };
        walker.walk_keys(schema, &mut cur)
    }

    /// Search the meta record and every solvable in turn.
    pub fn search_all<F>(
        &mut self,
        pool: &Pool,
        keyname: Id,
        flags: u32,
        matcher: Option<&Datamatcher>,
        mut cb: F,
    ) -> DataResult<bool>
    where
        F: FnMut(EntityId, &Repokey, &KeyValue) -> SearchAction,
    {
        // flags without SUB on the meta record would re-visit every
        // solvable through the solvables array, so the meta walk never
        // descends
        let meta_flags = flags & !searchflags::SUB;
        if !self.search(pool, EntityId::Meta, keyname, meta_flags, matcher, |k, kv| {
            cb(EntityId::Meta, k, kv)
        })? {
            return Ok(false);
        }
        for i in 0..self.nsolvables {
            let e = EntityId::Solvable(i);
            if !self.search(pool, e, keyname, flags, matcher, |k, kv| cb(e, k, kv))? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Key id and value offset for `keyname` on `entity`, skipping over
    /// preceding values. Deleted keys are invisible.
    fn find_value_pos(&self, entity: EntityId, keyname: Id) -> Option<(Id, usize)> {
        let (schema, base) = self.entity_data(entity)?;
        if entity == EntityId::Meta {
            for (i, &kid) in self.schemata[schema as usize].iter().enumerate() {
                let key = &self.keys[kid as usize];
                if key.name == keyname {
                    if key.ty == KeyType::Deleted {
                        return None;
                    }
                    return Some((kid, *self.mainschemaoffsets.get(i)?));
                }
            }
            return None;
        }
        let mut cur = Cursor::new(&self.incoredata);
        cur.skip_bytes(base).ok()?;
        for &kid in &self.schemata[schema as usize] {
            let key = &self.keys[kid as usize];
            if key.name == keyname {
                if key.ty == KeyType::Deleted {
                    return None;
                }
                return Some((kid, cur.pos()));
            }
            skip_value(&self.keys, &self.schemata, key, &mut cur).ok()?;
        }
        None
    }

    /// Fetch the raw value bytes of a vertical key, or borrowable
    /// incore position for the rest. Helper for the typed lookups.
    fn value_cursor(&self, pos: usize) -> Option<Cursor<'_>> {
        let mut cur = Cursor::new(&self.incoredata);
        cur.skip_bytes(pos).ok()?;
        Some(cur)
    }

    #[must_use]
    pub fn lookup_type(&self, entity: EntityId, keyname: Id) -> Option<KeyType> {
        let (kid, _) = self.find_value_pos(entity, keyname)?;
        Some(self.keys[kid as usize].ty)
    }

    #[must_use]
    pub fn lookup_void(&self, entity: EntityId, keyname: Id) -> bool {
        self.lookup_type(entity, keyname) == Some(KeyType::Void)
    }

    #[must_use]
    pub fn lookup_id(&self, entity: EntityId, keyname: Id) -> Option<Id> {
        let (kid, pos) = self.find_value_pos(entity, keyname)?;
        let key = &self.keys[kid as usize];
        match key.ty {
            KeyType::ConstantId => Some(key.size),
            KeyType::Id => self.value_cursor(pos)?.read_id(0).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn lookup_num(&self, entity: EntityId, keyname: Id) -> Option<u64> {
        let (kid, pos) = self.find_value_pos(entity, keyname)?;
        let key = &self.keys[kid as usize];
        match key.ty {
            KeyType::Constant => Some(u64::from(key.size)),
            KeyType::Num => self.value_cursor(pos)?.read_num64().ok(),
            KeyType::U32 => self.value_cursor(pos)?.read_u32be().ok().map(u64::from),
            _ => None,
        }
    }

    /// String lookup; resolves id-valued keys through the pool and
    /// pages in vertical values.
    pub fn lookup_str(&mut self, pool: &Pool, entity: EntityId, keyname: Id) -> Option<String> {
        let (kid, pos) = self.find_value_pos(entity, keyname)?;
        let key = self.keys[kid as usize].clone();
        match key.ty {
            KeyType::ConstantId => Some(pool.id2str(key.size).to_string()),
            KeyType::Id => {
                let id = self.value_cursor(pos)?.read_id(0).ok()?;
                Some(pool.id2str(id).to_string())
            }
            KeyType::Str => {
                let buf = self.plain_or_vertical(&key, pos)?;
                Cursor::new(&buf).read_str().ok().map(str::to_string)
            }
            _ => None,
        }
    }

    pub fn lookup_binary(&mut self, entity: EntityId, keyname: Id) -> Option<Vec<u8>> {
        let (kid, pos) = self.find_value_pos(entity, keyname)?;
        let key = self.keys[kid as usize].clone();
        if key.ty != KeyType::Binary {
            return None;
        }
        let buf = self.plain_or_vertical(&key, pos)?;
        Cursor::new(&buf).read_blob().ok().map(<[u8]>::to_vec)
    }

    pub fn lookup_checksum(&mut self, entity: EntityId, keyname: Id) -> Option<(KeyType, Vec<u8>)> {
        let (kid, pos) = self.find_value_pos(entity, keyname)?;
        let key = self.keys[kid as usize].clone();
        let n = key.ty.checksum_len()?;
        let buf = self.plain_or_vertical(&key, pos)?;
        let sum = Cursor::new(&buf).read_bytes(n).ok()?.to_vec();
        Some((key.ty, sum))
    }

    pub fn lookup_checksum_hex(&mut self, entity: EntityId, keyname: Id) -> Option<(KeyType, String)> {
        let (ty, sum) = self.lookup_checksum(entity, keyname)?;
        let mut hex = String::with_capacity(sum.len() * 2);
        for b in sum {
            hex.push_str(&format!("{b:02x}"));
        }
        Some((ty, hex))
    }

    /// Id array lookup. Dependency arrays come back with their markers
    /// in place.
    pub fn lookup_idarray(&mut self, entity: EntityId, keyname: Id) -> Option<Vec<Id>> {
        let (kid, pos) = self.find_value_pos(entity, keyname)?;
        let key = self.keys[kid as usize].clone();
        match key.ty {
            KeyType::IdArray => self.value_cursor(pos)?.read_idarray(0).ok(),
            KeyType::RelIdArray => {
                let marker = marker_for_keyname(key.name);
                self.value_cursor(pos)?.read_rel_idarray(0, marker).ok()
            }
            _ => None,
        }
    }

    /// For vertical keys, pull the value bytes out of the vertical
    /// store; otherwise copy the remaining incore tail. The cursor
    /// based parsers re-limit on their own.
    fn plain_or_vertical(&mut self, key: &Repokey, pos: usize) -> Option<Vec<u8>> {
        if key.storage == KeyStorage::VerticalOffset {
            let mut cur = self.value_cursor(pos)?;
            let off = u64::from(cur.read_id(0).ok()?);
            let len = cur.read_id(0).ok()? as usize;
            self.vertical_bytes(off, len).ok()
        } else {
            Some(self.incoredata.get(pos..)?.to_vec())
        }
    }

    /// Intern a path into the directory pool, creating missing
    /// components. A leading slash roots the path at the real root dir,
    /// otherwise it hangs off the virtual root.
    pub fn str2dir(&mut self, pool: &mut Pool, path: &str) -> Id {
        if path.is_empty() {
            return 0;
        }
        let mut p = path;
        while p.starts_with("//") {
            p = &p[1..];
        }
        if p == "/" {
            return self.dirpool.add_dir(0, 0);
        }
        let mut parent = 0;
        let mut first = true;
        for comp in p.split('/') {
            // empty components come from the leading slash (kept, it
            // becomes the root dir) or doubled slashes (dropped)
            if comp.is_empty() && !first {
                continue;
            }
            first = false;
            let cid = pool.str2id(comp);
            parent = self.dirpool.add_dir(parent, cid);
        }
        parent
    }

    #[must_use]
    pub fn dir2str(&self, pool: &Pool, did: Id, suffix: Option<&str>) -> String {
        dir_to_string(pool, &self.dirpool, did, suffix)
    }
}
