//! Solv file emission.
//!
//! Writing renumbers everything into dense file-local id spaces. A
//! first pass over the incore blob counts how often each string,
//! relation and directory is referenced; file ids are then handed out
//! by descending use count so the hottest ids get the shortest varints.
//! A second pass re-encodes all records against the new numbering,
//! splitting values of vertical keys into per-key side buffers that are
//! paged and compressed at the end of the file.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use byteorder::{BigEndian, WriteBytesExt};
use codec::{
    marker_for_keyname, push_id, push_idarray, push_ideof, push_num64, push_rel_idarray, Cursor,
    KeyType,
};
use pagestore::{compress_page, PAGESIZE};
use pool::{is_rel_id, knownid, make_rel_id, rel_index, Id, Pool};
use repodata::{KeyStorage, Repodata, Repokey};

use crate::format::{
    FLAG_PREFIX_POOL, FLAG_SIZE_BYTES, MAX_NESTING, MAX_PREFIX_COMMON, SOLV_MAGIC, SOLV_VERSION,
};
use crate::{SolvError, SolvResult};

/// Tuning knobs for [`write`].
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Key names whose values go to the page-compressed vertical area
    /// instead of the incore blob. Only applied to string, binary,
    /// checksum and dir-array keys; id-bearing values stay incore so
    /// they can be renumbered on read.
    pub vertical_keys: Vec<Id>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            vertical_keys: vec![
                knownid::SOLVABLE_DESCRIPTION,
                knownid::SOLVABLE_AUTHORS,
                knownid::SOLVABLE_FILELIST,
            ],
        }
    }
}

/// Serializes `data` as a solv file. Staged attributes are internalized
/// first, so the write always reflects the latest sets.
pub fn write<W: Write>(
    pool: &Pool,
    data: &mut Repodata,
    out: &mut W,
    opts: &WriteOptions,
) -> SolvResult<()> {
    data.internalize()?;
    let vmap = prefetch_vertical(data)?;
    let data = &*data;
    let nstrings = pool.strings.len() as usize;
    let mut w = Writer {
        pool,
        data,
        vertical_names: &opts.vertical_keys,
        vmap,
        needid: vec![NeedId::default(); nstrings + pool.nrels() as usize],
        reloff: nstrings,
        tkeys: vec![Repokey {
            name: 0,
            ty: KeyType::Void,
            size: 0,
            storage: KeyStorage::Incore,
        }],
        tkey_index: HashMap::new(),
        keymap: vec![0; data.nkeys() as usize],
        tschemas: vec![Vec::new()],
        tschema_index: HashMap::from([(Vec::new(), 0)]),
        schemamap: vec![0; data.nschemata() as usize],
        schemamapped: vec![false; data.nschemata() as usize],
        dirused: BTreeMap::new(),
        meta_kids: Vec::new(),
        tmainschema: 0,
        solv_src_kid: None,
        nsolv_file: 0,
        numid_file: 1,
        nrel_file: 0,
        sizeid: 0,
        strmap: vec![0],
        relmap: Vec::new(),
        direntries: Vec::new(),
        dirslot: HashMap::new(),
        extdata: Vec::new(),
        maxdata: 0,
    };
    w.count()?;
    w.assign();
    w.map_dirs();
    w.emit()?;
    w.flush(out)
}

#[derive(Debug, Clone, Copy, Default)]
struct NeedId {
    need: u32,
}

#[derive(Debug, Clone, Copy)]
enum DirEntry {
    /// A directory taking the next slot, named by its old dir id.
    Comp(Id),
    /// Block header: entries after it hang below the given slot.
    Header(u32),
}

struct Writer<'a> {
    pool: &'a Pool,
    data: &'a Repodata,
    vertical_names: &'a [Id],
    /// Incore position of a vertical (offset, length) pair -> payload.
    vmap: HashMap<usize, Vec<u8>>,

    /// Use counts, later file ids: strings first, relations at
    /// `reloff`. Relation slot 0 is the pool's reserved dummy.
    needid: Vec<NeedId>,
    reloff: usize,

    tkeys: Vec<Repokey>,
    tkey_index: HashMap<(Id, KeyType, u32, bool), Id>,
    /// Source key id -> target key id (0 = not yet seen).
    keymap: Vec<Id>,
    tschemas: Vec<Vec<Id>>,
    tschema_index: HashMap<Vec<Id>, Id>,
    schemamap: Vec<Id>,
    schemamapped: Vec<bool>,
    /// Old dir id -> 1 (used) or 2 (used as parent of a used dir).
    dirused: BTreeMap<Id, u8>,

    /// Target main schema keys, solvables array last.
    meta_kids: Vec<Id>,
    tmainschema: Id,
    solv_src_kid: Option<Id>,
    nsolv_file: u32,

    numid_file: u32,
    nrel_file: u32,
    sizeid: usize,
    /// File string id -> pool string id.
    strmap: Vec<Id>,
    /// File relation slot -> pool relation index.
    relmap: Vec<Id>,

    direntries: Vec<DirEntry>,
    /// Old dir id -> dir section slot.
    dirslot: HashMap<Id, u32>,

    /// Output buffers: `extdata[0]` incore, `extdata[k]` vertical data
    /// of target key `k`.
    extdata: Vec<Vec<u8>>,
    maxdata: usize,
}

/// Pages in every vertical value up front, keyed by the position of its
/// (offset, length) pair, so the later passes can run on `&Repodata`.
fn prefetch_vertical(data: &mut Repodata) -> SolvResult<HashMap<usize, Vec<u8>>> {
    let mut pairs = Vec::new();
    {
        let incore = data.incore_data();
        if incore.is_empty() {
            return Ok(HashMap::new());
        }
        let mut cur = Cursor::new(incore);
        let sid = cur.read_id(data.nschemata())?;
        scan_record(data, sid, &mut cur, 0, &mut pairs)?;
    }
    let mut vmap = HashMap::new();
    for (pos, off, len) in pairs {
        let bytes = data.vertical_bytes(off, len)?;
        vmap.insert(pos, bytes);
    }
    Ok(vmap)
}

fn scan_record(
    data: &Repodata,
    sid: Id,
    cur: &mut Cursor,
    depth: usize,
    pairs: &mut Vec<(usize, u64, usize)>,
) -> SolvResult<()> {
    if depth > MAX_NESTING {
        return Err(SolvError::Corrupt("record nesting too deep"));
    }
    for &kid in data.schema(sid) {
        scan_value(data, data.key(kid), cur, depth, pairs)?;
    }
    Ok(())
}

fn scan_value(
    data: &Repodata,
    key: &Repokey,
    cur: &mut Cursor,
    depth: usize,
    pairs: &mut Vec<(usize, u64, usize)>,
) -> SolvResult<()> {
    if key.storage == KeyStorage::VerticalOffset {
        let pos = cur.pos();
        let off = cur.read_id(0)?;
        let len = cur.read_id(0)?;
        pairs.push((pos, u64::from(off), len as usize));
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
            cur.read_bytes(4)?;
        }
        KeyType::Str => {
            cur.read_str()?;
        }
        KeyType::Binary => {
            cur.read_blob()?;
        }
        KeyType::Md5 | KeyType::Sha1 | KeyType::Sha256 => {
            cur.read_bytes(key.ty.checksum_len().unwrap_or(0))?;
        }
        KeyType::IdArray => {
            cur.read_idarray(0)?;
        }
        KeyType::RelIdArray => {
            cur.read_rel_idarray(0, marker_for_keyname(key.name))?;
        }
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
                let sid = cur.read_id(data.nschemata())?;
                for _ in 0..n {
                    scan_record(data, sid, cur, depth + 1, pairs)?;
                }
            }
        }
        KeyType::FlexArray => {
            let n = cur.read_id(0)?;
            for _ in 0..n {
                let sid = cur.read_id(data.nschemata())?;
                scan_record(data, sid, cur, depth + 1, pairs)?;
            }
        }
    }
    Ok(())
}

impl Writer<'_> {
    // pass 1: usage counting and target key/schema construction

    fn count(&mut self) -> SolvResult<()> {
        let data = self.data;
        let incore = data.incore_data();
        if incore.is_empty() {
            self.tmainschema = 0;
            return Ok(());
        }
        let mut cur = Cursor::new(incore);
        let main_sid = cur.read_id(data.nschemata())?;
        for kid in data.schema(main_sid).to_vec() {
            let key = data.key(kid).clone();
            if key.name == knownid::REPOSITORY_SOLVABLES && key.ty == KeyType::FlexArray {
                let n = cur.read_id(0)?;
                self.nsolv_file = n;
                for _ in 0..n {
                    let sid = cur.read_id(data.nschemata())?;
                    self.count_record(sid, &mut cur, 0)?;
                }
                self.solv_src_kid = Some(kid);
                continue;
            }
            let tk = self.ensure_tkey(kid);
            self.meta_kids.push(tk);
            self.count_value(kid, &mut cur, 0)?;
        }
        if !cur.is_empty() {
            return Err(SolvError::Corrupt("trailing incore data"));
        }
        if let Some(kid) = self.solv_src_kid {
            let tk = self.ensure_tkey(kid);
            self.meta_kids.push(tk);
        }
        let meta = self.meta_kids.clone();
        self.tmainschema = self.intern_tschema(meta);

        // the key section itself references names, type names and
        // constantid values
        for i in 1..self.tkeys.len() {
            let k = self.tkeys[i].clone();
            self.incr_str(k.name);
            self.incr_str(k.ty.name_id());
            if k.ty == KeyType::ConstantId {
                self.incr_dep(k.size);
            }
        }

        // dir components of every used dir, ancestors included
        if !self.dirused.is_empty() {
            self.dirused.entry(1).or_insert(1);
            let dirs: Vec<Id> = self.dirused.keys().copied().collect();
            for d in dirs {
                if d < 2 {
                    continue;
                }
                let comp = self.data.dirpool.comp(d);
                self.incr_str(comp);
            }
        }
        Ok(())
    }

    fn count_record(&mut self, sid: Id, cur: &mut Cursor, depth: usize) -> SolvResult<Id> {
        if depth > MAX_NESTING {
            return Err(SolvError::Corrupt("record nesting too deep"));
        }
        let tsid = self.ensure_tschema(sid);
        for kid in self.data.schema(sid).to_vec() {
            self.count_value(kid, cur, depth)?;
        }
        Ok(tsid)
    }

    fn count_value(&mut self, kid: Id, cur: &mut Cursor, depth: usize) -> SolvResult<()> {
        let key = self.data.key(kid).clone();
        self.ensure_tkey(kid);
        if key.storage == KeyStorage::VerticalOffset {
            let pos = cur.pos();
            cur.read_id(0)?;
            cur.read_id(0)?;
            let payload = self
                .vmap
                .get(&pos)
                .cloned()
                .ok_or(SolvError::Corrupt("missing vertical payload"))?;
            let mut vcur = Cursor::new(&payload);
            return self.count_payload(&key, &mut vcur, depth);
        }
        self.count_payload(&key, cur, depth)
    }

    fn count_payload(&mut self, key: &Repokey, cur: &mut Cursor, depth: usize) -> SolvResult<()> {
        match key.ty {
            KeyType::Void | KeyType::Constant | KeyType::ConstantId | KeyType::Deleted => {}
            KeyType::Id => {
                let v = cur.read_id(0)?;
                self.incr_dep(v);
            }
            KeyType::Dir => {
                let d = cur.read_id(0)?;
                self.mark_dir(d);
            }
            KeyType::Num => {
                cur.read_num64()?;
            }
            KeyType::U32 => {
                cur.read_bytes(4)?;
            }
            KeyType::Str => {
                cur.read_str()?;
            }
            KeyType::Binary => {
                cur.read_blob()?;
            }
            KeyType::Md5 | KeyType::Sha1 | KeyType::Sha256 => {
                cur.read_bytes(key.ty.checksum_len().unwrap_or(0))?;
            }
            KeyType::IdArray => {
                for v in cur.read_idarray(0)? {
                    self.incr_dep(v);
                }
            }
            KeyType::RelIdArray => {
                let marker = marker_for_keyname(key.name);
                for v in cur.read_rel_idarray(0, marker)? {
                    if v != marker {
                        self.incr_dep(v);
                    }
                }
            }
            KeyType::DirNumNumArray => loop {
                let d = cur.read_id(0)?;
                cur.read_id(0)?;
                let (_, more) = cur.read_ideof(0)?;
                self.mark_dir(d);
                if !more {
                    break;
                }
            },
            KeyType::DirStrArray => loop {
                let (d, more) = cur.read_ideof(0)?;
                cur.read_str()?;
                self.mark_dir(d);
                if !more {
                    break;
                }
            },
            KeyType::FixArray => {
                let n = cur.read_id(0)?;
                if n > 0 {
                    let sid = cur.read_id(self.data.nschemata())?;
                    for _ in 0..n {
                        self.count_record(sid, cur, depth + 1)?;
                    }
                }
            }
            KeyType::FlexArray => {
                let n = cur.read_id(0)?;
                for _ in 0..n {
                    let sid = cur.read_id(self.data.nschemata())?;
                    self.count_record(sid, cur, depth + 1)?;
                }
            }
        }
        Ok(())
    }

    fn ensure_tkey(&mut self, kid: Id) -> Id {
        if self.keymap[kid as usize] != 0 {
            return self.keymap[kid as usize];
        }
        let src = self.data.key(kid).clone();
        let vertical = self.vertical_names.contains(&src.name)
            && matches!(
                src.ty,
                KeyType::Str
                    | KeyType::Binary
                    | KeyType::Md5
                    | KeyType::Sha1
                    | KeyType::Sha256
                    | KeyType::DirStrArray
                    | KeyType::DirNumNumArray
            );
        let size = match src.ty {
            KeyType::Constant | KeyType::ConstantId => src.size,
            _ => 0,
        };
        let sig = (src.name, src.ty, size, vertical);
        let t = match self.tkey_index.get(&sig) {
            Some(&t) => t,
            None => {
                let t = self.tkeys.len() as Id;
                self.tkeys.push(Repokey {
                    name: src.name,
                    ty: src.ty,
                    size,
                    storage: if vertical {
                        KeyStorage::VerticalOffset
                    } else {
                        KeyStorage::Incore
                    },
                });
                self.tkey_index.insert(sig, t);
                t
            }
        };
        self.keymap[kid as usize] = t;
        t
    }

    fn ensure_tschema(&mut self, sid: Id) -> Id {
        if self.schemamapped[sid as usize] {
            return self.schemamap[sid as usize];
        }
        let mut tkids = Vec::new();
        for kid in self.data.schema(sid).to_vec() {
            tkids.push(self.ensure_tkey(kid));
        }
        let t = self.intern_tschema(tkids);
        self.schemamap[sid as usize] = t;
        self.schemamapped[sid as usize] = true;
        t
    }

    fn intern_tschema(&mut self, kids: Vec<Id>) -> Id {
        if let Some(&t) = self.tschema_index.get(&kids) {
            return t;
        }
        let t = self.tschemas.len() as Id;
        self.tschemas.push(kids.clone());
        self.tschema_index.insert(kids, t);
        t
    }

    fn incr_str(&mut self, id: Id) {
        if id != 0 {
            self.needid[id as usize].need += 1;
        }
    }

    /// Counts a dependency id, descending into relation operands so
    /// every operand outlives its relation in the need ordering.
    fn incr_dep(&mut self, id: Id) {
        let mut id = id;
        while is_rel_id(id) {
            self.needid[self.reloff + rel_index(id) as usize].need += 1;
            let rd = *self.pool.rel(id);
            if is_rel_id(rd.evr) {
                self.incr_dep(rd.evr);
            } else {
                self.incr_str(rd.evr);
            }
            id = rd.name;
        }
        self.incr_str(id);
    }

    fn mark_dir(&mut self, d: Id) {
        if d == 0 || self.dirused.contains_key(&d) {
            return;
        }
        self.dirused.insert(d, 1);
        let mut p = self.data.dirpool.parent(d);
        while p != 0 {
            match self.dirused.insert(p, 2) {
                Some(2) => return,
                Some(_) => return,
                None => {}
            }
            p = self.data.dirpool.parent(p);
        }
        self.dirused.insert(0, 2);
    }

    // id assignment: most used first, shortest varints

    fn assign(&mut self) {
        let mut order: Vec<Id> = (1..self.pool.strings.len())
            .filter(|&i| self.needid[i as usize].need > 0)
            .collect();
        order.sort_by(|&a, &b| {
            let na = self.needid[a as usize].need;
            let nb = self.needid[b as usize].need;
            nb.cmp(&na)
                .then_with(|| self.pool.id2str(a).cmp(self.pool.id2str(b)))
        });
        self.sizeid = 0;
        for &old in &order {
            self.sizeid += self.pool.id2str(old).len() + 1;
            self.strmap.push(old);
        }
        self.numid_file = self.strmap.len() as u32;
        for (newid, &old) in self.strmap.iter().enumerate().skip(1) {
            self.needid[old as usize].need = newid as u32;
        }

        let mut rorder: Vec<Id> = (1..self.pool.nrels())
            .filter(|&i| self.needid[self.reloff + i as usize].need > 0)
            .collect();
        rorder.sort_by(|&a, &b| {
            let na = self.needid[self.reloff + a as usize].need;
            let nb = self.needid[self.reloff + b as usize].need;
            nb.cmp(&na).then_with(|| a.cmp(&b))
        });
        self.nrel_file = rorder.len() as u32;
        for (slot, &old) in rorder.iter().enumerate() {
            self.needid[self.reloff + old as usize].need = self.numid_file + slot as u32;
        }
        self.relmap = rorder;
    }

    fn ref_of(&self, id: Id) -> Id {
        if is_rel_id(id) {
            self.needid[self.reloff + rel_index(id) as usize].need
        } else {
            self.needid[id as usize].need
        }
    }

    // dir section layout

    fn map_dirs(&mut self) {
        if self.dirused.is_empty() {
            return;
        }
        let mut children: BTreeMap<Id, Vec<Id>> = BTreeMap::new();
        for &d in self.dirused.keys() {
            if d >= 1 {
                children
                    .entry(self.data.dirpool.parent(d))
                    .or_default()
                    .push(d);
            }
        }
        self.direntries.push(DirEntry::Comp(0));
        let top = children.get(&0).cloned().unwrap_or_default();
        self.dir_block(&children, &top);
    }

    /// Lays out one block of sibling dirs, then a header + sub-block for
    /// each sibling that parents another used dir. Slot 1 is always "/".
    fn dir_block(&mut self, children: &BTreeMap<Id, Vec<Id>>, block: &[Id]) {
        let start = self.direntries.len();
        if start == 1 {
            self.dirslot.insert(1, 1);
            self.direntries.push(DirEntry::Comp(1));
        }
        for &sib in block {
            if sib == 1 && start == 1 {
                continue;
            }
            self.dirslot.insert(sib, self.direntries.len() as u32);
            self.direntries.push(DirEntry::Comp(sib));
        }
        let end = self.direntries.len();
        for slot in start..end {
            let DirEntry::Comp(d) = self.direntries[slot] else {
                continue;
            };
            if self.dirused.get(&d) != Some(&2) {
                continue;
            }
            if let Some(kids) = children.get(&d) {
                let kids = kids.clone();
                self.direntries.push(DirEntry::Header(slot as u32));
                self.dir_block(children, &kids);
            }
        }
    }

    // pass 2: re-encode everything against the file numbering

    fn emit(&mut self) -> SolvResult<()> {
        self.extdata = vec![Vec::new(); self.tkeys.len()];
        let data = self.data;
        let mut xd0 = Vec::new();
        push_id(&mut xd0, self.tmainschema);
        let incore = data.incore_data();
        if !incore.is_empty() {
            let mut cur = Cursor::new(incore);
            let main_sid = cur.read_id(data.nschemata())?;
            let mut solvbuf: Option<Vec<u8>> = None;
            for kid in data.schema(main_sid).to_vec() {
                if Some(kid) == self.solv_src_kid {
                    let n = cur.read_id(0)?;
                    let mut sb = Vec::new();
                    push_id(&mut sb, n);
                    for _ in 0..n {
                        let sid = cur.read_id(data.nschemata())?;
                        let start = sb.len();
                        push_id(&mut sb, self.schemamap[sid as usize]);
                        self.emit_record_body(sid, &mut cur, 0, &mut sb)?;
                        self.maxdata = self.maxdata.max(sb.len() - start);
                    }
                    solvbuf = Some(sb);
                    continue;
                }
                self.emit_value(kid, &mut cur, 0, &mut xd0)?;
            }
            self.maxdata = self.maxdata.max(xd0.len());
            if let Some(sb) = solvbuf {
                xd0.extend_from_slice(&sb);
            }
        }
        self.extdata[0] = xd0;
        for i in 1..self.tkeys.len() {
            if self.tkeys[i].storage == KeyStorage::VerticalOffset {
                self.tkeys[i].size = self.extdata[i].len() as u32;
            }
        }
        Ok(())
    }

    fn emit_record_body(
        &mut self,
        sid: Id,
        cur: &mut Cursor,
        depth: usize,
        sink: &mut Vec<u8>,
    ) -> SolvResult<()> {
        if depth > MAX_NESTING {
            return Err(SolvError::Corrupt("record nesting too deep"));
        }
        for kid in self.data.schema(sid).to_vec() {
            self.emit_value(kid, cur, depth, sink)?;
        }
        Ok(())
    }

    fn emit_value(
        &mut self,
        kid: Id,
        cur: &mut Cursor,
        depth: usize,
        sink: &mut Vec<u8>,
    ) -> SolvResult<()> {
        let key = self.data.key(kid).clone();
        let tkid = self.keymap[kid as usize];
        if key.storage == KeyStorage::VerticalOffset {
            let pos = cur.pos();
            cur.read_id(0)?;
            cur.read_id(0)?;
            let payload = self
                .vmap
                .get(&pos)
                .cloned()
                .ok_or(SolvError::Corrupt("missing vertical payload"))?;
            let mut vcur = Cursor::new(&payload);
            return self.emit_reloc(&key, tkid, &mut vcur, depth, sink);
        }
        self.emit_reloc(&key, tkid, cur, depth, sink)
    }

    fn emit_reloc(
        &mut self,
        key: &Repokey,
        tkid: Id,
        cur: &mut Cursor,
        depth: usize,
        sink: &mut Vec<u8>,
    ) -> SolvResult<()> {
        if self.tkeys[tkid as usize].storage == KeyStorage::VerticalOffset {
            let mut xd = std::mem::take(&mut self.extdata[tkid as usize]);
            let vstart = xd.len() as u32;
            let r = self.emit_payload(key, cur, depth, &mut xd);
            let len = xd.len() as u32 - vstart;
            self.extdata[tkid as usize] = xd;
            r?;
            push_id(sink, vstart);
            push_id(sink, len);
            Ok(())
        } else {
            self.emit_payload(key, cur, depth, sink)
        }
    }

    fn emit_payload(
        &mut self,
        key: &Repokey,
        cur: &mut Cursor,
        depth: usize,
        sink: &mut Vec<u8>,
    ) -> SolvResult<()> {
        match key.ty {
            KeyType::Void | KeyType::Constant | KeyType::ConstantId | KeyType::Deleted => {}
            KeyType::Id => {
                let v = cur.read_id(0)?;
                push_id(sink, self.ref_of(v));
            }
            KeyType::Dir => {
                let d = cur.read_id(0)?;
                push_id(sink, self.slot_of(d)?);
            }
            KeyType::Num => push_num64(sink, cur.read_num64()?),
            KeyType::U32 => sink.extend_from_slice(cur.read_bytes(4)?),
            KeyType::Str => {
                let s = cur.read_str()?;
                sink.extend_from_slice(s.as_bytes());
                sink.push(0);
            }
            KeyType::Binary => {
                let blob = cur.read_blob()?;
                push_id(sink, blob.len() as u32);
                sink.extend_from_slice(blob);
            }
            KeyType::Md5 | KeyType::Sha1 | KeyType::Sha256 => {
                sink.extend_from_slice(cur.read_bytes(key.ty.checksum_len().unwrap_or(0))?);
            }
            KeyType::IdArray => {
                let vals = cur.read_idarray(0)?;
                let mapped: Vec<Id> = vals.iter().map(|&v| self.ref_of(v)).collect();
                push_idarray(sink, &mapped);
            }
            KeyType::RelIdArray => {
                // markers have no file id of their own, they are coded
                // as literal zeroes; a sentinel keeps their position
                let marker = marker_for_keyname(key.name);
                let vals = cur.read_rel_idarray(0, marker)?;
                let mapped: Vec<Id> = vals
                    .iter()
                    .map(|&v| {
                        if marker != 0 && v == marker {
                            u32::MAX
                        } else {
                            self.ref_of(v)
                        }
                    })
                    .collect();
                push_rel_idarray(sink, &mapped, if marker != 0 { u32::MAX } else { 0 });
            }
            KeyType::DirNumNumArray => loop {
                let d = cur.read_id(0)?;
                let n1 = cur.read_id(0)?;
                let (n2, more) = cur.read_ideof(0)?;
                push_id(sink, self.slot_of(d)?);
                push_id(sink, n1);
                push_ideof(sink, n2, more);
                if !more {
                    break;
                }
            },
            KeyType::DirStrArray => loop {
                let (d, more) = cur.read_ideof(0)?;
                let s = cur.read_str()?;
                push_ideof(sink, self.slot_of(d)?, more);
                sink.extend_from_slice(s.as_bytes());
                sink.push(0);
                if !more {
                    break;
                }
            },
            KeyType::FixArray => {
                let n = cur.read_id(0)?;
                push_id(sink, n);
                if n > 0 {
                    let sid = cur.read_id(self.data.nschemata())?;
                    push_id(sink, self.schemamap[sid as usize]);
                    for _ in 0..n {
                        self.emit_record_body(sid, cur, depth + 1, sink)?;
                    }
                }
            }
            KeyType::FlexArray => {
                let n = cur.read_id(0)?;
                push_id(sink, n);
                for _ in 0..n {
                    let sid = cur.read_id(self.data.nschemata())?;
                    push_id(sink, self.schemamap[sid as usize]);
                    self.emit_record_body(sid, cur, depth + 1, sink)?;
                }
            }
        }
        Ok(())
    }

    fn slot_of(&self, d: Id) -> SolvResult<u32> {
        if d == 0 {
            return Ok(0);
        }
        self.dirslot
            .get(&d)
            .copied()
            .ok_or(SolvError::Corrupt("unmapped directory"))
    }

    // final serialization

    fn flush<W: Write>(&mut self, out: &mut W) -> SolvResult<()> {
        out.write_u32::<BigEndian>(SOLV_MAGIC)?;
        out.write_u32::<BigEndian>(SOLV_VERSION)?;
        out.write_u32::<BigEndian>(self.numid_file)?;
        out.write_u32::<BigEndian>(self.nrel_file)?;
        out.write_u32::<BigEndian>(self.direntries.len() as u32)?;
        out.write_u32::<BigEndian>(self.nsolv_file)?;
        out.write_u32::<BigEndian>(self.tkeys.len() as u32)?;
        out.write_u32::<BigEndian>(self.tschemas.len() as u32)?;
        out.write_u32::<BigEndian>(FLAG_PREFIX_POOL | FLAG_SIZE_BYTES)?;

        // front-coded string pool
        let mut compsum = 0usize;
        let mut prev = "";
        let mut commons = Vec::with_capacity(self.strmap.len());
        for &old in &self.strmap[1..] {
            let s = self.pool.id2str(old);
            let same = prev
                .as_bytes()
                .iter()
                .zip(s.as_bytes())
                .take(MAX_PREFIX_COMMON)
                .take_while(|(a, b)| a == b)
                .count();
            commons.push(same);
            compsum += same;
            prev = s;
        }
        out.write_u32::<BigEndian>(self.sizeid as u32)?;
        let pfsize = self.sizeid + self.numid_file as usize - 1 - compsum;
        out.write_u32::<BigEndian>(pfsize as u32)?;
        for (i, &old) in self.strmap[1..].iter().enumerate() {
            let s = self.pool.id2str(old);
            out.write_all(&[commons[i] as u8])?;
            out.write_all(&s.as_bytes()[commons[i]..])?;
            out.write_all(&[0])?;
        }

        // relations, operands by file id
        for &idx in &self.relmap {
            let rd = *self.pool.rel(make_rel_id(idx));
            write_id(out, self.ref_of(rd.name))?;
            write_id(out, self.ref_of(rd.evr))?;
            out.write_all(&[rd.flags])?;
        }

        // dirs, root and "/" slots implicit
        if self.direntries.len() > 2 {
            for &e in &self.direntries[2..] {
                match e {
                    DirEntry::Comp(d) => {
                        let comp = self.data.dirpool.comp(d);
                        write_id(out, self.needid[comp as usize].need)?;
                    }
                    DirEntry::Header(slot) => write_id(out, self.numid_file + slot)?,
                }
            }
        }

        // keys
        for i in 1..self.tkeys.len() {
            let k = &self.tkeys[i];
            write_id(out, self.needid[k.name as usize].need)?;
            write_id(out, self.needid[k.ty.name_id() as usize].need)?;
            match k.storage {
                KeyStorage::VerticalOffset => write_id(out, self.extdata[i].len() as u32)?,
                _ if k.ty == KeyType::ConstantId => write_id(out, self.ref_of(k.size))?,
                _ => write_id(out, k.size)?,
            }
            write_id(out, k.storage.to_tag())?;
        }

        // schemata as one flat pool of ideof arrays
        let schemadatalen: usize = 1 + self.tschemas[1..]
            .iter()
            .map(|s| s.len() + 1)
            .sum::<usize>();
        write_id(out, schemadatalen as u32)?;
        let mut buf = Vec::new();
        for s in &self.tschemas[1..] {
            buf.clear();
            push_idarray(&mut buf, s);
            out.write_all(&buf)?;
        }

        // incore data
        write_id(out, self.maxdata as u32)?;
        write_id(out, self.extdata[0].len() as u32)?;
        out.write_all(&self.extdata[0])?;

        // vertical data, paged and compressed
        if self.extdata[1..].iter().any(|x| !x.is_empty()) {
            out.write_u32::<BigEndian>(PAGESIZE as u32)?;
            let mut page = Vec::with_capacity(PAGESIZE);
            for xd in &self.extdata[1..] {
                let mut rest = &xd[..];
                while !rest.is_empty() {
                    let room = PAGESIZE - page.len();
                    let take = room.min(rest.len());
                    page.extend_from_slice(&rest[..take]);
                    rest = &rest[take..];
                    if page.len() == PAGESIZE {
                        write_page(out, &page)?;
                        page.clear();
                    }
                }
            }
            if !page.is_empty() {
                write_page(out, &page)?;
            }
        }
        Ok(())
    }
}

fn write_id<W: Write>(out: &mut W, x: u32) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(5);
    push_id(&mut buf, x);
    out.write_all(&buf)
}

fn write_page<W: Write>(out: &mut W, page: &[u8]) -> std::io::Result<()> {
    let packed = compress_page(page);
    if packed.len() < page.len() {
        out.write_u32::<BigEndian>(packed.len() as u32 * 2 + 1)?;
        out.write_all(&packed)
    } else {
        out.write_u32::<BigEndian>(page.len() as u32 * 2)?;
        out.write_all(page)
    }
}
