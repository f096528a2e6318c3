//! Solv file parsing.
//!
//! The file carries its own dense id spaces for strings, relations and
//! directories. Reading is a renumbering exercise: every section is
//! interned into the caller's pool as it streams by, building `idmap`
//! and `dirmap` tables, and the incore blob is then re-encoded with all
//! embedded ids rewritten to pool ids. Vertical data never leaves the
//! file; only its page descriptors are recorded.

use std::fs::File;
use std::io::{BufReader, Read, Seek};

use byteorder::{BigEndian, ReadBytesExt};
use codec::{
    marker_for_keyname, push_id, push_idarray, push_ideof, push_num64, push_rel_idarray, Cursor,
    DecodeError, KeyType,
};
use pagestore::{Pagestore, PAGESIZE};
use pool::{knownid, Id, Pool};
use repodata::{KeyStorage, Repodata, Repokey};

use crate::format::{FLAG_PREFIX_POOL, MAX_NESTING, SOLV_MAGIC, SOLV_VERSION};
use crate::{SolvError, SolvResult};

/// Reads one solv file into a fresh [`Repodata`], interning all strings,
/// relations and directories into `pool`.
///
/// The file handle is kept by the result's pagestore when the file has
/// vertical data, so lookups can page it in later.
pub fn read(pool: &mut Pool, file: File) -> SolvResult<Repodata> {
    let mut r = Reader {
        f: BufReader::new(file),
        data: Repodata::new(),
        numid: 0,
        numrel: 0,
        numdir: 0,
        numsolv: 0,
        numkeys: 0,
        numschemata: 0,
        flags: 0,
        idmap: Vec::new(),
        dirmap: Vec::new(),
        filekeys: Vec::new(),
        keymap: Vec::new(),
        vbase: Vec::new(),
        blob_len: 0,
        fileschemas: Vec::new(),
        schemamap: Vec::new(),
        out: Vec::new(),
        incoreoffset: Vec::new(),
        mainschemaoffsets: Vec::new(),
    };
    r.run(pool)?;
    Ok(r.data)
}

struct Reader {
    f: BufReader<File>,
    data: Repodata,

    numid: u32,
    numrel: u32,
    numdir: u32,
    numsolv: u32,
    numkeys: u32,
    numschemata: u32,
    flags: u32,

    /// File string/rel id -> pool id (rel entries are tagged).
    idmap: Vec<Id>,
    /// File dir slot -> pool dir id (0 for block headers).
    dirmap: Vec<Id>,
    /// File key id -> key mapped into pool ids, index 0 unused.
    filekeys: Vec<Repokey>,
    /// File key id -> our registered key id.
    keymap: Vec<Id>,
    /// File key id -> start of that key's region in the vertical blob.
    vbase: Vec<u64>,
    blob_len: u64,
    /// File schema id -> file key id list.
    fileschemas: Vec<Vec<Id>>,
    /// File schema id -> our schema id.
    schemamap: Vec<Id>,

    out: Vec<u8>,
    incoreoffset: Vec<usize>,
    mainschemaoffsets: Vec<usize>,
}

impl Reader {
    fn run(&mut self, pool: &mut Pool) -> SolvResult<()> {
        if self.read_u32()? != SOLV_MAGIC {
            return Err(SolvError::NotThisFormat);
        }
        let version = self.read_u32()?;
        if version != SOLV_VERSION {
            return Err(SolvError::UnsupportedVersion(version));
        }
        self.numid = self.read_u32()?;
        self.numrel = self.read_u32()?;
        self.numdir = self.read_u32()?;
        self.numsolv = self.read_u32()?;
        self.numkeys = self.read_u32()?;
        self.numschemata = self.read_u32()?;
        self.flags = self.read_u32()?;
        if self.numid == 0 {
            return Err(SolvError::Corrupt("empty string section"));
        }
        if self.numkeys == 0 || self.numschemata == 0 {
            return Err(SolvError::Corrupt("empty key or schema section"));
        }

        self.read_strings(pool)?;
        self.read_rels(pool)?;
        self.read_dirs()?;
        self.read_keys()?;
        self.read_schemata()?;
        // the incore blob is buffered and recoded only after the page
        // table is known, since dir-bearing vertical values have to be
        // paged in and remapped right away
        let incore = self.read_incore_bytes()?;
        self.read_pages()?;
        self.recode_incore(&incore)?;
        Ok(())
    }

    // stream primitives, varints coded like codec::Cursor

    fn read_u8(&mut self) -> SolvResult<u8> {
        Ok(ReadBytesExt::read_u8(&mut self.f)?)
    }

    fn read_u32(&mut self) -> SolvResult<u32> {
        Ok(self.f.read_u32::<BigEndian>()?)
    }

    fn read_id(&mut self, max: u32) -> SolvResult<Id> {
        let mut x: u32 = 0;
        for n in 0.. {
            let c = self.read_u8()?;
            if n >= 5 {
                return Err(DecodeError::Corrupt("id encoding too long").into());
            }
            x = x
                .checked_mul(128)
                .ok_or(DecodeError::Corrupt("id overflows 32 bits"))?
                | u32::from(c & 0x7f);
            if c & 0x80 == 0 {
                break;
            }
        }
        if max > 0 && x >= max {
            return Err(DecodeError::IdOutOfRange { id: x, max }.into());
        }
        Ok(x)
    }

    fn read_ideof(&mut self, max: u32) -> SolvResult<(Id, bool)> {
        let mut x: u32 = 0;
        let mut n = 0;
        let c = loop {
            let c = self.read_u8()?;
            if c & 0x80 == 0 {
                break c;
            }
            if n >= 5 {
                return Err(DecodeError::Corrupt("id encoding too long").into());
            }
            x = x
                .checked_mul(128)
                .ok_or(DecodeError::Corrupt("id overflows 32 bits"))?
                | u32::from(c & 0x7f);
            n += 1;
        };
        let x = x
            .checked_mul(64)
            .ok_or(DecodeError::Corrupt("id overflows 32 bits"))?
            | u32::from(c & 0x3f);
        if max > 0 && x >= max {
            return Err(DecodeError::IdOutOfRange { id: x, max }.into());
        }
        Ok((x, c & 0x40 != 0))
    }

    // sections

    fn read_strings(&mut self, pool: &mut Pool) -> SolvResult<()> {
        let sizeid = self.read_u32()? as usize;
        self.idmap = vec![0; (self.numid + self.numrel) as usize];
        if self.flags & FLAG_PREFIX_POOL != 0 {
            let pfsize = self.read_u32()? as usize;
            let mut prefix = vec![0u8; pfsize];
            self.f.read_exact(&mut prefix)?;
            let mut p = 0;
            let mut prev: Vec<u8> = Vec::new();
            let mut total = 0;
            for i in 1..self.numid {
                let same = *prefix
                    .get(p)
                    .ok_or(SolvError::Corrupt("truncated prefix data"))?
                    as usize;
                p += 1;
                let nul = prefix[p..]
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(SolvError::Corrupt("unterminated prefix string"))?;
                if same > prev.len() {
                    return Err(SolvError::Corrupt("prefix exceeds previous string"));
                }
                let mut s = prev[..same].to_vec();
                s.extend_from_slice(&prefix[p..p + nul]);
                p += nul + 1;
                total += s.len() + 1;
                let st = std::str::from_utf8(&s)
                    .map_err(|_| SolvError::Corrupt("invalid utf-8 in string pool"))?;
                self.idmap[i as usize] = pool.str2id(st);
                prev = s;
            }
            if total != sizeid {
                return Err(SolvError::Corrupt("expanding strings size mismatch"));
            }
        } else {
            let mut buf = vec![0u8; sizeid];
            self.f.read_exact(&mut buf)?;
            let mut p = 0;
            for i in 1..self.numid {
                let nul = buf[p..]
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(SolvError::Corrupt("not enough strings"))?;
                let st = std::str::from_utf8(&buf[p..p + nul])
                    .map_err(|_| SolvError::Corrupt("invalid utf-8 in string pool"))?;
                self.idmap[i as usize] = pool.str2id(st);
                p += nul + 1;
            }
        }
        Ok(())
    }

    fn read_rels(&mut self, pool: &mut Pool) -> SolvResult<()> {
        // operands may only reference strings and earlier relations
        for i in 0..self.numrel {
            let name = self.read_id(self.numid + i)?;
            let evr = self.read_id(self.numid + i)?;
            let flags = self.read_u8()?;
            let name = self.idmap[name as usize];
            let evr = self.idmap[evr as usize];
            self.idmap[(self.numid + i) as usize] = pool.rel2id(name, evr, flags);
        }
        Ok(())
    }

    fn read_dirs(&mut self) -> SolvResult<()> {
        self.dirmap = vec![0; self.numdir.max(2) as usize];
        self.dirmap[1] = 1;
        // slot 0 is the virtual root, slot 1 is "/"; a value >= numid is
        // a block header selecting the parent for the entries after it
        let mut parent: Id = 0;
        for i in 2..self.numdir {
            let id = self.read_id(self.numid + i)?;
            if id >= self.numid {
                parent = self.dirmap[(id - self.numid) as usize];
            } else {
                let comp = self.idmap[id as usize];
                self.dirmap[i as usize] = self.data.dirpool.add_dir(parent, comp);
            }
        }
        Ok(())
    }

    fn read_keys(&mut self) -> SolvResult<()> {
        let null_key = Repokey {
            name: 0,
            ty: KeyType::Void,
            size: 0,
            storage: KeyStorage::Incore,
        };
        self.filekeys = vec![null_key];
        self.keymap = vec![0];
        self.vbase = vec![0; self.numkeys as usize];
        let mut vtotal: u64 = 0;
        for i in 1..self.numkeys {
            let name = self.read_id(self.numid)?;
            let name = self.idmap[name as usize];
            let tname = self.read_id(self.numid)?;
            let ty = KeyType::from_name_id(self.idmap[tname as usize])
                .ok_or(SolvError::Unsupported("unknown key type"))?;
            let size_max = if ty == KeyType::ConstantId {
                self.numid + self.numrel
            } else {
                0
            };
            let mut size = self.read_id(size_max)?;
            if ty == KeyType::ConstantId {
                size = self.idmap[size as usize];
            }
            let storage = KeyStorage::from_tag(self.read_id(0)?)
                .ok_or(SolvError::Unsupported("unknown storage class"))?;
            match storage {
                KeyStorage::Dropped => {
                    return Err(SolvError::Corrupt("dropped key in key section"))
                }
                KeyStorage::VerticalOffset => {
                    if matches!(
                        ty,
                        KeyType::Id | KeyType::IdArray | KeyType::RelIdArray
                            | KeyType::Dir | KeyType::FixArray | KeyType::FlexArray
                    ) {
                        return Err(SolvError::Unsupported("vertical id data"));
                    }
                    self.vbase[i as usize] = vtotal;
                    vtotal += u64::from(size);
                }
                KeyStorage::Incore => {}
            }
            let key = Repokey {
                name,
                ty,
                size,
                storage,
            };
            let kid = self.data.key2id(&key);
            self.filekeys.push(key);
            self.keymap.push(kid);
        }
        self.blob_len = vtotal;
        Ok(())
    }

    fn read_schemata(&mut self) -> SolvResult<()> {
        // total flat length, only written as a hint
        let _schemadatalen = self.read_id(0)?;
        self.fileschemas = vec![Vec::new()];
        self.schemamap = vec![0];
        for _ in 1..self.numschemata {
            let mut fkeys: Vec<Id> = Vec::new();
            loop {
                let (v, more) = self.read_ideof(self.numkeys)?;
                if v == 0 {
                    if fkeys.is_empty() && !more {
                        break;
                    }
                    return Err(SolvError::Corrupt("null key in schema"));
                }
                fkeys.push(v);
                if !more {
                    break;
                }
            }
            let kids: Vec<Id> = fkeys.iter().map(|&f| self.keymap[f as usize]).collect();
            let sid = self.data.schema2id(&kids);
            self.fileschemas.push(fkeys);
            self.schemamap.push(sid);
        }
        Ok(())
    }

    fn read_incore_bytes(&mut self) -> SolvResult<Vec<u8>> {
        let _maxdata = self.read_id(0)?;
        let allsize = self.read_id(0)? as usize;
        let mut buf = vec![0u8; allsize];
        self.f.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn recode_incore(&mut self, buf: &[u8]) -> SolvResult<()> {
        let mut cur = Cursor::new(buf);
        let fsid = cur.read_id(self.numschemata)?;
        push_id(&mut self.out, self.schemamap[fsid as usize]);
        let meta_offset = self.out.len();
        let mut helper = Recode {
            r: self,
            cur: &mut cur,
        };
        helper.record(fsid, 0, true)?;
        if !cur.is_empty() {
            return Err(SolvError::Corrupt("trailing incore data"));
        }
        if self.incoreoffset.len() != self.numsolv as usize {
            return Err(SolvError::Corrupt("wrong solvable count"));
        }
        let out = std::mem::take(&mut self.out);
        let offsets = std::mem::take(&mut self.incoreoffset);
        let schemaoffsets = std::mem::take(&mut self.mainschemaoffsets);
        self.data.install_incore(
            out,
            offsets,
            self.schemamap[fsid as usize],
            schemaoffsets,
            meta_offset,
            self.numsolv,
        );
        Ok(())
    }

    fn read_pages(&mut self) -> SolvResult<()> {
        if self.blob_len == 0 {
            return Ok(());
        }
        let pagesize = self.read_u32()? as usize;
        if pagesize != PAGESIZE {
            return Err(SolvError::Unsupported("unexpected page size"));
        }
        let mut store = Pagestore::new();
        let npages = self.blob_len.div_ceil(PAGESIZE as u64);
        for _ in 0..npages {
            let desc = self.read_u32()?;
            let size = desc >> 1;
            let compressed = desc & 1 != 0;
            if size as usize > PAGESIZE {
                return Err(SolvError::Corrupt("oversized page"));
            }
            let offset = self.f.stream_position()?;
            store.add_page(offset, size, compressed);
            self.f.seek_relative(i64::from(size))?;
        }
        if self.f.stream_position()? > self.f.get_ref().metadata()?.len() {
            return Err(SolvError::Corrupt("truncated page data"));
        }
        store.set_backing(self.f.get_ref().try_clone()?, self.blob_len);
        self.data.install_pagestore(store);
        Ok(())
    }
}

/// Re-encodes the incore blob record by record, rewriting file ids to
/// pool ids and vertical offsets from key-relative to absolute.
struct Recode<'a, 'b> {
    r: &'a mut Reader,
    cur: &'a mut Cursor<'b>,
}

impl Recode<'_, '_> {
    fn record(&mut self, fsid: Id, depth: usize, top: bool) -> SolvResult<()> {
        if depth > MAX_NESTING {
            return Err(SolvError::Corrupt("record nesting too deep"));
        }
        let fkeys = self.r.fileschemas[fsid as usize].clone();
        for fk in fkeys {
            let key = self.r.filekeys[fk as usize].clone();
            if top {
                self.r.mainschemaoffsets.push(self.r.out.len());
            }
            if key.storage == KeyStorage::VerticalOffset {
                self.vertical_ref(fk, &key)?;
            } else {
                self.value(&key, depth, top)?;
            }
        }
        Ok(())
    }

    fn vertical_ref(&mut self, fk: Id, key: &Repokey) -> SolvResult<()> {
        let off = self.cur.read_id(0)?;
        let len = self.cur.read_id(0)?;
        if u64::from(off) + u64::from(len) > u64::from(key.size) {
            return Err(SolvError::Corrupt("vertical offset out of range"));
        }
        let abs = self.r.vbase[fk as usize] + u64::from(off);
        if matches!(key.ty, KeyType::DirNumNumArray | KeyType::DirStrArray) {
            // dir slots inside the payload are file-local, so this one
            // cannot stay paged; remap it into the in-memory area now
            return self.remap_vertical_dirs(key, abs, len as usize);
        }
        let abs = u32::try_from(abs).map_err(|_| SolvError::Unsupported("huge vertical blob"))?;
        push_id(&mut self.r.out, abs);
        push_id(&mut self.r.out, len);
        Ok(())
    }

    fn remap_vertical_dirs(&mut self, key: &Repokey, off: u64, len: usize) -> SolvResult<()> {
        if len == 0 {
            push_id(&mut self.r.out, 0);
            push_id(&mut self.r.out, 0);
            return Ok(());
        }
        let payload = self.r.data.vertical_bytes(off, len)?;
        let mut vcur = Cursor::new(&payload);
        let mut fixed = Vec::with_capacity(len);
        let dmax = self.r.numdir.max(2);
        match key.ty {
            KeyType::DirNumNumArray => loop {
                let dir = vcur.read_id(dmax)?;
                let n1 = vcur.read_id(0)?;
                let (n2, more) = vcur.read_ideof(0)?;
                push_id(&mut fixed, self.r.dirmap[dir as usize]);
                push_id(&mut fixed, n1);
                push_ideof(&mut fixed, n2, more);
                if !more {
                    break;
                }
            },
            KeyType::DirStrArray => loop {
                let (dir, more) = vcur.read_ideof(dmax)?;
                let s = vcur.read_str()?;
                push_ideof(&mut fixed, self.r.dirmap[dir as usize], more);
                fixed.extend_from_slice(s.as_bytes());
                fixed.push(0);
                if !more {
                    break;
                }
            },
            _ => unreachable!(),
        }
        if !vcur.is_empty() {
            return Err(SolvError::Corrupt("trailing vertical data"));
        }
        let newlen = fixed.len() as u32;
        let newoff = self.r.data.append_vertical(&fixed);
        let newoff =
            u32::try_from(newoff).map_err(|_| SolvError::Unsupported("huge vertical blob"))?;
        push_id(&mut self.r.out, newoff);
        push_id(&mut self.r.out, newlen);
        Ok(())
    }

    fn value(&mut self, key: &Repokey, depth: usize, top: bool) -> SolvResult<()> {
        let nids = self.r.numid + self.r.numrel;
        let out = &mut self.r.out;
        match key.ty {
            KeyType::Void | KeyType::Constant | KeyType::ConstantId | KeyType::Deleted => {}
            KeyType::Id => {
                let v = self.cur.read_id(nids)?;
                push_id(out, self.r.idmap[v as usize]);
            }
            KeyType::Dir => {
                let v = self.cur.read_id(self.r.numdir.max(2))?;
                push_id(out, self.r.dirmap[v as usize]);
            }
            KeyType::Num => push_num64(out, self.cur.read_num64()?),
            KeyType::U32 => out.extend_from_slice(self.cur.read_bytes(4)?),
            KeyType::Str => {
                let s = self.cur.read_str()?;
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            KeyType::Binary => {
                let blob = self.cur.read_blob()?;
                push_id(out, blob.len() as u32);
                out.extend_from_slice(blob);
            }
            KeyType::Md5 | KeyType::Sha1 | KeyType::Sha256 => {
                let len = key.ty.checksum_len().unwrap_or(0);
                out.extend_from_slice(self.cur.read_bytes(len)?);
            }
            KeyType::IdArray => {
                let vals = self.cur.read_idarray(nids)?;
                let mapped: Vec<Id> = vals.iter().map(|&v| self.r.idmap[v as usize]).collect();
                push_idarray(out, &mapped);
            }
            KeyType::RelIdArray => {
                // delta-decode by hand so each summed id can be mapped
                // before the array is re-coded against pool numbering
                let marker = marker_for_keyname(key.name);
                let mut vals: Vec<Id> = Vec::new();
                let mut old: u32 = 0;
                let mut first = true;
                loop {
                    let (v, more) = self.cur.read_ideof(0)?;
                    if v == 0 {
                        if first && !more {
                            break;
                        }
                        if marker == 0 {
                            return Err(SolvError::Corrupt("marker in unmarked dep array"));
                        }
                        vals.push(marker);
                        old = 0;
                    } else {
                        old = old
                            .checked_add(v - 1)
                            .ok_or(DecodeError::Corrupt("dep delta overflows"))?;
                        if old >= nids {
                            return Err(SolvError::Corrupt("dep id out of range"));
                        }
                        vals.push(self.r.idmap[old as usize]);
                    }
                    first = false;
                    if !more {
                        break;
                    }
                }
                push_rel_idarray(out, &vals, marker);
            }
            KeyType::DirNumNumArray => loop {
                let dir = self.cur.read_id(self.r.numdir.max(2))?;
                let n1 = self.cur.read_id(0)?;
                let (n2, more) = self.cur.read_ideof(0)?;
                push_id(out, self.r.dirmap[dir as usize]);
                push_id(out, n1);
                push_ideof(out, n2, more);
                if !more {
                    break;
                }
            },
            KeyType::DirStrArray => loop {
                let (dir, more) = self.cur.read_ideof(self.r.numdir.max(2))?;
                let s = self.cur.read_str()?;
                push_ideof(out, self.r.dirmap[dir as usize], more);
                out.extend_from_slice(s.as_bytes());
                out.push(0);
                if !more {
                    break;
                }
            },
            KeyType::FixArray => {
                let n = self.cur.read_id(0)?;
                push_id(out, n);
                if n > 0 {
                    let fsid = self.cur.read_id(self.r.numschemata)?;
                    if fsid == 0 {
                        return Err(SolvError::Corrupt("fixarray without schema"));
                    }
                    push_id(&mut self.r.out, self.r.schemamap[fsid as usize]);
                    for _ in 0..n {
                        self.record(fsid, depth + 1, false)?;
                    }
                }
            }
            KeyType::FlexArray => {
                let n = self.cur.read_id(0)?;
                push_id(out, n);
                let solvables = top
                    && key.name == knownid::REPOSITORY_SOLVABLES
                    && key.storage == KeyStorage::Incore;
                for _ in 0..n {
                    let fsid = self.cur.read_id(self.r.numschemata)?;
                    if solvables {
                        self.r.incoreoffset.push(self.r.out.len());
                    }
                    push_id(&mut self.r.out, self.r.schemamap[fsid as usize]);
                    self.record(fsid, depth + 1, false)?;
                }
            }
        }
        Ok(())
    }
}
