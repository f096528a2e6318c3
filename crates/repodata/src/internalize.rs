//! Folding staged attributes into the incore encoding.
//!
//! The whole incore blob is rebuilt: for every entity the old schema
//! keys are kept in order, values overwritten by a staged value under
//! the same key name are replaced in place, remaining staged keys are
//! appended, and unset keys disappear. Values that were not touched
//! are copied over span-wise since key ids, schema ids and vertical
//! offsets all stay stable across the rebuild.

use codec::{marker_for_keyname, push_blob, push_id, push_idarray, push_ideof, push_num64,
    push_rel_idarray, push_str, push_u32be, Cursor, KeyType};
use pool::{knownid, Id};

use crate::search::skip_value;
use crate::{DataError, DataResult, EntityId, KeyStorage, Repodata, Repokey, StagedValue};

const MAX_NESTING: usize = 32;

enum Merged<'a> {
    /// Unmodified value, byte range in the old incore blob.
    Span(std::ops::Range<usize>),
    Staged(&'a StagedValue),
}

/// Staged values that internalize as "no key at all".
fn is_dropped(v: &StagedValue) -> bool {
    match v {
        StagedValue::Deleted => true,
        StagedValue::IdArray(x) => x.is_empty(),
        StagedValue::DirNumNum(x) => x.is_empty(),
        StagedValue::DirStr(x) => x.is_empty(),
        StagedValue::Array(x) => x.is_empty(),
        _ => false,
    }
}

impl Repodata {
    /// Merge all staged attributes into the incore encoding, making
    /// them visible to `search` and the lookups. A no-op when nothing
    /// is staged.
    pub fn internalize(&mut self) -> DataResult<()> {
        if self.attrs.is_empty() {
            self.handles.clear();
            return Ok(());
        }
        let attrs = std::mem::take(&mut self.attrs);
        let handles = std::mem::take(&mut self.handles);
        let old_incore = std::mem::take(&mut self.incoredata);
        let old_offsets = std::mem::take(&mut self.incoreoffset);
        let old_mainschema = self.mainschema;
        let old_meta_offset = self.meta_offset;

        let mut nsolv = self.nsolvables;
        for e in attrs.keys() {
            if let EntityId::Solvable(i) = e {
                nsolv = nsolv.max(i + 1);
            }
        }

        let mut out = Vec::with_capacity(old_incore.len() + 64);

        // meta record; the solvables array is re-appended at the end,
        // so it is excluded from the plain merge
        let meta_old = if old_incore.is_empty() {
            None
        } else {
            Some((old_mainschema, old_meta_offset))
        };
        let meta_merged = self.merge_pairs(
            &old_incore,
            meta_old,
            attrs.get(&EntityId::Meta),
            knownid::REPOSITORY_SOLVABLES,
        )?;
        let mut meta_kids: Vec<Id> = meta_merged.iter().map(|(kid, _)| *kid).collect();
        let solv_kid = if nsolv > 0 {
            let kid = self.key2id(&Repokey {
                name: knownid::REPOSITORY_SOLVABLES,
                ty: KeyType::FlexArray,
                size: 0,
                storage: KeyStorage::Incore,
            });
            meta_kids.push(kid);
            Some(kid)
        } else {
            None
        };
        let mainschema = self.schema2id(&meta_kids);
        push_id(&mut out, mainschema);
        let meta_offset = out.len();
        let mut msoffsets = Vec::with_capacity(meta_kids.len());
        for (kid, m) in &meta_merged {
            msoffsets.push(out.len());
            self.serialize_merged(*kid, m, &old_incore, &handles, &mut out)?;
        }

        let mut new_offsets = vec![0usize; nsolv as usize];
        if solv_kid.is_some() {
            msoffsets.push(out.len());
            push_id(&mut out, nsolv);
            for i in 0..nsolv {
                new_offsets[i as usize] = out.len();
                let old = old_offsets.get(i as usize).and_then(|&off| {
                    let mut cur = Cursor::new(&old_incore);
                    cur.skip_bytes(off).ok()?;
                    let schema = cur.read_id(self.schemata.len() as u32).ok()?;
                    Some((schema, cur.pos()))
                });
                let merged =
                    self.merge_pairs(&old_incore, old, attrs.get(&EntityId::Solvable(i)), 0)?;
                let kids: Vec<Id> = merged.iter().map(|(kid, _)| *kid).collect();
                let sid = self.schema2id(&kids);
                push_id(&mut out, sid);
                for (kid, m) in &merged {
                    self.serialize_merged(*kid, m, &old_incore, &handles, &mut out)?;
                }
            }
        }

        self.incoredata = out;
        self.incoreoffset = new_offsets;
        self.mainschema = mainschema;
        self.mainschemaoffsets = msoffsets;
        self.meta_offset = meta_offset;
        self.nsolvables = nsolv;
        Ok(())
    }

    /// Merge an entity's old schema with its staged pairs: old key
    /// order wins, staged values replace same-named keys in place,
    /// leftover staged keys append, dropped keys vanish.
    fn merge_pairs<'a>(
        &self,
        old_incore: &[u8],
        old: Option<(Id, usize)>,
        staged: Option<&'a Vec<(Id, StagedValue)>>,
        exclude_name: Id,
    ) -> DataResult<Vec<(Id, Merged<'a>)>> {
        let staged: &'a [(Id, StagedValue)] = staged.map(Vec::as_slice).unwrap_or(&[]);
        let mut consumed = vec![false; staged.len()];
        let mut merged = Vec::with_capacity(staged.len());
        if let Some((schema, pos)) = old {
            let mut cur = Cursor::new(old_incore);
            cur.skip_bytes(pos)?;
            for &kid in &self.schemata[schema as usize] {
                let key = &self.keys[kid as usize];
                let start = cur.pos();
                skip_value(&self.keys, &self.schemata, key, &mut cur)?;
                let span = start..cur.pos();
                if exclude_name != 0 && key.name == exclude_name {
                    continue;
                }
                let over = staged.iter().enumerate().find(|(j, (skid, _))| {
                    !consumed[*j] && self.keys[*skid as usize].name == key.name
                });
                if let Some((j, (skid, sval))) = over {
                    consumed[j] = true;
                    if !is_dropped(sval) {
                        merged.push((*skid, Merged::Staged(sval)));
                    }
                } else {
                    merged.push((kid, Merged::Span(span)));
                }
            }
        }
        for (j, (skid, sval)) in staged.iter().enumerate() {
            if !consumed[j] && !is_dropped(sval) {
                merged.push((*skid, Merged::Staged(sval)));
            }
        }
        Ok(merged)
    }

    fn serialize_merged(
        &mut self,
        kid: Id,
        m: &Merged<'_>,
        old_incore: &[u8],
        handles: &[Vec<(Id, StagedValue)>],
        out: &mut Vec<u8>,
    ) -> DataResult<()> {
        match m {
            Merged::Span(r) => {
                out.extend_from_slice(&old_incore[r.clone()]);
                Ok(())
            }
            Merged::Staged(v) => self.serialize_value(kid, v, handles, out, 0),
        }
    }

    fn serialize_value(
        &mut self,
        kid: Id,
        val: &StagedValue,
        handles: &[Vec<(Id, StagedValue)>],
        out: &mut Vec<u8>,
        depth: usize,
    ) -> DataResult<()> {
        if depth > MAX_NESTING {
            return Err(DataError::TooDeep);
        }
        let key = self.keys[kid as usize].clone();
        if key.storage == KeyStorage::VerticalOffset {
            let mut tmp = Vec::new();
            self.serialize_payload(&key, val, handles, &mut tmp, depth)?;
            let off = self.append_vertical(&tmp);
            push_id(out, off as u32);
            push_id(out, tmp.len() as u32);
            return Ok(());
        }
        self.serialize_payload(&key, val, handles, out, depth)
    }

    fn serialize_payload(
        &mut self,
        key: &Repokey,
        val: &StagedValue,
        handles: &[Vec<(Id, StagedValue)>],
        out: &mut Vec<u8>,
        depth: usize,
    ) -> DataResult<()> {
        match val {
            StagedValue::Void
            | StagedValue::Constant(_)
            | StagedValue::ConstantId(_)
            | StagedValue::Deleted => {}
            StagedValue::Id(id) | StagedValue::Dir(id) => push_id(out, *id),
            StagedValue::Num(v) => push_num64(out, *v),
            StagedValue::U32(v) => push_u32be(out, *v),
            StagedValue::Str(s) => push_str(out, s),
            StagedValue::Binary(b) => push_blob(out, b),
            StagedValue::Checksum(b) => out.extend_from_slice(b),
            StagedValue::IdArray(ids) => {
                if key.ty == KeyType::RelIdArray {
                    push_rel_idarray(out, ids, marker_for_keyname(key.name));
                } else {
                    push_idarray(out, ids);
                }
            }
            StagedValue::DirNumNum(elems) => {
                let n = elems.len();
                for (i, (did, num, num2)) in elems.iter().enumerate() {
                    push_id(out, *did);
                    push_id(out, *num);
                    push_ideof(out, *num2, i + 1 < n);
                }
            }
            StagedValue::DirStr(elems) => {
                let n = elems.len();
                for (i, (did, name)) in elems.iter().enumerate() {
                    push_ideof(out, *did, i + 1 < n);
                    push_str(out, name);
                }
            }
            StagedValue::Array(hs) => {
                push_id(out, hs.len() as u32);
                if key.ty == KeyType::FixArray {
                    // one shared schema, elements carry values only
                    let mut first_sid = None;
                    let mut bodies = Vec::with_capacity(hs.len());
                    for &h in hs {
                        let mut tmp = Vec::new();
                        let sid =
                            self.serialize_record(&handles[h as usize], handles, &mut tmp, false, depth + 1)?;
                        match first_sid {
                            None => first_sid = Some(sid),
                            Some(s) if s != sid => return Err(DataError::MixedFixArray),
                            _ => {}
                        }
                        bodies.push(tmp);
                    }
                    if let Some(sid) = first_sid {
                        push_id(out, sid);
                        for b in bodies {
                            out.extend_from_slice(&b);
                        }
                    }
                } else {
                    for &h in hs {
                        self.serialize_record(&handles[h as usize], handles, out, true, depth + 1)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Serialize one staged sub-record, registering its schema.
    fn serialize_record(
        &mut self,
        pairs: &[(Id, StagedValue)],
        handles: &[Vec<(Id, StagedValue)>],
        out: &mut Vec<u8>,
        emit_schema: bool,
        depth: usize,
    ) -> DataResult<Id> {
        if depth > MAX_NESTING {
            return Err(DataError::TooDeep);
        }
        let kids: Vec<Id> = pairs
            .iter()
            .filter(|(_, v)| !is_dropped(v))
            .map(|(kid, _)| *kid)
            .collect();
        let sid = self.schema2id(&kids);
        if emit_schema {
            push_id(out, sid);
        }
        for (kid, val) in pairs {
            if !is_dropped(val) {
                self.serialize_value(*kid, val, handles, out, depth)?;
            }
        }
        Ok(sid)
    }
}
