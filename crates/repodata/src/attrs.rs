//! Typed staging calls. Values set here live in a side table until
//! [`Repodata::internalize`] folds them into the incore encoding.

use std::collections::HashMap;

use codec::KeyType;
use pool::Id;

use crate::{DataError, DataResult, EntityId, KeyStorage, Repodata, Repokey, StagedValue};

fn pairs_mut<'a>(
    attrs: &'a mut HashMap<EntityId, Vec<(Id, StagedValue)>>,
    handles: &'a mut [Vec<(Id, StagedValue)>],
    entity: EntityId,
) -> &'a mut Vec<(Id, StagedValue)> {
    match entity {
        EntityId::Handle(h) => &mut handles[h as usize],
        _ => attrs.entry(entity).or_default(),
    }
}

impl Repodata {
    /// Stage `val` under `keyname`, replacing any staged value with the
    /// same key name on the same entity.
    fn setkey(&mut self, entity: EntityId, key: Repokey, val: StagedValue) {
        let name = key.name;
        let kid = self.key2id(&key);
        let keys = &self.keys;
        let pairs = pairs_mut(&mut self.attrs, &mut self.handles, entity);
        if let Some(pair) = pairs.iter_mut().find(|(k, _)| keys[*k as usize].name == name) {
            *pair = (kid, val);
        } else {
            pairs.push((kid, val));
        }
    }

    fn plain_key(name: Id, ty: KeyType) -> Repokey {
        Repokey {
            name,
            ty,
            size: 0,
            storage: KeyStorage::Incore,
        }
    }

    pub fn set_void(&mut self, entity: EntityId, keyname: Id) {
        self.setkey(entity, Self::plain_key(keyname, KeyType::Void), StagedValue::Void);
    }

    pub fn set_constant(&mut self, entity: EntityId, keyname: Id, value: u32) {
        let key = Repokey {
            name: keyname,
            ty: KeyType::Constant,
            size: value,
            storage: KeyStorage::Incore,
        };
        self.setkey(entity, key, StagedValue::Constant(value));
    }

    pub fn set_constantid(&mut self, entity: EntityId, keyname: Id, id: Id) {
        let key = Repokey {
            name: keyname,
            ty: KeyType::ConstantId,
            size: id,
            storage: KeyStorage::Incore,
        };
        self.setkey(entity, key, StagedValue::ConstantId(id));
    }

    pub fn set_id(&mut self, entity: EntityId, keyname: Id, id: Id) {
        self.setkey(entity, Self::plain_key(keyname, KeyType::Id), StagedValue::Id(id));
    }

    pub fn set_num(&mut self, entity: EntityId, keyname: Id, value: u64) {
        self.setkey(entity, Self::plain_key(keyname, KeyType::Num), StagedValue::Num(value));
    }

    pub fn set_u32(&mut self, entity: EntityId, keyname: Id, value: u32) {
        self.setkey(entity, Self::plain_key(keyname, KeyType::U32), StagedValue::U32(value));
    }

    pub fn set_str(&mut self, entity: EntityId, keyname: Id, value: &str) {
        self.setkey(
            entity,
            Self::plain_key(keyname, KeyType::Str),
            StagedValue::Str(value.to_string()),
        );
    }

    pub fn set_binary(&mut self, entity: EntityId, keyname: Id, value: &[u8]) {
        self.setkey(
            entity,
            Self::plain_key(keyname, KeyType::Binary),
            StagedValue::Binary(value.to_vec()),
        );
    }

    /// Stage a raw checksum. `ty` must be one of the checksum key types
    /// and `sum` must have exactly the digest length.
    pub fn set_checksum(
        &mut self,
        entity: EntityId,
        keyname: Id,
        ty: KeyType,
        sum: &[u8],
    ) -> DataResult<()> {
        let len = ty.checksum_len().ok_or(DataError::TypeMismatch)?;
        if sum.len() != len {
            return Err(DataError::TypeMismatch);
        }
        self.setkey(entity, Self::plain_key(keyname, ty), StagedValue::Checksum(sum.to_vec()));
        Ok(())
    }

    pub fn set_checksum_hex(
        &mut self,
        entity: EntityId,
        keyname: Id,
        ty: KeyType,
        hex: &str,
    ) -> DataResult<()> {
        let sum = parse_hex(hex).ok_or(DataError::TypeMismatch)?;
        self.set_checksum(entity, keyname, ty, &sum)
    }

    pub fn set_dir(&mut self, entity: EntityId, keyname: Id, dir: Id) {
        self.setkey(entity, Self::plain_key(keyname, KeyType::Dir), StagedValue::Dir(dir));
    }

    /// Stage a deletion. The key stays invisible to lookups and is
    /// dropped entirely when the data is written out.
    pub fn unset(&mut self, entity: EntityId, keyname: Id) {
        self.setkey(entity, Self::plain_key(keyname, KeyType::Deleted), StagedValue::Deleted);
    }

    /// Append to an id array, creating it on first use. Order is
    /// preserved.
    pub fn add_idarray(&mut self, entity: EntityId, keyname: Id, id: Id) {
        self.add_to_array(entity, Self::plain_key(keyname, KeyType::IdArray), |v| {
            if let StagedValue::IdArray(ids) = v {
                ids.push(id);
            }
        });
    }

    /// Append to a dependency array. These serialize delta-coded and
    /// sorted, with marker ids separating sections.
    pub fn add_deparray(&mut self, entity: EntityId, keyname: Id, dep: Id) {
        self.add_to_array(entity, Self::plain_key(keyname, KeyType::RelIdArray), |v| {
            if let StagedValue::IdArray(ids) = v {
                ids.push(dep);
            }
        });
    }

    pub fn add_dirnumnum(&mut self, entity: EntityId, keyname: Id, dir: Id, num: u32, num2: u32) {
        self.add_to_array(
            entity,
            Self::plain_key(keyname, KeyType::DirNumNumArray),
            |v| {
                if let StagedValue::DirNumNum(elems) = v {
                    elems.push((dir, num, num2));
                }
            },
        );
    }

    pub fn add_dirstr(&mut self, entity: EntityId, keyname: Id, dir: Id, name: &str) {
        self.add_to_array(
            entity,
            Self::plain_key(keyname, KeyType::DirStrArray),
            |v| {
                if let StagedValue::DirStr(elems) = v {
                    elems.push((dir, name.to_string()));
                }
            },
        );
    }

    /// Create a fresh sub-record for use with `add_flexarray` or
    /// `add_fixarray`.
    pub fn new_handle(&mut self) -> EntityId {
        let h = self.handles.len() as u32;
        self.handles.push(Vec::new());
        EntityId::Handle(h)
    }

    pub fn add_flexarray(
        &mut self,
        entity: EntityId,
        keyname: Id,
        handle: EntityId,
    ) -> DataResult<()> {
        self.add_handle(entity, keyname, KeyType::FlexArray, handle)
    }

    /// Like `add_flexarray`, but all elements must end up with the same
    /// schema; this is checked at internalize time.
    pub fn add_fixarray(
        &mut self,
        entity: EntityId,
        keyname: Id,
        handle: EntityId,
    ) -> DataResult<()> {
        self.add_handle(entity, keyname, KeyType::FixArray, handle)
    }

    fn add_handle(
        &mut self,
        entity: EntityId,
        keyname: Id,
        ty: KeyType,
        handle: EntityId,
    ) -> DataResult<()> {
        let EntityId::Handle(h) = handle else {
            return Err(DataError::BadHandle);
        };
        if h as usize >= self.handles.len() {
            return Err(DataError::BadHandle);
        }
        self.add_to_array(entity, Self::plain_key(keyname, ty), |v| {
            if let StagedValue::Array(hs) = v {
                hs.push(h);
            }
        });
        Ok(())
    }

    fn add_to_array<F>(&mut self, entity: EntityId, key: Repokey, push: F)
    where
        F: FnOnce(&mut StagedValue),
    {
        let name = key.name;
        let kid = self.key2id(&key);
        let empty = match key.ty {
            KeyType::IdArray | KeyType::RelIdArray => StagedValue::IdArray(Vec::new()),
            KeyType::DirNumNumArray => StagedValue::DirNumNum(Vec::new()),
            KeyType::DirStrArray => StagedValue::DirStr(Vec::new()),
            _ => StagedValue::Array(Vec::new()),
        };
        let keys = &self.keys;
        let pairs = pairs_mut(&mut self.attrs, &mut self.handles, entity);
        if let Some(pos) = pairs.iter().position(|(k, _)| *k == kid) {
            push(&mut pairs[pos].1);
        } else if let Some(pos) = pairs
            .iter()
            .position(|(k, _)| keys[*k as usize].name == name)
        {
            // same name, different type: the array replaces it
            pairs[pos] = (kid, empty);
            push(&mut pairs[pos].1);
        } else {
            pairs.push((kid, empty));
            if let Some(pair) = pairs.last_mut() {
                push(&mut pair.1);
            }
        }
    }
}

fn parse_hex(hex: &str) -> Option<Vec<u8>> {
    let bytes = hex.as_bytes();
    if bytes.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        out.push((hi * 16 + lo) as u8);
    }
    Some(out)
}
