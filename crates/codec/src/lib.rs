//! # Codec - variable-length integer and array encodings
//!
//! Every value stored in a repodata record or a solv file is built from a
//! handful of primitive encodings:
//!
//! ```text
//! id       7 value bits per byte, big-endian septets, bit 7 = "more
//!          bytes follow". 32-bit ids use at most 5 bytes, 64-bit
//!          numbers at most 10.
//!
//! ideof    like id, but the final byte carries only 6 value bits;
//!          bit 6 set means "another array element follows". Arrays
//!          terminate for free with the last element. An empty array
//!          is a single 0 byte.
//!
//! delta    for dependency arrays: partitions around a marker id are
//!          sorted ascending and each element is emitted as
//!          `id - prev + 1` (ideof-coded); the marker itself becomes a
//!          literal 0 and resets the delta base. Sorted dep lists are
//!          dominated by tiny deltas, which fit in one byte.
//! ```
//!
//! Decoding operates on a [`Cursor`] over an untrusted byte slice and
//! returns [`DecodeError`] instead of trusting offsets. Any decoded id must
//! stay below the caller's declared namespace size; that check is the
//! format's main defense against corrupted files.

use byteorder::{BigEndian, ByteOrder};
use pool::{knownid, Id};
use thiserror::Error;


/// Errors raised while decoding untrusted bytes.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unexpected end of data")]
    UnexpectedEof,
    #[error("id {id} out of range (max {max})")]
    IdOutOfRange { id: u32, max: u32 },
    #[error("nesting or scratch capacity exceeded")]
    Overflow,
    #[error("corrupt data: {0}")]
    Corrupt(&'static str),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// The value kinds a repokey can carry.
///
/// On disk a key's type is the string id of its type name; the fixed
/// [`knownid`] table makes the mapping bidirectional without a pool lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Void,
    Constant,
    ConstantId,
    Id,
    Num,
    U32,
    Str,
    Binary,
    IdArray,
    RelIdArray,
    Dir,
    DirNumNumArray,
    DirStrArray,
    Md5,
    Sha1,
    Sha256,
    FixArray,
    FlexArray,
    Deleted,
}

impl KeyType {
    /// Maps a type-name string id to the enum, if it names a known type.
    #[must_use]
    pub fn from_name_id(id: Id) -> Option<KeyType> {
        Some(match id {
            knownid::TYPE_VOID => KeyType::Void,
            knownid::TYPE_CONSTANT => KeyType::Constant,
            knownid::TYPE_CONSTANTID => KeyType::ConstantId,
            knownid::TYPE_ID => KeyType::Id,
            knownid::TYPE_NUM => KeyType::Num,
            knownid::TYPE_U32 => KeyType::U32,
            knownid::TYPE_STR => KeyType::Str,
            knownid::TYPE_BINARY => KeyType::Binary,
            knownid::TYPE_IDARRAY => KeyType::IdArray,
            knownid::TYPE_REL_IDARRAY => KeyType::RelIdArray,
            knownid::TYPE_DIR => KeyType::Dir,
            knownid::TYPE_DIRNUMNUMARRAY => KeyType::DirNumNumArray,
            knownid::TYPE_DIRSTRARRAY => KeyType::DirStrArray,
            knownid::TYPE_MD5 => KeyType::Md5,
            knownid::TYPE_SHA1 => KeyType::Sha1,
            knownid::TYPE_SHA256 => KeyType::Sha256,
            knownid::TYPE_FIXARRAY => KeyType::FixArray,
            knownid::TYPE_FLEXARRAY => KeyType::FlexArray,
            knownid::TYPE_DELETED => KeyType::Deleted,
            _ => return None,
        })
    }

    /// The string id of this type's name.
    #[must_use]
    pub fn name_id(self) -> Id {
        match self {
            KeyType::Void => knownid::TYPE_VOID,
            KeyType::Constant => knownid::TYPE_CONSTANT,
            KeyType::ConstantId => knownid::TYPE_CONSTANTID,
            KeyType::Id => knownid::TYPE_ID,
            KeyType::Num => knownid::TYPE_NUM,
            KeyType::U32 => knownid::TYPE_U32,
            KeyType::Str => knownid::TYPE_STR,
            KeyType::Binary => knownid::TYPE_BINARY,
            KeyType::IdArray => knownid::TYPE_IDARRAY,
            KeyType::RelIdArray => knownid::TYPE_REL_IDARRAY,
            KeyType::Dir => knownid::TYPE_DIR,
            KeyType::DirNumNumArray => knownid::TYPE_DIRNUMNUMARRAY,
            KeyType::DirStrArray => knownid::TYPE_DIRSTRARRAY,
            KeyType::Md5 => knownid::TYPE_MD5,
            KeyType::Sha1 => knownid::TYPE_SHA1,
            KeyType::Sha256 => knownid::TYPE_SHA256,
            KeyType::FixArray => knownid::TYPE_FIXARRAY,
            KeyType::FlexArray => knownid::TYPE_FLEXARRAY,
            KeyType::Deleted => knownid::TYPE_DELETED,
        }
    }

    /// Byte length of a checksum type's raw span.
    #[must_use]
    pub fn checksum_len(self) -> Option<usize> {
        match self {
            KeyType::Md5 => Some(16),
            KeyType::Sha1 => Some(20),
            KeyType::Sha256 => Some(32),
            _ => None,
        }
    }
}

/// Boundary marker conventionally used for a dep-array key name, if any.
///
/// The delta encoding stores markers as a literal 0, so the reader has to
/// know from context which id a 0 stands for. `solvable:requires` arrays
/// split at the prereq marker, `solvable:provides` arrays at the file
/// marker; everything else carries no marker.
#[must_use]
pub fn marker_for_keyname(name: Id) -> Id {
    match name {
        knownid::SOLVABLE_REQUIRES => knownid::SOLVABLE_PREREQMARKER,
        knownid::SOLVABLE_PROVIDES => knownid::SOLVABLE_FILEMARKER,
        _ => 0,
    }
}

/// Bounded reader over an untrusted byte slice.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    /// Current byte offset from the start of the slice.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let b = *self.buf.get(self.pos).ok_or(DecodeError::UnexpectedEof)?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEof);
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub fn skip_bytes(&mut self, n: usize) -> Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    /// Reads a varint-coded id. With `max > 0`, ids `>= max` are rejected.
    pub fn read_id(&mut self, max: u32) -> Result<Id> {
        let mut x: u32 = 0;
        for n in 0.. {
            let c = self.read_u8()?;
            if n >= 5 {
                return Err(DecodeError::Corrupt("id encoding too long"));
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
            return Err(DecodeError::IdOutOfRange { id: x, max });
        }
        Ok(x)
    }

    /// Reads a varint-coded 64-bit number.
    pub fn read_num64(&mut self) -> Result<u64> {
        let mut x: u64 = 0;
        for n in 0.. {
            let c = self.read_u8()?;
            if n >= 10 {
                return Err(DecodeError::Corrupt("number encoding too long"));
            }
            x = x
                .checked_mul(128)
                .ok_or(DecodeError::Corrupt("number overflows 64 bits"))?
                | u64::from(c & 0x7f);
            if c & 0x80 == 0 {
                break;
            }
        }
        Ok(x)
    }

    /// Reads one element of an ideof-coded array.
    ///
    /// Returns the value and whether more elements follow.
    pub fn read_ideof(&mut self, max: u32) -> Result<(Id, bool)> {
        let mut x: u32 = 0;
        let mut c;
        let mut n = 0;
        loop {
            c = self.read_u8()?;
            if c & 0x80 == 0 {
                break;
            }
            if n >= 5 {
                return Err(DecodeError::Corrupt("id encoding too long"));
            }
            x = x
                .checked_mul(128)
                .ok_or(DecodeError::Corrupt("id overflows 32 bits"))?
                | u32::from(c & 0x7f);
            n += 1;
        }
        let x = x
            .checked_mul(64)
            .ok_or(DecodeError::Corrupt("id overflows 32 bits"))?
            | u32::from(c & 0x3f);
        if max > 0 && x >= max {
            return Err(DecodeError::IdOutOfRange { id: x, max });
        }
        Ok((x, c & 0x40 != 0))
    }

    /// Reads a whole ideof-coded id array.
    pub fn read_idarray(&mut self, max: u32) -> Result<Vec<Id>> {
        let (first, more) = self.read_ideof(max)?;
        if first == 0 && !more {
            return Ok(Vec::new());
        }
        let mut out = vec![first];
        let mut more = more;
        while more {
            let (v, m) = self.read_ideof(max)?;
            out.push(v);
            more = m;
        }
        Ok(out)
    }

    /// Reads a delta-coded dep array, resolving 0 entries to `marker`.
    pub fn read_rel_idarray(&mut self, max: u32, marker: Id) -> Result<Vec<Id>> {
        let mut out = Vec::new();
        let mut old: u32 = 0;
        let mut first = true;
        loop {
            let (v, more) = self.read_ideof(0)?;
            if v == 0 {
                if first && !more {
                    return Ok(Vec::new());
                }
                if marker == 0 {
                    return Err(DecodeError::Corrupt("marker in unmarked dep array"));
                }
                out.push(marker);
                old = 0;
            } else {
                old = old
                    .checked_add(v - 1)
                    .ok_or(DecodeError::Corrupt("dep delta overflows"))?;
                if max > 0 && old >= max {
                    return Err(DecodeError::IdOutOfRange { id: old, max });
                }
                out.push(old);
            }
            first = false;
            if !more {
                return Ok(out);
            }
        }
    }

    /// Reads a raw big-endian u32 (the U32 key type).
    pub fn read_u32be(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.read_bytes(4)?))
    }

    /// Reads a NUL-terminated UTF-8 string.
    pub fn read_str(&mut self) -> Result<&'a str> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::UnexpectedEof)?;
        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|_| DecodeError::Corrupt("invalid utf-8 in string"))?;
        self.pos += nul + 1;
        Ok(s)
    }

    /// Reads a length-prefixed binary blob.
    pub fn read_blob(&mut self) -> Result<&'a [u8]> {
        let len = self.read_id(0)? as usize;
        self.read_bytes(len)
    }
}

/// Appends a varint-coded 32-bit id.
pub fn push_id(buf: &mut Vec<u8>, x: u32) {
    if x >= 1 << 28 {
        buf.push(((x >> 28) & 0x7f) as u8 | 0x80);
    }
    if x >= 1 << 21 {
        buf.push(((x >> 21) & 0x7f) as u8 | 0x80);
    }
    if x >= 1 << 14 {
        buf.push(((x >> 14) & 0x7f) as u8 | 0x80);
    }
    if x >= 1 << 7 {
        buf.push(((x >> 7) & 0x7f) as u8 | 0x80);
    }
    buf.push((x & 0x7f) as u8);
}

/// Appends a varint-coded 64-bit number.
pub fn push_num64(buf: &mut Vec<u8>, x: u64) {
    for i in (1..10).rev() {
        if x >= 1 << (7 * i) {
            buf.push(((x >> (7 * i)) & 0x7f) as u8 | 0x80);
        }
    }
    buf.push((x & 0x7f) as u8);
}

/// Appends one ideof-coded array element.
pub fn push_ideof(buf: &mut Vec<u8>, x: u32, more: bool) {
    let head = x >> 6;
    if head > 0 {
        for i in (0..5).rev() {
            if head >= 1 << (7 * i) {
                buf.push(((head >> (7 * i)) & 0x7f) as u8 | 0x80);
            }
        }
    }
    buf.push((x & 0x3f) as u8 | if more { 0x40 } else { 0 });
}

/// Appends a whole ideof-coded id array (a single 0 byte when empty).
pub fn push_idarray(buf: &mut Vec<u8>, ids: &[Id]) {
    if ids.is_empty() {
        buf.push(0);
        return;
    }
    for (i, &id) in ids.iter().enumerate() {
        push_ideof(buf, id, i + 1 < ids.len());
    }
}

/// Appends a delta-coded dep array.
///
/// The partition before the first `marker` occurrence and the partition
/// after it are sorted ascending; the marker keeps its position and is
/// emitted as a literal 0. Deltas are offset by one so they are never 0
/// for real elements.
pub fn push_rel_idarray(buf: &mut Vec<u8>, ids: &[Id], marker: Id) {
    if ids.is_empty() {
        buf.push(0);
        return;
    }
    let mut v = ids.to_vec();
    let split = if marker != 0 {
        v.iter().position(|&x| x == marker).unwrap_or(v.len())
    } else {
        v.len()
    };
    v[..split].sort_unstable();
    if split + 1 < v.len() {
        v[split + 1..].sort_unstable();
    }
    let mut old: u32 = 0;
    for (i, &id) in v.iter().enumerate() {
        let more = i + 1 < v.len();
        if marker != 0 && id == marker {
            push_ideof(buf, 0, more);
            old = 0;
        } else {
            push_ideof(buf, id - old + 1, more);
            old = id;
        }
    }
}

/// Appends a raw big-endian u32.
pub fn push_u32be(buf: &mut Vec<u8>, x: u32) {
    let mut b = [0u8; 4];
    BigEndian::write_u32(&mut b, x);
    buf.extend_from_slice(&b);
}

/// Appends a NUL-terminated string.
pub fn push_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

/// Appends a length-prefixed binary blob.
pub fn push_blob(buf: &mut Vec<u8>, bytes: &[u8]) {
    push_id(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
}
