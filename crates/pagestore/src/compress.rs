//! LZ77-family page coder.
//!
//! Byte-oriented, no entropy stage. The first byte of every op selects the
//! form by its top bits:
//!
//! ```text
//! 0xxxxxxx                  literal byte (ASCII fast path)
//! 100lllll  <bytes>         literal run, 1-32 bytes
//! 101mmmoo oooooooo         copy 2-9,    distance <= 1024
//! 110mmmmm oooooooo         copy 10-41,  distance <= 256
//! 1110mmmm o16              copy 3-18,   distance <= 65536
//! 11110mmm l8 o16           copy 19-2066, distance <= 65536
//! 11111mmm l8 o24           copy 5-2052,  distance <= 2^24
//! ```
//!
//! Stored distances are `distance - 1`. The encoder hashes 3-byte windows
//! into 64K chained buckets, probes at most [`MAX_PROBES`] candidates per
//! position and is greedy with one position of lookahead: a match is
//! dropped in favor of a literal when the next position matches strictly
//! longer.

use crate::PageError;

const HASH_SIZE: usize = 1 << 16;
const MAX_PROBES: usize = 12;
/// Longest copy any op can express.
const MAX_COPY: usize = 2066;
/// Longest copy expressible with a 24-bit distance.
const MAX_COPY_FAR: usize = 2052;
const MAX_DIST: usize = 1 << 24;

#[inline]
fn hash3(src: &[u8], i: usize) -> usize {
    let w = u32::from(src[i]) << 16 | u32::from(src[i + 1]) << 8 | u32::from(src[i + 2]);
    (w.wrapping_mul(2654435761) >> 16) as usize & (HASH_SIZE - 1)
}

/// A copy is only worth emitting when it beats the op overhead for its
/// distance tier.
#[inline]
fn usable(len: usize, dist: usize) -> bool {
    (len >= 2 && dist <= 1024) || (len >= 3 && dist <= 65536) || len >= 5
}

struct Matcher {
    head: Vec<u32>,
    prev: Vec<u32>,
}

const NIL: u32 = u32::MAX;

impl Matcher {
    fn new(len: usize) -> Self {
        Matcher {
            head: vec![NIL; HASH_SIZE],
            prev: vec![NIL; len],
        }
    }

    fn insert(&mut self, src: &[u8], i: usize) {
        if i + 3 > src.len() {
            return;
        }
        let h = hash3(src, i);
        self.prev[i] = self.head[h];
        self.head[h] = i as u32;
    }

    /// Longest usable match ending-before `i`, as `(len, dist)`.
    fn find(&self, src: &[u8], i: usize) -> Option<(usize, usize)> {
        if i + 3 > src.len() {
            return None;
        }
        let mut best: Option<(usize, usize)> = None;
        let mut cand = self.head[hash3(src, i)];
        for _ in 0..MAX_PROBES {
            if cand == NIL {
                break;
            }
            let j = cand as usize;
            let dist = i - j;
            if dist >= MAX_DIST {
                break;
            }
            let cap = if dist > 65536 { MAX_COPY_FAR } else { MAX_COPY };
            let max_len = cap.min(src.len() - i);
            let mut len = 0;
            while len < max_len && src[j + len] == src[i + len] {
                len += 1;
            }
            if usable(len, dist) && best.map_or(true, |(bl, _)| len > bl) {
                best = Some((len, dist));
            }
            cand = self.prev[j];
        }
        best
    }
}

fn put_copy(out: &mut Vec<u8>, len: usize, dist: usize) {
    let off = dist - 1;
    if (2..=9).contains(&len) && off < 1024 {
        out.push(0xa0 | ((len - 2) as u8) << 2 | (off >> 8) as u8);
        out.push(off as u8);
    } else if (10..=41).contains(&len) && off < 256 {
        out.push(0xc0 | (len - 10) as u8);
        out.push(off as u8);
    } else if (3..=18).contains(&len) && off < 65536 {
        out.push(0xe0 | (len - 3) as u8);
        out.push((off >> 8) as u8);
        out.push(off as u8);
    } else if (19..=MAX_COPY).contains(&len) && off < 65536 {
        let l = len - 19;
        out.push(0xf0 | (l >> 8) as u8);
        out.push(l as u8);
        out.push((off >> 8) as u8);
        out.push(off as u8);
    } else {
        debug_assert!((5..=MAX_COPY_FAR).contains(&len) && off < MAX_DIST);
        let l = len - 5;
        out.push(0xf8 | (l >> 8) as u8);
        out.push(l as u8);
        out.push((off >> 16) as u8);
        out.push((off >> 8) as u8);
        out.push(off as u8);
    }
}

fn put_literals(out: &mut Vec<u8>, lit: &[u8]) {
    let mut s = 0;
    while s < lit.len() {
        if lit[s] < 0x80 {
            out.push(lit[s]);
            s += 1;
            continue;
        }
        let mut n = 1;
        while s + n < lit.len() && n < 32 && lit[s + n] >= 0x80 {
            n += 1;
        }
        out.push(0x80 | (n - 1) as u8);
        out.extend_from_slice(&lit[s..s + n]);
        s += n;
    }
}

/// Compresses one page worth of bytes.
///
/// The output is self-delimiting only together with its length; callers
/// store the compressed length (or fall back to the raw bytes when the
/// result is not smaller).
#[must_use]
pub fn compress_page(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len() / 2 + 16);
    let mut m = Matcher::new(src.len());
    let mut lit_start = 0;
    let mut i = 0;
    while i < src.len() {
        let found = m.find(src, i);
        let Some((len, dist)) = found else {
            m.insert(src, i);
            i += 1;
            continue;
        };
        // lookahead 1: prefer the next position when it matches longer
        if let Some((nlen, _)) = m.find(src, i + 1) {
            if nlen > len {
                m.insert(src, i);
                i += 1;
                continue;
            }
        }
        put_literals(&mut out, &src[lit_start..i]);
        put_copy(&mut out, len, dist);
        let end = (i + len).min(src.len());
        while i < end {
            m.insert(src, i);
            i += 1;
        }
        lit_start = i;
    }
    put_literals(&mut out, &src[lit_start..]);
    out
}

/// Decompresses one page into `out`, returning the decoded length.
pub fn decompress_page(src: &[u8], out: &mut [u8]) -> Result<usize, PageError> {
    let mut ip = 0;
    let mut op = 0;
    let next = |ip: &mut usize| -> Result<u8, PageError> {
        let b = *src.get(*ip).ok_or(PageError::Corrupt("truncated op"))?;
        *ip += 1;
        Ok(b)
    };
    while ip < src.len() {
        let b = next(&mut ip)?;
        let (len, dist) = if b < 0x80 {
            if op >= out.len() {
                return Err(PageError::Corrupt("output overrun"));
            }
            out[op] = b;
            op += 1;
            continue;
        } else if b < 0xa0 {
            let n = (b as usize & 0x1f) + 1;
            if ip + n > src.len() {
                return Err(PageError::Corrupt("truncated literal run"));
            }
            if op + n > out.len() {
                return Err(PageError::Corrupt("output overrun"));
            }
            out[op..op + n].copy_from_slice(&src[ip..ip + n]);
            ip += n;
            op += n;
            continue;
        } else if b < 0xc0 {
            let o = (b as usize & 3) << 8 | next(&mut ip)? as usize;
            ((b as usize >> 2 & 7) + 2, o + 1)
        } else if b < 0xe0 {
            ((b as usize & 0x1f) + 10, next(&mut ip)? as usize + 1)
        } else if b < 0xf0 {
            let o = (next(&mut ip)? as usize) << 8 | next(&mut ip)? as usize;
            ((b as usize & 0xf) + 3, o + 1)
        } else if b < 0xf8 {
            let l = (b as usize & 7) << 8 | next(&mut ip)? as usize;
            let o = (next(&mut ip)? as usize) << 8 | next(&mut ip)? as usize;
            (l + 19, o + 1)
        } else {
            let l = (b as usize & 7) << 8 | next(&mut ip)? as usize;
            let o = (next(&mut ip)? as usize) << 16
                | (next(&mut ip)? as usize) << 8
                | next(&mut ip)? as usize;
            (l + 5, o + 1)
        };
        if dist > op {
            return Err(PageError::Corrupt("copy reaches before output start"));
        }
        if op + len > out.len() {
            return Err(PageError::Corrupt("output overrun"));
        }
        // overlapping copies are the RLE case, copy byte-wise
        for _ in 0..len {
            out[op] = out[op - dist];
            op += 1;
        }
    }
    Ok(op)
}
