//! Lazy page residency cache.

use std::collections::HashMap;
use std::fs::File;
use std::os::unix::fs::FileExt;

use crate::{compress::decompress_page, PageError, PAGESIZE};

/// Where one page lives in the backing file.
#[derive(Debug, Clone, Copy)]
struct PageInfo {
    offset: u64,
    size: u32,
    compressed: bool,
}

/// Read-only paged blob backed by a solv file.
///
/// Pages are registered once at load time (offset, stored size,
/// compressed flag), then materialized on demand into a slab of
/// [`PAGESIZE`]-sized slots. Two maps track residency:
/// `mapped_at[page] -> slot` and `mapped[slot] -> page`. A page is never
/// partially resident; eviction clears both directions.
///
/// The backing file handle is a duplicate owned by the store, so loads
/// keep working after the caller closes or reuses its own handle.
#[derive(Debug, Default)]
pub struct Pagestore {
    file: Option<File>,
    pages: Vec<PageInfo>,
    blob_len: u64,
    blob: Vec<u8>,
    mapped_at: Vec<Option<u32>>,
    mapped: Vec<Option<u32>>,
    rr: usize,
}

impl Pagestore {
    #[must_use]
    pub fn new() -> Self {
        Pagestore::default()
    }

    /// Registers the backing file and the total uncompressed blob length.
    pub fn set_backing(&mut self, file: File, blob_len: u64) {
        self.file = Some(file);
        self.blob_len = blob_len;
    }

    /// Registers the next page's location in the backing file.
    pub fn add_page(&mut self, offset: u64, size: u32, compressed: bool) {
        self.pages.push(PageInfo {
            offset,
            size,
            compressed,
        });
        self.mapped_at.push(None);
    }

    /// Number of registered pages.
    #[must_use]
    pub fn npages(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Total uncompressed blob length.
    #[must_use]
    pub fn blob_len(&self) -> u64 {
        self.blob_len
    }

    /// Uncompressed length of one page (the last page may be short).
    fn page_len(&self, page: u32) -> usize {
        let full = (page as u64 + 1) * PAGESIZE as u64;
        if full <= self.blob_len {
            PAGESIZE
        } else {
            (self.blob_len - page as u64 * PAGESIZE as u64) as usize
        }
    }

    /// Makes pages `pstart..=pend` resident and contiguous, returning one
    /// slice spanning all of them.
    ///
    /// Already-resident pages that sit in the wrong slot are moved, not
    /// re-read; everything else is fetched from the backing file and
    /// decompressed. Slot placement continues from a correctly placed
    /// neighbor when one exists, otherwise it round-robins.
    pub fn load_page_range(&mut self, pstart: u32, pend: u32) -> Result<&[u8], PageError> {
        if pend < pstart || pend >= self.npages() {
            return Err(PageError::OutOfRange(pend));
        }
        let n = (pend - pstart + 1) as usize;

        // fast path: the whole range is already resident in order
        if let Some(s0) = self.mapped_at[pstart as usize] {
            let ok = (0..n).all(|k| {
                self.mapped_at[pstart as usize + k] == Some(s0 + k as u32)
                    && (s0 as usize + k) < self.mapped.len()
            });
            if ok {
                let at = s0 as usize * PAGESIZE;
                return Ok(&self.blob[at..at + n * PAGESIZE]);
            }
        }

        if self.mapped.len() < n {
            self.mapped.resize(n, None);
            self.blob.resize(n * PAGESIZE, 0);
        }
        let nslots = self.mapped.len();

        // anchor on a page of the range that is already in a usable slot
        let mut t0 = None;
        for k in 0..n {
            if let Some(s) = self.mapped_at[pstart as usize + k] {
                let s = s as usize;
                if s >= k && s - k + n <= nslots {
                    t0 = Some(s - k);
                    break;
                }
            }
        }
        let t0 = t0.unwrap_or_else(|| {
            let t = self.rr % (nslots - n + 1);
            self.rr = t + n;
            t
        });

        // pull misplaced resident pages of the range aside before slots
        // start getting overwritten
        let mut saved: HashMap<u32, Vec<u8>> = HashMap::new();
        for k in 0..n {
            let p = pstart + k as u32;
            if let Some(s) = self.mapped_at[p as usize] {
                if s as usize != t0 + k {
                    let at = s as usize * PAGESIZE;
                    saved.insert(p, self.blob[at..at + PAGESIZE].to_vec());
                    self.mapped[s as usize] = None;
                    self.mapped_at[p as usize] = None;
                }
            }
        }

        for k in 0..n {
            let p = pstart + k as u32;
            let slot = t0 + k;
            if self.mapped[slot] == Some(p) {
                continue;
            }
            if let Some(q) = self.mapped[slot].take() {
                self.mapped_at[q as usize] = None;
            }
            let at = slot * PAGESIZE;
            if let Some(bytes) = saved.remove(&p) {
                self.blob[at..at + PAGESIZE].copy_from_slice(&bytes);
            } else {
                self.fetch_page(p, slot)?;
            }
            self.mapped[slot] = Some(p);
            self.mapped_at[p as usize] = Some(slot as u32);
        }

        let at = t0 * PAGESIZE;
        Ok(&self.blob[at..at + n * PAGESIZE])
    }

    /// Reads and decompresses one page from the backing file into a slot.
    fn fetch_page(&mut self, page: u32, slot: usize) -> Result<(), PageError> {
        let info = self.pages[page as usize];
        let want = self.page_len(page);
        let file = self.file.as_ref().ok_or(PageError::NoBackingFile)?;
        let mut raw = vec![0u8; info.size as usize];
        file.read_exact_at(&mut raw, info.offset)?;
        let at = slot * PAGESIZE;
        let dest = &mut self.blob[at..at + PAGESIZE];
        let got = if info.compressed {
            decompress_page(&raw, dest)?
        } else {
            if raw.len() > PAGESIZE {
                return Err(PageError::Corrupt("raw page larger than page size"));
            }
            dest[..raw.len()].copy_from_slice(&raw);
            raw.len()
        };
        if got != want {
            return Err(PageError::Corrupt("page length mismatch"));
        }
        dest[got..].fill(0);
        Ok(())
    }
}
