//! On-disk constants shared by the reader and the writer.

/// `"SOLV"` big-endian.
pub const SOLV_MAGIC: u32 =
    ((b'S' as u32) << 24) | ((b'O' as u32) << 16) | ((b'L' as u32) << 8) | (b'V' as u32);

/// The only format revision we speak.
pub const SOLV_VERSION: u32 = 8;

/// Header flag: the string pool is front-coded (shared-prefix length
/// plus NUL-terminated suffix per string).
pub const FLAG_PREFIX_POOL: u32 = 1;

/// Header flag: size keys count bytes, not kilobytes.
pub const FLAG_SIZE_BYTES: u32 = 2;

/// Longest shared prefix a front-coded string record can express.
pub const MAX_PREFIX_COMMON: usize = 255;

/// Deepest sub-record nesting either end will follow.
pub const MAX_NESTING: usize = 32;
