pub const LOG_BYTES_IN_BYTE: u8 = 0;
pub const BYTES_IN_BYTE: usize = 1;
pub const LOG_BITS_IN_BYTE: u8 = 3;
pub const BITS_IN_BYTE: usize = 1 << LOG_BITS_IN_BYTE;

pub const LOG_BYTES_IN_GBYTE: u8 = 30;
pub const BYTES_IN_GBYTE: usize = 1 << LOG_BYTES_IN_GBYTE;

pub const LOG_BYTES_IN_MBYTE: u8 = 20;
pub const BYTES_IN_MBYTE: usize = 1 << LOG_BYTES_IN_MBYTE;

pub const LOG_BYTES_IN_KBYTE: u8 = 10;
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;

#[cfg(target_pointer_width = "32")]
pub const LOG_BYTES_IN_ADDRESS: u8 = 2;
#[cfg(target_pointer_width = "64")]
pub const LOG_BYTES_IN_ADDRESS: u8 = 3;
pub const BYTES_IN_ADDRESS: usize = 1 << LOG_BYTES_IN_ADDRESS;
pub const LOG_BITS_IN_ADDRESS: usize = LOG_BITS_IN_BYTE as usize + LOG_BYTES_IN_ADDRESS as usize;
pub const BITS_IN_ADDRESS: usize = 1 << LOG_BITS_IN_ADDRESS;

pub const LOG_BYTES_IN_WORD: u8 = LOG_BYTES_IN_ADDRESS;
pub const BYTES_IN_WORD: usize = 1 << LOG_BYTES_IN_WORD;
pub const LOG_BITS_IN_WORD: usize = LOG_BITS_IN_BYTE as usize + LOG_BYTES_IN_WORD as usize;
pub const BITS_IN_WORD: usize = 1 << LOG_BITS_IN_WORD;

// Page / cache-line geometry (spec §4.1): page size = 4096, cache line =
// 64, word = 8 "unless overridden by compile-time configuration".
pub const LOG_PAGE_SIZE: u8 = 12;
pub const PAGE_SIZE: usize = 1 << LOG_PAGE_SIZE;

pub const LOG_CACHE_LINE_SIZE: u8 = 6;
pub const CACHE_LINE_SIZE: usize = 1 << LOG_CACHE_LINE_SIZE;

pub const LOG_WORD_SIZE: u8 = LOG_BYTES_IN_WORD;
pub const WORD_SIZE: usize = 1 << LOG_WORD_SIZE;

/// Cache lines per page; size of `PageAccessInfo::writes_per_cache_line`.
pub const CACHE_LINES_PER_PAGE: usize = PAGE_SIZE / CACHE_LINE_SIZE;

/// Words per cache line; size of `CacheLineDetail::word_thread_bitmask`.
pub const WORDS_PER_CACHE_LINE: usize = CACHE_LINE_SIZE / WORD_SIZE;

/// Small dense per-thread table size (spec §5, "MAX_THREAD_NUM"). Bounded
/// so `access_thread_bitmask` and each `word_thread_bitmask[w]` fit in a
/// single `AtomicU64`.
pub const MAX_THREAD_NUM: usize = 64;

/// Usable virtual address bits (spec §4.3): "the 48-bit address space".
pub const ADDRESS_SPACE_BITS: u32 = 48;

/// Default fragment count for the multi-fragment shadow (`LineShadow`);
/// see SPEC_FULL.md §4.11. Overridable via `NUMAPERF_MAX_FRAGMENTS`.
pub const DEFAULT_MAX_FRAGMENTS: usize = 1024;

/// Minimum allocator alignment the object registry assumes when turning a
/// base address into a shadow-map granule (16 bytes, the common malloc
/// alignment on 64-bit targets).
pub const LOG_OBJECT_ALIGNMENT: u8 = 4;

/// Fragment count for the object registry's shadow map.
pub const REGISTRY_FRAGMENTS: usize = 256;
