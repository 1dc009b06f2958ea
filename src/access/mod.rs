//! Access-tracking data structures: the per-page record (C5), the
//! per-cache-line detail record (C6), and the hot path that drives both
//! (C7).

pub mod cache_line;
pub mod hotpath;
pub mod page;

use crate::constants::{LOG_CACHE_LINE_SIZE, LOG_PAGE_SIZE};
use crate::shadow::ShadowMap;
use cache_line::CacheLineDetail;
use page::PageAccessInfo;

/// The kind of memory access the instrumentation pass reports (spec §6,
/// `on_access(addr, kind)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

/// Single-fragment shadow: one `PageAccessInfo` per touched 4 KiB page.
pub type PageShadow = ShadowMap<PageAccessInfo>;

/// Multi-fragment shadow: one `CacheLineDetail` per escalated cache line.
pub type LineShadow = ShadowMap<CacheLineDetail>;

pub fn new_page_shadow() -> PageShadow {
    ShadowMap::new(LOG_PAGE_SIZE, 1)
}

pub fn new_line_shadow(num_fragments: usize) -> LineShadow {
    ShadowMap::new(LOG_CACHE_LINE_SIZE, num_fragments)
}
