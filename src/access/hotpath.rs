//! The access hot path (spec §4.7, component C7): the single function the
//! instrumentation pass's `on_access` hook calls for every load/store in
//! the target program. Everything here is built from C1-C6 so it stays
//! lock-free and allocation-free on the path that actually runs once per
//! memory access.

use super::cache_line::CacheLineDetail;
use super::page::PageAccessInfo;
use super::{AccessKind, LineShadow, PageShadow};
use crate::addr;

/// The thresholds the hot path needs; owned by `engine::Engine`'s
/// `Config` and passed in by reference so this module stays free of any
/// global state of its own.
#[derive(Debug, Clone, Copy)]
pub struct HotPathThresholds {
    pub page_sharing_threshold: u64,
    pub cache_line_detail_threshold: u32,
}

/// Record one access. Returns `true` if the access was attributed to a
/// live page record; `false` means the page shadow has no fragment left
/// to serve this address (already logged once by the shadow map itself)
/// and the access was silently dropped, per spec §7.
pub fn on_access(
    pages: &PageShadow,
    lines: &LineShadow,
    addr: u64,
    kind: AccessKind,
    tid: u8,
    thresholds: &HotPathThresholds,
) -> bool {
    let Some(page) = pages.insert_if_absent(addr::page_base(addr), || PageAccessInfo::new(tid))
    else {
        return false;
    };

    let line_in_page = addr::cache_line_index_in_page(addr);
    let word_idx = addr::word_index_in_cache_line(addr);
    let is_write = kind == AccessKind::Write;

    match lines.find(addr) {
        Some(detail) => {
            record_on_detail(detail, kind, tid, word_idx, page.first_touch_thread_id);
            page.record_access(tid, is_write, line_in_page, thresholds.page_sharing_threshold);
        }
        None => {
            page.record_access(tid, is_write, line_in_page, thresholds.page_sharing_threshold);
            if is_write
                && page.line_crossed_threshold(line_in_page, thresholds.cache_line_detail_threshold)
            {
                // First thread to observe the crossing creates the detail
                // record; everyone else's `insert_if_absent` just finds it.
                // Either way, the access that triggered this branch must
                // itself be applied to the record it just caused to exist.
                if let Some(detail) = lines.insert_if_absent(addr, || {
                    CacheLineDetail::new(
                        addr::cache_line_start(addr),
                        page.is_partially_occupied(line_in_page),
                    )
                }) {
                    record_on_detail(detail, kind, tid, word_idx, page.first_touch_thread_id);
                }
            }
        }
    }

    true
}

fn record_on_detail(
    detail: &CacheLineDetail,
    kind: AccessKind,
    tid: u8,
    word_idx: usize,
    first_touch_tid: u8,
) {
    match kind {
        AccessKind::Write => detail.record_write(tid, word_idx, first_touch_tid),
        AccessKind::Read => detail.record_read(tid, word_idx, first_touch_tid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{new_line_shadow, new_page_shadow};

    fn thresholds() -> HotPathThresholds {
        HotPathThresholds {
            page_sharing_threshold: 100,
            cache_line_detail_threshold: 50,
        }
    }

    #[test]
    fn single_access_creates_a_page_record() {
        let pages = new_page_shadow();
        let lines = new_line_shadow(4);
        assert!(on_access(&pages, &lines, 0x10_0000, AccessKind::Read, 0, &thresholds()));
        assert!(pages.find(addr::page_base(0x10_0000)).is_some());
    }

    #[test]
    fn crossing_write_threshold_escalates_to_a_detail_record() {
        let pages = new_page_shadow();
        let lines = new_line_shadow(4);
        let cfg = thresholds();
        let a = 0x20_0000u64;
        for _ in 0..(cfg.cache_line_detail_threshold as usize + 5) {
            on_access(&pages, &lines, a, AccessKind::Write, 1, &cfg);
        }
        assert!(lines.find(a).is_some());
    }

    #[test]
    fn two_threads_on_same_line_both_counted_once_escalated() {
        let pages = new_page_shadow();
        let lines = new_line_shadow(4);
        let cfg = thresholds();
        let a = 0x30_0000u64;
        for _ in 0..(cfg.cache_line_detail_threshold as usize + 5) {
            on_access(&pages, &lines, a, AccessKind::Write, 0, &cfg);
        }
        // Now escalated; further accesses by a second thread should land on
        // the detail record's per-thread counters.
        on_access(&pages, &lines, a + 8, AccessKind::Write, 1, &cfg);
        let detail = lines.find(a).unwrap();
        assert!(detail.access_threads() & 0b11 == 0b11);
    }

    #[test]
    fn distinct_pages_are_independent() {
        let pages = new_page_shadow();
        let lines = new_line_shadow(4);
        let cfg = thresholds();
        on_access(&pages, &lines, 0x1000, AccessKind::Read, 0, &cfg);
        on_access(&pages, &lines, 0x2000, AccessKind::Read, 1, &cfg);
        let p1 = pages.find(addr::page_base(0x1000)).unwrap();
        let p2 = pages.find(addr::page_base(0x2000)).unwrap();
        assert_eq!(p1.first_touch_thread_id, 0);
        assert_eq!(p2.first_touch_thread_id, 1);
    }
}
