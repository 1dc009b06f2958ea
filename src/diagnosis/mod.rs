//! Object lifecycle & diagnosis (spec §4.8, component C8): the allocation
//! hook's bookkeeping and the free hook's sweep-and-synthesize pipeline.
//!
//! Grounded on `analysis/mod.rs`'s accumulate-then-report shape (walk a
//! structure, fold into a stats struct, hand the struct off), generalized
//! from a single whole-trace pass to one pass per freed object.

pub mod callsite;
pub mod object;
pub mod topk;

use crate::access::{LineShadow, PageShadow};
use crate::addr;
use crate::config::Config;
use crate::constants::{CACHE_LINES_PER_PAGE, CACHE_LINE_SIZE, PAGE_SIZE, WORDS_PER_CACHE_LINE};
use crate::registry::Registry;
use callsite::CallSiteTable;
use object::{CacheLineSummary, ObjectDiagnosis, PageDiagnosisSummary};
use topk::TopK;

/// On allocation: register the object and mark the cache lines at either
/// end of its extent as partially-occupied (spec §4.8, "On allocation").
/// Interior lines of a multi-line object need no marking: they can only
/// ever belong to this one object.
pub fn register_object(
    registry: &Registry,
    pages: &PageShadow,
    start_address: u64,
    size: u64,
    call_site: u32,
    allocating_tid: u8,
) {
    registry.register(start_address, size, call_site);

    let end = start_address + size.max(1) - 1;
    for boundary in [start_address, end] {
        let page_base = addr::page_base(boundary);
        if let Some(page) = pages.insert_if_absent(page_base, || {
            crate::access::page::PageAccessInfo::new(allocating_tid)
        }) {
            page.mark_partially_occupied(addr::cache_line_index_in_page(boundary));
        }
    }
}

/// On free: diagnose and unregister. Returns `None` if there was no
/// matching live object (spec §7: "Free without matching allocation:
/// drop"), which also makes a double-free of the same address a no-op on
/// the second call (spec §8, "Idempotent diagnosis").
pub fn free_object(
    registry: &Registry,
    pages: &PageShadow,
    lines: &LineShadow,
    call_sites: &CallSiteTable,
    config: &Config,
    start_address: u64,
) -> bool {
    let Some(info) = registry.lookup_by_start_address(start_address) else {
        return false;
    };

    let mut invalidations_in_first_touch_thread = 0u64;
    let mut invalidations_in_other_threads = 0u64;
    let mut accesses_in_first_touch_thread = 0u64;
    let mut accesses_in_other_threads = 0u64;
    let mut top_lines: TopK<CacheLineSummary> = TopK::new(config.top_k);
    let mut top_pages: TopK<PageDiagnosisSummary> = TopK::new(config.top_k);

    let object_end = info.start_address + info.size.max(1);
    // PageDiagnosis is only meaningful for objects that straddle more than
    // one cache line: a single-line object can't itself be the victim of
    // allocator-induced page sharing at cache-line granularity.
    let object_spans_multiple_cache_lines =
        addr::cache_line_start(info.start_address) != addr::cache_line_start(object_end - 1);
    let mut page_base = addr::page_base(info.start_address);
    while page_base < object_end {
        if let Some(page) = pages.find(page_base) {
            accesses_in_first_touch_thread += page.accesses_by_first_touch();
            accesses_in_other_threads += page.accesses_by_others();

            let page_end = page_base + PAGE_SIZE as u64;
            let range_start = info.start_address.max(page_base);
            let range_end = object_end.min(page_end);
            let first_line = addr::cache_line_index_in_page(range_start);
            let last_line = addr::cache_line_index_in_page(range_end - 1);

            let mut object_own_first_touch = 0u64;
            let mut self_thread_bitmask = 0u64;

            for line_idx in first_line..=last_line {
                let line_start = page_base + (line_idx as u64) * CACHE_LINE_SIZE as u64;
                if let Some(detail) = lines.find(line_start) {
                    object_own_first_touch +=
                        detail.reads_by(page.first_touch_thread_id) as u64
                            + detail.writes_by(page.first_touch_thread_id) as u64;
                    self_thread_bitmask |= detail.access_threads();

                    invalidations_in_first_touch_thread +=
                        detail.invalidations_by_first_touch_thread.load(
                            std::sync::atomic::Ordering::Relaxed,
                        );
                    invalidations_in_other_threads += detail
                        .invalidations_by_other_threads
                        .load(std::sync::atomic::Ordering::Relaxed);

                    let word_thread_bitmask = if detail.partially_occupied {
                        Some(std::array::from_fn(|w| detail.word_threads(w)))
                    } else {
                        None
                    };
                    top_lines.push(
                        detail.total_invalidations(),
                        CacheLineSummary {
                            start_address: line_start,
                            invalidations_by_first_touch_thread: detail
                                .invalidations_by_first_touch_thread
                                .load(std::sync::atomic::Ordering::Relaxed),
                            invalidations_by_other_threads: detail
                                .invalidations_by_other_threads
                                .load(std::sync::atomic::Ordering::Relaxed),
                            access_thread_bitmask: detail.access_threads(),
                            word_thread_bitmask,
                        },
                    );
                }
                // A non-escalated line has no per-thread write counter, so
                // it contributes nothing toward the first-touch thread's
                // own count rather than the page's all-threads aggregate.
            }

            if object_spans_multiple_cache_lines {
                // Whole-page thread union: every escalated line on the
                // page, not just the ones this object's own extent
                // intersects. `access_thread_bitmask_from_self` below stays
                // restricted to the object's own lines.
                let mut page_thread_bitmask = 0u64;
                for line_idx in 0..CACHE_LINES_PER_PAGE {
                    let line_start = page_base + (line_idx as u64) * CACHE_LINE_SIZE as u64;
                    if let Some(detail) = lines.find(line_start) {
                        page_thread_bitmask |= detail.access_threads();
                    }
                }

                let page_total_first_touch = page.accesses_by_first_touch();
                let allocator_caused = (page_total_first_touch as f64)
                    > config.allocator_ratio * object_own_first_touch as f64;

                top_pages.push(
                    page.accesses_by_others(),
                    PageDiagnosisSummary {
                        page_base,
                        access_thread_bitmask_in_page: page_thread_bitmask,
                        access_thread_bitmask_from_self: self_thread_bitmask,
                        allocator_caused,
                    },
                );
            }
        }
        page_base += PAGE_SIZE as u64;
    }

    let diagnosis = ObjectDiagnosis {
        info,
        invalidations_in_first_touch_thread,
        invalidations_in_other_threads,
        accesses_in_first_touch_thread,
        accesses_in_other_threads,
        top_lines: top_lines.into_sorted_vec().into_iter().map(|s| s.value).collect(),
        top_pages: top_pages.into_sorted_vec().into_iter().map(|s| s.value).collect(),
    };

    // Per spec §4.8 step 6: unregister the object but leave the shadow
    // maps untouched, so a future allocation at this address inherits the
    // access history recorded here.
    registry.unregister(start_address);
    call_sites.record(diagnosis);
    true
}

#[allow(dead_code)]
const _ASSERT_WORDS_PER_LINE: usize = WORDS_PER_CACHE_LINE;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{new_line_shadow, new_page_shadow, hotpath, AccessKind};

    fn thresholds(config: &Config) -> hotpath::HotPathThresholds {
        hotpath::HotPathThresholds {
            page_sharing_threshold: config.page_sharing_threshold,
            cache_line_detail_threshold: config.cache_line_detail_threshold,
        }
    }

    #[test]
    fn free_without_allocation_is_a_no_op() {
        let registry = Registry::with_fragments(4);
        let pages = new_page_shadow();
        let lines = new_line_shadow(4);
        let call_sites = CallSiteTable::new(4);
        let config = Config::default();
        assert!(!free_object(&registry, &pages, &lines, &call_sites, &config, 0xdead));
    }

    #[test]
    fn double_free_only_diagnoses_once() {
        let registry = Registry::with_fragments(4);
        let pages = new_page_shadow();
        let lines = new_line_shadow(4);
        let call_sites = CallSiteTable::new(4);
        let config = Config::default();

        register_object(&registry, &pages, 0x10_0000, 64, 1, 0);
        assert!(free_object(&registry, &pages, &lines, &call_sites, &config, 0x10_0000));
        assert!(!free_object(&registry, &pages, &lines, &call_sites, &config, 0x10_0000));

        let drained = call_sites.drain_sorted();
        assert_eq!(drained[0].1.len(), 1);
    }

    #[test]
    fn true_sharing_object_is_diagnosed_as_application_caused_on_its_own_page() {
        let registry = Registry::with_fragments(4);
        let pages = new_page_shadow();
        let lines = new_line_shadow(4);
        let call_sites = CallSiteTable::new(4);
        let config = Config::default();
        let cfg = thresholds(&config);

        let addr = 0x20_0000u64;
        register_object(&registry, &pages, addr, 8, 2, 0);
        for t in 0..4u8 {
            for _ in 0..2000 {
                hotpath::on_access(&pages, &lines, addr, AccessKind::Write, t, &cfg);
            }
        }
        free_object(&registry, &pages, &lines, &call_sites, &config, addr);
        let drained = call_sites.drain_sorted();
        let diag = &drained[0].1[0].value;
        assert!(diag.total_invalidations() > 0);
    }

    #[test]
    fn single_cache_line_object_has_no_page_diagnosis() {
        let registry = Registry::with_fragments(4);
        let pages = new_page_shadow();
        let lines = new_line_shadow(4);
        let call_sites = CallSiteTable::new(4);
        let config = Config::default();
        let cfg = thresholds(&config);

        let addr = 0x21_0000u64;
        register_object(&registry, &pages, addr, 8, 2, 0);
        for t in 0..4u8 {
            for _ in 0..2000 {
                hotpath::on_access(&pages, &lines, addr, AccessKind::Write, t, &cfg);
            }
        }
        free_object(&registry, &pages, &lines, &call_sites, &config, addr);
        let drained = call_sites.drain_sorted();
        let diag = &drained[0].1[0].value;
        assert!(diag.top_pages.is_empty());
    }

    #[test]
    fn multi_line_object_true_sharing_is_diagnosed_as_application_caused() {
        let registry = Registry::with_fragments(4);
        let pages = new_page_shadow();
        let lines = new_line_shadow(4);
        let call_sites = CallSiteTable::new(4);
        let config = Config::default();
        let cfg = thresholds(&config);

        // Two cache lines, heavily written by the same four threads on
        // both lines: no allocator-induced skew between lines.
        let addr = 0x22_0000u64;
        register_object(&registry, &pages, addr, 2 * CACHE_LINE_SIZE as u64, 3, 0);
        for t in 0..4u8 {
            for _ in 0..2000 {
                hotpath::on_access(&pages, &lines, addr, AccessKind::Write, t, &cfg);
                hotpath::on_access(
                    &pages,
                    &lines,
                    addr + CACHE_LINE_SIZE as u64,
                    AccessKind::Write,
                    t,
                    &cfg,
                );
            }
        }
        free_object(&registry, &pages, &lines, &call_sites, &config, addr);
        let drained = call_sites.drain_sorted();
        let diag = &drained[0].1[0].value;
        assert!(diag.total_invalidations() > 0);
        assert!(!diag.top_pages.is_empty());
        assert!(!diag.top_pages[0].allocator_caused);
        assert_eq!(
            diag.top_pages[0].access_thread_bitmask_in_page,
            diag.top_pages[0].access_thread_bitmask_from_self
        );
    }
}
