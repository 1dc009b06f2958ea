//! Per-page access record (spec §4.5, component C5).

use crate::atomics::{fetch_add_bounded32, fetch_add_bounded64, set_bit64, RETRY_EXHAUSTED};
use crate::constants::CACHE_LINES_PER_PAGE;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Retry budget for the counters below. Unbounded retries would turn a
/// contended page into an unbounded spin loop; a few retries before
/// dropping the update keeps the hot path's worst case bounded, at the
/// cost of the approximate-counting behavior spec §4.2/§7 explicitly
/// allows.
const COUNTER_RETRY_BUDGET: i64 = 8;

pub struct PageAccessInfo {
    /// Set exactly once, by whichever caller's `insert_if_absent` closure
    /// constructs this record (either `on_access`'s hot path or
    /// `on_first_touch`'s OS-signal handler, whichever ran first — see
    /// `shadow::ShadowMap`'s own NOT_INSERTED/INSERTING/INSERTED tag,
    /// which already arbitrates that race for us).
    pub first_touch_thread_id: u8,
    pub accesses_by_other_threads: AtomicU64,
    /// Accesses by the first-touch thread itself, needed at free time to
    /// tell "the page's own history" apart from "this object's history"
    /// when classifying allocator-caused vs application-caused sharing
    /// (spec §4.8 step 3).
    pub accesses_by_first_touch_thread: AtomicU64,
    pub writes_per_cache_line: [AtomicU32; CACHE_LINES_PER_PAGE],
    /// One bit per cache line in the page: set by the allocation hook for
    /// the first/last line of every object that lands on this page
    /// (spec §4.6 "Partial occupancy").
    partially_occupied: AtomicU64,
}

impl PageAccessInfo {
    pub fn new(first_touch_thread_id: u8) -> Self {
        PageAccessInfo {
            first_touch_thread_id,
            accesses_by_other_threads: AtomicU64::new(0),
            accesses_by_first_touch_thread: AtomicU64::new(0),
            writes_per_cache_line: std::array::from_fn(|_| AtomicU32::new(0)),
            partially_occupied: AtomicU64::new(0),
        }
    }

    /// Record one access by `tid` to cache line `line_idx` within this
    /// page. Returns whether `accesses_by_other_threads` has crossed
    /// `PAGE_SHARING_DETAIL_THRESHOLD` as a result.
    pub fn record_access(
        &self,
        tid: u8,
        is_write: bool,
        line_idx: usize,
        page_threshold: u64,
    ) -> bool {
        let mut crossed_page_threshold = false;
        if tid != self.first_touch_thread_id {
            let after =
                fetch_add_bounded64(&self.accesses_by_other_threads, 1, COUNTER_RETRY_BUDGET);
            let observed = if after == RETRY_EXHAUSTED {
                self.accesses_by_other_threads.load(Ordering::Relaxed)
            } else {
                after
            };
            crossed_page_threshold = observed > page_threshold;
        } else {
            fetch_add_bounded64(&self.accesses_by_first_touch_thread, 1, COUNTER_RETRY_BUDGET);
        }
        if is_write {
            fetch_add_bounded32(&self.writes_per_cache_line[line_idx], 1, COUNTER_RETRY_BUDGET);
        }
        crossed_page_threshold
    }

    /// Whether cache line `line_idx`'s write count has crossed
    /// `CACHE_SHARING_DETAIL_THRESHOLD`, i.e. whether it should be (or
    /// already has been) escalated to a `CacheLineDetail`.
    pub fn line_crossed_threshold(&self, line_idx: usize, cache_threshold: u32) -> bool {
        self.writes_per_cache_line[line_idx].load(Ordering::Relaxed) > cache_threshold
    }

    pub fn writes_on_line(&self, line_idx: usize) -> u32 {
        self.writes_per_cache_line[line_idx].load(Ordering::Relaxed)
    }

    pub fn accesses_by_others(&self) -> u64 {
        self.accesses_by_other_threads.load(Ordering::Relaxed)
    }

    pub fn accesses_by_first_touch(&self) -> u64 {
        self.accesses_by_first_touch_thread.load(Ordering::Relaxed)
    }

    pub fn mark_partially_occupied(&self, line_idx: usize) {
        set_bit64(&self.partially_occupied, line_idx as u8);
    }

    pub fn is_partially_occupied(&self, line_idx: usize) -> bool {
        (self.partially_occupied.load(Ordering::Relaxed) >> line_idx) & 1 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_touch_thread_never_counted_as_other() {
        let page = PageAccessInfo::new(3);
        for _ in 0..10 {
            page.record_access(3, false, 0, 5);
        }
        assert_eq!(page.accesses_by_others(), 0);
    }

    #[test]
    fn other_threads_increment_and_cross_threshold() {
        let page = PageAccessInfo::new(0);
        let mut crossed = false;
        for _ in 0..20 {
            crossed = page.record_access(1, false, 0, 10) || crossed;
        }
        assert!(crossed);
        assert_eq!(page.accesses_by_others(), 20);
    }

    #[test]
    fn writes_are_tallied_per_cache_line() {
        let page = PageAccessInfo::new(0);
        page.record_access(0, true, 2, 1000);
        page.record_access(0, true, 2, 1000);
        page.record_access(0, true, 5, 1000);
        assert_eq!(page.writes_on_line(2), 2);
        assert_eq!(page.writes_on_line(5), 1);
        assert_eq!(page.writes_on_line(0), 0);
    }

    #[test]
    fn partial_occupancy_bits_are_independent_per_line() {
        let page = PageAccessInfo::new(0);
        page.mark_partially_occupied(0);
        page.mark_partially_occupied(10);
        assert!(page.is_partially_occupied(0));
        assert!(page.is_partially_occupied(10));
        assert!(!page.is_partially_occupied(1));
    }
}
