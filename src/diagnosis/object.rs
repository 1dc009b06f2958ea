//! `ObjectDiagnosis` (spec §3, §4.8): the synthesized per-free report for
//! one object, plus the seriousness score used to rank it against every
//! other diagnosis at the same call site.

use crate::constants::WORDS_PER_CACHE_LINE;
use crate::registry::ObjectInfo;
use smallvec::SmallVec;

/// A snapshot of one escalated cache line that intersects an object's
/// extent. Plain owned data rather than a shadow-map reference: the
/// diagnosis outlives the single `on_free` call that produced it, so it
/// is cheaper to copy a few integers out than to carry a borrow of the
/// process-wide shadow map through `CallSiteDiagnosis`'s lifetime.
#[derive(Debug, Clone)]
pub struct CacheLineSummary {
    pub start_address: u64,
    pub invalidations_by_first_touch_thread: u64,
    pub invalidations_by_other_threads: u64,
    pub access_thread_bitmask: u64,
    pub word_thread_bitmask: Option<[u64; WORDS_PER_CACHE_LINE]>,
}

impl CacheLineSummary {
    pub fn total_invalidations(&self) -> u64 {
        self.invalidations_by_first_touch_thread + self.invalidations_by_other_threads
    }
}

/// Per-page verdict for a multi-page object (spec §3, `PageDiagnosis`).
#[derive(Debug, Clone)]
pub struct PageDiagnosisSummary {
    pub page_base: u64,
    pub access_thread_bitmask_in_page: u64,
    pub access_thread_bitmask_from_self: u64,
    pub allocator_caused: bool,
}

#[derive(Debug, Clone)]
pub struct ObjectDiagnosis {
    pub info: ObjectInfo,
    pub invalidations_in_first_touch_thread: u64,
    pub invalidations_in_other_threads: u64,
    pub accesses_in_first_touch_thread: u64,
    pub accesses_in_other_threads: u64,
    /// Inline up to the default top-K depth: most objects intersect far
    /// fewer escalated lines/pages than that, so this rarely spills to the
    /// heap.
    pub top_lines: SmallVec<[CacheLineSummary; 8]>,
    pub top_pages: SmallVec<[PageDiagnosisSummary; 8]>,
}

impl ObjectDiagnosis {
    pub fn total_invalidations(&self) -> u64 {
        self.invalidations_in_first_touch_thread + self.invalidations_in_other_threads
    }

    /// Number of distinct threads observed touching this object, derived
    /// from the union of every summarized cache line's thread bitmask.
    pub fn distinct_threads(&self) -> u32 {
        self.top_lines
            .iter()
            .fold(0u64, |acc, line| acc | line.access_thread_bitmask)
            .count_ones()
    }

    /// Seriousness score (spec §9 open question, resolved in
    /// SPEC_FULL.md §9.2): total invalidations weighted by the number of
    /// distinct threads involved. Pure and total-ordered, as required for
    /// heap ordering in `TopK`.
    pub fn seriousness(&self) -> u64 {
        self.total_invalidations() * self.distinct_threads().max(1) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(invalidations: u64, bitmask: u64) -> CacheLineSummary {
        CacheLineSummary {
            start_address: 0,
            invalidations_by_first_touch_thread: invalidations,
            invalidations_by_other_threads: 0,
            access_thread_bitmask: bitmask,
            word_thread_bitmask: None,
        }
    }

    fn diagnosis(lines: Vec<CacheLineSummary>) -> ObjectDiagnosis {
        ObjectDiagnosis {
            info: ObjectInfo {
                start_address: 0x1000,
                size: 64,
                call_site: 1,
            },
            invalidations_in_first_touch_thread: lines
                .iter()
                .map(|l| l.invalidations_by_first_touch_thread)
                .sum(),
            invalidations_in_other_threads: 0,
            accesses_in_first_touch_thread: 0,
            accesses_in_other_threads: 0,
            top_lines: SmallVec::from_vec(lines),
            top_pages: SmallVec::new(),
        }
    }

    #[test]
    fn more_invalidations_never_decreases_the_score() {
        let low = diagnosis(vec![line(5, 0b11)]);
        let high = diagnosis(vec![line(50, 0b11)]);
        assert!(high.seriousness() >= low.seriousness());
    }

    #[test]
    fn more_distinct_threads_never_decreases_the_score_at_fixed_invalidations() {
        let fewer_threads = diagnosis(vec![line(10, 0b1)]);
        let more_threads = diagnosis(vec![line(10, 0b1111)]);
        assert!(more_threads.seriousness() >= fewer_threads.seriousness());
    }

    #[test]
    fn zero_invalidations_scores_zero() {
        let d = diagnosis(vec![line(0, 0b11)]);
        assert_eq!(d.seriousness(), 0);
    }
}
