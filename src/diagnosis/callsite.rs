//! `CallSiteDiagnosis` (spec §3, §4.8 step 5): one bounded top-K queue of
//! `ObjectDiagnosis` per allocation site, plus the process-wide table that
//! holds one per call site for the lifetime of the process.
//!
//! Grounded on `analysis/stats.rs`'s `HashMap<usize, u64>`-keyed
//! aggregation style, generalized to a per-key bounded priority queue
//! instead of a single running total.

use super::object::ObjectDiagnosis;
use super::topk::{Scored, TopK};
use std::collections::HashMap;
use std::sync::Mutex;

pub struct CallSiteDiagnosis {
    top_k: TopK<ObjectDiagnosis>,
}

impl CallSiteDiagnosis {
    fn new(capacity: usize) -> Self {
        CallSiteDiagnosis {
            top_k: TopK::new(capacity),
        }
    }

    pub fn push(&mut self, diagnosis: ObjectDiagnosis) {
        let score = diagnosis.seriousness();
        self.top_k.push(score, diagnosis);
    }

    pub fn into_ranked(self) -> Vec<Scored<ObjectDiagnosis>> {
        self.top_k.into_sorted_vec()
    }

    pub fn is_empty(&self) -> bool {
        self.top_k.is_empty()
    }
}

/// Process-wide table of `CallSiteDiagnosis`, one per call-site ID, built
/// up as objects are freed and drained once at `on_exit()`.
pub struct CallSiteTable {
    top_k_capacity: usize,
    sites: Mutex<HashMap<u32, CallSiteDiagnosis>>,
}

impl CallSiteTable {
    pub fn new(top_k_capacity: usize) -> Self {
        CallSiteTable {
            top_k_capacity,
            sites: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, diagnosis: ObjectDiagnosis) {
        let call_site = diagnosis.info.call_site;
        let mut sites = self.sites.lock().unwrap();
        sites
            .entry(call_site)
            .or_insert_with(|| CallSiteDiagnosis::new(self.top_k_capacity))
            .push(diagnosis);
    }

    /// Drain every call site's diagnoses, sorted by call-site ID for
    /// deterministic report ordering.
    pub fn drain_sorted(&self) -> Vec<(u32, Vec<Scored<ObjectDiagnosis>>)> {
        let mut sites = self.sites.lock().unwrap();
        let mut drained: Vec<(u32, Vec<Scored<ObjectDiagnosis>>)> = sites
            .drain()
            .map(|(site, diag)| (site, diag.into_ranked()))
            .collect();
        drained.sort_by_key(|(site, _)| *site);
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ObjectInfo;

    fn diagnosis(call_site: u32, invalidations: u64) -> ObjectDiagnosis {
        ObjectDiagnosis {
            info: ObjectInfo {
                start_address: 0x1000,
                size: 64,
                call_site,
            },
            invalidations_in_first_touch_thread: invalidations,
            invalidations_in_other_threads: 0,
            accesses_in_first_touch_thread: 0,
            accesses_in_other_threads: 0,
            top_lines: Default::default(),
            top_pages: Default::default(),
        }
    }

    #[test]
    fn diagnoses_land_in_exactly_one_call_site_bucket() {
        let table = CallSiteTable::new(4);
        table.record(diagnosis(1, 10));
        table.record(diagnosis(2, 20));
        table.record(diagnosis(1, 30));
        let drained = table.drain_sorted();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].0, 1);
        assert_eq!(drained[0].1.len(), 2);
        assert_eq!(drained[1].0, 2);
        assert_eq!(drained[1].1.len(), 1);
    }

    #[test]
    fn top_k_capacity_is_enforced_per_call_site() {
        let table = CallSiteTable::new(1);
        table.record(diagnosis(1, 5));
        table.record(diagnosis(1, 50));
        let drained = table.drain_sorted();
        assert_eq!(drained[0].1.len(), 1);
        assert_eq!(drained[0].1[0].score, 50);
    }
}
