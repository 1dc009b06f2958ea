//! Atomic primitives shared by the shadow map, the object registry, and the
//! per-page/per-cache-line records (spec §4.2, component C2).
//!
//! Grounded on `util/side_mark_table.rs`'s CAS retry loop, generalized from
//! a single-bit `mark()` to arbitrary compare-and-set and bounded
//! fetch-add.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Sentinel returned by `fetch_add_bounded` when the retry budget is
/// exhausted. The caller drops the update (spec §4.2: "the profiler
/// reports approximate counts").
pub const RETRY_EXHAUSTED: u64 = u64::MAX;

/// Sequentially-consistent compare-and-set on an 8-bit tag.
#[inline]
pub fn cas8(slot: &AtomicU8, expected: u8, new: u8) -> bool {
    slot.compare_exchange(expected, new, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// Retry a bounded read-modify-write add on a 32-bit counter.
///
/// `max_retries < 0` retries forever. Returns the value *after* the
/// successful add, or `RETRY_EXHAUSTED` if the budget ran out — the caller
/// is expected to treat that as "drop this update" per spec §4.2.
pub fn fetch_add_bounded32(slot: &AtomicU32, delta: u32, max_retries: i64) -> u64 {
    let mut tries: i64 = 0;
    let mut old = slot.load(Ordering::Relaxed);
    loop {
        let new = old.wrapping_add(delta);
        match slot.compare_exchange_weak(old, new, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return new as u64,
            Err(observed) => {
                old = observed;
                tries += 1;
                if max_retries >= 0 && tries > max_retries {
                    return RETRY_EXHAUSTED;
                }
            }
        }
    }
}

/// Same as [`fetch_add_bounded32`] but for 64-bit counters.
pub fn fetch_add_bounded64(slot: &AtomicU64, delta: u64, max_retries: i64) -> u64 {
    let mut tries: i64 = 0;
    let mut old = slot.load(Ordering::Relaxed);
    loop {
        let new = old.wrapping_add(delta);
        match slot.compare_exchange_weak(old, new, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return new,
            Err(observed) => {
                old = observed;
                tries += 1;
                if max_retries >= 0 && tries > max_retries {
                    return RETRY_EXHAUSTED;
                }
            }
        }
    }
}

/// Set bit `bit` in an atomic bitmask, returning whether it was already set.
#[inline]
pub fn set_bit64(mask: &AtomicU64, bit: u8) -> bool {
    let prev = mask.fetch_or(1u64 << bit, Ordering::SeqCst);
    (prev >> bit) & 1 != 0
}
