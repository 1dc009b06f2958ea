//! Process-wide thread-id allocation (spec §5): a monotonic counter handed
//! out once per thread and cached in a thread-local for every later call.
//!
//! Grounded on `util/wp2.rs`'s `#[thread_local] static mut LOCAL` pattern,
//! generalized from a per-thread worker pointer to a per-thread small
//! integer.

use crate::constants::MAX_THREAD_NUM;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Once;

const UNASSIGNED: u32 = u32::MAX;

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(0);
static EXHAUSTED_WARNING: Once = Once::new();

#[thread_local]
static mut LOCAL_THREAD_ID: u32 = UNASSIGNED;

/// Returns this thread's profiler-assigned id, or `None` if this thread
/// was never seeded with one via [`seed`]. Never allocates: the hot path
/// calls this and drops the access on `None` rather than minting an id
/// for a thread the replacement `pthread_create` wrapper never saw.
pub fn current() -> Option<u8> {
    unsafe {
        if LOCAL_THREAD_ID == UNASSIGNED {
            None
        } else {
            Some(LOCAL_THREAD_ID as u8)
        }
    }
}

/// Assigns this thread's profiler id, allocating one on first call and
/// returning the same id on every later call from the same thread. Once
/// `MAX_THREAD_NUM` ids are handed out, every further new thread is folded
/// onto the last id (spec §7: "Thread-table exhaustion ... log once,
/// subsequently alias all overflow threads to the last valid slot").
pub fn seed() -> u8 {
    unsafe {
        if LOCAL_THREAD_ID == UNASSIGNED {
            LOCAL_THREAD_ID = allocate();
        }
        LOCAL_THREAD_ID as u8
    }
}

fn allocate() -> u32 {
    let id = NEXT_THREAD_ID.fetch_add(1, Ordering::SeqCst);
    if id < MAX_THREAD_NUM as u32 {
        return id;
    }
    EXHAUSTED_WARNING.call_once(|| {
        log::warn!(
            "numaperf: thread table exhausted ({} threads seen), aliasing further threads to id {}",
            id + 1,
            MAX_THREAD_NUM - 1
        );
    });
    (MAX_THREAD_NUM - 1) as u32
}
