//! Sparse, paged shadow map (spec §4.3, component C3).
//!
//! A mapping from a raw virtual address to a fixed-size `Value` slot, with
//! semantics {`insert_if_absent`, `insert`, `find`, `remove`}, all O(1) on
//! the hot path. The 48-bit address space is partitioned into
//! `num_fragments` equally-sized segments; each segment's slot array is
//! allocated lazily the first time any address inside it is touched. A
//! single per-map `Mutex` guards fragment allocation; a second check under
//! the lock avoids double-mapping. Each slot carries a three-state tag —
//! NOT_INSERTED/INSERTING/INSERTED — and readers only trust the value once
//! the tag reads INSERTED.
//!
//! Two flavors share this one generic template (spec §4.3): a
//! single-fragment flavor (`num_fragments == 1`, used for the per-page
//! shadow, where one contiguous reservation suffices) and a multi-fragment
//! flavor (used for the fine-grained cache-line shadow, where eagerly
//! reserving a slot per cache line across the whole address space would
//! overflow it).
//!
//! Grounded on `util/side_mark_table.rs`'s flat `Vec<AtomicU8>` +
//! shift-based indexing, generalized to lazily-mapped fragments holding an
//! arbitrary `Value` type.

mod fragment;

use crate::constants::ADDRESS_SPACE_BITS;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};
use std::sync::Mutex;

pub const NOT_INSERTED: u8 = 0;
pub const INSERTING: u8 = 1;
pub const INSERTED: u8 = 2;

struct Slot<V> {
    tag: AtomicU8,
    value: UnsafeCell<MaybeUninit<V>>,
}

impl<V> Slot<V> {
    fn blank() -> Self {
        Slot {
            tag: AtomicU8::new(NOT_INSERTED),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

// SAFETY: all cross-thread access to `value` is gated by `tag`'s
// NOT_INSERTED -> INSERTING -> INSERTED protocol, exactly the invariant
// `util/side_mark_table.rs` relies on for its own `unsafe impl Sync`.
unsafe impl<V: Send> Sync for Slot<V> {}

pub struct ShadowMap<V> {
    fragments: Vec<AtomicPtr<Slot<V>>>,
    entries_per_fragment: usize,
    key_shift: u8,
    alloc_lock: Mutex<()>,
    exhausted: std::sync::Once,
}

impl<V> ShadowMap<V> {
    /// `key_shift` turns an address into the granule index this map is
    /// keyed by (e.g. `LOG_PAGE_SIZE` or `LOG_CACHE_LINE_SIZE`).
    /// `num_fragments` must be a power of two; `1` selects the
    /// single-fragment flavor (the whole granule range is one fragment,
    /// reserved eagerly since `Value` is expected to be small).
    pub fn new(key_shift: u8, num_fragments: usize) -> Self {
        assert!(num_fragments.is_power_of_two());
        let total_granule_bits = ADDRESS_SPACE_BITS - key_shift as u32;
        let frag_bits = num_fragments.trailing_zeros();
        assert!(
            frag_bits <= total_granule_bits,
            "too many fragments for this key_shift"
        );
        let entries_per_fragment = 1usize << (total_granule_bits - frag_bits);
        let map = ShadowMap {
            fragments: (0..num_fragments)
                .map(|_| AtomicPtr::new(std::ptr::null_mut()))
                .collect(),
            entries_per_fragment,
            key_shift,
            alloc_lock: Mutex::new(()),
            exhausted: std::sync::Once::new(),
        };
        if num_fragments == 1 {
            // Single-fragment flavor: reserve the whole range up front.
            // Physical pages are still committed lazily by the kernel.
            map.ensure_fragment(0);
        }
        map
    }

    fn granule(&self, key: u64) -> u64 {
        key >> self.key_shift
    }

    fn fragment_index(&self, granule: u64) -> usize {
        (granule / self.entries_per_fragment as u64) as usize
    }

    fn offset_in_fragment(&self, granule: u64) -> usize {
        (granule % self.entries_per_fragment as u64) as usize
    }

    /// Returns the fragment's slot array, mapping it in on first use.
    /// Returns `None` if `frag_id` is outside the supported range (spec
    /// §7: "Shadow-fragment exhaustion ... log once, drop the access").
    fn ensure_fragment(&self, frag_id: usize) -> Option<*mut Slot<V>> {
        let existing = self.fragments.get(frag_id)?.load(Ordering::Acquire);
        if !existing.is_null() {
            return Some(existing);
        }
        let _guard = self.alloc_lock.lock().unwrap();
        // Double-check under the lock.
        let existing = self.fragments[frag_id].load(Ordering::Acquire);
        if !existing.is_null() {
            return Some(existing);
        }
        let len = self.entries_per_fragment * std::mem::size_of::<Slot<V>>();
        let raw = match fragment::reserve(len) {
            Ok(ptr) => ptr as *mut Slot<V>,
            Err(e) => {
                self.exhausted.call_once(|| {
                    log::error!("numaperf: failed to reserve shadow fragment: {e}");
                });
                return None;
            }
        };
        // The reservation is zero-filled by the kernel; a zeroed
        // `AtomicU8` tag is NOT_INSERTED, which is exactly the blank
        // `Slot::blank()` state, so no per-slot initialization is needed.
        self.fragments[frag_id].store(raw, Ordering::Release);
        Some(raw)
    }

    fn slot(&self, key: u64) -> Option<&Slot<V>> {
        let granule = self.granule(key);
        let frag_id = self.fragment_index(granule);
        let offset = self.offset_in_fragment(granule);
        let base = self.ensure_fragment(frag_id)?;
        Some(unsafe { &*base.add(offset) })
    }

    /// Look up `key`. Returns `None` if absent, including a slot that is
    /// transiently INSERTING (spec §4.3/§5: "readers tolerate transiently
    /// INSERTING slots ... treating them as absent").
    pub fn find(&self, key: u64) -> Option<&V> {
        let slot = self.slot(key)?;
        if slot.tag.load(Ordering::Acquire) == INSERTED {
            Some(unsafe { &*(*slot.value.get()).as_ptr() })
        } else {
            None
        }
    }

    /// Insert-if-absent: if the slot is already INSERTED, return the
    /// existing value. Otherwise race to become the inserting thread via
    /// CAS; the loser busy-waits for INSERTED (spec §4.3: "expected to be
    /// brief").
    pub fn insert_if_absent<F: FnOnce() -> V>(&self, key: u64, init: F) -> Option<&V> {
        let slot = self.slot(key)?;
        loop {
            match slot.tag.load(Ordering::Acquire) {
                INSERTED => return Some(unsafe { &*(*slot.value.get()).as_ptr() }),
                NOT_INSERTED => {
                    if slot
                        .tag
                        .compare_exchange(
                            NOT_INSERTED,
                            INSERTING,
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        )
                        .is_ok()
                    {
                        unsafe { (*slot.value.get()).write(init()) };
                        slot.tag.store(INSERTED, Ordering::Release);
                        return Some(unsafe { &*(*slot.value.get()).as_ptr() });
                    }
                    // Lost the race; reload and retry.
                }
                _ /* INSERTING */ => std::hint::spin_loop(),
            }
        }
    }

    /// Unconditional insert: overwrites any existing value, forcing the
    /// slot through INSERTING even if it was already INSERTED.
    pub fn insert(&self, key: u64, value: V) -> Option<&V> {
        let slot = self.slot(key)?;
        loop {
            let prev = slot.tag.swap(INSERTING, Ordering::SeqCst);
            if prev != INSERTING {
                unsafe { (*slot.value.get()).write(value) };
                slot.tag.store(INSERTED, Ordering::Release);
                return Some(unsafe { &*(*slot.value.get()).as_ptr() });
            }
            // Someone else is concurrently inserting; spin and retry with
            // our own value (last writer wins, matching `insert`'s
            // unconditional-overwrite contract).
            std::hint::spin_loop();
        }
    }

    /// Reset the slot back to NOT_INSERTED. Per spec §4.8 step 6, this
    /// deliberately does *not* zero or drop the stored value — a future
    /// allocation reusing the same address joins the existing history.
    pub fn remove(&self, key: u64) {
        if let Some(slot) = self.slot(key) {
            slot.tag.store(NOT_INSERTED, Ordering::SeqCst);
        }
    }
}

impl<V> Drop for ShadowMap<V> {
    fn drop(&mut self) {
        let len = self.entries_per_fragment * std::mem::size_of::<Slot<V>>();
        for frag in &self.fragments {
            let ptr = frag.load(Ordering::Acquire);
            if !ptr.is_null() {
                fragment::release(ptr as *mut u8, len);
            }
        }
    }
}

// SAFETY: concurrent mutation of a slot's value is serialized by the
// three-state tag (see `Slot`'s `unsafe impl Sync`); fragment allocation
// itself is serialized by `alloc_lock`.
unsafe impl<V: Send> Sync for ShadowMap<V> {}
unsafe impl<V: Send> Send for ShadowMap<V> {}
