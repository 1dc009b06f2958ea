//! Object registry (spec §4.4, component C4): the live-object table keyed
//! by allocation base address.
//!
//! Grounded on `src/heapdump.rs`'s address-keyed `HashMap<u64, HeapObject>`
//! and `src/util/typed_obj.rs`'s address-wrapper idiom, but built directly
//! on top of [`ShadowMap`] rather than reimplementing its own table — the
//! three-state tag protocol `ShadowMap` already gives us is exactly what
//! spec §4.4 asks for ("slots use the same three-state tag protocol as
//! §4.3").

use crate::constants::{LOG_OBJECT_ALIGNMENT, REGISTRY_FRAGMENTS};
use crate::shadow::ShadowMap;

/// One record per live heap object (spec §3, `ObjectInfo`).
#[derive(Debug, Clone, Copy)]
pub struct ObjectInfo {
    pub start_address: u64,
    pub size: u64,
    pub call_site: u32,
}

pub struct Registry {
    objects: ShadowMap<ObjectInfo>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::with_fragments(REGISTRY_FRAGMENTS)
    }

    pub fn with_fragments(num_fragments: usize) -> Self {
        Registry {
            objects: ShadowMap::new(LOG_OBJECT_ALIGNMENT, num_fragments),
        }
    }

    /// Register a freshly allocated object. Overwrites any stale entry at
    /// the same address (the allocator only reuses an address after a
    /// matching free, but a missed `on_free` should not wedge the slot).
    pub fn register(&self, start_address: u64, size: u64, call_site: u32) {
        self.objects.insert(
            start_address,
            ObjectInfo {
                start_address,
                size,
                call_site,
            },
        );
    }

    pub fn lookup_by_start_address(&self, addr: u64) -> Option<ObjectInfo> {
        self.objects.find(addr).copied()
    }

    /// Remove the object's entry. Per spec §4.8 step 6 this only drops the
    /// registry record; the page and cache-line shadows are left untouched.
    pub fn unregister(&self, addr: u64) {
        self.objects.remove(addr);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_lookup_round_trips() {
        let reg = Registry::with_fragments(4);
        reg.register(0x4000, 128, 7);
        let info = reg.lookup_by_start_address(0x4000).unwrap();
        assert_eq!(info.size, 128);
        assert_eq!(info.call_site, 7);
    }

    #[test]
    fn unregister_removes_the_entry() {
        let reg = Registry::with_fragments(4);
        reg.register(0x4000, 128, 7);
        reg.unregister(0x4000);
        assert!(reg.lookup_by_start_address(0x4000).is_none());
    }

    #[test]
    fn free_without_matching_allocation_is_a_harmless_lookup_miss() {
        let reg = Registry::with_fragments(4);
        assert!(reg.lookup_by_start_address(0x9999).is_none());
        reg.unregister(0x9999);
    }

    #[test]
    fn reuse_after_free_joins_the_new_call_site() {
        let reg = Registry::with_fragments(4);
        reg.register(0x4000, 64, 1);
        reg.unregister(0x4000);
        reg.register(0x4000, 64, 2);
        assert_eq!(reg.lookup_by_start_address(0x4000).unwrap().call_site, 2);
    }
}
