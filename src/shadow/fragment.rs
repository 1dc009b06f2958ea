//! Raw mmap/munmap helpers backing the shadow map's fragments.
//!
//! Grounded on `util.rs`'s `dzmmap_noreplace`/`munmap` pair, generalized
//! from "map a fixed replay address" to "reserve a large, kernel-chosen
//! virtual range that the shadow map treats as one fragment's slot array".
//! Per spec §5: "private anonymous mappings with NORESERVE, advised away
//! from transparent huge pages".

use anyhow::Result;

/// Reserve `len` bytes of zero-initialized, NORESERVE anonymous memory.
/// Physical pages are committed lazily by the kernel as the shadow map
/// touches slots, which is what makes an apparently enormous reservation
/// (e.g. one slot per page across the whole 48-bit address space) cheap
/// until a given fragment is actually used.
pub fn reserve(len: usize) -> Result<*mut u8> {
    let prot = libc::PROT_READ | libc::PROT_WRITE;
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;
    let ptr = unsafe { libc::mmap(std::ptr::null_mut(), len, prot, flags, -1, 0) };
    if ptr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error().into());
    }
    unsafe {
        // Best-effort: keep first-touch attribution sharp per 4 KiB page
        // by declining transparent huge pages for shadow memory.
        libc::madvise(ptr, len, libc::MADV_NOHUGEPAGE);
    }
    Ok(ptr as *mut u8)
}

/// Release a region previously returned by [`reserve`].
pub fn release(ptr: *mut u8, len: usize) {
    unsafe {
        libc::munmap(ptr as *mut libc::c_void, len);
    }
}
