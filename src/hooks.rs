//! External hook ABI (spec §6): the `#[no_mangle] extern "C"` functions the
//! out-of-scope instrumentation pass and allocator interceptor link
//! against.
//!
//! Grounded on `main.rs`'s entry-point style for the fallible setup path,
//! and `util/wp2.rs`'s `#[ctor::ctor]` usage for "run before anything else
//! in this shared object".

use crate::access::AccessKind;
use crate::diagnosis;
use crate::engine::ENGINE;
use crate::{addr, report, tid};
use std::sync::atomic::{AtomicBool, Ordering};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// `on_init()` (spec §6). Idempotent: a second call, whether from the
/// instrumentation pass or from our own `#[ctor]`, is a no-op.
#[no_mangle]
pub extern "C" fn numaperf_on_init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    // `try_init` rather than `init`: the host program may already have
    // installed a logger (its own or another injected library's), and a
    // second `init()` call would panic.
    let _ = env_logger::try_init();
    // Force the lazy singleton now rather than on the first hot-path call,
    // so shadow-map mmap failures are fatal here (spec §7: "Init failure
    // ... fatal; abort with a diagnostic") instead of surfacing as a
    // mysterious drop deep inside `on_access`.
    once_cell::sync::Lazy::force(&ENGINE);
    unsafe {
        libc::atexit(numaperf_on_exit_trampoline);
    }
    let hw_threads = num_cpus::get();
    if ENGINE.config.max_threads < hw_threads {
        log::warn!(
            "numaperf: max_threads={} is below the {hw_threads} hardware threads visible to this process; threads beyond the cap will alias an existing ID",
            ENGINE.config.max_threads,
        );
    }
    log::info!(
        "numaperf: initialized (max_threads={}, hw_threads={hw_threads}, page_threshold={}, line_threshold={})",
        ENGINE.config.max_threads,
        ENGINE.config.page_sharing_threshold,
        ENGINE.config.cache_line_detail_threshold,
    );
}

#[ctor::ctor]
fn numaperf_load_time_init() {
    numaperf_on_init();
}

/// `on_thread_start(tid_slot*)` (spec §6): allocate this thread's ID and
/// also mirror it into the external instrumentation pass's own
/// thread-local slot, since that slot — not ours — is what the compiled
/// `on_access` calls actually read from in the target program.
///
/// # Safety
/// `tid_slot` must be a valid, writable pointer for the lifetime of the
/// calling thread.
#[no_mangle]
pub unsafe extern "C" fn numaperf_on_thread_start(tid_slot: *mut u8) {
    let id = tid::seed();
    if !tid_slot.is_null() {
        *tid_slot = id;
    }
}

/// `on_malloc(addr, size, call_site)` (spec §6). Allocation can happen on
/// a thread the wrapper never saw (the process's initial thread, most
/// commonly), so this seeds an id rather than dropping.
#[no_mangle]
pub extern "C" fn numaperf_on_malloc(addr: u64, size: u64, call_site: u32) {
    if !INITIALIZED.load(Ordering::Relaxed) {
        return;
    }
    diagnosis::register_object(&ENGINE.registry, &ENGINE.pages, addr, size, call_site, tid::seed());
}

/// `on_free(addr)` (spec §6).
#[no_mangle]
pub extern "C" fn numaperf_on_free(addr: u64) {
    if !INITIALIZED.load(Ordering::Relaxed) {
        return;
    }
    diagnosis::free_object(
        &ENGINE.registry,
        &ENGINE.pages,
        &ENGINE.lines,
        &ENGINE.call_sites,
        &ENGINE.config,
        addr,
    );
}

/// `on_access(addr, kind)` (spec §6, §4.7). `kind` is `0` for read, `1`
/// for write; any other value is treated as read rather than trapping,
/// since a malformed instrumentation call must never crash the host
/// program (spec §7: "No error is propagated into the host program").
/// Per spec §4.7 step 1, the access is dropped if this thread's id was
/// never seeded by `on_thread_start`.
#[no_mangle]
pub extern "C" fn numaperf_on_access(addr: u64, kind: u8) {
    if !INITIALIZED.load(Ordering::Relaxed) {
        return;
    }
    let Some(tid) = tid::current() else {
        return;
    };
    let kind = if kind == 1 { AccessKind::Write } else { AccessKind::Read };
    let thresholds = ENGINE.hot_path_thresholds();
    crate::access::hotpath::on_access(&ENGINE.pages, &ENGINE.lines, addr, kind, tid, &thresholds);
}

/// `on_first_touch(addr, tid)` (spec §6): fed by the page-fault signal
/// handler (external collaborator). A no-op if the page's record already
/// exists, since `first_touch_thread_id` is set exactly once.
#[no_mangle]
pub extern "C" fn numaperf_on_first_touch(addr: u64, thread_id: u8) {
    if !INITIALIZED.load(Ordering::Relaxed) {
        return;
    }
    ENGINE
        .pages
        .insert_if_absent(addr::page_base(addr), || {
            crate::access::page::PageAccessInfo::new(thread_id)
        });
}

/// `on_exit()` (spec §6), registered with `libc::atexit` by `on_init`.
#[no_mangle]
pub extern "C" fn numaperf_on_exit() {
    if !INITIALIZED.load(Ordering::Relaxed) {
        return;
    }
    if let Err(e) = report::emit(&ENGINE.config.report_path, &ENGINE.call_sites) {
        log::error!("numaperf: failed to emit report: {e}");
    }
}

extern "C" fn numaperf_on_exit_trampoline() {
    numaperf_on_exit();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        numaperf_on_init();
        numaperf_on_init();
        assert!(INITIALIZED.load(Ordering::SeqCst));
    }

    #[test]
    fn thread_start_writes_into_the_external_slot() {
        numaperf_on_init();
        let mut slot: u8 = 0xff;
        unsafe { numaperf_on_thread_start(&mut slot as *mut u8) };
        assert_ne!(slot, 0xff);
    }

    #[test]
    fn malloc_then_free_round_trips_without_panicking() {
        numaperf_on_init();
        numaperf_on_malloc(0x55_0000, 64, 42);
        numaperf_on_free(0x55_0000);
    }

    #[test]
    fn access_hooks_tolerate_an_unknown_kind_byte() {
        numaperf_on_init();
        let mut slot: u8 = 0xff;
        unsafe { numaperf_on_thread_start(&mut slot as *mut u8) };
        numaperf_on_access(0x56_0000, 200);
    }

    #[test]
    fn access_from_a_thread_never_started_is_dropped() {
        numaperf_on_init();
        let addr = 0x57_0000u64;
        std::thread::spawn(move || numaperf_on_access(addr, 0))
            .join()
            .unwrap();
        assert!(ENGINE.pages.find(addr::page_base(addr)).is_none());
    }
}
