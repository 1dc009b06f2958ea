//! Report emission (spec §4.9, component C9): at process exit, walk the
//! per-call-site diagnoses and print ranked findings as human-readable
//! text.
//!
//! Grounded on `main.rs`'s `info!`-driven reporting and `export.rs`'s
//! `writeln!`-to-`File` pattern, generalized from a single CSV stream to
//! a structured, indented report that can go to stderr, a plain file, or
//! a `.zst`-compressed file.

use crate::diagnosis::callsite::CallSiteTable;
use crate::diagnosis::object::ObjectDiagnosis;
use crate::diagnosis::topk::Scored;
use anyhow::{Context, Result};
use fixedbitset::FixedBitSet;
use lru::LruCache;
use std::io::Write;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Resolves a call-site ID to a display label. Call-site symbolication
/// itself is the external instrumentation pass's job (spec §1, out of
/// scope); without it every site renders as `call_site#<id>`, but the
/// formatted string is still cached so a call site with many surviving
/// diagnoses doesn't re-format its label on every line.
struct SymbolCache {
    cache: Mutex<LruCache<u32, String>>,
}

impl SymbolCache {
    fn new(capacity: usize) -> Self {
        SymbolCache {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
        }
    }

    fn label(&self, call_site: u32) -> String {
        let mut cache = self.cache.lock().unwrap();
        if let Some(label) = cache.get(&call_site) {
            return label.clone();
        }
        let label = format!("call_site#{call_site}");
        cache.put(call_site, label.clone());
        label
    }
}

/// Render a thread bitmask as a sorted, comma-separated list of thread
/// IDs, e.g. `0b101` -> `"0, 2"`.
fn thread_list(mask: u64) -> String {
    let mut bits = FixedBitSet::with_capacity(64);
    for t in 0..64u8 {
        if (mask >> t) & 1 != 0 {
            bits.set(t as usize, true);
        }
    }
    bits.ones().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
}

fn write_object_diagnosis(
    out: &mut dyn Write,
    symbols: &SymbolCache,
    rank: usize,
    scored: &Scored<ObjectDiagnosis>,
) -> Result<()> {
    let diag = &scored.value;
    writeln!(
        out,
        "  #{rank} object@0x{:x} size={} site={} score={}",
        diag.info.start_address,
        diag.info.size,
        symbols.label(diag.info.call_site),
        scored.score
    )?;
    writeln!(
        out,
        "      invalidations: first-touch={} other={}",
        diag.invalidations_in_first_touch_thread, diag.invalidations_in_other_threads
    )?;
    writeln!(
        out,
        "      accesses: first-touch={} other={}",
        diag.accesses_in_first_touch_thread, diag.accesses_in_other_threads
    )?;
    for line in &diag.top_lines {
        writeln!(
            out,
            "      line@0x{:x}: invalidations(first={}, other={}) threads=[{}]",
            line.start_address,
            line.invalidations_by_first_touch_thread,
            line.invalidations_by_other_threads,
            thread_list(line.access_thread_bitmask),
        )?;
        if let Some(words) = &line.word_thread_bitmask {
            for (w, mask) in words.iter().enumerate() {
                if *mask != 0 {
                    writeln!(out, "        word[{w}]: threads=[{}]", thread_list(*mask))?;
                }
            }
        }
    }
    for page in &diag.top_pages {
        writeln!(
            out,
            "      page@0x{:x}: allocator_caused={} threads=[{}]",
            page.page_base,
            page.allocator_caused,
            thread_list(page.access_thread_bitmask_in_page),
        )?;
    }
    Ok(())
}

/// Render the whole table of diagnoses to `out`.
pub fn write_report(out: &mut dyn Write, call_sites: &CallSiteTable) -> Result<()> {
    let symbols = SymbolCache::new(256);
    let drained = call_sites.drain_sorted();
    writeln!(out, "numaperf report: {} call site(s) with findings", drained.len())?;
    for (site, diagnoses) in &drained {
        writeln!(out, "{}:", symbols.label(*site))?;
        for (rank, scored) in diagnoses.iter().enumerate() {
            write_object_diagnosis(out, &symbols, rank + 1, scored)?;
        }
    }
    Ok(())
}

/// Emit the report to the configured destination (spec §6.2,
/// `NUMAPERF_REPORT_PATH`): `-` means stderr, anything else is a file, and
/// a `.zst` suffix compresses the stream as it's written.
pub fn emit(report_path: &str, call_sites: &CallSiteTable) -> Result<()> {
    if report_path == "-" {
        let mut stderr = std::io::stderr().lock();
        return write_report(&mut stderr, call_sites);
    }
    let file = std::fs::File::create(report_path)
        .with_context(|| format!("failed to create report file {report_path}"))?;
    if report_path.ends_with(".zst") {
        let mut encoder = zstd::Encoder::new(file, 0)?.auto_finish();
        write_report(&mut encoder, call_sites)
    } else {
        let mut writer = std::io::BufWriter::new(file);
        write_report(&mut writer, call_sites)
    }
}
