//! Environment-variable configuration (spec §6, SUPPLEMENT §6.2). Every
//! hook signature is no-arg, so there is no CLI to parse; thresholds are
//! read once from the environment at `on_init()` time and cached in the
//! engine singleton. Hot-path code never touches `std::env` again.
//!
//! The numeric parser is grounded on `cli.rs::num_parser`: base-10 by
//! default, `0x`/`0b` prefixes for hex/binary.

use std::env;

const ENV_PAGE_THRESHOLD: &str = "NUMAPERF_PAGE_THRESHOLD";
const ENV_LINE_THRESHOLD: &str = "NUMAPERF_LINE_THRESHOLD";
const ENV_TOP_K: &str = "NUMAPERF_TOP_K";
const ENV_REPORT_PATH: &str = "NUMAPERF_REPORT_PATH";
const ENV_MAX_THREADS: &str = "NUMAPERF_MAX_THREADS";
const ENV_ALLOCATOR_RATIO: &str = "NUMAPERF_ALLOCATOR_RATIO";
const ENV_MAX_FRAGMENTS: &str = "NUMAPERF_MAX_FRAGMENTS";

#[derive(Debug, Clone)]
pub struct Config {
    pub page_sharing_threshold: u64,
    pub cache_line_detail_threshold: u32,
    pub top_k: usize,
    pub report_path: String,
    pub max_threads: usize,
    pub allocator_ratio: f64,
    pub max_fragments: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            page_sharing_threshold: 100,
            cache_line_detail_threshold: 50,
            top_k: 8,
            report_path: "-".to_string(),
            max_threads: 64,
            allocator_ratio: 10.0,
            max_fragments: 1024,
        }
    }
}

impl Config {
    /// Read every `NUMAPERF_*` variable, falling back to the default for
    /// anything unset or unparsable (a malformed override is logged once
    /// and treated as absent rather than aborting initialization).
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            page_sharing_threshold: env_u64(ENV_PAGE_THRESHOLD, defaults.page_sharing_threshold),
            cache_line_detail_threshold: env_u32(
                ENV_LINE_THRESHOLD,
                defaults.cache_line_detail_threshold,
            ),
            top_k: env_usize(ENV_TOP_K, defaults.top_k),
            report_path: env::var(ENV_REPORT_PATH).unwrap_or(defaults.report_path),
            max_threads: env_usize(ENV_MAX_THREADS, defaults.max_threads),
            allocator_ratio: env::var(ENV_ALLOCATOR_RATIO)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(defaults.allocator_ratio),
            max_fragments: env_usize(ENV_MAX_FRAGMENTS, defaults.max_fragments),
        }
    }
}

/// Strip a `0x`/`0b` prefix and report the radix to parse with.
fn radix_of(s: &str) -> (&str, u32) {
    match s.get(0..2) {
        Some("0x") => (&s[2..], 16),
        Some("0b") => (&s[2..], 2),
        _ => (s, 10),
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(raw) => {
            let (digits, radix) = radix_of(&raw);
            u64::from_str_radix(digits, radix).unwrap_or_else(|_| warn_default(key, &raw, default))
        }
        Err(_) => default,
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    match env::var(key) {
        Ok(raw) => {
            let (digits, radix) = radix_of(&raw);
            u32::from_str_radix(digits, radix).unwrap_or_else(|_| warn_default(key, &raw, default))
        }
        Err(_) => default,
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    match env::var(key) {
        Ok(raw) => {
            let (digits, radix) = radix_of(&raw);
            usize::from_str_radix(digits, radix)
                .unwrap_or_else(|_| warn_default(key, &raw, default))
        }
        Err(_) => default,
    }
}

fn warn_default<T>(key: &str, raw: &str, default: T) -> T {
    log::warn!("numaperf: ignoring unparsable {key}={raw:?}, using default");
    default
}
