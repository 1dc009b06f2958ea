//! Process-wide engine singleton (spec §9, ORIGINAL design note
//! "Process-wide mutable state"): every hook is no-arg by the external
//! ABI contract, so the shadow maps, registry, and call-site table live
//! behind one static instead of being threaded through every call.
//!
//! Grounded on `util/wp.rs`'s `pub static GLOBAL: Lazy<Arc<GlobalContext>>`
//! pattern.

use crate::access::hotpath::HotPathThresholds;
use crate::access::{new_line_shadow, new_page_shadow, LineShadow, PageShadow};
use crate::config::Config;
use crate::diagnosis::callsite::CallSiteTable;
use crate::registry::Registry;
use once_cell::sync::Lazy;

pub struct Engine {
    pub config: Config,
    pub pages: PageShadow,
    pub lines: LineShadow,
    pub registry: Registry,
    pub call_sites: CallSiteTable,
}

impl Engine {
    fn new() -> Self {
        let config = Config::from_env();
        let lines = new_line_shadow(config.max_fragments);
        let call_sites = CallSiteTable::new(config.top_k);
        Engine {
            pages: new_page_shadow(),
            lines,
            registry: Registry::new(),
            call_sites,
            config,
        }
    }

    pub fn hot_path_thresholds(&self) -> HotPathThresholds {
        HotPathThresholds {
            page_sharing_threshold: self.config.page_sharing_threshold,
            cache_line_detail_threshold: self.config.cache_line_detail_threshold,
        }
    }
}

pub static ENGINE: Lazy<Engine> = Lazy::new(Engine::new);
