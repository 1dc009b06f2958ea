#![feature(test)]

extern crate test;
use numaperf::access::hotpath::{on_access, HotPathThresholds};
use numaperf::access::{new_line_shadow, new_page_shadow, AccessKind};
use test::Bencher;

fn thresholds() -> HotPathThresholds {
    HotPathThresholds {
        page_sharing_threshold: 100,
        cache_line_detail_threshold: 50,
    }
}

#[bench]
fn single_thread_sequential_access(b: &mut Bencher) {
    let pages = new_page_shadow();
    let lines = new_line_shadow(4);
    let cfg = thresholds();
    let mut addr = 0x1_0000_0000u64;
    b.iter(|| {
        on_access(&pages, &lines, addr, AccessKind::Write, 0, &cfg);
        addr = addr.wrapping_add(64);
    });
}

#[bench]
fn single_cache_line_under_false_sharing_contention(b: &mut Bencher) {
    let pages = new_page_shadow();
    let lines = new_line_shadow(4);
    let cfg = thresholds();
    let addr = 0x2_0000_0000u64;
    let mut tid = 0u8;
    b.iter(|| {
        on_access(&pages, &lines, addr + (tid as u64 % 8) * 8, AccessKind::Write, tid % 4, &cfg);
        tid = tid.wrapping_add(1);
    });
}
