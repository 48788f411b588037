use std::fmt::Write;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cache::AddressLayout;
use crate::trace::MemAccess;

/// `count` accesses of the same kind, `stride` bytes apart starting at `base`
pub fn strided(base: u32, stride: u32, count: usize, is_load: bool) -> Vec<MemAccess> {
    (0..count as u32)
        .map(|i| MemAccess {
            address: base.wrapping_add(i.wrapping_mul(stride)),
            is_load,
        })
        .collect()
}

/// `count` block addresses with distinct tags which all map to set `index` of `layout`
pub fn same_set_addresses(layout: AddressLayout, index: u32, count: usize) -> Vec<u32> {
    (1..=count as u32).map(|tag| layout.compose(tag, index)).collect()
}

/// A reproducible mix of loads and stores over `footprint` bytes, roughly 70% loads, with a hot
/// region in the first eighth of the footprint receiving half of the accesses
pub fn mixed_workload(seed: u64, count: usize, footprint: u32) -> Vec<MemAccess> {
    let mut rng = StdRng::seed_from_u64(seed);
    let hot = (footprint / 8).max(1);
    (0..count)
        .map(|_| {
            let range = if rng.gen_bool(0.5) { hot } else { footprint.max(1) };
            MemAccess {
                address: rng.gen_range(0..range) & !0x3,
                is_load: rng.gen_bool(0.7),
            }
        })
        .collect()
}

/// Formats accesses in the text trace format understood by [`crate::trace::TraceReader`]
pub fn to_trace_text(accesses: &[MemAccess]) -> String {
    let mut out = String::with_capacity(accesses.len() * 13);
    for access in accesses {
        // Writing into a String cannot fail
        let _ = writeln!(out, "{:#010x} {}", access.address, if access.is_load { 'L' } else { 'S' });
    }
    out
}
