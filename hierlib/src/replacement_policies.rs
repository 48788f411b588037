use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cache::Line;

/// A generic trait for implementing new replacement policies. Can be used to parameterise a Cache.
///
/// Every method receives the ways of a single set. Policies keep their per-line state in
/// [`Line::recency`], anything global (such as a random source) lives in the policy itself.
pub trait ReplacementPolicy {
    /// Updates the policy when a valid way is hit
    ///
    /// Not applicable for some policies, a default which does nothing is provided
    ///
    /// # Arguments
    ///
    /// * `set`: The ways of the set which was hit
    /// * `way`: The way holding the matching tag
    ///
    /// returns: ()
    fn update_on_hit(&mut self, _set: &mut [Line], _way: usize) {}

    /// Updates the policy after a block has been written into a way which was invalid. The way is
    /// already marked valid when this is called.
    fn update_on_fill(&mut self, _set: &mut [Line], _way: usize) {}

    /// Used by the cache to pick a way to overwrite when every way of the set is valid.
    ///
    /// Implementations should assume that when this method is called, the returned way will be
    /// replaced, and leave its metadata in the state of a freshly installed line
    ///
    /// returns: usize, the way to evict
    fn get_victim(&mut self, set: &mut [Line]) -> usize;

    /// Returns the policy to its state at construction
    fn reset(&mut self) {}
}

#[derive(Debug, Default)]
/// DirectMapped is used for caches with a single way. It does nothing when updating, and always
/// evicts way 0
///
/// As the generic cache implementation is monomorphised, the compiler can completely optimise this
/// away, removing the need for a separate implementation
pub struct DirectMapped;

impl ReplacementPolicy for DirectMapped {
    fn get_victim(&mut self, _set: &mut [Line]) -> usize {
        0
    }
}

/// Least Recently Used replacement policy
///
/// Each line carries a recency counter, 0 being the most recently used. Among the valid ways of a
/// set the counters form a permutation of `0..associativity`.
///
/// The hit path only ages the lines which were younger than the one hit, whereas eviction ages
/// every line and evicts whichever reaches `associativity`. Both are needed to reproduce the
/// reference hit rates.
#[derive(Debug, Default)]
pub struct LeastRecentlyUsed;

impl ReplacementPolicy for LeastRecentlyUsed {
    fn update_on_hit(&mut self, set: &mut [Line], way: usize) {
        let hit_recency = set[way].recency;
        for line in set.iter_mut() {
            if line.valid && line.recency < hit_recency {
                line.recency += 1;
            }
        }
        set[way].recency = 0;
    }

    fn update_on_fill(&mut self, set: &mut [Line], way: usize) {
        for line in set.iter_mut().filter(|line| line.valid) {
            line.recency += 1;
        }
        set[way].recency = 0;
    }

    fn get_victim(&mut self, set: &mut [Line]) -> usize {
        let associativity = set.len() as u32;
        let mut victim = None;
        for (way, line) in set.iter_mut().enumerate() {
            line.recency += 1;
            if line.recency == associativity && victim.is_none() {
                victim = Some(way);
            }
        }
        // Only reachable if the permutation invariant was broken, fall back to the oldest line
        let victim = victim.unwrap_or_else(|| {
            set.iter()
                .enumerate()
                .max_by_key(|(_, line)| line.recency)
                .map(|(way, _)| way)
                .unwrap_or(0)
        });
        set[victim].recency = 0;
        victim
    }
}

/// Random replacement policy, evicting a uniformly chosen way
///
/// The random source belongs to the policy and is reseeded on reset, so two caches built from the
/// same seed make identical choices
#[derive(Debug)]
pub struct Random {
    seed: u64,
    rng: StdRng,
}

impl Random {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl ReplacementPolicy for Random {
    fn get_victim(&mut self, set: &mut [Line]) -> usize {
        self.rng.gen_range(0..set.len())
    }

    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }
}
