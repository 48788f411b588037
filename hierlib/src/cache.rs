use std::ops::Range;

use log::{debug, info};

use crate::config::{require_power_of_two, CacheConfig, ReplacementPolicyConfig};
use crate::error::ConfigError;
use crate::replacement_policies::{DirectMapped, LeastRecentlyUsed, Random, ReplacementPolicy};

/// The split of a 32-bit address into tag, set index, and block offset
///
/// Copied out of a cache so that other components (the request queues) can decompose addresses the
/// same way without holding on to the cache itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressLayout {
    block_bits: u32,
    set_bits: u32,
}

impl AddressLayout {
    /// Both arguments must be powers of two and leave at least one tag bit
    pub fn new(block_size: u32, num_sets: u32) -> Result<Self, ConfigError> {
        require_power_of_two("num_sets", num_sets)?;
        require_power_of_two("block_size", block_size)?;
        let block_bits = block_size.trailing_zeros();
        let set_bits = num_sets.trailing_zeros();
        if block_bits + set_bits >= u32::BITS {
            return Err(ConfigError::AddressTooNarrow { block_bits, set_bits });
        }
        Ok(Self { block_bits, set_bits })
    }

    pub fn tag(&self, address: u32) -> u32 {
        address >> (self.block_bits + self.set_bits)
    }

    /// A single set cache always yields index 0
    pub fn index(&self, address: u32) -> u32 {
        if self.set_bits == 0 {
            return 0;
        }
        (address >> self.block_bits) & ((1 << self.set_bits) - 1)
    }

    /// The address with the block offset cleared
    pub fn block_address(&self, address: u32) -> u32 {
        address & !((1 << self.block_bits) - 1)
    }

    /// Rebuilds the block address from its tag and index
    pub fn compose(&self, tag: u32, index: u32) -> u32 {
        let tag_part = tag.checked_shl(self.block_bits + self.set_bits).unwrap_or(0);
        tag_part | (index << self.block_bits)
    }

    pub fn block_size(&self) -> u32 {
        1 << self.block_bits
    }

    pub fn num_sets(&self) -> u32 {
        1 << self.set_bits
    }
}

/// The bookkeeping for one way of one set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Line {
    pub tag: u32,
    pub valid: bool,
    pub dirty: bool,
    /// Policy specific, for LRU the number of more recently used lines in the set
    pub recency: u32,
}

/// What an access did to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    Hit,
    /// The block was not present and has now been installed
    MissInstalled,
    /// The block was not present and the access does not allocate (a store to a write-through or
    /// non write-allocate cache)
    MissBypassed,
}

impl AccessOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, AccessOutcome::Hit)
    }
}

/// A generic trait for caches
///
/// Technically not required as we're using static dispatch instead of dyn Cache, but it keeps the
/// interface of [`Cache`] and [`GenericCache`] in one place
pub trait CacheTrait {
    /// The address split used by this cache
    fn layout(&self) -> AddressLayout;

    /// Probes for the block holding `address` without changing any state
    fn check(&self, address: u32) -> bool;

    /// Performs a load or store at `address`, returning whether it hit.
    ///
    /// Hits update the replacement policy and, for stores, mark the line dirty. Misses install the
    /// block when the access allocates, evicting a line chosen by the replacement policy if the
    /// set is full.
    fn access(&mut self, address: u32, is_load: bool) -> AccessOutcome;

    /// Invalidates every line and reseeds the replacement policy
    fn reset(&mut self);

    fn name(&self) -> &str;

    /// Whether a store which had `outcome` still has to be sent on to the next level
    fn writes_forward(&self, is_load: bool, outcome: AccessOutcome) -> bool;

    /// The block addresses held by valid lines of set `index`, in way order
    fn valid_blocks(&self, index: u32) -> Vec<u32>;

    /// Whether the block holding `address` is present and dirty
    fn is_dirty(&self, address: u32) -> bool;

    /// The replacement metadata of the block holding `address`, if present
    fn recency(&self, address: u32) -> Option<u32>;

    /// Gets the number of valid lines. Useful for analysing cache performance or debugging
    fn occupied_lines(&self) -> usize;

    fn get_tag(&self, address: u32) -> u32 {
        self.layout().tag(address)
    }

    fn get_index(&self, address: u32) -> u32 {
        self.layout().index(address)
    }
}

/// A set-associative cache, parameterised by a replacement policy
///
/// All lines are stored in one vector, set `i` occupying `i * associativity..(i + 1) *
/// associativity`, and the policy is handed the slice for the set being accessed
#[derive(Debug)]
pub struct Cache<R: ReplacementPolicy> {
    name: String,
    layout: AddressLayout,
    associativity: usize,
    write_allocate: bool,
    write_through: bool,
    lines: Vec<Line>,
    replacement_policy: R,
}

impl<R: ReplacementPolicy> Cache<R> {
    pub fn new(config: &CacheConfig, policy: R) -> Result<Self, ConfigError> {
        config.validate()?;
        let layout = AddressLayout::new(config.block_size, config.num_sets)?;
        info!(
            "Initializing cache {}: sets {}, block size {}, associativity {}, write {}",
            config.name,
            config.num_sets,
            config.block_size,
            config.associativity,
            if config.write_through { "through" } else { "back" },
        );
        let associativity = config.associativity as usize;
        Ok(Self {
            name: config.name.clone(),
            layout,
            associativity,
            write_allocate: config.write_allocate,
            write_through: config.write_through,
            lines: vec![Line::default(); config.num_sets as usize * associativity],
            replacement_policy: policy,
        })
    }

    fn set_range(&self, index: u32) -> Range<usize> {
        let lower = index as usize * self.associativity;
        lower..lower + self.associativity
    }

    fn find(&self, address: u32) -> Option<&Line> {
        let tag = self.layout.tag(address);
        self.lines[self.set_range(self.layout.index(address))]
            .iter()
            .find(|line| line.valid && line.tag == tag)
    }

    fn allocates(&self, is_load: bool) -> bool {
        is_load || (self.write_allocate && !self.write_through)
    }
}

impl<R: ReplacementPolicy> CacheTrait for Cache<R> {
    fn layout(&self) -> AddressLayout {
        self.layout
    }

    fn check(&self, address: u32) -> bool {
        self.find(address).is_some()
    }

    fn access(&mut self, address: u32, is_load: bool) -> AccessOutcome {
        let tag = self.layout.tag(address);
        let index = self.layout.index(address);
        debug!("{} accessed at index {index}, tag {tag:#x}", self.name);
        let allocates = self.allocates(is_load);
        let range = self.set_range(index);
        let set = &mut self.lines[range];

        if let Some(way) = set.iter().position(|line| line.valid && line.tag == tag) {
            if !is_load {
                set[way].dirty = true;
            }
            self.replacement_policy.update_on_hit(set, way);
            return AccessOutcome::Hit;
        }
        if !allocates {
            return AccessOutcome::MissBypassed;
        }

        // Prefer an empty way, only evict once the set is full
        if let Some(way) = set.iter().position(|line| !line.valid) {
            set[way] = Line {
                tag,
                valid: true,
                dirty: !is_load,
                recency: set[way].recency,
            };
            self.replacement_policy.update_on_fill(set, way);
        } else {
            let way = self.replacement_policy.get_victim(set);
            debug!("{} evicting way {way} of set {index} (tag {:#x}, dirty {})", self.name, set[way].tag, set[way].dirty);
            set[way].tag = tag;
            set[way].dirty = !is_load;
        }
        AccessOutcome::MissInstalled
    }

    fn reset(&mut self) {
        self.lines.iter_mut().for_each(|line| *line = Line::default());
        self.replacement_policy.reset();
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn writes_forward(&self, is_load: bool, outcome: AccessOutcome) -> bool {
        !is_load && (self.write_through || outcome == AccessOutcome::MissBypassed)
    }

    fn valid_blocks(&self, index: u32) -> Vec<u32> {
        self.lines[self.set_range(index)]
            .iter()
            .filter(|line| line.valid)
            .map(|line| self.layout.compose(line.tag, index))
            .collect()
    }

    fn is_dirty(&self, address: u32) -> bool {
        self.find(address).map_or(false, |line| line.dirty)
    }

    fn recency(&self, address: u32) -> Option<u32> {
        self.find(address).map(|line| line.recency)
    }

    fn occupied_lines(&self) -> usize {
        self.lines.iter().filter(|line| line.valid).count()
    }
}

/// Enum for the 3 types of cache provided by the library
///
/// Using trait objects in Rust reduces boilerplate, but every access would go through a vtable the
/// compiler cannot see through. Branching explicitly lets it reason about the concrete types and
/// inline the replacement policies
#[derive(Debug)]
pub enum GenericCache {
    DirectMapped(Cache<DirectMapped>),
    LeastRecentlyUsed(Cache<LeastRecentlyUsed>),
    Random(Cache<Random>),
}

impl GenericCache {
    /// Creates a new cache from a cache configuration. A single way cache is direct mapped whatever
    /// policy is configured.
    pub fn new(config: &CacheConfig) -> Result<Self, ConfigError> {
        if config.associativity == 1 {
            return Ok(Cache::new(config, DirectMapped)?.into());
        }
        Ok(match config.replacement_policy {
            ReplacementPolicyConfig::LeastRecentlyUsed => Cache::new(config, LeastRecentlyUsed)?.into(),
            ReplacementPolicyConfig::Random => Cache::new(config, Random::new(config.seed))?.into(),
        })
    }
}

impl From<Cache<DirectMapped>> for GenericCache {
    fn from(value: Cache<DirectMapped>) -> Self {
        Self::DirectMapped(value)
    }
}

impl From<Cache<LeastRecentlyUsed>> for GenericCache {
    fn from(value: Cache<LeastRecentlyUsed>) -> Self {
        Self::LeastRecentlyUsed(value)
    }
}

impl From<Cache<Random>> for GenericCache {
    fn from(value: Cache<Random>) -> Self {
        Self::Random(value)
    }
}

macro_rules! dispatch {
    ($self:ident, $cache:ident => $call:expr) => {
        match $self {
            GenericCache::DirectMapped($cache) => $call,
            GenericCache::LeastRecentlyUsed($cache) => $call,
            GenericCache::Random($cache) => $call,
        }
    };
}

impl CacheTrait for GenericCache {
    fn layout(&self) -> AddressLayout {
        dispatch!(self, c => c.layout())
    }

    fn check(&self, address: u32) -> bool {
        dispatch!(self, c => c.check(address))
    }

    fn access(&mut self, address: u32, is_load: bool) -> AccessOutcome {
        dispatch!(self, c => c.access(address, is_load))
    }

    fn reset(&mut self) {
        dispatch!(self, c => c.reset())
    }

    fn name(&self) -> &str {
        dispatch!(self, c => c.name())
    }

    fn writes_forward(&self, is_load: bool, outcome: AccessOutcome) -> bool {
        dispatch!(self, c => c.writes_forward(is_load, outcome))
    }

    fn valid_blocks(&self, index: u32) -> Vec<u32> {
        dispatch!(self, c => c.valid_blocks(index))
    }

    fn is_dirty(&self, address: u32) -> bool {
        dispatch!(self, c => c.is_dirty(address))
    }

    fn recency(&self, address: u32) -> Option<u32> {
        dispatch!(self, c => c.recency(address))
    }

    fn occupied_lines(&self) -> usize {
        dispatch!(self, c => c.occupied_lines())
    }
}
