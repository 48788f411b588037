use log::warn;
use serde::{Deserialize, Serialize};

use crate::cache::AddressLayout;
use crate::error::ConfigError;
use crate::request::Cycle;

/// The whole memory hierarchy: two cache levels and the buffers in front of memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    pub l1: CacheConfig,
    pub l2: CacheConfig,
    pub memory: MemoryConfig,
    /// Cycles between issuing a request and the L1 lookup resolving
    #[serde(default = "default_l1_latency")]
    pub l1_latency: Cycle,
    /// Cycles between an L1 miss and the L2 lookup resolving
    #[serde(default = "default_l2_latency")]
    pub l2_latency: Cycle,
    /// Fetch the next block into L2 alongside every L2 load miss
    #[serde(default)]
    pub prefetch_next_line: bool,
    #[serde(default = "default_max_cycles")]
    pub max_cycles: Cycle,
}

/// A configuration for a single cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub name: String,
    pub num_sets: u32,
    pub associativity: u32,
    pub block_size: u32,
    #[serde(default)]
    pub replacement_policy: ReplacementPolicyConfig,
    #[serde(default)]
    pub write_allocate: bool,
    #[serde(default)]
    pub write_through: bool,
    /// Seed for the random replacement policy, reapplied on every reset
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// The replacement policy for caches with more than one way - lru or random. Defaults to lru.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReplacementPolicyConfig {
    #[default]
    #[serde(alias = "lru")]
    LeastRecentlyUsed,
    #[serde(alias = "random")]
    Random,
}

/// The read and write buffers between the last cache level and memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub read_queue: QueueConfig,
    pub write_queue: QueueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub label: String,
    pub capacity: usize,
    pub latency: Cycle,
    #[serde(default = "default_pipelined")]
    pub pipelined: bool,
}

fn default_l1_latency() -> Cycle {
    1
}

fn default_l2_latency() -> Cycle {
    10
}

fn default_max_cycles() -> Cycle {
    100_000_000
}

fn default_seed() -> u64 {
    100
}

fn default_pipelined() -> bool {
    true
}

pub(crate) fn require_power_of_two(field: &'static str, value: u32) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero { field })
    } else if !value.is_power_of_two() {
        Err(ConfigError::NotPowerOfTwo { field, value })
    } else {
        Ok(())
    }
}

impl CacheConfig {
    /// A write-back, write-allocate LRU cache
    pub fn new(name: &str, num_sets: u32, associativity: u32, block_size: u32) -> Self {
        Self {
            name: name.to_string(),
            num_sets,
            associativity,
            block_size,
            replacement_policy: ReplacementPolicyConfig::default(),
            write_allocate: true,
            write_through: false,
            seed: default_seed(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        AddressLayout::new(self.block_size, self.num_sets)?;
        if self.associativity == 0 {
            return Err(ConfigError::Zero { field: "associativity" });
        }
        if self.write_through && self.write_allocate {
            warn!("cache {}: write-through caches never allocate on a store miss, write_allocate is ignored", self.name);
        }
        Ok(())
    }
}

impl QueueConfig {
    pub fn new(label: &str, capacity: usize, latency: Cycle, pipelined: bool) -> Self {
        Self {
            label: label.to_string(),
            capacity,
            latency,
            pipelined,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity { label: self.label.clone() });
        }
        if self.latency == 0 {
            return Err(ConfigError::ZeroLatency { label: self.label.clone() });
        }
        Ok(())
    }
}

impl HierarchyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.l1.validate()?;
        self.l2.validate()?;
        self.memory.read_queue.validate()?;
        self.memory.write_queue.validate()?;
        if self.l1_latency == 0 {
            return Err(ConfigError::Zero { field: "l1_latency" });
        }
        if self.l2_latency == 0 {
            return Err(ConfigError::Zero { field: "l2_latency" });
        }
        Ok(())
    }
}

impl Default for HierarchyConfig {
    /// 32KiB 4-way L1, 256KiB 8-way L2, 64 byte lines, pipelined 100 cycle memory reads
    fn default() -> Self {
        Self {
            l1: CacheConfig::new("L1", 128, 4, 64),
            l2: CacheConfig::new("L2", 512, 8, 64),
            memory: MemoryConfig {
                read_queue: QueueConfig::new("R", 16, 100, true),
                write_queue: QueueConfig::new("W", 16, 100, false),
            },
            l1_latency: default_l1_latency(),
            l2_latency: default_l2_latency(),
            prefetch_next_line: false,
            max_cycles: default_max_cycles(),
        }
    }
}
