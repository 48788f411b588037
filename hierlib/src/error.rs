use thiserror::Error;

use crate::request::Cycle;

/// Rejection of a cache, queue, or hierarchy configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must be a power of two, got {value}")]
    NotPowerOfTwo { field: &'static str, value: u32 },

    #[error("{field} must be non-zero")]
    Zero { field: &'static str },

    #[error("a 32-bit address cannot hold {block_bits} offset bits and {set_bits} index bits with a tag left over")]
    AddressTooNarrow { block_bits: u32, set_bits: u32 },

    #[error("queue {label} has zero latency")]
    ZeroLatency { label: String },

    #[error("queue {label} has zero capacity")]
    ZeroCapacity { label: String },
}

/// Returned by [`crate::queue::RequestQueue::push`] when every slot is live. The queue is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("queue {label} is full ({capacity} entries)")]
pub struct QueueFull {
    pub label: String,
    pub capacity: usize,
}

/// A trace line which could not be understood
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: cannot parse {text:?} as `<hex address> <L|S>`")]
pub struct TraceError {
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("simulation did not finish within {cycles} cycles")]
    CycleLimit { cycles: Cycle },
}
