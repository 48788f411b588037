//! # HierLib
//!
//! HierLib is a library for cycle-by-cycle simulation of a CPU driven memory hierarchy
//!
//! A trace-driven, in-order CPU issues loads and stores into a two level set-associative cache
//! hierarchy. Requests which miss are queued into pipelined or non-pipelined memory buffers which
//! model the latency of the backing store, and the run reports hit rates and the average memory
//! access time
//!
//! Only timing and hit/miss behaviour is modelled, no data is stored

/// Contains the implementation of the cache and the address decomposition it uses
pub mod cache;

/// Contains definitions for the JSON input format
pub mod config;

/// Contains the trace-driven CPU and its statistics
pub mod cpu;

/// Contains the error types for configuration, queues, and traces
pub mod error;

/// Contains helpers for opening trace files
pub mod io;

/// Contains the memory request buffers with duplicate coalescing
pub mod queue;

/// Contains the provided replacement policies, with a trait for implementing custom replacement
/// policies
pub mod replacement_policies;

/// Contains the request type passed between components
pub mod request;

/// Contains the simulator tying the CPU, caches, and queues together
pub mod simulator;

/// Contains the trace abstraction and the text trace reader
pub mod trace;

#[cfg(test)]
mod test;

/// Contains utilities for generating traces for tests and benchmarks.
pub mod util;
