use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::cache::{AccessOutcome, CacheTrait, GenericCache};
use crate::config::HierarchyConfig;
use crate::cpu::{CpuDriver, CpuState, CpuStats};
use crate::error::SimulationError;
use crate::queue::{PushOutcome, RequestQueue};
use crate::request::{Cycle, Request};
use crate::trace::TraceSource;

/// Where the CPU's current request is waiting inside the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    L1 { due: Cycle },
    L2 { due: Cycle },
    /// Missed in L2, waiting for the read queue to accept it
    Fetch,
    /// In the read queue
    Memory,
    /// Waiting for the write queue to accept the store, the CPU retires it once it does
    Write,
}

/// The result of a simulation run. Can be serialised for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub cycles: Cycle,
    pub cpu: CpuStats,
    pub memory_reads: u64,
    pub memory_writes: u64,
    pub prefetches_issued: u64,
    pub coalesced_requests: u64,
    pub skipped_trace_lines: u64,
}

#[derive(Debug, Default)]
struct MemoryCounters {
    reads: u64,
    writes: u64,
    prefetches: u64,
    coalesced: u64,
}

/// Owns the whole hierarchy and advances it one cycle at a time
///
/// Every cycle runs three phases in a fixed order: the CPU issues its next request if it is idle,
/// the caches resolve whatever lookup is due, and the memory queues retire their completed
/// entries. There is never more than one CPU request in flight.
#[derive(Debug)]
pub struct Simulator<T: TraceSource> {
    cpu: CpuDriver<T>,
    l1: GenericCache,
    l2: GenericCache,
    read_queue: RequestQueue,
    write_queue: RequestQueue,
    l1_latency: Cycle,
    l2_latency: Cycle,
    prefetch_next_line: bool,
    max_cycles: Cycle,
    cycle: Cycle,
    pending: Pending,
    counters: MemoryCounters,
    simulation_time: Duration,
}

impl<T: TraceSource> Simulator<T> {
    /// Creates a new simulator for a given configuration, replaying `trace`
    ///
    /// # Arguments
    ///
    /// * `config`: A hierarchy configuration, usually resulting from parsing JSON
    /// * `trace`: The accesses the CPU issues, in order
    ///
    /// returns: Result<Simulator, SimulationError>
    pub fn new(config: &HierarchyConfig, trace: T) -> Result<Self, SimulationError> {
        config.validate()?;
        let l1 = GenericCache::new(&config.l1)?;
        let l2 = GenericCache::new(&config.l2)?;
        // Both memory buffers sit behind L2 and detect duplicates by its lines
        let read_queue = RequestQueue::new(&config.memory.read_queue, l2.layout(), false)?;
        let write_queue = RequestQueue::new(&config.memory.write_queue, l2.layout(), true)?;
        info!(
            "hierarchy ready: L1 latency {}, L2 latency {}, next line prefetch {}",
            config.l1_latency, config.l2_latency, config.prefetch_next_line
        );
        Ok(Self {
            cpu: CpuDriver::new(trace),
            l1,
            l2,
            read_queue,
            write_queue,
            l1_latency: config.l1_latency,
            l2_latency: config.l2_latency,
            prefetch_next_line: config.prefetch_next_line,
            max_cycles: config.max_cycles,
            cycle: 0,
            pending: Pending::None,
            counters: MemoryCounters::default(),
            simulation_time: Duration::new(0, 0),
        })
    }

    /// Runs until the trace is exhausted and all in-flight work has retired
    pub fn run(&mut self) -> Result<SimulationResult, SimulationError> {
        let start = Instant::now();
        while !self.is_finished() {
            if self.cycle >= self.max_cycles {
                self.simulation_time += start.elapsed();
                return Err(SimulationError::CycleLimit { cycles: self.max_cycles });
            }
            self.step();
        }
        self.simulation_time += start.elapsed();
        Ok(self.result())
    }

    /// Advances the hierarchy by one cycle
    pub fn step(&mut self) {
        let now = self.cycle;
        self.issue(now);
        self.resolve(now);
        self.service_queues(now);
        self.cycle += 1;
    }

    pub fn is_finished(&self) -> bool {
        self.cpu.is_done()
            && self.pending == Pending::None
            && self.read_queue.is_empty()
            && self.write_queue.is_empty()
    }

    fn issue(&mut self, now: Cycle) {
        if self.cpu.status() != CpuState::Idle {
            return;
        }
        self.cpu.read_next_request(now);
        if self.cpu.issue_request(now).is_some() {
            self.pending = Pending::L1 { due: now + self.l1_latency };
        }
    }

    fn resolve(&mut self, now: Cycle) {
        let Some(request) = self.cpu.get_request() else {
            return;
        };
        let pending = self.pending;
        match pending {
            Pending::L1 { due } if due <= now => self.resolve_l1(request, now),
            Pending::L2 { due } if due <= now => self.resolve_l2(request, now),
            Pending::Fetch => self.try_fetch(request, now),
            Pending::Write => self.try_write(request, now),
            _ => {}
        }
    }

    fn resolve_l1(&mut self, request: Request, now: Cycle) {
        let outcome = self.l1.access(request.address, request.is_load);
        self.cpu.hit_l1(outcome.is_hit());
        if !outcome.is_hit() {
            self.cpu.set_status(CpuState::WaitingOnL2);
            self.pending = Pending::L2 { due: now + self.l2_latency };
            return;
        }
        if !self.l1.writes_forward(request.is_load, outcome) {
            self.finish(now);
            return;
        }
        // Write-through hit, the store is posted to L2 without the CPU waiting on the lookup
        let l2_outcome = self.l2.access(request.address, false);
        if self.l2.writes_forward(false, l2_outcome) {
            self.cpu.set_status(CpuState::WaitingOnL2);
            self.pending = Pending::Write;
            self.try_write(request, now);
        } else {
            self.finish(now);
        }
    }

    fn resolve_l2(&mut self, request: Request, now: Cycle) {
        let outcome = self.l2.access(request.address, request.is_load);
        if request.is_load {
            self.cpu.load_hit_l2(outcome.is_hit());
        } else {
            self.cpu.store_hit_l2(outcome.is_hit());
        }
        let forwards = self.l2.writes_forward(request.is_load, outcome);
        match outcome {
            AccessOutcome::Hit if !forwards => self.finish(now),
            AccessOutcome::MissInstalled => {
                self.pending = Pending::Fetch;
                self.try_fetch(request, now);
                if request.is_load && self.prefetch_next_line {
                    self.prefetch_after(request.address, now);
                }
            }
            AccessOutcome::Hit | AccessOutcome::MissBypassed => {
                self.pending = Pending::Write;
                self.try_write(request, now);
            }
        }
    }

    fn try_fetch(&mut self, request: Request, now: Cycle) {
        match self.read_queue.push(request, now) {
            Ok(PushOutcome::Enqueued { .. }) => {
                self.counters.reads += 1;
                self.pending = Pending::Memory;
            }
            Ok(PushOutcome::Coalesced { ready_at }) => {
                debug!("cycle {now}: {:#x} rides along with a prefetch ready at {ready_at}", request.address);
                self.counters.coalesced += 1;
                self.pending = Pending::Memory;
            }
            Ok(PushOutcome::Suppressed) => self.pending = Pending::Memory,
            Err(e) => debug!("cycle {now}: {e}, retrying"),
        }
    }

    fn try_write(&mut self, request: Request, now: Cycle) {
        match self.write_queue.push(Request::posted_write(request.address, now), now) {
            Ok(PushOutcome::Enqueued { .. }) => {
                self.counters.writes += 1;
                self.finish(now);
            }
            Ok(PushOutcome::Coalesced { .. }) | Ok(PushOutcome::Suppressed) => {
                self.counters.coalesced += 1;
                self.finish(now);
            }
            Err(e) => debug!("cycle {now}: {e}, retrying"),
        }
    }

    /// Best effort fetch of the block after `address` into L2
    fn prefetch_after(&mut self, address: u32, now: Cycle) {
        let layout = self.l2.layout();
        let Some(next) = layout.block_address(address).checked_add(layout.block_size()) else {
            return;
        };
        if self.l2.check(next) {
            return;
        }
        match self.read_queue.push(Request::prefetch(next, now), now) {
            Ok(PushOutcome::Enqueued { .. }) => {
                self.counters.reads += 1;
                self.counters.prefetches += 1;
            }
            Ok(_) => {}
            Err(e) => debug!("cycle {now}: prefetch of {next:#x} dropped, {e}"),
        }
    }

    fn service_queues(&mut self, now: Cycle) {
        while self.read_queue.front_ready(now) {
            let Some(entry) = self.read_queue.pop() else {
                break;
            };
            if !entry.request.from_cpu {
                self.l2.access(entry.request.address, true);
            } else if self.pending == Pending::Memory {
                self.finish(now);
            } else {
                warn!("cycle {now}: memory returned {:#x} but the CPU is not waiting on memory", entry.request.address);
            }
        }
        while self.write_queue.front_ready(now) {
            if let Some(entry) = self.write_queue.pop() {
                debug!("cycle {now}: {:#x} written to memory", entry.request.address);
            }
        }
    }

    fn finish(&mut self, now: Cycle) {
        self.cpu.complete_request(now);
        self.pending = Pending::None;
    }

    pub fn result(&self) -> SimulationResult {
        SimulationResult {
            cycles: self.cycle,
            cpu: self.cpu.stats(),
            memory_reads: self.counters.reads,
            memory_writes: self.counters.writes,
            prefetches_issued: self.counters.prefetches,
            coalesced_requests: self.counters.coalesced,
            skipped_trace_lines: self.cpu.trace().skipped_lines(),
        }
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    pub fn cpu(&self) -> &CpuDriver<T> {
        &self.cpu
    }

    pub fn l1(&self) -> &GenericCache {
        &self.l1
    }

    pub fn l2(&self) -> &GenericCache {
        &self.l2
    }

    pub fn read_queue(&self) -> &RequestQueue {
        &self.read_queue
    }

    pub fn write_queue(&self) -> &RequestQueue {
        &self.write_queue
    }

    /// Gets the wall-clock execution time spent in [`Simulator::run`]
    pub fn get_execution_time(&self) -> &Duration {
        &self.simulation_time
    }

    /// Gets the number of valid lines in each cache level
    pub fn get_occupied_line_counts(&self) -> Vec<(String, usize)> {
        [&self.l1, &self.l2]
            .iter()
            .map(|cache| (cache.name().to_string(), cache.occupied_lines()))
            .collect()
    }
}
