use log::debug;
use serde::{Deserialize, Serialize};

use crate::request::{Cycle, Request};
use crate::trace::TraceSource;

/// Where the CPU's single outstanding request is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// No request in flight, the next one can be read
    Idle,
    /// Issued, waiting for the first level lookup
    WaitingOnL1,
    /// Missed in L1, or blocked on anything behind it
    WaitingOnL2,
    /// The trace is exhausted
    Done,
}

/// A snapshot of the CPU counters, serialised into the simulation result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuStats {
    pub requests: u64,
    pub l1_hits: u64,
    pub l2_load_hits: u64,
    pub l2_store_hits: u64,
    pub total_access_cycles: u64,
    pub l1_hit_rate: f64,
    pub l2_hit_rate: f64,
    pub l2_local_hit_rate: f64,
    pub amat: f64,
}

/// An in-order CPU replaying a trace, one memory request at a time
///
/// The hierarchy drives it through the callbacks: [`CpuDriver::hit_l1`] once per request, the L2
/// callbacks if the request reached L2, then [`CpuDriver::complete_request`].
#[derive(Debug)]
pub struct CpuDriver<T: TraceSource> {
    trace: T,
    current: Option<Request>,
    state: CpuState,
    l1_recorded: bool,
    n_requests: u64,
    hits_l1: u64,
    load_hits_l2: u64,
    store_hits_l2: u64,
    total_access_time: u64,
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl<T: TraceSource> CpuDriver<T> {
    pub fn new(trace: T) -> Self {
        Self {
            trace,
            current: None,
            state: CpuState::Idle,
            l1_recorded: false,
            n_requests: 0,
            hits_l1: 0,
            load_hits_l2: 0,
            store_hits_l2: 0,
            total_access_time: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == CpuState::Done
    }

    /// Latches the next trace entry when idle, moving to [`CpuState::WaitingOnL1`], or to
    /// [`CpuState::Done`] once the trace runs out. Does nothing in any other state.
    pub fn read_next_request(&mut self, cycle: Cycle) {
        if self.state != CpuState::Idle {
            return;
        }
        match self.trace.next_access() {
            Some(access) => {
                self.current = Some(Request::from_cpu(access.address, access.is_load, cycle));
                self.l1_recorded = false;
                self.state = CpuState::WaitingOnL1;
            }
            None => {
                self.current = None;
                self.state = CpuState::Done;
                debug!("trace exhausted at cycle {cycle}");
            }
        }
    }

    /// Hands the current request to the hierarchy, stamping `cycle` as its issue time
    pub fn issue_request(&mut self, cycle: Cycle) -> Option<Request> {
        let request = self.current.as_mut()?;
        request.issue_cycle = cycle;
        debug!(
            "cycle {cycle}: issuing {} of {:#x}",
            if request.is_load { "load" } else { "store" },
            request.address
        );
        Some(*request)
    }

    pub fn get_request(&self) -> Option<Request> {
        self.current
    }

    /// Retires the current request at `cycle`, charging its access time, and returns to idle
    pub fn complete_request(&mut self, cycle: Cycle) {
        let Some(request) = self.current.take() else {
            return;
        };
        let elapsed = cycle.saturating_sub(request.issue_cycle);
        self.total_access_time += elapsed;
        self.state = CpuState::Idle;
        debug!("cycle {cycle}: {:#x} completed after {elapsed} cycles", request.address);
    }

    /// Records the L1 result. Counts the request, so only the first call per request has any
    /// effect.
    pub fn hit_l1(&mut self, is_hit: bool) {
        if self.current.is_none() || self.l1_recorded {
            return;
        }
        self.l1_recorded = true;
        self.n_requests += 1;
        if is_hit {
            self.hits_l1 += 1;
        }
    }

    pub fn load_hit_l2(&mut self, is_hit: bool) {
        if is_hit {
            self.load_hits_l2 += 1;
        }
    }

    pub fn store_hit_l2(&mut self, is_hit: bool) {
        if is_hit {
            self.store_hits_l2 += 1;
        }
    }

    pub fn status(&self) -> CpuState {
        self.state
    }

    pub fn set_status(&mut self, state: CpuState) {
        self.state = state;
    }

    pub fn trace(&self) -> &T {
        &self.trace
    }

    pub fn requests(&self) -> u64 {
        self.n_requests
    }

    pub fn l1_hits(&self) -> u64 {
        self.hits_l1
    }

    pub fn l2_hits(&self) -> u64 {
        self.load_hits_l2 + self.store_hits_l2
    }

    pub fn get_hit_rate_l1(&self) -> f64 {
        ratio(self.hits_l1, self.n_requests)
    }

    /// L2 hits over every request, the fraction of all accesses served by L2
    pub fn get_hit_rate_l2(&self) -> f64 {
        ratio(self.l2_hits(), self.n_requests)
    }

    /// L2 hits over the requests which missed L1
    pub fn get_l2_local_hit_rate(&self) -> f64 {
        ratio(self.l2_hits(), self.n_requests - self.hits_l1)
    }

    /// Average memory access time in cycles
    pub fn get_amat(&self) -> f64 {
        ratio(self.total_access_time, self.n_requests)
    }

    pub fn stats(&self) -> CpuStats {
        CpuStats {
            requests: self.n_requests,
            l1_hits: self.hits_l1,
            l2_load_hits: self.load_hits_l2,
            l2_store_hits: self.store_hits_l2,
            total_access_cycles: self.total_access_time,
            l1_hit_rate: self.get_hit_rate_l1(),
            l2_hit_rate: self.get_hit_rate_l2(),
            l2_local_hit_rate: self.get_l2_local_hit_rate(),
            amat: self.get_amat(),
        }
    }
}
