use serde::Serialize;

/// Simulated time, in cycles since the start of the run
pub type Cycle = u64;

/// A single memory request travelling through the hierarchy
///
/// `from_cpu` separates requests the CPU is waiting on from traffic the hierarchy generated on its
/// own (prefetches and posted writes). Queues use it to decide whether a request may attach to an
/// entry which is already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Request {
    pub address: u32,
    pub is_load: bool,
    pub issue_cycle: Cycle,
    pub from_cpu: bool,
}

impl Request {
    pub fn from_cpu(address: u32, is_load: bool, issue_cycle: Cycle) -> Self {
        Self {
            address,
            is_load,
            issue_cycle,
            from_cpu: true,
        }
    }

    /// A load generated by the hierarchy itself, nobody is blocked on it
    pub fn prefetch(address: u32, issue_cycle: Cycle) -> Self {
        Self {
            address,
            is_load: true,
            issue_cycle,
            from_cpu: false,
        }
    }

    /// A store the CPU has already retired, on its way to the backing store
    pub fn posted_write(address: u32, issue_cycle: Cycle) -> Self {
        Self {
            address,
            is_load: false,
            issue_cycle,
            from_cpu: false,
        }
    }
}
