use log::debug;

use crate::cache::AddressLayout;
use crate::config::QueueConfig;
use crate::error::{ConfigError, QueueFull};
use crate::request::{Cycle, Request};

/// A live queue slot: the request, when it completes, and the line it targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub request: Request,
    pub ready_at: Cycle,
    pub tag: u32,
    pub index: u32,
}

/// The result of looking for a live entry targeting the same line as a new request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duplicate {
    None,
    /// The matching entry was generated by the hierarchy (slot number)
    FromPrefetch(usize),
    /// The matching entry is a request the CPU is waiting on (slot number)
    FromCpu(usize),
}

/// What [`RequestQueue::push`] did with an accepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// A new entry was added at the rear
    Enqueued { ready_at: Cycle },
    /// A CPU request took over the payload of an in-flight prefetch for the same line, keeping its
    /// ready time
    Coalesced { ready_at: Cycle },
    /// A non-CPU request for a line which already has non-CPU traffic in flight, nothing changed
    Suppressed,
}

/// A fixed-capacity circular buffer of in-flight requests to a slower resource
///
/// Pipelined queues complete every entry `latency` cycles after it was pushed. Non-pipelined
/// queues serialise: an entry completes `latency` cycles after the entry in front of it.
#[derive(Debug)]
pub struct RequestQueue {
    label: String,
    latency: Cycle,
    pipelined: bool,
    write: bool,
    layout: AddressLayout,
    slots: Vec<Option<QueueEntry>>,
    front: usize,
    rear: usize,
    size: usize,
}

impl RequestQueue {
    /// Creates a queue decomposing addresses with `layout`, usually the [`crate::cache::CacheTrait::layout`]
    /// of the cache that fills from it
    pub fn new(config: &QueueConfig, layout: AddressLayout, write: bool) -> Result<Self, ConfigError> {
        config.validate()?;
        let queue = Self {
            label: config.label.clone(),
            latency: config.latency,
            pipelined: config.pipelined,
            write,
            layout,
            slots: vec![None; config.capacity],
            front: 0,
            rear: 0,
            size: 0,
        };
        debug!("Created a memory buffer:");
        queue.dump();
        Ok(queue)
    }

    fn next(&self, slot: usize) -> usize {
        (slot + 1) % self.slots.len()
    }

    fn live_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.size).map(move |offset| (self.front + offset) % self.slots.len())
    }

    /// Finds the most recently pushed live entry targeting `(tag, index)`
    pub fn find_duplicate(&self, tag: u32, index: u32) -> Duplicate {
        let found = self
            .live_slots()
            .filter(|&slot| matches!(self.slots[slot], Some(entry) if entry.tag == tag && entry.index == index))
            .last();
        match found.and_then(|slot| self.slots[slot].map(|entry| (slot, entry))) {
            None => Duplicate::None,
            Some((slot, entry)) if entry.request.from_cpu => Duplicate::FromCpu(slot),
            Some((slot, _)) => Duplicate::FromPrefetch(slot),
        }
    }

    /// Accepts `request` at cycle `now`, or returns [`QueueFull`] without changing anything
    pub fn push(&mut self, request: Request, now: Cycle) -> Result<PushOutcome, QueueFull> {
        if self.is_full() {
            return Err(QueueFull {
                label: self.label.clone(),
                capacity: self.capacity(),
            });
        }
        let tag = self.layout.tag(request.address);
        let index = self.layout.index(request.address);

        match self.find_duplicate(tag, index) {
            Duplicate::FromPrefetch(slot) => {
                if !request.from_cpu {
                    return Ok(PushOutcome::Suppressed);
                }
                let Some(entry) = self.slots[slot].as_mut() else {
                    return Ok(PushOutcome::Suppressed);
                };
                entry.request = request;
                debug!("{}: {:#x} attached to in-flight entry, ready at {}", self.label, request.address, entry.ready_at);
                Ok(PushOutcome::Coalesced { ready_at: entry.ready_at })
            }
            Duplicate::None | Duplicate::FromCpu(_) => {
                let ready_at = self.next_ready_time(now);
                self.slots[self.rear] = Some(QueueEntry {
                    request,
                    ready_at,
                    tag,
                    index,
                });
                debug!("Adding {:#x} to {}: ready at {ready_at}", request.address, self.label);
                self.rear = self.next(self.rear);
                self.size += 1;
                Ok(PushOutcome::Enqueued { ready_at })
            }
        }
    }

    fn next_ready_time(&self, now: Cycle) -> Cycle {
        if self.pipelined || self.is_empty() {
            return now + self.latency;
        }
        let last = (self.rear + self.slots.len() - 1) % self.slots.len();
        match self.slots[last] {
            Some(entry) => entry.ready_at + self.latency,
            None => now + self.latency,
        }
    }

    /// Retires the oldest entry, `None` when the queue is empty
    pub fn pop(&mut self) -> Option<QueueEntry> {
        if self.is_empty() {
            return None;
        }
        let entry = self.slots[self.front].take();
        self.front = self.next(self.front);
        self.size -= 1;
        entry
    }

    pub fn peek(&self) -> Option<&QueueEntry> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.front].as_ref()
    }

    /// Whether there is an entry and the oldest one has completed by `now`
    pub fn front_ready(&self, now: Cycle) -> bool {
        self.peek().map_or(false, |entry| entry.ready_at <= now)
    }

    /// Live entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> + '_ {
        self.live_slots().filter_map(move |slot| self.slots[slot].as_ref())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_full(&self) -> bool {
        self.size == self.slots.len()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn latency(&self) -> Cycle {
        self.latency
    }

    pub fn is_pipelined(&self) -> bool {
        self.pipelined
    }

    /// True for a write buffer, false for a read queue
    pub fn is_write_queue(&self) -> bool {
        self.write
    }

    /// Logs the queue parameters and every live entry at debug level
    pub fn dump(&self) {
        debug!(
            "Memory buffer {}: type {}, capacity {}, pipelined {}, latency {} cycles, size {}",
            self.label,
            if self.write { "write" } else { "read" },
            self.capacity(),
            self.pipelined,
            self.latency,
            self.size,
        );
        for entry in self.iter() {
            debug!("\taddress {:#x}, ready at {}", entry.request.address, entry.ready_at);
        }
    }
}
