use std::error::Error;
use std::fs::{self, File};

use crate::cache::CacheTrait;
use crate::config::{CacheConfig, HierarchyConfig, MemoryConfig, QueueConfig, ReplacementPolicyConfig};
use crate::cpu::CpuState;
use crate::error::{ConfigError, SimulationError};
use crate::io::get_reader;
use crate::simulator::Simulator;
use crate::trace::{MemAccess, TraceReader, VecTrace};
use crate::util::{mixed_workload, to_trace_text};

/// L1 latency 1, L2 latency 10, memory reads and writes take 100 cycles
fn hierarchy(read_pipelined: bool) -> HierarchyConfig {
    HierarchyConfig {
        l1: CacheConfig::new("L1", 16, 2, 64),
        l2: CacheConfig::new("L2", 64, 4, 64),
        memory: MemoryConfig {
            read_queue: QueueConfig::new("R", 8, 100, read_pipelined),
            write_queue: QueueConfig::new("W", 8, 100, false),
        },
        l1_latency: 1,
        l2_latency: 10,
        prefetch_next_line: false,
        max_cycles: 1_000_000,
    }
}

fn simulate(config: &HierarchyConfig, accesses: Vec<MemAccess>) -> Result<Simulator<VecTrace>, Box<dyn Error>> {
    let mut simulator = Simulator::new(config, VecTrace::new(accesses))?;
    simulator.run()?;
    Ok(simulator)
}

#[test]
fn empty_trace_finishes_immediately() -> Result<(), Box<dyn Error>> {
    let simulator = simulate(&hierarchy(true), Vec::new())?;
    let result = simulator.result();
    assert_eq!(result.cycles, 1);
    assert_eq!(result.cpu.requests, 0);
    assert_eq!(result.cpu.amat, 0.0);
    Ok(())
}

#[test]
fn cold_miss_then_hit() -> Result<(), Box<dyn Error>> {
    let simulator = simulate(&hierarchy(true), vec![MemAccess::load(0x1000), MemAccess::load(0x1008)])?;
    let result = simulator.result();
    assert_eq!(result.cpu.requests, 2);
    assert_eq!(result.cpu.l1_hits, 1);
    // 1 + 10 + 100 for the miss, 1 for the hit
    assert_eq!(result.cpu.total_access_cycles, 112);
    assert!((result.cpu.amat - 56.0).abs() < 1e-9);
    assert_eq!(result.memory_reads, 1);
    assert_eq!(result.memory_writes, 0);
    assert!(simulator.l1().check(0x1000));
    assert!(simulator.l2().check(0x1000));
    assert!(simulator.is_finished());
    Ok(())
}

#[test]
fn l1_conflict_is_served_by_l2() -> Result<(), Box<dyn Error>> {
    let mut config = hierarchy(true);
    config.l1 = CacheConfig::new("L1", 1, 1, 64);
    let simulator = simulate(
        &config,
        vec![MemAccess::load(0x0), MemAccess::load(0x40), MemAccess::load(0x0)],
    )?;
    let result = simulator.result();
    assert_eq!(result.cpu.l1_hits, 0);
    assert_eq!(result.cpu.l2_load_hits, 1);
    assert_eq!(result.cpu.total_access_cycles, 111 + 111 + 11);
    assert!((result.cpu.l2_local_hit_rate - 1.0 / 3.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn demand_miss_coalesces_onto_prefetch() -> Result<(), Box<dyn Error>> {
    let mut config = hierarchy(false);
    config.prefetch_next_line = true;
    let simulator = simulate(&config, vec![MemAccess::load(0x0), MemAccess::load(0x40)])?;
    let result = simulator.result();
    assert_eq!(result.coalesced_requests, 1);
    // 0x0 and the prefetches of 0x40 and 0x80
    assert_eq!(result.memory_reads, 3);
    assert_eq!(result.prefetches_issued, 2);
    // The second load waits for the prefetch of 0x40, ready at 211, instead of a fresh read
    assert_eq!(result.cpu.total_access_cycles, 111 + 99);
    assert_eq!(result.cycles, 312);
    assert!(simulator.l2().check(0x80));
    Ok(())
}

#[test]
fn retired_prefetch_turns_into_l2_hit() -> Result<(), Box<dyn Error>> {
    let mut config = hierarchy(true);
    config.prefetch_next_line = true;
    let simulator = simulate(&config, vec![MemAccess::load(0x0), MemAccess::load(0x40)])?;
    let result = simulator.result();
    assert_eq!(result.coalesced_requests, 0);
    assert_eq!(result.cpu.l2_load_hits, 1);
    assert_eq!(result.cpu.total_access_cycles, 111 + 11);
    Ok(())
}

#[test]
fn bypassed_store_goes_to_write_queue() -> Result<(), Box<dyn Error>> {
    let mut config = hierarchy(true);
    config.l1 = CacheConfig {
        write_through: true,
        write_allocate: false,
        ..CacheConfig::new("L1", 16, 2, 64)
    };
    config.l2.write_allocate = false;
    let simulator = simulate(&config, vec![MemAccess::store(0x2000)])?;
    let result = simulator.result();
    assert_eq!(result.memory_writes, 1);
    assert_eq!(result.memory_reads, 0);
    // Retires as soon as the write buffer accepts it
    assert_eq!(result.cpu.total_access_cycles, 11);
    assert_eq!(result.cycles, 112);
    assert!(!simulator.l1().check(0x2000));
    assert!(!simulator.l2().check(0x2000));
    Ok(())
}

#[test]
fn full_write_queue_stalls_the_cpu() -> Result<(), Box<dyn Error>> {
    let mut config = hierarchy(true);
    config.l1.write_allocate = false;
    config.l2.write_allocate = false;
    config.memory.write_queue = QueueConfig::new("W", 1, 50, false);
    let simulator = simulate(&config, vec![MemAccess::store(0x0), MemAccess::store(0x4000)])?;
    let result = simulator.result();
    assert_eq!(result.memory_writes, 2);
    // The second store waits from cycle 23 until the first write drains at 61
    assert_eq!(result.cpu.total_access_cycles, 11 + 50);
    Ok(())
}

#[test]
fn write_through_hit_posts_to_l2() -> Result<(), Box<dyn Error>> {
    let mut config = hierarchy(true);
    config.l1.write_through = true;
    config.l1.write_allocate = false;
    let simulator = simulate(&config, vec![MemAccess::load(0x300), MemAccess::store(0x300)])?;
    let result = simulator.result();
    assert_eq!(result.cpu.l1_hits, 1);
    // The L2 copy takes the store, the write-back L2 absorbs it
    assert!(simulator.l2().is_dirty(0x300));
    assert_eq!(result.memory_writes, 0);
    assert_eq!(result.cpu.total_access_cycles, 111 + 1);
    Ok(())
}

#[test]
fn write_through_hit_blocked_on_write_buffer_waits_below_l1() -> Result<(), Box<dyn Error>> {
    let mut config = hierarchy(true);
    for cache in [&mut config.l1, &mut config.l2] {
        cache.write_through = true;
        cache.write_allocate = false;
    }
    config.memory.write_queue = QueueConfig::new("W", 1, 50, false);
    let trace = VecTrace::new(vec![MemAccess::load(0x300), MemAccess::store(0x0), MemAccess::store(0x300)]);
    let mut simulator = Simulator::new(&config, trace)?;
    // The store to 0x0 holds the only write slot from 123 to 173, the hit on 0x300 resolves at 125
    while simulator.cycle() <= 125 {
        simulator.step();
    }
    assert!(simulator.write_queue().is_full());
    assert_eq!(simulator.cpu().status(), CpuState::WaitingOnL2);
    let result = simulator.run()?;
    assert_eq!(result.cpu.l1_hits, 1);
    assert_eq!(result.memory_writes, 2);
    assert_eq!(result.cpu.total_access_cycles, 111 + 11 + 50);
    Ok(())
}

#[test]
fn cycle_limit_is_reported() {
    let mut config = hierarchy(true);
    config.max_cycles = 50;
    let mut simulator = Simulator::new(&config, VecTrace::new(vec![MemAccess::load(0x0)])).unwrap();
    match simulator.run() {
        Err(SimulationError::CycleLimit { cycles }) => assert_eq!(cycles, 50),
        other => panic!("expected the cycle limit, got {other:?}"),
    }
}

#[test]
fn bad_configuration_is_rejected() {
    let mut config = hierarchy(true);
    config.l2.num_sets = 48;
    match Simulator::new(&config, VecTrace::default()) {
        Err(SimulationError::Config(ConfigError::NotPowerOfTwo { field, value })) => {
            assert_eq!(field, "num_sets");
            assert_eq!(value, 48);
        }
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

#[test]
fn random_replacement_runs_are_reproducible() -> Result<(), Box<dyn Error>> {
    let mut config = hierarchy(true);
    config.l1.replacement_policy = ReplacementPolicyConfig::Random;
    config.l2.replacement_policy = ReplacementPolicyConfig::Random;
    let accesses = mixed_workload(3, 3_000, 1 << 16);
    let first = simulate(&config, accesses.clone())?.result();
    let second = simulate(&config, accesses)?.result();
    assert_eq!(first, second);
    assert_eq!(first.cpu.requests, 3_000);
    Ok(())
}

#[test]
fn config_parses_from_json() -> Result<(), Box<dyn Error>> {
    let json = r#"{
        "l1": { "name": "L1", "num_sets": 64, "associativity": 2, "block_size": 32, "write_allocate": true },
        "l2": { "name": "L2", "num_sets": 256, "associativity": 8, "block_size": 64,
                "replacement_policy": "random", "seed": 7 },
        "memory": {
            "read_queue": { "label": "R", "capacity": 4, "latency": 80 },
            "write_queue": { "label": "W", "capacity": 4, "latency": 80, "pipelined": false }
        },
        "prefetch_next_line": true
    }"#;
    let config: HierarchyConfig = serde_json::from_str(json)?;
    assert_eq!(config.l1.replacement_policy, ReplacementPolicyConfig::LeastRecentlyUsed);
    assert_eq!(config.l1.seed, 100);
    assert_eq!(config.l2.replacement_policy, ReplacementPolicyConfig::Random);
    assert!(!config.l2.write_allocate);
    assert!(config.memory.read_queue.pipelined);
    assert!(!config.memory.write_queue.pipelined);
    assert_eq!(config.l1_latency, 1);
    assert_eq!(config.l2_latency, 10);
    config.validate()?;
    Ok(())
}

#[test]
fn run_trace_file() -> Result<(), Box<dyn Error>> {
    let accesses = mixed_workload(11, 500, 1 << 13);
    let path = std::env::temp_dir().join(format!("hierlib-trace-{}.txt", std::process::id()));
    let mut text = to_trace_text(&accesses);
    text.push_str("not a trace line\n");
    fs::write(&path, text)?;

    let reader = get_reader(File::open(&path)?)?;
    let mut from_file = Simulator::new(&HierarchyConfig::default(), TraceReader::new(reader))?;
    let file_result = from_file.run()?;
    fs::remove_file(&path)?;

    let in_memory = simulate(&HierarchyConfig::default(), accesses)?.result();
    assert_eq!(file_result.skipped_trace_lines, 1);
    assert_eq!(file_result.cpu, in_memory.cpu);
    assert_eq!(file_result.cycles, in_memory.cycles);
    assert!(file_result.cpu.amat >= 1.0);
    Ok(())
}
