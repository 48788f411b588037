use std::fs::File;
use std::io::BufReader;
use std::time::Instant;

use clap::Parser;
use hierlib::config::HierarchyConfig;
use hierlib::io::get_reader;
use hierlib::simulator::Simulator;
use hierlib::trace::TraceReader;
use log::info;

#[cfg(debug_assertions)]
const DEBUG_DEFAULT: bool = true;

#[cfg(not(debug_assertions))]
const DEBUG_DEFAULT: bool = false;

#[derive(Parser, Debug)]
#[command(about = String::from("Cycle-level simulator for a two level cache hierarchy driven by a memory trace"))]
struct Args {
    /// Path to the JSON hierarchy configuration
    config: String,
    /// Path to the trace, one `<hex address> <L|S>` per line
    trace: String,

    #[arg(short, long)]
    performance: bool,

    #[arg(short, long, default_value_t = DEBUG_DEFAULT)]
    debug: bool,
}

fn main() -> Result<(), String> {
    env_logger::init();
    let start = Instant::now();
    let args = Args::parse();
    let config_file = File::open(&args.config).map_err(|e| format!("Couldn't open the config file at path {}: {e}", args.config))?;
    let config: HierarchyConfig = serde_json::from_reader(BufReader::new(config_file)).map_err(|e| format!("Couldn't parse the config file: {e}"))?;
    let trace_file = File::open(&args.trace).map_err(|e| format!("Couldn't open the trace file at path {}: {e}", args.trace))?;
    let trace_reader = TraceReader::new(get_reader(trace_file)?);
    let mut simulator = Simulator::new(&config, trace_reader).map_err(|e| format!("Couldn't build the hierarchy: {e}"))?;
    info!("simulating {} against {}", args.trace, args.config);
    let result = simulator.run().map_err(|e| format!("Simulation failed: {e}"))?;
    println!("{}", serde_json::to_string_pretty(&result).map_err(|e| format!("Couldn't serialise the output {e}"))?);
    if args.performance {
        let end = Instant::now();
        let simulation_time = simulator.get_execution_time();
        let total_time = end - start;
        println!("Simulation time: {}s", simulation_time.as_nanos() as f64 / 1e9);
        println!("Simulated cycles per second: {:.0}", result.cycles as f64 / simulation_time.as_secs_f64().max(1e-9));
        println!("Total execution time (includes initial parsing, configuration, and output): {}s", total_time.as_nanos() as f64 / 1e9)
    }
    if args.debug {
        #[cfg(debug_assertions)]
        println!("Running the debug binary, debug mode is enabled by default. If benchmarking, do not use this binary, re-compile with the --release argument when using cargo run");
        println!("Parsed input configuration: {config:?}");
        let formatted = simulator
            .get_occupied_line_counts()
            .iter()
            .map(|(name, count)| format!("{name}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        println!("Occupied cache lines by level: ({formatted})");
        simulator.read_queue().dump();
        simulator.write_queue().dump();
    }
    Ok(())
}
