use std::fs::File;
use std::io::BufReader;
use std::time::Instant;
use clap::Parser;
use log::{info, LevelFilter};
use memlib::config::HierarchyConfig;
use memlib::io::load_trace;
use memlib::simulator::Simulator;

#[cfg(debug_assertions)]
const DEBUG_DEFAULT: bool = true;

#[cfg(not(debug_assertions))]
const DEBUG_DEFAULT: bool = false;

#[derive(Parser, Debug)]
#[command(about = String::from("Memory hierarchy simulator"))]
struct Args {
    /// JSON hierarchy configuration
    config: String,
    /// Trace of accesses, one per line
    trace: String,

    /// Sample and reset the counters after this many accesses. 0 treats the trace as one step
    #[arg(short, long, default_value_t = 0)]
    step: u64,

    #[arg(short, long)]
    performance: bool,

    #[arg(short, long, default_value_t = DEBUG_DEFAULT)]
    debug: bool,
}

fn main() -> Result<(), String> {
    let start = Instant::now();
    let args = Args::parse();
    env_logger::Builder::new()
        .format_timestamp(None)
        .filter_level(if args.debug { LevelFilter::Debug } else { LevelFilter::Warn })
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    let config_file = File::open(&args.config).map_err(|e| format!("Couldn't open the config file at path {}: {e}", args.config))?;
    let config = HierarchyConfig::from_reader(BufReader::new(config_file)).map_err(|e| format!("Couldn't parse the config file: {e}"))?;
    let mut simulator = Simulator::new(&config).map_err(|e| format!("Couldn't build the hierarchy: {e}"))?.with_step(args.step);
    let trace_file = File::open(&args.trace).map_err(|e| format!("Couldn't open the trace file at path {}: {e}", args.trace))?;
    let trace = load_trace(trace_file)?;
    let result = simulator
        .simulate_with(&trace, |hierarchy| info!("{}", serde_json::to_string(&hierarchy.report()).unwrap_or_default()))
        .map_err(|e| format!("Simulation failed: {e}"))?;
    println!("{}", serde_json::to_string_pretty(result).map_err(|e| format!("Couldn't serialise the output {e}"))?);
    if args.performance {
        let simulation_time = simulator.get_execution_time();
        let total_time = start.elapsed();
        println!("Simulation time: {}s", simulation_time.as_nanos() as f64 / 1e9);
        println!("Total execution time (includes initial parsing, configuration, and output): {}s", total_time.as_nanos() as f64 / 1e9)
    }
    if args.debug {
        #[cfg(debug_assertions)]
        println!("Running the debug binary, debug mode is enabled by default. If benchmarking, do not use this binary, re-compile with the --release argument when using cargo run");
        println!("Parsed input configuration: {config:?}");
        let uninitialised_lines = simulator.get_uninitialised_line_counts();
        let formatted = simulator
            .hierarchy()
            .report()
            .levels
            .iter()
            .map(|level| level.name.clone())
            .zip(uninitialised_lines.iter())
            .map(|(name, count)| format!("{name}: {}", *count))
            .collect::<Vec<_>>()
            .join(", ");
        println!("Uninitialised cache lines by level: ({formatted})");
        println!("Total uninitialised cache lines: {}", uninitialised_lines.iter().sum::<u64>())
    }
    Ok(())
}
