use std::env;
use std::io;
use std::path::Path;
use std::process;

use log::debug;

use bt9sim::config::DEFAULT_PREDICTOR;
use bt9sim::error::TraceError;
use bt9sim::sim;
use bt9sim::stats::{BranchProfile, SimStats};
use bt9sim::trace::TraceReader;

/// The trace file name up to its first `.`, used as the JSON key.
fn trace_stem(path: &str) -> String {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    match name.find('.') {
        Some(dot) => name[..dot].to_string(),
        None => name,
    }
}

fn run(trace_path: &str) -> Result<(), TraceError> {
    let mut reader = TraceReader::open(trace_path)?;
    let mut predictor = bt9sim::predictor::build(DEFAULT_PREDICTOR);
    let mut stats = SimStats::new(trace_stem(trace_path));
    let mut profile = BranchProfile::new();

    let counters = sim::run(
        &mut reader,
        predictor.as_mut(),
        &mut stats,
        &mut profile,
    )?;

    stats.finalize(
        reader.header().total_instruction_count()?,
        reader.header().branch_instruction_count()?,
        counters.conditional,
        counters.unconditional,
        counters.mispredictions,
    );

    debug!(
        "{}: {} unique branch sites",
        predictor.name(),
        profile.num_unique_branches()
    );
    for (pc, data) in profile.worst_branches(8) {
        debug!(
            "  {:016x} {:8}/{:8} ({:.4})",
            pc,
            data.hits,
            data.occurrences,
            data.hit_rate()
        );
    }

    stats.write_json(io::stdout().lock())?;
    Ok(())
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: {} <trace>", args[0]);
        process::exit(1);
    }

    if let Err(e) = run(&args[1]) {
        eprintln!("{}", e);
        process::exit(1);
    }
}
