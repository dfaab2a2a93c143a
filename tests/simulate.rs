//! End-to-end simulations over synthetic compressed traces.

use std::io::Write;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use bt9sim::error::TraceError;
use bt9sim::predictor::{Predictor, TwoBcGskew};
use bt9sim::sim::{self, SimCounters};
use bt9sim::stats::{BranchProfile, SimStats};
use bt9sim::trace::TraceReader;

/// Encode a sequence of edge IDs in the BT10 format with the terminating
/// sentinel.
fn encode_bt10(ids: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    for &id in ids {
        if id < 255 {
            out.push(id as u8);
        } else {
            out.push(0xFF);
            out.extend_from_slice(&id.to_le_bytes());
        }
    }
    out.push(0xFF);
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

/// Assemble a compressed trace. The node table always starts with the
/// fake source node 0; every sequence starts with edge 0 out of it.
fn build_trace(nodes: &[&str], edges: &[&str], seq: &[u32], instructions: u64) -> Vec<u8> {
    let mut text = String::new();
    text.push_str("BT9_SPA_TRACE_FORMAT\n");
    text.push_str("bt9_minor_version: 0\n");
    text.push_str("has_physical_address: 0\n");
    text.push_str(&format!("total_instruction_count: {}\n", instructions));
    text.push_str(&format!("branch_instruction_count: {}\n", seq.len() + 1));
    text.push_str("BT9_NODES\n");
    text.push_str("NODE 0 0x0 - 0x0 0\n");
    for n in nodes {
        text.push_str(&format!("NODE {}\n", n));
    }
    text.push_str("BT9_EDGES\n");
    for e in edges {
        text.push_str(&format!("EDGE {}\n", e));
    }
    text.push_str("BT10_SMALL_INDEX_SIZE_8\n");
    text.push_str("BT10_BIG_INDEX_SIZE_32\n");

    let mut bytes = text.into_bytes();
    bytes.extend_from_slice(&encode_bt10(seq));
    zstd::stream::encode_all(&bytes[..], 0).unwrap()
}

fn write_trace(compressed: &[u8]) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(compressed).unwrap();
    f.flush().unwrap();
    f
}

/// Run a full simulation with the default 2bc-gskew predictor, finalizing
/// the stats the way the binary does.
fn simulate(compressed: &[u8]) -> Result<(SimCounters, SimStats), TraceError> {
    let f = write_trace(compressed);
    let mut reader = TraceReader::open(f.path())?;
    let mut predictor = TwoBcGskew::new();
    simulate_with(&mut reader, &mut predictor)
}

fn simulate_with(
    reader: &mut TraceReader,
    predictor: &mut dyn Predictor,
) -> Result<(SimCounters, SimStats), TraceError> {
    let mut stats = SimStats::new("synthetic");
    let mut profile = BranchProfile::new();
    let counters = sim::run(reader, predictor, &mut stats, &mut profile)?;
    stats.finalize(
        reader.header().total_instruction_count()?,
        reader.header().branch_instruction_count()?,
        counters.conditional,
        counters.unconditional,
        counters.mispredictions,
    );
    Ok((counters, stats))
}

/// A single conditional site at 0x1000 with taken and not-taken edges
/// (ids 1 and 2); outcome `true` picks edge 1.
fn conditional_site_trace(outcomes: &[bool]) -> Vec<u8> {
    let mut seq = vec![0u32];
    seq.extend(outcomes.iter().map(|&t| if t { 1u32 } else { 2u32 }));
    build_trace(
        &["1 0x1000 - 0xff 4 class: JMP+DIR+CND"],
        &[
            "0 0 1 T 0x1000 - 1",
            "1 1 1 T 0x1000 - 9",
            "2 1 1 N 0x1004 - 9",
        ],
        &seq,
        (seq.len() as u64) * 10,
    )
}

#[test]
fn strictly_taken_branch_warms_up_quickly() {
    let outcomes = vec![true; 2000];
    let (counters, stats) = simulate(&conditional_site_trace(&outcomes)).unwrap();

    assert_eq!(counters.conditional, 2000);
    assert!(
        stats.num_mispredictions <= 16,
        "{} mispredictions",
        stats.num_mispredictions
    );
    // All warm-up misses land inside the first snapshot window.
    let mpkbr_1k = stats.mpkbr_1k.expect("1K snapshot reached");
    assert!(mpkbr_1k <= 16.0, "MPKBr_1K = {}", mpkbr_1k);
}

#[test]
fn perfect_anticorrelation_with_short_history() {
    let outcomes: Vec<bool> = (0..10_000).map(|i| i % 2 == 0).collect();
    let (_, stats) = simulate(&conditional_site_trace(&outcomes)).unwrap();

    let mpkbr_10k = stats.mpkbr_10k.expect("10K snapshot reached");
    assert!(mpkbr_10k <= 10.0, "MPKBr_10K = {}", mpkbr_10k);
}

#[test]
fn uniform_random_sanity_bound() {
    let mut rng = SmallRng::seed_from_u64(0xb7a9c3);
    let outcomes: Vec<bool> = (0..100_000).map(|_| rng.gen::<bool>()).collect();
    let (_, stats) = simulate(&conditional_site_trace(&outcomes)).unwrap();

    // An unpredictable branch sits at ~500 MPKBr; leave headroom for
    // binomial noise above the 50% line.
    let mpkbr_10k = stats.mpkbr_10k.expect("10K snapshot reached");
    assert!(mpkbr_10k <= 530.0, "MPKBr_10K = {}", mpkbr_10k);
    let mpkbr_100k = stats.mpkbr_100k.expect("100K snapshot reached");
    assert!(mpkbr_100k <= 510.0, "MPKBr_100K = {}", mpkbr_100k);
}

#[test]
fn unconditional_only_trace() {
    let mut seq = vec![0u32];
    seq.extend(std::iter::repeat(1u32).take(1000));
    let compressed = build_trace(
        &["1 0x2000 - 0xff 4 class: CALL+DIR+UCD"],
        &["0 0 1 T 0x2000 - 1", "1 1 1 T 0x2000 - 4"],
        &seq,
        5000,
    );
    let (counters, stats) = simulate(&compressed).unwrap();

    assert_eq!(stats.num_conditional_br, 0);
    assert_eq!(stats.num_uncond_br, 1000);
    assert_eq!(stats.num_mispredictions, 0);
    assert_eq!(stats.mispred_per_1k_inst, Some(0.0));
    assert_eq!(counters.instances, 1001);
}

#[test]
fn sentinel_only_trace() {
    let compressed = build_trace(&[], &["0 0 0 T 0x0 - 1"], &[0], 10);
    let (counters, stats) = simulate(&compressed).unwrap();

    assert_eq!(counters.conditional, 0);
    assert!(stats.mpkbr_1k.is_none());
    assert!(stats.mpkbr_10b.is_none());
    assert_eq!(stats.num_mispredictions, 0);
}

#[test]
fn truncated_compressed_stream() {
    let outcomes = vec![true; 50_000];
    let mut compressed = conditional_site_trace(&outcomes);
    compressed.truncate(compressed.len() - 4);

    let f = write_trace(&compressed);
    let result = (|| -> Result<(), TraceError> {
        let mut reader = TraceReader::open(f.path())?;
        let mut predictor = TwoBcGskew::new();
        simulate_with(&mut reader, &mut predictor)?;
        Ok(())
    })();
    match result {
        Err(e @ TraceError::TruncatedStream) => {
            assert!(e.to_string().contains("truncated"));
        }
        other => panic!("expected a truncated-stream failure, got {:?}", other.err()),
    }
}

#[test]
fn json_output_schema() {
    let outcomes = vec![true; 1500];
    let (_, stats) = simulate(&conditional_site_trace(&outcomes)).unwrap();

    let mut out = Vec::new();
    stats.write_json(&mut out).unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let obj = &v["synthetic"];
    for key in [
        "MPKBr_1K",
        "MPKBr_10B",
        "NUM_INSTRUCTIONS",
        "NUM_BR",
        "NUM_UNCOND_BR",
        "NUM_CONDITIONAL_BR",
        "NUM_MISPREDICTIONS",
        "MISPRED_PER_1K_INST",
        "TRACE",
    ] {
        assert!(!obj[key].is_null() || key == "MPKBr_10B", "missing {}", key);
    }
    assert!(obj["MPKBr_10B"].is_null());
    assert_eq!(obj["NUM_CONDITIONAL_BR"], 1500);
}

#[test]
fn tage_runs_the_same_contract() {
    let outcomes: Vec<bool> = (0..4000).map(|i| i % 2 == 0).collect();
    let f = write_trace(&conditional_site_trace(&outcomes));
    let mut reader = TraceReader::open(f.path()).unwrap();
    let mut predictor = bt9sim::predictor::default_tage();
    let (counters, stats) = simulate_with(&mut reader, &mut predictor).unwrap();

    assert_eq!(counters.conditional, 4000);
    // Alternation is trivially captured by one history bit.
    let mpkbr = stats.mpkbr_1k.expect("1K snapshot reached");
    assert!(mpkbr < 250.0, "MPKBr_1K = {}", mpkbr);
}
