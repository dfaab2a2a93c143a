//! The simulation driver: replay branch instances against a predictor.

use crate::branch::{classify, Conditionality, OpType};
use crate::config::HEARTBEAT_INTERVAL;
use crate::error::TraceError;
use crate::predictor::Predictor;
use crate::stats::{BranchProfile, SimStats};
use crate::trace::TraceReader;

/// Tallies accumulated by the driver loop.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimCounters {
    /// Branch instances consumed, including the sentinel.
    pub instances: u64,
    pub conditional: u64,
    pub unconditional: u64,
    pub mispredictions: u64,
}

/// Replay every branch instance in the trace through the predictor.
///
/// Conditional branches are predicted, then disclosed to the predictor;
/// unconditional branches are only tracked. Snapshot accounting runs on
/// the instance counter every [HEARTBEAT_INTERVAL] instances.
pub fn run(
    reader: &mut TraceReader,
    predictor: &mut dyn Predictor,
    stats: &mut SimStats,
    profile: &mut BranchProfile,
) -> Result<SimCounters, TraceError> {
    let mut counters = SimCounters::default();
    let mut heartbeat = 0u64;

    loop {
        let Some(inst) = reader.next_instance()? else {
            break;
        };
        let class = inst.src.class;
        let node_id = inst.src.id;
        let pc = inst.src.virtual_addr;
        let taken = inst.edge.taken;
        let target = inst.edge.virtual_target;

        counters.instances += 1;
        heartbeat += 1;
        if heartbeat == HEARTBEAT_INTERVAL {
            stats.record_heartbeat(counters.instances, counters.mispredictions);
            heartbeat = 0;
        }

        let op = classify(&class);
        if op == OpType::Error {
            // The first node in the graph is a fake branch; anywhere else
            // an unclassifiable instance is fatal.
            if node_id != 0 {
                return Err(TraceError::Classification {
                    pc,
                    reason: "unclassifiable branch",
                });
            }
            continue;
        }

        let mixed_pc = pc ^ (pc >> 2);
        match class.conditionality {
            Conditionality::Conditional => {
                let predicted = predictor.get_prediction(mixed_pc);
                let mispredicted = predicted != taken;
                predictor.update_predictor(mixed_pc, op, taken, predicted, target);
                if mispredicted {
                    counters.mispredictions += 1;
                }
                counters.conditional += 1;
                profile.record(pc, !mispredicted);
            }
            Conditionality::Unconditional => {
                counters.unconditional += 1;
                predictor.track_other(mixed_pc, op, taken, target);
            }
            Conditionality::Unknown => {
                return Err(TraceError::Classification {
                    pc,
                    reason: "unknown conditionality",
                });
            }
        }
    }
    Ok(counters)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::predictor::TwoBcGskew;
    use crate::trace::test::{build_trace, write_trace};

    fn run_gskew(compressed: &[u8]) -> (SimCounters, SimStats) {
        let f = write_trace(compressed);
        let mut reader = TraceReader::open(f.path()).unwrap();
        let mut predictor = TwoBcGskew::new();
        let mut stats = SimStats::new("test");
        let mut profile = BranchProfile::new();
        let counters = run(&mut reader, &mut predictor, &mut stats, &mut profile).unwrap();
        (counters, stats)
    }

    #[test]
    fn counts_conditional_and_unconditional() {
        let compressed = build_trace(
            &[
                "0 0x0 - 0x0 0",
                "1 0x1000 - 0xff 4 class: JMP+DIR+CND",
                "2 0x2000 - 0xff 4 class: CALL+DIR+UCD",
            ],
            &[
                "0 0 1 T 0x1000 - 1",
                "1 1 2 T 0x2000 - 2",
                "2 2 1 T 0x1000 - 2",
            ],
            &[0, 1, 2, 1, 2],
        );
        let (counters, _) = run_gskew(&compressed);
        assert_eq!(counters.instances, 5);
        assert_eq!(counters.conditional, 2);
        assert_eq!(counters.unconditional, 2);
    }

    #[test]
    fn sentinel_error_is_tolerated() {
        // Node 0 has no class annotation; its instance classifies as an
        // error but is skipped silently.
        let compressed = build_trace(
            &["0 0x0 - 0x0 0", "1 0x1000 - 0xff 4 class: JMP+DIR+CND"],
            &["0 0 1 T 0x1000 - 1", "1 1 1 T 0x1000 - 2"],
            &[0, 1, 1],
        );
        let (counters, _) = run_gskew(&compressed);
        assert_eq!(counters.instances, 3);
        assert_eq!(counters.conditional, 2);
    }

    #[test]
    fn unclassifiable_nonsentinel_is_fatal() {
        let compressed = build_trace(
            &["0 0x0 - 0x0 0", "1 0x1000 - 0xff 4"],
            &["0 0 1 T 0x1000 - 1", "1 1 1 T 0x1000 - 2"],
            &[0, 1],
        );
        let f = write_trace(&compressed);
        let mut reader = TraceReader::open(f.path()).unwrap();
        let mut predictor = TwoBcGskew::new();
        let mut stats = SimStats::new("test");
        let mut profile = BranchProfile::new();
        let res = run(&mut reader, &mut predictor, &mut stats, &mut profile);
        assert!(matches!(res, Err(TraceError::Classification { .. })));
    }

    #[test]
    fn snapshot_at_exactly_1000_instances() {
        let seq: Vec<u32> = std::iter::once(0)
            .chain(std::iter::repeat(1).take(999))
            .collect();
        let compressed = build_trace(
            &["0 0x0 - 0x0 0", "1 0x1000 - 0xff 4 class: JMP+DIR+CND"],
            &["0 0 1 T 0x1000 - 1", "1 1 1 T 0x1000 - 2"],
            &seq,
        );
        let (counters, stats) = run_gskew(&compressed);
        assert_eq!(counters.instances, 1000);
        assert!(stats.mpkbr_1k.is_some());
        assert!(stats.mpkbr_10k.is_none());
    }

    #[test]
    fn no_snapshot_at_999_instances() {
        let seq: Vec<u32> = std::iter::once(0)
            .chain(std::iter::repeat(1).take(998))
            .collect();
        let compressed = build_trace(
            &["0 0x0 - 0x0 0", "1 0x1000 - 0xff 4 class: JMP+DIR+CND"],
            &["0 0 1 T 0x1000 - 1", "1 1 1 T 0x1000 - 2"],
            &seq,
        );
        let (counters, stats) = run_gskew(&compressed);
        assert_eq!(counters.instances, 999);
        assert!(stats.mpkbr_1k.is_none());
    }
}
