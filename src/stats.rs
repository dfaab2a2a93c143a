//! Accuracy statistics and the JSON results object.

use std::collections::BTreeMap;
use std::io::Write;

use itertools::Itertools;
use serde::Serialize;

use crate::error::TraceError;

/// The result object serialized to stdout, keyed by the trace file stem.
///
/// `MPKBr_*` snapshots are mispredictions per thousand branch instances,
/// sampled when the driver's instance counter crosses each threshold;
/// unreached thresholds serialize as null.
#[derive(Debug, Serialize)]
pub struct SimStats {
    #[serde(rename = "MPKBr_1K")]
    pub mpkbr_1k: Option<f64>,
    #[serde(rename = "MPKBr_10K")]
    pub mpkbr_10k: Option<f64>,
    #[serde(rename = "MPKBr_100K")]
    pub mpkbr_100k: Option<f64>,
    #[serde(rename = "MPKBr_1M")]
    pub mpkbr_1m: Option<f64>,
    #[serde(rename = "MPKBr_10M")]
    pub mpkbr_10m: Option<f64>,
    #[serde(rename = "MPKBr_30M")]
    pub mpkbr_30m: Option<f64>,
    #[serde(rename = "MPKBr_60M")]
    pub mpkbr_60m: Option<f64>,
    #[serde(rename = "MPKBr_100M")]
    pub mpkbr_100m: Option<f64>,
    #[serde(rename = "MPKBr_300M")]
    pub mpkbr_300m: Option<f64>,
    #[serde(rename = "MPKBr_600M")]
    pub mpkbr_600m: Option<f64>,
    #[serde(rename = "MPKBr_1B")]
    pub mpkbr_1b: Option<f64>,
    #[serde(rename = "MPKBr_10B")]
    pub mpkbr_10b: Option<f64>,
    #[serde(rename = "TRACE")]
    pub trace: String,
    #[serde(rename = "NUM_INSTRUCTIONS")]
    pub num_instructions: u64,
    #[serde(rename = "NUM_BR")]
    pub num_br: u64,
    #[serde(rename = "NUM_UNCOND_BR")]
    pub num_uncond_br: u64,
    #[serde(rename = "NUM_CONDITIONAL_BR")]
    pub num_conditional_br: u64,
    #[serde(rename = "NUM_MISPREDICTIONS")]
    pub num_mispredictions: u64,
    #[serde(rename = "MISPRED_PER_1K_INST")]
    pub mispred_per_1k_inst: Option<f64>,
}

impl SimStats {
    pub fn new(trace: impl ToString) -> Self {
        Self {
            mpkbr_1k: None,
            mpkbr_10k: None,
            mpkbr_100k: None,
            mpkbr_1m: None,
            mpkbr_10m: None,
            mpkbr_30m: None,
            mpkbr_60m: None,
            mpkbr_100m: None,
            mpkbr_300m: None,
            mpkbr_600m: None,
            mpkbr_1b: None,
            mpkbr_10b: None,
            trace: trace.to_string(),
            num_instructions: 0,
            num_br: 0,
            num_uncond_br: 0,
            num_conditional_br: 0,
            num_mispredictions: 0,
            mispred_per_1k_inst: None,
        }
    }

    /// Record a snapshot if the driver's instance counter sits exactly on
    /// one of the decision points. The thresholds compare against branch
    /// instances, not instructions.
    pub fn record_heartbeat(&mut self, instances: u64, mispredictions: u64) {
        let mpkbr = 1000.0 * mispredictions as f64 / instances as f64;
        match instances {
            1_000 => self.mpkbr_1k = Some(mpkbr),
            10_000 => self.mpkbr_10k = Some(mpkbr),
            100_000 => self.mpkbr_100k = Some(mpkbr),
            1_000_000 => self.mpkbr_1m = Some(mpkbr),
            10_000_000 => self.mpkbr_10m = Some(mpkbr),
            30_000_000 => self.mpkbr_30m = Some(mpkbr),
            60_000_000 => self.mpkbr_60m = Some(mpkbr),
            100_000_000 => self.mpkbr_100m = Some(mpkbr),
            300_000_000 => self.mpkbr_300m = Some(mpkbr),
            600_000_000 => self.mpkbr_600m = Some(mpkbr),
            1_000_000_000 => self.mpkbr_1b = Some(mpkbr),
            10_000_000_000 => self.mpkbr_10b = Some(mpkbr),
            _ => {}
        }
    }

    /// Fill in the totals after the last instance.
    ///
    /// `declared_branches` includes the dummy branch at the start of the
    /// trace, which is subtracted here.
    pub fn finalize(
        &mut self,
        declared_instructions: u64,
        declared_branches: u64,
        conditional: u64,
        unconditional: u64,
        mispredictions: u64,
    ) {
        self.num_instructions = declared_instructions;
        self.num_br = declared_branches.saturating_sub(1);
        self.num_conditional_br = conditional;
        self.num_uncond_br = unconditional;
        self.num_mispredictions = mispredictions;
        if declared_instructions > 0 {
            self.mispred_per_1k_inst =
                Some(1000.0 * mispredictions as f64 / declared_instructions as f64);
        }
    }

    /// Write the results as a single JSON object keyed by the trace stem.
    pub fn write_json(&self, mut w: impl Write) -> Result<(), TraceError> {
        let mut root = serde_json::Map::new();
        root.insert(self.trace.clone(), serde_json::to_value(self)?);
        serde_json::to_writer_pretty(&mut w, &root)?;
        writeln!(w)?;
        Ok(())
    }
}

/// Per-branch accounting, indexed by program counter value.
pub struct BranchProfile {
    data: BTreeMap<u64, BranchData>,
}

/// Container for per-branch statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct BranchData {
    /// Number of times this branch was encountered.
    pub occurrences: u64,

    /// Number of correct predictions for this branch.
    pub hits: u64,
}

impl BranchData {
    /// Return the hit rate for this branch.
    pub fn hit_rate(&self) -> f64 {
        self.hits as f64 / self.occurrences as f64
    }
}

impl BranchProfile {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, pc: u64, hit: bool) {
        let data = self.data.entry(pc).or_default();
        data.occurrences += 1;
        if hit {
            data.hits += 1;
        }
    }

    /// Returns the number of unique observed branch sites.
    pub fn num_unique_branches(&self) -> usize {
        self.data.len()
    }

    /// The most frequently executed branches with a poor hit rate.
    pub fn worst_branches(&self, n: usize) -> Vec<(u64, BranchData)> {
        self.data
            .iter()
            .filter(|(_, s)| s.occurrences > 100 && s.hit_rate() <= 0.55)
            .sorted_by(|x, y| x.1.occurrences.cmp(&y.1.occurrences))
            .rev()
            .take(n)
            .map(|(pc, s)| (*pc, *s))
            .collect()
    }
}

impl Default for BranchProfile {
    fn default() -> Self {
        Self::new()
    }
}
