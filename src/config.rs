//! Build-time tuning constants.
//!
//! These mirror the parameters that would otherwise be injected by a build
//! system; changing a predictor's geometry means recompiling.

use crate::predictor::PredictorKind;

/// Predictor constructed by the `predictor` binary.
pub const DEFAULT_PREDICTOR: PredictorKind = PredictorKind::TwoBcGskew;

/// Number of branch instances between snapshot checks in the driver.
pub const HEARTBEAT_INTERVAL: u64 = 1000;

/// Capacity (in edge IDs) of the edge-sequence access window.
pub const EDGE_SEQUENCE_BUFFER_SIZE: usize = 1 << 15;

/// Capacity (in bytes) of the staging area in front of the BT10 decoder.
pub const BT10_STAGING_SIZE: usize = 1 << 16;

/// log2 of the total number of prediction bits in the 2bc-gskew predictor.
pub const LOGPRED: usize = 18;

/// Mask for the gskew ping-pong breaker; the breaker fires when
/// `rng & NR == 0`, i.e. with probability 1/(NR+1).
pub const NR: u32 = 31;

/// Global-history lengths for the four gskew logical tables.
pub const L_G0: u32 = 24;
pub const L_G1: u32 = 64;
pub const L_BIM: u32 = 10;
pub const L_META: u32 = 14;

/// Seed for the gskew ping-pong breaker PRNG.
pub const GSKEW_SEED: u64 = 0x2bc6_5ce4;

/// log2 of the number of entries in the bimodal/gshare pattern history table.
pub const PHT_LOG_ENTRIES: usize = 17;

/// Width (in bits) of the bimodal/gshare saturating counters.
pub const PHT_CTR_WIDTH: u32 = 2;

/// Initial raw value of every bimodal/gshare counter.
pub const PHT_CTR_INIT: u32 = 0;

/// Sharing factor of the hysteresis bit-plane: two logical counters
/// share one hysteresis bit.
pub const PHT_HYST_SHARING: u32 = 2;

/// Seed for the tagged-geometric predictor's allocation PRNG.
pub const TAGE_SEED: u64 = 0x7a9e;

/// Length (in bits) of the tagged-geometric global history register.
pub const TAGE_GHR_BITS: usize = 128;
