//! The 2bc-gskew predictor.
//!
//! Four logical tables (G0, G1, BIM, META) vote through a meta selector:
//!
//! - G0 and G1 share a single array of 2^(LOGPRED-1) prediction bits;
//! - BIM and META share a single array of 2^(LOGPRED-2) prediction bits;
//! - a single array of 2^(LOGPRED-2) hysteresis bits, four-way banked,
//!   is shared among all four logical tables.
//!
//! Indexing folds a per-table amount of global history into the address
//! and then applies one of the four skewing functions from the PARLE'93
//! skewed-associative paper. The final index selects one of four banks
//! with the low two bits.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::branch::OpType;
use crate::config::{GSKEW_SEED, L_BIM, L_G0, L_G1, L_META, LOGPRED, NR};
use crate::predictor::Predictor;

/// One table index per logical table, bank bits included.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TableIndices {
    pub g0: usize,
    pub g1: usize,
    pub bim: usize,
    pub meta: usize,
}

/// The `H` involution over `log`-bit values.
fn h(a: i64, log: u32) -> i64 {
    let mut res = a ^ (a << (log - 1));
    res &= 1i64 << (log - 1);
    res + ((a & ((1i64 << log) - 1)) >> 1)
}

/// The inverse involution `Hi`.
fn hi(a: i64, log: u32) -> i64 {
    let res = ((a >> (log - 1)) ^ (a >> (log - 2))) & 1;
    res + ((a & ((1i64 << (log - 1)) - 1)) << 1)
}

/// Skewing functions F1..F4 from the PARLE'93 paper, masked to `log` bits.
fn skew(funct: u32, a: i64, log: u32) -> i64 {
    let mask = (1i64 << log) - 1;
    match funct {
        1 => (h(a, log) ^ hi(a >> log, log) ^ (a >> log)) & mask,
        2 => (h(a, log) ^ hi(a >> log, log) ^ a) & mask,
        3 => (hi(a, log) ^ h(a >> log, log) ^ (a >> log)) & mask,
        4 => (hi(a, log) ^ h(a >> log, log) ^ a) & mask,
        _ => unreachable!("unimplemented index function F{}", funct),
    }
}

/// Compute the raw (pre-bank) index for one logical table: fold `m` bits
/// of history into the address, mix in two address shifts, collapse the
/// 64-bit intermediate down to `log` bits, then skew with `F_funct`.
fn table_index(addr: i64, hist: i64, m: u32, funct: u32, log: u32) -> usize {
    let mut hm = if m < 32 {
        (hist & ((1i64 << m) - 1)) + (addr << m)
    } else if m != 32 {
        (hist << (64 - m)) ^ addr
    } else {
        ((hist & 0xFFFF_FFFF) << 18) ^ addr
    };
    hm ^= (addr << funct) ^ (addr << (10 + funct));

    let mut inter = hm;
    let step = 2 * (log - funct) + 1;
    let mut i = 0;
    while i < 64 {
        inter >>= log;
        inter >>= log - (funct + 1);
        hm ^= inter;
        i += step;
    }
    skew(funct, hm, log) as usize
}

pub struct TwoBcGskew {
    /// Shared prediction bits for G0 and G1.
    gog1: Vec<u8>,

    /// Shared prediction bits for BIM and META.
    bimmeta: Vec<u8>,

    /// Shared hysteresis bits, four-way banked.
    hyst: Vec<u8>,

    /// Global history; shifted left by one on each update.
    ghist: i64,

    /// Drives the ping-pong breaker. Seeded per instance so runs are
    /// reproducible.
    rng: SmallRng,
}

impl TwoBcGskew {
    pub fn new() -> Self {
        Self::with_seed(GSKEW_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            gog1: vec![0u8; 1 << (LOGPRED - 1)],
            bimmeta: vec![0u8; 1 << (LOGPRED - 2)],
            hyst: vec![0u8; 1 << (LOGPRED - 2)],
            ghist: 0,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub(crate) fn indices(&self, pc: u64) -> TableIndices {
        let mut add = pc as i32;
        add = (add >> 4) ^ add;
        let numhyst = ((add ^ self.ghist as i32) & 3) as usize;
        let mut addr = add as i64;
        let ghist = self.ghist ^ ((self.ghist & 3) << 5);
        addr ^= addr >> 5;

        let log = (LOGPRED - 3) as u32;
        let g0 = (table_index(addr, ghist, L_G0, 1, log) << 2) + numhyst;
        let g1 = (table_index(addr, ghist, L_G1, 2, log) << 2) + (numhyst ^ 1);

        let log = (LOGPRED - 4) as u32;
        let bim = (table_index(addr, ghist, L_BIM, 3, log) << 2) + (numhyst ^ 2);
        let meta = (table_index(addr, ghist, L_META, 4, log) << 2) + (numhyst ^ 3);

        debug_assert_eq!(g0 >> (LOGPRED - 1), 0);
        debug_assert_eq!(g1 >> (LOGPRED - 1), 0);
        debug_assert_eq!(bim >> (LOGPRED - 2), 0);
        debug_assert_eq!(meta >> (LOGPRED - 2), 0);

        TableIndices { g0, g1, bim, meta }
    }

    fn predict(&self, pc: u64) -> bool {
        let ix = self.indices(pc);
        let pg0 = self.gog1[ix.g0];
        let pg1 = self.gog1[ix.g1];
        let pbim = self.bimmeta[ix.bim];
        let pmeta = self.bimmeta[ix.meta];
        if pmeta != 0 {
            pbim + pg0 + pg1 > 1
        } else {
            pbim > 0
        }
    }

    fn update(&mut self, pc: u64, taken: bool) {
        // First recompute the prediction from the tables.
        let ix = self.indices(pc);
        let pg0_bit = self.gog1[ix.g0] as i32;
        let pg1_bit = self.gog1[ix.g1] as i32;
        let pbim_bit = self.bimmeta[ix.bim] as i32;
        let pmeta_bit = self.bimmeta[ix.meta] as i32;

        let vote_sum = pbim_bit + pg0_bit + pg1_bit;
        let peskew = vote_sum > 1;
        let psmall = pbim_bit > 0;
        let prediction = if pmeta_bit != 0 { peskew } else { psmall };

        // Reassemble the complete two-bit counter values. The G0/G1
        // hysteresis lookups alias into the smaller shared array.
        let hyst_mask = (1usize << (LOGPRED - 2)) - 1;
        let mut pg0 = (pg0_bit << 1) + self.hyst[ix.g0 & hyst_mask] as i32;
        let mut pg1 = (pg1_bit << 1) + self.hyst[ix.g1 & hyst_mask] as i32;
        let mut pbim = (pbim_bit << 1) + self.hyst[ix.bim] as i32;
        let mut pmeta = (pmeta_bit << 1) + self.hyst[ix.meta] as i32;

        let outcome = taken as i32;
        let chance = (self.rng.gen::<u32>() & NR) == 0;

        if prediction != taken && chance {
            // Break ping-pong phenomena: either force all three voters to
            // the resolved direction, or flip the meta selector.
            if peskew == psmall {
                let forced = if taken { 3 } else { 1 };
                pbim = forced;
                pg0 = forced;
                pg1 = forced;
            } else {
                pmeta = (pmeta & 2) ^ 2;
            }
        } else if vote_sum != 3 * outcome {
            // At least one voter disagreed with the outcome.
            if (pbim & 2) == 2 * outcome {
                pbim = 3 * outcome;
            } else if prediction != taken {
                pbim = (pbim & 1) + 1;
            }

            if peskew != psmall {
                if peskew == taken {
                    pmeta = (pmeta + 1).min(3);
                } else {
                    pmeta = (pmeta - 1).max(0);
                }
            }

            // G0/G1 train only when META trusts the skewed vote or we
            // just mispredicted.
            if pmeta > 1 || prediction != taken {
                if (pg1 & 2) == 2 * outcome {
                    pg1 = 3 * outcome;
                } else if prediction != taken {
                    pg1 = (pg1 & 1) + 1;
                }
            }
            if pmeta > 1 || prediction != taken {
                if (pg0 & 2) == 2 * outcome {
                    pg0 = 3 * outcome;
                } else if prediction != taken {
                    pg0 = (pg0 & 1) + 1;
                }
            }
        }

        self.hyst[ix.g0 & hyst_mask] = (pg0 & 1) as u8;
        self.hyst[ix.g1 & hyst_mask] = (pg1 & 1) as u8;
        self.hyst[ix.bim] = (pbim & 1) as u8;
        self.hyst[ix.meta] = (pmeta & 1) as u8;
        self.gog1[ix.g0] = ((pg0 >> 1) & 1) as u8;
        self.gog1[ix.g1] = ((pg1 >> 1) & 1) as u8;
        self.bimmeta[ix.bim] = ((pbim >> 1) & 1) as u8;
        self.bimmeta[ix.meta] = ((pmeta >> 1) & 1) as u8;

        // The history shift comes last so the update saw the same history
        // the prediction used.
        self.ghist = (self.ghist << 1) | taken as i64;
    }
}

impl Default for TwoBcGskew {
    fn default() -> Self {
        Self::new()
    }
}

impl Predictor for TwoBcGskew {
    fn name(&self) -> &'static str {
        "2bc-gskew"
    }

    fn get_prediction(&mut self, pc: u64) -> bool {
        self.predict(pc)
    }

    fn update_predictor(
        &mut self,
        pc: u64,
        _op: OpType,
        taken: bool,
        _predicted: bool,
        _target: u64,
    ) {
        self.update(pc, taken);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::branch::OpType;

    #[test]
    fn indices_stay_in_their_planes() {
        let p = TwoBcGskew::new();
        for i in 0..4096u64 {
            let pc = 0x4000_0000 ^ (i * 0x9e37);
            let ix = p.indices(pc);
            assert!(ix.g0 < 1 << (LOGPRED - 1));
            assert!(ix.g1 < 1 << (LOGPRED - 1));
            assert!(ix.bim < 1 << (LOGPRED - 2));
            assert!(ix.meta < 1 << (LOGPRED - 2));
        }
    }

    #[test]
    fn banks_differ_per_table() {
        let p = TwoBcGskew::new();
        let ix = p.indices(0x1234_5678);
        // The four bank selectors are the same two bits XOR'ed with
        // 0..3, so they are pairwise distinct.
        let banks = [ix.g0 & 3, ix.g1 & 3, ix.bim & 3, ix.meta & 3];
        for i in 0..4 {
            for j in i + 1..4 {
                assert_ne!(banks[i], banks[j]);
            }
        }
    }

    #[test]
    fn deterministic_across_instances() {
        let mut a = TwoBcGskew::new();
        let mut b = TwoBcGskew::new();
        for i in 0..512u64 {
            let pc = 0x1000 + (i % 7) * 4;
            let taken = i % 3 != 0;
            assert_eq!(a.get_prediction(pc), b.get_prediction(pc));
            a.update_predictor(pc, OpType::JmpDirectCond, taken, false, 0);
            b.update_predictor(pc, OpType::JmpDirectCond, taken, false, 0);
        }
    }

    #[test]
    fn learns_always_taken() {
        let mut p = TwoBcGskew::new();
        let pc = 0x40_1234;
        let mut mispred = 0;
        for _ in 0..2000 {
            let predicted = p.get_prediction(pc);
            if !predicted {
                mispred += 1;
            }
            p.update_predictor(pc, OpType::JmpDirectCond, true, predicted, 0);
        }
        assert!(mispred <= 16, "mispredicted {} of 2000", mispred);
    }

    #[test]
    fn learns_alternation() {
        let mut p = TwoBcGskew::new();
        let pc = 0x40_5678;
        let mut mispred_tail = 0;
        for i in 0..10_000u32 {
            let taken = i % 2 == 0;
            let predicted = p.get_prediction(pc);
            if predicted != taken && i >= 256 {
                mispred_tail += 1;
            }
            p.update_predictor(pc, OpType::JmpDirectCond, taken, predicted, 0);
        }
        assert_eq!(mispred_tail, 0, "still mispredicting after warm-up");
    }

    #[test]
    fn history_affects_indexing() {
        let mut p = TwoBcGskew::new();
        let before = p.indices(0x1000);
        p.update(0x1000, true);
        let after = p.indices(0x1000);
        // G1 folds 64 bits of history; one shifted-in outcome must move it.
        assert_ne!(before.g1, after.g1);
    }
}
