//! A gshare predictor: global history XOR'ed into the PC index.

use crate::branch::OpType;
use crate::config::{PHT_CTR_INIT, PHT_CTR_WIDTH, PHT_HYST_SHARING, PHT_LOG_ENTRIES};
use crate::predictor::pht::{PackedCounterTable, PackedTableConfig};
use crate::predictor::Predictor;

pub struct GsharePredictor {
    pht: PackedCounterTable,
    ghr: u64,
    mask: u64,
}

impl GsharePredictor {
    pub fn new() -> Self {
        let entries = 1usize << PHT_LOG_ENTRIES;
        let pht = PackedTableConfig {
            entries,
            width: PHT_CTR_WIDTH,
            init: PHT_CTR_INIT,
            sharing: vec![1, PHT_HYST_SHARING],
        }
        .build();
        Self {
            pht,
            ghr: 0,
            mask: (entries - 1) as u64,
        }
    }

    fn index(&self, pc: u64) -> usize {
        ((self.ghr ^ pc) & self.mask) as usize
    }
}

impl Default for GsharePredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl Predictor for GsharePredictor {
    fn name(&self) -> &'static str {
        "gshare"
    }

    fn get_prediction(&mut self, pc: u64) -> bool {
        self.pht.get(self.index(pc)).dir != 0
    }

    fn update_predictor(
        &mut self,
        pc: u64,
        _op: OpType,
        taken: bool,
        _predicted: bool,
        _target: u64,
    ) {
        let index = self.index(pc);
        let counter = self.pht.get(index);
        self.pht.save(index, counter.updated(taken as u8));

        self.ghr = (self.ghr << 1) | taken as u64;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::branch::OpType;

    #[test]
    fn learns_an_alternating_branch() {
        let mut p = GsharePredictor::new();
        let pc = 0x8000;
        let mut mispred = 0;
        for i in 0..2000u32 {
            let taken = i % 2 == 0;
            let predicted = p.get_prediction(pc);
            if predicted != taken {
                mispred += 1;
            }
            p.update_predictor(pc, OpType::JmpDirectCond, taken, predicted, 0);
        }
        // The alternating pattern keys two counters through the history
        // bits; both lock in after warm-up.
        assert!(mispred < 32, "mispredicted {} of 2000", mispred);
    }

    #[test]
    fn history_separates_contexts() {
        let mut p = GsharePredictor::new();
        let pc = 0x8000;
        for _ in 0..8 {
            let predicted = p.get_prediction(pc);
            p.update_predictor(pc, OpType::JmpDirectCond, true, predicted, 0);
        }
        assert!(p.get_prediction(pc));
    }
}
