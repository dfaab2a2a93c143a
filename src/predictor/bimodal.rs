//! A PC-indexed bimodal predictor over the packed counter table.

use crate::branch::OpType;
use crate::config::{PHT_CTR_INIT, PHT_CTR_WIDTH, PHT_HYST_SHARING, PHT_LOG_ENTRIES};
use crate::predictor::pht::{PackedCounterTable, PackedTableConfig};
use crate::predictor::Predictor;

pub struct BimodalPredictor {
    pht: PackedCounterTable,
    mask: u64,
}

impl BimodalPredictor {
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
            mask: (entries - 1) as u64,
        }
    }

    fn index(&self, pc: u64) -> usize {
        (pc & self.mask) as usize
    }
}

impl Default for BimodalPredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl Predictor for BimodalPredictor {
    fn name(&self) -> &'static str {
        "bimodal"
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
    }
}
