//! A "TAgged GEometric history length" (TAGE) family predictor.
//!
//! See "A case for (partially) TAgged GEometric history length branch
//! prediction" (Seznec, 2006). A base bimodal component backs a set of
//! tagged components with geometrically increasing history lengths; the
//! longest-history component whose tag matches provides the prediction.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::branch::OpType;
use crate::config::{TAGE_GHR_BITS, TAGE_SEED};
use crate::history::{FoldedHistoryRegister, HistoryRegister};
use crate::predictor::counter::{SaturatingCounter, SaturatingCounterConfig};
use crate::predictor::table::{IndexStrategy, PredictorTable, TagStrategy, TaggedPredictorTable};
use crate::predictor::{Predictor, StatefulPredictor};
use crate::Outcome;
use std::ops::RangeInclusive;

/// Container for inputs passed to a [`TAGEPredictor`] and its components.
#[derive(Clone, Copy)]
pub struct TAGEInputs {
    /// Program counter associated with a predicted branch
    pub pc: usize,
}

/// Identifies a particular component in a [`TAGEPredictor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TAGEProvider {
    /// The base component
    Base,

    /// A tagged component
    Tagged(usize),
}

/// Output from [`TAGEPredictor::predict`]: the predicted outcome plus the
/// components involved in making it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TAGEPrediction {
    /// The component providing the prediction
    pub provider: TAGEProvider,

    /// A predicted direction
    pub outcome: Outcome,

    /// Alternate component used to provide a prediction
    pub alt_provider: TAGEProvider,

    /// Predicted direction from the alternate component
    pub alt_outcome: Outcome,
}

/// Configuration for a [`TAGEBaseComponent`].
#[derive(Clone, Debug)]
pub struct TAGEBaseConfig {
    /// Parameters for the saturating counters
    pub ctr: SaturatingCounterConfig,

    /// Number of entries
    pub size: usize,

    /// Strategy for indexing into the table.
    pub index_strat: IndexStrategy<TAGEBaseComponent>,
}

impl TAGEBaseConfig {
    pub fn build(self) -> TAGEBaseComponent {
        assert!(self.size.is_power_of_two());
        TAGEBaseComponent {
            data: vec![self.ctr.build(); self.size],
            cfg: self,
        }
    }
}

/// Configuration for a [`TAGEComponent`].
#[derive(Clone, Debug)]
pub struct TAGEComponentConfig {
    /// Number of entries
    pub size: usize,

    /// Relevant slice in global history
    pub ghr_range: RangeInclusive<usize>,

    /// Number of tag bits
    pub tag_bits: usize,

    /// Number of bits in the 'useful' counter
    pub useful_bits: usize,

    /// Strategy for indexing into the table
    pub index_strat: IndexStrategy<TAGEComponent>,

    /// Strategy for creating tags
    pub tag_strat: TagStrategy<TAGEComponent>,

    /// Parameters for the saturating counters
    pub ctr: SaturatingCounterConfig,
}

impl TAGEComponentConfig {
    pub fn build(self) -> TAGEComponent {
        assert!(self.size.is_power_of_two());
        let csr = FoldedHistoryRegister::new(
            self.size.ilog2() as usize,
            self.ghr_range.clone(),
        );
        let entry = TAGEEntry::new(self.ctr.build(), self.useful_bits);
        let data = vec![entry; self.size];
        TAGEComponent {
            cfg: self,
            data,
            csr,
        }
    }
}

/// Configuration for a [`TAGEPredictor`].
#[derive(Clone, Debug)]
pub struct TAGEConfig {
    /// Base component configuration
    pub base: TAGEBaseConfig,

    /// Tagged component configurations
    pub comp: Vec<TAGEComponentConfig>,
}

impl TAGEConfig {
    pub fn new(base: TAGEBaseConfig) -> Self {
        Self {
            base,
            comp: Vec::new(),
        }
    }

    /// Add a tagged component. Components are kept sorted so that the
    /// longest associated history length is always at index 0.
    pub fn add_component(&mut self, c: TAGEComponentConfig) {
        self.comp.push(c);
        self.comp.sort_by(|x, y| {
            let x_len = x.ghr_range.end() - x.ghr_range.start();
            let y_len = y.ghr_range.end() - y.ghr_range.start();
            std::cmp::Ord::cmp(&y_len, &x_len)
        });
    }

    pub fn build(self) -> TAGEPredictor {
        let cfg = self.clone();
        let comp = self
            .comp
            .iter()
            .map(|c| c.clone().build())
            .collect::<Vec<TAGEComponent>>();
        let base = self.base.build();
        TAGEPredictor {
            cfg,
            base,
            comp,
            reset_ctr: 0,
            hist: TAGEHistory::new(TAGE_GHR_BITS),
            rng: SmallRng::seed_from_u64(TAGE_SEED),
        }
    }
}

/// A base component in the TAGE predictor.
#[derive(Clone, Debug)]
pub struct TAGEBaseComponent {
    pub cfg: TAGEBaseConfig,

    /// A table of saturating counters
    pub data: Vec<SaturatingCounter>,
}

impl PredictorTable for TAGEBaseComponent {
    type Input<'a> = TAGEInputs;
    type Index = usize;
    type Entry = SaturatingCounter;

    fn size(&self) -> usize {
        self.cfg.size
    }

    fn get_index(&self, input: TAGEInputs) -> usize {
        let res = match self.cfg.index_strat {
            IndexStrategy::FromPc(func) => (func)(self, input.pc),
        };
        res & self.index_mask()
    }

    fn get_entry(&self, idx: usize) -> &SaturatingCounter {
        &self.data[idx & self.index_mask()]
    }
    fn get_entry_mut(&mut self, idx: usize) -> &mut SaturatingCounter {
        let index = idx & self.index_mask();
        &mut self.data[index]
    }
}

/// An entry in some [TAGEComponent].
#[derive(Clone, Debug)]
pub struct TAGEEntry {
    /// State machine tracking a branch outcome
    pub ctr: SaturatingCounter,

    /// The number of bits in the 'useful' counter
    pub useful_bits: usize,

    /// The 'useful' counter, used to determine when the entry is
    /// eligible to be invalidated and replaced
    pub useful: u8,

    /// Tag associated with this entry
    pub tag: Option<usize>,
}

impl TAGEEntry {
    pub fn new(ctr: SaturatingCounter, useful_bits: usize) -> Self {
        Self {
            ctr,
            useful_bits,
            useful: 0,
            tag: None,
        }
    }

    /// Get the current predicted outcome.
    pub fn predict(&self) -> Outcome {
        self.ctr.predict()
    }

    /// Returns true if the provided tag matches this entry.
    pub fn tag_matches(&self, tag: usize) -> bool {
        if let Some(val) = self.tag {
            val == tag
        } else {
            false
        }
    }

    /// Increment the 'useful' counter.
    pub fn increment_useful(&mut self) {
        self.useful = (self.useful + 1).clamp(0, (1 << self.useful_bits) - 1);
    }

    /// Invalidate this entry.
    pub fn invalidate(&mut self) {
        self.ctr.reset();
        self.useful = 0;
        self.tag = None;
    }
}

/// A tagged component in the TAGE predictor.
#[derive(Clone, Debug)]
pub struct TAGEComponent {
    pub cfg: TAGEComponentConfig,
    /// Table of entries
    pub data: Vec<TAGEEntry>,
    /// Folded global history
    pub csr: FoldedHistoryRegister,
}

impl TAGEComponent {
    /// Reset the 'useful' counter for all entries in this component.
    pub fn reset_useful_bits(&mut self) {
        for entry in self.data.iter_mut() {
            entry.useful = 0;
        }
    }
}

impl PredictorTable for TAGEComponent {
    type Input<'a> = TAGEInputs;
    type Index = usize;
    type Entry = TAGEEntry;

    fn size(&self) -> usize {
        self.cfg.size
    }

    fn get_index(&self, input: TAGEInputs) -> usize {
        let res = match self.cfg.index_strat {
            IndexStrategy::FromPc(func) => (func)(self, input.pc),
        };
        res & self.index_mask()
    }

    fn get_entry(&self, idx: usize) -> &TAGEEntry {
        &self.data[idx & self.index_mask()]
    }
    fn get_entry_mut(&mut self, idx: usize) -> &mut TAGEEntry {
        let index = idx & self.index_mask();
        &mut self.data[index]
    }
}

impl<'a> TaggedPredictorTable<'a> for TAGEComponent {
    fn get_tag(&self, input: TAGEInputs) -> usize {
        match self.cfg.tag_strat {
            TagStrategy::FromPc(func) => (func)(self, input.pc),
        }
    }
}

/// The predictor's private view of global history.
///
/// Advanced exactly once per `update_predictor` / `track_other` call;
/// every folded (CSR) register is refreshed from it on each advance.
pub struct TAGEHistory {
    pub ghr: HistoryRegister,
}

impl TAGEHistory {
    pub fn new(bits: usize) -> Self {
        Self {
            ghr: HistoryRegister::new(bits),
        }
    }

    fn advance(&mut self, outcome: bool, comp: &mut [TAGEComponent]) {
        self.ghr.shift_in(outcome);
        for c in comp.iter_mut() {
            c.csr.update(&self.ghr);
        }
    }
}

/// The TAGE predictor: a base component, a set of tagged components, and
/// the history plumbing that feeds their index/tag hashes.
pub struct TAGEPredictor {
    /// The configuration used to create this object
    pub cfg: TAGEConfig,

    /// Base component
    pub base: TAGEBaseComponent,

    /// Tagged components
    pub comp: Vec<TAGEComponent>,

    /// Counter used to periodically reset all 'useful' counters
    pub reset_ctr: u8,

    /// Global history management
    pub hist: TAGEHistory,

    rng: SmallRng,
}

impl TAGEPredictor {
    /// Return the index of the tagged component with the shortest
    /// associated history length.
    pub fn shortest_tagged_component(&self) -> usize {
        self.comp.len() - 1
    }

    /// Make a prediction for the provided input.
    pub fn predict(&self, input: TAGEInputs) -> TAGEPrediction {
        let base_idx = self.base.get_index(input);
        let default_outcome = self.base.get_entry(base_idx).predict();

        let mut result = TAGEPrediction {
            provider: TAGEProvider::Base,
            outcome: default_outcome,
            alt_provider: TAGEProvider::Base,
            alt_outcome: default_outcome,
        };

        // Find the longest-length tagged component that yields a match;
        // the next match down provides the alternate prediction.
        for (comp_idx, component) in self.comp.iter().enumerate() {
            let index = component.get_index(input);
            let tag = component.get_tag(input);
            let entry = component.get_entry(index);
            if entry.tag_matches(tag) {
                result.alt_provider = result.provider;
                result.alt_outcome = result.outcome;
                result.provider = TAGEProvider::Tagged(comp_idx);
                result.outcome = entry.predict();
                break;
            }
        }
        result
    }

    /// Given a program counter value and the provider of an incorrect
    /// prediction, try to select a tagged component that will be used to
    /// allocate a new entry.
    ///
    /// Returns [None] if we fail to allocate a new entry.
    fn alloc(&mut self, input: TAGEInputs, provider: TAGEProvider) -> Option<usize> {
        // The provider with the longest history is always at index 0;
        // nothing is left to allocate above it.
        if matches!(provider, TAGEProvider::Tagged(0)) {
            return None;
        }

        // Components whose history is longer than the provider's are
        // candidates, but only when their entry has no 'useful' credit.
        let provider_range = match provider {
            TAGEProvider::Base => 0..=self.shortest_tagged_component(),
            TAGEProvider::Tagged(idx) => 0..=(idx - 1),
        };

        let mut candidates: Vec<usize> = Vec::new();
        for idx in provider_range {
            let index = self.comp[idx].get_index(input);
            if self.comp[idx].get_entry(index).useful == 0 {
                candidates.push(idx);
            }
        }

        if candidates.is_empty() {
            return None;
        }
        if candidates.len() == 1 {
            return candidates.first().copied();
        }

        // Weight the choice *down* with increasing history length: given
        // candidates with history lengths J < K, J is twice as likely.
        let weights: Vec<usize> = candidates.iter().map(|idx| 1 << idx).collect();
        let dist = WeightedIndex::new(&weights).unwrap();
        Some(candidates[dist.sample(&mut self.rng)])
    }

    /// Update the predictor to account for a misprediction.
    fn update_incorrect(
        &mut self,
        input: TAGEInputs,
        prediction: TAGEPrediction,
        outcome: Outcome,
    ) {
        // Update the entry in the component that provided the prediction
        match prediction.provider {
            TAGEProvider::Base => {
                let index = self.base.get_index(input);
                self.base.get_entry_mut(index).update(outcome);
            }
            TAGEProvider::Tagged(idx) => {
                let index = self.comp[idx].get_index(input);
                self.comp[idx].get_entry_mut(index).ctr.update(outcome);
            }
        }

        // Try to allocate a new entry, initialized with the correct
        // outcome in the weakest state. Allocation attempts are tracked
        // with a counter that forces a global 'useful' reset when too
        // many fail.
        if let Some(idx) = self.alloc(input, prediction.provider) {
            let new_index = self.comp[idx].get_index(input);
            let new_tag = self.comp[idx].get_tag(input);
            let new_entry = self.comp[idx].get_entry_mut(new_index);
            new_entry.invalidate();
            new_entry.tag = Some(new_tag);
            new_entry.useful = 0;
            new_entry.ctr.set_direction(outcome);
            new_entry.ctr.set_strength(0);
            self.reset_ctr = self.reset_ctr.saturating_add(1);
        } else {
            self.reset_ctr = self.reset_ctr.saturating_sub(1);
        }
    }

    /// Update the predictor to account for a correct prediction.
    fn update_correct(
        &mut self,
        input: TAGEInputs,
        prediction: TAGEPrediction,
        outcome: Outcome,
    ) {
        match prediction.provider {
            TAGEProvider::Base => {
                let index = self.base.get_index(input);
                self.base.get_entry_mut(index).update(outcome);
            }
            // The entry only earns 'useful' credit when the alternate
            // prediction would have been wrong.
            TAGEProvider::Tagged(idx) => {
                let index = self.comp[idx].get_index(input);
                let alt_wrong = prediction.alt_outcome != outcome;
                let entry = self.comp[idx].get_entry_mut(index);
                if alt_wrong {
                    entry.increment_useful();
                }
                entry.ctr.update(outcome);
            }
        }
    }

    /// Given a particular prediction and the resolved outcome, update the
    /// state of the predictor.
    pub fn update(&mut self, input: TAGEInputs, prediction: TAGEPrediction, outcome: Outcome) {
        if prediction.outcome != outcome {
            self.update_incorrect(input, prediction, outcome);
        } else {
            self.update_correct(input, prediction, outcome);
        }

        // Periodically reset *all* of the 'useful' counters across all
        // tagged components.
        if self.reset_ctr == u8::MAX {
            self.reset_ctr = 0;
            for comp in self.comp.iter_mut() {
                comp.reset_useful_bits();
            }
        }
    }
}

impl Predictor for TAGEPredictor {
    fn name(&self) -> &'static str {
        "tage"
    }

    fn get_prediction(&mut self, pc: u64) -> bool {
        self.predict(TAGEInputs { pc: pc as usize }).outcome.into()
    }

    fn update_predictor(
        &mut self,
        pc: u64,
        _op: OpType,
        taken: bool,
        _predicted: bool,
        _target: u64,
    ) {
        let input = TAGEInputs { pc: pc as usize };
        let prediction = self.predict(input);
        self.update(input, prediction, Outcome::from(taken));
        self.hist.advance(taken, &mut self.comp);
    }

    fn track_other(&mut self, _pc: u64, _op: OpType, direction: bool, _target: u64) {
        self.hist.advance(direction, &mut self.comp);
    }
}

/// The default geometry: a 4K-entry base component and five 4K-entry
/// tagged components over history lengths 8..128.
pub fn default_tage() -> TAGEPredictor {
    let ctr = SaturatingCounterConfig {
        max_t_state: 4,
        max_n_state: 4,
        default_state: Outcome::N,
    };
    let mut cfg = TAGEConfig::new(TAGEBaseConfig {
        ctr,
        size: 1 << 12,
        index_strat: IndexStrategy::FromPc(|_, pc| pc),
    });

    for ghr_range_hi in &[7, 15, 31, 63, 127] {
        cfg.add_component(TAGEComponentConfig {
            size: 1 << 12,
            ghr_range: 0..=*ghr_range_hi,
            tag_bits: 8,
            useful_bits: 1,
            ctr,
            index_strat: IndexStrategy::FromPc(|component, pc| {
                pc ^ component.csr.output_usize()
            }),
            tag_strat: TagStrategy::FromPc(|component, pc| {
                let ghist0_bits = component.csr.output_usize();
                let ghist1_bits = component.csr.output_usize() << 1;
                let eff_tag_mask = (1 << component.cfg.tag_bits) - 1;
                (pc ^ ghist0_bits ^ ghist1_bits) & eff_tag_mask
            }),
        });
    }
    cfg.build()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::branch::OpType;

    #[test]
    fn components_sorted_longest_first() {
        let tage = default_tage();
        let lens: Vec<usize> = tage
            .comp
            .iter()
            .map(|c| c.cfg.ghr_range.end() - c.cfg.ghr_range.start())
            .collect();
        assert!(lens.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn learns_always_taken() {
        let mut p = default_tage();
        let pc = 0x40_0000;
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
    fn learns_short_period_pattern() {
        let mut p = default_tage();
        let pc = 0x40_1000;
        let mut mispred_tail = 0;
        for i in 0..8000u32 {
            let taken = i % 4 == 0;
            let predicted = p.get_prediction(pc);
            if predicted != taken && i >= 4000 {
                mispred_tail += 1;
            }
            p.update_predictor(pc, OpType::JmpDirectCond, taken, predicted, 0);
        }
        // The period-4 pattern fits comfortably in the shortest history.
        assert!(mispred_tail < 100, "{} tail mispredictions", mispred_tail);
    }

    #[test]
    fn unconditional_branches_advance_history() {
        let mut p = default_tage();
        let before = p.comp[0].csr.output_usize();
        for _ in 0..8 {
            p.track_other(0x1234, OpType::JmpDirectUncond, true, 0x5678);
        }
        let after = p.comp[0].csr.output_usize();
        assert_ne!(before, after);
    }
}
