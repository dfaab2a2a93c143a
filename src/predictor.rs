//! Implementations of different branch predictors.

pub mod bimodal;
pub mod counter;
pub mod gshare;
pub mod gskew;
pub mod pht;
pub mod table;
pub mod tage;

pub use bimodal::*;
pub use counter::*;
pub use gshare::*;
pub use gskew::*;
pub use pht::*;
pub use table::*;
pub use tage::*;

use crate::branch::OpType;
use crate::Outcome;

/// Interface to a predictor with some internal state which is only subject
/// to change by the correct branch outcome.
pub trait StatefulPredictor {
    fn name(&self) -> &'static str;

    /// Reset the internal state of the predictor.
    fn reset(&mut self);

    /// Return the current predicted outcome.
    fn predict(&self) -> Outcome;

    /// Update the internal state of the predictor with the correct outcome.
    fn update(&mut self, outcome: Outcome);
}

/// The contract between the simulation driver and a branch predictor.
///
/// All three operations are synchronous, stateful, and single-threaded.
/// The driver pre-hashes the program counter (`pc ^= pc >> 2`) before
/// every call; implementations may mix further.
pub trait Predictor {
    fn name(&self) -> &'static str;

    /// Return true to predict "taken". Must be deterministic given the
    /// current state; may warm caches but must not touch counters.
    fn get_prediction(&mut self, pc: u64) -> bool;

    /// Train on a resolved conditional branch. Implementations recompute
    /// the prediction internally rather than trusting `predicted`.
    fn update_predictor(
        &mut self,
        pc: u64,
        op: OpType,
        taken: bool,
        predicted: bool,
        target: u64,
    );

    /// Observe an unconditional branch. Most predictors ignore these;
    /// history-based ones may record the control-flow change.
    fn track_other(&mut self, _pc: u64, _op: OpType, _direction: bool, _target: u64) {}
}

/// Which predictor the driver should construct.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PredictorKind {
    Bimodal,
    Gshare,
    TwoBcGskew,
    Tage,
}

/// Build a predictor with its default (build-time) geometry.
pub fn build(kind: PredictorKind) -> Box<dyn Predictor> {
    match kind {
        PredictorKind::Bimodal => Box::new(BimodalPredictor::new()),
        PredictorKind::Gshare => Box::new(GsharePredictor::new()),
        PredictorKind::TwoBcGskew => Box::new(TwoBcGskew::new()),
        PredictorKind::Tage => Box::new(default_tage()),
    }
}
