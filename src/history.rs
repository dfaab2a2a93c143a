use bitvec::prelude::*;
use std::ops::RangeInclusive;

/// A global history register tracking recent branch outcomes.
///
/// Bit 0 is the newest outcome; shifting moves older outcomes toward
/// higher indices and discards them off the top.
pub struct HistoryRegister {
    pub data: BitVec<usize, Lsb0>,
    len: usize,
}

// NOTE: This *reverses* all of the bits and presents them in a format
// where the leftmost bit is the most-significant (index n) and the
// rightmost bit is the least-significant (index 0).
impl std::fmt::Display for HistoryRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let x: String = self
            .data
            .as_bitslice()
            .iter()
            .by_vals()
            .map(|b| if b { '1' } else { '0' })
            .rev()
            .collect();
        write!(f, "{}", x)
    }
}

impl HistoryRegister {
    /// Create a register with the specified length in bits.
    /// All bits in the register are initialized to zero.
    pub fn new(len: usize) -> Self {
        Self {
            data: bitvec![usize, Lsb0; 0; len],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    pub fn data(&self) -> &BitVec {
        &self.data
    }

    /// Shift the register by one bit and record a new outcome in bit 0.
    pub fn shift_in(&mut self, outcome: bool) {
        self.data.shift_right(1);
        self.data.set(0, outcome);
    }

    /// Return some slice of bits.
    pub fn read(&self, range: RangeInclusive<usize>) -> &BitSlice {
        &self.data[range]
    }

    /// Fold [with XOR] some slice of bits.
    pub fn fold(&self, range: RangeInclusive<usize>, output_bits: usize) -> usize {
        let output_mask = (1 << output_bits) - 1;
        let slice = &self.data[range];
        let chunks = slice.chunks(output_bits);
        let res = chunks.fold(0, |mut res, x| {
            let val = x.load::<usize>();
            res ^= val;
            res
        });
        res & output_mask
    }
}

/// A circular shift register used to track folded history.
///
/// This folds some global history into 'size' bits, but without the need to
/// actually read all of the history bits and fold them all together with XOR.
/// The result should be equivalent to using [HistoryRegister::fold].
///
/// NOTE: This is only valid when shifting in a single bit per update.
#[derive(Clone, Debug)]
pub struct FoldedHistoryRegister {
    data: BitVec,

    /// The size of the output [in bits].
    output_size: usize,

    /// The range of bits in global history to-be-folded.
    ghist_range: RangeInclusive<usize>,
}

impl FoldedHistoryRegister {
    pub fn new(output_size: usize, ghist_range: RangeInclusive<usize>) -> Self {
        Self {
            data: bitvec![0; output_size],
            output_size,
            ghist_range,
        }
    }

    /// Return the folded history as a [BitSlice].
    pub fn output(&self) -> &BitSlice {
        self.data.as_bitslice()
    }

    /// Return the folded history as a [usize].
    pub fn output_usize(&self) -> usize {
        self.data.load::<usize>()
    }

    /// Using some [HistoryRegister], update the folded history.
    pub fn update(&mut self, ghr: &HistoryRegister) {
        let slice = &ghr.data()[self.ghist_range.clone()];
        let ghist_size = self.ghist_range.end() - self.ghist_range.start();

        let index = ghist_size % self.output_size;

        let newest_bit = *slice.first().unwrap();
        let oldest_bit = *slice.last().unwrap();
        let first_bit = newest_bit ^ self.data[0];
        let last_bit = oldest_bit ^ self.data[index];

        // Rotate by one bit
        self.data.rotate_right(1);

        // The newest relevant history bit is XOR'ed with with the first bit
        self.data.set(0, first_bit);

        // The last relevant history bit will be XOR'ed with this bit
        self.data.set(index, last_bit);
    }
}
