//! Stages of the bitonic network and their comparison formulas
//!
//! Every stage compares pairs of elements within blocks of `block_height`
//! elements.  The pairing is defined once, here, and used by every device
//! and by the visualization; see [`swap_partner`] and [`lane_pair`].

/// Comparison network evaluated by a single stage
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::EnumIter,
    strum::IntoStaticStr,
    strum::Display,
)]
#[repr(u32)]
pub enum Operation {
    /// Mirror comparison within each block
    ///
    /// Element `i` is compared against the element at the mirrored position
    /// of its block, i.e. `h - 1 - (i mod h) + h * floor(i / h)`.
    Flip = 1,

    /// Half-block comparison within each block
    ///
    /// Element `i` in the lower half of its block is compared against
    /// element `i + h / 2`.
    Disperse = 2,
}

impl Operation {
    /// Returns the numeric code passed to compute shaders
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Iterates over `(name, code)` tuples, with names in `CamelCase`
///
/// This is a helper function for defining constants in a compute shader
pub fn iter_ops() -> impl Iterator<Item = (&'static str, u32)> {
    use strum::IntoEnumIterator;

    Operation::iter().map(|op| {
        let s: &'static str = op.into();
        (s, op.code())
    })
}

/// A single stage of the network: one operation at one block height
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Stage {
    /// Comparison network to evaluate
    pub op: Operation,

    /// Span (in elements) of one comparison block
    ///
    /// This is always a power of two and at least 2.
    pub block_height: usize,
}

impl Stage {
    /// Builds a new stage, checking that the block height is valid
    ///
    /// # Panics
    /// If `block_height` is not a power of two or is less than 2
    pub fn new(op: Operation, block_height: usize) -> Self {
        assert!(
            block_height >= 2 && block_height.is_power_of_two(),
            "invalid block height {block_height}"
        );
        Self { op, block_height }
    }

    /// Builds a [`Operation::Flip`] stage
    pub fn flip(block_height: usize) -> Self {
        Self::new(Operation::Flip, block_height)
    }

    /// Builds a [`Operation::Disperse`] stage
    pub fn disperse(block_height: usize) -> Self {
        Self::new(Operation::Disperse, block_height)
    }

    /// Returns the number of parallel lanes needed to run this stage on an
    /// array of length `len`
    pub fn lanes(len: usize) -> usize {
        len / 2
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.op, self.block_height)
    }
}

/// Returns the index that element `i` is compared against during `stage`
///
/// The relation is symmetric: `swap_partner(s, swap_partner(s, i)) == i`.
pub fn swap_partner(stage: Stage, i: usize) -> usize {
    let h = stage.block_height;
    let offset = i % h;
    let base = i - offset;
    match stage.op {
        Operation::Flip => base + h - 1 - offset,
        Operation::Disperse => {
            let half = h / 2;
            if offset < half { i + half } else { i - half }
        }
    }
}

/// Returns the `(lower, upper)` pair of indices handled by one lane
///
/// Lane `k` of `len / 2` lanes handles exactly one pair, and every index in
/// `0..len` is touched by exactly one lane.  After a compare-and-swap, the
/// smaller value is stored at `lower`.
pub fn lane_pair(stage: Stage, lane: usize) -> (usize, usize) {
    let h = stage.block_height;
    let half = h / 2;
    let q = ((2 * lane) / h) * h;
    let lower = q + lane % half;
    let upper = match stage.op {
        Operation::Flip => q + h - 1 - lane % half,
        Operation::Disperse => lower + half,
    };
    (lower, upper)
}
