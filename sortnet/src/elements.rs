//! Host-side copy of the array being sorted
use crate::{Error, config::SortConfig};
use rand::{Rng, seq::SliceRandom};

/// Host array of keys
///
/// This is the single source of truth for display; it's only replaced by a
/// committed readback (or by resetting / shuffling between sorts).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Elements {
    data: Vec<u32>,
}

impl Elements {
    /// Builds the sequential array `0..len` for the given configuration
    pub fn new(config: &SortConfig) -> Self {
        Self {
            data: (0..config.len() as u32).collect(),
        }
    }

    /// Builds an array from explicit values
    ///
    /// The length is validated against the configuration.
    pub fn from_values(
        config: &SortConfig,
        values: &[u32],
    ) -> Result<Self, Error> {
        if values.len() != config.len() {
            return Err(Error::WrongLength(values.len(), config.len()));
        }
        Ok(Self {
            data: values.to_vec(),
        })
    }

    /// Restores the sequential array `0..len`
    pub fn reset(&mut self) {
        for (i, v) in self.data.iter_mut().enumerate() {
            *v = i as u32;
        }
    }

    /// Applies a uniform random permutation (Fisher-Yates)
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.data.shuffle(rng);
    }

    /// Replaces the array with the first `len` values of a readback
    ///
    /// Values past the live length are stale and ignored.
    pub(crate) fn commit(&mut self, readback: &[u32]) -> Result<(), Error> {
        let n = self.data.len();
        let Some(live) = readback.get(..n) else {
            return Err(Error::ReadbackLength(readback.len(), n));
        };
        self.data.copy_from_slice(live);
        Ok(())
    }

    /// Returns the current values
    pub fn as_slice(&self) -> &[u32] {
        &self.data
    }

    /// Returns the number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Checks whether the array is empty (never true for a valid config)
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Checks whether values are in non-decreasing order
    pub fn is_sorted(&self) -> bool {
        self.data.is_sorted()
    }
}
