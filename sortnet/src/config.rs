//! Sort settings and the display grid layout
use crate::Error;

/// Checks that `len` is a sortable array length for a device limit
///
/// The length must be a power of two, at least [`SortConfig::MIN_LEN`], and
/// no greater than `max_len`.
pub fn check_len(len: usize, max_len: usize) -> Result<(), Error> {
    if !len.is_power_of_two() {
        Err(Error::NotPowerOfTwo(len))
    } else if len < SortConfig::MIN_LEN {
        Err(Error::TooSmall(len))
    } else if len > max_len {
        Err(Error::TooLarge(len, max_len))
    } else {
        Ok(())
    }
}

/// Settings for a sort
///
/// The array length can only be changed through [`SortConfig::set_len`],
/// which validates it first; an invalid length leaves the config unchanged.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SortConfig {
    len: usize,
    max_len: usize,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            len: 16,
            max_len: 512,
        }
    }
}

impl SortConfig {
    /// Smallest supported array length
    pub const MIN_LEN: usize = 4;

    /// Builds a new configuration
    ///
    /// `max_len` is the device capability (see
    /// [`StageDevice::max_len`](crate::device::StageDevice::max_len)).
    pub fn new(len: usize, max_len: usize) -> Result<Self, Error> {
        check_len(len, max_len)?;
        Ok(Self { len, max_len })
    }

    /// Returns the number of elements to sort
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns the largest length supported by the device
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Changes the number of elements, validating it first
    pub fn set_len(&mut self, len: usize) -> Result<(), Error> {
        check_len(len, self.max_len)?;
        self.len = len;
        Ok(())
    }

    /// Returns the grid layout used to display an array of this length
    pub fn layout(&self) -> Layout {
        Layout::for_len(self.len)
    }
}

/// Rectangular grid used to display an array
///
/// Element `i` is drawn at column `i % width`, row `i / width`.  The layout
/// has no effect on sorting.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    /// Number of columns
    pub width: usize,
    /// Number of rows
    pub height: usize,
}

impl Layout {
    /// Picks a near-square layout for a power-of-two length
    ///
    /// Odd powers of two are laid out twice as wide as they are tall.
    pub fn for_len(len: usize) -> Self {
        let bits = len.max(1).ilog2();
        let width = 1 << bits.div_ceil(2);
        Self {
            width,
            height: len.max(1) / width,
        }
    }

    /// Returns the number of cells
    pub fn cells(&self) -> usize {
        self.width * self.height
    }

    /// Maps a cell position to an element index
    pub fn cell_at(&self, x: usize, y: usize) -> Option<usize> {
        (x < self.width && y < self.height).then(|| x + y * self.width)
    }

    /// Maps an element index to its `(x, y)` cell position
    pub fn position(&self, i: usize) -> Option<(usize, usize)> {
        (i < self.cells()).then(|| (i % self.width, i / self.width))
    }
}
