//! Abstraction over the device that executes network stages
use crate::{Error, stage::Stage};

/// A compute device that can run one stage of the network at a time
///
/// The device owns an input buffer (written by [`upload`](Self::upload)) and
/// an output buffer (written by [`dispatch`](Self::dispatch)).  Results only
/// become visible to the host through [`poll_readback`](Self::poll_readback),
/// which may take several calls to complete; at most one readback may be
/// pending at a time.
pub trait StageDevice {
    /// Returns the largest array length that fits in a single workgroup
    fn max_len(&self) -> usize;

    /// Copies the host array into the device input buffer
    fn upload(&mut self, data: &[u32]) -> Result<(), Error>;

    /// Runs one stage over the first `len` elements of the input buffer,
    /// writing the output buffer and starting a readback
    ///
    /// Returns [`Error::StepInFlight`] if a previous readback is pending.
    fn dispatch(&mut self, stage: Stage, len: usize) -> Result<(), Error>;

    /// Checks on the pending readback
    ///
    /// Returns `Ok(None)` if the readback isn't ready yet (or if none is
    /// pending); if `block` is set, waits for it to finish instead.
    fn poll_readback(
        &mut self,
        len: usize,
        block: bool,
    ) -> Result<Option<Vec<u32>>, Error>;

    /// Waits for any pending readback and throws away its result
    fn discard_readback(&mut self) -> Result<(), Error>;

    /// Checks whether a readback is pending
    fn is_busy(&self) -> bool;
}
