//! Module containing the universal error type
use thiserror::Error;

/// Universal error type for `sortnet`
#[derive(Error, Debug)]
pub enum Error {
    /// Array length must be a power of two
    #[error("array length {0} is not a power of two")]
    NotPowerOfTwo(usize),

    /// Array length is below the smallest supported network
    #[error("array length {0} is too small; the minimum is 4")]
    TooSmall(usize),

    /// Array length exceeds what the device can sort in one workgroup
    #[error("array length {0} exceeds the device limit of {1}")]
    TooLarge(usize, usize),

    /// A set of values doesn't match the configured length
    #[error("got {0} values, expected {1}")]
    WrongLength(usize, usize),

    /// A step was requested while a previous readback is still pending
    #[error("a stage readback is still in flight")]
    StepInFlight,

    /// A step was requested after the network finished
    #[error("the sort is already complete")]
    SortComplete,

    /// A readback from an older generation was presented for commit
    #[error("stale readback (generation {got}, expected {expected})")]
    StaleReadback {
        /// Current generation of the sorter
        expected: u64,
        /// Generation carried by the readback ticket
        got: u64,
    },

    /// The device returned a readback of the wrong length
    #[error("readback has {0} elements, expected {1}")]
    ReadbackLength(usize, usize),

    /// The device lost track of a readback that the sorter was waiting on
    #[error("device has no pending readback")]
    MissingReadback,

    /// Could not get WGPU adapter
    #[cfg(feature = "wgpu")]
    #[error("could not get adapter")]
    NoAdapter,

    /// Could not get WGPU device
    #[cfg(feature = "wgpu")]
    #[error("could not get WGPU device")]
    NoDevice(#[from] wgpu::RequestDeviceError),

    /// Mapping the staging buffer failed
    #[cfg(feature = "wgpu")]
    #[error("buffer mapping failed")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    /// Polling the device failed
    #[cfg(feature = "wgpu")]
    #[error("device poll failed")]
    Poll(#[from] wgpu::PollError),
}
