//! Host-side reference device
//!
//! [`CpuDevice`] runs each stage the way a single compute workgroup would:
//! every lane loads its two elements into local memory, then (after a
//! barrier) performs its compare-and-swap, then (after a second barrier)
//! writes both elements back out.
use crate::{
    Error,
    device::StageDevice,
    stage::{Stage, lane_pair},
};

/// Reference [`StageDevice`] executing stages on the host
pub struct CpuDevice {
    max_len: usize,
    input: Vec<u32>,
    output: Vec<u32>,

    /// Readback that has been started but not yet collected
    pending: Option<Vec<u32>>,
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuDevice {
    /// Default capacity, matching the minimum WebGPU workgroup limits
    pub const DEFAULT_MAX_LEN: usize = 512;

    /// Builds a device with the default capacity
    pub fn new() -> Self {
        Self::with_max_len(Self::DEFAULT_MAX_LEN)
    }

    /// Builds a device with a custom capacity
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len,
            input: vec![0; max_len],
            output: vec![0; max_len],
            pending: None,
        }
    }

    /// Runs a single stage over `input`, returning the output
    ///
    /// This is the lane-level reference for every device.
    pub fn run_stage(stage: Stage, input: &[u32]) -> Vec<u32> {
        let len = input.len();
        assert!(
            stage.block_height <= len,
            "stage {stage} exceeds length {len}"
        );

        // Load phase; every lane copies indices 2k and 2k + 1
        let mut local = vec![0; len];
        for lane in 0..Stage::lanes(len) {
            local[lane * 2] = input[lane * 2];
            local[lane * 2 + 1] = input[lane * 2 + 1];
        }

        // barrier

        // Lanes touch disjoint pairs, so their order doesn't matter
        for lane in 0..Stage::lanes(len) {
            let (lo, hi) = lane_pair(stage, lane);
            if local[lo] > local[hi] {
                local.swap(lo, hi);
            }
        }

        // barrier
        local
    }
}

impl StageDevice for CpuDevice {
    fn max_len(&self) -> usize {
        self.max_len
    }

    fn upload(&mut self, data: &[u32]) -> Result<(), Error> {
        if data.len() > self.max_len {
            return Err(Error::TooLarge(data.len(), self.max_len));
        }
        self.input[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn dispatch(&mut self, stage: Stage, len: usize) -> Result<(), Error> {
        if self.pending.is_some() {
            return Err(Error::StepInFlight);
        }
        if len > self.max_len {
            return Err(Error::TooLarge(len, self.max_len));
        }
        let out = Self::run_stage(stage, &self.input[..len]);
        self.output[..len].copy_from_slice(&out);

        // The staging copy has the full capacity; the tail is stale
        self.pending = Some(self.output.clone());
        Ok(())
    }

    fn poll_readback(
        &mut self,
        _len: usize,
        _block: bool,
    ) -> Result<Option<Vec<u32>>, Error> {
        Ok(self.pending.take())
    }

    fn discard_readback(&mut self) -> Result<(), Error> {
        self.pending = None;
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flip_two() {
        let out = CpuDevice::run_stage(Stage::flip(2), &[3, 1, 2, 0]);
        assert_eq!(out, [1, 3, 0, 2]);
    }

    #[test]
    fn flip_four() {
        let out = CpuDevice::run_stage(Stage::flip(4), &[1, 3, 0, 2]);
        assert_eq!(out, [1, 0, 3, 2]);
    }

    #[test]
    fn disperse_sorts_bitonic_halves() {
        let out = CpuDevice::run_stage(Stage::disperse(2), &[1, 0, 3, 2]);
        assert_eq!(out, [0, 1, 2, 3]);
        let out = CpuDevice::run_stage(Stage::disperse(4), &[2, 3, 0, 1]);
        assert_eq!(out, [0, 1, 2, 3]);
    }

    #[test]
    fn one_readback_at_a_time() {
        let mut dev = CpuDevice::with_max_len(8);
        dev.upload(&[3, 1, 2, 0]).unwrap();
        dev.dispatch(Stage::flip(2), 4).unwrap();
        assert!(dev.is_busy());
        assert!(matches!(
            dev.dispatch(Stage::flip(2), 4),
            Err(Error::StepInFlight)
        ));
        let out = dev.poll_readback(4, false).unwrap().unwrap();
        assert_eq!(out.len(), 8);
        assert_eq!(out[..4], [1, 3, 0, 2]);
        assert!(!dev.is_busy());
        assert_eq!(dev.poll_readback(4, false).unwrap(), None);
    }

    #[test]
    fn rejects_oversized() {
        let mut dev = CpuDevice::with_max_len(4);
        assert!(matches!(
            dev.upload(&[0; 8]),
            Err(Error::TooLarge(8, 4))
        ));
        assert!(matches!(
            dev.dispatch(Stage::flip(2), 8),
            Err(Error::TooLarge(8, 4))
        ));
    }
}
