//! Host-side orchestration of a steppable sort
//!
//! A [`Sorter`] ties together the configuration, the [`Sequencer`], the
//! host [`Elements`], and a [`StageDevice`].  Each step uploads the host
//! array, dispatches one stage, and (once the readback arrives) commits the
//! result back to the host array.
//!
//! Only one step may be in flight.  Steps are tracked with a [`Ticket`]
//! carrying a generation number; resizing, resetting, or shuffling bumps the
//! generation, so a readback started before the change is discarded rather
//! than committed.  If a readback fails, the step is abandoned in the same
//! way and the sequencer rolls back to before it.
use crate::{
    Error,
    config::SortConfig,
    device::StageDevice,
    elements::Elements,
    sequencer::{Sequencer, stage_count},
    stage::{Stage, swap_partner},
    visual::Frame,
};
use log::{debug, info, warn};
use rand::Rng;

/// Handle for a step that has been dispatched but not yet committed
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    stage: Stage,
}

impl Ticket {
    /// Returns the stage that was dispatched
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Returns the generation in which the stage was dispatched
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Snapshot of sort progress
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Status {
    /// Most recently executed stage
    pub previous: Option<Stage>,
    /// Stage that the next step will execute
    pub next: Option<Stage>,
    /// Highest block height reached by the sequencer
    pub highest_block_height: usize,
    /// Stages executed so far
    pub executed: usize,
    /// Stages in a full sort
    pub total: usize,
    /// Whether a readback is still pending
    pub busy: bool,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |s: Option<Stage>| {
            s.map(|s| s.to_string()).unwrap_or_else(|| "-".to_owned())
        };
        write!(
            f,
            "step {}/{} (prev: {}, next: {}, height: {})",
            self.executed,
            self.total,
            show(self.previous),
            show(self.next),
            self.highest_block_height
        )
    }
}

/// Dispatched step, along with the sequencer state from before it
#[derive(Clone, Debug)]
struct InFlight {
    ticket: Ticket,
    rollback: Sequencer,
}

/// Steppable bitonic sort over a [`StageDevice`]
pub struct Sorter<D> {
    config: SortConfig,
    sequencer: Sequencer,
    elements: Elements,
    device: D,

    /// Step that has been dispatched but not committed
    in_flight: Option<InFlight>,

    /// Incremented whenever the array is changed from outside the network
    generation: u64,
}

impl<D: StageDevice> Sorter<D> {
    /// Builds a sorter for `len` elements, starting from `0..len`
    ///
    /// The length is checked against the device's capacity before anything
    /// is uploaded.
    pub fn new(device: D, len: usize) -> Result<Self, Error> {
        let config = SortConfig::new(len, device.max_len())?;
        Ok(Self {
            sequencer: Sequencer::new(&config),
            elements: Elements::new(&config),
            config,
            device,
            in_flight: None,
            generation: 0,
        })
    }

    /// Returns the active configuration
    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Returns the host array as of the last committed step
    pub fn elements(&self) -> &Elements {
        &self.elements
    }

    /// Returns the stage sequencer
    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Returns the underlying device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Returns the current generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Checks whether a step is waiting on its readback
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Checks whether the network has been fully executed
    pub fn is_complete(&self) -> bool {
        self.sequencer.is_complete()
    }

    /// Returns a snapshot of progress
    pub fn status(&self) -> Status {
        Status {
            previous: self.sequencer.current(),
            next: self.sequencer.next_stage(),
            highest_block_height: self.sequencer.highest_block_height(),
            executed: self.sequencer.executed(),
            total: stage_count(self.config.len()),
            busy: self.is_busy(),
        }
    }

    /// Returns the index that `i` will be compared with on the next step
    pub fn next_partner(&self, i: usize) -> Option<usize> {
        if i >= self.config.len() {
            return None;
        }
        self.sequencer.next_stage().map(|s| swap_partner(s, i))
    }

    /// Builds a frame for display, highlighting `hovered` and its partner
    pub fn frame(&self, hovered: Option<usize>) -> Frame<'_> {
        let hovered = hovered.filter(|i| *i < self.config.len());
        Frame {
            elements: self.elements.as_slice(),
            hovered,
            swapped: hovered.and_then(|i| self.next_partner(i)),
            layout: self.config.layout(),
        }
    }

    /// Uploads the host array and dispatches the next stage
    ///
    /// Fails with [`Error::StepInFlight`] if a previous step hasn't been
    /// committed, or [`Error::SortComplete`] if there's nothing left to do;
    /// neither failure changes any state.
    pub fn begin_step(&mut self) -> Result<Ticket, Error> {
        if self.in_flight.is_some() {
            return Err(Error::StepInFlight);
        }
        let Some(stage) = self.sequencer.next_stage() else {
            return Err(Error::SortComplete);
        };
        let len = self.config.len();
        self.device.upload(self.elements.as_slice())?;
        self.device.dispatch(stage, len)?;
        let rollback = self.sequencer.clone();
        let advanced = self.sequencer.advance();
        debug_assert_eq!(advanced, Some(stage));
        debug!("dispatched {stage} over {len} elements");

        let ticket = Ticket {
            generation: self.generation,
            stage,
        };
        self.in_flight = Some(InFlight { ticket, rollback });
        Ok(ticket)
    }

    /// Checks whether the readback for `ticket` is ready, committing it if so
    ///
    /// Returns `Ok(None)` while the readback is still pending.
    pub fn poll_step(&mut self, ticket: Ticket) -> Result<Option<Stage>, Error> {
        self.complete(ticket, false)
    }

    /// Waits for the readback for `ticket` and commits it
    pub fn finish_step(&mut self, ticket: Ticket) -> Result<Stage, Error> {
        match self.complete(ticket, true)? {
            Some(stage) => Ok(stage),
            None => Err(Error::StepInFlight),
        }
    }

    fn complete(
        &mut self,
        ticket: Ticket,
        block: bool,
    ) -> Result<Option<Stage>, Error> {
        if ticket.generation != self.generation {
            return Err(Error::StaleReadback {
                expected: self.generation,
                got: ticket.generation,
            });
        }
        let Some(flight) = self.in_flight.take_if(|f| f.ticket == ticket)
        else {
            // Already committed
            return Ok(Some(ticket.stage));
        };
        let len = self.config.len();
        let data = match self.device.poll_readback(len, block) {
            Ok(Some(data)) => data,
            Ok(None) if !block => {
                self.in_flight = Some(flight);
                return Ok(None);
            }
            Ok(None) => {
                return Err(self.abandon(flight, Error::MissingReadback));
            }
            Err(e) => return Err(self.abandon(flight, e)),
        };
        if let Err(e) = self.elements.commit(&data) {
            return Err(self.abandon(flight, e));
        }
        if self.sequencer.is_complete() {
            info!(
                "sorted {len} elements in {} stages",
                self.sequencer.executed()
            );
        }
        Ok(Some(ticket.stage))
    }

    /// Gives up on a step whose readback failed, returning `err`
    ///
    /// The sequencer is rolled back to before the step and the generation is
    /// bumped, so the step's ticket becomes stale.
    fn abandon(&mut self, flight: InFlight, err: Error) -> Error {
        warn!("{} failed: {err}", flight.ticket.stage);
        if let Err(e) = self.device.discard_readback() {
            warn!("could not discard readback: {e}");
        }
        self.sequencer = flight.rollback;
        self.generation += 1;
        err
    }

    /// Executes one stage and waits for it to be committed
    pub fn step(&mut self) -> Result<Stage, Error> {
        let ticket = self.begin_step()?;
        self.finish_step(ticket)
    }

    /// Steps until the network is complete, returning the number of stages
    /// executed by this call
    pub fn run_to_completion(&mut self) -> Result<usize, Error> {
        let mut count = 0;
        while !self.is_complete() {
            self.step()?;
            count += 1;
        }
        Ok(count)
    }

    /// Drops any in-flight step and returns to the start of the network
    fn invalidate(&mut self) -> Result<(), Error> {
        if self.in_flight.take().is_some() {
            debug!("discarding in-flight readback");
            self.device.discard_readback()?;
        }
        self.generation += 1;
        self.sequencer.reset();
        Ok(())
    }

    /// Changes the array length, restoring `0..len`
    ///
    /// An invalid length is rejected without touching any state.
    pub fn resize(&mut self, len: usize) -> Result<(), Error> {
        let mut config = self.config;
        config.set_len(len)?;
        self.invalidate()?;
        self.config = config;
        self.sequencer.resize(&self.config);
        self.elements = Elements::new(&self.config);
        Ok(())
    }

    /// Shuffles the host array and restarts the network
    pub fn randomize<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<(), Error> {
        self.invalidate()?;
        self.elements.shuffle(rng);
        Ok(())
    }

    /// Restores `0..len` and restarts the network
    pub fn reset(&mut self) -> Result<(), Error> {
        self.invalidate()?;
        self.elements.reset();
        Ok(())
    }

    /// Replaces the host array with explicit values and restarts the network
    pub fn load(&mut self, values: &[u32]) -> Result<(), Error> {
        let elements = Elements::from_values(&self.config, values)?;
        self.invalidate()?;
        self.elements = elements;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{cpu::CpuDevice, stage::lane_pair};
    use rand::{SeedableRng, rngs::StdRng};

    fn sorted_multiset(v: &[u32]) -> Vec<u32> {
        let mut v = v.to_vec();
        v.sort();
        v
    }

    #[test]
    fn sorts_random_permutations() {
        let mut rng = StdRng::seed_from_u64(0xB170);
        for len in [4, 8, 16, 32, 64] {
            for _ in 0..20 {
                let mut s = Sorter::new(CpuDevice::new(), len).unwrap();
                s.randomize(&mut rng).unwrap();
                let n = s.run_to_completion().unwrap();
                assert_eq!(n, stage_count(len));
                assert!(s.is_complete());
                assert_eq!(s.sequencer().highest_block_height(), 2 * len);
                assert!(s.elements().is_sorted(), "{:?}", s.elements());
            }
        }
    }

    #[test]
    fn sorts_values_with_duplicates() {
        let mut s = Sorter::new(CpuDevice::new(), 16).unwrap();
        let values = [5, 1, 5, 0, 9, 9, 2, 1, 7, 0, 3, 3, 8, 4, 6, 5];
        s.load(&values).unwrap();
        s.run_to_completion().unwrap();
        let mut expected = values.to_vec();
        expected.sort();
        assert_eq!(s.elements().as_slice(), expected);
    }

    #[test]
    fn every_stage_is_a_permutation() {
        let mut rng = StdRng::seed_from_u64(1234);
        let mut s = Sorter::new(CpuDevice::new(), 64).unwrap();
        s.randomize(&mut rng).unwrap();
        while !s.is_complete() {
            let before = sorted_multiset(s.elements().as_slice());
            s.step().unwrap();
            let after = sorted_multiset(s.elements().as_slice());
            assert_eq!(before, after);
        }
    }

    #[test]
    fn four_element_example() {
        let mut s = Sorter::new(CpuDevice::new(), 4).unwrap();
        s.load(&[3, 1, 2, 0]).unwrap();

        // Intermediate states follow from running the lane formula
        let mut expected = s.elements().as_slice().to_vec();
        let mut stages = vec![];
        while !s.is_complete() {
            let stage = s.sequencer().next_stage().unwrap();
            expected = CpuDevice::run_stage(stage, &expected);
            assert_eq!(s.step().unwrap(), stage);
            assert_eq!(s.elements().as_slice(), expected);
            stages.push(stage);
        }
        assert_eq!(
            stages,
            [Stage::flip(2), Stage::flip(4), Stage::disperse(2)]
        );
        assert_eq!(s.elements().as_slice(), [0, 1, 2, 3]);
        assert_eq!(s.status().executed, 3);
    }

    #[test]
    fn partner_matches_dispatched_pairs() {
        let mut s = Sorter::new(CpuDevice::new(), 32).unwrap();
        while let Some(stage) = s.sequencer().next_stage() {
            for lane in 0..Stage::lanes(32) {
                let (lo, hi) = lane_pair(stage, lane);
                assert_eq!(s.next_partner(lo), Some(hi));
                assert_eq!(s.next_partner(hi), Some(lo));
                let frame = s.frame(Some(lo));
                assert_eq!(frame.swapped, Some(hi));
            }
            s.step().unwrap();
        }
        assert_eq!(s.next_partner(0), None);
        assert_eq!(s.next_partner(32), None);
    }

    #[test]
    fn rejects_overlapping_steps() {
        let mut s = Sorter::new(CpuDevice::new(), 8).unwrap();
        s.load(&[7, 6, 5, 4, 3, 2, 1, 0]).unwrap();
        let ticket = s.begin_step().unwrap();
        assert!(s.is_busy());
        let status = s.status();
        assert!(matches!(s.begin_step(), Err(Error::StepInFlight)));
        assert_eq!(s.status(), status);

        assert_eq!(s.poll_step(ticket).unwrap(), Some(Stage::flip(2)));
        assert!(!s.is_busy());
        assert_eq!(s.elements().as_slice(), [6, 7, 4, 5, 2, 3, 0, 1]);

        // Polling a committed ticket is harmless
        assert_eq!(s.poll_step(ticket).unwrap(), Some(Stage::flip(2)));
        assert_eq!(s.elements().as_slice(), [6, 7, 4, 5, 2, 3, 0, 1]);
    }

    #[test]
    fn step_after_completion() {
        let mut s = Sorter::new(CpuDevice::new(), 4).unwrap();
        s.run_to_completion().unwrap();
        assert!(matches!(s.step(), Err(Error::SortComplete)));
        assert_eq!(s.run_to_completion().unwrap(), 0);
    }

    #[test]
    fn reset_discards_progress() {
        let mut rng = StdRng::seed_from_u64(99);
        for steps in 0..=stage_count(16) {
            let mut s = Sorter::new(CpuDevice::new(), 16).unwrap();
            s.randomize(&mut rng).unwrap();
            for _ in 0..steps {
                s.step().unwrap();
            }
            s.randomize(&mut rng).unwrap();
            let status = s.status();
            assert_eq!(status.previous, None);
            assert_eq!(status.next, Some(Stage::flip(2)));
            assert_eq!(status.highest_block_height, 2);
            assert_eq!(status.executed, 0);

            s.reset().unwrap();
            assert_eq!(s.elements().as_slice(), (0..16).collect::<Vec<u32>>());
            assert_eq!(s.status().next, Some(Stage::flip(2)));
        }
    }

    #[test]
    fn stale_ticket_is_discarded() {
        let mut s = Sorter::new(CpuDevice::new(), 8).unwrap();
        s.load(&[7, 6, 5, 4, 3, 2, 1, 0]).unwrap();
        let ticket = s.begin_step().unwrap();
        s.resize(16).unwrap();
        assert!(!s.is_busy());
        assert!(!s.device().is_busy());
        assert!(matches!(
            s.finish_step(ticket),
            Err(Error::StaleReadback { .. })
        ));
        assert_eq!(s.elements().len(), 16);
        assert_eq!(s.status().next, Some(Stage::flip(2)));

        // The new generation steps normally
        s.step().unwrap();
        assert_eq!(s.status().executed, 1);
    }

    #[test]
    fn bad_resize_keeps_state() {
        let mut s = Sorter::new(CpuDevice::with_max_len(64), 8).unwrap();
        s.step().unwrap();
        let generation = s.generation();
        assert!(matches!(s.resize(12), Err(Error::NotPowerOfTwo(12))));
        assert!(matches!(s.resize(128), Err(Error::TooLarge(128, 64))));
        assert_eq!(s.generation(), generation);
        assert_eq!(s.status().executed, 1);
        assert_eq!(s.config().len(), 8);
    }

    #[test]
    fn rejects_bad_sizes_up_front() {
        assert!(matches!(
            Sorter::new(CpuDevice::new(), 6),
            Err(Error::NotPowerOfTwo(6))
        ));
        assert!(matches!(
            Sorter::new(CpuDevice::new(), 2),
            Err(Error::TooSmall(2))
        ));
        assert!(matches!(
            Sorter::new(CpuDevice::with_max_len(16), 32),
            Err(Error::TooLarge(32, 16))
        ));
    }

    #[test]
    fn status_display() {
        let mut s = Sorter::new(CpuDevice::new(), 8).unwrap();
        assert_eq!(
            s.status().to_string(),
            "step 0/6 (prev: -, next: Flip(2), height: 2)"
        );
        s.step().unwrap();
        assert_eq!(
            s.status().to_string(),
            "step 1/6 (prev: Flip(2), next: Flip(4), height: 4)"
        );
    }

    /// Wraps a [`CpuDevice`], delaying or failing its readbacks
    struct TestDevice {
        inner: CpuDevice,
        /// Non-blocking polls to answer with `Ok(None)` before completing
        delay: usize,
        /// Fail the next readback
        fail: bool,
    }

    impl TestDevice {
        fn new(delay: usize, fail: bool) -> Self {
            Self {
                inner: CpuDevice::new(),
                delay,
                fail,
            }
        }
    }

    impl StageDevice for TestDevice {
        fn max_len(&self) -> usize {
            self.inner.max_len()
        }
        fn upload(&mut self, data: &[u32]) -> Result<(), Error> {
            self.inner.upload(data)
        }
        fn dispatch(&mut self, stage: Stage, len: usize) -> Result<(), Error> {
            self.inner.dispatch(stage, len)
        }
        fn poll_readback(
            &mut self,
            len: usize,
            block: bool,
        ) -> Result<Option<Vec<u32>>, Error> {
            if !self.inner.is_busy() {
                return Ok(None);
            }
            if self.fail {
                self.fail = false;
                self.inner.discard_readback()?;
                return Err(Error::ReadbackLength(0, len));
            }
            if !block && self.delay > 0 {
                self.delay -= 1;
                return Ok(None);
            }
            self.inner.poll_readback(len, block)
        }
        fn discard_readback(&mut self) -> Result<(), Error> {
            self.inner.discard_readback()
        }
        fn is_busy(&self) -> bool {
            self.inner.is_busy()
        }
    }

    #[test]
    fn pending_readback_blocks_steps() {
        let mut s = Sorter::new(TestDevice::new(2, false), 8).unwrap();
        s.load(&[7, 6, 5, 4, 3, 2, 1, 0]).unwrap();
        let ticket = s.begin_step().unwrap();

        for _ in 0..2 {
            assert_eq!(s.poll_step(ticket).unwrap(), None);
            assert!(s.is_busy());
            assert!(s.device().is_busy());
            let status = s.status();
            assert!(matches!(s.begin_step(), Err(Error::StepInFlight)));
            assert_eq!(s.status(), status);
            assert_eq!(s.elements().as_slice(), [7, 6, 5, 4, 3, 2, 1, 0]);
        }

        assert_eq!(s.poll_step(ticket).unwrap(), Some(Stage::flip(2)));
        assert!(!s.is_busy());
        assert_eq!(s.elements().as_slice(), [6, 7, 4, 5, 2, 3, 0, 1]);
        assert_eq!(s.status().next, Some(Stage::flip(4)));
    }

    #[test]
    fn reset_while_pending() {
        let mut s = Sorter::new(TestDevice::new(5, false), 8).unwrap();
        let ticket = s.begin_step().unwrap();
        assert_eq!(s.poll_step(ticket).unwrap(), None);
        s.reset().unwrap();
        assert!(!s.is_busy());
        assert!(!s.device().is_busy());
        assert!(matches!(
            s.poll_step(ticket),
            Err(Error::StaleReadback { .. })
        ));
        assert_eq!(s.status().executed, 0);
    }

    #[test]
    fn failed_readback_rolls_back() {
        let mut s = Sorter::new(TestDevice::new(0, true), 8).unwrap();
        s.load(&[7, 6, 5, 4, 3, 2, 1, 0]).unwrap();
        let before = s.status();

        let ticket = s.begin_step().unwrap();
        assert!(matches!(
            s.finish_step(ticket),
            Err(Error::ReadbackLength(0, 8))
        ));
        assert!(!s.is_busy());
        assert!(!s.device().is_busy());
        assert_eq!(s.status(), before);
        assert_eq!(s.elements().as_slice(), [7, 6, 5, 4, 3, 2, 1, 0]);

        // The abandoned ticket can't be committed later
        assert!(matches!(
            s.finish_step(ticket),
            Err(Error::StaleReadback { .. })
        ));

        // Stepping again re-runs the same stage
        assert_eq!(s.step().unwrap(), Stage::flip(2));
        assert_eq!(s.elements().as_slice(), [6, 7, 4, 5, 2, 3, 0, 1]);
        s.run_to_completion().unwrap();
        assert!(s.elements().is_sorted());
    }

    #[test]
    fn lost_readback_is_an_error() {
        let mut s = Sorter::new(TestDevice::new(0, false), 8).unwrap();
        let ticket = s.begin_step().unwrap();
        s.device.discard_readback().unwrap();
        assert!(matches!(
            s.finish_step(ticket),
            Err(Error::MissingReadback)
        ));
        assert!(!s.is_busy());
        assert_eq!(s.status().executed, 0);
        s.step().unwrap();
        assert_eq!(s.status().executed, 1);
    }
}
