//! `sortnet` is a steppable bitonic sorting network, executed one stage at a
//! time on a compute device.
//!
//! A **bitonic sort** of `N` elements (where `N` is a power of two) is a
//! fixed schedule of `log2(N) * (log2(N) + 1) / 2` **stages**.  Each stage
//! compares-and-swaps `N / 2` disjoint pairs of elements in parallel, so a
//! whole stage maps onto a single compute dispatch.  Stages come in two
//! flavors (see [`stage::Operation`]):
//!
//! - A **flip** at block height `h` compares each element with its mirror
//!   image within its block of `h` elements
//! - A **disperse** at block height `h` compares each element in the lower
//!   half of its block with the element `h / 2` above it
//!
//! The full schedule is a flip at height `h`, followed by disperses at
//! `h / 2, h / 4, ..., 2`, for `h = 2, 4, ..., N`.  The
//! [`Sequencer`](sequencer::Sequencer) walks this schedule one stage at a
//! time, which makes it possible to watch (or debug) the network as it runs.
//!
//! # Devices
//! Stages are executed by a [`StageDevice`](device::StageDevice):
//!
//! - [`cpu::CpuDevice`] runs each stage on the host, lane by lane.  It's the
//!   reference that every other device is tested against.
//! - [`wgpu::WgpuDevice`] runs each stage as a single-workgroup compute
//!   shader dispatch, with an asynchronous readback after each stage.
//!
//! # Sorting
//! [`Sorter`](engine::Sorter) ties everything together:
//! ```
//! use sortnet::{cpu::CpuDevice, engine::Sorter};
//!
//! let mut sorter = Sorter::new(CpuDevice::new(), 16)?;
//! sorter.randomize(&mut rand::thread_rng())?;
//!
//! // Execute a single stage
//! let stage = sorter.step()?;
//! assert_eq!(stage.to_string(), "Flip(2)");
//!
//! // Then run the rest
//! let n = sorter.run_to_completion()?;
//! assert_eq!(n, 9);
//! assert!(sorter.elements().is_sorted());
//! # Ok::<(), sortnet::Error>(())
//! ```
//!
//! Steps may also be split into a dispatch and a (possibly deferred)
//! commit, using [`begin_step`](engine::Sorter::begin_step) and
//! [`poll_step`](engine::Sorter::poll_step); only one step may be in flight
//! at a time.
//!
//! # Feature flags
#![doc = document_features::document_features!()]
#![warn(missing_docs)]

mod error;
pub use error::Error;

pub mod config;
pub mod cpu;
pub mod device;
pub mod elements;
pub mod engine;
pub mod sequencer;
pub mod stage;
pub mod visual;

#[cfg(feature = "wgpu")]
pub mod wgpu;
