//! # lmu
//!
//! Legendre Memory Units: a linear system that compresses a sliding window
//! of a signal into `q` Legendre coefficients per channel.
//!
//! The continuous matrices `(A, B)` are built once from `(theta, q)` and
//! then either discretized exactly for a fixed timestep or wired into
//! recurrent ensembles for a neural simulation host.
//!
//! ## Quick Start
//!
//! ```
//! use lmu::prelude::*;
//!
//! // One-second window, order 6, stepped at 1 ms.
//! let cfg = LmuConfig::new(1.0, 6).with_dt(0.001);
//! let mut memory = ExactStepper::new(cfg)?;
//!
//! for t in 0..2000 {
//!     let x = (t as f64 * 0.001 * 3.0).sin();
//!     memory.step(&[x], false)?;
//! }
//!
//! // What the input looked like now, half a window ago, and a window ago.
//! let decoder = DelayDecoder::new(6, &[0.0, 0.5, 1.0])?;
//! let estimates = decoder.decode(memory.state())?;
//! assert_eq!(estimates.shape(), (3, 1));
//! # Ok::<(), lmu::LmuError>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): Load [`config::Settings`] from JSON
//! - `parallel`: Step channels on the rayon thread pool
//! - `simd`: Row kernels vectorized with the `wide` crate
//!
//! ## Modules
//!
//! - [`matrices`]: Continuous `(A, B)` for `(theta, q)`
//! - [`discretize`]: Zero-order-hold `(Ad, Bd)` for a timestep
//! - [`stepper`]: Exact stepping with an optional reset
//! - [`gated`]: Host-driven stepping with reset/hold control channels
//! - [`decoder`]: Reading past values back out of the state
//! - [`network`]: Weights and wiring for a recurrent-ensemble realization
//! - [`host`]: A neuron-free host that runs a realized network
//! - [`memory`]: One interface over all realizations
//! - [`observer`]: Read-only observation adapters

#[path = "core/error.rs"]
pub mod error;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/matrices.rs"]
pub mod matrices;

#[path = "core/discretize.rs"]
pub mod discretize;

#[path = "core/kernel.rs"]
pub mod kernel;

#[path = "core/stepper.rs"]
pub mod stepper;

#[path = "core/gated.rs"]
pub mod gated;

#[path = "core/decoder.rs"]
pub mod decoder;

#[path = "core/network.rs"]
pub mod network;

#[path = "core/host.rs"]
pub mod host;

#[path = "core/memory.rs"]
pub mod memory;

pub mod observer;

pub use error::{LmuError, Result};

/// Prelude module for convenient imports.
///
/// ```
/// use lmu::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{GateConfig, LmuConfig, NetworkConfig, Realization, Settings};
    pub use crate::decoder::{legendre, weights_for_delays, DelayDecoder};
    pub use crate::discretize::DiscreteMatrices;
    pub use crate::error::LmuError;
    pub use crate::gated::{GateAction, GateMode, GatedStepper, LmuProcess};
    pub use crate::host::{IdealHost, RealizedMemory};
    pub use crate::kernel::ExecutionTier;
    pub use crate::matrices::ContinuousMatrices;
    pub use crate::memory::{build_memory, Memory};
    pub use crate::network::{EnsembleHost, Endpoint, LmuNetwork, NetworkWeights, Synapse};
    pub use crate::observer::{MemoryAdapter, MemorySnapshot};
    pub use crate::stepper::{ExactStepper, MemoryState};
}
