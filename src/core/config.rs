#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{LmuError, Result};

/// Options forwarded verbatim to the host that builds ensembles
/// (neuron type, radius, encoders, ...). Opaque to this crate.
pub type EnsembleOptions = hashbrown::HashMap<String, serde_json::Value>;

/// Immutable description of one memory: window, order, channel count, timestep.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LmuConfig {
    /// Length of the sliding window, in seconds.
    pub theta: f64,
    /// Memory order: state dimensions per input channel.
    pub q: usize,
    /// Number of independent input channels.
    pub size_in: usize,
    /// Fixed timestep. Only required where discretization happens ahead of
    /// stepping; a process receives its dt from the host instead.
    pub dt: Option<f64>,
}

impl Default for LmuConfig {
    /// A one-second window of order 6 over a single channel, stepped at 1 ms.
    fn default() -> Self {
        Self {
            theta: 1.0,
            q: 6,
            size_in: 1,
            dt: Some(0.001),
        }
    }
}

impl LmuConfig {
    /// Smallest usable memory order.
    pub const MIN_ORDER: usize = 1;

    /// Create a single-channel config with no fixed timestep.
    pub fn new(theta: f64, q: usize) -> Self {
        Self {
            theta,
            q,
            size_in: 1,
            dt: None,
        }
    }

    pub fn with_size_in(mut self, size_in: usize) -> Self {
        self.size_in = size_in;
        self
    }

    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = Some(dt);
        self
    }

    /// Validate window, order and channel count. `dt` is checked only when set.
    pub fn validate(&self) -> Result<()> {
        if self.q < Self::MIN_ORDER {
            return Err(LmuError::InvalidConfiguration("q must be >= 1"));
        }
        if !self.theta.is_finite() || self.theta <= 0.0 {
            return Err(LmuError::InvalidConfiguration(
                "theta must be finite and > 0",
            ));
        }
        if self.size_in == 0 {
            return Err(LmuError::InvalidConfiguration("size_in must be >= 1"));
        }
        if let Some(dt) = self.dt {
            Self::validate_dt(dt)?;
        }
        Ok(())
    }

    pub fn validate_dt(dt: f64) -> Result<()> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(LmuError::InvalidConfiguration("dt must be finite and > 0"));
        }
        Ok(())
    }

    /// The configured timestep, or an error if none was given.
    pub fn require_dt(&self) -> Result<f64> {
        match self.dt {
            Some(dt) => {
                Self::validate_dt(dt)?;
                Ok(dt)
            }
            None => Err(LmuError::InvalidConfiguration(
                "dt is required for exact stepping",
            )),
        }
    }

    /// Width of the flattened state: `q * size_in`.
    #[must_use]
    pub fn state_len(&self) -> usize {
        self.q * self.size_in
    }
}

/// Which control channels precede the data in a gated input vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GateConfig {
    pub with_resets: bool,
    pub with_holds: bool,
}

impl GateConfig {
    pub fn new(with_resets: bool, with_holds: bool) -> Self {
        Self {
            with_resets,
            with_holds,
        }
    }
}

/// Parameters of the recurrent-ensemble realization.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NetworkConfig {
    /// Neurons per channel ensemble.
    pub n_neurons: usize,
    /// Synaptic time constant of the feedforward and recurrent connections.
    pub tau: f64,
    /// Weight from the reset signal onto every neuron of every ensemble.
    pub reset_weight: f64,
    /// Passed through to the host untouched.
    pub ensemble: EnsembleOptions,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            n_neurons: 100,
            tau: 0.05,
            reset_weight: -2.5,
            ensemble: EnsembleOptions::new(),
        }
    }
}

impl NetworkConfig {
    pub fn with_neurons(n_neurons: usize) -> Self {
        Self {
            n_neurons,
            ..Default::default()
        }
    }

    pub fn with_tau(mut self, tau: f64) -> Self {
        self.tau = tau;
        self
    }

    /// Add an option for the host's ensemble constructor.
    pub fn with_option(mut self, key: &str, value: serde_json::Value) -> Self {
        self.ensemble.insert(key.to_string(), value);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_neurons == 0 {
            return Err(LmuError::InvalidConfiguration("n_neurons must be >= 1"));
        }
        if !self.tau.is_finite() || self.tau <= 0.0 {
            return Err(LmuError::InvalidConfiguration("tau must be finite and > 0"));
        }
        if !self.reset_weight.is_finite() {
            return Err(LmuError::InvalidConfiguration("reset_weight must be finite"));
        }
        Ok(())
    }
}

/// How a memory is realized.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Realization {
    /// Discrete recurrence, data-only input.
    #[default]
    Exact,
    /// Discrete recurrence with reset/hold control channels ahead of the data.
    Gated(GateConfig),
    /// Recurrent ensembles wired from the continuous matrices.
    Network(NetworkConfig),
}

/// Everything needed to build a memory.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Settings {
    pub lmu: LmuConfig,
    pub realization: Realization,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.lmu.validate()?;
        if let Realization::Network(net) = &self.realization {
            net.validate()?;
        }
        Ok(())
    }

    #[cfg(feature = "serde")]
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }
}
