use nalgebra::DMatrix;

use crate::config::LmuConfig;
use crate::discretize::DiscreteMatrices;
use crate::error::{expect_width, LmuError, Result};
use crate::kernel::{ExecutionTier, Kernel};
use crate::matrices::ContinuousMatrices;

/// Memory state: one length-`q` column per input channel.
///
/// Storage is column-major, so [`MemoryState::flat`] is `flatten(state^T)`:
/// all `q` coefficients of channel 0, then channel 1, and so on.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryState {
    values: DMatrix<f64>,
}

impl MemoryState {
    pub fn zeros(q: usize, size_in: usize) -> Self {
        Self {
            values: DMatrix::zeros(q, size_in),
        }
    }

    pub fn q(&self) -> usize {
        self.values.nrows()
    }

    pub fn size_in(&self) -> usize {
        self.values.ncols()
    }

    /// The `q × size_in` matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// Coefficients of one channel.
    pub fn channel(&self, c: usize) -> &[f64] {
        let q = self.q();
        &self.values.as_slice()[c * q..(c + 1) * q]
    }

    /// Channel-major flattening, length `q * size_in`.
    pub fn flat(&self) -> &[f64] {
        self.values.as_slice()
    }

    pub fn clear(&mut self) {
        self.values.fill(0.0);
    }

    pub(crate) fn matrix_mut(&mut self) -> &mut DMatrix<f64> {
        &mut self.values
    }
}

/// Advances a memory with the exact discrete recurrence.
///
/// Owns its state exclusively; the sequence of `(x, reset)` calls fully
/// determines it.
#[derive(Debug, Clone)]
pub struct ExactStepper {
    cfg: LmuConfig,
    discrete: DiscreteMatrices,
    kernel: Kernel,
    state: MemoryState,
    tier: ExecutionTier,
    steps: u64,
}

impl ExactStepper {
    /// Build matrices and discretize at `cfg.dt`, which must be set.
    pub fn new(cfg: LmuConfig) -> Result<Self> {
        cfg.validate()?;
        let dt = cfg.require_dt()?;
        let discrete = ContinuousMatrices::for_config(&cfg)?.discretize(dt)?;
        Self::from_discrete(cfg, discrete)
    }

    /// Reuse matrices discretized elsewhere.
    ///
    /// `discrete` must be shaped for `cfg.q`. When `cfg.dt` is set it must
    /// equal `discrete.dt`; when unset it is taken from `discrete`.
    pub fn from_discrete(cfg: LmuConfig, discrete: DiscreteMatrices) -> Result<Self> {
        cfg.validate()?;
        if discrete.q != cfg.q {
            return Err(LmuError::InvalidConfiguration(
                "discrete matrices were built for a different q",
            ));
        }
        if discrete.ad.shape() != (cfg.q, cfg.q) || discrete.bd.len() != cfg.q {
            return Err(LmuError::InvalidConfiguration(
                "Ad must be q x q and Bd must have length q",
            ));
        }
        LmuConfig::validate_dt(discrete.dt)?;
        if cfg.dt.is_some_and(|dt| dt != discrete.dt) {
            return Err(LmuError::InvalidConfiguration(
                "discrete matrices were built for a different dt",
            ));
        }
        let cfg = LmuConfig {
            dt: Some(discrete.dt),
            ..cfg
        };
        Ok(Self {
            kernel: Kernel::new(&discrete),
            state: MemoryState::zeros(cfg.q, cfg.size_in),
            cfg,
            discrete,
            tier: ExecutionTier::default(),
            steps: 0,
        })
    }

    pub fn set_execution_tier(&mut self, tier: ExecutionTier) {
        self.tier = tier;
    }

    pub fn execution_tier(&self) -> ExecutionTier {
        self.tier
    }

    /// Advance one timestep.
    ///
    /// With `reset`, the state becomes `Bd * x` as if `x` were the first
    /// sample ever seen; otherwise `Ad * state + Bd * x`. `x` must carry
    /// exactly `size_in` values; on a mismatch the state is left untouched.
    pub fn step(&mut self, x: &[f64], reset: bool) -> Result<&MemoryState> {
        expect_width(self.cfg.size_in, x.len())?;
        if reset {
            self.kernel.load(self.state.matrix_mut(), x);
        } else {
            self.kernel.update(self.tier, self.state.matrix_mut(), x);
        }
        self.steps += 1;
        Ok(&self.state)
    }

    /// Advance one timestep feeding the same scalar to every channel.
    pub fn step_scalar(&mut self, x: f64, reset: bool) -> Result<&MemoryState> {
        let xs = vec![x; self.cfg.size_in];
        self.step(&xs, reset)
    }

    pub fn state(&self) -> &MemoryState {
        &self.state
    }

    pub fn config(&self) -> &LmuConfig {
        &self.cfg
    }

    pub fn discrete(&self) -> &DiscreteMatrices {
        &self.discrete
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Zero the state and step counter.
    pub fn clear(&mut self) {
        self.state.clear();
        self.steps = 0;
    }
}
