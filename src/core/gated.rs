//! Fixed-rate process interface with optional reset/hold control channels.
//!
//! A host calls [`LmuProcess::make_step`] once with its timestep and then
//! feeds one flat vector per tick: control flags first, data after. Each tick
//! returns the flattened state (`q * size_in`, channel-major).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use nalgebra::DMatrix;
use tracing::trace;

use crate::config::{GateConfig, LmuConfig};
use crate::decoder;
use crate::discretize::DiscreteMatrices;
use crate::error::{expect_width, Result};
use crate::kernel::{ExecutionTier, Kernel};
use crate::matrices::ContinuousMatrices;
use crate::stepper::MemoryState;

/// Layout of the control channels preceding the data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GateMode {
    /// Pure data.
    #[default]
    Ungated,
    /// `input[0]` is the reset flag.
    Resets,
    /// `input[0]` is the hold flag.
    Holds,
    /// `input[0]` is reset, `input[1]` is hold.
    ResetsAndHolds,
}

/// What a single tick does to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// `state <- Ad * state + Bd * data`.
    Update,
    /// `state <- Bd * data`.
    Load,
    /// `state <- 0`.
    Clear,
    /// State unchanged.
    Freeze,
}

impl From<GateConfig> for GateMode {
    fn from(gates: GateConfig) -> Self {
        match (gates.with_resets, gates.with_holds) {
            (false, false) => GateMode::Ungated,
            (true, false) => GateMode::Resets,
            (false, true) => GateMode::Holds,
            (true, true) => GateMode::ResetsAndHolds,
        }
    }
}

impl GateMode {
    /// Number of control channels ahead of the data.
    #[must_use]
    pub fn control_width(self) -> usize {
        match self {
            GateMode::Ungated => 0,
            GateMode::Resets | GateMode::Holds => 1,
            GateMode::ResetsAndHolds => 2,
        }
    }

    /// Decide the action for one tick from its control flags.
    ///
    /// `controls` holds [`GateMode::control_width`] flags; a missing flag
    /// reads as zero. A flag is asserted when it is nonzero.
    ///
    /// With both flags the table is:
    ///
    /// | reset | hold | action |
    /// |-------|------|--------|
    /// | ≠0    | ≠0   | Clear  |
    /// | 0     | ≠0   | Load   |
    /// | 0     | 0    | Update |
    /// | ≠0    | 0    | Freeze |
    #[must_use]
    pub fn action(self, controls: &[f64]) -> GateAction {
        let flag = |i: usize| controls.get(i).is_some_and(|v| *v != 0.0);
        match self {
            GateMode::Ungated => GateAction::Update,
            GateMode::Resets => {
                if flag(0) {
                    GateAction::Load
                } else {
                    GateAction::Update
                }
            }
            GateMode::Holds => {
                if flag(0) {
                    GateAction::Freeze
                } else {
                    GateAction::Update
                }
            }
            GateMode::ResetsAndHolds => {
                match (flag(0), flag(1)) {
                    (true, true) => GateAction::Clear,
                    (false, true) => GateAction::Load,
                    (false, false) => GateAction::Update,
                    (true, false) => GateAction::Freeze,
                }
            }
        }
    }
}

/// An LMU packaged for a host's fixed-rate step loop.
///
/// Holds only the continuous matrices; discretization waits until the host
/// supplies its timestep through [`LmuProcess::make_step`].
#[derive(Debug, Clone)]
pub struct LmuProcess {
    cfg: LmuConfig,
    mode: GateMode,
    continuous: ContinuousMatrices,
}

impl LmuProcess {
    /// `cfg.dt` is ignored; the host provides it later.
    pub fn new(cfg: LmuConfig, gates: GateConfig) -> Result<Self> {
        let cfg = LmuConfig { dt: None, ..cfg };
        cfg.validate()?;
        let continuous = ContinuousMatrices::for_config(&cfg)?;
        Ok(Self {
            cfg,
            mode: gates.into(),
            continuous,
        })
    }

    pub fn mode(&self) -> GateMode {
        self.mode
    }

    /// Expected input width: data channels plus enabled control flags.
    pub fn size_in(&self) -> usize {
        self.cfg.size_in + self.mode.control_width()
    }

    /// Output width: `q * size_in`.
    pub fn size_out(&self) -> usize {
        self.cfg.state_len()
    }

    pub fn matrices(&self) -> &ContinuousMatrices {
        &self.continuous
    }

    /// Discretize at the host's `dt` and return a stepper with fresh zero state.
    ///
    /// Every call yields an independent stepper.
    pub fn make_step(&self, dt: f64) -> Result<GatedStepper> {
        let discrete = self.continuous.discretize(dt)?;
        Ok(GatedStepper {
            mode: self.mode,
            size_in: self.cfg.size_in,
            kernel: Kernel::new(&discrete),
            discrete,
            state: MemoryState::zeros(self.cfg.q, self.cfg.size_in),
            tier: ExecutionTier::default(),
            steps: 0,
        })
    }

    /// Readout matrix mapping one channel's state to values `r * theta` ago.
    pub fn weights_for_delays(&self, r: &[f64]) -> Result<DMatrix<f64>> {
        decoder::weights_for_delays(self.cfg.q, r)
    }
}

/// Per-tick stepper produced by [`LmuProcess::make_step`].
#[derive(Debug, Clone)]
pub struct GatedStepper {
    mode: GateMode,
    size_in: usize,
    discrete: DiscreteMatrices,
    kernel: Kernel,
    state: MemoryState,
    tier: ExecutionTier,
    steps: u64,
}

impl GatedStepper {
    pub fn set_execution_tier(&mut self, tier: ExecutionTier) {
        self.tier = tier;
    }

    /// Full input width (controls + data).
    pub fn input_width(&self) -> usize {
        self.size_in + self.mode.control_width()
    }

    /// Apply one tick and return `flatten(state^T)`.
    ///
    /// On a width mismatch nothing changes.
    pub fn step(&mut self, input: &[f64]) -> Result<&[f64]> {
        expect_width(self.input_width(), input.len())?;
        let (controls, data) = input.split_at(self.mode.control_width());
        let action = self.mode.action(controls);
        trace!(?action, step = self.steps, "gated LMU tick");

        match action {
            GateAction::Update => self.kernel.update(self.tier, self.state.matrix_mut(), data),
            GateAction::Load => self.kernel.load(self.state.matrix_mut(), data),
            GateAction::Clear => self.state.clear(),
            GateAction::Freeze => {}
        }
        self.steps += 1;
        Ok(self.state.flat())
    }

    pub fn state(&self) -> &MemoryState {
        &self.state
    }

    pub fn discrete(&self) -> &DiscreteMatrices {
        &self.discrete
    }

    pub fn mode(&self) -> GateMode {
        self.mode
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub(crate) fn clear(&mut self) {
        self.state.clear();
        self.steps = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LmuError;

    fn process(q: usize, size_in: usize, resets: bool, holds: bool) -> LmuProcess {
        LmuProcess::new(
            LmuConfig::new(1.0, q).with_size_in(size_in),
            GateConfig::new(resets, holds),
        )
        .unwrap()
    }

    #[test]
    fn widths_follow_enabled_flags() {
        assert_eq!(process(3, 2, false, false).size_in(), 2);
        assert_eq!(process(3, 2, true, false).size_in(), 3);
        assert_eq!(process(3, 2, false, true).size_in(), 3);
        assert_eq!(process(3, 2, true, true).size_in(), 4);
        assert_eq!(process(3, 2, true, true).size_out(), 6);
    }

    #[test]
    fn resets_and_holds_truth_table() {
        let m = GateMode::ResetsAndHolds;
        assert_eq!(m.action(&[1.0, 1.0]), GateAction::Clear);
        assert_eq!(m.action(&[0.0, 1.0]), GateAction::Load);
        assert_eq!(m.action(&[0.0, 0.0]), GateAction::Update);
        assert_eq!(m.action(&[1.0, 0.0]), GateAction::Freeze);
        // Any nonzero value asserts a flag.
        assert_eq!(m.action(&[-0.5, 2.0]), GateAction::Clear);
    }

    #[test]
    fn single_flag_tables() {
        assert_eq!(GateMode::Resets.action(&[1.0]), GateAction::Load);
        assert_eq!(GateMode::Resets.action(&[0.0]), GateAction::Update);
        assert_eq!(GateMode::Holds.action(&[1.0]), GateAction::Freeze);
        assert_eq!(GateMode::Holds.action(&[0.0]), GateAction::Update);
        assert_eq!(GateMode::Ungated.action(&[]), GateAction::Update);
    }

    #[test]
    fn missing_flags_read_as_zero() {
        let m = GateMode::ResetsAndHolds;
        assert_eq!(m.action(&[]), GateAction::Update);
        assert_eq!(m.action(&[1.0]), GateAction::Freeze);
        assert_eq!(GateMode::Resets.action(&[]), GateAction::Update);
        assert_eq!(GateMode::Holds.action(&[]), GateAction::Update);
    }

    #[test]
    fn ungated_output_is_channel_major() {
        let p = process(2, 2, false, false);
        let mut s = p.make_step(0.01).unwrap();
        let bd = s.discrete().bd.clone();
        let out = s.step(&[1.0, 3.0]).unwrap().to_vec();
        // [ch0 q0, ch0 q1, ch1 q0, ch1 q1]
        let expected = [bd[0], bd[1], 3.0 * bd[0], 3.0 * bd[1]];
        for (a, b) in out.iter().zip(expected) {
            assert!((a - b).abs() < 1e-15);
        }
    }

    #[test]
    fn reset_flag_discards_history() {
        let p = process(3, 1, true, false);
        let mut s = p.make_step(0.01).unwrap();
        for _ in 0..20 {
            s.step(&[0.0, 1.0]).unwrap();
        }
        let bd = s.discrete().bd.clone();
        let out = s.step(&[1.0, 2.0]).unwrap();
        for i in 0..3 {
            assert!((out[i] - 2.0 * bd[i]).abs() < 1e-15);
        }
    }

    #[test]
    fn hold_flag_freezes_state() {
        let p = process(3, 1, false, true);
        let mut s = p.make_step(0.01).unwrap();
        s.step(&[0.0, 1.0]).unwrap();
        let before = s.state().clone();
        s.step(&[1.0, 5.0]).unwrap();
        s.step(&[1.0, -5.0]).unwrap();
        assert_eq!(s.state(), &before);
    }

    #[test]
    fn combined_flags_scenario() {
        // q = 2, theta = 1, one channel, dt = 0.01, data held at 5.
        let p = process(2, 1, true, true);
        let mut s = p.make_step(0.01).unwrap();
        let ad = s.discrete().ad.clone();
        let bd = s.discrete().bd.clone();

        // reset & hold: cleared to zero.
        let first = s.step(&[1.0, 1.0, 5.0]).unwrap().to_vec();
        assert_eq!(first, vec![0.0, 0.0]);

        // no reset, hold: loaded with Bd * 5.
        let second = s.step(&[0.0, 1.0, 5.0]).unwrap().to_vec();
        let loaded = &bd * 5.0;
        assert!((second[0] - loaded[0]).abs() < 1e-15);
        assert!((second[1] - loaded[1]).abs() < 1e-15);

        // neither: normal update from the loaded state.
        let third = s.step(&[0.0, 0.0, 5.0]).unwrap().to_vec();
        let expected = &ad * &loaded + &bd * 5.0;
        assert!((third[0] - expected[0]).abs() < 1e-14);
        assert!((third[1] - expected[1]).abs() < 1e-14);

        // reset without hold: unchanged.
        let fourth = s.step(&[1.0, 0.0, -100.0]).unwrap().to_vec();
        assert_eq!(fourth, third);
    }

    #[test]
    fn wrong_width_is_rejected_without_side_effects() {
        let p = process(2, 2, true, true);
        let mut s = p.make_step(0.01).unwrap();
        s.step(&[0.0, 0.0, 1.0, 1.0]).unwrap();
        let before = s.state().clone();

        // Data-only width is short by the two control channels.
        let err = s.step(&[1.0, 1.0]).unwrap_err();
        assert!(matches!(err, LmuError::ShapeMismatch { expected: 4, got: 2 }));
        assert!(s.step(&[0.0, 0.0, 1.0, 1.0, 1.0]).is_err());
        assert_eq!(s.state(), &before);
        assert_eq!(s.steps(), 1);
    }

    #[test]
    fn make_step_yields_independent_steppers() {
        let p = process(3, 1, false, false);
        let mut a = p.make_step(0.01).unwrap();
        let mut b = p.make_step(0.01).unwrap();
        a.step(&[1.0]).unwrap();
        assert!(b.state().flat().iter().all(|v| *v == 0.0));
        b.step(&[1.0]).unwrap();
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn make_step_validates_dt() {
        let p = process(3, 1, false, false);
        assert!(p.make_step(0.0).is_err());
        assert!(p.make_step(f64::NAN).is_err());
    }

    #[test]
    fn process_ignores_configured_dt() {
        let cfg = LmuConfig::new(1.0, 3).with_dt(-1.0);
        assert!(LmuProcess::new(cfg, GateConfig::default()).is_ok());
    }

    #[test]
    fn process_delay_weights_have_expected_shape() {
        let p = process(4, 1, false, false);
        let w = p.weights_for_delays(&[0.0, 0.5, 1.0]).unwrap();
        assert_eq!(w.shape(), (3, 4));
    }
}
