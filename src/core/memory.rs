//! One advance operation over every way of realizing the memory.

use tracing::debug;

use crate::config::{Realization, Settings};
use crate::error::Result;
use crate::gated::{GatedStepper, LmuProcess};
use crate::host::RealizedMemory;
use crate::stepper::ExactStepper;

/// Produces the next state from the current state and one input vector.
///
/// The input layout depends on the realization:
///
/// - exact: `data` (`size_in` values)
/// - gated: `controls ++ data`, one control per enabled flag
/// - network: `data ++ [reset]`, reset asserted when nonzero
///
/// The output is always the channel-major state of length `q * size_in`.
pub trait Memory {
    fn input_width(&self) -> usize;

    fn output_width(&self) -> usize;

    /// Advance one tick. A width mismatch fails without touching the state.
    fn advance(&mut self, input: &[f64]) -> Result<&[f64]>;

    /// The state after the last successful advance.
    fn output(&self) -> &[f64];

    /// Zero the state and step counter.
    fn clear(&mut self);

    fn steps(&self) -> u64;
}

impl Memory for ExactStepper {
    fn input_width(&self) -> usize {
        self.config().size_in
    }

    fn output_width(&self) -> usize {
        self.config().state_len()
    }

    fn advance(&mut self, input: &[f64]) -> Result<&[f64]> {
        Ok(self.step(input, false)?.flat())
    }

    fn output(&self) -> &[f64] {
        self.state().flat()
    }

    fn clear(&mut self) {
        ExactStepper::clear(self);
    }

    fn steps(&self) -> u64 {
        ExactStepper::steps(self)
    }
}

impl Memory for GatedStepper {
    fn input_width(&self) -> usize {
        GatedStepper::input_width(self)
    }

    fn output_width(&self) -> usize {
        self.state().flat().len()
    }

    fn advance(&mut self, input: &[f64]) -> Result<&[f64]> {
        self.step(input)
    }

    fn output(&self) -> &[f64] {
        self.state().flat()
    }

    fn clear(&mut self) {
        GatedStepper::clear(self);
    }

    fn steps(&self) -> u64 {
        GatedStepper::steps(self)
    }
}

impl Memory for RealizedMemory {
    fn input_width(&self) -> usize {
        self.size_in() + 1
    }

    fn output_width(&self) -> usize {
        RealizedMemory::output(self).len()
    }

    fn advance(&mut self, input: &[f64]) -> Result<&[f64]> {
        crate::error::expect_width(Memory::input_width(self), input.len())?;
        let (data, reset) = input.split_at(self.size_in());
        self.step(data, reset[0] != 0.0)
    }

    fn output(&self) -> &[f64] {
        RealizedMemory::output(self)
    }

    fn clear(&mut self) {
        RealizedMemory::clear(self);
    }

    fn steps(&self) -> u64 {
        RealizedMemory::steps(self)
    }
}

/// Build the realization named by `settings`.
///
/// Every variant needs `settings.lmu.dt`.
pub fn build_memory(settings: &Settings) -> Result<Box<dyn Memory>> {
    settings.validate()?;
    let lmu = settings.lmu;
    let memory: Box<dyn Memory> = match &settings.realization {
        Realization::Exact => Box::new(ExactStepper::new(lmu)?),
        Realization::Gated(gates) => {
            let dt = lmu.require_dt()?;
            Box::new(LmuProcess::new(lmu, *gates)?.make_step(dt)?)
        }
        Realization::Network(net) => Box::new(RealizedMemory::new(&lmu, net)?),
    };
    debug!(
        input_width = memory.input_width(),
        output_width = memory.output_width(),
        "built memory"
    );
    Ok(memory)
}
