#[cfg(feature = "serde")]
use serde::Serialize;

use crate::decoder::DelayDecoder;
use crate::error::Result;
use crate::memory::Memory;

/// A read-only snapshot of a memory.
///
/// Design intent:
/// - Observers cannot advance or clear the memory.
/// - Snapshotting is *on-demand* and can allocate; the step loop stays unchanged.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MemorySnapshot {
    pub steps: u64,
    pub state_norm: f64,
    /// Euclidean norm of each channel's `q` coefficients.
    pub channel_norms: Vec<f64>,
    /// Per channel, the decoded value at each of the decoder's delays.
    pub decoded: Vec<Vec<f64>>,
}

pub struct MemoryAdapter<'a> {
    memory: &'a dyn Memory,
    decoder: &'a DelayDecoder,
}

impl<'a> MemoryAdapter<'a> {
    pub fn new(memory: &'a dyn Memory, decoder: &'a DelayDecoder) -> Self {
        Self { memory, decoder }
    }

    /// Fails only when the decoder's order does not divide the state.
    pub fn snapshot(&self) -> Result<MemorySnapshot> {
        let state = self.memory.output();
        let decoded = self.decoder.decode_flat(state)?;
        let channel_norms = state.chunks(self.decoder.q()).map(norm).collect();

        Ok(MemorySnapshot {
            steps: self.memory.steps(),
            state_norm: norm(state),
            channel_norms,
            decoded,
        })
    }
}

fn norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}
