//! Delay decoding with shifted Legendre polynomials.
//!
//! Row `k` of the readout for delays `r` holds `P_i(2 r_k - 1)` for
//! `i in 0..q`, where `P_i` is the Legendre polynomial of degree `i`.
//! Applied to one channel's state it estimates the input `r_k * theta`
//! seconds ago (`r = 0` is now, `r = 1` is the far edge of the window).

use nalgebra::DMatrix;

use crate::error::{expect_width, LmuError, Result};
use crate::stepper::MemoryState;

/// Legendre polynomial of degree `n` at `x`, by Bonnet's recurrence.
#[must_use]
pub fn legendre(n: usize, x: f64) -> f64 {
    match n {
        0 => 1.0,
        1 => x,
        _ => {
            let (mut p_prev, mut p) = (1.0, x);
            for k in 1..n {
                let k = k as f64;
                let next = ((2.0 * k + 1.0) * x * p - k * p_prev) / (k + 1.0);
                p_prev = p;
                p = next;
            }
            p
        }
    }
}

/// Readout matrix of shape `(r.len(), q)`.
///
/// Delays are not clamped to `[0, 1]`; values outside extrapolate the
/// polynomials. Non-finite delays are rejected.
pub fn weights_for_delays(q: usize, r: &[f64]) -> Result<DMatrix<f64>> {
    if q == 0 {
        return Err(LmuError::InvalidConfiguration("q must be >= 1"));
    }
    if r.iter().any(|v| !v.is_finite()) {
        return Err(LmuError::InvalidConfiguration("delays must be finite"));
    }
    Ok(DMatrix::from_fn(r.len(), q, |k, i| legendre(i, 2.0 * r[k] - 1.0)))
}

/// A fixed set of delays with their readout matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayDecoder {
    delays: Vec<f64>,
    weights: DMatrix<f64>,
}

impl DelayDecoder {
    pub fn new(q: usize, delays: &[f64]) -> Result<Self> {
        Ok(Self {
            weights: weights_for_delays(q, delays)?,
            delays: delays.to_vec(),
        })
    }

    /// `n` delays evenly spaced over `[0, 1]` (just `0` when `n == 1`).
    pub fn evenly_spaced(q: usize, n: usize) -> Result<Self> {
        let delays: Vec<f64> = match n {
            0 => Vec::new(),
            1 => vec![0.0],
            _ => (0..n).map(|k| k as f64 / (n - 1) as f64).collect(),
        };
        Self::new(q, &delays)
    }

    pub fn delays(&self) -> &[f64] {
        &self.delays
    }

    pub fn weights(&self) -> &DMatrix<f64> {
        &self.weights
    }

    pub fn q(&self) -> usize {
        self.weights.ncols()
    }

    /// Estimates with shape `(delays, size_in)`: column `c` is channel `c`.
    pub fn decode(&self, state: &MemoryState) -> Result<DMatrix<f64>> {
        expect_width(self.q(), state.q())?;
        Ok(&self.weights * state.matrix())
    }

    /// Same as [`DelayDecoder::decode`] for a channel-major flat state.
    ///
    /// Returns one `Vec` per channel, each with one value per delay. If
    /// `flat.len()` is not a multiple of `q` the error reports `q` against
    /// the length of the trailing partial channel.
    pub fn decode_flat(&self, flat: &[f64]) -> Result<Vec<Vec<f64>>> {
        let q = self.q();
        if flat.len() % q != 0 {
            return Err(LmuError::ShapeMismatch {
                expected: q,
                got: flat.len() % q,
            });
        }
        Ok(flat
            .chunks(q)
            .map(|channel| {
                self.weights
                    .row_iter()
                    .map(|row| row.iter().zip(channel).map(|(w, m)| w * m).sum::<f64>())
                    .collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LmuConfig;
    use crate::stepper::ExactStepper;

    #[test]
    fn legendre_matches_closed_forms() {
        for x in [-1.0, -0.3, 0.0, 0.5, 1.0] {
            assert_eq!(legendre(0, x), 1.0);
            assert_eq!(legendre(1, x), x);
            let p2 = 0.5 * (3.0 * x * x - 1.0);
            let p3 = 0.5 * (5.0 * x * x * x - 3.0 * x);
            assert!((legendre(2, x) - p2).abs() < 1e-14);
            assert!((legendre(3, x) - p3).abs() < 1e-14);
        }
    }

    #[test]
    fn legendre_endpoints() {
        for n in 0..12 {
            assert!((legendre(n, 1.0) - 1.0).abs() < 1e-12);
            let sign = if n % 2 == 0 { 1.0 } else { -1.0 };
            assert!((legendre(n, -1.0) - sign).abs() < 1e-12);
        }
    }

    #[test]
    fn weights_shape_and_edges() {
        let w = weights_for_delays(5, &[0.0, 1.0]).unwrap();
        assert_eq!(w.shape(), (2, 5));
        for i in 0..5 {
            // r = 0 -> P_i(-1) = (-1)^i, r = 1 -> P_i(1) = 1.
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            assert!((w[(0, i)] - sign).abs() < 1e-12);
            assert!((w[(1, i)] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn empty_delays_give_empty_matrix() {
        let w = weights_for_delays(3, &[]).unwrap();
        assert_eq!(w.shape(), (0, 3));
    }

    #[test]
    fn rejects_non_finite_delays() {
        assert!(weights_for_delays(3, &[0.0, f64::NAN]).is_err());
        assert!(weights_for_delays(3, &[f64::INFINITY]).is_err());
    }

    #[test]
    fn constant_input_decodes_to_itself_at_r0() {
        let mut s = ExactStepper::new(LmuConfig::new(0.5, 6).with_dt(0.001)).unwrap();
        for _ in 0..10_000 {
            s.step(&[3.0], false).unwrap();
        }
        let dec = DelayDecoder::new(6, &[0.0, 0.5, 1.0]).unwrap();
        let est = dec.decode(s.state()).unwrap();
        for k in 0..3 {
            assert!((est[(k, 0)] - 3.0).abs() < 1e-6, "r={} -> {}", dec.delays()[k], est[(k, 0)]);
        }
    }

    #[test]
    fn slow_sine_is_recovered_at_interior_delays() {
        let theta = 1.0;
        let dt = 0.001;
        let freq = 0.5;
        let mut s = ExactStepper::new(LmuConfig::new(theta, 8).with_dt(dt)).unwrap();
        let signal = |t: f64| (2.0 * std::f64::consts::PI * freq * t).sin();

        let steps = 4000;
        for k in 0..steps {
            s.step(&[signal(k as f64 * dt)], false).unwrap();
        }
        let now = (steps - 1) as f64 * dt;
        let dec = DelayDecoder::evenly_spaced(8, 5).unwrap();
        let est = dec.decode(s.state()).unwrap();
        for (k, r) in dec.delays().iter().enumerate() {
            let truth = signal(now - r * theta);
            assert!(
                (est[(k, 0)] - truth).abs() < 0.1,
                "r={r}: estimate {} vs {}",
                est[(k, 0)],
                truth
            );
        }
    }

    #[test]
    fn decode_flat_matches_matrix_decode() {
        let mut s = ExactStepper::new(LmuConfig::new(1.0, 4).with_size_in(2).with_dt(0.01)).unwrap();
        for t in 0..30 {
            s.step(&[t as f64 * 0.1, 1.0], false).unwrap();
        }
        let dec = DelayDecoder::evenly_spaced(4, 3).unwrap();
        let m = dec.decode(s.state()).unwrap();
        let flat = dec.decode_flat(s.state().flat()).unwrap();
        assert_eq!(flat.len(), 2);
        for c in 0..2 {
            for k in 0..3 {
                assert!((flat[c][k] - m[(k, c)]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn decode_rejects_mismatched_order() {
        let s = ExactStepper::new(LmuConfig::new(1.0, 4).with_dt(0.01)).unwrap();
        let dec = DelayDecoder::new(3, &[0.0]).unwrap();
        assert!(matches!(
            dec.decode(s.state()),
            Err(LmuError::ShapeMismatch { expected: 3, got: 4 })
        ));
        assert!(matches!(
            dec.decode_flat(&[1.0, 2.0]),
            Err(LmuError::ShapeMismatch { expected: 3, got: 2 })
        ));
        assert!(matches!(
            dec.decode_flat(&[1.0, 2.0, 3.0, 4.0]),
            Err(LmuError::ShapeMismatch { expected: 3, got: 1 })
        ));
    }
}
