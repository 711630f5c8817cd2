//! Continuous-time state-space matrices of the Legendre delay system.
//!
//! For memory order `q` and window `theta`, with `R[k] = (2k + 1) / theta`:
//!
//! ```text
//! A[i, j] = R[i] * (-1)             if i < j
//! A[i, j] = R[i] * (-1)^(i - j + 1) if i >= j
//! B[i]    = R[i] * (-1)^i
//! ```
//!
//! This is the minimal realization whose impulse response is the order-`q`
//! Padé approximant of a pure delay of `theta` seconds, expressed in the
//! shifted Legendre basis.

use nalgebra::{DMatrix, DVector};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LmuConfig;
use crate::discretize::{self, DiscreteMatrices};
use crate::error::{LmuError, Result};

/// `(A, B)` for one `(theta, q)`. Fixed for the lifetime of a configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContinuousMatrices {
    pub theta: f64,
    pub q: usize,
    /// `q × q`.
    pub a: DMatrix<f64>,
    /// Length `q`.
    pub b: DVector<f64>,
}

impl ContinuousMatrices {
    /// Build `(A, B)` for a window of `theta` seconds and memory order `q`.
    pub fn new(theta: f64, q: usize) -> Result<Self> {
        LmuConfig::new(theta, q).validate()?;

        let r = |k: usize| (2 * k + 1) as f64 / theta;

        let a = DMatrix::from_fn(q, q, |i, j| {
            let sign = if i < j { -1.0 } else { alternating(i - j + 1) };
            sign * r(i)
        });
        let b = DVector::from_fn(q, |i, _| alternating(i) * r(i));

        debug!(theta, q, "built continuous LMU matrices");
        Ok(Self { theta, q, a, b })
    }

    /// Matrices for a validated config.
    pub fn for_config(cfg: &LmuConfig) -> Result<Self> {
        cfg.validate()?;
        Self::new(cfg.theta, cfg.q)
    }

    /// Exact zero-order-hold discretization at `dt`.
    pub fn discretize(&self, dt: f64) -> Result<DiscreteMatrices> {
        discretize::discretize(self, dt)
    }

    /// `B` as a `q × 1` column matrix.
    #[must_use]
    pub fn b_column(&self) -> DMatrix<f64> {
        DMatrix::from_column_slice(self.q, 1, self.b.as_slice())
    }
}

/// `(-1)^k`.
#[inline]
fn alternating(k: usize) -> f64 {
    if k % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

/// Reject a pair whose shapes disagree. Only reachable through hand-built matrices.
pub(crate) fn check_shapes(m: &ContinuousMatrices) -> Result<()> {
    if m.a.nrows() != m.q || m.a.ncols() != m.q || m.b.len() != m.q {
        return Err(LmuError::InvalidConfiguration(
            "A must be q x q and B must have length q",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_one_is_a_leaky_integrator() {
        let m = ContinuousMatrices::new(2.0, 1).unwrap();
        assert_eq!(m.a[(0, 0)], -0.5);
        assert_eq!(m.b[0], 0.5);
    }

    #[test]
    fn order_three_matches_closed_form() {
        let theta = 0.5;
        let m = ContinuousMatrices::new(theta, 3).unwrap();

        // Rows scale by (2i + 1) / theta; signs follow the Legendre pattern.
        #[rustfmt::skip]
        let expected = DMatrix::from_row_slice(3, 3, &[
            -1.0, -1.0, -1.0,
             3.0, -3.0, -3.0,
            -5.0,  5.0, -5.0,
        ]) / theta;
        assert_eq!(m.a, expected);

        let expected_b = DVector::from_vec(vec![1.0, -3.0, 5.0]) / theta;
        assert_eq!(m.b, expected_b);
    }

    #[test]
    fn a_is_invertible_for_valid_configs() {
        for q in 1..=24 {
            for theta in [0.01, 0.1, 1.0, 10.0] {
                let m = ContinuousMatrices::new(theta, q).unwrap();
                assert!(
                    m.a.clone().lu().solve(&m.b).is_some(),
                    "A singular for q={q}, theta={theta}"
                );
            }
        }
    }

    #[test]
    fn eigenvalues_of_a_are_stable() {
        // Every eigenvalue of A has a negative real part.
        for q in [1, 2, 5, 12] {
            let m = ContinuousMatrices::new(1.0, q).unwrap();
            for ev in m.a.complex_eigenvalues().iter() {
                assert!(ev.re < 0.0, "q={q}: eigenvalue {ev} not in left half-plane");
            }
        }
    }

    #[test]
    fn steady_state_of_constant_input_is_first_legendre_coefficient() {
        // -A^-1 B = e_0: a constant signal is entirely the degree-0 term.
        let m = ContinuousMatrices::new(1.0, 6).unwrap();
        let x = m.a.clone().lu().solve(&(-&m.b)).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-10);
        for k in 1..6 {
            assert!(x[k].abs() < 1e-10, "x[{k}] = {}", x[k]);
        }
    }

    #[test]
    fn rejects_invalid_inputs() {
        assert!(ContinuousMatrices::new(1.0, 0).is_err());
        assert!(ContinuousMatrices::new(0.0, 3).is_err());
        assert!(ContinuousMatrices::new(f64::NAN, 3).is_err());
    }

    #[test]
    fn b_column_has_one_column() {
        let m = ContinuousMatrices::new(1.0, 4).unwrap();
        let col = m.b_column();
        assert_eq!(col.shape(), (4, 1));
        assert_eq!(col.as_slice(), m.b.as_slice());
        assert!(check_shapes(&m).is_ok());
    }
}
