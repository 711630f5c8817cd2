//! Exact (zero-order hold) discretization of the continuous matrices.
//!
//! `Ad = expm(A dt)` and `Bd = A^-1 (Ad - I) B`. The exponential uses
//! nalgebra's Padé scaling-and-squaring; `Bd` comes from an LU solve rather
//! than an explicit inverse.

use nalgebra::{DMatrix, DVector};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LmuConfig;
use crate::error::{LmuError, Result};
use crate::matrices::{self, ContinuousMatrices};

/// `(Ad, Bd)` valid only for the `dt` they were computed with.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiscreteMatrices {
    pub dt: f64,
    pub q: usize,
    /// `q × q` state transition.
    pub ad: DMatrix<f64>,
    /// Length `q` input map.
    pub bd: DVector<f64>,
}

pub fn discretize(m: &ContinuousMatrices, dt: f64) -> Result<DiscreteMatrices> {
    LmuConfig::validate_dt(dt)?;
    matrices::check_shapes(m)?;

    if dt > m.theta {
        warn!(
            dt,
            theta = m.theta,
            "dt exceeds the memory window; the discrete memory will be coarse"
        );
    }

    let q = m.q;
    let ad = (&m.a * dt).exp();
    let rhs = (&ad - DMatrix::<f64>::identity(q, q)) * &m.b;
    let bd = m.a.clone().lu().solve(&rhs).ok_or(LmuError::SingularMatrix)?;

    debug!(q, dt, theta = m.theta, "discretized LMU matrices");
    Ok(DiscreteMatrices { dt, q, ad, bd })
}

impl DiscreteMatrices {
    /// Spectral radius of `Ad`. Below one for every valid configuration.
    #[must_use]
    pub fn spectral_radius(&self) -> f64 {
        self.ad
            .complex_eigenvalues()
            .iter()
            .map(|ev| ev.norm())
            .fold(0.0, f64::max)
    }

    /// Fixed point of `x = Ad x + Bd u` for a constant unit input.
    pub fn unit_steady_state(&self) -> Result<DVector<f64>> {
        let lhs = DMatrix::<f64>::identity(self.q, self.q) - &self.ad;
        lhs.lu().solve(&self.bd).ok_or(LmuError::SingularMatrix)
    }
}
