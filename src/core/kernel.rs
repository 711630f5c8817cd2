//! The discrete update `state <- Ad * state + Bd * x^T`, one column per channel.

use nalgebra::{DMatrix, DVector, RowDVector};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "simd")]
use wide::f64x4;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::discretize::DiscreteMatrices;

/// Execution tier for the state update.
///
/// - `Scalar`: nalgebra matrix product (default, always available)
/// - `Simd`: row dot products with `wide::f64x4` (requires `simd` feature)
/// - `Parallel`: one rayon task per channel column (requires `parallel` feature)
///
/// A tier whose feature is not compiled in falls back to `Scalar`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExecutionTier {
    #[default]
    Scalar,
    Simd,
    Parallel,
}

impl ExecutionTier {
    /// The tier that will actually run, given the compiled features.
    #[must_use]
    pub fn effective(self) -> Self {
        match self {
            ExecutionTier::Scalar => ExecutionTier::Scalar,
            ExecutionTier::Simd => {
                #[cfg(feature = "simd")]
                {
                    ExecutionTier::Simd
                }
                #[cfg(not(feature = "simd"))]
                {
                    ExecutionTier::Scalar
                }
            }
            ExecutionTier::Parallel => {
                #[cfg(feature = "parallel")]
                {
                    ExecutionTier::Parallel
                }
                #[cfg(not(feature = "parallel"))]
                {
                    ExecutionTier::Scalar
                }
            }
        }
    }
}

/// Precomputed operands for the update.
#[derive(Debug, Clone)]
pub(crate) struct Kernel {
    q: usize,
    ad: DMatrix<f64>,
    bd: DVector<f64>,
    // Ad in row-major order for the row-dot paths.
    ad_rows: Vec<f64>,
}

impl Kernel {
    pub(crate) fn new(d: &DiscreteMatrices) -> Self {
        let ad_rows = d.ad.transpose().as_slice().to_vec();
        Self {
            q: d.q,
            ad: d.ad.clone(),
            bd: d.bd.clone(),
            ad_rows,
        }
    }

    /// `state[:, c] <- Ad * state[:, c] + Bd * x[c]`.
    ///
    /// `x.len()` must equal `state.ncols()`; callers validate widths first.
    pub(crate) fn update(&self, tier: ExecutionTier, state: &mut DMatrix<f64>, x: &[f64]) {
        debug_assert_eq!(state.nrows(), self.q);
        debug_assert_eq!(state.ncols(), x.len());

        match tier.effective() {
            #[cfg(feature = "simd")]
            ExecutionTier::Simd => self.update_rows(state, x, dot_simd),
            #[cfg(feature = "parallel")]
            ExecutionTier::Parallel => self.update_parallel(state, x),
            #[allow(unreachable_patterns)]
            _ => self.update_scalar(state, x),
        }
    }

    /// `state[:, c] <- Bd * x[c]`; history is discarded.
    pub(crate) fn load(&self, state: &mut DMatrix<f64>, x: &[f64]) {
        for (mut col, &xc) in state.column_iter_mut().zip(x) {
            col.copy_from(&(&self.bd * xc));
        }
    }

    fn update_scalar(&self, state: &mut DMatrix<f64>, x: &[f64]) {
        let drive = &self.bd * RowDVector::from_row_slice(x);
        let next = &self.ad * &*state + drive;
        state.copy_from(&next);
    }

    #[cfg_attr(not(feature = "simd"), allow(dead_code))]
    fn update_rows(&self, state: &mut DMatrix<f64>, x: &[f64], dot: fn(&[f64], &[f64]) -> f64) {
        let q = self.q;
        let mut prev = vec![0.0; q];
        for (col, &xc) in state.as_mut_slice().chunks_mut(q).zip(x) {
            prev.copy_from_slice(col);
            self.update_column(col, &prev, xc, dot);
        }
    }

    #[cfg(feature = "parallel")]
    fn update_parallel(&self, state: &mut DMatrix<f64>, x: &[f64]) {
        let q = self.q;
        state
            .as_mut_slice()
            .par_chunks_mut(q)
            .zip(x.par_iter())
            .for_each(|(col, &xc)| {
                let prev = col.to_vec();
                self.update_column(col, &prev, xc, dot_scalar);
            });
    }

    #[inline]
    fn update_column(&self, col: &mut [f64], prev: &[f64], xc: f64, dot: fn(&[f64], &[f64]) -> f64) {
        let q = self.q;
        for (i, out) in col.iter_mut().enumerate() {
            let row = &self.ad_rows[i * q..(i + 1) * q];
            *out = dot(row, prev) + self.bd[i] * xc;
        }
    }
}

#[inline]
#[cfg_attr(not(feature = "parallel"), allow(dead_code))]
fn dot_scalar(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(feature = "simd")]
#[inline]
fn dot_simd(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len();
    let simd_end = n - (n % 4);
    let mut acc = f64x4::splat(0.0);
    for i in (0..simd_end).step_by(4) {
        let va = f64x4::from([a[i], a[i + 1], a[i + 2], a[i + 3]]);
        let vb = f64x4::from([b[i], b[i + 1], b[i + 2], b[i + 3]]);
        acc += va * vb;
    }
    let mut sum = acc.reduce_add();
    // Tail elements.
    for i in simd_end..n {
        sum += a[i] * b[i];
    }
    sum
}
