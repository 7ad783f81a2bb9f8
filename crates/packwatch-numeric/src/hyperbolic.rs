//! Hyperbolic relaxation-curve fitting.
//!
//! The post-jump voltage and current of a transition period relax along
//! `y(t) = A/(t − t₀)² + B/(t − t₀) + C`. The fit is linear in A, B, C once
//! t₀ is fixed, so the normal equations over the basis
//! `{1/(t−t₀)², 1/(t−t₀), 1}` reduce to a 3×3 solve. The system is
//! ill-conditioned as t approaches t₀, and t₀ itself is unknown (it lies
//! somewhere between the last pre-jump sample and the first fitted one), so
//! t₀ is located by a coarse-to-fine grid search maximising R².

use nalgebra::{Matrix3, Vector3};

use crate::solve::solve_3x3;
use crate::{Error, Result};

/// Grid points per refinement pass of the t₀ search.
pub const DIVIDER: usize = 10;

/// Number of free coefficients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitModel {
    /// A, B and C free.
    Three,
    /// B pinned to zero.
    Two,
}

/// One fitted curve.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HyperbolicFit {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub t0: f64,
    pub r2: f64,
}

/// Fit `y(t) = A/(t−t₀)² + B/(t−t₀) + C` at a fixed t₀.
///
/// For [`FitModel::Two`] the B row and column of the normal equations are
/// zeroed and the diagonal forced to one, pinning B to zero while A and C
/// keep their least-squares values. Fails if the range is unusable, any
/// sample sits at or left of t₀, or the system is singular.
pub fn fit_hyperbolic(
    times: &[f64],
    values: &[f64],
    t0: f64,
    model: FitModel,
    eps: f64,
) -> Result<HyperbolicFit> {
    if times.len() != values.len() || times.len() < 3 {
        return Err(Error::InvalidRange);
    }

    let mut m = Matrix3::zeros();
    let mut rhs = Vector3::zeros();
    for (&t, &y) in times.iter().zip(values) {
        let x = t - t0;
        if x <= eps {
            return Err(Error::SingularityInRange);
        }
        let fb = 1.0 / x;
        let fa = fb / x;
        m[(0, 0)] += fa * fa;
        m[(0, 1)] += fa * fb;
        m[(0, 2)] += fa;
        rhs[0] += y * fa;
        m[(1, 1)] += fb * fb;
        m[(1, 2)] += fb;
        rhs[1] += y * fb;
        rhs[2] += y;
    }
    m[(1, 0)] = m[(0, 1)];
    m[(2, 0)] = m[(0, 2)];
    m[(2, 1)] = m[(1, 2)];
    m[(2, 2)] = times.len() as f64;

    if model == FitModel::Two {
        m[(0, 1)] = 0.0;
        m[(1, 0)] = 0.0;
        m[(1, 2)] = 0.0;
        m[(2, 1)] = 0.0;
        m[(1, 1)] = 1.0;
        rhs[1] = 0.0;
    }

    let coef = solve_3x3(&m, &rhs, eps)?;

    let mean_y = rhs[2] / times.len() as f64;
    let mut sum_e2 = 0.0;
    let mut sum_y2 = 0.0;
    for (&t, &y) in times.iter().zip(values) {
        let x = t - t0;
        let d = y - mean_y;
        sum_y2 += d * d;
        let e = coef[0] / x / x + coef[1] / x + coef[2] - y;
        sum_e2 += e * e;
    }

    Ok(HyperbolicFit {
        a: coef[0],
        b: coef[1],
        c: coef[2],
        t0,
        // Zero total variance leaves a NaN here; callers gate on a minimum
        // R² and a NaN fails that gate the same way a bad fit does.
        r2: 1.0 - sum_e2 / sum_y2,
    })
}

/// Locate t₀ by grid search and return the best three-parameter fit.
///
/// `t_before` is the timestamp of the sample immediately preceding the fit
/// range: the physical singularity lies between it and `times[0]`. Two
/// passes partition the current interval into [`DIVIDER`] points; the next
/// interval re-centres on the winner, or hugs the edge when the winner is
/// first or last. Grid points where the fit fails stand as R² = 0
/// candidates, so a search over unusable data returns a zeroed fit that no
/// acceptance gate will pass.
pub fn fit_hyperbolic_optimal_t0(
    t_before: f64,
    times: &[f64],
    values: &[f64],
    eps: f64,
) -> Result<HyperbolicFit> {
    if times.len() != values.len() || times.len() < 3 || t_before >= times[0] {
        return Err(Error::InvalidRange);
    }

    let mut lo = t_before;
    let mut hi = times[0];
    let mut best = HyperbolicFit::default();

    for _ in 0..2 {
        let dt = (hi - lo) / DIVIDER as f64;
        let mut candidates = [HyperbolicFit::default(); DIVIDER];
        for (i, cand) in candidates.iter_mut().enumerate() {
            let t0 = lo + dt * i as f64;
            if let Ok(fit) = fit_hyperbolic(times, values, t0, FitModel::Three, eps) {
                *cand = fit;
            }
        }

        let mut i_max = 0;
        for i in 1..DIVIDER {
            if candidates[i].r2 > candidates[i_max].r2 {
                i_max = i;
            }
        }

        if i_max == 0 {
            hi = lo + 2.0 * dt;
        } else if i_max == DIVIDER - 1 {
            lo = hi - 2.0 * dt;
        } else {
            lo += dt * (i_max - 1) as f64;
            hi = lo + 2.0 * dt;
        }
        best = candidates[i_max];
    }

    Ok(best)
}
