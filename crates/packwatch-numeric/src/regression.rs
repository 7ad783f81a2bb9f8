//! Ordinary least-squares regression and averaging.

use nalgebra::{Matrix2, Vector2};

use crate::solve::solve_2x2;
use crate::{Error, Result};

/// Result of a linear regression `y(t) = slope · t + intercept`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub mean_t: f64,
    pub mean_y: f64,
    /// Coefficient of determination; clamped to 0.99 when the total
    /// variance of y underflows the epsilon.
    pub r2: f64,
}

/// Result of averaging a window of values.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Average {
    pub mean: f64,
    /// Σ(y − ȳ)².
    pub sum_sq_dev: f64,
    /// R² measured against the origin; a diagnostic quantity.
    pub r2: f64,
}

/// Ordinary least squares over `(t, y)` pairs via the normal equations.
pub fn linear_regression(times: &[f64], values: &[f64], eps: f64) -> Result<LinearFit> {
    if times.len() != values.len() || times.len() < 2 {
        return Err(Error::InvalidRange);
    }
    let n = times.len() as f64;

    let mut st2 = 0.0;
    let mut st = 0.0;
    let mut sty = 0.0;
    let mut sy = 0.0;
    for (&t, &y) in times.iter().zip(values) {
        st2 += t * t;
        st += t;
        sty += t * y;
        sy += y;
    }

    let m = Matrix2::new(st2, st, st, n);
    let b = Vector2::new(sty, sy);
    let r = solve_2x2(&m, &b, eps)?;

    let mean_t = st / n;
    let mean_y = sy / n;

    let mut sum_e2 = 0.0;
    let mut sum_y2 = 0.0;
    for (&t, &y) in times.iter().zip(values) {
        let e = y - (t * r[0] + r[1]);
        sum_e2 += e * e;
        let d = y - mean_y;
        sum_y2 += d * d;
    }
    let r2 = if sum_y2 < eps {
        0.99
    } else {
        1.0 - sum_e2 / sum_y2
    };

    Ok(LinearFit {
        slope: r[0],
        intercept: r[1],
        mean_t,
        mean_y,
        r2,
    })
}

/// Mean of a window plus its deviation sum and origin-referenced R².
pub fn average(values: &[f64], eps: f64) -> Result<Average> {
    if values.is_empty() {
        return Err(Error::InvalidRange);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;

    let mut sum_sq_dev = 0.0;
    let mut sum_sq = 0.0;
    for &y in values {
        let d = y - mean;
        sum_sq_dev += d * d;
        sum_sq += y * y;
    }
    let r2 = if sum_sq < eps {
        1.0
    } else {
        1.0 - sum_sq_dev / sum_sq
    };

    Ok(Average {
        mean,
        sum_sq_dev,
        r2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1.0e-30;

    #[test]
    fn exact_line_recovers_analytic_coefficients() {
        let times: Vec<f64> = (1..=10).map(|i| i as f64 * 10.0).collect();
        let values: Vec<f64> = times.iter().map(|t| 3.0 * t + 5.0).collect();
        let fit = linear_regression(&times, &values, EPS).unwrap();
        assert!((fit.slope - 3.0).abs() < 1e-9);
        assert!((fit.intercept - 5.0).abs() < 1e-9);
        assert!(fit.r2 >= 0.999);
        assert!((fit.mean_t - 55.0).abs() < 1e-9);
        assert!((fit.mean_y - 170.0).abs() < 1e-9);
    }

    #[test]
    fn constant_values_clamp_r2() {
        let times = [1.0, 2.0, 3.0, 4.0];
        let values = [7.0, 7.0, 7.0, 7.0];
        let fit = linear_regression(&times, &values, EPS).unwrap();
        assert!(fit.slope.abs() < 1e-12);
        assert!((fit.intercept - 7.0).abs() < 1e-9);
        assert!((fit.r2 - 0.99).abs() < 1e-12);
    }

    #[test]
    fn degenerate_time_axis_is_singular() {
        // All samples at the same instant: the normal equations collapse.
        let times = [5.0, 5.0, 5.0];
        let values = [1.0, 2.0, 3.0];
        assert_eq!(
            linear_regression(&times, &values, EPS),
            Err(Error::Singular)
        );
    }

    #[test]
    fn average_of_noisy_window() {
        let values = [10.0, 12.0, 11.0, 9.0, 8.0];
        let a = average(&values, EPS).unwrap();
        assert!((a.mean - 10.0).abs() < 1e-12);
        assert!((a.sum_sq_dev - 10.0).abs() < 1e-12);
        assert!(a.r2 > 0.9);
    }

    #[test]
    fn average_rejects_empty_window() {
        assert_eq!(average(&[], EPS), Err(Error::InvalidRange));
    }
}
