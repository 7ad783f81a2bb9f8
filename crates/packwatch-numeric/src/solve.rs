//! Direct solvers for the 2×2 and 3×3 systems behind the curve fits.

use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};

use crate::{Error, Result};

/// Solve `M x = b` for a 2×2 system by Cramer's rule.
///
/// Returns [`Error::Singular`] iff `|det M| < eps`.
pub fn solve_2x2(m: &Matrix2<f64>, b: &Vector2<f64>, eps: f64) -> Result<Vector2<f64>> {
    let det = m.determinant();
    if det.abs() < eps {
        return Err(Error::Singular);
    }
    let x = (b[0] * m[(1, 1)] - b[1] * m[(0, 1)]) / det;
    let y = (m[(0, 0)] * b[1] - m[(1, 0)] * b[0]) / det;
    Ok(Vector2::new(x, y))
}

/// Solve `M x = b` for a 3×3 system by Gaussian elimination.
///
/// Row 0 is normalised, column 0 eliminated from rows 1 and 2, the reduced
/// 2×2 system solved by [`solve_2x2`], then x back-substituted. Returns
/// [`Error::Singular`] iff `|m₀₀| < eps` or the reduced system is singular.
pub fn solve_3x3(m: &Matrix3<f64>, b: &Vector3<f64>, eps: f64) -> Result<Vector3<f64>> {
    if m[(0, 0)].abs() < eps {
        return Err(Error::Singular);
    }
    let i = m[(0, 1)] / m[(0, 0)];
    let j = m[(0, 2)] / m[(0, 0)];
    let k = b[0] / m[(0, 0)];

    let g = Matrix2::new(
        m[(1, 1)] - m[(1, 0)] * i,
        m[(1, 2)] - m[(1, 0)] * j,
        m[(2, 1)] - m[(2, 0)] * i,
        m[(2, 2)] - m[(2, 0)] * j,
    );
    let gb = Vector2::new(b[1] - m[(1, 0)] * k, b[2] - m[(2, 0)] * k);

    let yz = solve_2x2(&g, &gb, eps)?;
    let x = k - i * yz[0] - j * yz[1];
    Ok(Vector3::new(x, yz[0], yz[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1.0e-30;

    #[test]
    fn solve_2x2_exact_roots() {
        // x + 2y = 5, 2x + 3y = 8 -> (1, 2)
        let m = Matrix2::new(1.0, 2.0, 2.0, 3.0);
        let b = Vector2::new(5.0, 8.0);
        let r = solve_2x2(&m, &b, EPS).unwrap();
        assert!((r[0] - 1.0).abs() < 1e-12);
        assert!((r[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn solve_2x2_reports_singular() {
        let m = Matrix2::new(1.0, 2.0, 2.0, 4.0);
        let b = Vector2::new(1.0, 2.0);
        assert_eq!(solve_2x2(&m, &b, EPS), Err(Error::Singular));
    }

    #[test]
    fn solve_3x3_exact_roots() {
        // 3x + 12y - 4z = 15
        // 2x +  2y + 3z = 15
        //  x -   y + 2z = 5     -> (1, 2, 3)
        let m = Matrix3::new(3.0, 12.0, -4.0, 2.0, 2.0, 3.0, 1.0, -1.0, 2.0);
        let b = Vector3::new(15.0, 15.0, 5.0);
        let r = solve_3x3(&m, &b, EPS).unwrap();
        assert!((r[0] - 1.0).abs() < 1e-12);
        assert!((r[1] - 2.0).abs() < 1e-12);
        assert!((r[2] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn solve_3x3_zero_pivot_is_singular() {
        let m = Matrix3::new(0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 1.0);
        let b = Vector3::new(1.0, 2.0, 3.0);
        assert_eq!(solve_3x3(&m, &b, EPS), Err(Error::Singular));
    }

    #[test]
    fn solve_3x3_dependent_rows_are_singular() {
        // Row 2 = 2 * row 1.
        let m = Matrix3::new(1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 1.0, 2.0, 3.0);
        let b = Vector3::new(1.0, 2.0, 3.0);
        assert_eq!(solve_3x3(&m, &b, EPS), Err(Error::Singular));
    }
}
