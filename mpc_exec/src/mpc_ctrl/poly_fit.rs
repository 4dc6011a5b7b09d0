//! # Reference curve fitting
//!
//! Least squares polynomial fit through the vehicle frame waypoints, solved via a Householder QR
//! factorisation of the Vandermonde matrix.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector, Vector2};
use serde::Serialize;

use util::maths::{poly_deriv_eval, poly_eval};

use super::MpcCtrlError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Iteration limit of the SVD used for ill-conditioned fits.
const SVD_MAX_ITERS: usize = 1000;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A polynomial reference curve `y = f(x)` in the vehicle frame it was fitted in.
///
/// Coefficients are ordered lowest power first. A curve is only meaningful in the frame of the
/// cycle that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceCurve {
    coeffs: Vec<f64>,
}

/// The output of a fit.
#[derive(Debug, Clone)]
pub struct PolyFit {
    pub curve: ReferenceCurve,

    /// True if the design matrix was close to rank deficient, for example because of
    /// duplicated X values. The coefficients are still usable but may be inaccurate.
    pub ill_conditioned: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ReferenceCurve {
    pub fn from_coeffs(coeffs: Vec<f64>) -> Self {
        Self { coeffs }
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    /// Order of the polynomial.
    pub fn order(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    /// Value of the curve at `x`.
    pub fn eval(&self, x: f64) -> f64 {
        poly_eval(&self.coeffs, x)
    }

    /// Slope (dy/dx) of the curve at `x`.
    pub fn slope(&self, x: f64) -> f64 {
        poly_deriv_eval(&self.coeffs, x)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Fit a polynomial of the given order through the points.
///
/// At least `order + 1` points are required. Points with repeated X values are accepted, in
/// which case the fit is flagged as ill-conditioned and solved with an SVD instead so that a
/// result is always returned.
pub fn poly_fit(
    points_m: &[Vector2<f64>],
    order: usize,
    ill_cond_ratio: f64,
) -> Result<PolyFit, MpcCtrlError> {
    if order < 1 {
        return Err(MpcCtrlError::InvalidPolyOrder(order));
    }

    let num_points = points_m.len();
    let num_coeffs = order + 1;

    if num_points < num_coeffs {
        return Err(MpcCtrlError::UnderdeterminedFit { num_points, order });
    }

    // Vandermonde design matrix, column j holds x^j
    let mut a = DMatrix::<f64>::zeros(num_points, num_coeffs);
    for (i, p) in points_m.iter().enumerate() {
        a[(i, 0)] = 1.0;
        for j in 1..num_coeffs {
            a[(i, j)] = a[(i, j - 1)] * p[0];
        }
    }
    let b = DVector::from_iterator(num_points, points_m.iter().map(|p| p[1]));

    // Non-finite waypoints, or powers of X which overflow, cannot be factorised
    if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
        return Err(MpcCtrlError::NonFiniteFit { num_points, order });
    }

    let qr = a.clone().qr();
    let r = qr.r();

    // Estimate conditioning from the spread of R's diagonal
    let (diag_min, diag_max) = r
        .diagonal()
        .iter()
        .fold((f64::INFINITY, 0f64), |(lo, hi), d| (lo.min(d.abs()), hi.max(d.abs())));

    // Written so that NaN diagonals also count as ill-conditioned
    let ill_conditioned = !(diag_min > diag_max * ill_cond_ratio);

    let qr_solution = if ill_conditioned {
        None
    } else {
        let qtb = qr.q().transpose() * &b;
        r.solve_upper_triangular(&qtb)
            .filter(|c| c.iter().all(|v| v.is_finite()))
    };

    let (coeffs, ill_conditioned) = match qr_solution {
        Some(c) => (c, false),
        None => {
            let c = svd_lstsq(a, &b, (diag_max * ill_cond_ratio).max(0.0))
                .ok_or(MpcCtrlError::NonFiniteFit { num_points, order })?;
            (c, true)
        }
    };

    Ok(PolyFit {
        curve: ReferenceCurve::from_coeffs(coeffs.iter().cloned().collect()),
        ill_conditioned,
    })
}

/// Minimum norm least squares solution, treating singular values below `eps` as zero.
///
/// Returns `None` if the decomposition does not converge within `SVD_MAX_ITERS` iterations.
fn svd_lstsq(a: DMatrix<f64>, b: &DVector<f64>, eps: f64) -> Option<DVector<f64>> {
    a.try_svd(true, true, f64::EPSILON, SVD_MAX_ITERS)?
        .solve(b, eps)
        .ok()
        .filter(|c| c.iter().all(|v| v.is_finite()))
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn sample(coeffs: &[f64], xs: &[f64]) -> Vec<Vector2<f64>> {
        xs.iter()
            .map(|&x| Vector2::new(x, poly_eval(coeffs, x)))
            .collect()
    }

    #[test]
    fn test_exact_fit() {
        let xs = [0.5, 1.5, 3.0, 4.0, 6.0, 8.0];

        for coeffs in &[
            vec![1.0, -0.5],
            vec![-2.0, 0.3, 0.01],
            vec![0.8, -0.12, 0.004, -0.0002],
        ] {
            let order = coeffs.len() - 1;
            let fit = poly_fit(&sample(coeffs, &xs), order, 1e-10).unwrap();

            assert!(!fit.ill_conditioned);
            assert_eq!(fit.curve.order(), order);
            for (c, e) in fit.curve.coeffs().iter().zip(coeffs.iter()) {
                assert_relative_eq!(*c, *e, max_relative = 1e-9, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_least_squares() {
        // Symmetric noise about y = 2, the best line is flat
        let pts = vec![
            Vector2::new(0.0, 2.5),
            Vector2::new(1.0, 1.5),
            Vector2::new(2.0, 1.5),
            Vector2::new(3.0, 2.5),
        ];

        let fit = poly_fit(&pts, 1, 1e-10).unwrap();
        assert_abs_diff_eq!(fit.curve.coeffs()[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.curve.coeffs()[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_underdetermined() {
        for order in 1..6 {
            let pts = sample(&[1.0], &(0..order).map(|i| i as f64).collect::<Vec<_>>());
            match poly_fit(&pts, order, 1e-10) {
                Err(MpcCtrlError::UnderdeterminedFit { num_points, order: o }) => {
                    assert_eq!(num_points, order);
                    assert_eq!(o, order);
                }
                r => panic!("Expected UnderdeterminedFit, got {:?}", r),
            }
        }
    }

    #[test]
    fn test_invalid_order() {
        let pts = sample(&[1.0], &[0.0, 1.0]);
        assert!(matches!(
            poly_fit(&pts, 0, 1e-10),
            Err(MpcCtrlError::InvalidPolyOrder(0))
        ));
    }

    #[test]
    fn test_duplicate_x() {
        // All points share an X value, so only the value at x = 1 is determined
        let pts = vec![
            Vector2::new(1.0, 0.0),
            Vector2::new(1.0, 1.0),
            Vector2::new(1.0, 2.0),
        ];

        let fit = poly_fit(&pts, 1, 1e-10).unwrap();

        assert!(fit.ill_conditioned);
        assert!(fit.curve.coeffs().iter().all(|c| c.is_finite()));
        assert_abs_diff_eq!(fit.curve.eval(1.0), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_non_finite_points() {
        // Finite X values whose cubes overflow
        let huge: Vec<_> = (1..=4)
            .map(|i| Vector2::new(i as f64 * 1e120, i as f64 - 1.0))
            .collect();
        assert!(matches!(
            poly_fit(&huge, 3, 1e-10),
            Err(MpcCtrlError::NonFiniteFit { num_points: 4, order: 3 })
        ));

        let mut pts = sample(&[1.0, 0.5], &[0.0, 1.0, 2.0]);
        pts[1][0] = f64::NAN;
        assert!(matches!(
            poly_fit(&pts, 1, 1e-10),
            Err(MpcCtrlError::NonFiniteFit { .. })
        ));

        let mut pts = sample(&[1.0, 0.5], &[0.0, 1.0, 2.0]);
        pts[2][1] = f64::INFINITY;
        assert!(matches!(
            poly_fit(&pts, 1, 1e-10),
            Err(MpcCtrlError::NonFiniteFit { .. })
        ));
    }

    #[test]
    fn test_curve_eval() {
        let curve = ReferenceCurve::from_coeffs(vec![1.0, 2.0, 3.0]);
        assert_eq!(curve.eval(0.0), 1.0);
        assert_eq!(curve.slope(0.0), 2.0);
        assert_eq!(curve.eval(1.0), 6.0);
        assert_eq!(curve.slope(1.0), 8.0);
    }
}
