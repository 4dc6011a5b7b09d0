//! # Track error extraction

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

use super::ReferenceCurve;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Errors between the vehicle and the reference curve, evaluated at the vehicle frame origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackError {
    /// Cross track error, the value of the curve at the vehicle position. Positive when the
    /// curve is to the left of the vehicle.
    ///
    /// Units: meters
    pub cte_m: f64,

    /// Heading error, the negated angle of the curve's tangent at the vehicle position.
    ///
    /// Units: radians
    pub head_err_rad: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrackError {
    /// Calculate the track errors from a curve fitted in the vehicle frame.
    ///
    /// The vehicle is at the origin with zero heading, so the cross track error is the curve's
    /// constant term and the heading error is `-atan(c1)`.
    pub fn from_curve(curve: &ReferenceCurve) -> Self {
        Self {
            cte_m: curve.eval(0.0),
            head_err_rad: -curve.slope(0.0).atan(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_from_curve() {
        let curve = ReferenceCurve::from_coeffs(vec![-1.5, 1.0, 0.3, 0.02]);
        let err = TrackError::from_curve(&curve);

        assert_eq!(err.cte_m, curve.eval(0.0));
        assert_eq!(err.cte_m, -1.5);
        assert_abs_diff_eq!(err.head_err_rad, -std::f64::consts::FRAC_PI_4, epsilon = 1e-12);
    }

    #[test]
    fn test_flat_curve() {
        let err = TrackError::from_curve(&ReferenceCurve::from_coeffs(vec![0.0, 0.0]));
        assert_eq!(err.cte_m, 0.0);
        assert_eq!(err.head_err_rad, 0.0);
    }
}
