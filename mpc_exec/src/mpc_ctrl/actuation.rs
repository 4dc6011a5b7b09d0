//! # Actuation normalisation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::{ActuatorState, Params, SolverResult};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Converts solver actuation into the actuator's normalised command range.
#[derive(Debug, Clone)]
pub struct ActuationNormaliser {
    max_steer_rad: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ActuationNormaliser {
    pub fn new(params: &Params) -> Self {
        Self {
            max_steer_rad: params.max_steer_rad,
        }
    }

    /// Normalise the solver's actuation.
    ///
    /// The solver steers positive-left in radians while the actuator steers positive-right in
    /// [-1, 1], so the steering is scaled by the maximum angle and negated. Throttle is passed
    /// through. No clamping is applied, values outside [-1, 1] are sent as they are.
    pub fn normalise(&self, result: &SolverResult) -> ActuatorState {
        ActuatorState {
            steering: -result.steer_rad / self.max_steer_rad,
            throttle: result.throttle,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn result(steer_rad: f64, throttle: f64) -> SolverResult {
        SolverResult {
            steer_rad,
            throttle,
            traj_m: Vec::new(),
        }
    }

    #[test]
    fn test_normalise() {
        let params = Params::default();
        let norm = ActuationNormaliser::new(&params);

        let act = norm.normalise(&result(params.max_steer_rad, 0.7));
        assert_abs_diff_eq!(act.steering, -1.0, epsilon = 1e-12);
        assert_eq!(act.throttle, 0.7);

        let act = norm.normalise(&result(-0.5 * params.max_steer_rad, -0.2));
        assert_abs_diff_eq!(act.steering, 0.5, epsilon = 1e-12);
        assert_eq!(act.throttle, -0.2);
    }

    #[test]
    fn test_no_clamping() {
        let params = Params::default();
        let norm = ActuationNormaliser::new(&params);

        let act = norm.normalise(&result(-2.0 * params.max_steer_rad, 1.5));
        assert_abs_diff_eq!(act.steering, 2.0, epsilon = 1e-12);
        assert_eq!(act.throttle, 1.5);
    }
}
