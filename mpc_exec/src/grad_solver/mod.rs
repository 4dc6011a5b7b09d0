//! # Gradient Solver
//!
//! Reference optimizer backend for [`MpcCtrl`](crate::mpc_ctrl::MpcCtrl).
//!
//! The plan is found by single shooting: the horizon's controls are the only decision variables
//! and the vehicle state is rolled out through a kinematic model in the vehicle frame. The cost
//! is a weighted sum of squares, minimised with damped Gauss-Newton (Levenberg-Marquardt) steps
//! built from a central difference Jacobian. Controls are clamped into their bounds after each
//! step, and controls held on a bound are left out of the step.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, trace};
use nalgebra::{DMatrix, DVector};

use crate::mpc_ctrl::{ControlState, ReferenceCurve, Solver, SolverError, NUM_ACTUATION_VALUES};

pub use params::Params;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Residuals for the tracking and actuation terms of one step.
const RESIDUALS_PER_STEP: usize = 5;

/// Residuals for the actuation change between two steps.
const RESIDUALS_PER_RATE: usize = 2;

/// Factor the damping is scaled by after each rejected or accepted step.
const DAMPING_FACTOR: f64 = 10.0;

const MIN_DAMPING: f64 = 1e-9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Bounded damped least squares solver.
pub struct GradSolver {
    params: Params,

    /// Controls `[steer_0, throttle_0, .., steer_N-1, throttle_N-1]` the next solve starts from.
    warm_start: Vec<f64>,
}

/// State of the planning model.
#[derive(Debug, Clone, Copy)]
struct ModelState {
    x_m: f64,
    y_m: f64,
    heading_rad: f64,
    speed_ms: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised while setting up the solver.
#[derive(Debug, thiserror::Error)]
pub enum GradSolverError {
    #[error("Invalid gradient solver parameters: {0}")]
    InvalidParams(&'static str),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl GradSolver {
    pub fn new(params: Params) -> Result<Self, GradSolverError> {
        if params.horizon_steps == 0 {
            return Err(GradSolverError::InvalidParams("horizon_steps must be at least 1"));
        }
        if !(params.step_s > 0.0) {
            return Err(GradSolverError::InvalidParams("step_s must be positive"));
        }
        if !(params.wheelbase_m > 0.0) {
            return Err(GradSolverError::InvalidParams("wheelbase_m must be positive"));
        }
        if !(params.max_steer_rad >= 0.0) || !(params.min_throttle <= params.max_throttle) {
            return Err(GradSolverError::InvalidParams("actuation bounds are empty"));
        }
        let weights = [
            params.w_cte,
            params.w_head_err,
            params.w_speed,
            params.w_steer,
            params.w_throttle,
            params.w_steer_rate,
            params.w_throttle_rate,
        ];
        if weights.iter().any(|w| !(*w >= 0.0) || !w.is_finite()) {
            return Err(GradSolverError::InvalidParams("cost weights must be finite and non-negative"));
        }
        if !(params.fd_step > 0.0)
            || !(params.init_damping > 0.0)
            || !(params.max_damping >= params.init_damping)
        {
            return Err(GradSolverError::InvalidParams(
                "fd_step and damping must be positive",
            ));
        }

        let num_vars = params.horizon_steps * NUM_ACTUATION_VALUES;

        Ok(Self {
            params,
            warm_start: vec![0.0; num_vars],
        })
    }

    /// Drop the warm start so the next solve starts from zero actuation.
    pub fn reset(&mut self) {
        self.warm_start.iter_mut().for_each(|u| *u = 0.0);
    }

    /// Run the damped least squares descent from the warm start, returning the optimal controls.
    fn descend(
        &self,
        state: &ControlState,
        curve: &ReferenceCurve,
    ) -> Result<Vec<f64>, SolverError> {
        let num_vars = self.warm_start.len();

        let mut controls = self.warm_start.clone();
        self.project(&mut controls);

        let mut res = self.residuals(state, curve, &controls);
        let mut cost = res.norm_squared();
        if !cost.is_finite() {
            return Err(SolverError::NonFiniteCost);
        }

        let mut damping = self.params.init_damping;
        let mut candidate = vec![0.0; num_vars];

        for iter in 0..self.params.max_iters {
            let mut jac = self.jacobian(state, curve, &controls, res.len());

            // Half the cost gradient
            let grad = jac.tr_mul(&res);
            if grad.iter().any(|g| !g.is_finite()) {
                return Err(SolverError::NonFiniteCost);
            }

            // Controls held at a bound by the gradient take no part in the step
            let active = self.active_bounds(&controls, grad.as_slice());
            for (j, _) in active.iter().enumerate().filter(|(_, a)| **a) {
                jac.column_mut(j).fill(0.0);
            }

            let free_grad = jac.tr_mul(&res);
            let grad_norm = 2.0 * free_grad.norm();
            if grad_norm < self.params.grad_tolerance {
                debug!("Stationary after {} iterations, cost {:.4e}", iter, cost);
                return Ok(controls);
            }

            let jtj = jac.tr_mul(&jac);

            // Raise the damping until a step decreases the cost
            let mut accepted = None;
            while damping <= self.params.max_damping {
                let lhs = &jtj + DMatrix::<f64>::identity(num_vars, num_vars) * damping;

                let step = match lhs.cholesky() {
                    Some(chol) => chol.solve(&free_grad),
                    None => {
                        damping *= DAMPING_FACTOR;
                        continue;
                    }
                };

                for ((c, u), s) in candidate.iter_mut().zip(controls.iter()).zip(step.iter()) {
                    *c = u - s;
                }
                self.project(&mut candidate);

                let c_res = self.residuals(state, curve, &candidate);
                let c_cost = c_res.norm_squared();
                if c_cost < cost {
                    accepted = Some((c_res, c_cost));
                    damping = (damping / DAMPING_FACTOR).max(MIN_DAMPING);
                    break;
                }
                damping *= DAMPING_FACTOR;
            }

            let (new_res, new_cost) = match accepted {
                Some(a) => a,
                None => {
                    debug!("No descent step after {} iterations, cost {:.4e}", iter, cost);
                    return Ok(controls);
                }
            };

            let rel_decrease = (cost - new_cost) / cost.max(f64::EPSILON);
            std::mem::swap(&mut controls, &mut candidate);
            res = new_res;
            cost = new_cost;

            trace!("iter {}: cost {:.4e}, damping {:.3e}", iter, cost, damping);

            if rel_decrease < self.params.tolerance {
                debug!("Converged after {} iterations, cost {:.4e}", iter + 1, cost);
                return Ok(controls);
            }
        }

        Err(SolverError::NotConverged {
            iters: self.params.max_iters,
        })
    }

    /// Weighted residuals of applying `controls` from `state`.
    ///
    /// The cost is the squared norm of this vector. Per step it holds the cross track error,
    /// heading error, speed error and actuation, followed by the actuation change from the
    /// previous step.
    fn residuals(
        &self,
        state: &ControlState,
        curve: &ReferenceCurve,
        controls: &[f64],
    ) -> DVector<f64> {
        let p = &self.params;
        let n = controls.len() / NUM_ACTUATION_VALUES;
        let mut res = DVector::zeros(num_residuals(n));
        let mut model = ModelState::from(state);
        let mut prev: Option<(f64, f64)> = None;
        let mut i = 0;

        for u in controls.chunks_exact(NUM_ACTUATION_VALUES) {
            let (steer, throttle) = (u[0], u[1]);
            model = model.step(steer, throttle, p.wheelbase_m, p.step_s);

            let cte = curve.eval(model.x_m) - model.y_m;
            let head_err = model.heading_rad - curve.slope(model.x_m).atan();
            let speed_err = model.speed_ms - p.ref_speed_ms;

            res[i] = p.w_cte.sqrt() * cte;
            res[i + 1] = p.w_head_err.sqrt() * head_err;
            res[i + 2] = p.w_speed.sqrt() * speed_err;
            res[i + 3] = p.w_steer.sqrt() * steer;
            res[i + 4] = p.w_throttle.sqrt() * throttle;
            i += RESIDUALS_PER_STEP;

            if let Some((prev_steer, prev_throttle)) = prev {
                res[i] = p.w_steer_rate.sqrt() * (steer - prev_steer);
                res[i + 1] = p.w_throttle_rate.sqrt() * (throttle - prev_throttle);
                i += RESIDUALS_PER_RATE;
            }
            prev = Some((steer, throttle));
        }

        res
    }

    /// Central difference Jacobian of the residuals.
    fn jacobian(
        &self,
        state: &ControlState,
        curve: &ReferenceCurve,
        controls: &[f64],
        num_res: usize,
    ) -> DMatrix<f64> {
        let h = self.params.fd_step;
        let mut perturbed = controls.to_vec();
        let mut jac = DMatrix::zeros(num_res, controls.len());

        for j in 0..controls.len() {
            perturbed[j] = controls[j] + h;
            let res_plus = self.residuals(state, curve, &perturbed);
            perturbed[j] = controls[j] - h;
            let res_minus = self.residuals(state, curve, &perturbed);
            perturbed[j] = controls[j];

            jac.set_column(j, &((res_plus - res_minus) / (2.0 * h)));
        }

        jac
    }

    /// Clamp the controls into their bounds.
    fn project(&self, controls: &mut [f64]) {
        for u in controls.chunks_exact_mut(NUM_ACTUATION_VALUES) {
            u[0] = u[0].clamp(-self.params.max_steer_rad, self.params.max_steer_rad);
            u[1] = u[1].clamp(self.params.min_throttle, self.params.max_throttle);
        }
    }

    /// Flags the controls sitting on a bound which the gradient pushes out of.
    fn active_bounds(&self, controls: &[f64], grad: &[f64]) -> Vec<bool> {
        let bounds = [
            (-self.params.max_steer_rad, self.params.max_steer_rad),
            (self.params.min_throttle, self.params.max_throttle),
        ];

        controls
            .iter()
            .zip(grad.iter())
            .enumerate()
            .map(|(i, (value, g))| {
                let (min, max) = bounds[i % NUM_ACTUATION_VALUES];
                (*value <= min && *g > 0.0) || (*value >= max && *g < 0.0)
            })
            .collect()
    }

    /// Flat output `[steer, throttle, x_1, .., x_N, y_1, .., y_N]` for the controls.
    fn flat_output(&self, state: &ControlState, controls: &[f64]) -> Vec<f64> {
        let n = self.params.horizon_steps;
        let mut output = vec![0.0; NUM_ACTUATION_VALUES + 2 * n];
        output[..NUM_ACTUATION_VALUES].copy_from_slice(&controls[..NUM_ACTUATION_VALUES]);

        let mut model = ModelState::from(state);
        for (i, u) in controls.chunks_exact(NUM_ACTUATION_VALUES).enumerate() {
            model = model.step(u[0], u[1], self.params.wheelbase_m, self.params.step_s);
            output[NUM_ACTUATION_VALUES + i] = model.x_m;
            output[NUM_ACTUATION_VALUES + n + i] = model.y_m;
        }

        output
    }
}

impl Solver for GradSolver {
    fn solve(
        &mut self,
        state: &ControlState,
        curve: &ReferenceCurve,
    ) -> Result<Vec<f64>, SolverError> {
        if state.to_array().iter().any(|v| !v.is_finite())
            || curve.coeffs().iter().any(|c| !c.is_finite())
        {
            return Err(SolverError::InvalidState);
        }

        let controls = match self.descend(state, curve) {
            Ok(c) => c,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };

        let output = self.flat_output(state, &controls);
        self.warm_start = shift_controls(&controls);

        Ok(output)
    }
}

impl ModelState {
    /// Advance the model by one step, positive steering increases the heading.
    fn step(self, steer_rad: f64, throttle: f64, wheelbase_m: f64, dt_s: f64) -> Self {
        Self {
            x_m: self.x_m + self.speed_ms * self.heading_rad.cos() * dt_s,
            y_m: self.y_m + self.speed_ms * self.heading_rad.sin() * dt_s,
            heading_rad: self.heading_rad + self.speed_ms / wheelbase_m * steer_rad * dt_s,
            speed_ms: self.speed_ms + throttle * dt_s,
        }
    }
}

impl From<&ControlState> for ModelState {
    fn from(state: &ControlState) -> Self {
        Self {
            x_m: state.x_m,
            y_m: state.y_m,
            heading_rad: state.heading_rad,
            speed_ms: state.speed_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn num_residuals(num_steps: usize) -> usize {
    num_steps * RESIDUALS_PER_STEP + num_steps.saturating_sub(1) * RESIDUALS_PER_RATE
}

/// Shift the controls one step earlier, repeating the last step at the end.
fn shift_controls(controls: &[f64]) -> Vec<f64> {
    let mut shifted = controls[NUM_ACTUATION_VALUES.min(controls.len())..].to_vec();
    let tail_start = controls.len().saturating_sub(NUM_ACTUATION_VALUES);
    shifted.extend_from_slice(&controls[tail_start..]);
    shifted
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mpc_ctrl::{SolverResult, TrackError};
    use approx::assert_abs_diff_eq;

    fn state(speed_ms: f64, curve: &ReferenceCurve) -> ControlState {
        ControlState::at_origin(speed_ms, &TrackError::from_curve(curve))
    }

    fn params() -> Params {
        util::params::parse(include_str!("../../../params/grad_solver.toml")).unwrap()
    }

    #[test]
    fn test_straight_road() {
        let mut solver = GradSolver::new(params()).unwrap();
        let curve = ReferenceCurve::from_coeffs(vec![0.0, 0.0, 0.0, 0.0]);

        let output = solver.solve(&state(20.0, &curve), &curve).unwrap();
        assert_eq!(output.len(), NUM_ACTUATION_VALUES + 2 * 10);

        let result = SolverResult::from_flat(&output).unwrap();
        assert_abs_diff_eq!(result.steer_rad, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(result.throttle, 0.0, epsilon = 1e-3);

        // Trajectory runs straight along X at 20 m/s
        for (i, p) in result.traj_m.iter().enumerate() {
            assert_abs_diff_eq!(p[0], 2.0 * (i + 1) as f64, epsilon = 1e-2);
            assert_abs_diff_eq!(p[1], 0.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_offset_line() {
        let mut solver = GradSolver::new(params()).unwrap();

        // Reference is 1 m to the left
        let curve = ReferenceCurve::from_coeffs(vec![1.0, 0.0]);

        let output = solver.solve(&state(10.0, &curve), &curve).unwrap();
        let result = SolverResult::from_flat(&output).unwrap();

        assert!(result.steer_rad > 0.0);
        assert!(result.traj_m.last().unwrap()[1] > 0.0);
        assert!(result.steer_rad <= 25f64.to_radians());
        assert!(result.throttle >= -1.0 && result.throttle <= 1.0);
    }

    #[test]
    fn test_projection() {
        let solver = GradSolver::new(Params::default()).unwrap();
        let max_steer = Params::default().max_steer_rad;

        let mut controls = vec![1.0, 2.0, -1.0, -2.0, 0.1, 0.5];
        controls.resize(20, 0.0);
        solver.project(&mut controls);
        assert_eq!(&controls[..6], &[max_steer, 1.0, -max_steer, -1.0, 0.1, 0.5]);

        // Only bounds the gradient pushes out of are active
        let mut grad = vec![-1.0, -1.0, 1.0, 1.0, 1.0, -1.0];
        grad.resize(20, 0.0);
        let active = solver.active_bounds(&controls, &grad);
        assert_eq!(&active[..6], &[true, true, true, true, false, false]);

        let mut grad = vec![1.0, 1.0, -1.0, -1.0];
        grad.resize(20, 0.0);
        let active = solver.active_bounds(&controls, &grad);
        assert_eq!(&active[..4], &[false, false, false, false]);
    }

    #[test]
    fn test_invalid_state() {
        let mut solver = GradSolver::new(Params::default()).unwrap();
        let curve = ReferenceCurve::from_coeffs(vec![0.0, 0.0]);

        let mut bad = state(10.0, &curve);
        bad.speed_ms = f64::NAN;
        assert!(matches!(solver.solve(&bad, &curve), Err(SolverError::InvalidState)));

        let bad_curve = ReferenceCurve::from_coeffs(vec![f64::INFINITY, 0.0]);
        assert!(matches!(
            solver.solve(&state(10.0, &curve), &bad_curve),
            Err(SolverError::InvalidState)
        ));
    }

    #[test]
    fn test_not_converged() {
        let mut solver = GradSolver::new(Params {
            max_iters: 1,
            tolerance: 0.0,
            grad_tolerance: 0.0,
            ..Params::default()
        })
        .unwrap();
        let curve = ReferenceCurve::from_coeffs(vec![1.0, 0.0]);

        assert!(matches!(
            solver.solve(&state(10.0, &curve), &curve),
            Err(SolverError::NotConverged { iters: 1 })
        ));
    }

    #[test]
    fn test_shift_controls() {
        assert_eq!(
            shift_controls(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            vec![3.0, 4.0, 5.0, 6.0, 5.0, 6.0]
        );
    }

    #[test]
    fn test_descent_reduces_cost() {
        let solver = GradSolver::new(params()).unwrap();
        let curve = ReferenceCurve::from_coeffs(vec![1.0, 0.1, 0.002]);
        let start = state(15.0, &curve);

        let zero_cost = solver
            .residuals(&start, &curve, &solver.warm_start)
            .norm_squared();
        let controls = solver.descend(&start, &curve).unwrap();
        let cost = solver.residuals(&start, &curve, &controls).norm_squared();

        assert!(cost < 0.5 * zero_cost);
        for u in controls.chunks_exact(NUM_ACTUATION_VALUES) {
            assert!(u[0].abs() <= solver.params.max_steer_rad);
            assert!(u[1] >= -1.0 && u[1] <= 1.0);
        }

        // Warm starting from the optimum stays there
        let mut warm = GradSolver::new(params()).unwrap();
        warm.warm_start = controls;
        let again = warm.descend(&start, &curve).unwrap();
        let again_cost = warm.residuals(&start, &curve, &again).norm_squared();
        assert_abs_diff_eq!(again_cost, cost, epsilon = 1e-4 * cost.max(1.0));
    }

    #[test]
    fn test_closed_loop_shipped_params() {
        use crate::mpc_ctrl::{self, MpcCtrl};
        use crate::sim::{self, SimDriver};
        use util::module::State;

        let ctrl_params: mpc_ctrl::Params =
            util::params::parse(include_str!("../../../params/mpc_ctrl.toml")).unwrap();
        let sim_params: sim::Params =
            util::params::parse(include_str!("../../../params/sim.toml")).unwrap();

        let solver = GradSolver::new(params()).unwrap();
        let mut ctrl = MpcCtrl::new(ctrl_params, Box::new(solver))
            .unwrap()
            .with_pacer(|_| ());
        let mut sim = SimDriver::new(sim_params).unwrap();
        let mut tm = sim.telemetry();

        // Over a lap of the track, every cycle must plan
        for cycle in 0..300 {
            let (cmd, _) = match ctrl.proc(&tm) {
                Ok(o) => o,
                Err(e) => panic!("No command on cycle {}: {}", cycle, e),
            };
            let (next_tm, rpt) = sim.proc(&cmd).unwrap();
            assert!(
                rpt.dist_to_track_m < 5.0,
                "{} m off the track on cycle {}",
                rpt.dist_to_track_m,
                cycle
            );
            tm = next_tm;
        }
    }

    #[test]
    fn test_invalid_params() {
        assert!(GradSolver::new(Params {
            horizon_steps: 0,
            ..Params::default()
        })
        .is_err());
        assert!(GradSolver::new(Params {
            min_throttle: 1.0,
            max_throttle: -1.0,
            ..Params::default()
        })
        .is_err());
        assert!(GradSolver::new(Params {
            w_cte: -1.0,
            ..Params::default()
        })
        .is_err());
        assert!(GradSolver::new(Params {
            max_damping: 1e-6,
            ..Params::default()
        })
        .is_err());
    }
}
