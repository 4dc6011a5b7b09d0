//! Gradient solver parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the gradient solver.
#[derive(Deserialize, Debug, Clone)]
pub struct Params {

    // ---- HORIZON ----

    /// Number of control steps planned over.
    pub horizon_steps: usize,

    /// Duration of each control step.
    ///
    /// Units: seconds
    pub step_s: f64,

    /// Distance between the front axle and the centre of gravity used in the planning model.
    ///
    /// Units: meters
    pub wheelbase_m: f64,

    /// Speed the plan tries to hold.
    ///
    /// Units: meters/second
    pub ref_speed_ms: f64,

    // ---- BOUNDS ----

    /// Units: radians
    pub max_steer_rad: f64,

    pub min_throttle: f64,

    pub max_throttle: f64,

    // ---- COST WEIGHTS ----

    pub w_cte: f64,
    pub w_head_err: f64,
    pub w_speed: f64,
    pub w_steer: f64,
    pub w_throttle: f64,
    pub w_steer_rate: f64,
    pub w_throttle_rate: f64,

    // ---- DESCENT ----

    /// Maximum number of accepted damped steps before giving up.
    pub max_iters: usize,

    /// Relative cost decrease below which the descent is considered converged.
    pub tolerance: f64,

    /// Norm of the cost gradient over the free controls below which the descent is considered
    /// converged.
    pub grad_tolerance: f64,

    /// Perturbation used for the central difference Jacobian.
    pub fd_step: f64,

    /// Damping the first step of a solve is tried with.
    pub init_damping: f64,

    /// Damping above which no descent step is considered to exist.
    pub max_damping: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            horizon_steps: 10,
            step_s: 0.1,
            wheelbase_m: 2.67,
            ref_speed_ms: 20.0,
            max_steer_rad: 25f64.to_radians(),
            min_throttle: -1.0,
            max_throttle: 1.0,
            w_cte: 2000.0,
            w_head_err: 2000.0,
            w_speed: 1.0,
            w_steer: 5.0,
            w_throttle: 5.0,
            w_steer_rate: 200.0,
            w_throttle_rate: 10.0,
            max_iters: 100,
            tolerance: 1e-6,
            grad_tolerance: 1e-6,
            fd_step: 1e-6,
            init_damping: 1e-3,
            max_damping: 1e12,
        }
    }
}
