//! MPC control parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for MPC control.
///
/// These are read once at initialisation and are never modified afterwards.
#[derive(Deserialize, Debug, Clone)]
pub struct Params {

    // ---- LATENCY COMPENSATION ----

    /// The interval between telemetry being sampled and the resulting command taking effect.
    ///
    /// Units: seconds
    pub latency_s: f64,

    /// Distance between the front axle and the centre of gravity.
    ///
    /// Units: meters
    pub wheelbase_m: f64,

    /// Acceleration produced by one unit of throttle.
    ///
    /// Units: meters/second^2
    pub throttle_accel_mss: f64,

    // ---- REFERENCE FITTING ----

    /// Order of the reference polynomial. Must be at least 1.
    pub poly_order: usize,

    /// Ratio between the smallest and largest diagonal entries of the fit's R factor below
    /// which the fit is reported as ill-conditioned.
    pub ill_cond_ratio: f64,

    /// Number of reference curve samples to output for display. If zero the local waypoints
    /// are output instead.
    pub ref_curve_num_samples: usize,

    /// Separation of reference curve samples along the local X axis.
    ///
    /// Units: meters
    pub ref_curve_sample_sep_m: f64,

    // ---- ACTUATION ----

    /// Maximum steering angle the actuator can command, which maps to a normalised demand of 1.
    ///
    /// Units: radians
    pub max_steer_rad: f64,

    /// Delay applied after solving, before the command is released. Models the real actuation
    /// delay when driving a simulation.
    ///
    /// Units: seconds
    pub actuation_delay_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            latency_s: 0.1,
            wheelbase_m: 2.67,
            throttle_accel_mss: 9.81,
            poly_order: 3,
            ill_cond_ratio: 1e-10,
            ref_curve_num_samples: 25,
            ref_curve_sample_sep_m: 2.5,
            max_steer_rad: 25f64.to_radians(),
            actuation_delay_s: 0.1,
        }
    }
}
