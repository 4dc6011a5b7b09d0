//! Simulation parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the closed-loop simulation.
#[derive(Deserialize, Debug, Clone)]
pub struct Params {

    // ---- TIMING ----

    /// Simulated time between two telemetry samples. A command is applied for one full period,
    /// starting from the sample after the one it was computed from.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Number of integration substeps per cycle.
    pub num_substeps: usize,

    // ---- VEHICLE ----

    /// Units: meters
    pub wheelbase_m: f64,

    /// Steering angle corresponding to a normalised steering of 1.
    ///
    /// Units: radians
    pub max_steer_rad: f64,

    /// Acceleration produced by full throttle.
    ///
    /// Units: meters/second^2
    pub throttle_accel_mss: f64,

    /// Units: meters/second
    pub initial_speed_ms: f64,

    // ---- TRACK ----

    /// Semi axis of the elliptical track along world X.
    ///
    /// Units: meters
    pub track_semi_axis_x_m: f64,

    /// Semi axis of the elliptical track along world Y.
    ///
    /// Units: meters
    pub track_semi_axis_y_m: f64,

    /// Number of points the track is made of.
    pub track_num_points: usize,

    /// Number of track points sent in each telemetry sample.
    pub num_waypoints: usize,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            cycle_period_s: 0.1,
            num_substeps: 10,
            wheelbase_m: 2.67,
            max_steer_rad: 25f64.to_radians(),
            throttle_accel_mss: 9.81,
            initial_speed_ms: 5.0,
            track_semi_axis_x_m: 100.0,
            track_semi_axis_y_m: 60.0,
            track_num_points: 200,
            num_waypoints: 6,
        }
    }
}
