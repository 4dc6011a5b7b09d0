//! # Kinematic predictor
//!
//! Projects the vehicle state forward by the actuation latency.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::Serialize;

use comms_if::drive::Telemetry;

use super::Params;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Pose and speed of the vehicle in the world frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VehiclePose {
    /// Position of the vehicle.
    ///
    /// Units: meters
    pub position_m: Vector2<f64>,

    /// Angle to the positive world X axis.
    ///
    /// Units: radians
    pub heading_rad: f64,

    /// Units: meters/second
    pub speed_ms: f64,
}

/// The actuation currently applied by the vehicle, both normalised to [-1, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ActuatorState {
    /// Positive steering turns the vehicle right, i.e. decreases the heading.
    pub steering: f64,

    pub throttle: f64,
}

/// Bicycle model state projection over a fixed latency interval.
#[derive(Debug, Clone)]
pub struct KinematicPredictor {
    latency_s: f64,
    wheelbase_m: f64,
    throttle_accel_mss: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VehiclePose {
    pub fn new(position_m: Vector2<f64>, heading_rad: f64, speed_ms: f64) -> Self {
        Self {
            position_m,
            heading_rad,
            speed_ms,
        }
    }

    /// Extract the pose from a telemetry sample.
    pub fn from_telemetry(tm: &Telemetry) -> Self {
        Self::new(
            Vector2::new(tm.position_m[0], tm.position_m[1]),
            tm.heading_rad,
            tm.speed_ms,
        )
    }
}

impl ActuatorState {
    /// Extract the current actuation from a telemetry sample.
    pub fn from_telemetry(tm: &Telemetry) -> Self {
        Self {
            steering: tm.steering_angle,
            throttle: tm.throttle,
        }
    }
}

impl KinematicPredictor {
    pub fn new(params: &Params) -> Self {
        Self {
            latency_s: params.latency_s,
            wheelbase_m: params.wheelbase_m,
            throttle_accel_mss: params.throttle_accel_mss,
        }
    }

    /// Predict the pose one latency interval into the future, assuming the actuation is held
    /// constant over the interval.
    ///
    /// Negative speeds are not clamped, the model simply runs in reverse.
    pub fn predict(&self, pose: &VehiclePose, act: &ActuatorState) -> VehiclePose {
        let dt = self.latency_s;
        let v = pose.speed_ms;

        let position_m = pose.position_m
            + Vector2::new(pose.heading_rad.cos(), pose.heading_rad.sin()) * v * dt;

        // Positive steering turns right, which is a decrease in heading
        let heading_rad = pose.heading_rad - v / self.wheelbase_m * act.steering * dt;

        let speed_ms = v + act.throttle * self.throttle_accel_mss * dt;

        VehiclePose::new(position_m, heading_rad, speed_ms)
    }
}
