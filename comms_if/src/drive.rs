//! # Drive Messages
//!
//! Telemetry sent by the driving environment once per control cycle, and the steering command
//! sent back in response.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry received from the driving environment.
///
/// All positions are in the world frame.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Telemetry {
    /// The sparse reference path ahead of the vehicle, in path order.
    ///
    /// Units: meters
    pub waypoints_m: Vec<[f64; 2]>,

    /// Position of the vehicle.
    ///
    /// Units: meters
    pub position_m: [f64; 2],

    /// Heading of the vehicle, angle to the positive world X axis.
    ///
    /// Units: radians
    pub heading_rad: f64,

    /// Speed of the vehicle.
    ///
    /// Units: meters/second
    pub speed_ms: f64,

    /// The steering command currently being actuated, normalised to [-1, 1].
    pub steering_angle: f64,

    /// The throttle command currently being actuated, normalised to [-1, 1].
    pub throttle: f64,
}

/// Steering command sent to the driving environment.
///
/// The display trajectories are in the vehicle-local frame at the predicted pose.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SteerCmd {
    /// Steering demand, nominally in [-1, 1]. Positive values steer to the right.
    pub steering_angle: f64,

    /// Throttle demand, negative values brake.
    pub throttle: f64,

    /// Trajectory predicted by the optimizer.
    ///
    /// Units: meters
    pub mpc_traj_m: Vec<[f64; 2]>,

    /// Reference path the optimizer was asked to follow.
    ///
    /// Units: meters
    pub ref_traj_m: Vec<[f64; 2]>,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl SteerCmd {
    /// A command which straightens the wheels and applies full braking.
    pub fn stop() -> Self {
        Self {
            steering_angle: 0.0,
            throttle: -1.0,
            mpc_traj_m: Vec::new(),
            ref_traj_m: Vec::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_telemetry_from_json() {
        let tm: Telemetry = serde_json::from_str(
            r#"{
                "waypoints_m": [[1.0, 1.0], [2.0, 1.0], [3.0, 1.0]],
                "position_m": [0.0, 0.0],
                "heading_rad": 0.0,
                "speed_ms": 10.0,
                "steering_angle": -0.1,
                "throttle": 0.3
            }"#,
        )
        .unwrap();

        assert_eq!(tm.waypoints_m.len(), 3);
        assert_eq!(tm.waypoints_m[2], [3.0, 1.0]);
        assert_eq!(tm.speed_ms, 10.0);
        assert_eq!(tm.steering_angle, -0.1);
    }

    #[test]
    fn test_stop() {
        let cmd = SteerCmd::stop();
        assert_eq!(cmd.steering_angle, 0.0);
        assert_eq!(cmd.throttle, -1.0);
        assert!(cmd.mpc_traj_m.is_empty() && cmd.ref_traj_m.is_empty());
    }
}
