//! # Vehicle frame transform
//!
//! The vehicle frame (VF) is centred on the predicted vehicle position with its X axis along the
//! predicted heading. Waypoints are moved from the world frame (WF) into the VF before fitting.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Rotation2, Vector2};

use super::VehiclePose;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The transform from the world frame into a vehicle frame.
#[derive(Debug, Clone)]
pub struct VehicleFrame {
    /// Position of the frame origin in the world frame.
    origin_m_wf: Vector2<f64>,

    /// Heading of the frame X axis in the world frame.
    heading_rad_wf: f64,

    /// Rotation taking world-aligned vectors into the vehicle frame, i.e. by `-heading`.
    rot_wf_to_vf: Rotation2<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VehicleFrame {
    /// Build the vehicle frame at the given pose.
    pub fn at(pose: &VehiclePose) -> Self {
        Self {
            origin_m_wf: pose.position_m,
            heading_rad_wf: pose.heading_rad,
            rot_wf_to_vf: Rotation2::new(-pose.heading_rad),
        }
    }

    /// Transform a world frame point into the vehicle frame.
    pub fn point_to_vf(&self, point_m_wf: &Vector2<f64>) -> Vector2<f64> {
        self.rot_wf_to_vf * (point_m_wf - self.origin_m_wf)
    }

    /// Transform a world frame heading into the vehicle frame.
    pub fn heading_to_vf(&self, heading_rad_wf: f64) -> f64 {
        heading_rad_wf - self.heading_rad_wf
    }

    /// Transform a sequence of world frame points, preserving their order.
    pub fn points_to_vf(&self, points_m_wf: &[[f64; 2]]) -> Vec<Vector2<f64>> {
        points_m_wf
            .iter()
            .map(|p| self.point_to_vf(&Vector2::new(p[0], p[1])))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_pose_maps_to_origin() {
        for &(x, y, h) in &[
            (0.0, 0.0, 0.0),
            (12.5, -3.0, 0.7),
            (-100.0, 42.0, -2.9),
            (3.0, 3.0, 4.0 * PI),
        ] {
            let pose = VehiclePose::new(Vector2::new(x, y), h, 5.0);
            let frame = VehicleFrame::at(&pose);

            let origin = frame.point_to_vf(&pose.position_m);
            assert_abs_diff_eq!(origin[0], 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(origin[1], 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(frame.heading_to_vf(pose.heading_rad), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rotation_sense() {
        // Vehicle facing north, a point due north should be straight ahead and a point due east
        // should be on the right (negative Y).
        let frame = VehicleFrame::at(&VehiclePose::new(Vector2::new(1.0, 1.0), FRAC_PI_2, 0.0));

        let ahead = frame.point_to_vf(&Vector2::new(1.0, 3.0));
        assert_abs_diff_eq!(ahead[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ahead[1], 0.0, epsilon = 1e-12);

        let right = frame.point_to_vf(&Vector2::new(2.0, 1.0));
        assert_abs_diff_eq!(right[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(right[1], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_points_to_vf_preserves_order() {
        let frame = VehicleFrame::at(&VehiclePose::new(Vector2::new(1.0, 0.0), 0.0, 0.0));

        let pts = frame.points_to_vf(&[[1.0, 1.0], [3.0, 1.0], [2.0, 1.0]]);

        let xs: Vec<f64> = pts.iter().map(|p| p[0]).collect();
        assert_eq!(xs, vec![0.0, 2.0, 1.0]);
        assert!(pts.iter().all(|p| p[1] == 1.0));
    }
}
