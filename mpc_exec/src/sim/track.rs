//! # Track
//!
//! The closed loop of points the simulated vehicle drives around.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::Serialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A closed track, the last point connects back to the first.
#[derive(Clone, Serialize, Debug)]
pub struct Track {
    points_m: Vec<Vector2<f64>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Track {
    /// An ellipse centred on the origin, traversed anticlockwise starting from `(semi_x, 0)`.
    pub fn ellipse(semi_axis_x_m: f64, semi_axis_y_m: f64, num_points: usize) -> Self {
        let points_m = (0..num_points)
            .map(|i| {
                let t = std::f64::consts::TAU * i as f64 / num_points as f64;
                Vector2::new(semi_axis_x_m * t.cos(), semi_axis_y_m * t.sin())
            })
            .collect();

        Self { points_m }
    }

    pub fn points_m(&self) -> &[Vector2<f64>] {
        &self.points_m
    }

    pub fn get_num_points(&self) -> usize {
        self.points_m.len()
    }

    /// Heading of the segment leaving the point at `index`.
    pub fn heading_at(&self, index: usize) -> f64 {
        let n = self.points_m.len();
        let diff = self.points_m[(index + 1) % n] - self.points_m[index % n];
        diff[1].atan2(diff[0])
    }

    /// Index of the track point closest to `position_m`.
    pub fn nearest_index(&self, position_m: &Vector2<f64>) -> usize {
        self.points_m
            .iter()
            .enumerate()
            .map(|(i, p)| (i, (p - position_m).norm_squared()))
            .fold((0, f64::INFINITY), |best, (i, d)| if d < best.1 { (i, d) } else { best })
            .0
    }

    /// Index of the first track point in front of the vehicle.
    ///
    /// This is the nearest point, or the one after it if the nearest point is level with or
    /// behind the vehicle.
    pub fn index_ahead(&self, position_m: &Vector2<f64>, heading_rad: f64) -> usize {
        let nearest = self.nearest_index(position_m);
        let forward = Vector2::new(heading_rad.cos(), heading_rad.sin());

        if (self.points_m[nearest] - position_m).dot(&forward) > 0.0 {
            nearest
        } else {
            (nearest + 1) % self.points_m.len()
        }
    }

    /// The `num_points` points starting at `start_index`, wrapping around the loop.
    pub fn points_from(&self, start_index: usize, num_points: usize) -> Vec<[f64; 2]> {
        let n = self.points_m.len();
        (0..num_points)
            .map(|i| {
                let p = self.points_m[(start_index + i) % n];
                [p[0], p[1]]
            })
            .collect()
    }

    /// Distance from `position_m` to the track line.
    pub fn dist_to(&self, position_m: &Vector2<f64>) -> f64 {
        let n = self.points_m.len();
        (0..n)
            .map(|i| dist_to_segment(position_m, &self.points_m[i], &self.points_m[(i + 1) % n]))
            .fold(f64::INFINITY, f64::min)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn dist_to_segment(point: &Vector2<f64>, start: &Vector2<f64>, end: &Vector2<f64>) -> f64 {
    let seg = end - start;
    let len_sq = seg.norm_squared();
    if len_sq == 0.0 {
        return (point - start).norm();
    }

    let t = ((point - start).dot(&seg) / len_sq).clamp(0.0, 1.0);
    (point - (start + seg * t)).norm()
}
