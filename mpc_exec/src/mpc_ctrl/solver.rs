//! # Solver interface
//!
//! The optimizer is an external collaborator. It is given the vehicle state in the vehicle frame
//! and the reference curve, and returns a flat vector laid out as
//!
//! ```text
//! [steer_rad, throttle, x_1, .., x_N, y_1, .., y_N]
//! ```
//!
//! where `(x_i, y_i)` is the predicted trajectory in the same vehicle frame. This layout is
//! shared with every solver backend and must not change on one side only.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;
use nalgebra::Vector2;
use serde::Serialize;

use super::{MpcCtrlError, ReferenceCurve, TrackError};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of actuation values at the start of the solver output.
pub const NUM_ACTUATION_VALUES: usize = 2;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// An optimizer which can plan actuation along a reference curve.
///
/// Implementations may keep internal state between calls (for example to warm start from the
/// previous solution), but this is opaque to MpcCtrl.
pub trait Solver {
    /// Solve for the optimal actuation from `state` along `curve`.
    ///
    /// The output must follow the layout described in the module documentation.
    fn solve(
        &mut self,
        state: &ControlState,
        curve: &ReferenceCurve,
    ) -> Result<Vec<f64>, SolverError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The state given to the solver, expressed in the vehicle frame at the predicted pose.
///
/// Position and heading are always zero in this frame, they are kept so that backends receive
/// the full state vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlState {
    pub x_m: f64,
    pub y_m: f64,
    pub heading_rad: f64,
    pub speed_ms: f64,
    pub cte_m: f64,
    pub head_err_rad: f64,
}

/// The solver output split into its parts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverResult {
    /// Steering angle in the vehicle's convention, positive turns left (increases heading).
    ///
    /// Units: radians
    pub steer_rad: f64,

    pub throttle: f64,

    /// Predicted trajectory in the vehicle frame.
    ///
    /// Units: meters
    pub traj_m: Vec<Vector2<f64>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Reasons a solver can fail to produce a plan.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SolverError {
    #[error("The solver did not converge within {iters} iterations")]
    NotConverged { iters: usize },

    #[error("The cost became non-finite")]
    NonFiniteCost,

    #[error("The state or reference curve contained non-finite values")]
    InvalidState,

    #[error("{0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ControlState {
    /// Build the state of a vehicle at the frame origin travelling at `speed_ms`.
    pub fn at_origin(speed_ms: f64, err: &TrackError) -> Self {
        Self {
            x_m: 0.0,
            y_m: 0.0,
            heading_rad: 0.0,
            speed_ms,
            cte_m: err.cte_m,
            head_err_rad: err.head_err_rad,
        }
    }

    /// The state as `[x, y, heading, speed, cte, head_err]`.
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.x_m,
            self.y_m,
            self.heading_rad,
            self.speed_ms,
            self.cte_m,
            self.head_err_rad,
        ]
    }
}

impl SolverResult {
    /// Split a flat solver output into actuation and trajectory.
    ///
    /// The output must contain the two actuation values followed by equal length X and Y
    /// blocks.
    pub fn from_flat(output: &[f64]) -> Result<Self, MpcCtrlError> {
        if output.len() < NUM_ACTUATION_VALUES
            || (output.len() - NUM_ACTUATION_VALUES) % 2 != 0
        {
            return Err(MpcCtrlError::MalformedSolution(output.len()));
        }

        let (xs, ys) = output[NUM_ACTUATION_VALUES..]
            .split_at((output.len() - NUM_ACTUATION_VALUES) / 2);

        Ok(Self {
            steer_rad: output[0],
            throttle: output[1],
            traj_m: xs
                .iter()
                .zip(ys.iter())
                .map(|(x, y)| Vector2::new(*x, *y))
                .collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Run the solver for one cycle.
///
/// Any solver failure is mapped to `NoFeasiblePlan`, no fallback actuation is produced.
pub fn run_solver(
    solver: &mut dyn Solver,
    speed_ms: f64,
    err: &TrackError,
    curve: &ReferenceCurve,
) -> Result<(ControlState, SolverResult), MpcCtrlError> {
    let state = ControlState::at_origin(speed_ms, err);

    let output = solver.solve(&state, curve).map_err(|e| {
        warn!("Solver failed: {}", e);
        MpcCtrlError::NoFeasiblePlan(e)
    })?;

    Ok((state, SolverResult::from_flat(&output)?))
}

#[cfg(test)]
pub(crate) mod scripted {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Calls made to a `ScriptedSolver`.
    pub(crate) type SolverCalls = Arc<Mutex<Vec<(ControlState, ReferenceCurve)>>>;

    /// A solver which returns a scripted output and records what it was given.
    pub(crate) struct ScriptedSolver {
        pub output: Result<Vec<f64>, SolverError>,
        pub calls: SolverCalls,
    }

    impl ScriptedSolver {
        pub fn returning(output: Vec<f64>) -> Self {
            Self {
                output: Ok(output),
                calls: SolverCalls::default(),
            }
        }

        pub fn failing(err: SolverError) -> Self {
            Self {
                output: Err(err),
                calls: SolverCalls::default(),
            }
        }
    }

    impl Solver for ScriptedSolver {
        fn solve(
            &mut self,
            state: &ControlState,
            curve: &ReferenceCurve,
        ) -> Result<Vec<f64>, SolverError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((*state, curve.clone()));
            }
            self.output.clone()
        }
    }
}

#[cfg(test)]
mod test {
    use super::scripted::ScriptedSolver;
    use super::*;

    #[test]
    fn test_from_flat() {
        let n = 4;
        let mut flat = vec![0.1, -0.4];
        flat.extend((0..n).map(|i| i as f64));
        flat.extend((0..n).map(|i| 10.0 + i as f64));

        let res = SolverResult::from_flat(&flat).unwrap();

        assert_eq!(res.steer_rad, 0.1);
        assert_eq!(res.throttle, -0.4);
        assert_eq!(res.traj_m.len(), n);
        for (i, p) in res.traj_m.iter().enumerate() {
            assert_eq!(p[0], flat[2 + i]);
            assert_eq!(p[1], flat[2 + n + i]);
        }
    }

    #[test]
    fn test_from_flat_actuation_only() {
        let res = SolverResult::from_flat(&[0.2, 0.3]).unwrap();
        assert!(res.traj_m.is_empty());
    }

    #[test]
    fn test_from_flat_malformed() {
        assert!(matches!(
            SolverResult::from_flat(&[0.2]),
            Err(MpcCtrlError::MalformedSolution(1))
        ));
        assert!(matches!(
            SolverResult::from_flat(&[0.2, 0.3, 1.0]),
            Err(MpcCtrlError::MalformedSolution(3))
        ));
    }

    #[test]
    fn test_run_solver_state() {
        let mut solver = ScriptedSolver::returning(vec![0.0, 0.0]);
        let curve = ReferenceCurve::from_coeffs(vec![1.0, 0.0]);
        let err = TrackError {
            cte_m: 1.0,
            head_err_rad: -0.0,
        };

        let (state, _) = run_solver(&mut solver, 12.0, &err, &curve).unwrap();

        assert_eq!(state.to_array(), [0.0, 0.0, 0.0, 12.0, 1.0, -0.0]);

        let calls = solver.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, state);
        assert_eq!(calls[0].1, curve);
    }

    #[test]
    fn test_run_solver_failure() {
        let mut solver = ScriptedSolver::failing(SolverError::NotConverged { iters: 10 });
        let curve = ReferenceCurve::from_coeffs(vec![1.0, 0.0]);
        let err = TrackError::from_curve(&curve);

        assert!(matches!(
            run_solver(&mut solver, 12.0, &err, &curve),
            Err(MpcCtrlError::NoFeasiblePlan(SolverError::NotConverged { iters: 10 }))
        ));
    }
}
