//! # MPC control module
//!
//! MpcCtrl converts a single telemetry sample into a steering command. The optimizer which
//! produces the actuation plan is external to this module and is reached through the `Solver`
//! trait; everything around it is handled here:
//!
//!  1. The vehicle state is projected forward by the actuation latency using a kinematic bicycle
//!     model (`predict`), so that the plan is valid at the moment it actually takes effect.
//!  2. The world-frame waypoints are moved into the vehicle frame at the predicted pose
//!     (`frame`). In this frame the vehicle sits at the origin with zero heading.
//!  3. A polynomial reference curve is fitted through the local waypoints (`poly_fit`).
//!  4. The cross track and heading errors are read off the curve at the origin (`track_error`).
//!  5. The solver is invoked and its flat output split into actuation and a predicted
//!     trajectory (`solver`).
//!  6. The steering output is converted into the actuator's normalised range (`actuation`).
//!
//! No state is carried between cycles apart from whatever the solver keeps internally.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod actuation;
mod frame;
mod params;
mod poly_fit;
mod predict;
mod solver;
mod state;
mod track_error;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use actuation::*;
pub use frame::*;
pub use params::Params;
pub use poly_fit::*;
pub use predict::*;
pub use solver::*;
pub use state::*;
pub use track_error::*;

use util::{archive::ArchiveError, params::LoadError};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during MpcCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum MpcCtrlError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(LoadError),

    #[error("Invalid parameter: {0}")]
    InvalidParams(&'static str),

    /// The reference polynomial must be at least first order.
    #[error("Polynomial order must be at least 1, found {0}")]
    InvalidPolyOrder(usize),

    /// Fewer waypoints than order + 1 were provided, so the fit has no unique solution.
    #[error("Cannot fit an order {order} polynomial through {num_points} waypoints")]
    UnderdeterminedFit { num_points: usize, order: usize },

    /// The waypoints, or the powers of X built from them, are not finite.
    #[error("Cannot fit an order {order} polynomial through {num_points} non-finite waypoints")]
    NonFiniteFit { num_points: usize, order: usize },

    /// The solver did not produce a usable plan. No command is produced for this cycle.
    #[error("The solver found no feasible plan: {0}")]
    NoFeasiblePlan(SolverError),

    /// The solver output did not follow the `[steer, throttle, x.., y..]` layout.
    #[error("Solver output of length {0} does not match the expected layout")]
    MalformedSolution(usize),

    #[error("Archiving failed: {0}")]
    ArchiveError(ArchiveError),
}
