//! # Simulation module
//!
//! SimDriver stands in for the driving environment. It integrates a kinematic bicycle vehicle
//! around a closed elliptical track, produces one telemetry sample per cycle and accepts the
//! steering command computed from it.
//!
//! A command is only applied from the following cycle, so the vehicle keeps executing the
//! previous command while the controller is working. This is the latency the controller's
//! predictor compensates for.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;
mod track;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use params::Params;
pub use state::*;
pub use track::*;

use util::{archive::ArchiveError, params::LoadError};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(LoadError),

    #[error("Invalid parameter: {0}")]
    InvalidParams(&'static str),

    #[error("The command contained non-finite values")]
    InvalidCmd,

    #[error("Archiving failed: {0}")]
    ArchiveError(ArchiveError),
}
