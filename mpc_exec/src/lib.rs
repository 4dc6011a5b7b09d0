//! # MPC library.
//!
//! This library allows other crates in the workspace (and the benchmarks) to access items defined
//! inside the MPC exec crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Data store - cycle data shared between modules of the exec
pub mod data_store;

/// Gradient solver - reference optimizer backend for MpcCtrl
pub mod grad_solver;

/// MPC control module - converts telemetry into steering commands
pub mod mpc_ctrl;

/// Simulation - closed-loop kinematic vehicle and track
pub mod sim;
