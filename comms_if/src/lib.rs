//! # Communications interface crate.
//!
//! Provides the message types exchanged between the controller and the driving environment.
//! Transport of these messages is left to the integrating application.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Telemetry and steering command definitions
pub mod drive;
