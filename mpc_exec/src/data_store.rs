//! # Data Store

use comms_if::drive::{SteerCmd, Telemetry};
use log::{info, warn};
use serde::Deserialize;

use crate::{mpc_ctrl, sim};

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Gives the reason the vehicle has been put into safe mode
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SafeModeCause {
    /// The solver failed to plan for more than the allowed number of consecutive cycles.
    NoFeasiblePlan,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the executable.
#[derive(Deserialize, Debug, Clone)]
pub struct Params {
    /// Number of cycles to run before stopping.
    pub num_cycles: u64,

    /// Number of consecutive cycles the last command is held for when no plan is found, after
    /// which safe mode is entered.
    pub max_consec_no_plan: u64,

    /// If true the actuation delay is really waited for, otherwise the loop runs as fast as
    /// possible.
    pub realtime: bool,
}

/// Global data store for the executable.
#[derive(Default)]
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u64,

    /// Simulation elapsed time
    pub sim_time_s: f64,

    // Safe mode variables
    /// Determines if the vehicle is in safe mode.
    pub safe: bool,

    /// Gives the reason for the vehicle being in safe mode.
    pub safe_cause: Option<SafeModeCause>,

    // Telemetry
    pub tm: Telemetry,

    // MpcCtrl
    /// The last command produced from a successful plan
    pub last_cmd: Option<SteerCmd>,
    pub mpc_ctrl_status_rpt: mpc_ctrl::StatusReport,

    // Sim
    pub sim_status_rpt: sim::SimStatusReport,

    // Monitoring Counters
    /// Number of consecutive cycles without a feasible plan
    pub num_consec_no_plan: u64,

    /// Total number of cycles without a feasible plan
    pub num_no_plan: u64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            num_cycles: 600,
            max_consec_no_plan: 5,
            realtime: false,
        }
    }
}

impl DataStore {
    /// Puts the vehicle into safe mode with the given cause.
    pub fn make_safe(&mut self, cause: SafeModeCause) {
        if !self.safe {
            warn!("Make safe requested, cause: {:?}", cause);
            self.safe = true;
            self.safe_cause = Some(cause);
        }
    }

    /// Disables safe mode if it was entered for the given cause.
    ///
    /// Safe mode entered for a different cause is left enabled.
    pub fn make_unsafe(&mut self, cause: SafeModeCause) {
        if self.safe && self.safe_cause == Some(cause) {
            self.safe = false;
            self.safe_cause = None;
            info!("Make unsafe requested, root cause match, safe mode disabled");
        }
    }

    /// Perform actions required at the start of a cycle.
    pub fn cycle_start(&mut self) {
        self.mpc_ctrl_status_rpt = mpc_ctrl::StatusReport::default();
        self.sim_status_rpt = sim::SimStatusReport::default();
    }

    /// Record a command produced from a feasible plan.
    ///
    /// This clears the no plan counter and any safe mode it caused.
    pub fn plan_found(&mut self, cmd: SteerCmd) {
        self.num_consec_no_plan = 0;
        self.make_unsafe(SafeModeCause::NoFeasiblePlan);
        self.last_cmd = Some(cmd);
    }

    /// Record a cycle on which no feasible plan was found.
    ///
    /// Once more than `max_consec_no_plan` consecutive cycles have gone without a plan safe mode
    /// is entered.
    pub fn no_plan_found(&mut self, max_consec_no_plan: u64) {
        self.num_consec_no_plan += 1;
        self.num_no_plan += 1;

        if self.num_consec_no_plan > max_consec_no_plan {
            self.make_safe(SafeModeCause::NoFeasiblePlan);
        }
    }

    /// The command to send to the vehicle this cycle.
    ///
    /// In safe mode, or if no plan has ever been found, this is the stop command. Otherwise it is
    /// the last planned command, which is held over cycles without a plan.
    pub fn cmd_to_send(&self) -> SteerCmd {
        match (&self.last_cmd, self.safe) {
            (Some(cmd), false) => cmd.clone(),
            _ => SteerCmd::stop(),
        }
    }

    /// Perform actions required at the end of a cycle.
    pub fn cycle_end(&mut self) {
        self.num_cycles += 1;
        self.sim_time_s = self.sim_status_rpt.sim_time_s;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cmd(steering_angle: f64) -> SteerCmd {
        SteerCmd {
            steering_angle,
            throttle: 0.3,
            ..SteerCmd::default()
        }
    }

    #[test]
    fn test_no_plan_before_first_cmd() {
        let mut ds = DataStore::default();
        ds.no_plan_found(5);

        assert!(!ds.safe);
        assert_eq!(ds.cmd_to_send(), SteerCmd::stop());
    }

    #[test]
    fn test_hold_then_safe() {
        let mut ds = DataStore::default();
        ds.plan_found(cmd(0.2));

        // Held for the allowed number of cycles
        for _ in 0..3 {
            ds.no_plan_found(3);
            assert!(!ds.safe);
            assert_eq!(ds.cmd_to_send(), cmd(0.2));
        }

        // Then stopped
        ds.no_plan_found(3);
        assert!(ds.safe);
        assert_eq!(ds.safe_cause, Some(SafeModeCause::NoFeasiblePlan));
        assert_eq!(ds.cmd_to_send(), SteerCmd::stop());
        assert_eq!(ds.num_no_plan, 4);

        // A new plan clears safe mode
        ds.plan_found(cmd(-0.1));
        assert!(!ds.safe);
        assert_eq!(ds.num_consec_no_plan, 0);
        assert_eq!(ds.cmd_to_send(), cmd(-0.1));
    }

    #[test]
    fn test_make_unsafe_cause() {
        let mut ds = DataStore::default();
        ds.make_unsafe(SafeModeCause::NoFeasiblePlan);
        assert!(!ds.safe);

        ds.make_safe(SafeModeCause::NoFeasiblePlan);
        assert!(ds.safe);
        ds.make_unsafe(SafeModeCause::NoFeasiblePlan);
        assert!(!ds.safe);
        assert_eq!(ds.safe_cause, None);
    }

    #[test]
    fn test_cycle_end() {
        let mut ds = DataStore::default();
        ds.sim_status_rpt.sim_time_s = 0.1;
        ds.cycle_end();

        assert_eq!(ds.num_cycles, 1);
        assert_eq!(ds.sim_time_s, 0.1);
    }
}
