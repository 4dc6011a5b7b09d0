//! Main MPC executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise all modules
//!     - Main loop:
//!         - MpcCtrl processing of the latest telemetry
//!         - No feasible plan handling
//!         - Simulation of the vehicle over one cycle with the command
//!         - Archiving
//!     - Save the run trace
//!
//! # Modules
//!
//! All modules (e.g. `mpc_ctrl`) shall meet the following requirements:
//!     1. Provide a public struct implementing the `util::module::State` trait.
//!

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use mpc_lib::{
    data_store::{self, DataStore},
    grad_solver::{self, GradSolver},
    mpc_ctrl::{MpcCtrl, MpcCtrlError},
    sim::SimDriver,
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::{DateTime, Utc};
use color_eyre::{eyre::WrapErr, Report};
use log::{error, info, warn};
use serde::Serialize;

// Internal
use util::{
    archive::Archived,
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One cycle of the run, saved into the session trace at the end of execution.
#[derive(Serialize)]
struct TraceSample {
    timestamp: DateTime<Utc>,
    cycle: u64,
    sim_time_s: f64,
    position_m: [f64; 2],
    speed_ms: f64,
    dist_to_track_m: f64,
    cte_m: f64,
    steering_angle: f64,
    throttle: f64,
    planned: bool,
    safe: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("mpc_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Info, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("MPC Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let exec_params: data_store::Params =
        util::params::load("mpc_exec.toml").wrap_err("Could not load exec params")?;

    let solver_params: grad_solver::Params =
        util::params::load("grad_solver.toml").wrap_err("Could not load solver params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE DATASTORE ----

    info!("Initialising modules...");

    let mut ds = DataStore::default();

    // ---- INITIALISE MODULES ----

    let solver = GradSolver::new(solver_params).wrap_err("Failed to initialise GradSolver")?;
    info!("GradSolver init complete");

    let mut mpc_ctrl = MpcCtrl::init(("mpc_ctrl.toml", Box::new(solver)), &session)
        .wrap_err("Failed to initialise MpcCtrl")?;
    if !exec_params.realtime {
        mpc_ctrl = mpc_ctrl.with_pacer(|_| ());
    }
    info!("MpcCtrl init complete");

    let mut sim = SimDriver::init("sim.toml", &session).wrap_err("Failed to initialise SimDriver")?;
    ds.tm = sim.telemetry();
    info!("SimDriver init complete");

    // Every cycle's waypoints must be enough to fit the reference
    mpc_ctrl
        .check_num_waypoints(sim.params().num_waypoints)
        .wrap_err("The simulation's num_waypoints is too low for MpcCtrl's poly_order")?;

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut trace = Vec::with_capacity(exec_params.num_cycles as usize);

    while ds.num_cycles < exec_params.num_cycles {
        // Clear items that need wiping at the start of the cycle
        ds.cycle_start();

        // ---- CONTROL ALGORITHM PROCESSING ----

        let planned = match mpc_ctrl.proc(&ds.tm) {
            Ok((cmd, rpt)) => {
                ds.mpc_ctrl_status_rpt = rpt;
                ds.plan_found(cmd);
                true
            }
            Err(MpcCtrlError::NoFeasiblePlan(e)) => {
                let was_safe = ds.safe;
                ds.no_plan_found(exec_params.max_consec_no_plan);

                if ds.safe && !was_safe {
                    error!(
                        "No feasible plan for {} consecutive cycles, stopping the vehicle",
                        ds.num_consec_no_plan
                    );
                } else if !ds.safe {
                    warn!("No feasible plan ({}), holding the last command", e);
                }
                false
            }
            Err(e) => return Err(e).wrap_err("Error during MpcCtrl processing"),
        };

        // ---- SIMULATION ----

        let cmd = ds.cmd_to_send();
        let (tm, rpt) = sim.proc(&cmd).wrap_err("Error during simulation processing")?;
        ds.tm = tm;
        ds.sim_status_rpt = rpt;

        // ---- WRITE ARCHIVES ----

        mpc_ctrl.write().wrap_err("Failed to write MpcCtrl archive")?;
        sim.write().wrap_err("Failed to write SimDriver archive")?;

        trace.push(TraceSample {
            timestamp: Utc::now(),
            cycle: ds.num_cycles,
            sim_time_s: ds.sim_status_rpt.sim_time_s,
            position_m: [ds.sim_status_rpt.x_m, ds.sim_status_rpt.y_m],
            speed_ms: ds.sim_status_rpt.speed_ms,
            dist_to_track_m: ds.sim_status_rpt.dist_to_track_m,
            cte_m: ds.mpc_ctrl_status_rpt.cte_m,
            steering_angle: cmd.steering_angle,
            throttle: cmd.throttle,
            planned,
            safe: ds.safe,
        });

        // ---- CYCLE MANAGEMENT ----

        ds.cycle_end();
    }

    // ---- SHUTDOWN ----

    let max_dist_m = trace
        .iter()
        .map(|s| s.dist_to_track_m)
        .fold(0.0, f64::max);

    info!(
        "Completed {} cycles ({:.1} s simulated), {} without a plan, max distance to track {:.3} m",
        ds.num_cycles, ds.sim_time_s, ds.num_no_plan, max_dist_m
    );

    session.save("trace.json", trace);

    info!("End of execution");

    session.exit();

    Ok(())
}
