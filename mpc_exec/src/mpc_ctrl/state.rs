//! MPC control module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace, warn};
use nalgebra::Vector2;
use serde::Serialize;
use std::time::{Duration, Instant};

// Internal
use super::*;
use comms_if::drive::{SteerCmd, Telemetry};
use util::{
    archive::{ArchiveError, Archived, Archiver},
    module::State,
    params,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A function which blocks for the given duration before a command is released.
pub type Pacer = Box<dyn Fn(Duration) + Send>;

/// MPC control module state
pub struct MpcCtrl {
    params: Params,

    predictor: KinematicPredictor,
    normaliser: ActuationNormaliser,

    /// The optimizer backend
    solver: Box<dyn Solver + Send>,

    /// Applies the fixed actuation delay after each solve
    pacer: Pacer,

    report: StatusReport,
    arch_report: Archiver,
}

/// Status report for MpcCtrl processing.
///
/// The report is flat so it can be archived directly as a CSV row.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    /// Predicted position in the world frame.
    pub pred_x_m: f64,
    pub pred_y_m: f64,

    /// Predicted heading in the world frame.
    pub pred_heading_rad: f64,

    pub pred_speed_ms: f64,

    pub num_waypoints: usize,

    /// Number of coefficients in the fitted reference curve.
    pub num_coeffs: usize,

    pub cte_m: f64,
    pub head_err_rad: f64,

    /// True if the reference fit was ill-conditioned on this cycle.
    pub fit_ill_conditioned: bool,

    /// Time spent in the solver.
    pub solve_time_s: f64,

    /// Number of points in the predicted trajectory.
    pub traj_len: usize,

    /// Normalised steering sent to the actuator.
    pub steering_angle: f64,

    /// Throttle sent to the actuator.
    pub throttle: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for MpcCtrl {
    /// Path to the parameter file and the solver backend to use.
    type InitData = (&'static str, Box<dyn Solver + Send>);
    type InitError = MpcCtrlError;

    type InputData = Telemetry;
    type OutputData = SteerCmd;
    type StatusReport = StatusReport;
    type ProcError = MpcCtrlError;

    /// Initialise the MpcCtrl module.
    ///
    /// Loads the parameters and sets up the status report archive in the session.
    fn init(init_data: Self::InitData, session: &Session) -> Result<Self, Self::InitError> {
        let (params_path, solver) = init_data;

        let params = params::load(params_path).map_err(MpcCtrlError::ParamLoadError)?;

        let mut mpc_ctrl = Self::new(params, solver)?;

        mpc_ctrl.arch_report = Archiver::from_path(session, "mpc_ctrl/status_report.csv")
            .map_err(MpcCtrlError::ArchiveError)?;

        Ok(mpc_ctrl)
    }

    /// Process a single telemetry sample into a steering command.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        // Clear the status report
        self.report = StatusReport::default();

        let cmd = self.calc_cmd(input_data)?;

        // Hold the command for the actuation delay before it is released
        (self.pacer)(Duration::from_secs_f64(self.params.actuation_delay_s));

        Ok((cmd, self.report))
    }
}

impl Archived for MpcCtrl {
    fn write(&mut self) -> Result<(), ArchiveError> {
        self.arch_report.serialise(self.report)
    }
}

impl MpcCtrl {
    /// Create a new instance from already loaded parameters.
    ///
    /// The default pacer sleeps the current thread, use `with_pacer` to replace it.
    pub fn new(params: Params, solver: Box<dyn Solver + Send>) -> Result<Self, MpcCtrlError> {
        if params.poly_order < 1 {
            return Err(MpcCtrlError::InvalidPolyOrder(params.poly_order));
        }
        if !(params.wheelbase_m > 0.0) {
            return Err(MpcCtrlError::InvalidParams("wheelbase_m must be positive"));
        }
        if !(params.max_steer_rad > 0.0) {
            return Err(MpcCtrlError::InvalidParams("max_steer_rad must be positive"));
        }
        if !(params.actuation_delay_s >= 0.0) || !params.actuation_delay_s.is_finite() {
            return Err(MpcCtrlError::InvalidParams(
                "actuation_delay_s must be finite and non-negative",
            ));
        }

        Ok(Self {
            predictor: KinematicPredictor::new(&params),
            normaliser: ActuationNormaliser::new(&params),
            params,
            solver,
            pacer: Box::new(std::thread::sleep),
            report: StatusReport::default(),
            arch_report: Archiver::default(),
        })
    }

    /// Replace the function used to apply the actuation delay.
    pub fn with_pacer<F>(mut self, pacer: F) -> Self
    where
        F: Fn(Duration) + Send + 'static,
    {
        self.pacer = Box::new(pacer);
        self
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Check that telemetry carrying `num_waypoints` waypoints can be fitted with the configured
    /// polynomial order.
    pub fn check_num_waypoints(&self, num_waypoints: usize) -> Result<(), MpcCtrlError> {
        if num_waypoints < self.params.poly_order + 1 {
            return Err(MpcCtrlError::UnderdeterminedFit {
                num_points: num_waypoints,
                order: self.params.poly_order,
            });
        }
        Ok(())
    }

    /// Run the pipeline for one telemetry sample, without the actuation delay.
    fn calc_cmd(&mut self, tm: &Telemetry) -> Result<SteerCmd, MpcCtrlError> {
        // ---- LATENCY COMPENSATION ----

        let pose = VehiclePose::from_telemetry(tm);
        let pred_pose = self
            .predictor
            .predict(&pose, &ActuatorState::from_telemetry(tm));

        self.report.pred_x_m = pred_pose.position_m[0];
        self.report.pred_y_m = pred_pose.position_m[1];
        self.report.pred_heading_rad = pred_pose.heading_rad;
        self.report.pred_speed_ms = pred_pose.speed_ms;

        trace!(
            "Predicted pose: ({:.3}, {:.3}) m, {:.4} rad, {:.3} m/s",
            pred_pose.position_m[0],
            pred_pose.position_m[1],
            pred_pose.heading_rad,
            pred_pose.speed_ms
        );

        // ---- REFERENCE FITTING ----

        let frame = VehicleFrame::at(&pred_pose);
        let waypoints_m_vf = frame.points_to_vf(&tm.waypoints_m);
        self.report.num_waypoints = waypoints_m_vf.len();

        let fit = poly_fit(
            &waypoints_m_vf,
            self.params.poly_order,
            self.params.ill_cond_ratio,
        )?;

        if fit.ill_conditioned {
            warn!(
                "Reference fit through {} waypoints is ill-conditioned, coefficients may be \
                 inaccurate",
                waypoints_m_vf.len()
            );
        }
        self.report.fit_ill_conditioned = fit.ill_conditioned;
        self.report.num_coeffs = fit.curve.coeffs().len();

        let track_err = TrackError::from_curve(&fit.curve);
        self.report.cte_m = track_err.cte_m;
        self.report.head_err_rad = track_err.head_err_rad;

        // ---- SOLVE ----

        let solve_start = Instant::now();
        let (_, result) = run_solver(
            self.solver.as_mut(),
            pred_pose.speed_ms,
            &track_err,
            &fit.curve,
        )?;
        self.report.solve_time_s = solve_start.elapsed().as_secs_f64();
        self.report.traj_len = result.traj_m.len();

        // ---- ACTUATION ----

        let act = self.normaliser.normalise(&result);
        self.report.steering_angle = act.steering;
        self.report.throttle = act.throttle;

        debug!(
            "CTE: {:.4} m, heading error: {:.4} rad, steering: {:.4}, throttle: {:.4}",
            track_err.cte_m, track_err.head_err_rad, act.steering, act.throttle
        );

        Ok(SteerCmd {
            steering_angle: act.steering,
            throttle: act.throttle,
            mpc_traj_m: result.traj_m.iter().map(|p| [p[0], p[1]]).collect(),
            ref_traj_m: self.ref_traj(&fit.curve, &waypoints_m_vf),
        })
    }

    /// Get the reference trajectory to display.
    ///
    /// This is the curve sampled at regular X intervals ahead of the vehicle, or the vehicle
    /// frame waypoints if no samples are requested.
    fn ref_traj(&self, curve: &ReferenceCurve, waypoints_m_vf: &[Vector2<f64>]) -> Vec<[f64; 2]> {
        if self.params.ref_curve_num_samples == 0 {
            return waypoints_m_vf.iter().map(|p| [p[0], p[1]]).collect();
        }

        (1..=self.params.ref_curve_num_samples)
            .map(|i| {
                let x = i as f64 * self.params.ref_curve_sample_sep_m;
                [x, curve.eval(x)]
            })
            .collect()
    }
}
