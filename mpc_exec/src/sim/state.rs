//! Simulation module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use nalgebra::Vector2;
use serde::Serialize;

// Internal
use super::*;
use comms_if::drive::{SteerCmd, Telemetry};
use util::{
    archive::{ArchiveError, Archived, Archiver},
    maths::wrap_to_pi,
    module::State,
    params,
    session::{self, Session},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Simulated vehicle and track.
pub struct SimDriver {
    params: Params,

    track: Track,

    /// Number of cycles processed so far
    cycle: u64,

    /// Units: seconds
    sim_time_s: f64,

    position_m: Vector2<f64>,
    heading_rad: f64,
    speed_ms: f64,

    /// Normalised steering currently applied, positive turns right.
    steering: f64,

    /// Throttle currently applied.
    throttle: f64,

    report: SimStatusReport,
    arch_report: Archiver,
}

/// Status report for SimDriver processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct SimStatusReport {
    pub cycle: u64,
    pub sim_time_s: f64,

    pub x_m: f64,
    pub y_m: f64,
    pub heading_rad: f64,
    pub speed_ms: f64,

    /// Actuation applied over the next cycle.
    pub steering_angle: f64,
    pub throttle: f64,

    /// Distance from the vehicle to the track line.
    pub dist_to_track_m: f64,

    /// Index of the first waypoint sent in the telemetry.
    pub track_index: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for SimDriver {
    /// Path to the parameter file.
    type InitData = &'static str;
    type InitError = SimError;

    type InputData = SteerCmd;
    type OutputData = Telemetry;
    type StatusReport = SimStatusReport;
    type ProcError = SimError;

    fn init(init_data: Self::InitData, session: &Session) -> Result<Self, Self::InitError> {
        let params = params::load(init_data).map_err(SimError::ParamLoadError)?;

        let mut sim = Self::new(params)?;

        sim.arch_report = Archiver::from_path(session, "sim/status_report.csv")
            .map_err(SimError::ArchiveError)?;

        // Track geometry for plotting the run
        session::save(
            "sim/track.json",
            sim.track.points_from(0, sim.track.get_num_points()),
        );

        Ok(sim)
    }

    /// Advance the simulation by one cycle.
    ///
    /// The vehicle drives the cycle with the previously received command, `input_data` is
    /// applied from the next cycle. The returned telemetry is sampled at the end of the cycle.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        if !input_data.steering_angle.is_finite() || !input_data.throttle.is_finite() {
            return Err(SimError::InvalidCmd);
        }

        self.integrate();

        // Actuators saturate at their normalised limits
        self.steering = input_data.steering_angle.clamp(-1.0, 1.0);
        self.throttle = input_data.throttle.clamp(-1.0, 1.0);

        self.cycle += 1;
        self.sim_time_s = self.cycle as f64 * self.params.cycle_period_s;

        let tm = self.telemetry();

        self.report = SimStatusReport {
            cycle: self.cycle,
            sim_time_s: self.sim_time_s,
            x_m: self.position_m[0],
            y_m: self.position_m[1],
            heading_rad: self.heading_rad,
            speed_ms: self.speed_ms,
            steering_angle: self.steering,
            throttle: self.throttle,
            dist_to_track_m: self.track.dist_to(&self.position_m),
            track_index: self.track.index_ahead(&self.position_m, self.heading_rad),
        };

        trace!(
            "Sim cycle {}: ({:.3}, {:.3}) m, {:.3} m/s, {:.3} m from track",
            self.cycle,
            self.position_m[0],
            self.position_m[1],
            self.speed_ms,
            self.report.dist_to_track_m
        );

        Ok((tm, self.report))
    }
}

impl Archived for SimDriver {
    fn write(&mut self) -> Result<(), ArchiveError> {
        self.arch_report.serialise(self.report)
    }
}

impl SimDriver {
    /// Create a new simulation with the vehicle on the first track point, facing along the track.
    pub fn new(params: Params) -> Result<Self, SimError> {
        if !(params.cycle_period_s > 0.0) {
            return Err(SimError::InvalidParams("cycle_period_s must be positive"));
        }
        if params.num_substeps == 0 {
            return Err(SimError::InvalidParams("num_substeps must be at least 1"));
        }
        if !(params.wheelbase_m > 0.0) {
            return Err(SimError::InvalidParams("wheelbase_m must be positive"));
        }
        if !(params.track_semi_axis_x_m > 0.0) || !(params.track_semi_axis_y_m > 0.0) {
            return Err(SimError::InvalidParams("track semi axes must be positive"));
        }
        if params.track_num_points < 3 {
            return Err(SimError::InvalidParams("track_num_points must be at least 3"));
        }
        if params.num_waypoints == 0 || params.num_waypoints > params.track_num_points {
            return Err(SimError::InvalidParams(
                "num_waypoints must be between 1 and track_num_points",
            ));
        }

        let track = Track::ellipse(
            params.track_semi_axis_x_m,
            params.track_semi_axis_y_m,
            params.track_num_points,
        );

        Ok(Self {
            position_m: track.points_m()[0],
            heading_rad: track.heading_at(0),
            speed_ms: params.initial_speed_ms.max(0.0),
            steering: 0.0,
            throttle: 0.0,
            cycle: 0,
            sim_time_s: 0.0,
            track,
            params,
            report: SimStatusReport::default(),
            arch_report: Archiver::default(),
        })
    }

    /// Sample the current telemetry.
    pub fn telemetry(&self) -> Telemetry {
        let start = self.track.index_ahead(&self.position_m, self.heading_rad);

        Telemetry {
            waypoints_m: self.track.points_from(start, self.params.num_waypoints),
            position_m: [self.position_m[0], self.position_m[1]],
            heading_rad: self.heading_rad,
            speed_ms: self.speed_ms,
            steering_angle: self.steering,
            throttle: self.throttle,
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    /// Integrate the vehicle over one cycle with the applied actuation.
    fn integrate(&mut self) {
        let dt_s = self.params.cycle_period_s / self.params.num_substeps as f64;
        let steer_rad = self.steering * self.params.max_steer_rad;
        let accel_mss = self.throttle * self.params.throttle_accel_mss;

        for _ in 0..self.params.num_substeps {
            let heading_rad = self.heading_rad;
            let speed_ms = self.speed_ms;

            self.position_m += Vector2::new(heading_rad.cos(), heading_rad.sin()) * speed_ms * dt_s;
            self.heading_rad = heading_rad - speed_ms / self.params.wheelbase_m * steer_rad * dt_s;
            self.speed_ms = (speed_ms + accel_mss * dt_s).max(0.0);
        }

        self.heading_rad = wrap_to_pi(self.heading_rad);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn cmd(steering_angle: f64, throttle: f64) -> SteerCmd {
        SteerCmd {
            steering_angle,
            throttle,
            ..SteerCmd::default()
        }
    }

    #[test]
    fn test_start() {
        let sim = SimDriver::new(Params::default()).unwrap();
        let tm = sim.telemetry();
        let track = sim.track().points_m();

        assert_eq!(tm.position_m, [track[0][0], track[0][1]]);
        assert_eq!(tm.waypoints_m.len(), Params::default().num_waypoints);
        assert_eq!(tm.waypoints_m[0], [track[1][0], track[1][1]]);
        assert_abs_diff_eq!(tm.speed_ms, Params::default().initial_speed_ms);
    }

    #[test]
    fn test_cmd_applied_next_cycle() {
        let params = Params::default();
        let mut sim = SimDriver::new(params.clone()).unwrap();

        let (tm, report) = sim.proc(&cmd(0.0, 1.0)).unwrap();
        assert_abs_diff_eq!(tm.speed_ms, params.initial_speed_ms, epsilon = 1e-12);
        assert_abs_diff_eq!(tm.throttle, 1.0);
        assert_eq!(report.cycle, 1);

        let (tm, report) = sim.proc(&cmd(0.0, 0.0)).unwrap();
        assert_abs_diff_eq!(
            tm.speed_ms,
            params.initial_speed_ms + params.throttle_accel_mss * params.cycle_period_s,
            epsilon = 1e-9
        );
        assert_abs_diff_eq!(report.sim_time_s, 2.0 * params.cycle_period_s, epsilon = 1e-12);
    }

    #[test]
    fn test_steering_turns_right() {
        let mut sim = SimDriver::new(Params::default()).unwrap();
        let start_heading = sim.telemetry().heading_rad;

        sim.proc(&cmd(0.5, 0.0)).unwrap();
        let (tm, _) = sim.proc(&cmd(0.5, 0.0)).unwrap();

        assert!(tm.heading_rad < start_heading);
    }

    #[test]
    fn test_speed_non_negative() {
        let mut sim = SimDriver::new(Params {
            initial_speed_ms: 0.5,
            ..Params::default()
        })
        .unwrap();

        sim.proc(&cmd(0.0, -1.0)).unwrap();
        let (tm, _) = sim.proc(&cmd(0.0, -1.0)).unwrap();

        assert_eq!(tm.speed_ms, 0.0);
    }

    #[test]
    fn test_actuation_saturates() {
        let mut sim = SimDriver::new(Params::default()).unwrap();
        let (tm, _) = sim.proc(&cmd(-3.0, 2.0)).unwrap();

        assert_eq!(tm.steering_angle, -1.0);
        assert_eq!(tm.throttle, 1.0);
    }

    #[test]
    fn test_invalid_cmd() {
        let mut sim = SimDriver::new(Params::default()).unwrap();
        assert!(matches!(
            sim.proc(&cmd(f64::NAN, 0.0)),
            Err(SimError::InvalidCmd)
        ));
    }

    #[test]
    fn test_invalid_params() {
        assert!(matches!(
            SimDriver::new(Params {
                num_waypoints: 0,
                ..Params::default()
            }),
            Err(SimError::InvalidParams(_))
        ));
        assert!(matches!(
            SimDriver::new(Params {
                track_num_points: 2,
                ..Params::default()
            }),
            Err(SimError::InvalidParams(_))
        ));
    }
}
