//! Implementations for the DriveCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace, warn};
use serde::Serialize;

// Internal
use super::{DriveCtrlError, Params};
use crate::pid::PidController;
use crate::twiddle::{Phase, SearchGain, TrialReport, Twiddle, Verdict};
use comms_if::eqpt::sim::{SteerDems, Telemetry};
use util::{
    params,
    module::State,
    archive::{ArchiveError, Archived, Archiver},
    session::Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Drive control module state
pub struct DriveCtrl {

    pub(crate) params: Params,

    steering: Steering,

    throttle: PidController,

    /// Number of processed (not filtered) cycles
    num_cycles: u64,

    /// Set once the final tuned gains have been logged
    tuning_done: bool,

    pub(crate) report: StatusReport,
    arch_report: Archiver,

    arch_trials: Archiver,

    pub(crate) output: Option<OutputData>,
}

/// Input data to Drive Control.
#[derive(Clone, Copy, Debug)]
pub struct InputData {
    /// Latest telemetry from the vehicle
    pub telemetry: Telemetry,

    /// Time since the previous telemetry frame.
    ///
    /// Units: seconds
    pub dt_s: f64,
}

/// Output demands from DriveCtrl.
#[derive(Clone, Copy, Default, Serialize, Debug, PartialEq)]
pub struct OutputData {
    /// Normalised steering demand
    pub steering: f64,

    /// Throttle demand
    pub throttle: f64,
}

/// Status report for DriveCtrl processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    /// Number of processed cycles
    pub cycle: u64,

    /// The frame arrived too soon after the previous one and was not processed
    pub dt_filtered: bool,

    /// The telemetry contained a non-finite value and was not processed
    pub telemetry_rejected: bool,

    pub dt_s: f64,

    pub cte: f64,

    pub speed_mph: f64,

    pub target_speed_mph: f64,

    pub steering: f64,

    pub steering_limited: bool,

    pub throttle: f64,

    pub throttle_limited: bool,

    /// Throttle cut because of a large cross track error at high speed
    pub throttle_cut: bool,

    pub tuning: bool,

    pub tuning_complete: bool,
}

/// Flat record of a finished tuning trial for the archive.
#[derive(Clone, Copy, Serialize, Debug)]
struct TrialRecord {
    trial: u64,
    num_cycles: u64,
    gain: SearchGain,
    phase: Phase,
    verdict: Verdict,
    rms: f64,
    best_rms: f64,
    k_p: f64,
    k_d: f64,
    k_i: f64,
    dp_k_p: f64,
    dp_k_d: f64,
    dp_k_i: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The steering loop, either running with fixed gains or being tuned.
enum Steering {
    Fixed(PidController),
    Tuning(Twiddle),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for DriveCtrl {
    fn default() -> Self {
        Self::build(Params::default())
    }
}

impl State for DriveCtrl {
    type InitData = &'static str;
    type InitError = DriveCtrlError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = DriveCtrlError;

    /// Initialise the DriveCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        // Load the parameters
        let params: Params = params::load(init_data)
            .map_err(DriveCtrlError::ParamLoadError)?;

        *self = Self::new(params)?;

        // Initialise the archivers
        self.arch_report = Archiver::from_path(
            session, "drive_ctrl/status_report.csv"
        ).map_err(DriveCtrlError::ArchiveError)?;
        self.arch_trials = Archiver::from_path(
            session, "drive_ctrl/twiddle_trials.csv"
        ).map_err(DriveCtrlError::ArchiveError)?;

        Ok(())
    }

    /// Perform cyclic processing of Drive Control.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let tlm = input_data.telemetry;
        let dt = input_data.dt_s;

        // Clear the status report
        self.report = StatusReport {
            cycle: self.num_cycles,
            dt_s: dt,
            cte: tlm.cte,
            speed_mph: tlm.speed,
            tuning: self.is_tuning(),
            ..Default::default()
        };

        // A single non-finite sample would poison the integral terms for good
        if !(tlm.cte.is_finite() && tlm.speed.is_finite()) {
            warn!(
                "DriveCtrl: rejecting telemetry with cte {} and speed {}",
                tlm.cte, tlm.speed
            );
            self.report.telemetry_rejected = true;
            return Ok(self.hold_output());
        }

        // Frames too close together would blow up the derivative term, resend the previous
        // demands instead
        if !(dt > self.params.min_dt_s) {
            trace!("DriveCtrl: dt of {:.4} s filtered", dt);
            self.report.dt_filtered = true;
            return Ok(self.hold_output());
        }

        // ---- STEERING ----

        let steering = {
            let ctrl = self.steering.controller_mut();
            ctrl.update_error(tlm.cte, dt);
            let s = ctrl.compute_output();
            self.report.steering_limited = ctrl.is_saturated(s);
            s
        };

        self.num_cycles += 1;

        // ---- THROTTLE ----

        let target_speed = if self.num_cycles < self.params.speed_ramp_cycles {
            self.params.initial_speed_mph
        }
        else {
            self.params.run_speed_mph
        };
        self.report.target_speed_mph = target_speed;

        self.throttle.update_error(tlm.speed - target_speed, dt);
        let mut throttle = self.throttle.compute_output();
        self.report.throttle_limited = self.throttle.is_saturated(throttle);

        if tlm.cte.abs() > self.params.cte_slowdown_threshold_m
            && tlm.speed > self.params.cornering_speed_limit_mph
        {
            trace!(
                "DriveCtrl: cte of {:.3} m at {:.1} mph, cutting throttle",
                tlm.cte, tlm.speed
            );
            throttle = 0.0;
            self.report.throttle_cut = true;
        }

        // ---- TUNING ----

        self.tune(tlm.cte);

        let output = OutputData { steering, throttle };

        debug!(
            "DriveCtrl: cte {:.4}, steering {:.4} (angle {:.2}), throttle {:.3}",
            tlm.cte, output.steering, tlm.steering_angle, output.throttle
        );

        self.report.steering = output.steering;
        self.report.throttle = output.throttle;
        self.report.tuning_complete = self.tuning_done;

        self.output = Some(output);

        Ok((output, self.report))
    }
}

impl Archived for DriveCtrl {
    fn write(&mut self) -> Result<(), ArchiveError> {
        self.arch_report.serialise(self.report)
    }
}

impl DriveCtrl {

    /// Create a new DriveCtrl from the given parameters, without any archives.
    pub fn new(params: Params) -> Result<Self, DriveCtrlError> {
        params.validate()?;
        Ok(Self::build(params))
    }

    fn build(params: Params) -> Self {
        let steering_ctrl = params.steering.controller();
        let steering = match params.tuning_enabled {
            true => Steering::Tuning(Twiddle::new(steering_ctrl, &params.twiddle)),
            false => Steering::Fixed(steering_ctrl),
        };

        Self {
            throttle: params.throttle.controller(),
            steering,
            params,
            num_cycles: 0,
            tuning_done: false,
            report: StatusReport::default(),
            arch_report: Archiver::default(),
            arch_trials: Archiver::default(),
            output: None,
        }
    }

    /// Enable or disable tuning of the steering gains.
    ///
    /// When tuning is disabled the steering controller continues with the best gains found so far.
    /// Enabling it again starts a new search from the current gains.
    pub fn set_tuning(&mut self, enabled: bool) {
        self.params.tuning_enabled = enabled;

        let steering = std::mem::replace(
            &mut self.steering,
            Steering::Fixed(self.params.steering.controller())
        );

        self.steering = match (steering, enabled) {
            (Steering::Fixed(c), true) => {
                info!("DriveCtrl: steering gain tuning enabled");
                self.tuning_done = false;
                Steering::Tuning(Twiddle::new(c, &self.params.twiddle))
            },
            (Steering::Tuning(t), false) => {
                info!("DriveCtrl: steering gain tuning disabled");
                Steering::Fixed(t.into_controller())
            },
            (s, _) => s,
        };
    }

    /// Returns true if the steering gains are being tuned.
    pub fn is_tuning(&self) -> bool {
        matches!(self.steering, Steering::Tuning(_))
    }

    /// The controller currently used for steering.
    pub fn steering_controller(&self) -> &PidController {
        self.steering.controller()
    }

    /// The tuner, if tuning is enabled.
    pub fn tuner(&self) -> Option<&Twiddle> {
        match self.steering {
            Steering::Tuning(ref t) => Some(t),
            Steering::Fixed(_) => None,
        }
    }

    /// Resend the previous demands, or zero demands if there are none yet.
    fn hold_output(&mut self) -> (OutputData, StatusReport) {
        let output = self.output.unwrap_or_default();
        self.report.steering = output.steering;
        self.report.throttle = output.throttle;
        self.report.tuning_complete = self.tuning_done;
        (output, self.report)
    }

    /// Step the tuner if there is one and it hasn't finished.
    ///
    /// On completion the steering controller is switched to the tuned gains.
    fn tune(&mut self, cte: f64) {
        let tw_params = &self.params.twiddle;
        let tuner = match self.steering {
            Steering::Tuning(ref mut t) => t,
            Steering::Fixed(_) => return,
        };

        if tuner.is_complete(tw_params.max_cycles, tw_params.step_tolerance) {
            if !self.tuning_done {
                tuner.adopt_candidate();
                let p = tuner.p();
                info!(
                    "DriveCtrl: tuning complete after {} cycles, Kp {:.6}, Kd {:.6}, Ki {:.6}",
                    tuner.num_cycles(), p.k_p, p.k_d, p.k_i
                );
                self.tuning_done = true;
            }
            return;
        }

        if let Some(report) = tuner.step(cte) {
            if let Err(e) = self.arch_trials.serialise(TrialRecord::from(report)) {
                warn!("DriveCtrl: could not archive tuning trial: {}", e);
            }
        }
    }
}

impl Steering {
    fn controller(&self) -> &PidController {
        match self {
            Steering::Fixed(c) => c,
            Steering::Tuning(t) => t.controller(),
        }
    }

    fn controller_mut(&mut self) -> &mut PidController {
        match self {
            Steering::Fixed(c) => c,
            Steering::Tuning(t) => t.controller_mut(),
        }
    }
}

impl From<OutputData> for SteerDems {
    fn from(o: OutputData) -> Self {
        SteerDems {
            steering_angle: o.steering,
            throttle: o.throttle,
        }
    }
}

impl From<TrialReport> for TrialRecord {
    fn from(r: TrialReport) -> Self {
        TrialRecord {
            trial: r.trial,
            num_cycles: r.num_cycles,
            gain: r.state.gain,
            phase: r.state.phase,
            verdict: r.verdict,
            rms: r.rms,
            best_rms: r.best_rms,
            k_p: r.p.k_p,
            k_d: r.p.k_d,
            k_i: r.p.k_i,
            dp_k_p: r.dp.k_p,
            dp_k_d: r.dp.k_d,
            dp_k_i: r.dp.k_i,
        }
    }
}
