//! Parameters structure for DriveCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use super::DriveCtrlError;
use crate::pid::{Gains, PidController};
use crate::twiddle::TwiddleParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Drive control.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {

    /// Tune the steering gains with twiddle while driving.
    pub tuning_enabled: bool,

    /// Telemetry frames arriving this soon after the previous one are not processed.
    ///
    /// Units: seconds
    pub min_dt_s: f64,

    // ---- STEERING ----

    pub steering: LoopParams,

    // ---- THROTTLE ----

    pub throttle: LoopParams,

    /// Target speed while the controllers settle at the start of the run.
    ///
    /// Units: miles per hour
    pub initial_speed_mph: f64,

    /// Number of processed cycles spent at the initial speed.
    pub speed_ramp_cycles: u64,

    /// Target speed after the initial ramp.
    ///
    /// Units: miles per hour
    pub run_speed_mph: f64,

    /// Cross track error above which the throttle is cut when cornering fast.
    ///
    /// Units: meters
    pub cte_slowdown_threshold_m: f64,

    /// Speed above which the throttle is cut when the cross track error is large.
    ///
    /// Units: miles per hour
    pub cornering_speed_limit_mph: f64,

    // ---- TUNING ----

    pub twiddle: TwiddleParams,
}

/// Parameters of a single PID loop.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LoopParams {
    pub gains: Gains,

    /// Maximum output of the loop
    pub output_max: f64,

    /// Minimum output of the loop
    pub output_min: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            tuning_enabled: false,
            min_dt_s: 0.01,
            steering: LoopParams {
                gains: Gains { k_p: 0.12, k_i: 0.002, k_d: 0.05 },
                output_max: 1.0,
                output_min: -1.0,
            },
            throttle: LoopParams {
                gains: Gains { k_p: 0.1, k_i: 0.001, k_d: 0.1 },
                output_max: 0.3,
                output_min: 0.0,
            },
            initial_speed_mph: 15.0,
            speed_ramp_cycles: 200,
            run_speed_mph: 15.0,
            cte_slowdown_threshold_m: 0.3,
            cornering_speed_limit_mph: 30.0,
            twiddle: TwiddleParams::default(),
        }
    }
}

impl Params {
    /// Check the parameters are consistent.
    pub fn validate(&self) -> Result<(), DriveCtrlError> {
        self.steering.validate("steering")?;
        self.throttle.validate("throttle")?;

        if !(self.min_dt_s > 0.0) {
            return Err(DriveCtrlError::InvalidParams(format!(
                "min_dt_s must be positive, got {}", self.min_dt_s
            )));
        }

        let tw = &self.twiddle;
        if tw.run_limit == 0 {
            return Err(DriveCtrlError::InvalidParams(
                "twiddle.run_limit must be at least 1".into()
            ));
        }
        if !(tw.warmup_fraction >= 0.0 && tw.warmup_fraction < 1.0) {
            return Err(DriveCtrlError::InvalidParams(format!(
                "twiddle.warmup_fraction must be in [0, 1), got {}", tw.warmup_fraction
            )));
        }
        if tw.initial_steps.iter().any(|s| !(*s > 0.0)) {
            return Err(DriveCtrlError::InvalidParams(format!(
                "twiddle.initial_steps must all be positive, got {:?}", tw.initial_steps
            )));
        }

        Ok(())
    }
}

impl LoopParams {
    fn validate(&self, name: &str) -> Result<(), DriveCtrlError> {
        if self.output_max < self.output_min {
            return Err(DriveCtrlError::InvalidParams(format!(
                "{} output_max ({}) is less than output_min ({})",
                name, self.output_max, self.output_min
            )));
        }

        Ok(())
    }

    /// Build a controller for this loop.
    pub fn controller(&self) -> PidController {
        PidController::new(self.gains, self.output_max, self.output_min)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_params_valid() {
        assert!(Params::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_params() {
        let mut p = Params::default();
        p.throttle.output_min = 0.5;
        assert!(matches!(p.validate(), Err(DriveCtrlError::InvalidParams(_))));

        let mut p = Params::default();
        p.min_dt_s = 0.0;
        assert!(p.validate().is_err());

        let mut p = Params::default();
        p.twiddle.warmup_fraction = 1.0;
        assert!(p.validate().is_err());

        let mut p = Params::default();
        p.twiddle.run_limit = 0;
        assert!(p.validate().is_err());

        let mut p = Params::default();
        p.twiddle.initial_steps[2] = 0.0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_params_from_toml() {
        let toml_str = r#"
            tuning_enabled = true
            min_dt_s = 0.02
            initial_speed_mph = 15.0
            speed_ramp_cycles = 100
            run_speed_mph = 20.0
            cte_slowdown_threshold_m = 0.3
            cornering_speed_limit_mph = 30.0

            [steering]
            gains = { k_p = 0.12, k_i = 0.002, k_d = 0.05 }
            output_max = 1.0
            output_min = -1.0

            [throttle]
            gains = { k_p = 0.1, k_i = 0.001, k_d = 0.1 }
            output_max = 0.3
            output_min = 0.0

            [twiddle]
            initial_steps = [0.01, 0.01, 0.001]
            run_limit = 400
            warmup_fraction = 0.25
            best_rms_init = 1000.0
            max_cycles = 10
            step_tolerance = 0.00001
        "#;

        let p: Params = util::params::from_str(toml_str).unwrap();
        assert!(p.tuning_enabled);
        assert_eq!(p.speed_ramp_cycles, 100);
        assert_eq!(p.run_speed_mph, 20.0);
        assert_eq!(p.steering.gains.k_d, 0.05);
        assert_eq!(p.throttle.output_max, 0.3);
        assert_eq!(p.twiddle.initial_steps, [0.01, 0.01, 0.001]);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_shipped_params_valid() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../params/drive_ctrl.toml");

        let p: Params = util::params::load_from_path(path).unwrap();
        assert!(p.validate().is_ok());
        assert!(!p.tuning_enabled);
        assert_eq!(p.steering.gains, Params::default().steering.gains);
        assert_eq!(p.twiddle.run_limit, 400);
    }
}
