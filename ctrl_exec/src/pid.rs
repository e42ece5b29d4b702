//! # PID controller module
//!
//! This module provides the PID controller used by DriveCtrl for both the steering and throttle
//! loops. The controller is not time-aware, the elapsed time since the previous sample must be
//! passed in by the caller, who is also responsible for filtering out degenerate time steps.
//!
//! The output of the controller is the negative of the weighted error sum, so a positive error
//! produces a corrective demand in the negative direction:
//!
//! ```text
//! raw = -(k_p * proportional + k_d * derivative + k_i * integral)
//! ```
//!
//! The output is limited to `[output_min, output_max]`. Whenever the raw output is outside of the
//! limits the integral term is moved by the amount of the excess, in the direction which brings
//! the raw output back towards the limit (anti-windup).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use util::{maths::clamp, raise_error};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The gains of a PID controller.
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Gains {
    /// Proportional gain
    pub k_p: f64,

    /// Integral gain
    pub k_i: f64,

    /// Dervative gain
    pub k_d: f64,
}

/// The error terms accumulated by a PID controller.
#[derive(Debug, Default, Serialize, Clone, Copy, PartialEq)]
pub struct ErrorTerms {
    /// The most recent error sample
    pub proportional: f64,

    /// Sum of all error samples since the last (re)initialisation, including any anti-windup
    /// corrections.
    pub integral: f64,

    /// Rate of change of the error over the most recent time step
    pub derivative: f64,
}

/// A PID controller with a limited output.
#[derive(Debug, Serialize, Clone)]
pub struct PidController {
    gains: Gains,

    terms: ErrorTerms,

    /// Output maximum limit
    output_max: f64,

    /// Output minimum limit
    output_min: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {

    /// Create a new controller with the given gains and output limits.
    ///
    /// # Panics
    /// - If `output_max < output_min`.
    pub fn new(gains: Gains, output_max: f64, output_min: f64) -> Self {
        let mut ctrl = Self {
            gains,
            terms: ErrorTerms::default(),
            output_max,
            output_min,
        };
        ctrl.initialize(gains.k_p, gains.k_i, gains.k_d, output_max, output_min);
        ctrl
    }

    /// Set the gains and output limits and zero all error terms.
    ///
    /// # Panics
    /// - If `output_max < output_min`, which is a configuration error that cannot be recovered
    ///   from.
    pub fn initialize(
        &mut self,
        k_p: f64,
        k_i: f64,
        k_d: f64,
        output_max: f64,
        output_min: f64
    ) {
        if output_max < output_min {
            raise_error!(
                "PID output maximum ({}) is less than the output minimum ({})",
                output_max,
                output_min
            );
        }

        self.gains = Gains { k_p, k_i, k_d };
        self.output_max = output_max;
        self.output_min = output_min;
        self.terms = ErrorTerms::default();
    }

    /// Re-initialise the controller with new gains, keeping the current output limits.
    pub fn restart(&mut self, k_p: f64, k_i: f64, k_d: f64) {
        let (output_max, output_min) = (self.output_max, self.output_min);
        self.initialize(k_p, k_i, k_d, output_max, output_min);
    }

    /// Update the error terms with a new error sample.
    ///
    /// `dt` is the time elapsed since the previous sample in seconds and must be positive.
    pub fn update_error(&mut self, error: f64, dt: f64) {
        debug_assert!(dt > 0.0, "PID time step must be positive, got {}", dt);

        self.terms.derivative = (error - self.terms.proportional) / dt;
        self.terms.integral += error;
        self.terms.proportional = error;
    }

    /// Compute the limited output of the controller for the current error terms.
    ///
    /// If the raw output exceeds a limit the integral term is corrected by the excess before the
    /// output is limited.
    pub fn compute_output(&mut self) -> f64 {
        let raw = -self.gains.k_p * self.terms.proportional
            - self.gains.k_d * self.terms.derivative
            - self.gains.k_i * self.terms.integral;

        let (output, limited) = clamp(&raw, &self.output_min, &self.output_max);

        // Output is the negated sum, so moving the integral by the excess pulls the raw output
        // back towards the limit
        if limited {
            self.terms.integral += raw - output;
        }

        output
    }

    /// Returns true if the given output is at one of the limits.
    pub fn is_saturated(&self, output: f64) -> bool {
        output >= self.output_max || output <= self.output_min
    }

    /// Get the current gains.
    pub fn gains(&self) -> Gains {
        self.gains
    }

    /// Get the current error terms.
    pub fn terms(&self) -> ErrorTerms {
        self.terms
    }

    /// Get the output limits as `(max, min)`.
    pub fn output_limits(&self) -> (f64, f64) {
        (self.output_max, self.output_min)
    }
}
