//! # Twiddle gain tuner
//!
//! Twiddle is a coordinate ascent search over the gains of a [`PidController`]. The tuner owns the
//! controller and runs it for a fixed number of samples per trial, scoring each trial by the mean
//! squared error over the settled part of the trial (the first `warmup_fraction` of the samples
//! are ignored while transients die away).
//!
//! One gain is perturbed at a time, in the order Kp, Kd, Ki. For each gain the search goes
//! through up to three phases:
//!
//! - `Start`: the trial at the current gains has finished, step the gain up and restart.
//! - `Up`: if stepping up helped grow the step and move to the next gain, otherwise step down
//!   (by twice the step) and restart.
//! - `Down`: if stepping down helped grow the step, otherwise return the gain to where it was and
//!   shrink the step. Either way move on to the next gain.
//!
//! The tuner never decides when to stop, [`Twiddle::is_complete`] is there for the caller.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info};
use serde::{Deserialize, Serialize};

// Internal
use crate::pid::{Gains, PidController};
use util::raise_error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Factor the step of a gain is grown by after a successful perturbation.
pub const STEP_GROWTH: f64 = 1.1;

/// Factor the step of a gain is shrunk by when neither direction improved the score.
pub const STEP_SHRINK: f64 = 0.9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the twiddle search.
#[derive(Debug, Clone, Deserialize)]
pub struct TwiddleParams {
    /// Initial perturbation steps, ordered as the search vector: `[Kp, Kd, Ki]`.
    pub initial_steps: [f64; 3],

    /// Number of samples in each trial.
    pub run_limit: usize,

    /// Fraction of each trial which is not scored.
    pub warmup_fraction: f64,

    /// Starting value of the best score, should be larger than any real score.
    pub best_rms_init: f64,

    /// Number of full passes over the gains after which tuning is considered complete.
    pub max_cycles: u64,

    /// Tuning is considered complete once the sum of the steps is at or below this value.
    pub step_tolerance: f64,
}

/// A set of gains in search order.
///
/// The derivative gain is searched before the integral gain, so the ordering differs from the
/// `(Kp, Ki, Kd)` ordering used by [`Gains`].
#[derive(Debug, Default, Serialize, Clone, Copy, PartialEq)]
pub struct SearchVector {
    pub k_p: f64,
    pub k_d: f64,
    pub k_i: f64,
}

/// The current position of the search.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct SearchState {
    /// The gain being perturbed
    pub gain: SearchGain,

    /// The phase of the search for this gain
    pub phase: Phase,
}

/// Summary of a finished trial.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct TrialReport {
    /// Number of the trial, starting at 0.
    pub trial: u64,

    /// The state the trial was run in.
    pub state: SearchState,

    /// Score of this trial.
    pub rms: f64,

    /// Best score after this trial.
    pub best_rms: f64,

    /// Whether the trial improved on the best score.
    pub verdict: Verdict,

    /// The candidate gains after the transition.
    pub p: SearchVector,

    /// The steps after the transition.
    pub dp: SearchVector,

    /// Number of completed passes over all gains.
    pub num_cycles: u64,
}

/// The tuner.
#[derive(Debug, Clone)]
pub struct Twiddle {
    /// The controller under test
    controller: PidController,

    /// Candidate gains
    p: SearchVector,

    /// Perturbation steps
    dp: SearchVector,

    state: SearchState,

    run_limit: usize,

    /// Number of samples at the start of each trial which are not scored
    warmup_samples: usize,

    /// Number of samples received in the current trial
    run_counter: usize,

    /// Sum of squared errors over the scored part of the current trial
    sum_sq_error: f64,

    best_rms: f64,

    num_trials: u64,

    num_cycles: u64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The gains in the order they are searched.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum SearchGain {
    Kp,
    Kd,
    Ki,
}

/// The phase of the search for a single gain.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Trial at the unperturbed gain
    Start,

    /// Trial with the gain stepped up
    Up,

    /// Trial with the gain stepped down
    Down,
}

/// Outcome of a trial.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The trial's score was strictly better than the best score
    Good,

    /// It wasn't
    Bad,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for TwiddleParams {
    fn default() -> Self {
        Self {
            initial_steps: [0.01, 0.01, 0.001],
            run_limit: 400,
            warmup_fraction: 0.25,
            best_rms_init: 1e3,
            max_cycles: 10,
            step_tolerance: 1e-5,
        }
    }
}

impl SearchGain {
    /// Position of the gain in the search vector.
    pub fn index(self) -> usize {
        match self {
            SearchGain::Kp => 0,
            SearchGain::Kd => 1,
            SearchGain::Ki => 2,
        }
    }

    /// The gain searched after this one, wrapping from Ki back to Kp.
    pub fn next(self) -> Self {
        match self {
            SearchGain::Kp => SearchGain::Kd,
            SearchGain::Kd => SearchGain::Ki,
            SearchGain::Ki => SearchGain::Kp,
        }
    }
}

impl SearchVector {
    /// Build from an array in search order `[Kp, Kd, Ki]`.
    pub fn from_array(a: [f64; 3]) -> Self {
        Self {
            k_p: a[0],
            k_d: a[1],
            k_i: a[2],
        }
    }

    /// Get the values in search order `[Kp, Kd, Ki]`.
    pub fn as_array(&self) -> [f64; 3] {
        [self.k_p, self.k_d, self.k_i]
    }

    /// Sum of all three values.
    pub fn sum(&self) -> f64 {
        self.k_p + self.k_d + self.k_i
    }

    pub fn get(&self, gain: SearchGain) -> f64 {
        match gain {
            SearchGain::Kp => self.k_p,
            SearchGain::Kd => self.k_d,
            SearchGain::Ki => self.k_i,
        }
    }

    pub fn get_mut(&mut self, gain: SearchGain) -> &mut f64 {
        match gain {
            SearchGain::Kp => &mut self.k_p,
            SearchGain::Kd => &mut self.k_d,
            SearchGain::Ki => &mut self.k_i,
        }
    }
}

impl From<Gains> for SearchVector {
    fn from(g: Gains) -> Self {
        Self {
            k_p: g.k_p,
            k_d: g.k_d,
            k_i: g.k_i,
        }
    }
}

impl From<SearchVector> for Gains {
    fn from(p: SearchVector) -> Self {
        Gains {
            k_p: p.k_p,
            k_i: p.k_i,
            k_d: p.k_d,
        }
    }
}

impl Twiddle {
    /// Create a new tuner for the given controller.
    ///
    /// The search starts from the controller's current gains.
    ///
    /// Panics if `run_limit` is zero or `warmup_fraction` is outside `[0, 1)`, either would leave
    /// no samples to score.
    pub fn new(controller: PidController, params: &TwiddleParams) -> Self {
        if params.run_limit == 0 {
            raise_error!("Twiddle run limit must be at least one sample");
        }
        if !(params.warmup_fraction >= 0.0 && params.warmup_fraction < 1.0) {
            raise_error!(
                "Twiddle warm-up fraction must be in [0, 1), found {}",
                params.warmup_fraction
            );
        }

        let warmup_samples = (params.warmup_fraction * params.run_limit as f64).floor() as usize;

        Self {
            p: SearchVector::from(controller.gains()),
            dp: SearchVector::from_array(params.initial_steps),
            controller,
            state: SearchState {
                gain: SearchGain::Kp,
                phase: Phase::Start,
            },
            run_limit: params.run_limit,
            warmup_samples,
            run_counter: 0,
            sum_sq_error: 0.0,
            best_rms: params.best_rms_init,
            num_trials: 0,
            num_cycles: 0,
        }
    }

    /// Feed an error sample into the current trial.
    ///
    /// Returns a report when the sample finishes the trial. The sample which finishes a trial is
    /// not scored.
    pub fn step(&mut self, error: f64) -> Option<TrialReport> {
        if self.run_counter < self.run_limit {
            if self.run_counter > self.warmup_samples {
                self.sum_sq_error += error * error;
            }
            self.run_counter += 1;
            return None;
        }

        Some(self.finish_trial())
    }

    /// Returns true once `max_cycles` passes have been made or the steps have converged.
    pub fn is_complete(&self, max_cycles: u64, step_tolerance: f64) -> bool {
        self.num_cycles >= max_cycles || self.dp.sum() <= step_tolerance
    }

    /// Restart the controller with the candidate gains unless it is already running them.
    ///
    /// A rejected down trial hands its gain back to the candidate without restarting, so the
    /// controller can still be running the rejected gains when the search stops.
    pub fn adopt_candidate(&mut self) {
        if self.controller.gains() != Gains::from(self.p) {
            self.restart_controller();
        }
    }

    /// Stop tuning, returning the controller running the candidate gains.
    pub fn into_controller(mut self) -> PidController {
        self.adopt_candidate();
        self.controller
    }

    /// The controller being tuned.
    pub fn controller(&self) -> &PidController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut PidController {
        &mut self.controller
    }

    /// The candidate gains.
    pub fn p(&self) -> SearchVector {
        self.p
    }

    /// The perturbation steps.
    pub fn dp(&self) -> SearchVector {
        self.dp
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn best_rms(&self) -> f64 {
        self.best_rms
    }

    pub fn num_cycles(&self) -> u64 {
        self.num_cycles
    }

    /// Score, judge and transition at the end of a trial.
    fn finish_trial(&mut self) -> TrialReport {
        let rms = self.sum_sq_error / (self.run_limit - self.warmup_samples) as f64;

        let verdict = if rms < self.best_rms {
            self.best_rms = rms;
            Verdict::Good
        }
        else {
            Verdict::Bad
        };

        info!(
            "Twiddle cycle {} trial {} ({:?} {:?}): rms {:.6} ({:?}, best {:.6})",
            self.num_cycles,
            self.num_trials,
            self.state.gain,
            self.state.phase,
            rms,
            verdict,
            self.best_rms
        );

        self.run_counter = 0;
        self.sum_sq_error = 0.0;

        let trial_state = self.state;
        self.state = self.transition(verdict);

        if trial_state.gain == SearchGain::Ki && self.state.gain == SearchGain::Kp {
            self.num_cycles += 1;
        }

        debug!(
            "Twiddle steps: Kp {:.6}, Kd {:.6}, Ki {:.6}",
            self.dp.k_p, self.dp.k_d, self.dp.k_i
        );

        let report = TrialReport {
            trial: self.num_trials,
            state: trial_state,
            rms,
            best_rms: self.best_rms,
            verdict,
            p: self.p,
            dp: self.dp,
            num_cycles: self.num_cycles,
        };

        self.num_trials += 1;

        report
    }

    /// Apply the phase transition for the current gain, returning the next state.
    fn transition(&mut self, verdict: Verdict) -> SearchState {
        let gain = self.state.gain;
        let step = self.dp.get(gain);

        match (self.state.phase, verdict) {
            (Phase::Start, _) => {
                *self.p.get_mut(gain) += step;
                self.restart_controller();
                SearchState { gain, phase: Phase::Up }
            },
            (Phase::Up, Verdict::Good) | (Phase::Down, Verdict::Good) => {
                *self.dp.get_mut(gain) *= STEP_GROWTH;
                SearchState { gain: gain.next(), phase: Phase::Start }
            },
            (Phase::Up, Verdict::Bad) => {
                *self.p.get_mut(gain) -= 2.0 * step;
                self.restart_controller();
                SearchState { gain, phase: Phase::Down }
            },
            (Phase::Down, Verdict::Bad) => {
                *self.p.get_mut(gain) += step;
                *self.dp.get_mut(gain) *= STEP_SHRINK;
                SearchState { gain: gain.next(), phase: Phase::Start }
            },
        }
    }

    /// Re-initialise the controller with the candidate gains, clearing its error terms.
    fn restart_controller(&mut self) {
        let gains = Gains::from(self.p);
        info!(
            "Set new PID Kp {:.6}, Ki {:.6}, Kd {:.6}",
            gains.k_p, gains.k_i, gains.k_d
        );
        self.controller.restart(gains.k_p, gains.k_i, gains.k_d);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const EPS: f64 = 1e-12;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    fn short_params() -> TwiddleParams {
        TwiddleParams {
            run_limit: 4,
            ..Default::default()
        }
    }

    fn tuner(params: &TwiddleParams) -> Twiddle {
        let ctrl = PidController::new(
            Gains { k_p: 0.1, k_i: 0.001, k_d: 0.05 },
            1.0,
            -1.0
        );
        Twiddle::new(ctrl, params)
    }

    /// Run a whole trial with a constant error, returning its report.
    fn run_trial(tw: &mut Twiddle, error: f64) -> TrialReport {
        for _ in 0..tw.run_limit {
            assert!(tw.step(error).is_none());
        }
        tw.step(error).expect("Trial should have finished")
    }

    #[test]
    fn test_initial_state() {
        let tw = tuner(&TwiddleParams::default());

        // Search order is Kp, Kd, Ki
        assert_eq!(tw.p().as_array(), [0.1, 0.05, 0.001]);
        assert_eq!(tw.dp().as_array(), [0.01, 0.01, 0.001]);
        assert_eq!(tw.state(), SearchState { gain: SearchGain::Kp, phase: Phase::Start });
        assert_eq!(tw.best_rms(), 1e3);
        assert_eq!(tw.num_cycles(), 0);
    }

    #[test]
    fn test_trial_scoring_default_window() {
        let mut tw = tuner(&TwiddleParams::default());

        // Samples 101 to 399 are scored, normalised over 300
        let report = run_trial(&mut tw, 1.0);
        assert!(approx_eq(report.rms, 299.0 / 300.0), "rms = {}", report.rms);
        assert_eq!(report.verdict, Verdict::Good);
        assert_eq!(report.trial, 0);
    }

    #[test]
    fn test_trial_scoring_fractional_window() {
        let params = TwiddleParams {
            run_limit: 10,
            warmup_fraction: 0.25,
            ..Default::default()
        };
        let mut tw = tuner(&params);

        // floor(2.5) = 2 warm-up samples, samples 3 to 9 scored, normalised over 8
        let report = run_trial(&mut tw, 2.0);
        assert!(approx_eq(report.rms, 7.0 * 4.0 / 8.0), "rms = {}", report.rms);
    }

    #[test]
    fn test_warmup_samples_ignored() {
        let mut tw = tuner(&short_params());

        // run_limit 4, warm-up 1: only samples 2 and 3 are scored
        assert!(tw.step(100.0).is_none());
        assert!(tw.step(100.0).is_none());
        assert!(tw.step(1.0).is_none());
        assert!(tw.step(1.0).is_none());
        let report = tw.step(100.0).unwrap();
        assert!(approx_eq(report.rms, 2.0 / 3.0));
    }

    #[test]
    fn test_start_perturbs_and_restarts() {
        let mut tw = tuner(&short_params());

        // Put some history into the controller
        tw.controller_mut().update_error(0.5, 0.1);

        let report = run_trial(&mut tw, 1.0);
        assert_eq!(report.state, SearchState { gain: SearchGain::Kp, phase: Phase::Start });
        assert!(approx_eq(report.p.k_p, 0.11));
        assert_eq!(tw.state(), SearchState { gain: SearchGain::Kp, phase: Phase::Up });

        // Controller restarted with the candidate gains
        let gains = tw.controller().gains();
        assert!(approx_eq(gains.k_p, 0.11));
        assert_eq!(gains.k_i, 0.001);
        assert_eq!(gains.k_d, 0.05);
        assert_eq!(tw.controller().terms().integral, 0.0);
        assert_eq!(tw.controller().output_limits(), (1.0, -1.0));
    }

    #[test]
    fn test_up_bad_down_bad_restores_gain() {
        let mut tw = tuner(&short_params());

        // Start sets the best score, both perturbations are worse
        run_trial(&mut tw, 1.0);
        let up = run_trial(&mut tw, 2.0);
        assert_eq!(up.verdict, Verdict::Bad);
        assert_eq!(tw.state(), SearchState { gain: SearchGain::Kp, phase: Phase::Down });
        assert!(approx_eq(tw.controller().gains().k_p, 0.09));

        let down = run_trial(&mut tw, 2.0);
        assert_eq!(down.verdict, Verdict::Bad);

        assert!(approx_eq(tw.p().k_p, 0.1));
        assert!(approx_eq(tw.dp().k_p, 0.01 * STEP_SHRINK));
        assert_eq!(tw.state(), SearchState { gain: SearchGain::Kd, phase: Phase::Start });

        // Other gains untouched
        assert_eq!(tw.p().k_d, 0.05);
        assert_eq!(tw.p().k_i, 0.001);
        assert_eq!(tw.dp().k_d, 0.01);
    }

    #[test]
    fn test_up_good_keeps_gain() {
        let mut tw = tuner(&short_params());

        run_trial(&mut tw, 1.0);
        let up = run_trial(&mut tw, 0.5);
        assert_eq!(up.verdict, Verdict::Good);
        assert!(approx_eq(up.best_rms, 2.0 * 0.25 / 3.0));

        assert!(approx_eq(tw.p().k_p, 0.11));
        assert!(approx_eq(tw.dp().k_p, 0.01 * STEP_GROWTH));
        assert_eq!(tw.state(), SearchState { gain: SearchGain::Kd, phase: Phase::Start });
    }

    #[test]
    fn test_down_good_keeps_gain() {
        let mut tw = tuner(&short_params());

        run_trial(&mut tw, 1.0);
        run_trial(&mut tw, 2.0);
        let down = run_trial(&mut tw, 0.5);
        assert_eq!(down.verdict, Verdict::Good);

        assert!(approx_eq(tw.p().k_p, 0.09));
        assert!(approx_eq(tw.dp().k_p, 0.01 * STEP_GROWTH));
        assert_eq!(tw.state(), SearchState { gain: SearchGain::Kd, phase: Phase::Start });
    }

    #[test]
    fn test_equal_score_is_bad() {
        let mut tw = tuner(&short_params());

        run_trial(&mut tw, 1.0);
        let up = run_trial(&mut tw, 1.0);
        assert_eq!(up.verdict, Verdict::Bad);
    }

    #[test]
    fn test_gain_ordering_maps_to_controller() {
        let mut tw = tuner(&short_params());

        // Kp: start, up good
        run_trial(&mut tw, 1.0);
        run_trial(&mut tw, 0.9);

        // Kd: the start trial steps the derivative gain
        run_trial(&mut tw, 0.8);
        let gains = tw.controller().gains();
        assert!(approx_eq(gains.k_p, 0.11));
        assert!(approx_eq(gains.k_d, 0.06));
        assert_eq!(gains.k_i, 0.001);
        assert!(approx_eq(tw.p().as_array()[1], 0.06));
        run_trial(&mut tw, 0.7);

        // Ki
        run_trial(&mut tw, 0.6);
        let gains = tw.controller().gains();
        assert!(approx_eq(gains.k_i, 0.002));
        assert!(approx_eq(gains.k_d, 0.06));
        assert!(approx_eq(tw.p().as_array()[2], 0.002));
    }

    #[test]
    fn test_cycle_counter_wraps() {
        let mut tw = tuner(&short_params());

        // Decreasing errors so every trial is good: two trials per gain
        let mut error = 1.0;
        for i in 0..6 {
            assert_eq!(tw.num_cycles(), 0, "trial {}", i);
            let report = run_trial(&mut tw, error);
            assert_eq!(report.verdict, Verdict::Good);
            error *= 0.9;
        }

        assert_eq!(tw.num_cycles(), 1);
        assert_eq!(tw.state(), SearchState { gain: SearchGain::Kp, phase: Phase::Start });
        assert!(tw.is_complete(1, 1e-5));
        assert!(!tw.is_complete(2, 1e-5));
    }

    #[test]
    fn test_is_complete_on_step_convergence() {
        let params = TwiddleParams {
            initial_steps: [4e-6, 4e-6, 1e-6],
            ..short_params()
        };
        let tw = tuner(&params);
        assert!(tw.is_complete(10, 1e-5));

        let tw = tuner(&short_params());
        assert!(!tw.is_complete(10, 1e-5));
    }

    #[test]
    fn test_rejected_down_trial_left_running_until_adopted() {
        let params = TwiddleParams {
            run_limit: 2,
            max_cycles: 1,
            ..Default::default()
        };
        let mut tw = tuner(&params);

        // Kp and Kd improve, Ki improves at start then both of its perturbations are worse
        for error in &[1.0, 0.5, 0.4, 0.3, 0.2, 1.0, 1.0] {
            run_trial(&mut tw, *error);
        }
        assert!(tw.is_complete(params.max_cycles, params.step_tolerance));
        assert!(approx_eq(tw.p().k_i, 0.001));

        // Still on the down candidate
        assert!(approx_eq(tw.controller().gains().k_i, 0.0));

        tw.adopt_candidate();
        assert_eq!(tw.controller().gains(), Gains::from(tw.p()));
        assert_eq!(tw.controller().terms().integral, 0.0);

        let p = tw.p();
        let ctrl = tw.into_controller();
        assert_eq!(ctrl.gains(), Gains::from(p));
    }

    #[test]
    fn test_adopt_candidate_keeps_running_controller() {
        let mut tw = tuner(&short_params());

        // Kp start restarted the controller with the candidate already
        run_trial(&mut tw, 1.0);
        tw.controller_mut().update_error(0.5, 0.1);
        tw.adopt_candidate();
        assert_eq!(tw.controller().terms().proportional, 0.5);
    }

    #[test]
    #[should_panic]
    fn test_zero_run_limit_panics() {
        tuner(&TwiddleParams {
            run_limit: 0,
            ..Default::default()
        });
    }

    #[test]
    #[should_panic]
    fn test_full_warmup_panics() {
        tuner(&TwiddleParams {
            warmup_fraction: 1.0,
            ..Default::default()
        });
    }

    #[test]
    fn test_gains_conversion() {
        let g = Gains { k_p: 1.0, k_i: 2.0, k_d: 3.0 };
        let p = SearchVector::from(g);
        assert_eq!(p.as_array(), [1.0, 3.0, 2.0]);
        assert_eq!(Gains::from(p), g);
    }
}
