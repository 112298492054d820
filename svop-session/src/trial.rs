//! Per-stimulus gaze-dwell evaluation.
//!
//! One [`TrialStateMachine`] lives for exactly one presentation of a stimulus.
//! Each call to [`TrialStateMachine::tick`] is one iteration of the run loop:
//!
//! 1. drain control signals: QUIT ends the session, SKIP and RETRY end the
//!    trial without a verdict (SKIP wins over RETRY), PAUSE toggles pause;
//! 2. while paused nothing else happens, the tracker is not even polled;
//! 3. otherwise one sample is polled, smoothed and classified, and the dwell
//!    rule (PASS) is checked before the timeout rule (FAIL).
//!
//! Elapsed active time excludes every completed pause and freezes while a
//! pause is in progress, so pausing never counts against the timeout.

use svop_core::{
    ControlSignal, GazePoint, GazeSmoother, GazeTracker, StimulusPoint, TrialOutcome, TrialRecord,
};
use svop_timing::NANOS_PER_SEC;
use tracing::{debug, info};

use crate::config::TrialPolicy;

#[derive(Debug, Clone)]
pub struct TrialStateMachine {
    point: StimulusPoint,
    pass_dwell_ns: u64,
    timeout_ns: u64,
    tolerance_px: f64,
    reset_dwell_on_pause: bool,

    smoother: GazeSmoother,
    start_ns: u64,
    total_pause_ns: u64,
    pause_start_ns: Option<u64>,
    dwell_start_ns: Option<u64>,
    distance: Option<f64>,
    outcome: Option<TrialOutcome>,
}

impl TrialStateMachine {
    pub fn new(point: StimulusPoint, diameter_px: i32, policy: &TrialPolicy, now_ns: u64) -> Self {
        debug!(
            "trial for stimulus {} at ({}, {}) started at {} ns",
            point.index, point.x, point.y, now_ns
        );
        Self {
            point,
            pass_dwell_ns: policy.pass_dwell_ns(),
            timeout_ns: policy.timeout_ns(),
            tolerance_px: policy.tolerance_px(diameter_px),
            reset_dwell_on_pause: policy.reset_dwell_on_pause,
            smoother: GazeSmoother::new(policy.smoothing_window),
            start_ns: now_ns,
            total_pause_ns: 0,
            pause_start_ns: None,
            dwell_start_ns: None,
            distance: None,
            outcome: None,
        }
    }

    /// Runs one iteration. Returns the outcome once the trial has concluded;
    /// further ticks keep returning it without touching the tracker.
    pub fn tick<G>(&mut self, now_ns: u64, signals: &[ControlSignal], tracker: &mut G) -> Option<TrialOutcome>
    where
        G: GazeTracker + ?Sized,
    {
        if self.outcome.is_some() {
            return self.outcome;
        }

        let (mut quit, mut skip, mut retry) = (false, false, false);
        for signal in signals {
            match signal {
                ControlSignal::PauseToggle => self.toggle_pause(now_ns),
                ControlSignal::Skip => skip = true,
                ControlSignal::Retry => retry = true,
                ControlSignal::Quit => quit = true,
            }
        }
        if quit {
            return self.conclude(TrialOutcome::Quit);
        }
        if skip {
            return self.conclude(TrialOutcome::Skip);
        }
        if retry {
            return self.conclude(TrialOutcome::Retry);
        }

        if self.is_paused() {
            return None;
        }

        let sample = tracker.gaze_sample().and_then(|s| s.point());
        if let Some(p) = sample {
            self.smoother.push(p);
            self.distance = self.smoother.distance_to(&self.point);
        }

        let inside = sample.is_some() && self.distance.is_some_and(|d| d <= self.tolerance_px);
        if inside {
            self.dwell_start_ns.get_or_insert(now_ns);
        } else {
            self.dwell_start_ns = None;
        }

        if let Some(dwell_start) = self.dwell_start_ns {
            if now_ns.saturating_sub(dwell_start) >= self.pass_dwell_ns {
                return self.conclude(TrialOutcome::Pass);
            }
        }

        if self.elapsed_active_ns(now_ns) > self.timeout_ns {
            return self.conclude(TrialOutcome::Fail);
        }

        None
    }

    fn toggle_pause(&mut self, now_ns: u64) {
        match self.pause_start_ns.take() {
            Some(paused_at) => {
                let paused_for = now_ns.saturating_sub(paused_at);
                self.total_pause_ns += paused_for;
                info!(
                    "stimulus {} resumed after {:.2} s pause",
                    self.point.index,
                    paused_for as f64 / NANOS_PER_SEC as f64
                );
            }
            None => {
                self.pause_start_ns = Some(now_ns);
                if self.reset_dwell_on_pause {
                    self.dwell_start_ns = None;
                }
                info!("stimulus {} paused", self.point.index);
            }
        }
    }

    fn conclude(&mut self, outcome: TrialOutcome) -> Option<TrialOutcome> {
        self.outcome = Some(outcome);
        Some(outcome)
    }

    /// Active time since the trial started, frozen while paused.
    pub fn elapsed_active_ns(&self, now_ns: u64) -> u64 {
        let reference = self.pause_start_ns.unwrap_or(now_ns);
        reference
            .saturating_sub(self.start_ns)
            .saturating_sub(self.total_pause_ns)
    }

    pub fn elapsed_active_secs(&self, now_ns: u64) -> f64 {
        self.elapsed_active_ns(now_ns) as f64 / NANOS_PER_SEC as f64
    }

    /// Fraction of the dwell requirement met so far, in `[0, 1]`.
    pub fn dwell_progress(&self, now_ns: u64) -> f64 {
        match self.dwell_start_ns {
            Some(start) if self.pass_dwell_ns > 0 => {
                (now_ns.saturating_sub(start) as f64 / self.pass_dwell_ns as f64).min(1.0)
            }
            Some(_) => 1.0,
            None => 0.0,
        }
    }

    /// The record this trial produces, if it ended with a verdict.
    pub fn record(&self) -> Option<TrialRecord> {
        let verdict = self.outcome?.verdict()?;
        Some(TrialRecord::new(&self.point, self.distance, verdict))
    }

    pub fn point(&self) -> StimulusPoint {
        self.point
    }

    pub fn is_paused(&self) -> bool {
        self.pause_start_ns.is_some()
    }

    pub fn estimate(&self) -> Option<GazePoint> {
        self.smoother.estimate()
    }

    /// Smoothed distance computed on the most recent sample, if any.
    pub fn distance(&self) -> Option<f64> {
        self.distance
    }

    pub fn tolerance_px(&self) -> f64 {
        self.tolerance_px
    }

    pub fn outcome(&self) -> Option<TrialOutcome> {
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svop_core::{GazeSample, ScriptedTracker, Verdict};
    use svop_timing::NANOS_PER_MILLI;

    const TICK_MS: u64 = 10;
    const DIAMETER: i32 = 32;

    fn target() -> StimulusPoint {
        StimulusPoint::new(1, 1000, 500)
    }

    fn on_target() -> Option<GazeSample> {
        Some(GazeSample::new(1000.0, 500.0))
    }

    fn far_away() -> Option<GazeSample> {
        Some(GazeSample::new(0.0, 0.0))
    }

    /// Drives the machine at a fixed 10 ms tick.
    struct Harness {
        trial: TrialStateMachine,
        now_ms: u64,
    }

    impl Harness {
        fn new(policy: TrialPolicy) -> Self {
            Self {
                trial: TrialStateMachine::new(target(), DIAMETER, &policy, 0),
                now_ms: 0,
            }
        }

        fn step(&mut self, signals: &[ControlSignal], tracker: &mut ScriptedTracker) -> Option<TrialOutcome> {
            self.now_ms += TICK_MS;
            self.trial.tick(self.now_ms * NANOS_PER_MILLI, signals, tracker)
        }

        fn run(&mut self, tracker: &mut ScriptedTracker, ticks: usize) -> Option<TrialOutcome> {
            for _ in 0..ticks {
                if let Some(o) = self.step(&[], tracker) {
                    return Some(o);
                }
            }
            None
        }
    }

    #[test]
    fn continuous_dwell_passes() {
        let mut h = Harness::new(TrialPolicy::default());
        let mut tracker = ScriptedTracker::steady(1000.0, 500.0);
        assert_eq!(h.run(&mut tracker, 100), Some(TrialOutcome::Pass));
        // first inside tick at 10 ms, pass once 500 ms have elapsed since
        assert_eq!(h.now_ms, 510);
        let rec = h.trial.record().unwrap();
        assert_eq!(rec.result, Verdict::Pass);
        assert_eq!(rec.distance, Some(0.0));
    }

    #[test]
    fn never_inside_fails_after_timeout() {
        let mut h = Harness::new(TrialPolicy::default());
        let mut tracker = ScriptedTracker::steady(0.0, 0.0);
        assert_eq!(h.run(&mut tracker, 1000), Some(TrialOutcome::Fail));
        assert_eq!(h.now_ms, 5010);
        let rec = h.trial.record().unwrap();
        assert_eq!(rec.result, Verdict::Fail);
        assert!(rec.distance.unwrap() > h.trial.tolerance_px());
    }

    #[test]
    fn no_samples_fail_with_no_distance() {
        let mut h = Harness::new(TrialPolicy::default());
        let mut tracker = ScriptedTracker::default();
        assert_eq!(h.run(&mut tracker, 1000), Some(TrialOutcome::Fail));
        assert_eq!(h.trial.record().unwrap().distance, None);
    }

    #[test]
    fn single_outside_tick_resets_dwell() {
        // unsmoothed, so one far sample is exactly one outside tick
        let mut h = Harness::new(TrialPolicy {
            smoothing_window: 1,
            ..TrialPolicy::default()
        });
        let mut script = vec![on_target(); 30];
        script.push(far_away());
        let mut tracker = ScriptedTracker::new(script).with_fallback(on_target());

        for _ in 0..31 {
            assert_eq!(h.step(&[], &mut tracker), None);
        }
        assert_eq!(h.trial.dwell_progress(h.now_ms * NANOS_PER_MILLI), 0.0);

        // dwell restarts at 320 ms, the first inside tick after the gap
        assert_eq!(h.run(&mut tracker, 100), Some(TrialOutcome::Pass));
        assert_eq!(h.now_ms, 820);
    }

    #[test]
    fn missing_sample_resets_dwell() {
        let mut h = Harness::new(TrialPolicy::default());
        let mut script = vec![on_target(); 30];
        script.push(None);
        script.extend(vec![on_target(); 30]);
        let mut tracker = ScriptedTracker::new(script);

        for _ in 0..61 {
            assert_eq!(h.step(&[], &mut tracker), None);
        }
        // the last 30 inside ticks only count from the gap onwards
        assert!(h.trial.dwell_progress(h.now_ms * NANOS_PER_MILLI) < 0.6);
    }

    #[test]
    fn smoothing_tolerates_a_single_noisy_sample() {
        let mut h = Harness::new(TrialPolicy::default());
        let mut script = vec![on_target(); 20];
        // 1000 px off: mean moves by 100 px, well inside 480 px tolerance
        script.push(Some(GazeSample::new(2000.0, 500.0)));
        let mut tracker = ScriptedTracker::new(script).with_fallback(on_target());
        assert_eq!(h.run(&mut tracker, 100), Some(TrialOutcome::Pass));
        assert_eq!(h.now_ms, 510);
    }

    #[test]
    fn invalid_samples_are_not_smoothed() {
        let mut h = Harness::new(TrialPolicy::default());
        let mut tracker = ScriptedTracker::new(vec![on_target(), Some(GazeSample::invalid())]);
        h.step(&[], &mut tracker);
        h.step(&[], &mut tracker);
        assert_eq!(h.trial.estimate(), Some(GazePoint::new(1000.0, 500.0)));
        assert_eq!(h.trial.dwell_progress(h.now_ms * NANOS_PER_MILLI), 0.0);
    }

    #[test]
    fn pause_does_not_count_against_timeout() {
        let mut h = Harness::new(TrialPolicy::default());
        let mut tracker = ScriptedTracker::steady(0.0, 0.0);

        // 3 s active
        assert_eq!(h.run(&mut tracker, 300), None);
        assert_eq!(h.step(&[ControlSignal::PauseToggle], &mut tracker), None);
        let frozen = h.trial.elapsed_active_ns(h.now_ms * NANOS_PER_MILLI);

        let polls_before = tracker.polls();
        // 10 s paused
        assert_eq!(h.run(&mut tracker, 1000), None);
        assert_eq!(tracker.polls(), polls_before);
        assert_eq!(h.trial.elapsed_active_ns(h.now_ms * NANOS_PER_MILLI), frozen);

        assert_eq!(h.step(&[ControlSignal::PauseToggle], &mut tracker), None);
        assert!(!h.trial.is_paused());
        // still about 2 s of budget left
        assert_eq!(h.run(&mut tracker, 150), None);
        assert_eq!(h.run(&mut tracker, 100), Some(TrialOutcome::Fail));
    }

    #[test]
    fn double_toggle_in_one_tick_is_a_no_op() {
        let mut h = Harness::new(TrialPolicy::default());
        let mut tracker = ScriptedTracker::steady(0.0, 0.0);
        h.step(&[ControlSignal::PauseToggle, ControlSignal::PauseToggle], &mut tracker);
        assert!(!h.trial.is_paused());
        assert_eq!(tracker.polls(), 1);
    }

    #[test]
    fn dwell_survives_pause_by_default() {
        let mut h = Harness::new(TrialPolicy::default());
        let mut tracker = ScriptedTracker::steady(1000.0, 500.0);
        assert_eq!(h.run(&mut tracker, 20), None);
        h.step(&[ControlSignal::PauseToggle], &mut tracker);
        h.run(&mut tracker, 100);
        // first tick after resuming completes the dwell across the pause gap
        assert_eq!(h.step(&[ControlSignal::PauseToggle], &mut tracker), Some(TrialOutcome::Pass));
    }

    #[test]
    fn strict_policy_resets_dwell_on_pause() {
        let policy = TrialPolicy {
            reset_dwell_on_pause: true,
            ..TrialPolicy::default()
        };
        let mut h = Harness::new(policy);
        let mut tracker = ScriptedTracker::steady(1000.0, 500.0);
        assert_eq!(h.run(&mut tracker, 20), None);
        h.step(&[ControlSignal::PauseToggle], &mut tracker);
        h.run(&mut tracker, 100);
        assert_eq!(h.step(&[ControlSignal::PauseToggle], &mut tracker), None);
        let resumed_at = h.now_ms;
        assert_eq!(h.run(&mut tracker, 100), Some(TrialOutcome::Pass));
        assert_eq!(h.now_ms - resumed_at, 500);
    }

    #[test]
    fn skip_beats_pass_on_the_same_tick() {
        let mut h = Harness::new(TrialPolicy::default());
        let mut tracker = ScriptedTracker::steady(1000.0, 500.0);
        assert_eq!(h.run(&mut tracker, 50), None);
        // dwell would complete on this tick
        assert_eq!(h.step(&[ControlSignal::Skip], &mut tracker), Some(TrialOutcome::Skip));
        assert!(h.trial.record().is_none());
    }

    #[test]
    fn retry_beats_timeout_on_the_same_tick() {
        let mut h = Harness::new(TrialPolicy::default());
        let mut tracker = ScriptedTracker::steady(0.0, 0.0);
        assert_eq!(h.run(&mut tracker, 500), None);
        assert_eq!(h.step(&[ControlSignal::Retry], &mut tracker), Some(TrialOutcome::Retry));
    }

    #[test]
    fn signal_precedence_quit_then_skip_then_retry() {
        let mut tracker = ScriptedTracker::default();
        let mut h = Harness::new(TrialPolicy::default());
        assert_eq!(
            h.step(&[ControlSignal::Retry, ControlSignal::Skip, ControlSignal::Quit], &mut tracker),
            Some(TrialOutcome::Quit)
        );
        let mut h = Harness::new(TrialPolicy::default());
        assert_eq!(
            h.step(&[ControlSignal::Retry, ControlSignal::Skip], &mut tracker),
            Some(TrialOutcome::Skip)
        );
        assert_eq!(tracker.polls(), 0);
    }

    #[test]
    fn skip_while_paused_ends_trial() {
        let mut h = Harness::new(TrialPolicy::default());
        let mut tracker = ScriptedTracker::default();
        h.step(&[ControlSignal::PauseToggle], &mut tracker);
        assert_eq!(h.step(&[ControlSignal::Skip], &mut tracker), Some(TrialOutcome::Skip));
    }

    #[test]
    fn concluded_trial_is_sticky() {
        let mut h = Harness::new(TrialPolicy::default());
        let mut tracker = ScriptedTracker::default();
        assert_eq!(h.step(&[ControlSignal::Skip], &mut tracker), Some(TrialOutcome::Skip));
        assert_eq!(h.step(&[], &mut tracker), Some(TrialOutcome::Skip));
        assert_eq!(tracker.polls(), 0);
    }

    #[test]
    fn tolerance_scales_with_diameter() {
        let policy = TrialPolicy::default();
        let trial = TrialStateMachine::new(target(), 40, &policy, 0);
        assert_eq!(trial.tolerance_px(), 600.0);
        let mut edge = TrialStateMachine::new(target(), 40, &policy, 0);
        let mut tracker = ScriptedTracker::steady(1600.0, 500.0);
        edge.tick(NANOS_PER_MILLI, &[], &mut tracker);
        assert_eq!(edge.dwell_progress(NANOS_PER_MILLI), 0.0);
        assert_eq!(edge.distance(), Some(600.0));
        // exactly on the radius counts as inside
        edge.tick(NANOS_PER_MILLI * 501, &[], &mut tracker);
        assert_eq!(edge.outcome(), Some(TrialOutcome::Pass));
    }
}
