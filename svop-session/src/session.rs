use std::time::Duration;

use svop_core::{
    Banner, ControlSignal, FrameView, GazeTracker, InfoPanel, SessionPhase, StimulusPoint,
    TrialOutcome, TrialRecord, Verdict,
};
use svop_timing::Timer;
use tracing::{debug, info};

use crate::config::TrialPolicy;
use crate::results::SessionSummary;
use crate::sequencer::TrialSequencer;
use crate::trial::TrialStateMachine;

/// What the testing phase is currently showing.
#[derive(Debug, Clone)]
pub enum Stage {
    Presenting(TrialStateMachine),
    Feedback { verdict: Verdict, until_ns: u64 },
    Interval { until_ns: u64 },
}

#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Every stimulus was judged or skipped.
    Finished,
    Quit,
}

#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Ended(SessionEnd),
}

/// Drives a whole screening run, one cooperative tick at a time.
pub struct Session<T: Timer> {
    pub timer: T,
    policy: TrialPolicy,
    diameter_px: i32,
    show_buttons: bool,
    phase: SessionPhase,
    phase_started_ns: u64,
    sequencer: TrialSequencer,
    stage: Option<Stage>,
    end: Option<SessionEnd>,
    trial_number: usize,
}

impl<T: Timer> Session<T> {
    pub fn new(
        points: Vec<StimulusPoint>,
        diameter_px: i32,
        policy: TrialPolicy,
        show_buttons: bool,
        timer: T,
    ) -> Self {
        let phase_started_ns = timer.now();
        info!(
            "session with {} stimuli, diameter {} px, tolerance {:.0} px",
            points.len(),
            diameter_px,
            policy.tolerance_px(diameter_px)
        );
        Self {
            timer,
            policy,
            diameter_px,
            show_buttons,
            phase: SessionPhase::default(),
            phase_started_ns,
            sequencer: TrialSequencer::new(points),
            stage: None,
            end: None,
            trial_number: 0,
        }
    }

    /// Runs one iteration of the session loop.
    pub fn tick<G>(&mut self, signals: &[ControlSignal], tracker: &mut G) -> SessionStatus
    where
        G: GazeTracker + ?Sized,
    {
        if let Some(end) = self.end {
            return SessionStatus::Ended(end);
        }
        let now_ns = self.timer.now();
        let quit = signals.contains(&ControlSignal::Quit);

        match self.phase {
            SessionPhase::Instructions => {
                if quit {
                    self.finish(SessionEnd::Quit);
                } else if self.show_buttons
                    || now_ns.saturating_sub(self.phase_started_ns)
                        >= self.policy.instructions_ns()
                {
                    self.advance_phase(now_ns);
                    self.start_next_trial(now_ns);
                }
            }
            SessionPhase::Testing => self.update_testing(now_ns, signals, quit, tracker),
            SessionPhase::Complete => {}
        }

        match self.end {
            Some(end) => SessionStatus::Ended(end),
            None => SessionStatus::Running,
        }
    }

    fn update_testing<G>(&mut self, now_ns: u64, signals: &[ControlSignal], quit: bool, tracker: &mut G)
    where
        G: GazeTracker + ?Sized,
    {
        match self.stage.take() {
            Some(Stage::Presenting(mut trial)) => match trial.tick(now_ns, signals, tracker) {
                None => self.stage = Some(Stage::Presenting(trial)),
                Some(TrialOutcome::Quit) => {
                    debug!("stimulus {} discarded on quit", trial.point().index);
                    self.finish(SessionEnd::Quit);
                }
                Some(outcome) => {
                    let point = trial.point();
                    let record = trial.record();
                    info!(
                        "stimulus {} -> {:?} (distance {:?}, {:.2} s active)",
                        point.index,
                        outcome,
                        trial.distance(),
                        trial.elapsed_active_secs(now_ns)
                    );
                    self.sequencer.conclude(point, outcome, record);
                    match outcome.verdict() {
                        Some(verdict) => {
                            self.stage = Some(Stage::Feedback {
                                verdict,
                                until_ns: now_ns.saturating_add(self.policy.feedback_ns()),
                            })
                        }
                        None => self.start_next_trial(now_ns),
                    }
                }
            },
            Some(Stage::Feedback { verdict, until_ns }) => {
                if quit {
                    self.finish(SessionEnd::Quit);
                } else if now_ns >= until_ns {
                    self.stage = Some(Stage::Interval {
                        until_ns: now_ns.saturating_add(self.policy.inter_trial_ns()),
                    });
                } else {
                    self.stage = Some(Stage::Feedback { verdict, until_ns });
                }
            }
            Some(Stage::Interval { until_ns }) => {
                if quit {
                    self.finish(SessionEnd::Quit);
                } else if now_ns >= until_ns {
                    self.start_next_trial(now_ns);
                } else {
                    self.stage = Some(Stage::Interval { until_ns });
                }
            }
            None => self.start_next_trial(now_ns),
        }
    }

    fn start_next_trial(&mut self, now_ns: u64) {
        match self.sequencer.next() {
            Some(point) => {
                self.trial_number += 1;
                debug!(
                    "presentation {} of stimulus {}/{}",
                    self.trial_number,
                    point.index,
                    self.sequencer.total()
                );
                self.stage = Some(Stage::Presenting(TrialStateMachine::new(
                    point,
                    self.diameter_px,
                    &self.policy,
                    now_ns,
                )));
            }
            None => self.finish(SessionEnd::Finished),
        }
    }

    fn advance_phase(&mut self, now_ns: u64) {
        if let Some(next) = self.phase.next() {
            info!("phase {:?} -> {:?}", self.phase, next);
            self.phase = next;
            self.phase_started_ns = now_ns;
        }
    }

    fn finish(&mut self, end: SessionEnd) {
        self.stage = None;
        self.phase = SessionPhase::Complete;
        self.end = Some(end);
        let summary = self.summary();
        info!(
            "session ended ({:?}): {}/{} passed, {} skipped, {} retries",
            end, summary.passed, summary.judged, summary.skipped, summary.retried
        );
    }

    /// How long the run loop should yield before the next tick.
    pub fn tick_interval(&self) -> Duration {
        self.policy.tick_interval(self.is_paused())
    }

    pub fn is_paused(&self) -> bool {
        matches!(&self.stage, Some(Stage::Presenting(trial)) if trial.is_paused())
    }

    pub fn view(&self) -> FrameView {
        let now_ns = self.timer.now();
        match (self.phase, &self.stage) {
            (SessionPhase::Instructions, _) => FrameView::Instructions {
                lines: ControlSignal::ALL.iter().map(|s| s.hotkey_hint()).collect(),
            },
            (SessionPhase::Complete, _) => {
                let records = self.sequencer.records();
                FrameView::Complete {
                    passed: records.iter().filter(|r| r.result == Verdict::Pass).count(),
                    judged: records.len(),
                }
            }
            (SessionPhase::Testing, Some(Stage::Presenting(trial))) if trial.is_paused() => {
                FrameView::Banner(Banner::Paused)
            }
            (SessionPhase::Testing, Some(Stage::Presenting(trial))) => FrameView::Presenting {
                stimulus: trial.point(),
                gaze: trial.estimate(),
                info: InfoPanel {
                    stimulus: trial.point().index,
                    total: self.sequencer.total(),
                    elapsed_s: trial.elapsed_active_secs(now_ns),
                    distance: trial.distance(),
                },
                show_buttons: self.show_buttons,
            },
            (SessionPhase::Testing, Some(Stage::Feedback { verdict, .. })) => {
                FrameView::Banner(Banner::Verdict(*verdict))
            }
            (SessionPhase::Testing, _) => FrameView::Blank,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn stage(&self) -> Option<&Stage> {
        self.stage.as_ref()
    }

    pub fn current_trial(&self) -> Option<&TrialStateMachine> {
        match &self.stage {
            Some(Stage::Presenting(trial)) => Some(trial),
            _ => None,
        }
    }

    pub fn end(&self) -> Option<SessionEnd> {
        self.end
    }

    /// Presentations started so far, retries included.
    pub fn trial_number(&self) -> usize {
        self.trial_number
    }

    pub fn sequencer(&self) -> &TrialSequencer {
        &self.sequencer
    }

    /// Records judged so far, in completion order.
    pub fn records(&self) -> &[TrialRecord] {
        self.sequencer.records()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary::from_records(
            self.sequencer.records(),
            self.sequencer.skipped().len(),
            self.sequencer.retries(),
        )
    }

    pub fn policy(&self) -> &TrialPolicy {
        &self.policy
    }
}
