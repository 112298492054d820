use std::time::Duration;

use svop_core::{
    shut_down, Banner, ControlSignal, FrameView, GazeTracker, ScriptedTracker, SessionPhase, StimulusPoint,
    Verdict,
};
use svop_session::{
    FileResultSink, ResultFormat, ResultSink, Session, SessionEnd, SessionStatus, Stage, TrialPolicy,
};
use svop_timing::{ManualTimer, Timer, NANOS_PER_MILLI};

const MAX_TICKS: usize = 20_000;

fn points() -> Vec<StimulusPoint> {
    vec![
        StimulusPoint::new(1, 200, 200),
        StimulusPoint::new(2, 2000, 200),
        StimulusPoint::new(3, 200, 900),
    ]
}

fn session(points: Vec<StimulusPoint>) -> Session<ManualTimer> {
    Session::new(points, 32, TrialPolicy::default(), true, ManualTimer::new())
}

/// One loop iteration the way the app runs it: tick, then yield.
fn step<G: GazeTracker>(s: &mut Session<ManualTimer>, signals: &[ControlSignal], tracker: &mut G) -> SessionStatus {
    let status = s.tick(signals, tracker);
    s.timer.sleep(s.tick_interval());
    status
}

fn run_to_end<G: GazeTracker>(s: &mut Session<ManualTimer>, tracker: &mut G) -> SessionEnd {
    for _ in 0..MAX_TICKS {
        if let SessionStatus::Ended(end) = step(s, &[], tracker) {
            return end;
        }
    }
    panic!("session did not end within {MAX_TICKS} ticks");
}

fn presenting_index(s: &Session<ManualTimer>) -> Option<usize> {
    s.current_trial().map(|t| t.point().index)
}

#[test]
fn full_session_judges_every_stimulus_in_order() {
    let mut s = session(points());
    let mut tracker = ScriptedTracker::steady(200.0, 200.0);

    assert_eq!(run_to_end(&mut s, &mut tracker), SessionEnd::Finished);

    let results: Vec<(usize, Verdict)> = s.records().iter().map(|r| (r.stim_index, r.result)).collect();
    assert_eq!(
        results,
        vec![(1, Verdict::Pass), (2, Verdict::Fail), (3, Verdict::Fail)]
    );
    assert_eq!(s.records()[0].distance, Some(0.0));
    assert_eq!(s.records()[1].distance, Some(1800.0));
    assert_eq!(s.records()[2].distance, Some(700.0));

    assert_eq!(s.phase(), SessionPhase::Complete);
    assert_eq!(s.view(), FrameView::Complete { passed: 1, judged: 3 });
    let summary = s.summary();
    assert_eq!(summary.judged, 3);
    assert_eq!(summary.failed, 2);
    assert_eq!(s.trial_number(), 3);
}

#[test]
fn retry_presents_same_stimulus_with_fresh_state() {
    let mut s = session(points());
    let mut tracker = ScriptedTracker::steady(3000.0, 1400.0);

    step(&mut s, &[], &mut tracker);
    for _ in 0..100 {
        step(&mut s, &[], &mut tracker);
    }
    let before = s.current_trial().unwrap();
    assert_eq!(before.point().index, 1);
    assert!(before.distance().is_some());
    assert!(before.elapsed_active_ns(s.timer.now()) >= 1000 * NANOS_PER_MILLI);

    s.tick(&[ControlSignal::Retry], &mut tracker);
    let after = s.current_trial().unwrap();
    assert_eq!(after.point().index, 1);
    assert_eq!(after.distance(), None);
    assert_eq!(after.estimate(), None);
    assert_eq!(after.elapsed_active_ns(s.timer.now()), 0);

    assert!(s.records().is_empty());
    assert_eq!(s.sequencer().retries(), 1);
    assert_eq!(s.sequencer().pending_len(), 2);
    assert_eq!(s.trial_number(), 2);
}

#[test]
fn skipped_stimulus_never_returns() {
    let mut s = session(points());
    let mut tracker = ScriptedTracker::steady(2000.0, 200.0);

    step(&mut s, &[], &mut tracker);
    assert_eq!(presenting_index(&s), Some(1));
    step(&mut s, &[ControlSignal::Skip], &mut tracker);
    assert_eq!(presenting_index(&s), Some(2));

    let mut presented = vec![1, 2];
    for _ in 0..MAX_TICKS {
        if let Some(i) = presenting_index(&s) {
            if presented.last() != Some(&i) {
                presented.push(i);
            }
        }
        if let SessionStatus::Ended(end) = step(&mut s, &[], &mut tracker) {
            assert_eq!(end, SessionEnd::Finished);
            break;
        }
    }

    assert_eq!(presented, vec![1, 2, 3]);
    assert!(s.records().iter().all(|r| r.stim_index != 1));
    assert_eq!(s.records().len(), 2);
    assert_eq!(s.summary().skipped, 1);
}

#[test]
fn skip_wins_over_retry_on_the_same_tick() {
    let mut s = session(points());
    let mut tracker = ScriptedTracker::default();

    step(&mut s, &[], &mut tracker);
    step(&mut s, &[ControlSignal::Retry, ControlSignal::Skip], &mut tracker);
    assert_eq!(presenting_index(&s), Some(2));
    assert_eq!(s.sequencer().skipped(), &[1]);
    assert_eq!(s.sequencer().retries(), 0);
}

#[test]
fn verdict_banner_then_blank_interval() {
    let mut s = session(points());
    let mut tracker = ScriptedTracker::steady(200.0, 200.0);

    s.tick(&[], &mut tracker);
    let mut feedback_at = None;
    for _ in 0..MAX_TICKS {
        s.timer.advance_ms(10);
        s.tick(&[], &mut tracker);
        if matches!(s.stage(), Some(Stage::Feedback { .. })) {
            feedback_at = Some(s.timer.now());
            break;
        }
    }
    let feedback_at = feedback_at.expect("first stimulus should pass");
    assert_eq!(s.view(), FrameView::Banner(Banner::Verdict(Verdict::Pass)));

    // signals other than QUIT are dropped between trials
    s.timer.advance_ms(10);
    s.tick(&[ControlSignal::Skip, ControlSignal::PauseToggle], &mut tracker);
    assert!(s.sequencer().skipped().is_empty());
    assert!(matches!(s.stage(), Some(Stage::Feedback { .. })));

    while matches!(s.stage(), Some(Stage::Feedback { .. })) {
        s.timer.advance_ms(10);
        s.tick(&[], &mut tracker);
    }
    assert_eq!(s.timer.now() - feedback_at, 1000 * NANOS_PER_MILLI);
    assert_eq!(s.view(), FrameView::Blank);

    let interval_at = s.timer.now();
    while matches!(s.stage(), Some(Stage::Interval { .. })) {
        s.timer.advance_ms(10);
        s.tick(&[], &mut tracker);
    }
    assert_eq!(s.timer.now() - interval_at, 500 * NANOS_PER_MILLI);
    assert_eq!(presenting_index(&s), Some(2));
    assert!(!s.current_trial().unwrap().is_paused());
}

#[test]
fn long_pause_does_not_fail_the_trial() {
    let mut s = session(points());
    let mut tracker = ScriptedTracker::steady(3000.0, 1400.0);

    step(&mut s, &[], &mut tracker);
    for _ in 0..100 {
        step(&mut s, &[], &mut tracker);
    }
    step(&mut s, &[ControlSignal::PauseToggle], &mut tracker);
    let polls = tracker.polls();
    while s.timer.now() < 12_000 * NANOS_PER_MILLI {
        assert_eq!(s.tick_interval(), Duration::from_millis(100));
        step(&mut s, &[], &mut tracker);
    }
    assert_eq!(tracker.polls(), polls);

    step(&mut s, &[ControlSignal::PauseToggle], &mut tracker);
    step(&mut s, &[], &mut tracker);
    let trial = s.current_trial().unwrap();
    assert_eq!(trial.point().index, 1);
    assert!(trial.elapsed_active_secs(s.timer.now()) < 1.5);
    assert!(s.records().is_empty());
}

#[test]
fn quit_keeps_completed_records_for_saving() {
    let mut s = session(points());
    let mut tracker = ScriptedTracker::steady(200.0, 200.0);
    tracker.start_sampling().unwrap();

    for _ in 0..MAX_TICKS {
        step(&mut s, &[], &mut tracker);
        if presenting_index(&s) == Some(2) {
            break;
        }
    }
    assert_eq!(s.records().len(), 1);

    let status = s.tick(&[ControlSignal::Quit], &mut tracker);
    assert_eq!(status, SessionStatus::Ended(SessionEnd::Quit));
    assert_eq!(s.end(), Some(SessionEnd::Quit));
    assert!(s.current_trial().is_none());

    let dir = std::env::temp_dir().join(format!("svop-flow-{}", std::process::id()));
    let mut sink = FileResultSink::new(&dir, ResultFormat::Csv);
    let path = sink.save("flow_user", s.records()).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        text.lines().collect::<Vec<_>>(),
        vec!["stim_index,stim_x,stim_y,distance,result", "1,200,200,0.0,PASS"]
    );

    assert!(tracker.is_sampling());
    shut_down(&mut tracker, &dir.join("gaze").join("svop_flow_user_gaze.csv"));
    assert!(!tracker.is_sampling());
    assert!(tracker.is_released());
    assert!(dir.join("gaze").is_dir());
}
