use serde::{Deserialize, Serialize};

use crate::stimulus::StimulusPoint;

/// Terminal disposition of one stimulus presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    Pass,
    Fail,
    Skip,
    Retry,
    Quit,
}

impl TrialOutcome {
    /// The recorded verdict, for outcomes that produce a record.
    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            TrialOutcome::Pass => Some(Verdict::Pass),
            TrialOutcome::Fail => Some(Verdict::Fail),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
        }
    }
}

/// Recorded result per judged stimulus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub stim_index: usize,
    pub stim_x: i32,
    pub stim_y: i32,
    /// Smoothed gaze distance in pixels at the moment of the verdict.
    pub distance: Option<f64>,
    pub result: Verdict,
}

impl TrialRecord {
    pub fn new(point: &StimulusPoint, distance: Option<f64>, result: Verdict) -> Self {
        Self {
            stim_index: point.index,
            stim_x: point.x,
            stim_y: point.y,
            distance,
            result,
        }
    }
}
