use std::collections::VecDeque;

use svop_core::{StimulusPoint, TrialOutcome, TrialRecord};
use tracing::debug;

/// Pending stimuli in presentation order plus the records judged so far.
#[derive(Debug, Clone, Default)]
pub struct TrialSequencer {
    pending: VecDeque<StimulusPoint>,
    total: usize,
    records: Vec<TrialRecord>,
    skipped: Vec<usize>,
    retries: usize,
}

impl TrialSequencer {
    pub fn new(points: Vec<StimulusPoint>) -> Self {
        Self {
            total: points.len(),
            pending: VecDeque::from(points),
            ..Self::default()
        }
    }

    /// Takes the next stimulus to present.
    pub fn next(&mut self) -> Option<StimulusPoint> {
        self.pending.pop_front()
    }

    /// Files the outcome of a presentation of `point`.
    ///
    /// `record` is required for PASS and FAIL and ignored otherwise.
    pub fn conclude(&mut self, point: StimulusPoint, outcome: TrialOutcome, record: Option<TrialRecord>) {
        match outcome {
            TrialOutcome::Pass | TrialOutcome::Fail => {
                if let Some(record) = record {
                    self.records.push(record);
                }
            }
            TrialOutcome::Skip => {
                debug!("stimulus {} skipped", point.index);
                self.skipped.push(point.index);
            }
            TrialOutcome::Retry => {
                debug!("stimulus {} queued for retry", point.index);
                self.retries += 1;
                self.pending.push_front(point);
            }
            TrialOutcome::Quit => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &StimulusPoint> {
        self.pending.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of stimuli the session started with.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn skipped(&self) -> &[usize] {
        &self.skipped
    }

    pub fn retries(&self) -> usize {
        self.retries
    }
}
