use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::stimulus::StimulusPoint;

/// Number of samples averaged by the default smoother.
pub const DEFAULT_SMOOTHING_WINDOW: usize = 10;

/// Screen-space gaze position in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazePoint {
    pub x: f64,
    pub y: f64,
}

impl GazePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, target: &StimulusPoint) -> f64 {
        (self.x - target.x as f64).hypot(self.y - target.y as f64)
    }
}

/// One poll result from a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_valid")]
    pub valid: bool,
}

fn default_valid() -> bool {
    true
}

impl GazeSample {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, valid: true }
    }

    pub fn invalid() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            valid: false,
        }
    }

    /// The coordinate, if the tracker marked it usable.
    pub fn point(&self) -> Option<GazePoint> {
        (self.valid && self.x.is_finite() && self.y.is_finite()).then(|| GazePoint::new(self.x, self.y))
    }
}

/// Running mean over the most recent valid gaze positions.
#[derive(Debug, Clone)]
pub struct GazeSmoother {
    window: VecDeque<GazePoint>,
    capacity: usize,
}

impl GazeSmoother {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, point: GazePoint) {
        if self.window.len() >= self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(point);
    }

    pub fn estimate(&self) -> Option<GazePoint> {
        if self.window.is_empty() {
            return None;
        }
        let n = self.window.len() as f64;
        let (sx, sy) = self
            .window
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(GazePoint::new(sx / n, sy / n))
    }

    pub fn distance_to(&self, target: &StimulusPoint) -> Option<f64> {
        self.estimate().map(|e| e.distance_to(target))
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}

impl Default for GazeSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_WINDOW)
    }
}
