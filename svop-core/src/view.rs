//! Declarative frame descriptions handed to the renderer.

use crate::gaze::GazePoint;
use crate::stimulus::StimulusPoint;
use crate::trial::Verdict;

pub const PASS_COLOR: [u8; 4] = [0, 255, 0, 255];
pub const ERROR_COLOR: [u8; 4] = [255, 0, 0, 255];
pub const NOTICE_COLOR: [u8; 4] = [255, 255, 0, 255];
pub const TEXT_COLOR: [u8; 4] = [255, 255, 255, 255];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Banner {
    Verdict(Verdict),
    Paused,
}

impl Banner {
    pub fn text(&self) -> &'static str {
        match self {
            Banner::Verdict(v) => v.as_str(),
            Banner::Paused => "PAUSED",
        }
    }

    pub fn color(&self) -> [u8; 4] {
        match self {
            Banner::Verdict(Verdict::Pass) => PASS_COLOR,
            Banner::Verdict(Verdict::Fail) => ERROR_COLOR,
            Banner::Paused => NOTICE_COLOR,
        }
    }
}

/// Progress overlay shown in the top-right corner during a trial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InfoPanel {
    pub stimulus: usize,
    pub total: usize,
    pub elapsed_s: f64,
    pub distance: Option<f64>,
}

impl InfoPanel {
    pub fn lines(&self) -> [String; 3] {
        let dist = match self.distance {
            Some(d) => format!("{d:.1}"),
            None => "--".to_string(),
        };
        [
            format!("Stim {}/{}", self.stimulus, self.total),
            format!("Time: {:.1}s", self.elapsed_s),
            format!("Dist: {dist}px"),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameView {
    Instructions {
        lines: Vec<&'static str>,
    },
    Presenting {
        stimulus: StimulusPoint,
        gaze: Option<GazePoint>,
        info: InfoPanel,
        show_buttons: bool,
    },
    Banner(Banner),
    Blank,
    Complete {
        passed: usize,
        judged: usize,
    },
}
