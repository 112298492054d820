use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use svop_core::geometry::SUPPORTED_POINT_COUNTS;
use svop_core::{Result, StimulusSize, SvopError};
use svop_timing::NANOS_PER_MILLI;

use crate::results::ResultFormat;

/// Longest accepted duration for any policy interval: one hour.
pub const MAX_POLICY_MS: u64 = 60 * 60 * 1000;

/// Timing and tolerance constants of the dwell test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialPolicy {
    /// Continuous inside time required for PASS.
    pub pass_dwell_ms: u64,
    /// Active (unpaused) time after which the trial FAILs.
    pub timeout_ms: u64,
    /// Tolerance radius as a multiple of the stimulus diameter.
    pub tolerance_multiplier: f64,
    pub smoothing_window: usize,
    /// Drop dwell progress when a pause begins instead of keeping it.
    pub reset_dwell_on_pause: bool,
    pub tick_interval_ms: u64,
    pub paused_tick_interval_ms: u64,
    pub feedback_ms: u64,
    pub inter_trial_ms: u64,
    pub instructions_ms: u64,
}

impl Default for TrialPolicy {
    fn default() -> Self {
        Self {
            pass_dwell_ms: 500,
            timeout_ms: 5000,
            tolerance_multiplier: 15.0,
            smoothing_window: 10,
            reset_dwell_on_pause: false,
            tick_interval_ms: 10,
            paused_tick_interval_ms: 100,
            feedback_ms: 1000,
            inter_trial_ms: 500,
            instructions_ms: 2000,
        }
    }
}

impl TrialPolicy {
    pub fn pass_dwell_ns(&self) -> u64 {
        ms_to_ns(self.pass_dwell_ms)
    }

    pub fn timeout_ns(&self) -> u64 {
        ms_to_ns(self.timeout_ms)
    }

    pub fn feedback_ns(&self) -> u64 {
        ms_to_ns(self.feedback_ms)
    }

    pub fn inter_trial_ns(&self) -> u64 {
        ms_to_ns(self.inter_trial_ms)
    }

    pub fn instructions_ns(&self) -> u64 {
        ms_to_ns(self.instructions_ms)
    }

    pub fn tolerance_px(&self, diameter_px: i32) -> f64 {
        self.tolerance_multiplier * diameter_px as f64
    }

    pub fn tick_interval(&self, paused: bool) -> Duration {
        if paused {
            Duration::from_millis(self.paused_tick_interval_ms)
        } else {
            Duration::from_millis(self.tick_interval_ms)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(SvopError::config("timeout must be positive"));
        }
        if !(self.tolerance_multiplier > 0.0) {
            return Err(SvopError::config("tolerance multiplier must be positive"));
        }
        if self.smoothing_window == 0 {
            return Err(SvopError::config("smoothing window must hold at least one sample"));
        }
        let durations = [
            ("pass dwell", self.pass_dwell_ms),
            ("timeout", self.timeout_ms),
            ("tick interval", self.tick_interval_ms),
            ("paused tick interval", self.paused_tick_interval_ms),
            ("feedback", self.feedback_ms),
            ("inter-trial interval", self.inter_trial_ms),
            ("instructions", self.instructions_ms),
        ];
        for (name, ms) in durations {
            if ms > MAX_POLICY_MS {
                return Err(SvopError::config(format!(
                    "{name} of {ms} ms exceeds the {MAX_POLICY_MS} ms limit"
                )));
            }
        }
        Ok(())
    }
}

fn ms_to_ns(ms: u64) -> u64 {
    ms.saturating_mul(NANOS_PER_MILLI)
}

/// Everything collected from the operator before a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub user_name: String,
    pub calibration_points: usize,
    pub stimulus_points: usize,
    pub screen_width_cm: f64,
    pub viewing_distance_cm: f64,
    pub stimulus_image: PathBuf,
    pub stimulus_size: StimulusSize,
    pub show_buttons: bool,
    pub output_dir: PathBuf,
    pub result_format: ResultFormat,
    pub policy: TrialPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_name: "test_subject".to_string(),
            calibration_points: 9,
            stimulus_points: 5,
            screen_width_cm: 52.704,
            viewing_distance_cm: 45.0,
            stimulus_image: PathBuf::from("./VF-test/ball.jpg"),
            stimulus_size: StimulusSize::default(),
            show_buttons: false,
            output_dir: PathBuf::from("."),
            result_format: ResultFormat::default(),
            policy: TrialPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    /// User identifier as used in file names. Anything but letters, digits,
    /// `-`, `_` and `.` becomes `_`, so the name never adds a path component.
    pub fn sanitized_user_name(&self) -> String {
        self.user_name
            .trim()
            .chars()
            .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
            .collect()
    }

    /// Checks every option before any session state is created.
    pub fn validate(&self) -> Result<()> {
        let user = self.sanitized_user_name();
        if user.is_empty() {
            return Err(SvopError::config("user name must not be empty"));
        }
        if user.contains("..") {
            return Err(SvopError::config(format!("user name must not contain '..': {}", self.user_name)));
        }
        if !SUPPORTED_POINT_COUNTS.contains(&self.calibration_points) {
            return Err(SvopError::config(format!(
                "calibration points must be 5, 9 or 13, got {}",
                self.calibration_points
            )));
        }
        if !SUPPORTED_POINT_COUNTS.contains(&self.stimulus_points) {
            return Err(SvopError::config(format!(
                "stimulus points must be 5, 9 or 13, got {}",
                self.stimulus_points
            )));
        }
        if !(self.screen_width_cm > 0.0) || !(self.viewing_distance_cm > 0.0) {
            return Err(SvopError::config("screen width and viewing distance must be positive"));
        }
        if !self.stimulus_image.is_file() {
            return Err(SvopError::config(format!(
                "stimulus image not found: {}",
                self.stimulus_image.display()
            )));
        }
        self.policy.validate()
    }
}
