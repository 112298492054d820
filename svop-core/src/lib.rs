pub mod control;
pub mod error;
pub mod gaze;
pub mod geometry;
pub mod phase;
pub mod stimulus;
pub mod tracker;
pub mod trial;
pub mod view;

pub use control::{ButtonLayout, ControlQueue, ControlSender, ControlSignal};
pub use error::{Result, SvopError};
pub use gaze::{GazePoint, GazeSample, GazeSmoother};
pub use phase::SessionPhase;
pub use stimulus::{StimulusPoint, StimulusSize};
pub use tracker::{shut_down, GazeTracker, PointerHandle, PointerTracker, ScriptedTracker, UdpGazeTracker};
pub use trial::{TrialOutcome, TrialRecord, Verdict};
pub use view::{Banner, FrameView, InfoPanel};
