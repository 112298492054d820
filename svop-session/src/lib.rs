pub mod config;
pub mod results;
pub mod sequencer;
pub mod session;
pub mod trial;

pub use config::{SessionConfig, TrialPolicy};
pub use results::{FileResultSink, ResultFormat, ResultSink, SessionSummary};
pub use sequencer::TrialSequencer;
pub use session::{Session, SessionEnd, SessionStatus, Stage};
pub use trial::TrialStateMachine;
