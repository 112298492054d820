pub mod timer;

pub use timer::{HighPrecisionTimer, ManualTimer, TickStats, Timer, NANOS_PER_MILLI, NANOS_PER_SEC};
