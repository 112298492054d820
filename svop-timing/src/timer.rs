use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const NANOS_PER_MILLI: u64 = 1_000_000;
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

const MAX_TICK_SAMPLES: usize = 1000;

/// Monotonic time source for the session loop.
///
/// Timestamps are nanoseconds since the timer was created.
pub trait Timer: Clone + Send + Sync {
    fn now(&self) -> u64;
    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }
    fn sleep(&self, d: Duration);
    fn record_frame(&mut self, d: Duration);
    fn tick_stats(&self) -> TickStats;
}

/// Summary of recorded tick durations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickStats {
    pub samples: usize,
    pub average_tick_ns: f64,
    pub jitter_ns: f64,
    pub min_tick_ns: f64,
    pub max_tick_ns: f64,
    pub effective_rate_hz: f64,
}

impl TickStats {
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a Duration>) -> Self {
        let times: Vec<f64> = samples.into_iter().map(|d| d.as_nanos() as f64).collect();
        if times.is_empty() {
            return TickStats::default();
        }
        let n = times.len() as f64;
        let avg = times.iter().sum::<f64>() / n;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / n;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        TickStats {
            samples: times.len(),
            average_tick_ns: avg,
            jitter_ns: var.sqrt(),
            min_tick_ns: min,
            max_tick_ns: max,
            effective_rate_hz: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

fn push_bounded(buf: &mut VecDeque<Duration>, d: Duration) {
    if buf.len() >= MAX_TICK_SAMPLES {
        buf.pop_front();
    }
    buf.push_back(d);
}

#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    pub start: Instant,
    pub frame_times: VecDeque<Duration>,
}

impl Timer for HighPrecisionTimer {
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
    fn record_frame(&mut self, d: Duration) {
        push_bounded(&mut self.frame_times, d);
    }
    fn tick_stats(&self) -> TickStats {
        TickStats::from_samples(&self.frame_times)
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            frame_times: VecDeque::with_capacity(MAX_TICK_SAMPLES),
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC};

        let req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };

        // SAFETY: `req` is a valid timespec and the remainder pointer may be null
        // for a relative sleep.
        unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer whose clock only moves when told to. Clones share the same clock.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    now_ns: Arc<AtomicU64>,
    frame_times: VecDeque<Duration>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.now_ns.fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Timer for ManualTimer {
    fn now(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
    /// Sleeping advances the shared clock instead of blocking.
    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
    fn record_frame(&mut self, d: Duration) {
        push_bounded(&mut self.frame_times, d);
    }
    fn tick_stats(&self) -> TickStats {
        TickStats::from_samples(&self.frame_times)
    }
}
