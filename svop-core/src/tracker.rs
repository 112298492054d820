//! Eye-tracker collaborator interface and the stock trackers.
//!
//! The session only ever calls [`GazeTracker::gaze_sample`], once per
//! non-paused tick, and that call must not block. Calibration and preview are
//! opaque hooks owned by the tracker implementation.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::net::{SocketAddr, UdpSocket};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{Result, SvopError};
use crate::gaze::{GazePoint, GazeSample};

pub trait GazeTracker {
    fn name(&self) -> &'static str;

    /// Shows the tracker's camera preview, if it has one.
    fn preview(&mut self) -> Result<()> {
        Ok(())
    }

    fn calibrate(&mut self, _points: usize) -> Result<()> {
        Ok(())
    }

    fn start_sampling(&mut self) -> Result<()>;

    fn stop_sampling(&mut self) -> Result<()>;

    /// Latest sample since the previous poll. Never blocks.
    fn gaze_sample(&mut self) -> Option<GazeSample>;

    /// Persists whatever raw data the tracker kept.
    fn save_data(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn release(&mut self);
}

/// Stops sampling, writes the raw log to `data_path` and releases the tracker.
///
/// Failures are logged; release always happens.
pub fn shut_down<G: GazeTracker + ?Sized>(tracker: &mut G, data_path: &Path) {
    if let Err(e) = tracker.stop_sampling() {
        warn!("stopping {} tracker: {e}", tracker.name());
    }
    let written = match data_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir).map_err(SvopError::from),
        _ => Ok(()),
    }
    .and_then(|_| tracker.save_data(data_path));
    if let Err(e) = written {
        warn!("saving tracker data to {}: {e}", data_path.display());
    }
    tracker.release();
    info!("{} tracker released", tracker.name());
}

// ── Scripted ────────────────────────────────────────────────

/// Delivers a pre-defined sequence of poll results.
#[derive(Debug, Default)]
pub struct ScriptedTracker {
    script: VecDeque<Option<GazeSample>>,
    fallback: Option<GazeSample>,
    polls: usize,
    sampling: bool,
    released: bool,
}

impl ScriptedTracker {
    pub fn new(script: Vec<Option<GazeSample>>) -> Self {
        Self {
            script: VecDeque::from(script),
            ..Self::default()
        }
    }

    /// A tracker that reports the same position on every poll.
    pub fn steady(x: f64, y: f64) -> Self {
        Self::default().with_fallback(Some(GazeSample::new(x, y)))
    }

    /// Result returned once the script is exhausted.
    pub fn with_fallback(mut self, fallback: Option<GazeSample>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn push(&mut self, sample: Option<GazeSample>) {
        self.script.push_back(sample);
    }

    pub fn polls(&self) -> usize {
        self.polls
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    pub fn is_sampling(&self) -> bool {
        self.sampling
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl GazeTracker for ScriptedTracker {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn start_sampling(&mut self) -> Result<()> {
        self.sampling = true;
        Ok(())
    }

    fn stop_sampling(&mut self) -> Result<()> {
        self.sampling = false;
        Ok(())
    }

    fn gaze_sample(&mut self) -> Option<GazeSample> {
        self.polls += 1;
        self.script.pop_front().unwrap_or(self.fallback)
    }

    fn release(&mut self) {
        self.released = true;
    }
}

// ── Pointer ─────────────────────────────────────────────────

/// Write side of a [`PointerTracker`], updated from window cursor events.
#[derive(Debug, Clone, Default)]
pub struct PointerHandle {
    position: Arc<Mutex<Option<GazePoint>>>,
}

impl PointerHandle {
    pub fn set(&self, x: f64, y: f64) {
        if let Ok(mut p) = self.position.lock() {
            *p = Some(GazePoint::new(x, y));
        }
    }

    /// Cursor left the window.
    pub fn clear(&self) {
        if let Ok(mut p) = self.position.lock() {
            *p = None;
        }
    }

    fn get(&self) -> Option<GazePoint> {
        self.position.lock().ok().and_then(|p| *p)
    }
}

/// Uses the mouse cursor as a stand-in for gaze.
#[derive(Debug, Default)]
pub struct PointerTracker {
    handle: PointerHandle,
    sampling: bool,
}

impl PointerTracker {
    pub fn new() -> (Self, PointerHandle) {
        let tracker = Self::default();
        let handle = tracker.handle.clone();
        (tracker, handle)
    }
}

impl GazeTracker for PointerTracker {
    fn name(&self) -> &'static str {
        "pointer"
    }

    fn start_sampling(&mut self) -> Result<()> {
        self.sampling = true;
        Ok(())
    }

    fn stop_sampling(&mut self) -> Result<()> {
        self.sampling = false;
        Ok(())
    }

    fn gaze_sample(&mut self) -> Option<GazeSample> {
        if !self.sampling {
            return None;
        }
        self.handle.get().map(|p| GazeSample::new(p.x, p.y))
    }

    fn release(&mut self) {
        self.sampling = false;
        self.handle.clear();
    }
}

// ── UDP bridge ──────────────────────────────────────────────

const MAX_DATAGRAM: usize = 1024;

/// Receives JSON gaze datagrams (`{"x":..,"y":..,"valid":..}`) from an
/// external tracker process.
#[derive(Debug)]
pub struct UdpGazeTracker {
    socket: Option<UdpSocket>,
    sampling: bool,
    epoch: Instant,
    log: Vec<(f64, GazeSample)>,
    malformed: usize,
}

impl UdpGazeTracker {
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        info!("gaze bridge listening on {}", socket.local_addr()?);
        Ok(Self {
            socket: Some(socket),
            sampling: false,
            epoch: Instant::now(),
            log: Vec::new(),
            malformed: 0,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    pub fn logged_samples(&self) -> usize {
        self.log.len()
    }

    pub fn malformed_datagrams(&self) -> usize {
        self.malformed
    }
}

impl GazeTracker for UdpGazeTracker {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn start_sampling(&mut self) -> Result<()> {
        self.sampling = true;
        self.epoch = Instant::now();
        Ok(())
    }

    fn stop_sampling(&mut self) -> Result<()> {
        self.sampling = false;
        Ok(())
    }

    fn gaze_sample(&mut self) -> Option<GazeSample> {
        let socket = self.socket.as_ref()?;
        let mut buf = [0u8; MAX_DATAGRAM];
        let mut latest = None;
        loop {
            match socket.recv(&mut buf) {
                Ok(n) => match serde_json::from_slice::<GazeSample>(&buf[..n]) {
                    Ok(sample) => {
                        if self.sampling {
                            self.log.push((self.epoch.elapsed().as_secs_f64(), sample));
                        }
                        latest = Some(sample);
                    }
                    Err(e) => {
                        self.malformed += 1;
                        debug!("ignoring malformed gaze datagram: {}", e);
                    }
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("gaze bridge receive failed: {}", e);
                    break;
                }
            }
        }
        if self.sampling { latest } else { None }
    }

    fn save_data(&mut self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "t_s,x,y,valid")?;
        for (t, s) in &self.log {
            writeln!(out, "{:.4},{:.1},{:.1},{}", t, s.x, s.y, s.valid)?;
        }
        out.flush()?;
        info!("saved {} raw gaze samples to {}", self.log.len(), path.display());
        Ok(())
    }

    fn release(&mut self) {
        self.sampling = false;
        self.socket = None;
    }
}
