//! Operator control signals and the single queue both input producers feed.

use std::sync::mpsc::{self, Receiver, Sender};

use tracing::{debug, warn};

use crate::geometry::SIDEBAR_WIDTH_PX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlSignal {
    PauseToggle,
    Skip,
    Retry,
    Quit,
}

impl ControlSignal {
    pub const ALL: [ControlSignal; 4] = [
        ControlSignal::PauseToggle,
        ControlSignal::Skip,
        ControlSignal::Retry,
        ControlSignal::Quit,
    ];

    /// Hotkey binding, case-insensitive.
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'p' => Some(Self::PauseToggle),
            's' => Some(Self::Skip),
            'r' => Some(Self::Retry),
            'q' => Some(Self::Quit),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::PauseToggle => "Pause",
            Self::Skip => "Skip",
            Self::Retry => "Retry",
            Self::Quit => "Quit",
        }
    }

    pub fn hotkey_hint(&self) -> &'static str {
        match self {
            Self::PauseToggle => "P=Pause",
            Self::Skip => "S=Skip",
            Self::Retry => "R=Retry",
            Self::Quit => "Q=Quit",
        }
    }
}

/// Producer half of the control queue. Cloned once per input source.
#[derive(Debug, Clone)]
pub struct ControlSender {
    source: &'static str,
    tx: Sender<ControlSignal>,
}

impl ControlSender {
    pub fn with_source(&self, source: &'static str) -> Self {
        Self {
            source,
            tx: self.tx.clone(),
        }
    }

    pub fn send(&self, signal: ControlSignal) {
        debug!("{} -> {:?}", self.source, signal);
        if self.tx.send(signal).is_err() {
            warn!("control queue closed, dropping {:?} from {}", signal, self.source);
        }
    }
}

/// Consumer half, drained once per tick by the run loop.
#[derive(Debug)]
pub struct ControlQueue {
    rx: Receiver<ControlSignal>,
}

impl ControlQueue {
    pub fn channel() -> (ControlSender, ControlQueue) {
        let (tx, rx) = mpsc::channel();
        (ControlSender { source: "control", tx }, ControlQueue { rx })
    }

    /// Everything queued since the previous drain, in arrival order.
    pub fn drain(&self) -> Vec<ControlSignal> {
        self.rx.try_iter().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButtonRect {
    pub signal: ControlSignal,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ButtonRect {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// Sidebar buttons along the right screen edge.
#[derive(Debug, Clone, PartialEq)]
pub struct ButtonLayout {
    pub bar_x: f32,
    pub bar_width: f32,
    pub buttons: Vec<ButtonRect>,
}

impl ButtonLayout {
    const BUTTON_HEIGHT: f32 = 40.0;
    const GAP: f32 = 10.0;
    const TOP: f32 = 150.0;
    const INSET: f32 = 10.0;

    pub fn new(screen_width: u32) -> Self {
        let bar_width = SIDEBAR_WIDTH_PX as f32;
        let bar_x = screen_width as f32 - bar_width;
        let buttons = ControlSignal::ALL
            .iter()
            .enumerate()
            .map(|(i, &signal)| ButtonRect {
                signal,
                x: bar_x + Self::INSET,
                y: Self::TOP + i as f32 * (Self::BUTTON_HEIGHT + Self::GAP),
                width: bar_width - 2.0 * Self::INSET,
                height: Self::BUTTON_HEIGHT,
            })
            .collect();
        Self {
            bar_x,
            bar_width,
            buttons,
        }
    }

    pub fn hit(&self, x: f32, y: f32) -> Option<ControlSignal> {
        self.buttons.iter().find(|b| b.contains(x, y)).map(|b| b.signal)
    }
}
