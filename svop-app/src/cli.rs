use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use svop_core::StimulusSize;
use svop_session::{ResultFormat, SessionConfig};

pub const DEFAULT_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

/// Where gaze samples come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerChoice {
    /// The mouse cursor stands in for gaze.
    Pointer,
    /// JSON datagrams from an external tracker bridge.
    Udp(SocketAddr),
}

fn parse_tracker(s: &str) -> Result<TrackerChoice> {
    match s.split_once(':') {
        None if s == "pointer" => Ok(TrackerChoice::Pointer),
        Some(("udp", addr)) => addr
            .parse()
            .map(TrackerChoice::Udp)
            .with_context(|| format!("invalid UDP address '{addr}'")),
        _ => Err(anyhow!("unknown tracker '{s}', use pointer or udp:HOST:PORT")),
    }
}

fn parse_size(s: &str) -> Result<StimulusSize> {
    StimulusSize::from_str(s).ok_or_else(|| anyhow!("unknown Goldmann size '{s}', use I to V"))
}

fn parse_format(s: &str) -> Result<ResultFormat> {
    ResultFormat::from_str(s).ok_or_else(|| anyhow!("unknown result format '{s}', use csv or json"))
}

#[derive(Parser, Debug)]
#[command(name = "svop", about = "Gaze-dwell suprathreshold visual field screening")]
pub struct Cli {
    /// JSON session file; flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub user_name: Option<String>,

    /// Calibration grid size: 5, 9 or 13
    #[arg(long)]
    pub calibration_points: Option<usize>,

    /// Stimulus grid size: 5, 9 or 13
    #[arg(long)]
    pub stimulus_points: Option<usize>,

    #[arg(long)]
    pub screen_width_cm: Option<f64>,

    #[arg(long)]
    pub viewing_distance_cm: Option<f64>,

    #[arg(long)]
    pub stimulus_image: Option<PathBuf>,

    /// Goldmann size I to V
    #[arg(long, value_parser = parse_size)]
    pub stimulus_size: Option<StimulusSize>,

    /// Show the clickable control sidebar
    #[arg(long)]
    pub show_buttons: bool,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// csv or json
    #[arg(long, value_parser = parse_format)]
    pub format: Option<ResultFormat>,

    /// pointer, or udp:HOST:PORT
    #[arg(long, default_value = "pointer", value_parser = parse_tracker)]
    pub tracker: TrackerChoice,

    /// Directory for the tracker's raw sample log
    #[arg(long, default_value = "data")]
    pub tracker_data_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_FONT)]
    pub font: PathBuf,
}

impl Cli {
    /// Resolves the session configuration: defaults, then the JSON file, then flags.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SessionConfig::default(),
        };

        if let Some(v) = &self.user_name {
            config.user_name = v.clone();
        }
        if let Some(v) = self.calibration_points {
            config.calibration_points = v;
        }
        if let Some(v) = self.stimulus_points {
            config.stimulus_points = v;
        }
        if let Some(v) = self.screen_width_cm {
            config.screen_width_cm = v;
        }
        if let Some(v) = self.viewing_distance_cm {
            config.viewing_distance_cm = v;
        }
        if let Some(v) = &self.stimulus_image {
            config.stimulus_image = v.clone();
        }
        if let Some(v) = self.stimulus_size {
            config.stimulus_size = v;
        }
        if self.show_buttons {
            config.show_buttons = true;
        }
        if let Some(v) = &self.output_dir {
            config.output_dir = v.clone();
        }
        if let Some(v) = self.format {
            config.result_format = v;
        }
        Ok(config)
    }
}
