use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use svop_core::{Result, TrialRecord, Verdict};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    #[default]
    Csv,
    Json,
}

impl ResultFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ResultFormat::Csv => "csv",
            ResultFormat::Json => "json",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Persists the judged records of a session.
pub trait ResultSink {
    /// Returns where the records ended up.
    fn save(&mut self, user: &str, records: &[TrialRecord]) -> Result<PathBuf>;
}

/// Writes `svop_results_<user>.<ext>` into a directory.
#[derive(Debug, Clone)]
pub struct FileResultSink {
    dir: PathBuf,
    format: ResultFormat,
}

impl FileResultSink {
    pub fn new(dir: impl Into<PathBuf>, format: ResultFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn path_for(&self, user: &str) -> PathBuf {
        self.dir
            .join(format!("svop_results_{}.{}", user, self.format.extension()))
    }
}

impl ResultSink for FileResultSink {
    fn save(&mut self, user: &str, records: &[TrialRecord]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(user);
        let mut out = BufWriter::new(File::create(&path)?);
        match self.format {
            ResultFormat::Csv => write_csv(&mut out, records)?,
            ResultFormat::Json => serde_json::to_writer_pretty(&mut out, records)?,
        }
        out.flush()?;
        info!("saved {} records to {}", records.len(), path.display());
        Ok(path)
    }
}

/// One header row, then one row per record. Distances keep a decimal point
/// (`0.0`, `12.5`); missing ones are written as `inf`.
pub fn write_csv<W: Write>(mut out: W, records: &[TrialRecord]) -> Result<()> {
    writeln!(out, "stim_index,stim_x,stim_y,distance,result")?;
    for r in records {
        let distance = r.distance.unwrap_or(f64::INFINITY);
        writeln!(
            out,
            "{},{},{},{:?},{}",
            r.stim_index,
            r.stim_x,
            r.stim_y,
            distance,
            r.result.as_str()
        )?;
    }
    Ok(())
}

/// Counts reported at the end of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    pub judged: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub retried: usize,
    pub mean_pass_distance: Option<f64>,
}

impl SessionSummary {
    pub fn from_records(records: &[TrialRecord], skipped: usize, retried: usize) -> Self {
        let passes: Vec<f64> = records
            .iter()
            .filter(|r| r.result == Verdict::Pass)
            .filter_map(|r| r.distance)
            .collect();
        let passed = records.iter().filter(|r| r.result == Verdict::Pass).count();
        Self {
            judged: records.len(),
            passed,
            failed: records.len() - passed,
            skipped,
            retried,
            mean_pass_distance: (!passes.is_empty())
                .then(|| passes.iter().sum::<f64>() / passes.len() as f64),
        }
    }

    /// Share of judged stimuli that passed, in percent.
    pub fn pass_rate(&self) -> f64 {
        if self.judged == 0 {
            0.0
        } else {
            self.passed as f64 / self.judged as f64 * 100.0
        }
    }
}
