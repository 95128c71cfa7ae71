//! Stage timings of a pipeline run, appended to CSV.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::error::Result;

/// Pipeline stage a lap is charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Parameter validation, planning and key generation.
    Setup,
    /// Encoding and encryption of the operands.
    Encryption,
    /// Circuit evaluation.
    Evaluation,
    /// Decryption of the result ciphertext.
    Decryption,
    /// Index extraction, unscaling and division.
    Decoding,
}

/// One CSV row: milliseconds per stage plus the computed value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimingReport {
    /// Which pipeline produced the row, e.g. `variance-coefficient`.
    pub label: String,
    /// See [`Stage::Setup`].
    pub setup_ms: f64,
    /// See [`Stage::Encryption`].
    pub encryption_ms: f64,
    /// See [`Stage::Evaluation`].
    pub evaluation_ms: f64,
    /// See [`Stage::Decryption`].
    pub decryption_ms: f64,
    /// See [`Stage::Decoding`].
    pub decoding_ms: f64,
    /// Wall clock from start to finish.
    pub total_ms: f64,
    /// Decoded statistic.
    pub result: f64,
}

impl TimingReport {
    fn slot(&mut self, stage: Stage) -> &mut f64 {
        match stage {
            Stage::Setup => &mut self.setup_ms,
            Stage::Encryption => &mut self.encryption_ms,
            Stage::Evaluation => &mut self.evaluation_ms,
            Stage::Decryption => &mut self.decryption_ms,
            Stage::Decoding => &mut self.decoding_ms,
        }
    }

    /// Write this row, with a header line if `headers` is set.
    pub fn write_csv<W: Write>(&self, out: W, headers: bool) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().has_headers(headers).from_writer(out);
        wtr.serialize(self)?;
        wtr.flush()?;
        Ok(())
    }

    /// Append to `path`, writing the header only when the file is new or empty.
    pub fn append_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path.as_ref())?;
        let fresh = file.metadata()?.len() == 0;
        self.write_csv(file, fresh)?;
        debug!(path = %path.as_ref().display(), "appended timing row");
        Ok(())
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Charges elapsed wall-clock time to pipeline stages.
#[derive(Debug)]
pub struct StageTimer {
    start: Instant,
    last: Instant,
    report: TimingReport,
}

impl StageTimer {
    /// Start timing a run labelled `label`.
    pub fn start(label: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            report: TimingReport {
                label: label.into(),
                ..TimingReport::default()
            },
        }
    }

    /// Charge the time since the previous lap to `stage`.
    pub fn lap(&mut self, stage: Stage) {
        let now = Instant::now();
        let ms = millis(now - self.last);
        *self.report.slot(stage) += ms;
        debug!(?stage, ms, "stage finished");
        self.last = now;
    }

    /// Close the report with the decoded value.
    pub fn finish(mut self, result: f64) -> TimingReport {
        self.report.total_ms = millis(self.start.elapsed());
        self.report.result = result;
        self.report
    }
}
