//! Plain-text chronological run log (`log_file.txt`).
//!
//! Lines are flushed as they are written so that a run aborted by a fatal
//! error still leaves its events up to the failure point on disk.

use chrono::Local;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;

use super::round::RoundSummary;

pub const RUN_LOG_FILE: &str = "log_file.txt";

pub struct RunLog {
    writer: BufWriter<File>,
}

impl RunLog {
    /// Create (truncate) `log_file.txt` in `dir`.
    pub fn create(dir: &Path) -> Result<Self> {
        let file = File::create(dir.join(RUN_LOG_FILE))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn line(&mut self, message: &str) -> Result<()> {
        writeln!(self.writer, "{}: {}", Local::now().naive_local(), message)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn started(&mut self) -> Result<()> {
        self.line("Start time")
    }

    pub fn found_unsafe(&mut self, n: u64) -> Result<()> {
        self.line(&format!("Found unsafe test case #{n}"))
    }

    pub fn mistaken_safe(&mut self, n: u64) -> Result<()> {
        self.line(&format!("Mistaken safe test case for unsafe #{n}"))
    }

    pub fn round_closed(&mut self, index: usize, summary: &RoundSummary) -> Result<()> {
        let precision = summary
            .unsafe_precision
            .map(|p| format!("{p:.3}"))
            .unwrap_or_else(|| "undefined".to_string());
        self.line(&format!(
            "Round {index}: {} executed, {} unsafe, {} rejected, precision {precision}",
            summary.num_unsafe_pred, summary.num_unsafe, summary.num_safe_pred
        ))
    }

    pub fn finished(&mut self) -> Result<()> {
        self.line("End time")
    }
}
