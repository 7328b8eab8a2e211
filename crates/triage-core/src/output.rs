//! Run artifacts: one JSON document per handled test case plus result files.
//!
//! Every case the online loop generates and decides on (executed or
//! rejected) lands in the output directory as `test_<n>.json`, numbered in
//! the order the loop handled them.

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::TestCase;

/// Writes numbered test-case artifacts into a run directory.
pub struct ArtifactWriter {
    dir: PathBuf,
    written: usize,
}

impl ArtifactWriter {
    /// Create the writer, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, written: 0 })
    }

    /// Persist one case (with its execution block, if executed).
    pub fn write_case(&mut self, case: &TestCase) -> Result<PathBuf> {
        let path = self.dir.join(format!("test_{}.json", self.written));
        write_json(&path, &case.to_document())?;
        self.written += 1;
        tracing::trace!("Wrote {} to {:?}", case.id, path);
        Ok(path)
    }

    /// Number of artifacts written so far.
    pub fn written(&self) -> usize {
        self.written
    }
}

/// Write `item` as pretty JSON, replacing any existing file.
pub fn write_json<T: Serialize>(path: &Path, item: &T) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, item)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
