//! Labeled training data: append, rebalance, and the CSV training-file format.
//!
//! The CSV layout is the 16 feature columns followed by `safety`
//! (`safe`/`unsafe`), which is what the classifier toolkit consumes.

use std::fs::OpenOptions;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{ContractError, RecordError, Result};
use crate::types::{FeatureVector, LabeledRecord, SafetyLabel};

/// Name of the label column in dataset files.
pub const LABEL_COLUMN: &str = "safety";

/// Ordered collection of labeled records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<LabeledRecord>,
}

impl Dataset {
    pub fn from_records(records: Vec<LabeledRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[LabeledRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records carrying `label`.
    pub fn count(&self, label: SafetyLabel) -> usize {
        self.records.iter().filter(|r| r.label() == label).count()
    }

    /// Append records in order, without rebalancing.
    pub fn append<I: IntoIterator<Item = LabeledRecord>>(&mut self, records: I) {
        self.records.extend(records);
    }

    /// Check the dataset can be trained on: both labels must be present.
    pub fn ensure_trainable(&self, operation: &'static str) -> std::result::Result<(), ContractError> {
        for label in [SafetyLabel::Safe, SafetyLabel::Unsafe] {
            if self.count(label) == 0 {
                return Err(ContractError::MissingLabel { operation, label });
            }
        }
        Ok(())
    }

    /// Equal-count resample of both labels.
    ///
    /// Both classes are sampled without replacement down to
    /// `min(count_safe, count_unsafe)`; safe records come first. The same
    /// seed over the same dataset always yields the same result.
    pub fn rebalance(&self, seed: u64) -> Dataset {
        let safe: Vec<&LabeledRecord> = self
            .records
            .iter()
            .filter(|r| r.label() == SafetyLabel::Safe)
            .collect();
        let unsafe_: Vec<&LabeledRecord> = self
            .records
            .iter()
            .filter(|r| r.label() == SafetyLabel::Unsafe)
            .collect();
        let n = safe.len().min(unsafe_.len());

        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut records: Vec<LabeledRecord> = safe
            .choose_multiple(&mut rng, n)
            .map(|r| **r)
            .collect();
        records.extend(unsafe_.choose_multiple(&mut rng, n).map(|r| **r));

        tracing::debug!(
            "Rebalanced dataset: {} safe + {} unsafe -> {} per label",
            safe.len(),
            unsafe_.len(),
            n
        );
        Dataset { records }
    }

    /// Split into a balanced training set and a hold-out test set.
    ///
    /// Each label is shuffled and cut at `ratio` of its size. Training takes
    /// the smaller cut from both labels; the test set is every record past
    /// its own label's cut. Records of the larger label between the two cut
    /// points land in neither set.
    pub fn holdout_split(&self, ratio: f64, seed: u64) -> (Dataset, Dataset) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut by_label = |label: SafetyLabel| {
            let mut records: Vec<LabeledRecord> = self
                .records
                .iter()
                .filter(|r| r.label() == label)
                .copied()
                .collect();
            records.shuffle(&mut rng);
            let cut = (ratio * records.len() as f64) as usize;
            (records, cut)
        };
        let (safe, safe_cut) = by_label(SafetyLabel::Safe);
        let (unsafe_, unsafe_cut) = by_label(SafetyLabel::Unsafe);
        let k = safe_cut.min(unsafe_cut);

        let training: Dataset = safe[..k].iter().chain(&unsafe_[..k]).copied().collect();
        let test: Dataset = safe[safe_cut..]
            .iter()
            .chain(&unsafe_[unsafe_cut..])
            .copied()
            .collect();
        (training, test)
    }

    /// Write the dataset with a header row, replacing any existing file.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(header())?;
        for record in &self.records {
            writer.write_record(row(record))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Append rows (no header) to an existing dataset file.
    pub fn append_csv(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for record in &self.records {
            writer.write_record(row(record))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read a dataset file. Columns are located by header name.
    pub fn read_csv(path: &Path) -> Result<Dataset> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();

        let mut positions = [0usize; 16];
        for (slot, column) in positions.iter_mut().zip(FeatureVector::COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h.trim() == column)
                .ok_or_else(|| RecordError::new(path, format!("missing column '{column}'")))?;
        }
        let label_pos = headers
            .iter()
            .position(|h| h.trim() == LABEL_COLUMN)
            .ok_or_else(|| RecordError::new(path, format!("missing column '{LABEL_COLUMN}'")))?;

        let mut records = Vec::new();
        for (i, row) in reader.records().enumerate() {
            let row = row?;
            let line = i + 2;
            let mut values = [0.0f64; 16];
            for (value, pos) in values.iter_mut().zip(positions) {
                let raw = row.get(pos).unwrap_or("");
                *value = raw.trim().parse().map_err(|_| {
                    RecordError::new(path, format!("line {line}: bad number {raw:?}"))
                })?;
            }
            let raw_label = row.get(label_pos).unwrap_or("");
            let label = SafetyLabel::parse(raw_label).ok_or_else(|| {
                RecordError::new(path, format!("line {line}: bad label {raw_label:?}"))
            })?;
            records.push(LabeledRecord::new(FeatureVector::from_array(values), label));
        }
        Ok(Dataset { records })
    }
}

impl FromIterator<LabeledRecord> for Dataset {
    fn from_iter<I: IntoIterator<Item = LabeledRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

fn header() -> Vec<&'static str> {
    let mut h = FeatureVector::COLUMNS.to_vec();
    h.push(LABEL_COLUMN);
    h
}

fn row(record: &LabeledRecord) -> Vec<String> {
    let mut r: Vec<String> = record
        .features()
        .to_array()
        .iter()
        .map(|v| v.to_string())
        .collect();
    r.push(record.label().to_string());
    r
}
