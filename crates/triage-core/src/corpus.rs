//! Static corpus of already-executed, already-labeled test cases.
//!
//! The corpus is read from a directory of executed test documents. Files
//! that cannot be used (unreadable, no `execution` block, broken road
//! structure) are skipped and logged; they never abort the scan.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use walkdir::WalkDir;

use crate::dataset::Dataset;
use crate::error::RecordError;
use crate::features::FeatureExtractor;
use crate::types::{ExecutionOutcome, FeatureVector, LabeledRecord, SafetyLabel};

/// One executed test case with its features, ground truth and cost.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusEntry {
    /// Source artifact
    pub path: PathBuf,
    pub features: FeatureVector,
    pub label: SafetyLabel,
    /// Execution time in seconds
    pub cost: f64,
}

impl CorpusEntry {
    /// Parse one executed test document.
    pub fn from_document(
        path: &Path,
        document: &serde_json::Value,
        extractor: &dyn FeatureExtractor,
    ) -> Result<Self, RecordError> {
        let execution = document
            .get("execution")
            .ok_or_else(|| RecordError::new(path, "no execution block"))?;
        let outcome: ExecutionOutcome = serde_json::from_value(execution.clone())
            .map_err(|e| RecordError::new(path, format!("execution: {e}")))?;
        let features = extractor
            .extract(document)
            .map_err(|e| RecordError::new(path, format!("features: {e}")))?;
        Ok(Self {
            path: path.to_path_buf(),
            features,
            label: outcome.label(),
            cost: outcome.cost(),
        })
    }

    /// Read and parse one executed test file.
    pub fn load(path: &Path, extractor: &dyn FeatureExtractor) -> Result<Self, RecordError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| RecordError::new(path, e.to_string()))?;
        let document: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| RecordError::new(path, e.to_string()))?;
        Self::from_document(path, &document, extractor)
    }

    pub fn to_record(&self) -> LabeledRecord {
        LabeledRecord::new(self.features, self.label)
    }
}

/// An ordered set of corpus entries.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    entries: Vec<CorpusEntry>,
}

impl Corpus {
    pub fn new(entries: Vec<CorpusEntry>) -> Self {
        Self { entries }
    }

    /// Scan a directory (recursively) for executed `.json` test documents.
    ///
    /// Files are visited in path order so the corpus is deterministic.
    pub fn load_dir(dir: &Path, extractor: &dyn FeatureExtractor) -> Self {
        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|ext| ext.to_str())
                        .map(|ext| ext.eq_ignore_ascii_case("json"))
                        .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut entries = Vec::with_capacity(paths.len());
        let mut skipped = 0usize;
        for path in &paths {
            match CorpusEntry::load(path, extractor) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!("Skipping test file: {e}");
                }
            }
        }

        tracing::info!(
            "Loaded corpus from {:?}: {} usable, {} skipped",
            dir,
            entries.len(),
            skipped
        );
        Self { entries }
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, label: SafetyLabel) -> usize {
        self.entries.iter().filter(|e| e.label == label).count()
    }

    /// Labeled records for every entry, in corpus order.
    pub fn to_dataset(&self) -> Dataset {
        self.entries.iter().map(CorpusEntry::to_record).collect()
    }

    /// Split into a balanced training corpus and an evaluation corpus.
    ///
    /// Training takes `train_ratio × min(safe, unsafe)` entries of each
    /// label. The evaluation corpus is drawn from what remains so that
    /// roughly `unsafe_ratio` of it is unsafe, using as many cases as the
    /// scarcer class allows.
    pub fn split(&self, train_ratio: f64, unsafe_ratio: f64, seed: u64) -> (Corpus, Corpus) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut safe: Vec<CorpusEntry> = self
            .entries
            .iter()
            .filter(|e| e.label == SafetyLabel::Safe)
            .cloned()
            .collect();
        let mut unsafe_: Vec<CorpusEntry> = self
            .entries
            .iter()
            .filter(|e| e.label == SafetyLabel::Unsafe)
            .cloned()
            .collect();
        safe.shuffle(&mut rng);
        unsafe_.shuffle(&mut rng);

        let n_train = (train_ratio * safe.len().min(unsafe_.len()) as f64) as usize;
        let rest_safe = safe.split_off(n_train);
        let rest_unsafe = unsafe_.split_off(n_train);
        let mut training = safe;
        training.extend(unsafe_);

        let (n_safe, n_unsafe) = evaluation_counts(rest_safe.len(), rest_unsafe.len(), unsafe_ratio);
        let mut evaluation: Vec<CorpusEntry> = rest_safe.into_iter().take(n_safe).collect();
        evaluation.extend(rest_unsafe.into_iter().take(n_unsafe));

        tracing::info!(
            "Corpus split: {} training ({} per label), {} evaluation ({} safe, {} unsafe)",
            training.len(),
            n_train,
            evaluation.len(),
            n_safe,
            n_unsafe
        );
        (Corpus::new(training), Corpus::new(evaluation))
    }
}

/// Safe/unsafe counts for an evaluation set with the requested unsafe share.
fn evaluation_counts(len_safe: usize, len_unsafe: usize, ratio: f64) -> (usize, usize) {
    let total = (len_safe + len_unsafe) as f64;
    let mut n_unsafe = (ratio * total) as usize;
    let mut n_safe = ((1.0 - ratio) * total) as usize;
    if n_safe > len_safe {
        n_safe = len_safe;
        n_unsafe = (n_safe as f64 / (1.0 - ratio) * ratio) as usize;
    }
    if n_unsafe > len_unsafe {
        n_unsafe = len_unsafe;
        n_safe = ((n_unsafe as f64 / ratio * (1.0 - ratio)) as usize).min(len_safe);
    }
    (n_safe, n_unsafe)
}
