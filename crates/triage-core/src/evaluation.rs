//! Hold-out scoring of the toolkit's models at several training splits.
//!
//! The complete labeled dataset is written once, then for every training
//! ratio a balanced training file and a test file are written and the
//! toolkit's evaluator appends its per-model scores to one shared results
//! CSV.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::dataset::Dataset;
use crate::error::{ConfigError, Result};

/// Header of the results file. The evaluator appends rows in this layout.
pub const RESULT_COLUMNS: [&str; 34] = [
    "Model",
    "Split",
    "Training Accuracy",
    "Test Accuracy",
    "Cross-Validation",
    "Precision Safe",
    "Precision Unsafe",
    "Recall Safe",
    "Recall Unsafe",
    "F-Measure Safe",
    "F-Measure Unsafe",
    "Cros Precision Safe",
    "Cros Precision Unsafe",
    "Cros Recall Safe",
    "Cros Recall Unsafe",
    "Cros F-Measure Safe",
    "Cros F-Measure Unsafe",
    "TPos Safe",
    "TNeg Safe",
    "FPos Safe",
    "FNeg Safe",
    "TPos Unsafe",
    "TNeg Unsafe",
    "FPos Unsafe",
    "FNeg Unsafe",
    "Cros TPos Safe",
    "Cros TNeg Safe",
    "Cros FPos Safe",
    "Cros FNeg Safe",
    "Cros TPos Unsafe",
    "Cros TNeg Unsafe",
    "Cros FPos Unsafe",
    "Cros FNeg Unsafe",
    "Total Number",
];

/// Scores models on one training/test split.
#[async_trait]
pub trait ModelEvaluator: Send + Sync {
    /// Train on `training`, score on `test`, append rows to `results`.
    async fn evaluate_split(
        &self,
        split: &str,
        training: &Path,
        test: &Path,
        results: &Path,
    ) -> Result<()>;
}

/// Files written for one training ratio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitFiles {
    pub ratio: f64,
    pub split: String,
    pub training: PathBuf,
    pub test: PathBuf,
    pub training_records: usize,
    pub test_records: usize,
}

/// Everything one evaluation wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRun {
    pub complete: PathBuf,
    pub results: PathBuf,
    pub splits: Vec<SplitFiles>,
}

/// Split label, e.g. `0.4-0.6-split`.
pub fn split_label(ratio: f64) -> String {
    let round = |v: f64| (v * 100.0).round() / 100.0;
    format!("{}-{}-split", round(ratio), round(1.0 - ratio))
}

/// Per-ratio model evaluation over one dataset.
pub struct ModelEvaluation {
    output_dir: PathBuf,
    name: String,
    ratios: Vec<f64>,
    seed: u64,
}

impl ModelEvaluation {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        name: impl Into<String>,
        ratios: Vec<f64>,
        seed: u64,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            name: name.into(),
            ratios,
            seed,
        }
    }

    /// `<name>_Complete.csv`
    pub fn complete_file(&self) -> PathBuf {
        self.output_dir.join(format!("{}_Complete.csv", self.name))
    }

    /// `<name>_result.csv`
    pub fn results_file(&self) -> PathBuf {
        self.output_dir.join(format!("{}_result.csv", self.name))
    }

    fn split_file(&self, split: &str, kind: &str) -> PathBuf {
        self.output_dir
            .join(format!("{split}_{}_{kind}.csv", self.name))
    }

    /// Write the dataset files and run the evaluator once per ratio.
    ///
    /// The results file is recreated with its header first. Every training
    /// file must hold both labels.
    pub async fn run(
        &self,
        dataset: &Dataset,
        evaluator: &dyn ModelEvaluator,
    ) -> Result<EvaluationRun> {
        if let Some(bad) = self.ratios.iter().find(|r| !(**r > 0.0 && **r < 1.0)) {
            return Err(ConfigError::ValidationError(format!(
                "evaluation ratio {bad} must be strictly between 0.0 and 1.0"
            ))
            .into());
        }
        std::fs::create_dir_all(&self.output_dir)?;

        let complete = self.complete_file();
        dataset.write_csv(&complete)?;

        let results = self.results_file();
        let mut writer = csv::Writer::from_path(&results)?;
        writer.write_record(RESULT_COLUMNS)?;
        writer.flush()?;
        drop(writer);

        let mut splits = Vec::with_capacity(self.ratios.len());
        for (i, &ratio) in self.ratios.iter().enumerate() {
            let split = split_label(ratio);
            let (training, test) = dataset.holdout_split(ratio, self.seed.wrapping_add(i as u64));
            training.ensure_trainable("evaluate_models")?;

            let training_path = self.split_file(&split, "training");
            let test_path = self.split_file(&split, "test");
            training.write_csv(&training_path)?;
            test.write_csv(&test_path)?;
            tracing::info!(
                "{split}: {} training / {} test records",
                training.len(),
                test.len()
            );

            evaluator
                .evaluate_split(&split, &training_path, &test_path, &results)
                .await?;

            splits.push(SplitFiles {
                ratio,
                split,
                training: training_path,
                test: test_path,
                training_records: training.len(),
                test_records: test.len(),
            });
        }

        Ok(EvaluationRun {
            complete,
            results,
            splits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ContractError, TriageError};
    use crate::types::{FeatureVector, LabeledRecord, SafetyLabel};
    use std::sync::Mutex;

    /// Appends `<split>,<training file>,<test file>` to the results file.
    #[derive(Default)]
    struct RecordingEvaluator {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ModelEvaluator for RecordingEvaluator {
        async fn evaluate_split(
            &self,
            split: &str,
            training: &Path,
            test: &Path,
            results: &Path,
        ) -> Result<()> {
            assert!(training.exists() && test.exists());
            let row = format!(
                "{split},{},{}\n",
                training.file_name().unwrap().to_string_lossy(),
                test.file_name().unwrap().to_string_lossy()
            );
            let mut contents = std::fs::read_to_string(results)?;
            contents.push_str(&row);
            std::fs::write(results, contents)?;
            self.calls.lock().unwrap().push(split.to_string());
            Ok(())
        }
    }

    fn dataset(safe: usize, unsafe_: usize) -> Dataset {
        let record = |x: usize, label| {
            let fv = FeatureVector {
                road_distance: x as f64,
                ..Default::default()
            };
            LabeledRecord::new(fv, label)
        };
        (0..safe)
            .map(|i| record(i, SafetyLabel::Safe))
            .chain((0..unsafe_).map(|i| record(100 + i, SafetyLabel::Unsafe)))
            .collect()
    }

    #[test]
    fn test_split_label() {
        assert_eq!(split_label(0.4), "0.4-0.6-split");
        assert_eq!(split_label(0.5), "0.5-0.5-split");
        assert_eq!(split_label(0.8), "0.8-0.2-split");
    }

    #[tokio::test]
    async fn test_run_writes_per_ratio_layout() {
        let dir = tempfile::tempdir().unwrap();
        let evaluation = ModelEvaluation::new(dir.path(), "roads", vec![0.4, 0.5, 0.6, 0.8], 1);
        let evaluator = RecordingEvaluator::default();

        let run = evaluation.run(&dataset(20, 10), &evaluator).await.unwrap();

        assert_eq!(run.complete, dir.path().join("roads_Complete.csv"));
        assert_eq!(Dataset::read_csv(&run.complete).unwrap().len(), 30);
        for name in [
            "0.4-0.6-split_roads_training.csv",
            "0.4-0.6-split_roads_test.csv",
            "0.5-0.5-split_roads_training.csv",
            "0.6-0.4-split_roads_test.csv",
            "0.8-0.2-split_roads_training.csv",
            "0.8-0.2-split_roads_test.csv",
        ] {
            assert!(dir.path().join(name).exists(), "missing {name}");
        }

        let split = &run.splits[1];
        assert_eq!(split.training_records, 10);
        assert_eq!(split.test_records, 15);
        let training = Dataset::read_csv(&split.training).unwrap();
        assert_eq!(training.count(SafetyLabel::Safe), 5);
        assert_eq!(training.count(SafetyLabel::Unsafe), 5);

        assert_eq!(
            *evaluator.calls.lock().unwrap(),
            vec!["0.4-0.6-split", "0.5-0.5-split", "0.6-0.4-split", "0.8-0.2-split"]
        );
        let results = std::fs::read_to_string(&run.results).unwrap();
        let lines: Vec<&str> = results.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("Model,Split,Training Accuracy"));
        assert_eq!(
            lines[1],
            "0.4-0.6-split,0.4-0.6-split_roads_training.csv,0.4-0.6-split_roads_test.csv"
        );
    }

    #[tokio::test]
    async fn test_run_recreates_results_file() {
        let dir = tempfile::tempdir().unwrap();
        let evaluation = ModelEvaluation::new(dir.path(), "roads", vec![0.5], 1);
        std::fs::write(evaluation.results_file(), "stale\n").unwrap();

        let run = evaluation
            .run(&dataset(6, 6), &RecordingEvaluator::default())
            .await
            .unwrap();
        let results = std::fs::read_to_string(&run.results).unwrap();
        assert!(!results.contains("stale"));
        assert_eq!(results.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_run_requires_both_labels_in_training() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = RecordingEvaluator::default();
        let err = ModelEvaluation::new(dir.path(), "roads", vec![0.5], 1)
            .run(&dataset(8, 1), &evaluator)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TriageError::Contract(ContractError::MissingLabel {
                operation: "evaluate_models",
                ..
            })
        ));
        assert!(evaluator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_rejects_ratio_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelEvaluation::new(dir.path(), "roads", vec![0.5, 1.0], 1)
            .run(&dataset(4, 4), &RecordingEvaluator::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("evaluation ratio 1"));
    }
}
