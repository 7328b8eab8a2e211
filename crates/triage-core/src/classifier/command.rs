//! Classifier service backed by an external toolkit invoked per operation.
//!
//! Training runs the toolkit on a dataset CSV and expects it to leave a
//! model artifact named after the model in the model directory. Prediction
//! writes the query cases as CSV (the label column holds placeholders so the
//! toolkit sees both class values) and parses the toolkit's stdout:
//! `... Index <i> Result <0.0|1.0>` per case for batches, a trailing
//! `<0.0|1.0>` for single predictions. `0.0` means safe, `1.0` unsafe.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::ClassifierConfig;
use crate::dataset::Dataset;
use crate::error::{ContractError, HarnessError, Result};
use crate::evaluation::ModelEvaluator;
use crate::harness::command::{expand_args, run_command};
use crate::types::{FeatureVector, LabeledRecord, SafetyLabel};

use super::{ClassifierService, ModelHandle};

/// Runs the configured toolkit program for train/predict operations.
pub struct CommandClassifier {
    config: ClassifierConfig,
    model_dir: PathBuf,
    /// Current generation of every live model
    live: HashMap<String, u64>,
}

impl CommandClassifier {
    pub fn new(config: ClassifierConfig, model_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            model_dir: model_dir.into(),
            live: HashMap::new(),
        }
    }

    /// Names of the models this service trains by default.
    pub fn model_names(&self) -> &[String] {
        &self.config.models
    }

    fn check_handle(&self, handle: &ModelHandle) -> std::result::Result<(), ContractError> {
        match self.live.get(handle.name()) {
            Some(generation) if *generation == handle.generation() => Ok(()),
            _ => Err(ContractError::UnknownModel(format!(
                "{} (generation {})",
                handle.name(),
                handle.generation()
            ))),
        }
    }

    async fn run(&self, template: &[String], vars: &[(&str, &Path)]) -> Result<String> {
        let args = expand_args(template, vars);
        let output = run_command(&self.config.program, &args).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ClassifierService for CommandClassifier {
    async fn train(&mut self, model: &str, dataset: &Dataset) -> Result<ModelHandle> {
        dataset.ensure_trainable("train")?;
        tokio::fs::create_dir_all(&self.model_dir).await?;

        let training_file = self.model_dir.join("training.csv");
        dataset.write_csv(&training_file)?;
        let artifact = self.model_dir.join(model);
        self.run(
            &self.config.train_args,
            &[
                ("dataset", training_file.as_path()),
                ("model_dir", self.model_dir.as_path()),
                ("model", artifact.as_path()),
            ],
        )
        .await?;

        if !artifact.exists() {
            return Err(HarnessError::Command {
                program: self.config.program.clone(),
                message: format!("training did not produce {artifact:?}"),
            }
            .into());
        }

        let generation = self.live.get(model).map_or(0, |g| g + 1);
        self.live.insert(model.to_string(), generation);
        tracing::info!(
            "Trained {model} (generation {generation}) on {} records",
            dataset.len()
        );
        Ok(ModelHandle::new(model, artifact, generation))
    }

    async fn retrain(&mut self, dataset: &Dataset, previous: ModelHandle) -> Result<ModelHandle> {
        self.check_handle(&previous)?;
        dataset.ensure_trainable("retrain")?;
        if let Err(e) = tokio::fs::remove_file(previous.artifact()).await {
            tracing::warn!("Could not remove old model {:?}: {e}", previous.artifact());
        }
        let name = previous.name().to_string();
        drop(previous);
        self.train(&name, dataset).await
    }

    async fn predict(&self, handle: &ModelHandle, features: &FeatureVector) -> Result<SafetyLabel> {
        self.check_handle(handle)?;
        let query = self.model_dir.join("query_single.csv");
        Dataset::from_records(vec![
            LabeledRecord::new(*features, SafetyLabel::Safe),
            LabeledRecord::new(*features, SafetyLabel::Unsafe),
        ])
        .write_csv(&query)?;

        let stdout = self
            .run(
                &self.config.predict_args,
                &[("input", query.as_path()), ("model", handle.artifact())],
            )
            .await?;
        Ok(parse_single(&stdout)?)
    }

    async fn predict_batch(
        &self,
        handle: &ModelHandle,
        features: &[FeatureVector],
    ) -> Result<Vec<SafetyLabel>> {
        self.check_handle(handle)?;
        if features.is_empty() {
            return Ok(Vec::new());
        }

        let query = self.model_dir.join("query_batch.csv");
        let mut rows: Vec<LabeledRecord> = features
            .iter()
            .enumerate()
            .map(|(i, f)| LabeledRecord::new(*f, placeholder_label(i)))
            .collect();
        if rows.len() == 1 {
            rows.push(LabeledRecord::new(features[0], SafetyLabel::Safe));
        }
        Dataset::from_records(rows).write_csv(&query)?;

        let stdout = self
            .run(
                &self.config.batch_predict_args,
                &[("input", query.as_path()), ("model", handle.artifact())],
            )
            .await?;
        Ok(parse_batch(&stdout, features.len())?)
    }
}

#[async_trait]
impl ModelEvaluator for CommandClassifier {
    async fn evaluate_split(
        &self,
        split: &str,
        training: &Path,
        test: &Path,
        results: &Path,
    ) -> Result<()> {
        self.run(
            &self.config.evaluate_args,
            &[
                ("training", training),
                ("test", test),
                ("split", Path::new(split)),
                ("results", results),
            ],
        )
        .await?;
        Ok(())
    }
}

/// Alternate placeholder labels so both class values appear in a query file.
fn placeholder_label(index: usize) -> SafetyLabel {
    if index % 2 == 1 {
        SafetyLabel::Safe
    } else {
        SafetyLabel::Unsafe
    }
}

fn label_from_value(raw: &str) -> Option<SafetyLabel> {
    match raw.parse::<f64>().ok()? {
        v if v == 0.0 => Some(SafetyLabel::Safe),
        v if v == 1.0 => Some(SafetyLabel::Unsafe),
        _ => None,
    }
}

/// Parse `... Index <i> Result <v>` into `(i, label)`.
fn parse_batch_line(line: &str) -> Option<(usize, SafetyLabel)> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let index_pos = tokens.iter().position(|t| *t == "Index")?;
    let result_pos = tokens.iter().position(|t| *t == "Result")?;
    let index = tokens.get(index_pos + 1)?.parse().ok()?;
    let label = label_from_value(tokens.get(result_pos + 1)?)?;
    Some((index, label))
}

fn parse_batch(stdout: &str, expected: usize) -> std::result::Result<Vec<SafetyLabel>, ContractError> {
    let mut labels: Vec<Option<SafetyLabel>> = vec![None; expected];
    for line in stdout.lines().filter(|l| l.contains("Index")) {
        let bad_line = || ContractError::ClassifierOutput {
            operation: "predict_batch",
            line: line.to_string(),
        };
        let (index, label) = parse_batch_line(line).ok_or_else(bad_line)?;
        match labels.get_mut(index) {
            Some(slot) if slot.is_none() => *slot = Some(label),
            // out of range or already answered
            _ => return Err(bad_line()),
        }
    }
    let found = labels.iter().filter(|l| l.is_some()).count();
    if found != expected {
        return Err(ContractError::BatchLength {
            operation: "predict_batch",
            expected,
            actual: found,
        });
    }
    Ok(labels.into_iter().flatten().collect())
}

fn parse_single(stdout: &str) -> std::result::Result<SafetyLabel, ContractError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    line.split_whitespace()
        .last()
        .and_then(label_from_value)
        .ok_or_else(|| ContractError::ClassifierOutput {
            operation: "predict",
            line: line.to_string(),
        })
}
