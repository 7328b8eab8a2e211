//! Online adaptive triage loop.
//!
//! Within a wall-clock budget the loop repeatedly generates a batch of
//! candidates, classifies the batch, executes only the cases predicted
//! unsafe and labels them from the simulator outcome. A round closes once
//! it has executed `round_size` cases; in adaptive mode the round's labeled
//! cases are appended to the training data and the model is retrained.
//!
//! ```text
//! INIT → (GENERATE → PREDICT → FILTER → EXECUTE → LABEL → ACCOUNT)+ → RETRAIN? → … → FINALIZE
//! ```
//!
//! The model handle is an owned value threaded through the loop: rounds
//! borrow it for prediction and retraining consumes it and hands back its
//! replacement.

mod log;
mod round;

pub use log::{RunLog, RUN_LOG_FILE};
pub use round::{RoundSummary, RoundTally};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

use crate::classifier::{self, ClassifierService, ModelHandle};
use crate::config::Config;
use crate::dataset::Dataset;
use crate::error::{HarnessError, Result};
use crate::harness::{execute_with_retry, Generator, RetryPolicy, Simulator};
use crate::output::ArtifactWriter;
use crate::types::{FeatureVector, LabeledRecord, SafetyLabel};

/// Training data file kept in the output directory.
pub const TRAINING_FILE: &str = "trainings_file.csv";

/// Parameters of one online run.
#[derive(Debug, Clone)]
pub struct OnlineOptions {
    pub time_budget: Duration,
    pub bulk_size: usize,
    pub round_size: usize,
    pub adaptive: bool,
    /// Cold start executes `seed_multiplier × bulk_size` cases
    pub seed_multiplier: usize,
    pub model: String,
    /// Seed dataset CSV; skips the cold start
    pub init_data: Option<PathBuf>,
    pub retry: RetryPolicy,
}

impl OnlineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            time_budget: Duration::from_secs(config.online.time_budget_mins * 60),
            bulk_size: config.online.bulk_size,
            round_size: config.online.round_size,
            adaptive: config.online.adaptive,
            seed_multiplier: config.online.seed_multiplier,
            model: config.online.model.clone(),
            init_data: config.online.init_data.clone(),
            retry: config.retry_policy(),
        }
    }
}

/// Run parameters echoed into the result file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    pub time_budget: String,
    pub model: String,
    pub bulk_size: usize,
    pub round_size: usize,
    pub adaptive: bool,
    pub init_data: Option<PathBuf>,
}

/// Everything an online run reports. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineResult {
    pub generated_tests: u64,
    pub tested_files: u64,
    pub unsafe_cases: u64,
    pub safe_cases: u64,
    pub predicted_as_safe: u64,
    pub time_test_generation: f64,
    pub time_predictions: f64,
    /// Simulator-reported execution time of executed cases
    pub time_test_run: f64,
    pub time_safe_test_run: f64,
    pub time_unsafe_test_run: f64,
    pub building_model: f64,
    pub init_data_time: f64,
    pub parameters: RunParameters,
    pub rounds: Vec<RoundSummary>,
}

impl OnlineResult {
    fn new(options: &OnlineOptions) -> Self {
        Self {
            generated_tests: 0,
            tested_files: 0,
            unsafe_cases: 0,
            safe_cases: 0,
            predicted_as_safe: 0,
            time_test_generation: 0.0,
            time_predictions: 0.0,
            time_test_run: 0.0,
            time_safe_test_run: 0.0,
            time_unsafe_test_run: 0.0,
            building_model: 0.0,
            init_data_time: 0.0,
            parameters: RunParameters {
                time_budget: format!("{} mins", options.time_budget.as_secs_f64() / 60.0),
                model: options.model.clone(),
                bulk_size: options.bulk_size,
                round_size: options.round_size,
                adaptive: options.adaptive,
                init_data: options.init_data.clone(),
            },
            rounds: Vec::new(),
        }
    }
}

/// The budget-bounded triage loop and its collaborators.
pub struct OnlineRunner {
    options: OnlineOptions,
    output_dir: PathBuf,
    generator: Box<dyn Generator>,
    simulator: Box<dyn Simulator>,
    classifier: Box<dyn ClassifierService>,
}

impl OnlineRunner {
    pub fn new(
        options: OnlineOptions,
        output_dir: impl Into<PathBuf>,
        generator: Box<dyn Generator>,
        simulator: Box<dyn Simulator>,
        classifier: Box<dyn ClassifierService>,
    ) -> Self {
        Self {
            options,
            output_dir: output_dir.into(),
            generator,
            simulator,
            classifier,
        }
    }

    /// Run until the budget expires.
    ///
    /// The budget starts once the initial model is built. Artifacts, the
    /// training file and the run log are written into the output directory
    /// as the run progresses.
    pub async fn run(&mut self) -> Result<OnlineResult> {
        let mut artifacts = ArtifactWriter::new(&self.output_dir)?;
        let mut log = RunLog::create(&self.output_dir)?;
        let mut result = OnlineResult::new(&self.options);
        log.started()?;

        let (mut dataset, mut handle) = self.initialize(&mut artifacts, &mut result).await?;
        let training_file = self.output_dir.join(TRAINING_FILE);

        let deadline = Instant::now() + self.options.time_budget;
        tracing::info!(
            "Online run started: budget {:?}, bulk size {}, round size {}, adaptive {}",
            self.options.time_budget,
            self.options.bulk_size,
            self.options.round_size,
            self.options.adaptive
        );

        while Instant::now() < deadline {
            let (tally, executed) = self
                .run_round(&handle, deadline, &mut artifacts, &mut log, &mut result)
                .await?;

            if self.options.adaptive && !executed.is_empty() {
                let fresh = Dataset::from_records(executed);
                fresh.append_csv(&training_file)?;
                dataset.append(fresh.records().iter().copied());

                // No round follows once the budget is spent
                if Instant::now() < deadline {
                    let start = Instant::now();
                    handle = classifier::retrain(&mut *self.classifier, &dataset, handle).await?;
                    result.building_model += start.elapsed().as_secs_f64();
                    tracing::debug!(
                        "Retrained {} on {} records (generation {})",
                        handle.name(),
                        dataset.len(),
                        handle.generation()
                    );
                }
            }

            let index = result.rounds.len();
            match tally.unsafe_precision() {
                Ok(precision) => tracing::info!(
                    "Round {index} closed: {} executed, {} unsafe, precision {precision:.3}",
                    tally.executed(),
                    tally.actual_unsafe
                ),
                Err(e) => tracing::warn!("Round {index} closed without executions: {e}"),
            }
            let summary = tally.summary();
            log.round_closed(index, &summary)?;
            result.rounds.push(summary);
        }

        log.finished()?;
        tracing::info!(
            "Online run finished: {} generated, {} executed, {} unsafe, {} rounds, {} artifacts",
            result.generated_tests,
            result.tested_files,
            result.unsafe_cases,
            result.rounds.len(),
            artifacts.written()
        );
        Ok(result)
    }

    /// Build the seed dataset and the first model.
    async fn initialize(
        &mut self,
        artifacts: &mut ArtifactWriter,
        result: &mut OnlineResult,
    ) -> Result<(Dataset, ModelHandle)> {
        let start = Instant::now();
        let training_file = self.output_dir.join(TRAINING_FILE);

        let dataset = match &self.options.init_data {
            Some(path) => {
                tracing::info!("Loading seed dataset from {:?}", path);
                let dataset = Dataset::read_csv(path)?;
                // Retraining appends to the copy, never to the caller's file
                dataset.write_csv(&training_file)?;
                dataset
            }
            None => {
                let count = self.options.seed_multiplier * self.options.bulk_size;
                tracing::info!("Cold start: executing {count} unfiltered seed cases");
                let mut records = Vec::with_capacity(count);
                for _ in 0..count {
                    let mut case = self.generator.generate().await;
                    let outcome =
                        execute_with_retry(&mut *self.simulator, &case, &self.options.retry, None)
                            .await?;
                    case.outcome = Some(outcome);
                    records.extend(case.to_record());
                    artifacts.write_case(&case)?;
                }
                let dataset = Dataset::from_records(records);
                dataset.write_csv(&training_file)?;
                result.init_data_time = start.elapsed().as_secs_f64();
                dataset
            }
        };

        let build = Instant::now();
        let handle = classifier::train(&mut *self.classifier, &self.options.model, &dataset).await?;
        result.building_model += build.elapsed().as_secs_f64();
        tracing::info!(
            "Initial model {} trained on {} records ({} unsafe)",
            handle.name(),
            dataset.len(),
            dataset.count(SafetyLabel::Unsafe)
        );
        Ok((dataset, handle))
    }

    /// One round: batches until `round_size` cases were executed or the
    /// deadline passes. Returns the tally and the newly labeled records.
    async fn run_round(
        &mut self,
        handle: &ModelHandle,
        deadline: Instant,
        artifacts: &mut ArtifactWriter,
        log: &mut RunLog,
        result: &mut OnlineResult,
    ) -> Result<(RoundTally, Vec<LabeledRecord>)> {
        let mut tally = RoundTally::default();
        let mut executed = Vec::new();
        let bulk_size = self.options.bulk_size;

        'round: while tally.executed() < self.options.round_size {
            if Instant::now() >= deadline {
                break;
            }

            let generation_start = Instant::now();
            let mut cases = Vec::with_capacity(bulk_size);
            for _ in 0..bulk_size {
                cases.push(self.generator.generate().await);
            }
            let prediction_start = Instant::now();
            result.time_test_generation += (prediction_start - generation_start).as_secs_f64();

            let features: Vec<FeatureVector> = cases.iter().map(|c| c.features).collect();
            let predictions =
                classifier::predict_batch(&*self.classifier, handle, &features).await?;
            result.time_predictions += prediction_start.elapsed().as_secs_f64();
            result.generated_tests += bulk_size as u64;
            tracing::debug!(
                "Batch of {bulk_size}: {} predicted unsafe",
                predictions.iter().filter(|p| p.is_unsafe()).count()
            );

            for (mut case, prediction) in cases.into_iter().zip(predictions) {
                if Instant::now() >= deadline {
                    break 'round;
                }

                if prediction.is_unsafe() {
                    let outcome = match execute_with_retry(
                        &mut *self.simulator,
                        &case,
                        &self.options.retry,
                        Some(deadline),
                    )
                    .await
                    {
                        Ok(outcome) => outcome,
                        Err(HarnessError::Cancelled { .. }) => break 'round,
                        Err(e) => return Err(e.into()),
                    };

                    let actual = outcome.label();
                    let cost = outcome.cost();
                    tally.record_executed(actual);
                    result.tested_files += 1;
                    result.time_test_run += cost;
                    match actual {
                        SafetyLabel::Unsafe => {
                            result.unsafe_cases += 1;
                            result.time_unsafe_test_run += cost;
                            log.found_unsafe(result.unsafe_cases)?;
                        }
                        SafetyLabel::Safe => {
                            result.safe_cases += 1;
                            result.time_safe_test_run += cost;
                            log.mistaken_safe(result.safe_cases)?;
                        }
                    }
                    case.outcome = Some(outcome);
                    executed.extend(case.to_record());
                } else {
                    tally.record_rejected();
                    result.predicted_as_safe += 1;
                }
                artifacts.write_case(&case)?;
            }
        }

        Ok((tally, executed))
    }
}
