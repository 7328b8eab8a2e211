//! Offline policy evaluator.
//!
//! Replays the triage decision against a static, already-executed corpus.
//! Four policies are compared, each repeated `rounds` times and averaged:
//!
//! - **random-fixed**: `num_tests` distinct random cases per round
//! - **random-reach**: distinct random cases until `num_unsafe` unsafe ones
//! - **model-fixed**: distinct random cases, executing only those the model
//!   predicts unsafe, until `num_tests` were executed
//! - **model-reach**: as model-fixed, until `num_unsafe` true positives
//!
//! No case is drawn twice within a round. A round that would need more
//! distinct cases than the corpus holds fails with `ContractError::Oversample`.

mod policy;

pub use policy::{ExecutionTally, ModelTally, RoundSampler};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classifier::{self, ClassifierService, ModelHandle};
use crate::config::Config;
use crate::corpus::Corpus;
use crate::dataset::Dataset;
use crate::error::{ContractError, Result};
use crate::metrics::{aggregate, AggregateResult};
use crate::types::SafetyLabel;

/// Parameters of an offline evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OfflineOptions {
    pub num_tests: usize,
    pub num_unsafe: usize,
    pub rounds: usize,
    pub seed: u64,
}

impl OfflineOptions {
    /// Options from `[offline]`; a missing seed is drawn at random.
    pub fn from_config(config: &Config) -> Self {
        Self {
            num_tests: config.offline.num_tests,
            num_unsafe: config.offline.num_unsafe,
            rounds: config.offline.rounds,
            seed: config.offline.seed.unwrap_or_else(rand::random),
        }
    }
}

/// Averaged results of every policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineReport {
    pub random_fixed: AggregateResult,
    pub random_reach: AggregateResult,
    /// Keyed by model name
    pub model_fixed: BTreeMap<String, AggregateResult>,
    pub model_reach: BTreeMap<String, AggregateResult>,
}

/// Report file name, e.g. `30_rounds_tests_ratio_0_45.json`.
pub fn report_file_name(rounds: usize, ratio: f64) -> String {
    format!(
        "{rounds}_rounds_tests_ratio_{}.json",
        ratio.to_string().replace('.', "_")
    )
}

/// Train one model per name on the same dataset.
pub async fn train_models(
    service: &mut dyn ClassifierService,
    models: &[String],
    dataset: &Dataset,
) -> Result<Vec<ModelHandle>> {
    let mut handles = Vec::with_capacity(models.len());
    for model in models {
        let handle = classifier::train(service, model, dataset).await?;
        tracing::info!("Trained {} on {} records", handle.name(), dataset.len());
        handles.push(handle);
    }
    Ok(handles)
}

/// Runs the replay policies over one evaluation corpus.
pub struct Evaluator<'a> {
    corpus: &'a Corpus,
    options: OfflineOptions,
    rng: StdRng,
}

impl<'a> Evaluator<'a> {
    pub fn new(corpus: &'a Corpus, options: OfflineOptions) -> Self {
        Self {
            corpus,
            options,
            rng: StdRng::seed_from_u64(options.seed),
        }
    }

    /// Total rounds [`Evaluator::evaluate`] runs for `models` models.
    pub fn total_rounds(&self, models: usize) -> u64 {
        (self.options.rounds * (2 + 2 * models)) as u64
    }

    /// Run all four policies. `on_round` is called after every round.
    pub async fn evaluate(
        &mut self,
        service: &dyn ClassifierService,
        handles: &[ModelHandle],
        mut on_round: impl FnMut(),
    ) -> Result<OfflineReport> {
        let random_fixed = self.random_fixed(&mut on_round)?;
        let random_reach = self.random_reach(&mut on_round)?;

        let mut model_fixed = BTreeMap::new();
        let mut model_reach = BTreeMap::new();
        for handle in handles {
            let fixed = self.model_fixed(service, handle, &mut on_round).await?;
            model_fixed.insert(handle.name().to_string(), fixed);
            let reach = self.model_reach(service, handle, &mut on_round).await?;
            model_reach.insert(handle.name().to_string(), reach);
        }

        Ok(OfflineReport {
            random_fixed,
            random_reach,
            model_fixed,
            model_reach,
        })
    }

    /// `num_tests` distinct random cases per round.
    pub fn random_fixed(&mut self, on_round: &mut impl FnMut()) -> Result<AggregateResult> {
        ensure_available("random_fixed", self.options.num_tests, self.corpus.len())?;

        let corpus = self.corpus;
        let mut results = Vec::with_capacity(self.options.rounds);
        for round in 0..self.options.rounds {
            let mut sampler = RoundSampler::new(corpus.entries());
            let mut tally = ExecutionTally::default();
            for _ in 0..self.options.num_tests {
                tally.record(sampler.draw(&mut self.rng, "random_fixed")?);
            }
            tracing::debug!("random-fixed round {round}: {} unsafe", tally.num_unsafe);
            results.push(tally.to_metrics());
            on_round();
        }
        aggregate(results)
    }

    /// Distinct random cases until `num_unsafe` unsafe ones were drawn.
    pub fn random_reach(&mut self, on_round: &mut impl FnMut()) -> Result<AggregateResult> {
        let available = self.corpus.count(SafetyLabel::Unsafe);
        ensure_available("random_reach", self.options.num_unsafe, available)?;

        let corpus = self.corpus;
        let mut results = Vec::with_capacity(self.options.rounds);
        for round in 0..self.options.rounds {
            let mut sampler = RoundSampler::new(corpus.entries());
            let mut tally = ExecutionTally::default();
            while (tally.num_unsafe as usize) < self.options.num_unsafe {
                tally.record(sampler.draw(&mut self.rng, "random_reach")?);
            }
            tracing::debug!("random-reach round {round}: {} draws", tally.num_tests());
            results.push(tally.to_metrics());
            on_round();
        }
        aggregate(results)
    }

    /// Execute only predicted-unsafe cases until `num_tests` were executed.
    pub async fn model_fixed(
        &mut self,
        service: &dyn ClassifierService,
        handle: &ModelHandle,
        on_round: &mut impl FnMut(),
    ) -> Result<AggregateResult> {
        ensure_available("model_fixed", self.options.num_tests, self.corpus.len())?;
        let target = self.options.num_tests as u32;
        self.model_rounds(service, handle, "model_fixed", |t| t.tested() >= target, on_round)
            .await
    }

    /// Execute only predicted-unsafe cases until `num_unsafe` true positives.
    pub async fn model_reach(
        &mut self,
        service: &dyn ClassifierService,
        handle: &ModelHandle,
        on_round: &mut impl FnMut(),
    ) -> Result<AggregateResult> {
        let available = self.corpus.count(SafetyLabel::Unsafe);
        ensure_available("model_reach", self.options.num_unsafe, available)?;
        let target = self.options.num_unsafe as u32;
        self.model_rounds(service, handle, "model_reach", |t| t.unsafe_tested >= target, on_round)
            .await
    }

    async fn model_rounds(
        &mut self,
        service: &dyn ClassifierService,
        handle: &ModelHandle,
        operation: &'static str,
        done: impl Fn(&ModelTally) -> bool,
        on_round: &mut impl FnMut(),
    ) -> Result<AggregateResult> {
        let corpus = self.corpus;
        let mut results = Vec::with_capacity(self.options.rounds);
        for round in 0..self.options.rounds {
            let mut sampler = RoundSampler::new(corpus.entries());
            let mut tally = ModelTally::default();
            while !done(&tally) {
                let entry = sampler.draw(&mut self.rng, operation)?;
                let prediction = service.predict(handle, &entry.features).await?;
                tally.record(entry, prediction);
            }
            tracing::debug!(
                "{operation} {} round {round}: {} draws, {} missed unsafe",
                handle.name(),
                tally.draws,
                tally.missed_unsafe
            );
            results.push(tally.to_metrics());
            on_round();
        }
        aggregate(results)
    }
}

/// A round cannot need more distinct cases than the corpus holds.
fn ensure_available(
    operation: &'static str,
    requested: usize,
    available: usize,
) -> std::result::Result<(), ContractError> {
    if requested > available {
        return Err(ContractError::Oversample {
            operation,
            requested,
            available,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::tests::StubClassifier;
    use crate::corpus::CorpusEntry;
    use crate::error::TriageError;
    use crate::types::FeatureVector;
    use std::path::PathBuf;

    /// `safe` safe cases (cost 1) then `unsafe_` unsafe cases (cost 10).
    /// `road_distance` is the index, `num_l_turns` marks unsafe cases.
    fn corpus(safe: usize, unsafe_: usize) -> Corpus {
        let entries = (0..safe + unsafe_)
            .map(|i| {
                let is_unsafe = i >= safe;
                CorpusEntry {
                    path: PathBuf::from(format!("test_{i}.json")),
                    features: FeatureVector {
                        road_distance: i as f64,
                        num_l_turns: if is_unsafe { 1.0 } else { 0.0 },
                        ..Default::default()
                    },
                    label: if is_unsafe {
                        SafetyLabel::Unsafe
                    } else {
                        SafetyLabel::Safe
                    },
                    cost: if is_unsafe { 10.0 } else { 1.0 },
                }
            })
            .collect();
        Corpus::new(entries)
    }

    fn options(rounds: usize) -> OfflineOptions {
        OfflineOptions {
            num_tests: 10,
            num_unsafe: 3,
            rounds,
            seed: 42,
        }
    }

    fn perfect(f: &FeatureVector) -> SafetyLabel {
        if f.num_l_turns > 0.0 {
            SafetyLabel::Unsafe
        } else {
            SafetyLabel::Safe
        }
    }

    fn handle() -> ModelHandle {
        ModelHandle::new("Stub.model", "Stub.model", 0)
    }

    #[test]
    fn test_random_fixed_converges_to_unsafe_share() {
        let corpus = corpus(20, 5);
        let mut evaluator = Evaluator::new(&corpus, options(1000));
        let agg = evaluator.random_fixed(&mut || {}).unwrap();

        assert_eq!(agg.results.len(), 1000);
        assert!(agg.results.iter().all(|r| r["num_tests"] == 10.0));
        let avg_unsafe = agg.average("num_unsafe").unwrap();
        assert!((avg_unsafe - 2.0).abs() < 0.15, "avg unsafe {avg_unsafe}");
    }

    #[test]
    fn test_random_fixed_round_costs_match_counts() {
        let corpus = corpus(20, 5);
        let mut evaluator = Evaluator::new(&corpus, options(50));
        let agg = evaluator.random_fixed(&mut || {}).unwrap();
        for r in &agg.results {
            // Distinct draws: never more unsafe cases than the corpus holds
            assert!(r["num_unsafe"] <= 5.0);
            assert_eq!(r["cost_unsafe"], r["num_unsafe"] * 10.0);
            assert_eq!(r["total_cost"], r["cost_safe"] + r["cost_unsafe"]);
        }
    }

    #[test]
    fn test_random_fixed_oversample_fails() {
        let corpus = corpus(3, 2);
        let mut evaluator = Evaluator::new(&corpus, options(1));
        let err = evaluator.random_fixed(&mut || {}).unwrap_err();
        assert!(matches!(
            err,
            TriageError::Contract(ContractError::Oversample {
                requested: 10,
                available: 5,
                ..
            })
        ));
    }

    #[test]
    fn test_random_reach_stops_at_target() {
        let corpus = corpus(20, 5);
        let mut evaluator = Evaluator::new(&corpus, options(200));
        let agg = evaluator.random_reach(&mut || {}).unwrap();
        for r in &agg.results {
            assert_eq!(r["num_unsafe"], 3.0);
            assert!(r["num_tests"] <= 23.0);
        }
        assert_eq!(agg.average("num_unsafe"), Some(3.0));
    }

    #[test]
    fn test_random_reach_requires_enough_unsafe_cases() {
        let corpus = corpus(20, 2);
        let mut evaluator = Evaluator::new(&corpus, options(1));
        let err = evaluator.random_reach(&mut || {}).unwrap_err();
        assert!(matches!(
            err,
            TriageError::Contract(ContractError::Oversample {
                operation: "random_reach",
                requested: 3,
                available: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_model_fixed_perfect_classifier() {
        let corpus = corpus(20, 15);
        let stub = StubClassifier::new(perfect);
        let mut evaluator = Evaluator::new(&corpus, options(20));
        let agg = evaluator.model_fixed(&stub, &handle(), &mut || {}).await.unwrap();

        for r in &agg.results {
            assert_eq!(r["num_missed_unsafe_tests"], 0.0);
            assert_eq!(r["num_unsafe_file_tested"], 10.0);
            assert_eq!(r["num_safe_file_tested"], 0.0);
            assert_eq!(r["total_costs"], 100.0);
            assert_eq!(r["saved_costs"], r["num_missed_safe_tests"]);
        }
    }

    #[tokio::test]
    async fn test_model_fixed_occasional_unsafe_terminates() {
        let corpus = corpus(20, 5);
        // Every third case by index is predicted unsafe: 9 of 25
        let stub = StubClassifier::new(|f| {
            if (f.road_distance as u32) % 3 == 0 {
                SafetyLabel::Unsafe
            } else {
                SafetyLabel::Safe
            }
        });
        let mut opts = options(100);
        opts.num_tests = 5;
        let mut evaluator = Evaluator::new(&corpus, opts);
        let agg = evaluator.model_fixed(&stub, &handle(), &mut || {}).await.unwrap();

        for r in &agg.results {
            let tested = r["num_safe_file_tested"] + r["num_unsafe_file_tested"];
            let skipped = r["num_missed_safe_tests"] + r["num_missed_unsafe_tests"];
            assert_eq!(tested, 5.0);
            // At most all 16 predicted-safe cases are drawn before the 5th hit
            assert!(skipped <= 16.0);
        }
    }

    #[tokio::test]
    async fn test_model_fixed_always_safe_exhausts_corpus() {
        let corpus = corpus(20, 5);
        let stub = StubClassifier::new(|_| SafetyLabel::Safe);
        let mut evaluator = Evaluator::new(&corpus, options(3));
        let err = evaluator
            .model_fixed(&stub, &handle(), &mut || {})
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TriageError::Contract(ContractError::Oversample {
                operation: "model_fixed",
                requested: 26,
                available: 25
            })
        ));
    }

    #[tokio::test]
    async fn test_model_reach_counts_true_positives() {
        let corpus = corpus(20, 5);
        // Flags every unsafe case and every even-indexed safe case
        let stub = StubClassifier::new(|f| {
            if f.num_l_turns > 0.0 || (f.road_distance as u32) % 2 == 0 {
                SafetyLabel::Unsafe
            } else {
                SafetyLabel::Safe
            }
        });
        let mut evaluator = Evaluator::new(&corpus, options(50));
        let agg = evaluator.model_reach(&stub, &handle(), &mut || {}).await.unwrap();

        for r in &agg.results {
            assert_eq!(r["num_unsafe_file_tested"], 3.0);
            assert_eq!(r["num_missed_unsafe_tests"], 0.0);
            assert_eq!(
                r["total_costs"],
                r["cost_from_safe_file"] + r["num_unsafe_file_tested"] * 10.0
            );
        }
    }

    #[tokio::test]
    async fn test_model_reach_fails_before_classifying_short_corpus() {
        let corpus = corpus(198, 2);
        let stub = StubClassifier::new(|_| SafetyLabel::Unsafe);
        let predicts = stub.predicts.clone();
        let mut evaluator = Evaluator::new(&corpus, options(5));
        let err = evaluator
            .model_reach(&stub, &handle(), &mut || {})
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TriageError::Contract(ContractError::Oversample {
                operation: "model_reach",
                requested: 3,
                available: 2
            })
        ));
        assert_eq!(predicts.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_fixed_fails_before_classifying_small_corpus() {
        let corpus = corpus(4, 4);
        let stub = StubClassifier::new(perfect);
        let predicts = stub.predicts.clone();
        let mut evaluator = Evaluator::new(&corpus, options(1));
        let err = evaluator
            .model_fixed(&stub, &handle(), &mut || {})
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TriageError::Contract(ContractError::Oversample {
                operation: "model_fixed",
                requested: 10,
                available: 8
            })
        ));
        assert_eq!(predicts.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_evaluate_runs_every_policy() {
        let corpus = corpus(20, 15);
        let stub = StubClassifier::new(perfect);
        let handles = vec![
            ModelHandle::new("A.model", "A.model", 0),
            ModelHandle::new("B.model", "B.model", 0),
        ];
        let mut evaluator = Evaluator::new(&corpus, options(4));
        let mut rounds = 0u64;
        let report = evaluator
            .evaluate(&stub, &handles, || rounds += 1)
            .await
            .unwrap();

        assert_eq!(rounds, evaluator.total_rounds(2));
        assert_eq!(rounds, 24);
        assert_eq!(report.random_fixed.results.len(), 4);
        assert_eq!(report.random_reach.results.len(), 4);
        assert_eq!(
            report.model_fixed.keys().collect::<Vec<_>>(),
            vec!["A.model", "B.model"]
        );
        assert_eq!(report.model_reach["B.model"].results.len(), 4);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["random_fixed"]["avg_num_unsafe"].is_number());
        assert!(json["model_reach"]["A.model"]["avg_num_unsafe_file_tested"].is_number());
    }

    #[test]
    fn test_same_seed_same_results() {
        let corpus = corpus(20, 5);
        let a = Evaluator::new(&corpus, options(10))
            .random_fixed(&mut || {})
            .unwrap();
        let b = Evaluator::new(&corpus, options(10))
            .random_fixed(&mut || {})
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_report_file_name() {
        assert_eq!(report_file_name(30, 0.45), "30_rounds_tests_ratio_0_45.json");
    }

    #[tokio::test]
    async fn test_train_models_registers_each_name() {
        let mut stub = StubClassifier::new(perfect);
        let trains = stub.trains.clone();
        let dataset = corpus(2, 2).to_dataset();
        let models = vec!["J48.model".to_string(), "Logistic.model".to_string()];
        let handles = train_models(&mut stub, &models, &dataset).await.unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[1].name(), "Logistic.model");
        assert_eq!(trains.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
