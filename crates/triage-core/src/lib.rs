//! Triage Core - classifier-guided prioritization of simulator test cases.
//!
//! Executing a generated driving scenario in the simulator is expensive.
//! This library spends that budget on the cases a learned safety classifier
//! flags as likely unsafe, and measures how well that works:
//!
//! - [`online`]: a budget-bounded loop that generates candidates, executes
//!   only those predicted unsafe, labels them from the outcome and retrains
//! - [`offline`]: random and classifier-guided replay policies over an
//!   already-executed corpus, averaged over many rounds
//! - [`evaluation`]: hold-out scoring of the toolkit's models at several
//!   training splits
//!
//! ```text
//! Generator → FeatureVector → Classifier → (unsafe?) Simulator → Label → Dataset → retrain
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use triage_core::{Config, Corpus, Evaluator, OfflineOptions};
//!
//! let config = Config::load()?;
//! let extractor = config.features.set.extractor();
//! let corpus = Corpus::load_dir("./executed".as_ref(), extractor.as_ref());
//! let report = Evaluator::new(&corpus, OfflineOptions::from_config(&config))
//!     .evaluate(&classifier, &handles, || {})
//!     .await?;
//! ```

// Module declarations
pub mod classifier;
pub mod config;
pub mod corpus;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod harness;
pub mod metrics;
pub mod offline;
pub mod online;
pub mod output;
pub mod types;

// Re-exports for convenient access
pub use classifier::{ClassifierService, CommandClassifier, ModelHandle};
pub use config::Config;
pub use corpus::{Corpus, CorpusEntry};
pub use dataset::Dataset;
pub use error::{
    ConfigError, ContractError, HarnessError, MetricsError, RecordError, Result, TriageError,
};
pub use evaluation::{EvaluationRun, ModelEvaluation, ModelEvaluator};
pub use features::{FeatureExtractor, FeatureSet};
pub use harness::{CommandGenerator, CommandSimulator, Generator, RetryPolicy, Simulator};
pub use metrics::{aggregate, AggregateResult, Metrics};
pub use offline::{Evaluator, OfflineOptions, OfflineReport};
pub use online::{OnlineOptions, OnlineResult, OnlineRunner, RoundSummary};
pub use types::{ExecutionOutcome, FeatureVector, LabeledRecord, SafetyLabel, TestCase};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
