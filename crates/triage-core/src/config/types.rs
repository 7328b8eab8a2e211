//! Sub-configuration structs with their defaults.

use crate::features::FeatureSet;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory for run artifacts, logs and result files
    pub output_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("~/.triage/output"),
        }
    }
}

/// Online adaptive triage loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlineConfig {
    /// Wall-clock budget for the whole run, in minutes
    pub time_budget_mins: u64,

    /// Candidates generated and classified per batch
    pub bulk_size: usize,

    /// Executed cases that close a round
    pub round_size: usize,

    /// Retrain the model after every round
    pub adaptive: bool,

    /// Cold start executes `seed_multiplier × bulk_size` unfiltered cases
    pub seed_multiplier: usize,

    /// Model trained and queried by the loop
    pub model: String,

    /// Existing training CSV; skips the cold start when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_data: Option<PathBuf>,
}

impl Default for OnlineConfig {
    fn default() -> Self {
        Self {
            time_budget_mins: 360,
            bulk_size: 20,
            round_size: 20,
            adaptive: true,
            seed_multiplier: 3,
            model: "Logistic.model".to_string(),
            init_data: None,
        }
    }
}

/// Offline policy evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Executed cases per round for the fixed-count policies
    pub num_tests: usize,

    /// Unsafe cases to reach per round for the reach policies
    pub num_unsafe: usize,

    /// Rounds averaged per policy
    pub rounds: usize,

    /// Unsafe share of the evaluation corpus
    pub ratio: f64,

    /// Share of the scarcer label moved into the training corpus
    pub train_ratio: f64,

    /// RNG seed; a fresh seed is drawn when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            num_tests: 10,
            num_unsafe: 10,
            rounds: 30,
            ratio: 0.45,
            train_ratio: 0.8,
            seed: None,
        }
    }
}

/// Simulator execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Fixed delay between attempts after a simulator failure
    pub retry_delay_ms: u64,

    /// Stop retrying a failed case once the run budget has expired
    pub cancel_at_deadline: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 30_000,
            cancel_at_deadline: false,
        }
    }
}

/// Classifier toolkit invocation.
///
/// Argument templates accept `{dataset}`, `{model_dir}`, `{model}` and
/// `{input}` placeholders. The evaluator template takes `{training}`,
/// `{test}`, `{split}` and `{results}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Program to run (usually the Java launcher)
    pub program: String,

    /// Arguments for training one model
    pub train_args: Vec<String>,

    /// Arguments for classifying a single case
    pub predict_args: Vec<String>,

    /// Arguments for classifying a batch of cases
    pub batch_predict_args: Vec<String>,

    /// Arguments for scoring every model on one training/test split
    pub evaluate_args: Vec<String>,

    /// Training fractions used by `evaluate-models`
    pub evaluation_ratios: Vec<f64>,

    /// Models trained for offline evaluation
    pub models: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let jar = |name: &str| format!("~/.triage/jars/{name}");
        Self {
            program: "java".to_string(),
            train_args: vec![
                "-jar".to_string(),
                jar("train_models.jar"),
                "{dataset}".to_string(),
                "{model_dir}".to_string(),
            ],
            predict_args: vec![
                "-jar".to_string(),
                jar("makePrediction.jar"),
                "{input}".to_string(),
                "{model}".to_string(),
            ],
            batch_predict_args: vec![
                "-jar".to_string(),
                jar("makeBatchPrediction.jar"),
                "{input}".to_string(),
                "{model}".to_string(),
            ],
            evaluate_args: vec![
                "-jar".to_string(),
                jar("ModelEvaluator.jar"),
                "{training}".to_string(),
                "{test}".to_string(),
                "{split}".to_string(),
                "{results}".to_string(),
            ],
            evaluation_ratios: vec![0.4, 0.5, 0.6, 0.8],
            models: vec![
                "J48.model".to_string(),
                "RandomForest.model".to_string(),
                "Logistic.model".to_string(),
            ],
        }
    }
}

/// External generator and simulator programs.
///
/// Argument templates accept `{input}` and `{output}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub generator_program: String,
    pub generator_args: Vec<String>,
    pub simulator_program: String,
    pub simulator_args: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            generator_program: "asfault-generate".to_string(),
            generator_args: vec!["--output".to_string(), "{output}".to_string()],
            simulator_program: "asfault-execute".to_string(),
            simulator_args: vec![
                "--input".to_string(),
                "{input}".to_string(),
                "--output".to_string(),
                "{output}".to_string(),
            ],
        }
    }
}

/// Feature schema selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// "road-geometry" or "topology"
    pub set: FeatureSet,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
