//! Error types for the triage engines.
//!
//! Errors follow the failure taxonomy of a run: transient harness failures
//! (retried, never fatal), integration contract violations (fatal, carry
//! expected vs actual), degenerate metrics (fatal, never defaulted) and
//! malformed input records (skipped by the corpus scan).

use std::path::PathBuf;
use thiserror::Error;

use crate::types::SafetyLabel;

/// Top-level error type for triage operations.
#[derive(Error, Debug)]
pub enum TriageError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A collaborator broke its contract
    #[error("Contract violation: {0}")]
    Contract(#[from] ContractError),

    /// A metric could not be computed
    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    /// Generator/simulator/classifier tool failure
    #[error("Harness error: {0}")]
    Harness(#[from] HarnessError),

    /// A stored test artifact could not be read
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV dataset errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Integration contract violations. Always fatal to the current run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractError {
    /// Batch prediction returned the wrong number of labels
    #[error("{operation}: expected {expected} labels, got {actual}")]
    BatchLength {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Dataset handed to training lacks one of the two labels
    #[error("{operation}: dataset has no '{label}' records")]
    MissingLabel {
        operation: &'static str,
        label: SafetyLabel,
    },

    /// Aggregation input entries do not share one key set
    #[error("aggregate: entry {index} disagrees on key '{key}'")]
    KeyMismatch { index: usize, key: String },

    /// More distinct cases requested than the corpus holds
    #[error("{operation}: requested {requested} distinct cases, only {available} available")]
    Oversample {
        operation: &'static str,
        requested: usize,
        available: usize,
    },

    /// Model handle does not belong to the classifier service
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Classifier tool printed something we cannot map to a label
    #[error("{operation}: unrecognized classifier output {line:?}")]
    ClassifierOutput {
        operation: &'static str,
        line: String,
    },
}

/// Metrics that are undefined for the given inputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricsError {
    /// Precision over a round that predicted nothing unsafe
    #[error("unsafe precision is undefined: no case was predicted unsafe")]
    ZeroPredictedUnsafe,

    /// Averaging over an empty result list
    #[error("cannot average zero rounds")]
    NoRounds,
}

/// Failures of external tools (generator, simulator, classifier toolkit).
#[derive(Error, Debug)]
pub enum HarnessError {
    /// The simulator failed to execute a test case
    #[error("Execution failed for {case}: {message}")]
    Execution { case: String, message: String },

    /// An external program could not be spawned or exited unsuccessfully
    #[error("Command {program} failed: {message}")]
    Command { program: String, message: String },

    /// Execution was abandoned because the run budget expired
    #[error("Execution of {case} cancelled: budget expired")]
    Cancelled { case: String },
}

/// A stored test artifact missing expected fields.
#[derive(Error, Debug)]
#[error("Malformed record {path}: {message}")]
pub struct RecordError {
    pub path: PathBuf,
    pub message: String,
}

impl RecordError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Convenience type alias for triage results.
pub type Result<T> = std::result::Result<T, TriageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_names_operation_and_counts() {
        let err = ContractError::BatchLength {
            operation: "predict_batch",
            expected: 4,
            actual: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("predict_batch"));
        assert!(msg.contains("expected 4"));
        assert!(msg.contains("got 3"));
    }

    #[test]
    fn test_contract_error_converts_to_triage_error() {
        let err: TriageError = ContractError::UnknownModel("J48.model".into()).into();
        assert!(matches!(err, TriageError::Contract(_)));
        assert!(err.to_string().contains("J48.model"));
    }

    #[test]
    fn test_missing_label_message() {
        let err = ContractError::MissingLabel {
            operation: "train",
            label: SafetyLabel::Unsafe,
        };
        assert_eq!(err.to_string(), "train: dataset has no 'unsafe' records");
    }
}
