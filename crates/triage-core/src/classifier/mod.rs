//! Classifier service interface and its contract checks.
//!
//! The classifier toolkit lives outside this crate. Implementations of
//! [`ClassifierService`] hand out [`ModelHandle`]s: opaque capability tokens
//! created by training and consumed by retraining, so a stale handle cannot
//! outlive the model it names.

pub mod command;

pub use command::CommandClassifier;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::dataset::Dataset;
use crate::error::{ContractError, Result};
use crate::types::{FeatureVector, SafetyLabel};

/// Opaque reference to a trained model artifact.
///
/// Not `Clone`: retraining takes the handle by value and returns its
/// replacement.
#[derive(Debug, PartialEq, Eq)]
pub struct ModelHandle {
    name: String,
    artifact: PathBuf,
    generation: u64,
}

impl ModelHandle {
    /// Create a handle. Only classifier services should call this.
    pub fn new(name: impl Into<String>, artifact: impl Into<PathBuf>, generation: u64) -> Self {
        Self {
            name: name.into(),
            artifact: artifact.into(),
            generation,
        }
    }

    /// Model name (e.g. "Logistic.model").
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// How many times this model has been (re)trained.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Train, retrain and query a safety classifier.
///
/// Uses `async_trait` so the loop can hold a `Box<dyn ClassifierService>`.
#[async_trait]
pub trait ClassifierService: Send + Sync {
    /// Train the named model from scratch.
    async fn train(&mut self, model: &str, dataset: &Dataset) -> Result<ModelHandle>;

    /// Replace `previous` with a model trained on `dataset`.
    async fn retrain(&mut self, dataset: &Dataset, previous: ModelHandle) -> Result<ModelHandle>;

    /// Classify a single case.
    async fn predict(&self, handle: &ModelHandle, features: &FeatureVector) -> Result<SafetyLabel>;

    /// Classify many cases in one call, in input order.
    async fn predict_batch(
        &self,
        handle: &ModelHandle,
        features: &[FeatureVector],
    ) -> Result<Vec<SafetyLabel>>;
}

/// Train after checking the dataset holds both labels.
pub async fn train(
    service: &mut dyn ClassifierService,
    model: &str,
    dataset: &Dataset,
) -> Result<ModelHandle> {
    dataset.ensure_trainable("train")?;
    service.train(model, dataset).await
}

/// Retrain after checking the dataset holds both labels.
pub async fn retrain(
    service: &mut dyn ClassifierService,
    dataset: &Dataset,
    previous: ModelHandle,
) -> Result<ModelHandle> {
    dataset.ensure_trainable("retrain")?;
    service.retrain(dataset, previous).await
}

/// Batch prediction that enforces the exact-length contract.
pub async fn predict_batch(
    service: &dyn ClassifierService,
    handle: &ModelHandle,
    features: &[FeatureVector],
) -> Result<Vec<SafetyLabel>> {
    let labels = service.predict_batch(handle, features).await?;
    if labels.len() != features.len() {
        return Err(ContractError::BatchLength {
            operation: "predict_batch",
            expected: features.len(),
            actual: labels.len(),
        }
        .into());
    }
    Ok(labels)
}
