//! Metrics accumulation across rounds and trials.
//!
//! Each round or trial reports a flat mapping of metric name to value.
//! [`aggregate`] keeps the raw list and adds an `avg_<name>` entry per metric.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ContractError, MetricsError, Result};

/// Metric name to value for one round or trial.
pub type Metrics = BTreeMap<String, f64>;

/// Raw per-round results plus their arithmetic means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Per-round mappings, in input order
    pub results: Vec<Metrics>,

    /// `avg_<key>` for every key in the round mappings
    #[serde(flatten)]
    pub averages: BTreeMap<String, f64>,
}

impl AggregateResult {
    /// Mean of `key` across all rounds, if that metric exists.
    pub fn average(&self, key: &str) -> Option<f64> {
        self.averages.get(&format!("avg_{key}")).copied()
    }
}

/// Average a list of round results that all share one key set.
///
/// Fails with [`MetricsError::NoRounds`] on an empty list and with
/// [`ContractError::KeyMismatch`] when an entry adds or lacks a key.
pub fn aggregate(results: Vec<Metrics>) -> Result<AggregateResult> {
    let first = results.first().ok_or(MetricsError::NoRounds)?;

    for (index, entry) in results.iter().enumerate().skip(1) {
        let stray = first
            .keys()
            .find(|k| !entry.contains_key(*k))
            .or_else(|| entry.keys().find(|k| !first.contains_key(*k)));
        if let Some(key) = stray {
            return Err(ContractError::KeyMismatch {
                index,
                key: key.clone(),
            }
            .into());
        }
    }

    let n = results.len() as f64;
    let averages = first
        .keys()
        .map(|key| {
            let sum: f64 = results.iter().map(|r| r[key]).sum();
            (format!("avg_{key}"), sum / n)
        })
        .collect();

    Ok(AggregateResult { results, averages })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TriageError;

    fn metrics(pairs: &[(&str, f64)]) -> Metrics {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_aggregate_averages_and_preserves_order() {
        let rounds = vec![
            metrics(&[("cost", 10.0)]),
            metrics(&[("cost", 20.0)]),
            metrics(&[("cost", 30.0)]),
        ];
        let agg = aggregate(rounds.clone()).unwrap();
        assert_eq!(agg.average("cost"), Some(20.0));
        assert_eq!(agg.results, rounds);
    }

    #[test]
    fn test_aggregate_multiple_keys() {
        let agg = aggregate(vec![
            metrics(&[("num_safe", 1.0), ("num_unsafe", 3.0)]),
            metrics(&[("num_safe", 2.0), ("num_unsafe", 0.0)]),
        ])
        .unwrap();
        assert_eq!(agg.average("num_safe"), Some(1.5));
        assert_eq!(agg.average("num_unsafe"), Some(1.5));
        assert_eq!(agg.average("missing"), None);
    }

    #[test]
    fn test_aggregate_empty_fails() {
        let err = aggregate(Vec::new()).unwrap_err();
        assert!(matches!(err, TriageError::Metrics(MetricsError::NoRounds)));
    }

    #[test]
    fn test_aggregate_missing_key_fails() {
        let err = aggregate(vec![
            metrics(&[("cost", 1.0), ("num_safe", 1.0)]),
            metrics(&[("cost", 2.0)]),
        ])
        .unwrap_err();
        match err {
            TriageError::Contract(ContractError::KeyMismatch { index, key }) => {
                assert_eq!(index, 1);
                assert_eq!(key, "num_safe");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_aggregate_extra_key_fails() {
        let err = aggregate(vec![
            metrics(&[("cost", 1.0)]),
            metrics(&[("cost", 2.0)]),
            metrics(&[("cost", 3.0), ("bonus", 1.0)]),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            TriageError::Contract(ContractError::KeyMismatch { index: 2, .. })
        ));
    }

    #[test]
    fn test_aggregate_serializes_flat() {
        let agg = aggregate(vec![metrics(&[("cost", 4.0)])]).unwrap();
        let json = serde_json::to_value(&agg).unwrap();
        assert_eq!(json["avg_cost"], 4.0);
        assert_eq!(json["results"][0]["cost"], 4.0);
    }
}
