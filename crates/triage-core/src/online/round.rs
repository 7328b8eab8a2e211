//! Per-round prediction/outcome tally.

use serde::{Deserialize, Serialize};

use crate::error::MetricsError;
use crate::types::SafetyLabel;

/// Counters owned by one round of the online loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundTally {
    pub predicted_safe: u32,
    pub predicted_unsafe: u32,
    pub actual_safe: u32,
    pub actual_unsafe: u32,
    pub true_positive: u32,
    pub false_positive: u32,
}

impl RoundTally {
    /// A case predicted safe and therefore not executed.
    pub fn record_rejected(&mut self) {
        self.predicted_safe += 1;
    }

    /// A case predicted unsafe, executed, with its ground truth.
    pub fn record_executed(&mut self, actual: SafetyLabel) {
        self.predicted_unsafe += 1;
        match actual {
            SafetyLabel::Unsafe => {
                self.actual_unsafe += 1;
                self.true_positive += 1;
            }
            SafetyLabel::Safe => {
                self.actual_safe += 1;
                self.false_positive += 1;
            }
        }
    }

    /// Executed cases so far; the round closes when this reaches the round size.
    pub fn executed(&self) -> usize {
        self.predicted_unsafe as usize
    }

    /// `true_positive / predicted_unsafe`.
    pub fn unsafe_precision(&self) -> Result<f64, MetricsError> {
        if self.predicted_unsafe == 0 {
            return Err(MetricsError::ZeroPredictedUnsafe);
        }
        Ok(self.true_positive as f64 / self.predicted_unsafe as f64)
    }

    /// Freeze the tally. An undefined precision is recorded as `None`.
    pub fn summary(&self) -> RoundSummary {
        RoundSummary {
            num_safe_pred: self.predicted_safe,
            num_unsafe_pred: self.predicted_unsafe,
            num_safe: self.actual_safe,
            num_unsafe: self.actual_unsafe,
            false_positive: self.false_positive,
            true_positive: self.true_positive,
            unsafe_precision: self.unsafe_precision().ok(),
        }
    }
}

/// What is kept of a round once it closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub num_safe_pred: u32,
    pub num_unsafe_pred: u32,
    pub num_safe: u32,
    pub num_unsafe: u32,
    pub false_positive: u32,
    pub true_positive: u32,
    /// `null` when nothing was predicted unsafe
    pub unsafe_precision: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_is_exact() {
        let tally = RoundTally {
            predicted_unsafe: 10,
            true_positive: 7,
            false_positive: 3,
            actual_unsafe: 7,
            actual_safe: 3,
            ..Default::default()
        };
        assert_eq!(tally.unsafe_precision().unwrap(), 0.7);
    }

    #[test]
    fn test_precision_without_unsafe_predictions_fails() {
        let mut tally = RoundTally::default();
        tally.record_rejected();
        tally.record_rejected();
        assert_eq!(
            tally.unsafe_precision(),
            Err(MetricsError::ZeroPredictedUnsafe)
        );
        assert_eq!(tally.summary().unsafe_precision, None);
    }

    #[test]
    fn test_record_executed_updates_counters() {
        let mut tally = RoundTally::default();
        tally.record_executed(SafetyLabel::Unsafe);
        tally.record_executed(SafetyLabel::Safe);
        tally.record_executed(SafetyLabel::Unsafe);
        tally.record_rejected();

        assert_eq!(tally.executed(), 3);
        assert_eq!(tally.true_positive, 2);
        assert_eq!(tally.false_positive, 1);
        assert_eq!(tally.predicted_safe, 1);

        let summary = tally.summary();
        assert_eq!(summary.num_unsafe, 2);
        assert_eq!(summary.num_safe, 1);
        assert!((summary.unsafe_precision.unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_summary_serializes_null_precision() {
        let json = serde_json::to_value(RoundTally::default().summary()).unwrap();
        assert!(json["unsafe_precision"].is_null());
        assert_eq!(json["num_unsafe_pred"], 0);
    }
}
