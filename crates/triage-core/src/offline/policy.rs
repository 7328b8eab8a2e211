//! Per-round sampling and accounting for the replay policies.

use rand::Rng;

use crate::corpus::CorpusEntry;
use crate::error::ContractError;
use crate::metrics::Metrics;
use crate::types::SafetyLabel;

/// Draws distinct corpus entries for one round.
///
/// A partial Fisher-Yates shuffle: each draw picks uniformly among the
/// entries not yet drawn this round. A fresh sampler starts every round, so
/// entries repeat across rounds but never within one.
pub struct RoundSampler<'a> {
    entries: &'a [CorpusEntry],
    order: Vec<usize>,
    drawn: usize,
}

impl<'a> RoundSampler<'a> {
    pub fn new(entries: &'a [CorpusEntry]) -> Self {
        Self {
            entries,
            order: (0..entries.len()).collect(),
            drawn: 0,
        }
    }

    /// Next distinct entry, or `Oversample` once the corpus is exhausted.
    pub fn draw<R: Rng>(
        &mut self,
        rng: &mut R,
        operation: &'static str,
    ) -> Result<&'a CorpusEntry, ContractError> {
        if self.drawn >= self.order.len() {
            return Err(ContractError::Oversample {
                operation,
                requested: self.drawn + 1,
                available: self.entries.len(),
            });
        }
        let pick = rng.gen_range(self.drawn..self.order.len());
        self.order.swap(self.drawn, pick);
        let entry = &self.entries[self.order[self.drawn]];
        self.drawn += 1;
        Ok(entry)
    }
}

/// Cost and count tally of a set of executed cases (random policies).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExecutionTally {
    pub total_cost: f64,
    pub cost_safe: f64,
    pub cost_unsafe: f64,
    pub num_safe: u32,
    pub num_unsafe: u32,
}

impl ExecutionTally {
    pub fn record(&mut self, entry: &CorpusEntry) {
        match entry.label {
            SafetyLabel::Unsafe => {
                self.num_unsafe += 1;
                self.cost_unsafe += entry.cost;
            }
            SafetyLabel::Safe => {
                self.num_safe += 1;
                self.cost_safe += entry.cost;
            }
        }
        self.total_cost += entry.cost;
    }

    pub fn num_tests(&self) -> u32 {
        self.num_safe + self.num_unsafe
    }

    pub fn to_metrics(&self) -> Metrics {
        [
            ("total_cost", self.total_cost),
            ("cost_safe", self.cost_safe),
            ("cost_unsafe", self.cost_unsafe),
            ("num_safe", self.num_safe as f64),
            ("num_unsafe", self.num_unsafe as f64),
            ("num_tests", self.num_tests() as f64),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// Tally of a classifier-guided round.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelTally {
    /// Predicted safe, actually unsafe: the dangerous miss
    pub missed_unsafe: u32,
    /// Predicted safe, actually safe: execution correctly avoided
    pub missed_safe: u32,
    /// Cost of the correctly avoided executions
    pub saved_costs: f64,
    /// Cost of every executed (predicted unsafe) case
    pub total_costs: f64,
    pub safe_tested: u32,
    pub unsafe_tested: u32,
    pub cost_from_safe: f64,
    /// Cases drawn this round, executed or not
    pub draws: u32,
}

impl ModelTally {
    pub fn record(&mut self, entry: &CorpusEntry, prediction: SafetyLabel) {
        self.draws += 1;
        match (prediction, entry.label) {
            (SafetyLabel::Safe, SafetyLabel::Safe) => {
                self.missed_safe += 1;
                self.saved_costs += entry.cost;
            }
            (SafetyLabel::Safe, SafetyLabel::Unsafe) => {
                self.missed_unsafe += 1;
            }
            (SafetyLabel::Unsafe, SafetyLabel::Safe) => {
                self.safe_tested += 1;
                self.cost_from_safe += entry.cost;
                self.total_costs += entry.cost;
            }
            (SafetyLabel::Unsafe, SafetyLabel::Unsafe) => {
                self.unsafe_tested += 1;
                self.total_costs += entry.cost;
            }
        }
    }

    /// Cases executed (predicted unsafe).
    pub fn tested(&self) -> u32 {
        self.safe_tested + self.unsafe_tested
    }

    pub fn to_metrics(&self) -> Metrics {
        [
            ("num_missed_unsafe_tests", self.missed_unsafe as f64),
            ("num_missed_safe_tests", self.missed_safe as f64),
            ("saved_costs", self.saved_costs),
            ("total_costs", self.total_costs),
            ("num_safe_file_tested", self.safe_tested as f64),
            ("num_unsafe_file_tested", self.unsafe_tested as f64),
            ("cost_from_safe_file", self.cost_from_safe),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}
