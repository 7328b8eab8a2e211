//! Core data types shared by the online loop and the offline evaluator.
//!
//! A test case is an opaque JSON document (the generated road scenario) plus
//! the feature vector derived from it. Once executed it also carries the
//! simulator outcome, from which its ground-truth safety label follows.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ground-truth (or predicted) safety of a test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLabel {
    Safe,
    Unsafe,
}

impl SafetyLabel {
    /// Label derived from an out-of-bound count: unsafe iff at least one.
    pub fn from_oob_count(count: u32) -> Self {
        if count > 0 {
            Self::Unsafe
        } else {
            Self::Safe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Unsafe => "unsafe",
        }
    }

    /// Parse "safe"/"unsafe" (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "safe" => Some(Self::Safe),
            "unsafe" => Some(Self::Unsafe),
            _ => None,
        }
    }

    pub fn is_unsafe(&self) -> bool {
        matches!(self, Self::Unsafe)
    }
}

impl fmt::Display for SafetyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-schema numeric summary of a road's geometry.
///
/// Every field is always populated: statistics over an empty set are 0.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    pub direct_distance: f64,
    pub road_distance: f64,
    pub num_l_turns: f64,
    pub num_r_turns: f64,
    pub num_straights: f64,
    pub median_angle: f64,
    pub total_angle: f64,
    pub mean_angle: f64,
    pub std_angle: f64,
    pub max_angle: f64,
    pub min_angle: f64,
    pub median_pivot_off: f64,
    pub mean_pivot_off: f64,
    pub std_pivot_off: f64,
    pub max_pivot_off: f64,
    pub min_pivot_off: f64,
}

impl FeatureVector {
    /// Column names in dataset order.
    pub const COLUMNS: [&'static str; 16] = [
        "direct_distance",
        "road_distance",
        "num_l_turns",
        "num_r_turns",
        "num_straights",
        "median_angle",
        "total_angle",
        "mean_angle",
        "std_angle",
        "max_angle",
        "min_angle",
        "median_pivot_off",
        "mean_pivot_off",
        "std_pivot_off",
        "max_pivot_off",
        "min_pivot_off",
    ];

    pub fn to_array(&self) -> [f64; 16] {
        [
            self.direct_distance,
            self.road_distance,
            self.num_l_turns,
            self.num_r_turns,
            self.num_straights,
            self.median_angle,
            self.total_angle,
            self.mean_angle,
            self.std_angle,
            self.max_angle,
            self.min_angle,
            self.median_pivot_off,
            self.mean_pivot_off,
            self.std_pivot_off,
            self.max_pivot_off,
            self.min_pivot_off,
        ]
    }

    pub fn from_array(v: [f64; 16]) -> Self {
        Self {
            direct_distance: v[0],
            road_distance: v[1],
            num_l_turns: v[2],
            num_r_turns: v[3],
            num_straights: v[4],
            median_angle: v[5],
            total_angle: v[6],
            mean_angle: v[7],
            std_angle: v[8],
            max_angle: v[9],
            min_angle: v[10],
            median_pivot_off: v[11],
            mean_pivot_off: v[12],
            std_pivot_off: v[13],
            max_pivot_off: v[14],
            min_pivot_off: v[15],
        }
    }
}

/// Result of executing a test case in the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    #[serde(with = "timestamp")]
    pub start_time: NaiveDateTime,

    #[serde(with = "timestamp")]
    pub end_time: NaiveDateTime,

    /// Number of times the vehicle left the lane
    #[serde(rename = "oobs")]
    pub out_of_bound_count: u32,

    /// Why the simulation stopped ("goal_reached", "off_track", "timeout", ...)
    #[serde(rename = "reason", default)]
    pub termination_reason: String,
}

impl ExecutionOutcome {
    pub fn label(&self) -> SafetyLabel {
        SafetyLabel::from_oob_count(self.out_of_bound_count)
    }

    /// Execution cost in seconds, never negative.
    pub fn cost(&self) -> f64 {
        let secs = (self.end_time - self.start_time).num_microseconds().unwrap_or(0) as f64 / 1e6;
        secs.max(0.0)
    }
}

/// A generated candidate scenario.
#[derive(Debug, Clone)]
pub struct TestCase {
    /// Identifier used in logs and artifact names
    pub id: String,
    /// The raw generated document
    pub document: serde_json::Value,
    /// Features derived from `document`
    pub features: FeatureVector,
    /// Set once the simulator has run the case
    pub outcome: Option<ExecutionOutcome>,
}

impl TestCase {
    pub fn new(id: impl Into<String>, document: serde_json::Value, features: FeatureVector) -> Self {
        Self {
            id: id.into(),
            document,
            features,
            outcome: None,
        }
    }

    /// Ground-truth label, if the case has been executed.
    pub fn label(&self) -> Option<SafetyLabel> {
        self.outcome.as_ref().map(ExecutionOutcome::label)
    }

    /// Labeled record for an executed case.
    pub fn to_record(&self) -> Option<LabeledRecord> {
        self.label().map(|label| LabeledRecord::new(self.features, label))
    }

    /// The artifact document with the execution block (if any) merged in.
    pub fn to_document(&self) -> serde_json::Value {
        let mut doc = self.document.clone();
        if let (Some(outcome), Some(obj)) = (&self.outcome, doc.as_object_mut()) {
            if let Ok(exec) = serde_json::to_value(outcome) {
                obj.insert("execution".to_string(), exec);
            }
        }
        doc
    }
}

/// A feature vector with its ground-truth label. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    features: FeatureVector,
    label: SafetyLabel,
}

impl LabeledRecord {
    pub fn new(features: FeatureVector, label: SafetyLabel) -> Self {
        Self { features, label }
    }

    pub fn features(&self) -> &FeatureVector {
        &self.features
    }

    pub fn label(&self) -> SafetyLabel {
        self.label
    }
}

/// Serde helpers for the simulator's naive ISO-8601 timestamps.
pub mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    pub fn parse(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
        NaiveDateTime::parse_from_str(s, FORMAT)
    }

    pub fn serialize<S: Serializer>(t: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%Y-%m-%dT%H:%M:%S%.6f").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(start: &str, end: &str, oobs: u32) -> ExecutionOutcome {
        ExecutionOutcome {
            start_time: timestamp::parse(start).unwrap(),
            end_time: timestamp::parse(end).unwrap(),
            out_of_bound_count: oobs,
            termination_reason: "goal_reached".to_string(),
        }
    }

    #[test]
    fn test_label_from_oob_count() {
        assert_eq!(SafetyLabel::from_oob_count(0), SafetyLabel::Safe);
        assert_eq!(SafetyLabel::from_oob_count(3), SafetyLabel::Unsafe);
    }

    #[test]
    fn test_cost_in_seconds() {
        let o = outcome("2020-01-01T10:00:00.000000", "2020-01-01T10:01:30.500000", 0);
        assert!((o.cost() - 90.5).abs() < 1e-9);
        assert_eq!(o.label(), SafetyLabel::Safe);
    }

    #[test]
    fn test_cost_never_negative() {
        let o = outcome("2020-01-01T10:00:10.0", "2020-01-01T10:00:00.0", 1);
        assert_eq!(o.cost(), 0.0);
        assert_eq!(o.label(), SafetyLabel::Unsafe);
    }

    #[test]
    fn test_outcome_serde_field_names() {
        let o = outcome("2020-01-01T10:00:00.25", "2020-01-01T10:00:05.0", 2);
        let json = serde_json::to_value(&o).unwrap();
        assert_eq!(json["oobs"], 2);
        assert_eq!(json["reason"], "goal_reached");
        assert_eq!(json["start_time"], "2020-01-01T10:00:00.250000");

        let parsed: ExecutionOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, o);
    }

    #[test]
    fn test_label_parse() {
        assert_eq!(SafetyLabel::parse("UNSAFE"), Some(SafetyLabel::Unsafe));
        assert_eq!(SafetyLabel::parse(" safe "), Some(SafetyLabel::Safe));
        assert_eq!(SafetyLabel::parse("maybe"), None);
    }

    #[test]
    fn test_to_document_merges_execution() {
        let mut case = TestCase::new(
            "t1",
            serde_json::json!({"path": [1]}),
            FeatureVector::default(),
        );
        assert!(case.to_document().get("execution").is_none());
        case.outcome = Some(outcome("2020-01-01T10:00:00.0", "2020-01-01T10:00:01.0", 0));
        let doc = case.to_document();
        assert_eq!(doc["execution"]["oobs"], 0);
        assert_eq!(case.to_record().unwrap().label(), SafetyLabel::Safe);
    }
}
