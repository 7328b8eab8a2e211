//! Feature extraction from generated road documents.
//!
//! A road document lists the segment ids it drives through (`path`) and
//! describes every segment under `network.nodes`. Extraction is pure and
//! deterministic; the schema is chosen once at configuration time through
//! [`FeatureSet`].

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::FeatureVector;

/// Turns a raw test description into a feature vector.
pub trait FeatureExtractor: Send + Sync {
    /// Schema name for logging.
    fn name(&self) -> &'static str;

    /// Extract features. Fails only if the document lacks the road structure.
    fn extract(&self, document: &serde_json::Value) -> Result<FeatureVector, serde_json::Error>;
}

/// Named feature schemas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureSet {
    /// Distances, turn counts, angle and pivot-offset statistics
    #[default]
    RoadGeometry,
    /// Distances and turn counts only
    Topology,
}

impl FeatureSet {
    pub fn extractor(&self) -> Arc<dyn FeatureExtractor> {
        match self {
            Self::RoadGeometry => Arc::new(RoadGeometry),
            Self::Topology => Arc::new(Topology),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RoadDocument {
    path: Vec<serde_json::Value>,
    network: Network,
}

#[derive(Debug, Deserialize)]
struct Network {
    nodes: HashMap<String, Segment>,
}

#[derive(Debug, Clone, Deserialize)]
struct Segment {
    roadtype: String,
    angle: f64,
    pivot_off: f64,
    x: f64,
    y: f64,
}

/// Segments along the driven path, in order.
fn path_segments(document: &serde_json::Value) -> Result<Vec<Segment>, serde_json::Error> {
    let road = RoadDocument::deserialize(document)?;
    if road.path.is_empty() {
        return Err(serde_json::Error::custom("road path is empty"));
    }
    road.path
        .iter()
        .map(|id| {
            let key = match id {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            road.network
                .nodes
                .get(&key)
                .cloned()
                .ok_or_else(|| serde_json::Error::custom(format!("segment {key} not in network")))
        })
        .collect()
}

/// Distances and turn counts shared by both schemas.
fn base_features(segments: &[Segment]) -> FeatureVector {
    let mut fv = FeatureVector::default();
    for seg in segments {
        match seg.roadtype.as_str() {
            "l_turn" => fv.num_l_turns += 1.0,
            "r_turn" => fv.num_r_turns += 1.0,
            "straight" => fv.num_straights += 1.0,
            _ => {}
        }
    }
    fv.road_distance = segments
        .windows(2)
        .map(|w| distance(&w[0], &w[1]))
        .sum();
    if let (Some(first), Some(last)) = (segments.first(), segments.last()) {
        fv.direct_distance = distance(first, last);
    }
    fv
}

fn distance(a: &Segment, b: &Segment) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// Full 16-column road geometry schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoadGeometry;

impl FeatureExtractor for RoadGeometry {
    fn name(&self) -> &'static str {
        "road-geometry"
    }

    fn extract(&self, document: &serde_json::Value) -> Result<FeatureVector, serde_json::Error> {
        let segments = path_segments(document)?;
        let mut fv = base_features(&segments);

        // Negative angles wrap around; only positive values count.
        let angles: Vec<f64> = segments
            .iter()
            .map(|s| if s.angle < 0.0 { s.angle + 360.0 } else { s.angle })
            .filter(|a| *a > 0.0)
            .collect();
        let pivots: Vec<f64> = segments
            .iter()
            .map(|s| s.pivot_off)
            .filter(|p| *p > 0.0)
            .collect();

        let a = Stats::of(&angles);
        fv.median_angle = a.median;
        fv.total_angle = a.sum;
        fv.mean_angle = a.mean;
        fv.std_angle = a.std;
        fv.max_angle = a.max;
        fv.min_angle = a.min;

        let p = Stats::of(&pivots);
        fv.median_pivot_off = p.median;
        fv.mean_pivot_off = p.mean;
        fv.std_pivot_off = p.std;
        fv.max_pivot_off = p.max;
        fv.min_pivot_off = p.min;

        Ok(fv)
    }
}

/// Distances and turn counts; statistic columns stay 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct Topology;

impl FeatureExtractor for Topology {
    fn name(&self) -> &'static str {
        "topology"
    }

    fn extract(&self, document: &serde_json::Value) -> Result<FeatureVector, serde_json::Error> {
        Ok(base_features(&path_segments(document)?))
    }
}

/// Summary statistics; all zero for an empty sample.
#[derive(Debug, Default, PartialEq)]
struct Stats {
    median: f64,
    sum: f64,
    mean: f64,
    std: f64,
    max: f64,
    min: f64,
}

impl Stats {
    fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        let sum: f64 = sorted.iter().sum();
        let mean = sum / n as f64;
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };
        // Population standard deviation
        let var = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        Self {
            median,
            sum,
            mean,
            std: var.sqrt(),
            max: sorted[n - 1],
            min: sorted[0],
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Three-segment road: straight, left turn (angle 90), right turn (angle -90 → 270).
    pub(crate) fn sample_road() -> serde_json::Value {
        json!({
            "path": [1, 2, 3],
            "network": {
                "nodes": {
                    "1": {"roadtype": "straight", "angle": 0.0, "pivot_off": 0.0, "x": 0.0, "y": 0.0, "key": "a"},
                    "2": {"roadtype": "l_turn", "angle": 90.0, "pivot_off": 10.0, "x": 3.0, "y": 4.0, "key": "b"},
                    "3": {"roadtype": "r_turn", "angle": -90.0, "pivot_off": 20.0, "x": 6.0, "y": 8.0, "key": "c"}
                }
            }
        })
    }

    #[test]
    fn test_road_geometry_counts_and_distances() {
        let fv = RoadGeometry.extract(&sample_road()).unwrap();
        assert_eq!(fv.num_straights, 1.0);
        assert_eq!(fv.num_l_turns, 1.0);
        assert_eq!(fv.num_r_turns, 1.0);
        assert!((fv.road_distance - 10.0).abs() < 1e-9);
        assert!((fv.direct_distance - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_road_geometry_angle_statistics() {
        let fv = RoadGeometry.extract(&sample_road()).unwrap();
        // Angles 90 and 270 after wrapping; the straight's 0 is excluded.
        assert_eq!(fv.total_angle, 360.0);
        assert_eq!(fv.mean_angle, 180.0);
        assert_eq!(fv.median_angle, 180.0);
        assert_eq!(fv.std_angle, 90.0);
        assert_eq!(fv.max_angle, 270.0);
        assert_eq!(fv.min_angle, 90.0);
        assert_eq!(fv.mean_pivot_off, 15.0);
        assert_eq!(fv.min_pivot_off, 10.0);
    }

    #[test]
    fn test_straight_road_degrades_to_zero() {
        let doc = json!({
            "path": ["7"],
            "network": {"nodes": {"7": {"roadtype": "straight", "angle": 0.0, "pivot_off": 0.0, "x": 1.0, "y": 1.0}}}
        });
        let fv = RoadGeometry.extract(&doc).unwrap();
        assert_eq!(fv.median_angle, 0.0);
        assert_eq!(fv.std_angle, 0.0);
        assert_eq!(fv.max_pivot_off, 0.0);
        assert_eq!(fv.road_distance, 0.0);
        assert!(fv.to_array().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_topology_leaves_statistics_zero() {
        let fv = Topology.extract(&sample_road()).unwrap();
        assert_eq!(fv.num_l_turns, 1.0);
        assert_eq!(fv.total_angle, 0.0);
        assert_eq!(fv.mean_pivot_off, 0.0);
    }

    #[test]
    fn test_missing_segment_is_an_error() {
        let doc = json!({"path": [1, 9], "network": {"nodes": {
            "1": {"roadtype": "straight", "angle": 0.0, "pivot_off": 0.0, "x": 0.0, "y": 0.0}
        }}});
        let err = RoadGeometry.extract(&doc).unwrap_err();
        assert!(err.to_string().contains("segment 9"));
    }

    #[test]
    fn test_empty_path_is_an_error() {
        let doc = json!({"path": [], "network": {"nodes": {}}});
        assert!(RoadGeometry.extract(&doc).is_err());
    }

    #[test]
    fn test_feature_set_selects_extractor() {
        assert_eq!(FeatureSet::RoadGeometry.extractor().name(), "road-geometry");
        assert_eq!(FeatureSet::Topology.extractor().name(), "topology");
        let parsed: FeatureSet = serde_json::from_str("\"topology\"").unwrap();
        assert_eq!(parsed, FeatureSet::Topology);
    }
}
