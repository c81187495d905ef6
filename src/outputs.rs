//! Typed views of the analysis objects a model exposes as outputs.
//!
//! The server encodes non-finite bounds as the strings `"Infinity"` and
//! `"-Infinity"`; those are decoded back to `f64` infinities here.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::units::UnitValue;

/// Output name to current value.
pub type Outputs = BTreeMap<String, OutputValue>;

/// Decode a number that may be sent as a string sentinel.
pub fn parse_number(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("Unrepresentable number: {}", n)),
        Value::String(s) if s == "Infinity" => Ok(f64::INFINITY),
        Value::String(s) if s == "-Infinity" => Ok(f64::NEG_INFINITY),
        other => Err(format!("Unrecognized number type: {}", other)),
    }
}

fn de_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    parse_number(&raw).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub count: u64,
    pub mean: f64,
    #[serde(deserialize_with = "de_number")]
    pub min: f64,
    #[serde(deserialize_with = "de_number")]
    pub max: f64,
    pub deviation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsDiscrete {
    pub count: u64,
    pub mean: f64,
    #[serde(deserialize_with = "de_number")]
    pub min: f64,
    #[serde(deserialize_with = "de_number")]
    pub max: f64,
    pub deviation: f64,
    #[serde(deserialize_with = "de_number")]
    pub confidence: f64,
    pub sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsContinuous {
    pub count: u64,
    pub mean: f64,
    #[serde(deserialize_with = "de_number")]
    pub min: f64,
    #[serde(deserialize_with = "de_number")]
    pub max: f64,
    pub deviation: f64,
    #[serde(deserialize_with = "de_number")]
    pub confidence: f64,
    pub integral: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSet {
    #[serde(deserialize_with = "de_number")]
    pub xmin: f64,
    pub xmean: f64,
    pub xmedian: f64,
    #[serde(deserialize_with = "de_number")]
    pub xmax: f64,
    #[serde(deserialize_with = "de_number")]
    pub ymin: f64,
    pub ymean: f64,
    pub ymedian: f64,
    #[serde(deserialize_with = "de_number")]
    pub ymax: f64,
    pub plain_data_table: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramSmartData {
    pub count: u64,
    pub lower_bound: f64,
    pub interval_width: f64,
    pub hits: Vec<u64>,
    pub statistics: Statistics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Histogram2DData {
    pub hits: Vec<Vec<u64>>,
    pub hits_out_low: Vec<u64>,
    pub hits_out_high: Vec<u64>,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

/// Current value of one model output.
///
/// Variants are tried most-specific first; anything unrecognised is kept as
/// raw JSON (plain numbers, strings, lists from simple `Output` objects).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputValue {
    HistogramSmart(HistogramSmartData),
    Histogram2D(Histogram2DData),
    DataSet(DataSet),
    StatisticsContinuous(StatisticsContinuous),
    StatisticsDiscrete(StatisticsDiscrete),
    Statistics(Statistics),
    Unit(UnitValue),
    Raw(Value),
}

impl OutputValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OutputValue::Raw(value) => parse_number(value).ok(),
            OutputValue::Unit(unit) => Some(unit.value),
            _ => None,
        }
    }
}

impl fmt::Display for OutputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputValue::Raw(value) => write!(f, "{}", value),
            OutputValue::Unit(unit) => write!(f, "{}", unit),
            OutputValue::Statistics(s) => write!(
                f,
                "Statistics(count={}, mean={}, min={}, max={}, deviation={})",
                s.count, s.mean, s.min, s.max, s.deviation
            ),
            OutputValue::StatisticsDiscrete(s) => write!(
                f,
                "StatisticsDiscrete(count={}, mean={}, min={}, max={}, deviation={}, confidence={}, sum={})",
                s.count, s.mean, s.min, s.max, s.deviation, s.confidence, s.sum
            ),
            OutputValue::StatisticsContinuous(s) => write!(
                f,
                "StatisticsContinuous(count={}, mean={}, min={}, max={}, deviation={}, confidence={}, integral={})",
                s.count, s.mean, s.min, s.max, s.deviation, s.confidence, s.integral
            ),
            OutputValue::DataSet(d) => write!(
                f,
                "DataSet(x=[{}, {}], y=[{}, {}], points={})",
                d.xmin,
                d.xmax,
                d.ymin,
                d.ymax,
                d.plain_data_table.len()
            ),
            OutputValue::HistogramSmart(h) => write!(
                f,
                "HistogramSmartData(count={}, lowerBound={}, intervalWidth={}, hits={:?})",
                h.count, h.lower_bound, h.interval_width, h.hits
            ),
            OutputValue::Histogram2D(h) => write!(
                f,
                "Histogram2DData(x=[{}, {}], y=[{}, {}], rows={})",
                h.x_min,
                h.x_max,
                h.y_min,
                h.y_max,
                h.hits.len()
            ),
        }
    }
}

/// Render outputs one per line as `name: value`.
pub fn format_outputs(outputs: &Outputs) -> String {
    outputs
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_number_sentinels() {
        assert_eq!(parse_number(&json!("Infinity")), Ok(f64::INFINITY));
        assert_eq!(parse_number(&json!("-Infinity")), Ok(f64::NEG_INFINITY));
        assert_eq!(parse_number(&json!(2.5)), Ok(2.5));
        assert!(parse_number(&json!("NaN-ish")).is_err());
    }

    #[test]
    fn test_discrete_statistics_with_infinite_bounds() {
        let raw = json!({
            "count": 0, "mean": 0.0, "min": "Infinity", "max": "-Infinity",
            "deviation": 0.0, "confidence": "Infinity", "sum": 0.0
        });
        let value: OutputValue = serde_json::from_value(raw).unwrap();
        match value {
            OutputValue::StatisticsDiscrete(s) => {
                assert!(s.min.is_infinite() && s.min > 0.0);
                assert!(s.max.is_infinite() && s.max < 0.0);
            }
            other => panic!("Expected StatisticsDiscrete, got {:?}", other),
        }
    }

    #[test]
    fn test_continuous_statistics_picked_by_integral() {
        let raw = json!({
            "count": 3, "mean": 1.0, "min": 0.0, "max": 2.0,
            "deviation": 0.5, "confidence": 0.1, "integral": 12.0
        });
        let value: OutputValue = serde_json::from_value(raw).unwrap();
        assert!(matches!(value, OutputValue::StatisticsContinuous(_)));
    }

    #[test]
    fn test_histogram_nests_statistics() {
        let raw = json!({
            "count": 4, "lowerBound": 0.0, "intervalWidth": 0.5, "hits": [1, 2, 1],
            "statistics": {"count": 4, "mean": 0.7, "min": 0.1, "max": 1.4, "deviation": 0.3}
        });
        let value: OutputValue = serde_json::from_value(raw).unwrap();
        match value {
            OutputValue::HistogramSmart(h) => {
                assert_eq!(h.hits, vec![1, 2, 1]);
                assert_eq!(h.statistics.count, 4);
            }
            other => panic!("Expected HistogramSmart, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_values_stay_raw() {
        let outputs: Outputs =
            serde_json::from_value(json!({"totalCost": 1520.5, "label": "ok"})).unwrap();
        assert_eq!(outputs["totalCost"].as_f64(), Some(1520.5));
        assert_eq!(outputs["label"], OutputValue::Raw(json!("ok")));
        assert_eq!(format_outputs(&outputs), "label: \"ok\"\ntotalCost: 1520.5");
    }

    #[test]
    fn test_unit_value_output() {
        let value: OutputValue =
            serde_json::from_value(json!({"value": 3.5, "units": "HOUR"})).unwrap();
        assert_eq!(value, OutputValue::Unit(UnitValue::new(3.5, "HOUR")));
    }
}
