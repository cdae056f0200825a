//! Snapshot-backed sources
//!
//! Reads metric values from a JSON export written by the collecting device,
//! keyed by the collector's names:
//!
//! ```json
//! { "steps": 8500, "distance": 5400, "sleepDuration": 25200,
//!   "bloodPressure": { "systolic": 120, "diastolic": 80 } }
//! ```
//!
//! Blood pressure may also be given as flat `systolic` / `diastolic` keys or
//! as a two-element array. `null` counts as absent.

use crate::error::{SourceError, SyncError};
use crate::types::{Metric, RawMetricBag, Sample, SourceKey};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::MetricSource;

const BLOOD_PRESSURE_KEY: &str = "bloodPressure";

/// Source answering with a value taken from a snapshot, or failing when the
/// snapshot did not carry one
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    key: SourceKey,
    value: Option<Sample>,
}

impl SnapshotSource {
    pub fn new(key: SourceKey, value: Option<Sample>) -> Self {
        Self { key, value }
    }
}

#[async_trait]
impl MetricSource for SnapshotSource {
    fn key(&self) -> SourceKey {
        self.key
    }

    async fn fetch(&self) -> Result<Sample, SourceError> {
        self.value
            .ok_or_else(|| SourceError::Unavailable(format!("{} not in snapshot", self.key)))
    }
}

/// Parse a snapshot document into one sample per source key present
pub fn parse_snapshot(json: &str) -> Result<BTreeMap<SourceKey, Sample>, SyncError> {
    let root: Value = serde_json::from_str(json)?;
    let object = root
        .as_object()
        .ok_or_else(|| SyncError::InvalidRecord("snapshot must be a JSON object".to_string()))?;

    let mut samples = BTreeMap::new();
    let mut systolic = None;
    let mut diastolic = None;

    for (name, value) in object {
        if name == BLOOD_PRESSURE_KEY {
            if let Some((sys, dia)) = parse_blood_pressure(value)? {
                systolic = Some(sys);
                diastolic = Some(dia);
            }
            continue;
        }

        let Some(metric) = Metric::from_raw_name(name) else {
            log::debug!("Ignoring unknown snapshot key {name}");
            continue;
        };
        let Some(number) = number_field(name, value)? else {
            continue;
        };

        match metric {
            Metric::Systolic => systolic = Some(number),
            Metric::Diastolic => diastolic = Some(number),
            _ => {
                if let Some(key) = source_for(metric) {
                    samples.insert(key, Sample::Scalar(number));
                }
            }
        }
    }

    if systolic.is_some() || diastolic.is_some() {
        samples.insert(
            SourceKey::BloodPressure,
            Sample::Pair(systolic.unwrap_or(0.0), diastolic.unwrap_or(0.0)),
        );
    }

    Ok(samples)
}

/// Build a bag straight from a snapshot, bypassing a session
pub fn bag_from_snapshot(json: &str) -> Result<RawMetricBag, SyncError> {
    let mut bag = RawMetricBag::new();
    for (key, sample) in parse_snapshot(json)? {
        bag.record(key, sample);
    }
    Ok(bag)
}

fn source_for(metric: Metric) -> Option<SourceKey> {
    SourceKey::ALL
        .iter()
        .copied()
        .find(|key| key.metrics().contains(&metric))
}

fn number_field(name: &str, value: &Value) -> Result<Option<f64>, SyncError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| SyncError::InvalidRecord(format!("{name} is out of range"))),
        _ => Err(SyncError::InvalidRecord(format!("{name} must be a number"))),
    }
}

fn parse_blood_pressure(value: &Value) -> Result<Option<(f64, f64)>, SyncError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(fields) => {
            let sys = object_number(fields, "systolic")?;
            let dia = object_number(fields, "diastolic")?;
            if sys.is_none() && dia.is_none() {
                return Ok(None);
            }
            Ok(Some((sys.unwrap_or(0.0), dia.unwrap_or(0.0))))
        }
        Value::Array(items) if items.len() == 2 => {
            let sys = number_field("bloodPressure[0]", &items[0])?.unwrap_or(0.0);
            let dia = number_field("bloodPressure[1]", &items[1])?.unwrap_or(0.0);
            Ok(Some((sys, dia)))
        }
        _ => Err(SyncError::InvalidRecord(
            "bloodPressure must be an object or a [systolic, diastolic] pair".to_string(),
        )),
    }
}

fn object_number(fields: &Map<String, Value>, name: &str) -> Result<Option<f64>, SyncError> {
    match fields.get(name) {
        Some(value) => number_field(name, value),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalar_and_nested_pressure() {
        let samples = parse_snapshot(
            r#"{
                "steps": 8500,
                "leanBody": 52.3,
                "bloodPressure": { "systolic": 120, "diastolic": 80 },
                "unknownField": 1
            }"#,
        )
        .unwrap();

        assert_eq!(samples.get(&SourceKey::Steps), Some(&Sample::Scalar(8500.0)));
        assert_eq!(
            samples.get(&SourceKey::LeanBodyMass),
            Some(&Sample::Scalar(52.3))
        );
        assert_eq!(
            samples.get(&SourceKey::BloodPressure),
            Some(&Sample::Pair(120.0, 80.0))
        );
        assert_eq!(samples.len(), 3);
    }

    #[test]
    fn test_parse_flat_pressure_and_nulls() {
        let samples =
            parse_snapshot(r#"{"systolic": 130, "diastolic": 85, "hrv": null}"#).unwrap();
        assert_eq!(
            samples.get(&SourceKey::BloodPressure),
            Some(&Sample::Pair(130.0, 85.0))
        );
        assert!(!samples.contains_key(&SourceKey::Hrv));
    }

    #[test]
    fn test_parse_rejects_non_numbers() {
        assert!(parse_snapshot(r#"{"steps": "many"}"#).is_err());
        assert!(parse_snapshot(r#"[1, 2]"#).is_err());
        assert!(parse_snapshot(r#"{"bloodPressure": 120}"#).is_err());
    }

    #[test]
    fn test_bag_from_snapshot() {
        let bag = bag_from_snapshot(r#"{"distance": 5400, "bloodPressure": [118, 77]}"#).unwrap();
        assert_eq!(bag.get(Metric::Distance), 5400.0);
        assert_eq!(bag.get(Metric::Systolic), 118.0);
        assert_eq!(bag.get(Metric::Diastolic), 77.0);
        assert_eq!(bag.get(Metric::Steps), 0.0);
    }

    #[tokio::test]
    async fn test_snapshot_source_without_value_fails() {
        let source = SnapshotSource::new(SourceKey::Weight, None);
        assert!(matches!(
            source.fetch().await,
            Err(SourceError::Unavailable(_))
        ));
    }
}
