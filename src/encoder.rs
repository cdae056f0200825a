//! Wire encoding
//!
//! Encodes canonical records into the upload JSON body and parses such bodies
//! back. Ensures all fields are present and every number is finite before
//! anything leaves the process.

use crate::error::SyncError;
use crate::normalizer::FIELD_MAP;
use crate::types::{validate_date, CanonicalHealthRecord};
use serde_json::{json, Map, Value};

/// Identifier of the wire schema
pub const WIRE_SCHEMA_ID: &str = "healthsync.upload.v1";

/// Encoder for the upload wire format
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordEncoder {
    pretty: bool,
}

impl RecordEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretty-print encoded output
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    /// Encode a record to its JSON body
    pub fn encode(&self, record: &CanonicalHealthRecord) -> Result<String, SyncError> {
        let problems = Self::problems(record);
        if !problems.is_empty() {
            return Err(SyncError::EncodingError(problems.join("; ")));
        }

        let encoded = if self.pretty {
            serde_json::to_string_pretty(record)
        } else {
            serde_json::to_string(record)
        };
        encoded.map_err(|e| SyncError::EncodingError(e.to_string()))
    }

    /// Parse and validate a JSON body
    pub fn decode(json: &str) -> Result<CanonicalHealthRecord, SyncError> {
        let record: CanonicalHealthRecord = serde_json::from_str(json)?;
        Self::validate(&record)?;
        Ok(record)
    }

    /// Check a record against the wire contract
    pub fn validate(record: &CanonicalHealthRecord) -> Result<(), SyncError> {
        let problems = Self::problems(record);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SyncError::InvalidRecord(problems.join("; ")))
        }
    }

    /// Every contract violation in `record`, empty when valid
    pub fn problems(record: &CanonicalHealthRecord) -> Vec<String> {
        let mut problems = Vec::new();

        if let Err(e) = validate_date(&record.date) {
            problems.push(e.to_string());
        }

        for (name, value) in record.health.fields() {
            if !value.is_finite() {
                problems.push(format!("raw_json.{name} is not a finite number"));
            }
        }

        problems
    }
}

/// JSON Schema describing the upload body
pub fn json_schema() -> Value {
    let mut health_properties = Map::new();
    for mapping in FIELD_MAP.iter() {
        let description = match mapping.source {
            Some(metric) => format!(
                "{} ({}), from {} ({})",
                mapping.canonical,
                mapping.unit,
                metric.raw_name(),
                metric.raw_unit()
            ),
            None => format!("{} ({}), always 0", mapping.canonical, mapping.unit),
        };
        health_properties.insert(
            mapping.canonical.to_string(),
            json!({ "type": "number", "description": description }),
        );
    }
    let health_required: Vec<&str> = FIELD_MAP.iter().map(|m| m.canonical).collect();

    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": WIRE_SCHEMA_ID,
        "type": "object",
        "required": ["user_id", "date", "difficulty", "duration", "raw_json"],
        "properties": {
            "user_id": { "type": "string" },
            "date": { "type": "string", "pattern": "^\\d{4}-\\d{2}-\\d{2}$" },
            "difficulty": { "type": "string", "enum": ["low", "medium", "high"] },
            "duration": { "type": "integer", "minimum": 0, "description": "minutes" },
            "raw_json": {
                "type": "object",
                "required": health_required,
                "properties": health_properties
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::Normalizer;
    use crate::types::{Difficulty, HealthData, Metric, RawMetricBag, RecordConfig};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn sample_record() -> CanonicalHealthRecord {
        let bag = RawMetricBag::from_values([
            (Metric::Steps, 8500.0),
            (Metric::Distance, 5400.0),
            (Metric::SleepDuration, 25200.0),
            (Metric::ActiveEnergy, 300.0),
            (Metric::Systolic, 118.0),
            (Metric::Diastolic, 76.0),
        ]);
        let config = RecordConfig::new("a@b.com")
            .with_date("2025-12-17")
            .unwrap()
            .with_difficulty(Difficulty::High)
            .with_duration(45);
        Normalizer::normalize(&bag, &config)
    }

    #[test]
    fn test_encode_wire_shape() {
        let json = RecordEncoder::new().encode(&sample_record()).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["user_id"], "a@b.com");
        assert_eq!(value["date"], "2025-12-17");
        assert_eq!(value["difficulty"], "high");
        assert_eq!(value["duration"], 45);
        assert!(value["duration"].is_u64());

        let raw = value["raw_json"].as_object().unwrap();
        assert_eq!(raw.len(), HealthData::FIELD_COUNT);
        assert_eq!(raw["distance_km"], 5.4);
        assert_eq!(raw["steps_cadence"], 0.0);
        assert_eq!(raw["systolic"], 118.0);
        assert!(raw.values().all(|v| v.is_number()));
    }

    #[test]
    fn test_round_trip() {
        let record = sample_record();
        let json = RecordEncoder::pretty().encode(&record).unwrap();
        let decoded = RecordEncoder::decode(&json).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_round_trip_keeps_every_bit() {
        let mut record = sample_record();
        record.health.sleep_min = 1198.6871447676363;
        record.health.sleep_hr = 19.978119079460606;
        record.health.distance_km = 0.1 + 0.2;
        record.health.weight = 72.30000000000001;

        let decoded = RecordEncoder::decode(&RecordEncoder::new().encode(&record).unwrap()).unwrap();
        for ((name, a), (_, b)) in record.health.fields().iter().zip(decoded.health.fields().iter()) {
            assert_eq!(a.to_bits(), b.to_bits(), "{name}");
        }
        assert_eq!(decoded, record);
    }

    proptest! {
        #[test]
        fn test_normalized_records_round_trip(
            sleep in 0.0f64..200_000.0,
            distance in 0.0f64..100_000.0,
            weight in 0.0f64..400.0,
        ) {
            let bag = RawMetricBag::from_values([
                (Metric::SleepDuration, sleep),
                (Metric::Distance, distance),
                (Metric::Weight, weight),
            ]);
            let config = RecordConfig::new("a@b.com").with_date("2025-12-17").unwrap();
            let record = Normalizer::normalize(&bag, &config);

            let json = RecordEncoder::new().encode(&record).unwrap();
            let decoded = RecordEncoder::decode(&json).unwrap();
            prop_assert_eq!(decoded, record);
        }
    }

    #[test]
    fn test_encode_rejects_non_finite() {
        let mut record = sample_record();
        record.health.glucose = f64::NAN;
        let err = RecordEncoder::new().encode(&record).unwrap_err();
        assert!(matches!(err, SyncError::EncodingError(ref msg) if msg.contains("glucose")));
    }

    #[test]
    fn test_decode_rejects_missing_field() {
        let mut value: Value =
            serde_json::from_str(&RecordEncoder::new().encode(&sample_record()).unwrap()).unwrap();
        value["raw_json"].as_object_mut().unwrap().remove("hrv");
        assert!(RecordEncoder::decode(&value.to_string()).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_date_and_difficulty() {
        let mut value: Value =
            serde_json::from_str(&RecordEncoder::new().encode(&sample_record()).unwrap()).unwrap();
        value["date"] = json!("2025/12/17");
        assert!(matches!(
            RecordEncoder::decode(&value.to_string()),
            Err(SyncError::InvalidRecord(_))
        ));

        value["date"] = json!("2025-12-17");
        value["difficulty"] = json!("extreme");
        assert!(RecordEncoder::decode(&value.to_string()).is_err());
    }

    #[test]
    fn test_schema_lists_every_field() {
        let schema = json_schema();
        let required = schema["properties"]["raw_json"]["required"]
            .as_array()
            .unwrap();
        assert_eq!(required.len(), HealthData::FIELD_COUNT);
        assert_eq!(schema["title"], WIRE_SCHEMA_ID);
    }
}
