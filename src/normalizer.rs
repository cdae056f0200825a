//! Metric normalization
//!
//! Maps a raw metric bag onto the canonical health record.
//! - Sleep seconds → minutes and hours
//! - Distance meters → kilometers
//! - Active energy feeds both active and total calories
//! - Every other metric is renamed, unit unchanged
//!
//! The mapping is driven by [`FIELD_MAP`], one row per canonical field in wire
//! order. Normalization is total: unset or non-finite raw values become `0.0`.

use crate::types::{CanonicalHealthRecord, HealthData, Metric, RawMetricBag, RecordConfig};
use chrono::{Local, NaiveDate};

/// Unit conversion applied to a raw value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Identity,
    SecondsToMinutes,
    SecondsToHours,
    MetersToKilometers,
    /// No upstream source; the field is always zero
    Zero,
}

impl Conversion {
    pub fn apply(&self, raw: f64) -> f64 {
        match self {
            Conversion::Identity => raw,
            Conversion::SecondsToMinutes => seconds_to_minutes(raw),
            Conversion::SecondsToHours => seconds_to_hours(raw),
            Conversion::MetersToKilometers => meters_to_kilometers(raw),
            Conversion::Zero => 0.0,
        }
    }
}

/// One canonical field and where its value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    /// Wire name inside `raw_json`
    pub canonical: &'static str,
    /// Raw slot read, `None` for fields without a source
    pub source: Option<Metric>,
    pub conversion: Conversion,
    /// Unit of the canonical value
    pub unit: &'static str,
}

const fn map(
    canonical: &'static str,
    source: Metric,
    conversion: Conversion,
    unit: &'static str,
) -> FieldMapping {
    FieldMapping {
        canonical,
        source: Some(source),
        conversion,
        unit,
    }
}

/// Exhaustive rename and conversion table, in wire order
pub const FIELD_MAP: [FieldMapping; HealthData::FIELD_COUNT] = [
    map("sleep_min", Metric::SleepDuration, Conversion::SecondsToMinutes, "min"),
    map("sleep_hr", Metric::SleepDuration, Conversion::SecondsToHours, "h"),
    map("weight", Metric::Weight, Conversion::Identity, "kg"),
    map("height_m", Metric::Height, Conversion::Identity, "m"),
    map("bmi", Metric::Bmi, Conversion::Identity, "kg/m2"),
    map("body_fat", Metric::BodyFat, Conversion::Identity, "%"),
    map("lean_body", Metric::LeanBodyMass, Conversion::Identity, "kg"),
    map("distance_km", Metric::Distance, Conversion::MetersToKilometers, "km"),
    map("steps", Metric::Steps, Conversion::Identity, "count"),
    FieldMapping {
        canonical: "steps_cadence",
        source: None,
        conversion: Conversion::Zero,
        unit: "steps/min",
    },
    map("exercise_min", Metric::ExerciseTime, Conversion::Identity, "min"),
    map("flights", Metric::FlightsClimbed, Conversion::Identity, "count"),
    map("active_calories", Metric::ActiveEnergy, Conversion::Identity, "kcal"),
    map("total_calories", Metric::ActiveEnergy, Conversion::Identity, "kcal"),
    map("calories_intake", Metric::DietaryCalories, Conversion::Identity, "kcal"),
    map("heart_rate", Metric::HeartRate, Conversion::Identity, "bpm"),
    map("resting_heart_rate", Metric::RestingHeartRate, Conversion::Identity, "bpm"),
    map("walking_heart_rate", Metric::WalkingHeartRate, Conversion::Identity, "bpm"),
    map("hrv", Metric::Hrv, Conversion::Identity, "ms"),
    map("systolic", Metric::Systolic, Conversion::Identity, "mmHg"),
    map("diastolic", Metric::Diastolic, Conversion::Identity, "mmHg"),
    map("glucose", Metric::BloodGlucose, Conversion::Identity, "mg/dL"),
    map("oxygen_saturation", Metric::OxygenSaturation, Conversion::Identity, "%"),
];

/// Look up the mapping row of a canonical field
pub fn mapping_for(canonical: &str) -> Option<&'static FieldMapping> {
    FIELD_MAP.iter().find(|m| m.canonical == canonical)
}

pub fn seconds_to_minutes(seconds: f64) -> f64 {
    seconds / 60.0
}

pub fn seconds_to_hours(seconds: f64) -> f64 {
    seconds / 3600.0
}

pub fn meters_to_kilometers(meters: f64) -> f64 {
    meters / 1000.0
}

/// Normalizer for converting a raw metric bag to a canonical record
pub struct Normalizer;

impl Normalizer {
    /// Normalize against today's local date when the config carries none
    pub fn normalize(bag: &RawMetricBag, config: &RecordConfig) -> CanonicalHealthRecord {
        Self::normalize_on(bag, config, Local::now().date_naive())
    }

    /// Normalize with an explicit fallback date for configs without one
    pub fn normalize_on(
        bag: &RawMetricBag,
        config: &RecordConfig,
        today: NaiveDate,
    ) -> CanonicalHealthRecord {
        let date = match config.date.as_deref() {
            Some(date) if !date.is_empty() => date.to_string(),
            _ => today.format("%Y-%m-%d").to_string(),
        };

        CanonicalHealthRecord {
            user_id: config.user_id.clone(),
            date,
            difficulty: config.difficulty,
            duration: config.duration,
            health: Self::normalize_health(bag),
        }
    }

    /// Build the canonical health block from raw values
    pub fn normalize_health(bag: &RawMetricBag) -> HealthData {
        let values = FIELD_MAP.map(|mapping| {
            let raw = mapping.source.map(|m| bag.get(m)).unwrap_or(0.0);
            finite_or_zero(mapping.conversion.apply(finite_or_zero(raw)))
        });
        health_from_values(values)
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Assemble a health block from values in `FIELD_MAP` order
fn health_from_values(v: [f64; HealthData::FIELD_COUNT]) -> HealthData {
    HealthData {
        sleep_min: v[0],
        sleep_hr: v[1],
        weight: v[2],
        height_m: v[3],
        bmi: v[4],
        body_fat: v[5],
        lean_body: v[6],
        distance_km: v[7],
        steps: v[8],
        steps_cadence: v[9],
        exercise_min: v[10],
        flights: v[11],
        active_calories: v[12],
        total_calories: v[13],
        calories_intake: v[14],
        heart_rate: v[15],
        resting_heart_rate: v[16],
        walking_heart_rate: v[17],
        hrv: v[18],
        systolic: v[19],
        diastolic: v[20],
        glucose: v[21],
        oxygen_saturation: v[22],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Difficulty;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn scenario_config() -> RecordConfig {
        RecordConfig::new("a@b.com")
            .with_date("2025-12-17")
            .unwrap()
            .with_difficulty(Difficulty::Medium)
            .with_duration(30)
    }

    #[test]
    fn test_field_map_matches_wire_order() {
        let wire: Vec<&str> = HealthData::default()
            .fields()
            .iter()
            .map(|(name, _)| *name)
            .collect();
        let mapped: Vec<&str> = FIELD_MAP.iter().map(|m| m.canonical).collect();
        assert_eq!(wire, mapped);
    }

    #[test]
    fn test_field_map_reads_every_metric() {
        let read: BTreeSet<Metric> = FIELD_MAP.iter().filter_map(|m| m.source).collect();
        let all: BTreeSet<Metric> = Metric::ALL.into_iter().collect();
        assert_eq!(read, all);
    }

    #[test]
    fn test_every_field_reads_its_own_metric() {
        let bag = RawMetricBag::from_values(
            Metric::ALL
                .iter()
                .enumerate()
                .map(|(i, metric)| (*metric, (i + 1) as f64 * 1000.0 + 7.0)),
        );
        let health = Normalizer::normalize_health(&bag);

        for ((name, value), mapping) in health.fields().iter().zip(FIELD_MAP.iter()) {
            assert_eq!(*name, mapping.canonical);
            let expected = mapping
                .source
                .map(|m| mapping.conversion.apply(bag.get(m)))
                .unwrap_or(0.0);
            assert_eq!(*value, expected, "{name}");
        }

        assert_eq!(health.body_fat, bag.get(Metric::BodyFat));
        assert_eq!(health.lean_body, bag.get(Metric::LeanBodyMass));
        assert_eq!(health.bmi, bag.get(Metric::Bmi));
        assert_eq!(health.calories_intake, bag.get(Metric::DietaryCalories));
        assert_eq!(health.walking_heart_rate, bag.get(Metric::WalkingHeartRate));
        assert_eq!(health.resting_heart_rate, bag.get(Metric::RestingHeartRate));
        assert_eq!(health.glucose, bag.get(Metric::BloodGlucose));
        assert_eq!(health.oxygen_saturation, bag.get(Metric::OxygenSaturation));
        assert_eq!(health.systolic, bag.get(Metric::Systolic));
        assert_eq!(health.diastolic, bag.get(Metric::Diastolic));

        // Only the calorie mirror and the zero cadence may share a value
        let mut seen = BTreeSet::new();
        for (name, value) in health.fields() {
            if name == "total_calories" || name == "steps_cadence" {
                continue;
            }
            assert!(seen.insert(value.to_bits()), "{name} repeats a value");
        }
    }

    #[test]
    fn test_renamed_fields() {
        assert_eq!(mapping_for("body_fat").unwrap().source, Some(Metric::BodyFat));
        assert_eq!(mapping_for("lean_body").unwrap().source, Some(Metric::LeanBodyMass));
        assert_eq!(
            mapping_for("oxygen_saturation").unwrap().source,
            Some(Metric::OxygenSaturation)
        );
        assert_eq!(
            mapping_for("calories_intake").unwrap().source,
            Some(Metric::DietaryCalories)
        );
        assert!(mapping_for("bodyFat").is_none());
    }

    #[test]
    fn test_scenario_record() {
        let bag = RawMetricBag::from_values([
            (Metric::Steps, 8500.0),
            (Metric::Distance, 5400.0),
            (Metric::SleepDuration, 25200.0),
            (Metric::ActiveEnergy, 300.0),
        ]);

        let record = Normalizer::normalize(&bag, &scenario_config());

        assert_eq!(record.user_id, "a@b.com");
        assert_eq!(record.date, "2025-12-17");
        assert_eq!(record.difficulty, Difficulty::Medium);
        assert_eq!(record.duration, 30);
        assert_eq!(record.health.steps, 8500.0);
        assert_eq!(record.health.steps_cadence, 0.0);
        assert_eq!(record.health.distance_km, 5.4);
        assert_eq!(record.health.sleep_min, 420.0);
        assert_eq!(record.health.sleep_hr, 7.0);
        assert_eq!(record.health.active_calories, 300.0);
        assert_eq!(record.health.total_calories, 300.0);
        assert_eq!(record.health.hrv, 0.0);
    }

    #[test]
    fn test_unit_conversions_are_exact() {
        for seconds in [0.0, 1.0, 59.0, 3600.0, 25200.0, 31_337.5, 86_400.0] {
            let bag = RawMetricBag::from_values([(Metric::SleepDuration, seconds)]);
            let health = Normalizer::normalize_health(&bag);
            assert_eq!(health.sleep_min, seconds / 60.0);
            assert_eq!(health.sleep_hr, seconds / 3600.0);
        }

        for meters in [0.0, 1.0, 999.0, 5400.0, 42_195.0] {
            let bag = RawMetricBag::from_values([(Metric::Distance, meters)]);
            assert_eq!(Normalizer::normalize_health(&bag).distance_km, meters / 1000.0);
        }
    }

    #[test]
    fn test_cadence_zero_and_calories_mirrored() {
        for energy in [0.0, 12.5, 300.0, 2750.0] {
            let bag = RawMetricBag::from_values([
                (Metric::ActiveEnergy, energy),
                (Metric::Steps, 12_000.0),
                (Metric::DietaryCalories, 1800.0),
            ]);
            let health = Normalizer::normalize_health(&bag);
            assert_eq!(health.steps_cadence, 0.0);
            assert_eq!(health.active_calories, health.total_calories);
            assert_eq!(health.active_calories, energy);
            assert_eq!(health.calories_intake, 1800.0);
        }
    }

    #[test]
    fn test_height_is_identity() {
        let bag = RawMetricBag::from_values([(Metric::Height, 1.78)]);
        assert_eq!(Normalizer::normalize_health(&bag).height_m, 1.78);
    }

    #[test]
    fn test_non_finite_raw_values_become_zero() {
        let bag = RawMetricBag::from_values([
            (Metric::Weight, f64::NAN),
            (Metric::Distance, f64::INFINITY),
        ]);
        let health = Normalizer::normalize_health(&bag);
        assert_eq!(health.weight, 0.0);
        assert_eq!(health.distance_km, 0.0);
        assert!(health.fields().iter().all(|(_, v)| v.is_finite()));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let bag = RawMetricBag::from_values([
            (Metric::Distance, 1234.5678),
            (Metric::SleepDuration, 27_123.0),
            (Metric::Systolic, 121.0),
        ]);
        let config = scenario_config();
        let first = Normalizer::normalize(&bag, &config);
        let second = Normalizer::normalize(&bag, &config);

        assert_eq!(first, second);
        for ((_, a), (_, b)) in first.health.fields().iter().zip(second.health.fields().iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_missing_date_uses_today() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let record = Normalizer::normalize_on(&RawMetricBag::new(), &RecordConfig::new("u"), today);
        assert_eq!(record.date, "2026-03-09");

        let mut config = RecordConfig::new("u");
        config.date = Some(String::new());
        let record = Normalizer::normalize_on(&RawMetricBag::new(), &config, today);
        assert_eq!(record.date, "2026-03-09");
    }
}
