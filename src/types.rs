//! Core types for the Healthsync pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: metric identities and samples, the raw metric bag filled by an
//! aggregation session, the canonical record sent to the aggregator, and the
//! outcome of an upload.

use crate::error::SyncError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One raw value slot in the metric bag.
///
/// Serialized names are the collector-side names, which differ from the
/// canonical wire names (see `normalizer::FIELD_MAP`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Metric {
    #[serde(rename = "steps")]
    Steps,
    #[serde(rename = "distance")]
    Distance,
    #[serde(rename = "flights")]
    FlightsClimbed,
    #[serde(rename = "activeEnergy")]
    ActiveEnergy,
    #[serde(rename = "exerciseTime")]
    ExerciseTime,
    #[serde(rename = "heartRate")]
    HeartRate,
    #[serde(rename = "restingHeartRate")]
    RestingHeartRate,
    #[serde(rename = "walkingHeartRate")]
    WalkingHeartRate,
    #[serde(rename = "hrv")]
    Hrv,
    #[serde(rename = "sleepDuration")]
    SleepDuration,
    #[serde(rename = "weight")]
    Weight,
    #[serde(rename = "height")]
    Height,
    #[serde(rename = "bmi")]
    Bmi,
    #[serde(rename = "bodyFat")]
    BodyFat,
    #[serde(rename = "leanBody")]
    LeanBodyMass,
    #[serde(rename = "systolic")]
    Systolic,
    #[serde(rename = "diastolic")]
    Diastolic,
    #[serde(rename = "glucose")]
    BloodGlucose,
    #[serde(rename = "oxygen")]
    OxygenSaturation,
    #[serde(rename = "calories")]
    DietaryCalories,
}

impl Metric {
    /// Every raw value slot, in collection order
    pub const ALL: [Metric; 20] = [
        Metric::Steps,
        Metric::Distance,
        Metric::FlightsClimbed,
        Metric::ActiveEnergy,
        Metric::ExerciseTime,
        Metric::HeartRate,
        Metric::RestingHeartRate,
        Metric::WalkingHeartRate,
        Metric::Hrv,
        Metric::SleepDuration,
        Metric::Weight,
        Metric::Height,
        Metric::Bmi,
        Metric::BodyFat,
        Metric::LeanBodyMass,
        Metric::Systolic,
        Metric::Diastolic,
        Metric::BloodGlucose,
        Metric::OxygenSaturation,
        Metric::DietaryCalories,
    ];

    /// Collector-side name of the metric
    pub fn raw_name(&self) -> &'static str {
        match self {
            Metric::Steps => "steps",
            Metric::Distance => "distance",
            Metric::FlightsClimbed => "flights",
            Metric::ActiveEnergy => "activeEnergy",
            Metric::ExerciseTime => "exerciseTime",
            Metric::HeartRate => "heartRate",
            Metric::RestingHeartRate => "restingHeartRate",
            Metric::WalkingHeartRate => "walkingHeartRate",
            Metric::Hrv => "hrv",
            Metric::SleepDuration => "sleepDuration",
            Metric::Weight => "weight",
            Metric::Height => "height",
            Metric::Bmi => "bmi",
            Metric::BodyFat => "bodyFat",
            Metric::LeanBodyMass => "leanBody",
            Metric::Systolic => "systolic",
            Metric::Diastolic => "diastolic",
            Metric::BloodGlucose => "glucose",
            Metric::OxygenSaturation => "oxygen",
            Metric::DietaryCalories => "calories",
        }
    }

    /// Unit the raw value is reported in
    pub fn raw_unit(&self) -> &'static str {
        match self {
            Metric::Steps => "count",
            Metric::Distance => "m",
            Metric::FlightsClimbed => "count",
            Metric::ActiveEnergy => "kcal",
            Metric::ExerciseTime => "min",
            Metric::HeartRate | Metric::RestingHeartRate | Metric::WalkingHeartRate => "bpm",
            Metric::Hrv => "ms",
            Metric::SleepDuration => "s",
            Metric::Weight | Metric::LeanBodyMass => "kg",
            Metric::Height => "m",
            Metric::Bmi => "kg/m2",
            Metric::BodyFat => "%",
            Metric::Systolic | Metric::Diastolic => "mmHg",
            Metric::BloodGlucose => "mg/dL",
            Metric::OxygenSaturation => "%",
            Metric::DietaryCalories => "kcal",
        }
    }

    /// Look up a metric by its collector-side name
    pub fn from_raw_name(name: &str) -> Option<Metric> {
        Metric::ALL.iter().copied().find(|m| m.raw_name() == name)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw_name())
    }
}

/// Identity of a metric source.
///
/// Every variant but `BloodPressure` feeds exactly one bag slot; blood
/// pressure is read as one paired sample feeding systolic and diastolic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKey {
    Steps,
    Distance,
    FlightsClimbed,
    ActiveEnergy,
    ExerciseTime,
    HeartRate,
    RestingHeartRate,
    WalkingHeartRateAverage,
    Hrv,
    SleepDuration,
    Weight,
    Height,
    Bmi,
    BodyFat,
    LeanBodyMass,
    BloodPressure,
    BloodGlucose,
    OxygenSaturation,
    DietaryCalories,
}

impl SourceKey {
    /// The fixed set of sources a complete session registers
    pub const ALL: [SourceKey; 19] = [
        SourceKey::Steps,
        SourceKey::Distance,
        SourceKey::FlightsClimbed,
        SourceKey::ActiveEnergy,
        SourceKey::ExerciseTime,
        SourceKey::HeartRate,
        SourceKey::RestingHeartRate,
        SourceKey::WalkingHeartRateAverage,
        SourceKey::Hrv,
        SourceKey::SleepDuration,
        SourceKey::Weight,
        SourceKey::Height,
        SourceKey::Bmi,
        SourceKey::BodyFat,
        SourceKey::LeanBodyMass,
        SourceKey::BloodPressure,
        SourceKey::BloodGlucose,
        SourceKey::OxygenSaturation,
        SourceKey::DietaryCalories,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKey::Steps => "steps",
            SourceKey::Distance => "distance",
            SourceKey::FlightsClimbed => "flights_climbed",
            SourceKey::ActiveEnergy => "active_energy",
            SourceKey::ExerciseTime => "exercise_time",
            SourceKey::HeartRate => "heart_rate",
            SourceKey::RestingHeartRate => "resting_heart_rate",
            SourceKey::WalkingHeartRateAverage => "walking_heart_rate_average",
            SourceKey::Hrv => "hrv",
            SourceKey::SleepDuration => "sleep_duration",
            SourceKey::Weight => "weight",
            SourceKey::Height => "height",
            SourceKey::Bmi => "bmi",
            SourceKey::BodyFat => "body_fat",
            SourceKey::LeanBodyMass => "lean_body_mass",
            SourceKey::BloodPressure => "blood_pressure",
            SourceKey::BloodGlucose => "blood_glucose",
            SourceKey::OxygenSaturation => "oxygen_saturation",
            SourceKey::DietaryCalories => "dietary_calories",
        }
    }

    /// Bag slots written when this source settles
    pub fn metrics(&self) -> &'static [Metric] {
        match self {
            SourceKey::Steps => &[Metric::Steps],
            SourceKey::Distance => &[Metric::Distance],
            SourceKey::FlightsClimbed => &[Metric::FlightsClimbed],
            SourceKey::ActiveEnergy => &[Metric::ActiveEnergy],
            SourceKey::ExerciseTime => &[Metric::ExerciseTime],
            SourceKey::HeartRate => &[Metric::HeartRate],
            SourceKey::RestingHeartRate => &[Metric::RestingHeartRate],
            SourceKey::WalkingHeartRateAverage => &[Metric::WalkingHeartRate],
            SourceKey::Hrv => &[Metric::Hrv],
            SourceKey::SleepDuration => &[Metric::SleepDuration],
            SourceKey::Weight => &[Metric::Weight],
            SourceKey::Height => &[Metric::Height],
            SourceKey::Bmi => &[Metric::Bmi],
            SourceKey::BodyFat => &[Metric::BodyFat],
            SourceKey::LeanBodyMass => &[Metric::LeanBodyMass],
            SourceKey::BloodPressure => &[Metric::Systolic, Metric::Diastolic],
            SourceKey::BloodGlucose => &[Metric::BloodGlucose],
            SourceKey::OxygenSaturation => &[Metric::OxygenSaturation],
            SourceKey::DietaryCalories => &[Metric::DietaryCalories],
        }
    }

    pub fn is_paired(&self) -> bool {
        self.metrics().len() == 2
    }

    /// Default sample used when the source fails or times out
    pub fn default_sample(&self) -> Sample {
        if self.is_paired() {
            Sample::Pair(0.0, 0.0)
        } else {
            Sample::Scalar(0.0)
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value yielded by a metric source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sample {
    Scalar(f64),
    /// Composite reading, e.g. (systolic, diastolic)
    Pair(f64, f64),
}

impl Sample {
    pub fn is_finite(&self) -> bool {
        match self {
            Sample::Scalar(v) => v.is_finite(),
            Sample::Pair(a, b) => a.is_finite() && b.is_finite(),
        }
    }

    /// Whether this sample has the shape `key` produces
    pub fn fits(&self, key: SourceKey) -> bool {
        matches!(
            (self, key.is_paired()),
            (Sample::Scalar(_), false) | (Sample::Pair(_, _), true)
        )
    }
}

/// Raw values keyed by metric, as collected by one aggregation session.
///
/// Unset slots read as `0.0`. A bag handed out by a session is owned by the
/// caller and no longer written to.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RawMetricBag {
    values: BTreeMap<Metric, f64>,
}

impl RawMetricBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bag from explicit `(metric, value)` pairs
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = (Metric, f64)>,
    {
        Self {
            values: values.into_iter().collect(),
        }
    }

    /// Value for `metric`, `0.0` when unset
    pub fn get(&self, metric: Metric) -> f64 {
        self.values.get(&metric).copied().unwrap_or(0.0)
    }

    /// Whether a value was actually written for `metric`
    pub fn contains(&self, metric: Metric) -> bool {
        self.values.contains_key(&metric)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        self.values.iter().map(|(m, v)| (*m, *v))
    }

    /// Write the settled sample of one source into its slots
    pub(crate) fn record(&mut self, key: SourceKey, sample: Sample) {
        match (key.metrics(), sample) {
            ([metric], Sample::Scalar(v)) => {
                self.values.insert(*metric, v);
            }
            ([first, second], Sample::Pair(a, b)) => {
                self.values.insert(*first, a);
                self.values.insert(*second, b);
            }
            _ => {
                log::warn!("Sample shape does not match source {key}, keeping defaults");
            }
        }
    }
}

/// Session difficulty requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Difficulty {
    Low,
    #[default]
    Medium,
    High,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Low => "low",
            Difficulty::Medium => "medium",
            Difficulty::High => "high",
        }
    }
}

impl FromStr for Difficulty {
    type Err = SyncError;

    /// Accepts canonical labels and the localized 하/중/상 labels
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "low" | "하" => Ok(Difficulty::Low),
            "medium" | "중" => Ok(Difficulty::Medium),
            "high" | "상" => Ok(Difficulty::High),
            other => Err(SyncError::InvalidDifficulty(other.to_string())),
        }
    }
}

impl TryFrom<String> for Difficulty {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and session settings stamped onto each canonical record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordConfig {
    pub user_id: String,
    /// Calendar date (YYYY-MM-DD); today's local date when absent or empty
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Session length in minutes
    #[serde(default = "default_duration")]
    pub duration: u32,
}

fn default_duration() -> u32 {
    30
}

impl RecordConfig {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            date: None,
            difficulty: Difficulty::default(),
            duration: default_duration(),
        }
    }

    /// Set an explicit record date, rejecting anything that is not YYYY-MM-DD
    pub fn with_date(mut self, date: impl Into<String>) -> Result<Self, SyncError> {
        let date = date.into();
        validate_date(&date)?;
        self.date = Some(date);
        Ok(self)
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration = minutes;
        self
    }

    /// Check a config that arrived through deserialization
    pub fn validate(&self) -> Result<(), SyncError> {
        match self.date.as_deref() {
            Some(date) if !date.is_empty() => validate_date(date),
            _ => Ok(()),
        }
    }
}

/// Parse-check a YYYY-MM-DD calendar date
pub fn validate_date(date: &str) -> Result<(), SyncError> {
    // chrono accepts unpadded fields, the wire format does not
    if date.len() != 10 {
        return Err(SyncError::InvalidDate(date.to_string()));
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| SyncError::InvalidDate(date.to_string()))
}

/// Canonical health block, fixed field names and units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HealthData {
    /// Sleep duration (minutes)
    pub sleep_min: f64,
    /// Sleep duration (hours)
    pub sleep_hr: f64,
    /// Body weight (kg)
    pub weight: f64,
    /// Height (meters)
    pub height_m: f64,
    pub bmi: f64,
    /// Body fat (percent)
    pub body_fat: f64,
    /// Lean body mass (kg)
    pub lean_body: f64,
    /// Walking + running distance (km)
    pub distance_km: f64,
    pub steps: f64,
    /// Always 0.0; no upstream source reports cadence
    pub steps_cadence: f64,
    /// Exercise time (minutes)
    pub exercise_min: f64,
    pub flights: f64,
    /// Active energy (kcal)
    pub active_calories: f64,
    /// Same as active energy; there is no separate total source
    pub total_calories: f64,
    /// Dietary energy (kcal)
    pub calories_intake: f64,
    pub heart_rate: f64,
    pub resting_heart_rate: f64,
    pub walking_heart_rate: f64,
    /// Heart rate variability (ms)
    pub hrv: f64,
    pub systolic: f64,
    pub diastolic: f64,
    pub glucose: f64,
    /// Blood oxygen saturation (percent)
    pub oxygen_saturation: f64,
}

impl HealthData {
    /// Number of numeric fields in the block
    pub const FIELD_COUNT: usize = 23;

    /// Every field as `(wire name, value)`, in wire order
    pub fn fields(&self) -> [(&'static str, f64); Self::FIELD_COUNT] {
        [
            ("sleep_min", self.sleep_min),
            ("sleep_hr", self.sleep_hr),
            ("weight", self.weight),
            ("height_m", self.height_m),
            ("bmi", self.bmi),
            ("body_fat", self.body_fat),
            ("lean_body", self.lean_body),
            ("distance_km", self.distance_km),
            ("steps", self.steps),
            ("steps_cadence", self.steps_cadence),
            ("exercise_min", self.exercise_min),
            ("flights", self.flights),
            ("active_calories", self.active_calories),
            ("total_calories", self.total_calories),
            ("calories_intake", self.calories_intake),
            ("heart_rate", self.heart_rate),
            ("resting_heart_rate", self.resting_heart_rate),
            ("walking_heart_rate", self.walking_heart_rate),
            ("hrv", self.hrv),
            ("systolic", self.systolic),
            ("diastolic", self.diastolic),
            ("glucose", self.glucose),
            ("oxygen_saturation", self.oxygen_saturation),
        ]
    }
}

/// The record submitted to the aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalHealthRecord {
    pub user_id: String,
    /// Calendar date (YYYY-MM-DD)
    pub date: String,
    pub difficulty: Difficulty,
    /// Session length (minutes)
    pub duration: u32,
    #[serde(rename = "raw_json")]
    pub health: HealthData,
}

/// Result of one upload attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    Success,
    NetworkFailure { reason: String },
    EncodingFailure { reason: String },
    ServerRejected { status: u16, body: String },
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success)
    }
}

impl fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadOutcome::Success => write!(f, "upload accepted"),
            UploadOutcome::NetworkFailure { reason } => write!(f, "network failure: {reason}"),
            UploadOutcome::EncodingFailure { reason } => write!(f, "encoding failure: {reason}"),
            UploadOutcome::ServerRejected { status, .. } => {
                write!(f, "server rejected upload with status {status}")
            }
        }
    }
}
