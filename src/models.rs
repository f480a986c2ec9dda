//! Core data models used throughout Pulseline.
//!
//! These types represent the files and canonical records that flow through
//! the ingestion and sync pipeline. Canonical records are tagged variants —
//! one per data category — constructed exclusively by the normalizer, so no
//! stringly-typed field access survives past that boundary.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Detected file kind, by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Binary device activity format.
    Fit,
    /// Tabular activity export (categorized, not parsed).
    Tcx,
    Json,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Fit => "fit",
            FileKind::Tcx => "tcx",
            FileKind::Json => "json",
        }
    }
}

/// Data category a file or record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Sleep,
    DailySummary,
    Hrv,
    Stress,
    Activity,
    FitnessAssessment,
    Hydration,
    BodyComposition,
    MenstrualCycle,
    /// JSON file that matched no keyword rule; skipped by the parser.
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sleep => "sleep",
            Category::DailySummary => "daily_summary",
            Category::Hrv => "hrv",
            Category::Stress => "stress",
            Category::Activity => "activity",
            Category::FitnessAssessment => "fitness_assessment",
            Category::Hydration => "hydration",
            Category::BodyComposition => "body_composition",
            Category::MenstrualCycle => "menstrual_cycle",
            Category::Other => "other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an ingested file came from. Stored on the `imported_files` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestSource {
    Archive,
    DeviceSync,
    Manual,
}

impl IngestSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestSource::Archive => "archive",
            IngestSource::DeviceSync => "device-sync",
            IngestSource::Manual => "manual",
        }
    }
}

/// Nightly sleep summary. Identity key: calendar date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SleepRecord {
    pub date: NaiveDate,
    pub sleep_start: Option<NaiveDateTime>,
    pub sleep_end: Option<NaiveDateTime>,
    pub deep_sleep_seconds: Option<i64>,
    pub light_sleep_seconds: Option<i64>,
    pub rem_sleep_seconds: Option<i64>,
    pub awake_sleep_seconds: Option<i64>,
    pub window_confirmation: Option<String>,
    pub average_respiration: Option<f64>,
    pub lowest_respiration: Option<f64>,
    pub highest_respiration: Option<f64>,
    pub average_spo2: Option<f64>,
    pub lowest_spo2: Option<f64>,
    pub average_sleep_hr: Option<i64>,
    pub sleep_score: Option<i64>,
}

/// Per-day wellness summary. Identity key: calendar date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailySummaryRecord {
    pub date: NaiveDate,
    pub step_count: Option<i64>,
    pub calories_burned: Option<f64>,
    pub distance_meters: Option<f64>,
    pub floors_climbed: Option<i64>,
    pub active_minutes: Option<i64>,
    pub sedentary_minutes: Option<i64>,
    pub min_heart_rate: Option<i64>,
    pub max_heart_rate: Option<i64>,
    pub resting_heart_rate: Option<i64>,
    pub avg_heart_rate: Option<i64>,
    pub stress_avg: Option<i64>,
    pub stress_max: Option<i64>,
    pub stress_min: Option<i64>,
    pub body_battery_charged: Option<i64>,
    pub body_battery_drained: Option<i64>,
    pub body_battery_start: Option<i64>,
    pub body_battery_end: Option<i64>,
    pub intensity_minutes_moderate: Option<i64>,
    pub intensity_minutes_vigorous: Option<i64>,
}

/// Heart-rate-variability measurement. Identity key: (date, seq) — device
/// files can carry many samples per day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HrvRecord {
    pub date: NaiveDate,
    pub seq: i64,
    pub hrv_value: Option<f64>,
    pub measurement_type: Option<String>,
}

/// Stress measurement or daily aggregate. Identity key: (date, seq); daily
/// aggregates from JSON exports use seq 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StressRecord {
    pub date: NaiveDate,
    pub seq: i64,
    pub avg_stress: Option<i64>,
    pub max_stress: Option<i64>,
    pub min_stress: Option<i64>,
    pub rest_stress_duration: Option<i64>,
    pub activity_stress_duration: Option<i64>,
    pub low_stress_duration: Option<i64>,
    pub medium_stress_duration: Option<i64>,
    pub high_stress_duration: Option<i64>,
}

/// Workout session. Identity key: (date, seq).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityRecord {
    pub date: NaiveDate,
    pub seq: i64,
    pub start_time: Option<NaiveDateTime>,
    pub activity_type: Option<String>,
    pub duration_seconds: Option<f64>,
    pub distance_meters: Option<f64>,
    pub avg_hr: Option<i64>,
    pub max_hr: Option<i64>,
    pub calories: Option<f64>,
    pub training_load: Option<f64>,
    pub training_effect_aerobic: Option<f64>,
    pub training_effect_anaerobic: Option<f64>,
}

/// VO2-max / fitness-age assessment. Identity key: calendar date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitnessAssessmentRecord {
    pub date: NaiveDate,
    pub vo2_max: Option<f64>,
    pub fitness_age: Option<i64>,
    pub max_met: Option<f64>,
    pub sport: Option<String>,
    pub sub_sport: Option<String>,
}

/// Hydration log entry. Identity key: (date, seq) — multiple intakes per day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HydrationRecord {
    pub date: NaiveDate,
    pub seq: i64,
    pub value_ml: Option<f64>,
    pub sweat_loss_ml: Option<f64>,
    pub source: Option<String>,
}

/// Body composition measurement. Identity key: calendar date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyCompositionRecord {
    pub date: NaiveDate,
    pub weight_kg: Option<f64>,
    pub body_fat_percent: Option<f64>,
    pub muscle_mass_kg: Option<f64>,
    pub bone_mass_kg: Option<f64>,
    pub water_percent: Option<f64>,
    pub visceral_fat_rating: Option<i64>,
    pub metabolic_age: Option<i64>,
    pub bmi: Option<f64>,
}

/// Menstrual cycle entry. Identity key: cycle start date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MenstrualCycleRecord {
    pub date: NaiveDate,
    pub cycle_end: Option<NaiveDate>,
    pub cycle_length_days: Option<i64>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub period_length_days: Option<i64>,
    pub confirmed: Option<bool>,
    pub ovulation_estimate: Option<NaiveDate>,
}

/// One normalized record, tagged by category.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalRecord {
    Sleep(SleepRecord),
    DailySummary(DailySummaryRecord),
    Hrv(HrvRecord),
    Stress(StressRecord),
    Activity(ActivityRecord),
    FitnessAssessment(FitnessAssessmentRecord),
    Hydration(HydrationRecord),
    BodyComposition(BodyCompositionRecord),
    MenstrualCycle(MenstrualCycleRecord),
}

impl CanonicalRecord {
    pub fn category(&self) -> Category {
        match self {
            CanonicalRecord::Sleep(_) => Category::Sleep,
            CanonicalRecord::DailySummary(_) => Category::DailySummary,
            CanonicalRecord::Hrv(_) => Category::Hrv,
            CanonicalRecord::Stress(_) => Category::Stress,
            CanonicalRecord::Activity(_) => Category::Activity,
            CanonicalRecord::FitnessAssessment(_) => Category::FitnessAssessment,
            CanonicalRecord::Hydration(_) => Category::Hydration,
            CanonicalRecord::BodyComposition(_) => Category::BodyComposition,
            CanonicalRecord::MenstrualCycle(_) => Category::MenstrualCycle,
        }
    }

    /// The calendar-date component of the identity key.
    pub fn date(&self) -> NaiveDate {
        match self {
            CanonicalRecord::Sleep(r) => r.date,
            CanonicalRecord::DailySummary(r) => r.date,
            CanonicalRecord::Hrv(r) => r.date,
            CanonicalRecord::Stress(r) => r.date,
            CanonicalRecord::Activity(r) => r.date,
            CanonicalRecord::FitnessAssessment(r) => r.date,
            CanonicalRecord::Hydration(r) => r.date,
            CanonicalRecord::BodyComposition(r) => r.date,
            CanonicalRecord::MenstrualCycle(r) => r.date,
        }
    }

    /// True if the record carries at least one category-specific data field
    /// worth storing. Records failing this are dropped by the parser.
    pub fn has_meaningful_data(&self) -> bool {
        match self {
            CanonicalRecord::Sleep(r) => {
                r.deep_sleep_seconds.is_some()
                    || r.light_sleep_seconds.is_some()
                    || r.rem_sleep_seconds.is_some()
            }
            CanonicalRecord::DailySummary(r) => {
                r.step_count.is_some()
                    || r.calories_burned.is_some()
                    || r.resting_heart_rate.is_some()
            }
            CanonicalRecord::Hrv(r) => r.hrv_value.is_some(),
            CanonicalRecord::Stress(r) => {
                r.avg_stress.is_some() || r.max_stress.is_some() || r.min_stress.is_some()
            }
            CanonicalRecord::Activity(r) => {
                r.activity_type.is_some()
                    || r.duration_seconds.is_some()
                    || r.distance_meters.is_some()
            }
            CanonicalRecord::FitnessAssessment(r) => {
                r.vo2_max.is_some() || r.fitness_age.is_some()
            }
            CanonicalRecord::Hydration(r) => r.value_ml.is_some(),
            CanonicalRecord::BodyComposition(r) => {
                r.weight_kg.is_some() || r.body_fat_percent.is_some()
            }
            CanonicalRecord::MenstrualCycle(r) => {
                r.cycle_length_days.is_some() || r.period_start.is_some()
            }
        }
    }
}

/// Output of a successful parse: the file's identity plus every canonical
/// record it produced. The content hash is computed once per file and rides
/// along so the store can dedup atomically.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub kind: FileKind,
    pub category: Category,
    pub content_hash: String,
    pub file_size: i64,
    pub modified_time: i64,
    pub records: Vec<CanonicalRecord>,
}

/// One row of `imported_files`.
#[derive(Debug, Clone)]
pub struct ImportedFileRow {
    pub content_hash: String,
    pub file_path: String,
    pub file_kind: String,
    pub category: String,
    pub file_size: i64,
    pub modified_time: i64,
    pub source: String,
    pub record_count: i64,
}

/// One registered device-sync target.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceTarget {
    pub device_id: String,
    pub device_path: String,
    pub display_name: String,
    pub enabled: bool,
    pub last_sync_at: Option<i64>,
    pub file_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn sleep_meaningful_requires_a_stage_duration() {
        let empty = CanonicalRecord::Sleep(SleepRecord {
            date: date("2024-01-15"),
            average_spo2: Some(95.0),
            ..Default::default()
        });
        assert!(!empty.has_meaningful_data());

        let with_deep = CanonicalRecord::Sleep(SleepRecord {
            date: date("2024-01-15"),
            deep_sleep_seconds: Some(7200),
            ..Default::default()
        });
        assert!(with_deep.has_meaningful_data());
    }

    #[test]
    fn record_reports_its_category_and_date() {
        let rec = CanonicalRecord::Stress(StressRecord {
            date: date("2024-03-02"),
            seq: 4,
            avg_stress: Some(31),
            ..Default::default()
        });
        assert_eq!(rec.category(), Category::Stress);
        assert_eq!(rec.date(), date("2024-03-02"));
    }
}
