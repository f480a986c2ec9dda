//! Vendor field-name normalization.
//!
//! GDPR exports rename fields across export versions (`deepSleepSeconds` vs
//! `deepSleep`, `totalSteps` vs `stepCount`, …). Each canonical field carries
//! an ordered list of known vendor aliases; the first alias present with a
//! non-null value wins. Normalization never fabricates values and never
//! fails — absent or unusable fields are simply `None`.
//!
//! Canonical records are constructed here and nowhere else; parsing code
//! downstream only fills in the identity key.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use tracing::warn;

use crate::models::{
    ActivityRecord, BodyCompositionRecord, CanonicalRecord, Category, DailySummaryRecord,
    FitnessAssessmentRecord, HrvRecord, HydrationRecord, MenstrualCycleRecord, SleepRecord,
    StressRecord,
};

/// A parsed JSON object, as produced by `serde_json`.
pub type JsonObject = Map<String, Value>;

/// Returns the first non-null value among the given aliases.
///
/// Lookup is exact-case: a field present only under a differently-cased name
/// is treated as absent, matching the vendor's own export tooling.
pub fn field_value<'a>(obj: &'a JsonObject, aliases: &[&str]) -> Option<&'a Value> {
    for alias in aliases {
        if let Some(v) = obj.get(*alias) {
            if !v.is_null() {
                return Some(v);
            }
        }
    }
    None
}

fn int_field(obj: &JsonObject, aliases: &[&str]) -> Option<i64> {
    match field_value(obj, aliases)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
}

fn float_field(obj: &JsonObject, aliases: &[&str]) -> Option<f64> {
    match field_value(obj, aliases)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn str_field(obj: &JsonObject, aliases: &[&str]) -> Option<String> {
    match field_value(obj, aliases)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn bool_field(obj: &JsonObject, aliases: &[&str]) -> Option<bool> {
    field_value(obj, aliases)?.as_bool()
}

fn date_field(obj: &JsonObject, aliases: &[&str]) -> Option<NaiveDate> {
    match field_value(obj, aliases)? {
        Value::String(s) => parse_date(s),
        _ => None,
    }
}

fn timestamp_field(obj: &JsonObject, aliases: &[&str]) -> Option<NaiveDateTime> {
    match field_value(obj, aliases)? {
        Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

/// Parse a calendar date from either of the two shapes the vendor emits:
/// `2024-01-15` or `2024-01-15T08:30:00.0` (optionally with a trailing `Z`).
/// Anything else logs a warning and yields `None`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    if s.is_empty() {
        return None;
    }
    if s.contains('T') {
        return parse_timestamp(s).map(|ts| ts.date());
    }
    match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        Ok(d) => Some(d),
        Err(_) => {
            warn!(value = s, "could not parse date");
            None
        }
    }
}

/// Parse an ISO-8601 date-time, with optional fractional seconds and an
/// optional trailing `Z`. Unparseable input logs a warning and yields `None`.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if s.is_empty() {
        return None;
    }
    let trimmed = s.strip_suffix('Z').unwrap_or(s);
    match NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(ts) => Some(ts),
        Err(_) => {
            warn!(value = s, "could not parse timestamp");
            None
        }
    }
}

/// Resolve the record's calendar-date field via the category's date aliases.
/// This is the first stop in the parser's date-derivation chain.
pub fn calendar_date(obj: &JsonObject, category: Category) -> Option<NaiveDate> {
    let aliases: &[&str] = match category {
        Category::Sleep | Category::DailySummary | Category::Stress => &["calendarDate", "date"],
        Category::Hrv => &["calendarDate", "date", "createTimeStamp"],
        Category::Activity => &["startTimeGMT", "startTimeLocal", "beginTimestamp"],
        Category::FitnessAssessment => &["calendarDate", "date", "createDate"],
        Category::Hydration => &["calendarDate", "date", "timestampGMT"],
        Category::BodyComposition => &["timestampGMT", "date", "calendarDate"],
        Category::MenstrualCycle => &["startDate", "cycleStartDate"],
        Category::Other => return None,
    };
    date_field(obj, aliases)
}

/// Apply the whole alias table for `category` and return a canonical record
/// containing only fields actually present. The identity date is left at its
/// default; the caller derives and assigns it. Returns `None` for
/// uncategorized input.
pub fn normalize(obj: &JsonObject, category: Category) -> Option<CanonicalRecord> {
    let record = match category {
        Category::Sleep => CanonicalRecord::Sleep(sleep(obj)),
        Category::DailySummary => CanonicalRecord::DailySummary(daily_summary(obj)),
        Category::Hrv => CanonicalRecord::Hrv(hrv(obj)),
        Category::Stress => CanonicalRecord::Stress(stress(obj)),
        Category::Activity => CanonicalRecord::Activity(activity(obj)),
        Category::FitnessAssessment => CanonicalRecord::FitnessAssessment(fitness_assessment(obj)),
        Category::Hydration => CanonicalRecord::Hydration(hydration(obj)),
        Category::BodyComposition => CanonicalRecord::BodyComposition(body_composition(obj)),
        Category::MenstrualCycle => CanonicalRecord::MenstrualCycle(menstrual_cycle(obj)),
        Category::Other => return None,
    };
    Some(record)
}

pub fn sleep(obj: &JsonObject) -> SleepRecord {
    SleepRecord {
        date: NaiveDate::default(),
        sleep_start: timestamp_field(
            obj,
            &["sleepStartTimestampGMT", "sleepStartTimestampLocal", "sleepStart"],
        ),
        sleep_end: timestamp_field(
            obj,
            &["sleepEndTimestampGMT", "sleepEndTimestampLocal", "sleepEnd"],
        ),
        deep_sleep_seconds: int_field(obj, &["deepSleepSeconds", "deepSleep"]),
        light_sleep_seconds: int_field(obj, &["lightSleepSeconds", "lightSleep"]),
        rem_sleep_seconds: int_field(obj, &["remSleepSeconds", "remSleep"]),
        awake_sleep_seconds: int_field(obj, &["awakeSleepSeconds", "awakeSeconds", "awakeSleep"]),
        window_confirmation: str_field(
            obj,
            &["sleepWindowConfirmationType", "confirmationType"],
        ),
        average_respiration: float_field(obj, &["averageRespiration", "avgRespiration"]),
        lowest_respiration: float_field(obj, &["lowestRespiration", "minRespiration"]),
        highest_respiration: float_field(obj, &["highestRespiration", "maxRespiration"]),
        average_spo2: float_field(obj, &["averageSpO2Value", "avgSpO2", "averageSpo2"]),
        lowest_spo2: float_field(obj, &["lowestSpO2Value", "minSpO2", "lowestSpo2"]),
        average_sleep_hr: int_field(obj, &["avgSleepHeartRate", "averageHeartRate", "avgHR"]),
        sleep_score: int_field(obj, &["sleepScore", "overallSleepScore"]),
    }
}

pub fn daily_summary(obj: &JsonObject) -> DailySummaryRecord {
    DailySummaryRecord {
        date: NaiveDate::default(),
        step_count: int_field(obj, &["totalSteps", "steps", "stepCount"]),
        calories_burned: float_field(obj, &["totalKilocalories", "calories", "totalCalories"]),
        distance_meters: float_field(obj, &["totalDistanceMeters", "distanceMeters", "distance"]),
        floors_climbed: int_field(obj, &["floorsAscended", "floorsClimbed", "floors"]),
        active_minutes: int_field(obj, &["activeKilocalories", "activeMinutes"]),
        sedentary_minutes: int_field(obj, &["sedentaryKilocalories", "sedentaryMinutes"]),
        min_heart_rate: int_field(obj, &["minHeartRate", "minHR"]),
        max_heart_rate: int_field(obj, &["maxHeartRate", "maxHR"]),
        resting_heart_rate: int_field(obj, &["restingHeartRate", "restingHR", "restingHr"]),
        avg_heart_rate: int_field(obj, &["averageHeartRate", "avgHeartRate", "avgHR"]),
        stress_avg: int_field(obj, &["averageStressLevel", "avgStress", "stressAvg"]),
        stress_max: int_field(obj, &["maxStressLevel", "maxStress"]),
        stress_min: int_field(obj, &["restStressLevel", "minStress"]),
        body_battery_charged: int_field(obj, &["bodyBatteryChargedValue", "bodyBatteryCharged"]),
        body_battery_drained: int_field(obj, &["bodyBatteryDrainedValue", "bodyBatteryDrained"]),
        body_battery_start: int_field(
            obj,
            &["bodyBatteryHighestValue", "bodyBatteryStart", "bodyBatteryMax"],
        ),
        body_battery_end: int_field(
            obj,
            &["bodyBatteryLowestValue", "bodyBatteryEnd", "bodyBatteryMin"],
        ),
        intensity_minutes_moderate: int_field(
            obj,
            &["moderateIntensityMinutes", "moderateMinutes"],
        ),
        intensity_minutes_vigorous: int_field(
            obj,
            &["vigorousIntensityMinutes", "vigorousMinutes"],
        ),
    }
}

pub fn hrv(obj: &JsonObject) -> HrvRecord {
    let measurement_type = str_field(obj, &["measurementType", "type"]).or_else(|| {
        // Older exports omit the type; rmssd-shaped payloads are rmssd.
        if obj.contains_key("rmssd") || obj.contains_key("weeklyAvg") {
            Some("rmssd".to_string())
        } else {
            Some("unknown".to_string())
        }
    });
    HrvRecord {
        date: NaiveDate::default(),
        seq: 0,
        hrv_value: float_field(obj, &["hrvValue", "rmssd", "weeklyAvg", "lastNightAvg"]),
        measurement_type,
    }
}

pub fn stress(obj: &JsonObject) -> StressRecord {
    StressRecord {
        date: NaiveDate::default(),
        seq: 0,
        avg_stress: int_field(obj, &["avgStressLevel", "averageStressLevel", "avgStress"]),
        max_stress: int_field(obj, &["maxStressLevel", "maxStress"]),
        min_stress: int_field(obj, &["restStressLevel", "minStress"]),
        rest_stress_duration: int_field(obj, &["restStressDuration", "restDuration"]),
        activity_stress_duration: int_field(obj, &["activityStressDuration", "activityDuration"]),
        low_stress_duration: int_field(obj, &["lowStressDuration"]),
        medium_stress_duration: int_field(obj, &["mediumStressDuration"]),
        high_stress_duration: int_field(obj, &["highStressDuration"]),
    }
}

pub fn activity(obj: &JsonObject) -> ActivityRecord {
    ActivityRecord {
        date: NaiveDate::default(),
        seq: 0,
        start_time: timestamp_field(obj, &["startTimeGMT", "startTimeLocal", "beginTimestamp"]),
        activity_type: str_field(obj, &["activityType", "sport", "activityName"]),
        duration_seconds: float_field(obj, &["duration", "elapsedDuration", "totalTimeSeconds"]),
        distance_meters: float_field(obj, &["distance", "totalDistance"]),
        avg_hr: int_field(obj, &["averageHR", "avgHR", "averageHeartRate"]),
        max_hr: int_field(obj, &["maxHR", "maxHeartRate"]),
        calories: float_field(obj, &["calories", "totalCalories"]),
        training_load: float_field(obj, &["trainingLoad", "aerobicTrainingEffect"]),
        training_effect_aerobic: float_field(obj, &["aerobicTrainingEffect", "trainingEffect"]),
        training_effect_anaerobic: float_field(obj, &["anaerobicTrainingEffect"]),
    }
}

pub fn fitness_assessment(obj: &JsonObject) -> FitnessAssessmentRecord {
    FitnessAssessmentRecord {
        date: NaiveDate::default(),
        vo2_max: float_field(obj, &["vo2MaxValue", "vo2Max"]),
        fitness_age: int_field(obj, &["fitnessAge"]),
        max_met: float_field(obj, &["maxMet"]),
        sport: str_field(obj, &["sport"]),
        sub_sport: str_field(obj, &["subSport"]),
    }
}

pub fn hydration(obj: &JsonObject) -> HydrationRecord {
    HydrationRecord {
        date: NaiveDate::default(),
        seq: 0,
        value_ml: float_field(obj, &["valueInML", "value", "hydrationValueInML"]),
        sweat_loss_ml: float_field(obj, &["estimatedSweatLoss", "sweatLoss"]),
        source: str_field(obj, &["source"]),
    }
}

pub fn body_composition(obj: &JsonObject) -> BodyCompositionRecord {
    BodyCompositionRecord {
        date: NaiveDate::default(),
        weight_kg: float_field(obj, &["weight", "weightInKG"]),
        body_fat_percent: float_field(obj, &["bodyFat", "bodyFatPercentage"]),
        muscle_mass_kg: float_field(obj, &["muscleMass", "muscleMassInKG"]),
        bone_mass_kg: float_field(obj, &["boneMass", "boneMassInKG"]),
        water_percent: float_field(obj, &["bodyWater", "bodyWaterPercentage"]),
        visceral_fat_rating: int_field(obj, &["visceralFatRating"]),
        metabolic_age: int_field(obj, &["metabolicAge"]),
        bmi: float_field(obj, &["bmi", "BMI"]),
    }
}

pub fn menstrual_cycle(obj: &JsonObject) -> MenstrualCycleRecord {
    MenstrualCycleRecord {
        date: NaiveDate::default(),
        cycle_end: date_field(obj, &["endDate", "cycleEndDate"]),
        cycle_length_days: int_field(obj, &["cycleLengthInDays", "cycleLength"]),
        period_start: date_field(obj, &["periodStartDate"]),
        period_end: date_field(obj, &["periodEndDate"]),
        period_length_days: int_field(obj, &["periodLengthInDays", "periodLength"]),
        confirmed: bool_field(obj, &["confirmed"]),
        ovulation_estimate: date_field(obj, &["estimatedOvulationDate"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(json: &str) -> JsonObject {
        serde_json::from_str::<Value>(json)
            .unwrap()
            .as_object()
            .unwrap()
            .clone()
    }

    #[test]
    fn primary_alias_wins_over_alternate() {
        let o = obj(r#"{"deepSleepSeconds": 7200, "deepSleep": 1}"#);
        let rec = sleep(&o);
        assert_eq!(rec.deep_sleep_seconds, Some(7200));
    }

    #[test]
    fn alternate_alias_used_when_primary_absent() {
        let o = obj(r#"{"deepSleep": 5400}"#);
        assert_eq!(sleep(&o).deep_sleep_seconds, Some(5400));
    }

    #[test]
    fn null_primary_falls_through_to_alternate() {
        let o = obj(r#"{"totalSteps": null, "steps": 8000}"#);
        assert_eq!(daily_summary(&o).step_count, Some(8000));
    }

    #[test]
    fn alias_lookup_is_exact_case() {
        let o = obj(r#"{"DEEPSLEEPSECONDS": 7200}"#);
        assert_eq!(sleep(&o).deep_sleep_seconds, None);
    }

    #[test]
    fn absent_fields_stay_none() {
        let o = obj(r#"{"calendarDate": "2024-01-15"}"#);
        let rec = sleep(&o);
        assert_eq!(rec.deep_sleep_seconds, None);
        assert_eq!(rec.average_spo2, None);
    }

    #[test]
    fn date_only_shape() {
        assert_eq!(
            parse_date("2024-01-15"),
            Some(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );
    }

    #[test]
    fn datetime_shape_with_fraction() {
        let d = parse_date("2024-01-15T08:30:00.0").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn datetime_shape_with_zone_marker() {
        let ts = parse_timestamp("2024-01-15T02:00:00Z").unwrap();
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn garbage_dates_yield_absent() {
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_timestamp("15/01/2024 08:30"), None);
    }

    #[test]
    fn calendar_date_per_category() {
        let o = obj(r#"{"calendarDate": "2024-01-15"}"#);
        assert_eq!(
            calendar_date(&o, Category::Sleep),
            Some(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );

        let act = obj(r#"{"startTimeGMT": "2024-02-01T06:12:00.0"}"#);
        assert_eq!(
            calendar_date(&act, Category::Activity),
            Some(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
        );
    }

    #[test]
    fn hrv_measurement_type_inferred_from_shape() {
        let rmssd = obj(r#"{"rmssd": 42.5}"#);
        assert_eq!(hrv(&rmssd).measurement_type.as_deref(), Some("rmssd"));

        let unknown = obj(r#"{"hrvValue": 38.0}"#);
        assert_eq!(hrv(&unknown).measurement_type.as_deref(), Some("unknown"));
    }

    #[test]
    fn normalize_dispatches_by_category() {
        let o = obj(r#"{"totalSteps": 10000}"#);
        match normalize(&o, Category::DailySummary) {
            Some(CanonicalRecord::DailySummary(r)) => assert_eq!(r.step_count, Some(10000)),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(normalize(&o, Category::Other).is_none());
    }
}
