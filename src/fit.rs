//! Binary device-file parsing.
//!
//! Decoding is delegated to the `fitparser` crate, which exposes a FIT file
//! as a sequence of typed messages with named, possibly-absent field values.
//! This module groups the message kinds of interest, then folds the groups
//! into canonical records. A file that cannot be decoded yields a parse
//! error and no records — partially decoded files are never trusted.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use fitparser::profile::MesgNum;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{
    ActivityRecord, CanonicalRecord, Category, DailySummaryRecord, FileKind, HrvRecord,
    ParsedFile, SleepRecord, StressRecord,
};
use crate::normalize::{self, JsonObject};
use crate::parse;

/// Decoded messages of interest, grouped by kind. Field values are converted
/// to JSON values; timestamps are rendered in the ISO shape the normalizer's
/// date parsing understands.
#[derive(Debug, Default)]
pub struct FitMessageGroups {
    pub file_ids: Vec<JsonObject>,
    pub monitoring: Vec<JsonObject>,
    pub stress_samples: Vec<JsonObject>,
    pub sleep_segments: Vec<JsonObject>,
    pub hrv_samples: Vec<JsonObject>,
    pub sessions: Vec<JsonObject>,
    pub activities: Vec<JsonObject>,
    pub track_points: Vec<JsonObject>,
}

impl FitMessageGroups {
    /// Total number of grouped messages.
    pub fn message_count(&self) -> usize {
        self.file_ids.len()
            + self.monitoring.len()
            + self.stress_samples.len()
            + self.sleep_segments.len()
            + self.hrv_samples.len()
            + self.sessions.len()
            + self.activities.len()
            + self.track_points.len()
    }
}

/// Open a FIT file and group its message stream.
pub fn decode_messages(path: &Path) -> Result<FitMessageGroups> {
    let mut file = fs::File::open(path)?;
    let records = fitparser::from_reader(&mut file)
        .map_err(|e| Error::Parse(format!("{}: {}", path.display(), e)))?;

    let mut groups = FitMessageGroups::default();
    for record in records {
        let bucket = match record.kind() {
            MesgNum::FileId => &mut groups.file_ids,
            MesgNum::Monitoring => &mut groups.monitoring,
            MesgNum::StressLevel => &mut groups.stress_samples,
            // fitparser 0.5 has no named `SleepLevel` variant; the FIT
            // profile assigns `sleep_level` global message number 275.
            MesgNum::UnknownVariant(275) => &mut groups.sleep_segments,
            MesgNum::Hrv => &mut groups.hrv_samples,
            MesgNum::Session => &mut groups.sessions,
            MesgNum::Activity => &mut groups.activities,
            MesgNum::Record => &mut groups.track_points,
            _ => continue,
        };

        let mut obj = JsonObject::new();
        for field in record.fields() {
            let value = value_to_json(field.value());
            if !value.is_null() {
                obj.insert(field.name().to_string(), value);
            }
        }
        if !obj.is_empty() {
            bucket.push(obj);
        }
    }

    debug!(file = %path.display(), messages = groups.message_count(), "decoded device file");
    Ok(groups)
}

/// Convert a decoder field value to JSON. Timestamps become the ISO string
/// shape shared with the JSON export path so one set of date helpers covers
/// both.
fn value_to_json(value: &fitparser::Value) -> Value {
    match value {
        fitparser::Value::Timestamp(ts) => Value::String(
            ts.naive_local().format("%Y-%m-%dT%H:%M:%S").to_string(),
        ),
        fitparser::Value::Array(items) => {
            Value::Array(items.iter().map(value_to_json).collect())
        }
        other => serde_json::to_value(other).unwrap_or(Value::Null),
    }
}

fn obj_timestamp(obj: &JsonObject, keys: &[&str]) -> Option<NaiveDateTime> {
    match normalize::field_value(obj, keys)? {
        Value::String(s) => normalize::parse_timestamp(s),
        _ => None,
    }
}

fn obj_i64(obj: &JsonObject, keys: &[&str]) -> Option<i64> {
    match normalize::field_value(obj, keys)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        _ => None,
    }
}

fn obj_f64(obj: &JsonObject, keys: &[&str]) -> Option<f64> {
    match normalize::field_value(obj, keys)? {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn obj_str(obj: &JsonObject, keys: &[&str]) -> Option<String> {
    match normalize::field_value(obj, keys)? {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// The file's own creation date, from the file-identity message.
pub fn file_date(groups: &FitMessageGroups) -> Option<NaiveDate> {
    groups
        .file_ids
        .iter()
        .find_map(|obj| obj_timestamp(obj, &["time_created"]))
        .map(|ts| ts.date())
}

/// Fold grouped messages into canonical records.
///
/// Monitoring messages aggregate into one daily summary per date; stress and
/// HRV samples become `(date, seq)` rows; sleep level transitions are summed
/// into per-date stage durations; sessions become activities. Per-second
/// track points are decoded into their group but produce no stored records —
/// no canonical category owns them.
pub fn records_from_groups(groups: &FitMessageGroups) -> Vec<CanonicalRecord> {
    let fallback_date = file_date(groups);
    let mut records = Vec::new();

    records.extend(monitoring_summaries(&groups.monitoring));
    records.extend(stress_records(&groups.stress_samples, fallback_date));
    records.extend(sleep_records(&groups.sleep_segments));
    records.extend(hrv_records(&groups.hrv_samples, fallback_date));
    records.extend(session_records(&groups.sessions));

    records
}

/// Aggregate monitoring messages into one summary per calendar date. Step,
/// distance, and calorie counters are cumulative over the day, so the
/// maximum observed value is the day's total.
fn monitoring_summaries(messages: &[JsonObject]) -> Vec<CanonicalRecord> {
    let mut per_day: BTreeMap<NaiveDate, DailySummaryRecord> = BTreeMap::new();

    for obj in messages {
        let Some(ts) = obj_timestamp(obj, &["timestamp"]) else {
            continue;
        };
        let date = ts.date();
        let entry = per_day.entry(date).or_insert_with(|| DailySummaryRecord {
            date,
            ..Default::default()
        });

        if let Some(steps) = obj_i64(obj, &["steps", "cycles"]) {
            entry.step_count = Some(entry.step_count.unwrap_or(0).max(steps));
        }
        if let Some(distance) = obj_f64(obj, &["distance"]) {
            entry.distance_meters =
                Some(entry.distance_meters.unwrap_or(0.0).max(distance));
        }
        if let Some(calories) = obj_f64(obj, &["calories", "active_calories"]) {
            entry.calories_burned =
                Some(entry.calories_burned.unwrap_or(0.0).max(calories));
        }
        if let Some(hr) = obj_i64(obj, &["heart_rate"]) {
            entry.min_heart_rate = Some(entry.min_heart_rate.map_or(hr, |m| m.min(hr)));
            entry.max_heart_rate = Some(entry.max_heart_rate.map_or(hr, |m| m.max(hr)));
        }
        if let Some(resting) = obj_i64(obj, &["resting_heart_rate"]) {
            entry.resting_heart_rate = Some(resting);
        }
    }

    per_day
        .into_values()
        .map(CanonicalRecord::DailySummary)
        .collect()
}

fn stress_records(
    messages: &[JsonObject],
    fallback_date: Option<NaiveDate>,
) -> Vec<CanonicalRecord> {
    let mut seq_per_day: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    let mut records = Vec::new();

    for obj in messages {
        let date = obj_timestamp(obj, &["stress_level_time", "timestamp"])
            .map(|ts| ts.date())
            .or(fallback_date);
        let Some(date) = date else {
            continue;
        };
        let Some(value) = obj_i64(obj, &["stress_level_value"]) else {
            continue;
        };
        let seq = seq_per_day.entry(date).or_insert(0);
        records.push(CanonicalRecord::Stress(StressRecord {
            date,
            seq: *seq,
            avg_stress: Some(value),
            ..Default::default()
        }));
        *seq += 1;
    }

    records
}

/// Sum sleep-level intervals into per-date stage durations. Each message
/// marks the start of a stage; the stage runs until the next message's
/// timestamp, attributed to the date the interval started on.
fn sleep_records(messages: &[JsonObject]) -> Vec<CanonicalRecord> {
    let mut timed: Vec<(NaiveDateTime, String)> = messages
        .iter()
        .filter_map(|obj| {
            let ts = obj_timestamp(obj, &["timestamp"])?;
            let level = obj_str(obj, &["sleep_level"])?;
            Some((ts, level))
        })
        .collect();
    timed.sort_by_key(|(ts, _)| *ts);

    let mut per_day: BTreeMap<NaiveDate, SleepRecord> = BTreeMap::new();
    for window in timed.windows(2) {
        let (start, level) = &window[0];
        let (end, _) = &window[1];
        let seconds = (*end - *start).num_seconds();
        if seconds <= 0 {
            continue;
        }

        let date = start.date();
        let entry = per_day.entry(date).or_insert_with(|| SleepRecord {
            date,
            ..Default::default()
        });
        let slot = match level.as_str() {
            "deep" => &mut entry.deep_sleep_seconds,
            "light" => &mut entry.light_sleep_seconds,
            "rem" => &mut entry.rem_sleep_seconds,
            "awake" => &mut entry.awake_sleep_seconds,
            other => {
                debug!(level = other, "unrecognized sleep level");
                continue;
            }
        };
        *slot = Some(slot.unwrap_or(0) + seconds);
    }

    per_day.into_values().map(CanonicalRecord::Sleep).collect()
}

/// HRV messages carry beat-to-beat intervals in seconds; the stored value is
/// the mean interval in milliseconds.
fn hrv_records(
    messages: &[JsonObject],
    fallback_date: Option<NaiveDate>,
) -> Vec<CanonicalRecord> {
    let Some(date) = fallback_date else {
        if !messages.is_empty() {
            warn!("HRV samples without a file date are dropped");
        }
        return Vec::new();
    };

    let mut records = Vec::new();
    let mut seq = 0i64;
    for obj in messages {
        let intervals: Vec<f64> = match normalize::field_value(obj, &["time"]) {
            Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_f64()).collect(),
            Some(Value::Number(n)) => n.as_f64().into_iter().collect(),
            _ => continue,
        };
        if intervals.is_empty() {
            continue;
        }
        let mean_ms = intervals.iter().sum::<f64>() / intervals.len() as f64 * 1000.0;
        records.push(CanonicalRecord::Hrv(HrvRecord {
            date,
            seq,
            hrv_value: Some(mean_ms),
            measurement_type: Some("rr_interval".to_string()),
        }));
        seq += 1;
    }

    records
}

fn session_records(messages: &[JsonObject]) -> Vec<CanonicalRecord> {
    let mut seq_per_day: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    let mut records = Vec::new();

    for obj in messages {
        let Some(start) = obj_timestamp(obj, &["start_time", "timestamp"]) else {
            continue;
        };
        let date = start.date();
        let seq = seq_per_day.entry(date).or_insert(0);
        records.push(CanonicalRecord::Activity(ActivityRecord {
            date,
            seq: *seq,
            start_time: Some(start),
            activity_type: obj_str(obj, &["sport", "sub_sport"]),
            duration_seconds: obj_f64(obj, &["total_elapsed_time", "total_timer_time"]),
            distance_meters: obj_f64(obj, &["total_distance"]),
            avg_hr: obj_i64(obj, &["avg_heart_rate"]),
            max_hr: obj_i64(obj, &["max_heart_rate"]),
            calories: obj_f64(obj, &["total_calories"]),
            training_load: obj_f64(obj, &["training_load_peak"]),
            training_effect_aerobic: obj_f64(obj, &["total_training_effect"]),
            training_effect_anaerobic: obj_f64(obj, &["total_anaerobic_training_effect"]),
            ..Default::default()
        }));
        *seq += 1;
    }

    records
}

/// Dominant category of a decoded file, used for the `imported_files` row.
fn dominant_category(groups: &FitMessageGroups) -> Category {
    if !groups.sessions.is_empty() || !groups.activities.is_empty() {
        Category::Activity
    } else if !groups.monitoring.is_empty() {
        Category::DailySummary
    } else if !groups.stress_samples.is_empty() {
        Category::Stress
    } else if !groups.sleep_segments.is_empty() {
        Category::Sleep
    } else if !groups.hrv_samples.is_empty() {
        Category::Hrv
    } else {
        Category::Other
    }
}

/// Parse one FIT file into canonical records.
pub fn parse_fit_file(path: &Path) -> Result<ParsedFile> {
    let content_hash = parse::content_hash(path)?;
    let (file_size, modified_time) = parse::file_metadata(path)?;

    let groups = decode_messages(path)?;
    let records = records_from_groups(&groups);

    Ok(ParsedFile {
        path: path.to_path_buf(),
        kind: FileKind::Fit,
        category: dominant_category(&groups),
        content_hash,
        file_size,
        modified_time,
        records,
    })
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
    fn monitoring_aggregates_cumulative_counters() {
        let messages = vec![
            obj(r#"{"timestamp": "2024-01-15T06:00:00", "steps": 1200, "heart_rate": 58}"#),
            obj(r#"{"timestamp": "2024-01-15T20:00:00", "steps": 10450, "heart_rate": 92}"#),
            obj(r#"{"timestamp": "2024-01-16T08:00:00", "steps": 900}"#),
        ];
        let records = monitoring_summaries(&messages);
        assert_eq!(records.len(), 2);

        match &records[0] {
            CanonicalRecord::DailySummary(r) => {
                assert_eq!(r.step_count, Some(10450));
                assert_eq!(r.min_heart_rate, Some(58));
                assert_eq!(r.max_heart_rate, Some(92));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn stress_samples_get_sequential_keys_per_day() {
        let messages = vec![
            obj(r#"{"stress_level_time": "2024-01-15T09:00:00", "stress_level_value": 30}"#),
            obj(r#"{"stress_level_time": "2024-01-15T09:03:00", "stress_level_value": 45}"#),
        ];
        let records = stress_records(&messages, None);
        assert_eq!(records.len(), 2);
        match (&records[0], &records[1]) {
            (CanonicalRecord::Stress(a), CanonicalRecord::Stress(b)) => {
                assert_eq!((a.seq, b.seq), (0, 1));
                assert_eq!(b.avg_stress, Some(45));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn sleep_levels_fold_into_stage_durations() {
        let messages = vec![
            obj(r#"{"timestamp": "2024-01-15T23:00:00", "sleep_level": "light"}"#),
            obj(r#"{"timestamp": "2024-01-15T23:30:00", "sleep_level": "deep"}"#),
            obj(r#"{"timestamp": "2024-01-15T23:45:00", "sleep_level": "light"}"#),
        ];
        let records = sleep_records(&messages);
        assert_eq!(records.len(), 1);
        match &records[0] {
            CanonicalRecord::Sleep(r) => {
                assert_eq!(r.light_sleep_seconds, Some(1800));
                assert_eq!(r.deep_sleep_seconds, Some(900));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn undecodable_file_is_a_parse_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.fit");
        fs::write(&path, b"definitely not a fit file").unwrap();
        let err = parse_fit_file(&path);
        assert!(matches!(err, Err(Error::Parse(_))));
    }

    #[test]
    fn empty_groups_have_no_dominant_category() {
        let groups = FitMessageGroups::default();
        assert_eq!(dominant_category(&groups), Category::Other);
        assert!(records_from_groups(&groups).is_empty());
    }
}
