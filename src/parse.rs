//! JSON record parsing and per-file identity.
//!
//! The JSON path of the record parser: load a categorized export file,
//! normalize its fields, derive each record's calendar date, and keep only
//! records with meaningful data. The content hash is computed exactly once
//! per file, here, so the store can dedup atomically.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::SystemTime;

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{CanonicalRecord, Category, FileKind, ParsedFile};
use crate::normalize::{self, JsonObject};

/// SHA-256 over the full byte stream, hex-encoded. The deduplication key.
pub fn content_hash(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// (size in bytes, modification time as unix seconds) for change detection.
pub fn file_metadata(path: &Path) -> Result<(i64, i64)> {
    let metadata = fs::metadata(path)?;
    let modified = metadata
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    Ok((metadata.len() as i64, modified))
}

/// Find a `YYYY-MM-DD` substring in the filename, the last stop in the date
/// derivation chain (vendor files are commonly named `sleep_2024-01-15.json`).
pub fn date_from_filename(path: &Path) -> Option<NaiveDate> {
    let name = path.file_stem()?.to_str()?;
    let bytes = name.as_bytes();
    if bytes.len() < 10 {
        return None;
    }
    for start in 0..=bytes.len() - 10 {
        if let Some(slice) = name.get(start..start + 10) {
            if let Ok(date) = NaiveDate::parse_from_str(slice, "%Y-%m-%d") {
                return Some(date);
            }
        }
    }
    None
}

/// Parse one categorized export file into canonical records.
///
/// Dispatches on the detected file kind. Tabular activity files are
/// categorized upstream but carry no parsable record data.
pub fn parse_file(path: &Path, kind: FileKind, category: Category) -> Result<ParsedFile> {
    match kind {
        FileKind::Fit => crate::fit::parse_fit_file(path),
        FileKind::Json => parse_json_file(path, category),
        FileKind::Tcx => Err(Error::Parse(format!(
            "{}: tabular activity files are not parsed",
            path.display()
        ))),
    }
}

/// Parse a JSON export file for the given category.
///
/// The document may be a single object or an array of objects; each object
/// is one candidate record. A record's date comes from, in order: the
/// category's calendar-date field, a derivable start timestamp, or a date
/// embedded in the filename. Records without meaningful data are dropped
/// with a warning; a file whose records all fail date derivation is a
/// [`Error::DateUndeterminable`].
pub fn parse_json_file(path: &Path, category: Category) -> Result<ParsedFile> {
    if category == Category::Other {
        return Err(Error::Parse(format!(
            "{}: file matches no data category",
            path.display()
        )));
    }

    let content_hash = content_hash(path)?;
    let (file_size, modified_time) = file_metadata(path)?;

    let text = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| Error::Parse(format!("{}: invalid JSON: {}", path.display(), e)))?;

    let objects: Vec<JsonObject> = match value {
        serde_json::Value::Object(obj) => vec![obj],
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::Object(obj) => Some(obj),
                _ => None,
            })
            .collect(),
        _ => {
            return Err(Error::Parse(format!(
                "{}: expected a JSON object or array of objects",
                path.display()
            )))
        }
    };

    let mut records = Vec::new();
    let mut dateless = 0usize;

    for obj in &objects {
        let Some(mut record) = normalize::normalize(obj, category) else {
            continue;
        };

        let date = derive_date(obj, &record, category, path);
        let Some(date) = date else {
            dateless += 1;
            continue;
        };

        assign_identity(&mut record, date, records.len() as i64);

        if record.has_meaningful_data() {
            records.push(record);
        } else {
            warn!(file = %path.display(), %category, "record has no meaningful data, dropped");
        }
    }

    if records.is_empty() && dateless > 0 {
        return Err(Error::DateUndeterminable(path.display().to_string()));
    }

    Ok(ParsedFile {
        path: path.to_path_buf(),
        kind: FileKind::Json,
        category,
        content_hash,
        file_size,
        modified_time,
        records,
    })
}

/// Date derivation chain: calendar-date field → start timestamp → filename.
fn derive_date(
    obj: &JsonObject,
    record: &CanonicalRecord,
    category: Category,
    path: &Path,
) -> Option<NaiveDate> {
    if let Some(date) = normalize::calendar_date(obj, category) {
        return Some(date);
    }
    let from_start = match record {
        CanonicalRecord::Sleep(r) => r.sleep_start.map(|ts| ts.date()),
        CanonicalRecord::Activity(r) => r.start_time.map(|ts| ts.date()),
        _ => None,
    };
    from_start.or_else(|| date_from_filename(path))
}

/// Stamp the identity key onto a freshly normalized record.
fn assign_identity(record: &mut CanonicalRecord, date: NaiveDate, seq: i64) {
    match record {
        CanonicalRecord::Sleep(r) => r.date = date,
        CanonicalRecord::DailySummary(r) => r.date = date,
        CanonicalRecord::Hrv(r) => {
            r.date = date;
            r.seq = seq;
        }
        CanonicalRecord::Stress(r) => {
            r.date = date;
            r.seq = seq;
        }
        CanonicalRecord::Activity(r) => {
            r.date = date;
            r.seq = seq;
        }
        CanonicalRecord::FitnessAssessment(r) => r.date = date,
        CanonicalRecord::Hydration(r) => {
            r.date = date;
            r.seq = seq;
        }
        CanonicalRecord::BodyComposition(r) => r.date = date,
        CanonicalRecord::MenstrualCycle(r) => r.date = date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_json(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn hash_is_stable_and_content_addressed() {
        let tmp = TempDir::new().unwrap();
        let a = write_json(&tmp, "a.json", r#"{"calendarDate":"2024-01-15"}"#);
        let b = write_json(&tmp, "b.json", r#"{"calendarDate":"2024-01-15"}"#);
        let c = write_json(&tmp, "c.json", r#"{"calendarDate":"2024-01-16"}"#);

        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
        assert_ne!(content_hash(&a).unwrap(), content_hash(&c).unwrap());
    }

    #[test]
    fn sleep_file_parses_with_calendar_date() {
        let tmp = TempDir::new().unwrap();
        let path = write_json(
            &tmp,
            "sleep_2024-01-15.json",
            r#"{"calendarDate":"2024-01-15","deepSleepSeconds":7200,"lightSleepSeconds":18000,"remSleepSeconds":3600}"#,
        );

        let parsed = parse_json_file(&path, Category::Sleep).unwrap();
        assert_eq!(parsed.records.len(), 1);
        match &parsed.records[0] {
            CanonicalRecord::Sleep(r) => {
                assert_eq!(r.date.to_string(), "2024-01-15");
                assert_eq!(r.deep_sleep_seconds, Some(7200));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn date_falls_back_to_start_timestamp_then_filename() {
        let tmp = TempDir::new().unwrap();

        let by_start = write_json(
            &tmp,
            "sleep_a.json",
            r#"{"sleepStartTimestampGMT":"2024-02-01T23:10:00.0","deepSleepSeconds":100}"#,
        );
        let parsed = parse_json_file(&by_start, Category::Sleep).unwrap();
        assert_eq!(parsed.records[0].date().to_string(), "2024-02-01");

        let by_name = write_json(&tmp, "sleep_2024-03-05.json", r#"{"deepSleepSeconds":100}"#);
        let parsed = parse_json_file(&by_name, Category::Sleep).unwrap();
        assert_eq!(parsed.records[0].date().to_string(), "2024-03-05");
    }

    #[test]
    fn dateless_record_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = write_json(&tmp, "sleep_nodate.json", r#"{"deepSleepSeconds":100}"#);
        let err = parse_json_file(&path, Category::Sleep);
        assert!(matches!(err, Err(Error::DateUndeterminable(_))));
    }

    #[test]
    fn meaningless_record_is_dropped_silently() {
        let tmp = TempDir::new().unwrap();
        let path = write_json(
            &tmp,
            "sleep_2024-01-15.json",
            r#"{"calendarDate":"2024-01-15","averageSpO2Value":95}"#,
        );
        let parsed = parse_json_file(&path, Category::Sleep).unwrap();
        assert!(parsed.records.is_empty());
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = write_json(&tmp, "sleep_2024-01-15.json", "{invalid json");
        let err = parse_json_file(&path, Category::Sleep);
        assert!(matches!(err, Err(Error::Parse(_))));
    }

    #[test]
    fn array_document_yields_one_record_per_element() {
        let tmp = TempDir::new().unwrap();
        let path = write_json(
            &tmp,
            "UdsFile_2024.json",
            r#"[
                {"calendarDate":"2024-01-15","totalSteps":10000},
                {"calendarDate":"2024-01-16","totalSteps":12000}
            ]"#,
        );
        let parsed = parse_json_file(&path, Category::DailySummary).unwrap();
        assert_eq!(parsed.records.len(), 2);
    }

    #[test]
    fn filename_date_extraction() {
        assert_eq!(
            date_from_filename(Path::new("sleep_2024-01-15.json")),
            Some(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );
        assert_eq!(
            date_from_filename(Path::new("UdsFile_2024-01-16.json")),
            Some(NaiveDate::from_ymd_opt(2024, 1, 16).unwrap())
        );
        assert_eq!(date_from_filename(Path::new("notes.json")), None);
    }
}
