//! Content-addressed dedup and idempotent ingestion.
//!
//! The store exclusively owns the `imported_files` ledger and every
//! per-category record table. All writes for one file happen in one
//! transaction: a failure rolls everything back and leaves the file's hash
//! absent so a retry is possible. The UNIQUE constraint on `content_hash`
//! is the sole correctness mechanism against concurrent ingestion of the
//! same bytes; the in-process in-flight set only avoids wasted parse work.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{
    ActivityRecord, BodyCompositionRecord, CanonicalRecord, DailySummaryRecord,
    FitnessAssessmentRecord, HrvRecord, HydrationRecord, ImportedFileRow, IngestSource,
    MenstrualCycleRecord, ParsedFile, SleepRecord, StressRecord,
};

/// Result of ingesting one parsed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The file's content hash was already in the ledger; nothing written.
    Duplicate,
    /// The file was new. `inserted` counts new record rows, `updated` counts
    /// identity-key conflicts resolved by updating in place.
    Ingested { inserted: u64, updated: u64 },
}

impl IngestOutcome {
    pub fn records_inserted(&self) -> u64 {
        match self {
            IngestOutcome::Duplicate => 0,
            IngestOutcome::Ingested { inserted, .. } => *inserted,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, IngestOutcome::Duplicate)
    }
}

/// Dedup & ingest store over a shared SQLite pool. Constructed explicitly
/// and passed to every component — there is no global connection.
pub struct Store {
    pool: SqlitePool,
    in_flight: Mutex<HashSet<String>>,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Store {
            pool,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Idempotently ingest one parsed file.
    ///
    /// Re-ingesting identical bytes is a no-op reported as
    /// [`IngestOutcome::Duplicate`]. Canonical records are upserted by their
    /// natural identity key: a later ingestion for an existing key
    /// overwrites stale values rather than duplicating the row.
    pub async fn ingest(&self, file: &ParsedFile, source: IngestSource) -> Result<IngestOutcome> {
        // Same-hash work already running in this process: skip the write
        // entirely, the other caller owns it.
        {
            let mut set = self.in_flight.lock().expect("in-flight set poisoned");
            if !set.insert(file.content_hash.clone()) {
                debug!(hash = %file.content_hash, "hash already being ingested");
                return Ok(IngestOutcome::Duplicate);
            }
        }

        let result = self.ingest_inner(file, source).await;

        self.in_flight
            .lock()
            .expect("in-flight set poisoned")
            .remove(&file.content_hash);

        result
    }

    async fn ingest_inner(&self, file: &ParsedFile, source: IngestSource) -> Result<IngestOutcome> {
        if self.is_imported(&file.content_hash).await? {
            debug!(file = %file.path.display(), "already imported, skipping");
            return Ok(IngestOutcome::Duplicate);
        }

        let mut tx = self.pool.begin().await?;

        // DO NOTHING + zero rows affected means a concurrent ingest of the
        // same hash committed first; the uniqueness constraint decides.
        let inserted_file = sqlx::query(
            r#"
            INSERT INTO imported_files
                (content_hash, file_path, file_kind, category, file_size,
                 modified_time, source, record_count, imported_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)
            ON CONFLICT(content_hash) DO NOTHING
            "#,
        )
        .bind(&file.content_hash)
        .bind(file.path.to_string_lossy().as_ref())
        .bind(file.kind.as_str())
        .bind(file.category.as_str())
        .bind(file.file_size)
        .bind(file.modified_time)
        .bind(source.as_str())
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        if inserted_file.rows_affected() == 0 {
            return Ok(IngestOutcome::Duplicate);
        }

        let mut inserted = 0u64;
        let mut updated = 0u64;
        for record in &file.records {
            if upsert_record(&mut tx, record, &file.content_hash).await? {
                inserted += 1;
            } else {
                updated += 1;
            }
        }

        // Record count covers every row this file actually wrote, whether
        // freshly inserted or updated in place.
        sqlx::query("UPDATE imported_files SET record_count = ? WHERE content_hash = ?")
            .bind((inserted + updated) as i64)
            .bind(&file.content_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            file = %file.path.display(),
            inserted,
            updated,
            source = source.as_str(),
            "ingested file"
        );
        Ok(IngestOutcome::Ingested { inserted, updated })
    }

    pub async fn is_imported(&self, content_hash: &str) -> Result<bool> {
        let row: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM imported_files WHERE content_hash = ?")
                .bind(content_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Full ledger row for a content hash, used by sync change detection.
    pub async fn lookup_file(&self, content_hash: &str) -> Result<Option<ImportedFileRow>> {
        use sqlx::Row;
        let row = sqlx::query(
            r#"
            SELECT content_hash, file_path, file_kind, category, file_size,
                   modified_time, source, record_count
            FROM imported_files WHERE content_hash = ?
            "#,
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| ImportedFileRow {
            content_hash: r.get("content_hash"),
            file_path: r.get("file_path"),
            file_kind: r.get("file_kind"),
            category: r.get("category"),
            file_size: r.get("file_size"),
            modified_time: r.get("modified_time"),
            source: r.get("source"),
            record_count: r.get("record_count"),
        }))
    }

    /// Refresh the observed size/mtime on an existing ledger row. Used by
    /// the sync engine after a touched-but-identical file so it is Changed
    /// for exactly one run.
    pub async fn refresh_file_meta(
        &self,
        content_hash: &str,
        file_size: i64,
        modified_time: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE imported_files SET file_size = ?, modified_time = ? WHERE content_hash = ?",
        )
        .bind(file_size)
        .bind(modified_time)
        .bind(content_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn ts_str(ts: Option<NaiveDateTime>) -> Option<String> {
    ts.map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())
}

/// Upsert one record by its natural identity key. Returns true when a new
/// row was inserted, false when an existing row was updated in place.
async fn upsert_record(
    tx: &mut Transaction<'_, Sqlite>,
    record: &CanonicalRecord,
    hash: &str,
) -> Result<bool> {
    match record {
        CanonicalRecord::Sleep(r) => upsert_sleep(tx, r, hash).await,
        CanonicalRecord::DailySummary(r) => upsert_daily_summary(tx, r, hash).await,
        CanonicalRecord::Hrv(r) => upsert_hrv(tx, r, hash).await,
        CanonicalRecord::Stress(r) => upsert_stress(tx, r, hash).await,
        CanonicalRecord::Activity(r) => upsert_activity(tx, r, hash).await,
        CanonicalRecord::FitnessAssessment(r) => upsert_fitness_assessment(tx, r, hash).await,
        CanonicalRecord::Hydration(r) => upsert_hydration(tx, r, hash).await,
        CanonicalRecord::BodyComposition(r) => upsert_body_composition(tx, r, hash).await,
        CanonicalRecord::MenstrualCycle(r) => upsert_menstrual_cycle(tx, r, hash).await,
    }
}

async fn key_exists(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    date: &str,
    seq: Option<i64>,
) -> Result<bool> {
    let row: Option<i64> = match seq {
        Some(seq) => {
            sqlx::query_scalar(&format!(
                "SELECT 1 FROM {} WHERE date = ? AND seq = ?",
                table
            ))
            .bind(date)
            .bind(seq)
            .fetch_optional(&mut **tx)
            .await?
        }
        None => {
            sqlx::query_scalar(&format!("SELECT 1 FROM {} WHERE date = ?", table))
                .bind(date)
                .fetch_optional(&mut **tx)
                .await?
        }
    };
    Ok(row.is_some())
}

async fn upsert_sleep(
    tx: &mut Transaction<'_, Sqlite>,
    r: &SleepRecord,
    hash: &str,
) -> Result<bool> {
    let date = date_str(r.date);
    let existed = key_exists(tx, "sleep_records", &date, None).await?;
    sqlx::query(
        r#"
        INSERT INTO sleep_records
            (date, sleep_start, sleep_end, deep_sleep_seconds, light_sleep_seconds,
             rem_sleep_seconds, awake_sleep_seconds, window_confirmation,
             average_respiration, lowest_respiration, highest_respiration,
             average_spo2, lowest_spo2, average_sleep_hr, sleep_score, source_file_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(date) DO UPDATE SET
            sleep_start = excluded.sleep_start,
            sleep_end = excluded.sleep_end,
            deep_sleep_seconds = excluded.deep_sleep_seconds,
            light_sleep_seconds = excluded.light_sleep_seconds,
            rem_sleep_seconds = excluded.rem_sleep_seconds,
            awake_sleep_seconds = excluded.awake_sleep_seconds,
            window_confirmation = excluded.window_confirmation,
            average_respiration = excluded.average_respiration,
            lowest_respiration = excluded.lowest_respiration,
            highest_respiration = excluded.highest_respiration,
            average_spo2 = excluded.average_spo2,
            lowest_spo2 = excluded.lowest_spo2,
            average_sleep_hr = excluded.average_sleep_hr,
            sleep_score = excluded.sleep_score,
            source_file_hash = excluded.source_file_hash
        "#,
    )
    .bind(&date)
    .bind(ts_str(r.sleep_start))
    .bind(ts_str(r.sleep_end))
    .bind(r.deep_sleep_seconds)
    .bind(r.light_sleep_seconds)
    .bind(r.rem_sleep_seconds)
    .bind(r.awake_sleep_seconds)
    .bind(&r.window_confirmation)
    .bind(r.average_respiration)
    .bind(r.lowest_respiration)
    .bind(r.highest_respiration)
    .bind(r.average_spo2)
    .bind(r.lowest_spo2)
    .bind(r.average_sleep_hr)
    .bind(r.sleep_score)
    .bind(hash)
    .execute(&mut **tx)
    .await?;
    Ok(!existed)
}

async fn upsert_daily_summary(
    tx: &mut Transaction<'_, Sqlite>,
    r: &DailySummaryRecord,
    hash: &str,
) -> Result<bool> {
    let date = date_str(r.date);
    let existed = key_exists(tx, "daily_summaries", &date, None).await?;
    sqlx::query(
        r#"
        INSERT INTO daily_summaries
            (date, step_count, calories_burned, distance_meters, floors_climbed,
             active_minutes, sedentary_minutes, min_heart_rate, max_heart_rate,
             resting_heart_rate, avg_heart_rate, stress_avg, stress_max, stress_min,
             body_battery_charged, body_battery_drained, body_battery_start,
             body_battery_end, intensity_minutes_moderate, intensity_minutes_vigorous,
             source_file_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(date) DO UPDATE SET
            step_count = excluded.step_count,
            calories_burned = excluded.calories_burned,
            distance_meters = excluded.distance_meters,
            floors_climbed = excluded.floors_climbed,
            active_minutes = excluded.active_minutes,
            sedentary_minutes = excluded.sedentary_minutes,
            min_heart_rate = excluded.min_heart_rate,
            max_heart_rate = excluded.max_heart_rate,
            resting_heart_rate = excluded.resting_heart_rate,
            avg_heart_rate = excluded.avg_heart_rate,
            stress_avg = excluded.stress_avg,
            stress_max = excluded.stress_max,
            stress_min = excluded.stress_min,
            body_battery_charged = excluded.body_battery_charged,
            body_battery_drained = excluded.body_battery_drained,
            body_battery_start = excluded.body_battery_start,
            body_battery_end = excluded.body_battery_end,
            intensity_minutes_moderate = excluded.intensity_minutes_moderate,
            intensity_minutes_vigorous = excluded.intensity_minutes_vigorous,
            source_file_hash = excluded.source_file_hash
        "#,
    )
    .bind(&date)
    .bind(r.step_count)
    .bind(r.calories_burned)
    .bind(r.distance_meters)
    .bind(r.floors_climbed)
    .bind(r.active_minutes)
    .bind(r.sedentary_minutes)
    .bind(r.min_heart_rate)
    .bind(r.max_heart_rate)
    .bind(r.resting_heart_rate)
    .bind(r.avg_heart_rate)
    .bind(r.stress_avg)
    .bind(r.stress_max)
    .bind(r.stress_min)
    .bind(r.body_battery_charged)
    .bind(r.body_battery_drained)
    .bind(r.body_battery_start)
    .bind(r.body_battery_end)
    .bind(r.intensity_minutes_moderate)
    .bind(r.intensity_minutes_vigorous)
    .bind(hash)
    .execute(&mut **tx)
    .await?;
    Ok(!existed)
}

async fn upsert_hrv(
    tx: &mut Transaction<'_, Sqlite>,
    r: &HrvRecord,
    hash: &str,
) -> Result<bool> {
    let date = date_str(r.date);
    let existed = key_exists(tx, "hrv_records", &date, Some(r.seq)).await?;
    sqlx::query(
        r#"
        INSERT INTO hrv_records (date, seq, hrv_value, measurement_type, source_file_hash)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(date, seq) DO UPDATE SET
            hrv_value = excluded.hrv_value,
            measurement_type = excluded.measurement_type,
            source_file_hash = excluded.source_file_hash
        "#,
    )
    .bind(&date)
    .bind(r.seq)
    .bind(r.hrv_value)
    .bind(&r.measurement_type)
    .bind(hash)
    .execute(&mut **tx)
    .await?;
    Ok(!existed)
}

async fn upsert_stress(
    tx: &mut Transaction<'_, Sqlite>,
    r: &StressRecord,
    hash: &str,
) -> Result<bool> {
    let date = date_str(r.date);
    let existed = key_exists(tx, "stress_records", &date, Some(r.seq)).await?;
    sqlx::query(
        r#"
        INSERT INTO stress_records
            (date, seq, avg_stress, max_stress, min_stress, rest_stress_duration,
             activity_stress_duration, low_stress_duration, medium_stress_duration,
             high_stress_duration, source_file_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(date, seq) DO UPDATE SET
            avg_stress = excluded.avg_stress,
            max_stress = excluded.max_stress,
            min_stress = excluded.min_stress,
            rest_stress_duration = excluded.rest_stress_duration,
            activity_stress_duration = excluded.activity_stress_duration,
            low_stress_duration = excluded.low_stress_duration,
            medium_stress_duration = excluded.medium_stress_duration,
            high_stress_duration = excluded.high_stress_duration,
            source_file_hash = excluded.source_file_hash
        "#,
    )
    .bind(&date)
    .bind(r.seq)
    .bind(r.avg_stress)
    .bind(r.max_stress)
    .bind(r.min_stress)
    .bind(r.rest_stress_duration)
    .bind(r.activity_stress_duration)
    .bind(r.low_stress_duration)
    .bind(r.medium_stress_duration)
    .bind(r.high_stress_duration)
    .bind(hash)
    .execute(&mut **tx)
    .await?;
    Ok(!existed)
}

async fn upsert_activity(
    tx: &mut Transaction<'_, Sqlite>,
    r: &ActivityRecord,
    hash: &str,
) -> Result<bool> {
    let date = date_str(r.date);
    let existed = key_exists(tx, "activities", &date, Some(r.seq)).await?;
    sqlx::query(
        r#"
        INSERT INTO activities
            (date, seq, start_time, activity_type, duration_seconds, distance_meters,
             avg_hr, max_hr, calories, training_load, training_effect_aerobic,
             training_effect_anaerobic, source_file_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(date, seq) DO UPDATE SET
            start_time = excluded.start_time,
            activity_type = excluded.activity_type,
            duration_seconds = excluded.duration_seconds,
            distance_meters = excluded.distance_meters,
            avg_hr = excluded.avg_hr,
            max_hr = excluded.max_hr,
            calories = excluded.calories,
            training_load = excluded.training_load,
            training_effect_aerobic = excluded.training_effect_aerobic,
            training_effect_anaerobic = excluded.training_effect_anaerobic,
            source_file_hash = excluded.source_file_hash
        "#,
    )
    .bind(&date)
    .bind(r.seq)
    .bind(ts_str(r.start_time))
    .bind(&r.activity_type)
    .bind(r.duration_seconds)
    .bind(r.distance_meters)
    .bind(r.avg_hr)
    .bind(r.max_hr)
    .bind(r.calories)
    .bind(r.training_load)
    .bind(r.training_effect_aerobic)
    .bind(r.training_effect_anaerobic)
    .bind(hash)
    .execute(&mut **tx)
    .await?;
    Ok(!existed)
}

async fn upsert_fitness_assessment(
    tx: &mut Transaction<'_, Sqlite>,
    r: &FitnessAssessmentRecord,
    hash: &str,
) -> Result<bool> {
    let date = date_str(r.date);
    let existed = key_exists(tx, "fitness_assessments", &date, None).await?;
    sqlx::query(
        r#"
        INSERT INTO fitness_assessments
            (date, vo2_max, fitness_age, max_met, sport, sub_sport, source_file_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(date) DO UPDATE SET
            vo2_max = excluded.vo2_max,
            fitness_age = excluded.fitness_age,
            max_met = excluded.max_met,
            sport = excluded.sport,
            sub_sport = excluded.sub_sport,
            source_file_hash = excluded.source_file_hash
        "#,
    )
    .bind(&date)
    .bind(r.vo2_max)
    .bind(r.fitness_age)
    .bind(r.max_met)
    .bind(&r.sport)
    .bind(&r.sub_sport)
    .bind(hash)
    .execute(&mut **tx)
    .await?;
    Ok(!existed)
}

async fn upsert_hydration(
    tx: &mut Transaction<'_, Sqlite>,
    r: &HydrationRecord,
    hash: &str,
) -> Result<bool> {
    let date = date_str(r.date);
    let existed = key_exists(tx, "hydration_logs", &date, Some(r.seq)).await?;
    sqlx::query(
        r#"
        INSERT INTO hydration_logs
            (date, seq, value_ml, sweat_loss_ml, source, source_file_hash)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(date, seq) DO UPDATE SET
            value_ml = excluded.value_ml,
            sweat_loss_ml = excluded.sweat_loss_ml,
            source = excluded.source,
            source_file_hash = excluded.source_file_hash
        "#,
    )
    .bind(&date)
    .bind(r.seq)
    .bind(r.value_ml)
    .bind(r.sweat_loss_ml)
    .bind(&r.source)
    .bind(hash)
    .execute(&mut **tx)
    .await?;
    Ok(!existed)
}

async fn upsert_body_composition(
    tx: &mut Transaction<'_, Sqlite>,
    r: &BodyCompositionRecord,
    hash: &str,
) -> Result<bool> {
    let date = date_str(r.date);
    let existed = key_exists(tx, "body_composition", &date, None).await?;
    sqlx::query(
        r#"
        INSERT INTO body_composition
            (date, weight_kg, body_fat_percent, muscle_mass_kg, bone_mass_kg,
             water_percent, visceral_fat_rating, metabolic_age, bmi, source_file_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(date) DO UPDATE SET
            weight_kg = excluded.weight_kg,
            body_fat_percent = excluded.body_fat_percent,
            muscle_mass_kg = excluded.muscle_mass_kg,
            bone_mass_kg = excluded.bone_mass_kg,
            water_percent = excluded.water_percent,
            visceral_fat_rating = excluded.visceral_fat_rating,
            metabolic_age = excluded.metabolic_age,
            bmi = excluded.bmi,
            source_file_hash = excluded.source_file_hash
        "#,
    )
    .bind(&date)
    .bind(r.weight_kg)
    .bind(r.body_fat_percent)
    .bind(r.muscle_mass_kg)
    .bind(r.bone_mass_kg)
    .bind(r.water_percent)
    .bind(r.visceral_fat_rating)
    .bind(r.metabolic_age)
    .bind(r.bmi)
    .bind(hash)
    .execute(&mut **tx)
    .await?;
    Ok(!existed)
}

async fn upsert_menstrual_cycle(
    tx: &mut Transaction<'_, Sqlite>,
    r: &MenstrualCycleRecord,
    hash: &str,
) -> Result<bool> {
    let date = date_str(r.date);
    let existed = key_exists(tx, "menstrual_cycles", &date, None).await?;
    sqlx::query(
        r#"
        INSERT INTO menstrual_cycles
            (date, cycle_end, cycle_length_days, period_start, period_end,
             period_length_days, confirmed, ovulation_estimate, source_file_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(date) DO UPDATE SET
            cycle_end = excluded.cycle_end,
            cycle_length_days = excluded.cycle_length_days,
            period_start = excluded.period_start,
            period_end = excluded.period_end,
            period_length_days = excluded.period_length_days,
            confirmed = excluded.confirmed,
            ovulation_estimate = excluded.ovulation_estimate,
            source_file_hash = excluded.source_file_hash
        "#,
    )
    .bind(&date)
    .bind(r.cycle_end.map(date_str))
    .bind(r.cycle_length_days)
    .bind(r.period_start.map(date_str))
    .bind(r.period_end.map(date_str))
    .bind(r.period_length_days)
    .bind(r.confirmed)
    .bind(r.ovulation_estimate.map(date_str))
    .bind(hash)
    .execute(&mut **tx)
    .await?;
    Ok(!existed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, FileKind};
    use std::path::PathBuf;
    use tempfile::TempDir;

    async fn test_store(tmp: &TempDir) -> Store {
        let pool = crate::db::connect(&tmp.path().join("test.sqlite"))
            .await
            .unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        Store::new(pool)
    }

    fn sleep_file(hash: &str, date: &str, deep: i64) -> ParsedFile {
        ParsedFile {
            path: PathBuf::from(format!("/tmp/sleep_{}.json", date)),
            kind: FileKind::Json,
            category: Category::Sleep,
            content_hash: hash.to_string(),
            file_size: 128,
            modified_time: 1_700_000_000,
            records: vec![CanonicalRecord::Sleep(SleepRecord {
                date: date.parse().unwrap(),
                deep_sleep_seconds: Some(deep),
                ..Default::default()
            })],
        }
    }

    #[tokio::test]
    async fn ingest_then_duplicate() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp).await;
        let file = sleep_file("aaa", "2024-01-15", 7200);

        let first = store.ingest(&file, IngestSource::Archive).await.unwrap();
        assert_eq!(first, IngestOutcome::Ingested { inserted: 1, updated: 0 });

        let second = store.ingest(&file, IngestSource::Archive).await.unwrap();
        assert!(second.is_duplicate());
    }

    #[tokio::test]
    async fn conflicting_identity_key_updates_in_place() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp).await;

        store
            .ingest(&sleep_file("aaa", "2024-01-15", 7200), IngestSource::Archive)
            .await
            .unwrap();
        // Different bytes (different hash), same identity key.
        let outcome = store
            .ingest(&sleep_file("bbb", "2024-01-15", 5400), IngestSource::Archive)
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ingested { inserted: 0, updated: 1 });

        let (count, deep): (i64, i64) = {
            let c: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sleep_records")
                .fetch_one(store.pool())
                .await
                .unwrap();
            let d: i64 = sqlx::query_scalar(
                "SELECT deep_sleep_seconds FROM sleep_records WHERE date = '2024-01-15'",
            )
            .fetch_one(store.pool())
            .await
            .unwrap();
            (c, d)
        };
        assert_eq!(count, 1);
        assert_eq!(deep, 5400);
    }

    #[tokio::test]
    async fn record_count_reflects_written_rows() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp).await;

        store
            .ingest(&sleep_file("ccc", "2024-02-01", 100), IngestSource::Manual)
            .await
            .unwrap();
        let row = store.lookup_file("ccc").await.unwrap().unwrap();
        assert_eq!(row.record_count, 1);
        assert_eq!(row.source, "manual");
    }

    #[tokio::test]
    async fn refresh_file_meta_updates_ledger() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp).await;

        store
            .ingest(&sleep_file("ddd", "2024-03-01", 100), IngestSource::DeviceSync)
            .await
            .unwrap();
        store.refresh_file_meta("ddd", 256, 1_800_000_000).await.unwrap();

        let row = store.lookup_file("ddd").await.unwrap().unwrap();
        assert_eq!(row.file_size, 256);
        assert_eq!(row.modified_time, 1_800_000_000);
    }

    #[tokio::test]
    async fn compound_keys_allow_many_rows_per_day() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp).await;

        let file = ParsedFile {
            path: PathBuf::from("/tmp/monitor.fit"),
            kind: FileKind::Fit,
            category: Category::Stress,
            content_hash: "eee".to_string(),
            file_size: 64,
            modified_time: 0,
            records: (0..3)
                .map(|seq| {
                    CanonicalRecord::Stress(StressRecord {
                        date: "2024-04-01".parse().unwrap(),
                        seq,
                        avg_stress: Some(20 + seq),
                        ..Default::default()
                    })
                })
                .collect(),
        };

        let outcome = store.ingest(&file, IngestSource::DeviceSync).await.unwrap();
        assert_eq!(outcome.records_inserted(), 3);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stress_records")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 3);
    }
}
