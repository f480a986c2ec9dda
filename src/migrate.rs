//! Schema creation.
//!
//! Every statement is idempotent, so `pulse init` can run any number of
//! times. Identity keys are natural keys: the content hash for imported
//! files, the calendar date (or date + sequence for high-frequency
//! categories) for record tables.

use sqlx::SqlitePool;

use crate::error::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // File-level dedup ledger. The content-hash primary key is the single
    // source of truth for "already imported".
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS imported_files (
            content_hash TEXT PRIMARY KEY,
            file_path TEXT NOT NULL,
            file_kind TEXT NOT NULL,
            category TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            modified_time INTEGER NOT NULL,
            source TEXT NOT NULL,
            record_count INTEGER NOT NULL DEFAULT 0,
            imported_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_devices (
            device_id TEXT PRIMARY KEY,
            device_path TEXT NOT NULL,
            display_name TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            last_sync_at INTEGER,
            file_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sleep_records (
            date TEXT PRIMARY KEY,
            sleep_start TEXT,
            sleep_end TEXT,
            deep_sleep_seconds INTEGER,
            light_sleep_seconds INTEGER,
            rem_sleep_seconds INTEGER,
            awake_sleep_seconds INTEGER,
            window_confirmation TEXT,
            average_respiration REAL,
            lowest_respiration REAL,
            highest_respiration REAL,
            average_spo2 REAL,
            lowest_spo2 REAL,
            average_sleep_hr INTEGER,
            sleep_score INTEGER,
            source_file_hash TEXT NOT NULL,
            FOREIGN KEY (source_file_hash) REFERENCES imported_files(content_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS daily_summaries (
            date TEXT PRIMARY KEY,
            step_count INTEGER,
            calories_burned REAL,
            distance_meters REAL,
            floors_climbed INTEGER,
            active_minutes INTEGER,
            sedentary_minutes INTEGER,
            min_heart_rate INTEGER,
            max_heart_rate INTEGER,
            resting_heart_rate INTEGER,
            avg_heart_rate INTEGER,
            stress_avg INTEGER,
            stress_max INTEGER,
            stress_min INTEGER,
            body_battery_charged INTEGER,
            body_battery_drained INTEGER,
            body_battery_start INTEGER,
            body_battery_end INTEGER,
            intensity_minutes_moderate INTEGER,
            intensity_minutes_vigorous INTEGER,
            source_file_hash TEXT NOT NULL,
            FOREIGN KEY (source_file_hash) REFERENCES imported_files(content_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS hrv_records (
            date TEXT NOT NULL,
            seq INTEGER NOT NULL,
            hrv_value REAL,
            measurement_type TEXT,
            source_file_hash TEXT NOT NULL,
            PRIMARY KEY (date, seq),
            FOREIGN KEY (source_file_hash) REFERENCES imported_files(content_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stress_records (
            date TEXT NOT NULL,
            seq INTEGER NOT NULL,
            avg_stress INTEGER,
            max_stress INTEGER,
            min_stress INTEGER,
            rest_stress_duration INTEGER,
            activity_stress_duration INTEGER,
            low_stress_duration INTEGER,
            medium_stress_duration INTEGER,
            high_stress_duration INTEGER,
            source_file_hash TEXT NOT NULL,
            PRIMARY KEY (date, seq),
            FOREIGN KEY (source_file_hash) REFERENCES imported_files(content_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS activities (
            date TEXT NOT NULL,
            seq INTEGER NOT NULL,
            start_time TEXT,
            activity_type TEXT,
            duration_seconds REAL,
            distance_meters REAL,
            avg_hr INTEGER,
            max_hr INTEGER,
            calories REAL,
            training_load REAL,
            training_effect_aerobic REAL,
            training_effect_anaerobic REAL,
            source_file_hash TEXT NOT NULL,
            PRIMARY KEY (date, seq),
            FOREIGN KEY (source_file_hash) REFERENCES imported_files(content_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fitness_assessments (
            date TEXT PRIMARY KEY,
            vo2_max REAL,
            fitness_age INTEGER,
            max_met REAL,
            sport TEXT,
            sub_sport TEXT,
            source_file_hash TEXT NOT NULL,
            FOREIGN KEY (source_file_hash) REFERENCES imported_files(content_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS hydration_logs (
            date TEXT NOT NULL,
            seq INTEGER NOT NULL,
            value_ml REAL,
            sweat_loss_ml REAL,
            source TEXT,
            source_file_hash TEXT NOT NULL,
            PRIMARY KEY (date, seq),
            FOREIGN KEY (source_file_hash) REFERENCES imported_files(content_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS body_composition (
            date TEXT PRIMARY KEY,
            weight_kg REAL,
            body_fat_percent REAL,
            muscle_mass_kg REAL,
            bone_mass_kg REAL,
            water_percent REAL,
            visceral_fat_rating INTEGER,
            metabolic_age INTEGER,
            bmi REAL,
            source_file_hash TEXT NOT NULL,
            FOREIGN KEY (source_file_hash) REFERENCES imported_files(content_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS menstrual_cycles (
            date TEXT PRIMARY KEY,
            cycle_end TEXT,
            cycle_length_days INTEGER,
            period_start TEXT,
            period_end TEXT,
            period_length_days INTEGER,
            confirmed INTEGER,
            ovulation_estimate TEXT,
            source_file_hash TEXT NOT NULL,
            FOREIGN KEY (source_file_hash) REFERENCES imported_files(content_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_imported_files_source ON imported_files(source)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_imported_files_imported_at ON imported_files(imported_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_devices_enabled ON sync_devices(enabled)")
        .execute(pool)
        .await?;

    Ok(())
}
