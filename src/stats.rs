//! Database statistics and health overview.
//!
//! Provides a quick summary of what's ingested: imported-file counts,
//! per-category record counts and date ranges, and registered device
//! targets. Used by `pulse stats` to give confidence that imports and
//! syncs are landing as expected.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::devices;

/// Record tables shown in the per-category breakdown.
const CATEGORY_TABLES: &[(&str, &str)] = &[
    ("sleep", "sleep_records"),
    ("daily summaries", "daily_summaries"),
    ("hrv", "hrv_records"),
    ("stress", "stress_records"),
    ("activities", "activities"),
    ("fitness assessments", "fitness_assessments"),
    ("hydration", "hydration_logs"),
    ("body composition", "body_composition"),
    ("menstrual cycles", "menstrual_cycles"),
];

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(pool: &SqlitePool, db_path: &Path) -> Result<()> {
    let total_files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM imported_files")
        .fetch_one(pool)
        .await?;

    let db_size = std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);

    println!("Pulseline — Database Stats");
    println!("==========================");
    println!();
    println!("  Database:        {}", db_path.display());
    println!("  Size:            {}", format_bytes(db_size));
    println!("  Imported files:  {}", total_files);

    // Per-source breakdown of the file ledger
    let source_rows =
        sqlx::query("SELECT source, COUNT(*) AS n FROM imported_files GROUP BY source ORDER BY n DESC")
            .fetch_all(pool)
            .await?;
    if !source_rows.is_empty() {
        println!();
        println!("  By source:");
        for row in &source_rows {
            let source: String = row.get("source");
            let n: i64 = row.get("n");
            println!("    {:<14} {}", source, n);
        }
    }

    println!();
    println!(
        "  {:<22} {:>8}   {:<10}  {}",
        "CATEGORY", "RECORDS", "FROM", "TO"
    );
    println!("  {}", "-".repeat(58));

    for (label, table) in CATEGORY_TABLES {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS n, MIN(date) AS min_date, MAX(date) AS max_date FROM {}",
            table
        ))
        .fetch_one(pool)
        .await?;
        let n: i64 = row.get("n");
        let min_date: Option<String> = row.get("min_date");
        let max_date: Option<String> = row.get("max_date");
        println!(
            "  {:<22} {:>8}   {:<10}  {}",
            label,
            n,
            min_date.unwrap_or_else(|| "-".to_string()),
            max_date.unwrap_or_else(|| "-".to_string())
        );
    }

    // Device targets
    let targets = devices::list_devices(pool, false).await?;
    if !targets.is_empty() {
        println!();
        println!(
            "  {:<24} {:>6} {:>9}   {}",
            "DEVICE", "FILES", "ENABLED", "LAST SYNC"
        );
        println!("  {}", "-".repeat(58));
        for t in &targets {
            let sync_display = match t.last_sync_at {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<24} {:>6} {:>9}   {}",
                t.display_name, t.file_count, t.enabled, sync_display
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_scales() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
