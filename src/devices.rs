//! Device-sync target detection and registration.
//!
//! The vendor's desktop sync client mirrors each watch into a per-device
//! folder named by a device identifier. This module finds those folders,
//! reads what metadata it can (a display name from the device's own
//! `device.fit` when decodable), and manages the `sync_devices` table. The
//! sync engine owns this lifecycle; record tables are never touched here.

use std::path::{Path, PathBuf};

use fitparser::profile::MesgNum;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::extract;
use crate::models::{DeviceTarget, FileKind};

/// Platform-default root of the vendor sync client's device folders.
pub fn default_sync_root() -> Option<PathBuf> {
    if cfg!(target_os = "macos") {
        let home = std::env::var_os("HOME")?;
        Some(
            PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("Garmin")
                .join("Devices"),
        )
    } else if cfg!(target_os = "windows") {
        let appdata = std::env::var_os("APPDATA")?;
        Some(PathBuf::from(appdata).join("Garmin").join("Devices"))
    } else {
        // No official client on Linux; Wine installs land here.
        let home = std::env::var_os("HOME")?;
        let user = std::env::var("USER").unwrap_or_else(|_| "user".to_string());
        Some(
            PathBuf::from(home)
                .join(".wine/drive_c/users")
                .join(user)
                .join("AppData/Roaming/Garmin/Devices"),
        )
    }
}

/// One device folder found under the sync-client root.
#[derive(Debug, Clone, Serialize)]
pub struct DetectedDevice {
    pub device_id: String,
    pub path: String,
    pub display_name: String,
    pub file_count: usize,
    /// Unix mtime of the most recently modified device file, if any.
    pub most_recent_file: Option<i64>,
}

/// Scan `root` for device folders containing binary device files.
/// Folders without any are skipped.
pub fn detect_devices(root: &Path) -> Result<Vec<DetectedDevice>> {
    if !root.is_dir() {
        return Err(Error::NotFound(root.to_path_buf()));
    }

    let mut devices = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let device_path = entry.path();
        let device_id = entry.file_name().to_string_lossy().to_string();

        let (file_count, most_recent_file) = scan_device_files(&device_path);
        if file_count == 0 {
            debug!(device = %device_id, "no device files, skipping");
            continue;
        }

        let display_name =
            device_display_name(&device_path).unwrap_or_else(|| device_id.clone());
        info!(device = %device_id, name = %display_name, files = file_count, "detected device");

        devices.push(DetectedDevice {
            device_id,
            path: device_path.display().to_string(),
            display_name,
            file_count,
            most_recent_file,
        });
    }

    devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
    Ok(devices)
}

/// Count device files and find the newest modification time.
fn scan_device_files(device_path: &Path) -> (usize, Option<i64>) {
    let mut count = 0usize;
    let mut most_recent: Option<i64> = None;
    for entry in WalkDir::new(device_path).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        if extract::classify_extension(entry.path()) != Some(FileKind::Fit) {
            continue;
        }
        count += 1;
        if let Ok((_, mtime)) = crate::parse::file_metadata(entry.path()) {
            most_recent = Some(most_recent.map_or(mtime, |m| m.max(mtime)));
        }
    }
    (count, most_recent)
}

/// Read the product name from the device's own `device.fit`, when present
/// and decodable. Any failure falls back to the folder name.
fn device_display_name(device_path: &Path) -> Option<String> {
    let device_fit = device_path.join("device.fit");
    if !device_fit.exists() {
        return None;
    }
    let mut file = std::fs::File::open(&device_fit).ok()?;
    let records = fitparser::from_reader(&mut file).ok()?;
    for record in records {
        if record.kind() != MesgNum::DeviceInfo {
            continue;
        }
        for field in record.fields() {
            if field.name() == "product_name" {
                if let fitparser::Value::String(name) = field.value() {
                    if !name.is_empty() {
                        return Some(name.clone());
                    }
                }
            }
        }
    }
    None
}

/// Insert a device target, or update its path, name, and file count if it
/// is already registered. The enabled flag and last-sync timestamp survive
/// re-registration.
pub async fn register_device(
    pool: &SqlitePool,
    device_id: &str,
    device_path: &str,
    display_name: &str,
    file_count: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_devices (device_id, device_path, display_name, enabled, file_count)
        VALUES (?, ?, ?, 1, ?)
        ON CONFLICT(device_id) DO UPDATE SET
            device_path = excluded.device_path,
            display_name = excluded.display_name,
            file_count = excluded.file_count
        "#,
    )
    .bind(device_id)
    .bind(device_path)
    .bind(display_name)
    .bind(file_count)
    .execute(pool)
    .await?;
    info!(device = device_id, path = device_path, "registered device");
    Ok(())
}

/// Registered device targets, optionally restricted to enabled ones.
pub async fn list_devices(pool: &SqlitePool, enabled_only: bool) -> Result<Vec<DeviceTarget>> {
    use sqlx::Row;
    let sql = if enabled_only {
        "SELECT device_id, device_path, display_name, enabled, last_sync_at, file_count
         FROM sync_devices WHERE enabled = 1 ORDER BY display_name"
    } else {
        "SELECT device_id, device_path, display_name, enabled, last_sync_at, file_count
         FROM sync_devices ORDER BY display_name"
    };
    let rows = sqlx::query(sql).fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|r| DeviceTarget {
            device_id: r.get("device_id"),
            device_path: r.get("device_path"),
            display_name: r.get("display_name"),
            enabled: r.get::<i64, _>("enabled") != 0,
            last_sync_at: r.get("last_sync_at"),
            file_count: r.get("file_count"),
        })
        .collect())
}

/// Stamp the device's last-sync time. Called after every sync attempt —
/// partial errors still advance sync progress.
pub async fn touch_last_sync(pool: &SqlitePool, device_id: &str, file_count: i64) -> Result<()> {
    sqlx::query(
        "UPDATE sync_devices SET last_sync_at = ?, file_count = ? WHERE device_id = ?",
    )
    .bind(chrono::Utc::now().timestamp())
    .bind(file_count)
    .bind(device_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Enable or disable a device target.
pub async fn set_enabled(pool: &SqlitePool, device_id: &str, enabled: bool) -> Result<()> {
    sqlx::query("UPDATE sync_devices SET enabled = ? WHERE device_id = ?")
        .bind(enabled)
        .bind(device_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_pool(tmp: &TempDir) -> SqlitePool {
        let pool = crate::db::connect(&tmp.path().join("test.sqlite"))
            .await
            .unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        pool
    }

    #[test]
    fn detection_skips_folders_without_device_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();

        std::fs::create_dir_all(root.join("3999001234/Monitor")).unwrap();
        std::fs::write(root.join("3999001234/Monitor/a.fit"), b"x").unwrap();
        std::fs::create_dir_all(root.join("empty-device")).unwrap();

        let devices = detect_devices(root).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_id, "3999001234");
        assert_eq!(devices[0].file_count, 1);
        // No decodable device.fit, so the folder name is the display name.
        assert_eq!(devices[0].display_name, "3999001234");
    }

    #[test]
    fn detection_of_missing_root_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = detect_devices(&tmp.path().join("nope"));
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn register_preserves_enabled_and_last_sync() {
        let tmp = TempDir::new().unwrap();
        let pool = test_pool(&tmp).await;

        register_device(&pool, "dev-1", "/d/1", "Watch", 10).await.unwrap();
        set_enabled(&pool, "dev-1", false).await.unwrap();
        touch_last_sync(&pool, "dev-1", 10).await.unwrap();

        // Re-registration updates the path but not the flag or timestamp.
        register_device(&pool, "dev-1", "/d/new", "Watch", 12).await.unwrap();

        let devices = list_devices(&pool, false).await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_path, "/d/new");
        assert_eq!(devices[0].file_count, 12);
        assert!(!devices[0].enabled);
        assert!(devices[0].last_sync_at.is_some());

        let enabled = list_devices(&pool, true).await.unwrap();
        assert!(enabled.is_empty());
    }
}
