//! Incremental device-folder synchronization.
//!
//! Walks a live sync-client folder (strictly read-only — nothing is ever
//! written into the vendor's tree), classifies every device file against
//! prior ingestion state, and re-ingests only what is new or changed.
//! Unchanged files are skipped without parsing, which is the whole point:
//! a repeat sync over a quiet folder does no decode work at all.

use std::path::{Path, PathBuf};
use std::time::Instant;

use globset::GlobSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::devices;
use crate::error::{Error, Result};
use crate::extract;
use crate::fit;
use crate::models::{FileKind, IngestSource};
use crate::report::{SyncAllSummary, SyncFileState, SyncSummary};
use crate::store::{IngestOutcome, Store};

/// Recursively enumerate device files under `root`, excluding paths that
/// match the caller's exclude patterns (relative to `root`).
pub fn scan_device_folder(root: &Path, exclude: &GlobSet) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::NotFound(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| Error::Parse(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude.is_match(relative.to_string_lossy().as_ref()) {
            continue;
        }
        if extract::classify_extension(path) == Some(FileKind::Fit) {
            files.push(path.to_path_buf());
        }
    }

    // Sort for deterministic ordering
    files.sort();
    Ok(files)
}

/// Classify one file against the store's ledger: absent hash → New,
/// present with differing size/mtime → Changed, otherwise Unchanged.
pub async fn classify_file(
    store: &Store,
    content_hash: &str,
    file_size: i64,
    modified_time: i64,
) -> Result<SyncFileState> {
    match store.lookup_file(content_hash).await? {
        None => Ok(SyncFileState::New),
        Some(row) => {
            if row.file_size != file_size || row.modified_time != modified_time {
                Ok(SyncFileState::Changed)
            } else {
                Ok(SyncFileState::Unchanged)
            }
        }
    }
}

/// Sync one device folder.
///
/// Fatal only when the folder is missing; every per-file failure is
/// recorded and the scan continues. The device's last-sync timestamp is
/// updated unconditionally afterwards — sync progress must not require a
/// perfect run.
pub async fn sync_device(
    store: &Store,
    device_id: &str,
    device_path: &Path,
    exclude: &GlobSet,
) -> Result<SyncSummary> {
    let started = Instant::now();
    let mut summary = SyncSummary::new(
        device_id.to_string(),
        device_path.display().to_string(),
    );

    let files = scan_device_folder(device_path, exclude)?;
    summary.files_scanned = files.len();
    info!(device = device_id, files = files.len(), "scanning device folder");

    for path in &files {
        match sync_one_file(store, path, &mut summary).await {
            Ok(state) => summary.classify(state),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "sync failed for file");
                summary.record_error(path.display().to_string(), e.to_string());
            }
        }
    }

    devices::touch_last_sync(store.pool(), device_id, summary.files_scanned as i64).await?;

    summary.duration_seconds = started.elapsed().as_secs_f64();
    info!(
        device = device_id,
        new = summary.files_new,
        changed = summary.files_changed,
        unchanged = summary.files_unchanged,
        errors = summary.files_errored,
        records = summary.records_inserted,
        "sync finished"
    );
    Ok(summary)
}

/// Handle one scanned file, returning its final classification. A parse or
/// store failure propagates so the caller counts the file as errored
/// instead of new/changed.
async fn sync_one_file(
    store: &Store,
    path: &Path,
    summary: &mut SyncSummary,
) -> Result<SyncFileState> {
    let content_hash = crate::parse::content_hash(path)?;
    let (file_size, modified_time) = crate::parse::file_metadata(path)?;

    let state = classify_file(store, &content_hash, file_size, modified_time).await?;

    match state {
        SyncFileState::Unchanged => {
            debug!(file = %path.display(), "unchanged, skipping parse");
        }
        SyncFileState::New | SyncFileState::Changed => {
            let parsed = fit::parse_fit_file(path)?;
            let outcome = store.ingest(&parsed, IngestSource::DeviceSync).await?;
            match outcome {
                IngestOutcome::Ingested { inserted, .. } => {
                    summary.records_inserted += inserted;
                }
                IngestOutcome::Duplicate => {
                    // Identical bytes under a fresh mtime: refresh the
                    // ledger so the file is Unchanged next run.
                    store
                        .refresh_file_meta(&content_hash, file_size, modified_time)
                        .await?;
                }
            }
        }
        SyncFileState::Errored => {}
    }
    Ok(state)
}

/// Sync every enabled device target. Devices are independent: one device's
/// failure is recorded on its own summary and does not block the rest.
pub async fn sync_all_enabled(store: &Store, exclude: &GlobSet) -> Result<SyncAllSummary> {
    let mut all = SyncAllSummary::default();

    let targets = devices::list_devices(store.pool(), true).await?;
    for target in targets {
        let path = PathBuf::from(&target.device_path);
        match sync_device(store, &target.device_id, &path, exclude).await {
            Ok(summary) => all.absorb(summary),
            Err(e) => {
                warn!(device = %target.device_id, error = %e, "device sync failed");
                let mut failed =
                    SyncSummary::new(target.device_id.clone(), target.device_path.clone());
                failed.record_error(target.device_path.clone(), e.to_string());
                all.absorb(failed);
            }
        }
    }

    Ok(all)
}

/// An empty exclude set, for callers without configuration.
pub fn no_excludes() -> GlobSet {
    GlobSet::empty()
}
