//! Structured result summaries.
//!
//! Every import and sync returns one of these aggregates; the CLI renders
//! them as text or serializes them to JSON. Per-file error details are
//! bounded so a summary never grows with the size of a bad archive.

use std::collections::BTreeMap;

use serde::Serialize;

/// Maximum per-file error details kept on a summary.
pub const MAX_ERROR_DETAILS: usize = 10;

/// Fraction of attempted files that must process cleanly for a run to be
/// reported successful, in percent.
pub const SUCCESS_THRESHOLD_PERCENT: f64 = 95.0;

/// Per-category counters for one import run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CategoryStats {
    pub found: usize,
    pub processed: usize,
    pub records: u64,
    pub errors: usize,
}

/// One recoverable per-file failure.
#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    pub file: String,
    pub category: String,
    pub error: String,
}

/// Aggregate result of one archive or folder import.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub success: bool,
    pub source_path: String,
    /// Present only when the caller kept the scratch directory.
    pub extract_path: Option<String>,
    pub total_files_found: usize,
    pub total_files_processed: usize,
    pub total_records_inserted: u64,
    pub records_updated: u64,
    pub duplicates_skipped: usize,
    pub errors: usize,
    pub success_rate: f64,
    pub processing_time_seconds: f64,
    pub by_category: BTreeMap<String, CategoryStats>,
    /// Bounded to [`MAX_ERROR_DETAILS`] entries.
    pub error_details: Vec<FileError>,
}

impl ImportSummary {
    pub fn new(source_path: String) -> Self {
        ImportSummary {
            success: false,
            source_path,
            extract_path: None,
            total_files_found: 0,
            total_files_processed: 0,
            total_records_inserted: 0,
            records_updated: 0,
            duplicates_skipped: 0,
            errors: 0,
            success_rate: 0.0,
            processing_time_seconds: 0.0,
            by_category: BTreeMap::new(),
            error_details: Vec::new(),
        }
    }

    pub fn category_mut(&mut self, category: &str) -> &mut CategoryStats {
        self.by_category.entry(category.to_string()).or_default()
    }

    /// Record one recoverable per-file failure, keeping the detail list
    /// bounded.
    pub fn record_error(&mut self, file: String, category: &str, error: String) {
        self.errors += 1;
        self.category_mut(category).errors += 1;
        if self.error_details.len() < MAX_ERROR_DETAILS {
            self.error_details.push(FileError {
                file,
                category: category.to_string(),
                error,
            });
        }
    }

    /// Compute the final success rate and flag. A run is successful only
    /// when the fraction of cleanly processed files (including duplicates)
    /// meets the fixed threshold; an empty run is trivially successful.
    pub fn finalize(&mut self, attempted: usize, elapsed_seconds: f64) {
        self.processing_time_seconds = elapsed_seconds;
        let clean = self.total_files_processed + self.duplicates_skipped;
        self.success_rate = if attempted == 0 {
            100.0
        } else {
            clean as f64 / attempted as f64 * 100.0
        };
        self.success = self.success_rate >= SUCCESS_THRESHOLD_PERCENT;
    }
}

/// Per-file classification of one sync scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncFileState {
    New,
    Changed,
    Unchanged,
    Errored,
}

/// Aggregate result of syncing one device folder.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub device_id: String,
    pub device_path: String,
    pub files_scanned: usize,
    pub files_new: usize,
    pub files_changed: usize,
    pub files_unchanged: usize,
    pub files_errored: usize,
    pub records_inserted: u64,
    pub duration_seconds: f64,
    /// Bounded to [`MAX_ERROR_DETAILS`] entries.
    pub errors: Vec<FileError>,
}

impl SyncSummary {
    pub fn new(device_id: String, device_path: String) -> Self {
        SyncSummary {
            device_id,
            device_path,
            files_scanned: 0,
            files_new: 0,
            files_changed: 0,
            files_unchanged: 0,
            files_errored: 0,
            records_inserted: 0,
            duration_seconds: 0.0,
            errors: Vec::new(),
        }
    }

    pub fn record_error(&mut self, file: String, error: String) {
        self.files_errored += 1;
        if self.errors.len() < MAX_ERROR_DETAILS {
            self.errors.push(FileError {
                file,
                category: "fit".to_string(),
                error,
            });
        }
    }

    pub fn classify(&mut self, state: SyncFileState) {
        match state {
            SyncFileState::New => self.files_new += 1,
            SyncFileState::Changed => self.files_changed += 1,
            SyncFileState::Unchanged => self.files_unchanged += 1,
            SyncFileState::Errored => {} // counted via record_error
        }
    }
}

/// Aggregate result of syncing every enabled device.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncAllSummary {
    pub devices_synced: usize,
    pub total_files_new: usize,
    pub total_files_changed: usize,
    pub total_files_unchanged: usize,
    pub total_files_errored: usize,
    pub total_records_inserted: u64,
    pub device_summaries: Vec<SyncSummary>,
}

impl SyncAllSummary {
    pub fn absorb(&mut self, summary: SyncSummary) {
        self.devices_synced += 1;
        self.total_files_new += summary.files_new;
        self.total_files_changed += summary.files_changed;
        self.total_files_unchanged += summary.files_unchanged;
        self.total_files_errored += summary.files_errored;
        self.total_records_inserted += summary.records_inserted;
        self.device_summaries.push(summary);
    }
}
