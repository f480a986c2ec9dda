//! Import pipeline orchestration.
//!
//! Sequences extraction → categorization → per-file parse → ingest for a
//! full archive or folder import, and aggregates a structured summary.
//! File-scoped failures are recorded and never abort the run; only a
//! missing or corrupt archive does. The extraction scratch directory is
//! released on every exit path unless the caller opts to keep it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tempfile::TempDir;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::extract::{self, ExtractionReport};
use crate::models::{Category, FileKind, IngestSource};
use crate::parse;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::report::ImportSummary;
use crate::store::{IngestOutcome, Store};

/// Options for an archive import.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Keep the extraction scratch directory on disk for debugging. The
    /// summary then carries its path; cleanup becomes the caller's problem.
    pub keep_scratch: bool,
}

/// One unit of per-file work derived from an extraction report.
struct WorkItem {
    path: PathBuf,
    kind: FileKind,
    category: Category,
    /// Key used for the summary's per-category breakdown.
    stats_key: &'static str,
}

/// Import a GDPR export archive.
///
/// Fatal only when the archive is missing or malformed; every per-file
/// failure is recorded in the returned summary and processing continues.
pub async fn import_archive(
    store: &Store,
    archive: &Path,
    opts: &ImportOptions,
    progress: &dyn ProgressReporter,
) -> Result<ImportSummary> {
    let started = Instant::now();
    let label = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| archive.display().to_string());

    progress.report(ProgressEvent::Extracting {
        label: label.clone(),
    });

    // Scratch directory is dropped (deleted) on every exit path below,
    // including extraction errors, unless explicitly kept at the end.
    let scratch = TempDir::with_prefix("pulseline-import-")?;
    let report = extract::extract_archive(archive, scratch.path())?;

    let mut summary = ImportSummary::new(archive.display().to_string());
    summary.total_files_found = report.total_files;

    let work = plan_work(&report, &mut summary);
    let attempted = work.len();

    run_work(store, work, IngestSource::Archive, &label, progress, &mut summary).await;

    summary.finalize(attempted, started.elapsed().as_secs_f64());

    if opts.keep_scratch {
        // Persist the scratch directory; TempDir cleanup is disarmed.
        let kept = scratch.keep();
        summary.extract_path = Some(kept.display().to_string());
        info!(path = %kept.display(), "scratch directory kept");
    }

    info!(
        archive = %archive.display(),
        processed = summary.total_files_processed,
        records = summary.total_records_inserted,
        duplicates = summary.duplicates_skipped,
        errors = summary.errors,
        success = summary.success,
        "archive import finished"
    );
    Ok(summary)
}

/// Import binary device files from a local folder (manual import).
pub async fn import_fit_folder(
    store: &Store,
    folder: &Path,
    progress: &dyn ProgressReporter,
) -> Result<ImportSummary> {
    let started = Instant::now();
    if !folder.is_dir() {
        return Err(Error::NotFound(folder.to_path_buf()));
    }
    let label = folder.display().to_string();

    let mut summary = ImportSummary::new(label.clone());
    let mut work = Vec::new();
    for entry in WalkDir::new(folder) {
        let entry = entry.map_err(|e| Error::Parse(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        summary.total_files_found += 1;
        if extract::classify_extension(entry.path()) == Some(FileKind::Fit) {
            work.push(WorkItem {
                path: entry.path().to_path_buf(),
                kind: FileKind::Fit,
                category: Category::Other,
                stats_key: "fit",
            });
        }
    }
    work.sort_by(|a, b| a.path.cmp(&b.path));

    for item in &work {
        summary.category_mut(item.stats_key).found += 1;
    }
    let attempted = work.len();

    run_work(store, work, IngestSource::Manual, &label, progress, &mut summary).await;

    summary.finalize(attempted, started.elapsed().as_secs_f64());
    Ok(summary)
}

/// Turn an extraction report into an ordered work list, registering found
/// counts (including the buckets that are never parsed) on the summary.
fn plan_work(report: &ExtractionReport, summary: &mut ImportSummary) -> Vec<WorkItem> {
    let mut work = Vec::new();

    summary.category_mut("fit").found = report.fit_files.len();
    for path in &report.fit_files {
        work.push(WorkItem {
            path: path.clone(),
            kind: FileKind::Fit,
            category: Category::Other,
            stats_key: "fit",
        });
    }

    // Tabular activity files are categorized but carry no parsable records.
    if !report.tcx_files.is_empty() {
        summary.category_mut("tcx").found = report.tcx_files.len();
    }

    for (&category, paths) in &report.json_categories {
        let key = category.as_str();
        summary.category_mut(key).found = paths.len();
        if category == Category::Other {
            continue;
        }
        for path in paths {
            work.push(WorkItem {
                path: path.clone(),
                kind: FileKind::Json,
                category,
                stats_key: key,
            });
        }
    }

    work
}

/// Parse and ingest every work item, reporting monotonic progress.
async fn run_work(
    store: &Store,
    work: Vec<WorkItem>,
    source: IngestSource,
    label: &str,
    progress: &dyn ProgressReporter,
    summary: &mut ImportSummary,
) {
    let total = work.len() as u64;
    for (i, item) in work.iter().enumerate() {
        let result = parse::parse_file(&item.path, item.kind, item.category);
        match result {
            Ok(parsed) => {
                let stats_key = item.stats_key;
                match store.ingest(&parsed, source).await {
                    Ok(IngestOutcome::Duplicate) => {
                        summary.duplicates_skipped += 1;
                    }
                    Ok(IngestOutcome::Ingested { inserted, updated }) => {
                        summary.total_files_processed += 1;
                        summary.total_records_inserted += inserted;
                        summary.records_updated += updated;
                        let stats = summary.category_mut(stats_key);
                        stats.processed += 1;
                        stats.records += inserted;
                    }
                    Err(e) => {
                        warn!(file = %item.path.display(), error = %e, "store write failed");
                        summary.record_error(
                            item.path.display().to_string(),
                            stats_key,
                            e.to_string(),
                        );
                    }
                }
            }
            Err(e) => {
                warn!(file = %item.path.display(), error = %e, "parse failed");
                summary.record_error(
                    item.path.display().to_string(),
                    item.stats_key,
                    e.to_string(),
                );
            }
        }

        progress.report(ProgressEvent::Ingesting {
            label: label.to_string(),
            n: i as u64 + 1,
            total,
        });
    }
}
