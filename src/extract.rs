//! GDPR export archive extraction and file categorization.
//!
//! Unpacks a vendor "export my data" ZIP into a scratch directory, walks the
//! result, and classifies every file by extension and — for JSON documents —
//! by filename keyword into a data category. Extraction leaves files on disk
//! at the reported path; scratch cleanup is the orchestrator's job.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::models::{Category, FileKind};

/// Well-known vendor data directory inside GDPR exports. When present,
/// categorization is scoped to this subtree; unrelated archive content
/// (readmes, account metadata) outside it is ignored.
pub const VENDOR_DATA_DIR: &str = "DI_CONNECT";

/// Ordered filename keyword rules for bucketing JSON files. First match
/// wins; filenames are lowercased before matching.
const JSON_CATEGORY_RULES: &[(&str, Category)] = &[
    ("sleep", Category::Sleep),
    ("udsfile", Category::DailySummary),
    ("dailysummary", Category::DailySummary),
    ("uds", Category::DailySummary),
    ("hrv", Category::Hrv),
    ("stress", Category::Stress),
    ("fitness", Category::FitnessAssessment),
    ("hydration", Category::Hydration),
    ("menstrual", Category::MenstrualCycle),
    ("bodycomposition", Category::BodyComposition),
    ("body_composition", Category::BodyComposition),
];

/// What an extraction found, per bucket, with aggregate counts.
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub extract_path: PathBuf,
    /// True when the well-known vendor data directory was found and used to
    /// scope the scan.
    pub vendor_dir_found: bool,
    /// Every file seen in the scanned subtree, including unclassified ones.
    pub total_files: usize,
    pub fit_files: Vec<PathBuf>,
    pub tcx_files: Vec<PathBuf>,
    pub json_files: Vec<PathBuf>,
    /// JSON files bucketed by category keyword; `Category::Other` collects
    /// the unmatched rest.
    pub json_categories: BTreeMap<Category, Vec<PathBuf>>,
}

impl ExtractionReport {
    /// JSON paths in a given category, empty when none matched.
    pub fn json_in(&self, category: Category) -> &[PathBuf] {
        self.json_categories
            .get(&category)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// Classify a file by extension, case-insensitive. `None` for anything that
/// is not a recognized wearable-data format.
pub fn classify_extension(path: &Path) -> Option<FileKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "fit" => Some(FileKind::Fit),
        "tcx" => Some(FileKind::Tcx),
        "json" => Some(FileKind::Json),
        _ => None,
    }
}

/// Bucket a JSON file into a data category by its filename.
pub fn categorize_json_name(path: &Path) -> Category {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    for (keyword, category) in JSON_CATEGORY_RULES {
        if name.contains(keyword) {
            return *category;
        }
    }
    Category::Other
}

/// Extract `archive` into `dest` and categorize everything found.
///
/// Fails with [`Error::NotFound`] when the archive path does not exist and
/// [`Error::InvalidArchive`] when it is not a well-formed ZIP. `dest` is
/// created if missing.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<ExtractionReport> {
    if !archive.exists() {
        return Err(Error::NotFound(archive.to_path_buf()));
    }

    fs::create_dir_all(dest)?;

    let file = fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| Error::InvalidArchive(format!("{}: {}", archive.display(), e)))?;
    zip.extract(dest).map_err(|e| match e {
        zip::result::ZipError::Io(io) => Error::Io(io),
        other => Error::InvalidArchive(other.to_string()),
    })?;

    info!(archive = %archive.display(), dest = %dest.display(), "extracted export archive");

    let mut report = categorize_tree(dest)?;
    report.extract_path = dest.to_path_buf();
    Ok(report)
}

/// Walk an already-extracted tree and categorize its files. Scoped to the
/// vendor data directory when one exists under `root`.
pub fn categorize_tree(root: &Path) -> Result<ExtractionReport> {
    if !root.exists() {
        return Err(Error::NotFound(root.to_path_buf()));
    }

    let scope = find_vendor_dir(root);
    let vendor_dir_found = scope.is_some();
    let scan_root = scope.unwrap_or_else(|| root.to_path_buf());

    let mut report = ExtractionReport {
        extract_path: root.to_path_buf(),
        vendor_dir_found,
        total_files: 0,
        fit_files: Vec::new(),
        tcx_files: Vec::new(),
        json_files: Vec::new(),
        json_categories: BTreeMap::new(),
    };

    for entry in WalkDir::new(&scan_root) {
        let entry = entry.map_err(|e| Error::Parse(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        report.total_files += 1;

        let path = entry.path().to_path_buf();
        match classify_extension(&path) {
            Some(FileKind::Fit) => report.fit_files.push(path),
            Some(FileKind::Tcx) => report.tcx_files.push(path),
            Some(FileKind::Json) => {
                let category = categorize_json_name(&path);
                debug!(file = %path.display(), %category, "categorized json file");
                report
                    .json_categories
                    .entry(category)
                    .or_default()
                    .push(path.clone());
                report.json_files.push(path);
            }
            None => {}
        }
    }

    // Deterministic ordering for reports and tests.
    report.fit_files.sort();
    report.tcx_files.sort();
    report.json_files.sort();
    for paths in report.json_categories.values_mut() {
        paths.sort();
    }

    info!(
        total = report.total_files,
        fit = report.fit_files.len(),
        tcx = report.tcx_files.len(),
        json = report.json_files.len(),
        vendor_dir = report.vendor_dir_found,
        "categorized extraction"
    );

    Ok(report)
}

/// Locate the vendor data directory at or below `root`, if present.
fn find_vendor_dir(root: &Path) -> Option<PathBuf> {
    for entry in WalkDir::new(root).into_iter().flatten() {
        if entry.file_type().is_dir() && entry.file_name() == VENDOR_DATA_DIR {
            return Some(entry.path().to_path_buf());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn build_zip(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let zip_path = dir.join("export.zip");
        let file = fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, bytes) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
        zip_path
    }

    #[test]
    fn missing_archive_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = extract_archive(&tmp.path().join("nope.zip"), &tmp.path().join("out"));
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[test]
    fn invalid_archive_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let bad = tmp.path().join("bad.zip");
        fs::write(&bad, b"not a valid zip file").unwrap();
        let err = extract_archive(&bad, &tmp.path().join("out"));
        assert!(matches!(err, Err(Error::InvalidArchive(_))));
    }

    #[test]
    fn categorizes_by_extension_and_keyword() {
        let tmp = TempDir::new().unwrap();
        let zip_path = build_zip(
            tmp.path(),
            &[
                ("sleep_2024-01-15.json", b"{}".as_slice()),
                ("UdsFile_2024-01-16.json", b"{}".as_slice()),
                ("activity.fit", b"fake".as_slice()),
            ],
        );

        let report = extract_archive(&zip_path, &tmp.path().join("out")).unwrap();
        assert_eq!(report.total_files, 3);
        assert_eq!(report.fit_files.len(), 1);
        assert_eq!(report.json_in(Category::Sleep).len(), 1);
        assert_eq!(report.json_in(Category::DailySummary).len(), 1);
    }

    #[test]
    fn scopes_to_vendor_dir_when_present() {
        let tmp = TempDir::new().unwrap();
        let zip_path = build_zip(
            tmp.path(),
            &[
                ("DI_CONNECT/DI-Connect-Wellness/sleep_2024-01-15.json", b"{}".as_slice()),
                ("DI_CONNECT/activity.fit", b"fake".as_slice()),
                ("unrelated/readme.txt", b"hello".as_slice()),
            ],
        );

        let report = extract_archive(&zip_path, &tmp.path().join("out")).unwrap();
        assert!(report.vendor_dir_found);
        // The unrelated file outside DI_CONNECT is not counted.
        assert_eq!(report.total_files, 2);
        assert_eq!(report.fit_files.len(), 1);
        assert_eq!(report.json_in(Category::Sleep).len(), 1);
    }

    #[test]
    fn empty_archive_yields_empty_report() {
        let tmp = TempDir::new().unwrap();
        let zip_path = build_zip(tmp.path(), &[]);
        let report = extract_archive(&zip_path, &tmp.path().join("out")).unwrap();
        assert_eq!(report.total_files, 0);
        assert!(!report.vendor_dir_found);
    }

    #[test]
    fn unmatched_json_falls_to_other() {
        assert_eq!(
            categorize_json_name(Path::new("random_metadata.json")),
            Category::Other
        );
        assert_eq!(
            categorize_json_name(Path::new("hrv_2024-05-01.json")),
            Category::Hrv
        );
        assert_eq!(
            categorize_json_name(Path::new("HYDRATION_log.json")),
            Category::Hydration
        );
    }

    #[test]
    fn unknown_extensions_are_ignored() {
        assert_eq!(classify_extension(Path::new("notes.txt")), None);
        assert_eq!(classify_extension(Path::new("track.FIT")), Some(FileKind::Fit));
        assert_eq!(classify_extension(Path::new("workout.Tcx")), Some(FileKind::Tcx));
    }
}
